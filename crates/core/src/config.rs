//! Channel configuration loaded from JSON with per-field defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::reconnect::ReconnectPolicy;
use crate::wire::WireFormat;

pub const DEFAULT_TOPIC_PREFIX: &str = "/topic/group/";
pub const DEFAULT_SEND_DESTINATION: &str = "/app/chat.sendMessage";
const DEFAULT_HISTORY_URL: &str = "http://localhost:8081/";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Everything a [`SessionChannel`](crate::channel::SessionChannel) needs to know
/// about the server and the local user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelConfig {
	pub endpoint: Endpoint,
	/// Dial `<endpoint>/websocket` (SockJS raw WebSocket transport).
	pub sockjs: bool,
	/// Base URL of the REST API serving chat history.
	pub history_url: Url,
	/// Identity stamped as `sender` on outbound messages.
	pub user: String,
	pub wire: WireFormat,
	pub topic_prefix: String,
	pub send_destination: String,
	pub connect_timeout_ms: u64,
	pub history_timeout_ms: u64,
	pub reconnect: ReconnectPolicy,
	/// Publish a JOIN notice after subscribing to a group.
	pub announce_join: bool,
}

impl Default for ChannelConfig {
	fn default() -> Self {
		Self {
			endpoint: Endpoint::default(),
			sockjs: false,
			history_url: Url::parse(DEFAULT_HISTORY_URL).expect("default history URL is valid"),
			user: String::new(),
			wire: WireFormat::default(),
			topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
			send_destination: DEFAULT_SEND_DESTINATION.to_string(),
			connect_timeout_ms: DEFAULT_TIMEOUT_MS,
			history_timeout_ms: DEFAULT_TIMEOUT_MS,
			reconnect: ReconnectPolicy::default(),
			announce_join: false,
		}
	}
}

impl ChannelConfig {
	pub fn for_user(endpoint: Endpoint, user: impl Into<String>) -> Self {
		Self {
			endpoint,
			user: user.into(),
			..Self::default()
		}
	}

	/// Reads a JSON config file. Missing fields take their defaults.
	pub fn from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path).map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
		serde_json::from_str(&content).map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
	}

	pub fn validate(&self) -> Result<()> {
		if self.user.trim().is_empty() {
			return Err(Error::Config("user must not be empty".to_string()));
		}
		if self.connect_timeout_ms == 0 {
			return Err(Error::Config("connectTimeoutMs must be greater than zero".to_string()));
		}
		if !matches!(self.history_url.scheme(), "http" | "https") {
			return Err(Error::Config(format!("historyUrl `{}` must use http:// or https://", self.history_url)));
		}
		self.reconnect.validate()
	}

	/// Subscription destination for `group`.
	pub fn topic_for(&self, group: &str) -> String {
		format!("{}{}", self.topic_prefix, group)
	}

	pub fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_ms)
	}

	pub fn history_timeout(&self) -> Duration {
		Duration::from_millis(self.history_timeout_ms)
	}
}
