//! Prior messages for a group, fetched once per join, and the groups a user
//! belongs to.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use campulse_protocol::ChatMessage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::transport::TransportFuture;

/// Source of a group's message history, oldest first.
pub trait HistoryLoader: Send + Sync {
	fn fetch_history<'a>(&'a self, group: &'a str) -> TransportFuture<'a, Vec<ChatMessage>>;
}

/// Loads history from `GET {base}/chat/history/{group}`.
#[derive(Debug, Clone)]
pub struct HttpHistoryLoader {
	client: reqwest::Client,
	base: Url,
}

impl HttpHistoryLoader {
	pub fn new(base: Url, timeout: Duration) -> Result<Self> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;
		Ok(Self { client, base })
	}

	/// URL for `group`, percent-encoded as a single path segment.
	pub fn url_for(&self, group: &str) -> Result<Url> {
		self.join(&["chat", "history", group])
	}

	/// URL listing the groups of `user`.
	pub fn groups_url_for(&self, user: &str) -> Result<Url> {
		self.join(&["group", user])
	}

	fn join(&self, segments: &[&str]) -> Result<Url> {
		let mut url = self.base.clone();
		url.path_segments_mut()
			.map_err(|_| Error::Config(format!("history URL `{}` cannot take a path", self.base)))?
			.pop_if_empty()
			.extend(segments);
		Ok(url)
	}

	/// Groups `user` is a member of, in server order.
	pub async fn fetch_groups(&self, user: &str) -> Result<Vec<ChatGroup>> {
		let unavailable = |reason: String| Error::GroupsUnavailable {
			user: user.to_string(),
			reason,
		};

		let url = self.groups_url_for(user).map_err(|e| unavailable(e.to_string()))?;
		debug!(target = "campulse.history", %url, "fetching groups");

		let response = self.client.get(url).send().await.map_err(|e| unavailable(e.to_string()))?;
		if !response.status().is_success() {
			return Err(unavailable(format!("unexpected status {}", response.status())));
		}
		response
			.json()
			.await
			.map_err(|e| unavailable(format!("body is not a group array: {e}")))
	}

	async fn fetch(&self, group: &str) -> Result<Vec<ChatMessage>> {
		let unavailable = |reason: String| Error::HistoryUnavailable {
			group: group.to_string(),
			reason,
		};

		let url = self.url_for(group).map_err(|e| unavailable(e.to_string()))?;
		debug!(target = "campulse.history", %url, "fetching history");

		let response = self.client.get(url).send().await.map_err(|e| unavailable(e.to_string()))?;
		if !response.status().is_success() {
			return Err(unavailable(format!("unexpected status {}", response.status())));
		}

		let items: Vec<serde_json::Value> = response
			.json()
			.await
			.map_err(|e| unavailable(format!("body is not a message array: {e}")))?;
		Ok(normalize(group, items))
	}
}

impl HistoryLoader for HttpHistoryLoader {
	fn fetch_history<'a>(&'a self, group: &'a str) -> TransportFuture<'a, Vec<ChatMessage>> {
		Box::pin(self.fetch(group))
	}
}

/// A chat group as listed for one of its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatGroup {
	pub id: i64,
	pub group_name: String,
	/// Other member of the project team, if the server names one.
	#[serde(default)]
	pub team_mate: Option<String>,
}

/// Decodes history items for `group`, skipping malformed or foreign entries.
pub fn normalize(group: &str, items: Vec<serde_json::Value>) -> Vec<ChatMessage> {
	let total = items.len();
	let messages: Vec<ChatMessage> = items
		.into_iter()
		.filter_map(|item| match ChatMessage::from_value(item) {
			Ok(message) => Some(message.with_default_group(group)),
			Err(e) => {
				warn!(target = "campulse.history", group, error = %e, "skipping malformed history item");
				None
			}
		})
		.filter(|message| message.group_name() == group)
		.collect();

	if messages.len() != total {
		debug!(target = "campulse.history", group, kept = messages.len(), total, "history items dropped");
	}
	messages
}

/// In-memory history with per-group failure and hold switches.
#[derive(Default)]
pub struct StaticHistory {
	inner: Mutex<StaticInner>,
}

#[derive(Default)]
struct StaticInner {
	groups: HashMap<String, Vec<ChatMessage>>,
	failing: HashSet<String>,
	holds: HashMap<String, Arc<Semaphore>>,
	requests: Vec<String>,
}

impl StaticHistory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_group(self, group: &str, messages: Vec<ChatMessage>) -> Self {
		self.inner.lock().groups.insert(group.to_string(), messages);
		self
	}

	/// Makes fetches for `group` fail with `HistoryUnavailable`.
	pub fn fail(&self, group: &str) {
		self.inner.lock().failing.insert(group.to_string());
	}

	/// Blocks fetches for `group` until [`release`](Self::release) is called.
	pub fn hold(&self, group: &str) {
		self.inner.lock().holds.insert(group.to_string(), Arc::new(Semaphore::new(0)));
	}

	/// Lets one held fetch for `group` complete.
	pub fn release(&self, group: &str) {
		if let Some(gate) = self.inner.lock().holds.get(group) {
			gate.add_permits(1);
		}
	}

	/// Groups requested so far, in order.
	pub fn requests(&self) -> Vec<String> {
		self.inner.lock().requests.clone()
	}

	async fn fetch(&self, group: &str) -> Result<Vec<ChatMessage>> {
		let gate = {
			let mut inner = self.inner.lock();
			inner.requests.push(group.to_string());
			inner.holds.get(group).cloned()
		};

		if let Some(gate) = gate {
			if let Ok(permit) = gate.acquire().await {
				permit.forget();
			}
		}

		let inner = self.inner.lock();
		if inner.failing.contains(group) {
			return Err(Error::HistoryUnavailable {
				group: group.to_string(),
				reason: "history service unavailable".to_string(),
			});
		}
		Ok(inner.groups.get(group).cloned().unwrap_or_default())
	}
}

impl HistoryLoader for StaticHistory {
	fn fetch_history<'a>(&'a self, group: &'a str) -> TransportFuture<'a, Vec<ChatMessage>> {
		Box::pin(self.fetch(group))
	}
}
