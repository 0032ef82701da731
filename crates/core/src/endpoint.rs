//! Remote chat endpoint address.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Immutable WebSocket address of the chat server (`ws://` or `wss://`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint(Url);

impl Endpoint {
	pub fn parse(raw: &str) -> Result<Self> {
		let url = Url::parse(raw).map_err(|e| Error::Config(format!("invalid endpoint `{raw}`: {e}")))?;
		match url.scheme() {
			"ws" | "wss" => {}
			other => return Err(Error::Config(format!("endpoint `{raw}` must use ws:// or wss://, got {other}://"))),
		}
		if url.host_str().is_none() {
			return Err(Error::Config(format!("endpoint `{raw}` has no host")));
		}
		Ok(Self(url))
	}

	pub fn url(&self) -> &Url {
		&self.0
	}

	/// Value for the STOMP `host` header: `host[:port]`.
	pub fn host(&self) -> String {
		let host = self.0.host_str().unwrap_or_default();
		match self.0.port() {
			Some(port) => format!("{host}:{port}"),
			None => host.to_string(),
		}
	}

	/// URL to dial. SockJS servers expose raw WebSocket under `<path>/websocket`.
	pub fn connect_url(&self, sockjs: bool) -> Url {
		if !sockjs {
			return self.0.clone();
		}
		let mut url = self.0.clone();
		let path = format!("{}/websocket", url.path().trim_end_matches('/'));
		url.set_path(&path);
		url
	}
}

impl Default for Endpoint {
	fn default() -> Self {
		Self(Url::parse("ws://localhost:8081/ws-chat").expect("default endpoint is a valid URL"))
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.0.as_str())
	}
}

impl TryFrom<String> for Endpoint {
	type Error = Error;

	fn try_from(value: String) -> Result<Self> {
		Self::parse(&value)
	}
}

impl From<Endpoint> for String {
	fn from(endpoint: Endpoint) -> Self {
		endpoint.0.into()
	}
}
