//! Maps channel operations onto wire frames for the two server variants.
//!
//! * [`WireFormat::Stomp`]: STOMP 1.2 over WebSocket text frames. Topics are
//!   real broker subscriptions and MESSAGE frames carry the subscription id.
//! * [`WireFormat::Json`]: raw WebSocket where every text frame is one chat
//!   message. There is no handshake and no subscribe frame; routing is by the
//!   message's `groupName`.

use campulse_protocol::stomp::is_heartbeat;
use campulse_protocol::{ChatMessage, Command, Frame};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::transport::{Connector, TransportEvent, TransportParts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
	#[default]
	Stomp,
	Json,
}

/// Decoded server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
	Connected,
	/// A chat payload; `subscription` is set for STOMP MESSAGE frames.
	Message { subscription: Option<String>, body: String },
	ServerError(String),
	Receipt,
	Heartbeat,
}

impl WireFormat {
	pub fn decode(self, text: &str) -> Result<Inbound> {
		match self {
			WireFormat::Stomp => {
				if is_heartbeat(text) {
					return Ok(Inbound::Heartbeat);
				}
				let frame = Frame::decode(text)?;
				match frame.command {
					Command::Connected => Ok(Inbound::Connected),
					Command::Message => Ok(Inbound::Message {
						subscription: frame.get("subscription").map(str::to_string),
						body: frame.body,
					}),
					Command::Error => {
						let message = frame.get("message").map(str::to_string).unwrap_or(frame.body);
						Ok(Inbound::ServerError(message))
					}
					Command::Receipt => Ok(Inbound::Receipt),
					other => Err(Error::Parse(format!("unexpected {other} frame from server"))),
				}
			}
			WireFormat::Json => {
				if text.trim().is_empty() {
					return Ok(Inbound::Heartbeat);
				}
				Ok(Inbound::Message {
					subscription: None,
					body: text.to_string(),
				})
			}
		}
	}

	/// Frame binding subscription `id` to `topic`, if this wire has one.
	pub fn subscribe(self, id: &str, topic: &str) -> Option<String> {
		match self {
			WireFormat::Stomp => Some(Frame::subscribe(id, topic).encode()),
			WireFormat::Json => None,
		}
	}

	pub fn unsubscribe(self, id: &str) -> Option<String> {
		match self {
			WireFormat::Stomp => Some(Frame::unsubscribe(id).encode()),
			WireFormat::Json => None,
		}
	}

	/// Frame carrying `message` to the server's send destination.
	pub fn publish(self, destination: &str, message: &ChatMessage) -> String {
		match self {
			WireFormat::Stomp => Frame::send(destination, message.encode()).encode(),
			WireFormat::Json => message.encode(),
		}
	}

	pub fn disconnect(self) -> Option<String> {
		match self {
			WireFormat::Stomp => Some(Frame::disconnect().encode()),
			WireFormat::Json => None,
		}
	}
}

/// Opens a transport and completes the protocol handshake within the
/// configured connect timeout.
pub async fn establish(connector: &dyn Connector, config: &ChannelConfig) -> Result<TransportParts> {
	let endpoint = config.endpoint.to_string();
	let timeout = config.connect_timeout();

	let attempt = async {
		let mut parts = connector.open(&config.endpoint, config.sockjs).await?;
		if let Err(reason) = handshake(&mut parts, config).await {
			let _ = parts.sender.close().await;
			return Err(Error::Connect {
				endpoint: endpoint.clone(),
				reason,
			});
		}
		Ok(parts)
	};

	match tokio::time::timeout(timeout, attempt).await {
		Ok(result) => result,
		Err(_) => Err(Error::Connect {
			endpoint,
			reason: format!("timed out after {}ms", timeout.as_millis()),
		}),
	}
}

async fn handshake(parts: &mut TransportParts, config: &ChannelConfig) -> std::result::Result<(), String> {
	if config.wire != WireFormat::Stomp {
		return Ok(());
	}

	let connect = Frame::connect(&config.endpoint.host(), None).encode();
	parts.sender.send(connect).await.map_err(|e| e.to_string())?;

	loop {
		match parts.events.recv().await {
			Some(TransportEvent::Message(text)) => match WireFormat::Stomp.decode(&text) {
				Ok(Inbound::Connected) => {
					debug!(target = "campulse.transport", "stomp session established");
					return Ok(());
				}
				Ok(Inbound::ServerError(message)) => return Err(format!("server rejected handshake: {message}")),
				Ok(_) => continue,
				Err(e) => return Err(e.to_string()),
			},
			Some(TransportEvent::Closed(reason)) => {
				return Err(format!("closed during handshake{}", reason.map(|r| format!(": {r}")).unwrap_or_default()));
			}
			Some(TransportEvent::Error(e)) => return Err(e),
			None => return Err("transport ended during handshake".to_string()),
		}
	}
}
