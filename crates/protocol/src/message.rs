//! Group chat message as it travels over the live channel and the history API.
//!
//! ```json
//! {
//!   "groupName": "teamA",
//!   "sender": "asha",
//!   "content": "standup in 5",
//!   "messageType": "CHAT",
//!   "timestamp": "2024-03-01T09:55:00.000Z"
//! }
//! ```

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Kind of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
	#[default]
	Chat,
	Join,
	Leave,
}

/// Failure to decode a message payload.
#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("malformed message: {0}")]
	Json(#[from] serde_json::Error),
	#[error("message has an empty sender")]
	EmptySender,
}

/// One immutable chat message.
///
/// Fields are read through accessors; the only way to change a message is to
/// build a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
	#[serde(default, deserialize_with = "null_as_empty")]
	group_name: String,
	sender: String,
	content: String,
	#[serde(default)]
	message_type: MessageKind,
	timestamp: String,
}

impl ChatMessage {
	/// Builds a message with an explicit timestamp.
	pub fn new(kind: MessageKind, group: impl Into<String>, sender: impl Into<String>, content: impl Into<String>, timestamp: impl Into<String>) -> Self {
		Self {
			group_name: group.into(),
			sender: sender.into(),
			content: content.into(),
			message_type: kind,
			timestamp: timestamp.into(),
		}
	}

	/// A `CHAT` message stamped with the current time.
	pub fn chat(group: impl Into<String>, sender: impl Into<String>, content: impl Into<String>) -> Self {
		Self::new(MessageKind::Chat, group, sender, content, now_timestamp())
	}

	/// A `JOIN` notice for `sender`.
	pub fn join(group: impl Into<String>, sender: &str) -> Self {
		Self::new(MessageKind::Join, group, sender, format!("{sender} joined the chat"), now_timestamp())
	}

	/// A `LEAVE` notice for `sender`.
	pub fn leave(group: impl Into<String>, sender: &str) -> Self {
		Self::new(MessageKind::Leave, group, sender, format!("{sender} left the chat"), now_timestamp())
	}

	/// Decodes one message, rejecting payloads that do not match the schema.
	///
	/// `sender`, `content` and `timestamp` are required. `messageType` defaults
	/// to `CHAT` and a missing `groupName` decodes as empty.
	pub fn decode(text: &str) -> Result<Self, DecodeError> {
		let message: Self = serde_json::from_str(text)?;
		message.validated()
	}

	/// Decodes a message from an already parsed JSON value.
	pub fn from_value(value: serde_json::Value) -> Result<Self, DecodeError> {
		let message: Self = serde_json::from_value(value)?;
		message.validated()
	}

	fn validated(self) -> Result<Self, DecodeError> {
		if self.sender.trim().is_empty() {
			return Err(DecodeError::EmptySender);
		}
		Ok(self)
	}

	/// Serializes the message as a JSON body.
	pub fn encode(&self) -> String {
		serde_json::to_string(self).unwrap_or_default()
	}

	/// Returns this message with `group` filled in when the wire omitted it.
	pub fn with_default_group(mut self, group: &str) -> Self {
		if self.group_name.is_empty() {
			self.group_name = group.to_string();
		}
		self
	}

	pub fn group_name(&self) -> &str {
		&self.group_name
	}

	pub fn sender(&self) -> &str {
		&self.sender
	}

	pub fn content(&self) -> &str {
		&self.content
	}

	pub fn kind(&self) -> MessageKind {
		self.message_type
	}

	pub fn timestamp(&self) -> &str {
		&self.timestamp
	}
}

/// Current UTC time in the `2024-01-01T10:00:00.000Z` form the backend stores.
pub fn now_timestamp() -> String {
	Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
