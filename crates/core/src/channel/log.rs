//! In-memory message log for the active group.

use campulse_protocol::ChatMessage;

/// Append-only, arrival-ordered log bound to one group at a time.
///
/// Messages for any other group are refused, so the log can never mix
/// conversations. Rebinding to a new group discards everything.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
	group: Option<String>,
	messages: Vec<ChatMessage>,
}

impl MessageLog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Clears the log and binds it to `group` (or to nothing).
	pub fn reset(&mut self, group: Option<&str>) {
		self.group = group.map(str::to_string);
		self.messages.clear();
	}

	/// Appends history in the order given, stamping missing group names.
	/// Returns how many entries were kept.
	pub fn seed(&mut self, history: Vec<ChatMessage>) -> usize {
		let before = self.messages.len();
		for message in history {
			self.append(message);
		}
		self.messages.len() - before
	}

	/// Appends one message; refuses messages for another group.
	pub fn append(&mut self, message: ChatMessage) -> bool {
		let Some(group) = self.group.as_deref() else {
			return false;
		};
		let message = message.with_default_group(group);
		if message.group_name() != group {
			return false;
		}
		self.messages.push(message);
		true
	}

	pub fn group(&self) -> Option<&str> {
		self.group.as_deref()
	}

	pub fn messages(&self) -> &[ChatMessage] {
		&self.messages
	}

	pub fn len(&self) -> usize {
		self.messages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.messages.is_empty()
	}
}
