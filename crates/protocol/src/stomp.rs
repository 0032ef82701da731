//! STOMP 1.2 text frames as carried in WebSocket text messages.
//!
//! ```text
//! SEND
//! destination:/app/chat.sendMessage
//! content-type:application/json
//! content-length:74
//!
//! {"groupName":"teamA","sender":"asha",...}^@
//! ```
//!
//! Only the subset a chat client needs is covered: no transactions, no acks
//! beyond `auto`, heart-beats negotiated off.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// STOMP frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
	Connect,
	Stomp,
	Connected,
	Send,
	Subscribe,
	Unsubscribe,
	Disconnect,
	Message,
	Receipt,
	Error,
}

impl Command {
	pub fn as_str(self) -> &'static str {
		match self {
			Command::Connect => "CONNECT",
			Command::Stomp => "STOMP",
			Command::Connected => "CONNECTED",
			Command::Send => "SEND",
			Command::Subscribe => "SUBSCRIBE",
			Command::Unsubscribe => "UNSUBSCRIBE",
			Command::Disconnect => "DISCONNECT",
			Command::Message => "MESSAGE",
			Command::Receipt => "RECEIPT",
			Command::Error => "ERROR",
		}
	}

	/// CONNECT and CONNECTED headers are never escaped.
	fn escapes_headers(self) -> bool {
		!matches!(self, Command::Connect | Command::Stomp | Command::Connected)
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Command {
	type Err = FrameError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s {
			"CONNECT" => Command::Connect,
			"STOMP" => Command::Stomp,
			"CONNECTED" => Command::Connected,
			"SEND" => Command::Send,
			"SUBSCRIBE" => Command::Subscribe,
			"UNSUBSCRIBE" => Command::Unsubscribe,
			"DISCONNECT" => Command::Disconnect,
			"MESSAGE" => Command::Message,
			"RECEIPT" => Command::Receipt,
			"ERROR" => Command::Error,
			other => return Err(FrameError::UnknownCommand(other.to_string())),
		})
	}
}

/// Failure to decode a STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
	#[error("empty frame")]
	Empty,
	#[error("unknown STOMP command `{0}`")]
	UnknownCommand(String),
	#[error("malformed header line `{0}`")]
	MalformedHeader(String),
	#[error("invalid escape sequence in header `{0}`")]
	BadEscape(String),
	#[error("frame ended before the header block was terminated")]
	Truncated,
	#[error("invalid content-length `{0}`")]
	BadContentLength(String),
	#[error("body shorter than content-length {expected}")]
	ShortBody { expected: usize },
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
	pub command: Command,
	pub headers: Vec<(String, String)>,
	pub body: String,
}

impl Frame {
	pub fn new(command: Command) -> Self {
		Self {
			command,
			headers: Vec::new(),
			body: String::new(),
		}
	}

	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));
		self
	}

	pub fn with_body(mut self, body: impl Into<String>) -> Self {
		self.body = body.into();
		self
	}

	/// First value for `name`; repeated headers keep their first occurrence.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
	}

	/// CONNECT frame for `host` with heart-beats disabled.
	pub fn connect(host: &str, login: Option<&str>) -> Self {
		let frame = Frame::new(Command::Connect)
			.header("accept-version", "1.2")
			.header("host", host)
			.header("heart-beat", "0,0");
		match login {
			Some(login) => frame.header("login", login),
			None => frame,
		}
	}

	pub fn connected() -> Self {
		Frame::new(Command::Connected).header("version", "1.2").header("heart-beat", "0,0")
	}

	pub fn subscribe(id: &str, destination: &str) -> Self {
		Frame::new(Command::Subscribe)
			.header("id", id)
			.header("destination", destination)
			.header("ack", "auto")
	}

	pub fn unsubscribe(id: &str) -> Self {
		Frame::new(Command::Unsubscribe).header("id", id)
	}

	/// SEND frame carrying a JSON body.
	pub fn send(destination: &str, body: impl Into<String>) -> Self {
		Frame::new(Command::Send)
			.header("destination", destination)
			.header("content-type", "application/json")
			.with_body(body)
	}

	pub fn message(destination: &str, subscription: &str, message_id: &str, body: impl Into<String>) -> Self {
		Frame::new(Command::Message)
			.header("destination", destination)
			.header("subscription", subscription)
			.header("message-id", message_id)
			.header("content-type", "application/json")
			.with_body(body)
	}

	pub fn disconnect() -> Self {
		Frame::new(Command::Disconnect)
	}

	pub fn error(message: &str) -> Self {
		Frame::new(Command::Error).header("message", message)
	}

	/// Serializes the frame, NUL-terminated.
	pub fn encode(&self) -> String {
		let escape = self.command.escapes_headers();
		let mut out = String::with_capacity(32 + self.body.len());
		out.push_str(self.command.as_str());
		out.push('\n');
		for (name, value) in &self.headers {
			if escape {
				out.push_str(&escape_header(name));
				out.push(':');
				out.push_str(&escape_header(value));
			} else {
				out.push_str(name);
				out.push(':');
				out.push_str(value);
			}
			out.push('\n');
		}
		if !self.body.is_empty() && self.get("content-length").is_none() {
			out.push_str(&format!("content-length:{}\n", self.body.len()));
		}
		out.push('\n');
		out.push_str(&self.body);
		out.push('\0');
		out
	}

	/// Parses one frame, skipping heart-beat EOLs before the command.
	pub fn decode(text: &str) -> Result<Self, FrameError> {
		let text = text.trim_start_matches(['\r', '\n']);
		if text.is_empty() || text == "\0" {
			return Err(FrameError::Empty);
		}

		let mut offset = 0;
		let mut command = None;
		let mut headers = Vec::new();
		let mut terminated = false;

		for raw in text.split_inclusive('\n') {
			offset += raw.len();
			let line = raw.trim_end_matches('\n').trim_end_matches('\r');

			let Some(cmd) = command else {
				command = Some(line.parse::<Command>()?);
				continue;
			};

			if line.is_empty() {
				terminated = true;
				break;
			}

			let (name, value) = line.split_once(':').ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
			let (name, value) = if cmd.escapes_headers() {
				(unescape_header(name)?, unescape_header(value)?)
			} else {
				(name.to_string(), value.to_string())
			};
			headers.push((name, value));
		}

		let command = command.ok_or(FrameError::Empty)?;
		if !terminated {
			return Err(FrameError::Truncated);
		}

		let rest = &text[offset..];
		let content_length = headers.iter().find(|(k, _)| k == "content-length").map(|(_, v)| v.clone());
		let body = match content_length {
			Some(raw) => {
				let len: usize = raw.trim().parse().map_err(|_| FrameError::BadContentLength(raw.clone()))?;
				rest.get(..len).ok_or(FrameError::ShortBody { expected: len })?
			}
			None => rest.split('\0').next().unwrap_or_default(),
		};

		Ok(Self {
			command,
			headers,
			body: body.to_string(),
		})
	}
}

/// True when `text` is only heart-beat EOLs.
pub fn is_heartbeat(text: &str) -> bool {
	!text.is_empty() && text.chars().all(|c| c == '\n' || c == '\r')
}

fn escape_header(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	for c in value.chars() {
		match c {
			'\\' => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			'\r' => out.push_str("\\r"),
			':' => out.push_str("\\c"),
			other => out.push(other),
		}
	}
	out
}

fn unescape_header(value: &str) -> Result<String, FrameError> {
	let mut out = String::with_capacity(value.len());
	let mut chars = value.chars();
	while let Some(c) = chars.next() {
		if c != '\\' {
			out.push(c);
			continue;
		}
		match chars.next() {
			Some('\\') => out.push('\\'),
			Some('n') => out.push('\n'),
			Some('r') => out.push('\r'),
			Some('c') => out.push(':'),
			_ => return Err(FrameError::BadEscape(value.to_string())),
		}
	}
	Ok(out)
}
