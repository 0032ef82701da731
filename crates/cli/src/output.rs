//! Rendering of chat messages and notices on stdout.

use campulse::{ChatGroup, ChatMessage, MessageKind};
use clap::ValueEnum;
use colored::Colorize;
use serde_json::json;

/// Output format for chat lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// `[timestamp] sender: content`
	#[default]
	Text,
	/// One JSON object per line
	Json,
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
		}
	}
}

#[derive(Debug, Clone)]
pub struct Printer {
	format: OutputFormat,
	me: Option<String>,
}

impl Printer {
	pub fn new(format: OutputFormat) -> Self {
		Self { format, me: None }
	}

	/// Highlights messages from `user`.
	pub fn with_user(mut self, user: &str) -> Self {
		self.me = Some(user.to_string());
		self
	}

	pub fn message(&self, message: &ChatMessage) {
		println!("{}", self.render_message(message));
	}

	pub fn group(&self, group: &ChatGroup) {
		println!("{}", self.render_group(group));
	}

	pub fn notice(&self, text: &str) {
		println!("{}", self.render_notice("notice", text));
	}

	pub fn error(&self, text: &str) {
		println!("{}", self.render_notice("error", text));
	}

	pub fn render_message(&self, message: &ChatMessage) -> String {
		match self.format {
			OutputFormat::Json => message.encode(),
			OutputFormat::Text => {
				let stamp = format!("[{}]", message.timestamp()).dimmed();
				match message.kind() {
					MessageKind::Join | MessageKind::Leave => format!("{stamp} {}", message.content().italic().dimmed()),
					MessageKind::Chat => {
						let sender = if self.me.as_deref() == Some(message.sender()) {
							message.sender().green().bold()
						} else {
							message.sender().cyan().bold()
						};
						format!("{stamp} {sender}: {}", message.content())
					}
				}
			}
		}
	}

	pub fn render_group(&self, group: &ChatGroup) -> String {
		match self.format {
			OutputFormat::Json => json!(group).to_string(),
			OutputFormat::Text => match &group.team_mate {
				Some(mate) => format!("{} {}", group.group_name.bold(), format!("(team: {mate})").dimmed()),
				None => group.group_name.bold().to_string(),
			},
		}
	}

	fn render_notice(&self, kind: &str, text: &str) -> String {
		match self.format {
			OutputFormat::Json => json!({ "event": kind, "text": text }).to_string(),
			OutputFormat::Text if kind == "error" => format!("{} {}", "!!".red().bold(), text.red()),
			OutputFormat::Text => format!("{} {}", "--".yellow(), text.yellow()),
		}
	}
}
