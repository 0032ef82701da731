use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "campulse-chat")]
#[command(about = "Group chat from the terminal")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format
	#[arg(short, long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Config file (defaults to <config dir>/campulse/chat.json when present)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(flatten)]
	pub overrides: Overrides,

	#[command(subcommand)]
	pub command: Commands,
}

/// Flags applied on top of the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
	/// WebSocket endpoint (ws:// or wss://)
	#[arg(long, global = true, value_name = "URL")]
	pub endpoint: Option<String>,

	/// Base URL of the chat history API
	#[arg(long, global = true, value_name = "URL")]
	pub history_url: Option<String>,

	/// Name to send messages as
	#[arg(short, long, global = true)]
	pub user: Option<String>,

	/// Wire protocol spoken by the server
	#[arg(long, global = true, value_enum)]
	pub wire: Option<WireArg>,

	/// Dial the SockJS raw WebSocket path (<endpoint>/websocket)
	#[arg(long, global = true)]
	pub sockjs: bool,

	/// Reconnect attempts before giving up
	#[arg(long, global = true, value_name = "N")]
	pub max_attempts: Option<u32>,

	/// Delay between reconnect attempts
	#[arg(long, global = true, value_name = "MS")]
	pub retry_delay_ms: Option<u64>,

	/// Announce yourself to the group after joining
	#[arg(long, global = true)]
	pub announce_join: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Join a group and chat interactively (/join <group>, /leave, /quit)
	Chat { group: String },

	/// Print a group's message history
	#[command(alias = "hist")]
	History { group: String },

	/// List the groups you belong to
	Groups,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum WireArg {
	/// STOMP frames over WebSocket
	Stomp,
	/// One JSON message per WebSocket frame
	Json,
}

impl From<WireArg> for campulse::WireFormat {
	fn from(wire: WireArg) -> Self {
		match wire {
			WireArg::Stomp => campulse::WireFormat::Stomp,
			WireArg::Json => campulse::WireFormat::Json,
		}
	}
}
