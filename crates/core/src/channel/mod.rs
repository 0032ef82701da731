//! Session channel: one live group conversation over a reconnecting transport.
//!
//! A [`SessionChannel`] is a cheap, cloneable handle to a single task that
//! owns all channel state (transport link, subscription, message log, retry
//! timer). Every handle call, inbound frame, history result and reconnect
//! timer is processed one at a time by that task, so callers never observe a
//! half-applied group switch and no locking is needed.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --connect--> Connecting --open ok--> Ready <--reopen ok-- Suspended
//!                        |                    |  \                 ^  |
//!                        |                    |   `--link lost-----'  |
//!                        `--open failed-------+------> Suspended      |
//!                                             |                       |
//!                                       close()             policy exhausted
//!                                             v                       v
//!                                   Closed(Requested)        Closed(Exhausted)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let channel = SessionChannel::connect_websocket(config)?;
//! let mut events = channel.events();
//! channel.connect().await?;
//! channel.join_group("teamA").await?;
//! channel.send("hello").await?;
//! while let Ok(event) = events.recv().await {
//!     if let ChannelEvent::Message(message) = event {
//!         println!("{}: {}", message.sender(), message.content());
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use campulse_protocol::ChatMessage;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::history::{HistoryLoader, HttpHistoryLoader};
use crate::transport::{Connector, WebSocketConnector};

mod actor;
pub mod log;

pub use log::MessageLog;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Why a channel reached `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCause {
	/// The application called `close()` or dropped every handle.
	Requested,
	/// The reconnect policy ran out of attempts.
	Exhausted,
}

/// Session channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
	/// No transport attached yet.
	Idle,
	/// First open in flight.
	Connecting,
	/// Transport open; at most one group subscribed.
	Ready,
	/// Transport lost; the reconnect policy is retrying.
	Suspended,
	/// Terminal.
	Closed(CloseCause),
}

/// Coarse connection status for presentation (e.g. enabling a send button).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
	Reconnecting,
	Failed,
}

impl ChannelState {
	pub fn connection_state(self) -> ConnectionState {
		match self {
			ChannelState::Idle | ChannelState::Closed(CloseCause::Requested) => ConnectionState::Disconnected,
			ChannelState::Connecting => ConnectionState::Connecting,
			ChannelState::Ready => ConnectionState::Connected,
			ChannelState::Suspended => ConnectionState::Reconnecting,
			ChannelState::Closed(CloseCause::Exhausted) => ConnectionState::Failed,
		}
	}

	/// Outbound messages are only accepted in `Ready`.
	pub fn can_send(self) -> bool {
		self == ChannelState::Ready
	}

	pub fn is_closed(self) -> bool {
		matches!(self, ChannelState::Closed(_))
	}
}

impl fmt::Display for ChannelState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ChannelState::Idle => "idle",
			ChannelState::Connecting => "connecting",
			ChannelState::Ready => "ready",
			ChannelState::Suspended => "suspended",
			ChannelState::Closed(_) => "closed",
		})
	}
}

/// Observable channel activity, delivered to every [`SessionChannel::events`] receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
	StateChanged(ChannelState),
	/// History was seeded into the log for `group` (`count` may be zero when
	/// the loader failed).
	HistoryLoaded { group: String, count: usize },
	/// A live message was appended to the log.
	Message(ChatMessage),
	/// Non-fatal problems (`Parse`, `HistoryUnavailable`, `Server`, `Connect`)
	/// and the terminal `Exhausted`.
	Error(Error),
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
	Connect(Reply<()>),
	Join { group: String, reply: Reply<()> },
	Leave(Reply<()>),
	Send { content: String, reply: Reply<ChatMessage> },
	Close(Reply<()>),
	Messages(oneshot::Sender<Vec<ChatMessage>>),
	State(oneshot::Sender<ChannelState>),
	ActiveGroup(oneshot::Sender<Option<String>>),
}

/// Handle to a running session channel.
#[derive(Clone)]
pub struct SessionChannel {
	commands: mpsc::Sender<Command>,
	events: broadcast::Sender<ChannelEvent>,
}

impl SessionChannel {
	/// Validates `config` and starts the channel task in `Idle`.
	pub fn spawn(config: ChannelConfig, connector: Arc<dyn Connector>, history: Arc<dyn HistoryLoader>) -> Result<Self> {
		config.validate()?;

		let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
		let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

		let actor = actor::ChannelActor::new(config, connector, history, commands_rx, events_tx.clone());
		tokio::spawn(actor.run());

		Ok(Self {
			commands: commands_tx,
			events: events_tx,
		})
	}

	/// Channel over real WebSockets with HTTP history, both from `config`.
	pub fn connect_websocket(config: ChannelConfig) -> Result<Self> {
		let history = HttpHistoryLoader::new(config.history_url.clone(), config.history_timeout())?;
		Self::spawn(config, Arc::new(WebSocketConnector::new()), Arc::new(history))
	}

	/// New receiver for channel events. Only events after this call are seen.
	pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
		self.events.subscribe()
	}

	/// Opens the transport. Resolves once `Ready`, or with `Exhausted` when
	/// every retry failed.
	pub async fn connect(&self) -> Result<()> {
		self.request(Command::Connect).await
	}

	/// Switches the channel to `group`: drops the current subscription and
	/// log, seeds the log from history, then subscribes.
	pub async fn join_group(&self, group: &str) -> Result<()> {
		let group = group.trim();
		if group.is_empty() {
			return Err(Error::EmptyGroup);
		}
		let group = group.to_string();
		self.request(|reply| Command::Join { group, reply }).await
	}

	/// Announces LEAVE, unsubscribes and clears the log. The transport stays open.
	pub async fn leave_group(&self) -> Result<()> {
		self.request(Command::Leave).await
	}

	/// Publishes a chat message to the active group.
	///
	/// The message is not added to the local log; it appears there when the
	/// server echoes it back.
	pub async fn send(&self, content: &str) -> Result<ChatMessage> {
		let content = content.to_string();
		self.request(|reply| Command::Send { content, reply }).await
	}

	/// Sends a best-effort LEAVE, releases the subscription and transport, and
	/// moves to `Closed`. Idempotent.
	pub async fn close(&self) -> Result<()> {
		self.request(Command::Close).await
	}

	/// Snapshot of the message log.
	pub async fn messages(&self) -> Result<Vec<ChatMessage>> {
		self.query(Command::Messages).await
	}

	pub async fn state(&self) -> Result<ChannelState> {
		self.query(Command::State).await
	}

	pub async fn connection_state(&self) -> Result<ConnectionState> {
		Ok(self.state().await?.connection_state())
	}

	/// Group currently subscribed (or being joined).
	pub async fn active_group(&self) -> Result<Option<String>> {
		self.query(Command::ActiveGroup).await
	}

	async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
		let (tx, rx) = oneshot::channel();
		self.commands.send(build(tx)).await.map_err(|_| Error::ChannelGone)?;
		rx.await.map_err(|_| Error::ChannelGone)?
	}

	async fn query<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
		let (tx, rx) = oneshot::channel();
		self.commands.send(build(tx)).await.map_err(|_| Error::ChannelGone)?;
		rx.await.map_err(|_| Error::ChannelGone)
	}
}
