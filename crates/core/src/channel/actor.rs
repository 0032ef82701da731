//! The task that owns a session channel's state.

use std::pin::Pin;
use std::sync::Arc;

use campulse_protocol::ChatMessage;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Sleep;
use tracing::{debug, error, info, trace, warn};

use super::{ChannelEvent, ChannelState, CloseCause, Command, MessageLog, Reply};
use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::history::HistoryLoader;
use crate::transport::{Connector, TransportEvent, TransportParts};
use crate::wire::{self, Inbound};

struct Subscription {
	id: String,
	group: String,
}

struct PendingJoin {
	generation: u64,
	group: String,
	reply: Reply<()>,
}

struct HistoryDone {
	generation: u64,
	result: Result<Vec<ChatMessage>>,
}

type OpenDone = (u64, Result<TransportParts>);

pub(super) struct ChannelActor {
	config: ChannelConfig,
	connector: Arc<dyn Connector>,
	history: Arc<dyn HistoryLoader>,
	commands: mpsc::Receiver<Command>,
	events: broadcast::Sender<ChannelEvent>,

	state: ChannelState,
	link: Option<TransportParts>,
	subscription: Option<Subscription>,
	/// Group to re-subscribe once a replacement transport opens.
	rejoin: Option<String>,
	log: MessageLog,
	next_subscription: u64,

	/// Bumped on every join, leave and link loss; history results carrying
	/// an older value are discarded.
	generation: u64,
	pending_join: Option<PendingJoin>,
	pending_connects: Vec<Reply<()>>,

	/// Retries made since the last successful open.
	attempts: u32,
	/// Identifies the open in flight; results from older opens are dropped.
	open_epoch: u64,
	retry: Option<Pin<Box<Sleep>>>,

	opens_tx: mpsc::UnboundedSender<OpenDone>,
	opens_rx: mpsc::UnboundedReceiver<OpenDone>,
	history_tx: mpsc::UnboundedSender<HistoryDone>,
	history_rx: mpsc::UnboundedReceiver<HistoryDone>,
}

impl ChannelActor {
	pub(super) fn new(
		config: ChannelConfig,
		connector: Arc<dyn Connector>,
		history: Arc<dyn HistoryLoader>,
		commands: mpsc::Receiver<Command>,
		events: broadcast::Sender<ChannelEvent>,
	) -> Self {
		let (opens_tx, opens_rx) = mpsc::unbounded_channel();
		let (history_tx, history_rx) = mpsc::unbounded_channel();
		Self {
			config,
			connector,
			history,
			commands,
			events,
			state: ChannelState::Idle,
			link: None,
			subscription: None,
			rejoin: None,
			log: MessageLog::new(),
			next_subscription: 0,
			generation: 0,
			pending_join: None,
			pending_connects: Vec::new(),
			attempts: 0,
			open_epoch: 0,
			retry: None,
			opens_tx,
			opens_rx,
			history_tx,
			history_rx,
		}
	}

	pub(super) async fn run(mut self) {
		debug!(target = "campulse.channel", user = %self.config.user, endpoint = %self.config.endpoint, "channel started");

		loop {
			tokio::select! {
				command = self.commands.recv() => match command {
					Some(command) => self.on_command(command).await,
					None => {
						self.close(CloseCause::Requested).await;
						break;
					}
				},
				Some((epoch, result)) = self.opens_rx.recv() => self.on_open(epoch, result).await,
				Some(done) = self.history_rx.recv() => self.on_history(done).await,
				event = next_link_event(&mut self.link) => self.on_link_event(event).await,
				_ = retry_elapsed(&mut self.retry) => {
					self.retry = None;
					self.start_open();
				}
			}
		}

		debug!(target = "campulse.channel", "channel stopped");
	}

	async fn on_command(&mut self, command: Command) {
		match command {
			Command::Connect(reply) => self.connect(reply),
			Command::Join { group, reply } => self.join(group, reply).await,
			Command::Leave(reply) => {
				let _ = reply.send(self.leave().await);
			}
			Command::Send { content, reply } => {
				let _ = reply.send(self.send(&content).await);
			}
			Command::Close(reply) => {
				self.close(CloseCause::Requested).await;
				let _ = reply.send(Ok(()));
			}
			Command::Messages(reply) => {
				let _ = reply.send(self.log.messages().to_vec());
			}
			Command::State(reply) => {
				let _ = reply.send(self.state);
			}
			Command::ActiveGroup(reply) => {
				let group = match &self.pending_join {
					Some(pending) => Some(pending.group.clone()),
					None => self.subscription.as_ref().map(|s| s.group.clone()).or_else(|| self.rejoin.clone()),
				};
				let _ = reply.send(group);
			}
		}
	}

	fn connect(&mut self, reply: Reply<()>) {
		match self.state {
			ChannelState::Idle => {
				self.pending_connects.push(reply);
				self.set_state(ChannelState::Connecting);
				self.start_open();
			}
			ChannelState::Connecting | ChannelState::Suspended => self.pending_connects.push(reply),
			ChannelState::Ready => {
				let _ = reply.send(Ok(()));
			}
			state @ ChannelState::Closed(_) => {
				let _ = reply.send(Err(Error::InvalidState { op: "connect", state }));
			}
		}
	}

	fn start_open(&mut self) {
		self.open_epoch += 1;
		let epoch = self.open_epoch;
		let connector = Arc::clone(&self.connector);
		let config = self.config.clone();
		let done = self.opens_tx.clone();

		debug!(target = "campulse.channel", epoch, attempt = self.attempts, "opening transport");
		tokio::spawn(async move {
			let result = wire::establish(connector.as_ref(), &config).await;
			let _ = done.send((epoch, result));
		});
	}

	async fn on_open(&mut self, epoch: u64, result: Result<TransportParts>) {
		if epoch != self.open_epoch || self.state.is_closed() {
			if let Ok(mut parts) = result {
				debug!(target = "campulse.channel", epoch, "discarding stale transport");
				let _ = parts.sender.close().await;
			}
			return;
		}

		match result {
			Ok(parts) => {
				info!(target = "campulse.channel", endpoint = %self.config.endpoint, retries = self.attempts, "transport open");
				self.link = Some(parts);
				self.attempts = 0;
				self.set_state(ChannelState::Ready);
				for reply in self.pending_connects.drain(..) {
					let _ = reply.send(Ok(()));
				}

				// A failed re-subscribe has already been handled as a lost link.
				if let Some(group) = self.rejoin.take() {
					if let Err(err) = self.subscribe(group.clone(), false).await {
						warn!(target = "campulse.channel", %group, error = %err, "re-subscribe failed");
						self.rejoin = Some(group);
					}
				}
			}
			Err(err) => {
				warn!(target = "campulse.channel", error = %err, attempt = self.attempts, "transport open failed");
				self.emit(ChannelEvent::Error(err));
				self.schedule_retry();
			}
		}
	}

	fn schedule_retry(&mut self) {
		match self.config.reconnect.check(self.attempts) {
			Ok(delay) => {
				self.attempts += 1;
				info!(
					target = "campulse.channel",
					attempt = self.attempts,
					max_attempts = self.config.reconnect.max_attempts,
					delay_ms = delay.as_millis() as u64,
					"reconnect scheduled"
				);
				self.set_state(ChannelState::Suspended);
				self.retry = Some(Box::pin(tokio::time::sleep(delay)));
			}
			Err(err) => self.fail(err),
		}
	}

	/// Terminal failure: the reconnect policy gave up.
	fn fail(&mut self, err: Error) {
		error!(target = "campulse.channel", error = %err, "giving up on transport");
		self.retry = None;
		self.subscription = None;
		self.rejoin = None;
		self.generation += 1;

		self.set_state(ChannelState::Closed(CloseCause::Exhausted));
		self.emit(ChannelEvent::Error(err.clone()));

		for reply in self.pending_connects.drain(..) {
			let _ = reply.send(Err(err.clone()));
		}
		if let Some(pending) = self.pending_join.take() {
			let _ = pending.reply.send(Err(err));
		}
	}

	async fn on_link_event(&mut self, event: Option<TransportEvent>) {
		match event {
			Some(TransportEvent::Message(text)) => self.on_frame(&text),
			Some(TransportEvent::Closed(reason)) => {
				self.on_link_lost(reason.unwrap_or_else(|| "closed by peer".to_string())).await;
			}
			Some(TransportEvent::Error(err)) => self.on_link_lost(err).await,
			None => self.on_link_lost("transport ended".to_string()).await,
		}
	}

	async fn on_link_lost(&mut self, reason: String) {
		warn!(target = "campulse.channel", %reason, "transport lost");
		if let Some(mut parts) = self.link.take() {
			let _ = parts.sender.close().await;
		}
		if let Some(subscription) = self.subscription.take() {
			self.rejoin = Some(subscription.group);
		}
		if let Some(pending) = self.pending_join.take() {
			self.generation += 1;
			let _ = pending.reply.send(Err(Error::NotConnected));
		}

		if self.state == ChannelState::Ready {
			self.emit(ChannelEvent::Error(Error::Disconnected(reason)));
			self.attempts = 0;
			self.schedule_retry();
		}
	}

	fn on_frame(&mut self, text: &str) {
		let inbound = match self.config.wire.decode(text) {
			Ok(inbound) => inbound,
			Err(err) => {
				warn!(target = "campulse.channel", error = %err, "dropping inbound frame");
				self.emit(ChannelEvent::Error(err));
				return;
			}
		};

		match inbound {
			Inbound::Message { subscription, body } => self.on_message(subscription.as_deref(), &body),
			Inbound::ServerError(message) => {
				warn!(target = "campulse.channel", %message, "server error frame");
				self.emit(ChannelEvent::Error(Error::Server(message)));
			}
			control => trace!(target = "campulse.channel", ?control, "control frame"),
		}
	}

	fn on_message(&mut self, subscription: Option<&str>, body: &str) {
		let Some(active) = &self.subscription else {
			debug!(target = "campulse.channel", "no active subscription; dropping message");
			return;
		};
		if subscription.is_some_and(|id| id != active.id) {
			debug!(target = "campulse.channel", ?subscription, active = %active.id, "message for stale subscription");
			return;
		}
		let group = active.group.clone();

		let message = match ChatMessage::decode(body) {
			Ok(message) => message.with_default_group(&group),
			Err(err) => {
				let err = Error::from(err);
				warn!(target = "campulse.channel", error = %err, "dropping inbound message");
				self.emit(ChannelEvent::Error(err));
				return;
			}
		};
		if message.group_name() != group {
			debug!(target = "campulse.channel", active = %group, other = message.group_name(), "message for another group");
			return;
		}

		trace!(target = "campulse.channel", %group, sender = message.sender(), "message received");
		self.log.append(message.clone());
		self.emit(ChannelEvent::Message(message));
	}

	async fn join(&mut self, group: String, reply: Reply<()>) {
		if self.state != ChannelState::Ready {
			let _ = reply.send(Err(Error::NotConnected));
			return;
		}

		if let Some(previous) = self.pending_join.take() {
			debug!(target = "campulse.channel", superseded = %previous.group, by = %group, "join superseded");
			let _ = previous.reply.send(Err(Error::Superseded { group: previous.group }));
		}

		self.release_subscription().await;
		self.log.reset(None);
		self.generation += 1;
		let generation = self.generation;

		info!(target = "campulse.channel", %group, generation, "joining group");
		let history = Arc::clone(&self.history);
		let done = self.history_tx.clone();
		let fetch_group = group.clone();
		tokio::spawn(async move {
			let result = history.fetch_history(&fetch_group).await;
			let _ = done.send(HistoryDone { generation, result });
		});

		self.pending_join = Some(PendingJoin { generation, group, reply });
	}

	async fn on_history(&mut self, done: HistoryDone) {
		let Some(pending) = self.pending_join.take_if(|pending| pending.generation == done.generation) else {
			debug!(target = "campulse.channel", generation = done.generation, current = self.generation, "discarding stale history");
			return;
		};
		let group = pending.group;

		self.log.reset(Some(&group));
		let count = match done.result {
			Ok(history) => self.log.seed(history),
			Err(err) => {
				warn!(target = "campulse.channel", %group, error = %err, "continuing with empty history");
				self.emit(ChannelEvent::Error(err));
				0
			}
		};
		debug!(target = "campulse.channel", %group, count, "history seeded");
		self.emit(ChannelEvent::HistoryLoaded {
			group: group.clone(),
			count,
		});

		let result = self.subscribe(group, self.config.announce_join).await;
		if result.is_err() {
			self.log.reset(None);
		}
		let _ = pending.reply.send(result);
	}

	async fn subscribe(&mut self, group: String, announce: bool) -> Result<()> {
		if self.link.is_none() {
			return Err(Error::NotConnected);
		}

		let id = format!("sub-{}", self.next_subscription);
		self.next_subscription += 1;
		let topic = self.config.topic_for(&group);
		if let Some(frame) = self.config.wire.subscribe(&id, &topic) {
			self.send_frame(frame).await?;
		}

		info!(target = "campulse.channel", %group, %topic, subscription = %id, "subscribed");
		self.subscription = Some(Subscription { id, group: group.clone() });

		if announce {
			let notice = ChatMessage::join(group, &self.config.user);
			self.publish_best_effort(&notice).await;
		}
		Ok(())
	}

	/// Sends on the live link. A link that refuses the frame is treated as
	/// lost even if its reader has not reported the close yet.
	async fn send_frame(&mut self, frame: String) -> Result<()> {
		let parts = self.link.as_mut().ok_or(Error::NotConnected)?;
		let result = parts.sender.send(frame).await;
		if let Err(err) = &result {
			self.on_link_lost(format!("send failed: {err}")).await;
		}
		result
	}

	/// Unsubscribes from the active group, if any. The log is left as is.
	async fn release_subscription(&mut self) {
		self.rejoin = None;
		let Some(subscription) = self.subscription.take() else {
			return;
		};

		if let (Some(frame), Some(parts)) = (self.config.wire.unsubscribe(&subscription.id), self.link.as_mut()) {
			if let Err(err) = parts.sender.send(frame).await {
				debug!(target = "campulse.channel", error = %err, "unsubscribe not delivered");
			}
		}
		info!(target = "campulse.channel", group = %subscription.group, "unsubscribed");
	}

	async fn send(&mut self, content: &str) -> Result<ChatMessage> {
		if self.state != ChannelState::Ready {
			return Err(Error::InvalidState {
				op: "send",
				state: self.state,
			});
		}
		let Some(group) = self.subscription.as_ref().map(|s| s.group.clone()) else {
			return Err(Error::InvalidState {
				op: "send without a group",
				state: self.state,
			});
		};
		if content.trim().is_empty() {
			return Err(Error::EmptyContent);
		}

		let message = ChatMessage::chat(group, self.config.user.clone(), content);
		let frame = self.config.wire.publish(&self.config.send_destination, &message);
		self.send_frame(frame).await?;

		debug!(target = "campulse.channel", group = message.group_name(), "message sent");
		Ok(message)
	}

	async fn leave(&mut self) -> Result<()> {
		if self.state != ChannelState::Ready {
			return Err(Error::NotConnected);
		}

		if let Some(pending) = self.pending_join.take() {
			let _ = pending.reply.send(Err(Error::Superseded { group: pending.group }));
		}
		if let Some(group) = self.subscription.as_ref().map(|s| s.group.clone()) {
			let notice = ChatMessage::leave(group, &self.config.user);
			self.publish_best_effort(&notice).await;
		}

		self.release_subscription().await;
		self.log.reset(None);
		self.generation += 1;
		Ok(())
	}

	async fn close(&mut self, cause: CloseCause) {
		if self.state.is_closed() {
			return;
		}
		info!(target = "campulse.channel", from = %self.state, "closing channel");

		self.retry = None;
		self.open_epoch += 1;
		self.generation += 1;

		if let Some(group) = self.subscription.as_ref().map(|s| s.group.clone()) {
			let notice = ChatMessage::leave(group, &self.config.user);
			self.publish_best_effort(&notice).await;
		}
		self.release_subscription().await;

		if let Some(mut parts) = self.link.take() {
			if let Some(frame) = self.config.wire.disconnect() {
				let _ = parts.sender.send(frame).await;
			}
			let _ = parts.sender.close().await;
		}

		let state = ChannelState::Closed(cause);
		for reply in self.pending_connects.drain(..) {
			let _ = reply.send(Err(Error::InvalidState { op: "connect", state }));
		}
		if let Some(pending) = self.pending_join.take() {
			let _ = pending.reply.send(Err(Error::NotConnected));
		}
		self.set_state(state);
	}

	/// Publishes a JOIN/LEAVE notice. Failures are logged and not retried.
	async fn publish_best_effort(&mut self, notice: &ChatMessage) {
		let Some(parts) = self.link.as_mut() else {
			return;
		};
		let frame = self.config.wire.publish(&self.config.send_destination, notice);
		if let Err(err) = parts.sender.send(frame).await {
			debug!(target = "campulse.channel", kind = ?notice.kind(), error = %err, "notice not delivered");
		}
	}

	fn set_state(&mut self, state: ChannelState) {
		if self.state == state {
			return;
		}
		info!(target = "campulse.channel", from = %self.state, to = %state, "state changed");
		self.state = state;
		self.emit(ChannelEvent::StateChanged(state));
	}

	fn emit(&self, event: ChannelEvent) {
		// No receivers is fine.
		let _ = self.events.send(event);
	}
}

async fn next_link_event(link: &mut Option<TransportParts>) -> Option<TransportEvent> {
	match link {
		Some(parts) => parts.events.recv().await,
		None => std::future::pending().await,
	}
}

async fn retry_elapsed(retry: &mut Option<Pin<Box<Sleep>>>) {
	match retry {
		Some(sleep) => sleep.as_mut().await,
		None => std::future::pending().await,
	}
}
