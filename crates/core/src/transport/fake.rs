//! In-memory connector for testing the session channel without a server.
//!
//! Each accepted open creates a link whose outbound frames are captured and
//! whose inbound side is fed by a [`FakeController`]. For STOMP traffic the
//! fake behaves like a tiny broker: it answers CONNECT with CONNECTED, tracks
//! SUBSCRIBE/UNSUBSCRIBE, and can echo SEND bodies back to live subscriptions.
//!
//! # Example
//!
//! ```ignore
//! let (connector, controller) = FakeConnectorBuilder::new().echo(true).build();
//! let channel = SessionChannel::spawn(config, Arc::new(connector), history);
//!
//! channel.connect().await?;
//! controller.deliver(r#"{"sender":"y","content":"yo","timestamp":"T2"}"#);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use campulse_protocol::{Command, Frame};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Connector, Transport, TransportEvent, TransportFuture, TransportParts};
use crate::endpoint::Endpoint;
use crate::error::Error;

/// What the next `open` call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
	Accept,
	/// Fail immediately with a connect error.
	Refuse,
	/// Never resolve; exercises the connect timeout.
	Hang,
}

/// Builder for creating fake connector instances.
pub struct FakeConnectorBuilder {
	echo: bool,
	auto_handshake: bool,
	fallback: OpenOutcome,
}

impl FakeConnectorBuilder {
	pub fn new() -> Self {
		Self {
			echo: false,
			auto_handshake: true,
			fallback: OpenOutcome::Accept,
		}
	}

	/// Echo every SEND back to live subscriptions (raw frames for JSON wire).
	pub fn echo(mut self, echo: bool) -> Self {
		self.echo = echo;
		self
	}

	/// Answer CONNECT with CONNECTED automatically.
	pub fn auto_handshake(mut self, enabled: bool) -> Self {
		self.auto_handshake = enabled;
		self
	}

	/// Outcome used once scripted outcomes run out.
	pub fn fallback(mut self, outcome: OpenOutcome) -> Self {
		self.fallback = outcome;
		self
	}

	pub fn build(self) -> (FakeConnector, FakeController) {
		let shared = Arc::new(Mutex::new(Shared {
			script: VecDeque::new(),
			fallback: self.fallback,
			echo: self.echo,
			auto_handshake: self.auto_handshake,
			opens: 0,
			link: None,
			sent: Vec::new(),
			next_message_id: 0,
		}));

		(
			FakeConnector {
				shared: Arc::clone(&shared),
			},
			FakeController { shared },
		)
	}
}

impl Default for FakeConnectorBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct Shared {
	script: VecDeque<OpenOutcome>,
	fallback: OpenOutcome,
	echo: bool,
	auto_handshake: bool,
	opens: u32,
	link: Option<Link>,
	sent: Vec<String>,
	next_message_id: u64,
}

struct Link {
	inbound: mpsc::UnboundedSender<TransportEvent>,
	open: Arc<AtomicBool>,
	subscriptions: Vec<(String, String)>,
}

impl Shared {
	fn message_id(&mut self) -> String {
		let id = self.next_message_id;
		self.next_message_id += 1;
		format!("fake-{id}")
	}

	fn deliver_to(&mut self, destination: Option<&str>, body: &str) {
		let targets: Vec<(String, String)> = match &self.link {
			Some(link) => link
				.subscriptions
				.iter()
				.filter(|(_, dest)| destination.is_none_or(|d| d == dest))
				.cloned()
				.collect(),
			None => return,
		};
		for (id, dest) in targets {
			let frame = Frame::message(&dest, &id, &self.message_id(), body).encode();
			if let Some(link) = &self.link {
				let _ = link.inbound.send(TransportEvent::Message(frame));
			}
		}
	}
}

/// Connector handing out in-memory links.
pub struct FakeConnector {
	shared: Arc<Mutex<Shared>>,
}

impl Connector for FakeConnector {
	fn open<'a>(&'a self, endpoint: &'a Endpoint, _sockjs: bool) -> TransportFuture<'a, TransportParts> {
		Box::pin(async move {
			let outcome = {
				let mut shared = self.shared.lock();
				shared.opens += 1;
				let fallback = shared.fallback;
				shared.script.pop_front().unwrap_or(fallback)
			};

			match outcome {
				OpenOutcome::Refuse => Err(Error::Connect {
					endpoint: endpoint.to_string(),
					reason: "connection refused".to_string(),
				}),
				OpenOutcome::Hang => std::future::pending().await,
				OpenOutcome::Accept => {
					let (inbound, events) = mpsc::unbounded_channel();
					let open = Arc::new(AtomicBool::new(true));
					self.shared.lock().link = Some(Link {
						inbound,
						open: Arc::clone(&open),
						subscriptions: Vec::new(),
					});
					Ok(TransportParts {
						sender: Box::new(FakeTransport {
							shared: Arc::clone(&self.shared),
							open,
						}),
						events,
					})
				}
			}
		})
	}
}

struct FakeTransport {
	shared: Arc<Mutex<Shared>>,
	open: Arc<AtomicBool>,
}

impl FakeTransport {
	fn on_frame(&self, shared: &mut Shared, text: &str) {
		let is_current = shared.link.as_ref().is_some_and(|l| Arc::ptr_eq(&l.open, &self.open));
		if !is_current {
			return;
		}

		let Ok(frame) = Frame::decode(text) else {
			if shared.echo {
				if let Some(link) = &shared.link {
					let _ = link.inbound.send(TransportEvent::Message(text.to_string()));
				}
			}
			return;
		};

		match frame.command {
			Command::Connect | Command::Stomp if shared.auto_handshake => {
				if let Some(link) = &shared.link {
					let _ = link.inbound.send(TransportEvent::Message(Frame::connected().encode()));
				}
			}
			Command::Subscribe => {
				if let (Some(id), Some(dest), Some(link)) = (frame.get("id"), frame.get("destination"), shared.link.as_mut()) {
					link.subscriptions.push((id.to_string(), dest.to_string()));
				}
			}
			Command::Unsubscribe => {
				if let (Some(id), Some(link)) = (frame.get("id"), shared.link.as_mut()) {
					link.subscriptions.retain(|(sub, _)| sub != id);
				}
			}
			Command::Send if shared.echo => shared.deliver_to(None, &frame.body),
			_ => {}
		}
	}
}

impl Transport for FakeTransport {
	fn send(&mut self, frame: String) -> TransportFuture<'_, ()> {
		Box::pin(async move {
			if !self.open.load(Ordering::Acquire) {
				return Err(Error::NotConnected);
			}
			let mut shared = self.shared.lock();
			self.on_frame(&mut shared, &frame);
			shared.sent.push(frame);
			Ok(())
		})
	}

	fn close(&mut self) -> TransportFuture<'_, ()> {
		Box::pin(async move {
			self.open.store(false, Ordering::Release);
			Ok(())
		})
	}

	fn is_open(&self) -> bool {
		self.open.load(Ordering::Acquire)
	}
}

/// Controller for scripting opens, injecting frames and inspecting traffic.
#[derive(Clone)]
pub struct FakeController {
	shared: Arc<Mutex<Shared>>,
}

impl FakeController {
	/// Queues outcomes for the next `open` calls, in order.
	pub fn script(&self, outcomes: impl IntoIterator<Item = OpenOutcome>) {
		self.shared.lock().script.extend(outcomes);
	}

	/// Outcome used once scripted outcomes run out.
	pub fn set_fallback(&self, outcome: OpenOutcome) {
		self.shared.lock().fallback = outcome;
	}

	pub fn set_echo(&self, echo: bool) {
		self.shared.lock().echo = echo;
	}

	/// Number of `open` calls so far, successful or not.
	pub fn opens(&self) -> u32 {
		self.shared.lock().opens
	}

	/// True while the most recent link is open.
	pub fn is_linked(&self) -> bool {
		self.shared.lock().link.as_ref().is_some_and(|l| l.open.load(Ordering::Acquire))
	}

	/// Injects a raw text frame into the current link.
	pub fn inject(&self, text: impl Into<String>) {
		if let Some(link) = &self.shared.lock().link {
			let _ = link.inbound.send(TransportEvent::Message(text.into()));
		}
	}

	/// Sends a MESSAGE frame with `body` to every live subscription.
	pub fn deliver(&self, body: &str) {
		self.shared.lock().deliver_to(None, body);
	}

	/// Sends a MESSAGE frame with `body` to subscriptions on `destination`.
	pub fn publish(&self, destination: &str, body: &str) {
		self.shared.lock().deliver_to(Some(destination), body);
	}

	/// Closes the current link from the server side.
	pub fn drop_link(&self, reason: Option<&str>) {
		if let Some(link) = self.shared.lock().link.take() {
			link.open.store(false, Ordering::Release);
			let _ = link.inbound.send(TransportEvent::Closed(reason.map(str::to_string)));
		}
	}

	/// Fails the current link with a transport error.
	pub fn fail_link(&self, error: &str) {
		if let Some(link) = self.shared.lock().link.take() {
			link.open.store(false, Ordering::Release);
			let _ = link.inbound.send(TransportEvent::Error(error.to_string()));
		}
	}

	/// Breaks the current link without notifying its reader, like a dead
	/// pipe noticed only on the next write. Sends fail with `NotConnected`.
	pub fn sever(&self) {
		if let Some(link) = &self.shared.lock().link {
			link.open.store(false, Ordering::Release);
		}
	}

	/// Live subscriptions on the current link as `(id, destination)`.
	pub fn subscriptions(&self) -> Vec<(String, String)> {
		self.shared.lock().link.as_ref().map(|l| l.subscriptions.clone()).unwrap_or_default()
	}

	/// Every frame sent so far, across all links.
	pub fn sent(&self) -> Vec<String> {
		self.shared.lock().sent.clone()
	}

	/// Takes all sent frames, clearing the buffer.
	pub fn take_sent(&self) -> Vec<String> {
		std::mem::take(&mut self.shared.lock().sent)
	}

	/// Sent frames that decode as STOMP with the given command.
	pub fn sent_frames(&self, command: Command) -> Vec<Frame> {
		self.sent()
			.iter()
			.filter_map(|text| Frame::decode(text).ok())
			.filter(|frame| frame.command == command)
			.collect()
	}
}
