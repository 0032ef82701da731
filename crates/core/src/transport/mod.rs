//! Duplex text-frame transport to the chat server.
//!
//! A [`Connector`] opens a link and returns [`TransportParts`]: a sending half
//! implementing [`Transport`] and an event receiver. Resolving `open` is the
//! "opened" signal; everything afterwards arrives as a [`TransportEvent`].
//! The transport knows nothing about STOMP or chat messages.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::endpoint::Endpoint;
use crate::error::Result;

pub mod fake;
pub mod websocket;

pub use fake::{FakeConnector, FakeController, OpenOutcome};
pub use websocket::WebSocketConnector;

/// Boxed future returned by transport operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Something observed on an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
	/// One inbound text frame.
	Message(String),
	/// The link closed, with the peer's reason when one was given.
	Closed(Option<String>),
	/// The link failed; no further events follow.
	Error(String),
}

/// Sending half of an open link.
pub trait Transport: Send {
	/// Queues one text frame. Fails with `NotConnected` once the link is closed.
	fn send(&mut self, frame: String) -> TransportFuture<'_, ()>;

	/// Closes the link. Safe to call repeatedly.
	fn close(&mut self) -> TransportFuture<'_, ()>;

	fn is_open(&self) -> bool;
}

/// An open link split into its sending half and its event stream.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens links to an endpoint.
pub trait Connector: Send + Sync {
	/// Dials `endpoint`, resolving once the connection handshake completes.
	fn open<'a>(&'a self, endpoint: &'a Endpoint, sockjs: bool) -> TransportFuture<'a, TransportParts>;
}
