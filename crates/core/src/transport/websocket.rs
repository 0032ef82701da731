//! WebSocket transport over `tokio-tungstenite`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use super::{Connector, Transport, TransportEvent, TransportFuture, TransportParts};
use crate::endpoint::Endpoint;
use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials real WebSocket endpoints (`ws://` and `wss://` via rustls).
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
	pub fn new() -> Self {
		Self
	}
}

impl Connector for WebSocketConnector {
	fn open<'a>(&'a self, endpoint: &'a Endpoint, sockjs: bool) -> TransportFuture<'a, TransportParts> {
		Box::pin(async move {
			let url = endpoint.connect_url(sockjs);
			debug!(target = "campulse.transport", %url, "dialing websocket");

			let (ws, _response) = connect_async(url.as_str()).await.map_err(|e| Error::Connect {
				endpoint: url.to_string(),
				reason: e.to_string(),
			})?;

			let (sink, stream) = ws.split();
			let (events_tx, events_rx) = mpsc::unbounded_channel();
			let open = Arc::new(AtomicBool::new(true));
			let reader = tokio::spawn(read_loop(stream, events_tx, Arc::clone(&open)));

			Ok(TransportParts {
				sender: Box::new(WebSocketTransport { sink, open, reader }),
				events: events_rx,
			})
		})
	}
}

struct WebSocketTransport {
	sink: SplitSink<WsStream, Message>,
	open: Arc<AtomicBool>,
	reader: JoinHandle<()>,
}

impl Transport for WebSocketTransport {
	fn send(&mut self, frame: String) -> TransportFuture<'_, ()> {
		Box::pin(async move {
			if !self.open.load(Ordering::Acquire) {
				return Err(Error::NotConnected);
			}
			trace!(target = "campulse.transport", len = frame.len(), "send frame");
			self.sink.send(Message::Text(frame.into())).await.map_err(|e| {
				debug!(target = "campulse.transport", error = %e, "websocket send failed");
				self.open.store(false, Ordering::Release);
				Error::NotConnected
			})
		})
	}

	fn close(&mut self) -> TransportFuture<'_, ()> {
		Box::pin(async move {
			if self.open.swap(false, Ordering::AcqRel) {
				if let Err(e) = self.sink.close().await {
					debug!(target = "campulse.transport", error = %e, "websocket close failed");
				}
			}
			Ok(())
		})
	}

	fn is_open(&self) -> bool {
		self.open.load(Ordering::Acquire)
	}
}

impl Drop for WebSocketTransport {
	fn drop(&mut self) {
		self.reader.abort();
	}
}

async fn read_loop(mut stream: SplitStream<WsStream>, events: mpsc::UnboundedSender<TransportEvent>, open: Arc<AtomicBool>) {
	while let Some(item) = stream.next().await {
		let event = match item {
			Ok(Message::Text(text)) => TransportEvent::Message(text.to_string()),
			Ok(Message::Binary(bytes)) => TransportEvent::Message(String::from_utf8_lossy(&bytes).into_owned()),
			Ok(Message::Close(frame)) => {
				open.store(false, Ordering::Release);
				let reason = frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
				let _ = events.send(TransportEvent::Closed(reason));
				return;
			}
			Ok(_) => continue,
			Err(e) => {
				open.store(false, Ordering::Release);
				let _ = events.send(TransportEvent::Error(e.to_string()));
				return;
			}
		};
		if events.send(event).is_err() {
			return;
		}
	}

	open.store(false, Ordering::Release);
	let _ = events.send(TransportEvent::Closed(None));
}
