// campulse-chat: realtime session channel for group chat
//
// A `SessionChannel` keeps one group conversation live over a reconnecting
// WebSocket transport, seeding each group's log from the history service
// before subscribing to live traffic.

pub mod channel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod history;
pub mod reconnect;
pub mod transport;
pub mod wire;

pub use campulse_protocol::{ChatMessage, MessageKind};
pub use channel::{ChannelEvent, ChannelState, CloseCause, ConnectionState, MessageLog, SessionChannel};
pub use config::ChannelConfig;
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use history::{ChatGroup, HistoryLoader, HttpHistoryLoader, StaticHistory};
pub use reconnect::ReconnectPolicy;
pub use transport::{Connector, FakeConnector, FakeController, OpenOutcome, Transport, TransportEvent, TransportParts, WebSocketConnector};
pub use wire::WireFormat;
