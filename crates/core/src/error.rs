//! Error taxonomy shared by every layer of the session channel.
//!
//! Payloads are plain strings so errors can be cloned into broadcast
//! [`ChannelEvent`](crate::channel::ChannelEvent)s as well as returned.

use campulse_protocol::{DecodeError, FrameError};
use thiserror::Error;

use crate::channel::ChannelState;

/// Errors surfaced by transports, the history loader and the session channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
	/// Transport open or protocol handshake failed (including timeout).
	#[error("failed to connect to {endpoint}: {reason}")]
	Connect { endpoint: String, reason: String },

	/// An open transport was closed or failed; the channel is reconnecting.
	#[error("transport lost: {0}")]
	Disconnected(String),

	/// Send or subscribe attempted without an open transport.
	#[error("transport is not connected")]
	NotConnected,

	/// The reconnect policy gave up. Terminal for the channel.
	#[error("reconnect gave up after {attempts} attempts")]
	Exhausted { attempts: u32 },

	/// History could not be fetched; the group starts with an empty log.
	#[error("history unavailable for group `{group}`: {reason}")]
	HistoryUnavailable { group: String, reason: String },

	/// The group list for a user could not be fetched.
	#[error("group list unavailable for `{user}`: {reason}")]
	GroupsUnavailable { user: String, reason: String },

	/// An inbound frame was malformed and dropped.
	#[error("dropped malformed frame: {0}")]
	Parse(String),

	/// Operation not allowed in the channel's current state.
	#[error("cannot {op} while {state}")]
	InvalidState { op: &'static str, state: ChannelState },

	/// A newer join started before this one finished loading history.
	#[error("join of group `{group}` superseded by a newer join")]
	Superseded { group: String },

	#[error("message content is empty")]
	EmptyContent,

	#[error("group name is empty")]
	EmptyGroup,

	/// The server reported an error frame.
	#[error("server error: {0}")]
	Server(String),

	#[error("configuration error: {0}")]
	Config(String),

	/// The channel task is gone (all handles dropped or it panicked).
	#[error("session channel has shut down")]
	ChannelGone,
}

impl Error {
	/// True for errors after which the channel accepts no further work.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Error::Exhausted { .. } | Error::ChannelGone)
	}
}

impl From<FrameError> for Error {
	fn from(err: FrameError) -> Self {
		Error::Parse(err.to_string())
	}
}

impl From<DecodeError> for Error {
	fn from(err: DecodeError) -> Self {
		Error::Parse(err.to_string())
	}
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
