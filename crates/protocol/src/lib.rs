//! Wire types for the Campulse group chat.
//!
//! This crate contains the serde-serializable message shape exchanged with the
//! chat backend and a small STOMP 1.2 text-frame codec. These types represent
//! the "protocol layer" - the shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: no I/O, no channel state
//! * 1:1 with the wire: field names and casing match what the backend sends
//! * Strict on decode: malformed input is an error, never a half-filled value
//!
//! Connection handling lives on top of these types in `campulse-chat`.

pub mod message;
pub mod stomp;

pub use message::*;
pub use stomp::{Command, Frame, FrameError};
