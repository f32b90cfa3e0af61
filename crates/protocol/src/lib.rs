//! Wire protocol for the rentchat realtime channel.
//!
//! STOMP 1.2 framing over a text transport, plus the destination naming
//! scheme and the JSON payloads exchanged by the chat features.

pub mod constants;
pub mod destinations;
pub mod frame;
pub mod messages;

pub use frame::{Command, Frame, FrameError, parse_frames};
