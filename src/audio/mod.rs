//! # Audio Module
//!
//! Per-guild playback coordination for the bot.
//!
//! ## Architecture
//!
//! ### [`session`] - Guild Session
//! - One state machine per guild: queue, loop flag, current track
//! - Serializes every command for its guild
//! - Owns the voice connection and at most one running pipeline
//!
//! ### [`pipeline`] - Audio Pipeline
//! - Fetch stage ([`fetch`]) → transcoder subprocess → voice sink
//! - Cancellable mid-track; always tears down its subprocesses
//!
//! ### [`registry`] - Session Registry
//! - Guild id → session, created lazily, kept for the process lifetime
//!
//! ### [`supervisor`] - Idle/Disconnect Supervision
//! - Grace timers for an empty queue and for an empty voice channel
//!
//! ## Audio Format
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Bit Depth**: 16-bit signed integers, little endian
//! - **Channels**: Stereo (2 channels)

pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod session;
pub mod supervisor;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
