#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! Warbler is an async client core for realtime voice over a chat
//! platform's voice infrastructure, written in Rust. The library offers:
//!  * A signalling client over the voice gateway's persistent websocket:
//!    identify/resume, heartbeating, key delivery, and remote-speaker
//!    announcements.
//!  * A paced RTP sender which reads pre-encoded Opus frames from any
//!    async byte source and transmits one encrypted frame every 20 ms.
//!  * A per-speaker receive path which demultiplexes, decrypts, and
//!    republishes inbound audio as individual byte streams, with
//!    speak-start/speak-end edges derived from a silence timeout.
//!
//! The parent chat gateway stays out of scope: feed each [`Call`] the
//! session and server halves of a join via [`Voice::voice_state_update`]
//! and [`Voice::voice_server_update`], and the call handles the rest.
//!
//! ## Example
//! ```no_run
//! use warbler::{OpusStream, Voice};
//!
//! # async fn example(frames: Vec<u8>) {
//! let voice = Voice::new();
//! let call = voice.join_voice_channel(104_694_319_306_248_192u64, 41_771_983_423_143_937u64);
//!
//! // ...relay VoiceStateUpdate / VoiceServerUpdate into `voice`...
//!
//! call.lock().await.play(OpusStream::from(frames));
//! # }
//! ```

#![warn(clippy::pedantic, rust_2018_idioms)]
#![allow(
    // Allowed as they are too pedantic
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod events;
mod handler;
pub mod id;
pub(crate) mod info;
pub mod input;
mod manager;
pub mod model;
pub(crate) mod speakers;
mod ws;

pub use crate::{
    config::Config,
    driver::{Connect, ConnectionStatus, CryptoMode, PlayerStatus},
    error::{Error, JoinError, JoinResult},
    events::VoiceEvent,
    handler::Call,
    id::{GuildId, UserId},
    info::ConnectionInfo,
    input::OpusStream,
    manager::Voice,
    speakers::SpeakStream,
};
