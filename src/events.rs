//! Typed events emitted by each call.
//!
//! Rather than string-keyed callbacks, every call owns one broadcast
//! channel of [`VoiceEvent`]s; subscribe with [`Call::events`].
//!
//! [`Call::events`]: crate::Call::events

use crate::{
    driver::{ConnectionStatus, PlayerStatus},
    error::Error,
    id::UserId,
};
use flume::{Receiver, Sender};
use std::sync::Arc;

/// Observable state changes and faults on one call.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum VoiceEvent {
    /// The connection moved between lifecycle states.
    StateChange {
        /// State before the transition.
        old: ConnectionStatus,
        /// State after the transition.
        new: ConnectionStatus,
    },
    /// The player moved between playback states.
    PlayerStateChange {
        /// State before the transition.
        old: PlayerStatus,
        /// State after the transition.
        new: PlayerStatus,
    },
    /// A remote speaker's stream opened; audio will follow on
    /// [`Voice::get_speak_stream`].
    ///
    /// [`Voice::get_speak_stream`]: crate::Voice::get_speak_stream
    SpeakStart {
        /// The remote speaker.
        user_id: UserId,
        /// Their RTP synchronisation source.
        ssrc: u32,
    },
    /// A remote speaker fell silent and their stream closed.
    SpeakEnd {
        /// The remote speaker.
        user_id: UserId,
        /// Their RTP synchronisation source.
        ssrc: u32,
    },
    /// A fault occurred; see [`Error`] for recoverability.
    Error(Arc<Error>),
}

/// Shared producer handle for a call's event channel.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: Sender<VoiceEvent>,
}

impl EventSink {
    pub(crate) fn new() -> (Self, Receiver<VoiceEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    /// Fires an event; listeners having gone away is not an error.
    pub(crate) fn fire(&self, event: VoiceEvent) {
        drop(self.tx.send(event));
    }

    pub(crate) fn error(&self, error: Error) {
        self.fire(VoiceEvent::Error(Arc::new(error)));
    }
}
