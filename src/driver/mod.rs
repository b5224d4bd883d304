//! Runner for one voice connection.
//!
//! Each driver owns a background serializer task which in turn owns the
//! signalling channel, the send pacer, and the inbound demultiplexer for
//! one connection. The public handle only enqueues work; every mutation of
//! connection state happens on the serializer.

pub(crate) mod connection;
mod crypto;
pub(crate) mod tasks;

pub use crypto::CryptoMode;

use crate::{
    error::ConnectionError,
    events::EventSink,
    input::OpusStream,
    manager::RegistryHandle,
    speakers::SpeakerRegistry,
    Config,
    ConnectionInfo,
};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use flume::{r#async::RecvFut, Sender};
use futures::FutureExt;
use parking_lot::Mutex as PMutex;
use std::{sync::Arc, time::Duration};
use tasks::message::CoreMessage;

/// Lifecycle state of one voice connection.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConnectionStatus {
    /// No live signalling channel; the initial state.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Key exchange finished; audio may flow.
    Ready,
    /// Torn down for good; terminal.
    Destroyed,
}

/// Playback state of one voice connection.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PlayerStatus {
    /// Nothing is being transmitted.
    Idle,
    /// A source is being paced onto the wire.
    Playing,
    /// Playback is suspended, counters intact.
    Paused,
}

/// Connection state readable from outside the serializer task.
pub(crate) struct SharedState {
    status: PMutex<ConnectionStatus>,
    player: PMutex<PlayerStatus>,
    ping: PMutex<Option<Duration>>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            status: PMutex::new(ConnectionStatus::Disconnected),
            player: PMutex::new(PlayerStatus::Idle),
            ping: PMutex::new(None),
        }
    }
}

impl SharedState {
    pub(crate) fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    pub(crate) fn swap_status(&self, new: ConnectionStatus) -> ConnectionStatus {
        std::mem::replace(&mut *self.status.lock(), new)
    }

    pub(crate) fn player(&self) -> PlayerStatus {
        *self.player.lock()
    }

    pub(crate) fn swap_player(&self, new: PlayerStatus) -> PlayerStatus {
        std::mem::replace(&mut *self.player.lock(), new)
    }

    pub(crate) fn ping(&self) -> Option<Duration> {
        *self.ping.lock()
    }

    pub(crate) fn set_ping(&self, ping: Duration) {
        *self.ping.lock() = Some(ping);
    }
}

/// Handle to the serializer task driving one voice connection.
#[derive(Clone)]
pub(crate) struct Driver {
    sender: Sender<CoreMessage>,
}

impl Driver {
    pub(crate) fn new(
        config: Config,
        events: EventSink,
        shared: Arc<SharedState>,
        speakers: Arc<SpeakerRegistry>,
        registry: Option<RegistryHandle>,
    ) -> Self {
        let (tx, rx) = flume::unbounded();

        tasks::start(
            tasks::Core {
                config,
                shared,
                speakers,
                registry,
            },
            events,
            rx,
            tx.clone(),
        );

        Driver { sender: tx }
    }

    /// Connects to a voice server using the given negotiated metadata.
    ///
    /// The returned future resolves once the session key has arrived and
    /// audio may be played.
    pub(crate) fn connect(&self, info: ConnectionInfo) -> Connect {
        let (tx, rx) = flume::bounded(1);

        self.send(CoreMessage::ConnectWithResult(info, tx));

        Connect {
            inner: rx.into_recv_async(),
        }
    }

    pub(crate) fn play(&self, source: OpusStream) {
        self.send(CoreMessage::Play(source));
    }

    pub(crate) fn stop(&self) {
        self.send(CoreMessage::Stop);
    }

    pub(crate) fn pause(&self) {
        self.send(CoreMessage::Pause);
    }

    pub(crate) fn unpause(&self) {
        self.send(CoreMessage::Unpause);
    }

    pub(crate) fn destroy(&self) {
        self.send(CoreMessage::Destroy);
    }

    /// Sends a message to the serializer; a dead task means the connection
    /// was destroyed, which callers treat as a no-op.
    fn send(&self, message: CoreMessage) {
        drop(self.sender.send(message));
    }
}

/// Future returned by [`Call::connect`], resolving on session-key arrival.
///
/// [`Call::connect`]: crate::Call::connect
pub struct Connect {
    inner: RecvFut<'static, Result<(), ConnectionError>>,
}

impl Future for Connect {
    type Output = Result<(), ConnectionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.inner.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ConnectionError::AttemptDiscarded)),
            Poll::Pending => Poll::Pending,
        }
    }
}
