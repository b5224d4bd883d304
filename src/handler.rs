use crate::{
    driver::{Connect, ConnectionStatus, Driver, PlayerStatus, SharedState},
    error::{JoinError, JoinResult},
    events::VoiceEvent,
    id::{GuildId, UserId},
    info::ConnectionProgress,
    input::OpusStream,
    manager::RegistryHandle,
    speakers::SpeakerRegistry,
    Config,
    ConnectionInfo,
};
use flume::Receiver;
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// One voice connection, i.e. this user's presence in one guild's call.
///
/// A call is created in the [`Disconnected`] state and comes alive once
/// the parent gateway has delivered both halves of the join: the session
/// half via [`update_state`] and the server half via [`update_server`].
/// When the second half lands the call connects by itself; [`connect`]
/// exists for manual retries and for waiting on readiness.
///
/// [`Disconnected`]: ConnectionStatus::Disconnected
/// [`update_state`]: Call::update_state
/// [`update_server`]: Call::update_server
/// [`connect`]: Call::connect
pub struct Call {
    guild_id: GuildId,
    user_id: UserId,

    progress: ConnectionProgress,
    driver: Driver,

    shared: Arc<SharedState>,
    events: Receiver<VoiceEvent>,
}

impl Call {
    pub(crate) fn new(
        guild_id: GuildId,
        user_id: UserId,
        config: Config,
        speakers: Arc<SpeakerRegistry>,
        registry: Option<RegistryHandle>,
    ) -> Self {
        let (sink, events) = crate::events::EventSink::new();
        let shared = Arc::new(SharedState::default());

        let driver = Driver::new(config, sink, Arc::clone(&shared), speakers, registry);

        Self {
            guild_id,
            user_id,
            progress: ConnectionProgress::new(guild_id, user_id),
            driver,
            shared,
            events,
        }
    }

    /// Creates a call outside any registry, with its own speaker table.
    ///
    /// Useful when the surrounding application tracks calls itself.
    #[must_use]
    pub fn standalone(guild_id: GuildId, user_id: UserId, config: Config) -> Self {
        Self::new(
            guild_id,
            user_id,
            config,
            Arc::new(SpeakerRegistry::default()),
            None,
        )
    }

    /// ID of the guild this call belongs to.
    #[must_use]
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// ID of the local user in this call.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Subscribes to this call's event stream.
    ///
    /// Every subscriber sees every event from the moment it subscribes.
    #[must_use]
    pub fn events(&self) -> Receiver<VoiceEvent> {
        self.events.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Current playback state.
    #[must_use]
    pub fn player_status(&self) -> PlayerStatus {
        self.shared.player()
    }

    /// Last measured signalling round-trip, if a heartbeat has been
    /// acknowledged.
    #[must_use]
    pub fn ping(&self) -> Option<Duration> {
        self.shared.ping()
    }

    /// Connection metadata, once both gateway updates have arrived.
    #[must_use]
    pub fn current_connection(&self) -> Option<ConnectionInfo> {
        self.progress.info()
    }

    /// Stores the session half of a join, connecting if it was the last
    /// missing piece.
    pub fn update_state(&mut self, session_id: String) {
        if self.progress.apply_state_update(session_id) {
            self.connect_if_idle();
        }
    }

    /// Stores the server half of a join, connecting if it was the last
    /// missing piece.
    pub fn update_server(&mut self, endpoint: String, token: String) {
        if self.progress.apply_server_update(endpoint, token) {
            self.connect_if_idle();
        }
    }

    fn connect_if_idle(&mut self) {
        if self.shared.status() == ConnectionStatus::Disconnected {
            if let Some(info) = self.progress.info() {
                debug!("Voice details complete for {:?}; connecting.", self.guild_id);
                // Fire-and-forget: failures surface on the event stream.
                drop(self.driver.connect(info));
            }
        }
    }

    /// Starts (or restarts) the connection handshake by hand.
    ///
    /// The returned future resolves once the session key has arrived,
    /// i.e. the instant [`play`] becomes safe.
    ///
    /// [`play`]: Call::play
    pub fn connect(&mut self) -> JoinResult<Connect> {
        match self.shared.status() {
            ConnectionStatus::Destroyed => Err(JoinError::Destroyed),
            _ => self
                .progress
                .info()
                .map(|info| self.driver.connect(info))
                .ok_or(JoinError::NoSession),
        }
    }

    /// Plays one pre-encoded Opus stream.
    ///
    /// If a source is already playing it is replaced on the next frame
    /// boundary without resetting pacing counters. Calling this before the
    /// connection is ready surfaces [`Error::NoUdpInfo`] on the event
    /// stream.
    ///
    /// [`Error::NoUdpInfo`]: crate::error::Error::NoUdpInfo
    pub fn play(&self, source: OpusStream) {
        self.driver.play(source);
    }

    /// Stops playback, transmitting the silence cue and speaking-off.
    pub fn stop(&self) {
        self.driver.stop();
    }

    /// Suspends playback without resetting pacing counters.
    pub fn pause(&self) {
        self.driver.pause();
    }

    /// Resumes playback where [`pause`] left off.
    ///
    /// [`pause`]: Call::pause
    pub fn unpause(&self) {
        self.driver.unpause();
    }

    /// Tears the call down for good: transports closed, timers cleared,
    /// player idled, and the call removed from its registry.
    ///
    /// Destroying an already-destroyed call does nothing.
    pub fn destroy(&self) {
        self.driver.destroy();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn starts_disconnected_with_no_session() {
        let mut call = Call::standalone(GuildId(1), UserId(2), Config::default());

        assert_eq!(call.status(), ConnectionStatus::Disconnected);
        assert_eq!(call.player_status(), PlayerStatus::Idle);
        assert!(call.ping().is_none());
        assert!(matches!(call.connect(), Err(JoinError::NoSession)));
    }

    #[tokio::test]
    async fn play_before_ready_surfaces_error() {
        let call = Call::standalone(GuildId(1), UserId(2), Config::default());
        let events = call.events();

        call.play(OpusStream::from(vec![0u8; 960]));

        match events.recv_async().await.unwrap() {
            VoiceEvent::Error(e) => {
                assert_eq!(e.to_string(), "cannot play audio without UDP info");
            },
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_terminal() {
        let mut call = Call::standalone(GuildId(1), UserId(2), Config::default());
        let events = call.events();

        call.destroy();

        match events.recv_async().await.unwrap() {
            VoiceEvent::StateChange { new, .. } => {
                assert_eq!(new, ConnectionStatus::Destroyed);
            },
            other => panic!("expected state change, got {other:?}"),
        }

        // Second destroy: no further events, state unchanged.
        call.destroy();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(call.status(), ConnectionStatus::Destroyed);

        assert!(matches!(call.connect(), Err(JoinError::Destroyed)));
    }
}
