use crate::{
    error::{JoinError, JoinResult},
    handler::Call,
    id::{GuildId, UserId},
    speakers::{SpeakStream, SpeakerRegistry},
    Config,
};
use dashmap::DashMap;
use parking_lot::RwLock as PRwLock;
use std::sync::Arc;
use tokio::sync::Mutex;

type CallKey = (UserId, GuildId);
type CallMap = Arc<DashMap<CallKey, Arc<Mutex<Call>>>>;

/// Removes one call's registry entry when it is destroyed, regardless of
/// which side (handle or driver) initiated the teardown.
pub(crate) struct RegistryHandle {
    calls: CallMap,
    key: CallKey,
}

impl RegistryHandle {
    pub(crate) fn remove(&self) {
        self.calls.remove(&self.key);
    }
}

/// The root voice context: owns every [`Call`] and the shared table of
/// remote speakers.
///
/// One of these per process (or per test) is expected; nothing in the
/// crate is a true global, so independent instances stay independent.
pub struct Voice {
    calls: CallMap,
    speakers: Arc<SpeakerRegistry>,
    config: PRwLock<Config>,
}

impl Voice {
    /// Creates a voice context with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(Config::default())
    }

    /// Creates a voice context using the given configuration for every
    /// call it makes.
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self {
            calls: Arc::new(DashMap::new()),
            speakers: Arc::new(SpeakerRegistry::default()),
            config: PRwLock::new(config),
        }
    }

    /// Sets the configuration used by calls created after this point.
    pub fn set_config(&self, new_config: Config) {
        let mut config = self.config.write();
        *config = new_config;
    }

    /// Retrieves the [`Call`] for the given user in the given guild, if
    /// one is registered.
    pub fn get<U, G>(&self, user_id: U, guild_id: G) -> Option<Arc<Mutex<Call>>>
    where
        U: Into<UserId>,
        G: Into<GuildId>,
    {
        self.calls
            .get(&(user_id.into(), guild_id.into()))
            .map(|entry| Arc::clone(&entry))
    }

    /// Registers (or retrieves) a call for the given user and guild.
    ///
    /// The call starts disconnected; it connects once
    /// [`voice_state_update`] and [`voice_server_update`] have both
    /// delivered their halves of the join.
    ///
    /// [`voice_state_update`]: Voice::voice_state_update
    /// [`voice_server_update`]: Voice::voice_server_update
    pub fn join_voice_channel<U, G>(&self, user_id: U, guild_id: G) -> Arc<Mutex<Call>>
    where
        U: Into<UserId>,
        G: Into<GuildId>,
    {
        let key = (user_id.into(), guild_id.into());

        self.calls
            .entry(key)
            .or_insert_with(|| {
                let call = Call::new(
                    key.1,
                    key.0,
                    self.config.read().clone(),
                    Arc::clone(&self.speakers),
                    Some(RegistryHandle {
                        calls: Arc::clone(&self.calls),
                        key,
                    }),
                );

                Arc::new(Mutex::new(call))
            })
            .clone()
    }

    /// Forwards the session half of a join from the parent gateway.
    pub async fn voice_state_update<U, G>(&self, user_id: U, guild_id: G, session_id: String)
    where
        U: Into<UserId>,
        G: Into<GuildId>,
    {
        if let Some(call) = self.get(user_id, guild_id) {
            call.lock().await.update_state(session_id);
        }
    }

    /// Forwards the server half of a join from the parent gateway.
    pub async fn voice_server_update<U, G>(
        &self,
        user_id: U,
        guild_id: G,
        token: String,
        endpoint: String,
    ) where
        U: Into<UserId>,
        G: Into<GuildId>,
    {
        if let Some(call) = self.get(user_id, guild_id) {
            call.lock().await.update_server(endpoint, token);
        }
    }

    /// A remote speaker's live stream, while they are speaking.
    pub fn get_speak_stream(&self, ssrc: u32) -> Option<SpeakStream> {
        self.speakers.get(ssrc)
    }

    /// Destroys the call for the given user and guild and removes it from
    /// the registry.
    pub async fn destroy<U, G>(&self, user_id: U, guild_id: G) -> JoinResult<()>
    where
        U: Into<UserId>,
        G: Into<GuildId>,
    {
        let key = (user_id.into(), guild_id.into());

        if let Some((_, call)) = self.calls.remove(&key) {
            call.lock().await.destroy();
            Ok(())
        } else {
            Err(JoinError::NoCall)
        }
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn one_call_per_user_guild_pair() {
        let voice = Voice::new();

        let a = voice.join_voice_channel(1u64, 10u64);
        let b = voice.join_voice_channel(1u64, 10u64);
        let c = voice.join_voice_channel(2u64, 10u64);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn destroy_removes_registration() {
        let voice = Voice::new();

        voice.join_voice_channel(1u64, 10u64);
        assert!(voice.get(1u64, 10u64).is_some());

        voice.destroy(1u64, 10u64).await.unwrap();
        assert!(voice.get(1u64, 10u64).is_none());

        assert!(matches!(
            voice.destroy(1u64, 10u64).await,
            Err(JoinError::NoCall)
        ));
    }

    #[tokio::test]
    async fn updates_for_unknown_calls_are_ignored() {
        let voice = Voice::new();

        voice.voice_state_update(1u64, 10u64, "sess".into()).await;
        voice
            .voice_server_update(1u64, 10u64, "tok".into(), "endpoint.example".into())
            .await;

        assert!(voice.get(1u64, 10u64).is_none());
    }

    #[tokio::test]
    async fn updates_accumulate_on_registered_call() {
        let voice = Voice::new();
        let call = voice.join_voice_channel(1u64, 10u64);

        voice.voice_state_update(1u64, 10u64, "sess".into()).await;
        assert!(call.lock().await.current_connection().is_none());

        voice
            .voice_server_update(1u64, 10u64, "tok".into(), "endpoint.example".into())
            .await;

        let info = call
            .lock()
            .await
            .current_connection()
            .expect("both halves have arrived");
        assert_eq!(info.session_id, "sess");
        assert_eq!(info.guild_id, GuildId(10));
        assert_eq!(info.user_id, UserId(1));
    }
}
