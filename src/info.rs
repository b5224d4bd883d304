use crate::id::{GuildId, UserId};
use std::fmt;

/// Accumulates the two halves of a join handed down by the parent gateway,
/// becoming `Complete` once both the session and the server half have
/// arrived.
#[derive(Clone, Debug)]
pub(crate) enum ConnectionProgress {
    Complete(ConnectionInfo),
    Incomplete(Partial),
}

impl ConnectionProgress {
    pub(crate) fn new(guild_id: GuildId, user_id: UserId) -> Self {
        ConnectionProgress::Incomplete(Partial {
            guild_id,
            user_id,
            token: None,
            endpoint: None,
            session_id: None,
        })
    }

    pub(crate) fn info(&self) -> Option<ConnectionInfo> {
        if let Self::Complete(c) = self {
            Some(c.clone())
        } else {
            None
        }
    }

    /// Applies a session update, returning whether the connection should be
    /// (re)established as a result.
    pub(crate) fn apply_state_update(&mut self, session_id: String) -> bool {
        match self {
            Self::Complete(c) => {
                let should_reconn = c.session_id != session_id;
                c.session_id = session_id;
                should_reconn
            },
            Self::Incomplete(i) => i
                .apply_state_update(session_id)
                .map(|info| {
                    *self = Self::Complete(info);
                })
                .is_some(),
        }
    }

    /// Applies a server update, returning whether the connection should be
    /// (re)established as a result.
    pub(crate) fn apply_server_update(&mut self, endpoint: String, token: String) -> bool {
        match self {
            Self::Complete(c) => {
                let should_reconn = c.endpoint != endpoint || c.token != token;

                c.endpoint = endpoint;
                c.token = token;

                should_reconn
            },
            Self::Incomplete(i) => i
                .apply_server_update(endpoint, token)
                .map(|info| {
                    *self = Self::Complete(info);
                })
                .is_some(),
        }
    }
}

/// Parameters needed to open a connection to a voice server.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct ConnectionInfo {
    /// URL of the voice websocket gateway server assigned to this call.
    pub endpoint: String,
    /// ID of the target guild.
    pub guild_id: GuildId,
    /// Unique string describing this session for validation/authentication purposes.
    pub session_id: String,
    /// Ephemeral secret used to validate the above session.
    pub token: String,
    /// ID of the local user.
    pub user_id: UserId,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("endpoint", &self.endpoint)
            .field("guild_id", &self.guild_id)
            .field("session_id", &self.session_id)
            .field("token", &"<secret>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct Partial {
    pub endpoint: Option<String>,
    pub guild_id: GuildId,
    pub session_id: Option<String>,
    pub token: Option<String>,
    pub user_id: UserId,
}

impl fmt::Debug for Partial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partial")
            .field("endpoint", &self.endpoint)
            .field("guild_id", &self.guild_id)
            .field("session_id", &self.session_id)
            .field("token_is_some", &self.token.is_some())
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl Partial {
    fn finalise(&mut self) -> Option<ConnectionInfo> {
        if self.endpoint.is_some() && self.session_id.is_some() && self.token.is_some() {
            let endpoint = self.endpoint.take().unwrap();
            let session_id = self.session_id.take().unwrap();
            let token = self.token.take().unwrap();

            Some(ConnectionInfo {
                endpoint,
                session_id,
                token,
                guild_id: self.guild_id,
                user_id: self.user_id,
            })
        } else {
            None
        }
    }

    fn apply_state_update(&mut self, session_id: String) -> Option<ConnectionInfo> {
        self.session_id = Some(session_id);

        self.finalise()
    }

    fn apply_server_update(&mut self, endpoint: String, token: String) -> Option<ConnectionInfo> {
        self.endpoint = Some(endpoint);
        self.token = Some(token);

        self.finalise()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn progress() -> ConnectionProgress {
        ConnectionProgress::new(GuildId(1), UserId(2))
    }

    #[test]
    fn neither_half_is_incomplete() {
        let mut p = progress();
        assert!(!p.apply_state_update("sess".into()));
        assert!(p.info().is_none());
    }

    #[test]
    fn both_halves_complete_in_either_order() {
        let mut p = progress();
        assert!(!p.apply_state_update("sess".into()));
        assert!(p.apply_server_update("eu-west42.example.gg".into(), "tok".into()));

        let info = p.info().expect("progress should be complete");
        assert_eq!(info.endpoint, "eu-west42.example.gg");
        assert_eq!(info.session_id, "sess");
        assert_eq!(info.token, "tok");

        let mut p = progress();
        assert!(!p.apply_server_update("eu-west42.example.gg".into(), "tok".into()));
        assert!(p.apply_state_update("sess".into()));
        assert!(p.info().is_some());
    }

    #[test]
    fn session_change_on_complete_requests_reconnect() {
        let mut p = progress();
        p.apply_state_update("sess".into());
        p.apply_server_update("host".into(), "tok".into());

        assert!(!p.apply_state_update("sess".into()));
        assert!(p.apply_state_update("sess2".into()));
        assert!(p.apply_server_update("host2".into(), "tok".into()));
    }
}
