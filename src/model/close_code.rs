use self::CloseCode::*;

/// Close codes the voice gateway attaches to a websocket close frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloseCode {
    /// An opcode the server does not recognise was sent.
    UnknownOpcode,
    /// A payload failed to decode.
    FailedToDecodePayload,
    /// A message was sent before Identify.
    NotAuthenticated,
    /// The token in Identify was rejected.
    AuthenticationFailed,
    /// Identify was sent twice on one channel.
    AlreadyAuthenticated,
    /// The session is no longer valid.
    SessionNoLongerValid,
    /// The session timed out.
    SessionTimeout,
    /// The requested voice server was not found.
    ServerNotFound,
    /// An unrecognised protocol was selected.
    UnknownProtocol,
    /// The client was removed from the call.
    Disconnected,
    /// The voice server crashed; the session can be resumed.
    VoiceServerCrashed,
    /// An unrecognised encryption mode was selected.
    UnknownEncryptionMode,
    /// Any other close code.
    Unknown(u16),
}

impl CloseCode {
    /// Whether a close with this code may be recovered by sending Resume
    /// on a fresh channel. Every other close is fatal to the connection.
    pub fn should_resume(self) -> bool {
        matches!(self, VoiceServerCrashed)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        match code {
            UnknownOpcode => 4001,
            FailedToDecodePayload => 4002,
            NotAuthenticated => 4003,
            AuthenticationFailed => 4004,
            AlreadyAuthenticated => 4005,
            SessionNoLongerValid => 4006,
            SessionTimeout => 4009,
            ServerNotFound => 4011,
            UnknownProtocol => 4012,
            Disconnected => 4014,
            VoiceServerCrashed => 4015,
            UnknownEncryptionMode => 4016,
            Unknown(code) => code,
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> CloseCode {
        match code {
            4001 => UnknownOpcode,
            4002 => FailedToDecodePayload,
            4003 => NotAuthenticated,
            4004 => AuthenticationFailed,
            4005 => AlreadyAuthenticated,
            4006 => SessionNoLongerValid,
            4009 => SessionTimeout,
            4011 => ServerNotFound,
            4012 => UnknownProtocol,
            4014 => Disconnected,
            4015 => VoiceServerCrashed,
            4016 => UnknownEncryptionMode,
            other => Unknown(other),
        }
    }
}

#[cfg(test)]
mod test {
    use super::CloseCode;

    #[test]
    fn only_server_crash_resumes() {
        for raw in [4001u16, 4004, 4006, 4009, 4014, 4016, 1000, 1006] {
            assert!(!CloseCode::from(raw).should_resume(), "{raw}");
        }
        assert!(CloseCode::from(4015).should_resume());
    }

    #[test]
    fn round_trip() {
        for raw in 4000u16..4020 {
            assert_eq!(u16::from(CloseCode::from(raw)), raw);
        }
    }
}
