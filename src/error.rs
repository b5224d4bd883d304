//! Error types surfaced by calls and the connection registry.

use crate::model::CloseCode;
use crypto_secretbox::Error as CryptoError;
use std::{error::Error as StdError, fmt, io::Error as IoError};

pub use crate::{
    driver::connection::error::{Error as ConnectionError, Result as ConnectionResult},
    ws::Error as WsError,
};

/// Faults surfaced asynchronously on a call's event stream.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The signalling channel closed with a code that does not permit
    /// resumption, carrying the close code if one was received.
    WsClosed(Option<CloseCode>),
    /// The UDP transport failed underneath an established connection.
    Udp(IoError),
    /// `play` was requested before the UDP key exchange completed.
    NoUdpInfo,
    /// The encryption primitive rejected a seal or open operation.
    Crypto(CryptoError),
    /// Establishing or resuming the connection failed.
    Connect(ConnectionError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::WsClosed(Some(code)) =>
                write!(f, "voice gateway closed with code {}", u16::from(*code)),
            Error::WsClosed(None) => write!(f, "voice gateway closed"),
            Error::Udp(e) => write!(f, "voice UDP transport failed ({e})"),
            Error::NoUdpInfo => write!(f, "cannot play audio without UDP info"),
            Error::Crypto(e) => write!(f, "packet encryption failed ({e})"),
            Error::Connect(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Udp(e) => Some(e),
            Error::Connect(e) => Some(e),
            _ => None,
        }
    }
}

/// Error returned when the registry or a call handle cannot carry out a
/// requested operation.
#[derive(Debug)]
#[non_exhaustive]
pub enum JoinError {
    /// No call exists for the given user/guild pair.
    NoCall,
    /// Session metadata has not yet arrived from the parent gateway, so
    /// there is nothing to connect with.
    NoSession,
    /// The call was torn down before the operation completed.
    Destroyed,
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::NoCall => write!(f, "no call registered for this user and guild"),
            JoinError::NoSession =>
                write!(f, "session and server metadata have not both arrived yet"),
            JoinError::Destroyed => write!(f, "the call has been destroyed"),
        }
    }
}

impl StdError for JoinError {}

/// Convenience type for registry-level results.
pub type JoinResult<T> = std::result::Result<T, JoinError>;
