//! Connection errors for the voice handshake and its transports.

use crate::ws::Error as WsError;
use crypto_secretbox::Error as CryptoError;
use serde_json::Error as JsonError;
use std::{error::Error as StdError, fmt, io::Error as IoError};
use tokio::time::error::Elapsed;

/// Errors encountered while connecting to a voice server over the
/// signalling channel and UDP.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The driver hung up an in-progress connection attempt before it
    /// completed, or dropped the listener awaiting its result.
    AttemptDiscarded,
    /// An error occurred during [en/de]cryption of voice packets or key generation.
    Crypto(CryptoError),
    /// Server did not return the expected crypto mode during negotiation.
    CryptoModeInvalid,
    /// Selected crypto mode was not offered by the server.
    CryptoModeUnavailable,
    /// The server returned a session key of the wrong length.
    CryptoInvalidLength,
    /// Server's provided endpoint was not a valid URL.
    EndpointUrl,
    /// The IP discovery reply was malformed.
    IllegalDiscoveryResponse,
    /// The IP discovery reply did not carry a parseable address.
    IllegalIp,
    /// An io error occurred on the UDP socket.
    Io(IoError),
    /// A JSON payload could not be (de)serialised.
    Json(JsonError),
    /// An error occurred on the signalling channel.
    Ws(WsError),
    /// The handshake did not complete within [`Config::driver_timeout`].
    ///
    /// [`Config::driver_timeout`]: crate::Config::driver_timeout
    TimedOut,
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Error {
        Error::Crypto(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Error {
        Error::Io(e)
    }
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Error {
        Error::Json(e)
    }
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Error {
        Error::Ws(e)
    }
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Error {
        Error::TimedOut
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to connect to voice server: ")?;
        match self {
            Error::AttemptDiscarded => write!(f, "connection attempt was aborted/discarded"),
            Error::Crypto(e) => write!(f, "cryptography error {e}"),
            Error::CryptoModeInvalid => write!(f, "server changed negotiated encryption mode"),
            Error::CryptoModeUnavailable => write!(f, "server did not offer chosen encryption mode"),
            Error::CryptoInvalidLength => write!(f, "server-provided key was invalid length"),
            Error::EndpointUrl => write!(f, "endpoint URL received from gateway was invalid"),
            Error::IllegalDiscoveryResponse =>
                write!(f, "IP discovery response from UDP endpoint was invalid"),
            Error::IllegalIp => write!(f, "IP discovery response contained bad IP address"),
            Error::Io(e) => write!(f, "I/O failure ({e})"),
            Error::Json(e) => write!(f, "JSON (de)serialisation failure ({e})"),
            Error::Ws(e) => write!(f, "websocket failure ({e:?})"),
            Error::TimedOut => write!(f, "connection attempt timed out"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

/// Convenience type for connection handshake results.
pub type Result<T> = std::result::Result<T, Error>;
