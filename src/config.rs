use crate::{constants::DEFAULT_SILENCE_TIMEOUT, driver::CryptoMode};
use std::time::Duration;

/// Configuration for voice connections.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Config {
    /// Selected tagging mode for voice packet encryption.
    ///
    /// Defaults to [`CryptoMode::Lite`]. A server which answers the
    /// negotiation with any other mode is rejected rather than mis-sent to.
    pub crypto_mode: CryptoMode,
    /// Quiet period after which a remote speaker's stream is closed and a
    /// speak-end event fires.
    ///
    /// Defaults to 200 ms: long enough to ride out ordinary network jitter
    /// between 20 ms frames, short enough to feel immediate.
    pub silence_timeout: Duration,
    /// Maximum amount of time to wait for an attempted voice connection
    /// handshake to complete.
    ///
    /// Defaults to 10 seconds. If set to `None`, connections will never
    /// time out.
    pub driver_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crypto_mode: CryptoMode::Lite,
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            driver_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl Config {
    /// Sets this `Config`'s chosen cryptographic tagging scheme.
    #[must_use]
    pub fn crypto_mode(mut self, crypto_mode: CryptoMode) -> Self {
        self.crypto_mode = crypto_mode;
        self
    }

    /// Sets this `Config`'s remote-speaker silence timeout.
    #[must_use]
    pub fn silence_timeout(mut self, silence_timeout: Duration) -> Self {
        self.silence_timeout = silence_timeout;
        self
    }

    /// Sets this `Config`'s voice connection timeout.
    #[must_use]
    pub fn driver_timeout(mut self, driver_timeout: Option<Duration>) -> Self {
        self.driver_timeout = driver_timeout;
        self
    }
}
