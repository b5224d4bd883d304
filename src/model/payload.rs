//! Bodies of the voice gateway messages this library sends and receives.

use crate::id::{GuildId, UserId};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Speaking-state bit indicating ordinary microphone audio.
pub const SPEAKING_MICROPHONE: u8 = 1;

/// Authenticates a brand-new session.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Identify {
    /// ID of the guild whose voice server is being joined.
    pub server_id: GuildId,
    /// Session identifier issued by the parent gateway.
    pub session_id: String,
    /// Ephemeral token issued by the parent gateway.
    pub token: String,
    /// ID of the joining user.
    pub user_id: UserId,
}

/// Requests continuation of a dropped session.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Resume {
    /// ID of the guild whose voice server is being rejoined.
    pub server_id: GuildId,
    /// Session identifier issued by the parent gateway.
    pub session_id: String,
    /// Ephemeral token issued by the parent gateway.
    pub token: String,
}

/// Announces the client's transport choice after IP discovery.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct SelectProtocol {
    /// The lone supported value, `"udp"`.
    pub protocol: String,
    /// Externally visible connection details.
    pub data: ProtocolData,
}

/// The NAT-observed endpoint and chosen encryption mode.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ProtocolData {
    /// Externally visible IP address, as learned by IP discovery.
    pub address: IpAddr,
    /// Name of the negotiated encryption mode.
    pub mode: String,
    /// Externally visible UDP port.
    pub port: u16,
}

/// Client liveness signal.
///
/// The value is the client's wall clock in milliseconds at send time; the
/// server echoes it in [`HeartbeatAck`], which yields the round-trip time.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Heartbeat {
    /// Value to be mirrored by the server.
    pub nonce: u64,
}

/// Server's echo of the last [`Heartbeat`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HeartbeatAck {
    /// The mirrored heartbeat value.
    pub nonce: u64,
}

/// Server's UDP rendezvous details for this session.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Ready {
    /// Synchronisation source assigned to this client's RTP stream.
    pub ssrc: u32,
    /// Voice server address to send audio to.
    pub ip: IpAddr,
    /// Voice server UDP port.
    pub port: u16,
    /// Encryption modes the server is willing to negotiate.
    pub modes: Vec<String>,
}

/// Server's delivery of the symmetric key for the session.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct SessionDescription {
    /// Name of the mode the server settled on.
    pub mode: String,
    /// 32-byte key used by all subsequent data-plane encryption.
    pub secret_key: Vec<u8>,
}

/// Speaking-state change.
///
/// Sent by the client around each play episode, and received whenever a
/// remote user's speaking state changes (which also announces their SSRC).
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Speaking {
    /// Bitflags; bit 0 ([`SPEAKING_MICROPHONE`]) is ordinary audio.
    pub speaking: u8,
    /// Delay hint; always zero for clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,
    /// The speaker's synchronisation source.
    pub ssrc: u32,
    /// The speaking user; absent on client-sent frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// Server's first message, fixing the heartbeat cadence.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Hello {
    /// Interval between heartbeats, in milliseconds.
    pub heartbeat_interval: f64,
}

/// A remote user left the call.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ClientDisconnect {
    /// The departing user.
    pub user_id: UserId,
}
