//! Constants affecting the voice gateway and RTP transmission.

use discortp::rtp::RtpType;
use std::time::Duration;

/// The voice gateway version spoken by this library.
pub const VOICE_GATEWAY_VERSION: u8 = 4;

/// Sample rate of audio carried over the wire.
pub const SAMPLE_RATE_RAW: usize = 48_000;

/// Number of audio frames/packets to be sent per second.
pub const AUDIO_FRAME_RATE: usize = 50;

/// Length of time between any two audio frames.
pub const TIMESTEP_LENGTH: Duration = Duration::from_millis(1000 / AUDIO_FRAME_RATE as u64);

/// Number of bytes read from an [`OpusStream`] per frame.
///
/// One read of this size must yield exactly one encoded Opus frame.
///
/// [`OpusStream`]: crate::input::OpusStream
pub const OPUS_FRAME_SIZE: usize = 960;

/// RTP timestamp advance per transmitted frame (48 kHz x 20 ms).
pub const TIMESTAMP_STEP: u32 = (SAMPLE_RATE_RAW / AUDIO_FRAME_RATE) as u32;

/// Maximum packet size for a voice packet.
///
/// Set a safe amount below the Ethernet MTU to avoid fragmentation/rejection.
pub const VOICE_PACKET_MAX: usize = 1460;

/// Delay between sends of UDP keepalive frames.
///
/// Voice servers drop NAT mappings after inactivity; these fire every
/// 5 seconds irrespective of outgoing RTP traffic.
pub const UDP_KEEPALIVE_GAP: Duration = Duration::from_millis(5_000);

/// Opus silent frame, transmitted raw (no RTP header, unencrypted) as an
/// end-of-transmission cue when playback stops.
pub const SILENT_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];

/// The one (and only) RTP version.
pub const RTP_VERSION: u8 = 2;

/// Profile type used by the voice server's Opus audio traffic.
pub const RTP_PROFILE_TYPE: RtpType = RtpType::Unassigned(0x78);

/// Default quiet period after which a remote speaker's stream is closed.
pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_millis(200);
