use super::message::*;
use crate::{
    constants::*,
    driver::{
        crypto::{Cipher, CryptoMode, CryptoState, TAG_SIZE},
        PlayerStatus,
        SharedState,
    },
    events::VoiceEvent,
    input::OpusStream,
    ConnectionStatus,
    Error,
};
use crypto_secretbox::Error as CryptoError;
use discortp::{
    discord::MutableKeepalivePacket,
    rtp::{MutableRtpPacket, RtpPacket},
    wrap::{Wrap16, Wrap32},
    MutablePacket,
};
use flume::{Receiver, Sender};
use std::{io::Error as IoError, sync::Arc};
use tokio::{
    net::UdpSocket,
    select,
    time::{interval, sleep_until, Instant, Interval},
};
use tracing::{trace, warn};

enum CycleError {
    Source(IoError),
    Crypto(CryptoError),
    Udp(IoError),
}

pub(crate) struct Player {
    rx: Receiver<PlayerMessage>,
    ws: Sender<WsMessage>,
    udp: Arc<UdpSocket>,

    cipher: Cipher,
    crypto_state: CryptoState,
    ssrc: u32,

    source: Option<OpusStream>,
    sequence: Wrap16,
    timestamp: Wrap32,

    packet: [u8; VOICE_PACKET_MAX],
    frame: [u8; OPUS_FRAME_SIZE],

    shared: Arc<SharedState>,
}

impl Player {
    #[allow(clippy::too_many_arguments)]
    fn new(
        rx: Receiver<PlayerMessage>,
        ws: Sender<WsMessage>,
        udp: Arc<UdpSocket>,
        cipher: Cipher,
        mode: CryptoMode,
        ssrc: u32,
        shared: Arc<SharedState>,
    ) -> Self {
        let mut packet = [0u8; VOICE_PACKET_MAX];

        let mut rtp = MutableRtpPacket::new(&mut packet[..])
            .expect("FATAL: Too few bytes in self.packet for RTP header.");
        rtp.set_version(RTP_VERSION);
        rtp.set_payload_type(RTP_PROFILE_TYPE);
        rtp.set_ssrc(ssrc);

        Self {
            rx,
            ws,
            udp,

            cipher,
            crypto_state: mode.into(),
            ssrc,

            source: None,
            sequence: 0.into(),
            timestamp: 0.into(),

            packet,
            frame: [0u8; OPUS_FRAME_SIZE],

            shared,
        }
    }

    async fn run(&mut self, interconnect: &mut Interconnect) {
        let mut ticker: Option<Interval> = None;
        let mut ka_time = Instant::now() + UDP_KEEPALIVE_GAP;

        let mut keepalive_bytes = [0u8; MutableKeepalivePacket::minimum_packet_size()];
        MutableKeepalivePacket::new(&mut keepalive_bytes[..])
            .expect("FATAL: Insufficient bytes given to keepalive packet.")
            .set_ssrc(self.ssrc);

        loop {
            select! {
                msg = self.rx.recv_async() => {
                    match msg {
                        Ok(PlayerMessage::Play(source)) => self.play(interconnect, source, &mut ticker),
                        Ok(PlayerMessage::Stop) => self.stop(interconnect, &mut ticker).await,
                        Ok(PlayerMessage::Pause) => self.pause(interconnect, &mut ticker),
                        Ok(PlayerMessage::Unpause) => self.unpause(interconnect, &mut ticker),
                        Ok(PlayerMessage::Poison) | Err(flume::RecvError::Disconnected) => break,
                    }
                },
                _ = async { ticker.as_mut().unwrap().tick().await }, if ticker.is_some() => {
                    match self.cycle().await {
                        Ok(true) => {},
                        Ok(false) => self.stop(interconnect, &mut ticker).await,
                        Err(CycleError::Source(e)) => {
                            warn!("Audio source read failed: {:?}.", e);
                            self.stop(interconnect, &mut ticker).await;
                        },
                        Err(CycleError::Crypto(e)) => {
                            interconnect.events.error(Error::Crypto(e));
                            self.stop(interconnect, &mut ticker).await;
                        },
                        Err(CycleError::Udp(e)) => {
                            drop(interconnect.core.send(CoreMessage::SignalUdpError(e)));
                            break;
                        },
                    }
                },
                () = sleep_until(ka_time) => {
                    trace!("Sending UDP Keepalive.");
                    if let Err(e) = self.udp.send(&keepalive_bytes[..]).await {
                        drop(interconnect.core.send(CoreMessage::SignalUdpError(e)));
                        break;
                    }
                    ka_time += UDP_KEEPALIVE_GAP;
                },
            }
        }

        // Dropped mid-play (destroy or transport death): no farewell frames,
        // but the player state must still settle on idle.
        self.set_state(interconnect, PlayerStatus::Idle);
    }

    /// Begins (or re-targets) playback.
    ///
    /// If a source is already installed, the new one simply replaces it and
    /// is picked up on the next frame boundary; counters, speaking state,
    /// and the tick cadence are untouched.
    fn play(
        &mut self,
        interconnect: &Interconnect,
        source: OpusStream,
        ticker: &mut Option<Interval>,
    ) {
        let was_active = self.source.replace(source).is_some();

        if was_active && self.shared.player() != PlayerStatus::Idle {
            return;
        }

        drop(self.ws.send(WsMessage::Speaking(true)));
        *ticker = Some(interval(TIMESTEP_LENGTH));
        self.set_state(interconnect, PlayerStatus::Playing);
    }

    async fn stop(&mut self, interconnect: &mut Interconnect, ticker: &mut Option<Interval>) {
        *ticker = None;
        // Dropping the stream releases the upstream producer.
        self.source = None;

        if self.shared.player() != PlayerStatus::Idle {
            if let Err(e) = self.udp.send(&SILENT_FRAME[..]).await {
                drop(interconnect.core.send(CoreMessage::SignalUdpError(e)));
            }
            drop(self.ws.send(WsMessage::Speaking(false)));
            self.set_state(interconnect, PlayerStatus::Idle);
        }
    }

    fn pause(&mut self, interconnect: &Interconnect, ticker: &mut Option<Interval>) {
        if self.shared.player() == PlayerStatus::Playing {
            *ticker = None;
            drop(self.ws.send(WsMessage::Speaking(false)));
            self.set_state(interconnect, PlayerStatus::Paused);
        }
    }

    fn unpause(&mut self, interconnect: &Interconnect, ticker: &mut Option<Interval>) {
        if self.shared.player() == PlayerStatus::Paused && self.source.is_some() {
            drop(self.ws.send(WsMessage::Speaking(true)));
            *ticker = Some(interval(TIMESTEP_LENGTH));
            self.set_state(interconnect, PlayerStatus::Playing);
        }
    }

    /// Reads, stamps, encrypts, and transmits one frame.
    ///
    /// Returns `Ok(false)` once the source is exhausted or the connection
    /// is no longer ready for audio.
    async fn cycle(&mut self) -> Result<bool, CycleError> {
        if self.shared.status() != ConnectionStatus::Ready {
            return Ok(false);
        }

        let Some(source) = self.source.as_mut() else {
            return Ok(false);
        };

        match source.read_frame(&mut self.frame).await {
            Ok(true) => {},
            Ok(false) => return Ok(false),
            Err(e) => return Err(CycleError::Source(e)),
        }

        let index = {
            let mut rtp = MutableRtpPacket::new(&mut self.packet[..])
                .expect("FATAL: Too few bytes in self.packet for RTP header.");

            rtp.set_sequence(self.sequence);
            rtp.set_timestamp(self.timestamp);

            let payload = rtp.payload_mut();
            payload[TAG_SIZE..TAG_SIZE + OPUS_FRAME_SIZE].copy_from_slice(&self.frame[..]);

            let final_payload_size = self
                .crypto_state
                .write_packet_nonce(&mut rtp, TAG_SIZE + OPUS_FRAME_SIZE);

            self.crypto_state
                .kind()
                .encrypt_in_place(&mut rtp, &self.cipher, final_payload_size)
                .map_err(CycleError::Crypto)?;

            RtpPacket::minimum_packet_size() + final_payload_size
        };

        self.udp
            .send(&self.packet[..index])
            .await
            .map_err(CycleError::Udp)?;

        self.sequence += 1;
        self.timestamp += TIMESTAMP_STEP;

        Ok(true)
    }

    fn set_state(&self, interconnect: &Interconnect, new: PlayerStatus) {
        let old = self.shared.swap_player(new);
        if old != new {
            interconnect
                .events
                .fire(VoiceEvent::PlayerStateChange { old, new });
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn runner(
    mut interconnect: Interconnect,
    rx: Receiver<PlayerMessage>,
    ws: Sender<WsMessage>,
    udp: Arc<UdpSocket>,
    cipher: Cipher,
    mode: CryptoMode,
    ssrc: u32,
    shared: Arc<SharedState>,
) {
    trace!("Player started.");

    let mut player = Player::new(rx, ws, udp, cipher, mode, ssrc, shared);
    player.run(&mut interconnect).await;

    trace!("Player finished.");
}
