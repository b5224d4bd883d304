use super::message::*;
use crate::{
    constants::*,
    driver::crypto::{Cipher, CryptoMode},
    events::VoiceEvent,
    speakers::SpeakerRegistry,
    Config,
    Error,
};
use bytes::Bytes;
use discortp::rtp::{MutableRtpPacket, RtpPacket};
use flume::Receiver;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    net::UdpSocket,
    select,
    time::{sleep_until, Instant},
};
use tracing::{trace, warn};

struct UdpRx {
    cipher: Cipher,
    mode: CryptoMode,
    rx: Receiver<UdpRxMessage>,
    udp: Arc<UdpSocket>,
    speakers: Arc<SpeakerRegistry>,
    silence_timeout: Duration,
    deadlines: HashMap<u32, Instant>,
}

impl UdpRx {
    async fn run(&mut self, interconnect: &mut Interconnect) {
        let mut buf = [0u8; VOICE_PACKET_MAX];

        loop {
            let next_deadline = self.deadlines.values().min().copied();

            select! {
                result = self.udp.recv(&mut buf) => {
                    match result {
                        Ok(len) => self.process_datagram(interconnect, &mut buf[..len]),
                        Err(e) => {
                            drop(interconnect.core.send(CoreMessage::SignalUdpError(e)));
                            break;
                        },
                    }
                },
                msg = self.rx.recv_async() => {
                    match msg {
                        Ok(UdpRxMessage::Poison) | Err(flume::RecvError::Disconnected) => break,
                    }
                },
                () = async { sleep_until(next_deadline.unwrap()).await }, if next_deadline.is_some() => {
                    self.expire_silent(interconnect);
                },
            }
        }

        // Streams this task opened must not outlive the socket feeding them.
        let open: Vec<u32> = self.deadlines.drain().map(|(ssrc, _)| ssrc).collect();
        for ssrc in open {
            if let Some(user_id) = self.speakers.close(ssrc) {
                interconnect
                    .events
                    .fire(VoiceEvent::SpeakEnd { user_id, ssrc });
            }
        }
    }

    /// Routes one datagram to its speaker's stream.
    ///
    /// Nothing here is fatal to the connection: adversarial or stale
    /// packets are dropped, and only transport failure above tears down.
    fn process_datagram(&mut self, interconnect: &Interconnect, packet: &mut [u8]) {
        if packet.len() <= 8 {
            return;
        }

        let ssrc = {
            let Some(rtp) = RtpPacket::new(packet) else {
                trace!("Illegal UDP packet from voice server.");
                return;
            };

            if rtp.get_version() != RTP_VERSION || rtp.get_payload_type() != RTP_PROFILE_TYPE {
                trace!("Non-RTP or non-voice packet dropped.");
                return;
            }

            rtp.get_ssrc()
        };

        if !self.speakers.is_known(ssrc) {
            return;
        }

        let (body_start, body_tail) = {
            let mut rtp = MutableRtpPacket::new(packet)
                .expect("FATAL: Too few bytes for RTP header after prior validation.");

            match self.mode.decrypt_in_place(&mut rtp, &self.cipher) {
                Ok(bounds) => bounds,
                Err(e) => {
                    warn!("RTP decryption failed: {:?}", e);
                    interconnect.events.error(Error::Crypto(e));
                    return;
                },
            }
        };

        let Some((user_id, opened)) = self.speakers.open(ssrc) else {
            return;
        };

        if opened {
            interconnect
                .events
                .fire(VoiceEvent::SpeakStart { user_id, ssrc });
        }

        self.deadlines
            .insert(ssrc, Instant::now() + self.silence_timeout);

        let header_len = RtpPacket::minimum_packet_size();
        let body = &packet[header_len + body_start..packet.len() - body_tail];

        let Some(frame) = strip_extension(body) else {
            warn!("Malformed RTP extension from SSRC {ssrc}.");
            return;
        };

        self.speakers.publish(ssrc, Bytes::copy_from_slice(frame));
    }

    /// Closes the stream of every speaker whose silence deadline passed.
    fn expire_silent(&mut self, interconnect: &Interconnect) {
        let now = Instant::now();

        let expired: Vec<u32> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(ssrc, _)| *ssrc)
            .collect();

        for ssrc in expired {
            self.deadlines.remove(&ssrc);

            if let Some(user_id) = self.speakers.close(ssrc) {
                interconnect
                    .events
                    .fire(VoiceEvent::SpeakEnd { user_id, ssrc });
            }
        }
    }
}

/// Drops a leading RTP one-byte-extension block from a decrypted payload.
///
/// Returns `None` when the advertised extension length overruns the frame.
fn strip_extension(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 4 || data[0] != 0xbe || data[1] != 0xde {
        return Some(data);
    }

    let words = u16::from_be_bytes([data[2], data[3]]) as usize;
    let skip = 4 + 4 * words;

    (data.len() >= skip).then(|| &data[skip..])
}

pub(crate) async fn runner(
    mut interconnect: Interconnect,
    rx: Receiver<UdpRxMessage>,
    cipher: Cipher,
    config: Config,
    udp: Arc<UdpSocket>,
    speakers: Arc<SpeakerRegistry>,
) {
    trace!("UDP receive handle started.");

    let mut state = UdpRx {
        cipher,
        mode: config.crypto_mode,
        rx,
        udp,
        speakers,
        silence_timeout: config.silence_timeout,
        deadlines: HashMap::new(),
    };

    state.run(&mut interconnect).await;

    trace!("UDP receive handle stopped.");
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        driver::crypto::{CryptoState, KEY_SIZE, TAG_SIZE},
        events::EventSink,
        id::UserId,
    };
    use discortp::MutablePacket;
    use flume::Sender;

    #[test]
    fn extension_untouched_when_absent() {
        let data = [0x01u8, 0x02, 0x03, 0x04];
        assert_eq!(strip_extension(&data), Some(&data[..]));
    }

    #[test]
    fn extension_stripped_by_word_count() {
        // One 32-bit extension word: strip 4 + 4 bytes.
        let data = [
            0xbe, 0xde, 0x00, 0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x00, 0x11,
        ];
        assert_eq!(
            strip_extension(&data),
            Some(&[0xee, 0xff, 0x00, 0x11][..])
        );
    }

    #[test]
    fn overrunning_extension_rejected() {
        let data = [0xbe, 0xde, 0x00, 0x05, 0x00, 0x00];
        assert_eq!(strip_extension(&data), None);
    }

    struct RxHarness {
        rx: UdpRx,
        interconnect: Interconnect,
        events: Receiver<VoiceEvent>,
        _msg_tx: Sender<UdpRxMessage>,
        _core_rx: Receiver<CoreMessage>,
    }

    async fn harness() -> RxHarness {
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (msg_tx, msg_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded();
        let (sink, events) = EventSink::new();

        let mode = CryptoMode::Lite;
        let rx = UdpRx {
            cipher: mode.cipher_from_key(&[0u8; KEY_SIZE]).unwrap(),
            mode,
            rx: msg_rx,
            udp: Arc::new(udp),
            speakers: Arc::new(SpeakerRegistry::default()),
            silence_timeout: Duration::from_millis(200),
            deadlines: HashMap::new(),
        };

        RxHarness {
            rx,
            interconnect: Interconnect {
                core: core_tx,
                events: sink,
            },
            events,
            _msg_tx: msg_tx,
            _core_rx: core_rx,
        }
    }

    /// Builds one sealed voice datagram the way the send side would.
    fn sealed_packet(h: &RxHarness, ssrc: u32, plain: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 12 + TAG_SIZE + plain.len() + 4];

        let mut rtp = MutableRtpPacket::new(&mut buf[..]).unwrap();
        rtp.set_version(RTP_VERSION);
        rtp.set_payload_type(RTP_PROFILE_TYPE);
        rtp.set_sequence(7.into());
        rtp.set_timestamp(960.into());
        rtp.set_ssrc(ssrc);

        rtp.payload_mut()[TAG_SIZE..TAG_SIZE + plain.len()].copy_from_slice(plain);

        let mut state = CryptoState::from(h.rx.mode);
        let final_size = state.write_packet_nonce(&mut rtp, TAG_SIZE + plain.len());
        h.rx.mode
            .encrypt_in_place(&mut rtp, &h.rx.cipher, final_size)
            .unwrap();

        buf
    }

    #[tokio::test]
    async fn known_speaker_receives_extension_stripped_payload() {
        let mut h = harness().await;
        h.rx.speakers.announce(42, UserId(9));
        let stream = h.rx.speakers.get(42).unwrap();

        let plain = [
            0xbe, 0xde, 0x00, 0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x00, 0x11,
        ];
        let mut pkt = sealed_packet(&h, 42, &plain);

        h.rx.process_datagram(&h.interconnect, &mut pkt);

        assert_eq!(
            stream.try_recv().unwrap(),
            Bytes::from_static(&[0xee, 0xff, 0x00, 0x11])
        );
        assert!(h.rx.deadlines.contains_key(&42));
    }

    #[tokio::test]
    async fn unknown_ssrc_and_short_datagrams_dropped() {
        let mut h = harness().await;

        let mut pkt = sealed_packet(&h, 1234, &[1, 2, 3]);
        h.rx.process_datagram(&h.interconnect, &mut pkt);
        assert!(h.rx.deadlines.is_empty());

        let mut short = [0x80u8, 0x78, 0, 0, 0, 0, 0, 1];
        h.rx.process_datagram(&h.interconnect, &mut short);
        assert!(h.rx.deadlines.is_empty());
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn quiescent_speaker_closes_with_speak_end() {
        let mut h = harness().await;
        h.rx.speakers.announce(42, UserId(9));

        let mut pkt = sealed_packet(&h, 42, &[0x42; 20]);
        h.rx.process_datagram(&h.interconnect, &mut pkt);

        // Speaker announced with an open stream: first datagram reuses it,
        // so no extra speak-start fires.
        assert!(h.events.try_recv().is_err());

        h.rx.deadlines.insert(42, Instant::now() - Duration::from_millis(1));
        h.rx.expire_silent(&h.interconnect);

        assert!(h.rx.speakers.get(42).is_none());
        assert!(matches!(
            h.events.try_recv(),
            Ok(VoiceEvent::SpeakEnd {
                user_id: UserId(9),
                ssrc: 42
            })
        ));

        // The next datagram reopens the stream and re-announces the speaker.
        let mut pkt = sealed_packet(&h, 42, &[0x43; 20]);
        h.rx.process_datagram(&h.interconnect, &mut pkt);

        assert!(h.rx.speakers.get(42).is_some());
        assert!(matches!(
            h.events.try_recv(),
            Ok(VoiceEvent::SpeakStart {
                user_id: UserId(9),
                ssrc: 42
            })
        ));
    }

    #[tokio::test]
    async fn tampered_packet_surfaces_crypto_error() {
        let mut h = harness().await;
        h.rx.speakers.announce(7, UserId(1));
        let stream = h.rx.speakers.get(7).unwrap();

        let mut pkt = sealed_packet(&h, 7, &[0x10; 20]);
        let tag_start = 12;
        pkt[tag_start] ^= 0xff;

        h.rx.process_datagram(&h.interconnect, &mut pkt);

        assert!(stream.try_recv().is_none());
        assert!(matches!(
            h.events.try_recv(),
            Ok(VoiceEvent::Error(e)) if matches!(*e, Error::Crypto(_))
        ));
    }
}
