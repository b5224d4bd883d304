//! Encryption schemes supported by the voice server's secure RTP negotiation.

use aes_gcm::Aes256Gcm;
use byteorder::{ByteOrder, LittleEndian};
use crypto_secretbox::{
    AeadInPlace,
    Error as CryptoError,
    KeyInit,
    Nonce,
    SecretBox,
    XSalsa20Poly1305,
};
use discortp::{rtp::RtpPacket, MutablePacket};
use rand::Rng;
use std::num::Wrapping;

pub const TAG_SIZE: usize = SecretBox::<()>::TAG_SIZE;
pub const NONCE_SIZE: usize = SecretBox::<()>::NONCE_SIZE;
pub const KEY_SIZE: usize = SecretBox::<()>::KEY_SIZE;

/// Number of nonce bytes consumed by the AES-GCM construction.
const AES_NONCE_SIZE: usize = 12;

/// Variants of the encryption scheme negotiated in Select Protocol.
///
/// Only [`Lite`] is ever requested; the remaining variants exist so that
/// packets from servers insisting on another scheme can still be framed
/// and unframed correctly.
///
/// [`Lite`]: CryptoMode::Lite
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CryptoMode {
    /// The RTP header is used as the source of nonce bytes for the packet.
    ///
    /// Equivalent to a nonce of at most 48b (6B) at no extra packet overhead:
    /// the RTP sequence number and timestamp are the varying quantities.
    Normal,
    /// An additional random 24B suffix is used as the source of nonce bytes for the packet.
    /// This is regenerated randomly for each packet.
    ///
    /// Full nonce width of 24B (192b), at an extra 24B per packet (~1.2 kB/s).
    Suffix,
    /// An additional 4B suffix is used as the source of nonce bytes for the packet,
    /// taken as the little-endian bytes of a counter which increments by `1`
    /// with each packet.
    ///
    /// Nonce width of 4B (32b), at an extra 4B per packet (~0.2 kB/s).
    Lite,
    /// AES-256-GCM with the RTP header as the 12B nonce, at no extra packet
    /// overhead.
    Aes256Gcm,
}

impl From<CryptoState> for CryptoMode {
    fn from(val: CryptoState) -> Self {
        use CryptoState::*;
        match val {
            Normal => CryptoMode::Normal,
            Suffix => CryptoMode::Suffix,
            Lite(_) => CryptoMode::Lite,
            Aes256Gcm => CryptoMode::Aes256Gcm,
        }
    }
}

impl CryptoMode {
    /// Returns the name of a mode as it will appear during negotiation.
    pub fn to_request_str(self) -> &'static str {
        use CryptoMode::*;
        match self {
            Normal => "xsalsa20_poly1305",
            Suffix => "xsalsa20_poly1305_suffix",
            Lite => "xsalsa20_poly1305_lite",
            Aes256Gcm => "aead_aes256_gcm",
        }
    }

    /// Builds the cipher matching this mode from a session key.
    pub fn cipher_from_key(self, key: &[u8]) -> Result<Cipher, CryptoError> {
        match self {
            CryptoMode::Aes256Gcm => Aes256Gcm::new_from_slice(key)
                .map(Box::new)
                .map(Cipher::Aes256Gcm)
                .map_err(|_| CryptoError),
            _ => XSalsa20Poly1305::new_from_slice(key)
                .map(Box::new)
                .map(Cipher::XSalsa20Poly1305)
                .map_err(|_| CryptoError),
        }
    }

    /// Returns the number of bytes each nonce is stored as within
    /// a packet.
    pub fn nonce_size(self) -> usize {
        use CryptoMode::*;
        match self {
            Normal => RtpPacket::minimum_packet_size(),
            Suffix => NONCE_SIZE,
            Lite => 4,
            Aes256Gcm => AES_NONCE_SIZE,
        }
    }

    /// Returns the number of bytes occupied by the encryption scheme
    /// which fall before the payload.
    pub fn payload_prefix_len(self) -> usize {
        TAG_SIZE
    }

    /// Returns the number of bytes occupied by the encryption scheme
    /// which fall after the payload.
    pub fn payload_suffix_len(self) -> usize {
        use CryptoMode::*;
        match self {
            Normal | Aes256Gcm => 0,
            Suffix | Lite => self.nonce_size(),
        }
    }

    /// Calculates the number of additional bytes required compared
    /// to an unencrypted payload.
    pub fn payload_overhead(self) -> usize {
        self.payload_prefix_len() + self.payload_suffix_len()
    }

    /// Extracts the byte slice in a packet used as the nonce, and the remaining mutable
    /// portion of the packet.
    fn nonce_slice<'a>(
        self,
        header: &'a [u8],
        body: &'a mut [u8],
    ) -> Result<(&'a [u8], &'a mut [u8]), CryptoError> {
        use CryptoMode::*;
        match self {
            Normal | Aes256Gcm => Ok((header, body)),
            Suffix | Lite => {
                let len = body.len();
                if len < self.payload_suffix_len() {
                    Err(CryptoError)
                } else {
                    let (body_left, nonce_loc) = body.split_at_mut(len - self.payload_suffix_len());
                    Ok((&nonce_loc[..self.nonce_size()], body_left))
                }
            },
        }
    }

    /// Decrypts a received RTP packet using the given cipher.
    ///
    /// If successful, this returns the number of bytes to be ignored from the
    /// start and end of the packet payload.
    #[inline]
    pub(crate) fn decrypt_in_place(
        self,
        packet: &mut impl MutablePacket,
        cipher: &Cipher,
    ) -> Result<(usize, usize), CryptoError> {
        let header_len = packet.packet().len() - packet.payload().len();
        let (header, body) = packet.packet_mut().split_at_mut(header_len);
        let (slice_to_use, body_remaining) = self.nonce_slice(header, body)?;

        // Stack-local staging keeps send and receive nonces in separate
        // buffers even though both directions share one cipher.
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..slice_to_use.len().min(NONCE_SIZE)]
            .copy_from_slice(&slice_to_use[..slice_to_use.len().min(NONCE_SIZE)]);

        let body_start = self.payload_prefix_len();
        let body_tail = self.payload_suffix_len();

        if body_start > body_remaining.len() {
            return Err(CryptoError);
        }

        let (tag_bytes, data_bytes) = body_remaining.split_at_mut(body_start);

        cipher
            .open(&nonce, data_bytes, tag_bytes)
            .map(|()| (body_start, body_tail))
    }

    /// Encrypts an outgoing RTP packet using the given cipher.
    ///
    /// Use of this requires that the input packet has had a nonce generated in the correct location,
    /// and `payload_len` specifies the number of bytes after the header including this nonce.
    #[inline]
    pub fn encrypt_in_place(
        self,
        packet: &mut impl MutablePacket,
        cipher: &Cipher,
        payload_len: usize,
    ) -> Result<(), CryptoError> {
        let header_len = packet.packet().len() - packet.payload().len();
        let (header, body) = packet.packet_mut().split_at_mut(header_len);
        let (slice_to_use, body_remaining) = self.nonce_slice(header, &mut body[..payload_len])?;

        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..self.nonce_size()].copy_from_slice(slice_to_use);

        // body_remaining is now correctly truncated by this point.
        // the true payload to encrypt follows after the first TAG_SIZE bytes.
        let (tag_bytes, data_bytes) = body_remaining.split_at_mut(TAG_SIZE);
        let tag = cipher.seal(&nonce, data_bytes)?;
        tag_bytes.copy_from_slice(&tag[..]);

        Ok(())
    }
}

/// A live session cipher, selected by the negotiated [`CryptoMode`].
#[derive(Clone)]
pub enum Cipher {
    /// Secret-box cipher backing the three `xsalsa20_poly1305` modes.
    XSalsa20Poly1305(Box<XSalsa20Poly1305>),
    /// AEAD cipher backing `aead_aes256_gcm`.
    Aes256Gcm(Box<Aes256Gcm>),
}

impl Cipher {
    /// Encrypts `data` in place, returning the detached authentication tag.
    fn seal(&self, nonce: &[u8; NONCE_SIZE], data: &mut [u8]) -> Result<[u8; TAG_SIZE], CryptoError> {
        match self {
            Cipher::XSalsa20Poly1305(cipher) => cipher
                .encrypt_in_place_detached(Nonce::from_slice(&nonce[..]), b"", data)
                .map(Into::into),
            Cipher::Aes256Gcm(cipher) => cipher
                .encrypt_in_place_detached(
                    aes_gcm::Nonce::from_slice(&nonce[..AES_NONCE_SIZE]),
                    b"",
                    data,
                )
                .map(Into::into),
        }
    }

    /// Decrypts `data` in place, verifying the detached authentication tag.
    fn open(
        &self,
        nonce: &[u8; NONCE_SIZE],
        data: &mut [u8],
        tag: &[u8],
    ) -> Result<(), CryptoError> {
        if tag.len() != TAG_SIZE {
            return Err(CryptoError);
        }

        match self {
            Cipher::XSalsa20Poly1305(cipher) => cipher.decrypt_in_place_detached(
                Nonce::from_slice(&nonce[..]),
                b"",
                data,
                crypto_secretbox::Tag::from_slice(tag),
            ),
            Cipher::Aes256Gcm(cipher) => cipher.decrypt_in_place_detached(
                aes_gcm::Nonce::from_slice(&nonce[..AES_NONCE_SIZE]),
                b"",
                data,
                aes_gcm::Tag::from_slice(tag),
            ),
        }
    }
}

/// Per-connection send-side nonce state for the active [`CryptoMode`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CryptoState {
    /// See [`CryptoMode::Normal`].
    Normal,
    /// See [`CryptoMode::Suffix`].
    Suffix,
    /// See [`CryptoMode::Lite`]: the wrapped counter advances before each use.
    Lite(Wrapping<u32>),
    /// See [`CryptoMode::Aes256Gcm`].
    Aes256Gcm,
}

impl From<CryptoMode> for CryptoState {
    fn from(val: CryptoMode) -> Self {
        use CryptoMode::*;
        match val {
            Normal => CryptoState::Normal,
            Suffix => CryptoState::Suffix,
            Lite => CryptoState::Lite(Wrapping(0)),
            Aes256Gcm => CryptoState::Aes256Gcm,
        }
    }
}

impl CryptoState {
    /// Writes packet nonce into the body, if required, returning the new length.
    pub fn write_packet_nonce(
        &mut self,
        packet: &mut impl MutablePacket,
        payload_end: usize,
    ) -> usize {
        let mode = self.kind();
        let endpoint = payload_end + mode.payload_suffix_len();

        use CryptoState::*;
        match self {
            Suffix => {
                rand::thread_rng().fill(&mut packet.payload_mut()[payload_end..endpoint]);
            },
            Lite(counter) => {
                *counter += Wrapping(1);
                LittleEndian::write_u32(
                    &mut packet.payload_mut()[payload_end..endpoint],
                    counter.0,
                );
            },
            _ => {},
        }

        endpoint
    }

    /// Returns the underlying (stateless) type of the active crypto mode.
    pub fn kind(&self) -> CryptoMode {
        CryptoMode::from(*self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use discortp::rtp::MutableRtpPacket;

    const MODES: [CryptoMode; 4] = [
        CryptoMode::Normal,
        CryptoMode::Suffix,
        CryptoMode::Lite,
        CryptoMode::Aes256Gcm,
    ];

    #[test]
    fn small_packet_decrypts_error() {
        let mut buf = [0u8; MutableRtpPacket::minimum_packet_size()];
        let mut pkt = MutableRtpPacket::new(&mut buf[..]).unwrap();

        for mode in MODES {
            let cipher = mode.cipher_from_key(&[1u8; KEY_SIZE]).unwrap();

            // AIM: should error, and not panic.
            assert!(mode.decrypt_in_place(&mut pkt, &cipher).is_err());
        }
    }

    #[test]
    fn symmetric_encrypt_decrypt() {
        const TRUE_PAYLOAD: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut buf = [0u8; MutableRtpPacket::minimum_packet_size()
            + TRUE_PAYLOAD.len()
            + TAG_SIZE
            + NONCE_SIZE];

        for mode in MODES {
            buf.fill(0);
            let cipher = mode.cipher_from_key(&[7u8; KEY_SIZE]).unwrap();

            let mut pkt = MutableRtpPacket::new(&mut buf[..]).unwrap();
            let mut crypto_state = CryptoState::from(mode);
            let payload = pkt.payload_mut();
            payload[TAG_SIZE..TAG_SIZE + TRUE_PAYLOAD.len()].copy_from_slice(&TRUE_PAYLOAD[..]);

            let final_payload_size =
                crypto_state.write_packet_nonce(&mut pkt, TAG_SIZE + TRUE_PAYLOAD.len());

            assert!(mode.encrypt_in_place(&mut pkt, &cipher, final_payload_size).is_ok());

            let final_pkt_len = MutableRtpPacket::minimum_packet_size() + final_payload_size;
            let mut pkt = MutableRtpPacket::new(&mut buf[..final_pkt_len]).unwrap();

            let (start, tail) = mode.decrypt_in_place(&mut pkt, &cipher).unwrap();

            assert_eq!(start, TAG_SIZE);
            assert_eq!(tail, mode.payload_suffix_len());

            let payload = pkt.payload_mut();
            assert_eq!(&payload[start..start + TRUE_PAYLOAD.len()], &TRUE_PAYLOAD[..]);
        }
    }

    #[test]
    fn lite_nonce_is_little_endian_and_advances_before_use() {
        let mode = CryptoMode::Lite;
        let mut state = CryptoState::from(mode);
        let mut buf = [0u8; MutableRtpPacket::minimum_packet_size() + TAG_SIZE + 4];
        let mut pkt = MutableRtpPacket::new(&mut buf[..]).unwrap();

        let end = state.write_packet_nonce(&mut pkt, TAG_SIZE);
        assert_eq!(end, TAG_SIZE + 4);
        assert_eq!(&pkt.payload_mut()[TAG_SIZE..TAG_SIZE + 4], &[1, 0, 0, 0]);

        let end = state.write_packet_nonce(&mut pkt, TAG_SIZE);
        assert_eq!(&pkt.payload_mut()[TAG_SIZE..TAG_SIZE + 4], &[2, 0, 0, 0]);
        assert_eq!(end, TAG_SIZE + 4);

        assert_eq!(state, CryptoState::Lite(Wrapping(2)));
    }

    #[test]
    fn lite_counter_wraps() {
        let mut state = CryptoState::Lite(Wrapping(u32::MAX));
        let mut buf = [0u8; MutableRtpPacket::minimum_packet_size() + TAG_SIZE + 4];
        let mut pkt = MutableRtpPacket::new(&mut buf[..]).unwrap();

        state.write_packet_nonce(&mut pkt, TAG_SIZE);
        assert_eq!(&pkt.payload_mut()[TAG_SIZE..TAG_SIZE + 4], &[0, 0, 0, 0]);
    }

    #[test]
    fn mode_names_match_negotiation_strings() {
        assert_eq!(CryptoMode::Normal.to_request_str(), "xsalsa20_poly1305");
        assert_eq!(CryptoMode::Suffix.to_request_str(), "xsalsa20_poly1305_suffix");
        assert_eq!(CryptoMode::Lite.to_request_str(), "xsalsa20_poly1305_lite");
        assert_eq!(CryptoMode::Aes256Gcm.to_request_str(), "aead_aes256_gcm");
    }
}
