//! Registry of remote speakers, keyed by RTP synchronisation source.
//!
//! Entries are created when the gateway announces a speaker, their byte
//! stream opens with speak-start and closes with speak-end, and the
//! entry disappears when the user leaves or the owning connection dies.

use crate::id::UserId;
use bytes::Bytes;
use dashmap::DashMap;
use flume::{Receiver, Sender};

/// One remote speaker's live Opus stream.
///
/// Handles returned by [`Voice::get_speak_stream`] all view the same
/// underlying stream; once the speaker falls silent the stream ends and
/// [`recv`] drains any remainder before returning `None`.
///
/// [`Voice::get_speak_stream`]: crate::Voice::get_speak_stream
/// [`recv`]: SpeakStream::recv
#[derive(Clone, Debug)]
pub struct SpeakStream {
    rx: Receiver<Bytes>,
}

impl SpeakStream {
    /// Receives the next Opus frame, or `None` once the stream has closed
    /// and drained.
    pub async fn recv(&self) -> Option<Bytes> {
        self.rx.recv_async().await.ok()
    }

    /// Receives the next Opus frame if one is already buffered.
    pub fn try_recv(&self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

struct RemoteSpeaker {
    user_id: UserId,
    channel: Option<(Sender<Bytes>, Receiver<Bytes>)>,
}

/// Process-wide speaker registry, shared by every call under one [`Voice`].
///
/// [`Voice`]: crate::Voice
#[derive(Default)]
pub(crate) struct SpeakerRegistry {
    speakers: DashMap<u32, RemoteSpeaker>,
}

impl SpeakerRegistry {
    /// Registers an announced speaker with a freshly opened stream.
    ///
    /// Returns `true` if this opened a stream (first announcement, or a
    /// re-announcement after quiescence closed the previous one).
    pub(crate) fn announce(&self, ssrc: u32, user_id: UserId) -> bool {
        let mut entry = self.speakers.entry(ssrc).or_insert_with(|| RemoteSpeaker {
            user_id,
            channel: None,
        });

        entry.user_id = user_id;
        if entry.channel.is_none() {
            entry.channel = Some(flume::unbounded());
            true
        } else {
            false
        }
    }

    /// Reopens a known speaker's stream if quiescence had closed it.
    ///
    /// Returns the speaker and whether a new stream was opened; `None` for
    /// an unknown (never-announced) source.
    pub(crate) fn open(&self, ssrc: u32) -> Option<(UserId, bool)> {
        let mut entry = self.speakers.get_mut(&ssrc)?;

        let opened = entry.channel.is_none();
        if opened {
            entry.channel = Some(flume::unbounded());
        }

        Some((entry.user_id, opened))
    }

    /// Whether this source has ever been announced by the gateway.
    pub(crate) fn is_known(&self, ssrc: u32) -> bool {
        self.speakers.contains_key(&ssrc)
    }

    /// Publishes one decrypted Opus frame to a speaker's open stream.
    pub(crate) fn publish(&self, ssrc: u32, frame: Bytes) {
        if let Some(entry) = self.speakers.get(&ssrc) {
            if let Some((tx, _)) = &entry.channel {
                drop(tx.send(frame));
            }
        }
    }

    /// Closes a speaker's stream, keeping the registration.
    ///
    /// Returns the speaker if a stream was actually open.
    pub(crate) fn close(&self, ssrc: u32) -> Option<UserId> {
        let mut entry = self.speakers.get_mut(&ssrc)?;

        entry.channel.take().map(|_| entry.user_id)
    }

    /// Drops a speaker entirely, returning whether a stream was still open.
    pub(crate) fn remove(&self, ssrc: u32) -> Option<(UserId, bool)> {
        self.speakers
            .remove(&ssrc)
            .map(|(_, speaker)| (speaker.user_id, speaker.channel.is_some()))
    }

    /// Drops a departed user's entry, returning their source and whether a
    /// stream was still open.
    pub(crate) fn remove_user(&self, user_id: UserId) -> Option<(u32, bool)> {
        let ssrc = self
            .speakers
            .iter()
            .find(|entry| entry.user_id == user_id)
            .map(|entry| *entry.key())?;

        self.remove(ssrc).map(|(_, was_open)| (ssrc, was_open))
    }

    /// The speaker's live stream, if currently between speak-start and
    /// speak-end.
    pub(crate) fn get(&self, ssrc: u32) -> Option<SpeakStream> {
        let entry = self.speakers.get(&ssrc)?;

        entry
            .channel
            .as_ref()
            .map(|(_, rx)| SpeakStream { rx: rx.clone() })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stream_exists_only_while_open() {
        let reg = SpeakerRegistry::default();
        assert!(reg.get(42).is_none());

        assert!(reg.announce(42, UserId(7)));
        let stream = reg.get(42).expect("announced speaker should be readable");

        reg.publish(42, Bytes::from_static(b"frame"));
        assert_eq!(stream.try_recv().unwrap(), Bytes::from_static(b"frame"));

        assert_eq!(reg.close(42), Some(UserId(7)));
        assert!(reg.get(42).is_none());

        // Re-announcement opens a fresh stream.
        assert!(reg.announce(42, UserId(7)));
        assert!(reg.get(42).is_some());
    }

    #[test]
    fn same_stream_between_start_and_end() {
        let reg = SpeakerRegistry::default();
        reg.announce(9, UserId(1));

        let a = reg.get(9).unwrap();
        reg.publish(9, Bytes::from_static(b"x"));
        let b = reg.get(9).unwrap();

        // Both handles view the same underlying stream.
        assert_eq!(b.try_recv().unwrap(), Bytes::from_static(b"x"));
        assert!(a.try_recv().is_none());
    }

    #[test]
    fn double_close_reports_once() {
        let reg = SpeakerRegistry::default();
        reg.announce(3, UserId(5));

        assert_eq!(reg.close(3), Some(UserId(5)));
        assert_eq!(reg.close(3), None);
    }

    #[test]
    fn unknown_source_stays_unknown() {
        let reg = SpeakerRegistry::default();
        assert!(reg.open(1234).is_none());
        reg.publish(1234, Bytes::new());
        assert!(reg.get(1234).is_none());
    }

    #[test]
    fn departed_user_is_pruned() {
        let reg = SpeakerRegistry::default();
        reg.announce(3, UserId(5));

        assert_eq!(reg.remove_user(UserId(5)), Some((3, true)));
        assert!(reg.get(3).is_none());
        assert!(reg.open(3).is_none());
    }
}
