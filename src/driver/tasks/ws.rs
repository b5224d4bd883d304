use super::message::*;
use crate::{
    driver::SharedState,
    events::VoiceEvent,
    model::{
        payload::{Heartbeat, Speaking, SPEAKING_MICROPHONE},
        CloseCode,
        Event as GatewayEvent,
    },
    speakers::SpeakerRegistry,
    ws::{Error as WsError, WsStream},
};
use flume::Receiver;
use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{
    select,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, trace, warn};

pub(crate) struct AuxNetwork {
    rx: Receiver<WsMessage>,
    ws_client: WsStream,
    dont_send: bool,

    ssrc: u32,
    heartbeat_interval: Duration,

    speaking: bool,
    last_heartbeat_nonce: Option<u64>,

    shared: Arc<SharedState>,
    speakers: Arc<SpeakerRegistry>,
    announced: HashSet<u32>,
}

impl AuxNetwork {
    pub(crate) fn new(
        evt_rx: Receiver<WsMessage>,
        ws_client: WsStream,
        ssrc: u32,
        heartbeat_interval: f64,
        shared: Arc<SharedState>,
        speakers: Arc<SpeakerRegistry>,
    ) -> Self {
        Self {
            rx: evt_rx,
            ws_client,
            dont_send: false,

            ssrc,
            heartbeat_interval: Duration::from_secs_f64(heartbeat_interval / 1000.0),

            speaking: false,
            last_heartbeat_nonce: None,

            shared,
            speakers,
            announced: HashSet::new(),
        }
    }

    async fn run(&mut self, interconnect: &mut Interconnect) {
        let mut next_heartbeat = Instant::now() + self.heartbeat_interval;

        loop {
            let mut ws_error = None;

            let hb = sleep_until(next_heartbeat);

            select! {
                () = hb => {
                    ws_error = self.send_heartbeat().await.err();
                    next_heartbeat = self.next_heartbeat();
                }
                ws_msg = self.ws_client.recv_json_no_timeout(), if !self.dont_send => {
                    match ws_msg {
                        Err(e) => ws_error = Some(e),
                        Ok(Some(msg)) => self.process_ws(interconnect, msg),
                        _ => {},
                    }
                }
                inner_msg = self.rx.recv_async() => {
                    match inner_msg {
                        Ok(WsMessage::Ws(data)) => {
                            self.ws_client = *data;
                            next_heartbeat = self.next_heartbeat();
                            self.dont_send = false;
                        },
                        Ok(WsMessage::SetKeepalive(keepalive)) => {
                            self.heartbeat_interval = Duration::from_secs_f64(keepalive / 1000.0);
                            next_heartbeat = self.next_heartbeat();
                        },
                        Ok(WsMessage::Speaking(is_speaking)) => {
                            if self.speaking != is_speaking && !self.dont_send {
                                self.speaking = is_speaking;
                                info!("Changing to speaking={:?}", is_speaking);

                                let flags = if is_speaking { SPEAKING_MICROPHONE } else { 0 };
                                ws_error = self.ws_client
                                    .send_json(&GatewayEvent::from(Speaking {
                                        speaking: flags,
                                        delay: Some(0),
                                        ssrc: self.ssrc,
                                        user_id: None,
                                    }))
                                    .await
                                    .err();
                            }
                        },
                        Ok(WsMessage::Poison) | Err(flume::RecvError::Disconnected) => {
                            break;
                        },
                    }
                }
            }

            if let Some(e) = ws_error {
                self.dont_send = true;

                let (resumable, code) = close_disposition(&e);
                if resumable {
                    drop(interconnect.core.send(CoreMessage::Reconnect));
                } else {
                    drop(interconnect.core.send(CoreMessage::SignalWsClosure(code)));
                    break;
                }
            }
        }

        // Remote speakers were announced on this channel: without it their
        // SSRCs can no longer be trusted, so drop them on the way out.
        for ssrc in std::mem::take(&mut self.announced) {
            if let Some((user_id, was_open)) = self.speakers.remove(ssrc) {
                if was_open {
                    interconnect
                        .events
                        .fire(VoiceEvent::SpeakEnd { user_id, ssrc });
                }
            }
        }
    }

    fn next_heartbeat(&self) -> Instant {
        Instant::now() + self.heartbeat_interval
    }

    async fn send_heartbeat(&mut self) -> Result<(), WsError> {
        let nonce = unix_millis();
        self.last_heartbeat_nonce = Some(nonce);

        trace!("Sent heartbeat {:?}", nonce);

        if !self.dont_send {
            self.ws_client
                .send_json(&GatewayEvent::from(Heartbeat { nonce }))
                .await?;
        }

        Ok(())
    }

    fn process_ws(&mut self, interconnect: &Interconnect, value: GatewayEvent) {
        match value {
            GatewayEvent::Speaking(ev) => {
                if let Some(user_id) = ev.user_id {
                    self.announced.insert(ev.ssrc);

                    if self.speakers.announce(ev.ssrc, user_id) {
                        interconnect.events.fire(VoiceEvent::SpeakStart {
                            user_id,
                            ssrc: ev.ssrc,
                        });
                    }
                }
            },
            GatewayEvent::ClientDisconnect(ev) => {
                if let Some((ssrc, was_open)) = self.speakers.remove_user(ev.user_id) {
                    self.announced.remove(&ssrc);

                    if was_open {
                        interconnect.events.fire(VoiceEvent::SpeakEnd {
                            user_id: ev.user_id,
                            ssrc,
                        });
                    }
                }
            },
            GatewayEvent::HeartbeatAck(ev) => {
                if let Some(nonce) = self.last_heartbeat_nonce.take() {
                    if ev.nonce == nonce {
                        let ping = Duration::from_millis(unix_millis().saturating_sub(nonce));
                        self.shared.set_ping(ping);
                        trace!("Heartbeat ACK received, ping {:?}.", ping);
                    } else {
                        warn!(
                            "Heartbeat nonce mismatch! Expected {}, saw {}.",
                            nonce, ev.nonce
                        );
                    }
                }
            },
            other => {
                trace!("Received other websocket data: {:?}", other);
            },
        }
    }
}

pub(crate) async fn runner(mut interconnect: Interconnect, mut aux: AuxNetwork) {
    trace!("WS thread started.");
    aux.run(&mut interconnect).await;
    trace!("WS thread finished.");
}

/// Whether a signalling failure may be recovered by resuming, and the
/// close code received (if any).
fn close_disposition(err: &WsError) -> (bool, Option<CloseCode>) {
    match err {
        WsError::WsClosed(Some(frame)) => {
            let code = CloseCode::from(u16::from(frame.code));
            (code.should_resume(), Some(code))
        },
        WsError::WsClosed(None) => (false, None),
        e => {
            debug!("Error sending/receiving ws {:?}.", e);
            (false, None)
        },
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
