pub(crate) mod message;
pub(crate) mod player;
pub(crate) mod udp_rx;
pub(crate) mod ws;

use super::{connection::Connection, ConnectionStatus, SharedState};
use crate::{
    events::{EventSink, VoiceEvent},
    manager::RegistryHandle,
    speakers::SpeakerRegistry,
    Config,
    Error,
};
use flume::{Receiver, Sender};
use message::*;
use std::sync::Arc;
use tokio::spawn;
use tracing::{debug, trace};

/// Everything the per-connection serializer task needs to run.
pub(crate) struct Core {
    pub config: Config,
    pub shared: Arc<SharedState>,
    pub speakers: Arc<SpeakerRegistry>,
    pub registry: Option<RegistryHandle>,
}

pub(crate) fn start(
    core: Core,
    events: EventSink,
    rx: Receiver<CoreMessage>,
    tx: Sender<CoreMessage>,
) {
    spawn(async move {
        trace!("Driver started.");
        runner(core, events, rx, tx).await;
        trace!("Driver finished.");
    });
}

/// Serialises every state transition for one connection.
///
/// Signalling callbacks, UDP failures, playback commands, and teardown all
/// funnel through this loop, so the connection's fields are never touched
/// concurrently.
async fn runner(core: Core, events: EventSink, rx: Receiver<CoreMessage>, tx: Sender<CoreMessage>) {
    let interconnect = Interconnect {
        core: tx,
        events: events.clone(),
    };

    let mut connection: Option<Connection> = None;

    let set_status = |new: ConnectionStatus| {
        let old = core.shared.swap_status(new);
        if old != new {
            events.fire(VoiceEvent::StateChange { old, new });
        }
    };

    while let Ok(msg) = rx.recv_async().await {
        match msg {
            CoreMessage::ConnectWithResult(info, result_tx) => {
                set_status(ConnectionStatus::Connecting);

                match Connection::new(
                    info,
                    &interconnect,
                    &core.config,
                    &core.shared,
                    &core.speakers,
                )
                .await
                {
                    Ok(conn) => {
                        connection = Some(conn);
                        set_status(ConnectionStatus::Ready);
                        drop(result_tx.send(Ok(())));
                    },
                    Err(why) => {
                        connection = None;
                        set_status(ConnectionStatus::Disconnected);

                        // The requester may have hung up (fire-and-forget
                        // connects): surface the fault on the event stream
                        // instead of losing it.
                        if result_tx.is_disconnected() {
                            events.error(Error::Connect(why));
                        } else {
                            drop(result_tx.send(Err(why)));
                        }
                    },
                }
            },
            CoreMessage::Play(source) => match &connection {
                Some(conn) => drop(conn.player.send(PlayerMessage::Play(source))),
                None => events.error(Error::NoUdpInfo),
            },
            CoreMessage::Stop =>
                if let Some(conn) = &connection {
                    drop(conn.player.send(PlayerMessage::Stop));
                },
            CoreMessage::Pause =>
                if let Some(conn) = &connection {
                    drop(conn.player.send(PlayerMessage::Pause));
                },
            CoreMessage::Unpause =>
                if let Some(conn) = &connection {
                    drop(conn.player.send(PlayerMessage::Unpause));
                },
            CoreMessage::Reconnect =>
                if let Some(mut conn) = connection.take() {
                    match conn.reconnect(&core.config).await {
                        Ok(()) => connection = Some(conn),
                        Err(why) => {
                            debug!("Resume failed for {:?}: {}", conn.info.guild_id, why);
                            set_status(ConnectionStatus::Disconnected);
                            events.error(Error::Connect(why));
                        },
                    }
                },
            CoreMessage::SignalWsClosure(code) =>
                if connection.is_some() {
                    connection = None;
                    set_status(ConnectionStatus::Disconnected);
                    events.error(Error::WsClosed(code));
                },
            CoreMessage::SignalUdpError(e) => {
                connection = None;
                events.error(Error::Udp(e));
                set_status(ConnectionStatus::Destroyed);
                if let Some(registry) = &core.registry {
                    registry.remove();
                }
                break;
            },
            CoreMessage::Destroy => {
                connection = None;
                set_status(ConnectionStatus::Destroyed);
                if let Some(registry) = &core.registry {
                    registry.remove();
                }
                break;
            },
        }
    }

    trace!("Main thread exited");
}
