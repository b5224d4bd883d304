//! Messages exchanged between the tasks serving one connection.

mod core;
mod player;
mod udp_rx;
mod ws;

pub(crate) use self::{core::*, player::*, udp_rx::*, ws::*};

use crate::events::EventSink;
use flume::Sender;

/// Handles for a task to reach the rest of its connection.
#[derive(Clone)]
pub(crate) struct Interconnect {
    pub core: Sender<CoreMessage>,
    pub events: EventSink,
}
