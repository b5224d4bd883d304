use crate::ws::WsStream;

pub(crate) enum WsMessage {
    /// Replacement signalling channel after a resume.
    Ws(Box<WsStream>),
    /// New heartbeat interval, in milliseconds.
    SetKeepalive(f64),
    /// Desired speaking state around a play episode.
    Speaking(bool),
    Poison,
}
