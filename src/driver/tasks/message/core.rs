use crate::{
    driver::connection::error::Error,
    input::OpusStream,
    model::CloseCode,
    ConnectionInfo,
};
use flume::Sender;
use std::io::Error as IoError;

#[derive(Debug)]
pub(crate) enum CoreMessage {
    ConnectWithResult(ConnectionInfo, Sender<Result<(), Error>>),
    Play(OpusStream),
    Stop,
    Pause,
    Unpause,
    /// The signalling channel died with a resumable close code.
    Reconnect,
    /// The signalling channel died and cannot be resumed.
    SignalWsClosure(Option<CloseCode>),
    /// The UDP transport failed underneath the connection.
    SignalUdpError(IoError),
    Destroy,
}
