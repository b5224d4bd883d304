use crate::input::OpusStream;

#[derive(Debug)]
pub(crate) enum PlayerMessage {
    Play(OpusStream),
    Stop,
    Pause,
    Unpause,
    Poison,
}
