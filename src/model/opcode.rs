use serde::{Deserialize, Serialize};
use std::fmt;

use self::OpCode::*;

/// Operation code attached to every voice gateway message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OpCode {
    /// Client's first message, authenticating a new session.
    Identify,
    /// Client's chosen transport protocol and encryption mode.
    SelectProtocol,
    /// Server's UDP rendezvous details.
    Ready,
    /// Periodic client liveness signal.
    Heartbeat,
    /// Server's delivery of the session encryption key.
    SessionDescription,
    /// Speaking-state change, in either direction.
    Speaking,
    /// Server's echo of the last heartbeat.
    HeartbeatAck,
    /// Client's request to pick up a dropped session.
    Resume,
    /// Server's first message, carrying the heartbeat interval.
    Hello,
    /// Server's acknowledgement of a resume.
    Resumed,
    /// A remote user left the call.
    ClientDisconnect,
    /// Any opcode this library does not speak.
    Unknown(u8),
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        match op {
            Identify => 0,
            SelectProtocol => 1,
            Ready => 2,
            Heartbeat => 3,
            SessionDescription => 4,
            Speaking => 5,
            HeartbeatAck => 6,
            Resume => 7,
            Hello => 8,
            Resumed => 9,
            ClientDisconnect => 13,
            Unknown(op) => op,
        }
    }
}

impl From<u8> for OpCode {
    fn from(op: u8) -> OpCode {
        match op {
            0 => Identify,
            1 => SelectProtocol,
            2 => Ready,
            3 => Heartbeat,
            4 => SessionDescription,
            5 => Speaking,
            6 => HeartbeatAck,
            7 => Resume,
            8 => Hello,
            9 => Resumed,
            13 => ClientDisconnect,
            other => Unknown(other),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op: u8 = (*self).into();
        write!(f, "{op}")
    }
}

impl Serialize for OpCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8((*self).into())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        u8::deserialize(deserializer).map(Into::into)
    }
}
