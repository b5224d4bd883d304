//! Typed model of the voice gateway's JSON protocol.
//!
//! Every frame on the wire is an object `{"op": <u8>, "d": <body>}`;
//! [`Event`] hides the envelope behind one enum with a variant per opcode.

mod close_code;
mod opcode;
pub mod payload;

pub use self::{close_code::CloseCode, opcode::OpCode};

use payload::*;
use serde::{
    de::Error as DeError,
    ser::{SerializeStruct, Serializer},
    Deserialize,
    Serialize,
};
use serde_json::Value;

/// A single voice gateway message, in either direction.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Event {
    /// Client's first message, authenticating a new session.
    Identify(Identify),
    /// Client's chosen transport protocol and encryption mode.
    SelectProtocol(SelectProtocol),
    /// Server's UDP rendezvous details.
    Ready(Ready),
    /// Periodic client liveness signal.
    Heartbeat(Heartbeat),
    /// Server's delivery of the session encryption key.
    SessionDescription(SessionDescription),
    /// Speaking-state change, in either direction.
    Speaking(Speaking),
    /// Server's echo of the last heartbeat.
    HeartbeatAck(HeartbeatAck),
    /// Client's request to pick up a dropped session.
    Resume(Resume),
    /// Server's first message, carrying the heartbeat interval.
    Hello(Hello),
    /// Server's acknowledgement of a resume.
    Resumed,
    /// A remote user left the call.
    ClientDisconnect(ClientDisconnect),
}

impl Event {
    /// The opcode this event travels under.
    pub fn kind(&self) -> OpCode {
        match self {
            Event::Identify(_) => OpCode::Identify,
            Event::SelectProtocol(_) => OpCode::SelectProtocol,
            Event::Ready(_) => OpCode::Ready,
            Event::Heartbeat(_) => OpCode::Heartbeat,
            Event::SessionDescription(_) => OpCode::SessionDescription,
            Event::Speaking(_) => OpCode::Speaking,
            Event::HeartbeatAck(_) => OpCode::HeartbeatAck,
            Event::Resume(_) => OpCode::Resume,
            Event::Hello(_) => OpCode::Hello,
            Event::Resumed => OpCode::Resumed,
            Event::ClientDisconnect(_) => OpCode::ClientDisconnect,
        }
    }
}

impl Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Event", 2)?;
        state.serialize_field("op", &self.kind())?;

        match self {
            Event::Identify(body) => state.serialize_field("d", body)?,
            Event::SelectProtocol(body) => state.serialize_field("d", body)?,
            Event::Ready(body) => state.serialize_field("d", body)?,
            Event::Heartbeat(body) => state.serialize_field("d", body)?,
            Event::SessionDescription(body) => state.serialize_field("d", body)?,
            Event::Speaking(body) => state.serialize_field("d", body)?,
            Event::HeartbeatAck(body) => state.serialize_field("d", body)?,
            Event::Resume(body) => state.serialize_field("d", body)?,
            Event::Hello(body) => state.serialize_field("d", body)?,
            Event::Resumed => state.serialize_field("d", &Value::Null)?,
            Event::ClientDisconnect(body) => state.serialize_field("d", body)?,
        }

        state.end()
    }
}

#[derive(Deserialize)]
struct RawEvent {
    op: OpCode,
    #[serde(default)]
    d: Value,
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawEvent::deserialize(deserializer)?;
        let body = raw.d;

        let parsed = match raw.op {
            OpCode::Identify => serde_json::from_value(body).map(Event::Identify),
            OpCode::SelectProtocol => serde_json::from_value(body).map(Event::SelectProtocol),
            OpCode::Ready => serde_json::from_value(body).map(Event::Ready),
            OpCode::Heartbeat => serde_json::from_value(body).map(Event::Heartbeat),
            OpCode::SessionDescription =>
                serde_json::from_value(body).map(Event::SessionDescription),
            OpCode::Speaking => serde_json::from_value(body).map(Event::Speaking),
            OpCode::HeartbeatAck => serde_json::from_value(body).map(Event::HeartbeatAck),
            OpCode::Resume => serde_json::from_value(body).map(Event::Resume),
            OpCode::Hello => serde_json::from_value(body).map(Event::Hello),
            OpCode::Resumed => return Ok(Event::Resumed),
            OpCode::ClientDisconnect => serde_json::from_value(body).map(Event::ClientDisconnect),
            OpCode::Unknown(op) => return Err(D::Error::custom(format!("unknown opcode {op}"))),
        };

        parsed.map_err(D::Error::custom)
    }
}

impl From<Identify> for Event {
    fn from(body: Identify) -> Self {
        Event::Identify(body)
    }
}

impl From<SelectProtocol> for Event {
    fn from(body: SelectProtocol) -> Self {
        Event::SelectProtocol(body)
    }
}

impl From<Heartbeat> for Event {
    fn from(body: Heartbeat) -> Self {
        Event::Heartbeat(body)
    }
}

impl From<Speaking> for Event {
    fn from(body: Speaking) -> Self {
        Event::Speaking(body)
    }
}

impl From<Resume> for Event {
    fn from(body: Resume) -> Self {
        Event::Resume(body)
    }
}

#[cfg(test)]
mod test {
    use super::{payload::*, Event};
    use crate::id::{GuildId, UserId};

    #[test]
    fn heartbeat_envelope() {
        let json = serde_json::to_string(&Event::from(Heartbeat {
            nonce: 1_501_184_119_561,
        }))
        .unwrap();

        assert_eq!(json, r#"{"op":3,"d":1501184119561}"#);
    }

    #[test]
    fn identify_envelope() {
        let json = serde_json::to_string(&Event::from(Identify {
            server_id: GuildId(41_771_983_423_143_937),
            session_id: "my_session_id".into(),
            token: "my_token".into(),
            user_id: UserId(104_694_319_306_248_192),
        }))
        .unwrap();

        assert_eq!(
            json,
            r#"{"op":0,"d":{"server_id":41771983423143937,"session_id":"my_session_id","token":"my_token","user_id":104694319306248192}}"#
        );
    }

    #[test]
    fn client_speaking_omits_user_id() {
        let json = serde_json::to_string(&Event::from(Speaking {
            speaking: SPEAKING_MICROPHONE,
            delay: Some(0),
            ssrc: 1,
            user_id: None,
        }))
        .unwrap();

        assert_eq!(json, r#"{"op":5,"d":{"speaking":1,"delay":0,"ssrc":1}}"#);
    }

    #[test]
    fn ready_parses() {
        let ev: Event = serde_json::from_str(
            r#"{"op":2,"d":{"ssrc":123,"ip":"1.2.3.4","port":50000,"modes":["xsalsa20_poly1305","xsalsa20_poly1305_lite"],"heartbeat_interval":1}}"#,
        )
        .unwrap();

        match ev {
            Event::Ready(r) => {
                assert_eq!(r.ssrc, 123);
                assert_eq!(r.ip, "1.2.3.4".parse::<std::net::IpAddr>().unwrap());
                assert_eq!(r.port, 50_000);
                assert_eq!(r.modes.len(), 2);
            },
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn session_description_parses() {
        let key: Vec<u8> = (0u8..32).collect();
        let ev: Event = serde_json::from_str(&format!(
            r#"{{"op":4,"d":{{"mode":"xsalsa20_poly1305_lite","secret_key":{key:?}}}}}"#,
        ))
        .unwrap();

        match ev {
            Event::SessionDescription(desc) => {
                assert_eq!(desc.mode, "xsalsa20_poly1305_lite");
                assert_eq!(desc.secret_key, key);
            },
            other => panic!("expected session description, got {other:?}"),
        }
    }

    #[test]
    fn server_speaking_carries_user_id() {
        let ev: Event =
            serde_json::from_str(r#"{"op":5,"d":{"speaking":1,"ssrc":42,"user_id":1234}}"#)
                .unwrap();

        match ev {
            Event::Speaking(sp) => {
                assert_eq!(sp.ssrc, 42);
                assert_eq!(sp.user_id, Some(UserId(1234)));
            },
            other => panic!("expected speaking, got {other:?}"),
        }
    }

    #[test]
    fn resumed_has_no_body() {
        let ev: Event = serde_json::from_str(r#"{"op":9,"d":null}"#).unwrap();
        assert_eq!(ev, Event::Resumed);
    }

    #[test]
    fn unknown_opcode_rejected() {
        assert!(serde_json::from_str::<Event>(r#"{"op":18,"d":{}}"#).is_err());
    }
}
