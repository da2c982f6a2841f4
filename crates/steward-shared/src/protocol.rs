//! Engine.IO v4 / Socket.IO v5 text framing used by the push channel.
//!
//! Each websocket text frame is one Engine.IO packet: a single digit type
//! followed by an optional payload. Engine.IO `message` packets wrap a
//! Socket.IO packet, whose layout is
//! `<type>[<namespace>,][<ack id>][<json payload>]`.
//! Binary attachments are not used by the notification server and are
//! rejected.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolError;

/// Session parameters sent by the server in the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

/// One Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// One Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

const DEFAULT_NAMESPACE: &str = "/";

impl EnginePacket {
    /// Decode a websocket text frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(ProtocolError::EmptyFrame)?;
        let payload = chars.as_str();

        match kind {
            '0' => serde_json::from_str(payload)
                .map(EnginePacket::Open)
                .map_err(|e| ProtocolError::InvalidPayload(format!("open handshake: {e}"))),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(payload.to_string())),
            '3' => Ok(EnginePacket::Pong(payload.to_string())),
            '4' => SocketPacket::decode(payload).map(EnginePacket::Message),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(ProtocolError::UnknownEnginePacket(other)),
        }
    }

    /// Encode as a websocket text frame.
    pub fn encode(&self) -> String {
        match self {
            // Clients never send `open`; an empty object keeps the frame well formed.
            EnginePacket::Open(_) => "0{}".to_string(),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(packet) => format!("4{}", packet.encode()),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

impl SocketPacket {
    /// Connect request for the default namespace.
    pub fn connect() -> Self {
        SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: None,
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::EmptyFrame)?;
        let rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(ProtocolError::InvalidPayload("binary packets are not supported".into()));
        }

        let (namespace, rest) = split_namespace(rest);
        let (ack, rest) = split_ack(rest);
        let data = if rest.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(rest)
                    .map_err(|e| ProtocolError::InvalidPayload(format!("packet data: {e}")))?,
            )
        };

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut args = match data {
                    Some(Value::Array(items)) => items,
                    _ => return Err(ProtocolError::InvalidPayload("event data must be an array".into())),
                };
                if args.is_empty() {
                    return Err(ProtocolError::InvalidPayload("event without a name".into()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(ProtocolError::InvalidPayload(format!("event name must be a string, got {other}")))
                    }
                };
                Ok(SocketPacket::Event {
                    namespace,
                    ack,
                    name,
                    args,
                })
            }
            '3' => {
                let ack = ack.ok_or_else(|| ProtocolError::InvalidPayload("ack without id".into()))?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    None => Vec::new(),
                    Some(_) => return Err(ProtocolError::InvalidPayload("ack data must be an array".into())),
                };
                Ok(SocketPacket::Ack { namespace, ack, args })
            }
            '4' => Ok(SocketPacket::ConnectError { namespace, data }),
            other => Err(ProtocolError::UnknownSocketPacket(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect { namespace, data } => {
                format!("0{}{}", namespace_prefix(namespace), data.as_ref().map(Value::to_string).unwrap_or_default())
            }
            SocketPacket::Disconnect { namespace } => format!("1{}", namespace_prefix(namespace)),
            SocketPacket::Event {
                namespace,
                ack,
                name,
                args,
            } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!(
                    "2{}{}{}",
                    namespace_prefix(namespace),
                    ack.map(|id| id.to_string()).unwrap_or_default(),
                    Value::Array(items)
                )
            }
            SocketPacket::Ack { namespace, ack, args } => {
                format!("3{}{}{}", namespace_prefix(namespace), ack, Value::Array(args.clone()))
            }
            SocketPacket::ConnectError { namespace, data } => {
                format!("4{}{}", namespace_prefix(namespace), data.as_ref().map(Value::to_string).unwrap_or_default())
            }
        }
    }
}

/// Namespaces other than `/` are written as `/name,` before the payload.
fn namespace_prefix(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE || namespace.is_empty() {
        String::new()
    } else {
        format!("{namespace},")
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => (rest[..idx].to_string(), &rest[idx + 1..]),
            None => (rest.to_string(), ""),
        }
    } else {
        (DEFAULT_NAMESPACE.to_string(), rest)
    }
}

fn split_ack(rest: &str) -> (Option<u64>, &str) {
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, rest);
    }
    (rest[..digits].parse().ok(), &rest[digits..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#,
        )
        .unwrap();
        match packet {
            EnginePacket::Open(hs) => {
                assert_eq!(hs.sid, "lv_VI97HAXpY6yYWAAAC");
                assert_eq!(hs.ping_timeout, 5000);
                assert_eq!(hs.max_payload, Some(1_000_000));
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn test_ping_pong() {
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(EnginePacket::decode("2probe").unwrap(), EnginePacket::Ping("probe".into()));
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
    }

    #[test]
    fn test_decode_notification_event() {
        let frame = r#"42["new_notification",{"id":3,"title":"Budget approved","is_read":false}]"#;
        match EnginePacket::decode(frame).unwrap() {
            EnginePacket::Message(SocketPacket::Event {
                namespace,
                ack,
                name,
                args,
            }) => {
                assert_eq!(namespace, "/");
                assert_eq!(ack, None);
                assert_eq!(name, "new_notification");
                assert_eq!(args[0]["id"], json!(3));
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = SocketPacket::decode(r#"2/admin,12["ping",1]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/admin".into(),
                ack: Some(12),
                name: "ping".into(),
                args: vec![json!(1)],
            }
        );
        assert_eq!(packet.encode(), r#"2/admin,12["ping",1]"#);
    }

    #[test]
    fn test_connect_frames() {
        assert_eq!(EnginePacket::Message(SocketPacket::connect()).encode(), "40");
        assert_eq!(
            EnginePacket::decode(r#"40{"sid":"wZX3oN0bSVIhsaknAAAI"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::Connect {
                namespace: "/".into(),
                data: Some(json!({ "sid": "wZX3oN0bSVIhsaknAAAI" })),
            })
        );
        assert!(matches!(
            EnginePacket::decode(r#"44{"message":"Not authorized"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::ConnectError { .. })
        ));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(EnginePacket::decode(""), Err(ProtocolError::EmptyFrame));
        assert_eq!(EnginePacket::decode("9"), Err(ProtocolError::UnknownEnginePacket('9')));
        assert!(EnginePacket::decode(r#"42{"not":"array"}"#).is_err());
        assert!(EnginePacket::decode("42[]").is_err());
        assert!(EnginePacket::decode(r#"451-["upload",{"_placeholder":true,"num":0}]"#).is_err());
    }
}
