//! Wire protocol: one UTF-8 JSON object per frame.
//!
//! Client → server: the first frame must be `{"accion":"auth","nombre":"..."}`.
//! Any later frame is opaque JSON relayed as-is.
//!
//! Server → client: [`ServerMessage`], tagged by `tipo`.

use std::sync::Arc;

use relay_core::{RelayError, Result};
use serde::Serialize;
use serde_json::Value;

/// Name assigned when the auth frame carries none.
pub const DEFAULT_NODE_NAME: &str = "Anónimo";

/// One serialized outbound frame, shared by every target of a broadcast.
pub type Frame = Arc<str>;

/// A decoded `accion: "auth"` frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthRequest {
    /// Display name, already defaulted.
    pub name: String,
}

impl AuthRequest {
    /// Decode a first frame.
    ///
    /// Returns `Ok(None)` for valid JSON that is not an auth request, and
    /// [`RelayError::Decode`] for text that is not JSON at all.
    pub fn decode(text: &str) -> Result<Option<Self>> {
        let value: Value = serde_json::from_str(text).map_err(RelayError::Decode)?;
        if value.get("accion").and_then(Value::as_str) != Some("auth") {
            return Ok(None);
        }
        let name = value
            .get("nombre")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_NODE_NAME)
            .to_owned();
        Ok(Some(Self { name }))
    }
}

/// Decode a relayed frame. Any JSON value is accepted.
pub fn decode_payload(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(RelayError::Decode)
}

/// Server → client envelopes.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, directly to a node that just authenticated.
    AuthOk {
        /// Greeting text, `"Bienvenido <name>"`.
        mensaje: String,
        /// Membership count including the new node.
        total_nodos: usize,
    },
    /// A node joined; sent to everyone but the joiner.
    NodoConectado {
        /// Name of the joining node.
        nodo: String,
        /// Membership count including the new node.
        total_nodos: usize,
    },
    /// A relayed frame; sent to everyone but the sender.
    Mensaje {
        /// Name of the sending node.
        remitente: String,
        /// The sender's decoded JSON, untouched.
        contenido: Value,
        /// When the relay received the frame.
        timestamp: String,
    },
    /// A node left; sent to every remaining node.
    NodoDesconectado {
        /// Name of the departed node.
        nodo: String,
        /// Membership count after removal.
        total_nodos: usize,
    },
}

impl ServerMessage {
    /// Auth acknowledgement.
    pub fn auth_ok(name: &str, total: usize) -> Self {
        Self::AuthOk {
            mensaje: format!("Bienvenido {name}"),
            total_nodos: total,
        }
    }

    /// Join notice.
    pub fn node_connected(name: &str, total: usize) -> Self {
        Self::NodoConectado {
            nodo: name.to_owned(),
            total_nodos: total,
        }
    }

    /// Relay envelope stamped with the current time.
    pub fn relayed(sender: &str, content: Value) -> Self {
        Self::Mensaje {
            remitente: sender.to_owned(),
            contenido: content,
            timestamp: relay_core::events::now_timestamp(),
        }
    }

    /// Leave notice.
    pub fn node_disconnected(name: &str, total: usize) -> Self {
        Self::NodoDesconectado {
            nodo: name.to_owned(),
            total_nodos: total,
        }
    }

    /// Value of the `tipo` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthOk { .. } => "auth_ok",
            Self::NodoConectado { .. } => "nodo_conectado",
            Self::Mensaje { .. } => "mensaje",
            Self::NodoDesconectado { .. } => "nodo_desconectado",
        }
    }

    /// Serialize into a shareable frame.
    pub fn to_frame(&self) -> Result<Frame> {
        let json = serde_json::to_string(self).map_err(RelayError::Encode)?;
        Ok(Arc::from(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(frame: &Frame) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[test]
    fn auth_with_name() {
        let req = AuthRequest::decode(r#"{"accion":"auth","nombre":"A"}"#).unwrap();
        assert_eq!(req, Some(AuthRequest { name: "A".into() }));
    }

    #[test]
    fn auth_without_name_defaults() {
        let req = AuthRequest::decode(r#"{"accion":"auth"}"#).unwrap().unwrap();
        assert_eq!(req.name, DEFAULT_NODE_NAME);
    }

    #[test]
    fn auth_with_empty_name_defaults() {
        let req = AuthRequest::decode(r#"{"accion":"auth","nombre":""}"#).unwrap().unwrap();
        assert_eq!(req.name, "Anónimo");
    }

    #[test]
    fn auth_with_non_string_name_defaults() {
        let req = AuthRequest::decode(r#"{"accion":"auth","nombre":42}"#).unwrap().unwrap();
        assert_eq!(req.name, DEFAULT_NODE_NAME);
    }

    #[test]
    fn non_auth_action_is_none() {
        assert_eq!(AuthRequest::decode(r#"{"accion":"join"}"#).unwrap(), None);
        assert_eq!(AuthRequest::decode(r#"{"texto":"hola"}"#).unwrap(), None);
        assert_eq!(AuthRequest::decode("[1,2]").unwrap(), None);
        assert_eq!(AuthRequest::decode("\"auth\"").unwrap(), None);
    }

    #[test]
    fn garbage_first_frame_is_decode_error() {
        let err = AuthRequest::decode("hello").unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
    }

    #[test]
    fn payload_accepts_any_json() {
        assert_eq!(decode_payload(r#"{"texto":"hi"}"#).unwrap(), json!({"texto": "hi"}));
        assert_eq!(decode_payload("7").unwrap(), json!(7));
        assert!(decode_payload("{oops").is_err());
    }

    #[test]
    fn auth_ok_wire_shape() {
        let frame = ServerMessage::auth_ok("A", 1).to_frame().unwrap();
        assert_eq!(
            parse(&frame),
            json!({"tipo": "auth_ok", "mensaje": "Bienvenido A", "total_nodos": 1})
        );
    }

    #[test]
    fn node_connected_wire_shape() {
        let frame = ServerMessage::node_connected("B", 2).to_frame().unwrap();
        assert_eq!(
            parse(&frame),
            json!({"tipo": "nodo_conectado", "nodo": "B", "total_nodos": 2})
        );
    }

    #[test]
    fn relayed_wire_shape() {
        let frame = ServerMessage::relayed("A", json!({"texto": "hi"})).to_frame().unwrap();
        let v = parse(&frame);
        assert_eq!(v["tipo"], "mensaje");
        assert_eq!(v["remitente"], "A");
        assert_eq!(v["contenido"], json!({"texto": "hi"}));
        assert!(chrono::DateTime::parse_from_rfc3339(v["timestamp"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn node_disconnected_wire_shape() {
        let frame = ServerMessage::node_disconnected("B", 1).to_frame().unwrap();
        assert_eq!(
            parse(&frame),
            json!({"tipo": "nodo_desconectado", "nodo": "B", "total_nodos": 1})
        );
    }

    #[test]
    fn kind_matches_tag() {
        let messages = [
            ServerMessage::auth_ok("x", 1),
            ServerMessage::node_connected("x", 1),
            ServerMessage::relayed("x", json!(null)),
            ServerMessage::node_disconnected("x", 0),
        ];
        for msg in messages {
            let v = parse(&msg.to_frame().unwrap());
            assert_eq!(v["tipo"], msg.kind());
        }
    }
}
