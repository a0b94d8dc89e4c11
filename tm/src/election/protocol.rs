//! Wire format for the election messages
//!
//! Each message is one key/value write on the shared storage. The keys and
//! value shapes are the ones the web client writes, so a native tab can share
//! an origin with browser tabs.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::TabId;

/// Storage key announcing a newly opened tab
pub const KEY_OPEN: &str = "pageOpen";
/// Storage key answering an Open
pub const KEY_AVAILABLE: &str = "pageAvailable";
/// Storage key carrying a closing tab's roster
pub const KEY_CLOSE: &str = "pageClose";
/// Storage key announcing a claim to mastership
pub const KEY_CLAIM: &str = "pageClaim";

/// The four message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Open,
    Available,
    Close,
    Claim,
}

impl MessageKind {
    /// Storage key this kind is written under
    pub fn key(self) -> &'static str {
        match self {
            MessageKind::Open => KEY_OPEN,
            MessageKind::Available => KEY_AVAILABLE,
            MessageKind::Close => KEY_CLOSE,
            MessageKind::Claim => KEY_CLAIM,
        }
    }

    /// Kind for a storage key, `None` for keys the protocol does not own
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            KEY_OPEN => Some(MessageKind::Open),
            KEY_AVAILABLE => Some(MessageKind::Available),
            KEY_CLOSE => Some(MessageKind::Close),
            KEY_CLAIM => Some(MessageKind::Claim),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Errors decoding a message off the wire
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed {kind} payload: {reason}")]
    Malformed { kind: MessageKind, reason: String },

    #[error("Failed to encode {kind} payload: {source}")]
    Encode {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Kind of the message that failed
    pub fn kind(&self) -> MessageKind {
        match self {
            ProtocolError::Malformed { kind, .. } | ProtocolError::Encode { kind, .. } => *kind,
        }
    }
}

/// Payload of a Close message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePayload {
    /// Whether the closing tab was master
    #[serde(rename = "master")]
    pub was_master: bool,
    /// The closing tab
    pub id: TabId,
    /// Size of the closing tab's peer set
    pub size: usize,
    /// The closing tab's peer set
    pub list: Vec<TabId>,
}

/// One protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastMessage {
    /// A new tab has started
    Open(TabId),
    /// Reply to Open: the sender is alive and not yielding to the opener
    Available(TabId),
    /// The sender is closing
    Close(ClosePayload),
    /// The sender intends to become master
    Claim(TabId),
}

impl BroadcastMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            BroadcastMessage::Open(_) => MessageKind::Open,
            BroadcastMessage::Available(_) => MessageKind::Available,
            BroadcastMessage::Close(_) => MessageKind::Close,
            BroadcastMessage::Claim(_) => MessageKind::Claim,
        }
    }

    /// Id of the tab that sent the message
    pub fn sender(&self) -> &TabId {
        match self {
            BroadcastMessage::Open(id) | BroadcastMessage::Available(id) | BroadcastMessage::Claim(id) => id,
            BroadcastMessage::Close(payload) => &payload.id,
        }
    }

    /// Encode as a storage key and value
    pub fn encode(&self) -> Result<(&'static str, String), ProtocolError> {
        let value = match self {
            BroadcastMessage::Open(id) | BroadcastMessage::Available(id) | BroadcastMessage::Claim(id) => {
                id.to_string()
            }
            BroadcastMessage::Close(payload) => {
                serde_json::to_string(payload).map_err(|source| ProtocolError::Encode {
                    kind: MessageKind::Close,
                    source,
                })?
            }
        };
        Ok((self.kind().key(), value))
    }

    /// Decode a storage write
    ///
    /// Returns `Ok(None)` for keys outside the protocol; the same storage
    /// carries unrelated application settings.
    pub fn decode(key: &str, value: Option<&str>) -> Result<Option<Self>, ProtocolError> {
        let Some(kind) = MessageKind::from_key(key) else {
            return Ok(None);
        };

        let value = value.ok_or_else(|| ProtocolError::Malformed {
            kind,
            reason: "entry was removed".to_string(),
        })?;

        let msg = match kind {
            MessageKind::Open => BroadcastMessage::Open(parse_id(kind, value)?),
            MessageKind::Available => BroadcastMessage::Available(parse_id(kind, value)?),
            MessageKind::Claim => BroadcastMessage::Claim(parse_id(kind, value)?),
            MessageKind::Close => {
                let payload: ClosePayload = serde_json::from_str(value).map_err(|e| ProtocolError::Malformed {
                    kind,
                    reason: e.to_string(),
                })?;
                if payload.id.is_empty() {
                    return Err(ProtocolError::Malformed {
                        kind,
                        reason: "empty tab id".to_string(),
                    });
                }
                BroadcastMessage::Close(payload)
            }
        };
        Ok(Some(msg))
    }
}

fn parse_id(kind: MessageKind, value: &str) -> Result<TabId, ProtocolError> {
    let id = TabId::from(value.trim());
    if id.is_empty() {
        return Err(ProtocolError::Malformed {
            kind,
            reason: "empty tab id".to_string(),
        });
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_close_wire_format() {
        let msg = BroadcastMessage::Close(ClosePayload {
            was_master: true,
            id: TabId::from("a"),
            size: 2,
            list: vec![TabId::from("b"), TabId::from("c")],
        });

        let (key, value) = msg.encode().unwrap();
        assert_eq!(key, "pageClose");
        assert_eq!(value, r#"{"master":true,"id":"a","size":2,"list":["b","c"]}"#);
    }

    #[test]
    fn test_decode_web_client_close() {
        let value = r#"{"master":false,"id":"1700000000000","size":0,"list":[]}"#;
        let msg = BroadcastMessage::decode("pageClose", Some(value)).unwrap().unwrap();
        match msg {
            BroadcastMessage::Close(payload) => {
                assert!(!payload.was_master);
                assert_eq!(payload.id.as_str(), "1700000000000");
                assert!(payload.list.is_empty());
            }
            other => panic!("Wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_id_messages() {
        let open = BroadcastMessage::decode("pageOpen", Some("tab-1")).unwrap();
        assert_eq!(open, Some(BroadcastMessage::Open(TabId::from("tab-1"))));

        let available = BroadcastMessage::decode("pageAvailable", Some("tab-2")).unwrap();
        assert_eq!(available, Some(BroadcastMessage::Available(TabId::from("tab-2"))));

        let claim = BroadcastMessage::decode("pageClaim", Some("tab-3")).unwrap();
        assert_eq!(claim, Some(BroadcastMessage::Claim(TabId::from("tab-3"))));
    }

    #[test]
    fn test_unrelated_keys_are_ignored() {
        assert_eq!(BroadcastMessage::decode("version", Some("1.2.0")).unwrap(), None);
        assert_eq!(BroadcastMessage::decode("recentRooms", None).unwrap(), None);
    }

    #[test]
    fn test_malformed_close_reports_kind() {
        let err = BroadcastMessage::decode("pageClose", Some("{not json")).unwrap_err();
        assert_eq!(err.kind(), MessageKind::Close);

        let err = BroadcastMessage::decode("pageClose", Some(r#"{"master":true,"id":"","size":0,"list":[]}"#))
            .unwrap_err();
        assert_eq!(err.kind(), MessageKind::Close);
    }

    #[test]
    fn test_empty_or_removed_ids_are_malformed() {
        assert!(BroadcastMessage::decode("pageOpen", Some("  ")).is_err());
        let err = BroadcastMessage::decode("pageClaim", None).unwrap_err();
        assert_eq!(err.kind(), MessageKind::Claim);
    }

    #[test]
    fn test_sender() {
        let close = BroadcastMessage::Close(ClosePayload {
            was_master: false,
            id: TabId::from("x"),
            size: 0,
            list: vec![],
        });
        assert_eq!(close.sender().as_str(), "x");
        assert_eq!(BroadcastMessage::Claim(TabId::from("y")).sender().as_str(), "y");
    }

    proptest! {
        #[test]
        fn decode_never_panics(key in prop::sample::select(vec!["pageOpen", "pageAvailable", "pageClose", "pageClaim", "other"]),
                               value in ".*") {
            let _ = BroadcastMessage::decode(key, Some(&value));
        }

        #[test]
        fn decoded_ids_are_never_empty(value in ".*") {
            if let Ok(Some(msg)) = BroadcastMessage::decode("pageOpen", Some(&value)) {
                prop_assert!(!msg.sender().is_empty());
            }
        }
    }
}
