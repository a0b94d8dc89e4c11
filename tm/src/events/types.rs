//! Event types for tab coordination
//!
//! Local notifications a coordinator raises as its own state changes. Other
//! tabs never see these; they travel only on the in-process event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::TabId;

/// Core event enum - the vocabulary of coordinator activity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TabEvent {
    /// This tab's master flag flipped
    MasterChanged { tab_id: TabId, epoch: u64, is_master: bool },
    /// A master closed and this tab is re-deciding
    ElectionStarted { tab_id: TabId, epoch: u64, peers: usize },
    /// This tab broadcast a Claim after its backoff
    ClaimSent { tab_id: TabId, epoch: u64 },
    /// Another tab announced itself
    PeerJoined { tab_id: TabId, peer: TabId },
    /// Another tab closed
    PeerLeft { tab_id: TabId, peer: TabId },
    /// This tab unloaded
    TabClosed { tab_id: TabId, was_master: bool },
}

impl TabEvent {
    /// Short type name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            TabEvent::MasterChanged { .. } => "master_changed",
            TabEvent::ElectionStarted { .. } => "election_started",
            TabEvent::ClaimSent { .. } => "claim_sent",
            TabEvent::PeerJoined { .. } => "peer_joined",
            TabEvent::PeerLeft { .. } => "peer_left",
            TabEvent::TabClosed { .. } => "tab_closed",
        }
    }

    /// Tab that raised the event
    pub fn tab_id(&self) -> &TabId {
        match self {
            TabEvent::MasterChanged { tab_id, .. }
            | TabEvent::ElectionStarted { tab_id, .. }
            | TabEvent::ClaimSent { tab_id, .. }
            | TabEvent::PeerJoined { tab_id, .. }
            | TabEvent::PeerLeft { tab_id, .. }
            | TabEvent::TabClosed { tab_id, .. } => tab_id,
        }
    }
}

/// Timestamped event, as written to logs or JSON output
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: TabEvent,
}

impl EventLogEntry {
    pub fn new(event: TabEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
