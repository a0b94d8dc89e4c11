//! Message types for the storage hub

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::identity::TabId;

/// Errors from shared storage operations
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Storage hub channel closed")]
    Closed,

    #[error("Entry {key} is {size} bytes, over the {limit} byte quota")]
    QuotaExceeded { key: String, size: usize, limit: usize },

    #[error("Tab {0} is detached from storage")]
    Detached(TabId),
}

/// Change notification delivered to every tab except the writer
///
/// Mirrors the browser `storage` event: the key that changed plus the value
/// before and after the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    pub key: String,
    #[serde(rename = "old-value")]
    pub old_value: Option<String>,
    #[serde(rename = "new-value")]
    pub new_value: Option<String>,
}

/// Internal requests to the hub task
#[derive(Debug)]
pub enum HubRequest {
    /// Start delivering storage events to a tab
    Attach {
        tab_id: TabId,
        tx: mpsc::UnboundedSender<StorageEvent>,
    },

    /// Stop delivering storage events to a tab
    Detach { tab_id: TabId },

    /// Write a value and notify the other tabs
    SetItem { from: TabId, key: String, value: String },

    /// Read the current value of a key
    GetItem {
        key: String,
        reply_tx: oneshot::Sender<Option<String>>,
    },

    /// Get current metrics
    GetMetrics { reply_tx: oneshot::Sender<HubMetrics> },

    /// Shutdown the hub
    Shutdown,
}

/// Hub metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubMetrics {
    pub attached_tabs: usize,
    pub stored_keys: usize,
    pub writes: u64,
    pub events_delivered: u64,
    pub suppressed_writes: u64,
    pub dropped_deliveries: u64,
}
