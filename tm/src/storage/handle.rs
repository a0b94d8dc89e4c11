//! StorageHandle - one tab's view of the shared storage

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::StorageChannel;
use super::messages::{ChannelError, HubMetrics, HubRequest};
use crate::identity::TabId;

/// Handle for a tab to write to, and read from, the shared storage
///
/// Writes are synchronous: they enqueue on the hub's unbounded request queue
/// and return immediately, so they are safe to call from an unload path.
/// Clones share the detached flag.
#[derive(Debug, Clone)]
pub struct StorageHandle {
    /// Sender to the hub task
    tx: mpsc::UnboundedSender<HubRequest>,

    /// This handle's tab
    tab_id: TabId,

    /// Quota applied to each write
    max_entry_bytes: usize,

    detached: Arc<AtomicBool>,
}

impl StorageHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<HubRequest>, tab_id: TabId, max_entry_bytes: usize) -> Self {
        debug!(%tab_id, "StorageHandle::new: called");
        Self {
            tx,
            tab_id,
            max_entry_bytes,
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get this handle's tab id
    pub fn tab_id(&self) -> &TabId {
        &self.tab_id
    }

    /// Whether `detach` has been called
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// Read the current value of a key
    pub async fn get_item(&self, key: &str) -> Result<Option<String>, ChannelError> {
        debug!(tab_id = %self.tab_id, %key, "StorageHandle::get_item: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(HubRequest::GetItem {
                key: key.to_string(),
                reply_tx,
            })
            .map_err(|_| ChannelError::Closed)?;

        reply_rx.await.map_err(|_| ChannelError::Closed)
    }

    /// Get current hub metrics
    pub async fn metrics(&self) -> Result<HubMetrics, ChannelError> {
        debug!(tab_id = %self.tab_id, "StorageHandle::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(HubRequest::GetMetrics { reply_tx })
            .map_err(|_| ChannelError::Closed)?;

        reply_rx.await.map_err(|_| ChannelError::Closed)
    }
}

impl StorageChannel for StorageHandle {
    fn set_item(&self, key: &str, value: &str) -> Result<(), ChannelError> {
        debug!(tab_id = %self.tab_id, %key, "StorageHandle::set_item: called");
        if self.is_detached() {
            return Err(ChannelError::Detached(self.tab_id.clone()));
        }

        let size = key.len() + value.len();
        if size > self.max_entry_bytes {
            debug!(size, limit = self.max_entry_bytes, "StorageHandle::set_item: over quota");
            return Err(ChannelError::QuotaExceeded {
                key: key.to_string(),
                size,
                limit: self.max_entry_bytes,
            });
        }

        self.tx
            .send(HubRequest::SetItem {
                from: self.tab_id.clone(),
                key: key.to_string(),
                value: value.to_string(),
            })
            .map_err(|_| ChannelError::Closed)
    }

    fn detach(&self) {
        debug!(tab_id = %self.tab_id, "StorageHandle::detach: called");
        if self.detached.swap(true, Ordering::SeqCst) {
            debug!("StorageHandle::detach: already detached");
            return;
        }
        let _ = self.tx.send(HubRequest::Detach {
            tab_id: self.tab_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_item_enqueues_request() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = StorageHandle::new(tx, TabId::from("tab-1"), 1024);

        handle.set_item("pageOpen", "tab-1").unwrap();

        match rx.try_recv().unwrap() {
            HubRequest::SetItem { from, key, value } => {
                assert_eq!(from, TabId::from("tab-1"));
                assert_eq!(key, "pageOpen");
                assert_eq!(value, "tab-1");
            }
            other => panic!("Wrong request: {:?}", other),
        }
    }

    #[test]
    fn test_set_item_rejects_oversized_entry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = StorageHandle::new(tx, TabId::from("tab-1"), 10);

        let err = handle.set_item("pageClose", "0123456789").unwrap_err();
        assert!(matches!(err, ChannelError::QuotaExceeded { size: 19, limit: 10, .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_detach_is_idempotent_and_blocks_writes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = StorageHandle::new(tx, TabId::from("tab-1"), 1024);
        let clone = handle.clone();

        handle.detach();
        clone.detach();

        assert!(matches!(rx.try_recv().unwrap(), HubRequest::Detach { .. }));
        assert!(rx.try_recv().is_err());
        assert!(matches!(clone.set_item("k", "v"), Err(ChannelError::Detached(_))));
    }

    #[test]
    fn test_set_item_after_hub_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = StorageHandle::new(tx, TabId::from("tab-1"), 1024);

        assert!(matches!(handle.set_item("k", "v"), Err(ChannelError::Closed)));
    }
}
