//! Main storage hub task implementation

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::StorageConfig;
use super::handle::StorageHandle;
use super::messages::{ChannelError, HubMetrics, HubRequest, StorageEvent};
use crate::identity::TabId;

/// Cloneable entry point for attaching tabs to a running hub
#[derive(Debug, Clone)]
pub struct HubClient {
    tx: mpsc::UnboundedSender<HubRequest>,
    config: StorageConfig,
}

impl HubClient {
    /// Attach a tab to the shared storage
    ///
    /// Returns the tab's write handle and the stream of change events raised
    /// by every other tab's writes.
    pub fn attach(&self, tab_id: TabId) -> Result<(StorageHandle, mpsc::UnboundedReceiver<StorageEvent>), ChannelError> {
        debug!(%tab_id, "HubClient::attach: called");
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        self.tx
            .send(HubRequest::Attach {
                tab_id: tab_id.clone(),
                tx: event_tx,
            })
            .map_err(|_| ChannelError::Closed)?;

        Ok((
            StorageHandle::new(self.tx.clone(), tab_id, self.config.max_entry_bytes),
            event_rx,
        ))
    }

    /// Request shutdown of the hub
    pub fn shutdown(&self) -> Result<(), ChannelError> {
        debug!("HubClient::shutdown: called");
        self.tx.send(HubRequest::Shutdown).map_err(|_| ChannelError::Closed)
    }

    /// Whether the hub task is still accepting requests
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// The hub models one origin's shared storage
///
/// It keeps the key/value entries and fans every write out to all attached
/// tabs except the writer, in the order writes arrive.
pub struct StorageHub {
    config: StorageConfig,
    tx: mpsc::UnboundedSender<HubRequest>,
    rx: mpsc::UnboundedReceiver<HubRequest>,
}

impl StorageHub {
    /// Create a new hub with the given configuration
    pub fn new(config: StorageConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { config, tx, rx }
    }

    /// Get a client for attaching tabs
    pub fn client(&self) -> HubClient {
        HubClient {
            tx: self.tx.clone(),
            config: self.config.clone(),
        }
    }

    /// Run the hub task
    ///
    /// This consumes the hub and runs until shutdown is requested.
    pub async fn run(mut self) {
        // The hub's own sender would keep the queue open forever
        drop(self.tx);

        let mut registry: HashMap<TabId, mpsc::UnboundedSender<StorageEvent>> = HashMap::new();
        let mut entries: HashMap<String, String> = HashMap::new();
        let mut metrics = HubMetrics::default();

        info!("Storage hub started");

        while let Some(req) = self.rx.recv().await {
            match req {
                HubRequest::Attach { tab_id, tx } => {
                    debug!(tab_id = %tab_id, "Attaching tab");
                    registry.insert(tab_id, tx);
                    metrics.attached_tabs = registry.len();
                }

                HubRequest::Detach { tab_id } => {
                    debug!(tab_id = %tab_id, "Detaching tab");
                    registry.remove(&tab_id);
                    metrics.attached_tabs = registry.len();
                }

                HubRequest::SetItem { from, key, value } => {
                    metrics.writes += 1;

                    let old_value = entries.insert(key.clone(), value.clone());
                    metrics.stored_keys = entries.len();

                    if !self.config.notify_unchanged && old_value.as_deref() == Some(value.as_str()) {
                        debug!(from = %from, key = %key, "Unchanged value, no event");
                        metrics.suppressed_writes += 1;
                        continue;
                    }

                    debug!(from = %from, key = %key, "Broadcasting write");

                    let event = StorageEvent {
                        key,
                        old_value,
                        new_value: Some(value),
                    };

                    for (tab_id, tx) in &registry {
                        if *tab_id == from {
                            continue;
                        }
                        if tx.send(event.clone()).is_ok() {
                            metrics.events_delivered += 1;
                        } else {
                            warn!(tab_id = %tab_id, "Tab listener gone, event dropped");
                            metrics.dropped_deliveries += 1;
                        }
                    }
                }

                HubRequest::GetItem { key, reply_tx } => {
                    let _ = reply_tx.send(entries.get(&key).cloned());
                }

                HubRequest::GetMetrics { reply_tx } => {
                    let _ = reply_tx.send(metrics.clone());
                }

                HubRequest::Shutdown => {
                    info!("Storage hub shutting down");
                    break;
                }
            }
        }

        info!("Storage hub stopped");
    }
}
