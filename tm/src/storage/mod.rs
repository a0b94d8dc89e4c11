//! Shared storage broadcast channel
//!
//! An in-process model of one origin's `localStorage` together with its
//! `storage` event. A write stores the value and notifies every other
//! attached tab; the writer never hears its own write.

mod config;
mod handle;
mod hub;
mod messages;

pub use config::StorageConfig;
pub use handle::StorageHandle;
pub use hub::{HubClient, StorageHub};
pub use messages::{ChannelError, HubMetrics, HubRequest, StorageEvent};

/// Write side of the shared broadcast channel, as seen by one tab
///
/// Both operations are synchronous so they can run inside an unload path.
pub trait StorageChannel: Send + Sync {
    /// Store `value` under `key` and notify the other tabs
    fn set_item(&self, key: &str, value: &str) -> Result<(), ChannelError>;

    /// Stop receiving change notifications
    fn detach(&self);
}
