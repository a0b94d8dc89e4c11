//! Local notifications for tab coordination
//!
//! Each coordinator emits its own state changes (master flag flips, elections
//! starting, peers coming and going) onto an [`EventBus`]. UI-side consumers
//! such as the login gate subscribe instead of re-awaiting a stale future.

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, create_event_bus};
pub use types::{EventLogEntry, TabEvent};
