//! Event Bus - local pub/sub for coordinator notifications
//!
//! The EventBus uses tokio broadcast channels to deliver events to all
//! subscribers. Coordinators emit, UI-side consumers subscribe.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::TabEvent;
use crate::identity::TabId;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Central event bus for coordinator activity
pub struct EventBus {
    tx: broadcast::Sender<TabEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: TabEvent) {
        debug!(event_type = event.event_type(), tab_id = %event.tab_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter bound to one tab
    pub fn emitter_for(&self, tab_id: TabId) -> EventEmitter {
        debug!(%tab_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            tab_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for a coordinator to emit events without owning the bus
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<TabEvent>,
    tab_id: TabId,
}

impl EventEmitter {
    /// Get the tab this emitter is bound to
    pub fn tab_id(&self) -> &TabId {
        &self.tab_id
    }

    /// Emit a raw event
    pub fn emit(&self, event: TabEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to the underlying bus
    pub fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.tx.subscribe()
    }

    // === Convenience methods ===

    pub fn master_changed(&self, epoch: u64, is_master: bool) {
        self.emit(TabEvent::MasterChanged {
            tab_id: self.tab_id.clone(),
            epoch,
            is_master,
        });
    }

    pub fn election_started(&self, epoch: u64, peers: usize) {
        self.emit(TabEvent::ElectionStarted {
            tab_id: self.tab_id.clone(),
            epoch,
            peers,
        });
    }

    pub fn claim_sent(&self, epoch: u64) {
        self.emit(TabEvent::ClaimSent {
            tab_id: self.tab_id.clone(),
            epoch,
        });
    }

    pub fn peer_joined(&self, peer: TabId) {
        self.emit(TabEvent::PeerJoined {
            tab_id: self.tab_id.clone(),
            peer,
        });
    }

    pub fn peer_left(&self, peer: TabId) {
        self.emit(TabEvent::PeerLeft {
            tab_id: self.tab_id.clone(),
            peer,
        });
    }

    pub fn tab_closed(&self, was_master: bool) {
        self.emit(TabEvent::TabClosed {
            tab_id: self.tab_id.clone(),
            was_master,
        });
    }
}

/// Create a bus for a whole simulated origin
pub fn create_event_bus(capacity: usize) -> EventBus {
    EventBus::new(capacity)
}
