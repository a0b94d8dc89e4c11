//! TabCoordinator - the per-tab election driver
//!
//! Owns one [`TabElection`] and runs it as a tokio task: storage events and
//! timer deadlines go in, broadcasts and local notifications come out. The
//! state sits behind a mutex that is never held across an await, so the
//! synchronous `stop` can take it from the unload path.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use super::config::ElectionConfig;
use super::machine::{Action, ElectionStatus, Role, TabElection, Transition};
use super::protocol::BroadcastMessage;
use super::timer::{Jitter, RandomJitter};
use crate::error::Result;
use crate::events::{EventBus, EventEmitter, TabEvent};
use crate::identity::TabId;
use crate::storage::{HubClient, StorageChannel, StorageEvent};

type UnloadHook = Box<dyn FnOnce() + Send>;

/// State shared between the handle and the driver task
struct Shared {
    machine: Mutex<TabElection>,
    channel: Arc<dyn StorageChannel>,
    status: watch::Sender<ElectionStatus>,
    emitter: EventEmitter,
    unload_hooks: Mutex<Vec<UnloadHook>>,
}

impl Shared {
    fn machine(&self) -> MutexGuard<'_, TabElection> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one machine transition and carry out its actions under the lock
    fn step<F>(&self, f: F)
    where
        F: FnOnce(&mut TabElection) -> Vec<Action>,
    {
        let mut machine = self.machine();
        let actions = f(&mut *machine);

        let status = machine.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });

        for action in actions {
            match action {
                Action::Broadcast(msg) => self.broadcast(&msg),
                Action::Notify(transition) => self.notify(machine.epoch(), transition),
            }
        }
    }

    fn on_storage_event(&self, event: StorageEvent) {
        match BroadcastMessage::decode(&event.key, event.new_value.as_deref()) {
            Ok(Some(msg)) => {
                debug!(tab_id = %self.emitter.tab_id(), kind = %msg.kind(), from = %msg.sender(), "Received message");
                self.step(|m| m.handle(msg, Instant::now()));
            }
            Ok(None) => {
                debug!(key = %event.key, "Ignoring non-protocol storage key");
            }
            Err(e) => {
                warn!(tab_id = %self.emitter.tab_id(), error = %e, "Failed to decode storage event");
                let kind = e.kind();
                self.step(|m| m.handle_malformed(kind, Instant::now()));
            }
        }
    }

    fn broadcast(&self, msg: &BroadcastMessage) {
        let (key, value) = match msg.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode message");
                return;
            }
        };
        if let Err(e) = self.channel.set_item(key, &value) {
            warn!(tab_id = %self.emitter.tab_id(), %key, error = %e, "Broadcast failed");
        }
    }

    fn notify(&self, epoch: u64, transition: Transition) {
        match transition {
            Transition::MasterChanged { is_master } => self.emitter.master_changed(epoch, is_master),
            Transition::ElectionStarted { peers } => self.emitter.election_started(epoch, peers),
            Transition::ClaimSent => self.emitter.claim_sent(epoch),
            Transition::PeerJoined(peer) => self.emitter.peer_joined(peer),
            Transition::PeerLeft(peer) => self.emitter.peer_left(peer),
            Transition::Closed { was_master } => self.emitter.tab_closed(was_master),
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn drive(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<StorageEvent>) {
    debug!(tab_id = %shared.emitter.tab_id(), "drive: started");
    loop {
        let deadline = shared.machine().next_deadline();
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("drive: storage listener closed");
                    break;
                };
                shared.on_storage_event(event);
            }
            _ = sleep_until_deadline(deadline) => {
                shared.step(|m| m.fire_due(Instant::now()));
            }
        }
        if shared.machine().is_stopped() {
            break;
        }
    }
    debug!(tab_id = %shared.emitter.tab_id(), "drive: finished");
}

/// Master-election coordinator for one tab
///
/// Construct once per tab with [`TabCoordinator::start`]; call
/// [`TabCoordinator::stop`] from the unload path. Dropping a coordinator
/// without `stop` models a crashed tab: it detaches without a Close.
pub struct TabCoordinator {
    id: TabId,
    shared: Arc<Shared>,
    status_rx: watch::Receiver<ElectionStatus>,
    task: JoinHandle<()>,
}

impl TabCoordinator {
    /// Start a new tab on the shared storage behind `hub`
    ///
    /// Generates the tab id, attaches the listener, broadcasts Open and arms
    /// the initial claim timer. Must be called inside a tokio runtime.
    pub fn start(hub: &HubClient, config: ElectionConfig, bus: &EventBus) -> Result<Self> {
        let id = TabId::generate();
        let (handle, events) = hub.attach(id.clone())?;
        let jitter = jitter_for(&id, config.seed);
        let emitter = bus.emitter_for(id.clone());
        Ok(Self::start_with(id, Arc::new(handle), events, config, jitter, emitter))
    }

    /// Start with explicit collaborators
    pub fn start_with(
        id: TabId,
        channel: Arc<dyn StorageChannel>,
        events: mpsc::UnboundedReceiver<StorageEvent>,
        config: ElectionConfig,
        jitter: Box<dyn Jitter>,
        emitter: EventEmitter,
    ) -> Self {
        debug!(%id, "TabCoordinator::start_with: called");
        let machine = TabElection::new(id.clone(), config, jitter);
        let (status_tx, status_rx) = watch::channel(machine.status());

        let shared = Arc::new(Shared {
            machine: Mutex::new(machine),
            channel,
            status: status_tx,
            emitter,
            unload_hooks: Mutex::new(Vec::new()),
        });

        shared.step(|m| m.start(Instant::now()));
        let task = tokio::spawn(drive(shared.clone(), events));

        info!(%id, "Tab started");
        Self {
            id,
            shared,
            status_rx,
            task,
        }
    }

    pub fn id(&self) -> &TabId {
        &self.id
    }

    /// Resolve this tab's master decision for the current epoch
    ///
    /// Waits until the epoch is decided. A later epoch does not re-resolve a
    /// value already returned; watch [`TabCoordinator::subscribe`] for that.
    pub async fn master_status(&self) -> bool {
        let mut rx = self.status_rx.clone();
        match rx.wait_for(|status| status.decided.is_some()).await {
            Ok(status) => status.decided == Some(true),
            Err(_) => false,
        }
    }

    /// Current status snapshot
    pub fn status(&self) -> ElectionStatus {
        *self.status_rx.borrow()
    }

    pub fn role(&self) -> Role {
        self.status().role
    }

    pub fn is_master(&self) -> bool {
        self.shared.machine().is_master()
    }

    pub fn epoch(&self) -> u64 {
        self.status().epoch
    }

    /// This tab's current view of the other open tabs
    pub fn peers(&self) -> Vec<TabId> {
        self.shared.machine().peers().iter().cloned().collect()
    }

    /// Receive this origin's coordinator events (filter by `tab_id` for this tab)
    pub fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.shared.emitter.subscribe()
    }

    /// Watch status changes for this tab
    pub fn watch_status(&self) -> watch::Receiver<ElectionStatus> {
        self.status_rx.clone()
    }

    /// Register a callback run synchronously by `stop` before the Close broadcast
    pub fn add_unload_hook<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared
            .unload_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// Unload the tab
    ///
    /// Synchronous: runs unload hooks, writes the Close message with the
    /// current roster and detaches from storage before returning.
    pub fn stop(&self) {
        if self.shared.machine().is_stopped() {
            debug!(id = %self.id, "TabCoordinator::stop: already stopped");
            return;
        }
        let hooks = std::mem::take(&mut *self.shared.unload_hooks.lock().unwrap_or_else(PoisonError::into_inner));
        debug!(id = %self.id, hooks = hooks.len(), "TabCoordinator::stop: running unload hooks");
        for hook in hooks {
            hook();
        }

        self.shared.step(|m| m.close());
        self.shared.channel.detach();
        info!(id = %self.id, "Tab stopped");
    }

    /// Terminate without a Close broadcast, as a killed tab would
    pub fn abort(&self) {
        if self.shared.machine().is_stopped() {
            return;
        }
        self.shared.step(|m| m.abandon());
        self.shared.channel.detach();
        warn!(id = %self.id, "Tab terminated without close");
    }

    /// Whether the driver task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TabCoordinator {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Backoff source for a tab
///
/// With a base seed the stream is a pure function of the seed and the tab id
/// (FNV-1a over the id bytes), so tabs sharing a seed still draw different
/// slots. Ids from [`TabId::generate`] are random, so this alone does not make
/// a run reproducible; `Browser` seeds tabs by opening order for that.
fn jitter_for(id: &TabId, seed: Option<u64>) -> Box<dyn Jitter> {
    match seed {
        Some(seed) => Box::new(RandomJitter::seeded(mix_seed(seed, id))),
        None => Box::new(RandomJitter::from_entropy()),
    }
}

fn mix_seed(seed: u64, id: &TabId) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    id.as_str()
        .bytes()
        .fold(seed ^ 0xcbf2_9ce4_8422_2325, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
}
