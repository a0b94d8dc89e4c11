//! The per-tab election state machine
//!
//! Pure and synchronous: it takes messages, timer expiries and the current
//! instant, and returns the broadcasts and notifications the driver must
//! carry out. All protocol rules live here.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::ElectionConfig;
use super::protocol::{BroadcastMessage, ClosePayload, MessageKind};
use super::timer::{Jitter, TimerKind, TimerSlots};
use crate::identity::TabId;

/// Where a tab stands in the current epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Undecided: waiting on the claim, backoff or confirm timer
    Electing,
    /// This tab holds the session
    Master,
    /// Another tab holds (or is electing for) the session
    Standby,
    /// The tab has unloaded
    Stopped,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Electing => "electing",
            Role::Master => "master",
            Role::Standby => "standby",
            Role::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Snapshot of a tab's election state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionStatus {
    pub epoch: u64,
    pub role: Role,
    /// Outcome of the current epoch, once known
    pub decided: Option<bool>,
}

/// Local state changes worth announcing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    MasterChanged { is_master: bool },
    ElectionStarted { peers: usize },
    ClaimSent,
    PeerJoined(TabId),
    PeerLeft(TabId),
    Closed { was_master: bool },
}

/// Work the driver performs on the machine's behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Broadcast(BroadcastMessage),
    Notify(Transition),
}

/// Election state for one tab
pub struct TabElection {
    id: TabId,
    config: ElectionConfig,
    role: Role,
    master: bool,
    decided: Option<bool>,
    epoch: u64,
    peers: BTreeSet<TabId>,
    timers: TimerSlots,
    jitter: Box<dyn Jitter>,
}

impl TabElection {
    pub fn new(id: TabId, config: ElectionConfig, jitter: Box<dyn Jitter>) -> Self {
        debug!(%id, "TabElection::new: called");
        Self {
            id,
            config,
            role: Role::Electing,
            master: false,
            decided: None,
            epoch: 0,
            peers: BTreeSet::new(),
            timers: TimerSlots::default(),
            jitter,
        }
    }

    pub fn id(&self) -> &TabId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_master(&self) -> bool {
        self.master
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn peers(&self) -> &BTreeSet<TabId> {
        &self.peers
    }

    pub fn timers(&self) -> &TimerSlots {
        &self.timers
    }

    pub fn is_stopped(&self) -> bool {
        self.role == Role::Stopped
    }

    pub fn status(&self) -> ElectionStatus {
        ElectionStatus {
            epoch: self.epoch,
            role: self.role,
            decided: self.decided,
        }
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Announce the tab and arm the initial claim
    pub fn start(&mut self, now: Instant) -> Vec<Action> {
        debug!(id = %self.id, "TabElection::start: called");
        self.timers.arm(TimerKind::Claim, now, self.config.claim_delay());
        vec![Action::Broadcast(BroadcastMessage::Open(self.id.clone()))]
    }

    /// Apply one message from another tab
    pub fn handle(&mut self, msg: BroadcastMessage, now: Instant) -> Vec<Action> {
        if self.is_stopped() {
            debug!(id = %self.id, kind = %msg.kind(), "TabElection::handle: stopped, ignoring");
            return Vec::new();
        }
        if *msg.sender() == self.id {
            debug!(id = %self.id, kind = %msg.kind(), "TabElection::handle: own message, ignoring");
            return Vec::new();
        }

        match msg {
            BroadcastMessage::Open(peer) => self.on_open(peer),
            BroadcastMessage::Available(peer) => self.on_available(peer),
            BroadcastMessage::Close(payload) => self.on_close(payload, now),
            BroadcastMessage::Claim(peer) => self.on_claim(peer),
        }
    }

    /// Apply a message that failed to decode
    ///
    /// A garbled Close may have been a master leaving, so a non-master tab
    /// announces itself again with an empty roster. A live master answers the
    /// Open and the tab stands down through rule 2; it never claims outright.
    pub fn handle_malformed(&mut self, kind: MessageKind, now: Instant) -> Vec<Action> {
        if self.is_stopped() {
            return Vec::new();
        }
        match kind {
            MessageKind::Close if !self.master => {
                warn!(id = %self.id, "Malformed close, rejoining");
                self.rejoin(now)
            }
            _ => {
                warn!(id = %self.id, %kind, "Malformed message dropped");
                Vec::new()
            }
        }
    }

    /// Fire the earliest timer that is due at `now`
    pub fn fire_due(&mut self, now: Instant) -> Vec<Action> {
        if self.is_stopped() {
            return Vec::new();
        }
        let Some(kind) = self.timers.take_due(now) else {
            return Vec::new();
        };
        debug!(id = %self.id, %kind, "TabElection::fire_due: timer fired");

        match kind {
            TimerKind::Claim | TimerKind::Confirm => self.decide(true),
            TimerKind::Backoff => {
                self.timers.arm(TimerKind::Confirm, now, self.config.confirm_delay());
                info!(id = %self.id, epoch = self.epoch, "Claiming mastership");
                vec![
                    Action::Broadcast(BroadcastMessage::Claim(self.id.clone())),
                    Action::Notify(Transition::ClaimSent),
                ]
            }
        }
    }

    /// Unload: build the Close broadcast and stop reacting
    pub fn close(&mut self) -> Vec<Action> {
        if self.is_stopped() {
            return Vec::new();
        }
        debug!(id = %self.id, master = self.master, peers = self.peers.len(), "TabElection::close: called");
        let was_master = self.master;
        let payload = ClosePayload {
            was_master,
            id: self.id.clone(),
            size: self.peers.len(),
            list: self.peers.iter().cloned().collect(),
        };

        let mut actions = vec![Action::Broadcast(BroadcastMessage::Close(payload))];
        actions.extend(self.halt());
        actions.push(Action::Notify(Transition::Closed { was_master }));
        actions
    }

    /// Abrupt termination: stop reacting without telling anyone
    pub fn abandon(&mut self) -> Vec<Action> {
        if self.is_stopped() {
            return Vec::new();
        }
        debug!(id = %self.id, "TabElection::abandon: called");
        self.halt()
    }

    fn halt(&mut self) -> Vec<Action> {
        self.timers.cancel_all();
        self.role = Role::Stopped;
        if self.decided.is_none() {
            self.decided = Some(false);
        }
        self.set_master(false).into_iter().collect()
    }

    // Rule 1
    fn on_open(&mut self, peer: TabId) -> Vec<Action> {
        debug!(id = %self.id, %peer, "TabElection::on_open: called");
        let mut actions = Vec::new();
        if self.peers.insert(peer.clone()) {
            actions.push(Action::Notify(Transition::PeerJoined(peer)));
        }
        actions.push(Action::Broadcast(BroadcastMessage::Available(self.id.clone())));
        actions
    }

    // Rule 2
    fn on_available(&mut self, peer: TabId) -> Vec<Action> {
        if !self.timers.cancel(TimerKind::Claim) {
            return Vec::new();
        }
        debug!(id = %self.id, %peer, "TabElection::on_available: answered, yielding");
        self.decide(false)
    }

    // Rules 3 and 4
    fn on_close(&mut self, payload: ClosePayload, now: Instant) -> Vec<Action> {
        debug!(
            id = %self.id,
            closer = %payload.id,
            closer_was_master = payload.was_master,
            "TabElection::on_close: called"
        );
        if self.master || !payload.was_master {
            return self.remove_peer(&payload.id);
        }
        self.begin_epoch(payload.list, now)
    }

    // Rule 5
    fn on_claim(&mut self, peer: TabId) -> Vec<Action> {
        if !self.timers.cancel_all() {
            return Vec::new();
        }
        info!(id = %self.id, %peer, epoch = self.epoch, "Competing claim observed, yielding");
        self.decide(false)
    }

    fn remove_peer(&mut self, peer: &TabId) -> Vec<Action> {
        if self.peers.remove(peer) {
            vec![Action::Notify(Transition::PeerLeft(peer.clone()))]
        } else {
            Vec::new()
        }
    }

    fn reset_epoch(&mut self, roster: Vec<TabId>) {
        self.epoch += 1;
        self.peers = roster.into_iter().filter(|peer| *peer != self.id).collect();
        self.timers.cancel_all();
        self.role = Role::Electing;
        self.decided = None;
    }

    fn rejoin(&mut self, now: Instant) -> Vec<Action> {
        self.reset_epoch(Vec::new());
        self.timers.arm(TimerKind::Claim, now, self.config.claim_delay());
        vec![
            Action::Notify(Transition::ElectionStarted { peers: 0 }),
            Action::Broadcast(BroadcastMessage::Open(self.id.clone())),
        ]
    }

    fn begin_epoch(&mut self, roster: Vec<TabId>, now: Instant) -> Vec<Action> {
        self.reset_epoch(roster);

        info!(id = %self.id, epoch = self.epoch, peers = self.peers.len(), "Master closed, electing");
        let mut actions = vec![Action::Notify(Transition::ElectionStarted {
            peers: self.peers.len(),
        })];

        if self.peers.is_empty() {
            actions.extend(self.decide(true));
        } else {
            let slot = self.jitter.slot(self.config.backoff_slots);
            let delay = self.config.backoff(slot);
            debug!(id = %self.id, slot, ?delay, "TabElection::begin_epoch: backing off");
            self.timers.arm(TimerKind::Backoff, now, delay);
        }
        actions
    }

    fn decide(&mut self, master: bool) -> Vec<Action> {
        self.role = if master { Role::Master } else { Role::Standby };
        self.decided = Some(master);
        if master {
            info!(id = %self.id, epoch = self.epoch, "Became master");
        } else {
            debug!(id = %self.id, epoch = self.epoch, "TabElection::decide: standby");
        }
        self.set_master(master).into_iter().collect()
    }

    fn set_master(&mut self, master: bool) -> Option<Action> {
        if self.master == master {
            return None;
        }
        self.master = master;
        Some(Action::Notify(Transition::MasterChanged { is_master: master }))
    }
}
