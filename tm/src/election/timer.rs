//! Owned timer slots and backoff jitter
//!
//! A tab has one slot per timer kind. Arming a slot replaces whatever
//! deadline it held, so there is never more than one outstanding timer of a
//! kind. The driver sleeps until the earliest armed deadline.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

/// The three timers a tab can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Initial claim after Open
    Claim,
    /// Randomized wait before a re-election Claim
    Backoff,
    /// Confirmation window after a re-election Claim
    Confirm,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerKind::Claim => "claim",
            TimerKind::Backoff => "backoff",
            TimerKind::Confirm => "confirm",
        };
        f.write_str(name)
    }
}

/// A single cancellable deadline
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimerSlot {
    deadline: Option<Instant>,
}

impl TimerSlot {
    /// Arm at `now + delay`, replacing any pending deadline
    pub fn arm(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    /// Cancel; returns whether a deadline was pending
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm and report true if the deadline has passed
    pub fn take_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// One slot per timer kind
#[derive(Debug, Default, Clone, Copy)]
pub struct TimerSlots {
    claim: TimerSlot,
    backoff: TimerSlot,
    confirm: TimerSlot,
}

impl TimerSlots {
    pub fn slot(&self, kind: TimerKind) -> &TimerSlot {
        match kind {
            TimerKind::Claim => &self.claim,
            TimerKind::Backoff => &self.backoff,
            TimerKind::Confirm => &self.confirm,
        }
    }

    pub fn slot_mut(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::Claim => &mut self.claim,
            TimerKind::Backoff => &mut self.backoff,
            TimerKind::Confirm => &mut self.confirm,
        }
    }

    pub fn arm(&mut self, kind: TimerKind, now: Instant, delay: Duration) {
        self.slot_mut(kind).arm(now, delay);
    }

    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.slot_mut(kind).cancel()
    }

    /// Cancel every slot; returns whether any was pending
    pub fn cancel_all(&mut self) -> bool {
        let claim = self.claim.cancel();
        let backoff = self.backoff.cancel();
        let confirm = self.confirm.cancel();
        claim || backoff || confirm
    }

    pub fn any_armed(&self) -> bool {
        self.claim.is_armed() || self.backoff.is_armed() || self.confirm.is_armed()
    }

    /// Earliest armed deadline across all kinds
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.claim, self.backoff, self.confirm]
            .iter()
            .filter_map(|slot| slot.deadline())
            .min()
    }

    /// Kind whose deadline is earliest and already due at `now`
    pub fn take_due(&mut self, now: Instant) -> Option<TimerKind> {
        let kind = [TimerKind::Claim, TimerKind::Backoff, TimerKind::Confirm]
            .into_iter()
            .filter_map(|kind| self.slot(kind).deadline().map(|d| (d, kind)))
            .filter(|(deadline, _)| *deadline <= now)
            .min_by_key(|(deadline, _)| *deadline)
            .map(|(_, kind)| kind)?;
        self.slot_mut(kind).take_if_due(now).then_some(kind)
    }
}

/// Source of backoff slots for re-election
pub trait Jitter: Send {
    /// Pick a slot in `0..slots`
    fn slot(&mut self, slots: u32) -> u32;
}

/// Uniform random slots
pub struct RandomJitter {
    rng: StdRng,
}

impl RandomJitter {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Jitter for RandomJitter {
    fn slot(&mut self, slots: u32) -> u32 {
        self.rng.random_range(0..slots.max(1))
    }
}

/// Slots replayed from a fixed list; the last value repeats once exhausted
pub struct SequenceJitter {
    slots: VecDeque<u32>,
    last: u32,
}

impl SequenceJitter {
    pub fn new(slots: impl IntoIterator<Item = u32>) -> Self {
        Self {
            slots: slots.into_iter().collect(),
            last: 0,
        }
    }
}

impl Jitter for SequenceJitter {
    fn slot(&mut self, slots: u32) -> u32 {
        if let Some(next) = self.slots.pop_front() {
            self.last = next;
        }
        self.last.min(slots.saturating_sub(1))
    }
}
