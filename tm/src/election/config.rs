//! Election timing configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Election timing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Delay after Open before an unchallenged tab becomes master
    #[serde(rename = "claim-delay-ms", default = "default_claim_delay_ms")]
    pub claim_delay_ms: u64,

    /// Window after a Claim in which a competing Claim cancels it
    #[serde(rename = "confirm-delay-ms", default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,

    /// Granularity of the randomized re-election backoff
    #[serde(rename = "backoff-step-ms", default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,

    /// Number of backoff steps to choose from (delay is `step * 0..slots`)
    #[serde(rename = "backoff-slots", default = "default_backoff_slots")]
    pub backoff_slots: u32,

    /// Base seed for the backoff generator (entropy per tab when unset)
    ///
    /// Each tab mixes it with its own id, so tabs never share a stream.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_claim_delay_ms() -> u64 {
    debug!("default_claim_delay_ms: called");
    70
}

fn default_confirm_delay_ms() -> u64 {
    debug!("default_confirm_delay_ms: called");
    70
}

fn default_backoff_step_ms() -> u64 {
    debug!("default_backoff_step_ms: called");
    70
}

fn default_backoff_slots() -> u32 {
    debug!("default_backoff_slots: called");
    40
}

impl Default for ElectionConfig {
    fn default() -> Self {
        debug!("ElectionConfig::default: called");
        Self {
            claim_delay_ms: 70,
            confirm_delay_ms: 70,
            backoff_step_ms: 70,
            backoff_slots: 40,
            seed: None,
        }
    }
}

impl ElectionConfig {
    pub fn claim_delay(&self) -> Duration {
        Duration::from_millis(self.claim_delay_ms)
    }

    pub fn confirm_delay(&self) -> Duration {
        Duration::from_millis(self.confirm_delay_ms)
    }

    /// Backoff for a chosen slot
    pub fn backoff(&self, slot: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms.saturating_mul(u64::from(slot)))
    }

    /// Longest backoff a tab can draw
    pub fn max_backoff(&self) -> Duration {
        self.backoff(self.backoff_slots.saturating_sub(1))
    }

    /// Upper bound from a master's Close to a survivor confirming mastership
    pub fn max_election_window(&self) -> Duration {
        debug!("ElectionConfig::max_election_window: called");
        self.max_backoff() + self.confirm_delay()
    }
}
