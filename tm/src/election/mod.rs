//! Master election between tabs of one origin
//!
//! Every tab runs the same protocol over the shared storage channel:
//!
//! - **Open**: a new tab announces itself and waits `claim-delay-ms`. If no
//!   tab answers it becomes master.
//! - **Available**: existing tabs answer an Open, which makes the new tab
//!   stand by.
//! - **Close**: a tab that unloads publishes its peer roster. When the
//!   master leaves, survivors adopt that roster and re-elect with a random
//!   backoff.
//! - **Claim**: a survivor whose backoff expired claims mastership. Any
//!   other contender that sees the claim stands down.
//!
//! [`TabElection`] is the pure state machine; [`TabCoordinator`] drives it
//! against real time and a [`StorageChannel`](crate::storage::StorageChannel).

mod config;
mod coordinator;
mod machine;
mod protocol;
mod timer;

pub use config::ElectionConfig;
pub use coordinator::TabCoordinator;
pub use machine::{Action, ElectionStatus, Role, TabElection, Transition};
pub use protocol::{
    BroadcastMessage, ClosePayload, KEY_AVAILABLE, KEY_CLAIM, KEY_CLOSE, KEY_OPEN, MessageKind, ProtocolError,
};
pub use timer::{Jitter, RandomJitter, SequenceJitter, TimerKind, TimerSlot, TimerSlots};
