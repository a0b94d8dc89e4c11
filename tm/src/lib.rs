//! TabMaster - master-tab election over shared storage
//!
//! Several tabs of one origin agree, with no server round-trip, on exactly
//! one tab being the master: the only tab allowed to hold an authenticated
//! session. The only medium is the origin's shared key/value storage and the
//! change event it raises in every other tab.
//!
//! # Core Concepts
//!
//! - **Decentralized**: every tab runs the same coordinator; there is no arbiter
//! - **Storage as bulletin board**: a message is one key/value write
//! - **Randomized re-election**: survivors of a master close back off randomly,
//!   then claim; any competing claim makes a contender yield
//!
//! # Modules
//!
//! - [`election`] - Protocol, state machine and the per-tab coordinator
//! - [`storage`] - In-process model of the shared storage and its change event
//! - [`events`] - Local notifications raised by a coordinator
//! - [`gate`] - Login permission that follows the master decision
//! - [`sim`] - Simulated browser for scenarios
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod election;
pub mod error;
pub mod events;
pub mod gate;
pub mod identity;
pub mod sim;
pub mod storage;

pub use config::Config;
pub use election::{ElectionConfig, ElectionStatus, Role, TabCoordinator};
pub use error::TabError;
pub use events::{EventBus, TabEvent};
pub use gate::LoginGate;
pub use identity::TabId;
pub use sim::Browser;
pub use storage::{HubClient, StorageHub};
