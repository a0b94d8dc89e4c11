//! Error types for tab coordination

use thiserror::Error;

use crate::identity::TabId;
use crate::storage::ChannelError;

/// Crate-level error for coordinator and simulation operations
#[derive(Debug, Error)]
pub enum TabError {
    #[error("Shared storage error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Tab {0} is not open")]
    UnknownTab(TabId),

    #[error("No master tab")]
    NoMaster,
}

impl TabError {
    /// Whether the shared storage itself is gone (hub shut down)
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, TabError::Channel(ChannelError::Closed))
    }
}

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, TabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_closed_detection() {
        let err: TabError = ChannelError::Closed.into();
        assert!(err.is_channel_closed());
        assert!(!TabError::NoMaster.is_channel_closed());
    }

    #[test]
    fn test_messages() {
        let err = TabError::UnknownTab(TabId::from("tab-9"));
        assert_eq!(err.to_string(), "Tab tab-9 is not open");

        let err: TabError = ChannelError::Closed.into();
        assert_eq!(err.to_string(), "Shared storage error: Storage hub channel closed");
    }
}
