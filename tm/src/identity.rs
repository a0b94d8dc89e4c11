//! Tab identity generation
//!
//! Every open tab gets one `TabId` at start. Ids are UUIDv7 strings: the
//! leading 48 bits are a millisecond timestamp, so ids sort by open time, and
//! the random tail keeps tabs opened within the same millisecond distinct.

use std::fmt;

/// Generate a fresh tab id string
pub fn generate_tab_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Identity of one open tab, immutable for the tab's lifetime
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TabId(String);

impl TabId {
    /// Create a new, unique tab id
    pub fn generate() -> Self {
        Self(generate_tab_id())
    }

    /// Get the full id string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for logs and tables (last 8 chars, the random tail)
    pub fn short(&self) -> &str {
        let start = self.0.len().saturating_sub(8);
        self.0.get(start..).unwrap_or(&self.0)
    }

    /// True when the id carries no characters
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TabId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TabId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for TabId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for TabId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for TabId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: std::collections::HashSet<TabId> = (0..1000).map(|_| TabId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_generated_ids_sort_by_open_time() {
        let first = TabId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = TabId::generate();
        assert!(first < second);
    }

    #[test]
    fn test_short_form() {
        let id = TabId::from("0192f0c4-7d1e-7abc-9def-0123456789ab");
        assert_eq!(id.short(), "456789ab");

        let tiny = TabId::from("abc");
        assert_eq!(tiny.short(), "abc");
    }

    #[test]
    fn test_empty_detection() {
        assert!(TabId::from("").is_empty());
        assert!(TabId::from("   ").is_empty());
        assert!(!TabId::generate().is_empty());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = TabId::from("tab-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"tab-1\"");

        let back: TabId = serde_json::from_str("\"tab-1\"").unwrap();
        assert_eq!(back, id);
    }
}
