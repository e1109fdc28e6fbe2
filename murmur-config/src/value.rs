//! Typed config values with per-field version stamps.

use serde::{Deserialize, Serialize};

/// A typed value stored in a config object field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigValue {
    /// UTF-8 text (names, URLs).
    Text(String),
    /// Signed integer (priorities, counters).
    Int(i64),
    /// Boolean flag (approved, blocked).
    Bool(bool),
    /// Opaque bytes (key material, picture digests).
    Blob(Vec<u8>),
}

impl ConfigValue {
    /// A canonical byte encoding used only to break merge ties
    /// deterministically across devices.
    pub(crate) fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            ConfigValue::Text(s) => {
                let mut out = vec![0u8];
                out.extend_from_slice(s.as_bytes());
                out
            }
            ConfigValue::Int(i) => {
                let mut out = vec![1u8];
                out.extend_from_slice(&i.to_be_bytes());
                out
            }
            ConfigValue::Bool(b) => vec![2u8, u8::from(*b)],
            ConfigValue::Blob(b) => {
                let mut out = vec![3u8];
                out.extend_from_slice(b);
                out
            }
        }
    }
}

/// A config field value plus the sender timestamp that versions it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedField {
    /// The field value.
    pub value: ConfigValue,
    /// Sender timestamp in milliseconds; higher wins.
    pub timestamp_ms: u64,
}

impl VersionedField {
    /// Create a versioned field.
    pub fn new(value: ConfigValue, timestamp_ms: u64) -> Self {
        Self {
            value,
            timestamp_ms,
        }
    }

    /// Last-write-wins precedence. Equal timestamps tie-break on the
    /// canonical value bytes so every device resolves the same way.
    pub fn wins_over(&self, other: &VersionedField) -> bool {
        if self.timestamp_ms != other.timestamp_ms {
            return self.timestamp_ms > other.timestamp_ms;
        }
        self.value.canonical_bytes() > other.value.canonical_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_timestamp_wins() {
        let old = VersionedField::new(ConfigValue::Text("a".into()), 100);
        let new = VersionedField::new(ConfigValue::Text("b".into()), 200);
        assert!(new.wins_over(&old));
        assert!(!old.wins_over(&new));
    }

    #[test]
    fn equal_timestamps_tie_break_deterministically() {
        let a = VersionedField::new(ConfigValue::Text("a".into()), 100);
        let b = VersionedField::new(ConfigValue::Text("b".into()), 100);
        // Exactly one side wins, and the same side wins every time.
        assert_ne!(a.wins_over(&b), b.wins_over(&a));
        assert!(b.wins_over(&a));
    }

    #[test]
    fn identical_fields_do_not_win_over_each_other() {
        let a = VersionedField::new(ConfigValue::Int(7), 100);
        let b = VersionedField::new(ConfigValue::Int(7), 100);
        assert!(!a.wins_over(&b));
        assert!(!b.wins_over(&a));
    }

    #[test]
    fn canonical_bytes_distinguish_types() {
        let text = ConfigValue::Text("1".into());
        let int = ConfigValue::Int(1);
        assert_ne!(text.canonical_bytes(), int.canonical_bytes());
    }
}
