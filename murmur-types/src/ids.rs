//! Identity and addressing types for murmur.

use crate::namespace::Namespace;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced while validating identifier strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    /// The account string is not the expected length.
    #[error("account id must be {expected} hex characters, got {actual}")]
    BadLength {
        /// Expected character count.
        expected: usize,
        /// Actual character count.
        actual: usize,
    },

    /// The account string contains non-hex characters.
    #[error("account id is not valid hex")]
    NotHex,

    /// The account prefix byte is not a known account kind.
    #[error("unknown account prefix: {0}")]
    UnknownPrefix(String),
}

/// Length of an account identifier: 1 prefix byte + 32 key bytes, hex encoded.
const ACCOUNT_ID_LEN: usize = 66;

/// Prefix for a standard (user identity) account.
const PREFIX_STANDARD: &str = "05";
/// Prefix for a group account.
const PREFIX_GROUP: &str = "03";

/// The public identifier of a polled identity: a user account, a group, or a
/// community room host.
///
/// Standard accounts and groups are 66 lowercase hex characters
/// (prefix byte + 32-byte public key). Community identifiers are free-form
/// (server URL + room token) and constructed via [`AccountId::community`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct AccountId(String);

impl AccountId {
    /// Parse and validate a swarm account identifier (user or group).
    pub fn new(s: &str) -> Result<Self, IdError> {
        if s.len() != ACCOUNT_ID_LEN {
            return Err(IdError::BadLength {
                expected: ACCOUNT_ID_LEN,
                actual: s.len(),
            });
        }
        if hex::decode(s).is_err() {
            return Err(IdError::NotHex);
        }
        let lowered = s.to_ascii_lowercase();
        if !lowered.starts_with(PREFIX_STANDARD) && !lowered.starts_with(PREFIX_GROUP) {
            return Err(IdError::UnknownPrefix(lowered[..2].to_string()));
        }
        Ok(Self(lowered))
    }

    /// Build a community-room identifier from a server base URL and room token.
    ///
    /// Community rooms live on open servers rather than in a swarm, so their
    /// identifiers are not hex keys.
    pub fn community(server: &str, room: &str) -> Self {
        Self(format!("{}/{}", server.trim_end_matches('/'), room))
    }

    /// The raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for a standard (user identity) account.
    pub fn is_standard(&self) -> bool {
        self.0.len() == ACCOUNT_ID_LEN && self.0.starts_with(PREFIX_STANDARD)
    }

    /// True for a group account.
    pub fn is_group(&self) -> bool {
        self.0.len() == ACCOUNT_ID_LEN && self.0.starts_with(PREFIX_GROUP)
    }

    /// True for a community-room identifier.
    pub fn is_community(&self) -> bool {
        !self.is_standard() && !self.is_group()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Truncate to at most `chars` characters, staying on a char boundary:
/// community ids may hold non-ASCII server names.
fn truncate_chars(s: &str, chars: usize) -> &str {
    match s.char_indices().nth(chars) {
        Some((index, _)) => &s[..index],
        None => s,
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({}…)", truncate_chars(&self.0, 10))
    }
}

/// An opaque, swarm-assigned message hash.
///
/// Hashes identify stored items and double as per-namespace poll cursors
/// ("give me everything after this hash").
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct MessageHash(String);

impl MessageHash {
    /// Wrap a swarm-provided hash string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The raw hash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageHash({}…)", truncate_chars(&self.0, 8))
    }
}

/// One storage node in an account's swarm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwarmNode {
    /// Network address (`ip:port` or onion-routed address).
    pub address: String,
    /// The node's ed25519 public key, hex encoded.
    pub ed25519_key: String,
}

impl SwarmNode {
    /// Create a node descriptor.
    pub fn new(address: impl Into<String>, ed25519_key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ed25519_key: ed25519_key.into(),
        }
    }
}

impl fmt::Display for SwarmNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// How poll requests for a target are authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    /// Signed with the account's own identity key.
    AccountKey,
    /// Signed with a loaded group admin key.
    GroupAdmin,
    /// Signed with a group member subaccount credential.
    GroupMember,
    /// Blinded authentication against a community server.
    Blinded {
        /// Capabilities the server advertised for this credential.
        capabilities: Vec<String>,
    },
    /// Unauthenticated (public namespaces only).
    None,
}

/// What a poller polls: an account plus the namespaces to query and the auth
/// method to sign the request with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmTarget {
    /// The polled account.
    pub account: AccountId,
    /// Current authentication method for this target.
    pub auth: AuthMethod,
    /// Namespaces to include in each poll.
    pub namespaces: Vec<Namespace>,
}

impl SwarmTarget {
    /// Create a target.
    pub fn new(account: AccountId, auth: AuthMethod, namespaces: Vec<Namespace>) -> Self {
        Self {
            account,
            auth,
            namespaces,
        }
    }

    /// Stable key for bookkeeping maps.
    pub fn key(&self) -> String {
        self.account.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_hex() -> String {
        format!("05{}", "ab".repeat(32))
    }

    #[test]
    fn account_id_accepts_standard_prefix() {
        let id = AccountId::new(&standard_hex()).unwrap();
        assert!(id.is_standard());
        assert!(!id.is_group());
        assert!(!id.is_community());
    }

    #[test]
    fn account_id_accepts_group_prefix() {
        let id = AccountId::new(&format!("03{}", "cd".repeat(32))).unwrap();
        assert!(id.is_group());
    }

    #[test]
    fn account_id_rejects_bad_length() {
        let err = AccountId::new("05abcd").unwrap_err();
        assert!(matches!(err, IdError::BadLength { actual: 6, .. }));
    }

    #[test]
    fn account_id_rejects_non_hex() {
        let bad = format!("05{}", "zz".repeat(32));
        assert_eq!(AccountId::new(&bad).unwrap_err(), IdError::NotHex);
    }

    #[test]
    fn account_id_rejects_unknown_prefix() {
        let bad = format!("99{}", "ab".repeat(32));
        assert!(matches!(
            AccountId::new(&bad).unwrap_err(),
            IdError::UnknownPrefix(_)
        ));
    }

    #[test]
    fn account_id_lowercases() {
        let id = AccountId::new(&format!("05{}", "AB".repeat(32))).unwrap();
        assert_eq!(id.as_str(), standard_hex());
    }

    #[test]
    fn community_id_is_community() {
        let id = AccountId::community("https://rooms.example.org/", "lounge");
        assert!(id.is_community());
        assert_eq!(id.as_str(), "https://rooms.example.org/lounge");
    }

    #[test]
    fn debug_output_is_truncated() {
        let id = AccountId::new(&standard_hex()).unwrap();
        let debug = format!("{:?}", id);
        assert!(debug.len() < standard_hex().len());

        let hash = MessageHash::new("aVeryLongSwarmHashValue");
        assert!(format!("{:?}", hash).contains("aVeryLon"));
    }

    #[test]
    fn debug_truncation_respects_char_boundaries() {
        // An internationalized community server name puts multi-byte
        // characters inside the truncation window.
        let id = AccountId::community("https://räume.example.org", "café");
        assert_eq!(format!("{:?}", id), "AccountId(https://rä…)");

        let hash = MessageHash::new("ますますます");
        assert_eq!(format!("{:?}", hash), "MessageHash(ますますます…)");
    }

    #[test]
    fn target_key_is_account() {
        let id = AccountId::new(&standard_hex()).unwrap();
        let target = SwarmTarget::new(id.clone(), AuthMethod::AccountKey, vec![Namespace::Default]);
        assert_eq!(target.key(), id.as_str());
    }
}
