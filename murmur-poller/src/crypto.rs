//! The envelope crypto seam.
//!
//! Decoding, authenticating, and decrypting a polled item is delegated to an
//! external collaborator; the poller only cares about the typed failure
//! classification ([`MessageError`]).

use murmur_types::{AccountId, DecodedEnvelope, MessageError, Namespace, RawSwarmItem};
use std::collections::HashMap;
use std::sync::Mutex;

/// Opens raw swarm items into decoded envelopes.
pub trait EnvelopeCrypto: Send + Sync {
    /// Decode, authenticate, and decrypt one item. Infallible-or-errors; no
    /// internal retry.
    fn open(
        &self,
        account: &AccountId,
        namespace: Namespace,
        item: &RawSwarmItem,
    ) -> Result<DecodedEnvelope, MessageError>;
}

/// Mock crypto for testing: `seal` encodes an envelope, `open` decodes it.
///
/// Specific hashes can be marked to fail with a chosen [`MessageError`]
/// (self-sends, decrypt failures) to drive the per-item classification paths.
#[derive(Debug, Default)]
pub struct MockCrypto {
    failures: Mutex<HashMap<String, MessageError>>,
}

impl MockCrypto {
    /// Create a passthrough mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode an envelope into mock ciphertext.
    pub fn seal(envelope: &DecodedEnvelope) -> Vec<u8> {
        // Serialization of a plain struct cannot fail.
        rmp_serde::to_vec(envelope).unwrap_or_default()
    }

    /// Make every `open` of the given hash fail with `error`.
    pub fn fail_hash(&self, hash: &str, error: MessageError) {
        self.failures
            .lock()
            .unwrap()
            .insert(hash.to_string(), error);
    }
}

impl EnvelopeCrypto for MockCrypto {
    fn open(
        &self,
        _account: &AccountId,
        _namespace: Namespace,
        item: &RawSwarmItem,
    ) -> Result<DecodedEnvelope, MessageError> {
        if let Some(error) = self.failures.lock().unwrap().get(item.hash.as_str()) {
            return Err(error.clone());
        }
        rmp_serde::from_slice(&item.data).map_err(|e| MessageError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_types::MessageHash;

    fn account() -> AccountId {
        AccountId::new(&format!("05{}", "ab".repeat(32))).unwrap()
    }

    fn envelope() -> DecodedEnvelope {
        DecodedEnvelope {
            conversation: account().as_str().to_string(),
            sender: account(),
            namespace: Namespace::Default,
            hash: MessageHash::new("h1"),
            payload: b"hello".to_vec(),
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn seal_then_open_round_trips() {
        let crypto = MockCrypto::new();
        let item = RawSwarmItem {
            hash: MessageHash::new("h1"),
            data: MockCrypto::seal(&envelope()),
            timestamp_ms: 1,
        };
        let opened = crypto.open(&account(), Namespace::Default, &item).unwrap();
        assert_eq!(opened, envelope());
    }

    #[test]
    fn garbage_fails_with_decode_error() {
        let crypto = MockCrypto::new();
        let item = RawSwarmItem {
            hash: MessageHash::new("h1"),
            data: vec![0xFF, 0x01],
            timestamp_ms: 1,
        };
        assert!(matches!(
            crypto.open(&account(), Namespace::Default, &item),
            Err(MessageError::Decode(_))
        ));
    }

    #[test]
    fn marked_hashes_fail_as_configured() {
        let crypto = MockCrypto::new();
        crypto.fail_hash("h1", MessageError::SelfSend);
        let item = RawSwarmItem {
            hash: MessageHash::new("h1"),
            data: MockCrypto::seal(&envelope()),
            timestamp_ms: 1,
        };
        assert!(matches!(
            crypto.open(&account(), Namespace::Default, &item),
            Err(MessageError::SelfSend)
        ));
    }
}
