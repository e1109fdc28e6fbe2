//! Error types for the config cache.

use murmur_types::{AccountId, ConfigVariant, Namespace};
use thiserror::Error;

/// Errors produced by config objects and the config store.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A group-scoped variant was mutated without a loaded admin key.
    ///
    /// This is a programming-contract violation: callers must hold admin
    /// authority (or the group-creation token) before touching group config.
    #[error("admin key required to mutate {variant:?} for {account:?}")]
    AdminRequired {
        /// The group account.
        account: AccountId,
        /// The group-scoped variant.
        variant: ConfigVariant,
    },

    /// The (account, variant) pair has no live config object.
    #[error("config {variant:?} not loaded for {account:?}")]
    NotLoaded {
        /// The requested account.
        account: AccountId,
        /// The requested variant.
        variant: ConfigVariant,
    },

    /// The config object reported an errored internal state after mutation.
    #[error("config object for {account:?} is in an invalid state")]
    InvalidState {
        /// The owning account.
        account: AccountId,
    },

    /// A merge could not be applied.
    #[error("merge failed: {0}")]
    Merge(String),

    /// A delta or dump could not be encoded/decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The persistence collaborator failed to commit.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// The operation does not apply to this kind of account.
    #[error("wrong account kind: {0}")]
    WrongAccountKind(String),

    /// A config message arrived for a namespace with no processing order.
    #[error("namespace {0:?} has no config processing order")]
    UnknownConfigNamespace(Namespace),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConfigError>();
    }

    #[test]
    fn display_names_the_variant() {
        let account = AccountId::new(&format!("03{}", "ab".repeat(32))).unwrap();
        let err = ConfigError::AdminRequired {
            account,
            variant: ConfigVariant::GroupInfo,
        };
        assert!(err.to_string().contains("GroupInfo"));
    }
}
