//! The persistence seam: transactional commit of config side effects.
//!
//! Every store operation that changes durable state produces one
//! [`CommitBatch`]: local entity mutations, fresh config dumps, observed
//! events, and timestamp touches. Implementations apply the whole batch in a
//! single transaction — events must never be visible for a change that did
//! not commit. Follow-up async work (push jobs, dump replication) is
//! dispatched by the store only after `commit` returns Ok.

use crate::error::ConfigError;
use crate::event::ObservedEvent;
use async_trait::async_trait;
use murmur_types::{AccountId, ConfigDumpRecord, ConfigVariant};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// One durable change to local application state derived from merged config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalMutation {
    /// Create or update a contact record.
    UpsertContact {
        /// The contact's account id.
        account: String,
        /// Conversation priority; negative means hidden.
        priority: i64,
        /// Approved flag.
        approved: bool,
        /// Blocked flag.
        blocked: bool,
        /// Synced display name.
        name: Option<String>,
    },
    /// Delete the local conversation thread (contact became hidden).
    DeleteThread {
        /// The conversation id.
        conversation: String,
    },
    /// Update the account's own profile display name.
    SetProfileName {
        /// The new name.
        name: String,
    },
    /// Create or update the thread for a joined group.
    UpsertGroupThread {
        /// The group account id.
        group: String,
        /// The group display name, if synced.
        name: Option<String>,
    },
    /// Remove the thread for a departed group.
    RemoveGroupThread {
        /// The group account id.
        group: String,
    },
    /// Advance a conversation's read marker (synced from another device).
    MarkThreadRead {
        /// The conversation id.
        conversation: String,
        /// Everything at or before this timestamp is read.
        last_read_ms: u64,
    },
}

/// Everything one store operation needs committed atomically.
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    /// Local entity changes derived from the merge/mutation.
    pub mutations: Vec<LocalMutation>,
    /// Fresh dumps for objects that still needed one.
    pub dumps: Vec<ConfigDumpRecord>,
    /// Events buffered during the merge/mutation.
    pub events: Vec<ObservedEvent>,
    /// Timestamp touches for objects whose dump is still current.
    pub timestamp_updates: Vec<(AccountId, ConfigVariant, u64)>,
}

impl CommitBatch {
    /// Whether the batch would change anything.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
            && self.dumps.is_empty()
            && self.events.is_empty()
            && self.timestamp_updates.is_empty()
    }
}

/// Transactional persistence collaborator.
#[async_trait]
pub trait ConfigPersistence: Send + Sync {
    /// Apply the batch in one transaction. On error, nothing in the batch
    /// may be visible.
    async fn commit(&self, batch: CommitBatch) -> Result<(), ConfigError>;
}

/// In-memory persistence used by tests and as the reference implementation.
///
/// Mirrors the mock-collaborator style used elsewhere: committed state is
/// queryable, and the next commit can be forced to fail.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    contacts: HashMap<String, (i64, bool, bool, Option<String>)>,
    threads: HashSet<String>,
    group_threads: HashMap<String, Option<String>>,
    profile_name: Option<String>,
    read_markers: HashMap<String, u64>,
    dumps: Vec<ConfigDumpRecord>,
    events: Vec<ObservedEvent>,
    timestamps: HashMap<(AccountId, ConfigVariant), u64>,
    fail_next_commit: Option<String>,
}

impl MemoryPersistence {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a visible conversation thread (test setup).
    pub fn insert_thread(&self, conversation: &str) {
        self.inner
            .lock()
            .unwrap()
            .threads
            .insert(conversation.to_string());
    }

    /// Whether a conversation thread is currently visible.
    pub fn has_thread(&self, conversation: &str) -> bool {
        self.inner.lock().unwrap().threads.contains(conversation)
    }

    /// The committed contact row, if any: (priority, approved, blocked, name).
    pub fn contact(&self, account: &str) -> Option<(i64, bool, bool, Option<String>)> {
        self.inner.lock().unwrap().contacts.get(account).cloned()
    }

    /// The committed profile name.
    pub fn profile_name(&self) -> Option<String> {
        self.inner.lock().unwrap().profile_name.clone()
    }

    /// Whether a group thread exists.
    pub fn has_group_thread(&self, group: &str) -> bool {
        self.inner.lock().unwrap().group_threads.contains_key(group)
    }

    /// The committed read marker for a conversation.
    pub fn last_read(&self, conversation: &str) -> Option<u64> {
        self.inner
            .lock()
            .unwrap()
            .read_markers
            .get(conversation)
            .copied()
    }

    /// All committed dumps, in commit order.
    pub fn dumps(&self) -> Vec<ConfigDumpRecord> {
        self.inner.lock().unwrap().dumps.clone()
    }

    /// The latest committed dump for one (account, variant).
    pub fn latest_dump(&self, account: &AccountId, variant: ConfigVariant) -> Option<ConfigDumpRecord> {
        self.inner
            .lock()
            .unwrap()
            .dumps
            .iter()
            .rev()
            .find(|d| &d.account == account && d.variant == variant)
            .cloned()
    }

    /// All events flushed so far, in commit order.
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    /// The recorded timestamp for one (account, variant).
    pub fn timestamp(&self, account: &AccountId, variant: ConfigVariant) -> Option<u64> {
        self.inner
            .lock()
            .unwrap()
            .timestamps
            .get(&(account.clone(), variant))
            .copied()
    }

    /// Cause the next commit to fail without applying anything.
    pub fn fail_next_commit(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_commit = Some(error.to_string());
    }
}

#[async_trait]
impl ConfigPersistence for MemoryPersistence {
    async fn commit(&self, batch: CommitBatch) -> Result<(), ConfigError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_commit.take() {
            return Err(ConfigError::Persistence(error));
        }

        for mutation in batch.mutations {
            match mutation {
                LocalMutation::UpsertContact {
                    account,
                    priority,
                    approved,
                    blocked,
                    name,
                } => {
                    inner
                        .contacts
                        .insert(account, (priority, approved, blocked, name));
                }
                LocalMutation::DeleteThread { conversation } => {
                    inner.threads.remove(&conversation);
                }
                LocalMutation::SetProfileName { name } => {
                    inner.profile_name = Some(name);
                }
                LocalMutation::UpsertGroupThread { group, name } => {
                    inner.group_threads.insert(group, name);
                }
                LocalMutation::RemoveGroupThread { group } => {
                    inner.group_threads.remove(&group);
                }
                LocalMutation::MarkThreadRead {
                    conversation,
                    last_read_ms,
                } => {
                    let marker = inner.read_markers.entry(conversation).or_default();
                    *marker = (*marker).max(last_read_ms);
                }
            }
        }

        for (account, variant, timestamp_ms) in batch.timestamp_updates {
            inner.timestamps.insert((account, variant), timestamp_ms);
        }
        for dump in &batch.dumps {
            inner
                .timestamps
                .insert((dump.account.clone(), dump.variant), dump.timestamp_ms);
        }
        inner.dumps.extend(batch.dumps);
        inner.events.extend(batch.events);

        Ok(())
    }
}
