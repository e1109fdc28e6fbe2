//! The merge-capable config object: one per (account, variant).
//!
//! Field naming conventions shared with the push/merge wire format:
//! - `profile.name`, `profile.picture` — user profile scalars
//! - `contact.<account>.priority|approved|blocked|name` — contact attributes
//!   (negative priority means the conversation is hidden)
//! - `group.<account>.name` — joined-group display names
//! - `volatile.<conversation>.last_read` — per-conversation read markers
//! - `info.name`, `info.description` — group info scalars
//! - `keygen.<generation>` — group key generation blobs
//! - sets: `groups` (joined groups), `members` / `admins` (group membership)
//!
//! The object itself is NOT thread-safe: exactly one logical owner (the
//! [`ConfigStore`]) may touch it at a time.
//!
//! [`ConfigStore`]: crate::store::ConfigStore

use crate::delta::ConfigDelta;
use crate::error::ConfigError;
use crate::event::ObservedEvent;
use crate::value::{ConfigValue, VersionedField};
use murmur_types::{AccountId, ConfigDumpRecord, ConfigVariant, MessageHash};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound on merged-delta hashes kept for dedup; the oldest is forgotten
/// past this. Re-merging a forgotten delta is harmless: every field write is
/// last-write-wins, so the replay changes nothing observable.
const MAX_SEEN_HASHES: usize = 4_096;

/// Milliseconds since the unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Summary of one merge pass over incoming deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Deltas applied for the first time.
    pub applied: usize,
    /// Deltas silently ignored because their hash was already merged.
    pub duplicates: usize,
    /// Highest server timestamp among the processed deltas.
    pub latest_server_timestamp_ms: u64,
}

/// A serialized push payload for one variant, consumed exactly once by the
/// push job or an explicit push-and-confirm cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPush {
    /// The variant being pushed.
    pub variant: ConfigVariant,
    /// The owning account.
    pub account: AccountId,
    /// Sequence number this push will confirm at.
    pub seqno: u64,
    /// Serialized [`ConfigDelta`] bytes.
    pub data: Vec<u8>,
    /// Hashes of swarm items this push supersedes (safe to expire).
    pub obsolete_hashes: Vec<MessageHash>,
}

/// One contact as observable from a Contacts config object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContactEntry {
    /// The contact's account id.
    pub account: String,
    /// Conversation priority; negative means hidden.
    pub priority: i64,
    /// Whether the contact request was approved.
    pub approved: bool,
    /// Whether the contact is blocked.
    pub blocked: bool,
    /// Synced display name, if any.
    pub name: Option<String>,
}

impl ContactEntry {
    /// Hidden conversations carry a negative priority.
    pub fn hidden(&self) -> bool {
        self.priority < 0
    }
}

/// Persisted state of a config object, the payload of a dump record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DumpState {
    fields: BTreeMap<String, VersionedField>,
    sets: BTreeMap<String, BTreeSet<String>>,
    seqno: u64,
    dirty_push: bool,
    /// Merged-delta hashes in merge order, oldest first.
    seen_hashes: Vec<MessageHash>,
    last_push_hash: Option<MessageHash>,
}

/// A mutable, merge-capable config state machine for one (account, variant).
#[derive(Debug, Clone)]
pub struct ConfigObject {
    variant: ConfigVariant,
    account: AccountId,
    fields: BTreeMap<String, VersionedField>,
    sets: BTreeMap<String, BTreeSet<String>>,
    /// Last confirmed push sequence number; monotonically increasing.
    seqno: u64,
    dirty_push: bool,
    needs_dump: bool,
    seen_hashes: BTreeSet<MessageHash>,
    seen_order: VecDeque<MessageHash>,
    last_push_hash: Option<MessageHash>,
    events: Vec<ObservedEvent>,
    errored: bool,
}

impl ConfigObject {
    /// Create an empty object.
    pub fn new(variant: ConfigVariant, account: AccountId) -> Self {
        Self {
            variant,
            account,
            fields: BTreeMap::new(),
            sets: BTreeMap::new(),
            seqno: 0,
            dirty_push: false,
            needs_dump: false,
            seen_hashes: BTreeSet::new(),
            seen_order: VecDeque::new(),
            last_push_hash: None,
            events: Vec::new(),
            errored: false,
        }
    }

    /// Record a merged or pushed hash for dedup, evicting the oldest past
    /// [`MAX_SEEN_HASHES`].
    fn note_seen(&mut self, hash: MessageHash) {
        if self.seen_hashes.insert(hash.clone()) {
            self.seen_order.push_back(hash);
        }
        while self.seen_hashes.len() > MAX_SEEN_HASHES {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen_hashes.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// The object's variant.
    pub fn variant(&self) -> ConfigVariant {
        self.variant
    }

    /// The owning account.
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Last confirmed push sequence number.
    pub fn seqno(&self) -> u64 {
        self.seqno
    }

    /// Whether there are local mutations not yet persisted to a dump.
    pub fn needs_dump(&self) -> bool {
        self.needs_dump
    }

    /// Whether there are local mutations not yet confirmed on the swarm.
    pub fn needs_push(&self) -> bool {
        self.dirty_push && self.variant.is_pushed()
    }

    /// Whether the object is in a usable state. A failed merge application
    /// marks the object errored; the store rolls back on seeing this.
    pub fn is_valid(&self) -> bool {
        !self.errored
    }

    // ------------------------------------------------------------------
    // Local mutation
    // ------------------------------------------------------------------

    /// Set a scalar field. The write only lands if it wins over the current
    /// value under last-write-wins; winning writes buffer an event and mark
    /// the object dirty.
    pub fn set(&mut self, key: &str, value: ConfigValue, timestamp_ms: u64) {
        let candidate = VersionedField::new(value, timestamp_ms);
        let wins = match self.fields.get(key) {
            Some(existing) => candidate.wins_over(existing),
            None => true,
        };
        if wins {
            self.events
                .push(ObservedEvent::new(key, candidate.value.clone()));
            self.fields.insert(key.to_string(), candidate);
            self.dirty_push = true;
            self.needs_dump = true;
        }
    }

    /// Insert a member into a union set. Idempotent; a genuinely new member
    /// buffers an event and marks the object dirty.
    pub fn add_set_member(&mut self, set: &str, member: &str) {
        let inserted = self
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        if inserted {
            self.events.push(ObservedEvent::new(
                format!("set.{}+{}", set, member),
                ConfigValue::Bool(true),
            ));
            self.dirty_push = true;
            self.needs_dump = true;
        }
    }

    /// Read a scalar field.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.fields.get(key).map(|f| &f.value)
    }

    /// Iterate over all scalar field keys.
    pub(crate) fn field_keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Read a set's members.
    pub fn set_members(&self, set: &str) -> Vec<String> {
        self.sets
            .get(set)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Remote merge
    // ------------------------------------------------------------------

    /// Merge one incoming delta.
    ///
    /// Deltas whose hash was already merged are silently counted as
    /// duplicates and produce no events. A delta for the wrong variant marks
    /// the object errored (the caller routed it incorrectly).
    pub fn merge_one(
        &mut self,
        hash: &MessageHash,
        delta: &ConfigDelta,
        server_timestamp_ms: u64,
    ) -> Result<MergeOutcome, ConfigError> {
        if delta.variant != self.variant {
            self.errored = true;
            return Err(ConfigError::Merge(format!(
                "delta for {:?} routed to {:?} object",
                delta.variant, self.variant
            )));
        }

        if self.seen_hashes.contains(hash) {
            return Ok(MergeOutcome {
                applied: 0,
                duplicates: 1,
                latest_server_timestamp_ms: server_timestamp_ms,
            });
        }

        for (key, incoming) in &delta.fields {
            let wins = match self.fields.get(key) {
                Some(existing) => incoming.wins_over(existing),
                None => true,
            };
            if wins {
                self.events
                    .push(ObservedEvent::new(key.clone(), incoming.value.clone()));
                self.fields.insert(key.clone(), incoming.clone());
            }
        }

        for (set, members) in &delta.set_inserts {
            let target = self.sets.entry(set.clone()).or_default();
            for member in members {
                if target.insert(member.clone()) {
                    self.events.push(ObservedEvent::new(
                        format!("set.{}+{}", set, member),
                        ConfigValue::Bool(true),
                    ));
                }
            }
        }

        // A remote delta at a higher seqno advances ours: our unpushed state
        // is already included in what we just merged only if we had nothing
        // pending.
        if delta.seqno > self.seqno && !self.dirty_push {
            self.seqno = delta.seqno;
        }

        self.note_seen(hash.clone());
        self.needs_dump = true;

        Ok(MergeOutcome {
            applied: 1,
            duplicates: 0,
            latest_server_timestamp_ms: server_timestamp_ms,
        })
    }

    /// Merge a batch of deltas, accumulating the outcome.
    pub fn merge(
        &mut self,
        deltas: &[(MessageHash, ConfigDelta, u64)],
    ) -> Result<MergeOutcome, ConfigError> {
        let mut outcome = MergeOutcome::default();
        for (hash, delta, server_ts) in deltas {
            let one = self.merge_one(hash, delta, *server_ts)?;
            outcome.applied += one.applied;
            outcome.duplicates += one.duplicates;
            outcome.latest_server_timestamp_ms = outcome
                .latest_server_timestamp_ms
                .max(one.latest_server_timestamp_ms);
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Build the push payload for the current unpushed state, if any.
    ///
    /// Does not mutate; the push is confirmed via [`Self::confirm_pushed`].
    pub fn pending_push(&self) -> Result<Option<PendingPush>, ConfigError> {
        if !self.needs_push() {
            return Ok(None);
        }
        let delta = ConfigDelta {
            variant: self.variant,
            seqno: self.seqno + 1,
            fields: self.fields.clone(),
            set_inserts: self.sets.clone(),
        };
        Ok(Some(PendingPush {
            variant: self.variant,
            account: self.account.clone(),
            seqno: self.seqno + 1,
            data: delta.to_bytes()?,
            obsolete_hashes: self.seen_hashes.iter().cloned().collect(),
        }))
    }

    /// Record that a push at `seqno` was confirmed by the swarm under `hash`.
    ///
    /// Advances the confirmed sequence number and clears the needs-push flag;
    /// the object then needs a fresh dump.
    pub fn confirm_pushed(&mut self, seqno: u64, hash: MessageHash) {
        if seqno > self.seqno {
            self.seqno = seqno;
            self.dirty_push = false;
            self.note_seen(hash.clone());
            self.last_push_hash = Some(hash);
            self.needs_dump = true;
        }
    }

    // ------------------------------------------------------------------
    // Dump / restore
    // ------------------------------------------------------------------

    /// Serialize a dump record and clear the needs-dump flag.
    pub fn dump(&mut self) -> Result<ConfigDumpRecord, ConfigError> {
        let state = DumpState {
            fields: self.fields.clone(),
            sets: self.sets.clone(),
            seqno: self.seqno,
            dirty_push: self.dirty_push,
            seen_hashes: self.seen_order.iter().cloned().collect(),
            last_push_hash: self.last_push_hash.clone(),
        };
        let data =
            rmp_serde::to_vec(&state).map_err(|e| ConfigError::Serialization(e.to_string()))?;
        self.needs_dump = false;
        Ok(ConfigDumpRecord {
            variant: self.variant,
            account: self.account.clone(),
            data,
            timestamp_ms: now_ms(),
        })
    }

    /// Reconstruct an object by replaying a dump record.
    pub fn from_dump(record: &ConfigDumpRecord) -> Result<Self, ConfigError> {
        let state: DumpState = rmp_serde::from_slice(&record.data)
            .map_err(|e| ConfigError::Serialization(e.to_string()))?;
        Ok(Self {
            variant: record.variant,
            account: record.account.clone(),
            fields: state.fields,
            sets: state.sets,
            seqno: state.seqno,
            dirty_push: state.dirty_push,
            needs_dump: false,
            seen_hashes: state.seen_hashes.iter().cloned().collect(),
            seen_order: state.seen_hashes.into(),
            last_push_hash: state.last_push_hash,
            events: Vec::new(),
            errored: false,
        })
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Drain the buffered events. Called only by the store, which flushes
    /// them atomically with the durable commit.
    pub fn take_events(&mut self) -> Vec<ObservedEvent> {
        std::mem::take(&mut self.events)
    }

    /// Whether events are buffered.
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    // ------------------------------------------------------------------
    // Observable state
    // ------------------------------------------------------------------

    /// The synced profile display name (UserProfile variant).
    pub fn profile_name(&self) -> Option<String> {
        match self.get("profile.name") {
            Some(ConfigValue::Text(name)) => Some(name.clone()),
            _ => None,
        }
    }

    /// The contact list as observable state (Contacts variant).
    pub fn contacts(&self) -> Vec<ContactEntry> {
        let mut entries: BTreeMap<String, ContactEntry> = BTreeMap::new();
        for (key, field) in &self.fields {
            let Some(rest) = key.strip_prefix("contact.") else {
                continue;
            };
            let Some((account, attr)) = rest.rsplit_once('.') else {
                continue;
            };
            let entry = entries
                .entry(account.to_string())
                .or_insert_with(|| ContactEntry {
                    account: account.to_string(),
                    ..Default::default()
                });
            match (attr, &field.value) {
                ("priority", ConfigValue::Int(p)) => entry.priority = *p,
                ("approved", ConfigValue::Bool(b)) => entry.approved = *b,
                ("blocked", ConfigValue::Bool(b)) => entry.blocked = *b,
                ("name", ConfigValue::Text(n)) => entry.name = Some(n.clone()),
                _ => {}
            }
        }
        entries.into_values().collect()
    }

    /// Joined group accounts (UserGroups variant).
    pub fn joined_groups(&self) -> Vec<String> {
        self.set_members("groups")
    }

    /// Group member accounts (GroupMembers variant).
    pub fn group_members(&self) -> Vec<String> {
        self.set_members("members")
    }

    /// Group admin accounts (GroupMembers variant).
    pub fn group_admins(&self) -> Vec<String> {
        self.set_members("admins")
    }

    /// Per-conversation last-read markers, milliseconds since epoch
    /// (ConvoInfoVolatile variant).
    pub fn read_markers(&self) -> BTreeMap<String, u64> {
        let mut markers = BTreeMap::new();
        for (key, field) in &self.fields {
            let Some(conversation) = volatile_conversation(key) else {
                continue;
            };
            if let ConfigValue::Int(ts) = &field.value {
                markers.insert(conversation.to_string(), (*ts).max(0) as u64);
            }
        }
        markers
    }
}

/// The conversation a `volatile.<conversation>.last_read` key refers to.
pub(crate) fn volatile_conversation(key: &str) -> Option<&str> {
    let rest = key.strip_prefix("volatile.")?;
    let (conversation, attr) = rest.rsplit_once('.')?;
    (attr == "last_read").then_some(conversation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountId {
        AccountId::new(&format!("05{}", "ab".repeat(32))).unwrap()
    }

    fn contacts_delta(seqno: u64, contact: &str, priority: i64, ts: u64) -> ConfigDelta {
        let mut fields = BTreeMap::new();
        fields.insert(
            format!("contact.{}.priority", contact),
            VersionedField::new(ConfigValue::Int(priority), ts),
        );
        fields.insert(
            format!("contact.{}.approved", contact),
            VersionedField::new(ConfigValue::Bool(true), ts),
        );
        ConfigDelta {
            variant: ConfigVariant::Contacts,
            seqno,
            fields,
            set_inserts: BTreeMap::new(),
        }
    }

    #[test]
    fn local_set_marks_dirty_and_buffers_event() {
        let mut obj = ConfigObject::new(ConfigVariant::UserProfile, account());
        assert!(!obj.needs_push());
        assert!(!obj.needs_dump());

        obj.set("profile.name", ConfigValue::Text("maren".into()), 1000);

        assert!(obj.needs_push());
        assert!(obj.needs_dump());
        let events = obj.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "profile.name");
        assert_eq!(obj.profile_name().as_deref(), Some("maren"));
    }

    #[test]
    fn older_write_loses() {
        let mut obj = ConfigObject::new(ConfigVariant::UserProfile, account());
        obj.set("profile.name", ConfigValue::Text("new".into()), 2000);
        obj.take_events();

        obj.set("profile.name", ConfigValue::Text("old".into()), 1000);

        assert_eq!(obj.profile_name().as_deref(), Some("new"));
        assert!(!obj.has_events());
    }

    #[test]
    fn duplicate_merge_is_silently_ignored_with_one_event() {
        // Feeding the same hash twice: first applies, second is a no-op, and
        // exactly one event is observed.
        let mut obj = ConfigObject::new(ConfigVariant::Contacts, account());
        let hash = MessageHash::new("hash-1");
        let delta = contacts_delta(1, "05aa", 1, 1000);

        let first = obj.merge_one(&hash, &delta, 5000).unwrap();
        assert_eq!(first.applied, 1);
        let events_after_first = obj.take_events();
        assert_eq!(events_after_first.len(), 2); // priority + approved

        let second = obj.merge_one(&hash, &delta, 5001).unwrap();
        assert_eq!(second.applied, 0);
        assert_eq!(second.duplicates, 1);
        assert!(!obj.has_events());
    }

    #[test]
    fn merge_wrong_variant_errors_the_object() {
        let mut obj = ConfigObject::new(ConfigVariant::UserProfile, account());
        let delta = contacts_delta(1, "05aa", 1, 1000);
        let result = obj.merge_one(&MessageHash::new("h"), &delta, 0);
        assert!(result.is_err());
        assert!(!obj.is_valid());
    }

    #[test]
    fn set_union_is_idempotent() {
        let mut obj = ConfigObject::new(ConfigVariant::GroupMembers, account());
        obj.add_set_member("members", "05aa");
        obj.add_set_member("members", "05aa");
        obj.add_set_member("members", "05bb");

        assert_eq!(obj.group_members(), vec!["05aa", "05bb"]);
        assert_eq!(obj.take_events().len(), 2);
    }

    #[test]
    fn dump_round_trip_preserves_observable_state() {
        let mut obj = ConfigObject::new(ConfigVariant::Contacts, account());
        obj.set("contact.05aa.priority", ConfigValue::Int(-1), 1000);
        obj.set("contact.05aa.blocked", ConfigValue::Bool(true), 1000);
        obj.add_set_member("members", "05aa");
        obj.confirm_pushed(4, MessageHash::new("pushed"));

        let record = obj.dump().unwrap();
        assert!(!obj.needs_dump());

        let restored = ConfigObject::from_dump(&record).unwrap();
        assert_eq!(restored.contacts(), obj.contacts());
        assert_eq!(restored.seqno(), 4);
        assert_eq!(restored.set_members("members"), obj.set_members("members"));
        assert!(!restored.needs_dump());
    }

    #[test]
    fn pending_push_and_confirm_advance_seqno() {
        let mut obj = ConfigObject::new(ConfigVariant::Contacts, account());
        assert!(obj.pending_push().unwrap().is_none());

        obj.set("contact.05aa.priority", ConfigValue::Int(0), 1000);
        let push = obj.pending_push().unwrap().unwrap();
        assert_eq!(push.seqno, 1);

        obj.confirm_pushed(push.seqno, MessageHash::new("confirmed"));
        assert!(!obj.needs_push());
        assert_eq!(obj.seqno(), 1);
        assert!(obj.needs_dump());
        assert!(obj.pending_push().unwrap().is_none());
    }

    #[test]
    fn stale_confirm_is_ignored() {
        let mut obj = ConfigObject::new(ConfigVariant::Contacts, account());
        obj.confirm_pushed(3, MessageHash::new("a"));
        obj.set("contact.05aa.priority", ConfigValue::Int(0), 1000);

        obj.confirm_pushed(2, MessageHash::new("stale"));

        assert_eq!(obj.seqno(), 3);
        assert!(obj.needs_push());
    }

    #[test]
    fn local_variant_never_needs_push() {
        let mut obj = ConfigObject::new(ConfigVariant::Local, account());
        obj.set("device.theme", ConfigValue::Text("dark".into()), 1000);
        assert!(!obj.needs_push());
        assert!(obj.needs_dump());
        assert!(obj.pending_push().unwrap().is_none());
    }

    #[test]
    fn remote_seqno_advances_only_without_pending_local_changes() {
        let mut obj = ConfigObject::new(ConfigVariant::Contacts, account());
        let delta = contacts_delta(5, "05aa", 1, 1000);
        obj.merge_one(&MessageHash::new("h1"), &delta, 0).unwrap();
        assert_eq!(obj.seqno(), 5);

        obj.set("contact.05bb.priority", ConfigValue::Int(0), 2000);
        let delta2 = contacts_delta(7, "05cc", 1, 3000);
        obj.merge_one(&MessageHash::new("h2"), &delta2, 0).unwrap();
        // Local unpushed state is not covered by the remote snapshot.
        assert_eq!(obj.seqno(), 5);
        assert!(obj.needs_push());
    }

    #[test]
    fn read_markers_parse_volatile_fields() {
        let mut obj = ConfigObject::new(ConfigVariant::ConvoInfoVolatile, account());
        obj.set("volatile.05aa.last_read", ConfigValue::Int(9_000), 1000);
        obj.set("volatile.05aa.unread", ConfigValue::Int(3), 1000);
        obj.set("volatile.05bb.last_read", ConfigValue::Int(7_500), 1000);

        let markers = obj.read_markers();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers["05aa"], 9_000);
        assert_eq!(markers["05bb"], 7_500);
        assert_eq!(volatile_conversation("volatile.05aa.last_read"), Some("05aa"));
        assert_eq!(volatile_conversation("contact.05aa.name"), None);
    }

    #[test]
    fn oldest_seen_hashes_are_forgotten_at_the_cap() {
        let mut obj = ConfigObject::new(ConfigVariant::Contacts, account());
        let delta = contacts_delta(1, "05aa", 1, 1000);
        for i in 0..=MAX_SEEN_HASHES {
            obj.merge_one(&MessageHash::new(format!("h{}", i)), &delta, 0)
                .unwrap();
        }
        obj.take_events();

        // The first hash aged out and re-applies; identical fields lose the
        // tie-break, so the replay observes nothing.
        let replay = obj
            .merge_one(&MessageHash::new("h0"), &delta, 0)
            .unwrap();
        assert_eq!(replay.applied, 1);
        assert!(!obj.has_events());

        // A recent hash is still deduplicated.
        let recent = obj
            .merge_one(&MessageHash::new(format!("h{}", MAX_SEEN_HASHES)), &delta, 0)
            .unwrap();
        assert_eq!(recent.duplicates, 1);
    }

    #[test]
    fn contacts_parse_hidden_flag() {
        let mut obj = ConfigObject::new(ConfigVariant::Contacts, account());
        obj.set("contact.05aa.priority", ConfigValue::Int(-3), 1000);
        let contacts = obj.contacts();
        assert_eq!(contacts.len(), 1);
        assert!(contacts[0].hidden());
    }
}
