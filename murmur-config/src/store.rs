//! The config store: the single owner of every live config object.
//!
//! All merge, mutation, push, and dump traffic for an account flows through
//! one `tokio::sync::Mutex` held in the store's account map, so exactly one
//! task touches a given (account, variant) object at a time. Group accounts
//! hold their Info/Members/Keys triple behind the same lock, which also
//! guarantees the triple is never observed half-updated.

use crate::delta::{ConfigDelta, IncomingConfigMessage};
use crate::error::ConfigError;
use crate::group::GroupConfigTriple;
use crate::object::{now_ms, ConfigObject, ContactEntry, PendingPush};
use crate::persist::{CommitBatch, ConfigPersistence, LocalMutation};
use crate::value::ConfigValue;
use async_trait::async_trait;
use dashmap::DashMap;
use murmur_types::{AccountId, ConfigDumpRecord, ConfigVariant, JobDispatcher, MessageHash, SyncJob};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Proof that the holder just created a group and may seed its config before
/// an admin key is loaded.
///
/// Minted only by [`ConfigStore::create_group`], not cloneable, and consumed
/// by the mutation that uses it, so the bypass cannot outlive group setup.
#[derive(Debug)]
pub struct GroupCreationToken {
    account: AccountId,
}

impl GroupCreationToken {
    /// The group this token authorizes.
    pub fn account(&self) -> &AccountId {
        &self.account
    }
}

/// Knobs for a single config mutation.
#[derive(Debug, Default)]
pub struct MutationOptions {
    /// Apply and persist the change but do not enqueue a push job. Used when
    /// the caller batches several mutations and pushes once at the end.
    pub skip_automatic_sync: bool,
    /// One-shot admin bypass for group setup.
    pub admin_bypass: Option<GroupCreationToken>,
}

/// Confirmation that the swarm accepted a pushed config delta.
#[derive(Debug, Clone)]
pub struct PushResult {
    /// The variant that was pushed.
    pub variant: ConfigVariant,
    /// The sequence number the push was built at.
    pub seqno: u64,
    /// The swarm hash the stored delta landed under.
    pub hash: MessageHash,
}

/// The config objects held for one account.
#[derive(Debug, Clone)]
enum AccountConfigs {
    User {
        profile: ConfigObject,
        contacts: ConfigObject,
        volatile: ConfigObject,
        groups: ConfigObject,
        local: ConfigObject,
    },
    Group(GroupConfigTriple),
}

impl AccountConfigs {
    fn user(account: AccountId) -> Self {
        Self::User {
            profile: ConfigObject::new(ConfigVariant::UserProfile, account.clone()),
            contacts: ConfigObject::new(ConfigVariant::Contacts, account.clone()),
            volatile: ConfigObject::new(ConfigVariant::ConvoInfoVolatile, account.clone()),
            groups: ConfigObject::new(ConfigVariant::UserGroups, account.clone()),
            local: ConfigObject::new(ConfigVariant::Local, account),
        }
    }

    fn object(&self, variant: ConfigVariant) -> Option<&ConfigObject> {
        match self {
            Self::User {
                profile,
                contacts,
                volatile,
                groups,
                local,
            } => match variant {
                ConfigVariant::UserProfile => Some(profile),
                ConfigVariant::Contacts => Some(contacts),
                ConfigVariant::ConvoInfoVolatile => Some(volatile),
                ConfigVariant::UserGroups => Some(groups),
                ConfigVariant::Local => Some(local),
                _ => None,
            },
            Self::Group(triple) => triple.object(variant),
        }
    }

    fn object_mut(&mut self, variant: ConfigVariant) -> Option<&mut ConfigObject> {
        match self {
            Self::User {
                profile,
                contacts,
                volatile,
                groups,
                local,
            } => match variant {
                ConfigVariant::UserProfile => Some(profile),
                ConfigVariant::Contacts => Some(contacts),
                ConfigVariant::ConvoInfoVolatile => Some(volatile),
                ConfigVariant::UserGroups => Some(groups),
                ConfigVariant::Local => Some(local),
                _ => None,
            },
            Self::Group(triple) => triple.object_mut(variant),
        }
    }

    fn replace(&mut self, object: ConfigObject) -> Result<(), ConfigError> {
        match self {
            Self::Group(triple) => triple.replace_object(object),
            Self::User { .. } => match self.object_mut(object.variant()) {
                Some(slot) => {
                    *slot = object;
                    Ok(())
                }
                None => Err(ConfigError::Merge(format!(
                    "{:?} does not belong to a user account",
                    object.variant()
                ))),
            },
        }
    }
}

/// Observable state derived from an account's configs, captured before and
/// after a merge to compute local side effects.
#[derive(Debug, Default, PartialEq, Eq)]
struct Observed {
    profile_name: Option<String>,
    contacts: BTreeMap<String, ContactEntry>,
    groups: BTreeMap<String, Option<String>>,
    group_info_name: Option<String>,
    read_markers: BTreeMap<String, u64>,
}

fn observe(configs: &AccountConfigs) -> Observed {
    match configs {
        AccountConfigs::User {
            profile,
            contacts,
            volatile,
            groups,
            ..
        } => {
            let mut observed = Observed {
                profile_name: profile.profile_name(),
                read_markers: volatile.read_markers(),
                ..Default::default()
            };
            for entry in contacts.contacts() {
                observed.contacts.insert(entry.account.clone(), entry);
            }
            for group in groups.joined_groups() {
                let name = match groups.get(&format!("group.{}.name", group)) {
                    Some(ConfigValue::Text(name)) => Some(name.clone()),
                    _ => None,
                };
                observed.groups.insert(group, name);
            }
            observed
        }
        AccountConfigs::Group(triple) => {
            let mut observed = Observed::default();
            if let Some(info) = triple.object(ConfigVariant::GroupInfo) {
                if let Some(ConfigValue::Text(name)) = info.get("info.name") {
                    observed.group_info_name = Some(name.clone());
                }
            }
            observed
        }
    }
}

/// Local side effects implied by an observable-state transition.
fn diff_to_mutations(
    account: &AccountId,
    before: &Observed,
    after: &Observed,
) -> Vec<LocalMutation> {
    let mut mutations = Vec::new();

    if after.profile_name != before.profile_name {
        if let Some(name) = &after.profile_name {
            mutations.push(LocalMutation::SetProfileName { name: name.clone() });
        }
    }

    for (contact, entry) in &after.contacts {
        let old = before.contacts.get(contact);
        if old != Some(entry) {
            mutations.push(LocalMutation::UpsertContact {
                account: contact.clone(),
                priority: entry.priority,
                approved: entry.approved,
                blocked: entry.blocked,
                name: entry.name.clone(),
            });
        }
        // Hiding a conversation removes its local thread.
        let was_hidden = old.map_or(false, ContactEntry::hidden);
        if entry.hidden() && !was_hidden {
            mutations.push(LocalMutation::DeleteThread {
                conversation: contact.clone(),
            });
        }
    }

    for (group, name) in &after.groups {
        if before.groups.get(group) != Some(name) {
            mutations.push(LocalMutation::UpsertGroupThread {
                group: group.clone(),
                name: name.clone(),
            });
        }
    }
    for group in before.groups.keys() {
        if !after.groups.contains_key(group) {
            mutations.push(LocalMutation::RemoveGroupThread {
                group: group.clone(),
            });
        }
    }

    if after.group_info_name != before.group_info_name {
        if let Some(name) = &after.group_info_name {
            mutations.push(LocalMutation::UpsertGroupThread {
                group: account.as_str().to_string(),
                name: Some(name.clone()),
            });
        }
    }

    // Read markers only ever advance.
    for (conversation, last_read) in &after.read_markers {
        let advanced = before
            .read_markers
            .get(conversation)
            .map_or(true, |old| last_read > old);
        if advanced {
            mutations.push(LocalMutation::MarkThreadRead {
                conversation: conversation.clone(),
                last_read_ms: *last_read,
            });
        }
    }

    mutations
}

/// Conversations the account's other configs vouch for: contacts plus
/// joined groups. Volatile entries referencing anything else are stale.
fn known_conversations(configs: &AccountConfigs) -> BTreeSet<String> {
    match configs {
        AccountConfigs::User {
            contacts, groups, ..
        } => {
            let mut known: BTreeSet<String> = contacts
                .contacts()
                .into_iter()
                .map(|entry| entry.account)
                .collect();
            known.extend(groups.joined_groups());
            known
        }
        AccountConfigs::Group(_) => BTreeSet::new(),
    }
}

/// The single owner of all live config objects, keyed by account.
pub struct ConfigStore<P> {
    entries: DashMap<AccountId, Arc<Mutex<AccountConfigs>>>,
    admin_keys: DashMap<AccountId, Vec<u8>>,
    persistence: Arc<P>,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl<P: ConfigPersistence> ConfigStore<P> {
    /// Create an empty store over the given persistence and job dispatcher.
    pub fn new(persistence: Arc<P>, dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self {
            entries: DashMap::new(),
            admin_keys: DashMap::new(),
            persistence,
            dispatcher,
        }
    }

    // ------------------------------------------------------------------
    // Account lifecycle
    // ------------------------------------------------------------------

    /// Register a user account, creating its five config objects. Idempotent.
    pub fn register_user(&self, account: AccountId) -> Result<(), ConfigError> {
        if account.is_group() {
            return Err(ConfigError::WrongAccountKind(format!(
                "{:?} is a group account",
                account
            )));
        }
        self.entries
            .entry(account.clone())
            .or_insert_with(|| Arc::new(Mutex::new(AccountConfigs::user(account))));
        Ok(())
    }

    /// Create a new group's config triple and mint the one-shot token that
    /// lets the creator seed it before an admin key is loaded.
    pub fn create_group(&self, account: AccountId) -> Result<GroupCreationToken, ConfigError> {
        let triple = GroupConfigTriple::new(account.clone())?;
        match self.entries.entry(account.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(ConfigError::InvalidState { account })
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(AccountConfigs::Group(triple))));
            }
        }
        Ok(GroupCreationToken { account })
    }

    /// Drop an account's config objects and admin key.
    pub fn remove_account(&self, account: &AccountId) {
        self.entries.remove(account);
        self.admin_keys.remove(account);
    }

    /// Load a group admin key, unlocking mutation of that group's config.
    pub fn load_admin_key(&self, account: AccountId, key: Vec<u8>) {
        self.admin_keys.insert(account, key);
    }

    /// Whether an admin key is loaded for a group.
    pub fn has_admin_key(&self, account: &AccountId) -> bool {
        self.admin_keys.contains_key(account)
    }

    /// Whether a live config object exists for (account, variant).
    pub async fn is_loaded(&self, account: &AccountId, variant: ConfigVariant) -> bool {
        match self.entries.get(account).map(|e| Arc::clone(e.value())) {
            Some(entry) => entry.lock().await.object(variant).is_some(),
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Run a read-only closure against a config object under the account
    /// lock. The closure must not stash the reference anywhere.
    pub async fn with_config<R>(
        &self,
        account: &AccountId,
        variant: ConfigVariant,
        f: impl FnOnce(&ConfigObject) -> R,
    ) -> Result<R, ConfigError> {
        let entry = self.entry(account, variant)?;
        let configs = entry.lock().await;
        match configs.object(variant) {
            Some(object) => Ok(f(object)),
            None => Err(ConfigError::NotLoaded {
                account: account.clone(),
                variant,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Local mutation
    // ------------------------------------------------------------------

    /// Apply a local mutation to one config object, commit its side effects,
    /// and (unless suppressed) enqueue a push job.
    ///
    /// Group-scoped variants require a loaded admin key or the group-creation
    /// token. Nothing is committed if the mutation leaves the object invalid
    /// or the commit fails; in both cases in-memory state is rolled back.
    pub async fn perform_and_push_change<F>(
        &self,
        account: &AccountId,
        variant: ConfigVariant,
        options: MutationOptions,
        mutate: F,
    ) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut ConfigObject),
    {
        self.check_admin(account, variant, options.admin_bypass.as_ref())?;

        let entry = self.entry(account, variant)?;
        let mut configs = entry.lock().await;
        let rollback = configs.clone();
        let before = observe(&configs);

        let Some(object) = configs.object_mut(variant) else {
            return Err(ConfigError::NotLoaded {
                account: account.clone(),
                variant,
            });
        };
        mutate(object);

        if !object.is_valid() {
            error!(account = ?account, ?variant, "mutation left config invalid, rolling back");
            *configs = rollback;
            return Err(ConfigError::InvalidState {
                account: account.clone(),
            });
        }

        let events = object.take_events();
        let mut dumps = Vec::new();
        if object.needs_dump() {
            dumps.push(object.dump()?);
        }
        let needs_push = object.needs_push();

        let after = observe(&configs);
        let batch = CommitBatch {
            mutations: diff_to_mutations(account, &before, &after),
            dumps: dumps.clone(),
            events,
            timestamp_updates: Vec::new(),
        };
        if !batch.is_empty() {
            if let Err(e) = self.persistence.commit(batch).await {
                error!(account = ?account, ?variant, "commit failed, rolling back: {e}");
                *configs = rollback;
                return Err(e);
            }
        }

        if needs_push && !options.skip_automatic_sync {
            self.dispatcher.dispatch(
                SyncJob::PushConfig {
                    account: account.clone(),
                },
                true,
            );
        }
        if !dumps.is_empty() {
            self.dispatcher.dispatch(
                SyncJob::ReplicateDumps {
                    account: account.clone(),
                    dumps,
                },
                false,
            );
        }
        Ok(())
    }

    /// Mint a new group key generation covering the current membership.
    ///
    /// Same gating and commit semantics as [`Self::perform_and_push_change`];
    /// routed separately because rekeying reads the Members object while
    /// writing the Keys object.
    pub async fn rekey_group(
        &self,
        account: &AccountId,
        options: MutationOptions,
        key_material: Vec<u8>,
    ) -> Result<u64, ConfigError> {
        self.check_admin(account, ConfigVariant::GroupKeys, options.admin_bypass.as_ref())?;

        let entry = self.entry(account, ConfigVariant::GroupKeys)?;
        let mut configs = entry.lock().await;
        let rollback = configs.clone();

        let AccountConfigs::Group(triple) = &mut *configs else {
            return Err(ConfigError::WrongAccountKind(format!(
                "{:?} is not a group account",
                account
            )));
        };
        let generation = triple.rekey(key_material, now_ms())?;

        let mut events = Vec::new();
        let mut dumps = Vec::new();
        if let Some(keys) = triple.object_mut(ConfigVariant::GroupKeys) {
            events = keys.take_events();
            if keys.needs_dump() {
                dumps.push(keys.dump()?);
            }
        }

        let batch = CommitBatch {
            dumps: dumps.clone(),
            events,
            ..Default::default()
        };
        if let Err(e) = self.persistence.commit(batch).await {
            error!(account = ?account, "rekey commit failed, rolling back: {e}");
            *configs = rollback;
            return Err(e);
        }

        if !options.skip_automatic_sync {
            self.dispatcher.dispatch(
                SyncJob::PushConfig {
                    account: account.clone(),
                },
                true,
            );
        }
        if !dumps.is_empty() {
            self.dispatcher.dispatch(
                SyncJob::ReplicateDumps {
                    account: account.clone(),
                    dumps,
                },
                false,
            );
        }
        Ok(generation)
    }

    // ------------------------------------------------------------------
    // Remote merge
    // ------------------------------------------------------------------

    /// Group messages by variant and order the groups by cross-variant merge
    /// precedence. Messages from non-config namespaces are dropped with a
    /// warning.
    fn route_config_messages(
        messages: Vec<IncomingConfigMessage>,
    ) -> Vec<(ConfigVariant, Vec<IncomingConfigMessage>)> {
        let mut routed: BTreeMap<ConfigVariant, Vec<IncomingConfigMessage>> = BTreeMap::new();
        for message in messages {
            match ConfigVariant::from_namespace(message.namespace) {
                Some(variant) => routed.entry(variant).or_default().push(message),
                None => {
                    warn!(
                        namespace = ?message.namespace,
                        "dropping config message from non-config namespace"
                    );
                }
            }
        }
        let mut ordered: Vec<(ConfigVariant, Vec<IncomingConfigMessage>)> =
            routed.into_iter().collect();
        ordered.sort_by_key(|(variant, _)| variant.processing_order());
        ordered
    }

    /// The merge loop proper, run under the account's lock. A variant whose
    /// merge fails is rolled back and skipped without affecting the others.
    /// Observed events stay buffered in the objects; the caller drains them
    /// into a durable commit.
    fn merge_routed(
        account: &AccountId,
        configs: &mut AccountConfigs,
        ordered: Vec<(ConfigVariant, Vec<IncomingConfigMessage>)>,
    ) -> BTreeMap<ConfigVariant, u64> {
        let mut timestamps = BTreeMap::new();
        for (variant, batch) in ordered {
            let mut deltas = Vec::with_capacity(batch.len());
            for message in batch {
                match ConfigDelta::from_bytes(&message.data) {
                    Ok(delta) => deltas.push((message.hash, delta, message.server_timestamp_ms)),
                    Err(e) => {
                        warn!(hash = ?message.hash, ?variant, "dropping undecodable config message: {e}");
                    }
                }
            }
            if deltas.is_empty() {
                continue;
            }

            // Volatile entries may only reference conversations another
            // config vouches for. Contacts and groups merge earlier in the
            // same pass, so references delivered together still resolve.
            if variant == ConfigVariant::ConvoInfoVolatile {
                let known = known_conversations(configs);
                for (hash, delta, _) in &mut deltas {
                    delta.fields.retain(|key, _| {
                        let conversation = key
                            .strip_prefix("volatile.")
                            .and_then(|rest| rest.rsplit_once('.'))
                            .map(|(conversation, _)| conversation);
                        match conversation {
                            Some(conversation) if !known.contains(conversation) => {
                                warn!(
                                    hash = ?hash,
                                    conversation,
                                    "dropping volatile entry for unknown conversation"
                                );
                                false
                            }
                            _ => true,
                        }
                    });
                }
            }

            let Some(object) = configs.object_mut(variant) else {
                warn!(account = ?account, ?variant, "no config object for merged variant");
                continue;
            };

            let rollback = object.clone();
            match object.merge(&deltas) {
                Ok(outcome) => {
                    debug!(
                        account = ?account,
                        ?variant,
                        applied = outcome.applied,
                        duplicates = outcome.duplicates,
                        "merged config batch"
                    );
                    timestamps.insert(variant, outcome.latest_server_timestamp_ms);
                }
                Err(e) => {
                    error!(account = ?account, ?variant, "config merge failed, skipping variant: {e}");
                    *object = rollback;
                }
            }
        }
        timestamps
    }

    /// Merge a poll's config messages into an account's live objects without
    /// persisting anything.
    ///
    /// Returns the latest server timestamp seen per merged variant. Observed
    /// events stay buffered in the objects until the next durable commit
    /// drains them; most callers want [`Self::handle_config_messages`], which
    /// wraps this and commits the side effects.
    pub async fn merge_config_messages(
        &self,
        account: &AccountId,
        messages: Vec<IncomingConfigMessage>,
    ) -> Result<BTreeMap<ConfigVariant, u64>, ConfigError> {
        let ordered = Self::route_config_messages(messages);
        let Some(first_variant) = ordered.first().map(|(variant, _)| *variant) else {
            return Ok(BTreeMap::new());
        };
        let entry = self.entry(account, first_variant)?;
        let mut configs = entry.lock().await;
        Ok(Self::merge_routed(account, &mut configs, ordered))
    }

    /// Merge a poll's config messages into an account's objects and commit
    /// every side effect in one transaction.
    ///
    /// Wraps [`Self::merge_config_messages`]: after the merge it diffs the
    /// observable state, translates the difference into local entity
    /// mutations, stamps fresh dumps where needed, and commits mutations,
    /// dumps, and buffered events atomically. Returns the latest server
    /// timestamp seen per merged variant.
    pub async fn handle_config_messages(
        &self,
        account: &AccountId,
        messages: Vec<IncomingConfigMessage>,
    ) -> Result<BTreeMap<ConfigVariant, u64>, ConfigError> {
        let ordered = Self::route_config_messages(messages);
        let Some(first_variant) = ordered.first().map(|(variant, _)| *variant) else {
            return Ok(BTreeMap::new());
        };

        let entry = self.entry(account, first_variant)?;
        let mut configs = entry.lock().await;
        let rollback_all = configs.clone();
        let before = observe(&configs);

        let timestamps = Self::merge_routed(account, &mut configs, ordered);
        let mut merged: Vec<ConfigVariant> = timestamps.keys().copied().collect();
        merged.sort_by_key(|variant| variant.processing_order());

        // Drain buffered events in processing order; objects that only saw
        // duplicates keep their dump, just touch the recorded timestamp so
        // staleness tracking stays accurate.
        let mut events = Vec::new();
        let mut dumps = Vec::new();
        let mut timestamp_updates = Vec::new();
        let mut any_push = false;
        for variant in &merged {
            if let Some(object) = configs.object_mut(*variant) {
                events.extend(object.take_events());
                if object.needs_dump() {
                    dumps.push(object.dump()?);
                } else {
                    timestamp_updates.push((account.clone(), *variant, timestamps[variant]));
                }
                if object.needs_push() {
                    any_push = true;
                }
            }
        }

        let after = observe(&configs);
        let batch = CommitBatch {
            mutations: diff_to_mutations(account, &before, &after),
            dumps: dumps.clone(),
            events,
            timestamp_updates,
        };
        if !batch.is_empty() {
            if let Err(e) = self.persistence.commit(batch).await {
                error!(account = ?account, "merge commit failed, rolling back: {e}");
                *configs = rollback_all;
                return Err(e);
            }
        }

        if any_push {
            self.dispatcher.dispatch(
                SyncJob::PushConfig {
                    account: account.clone(),
                },
                true,
            );
        }
        if !dumps.is_empty() {
            self.dispatcher.dispatch(
                SyncJob::ReplicateDumps {
                    account: account.clone(),
                    dumps,
                },
                false,
            );
        }
        Ok(timestamps)
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Serialized pending pushes for an account, in send order.
    ///
    /// A group account without a loaded admin key has nothing to push: the
    /// device cannot sign group config writes, so pending state just waits.
    pub async fn pending_pushes(&self, account: &AccountId) -> Result<Vec<PendingPush>, ConfigError> {
        if account.is_group() && !self.has_admin_key(account) {
            return Ok(Vec::new());
        }
        let entry = self.entry(account, ConfigVariant::Local)?;
        let configs = entry.lock().await;
        let mut pushes = Vec::new();
        for variant in ConfigVariant::ALL {
            if let Some(object) = configs.object(variant) {
                if let Some(push) = object.pending_push()? {
                    pushes.push(push);
                }
            }
        }
        pushes.sort_by_key(|p| p.variant.send_order());
        Ok(pushes)
    }

    /// Record a swarm-confirmed push and persist the resulting dump.
    pub async fn confirm_push(
        &self,
        account: &AccountId,
        result: PushResult,
    ) -> Result<(), ConfigError> {
        let entry = self.entry(account, result.variant)?;
        let mut configs = entry.lock().await;
        let rollback = configs.clone();

        let Some(object) = configs.object_mut(result.variant) else {
            return Err(ConfigError::NotLoaded {
                account: account.clone(),
                variant: result.variant,
            });
        };
        object.confirm_pushed(result.seqno, result.hash);

        if object.needs_dump() {
            let dumps = vec![object.dump()?];
            let batch = CommitBatch {
                dumps: dumps.clone(),
                ..Default::default()
            };
            if let Err(e) = self.persistence.commit(batch).await {
                error!(account = ?account, variant = ?result.variant, "confirm commit failed, rolling back: {e}");
                *configs = rollback;
                return Err(e);
            }
            self.dispatcher.dispatch(
                SyncJob::ReplicateDumps {
                    account: account.clone(),
                    dumps,
                },
                false,
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dump restore
    // ------------------------------------------------------------------

    /// Reconstruct an account's config objects from persisted dumps.
    ///
    /// Dumps are replayed in load order (user variants first, group Keys
    /// last) so cross-object references resolve. A dump for the wrong
    /// account or account kind is skipped with a warning.
    pub async fn load_dumps(
        &self,
        account: &AccountId,
        mut dumps: Vec<ConfigDumpRecord>,
    ) -> Result<(), ConfigError> {
        dumps.sort_by_key(|d| d.variant.load_order());

        if account.is_group() {
            let triple = GroupConfigTriple::new(account.clone())?;
            self.entries
                .entry(account.clone())
                .or_insert_with(|| Arc::new(Mutex::new(AccountConfigs::Group(triple))));
        } else {
            self.register_user(account.clone())?;
        }

        let entry = self.entry(account, ConfigVariant::Local)?;
        let mut configs = entry.lock().await;
        for dump in &dumps {
            if &dump.account != account {
                warn!(expected = ?account, got = ?dump.account, "skipping dump for wrong account");
                continue;
            }
            let object = ConfigObject::from_dump(dump)?;
            if let Err(e) = configs.replace(object) {
                warn!(account = ?account, variant = ?dump.variant, "skipping dump: {e}");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn entry(
        &self,
        account: &AccountId,
        variant: ConfigVariant,
    ) -> Result<Arc<Mutex<AccountConfigs>>, ConfigError> {
        self.entries
            .get(account)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| ConfigError::NotLoaded {
                account: account.clone(),
                variant,
            })
    }

    fn check_admin(
        &self,
        account: &AccountId,
        variant: ConfigVariant,
        bypass: Option<&GroupCreationToken>,
    ) -> Result<(), ConfigError> {
        if !variant.is_group_scoped() || self.has_admin_key(account) {
            return Ok(());
        }
        match bypass {
            Some(token) if token.account() == account => Ok(()),
            _ => Err(ConfigError::AdminRequired {
                account: account.clone(),
                variant,
            }),
        }
    }
}

/// The seam the poll result path uses to hand config messages to whatever
/// holds the config objects.
#[async_trait]
pub trait ConfigSink: Send + Sync {
    /// Merge one poll's config messages for an account. Returns the latest
    /// server timestamp per merged variant.
    async fn handle_config_messages(
        &self,
        account: &AccountId,
        messages: Vec<IncomingConfigMessage>,
    ) -> Result<BTreeMap<ConfigVariant, u64>, ConfigError>;
}

#[async_trait]
impl<P: ConfigPersistence + 'static> ConfigSink for ConfigStore<P> {
    async fn handle_config_messages(
        &self,
        account: &AccountId,
        messages: Vec<IncomingConfigMessage>,
    ) -> Result<BTreeMap<ConfigVariant, u64>, ConfigError> {
        ConfigStore::handle_config_messages(self, account, messages).await
    }
}
