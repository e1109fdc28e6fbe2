//! The group config triple: Info, Members, and Keys managed as one unit.
//!
//! The keys object is meaningless without the info and members objects it
//! protects, so the three live and die together: the triple is the single
//! owner, nothing hands out an individually-owned member, and dropping the
//! triple frees all three at once.

use crate::error::ConfigError;
use crate::object::ConfigObject;
use crate::value::ConfigValue;
use murmur_types::{AccountId, ConfigVariant};

/// A group's Info, Members, and Keys config objects under one owner.
#[derive(Debug, Clone)]
pub struct GroupConfigTriple {
    account: AccountId,
    info: ConfigObject,
    members: ConfigObject,
    keys: ConfigObject,
}

impl GroupConfigTriple {
    /// Create an empty triple for a group account.
    pub fn new(account: AccountId) -> Result<Self, ConfigError> {
        if !account.is_group() {
            return Err(ConfigError::WrongAccountKind(format!(
                "{:?} is not a group account",
                account
            )));
        }
        Ok(Self {
            info: ConfigObject::new(ConfigVariant::GroupInfo, account.clone()),
            members: ConfigObject::new(ConfigVariant::GroupMembers, account.clone()),
            keys: ConfigObject::new(ConfigVariant::GroupKeys, account.clone()),
            account,
        })
    }

    /// The group account.
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Borrow one of the triple's objects by variant.
    pub fn object(&self, variant: ConfigVariant) -> Option<&ConfigObject> {
        match variant {
            ConfigVariant::GroupInfo => Some(&self.info),
            ConfigVariant::GroupMembers => Some(&self.members),
            ConfigVariant::GroupKeys => Some(&self.keys),
            _ => None,
        }
    }

    /// Mutably borrow one of the triple's objects by variant.
    pub fn object_mut(&mut self, variant: ConfigVariant) -> Option<&mut ConfigObject> {
        match variant {
            ConfigVariant::GroupInfo => Some(&mut self.info),
            ConfigVariant::GroupMembers => Some(&mut self.members),
            ConfigVariant::GroupKeys => Some(&mut self.keys),
            _ => None,
        }
    }

    /// Replace one object wholesale (dump restore path).
    pub(crate) fn replace_object(&mut self, object: ConfigObject) -> Result<(), ConfigError> {
        match object.variant() {
            ConfigVariant::GroupInfo => self.info = object,
            ConfigVariant::GroupMembers => self.members = object,
            ConfigVariant::GroupKeys => self.keys = object,
            other => {
                return Err(ConfigError::Merge(format!(
                    "{:?} does not belong in a group triple",
                    other
                )))
            }
        }
        Ok(())
    }

    /// The newest key generation number, if any keys exist.
    pub fn latest_key_generation(&self) -> Option<u64> {
        self.keys.latest_keygen_generation()
    }

    /// Mint a new key generation covering the current member and admin sets.
    ///
    /// Reads the sibling members object (which is why keys cannot be owned
    /// separately) and records the new generation in the keys object.
    pub fn rekey(&mut self, key_material: Vec<u8>, timestamp_ms: u64) -> Result<u64, ConfigError> {
        let covered: Vec<String> = {
            let mut all = self.members.group_members();
            all.extend(self.members.group_admins());
            all.sort();
            all.dedup();
            all
        };
        if covered.is_empty() {
            return Err(ConfigError::Merge(
                "cannot rekey a group with no members".to_string(),
            ));
        }

        let generation = self.latest_key_generation().map_or(0, |g| g + 1);
        self.keys.set(
            &format!("keygen.{}", generation),
            ConfigValue::Blob(key_material),
            timestamp_ms,
        );
        self.keys.set(
            &format!("keygen.{}.covers", generation),
            ConfigValue::Text(covered.join(",")),
            timestamp_ms,
        );
        Ok(generation)
    }
}

impl ConfigObject {
    /// Highest `keygen.<n>` generation present in a GroupKeys object.
    fn latest_keygen_generation(&self) -> Option<u64> {
        let mut latest = None;
        for key in self.field_keys() {
            if let Some(rest) = key.strip_prefix("keygen.") {
                if let Ok(generation) = rest.parse::<u64>() {
                    latest = Some(latest.map_or(generation, |l: u64| l.max(generation)));
                }
            }
        }
        latest
    }
}
