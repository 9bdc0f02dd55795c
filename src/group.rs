//! Duplicate grouping.
//!
//! Partitions fetched contacts into equivalence classes by normalized phone
//! or email. Each dimension is grouped independently, so one contact can sit
//! in a phone group and an unrelated email group at the same time.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{Contact, DuplicateGroup, DuplicateKind};
use crate::normalize::normalized_key;

/// Group `contacts` by their `kind` key, keeping only keys shared by two or
/// more contacts.
///
/// The map is ordered by normalized value; contacts inside a group keep the
/// order they had in `contacts`. Contacts without a key are skipped.
pub fn group_contacts(contacts: &[Contact], kind: DuplicateKind) -> BTreeMap<String, DuplicateGroup> {
    let mut buckets: BTreeMap<String, DuplicateGroup> = BTreeMap::new();

    for contact in contacts {
        let Some(key) = normalized_key(contact, kind) else {
            continue;
        };
        buckets
            .entry(key.value.clone())
            .or_insert_with(|| DuplicateGroup {
                key,
                contacts: Vec::new(),
            })
            .contacts
            .push(contact.clone());
    }

    buckets.retain(|_, group| group.len() >= 2);
    buckets
}

/// Counts describing how a contact set splits along one dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupingStats {
    pub contacts_seen: usize,
    /// Contacts whose field normalized to a key.
    pub keyed: usize,
    pub unique_keys: usize,
    pub duplicate_groups: usize,
    /// Contacts that belong to some duplicate group.
    pub duplicated_contacts: usize,
}

impl GroupingStats {
    pub fn without_key(&self) -> usize {
        self.contacts_seen - self.keyed
    }
}

pub fn grouping_stats(contacts: &[Contact], kind: DuplicateKind) -> GroupingStats {
    let mut sizes: BTreeMap<String, usize> = BTreeMap::new();
    let mut keyed = 0;
    for contact in contacts {
        if let Some(key) = normalized_key(contact, kind) {
            keyed += 1;
            *sizes.entry(key.value).or_default() += 1;
        }
    }

    let duplicates: Vec<usize> = sizes.values().copied().filter(|&n| n >= 2).collect();
    GroupingStats {
        contacts_seen: contacts.len(),
        keyed,
        unique_keys: sizes.len(),
        duplicate_groups: duplicates.len(),
        duplicated_contacts: duplicates.iter().sum(),
    }
}
