//! Change sets: immutable diffs between the persisted record and a live tree.

use crate::types::{Hash, ItemType};
use std::collections::BTreeMap;

/// A new entry to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItem {
    pub hash: Hash,
    pub path: String,
    pub item_type: ItemType,
    pub last_modified: Option<i64>,
}

/// Field-level delta for an existing entry
///
/// A `path` delta denotes a move or rename of the entry keyed by its old path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateDelta {
    pub hash: Option<Hash>,
    pub path: Option<String>,
    pub last_modified: Option<i64>,
}

impl UpdateDelta {
    pub fn hash(hash: Hash) -> Self {
        Self {
            hash: Some(hash),
            ..Self::default()
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hash.is_none() && self.path.is_none() && self.last_modified.is_none()
    }

    /// Overlay `other` onto `self`, fields set in `other` win.
    fn merge(&mut self, other: &UpdateDelta) {
        if other.hash.is_some() {
            self.hash = other.hash;
        }
        if other.path.is_some() {
            self.path = other.path.clone();
        }
        if other.last_modified.is_some() {
            self.last_modified = other.last_modified;
        }
    }
}

/// Creates, updates and deletes between two tree states
///
/// Creates are ordered so every parent directory precedes its children.
/// Updates and deletes are keyed by the path currently persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    items_to_create: Vec<CreateItem>,
    items_to_update: BTreeMap<String, UpdateDelta>,
    items_to_delete: BTreeMap<String, ItemType>,
    last_modified_updates: BTreeMap<String, i64>,
}

impl ChangeSet {
    pub fn new(
        items_to_create: Vec<CreateItem>,
        items_to_update: BTreeMap<String, UpdateDelta>,
        items_to_delete: BTreeMap<String, ItemType>,
        last_modified_updates: BTreeMap<String, i64>,
    ) -> Self {
        Self {
            items_to_create,
            items_to_update,
            items_to_delete,
            last_modified_updates,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn items_to_create(&self) -> &[CreateItem] {
        &self.items_to_create
    }

    /// Updates keyed by old path
    ///
    /// Last-modified-only deltas are merged in when `include_last_modified`
    /// is set; hash and path deltas are never altered by the merge.
    pub fn items_to_update(&self, include_last_modified: bool) -> BTreeMap<String, UpdateDelta> {
        let mut updates = self.items_to_update.clone();
        if include_last_modified {
            for (path, timestamp) in &self.last_modified_updates {
                updates.entry(path.clone()).or_default().last_modified = Some(*timestamp);
            }
        }
        updates
    }

    pub fn items_to_delete(&self) -> &BTreeMap<String, ItemType> {
        &self.items_to_delete
    }

    pub fn last_modified_updates(&self) -> &BTreeMap<String, i64> {
        &self.last_modified_updates
    }

    /// True if nothing would change
    ///
    /// Last-modified-only updates count only when `include_last_modified` is set.
    pub fn is_empty(&self, include_last_modified: bool) -> bool {
        self.items_to_create.is_empty()
            && self.items_to_update.is_empty()
            && self.items_to_delete.is_empty()
            && (!include_last_modified || self.last_modified_updates.is_empty())
    }

    /// Number of entries touched (creates + updates + deletes).
    pub fn len(&self) -> usize {
        self.items_to_create.len() + self.items_to_update.len() + self.items_to_delete.len()
    }

    /// Combine with a later change set; entries of `other` win per path.
    pub fn with_other(&self, other: &ChangeSet) -> ChangeSet {
        let mut creates: Vec<CreateItem> = self
            .items_to_create
            .iter()
            .filter(|c| !other.items_to_create.iter().any(|o| o.path == c.path))
            .cloned()
            .collect();
        creates.extend(other.items_to_create.iter().cloned());

        let mut updates = self.items_to_update.clone();
        for (path, delta) in &other.items_to_update {
            updates.entry(path.clone()).or_default().merge(delta);
        }

        let mut deletes = self.items_to_delete.clone();
        deletes.extend(other.items_to_delete.iter().map(|(p, t)| (p.clone(), *t)));

        let mut last_modified = self.last_modified_updates.clone();
        last_modified.extend(other.last_modified_updates.iter().map(|(p, t)| (p.clone(), *t)));

        ChangeSet::new(creates, updates, deletes, last_modified)
    }

    /// Same change set with every path (keys and move targets) rewritten by `f`.
    pub fn map_paths(&self, f: impl Fn(&str) -> String) -> ChangeSet {
        let creates = self
            .items_to_create
            .iter()
            .map(|c| CreateItem {
                path: f(&c.path),
                ..c.clone()
            })
            .collect();
        let updates = self
            .items_to_update
            .iter()
            .map(|(p, delta)| {
                let delta = UpdateDelta {
                    path: delta.path.as_deref().map(&f),
                    ..delta.clone()
                };
                (f(p), delta)
            })
            .collect();
        let deletes = self
            .items_to_delete
            .iter()
            .map(|(p, t)| (f(p), *t))
            .collect();
        let last_modified = self
            .last_modified_updates
            .iter()
            .map(|(p, t)| (f(p), *t))
            .collect();
        ChangeSet::new(creates, updates, deletes, last_modified)
    }
}
