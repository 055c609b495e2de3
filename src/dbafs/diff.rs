//! Change-set computation between a persisted and a live tree

use crate::change_set::{ChangeSet, CreateItem, UpdateDelta};
use crate::path;
use crate::types::{Hash, ItemType};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Hash, type and modification time of one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEntry {
    pub item_type: ItemType,
    pub hash: Hash,
    pub last_modified: Option<i64>,
}

/// Flat tree keyed by path
pub type Tree = BTreeMap<String, TreeEntry>;

/// Sort key placing parents first and directories before files in each directory.
fn creation_key(path: &str, item_type: ItemType) -> Vec<(bool, &str)> {
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len() - 1;
    segments
        .into_iter()
        .enumerate()
        .map(|(i, segment)| (i == last && item_type.is_file(), segment))
        .collect()
}

fn by_depth_then_path(a: &String, b: &String) -> Ordering {
    path::depth(a).cmp(&path::depth(b)).then_with(|| a.cmp(b))
}

/// Pick the move target for `old_path` among same-hash candidates
///
/// Same basename wins, otherwise the lexicographically smallest new path.
fn pick_target<'a>(old_path: &str, candidates: impl Iterator<Item = &'a String>) -> Option<&'a String> {
    let name = path::basename(old_path);
    let mut best: Option<&String> = None;
    for candidate in candidates {
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let candidate_named = path::basename(candidate) == name;
                let current_named = path::basename(current) == name;
                if (candidate_named && !current_named)
                    || (candidate_named == current_named && candidate < current)
                {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }
    best
}

struct Pairing<'a> {
    persisted: &'a Tree,
    live: &'a Tree,
    missing: BTreeSet<String>,
    added: BTreeSet<String>,
    updates: BTreeMap<String, UpdateDelta>,
    last_modified: BTreeMap<String, i64>,
    use_last_modified: bool,
}

impl<'a> Pairing<'a> {
    fn candidates(&self, item_type: ItemType, hash: Hash) -> Vec<&'a String> {
        let live = self.live;
        self.added
            .iter()
            .filter_map(|p| live.get_key_value(p))
            .filter(|(_, e)| e.item_type == item_type && e.hash == hash)
            .map(|(p, _)| p)
            .collect()
    }

    fn record_move(&mut self, old_path: &str, new_path: &str) {
        self.missing.remove(old_path);
        self.added.remove(new_path);
        self.updates
            .insert(old_path.to_string(), UpdateDelta::path(new_path));
        self.track_last_modified(old_path, new_path);
    }

    fn track_last_modified(&mut self, old_path: &str, new_path: &str) {
        if !self.use_last_modified {
            return;
        }
        let (Some(old), Some(new)) = (self.persisted.get(old_path), self.live.get(new_path)) else {
            return;
        };
        if old.item_type.is_file() {
            if let Some(timestamp) = new.last_modified {
                if old.last_modified != Some(timestamp) {
                    self.last_modified.insert(old_path.to_string(), timestamp);
                }
            }
        }
    }

    fn pair(&mut self, item_type: ItemType) {
        let mut order: Vec<String> = self
            .missing
            .iter()
            .filter(|p| self.persisted[*p].item_type == item_type)
            .cloned()
            .collect();
        order.sort_by(by_depth_then_path);

        for old_path in order {
            // Already carried along by a moved ancestor
            if !self.missing.contains(&old_path) {
                continue;
            }
            let hash = self.persisted[&old_path].hash;
            let candidates = self.candidates(item_type, hash);
            let Some(new_path) = pick_target(&old_path, candidates.into_iter()) else {
                continue;
            };
            let new_path = new_path.clone();
            self.record_move(&old_path, &new_path);

            if item_type.is_directory() {
                self.carry_descendants(&old_path, &new_path);
            }
        }
    }

    /// Rewrite the descendants of a moved directory onto its new prefix.
    fn carry_descendants(&mut self, old_dir: &str, new_dir: &str) {
        let descendants: Vec<String> = self
            .missing
            .iter()
            .filter(|p| path::is_within(p, old_dir))
            .cloned()
            .collect();
        for old_path in descendants {
            let rest = path::strip_prefix(&old_path, old_dir).unwrap_or_default();
            let new_path = path::join(new_dir, rest);
            let same_type = self.live.get(&new_path).map(|e| e.item_type)
                == Some(self.persisted[&old_path].item_type);
            if same_type && self.added.contains(&new_path) {
                self.record_move(&old_path, &new_path);
            }
        }
    }
}

/// Diff a persisted tree against a live tree
///
/// Paths on both sides with the same type but another hash become hash
/// updates. A missing and an added path of the same type and hash are paired
/// into a move, directories first (carrying their descendants), then files.
/// Whatever stays unpaired becomes a create or a delete.
pub fn diff(persisted: &Tree, live: &Tree, use_last_modified: bool) -> ChangeSet {
    let mut pairing = Pairing {
        persisted,
        live,
        missing: BTreeSet::new(),
        added: BTreeSet::new(),
        updates: BTreeMap::new(),
        last_modified: BTreeMap::new(),
        use_last_modified,
    };

    for (entry_path, old) in persisted {
        match live.get(entry_path) {
            Some(new) if new.item_type == old.item_type => {
                if new.hash != old.hash {
                    pairing
                        .updates
                        .insert(entry_path.clone(), UpdateDelta::hash(new.hash));
                }
                pairing.track_last_modified(entry_path, entry_path);
            }
            // Missing, or replaced by an entry of the other type
            _ => {
                pairing.missing.insert(entry_path.clone());
            }
        }
    }
    for (entry_path, new) in live {
        match persisted.get(entry_path) {
            Some(old) if old.item_type == new.item_type => {}
            _ => {
                pairing.added.insert(entry_path.clone());
            }
        }
    }

    pairing.pair(ItemType::Directory);
    pairing.pair(ItemType::File);

    let mut creates: Vec<CreateItem> = pairing
        .added
        .iter()
        .map(|p| {
            let entry = &live[p];
            CreateItem {
                hash: entry.hash,
                path: p.clone(),
                item_type: entry.item_type,
                last_modified: if use_last_modified && entry.item_type.is_file() {
                    entry.last_modified
                } else {
                    None
                },
            }
        })
        .collect();
    creates.sort_by(|a, b| {
        creation_key(&a.path, a.item_type).cmp(&creation_key(&b.path, b.item_type))
    });

    let deletes: BTreeMap<String, ItemType> = pairing
        .missing
        .iter()
        .map(|p| (p.clone(), persisted[p].item_type))
        .collect();

    ChangeSet::new(creates, pairing.updates, deletes, pairing.last_modified)
}
