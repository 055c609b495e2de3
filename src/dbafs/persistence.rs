//! Sled-backed record store

use crate::change_set::{ChangeSet, CreateItem};
use crate::dbafs::record::Record;
use crate::dbafs::store::{ApplyOptions, RecordStore};
use crate::error::VfsError;
use crate::item::ExtraMetadata;
use crate::path;
use crate::types::Uuid;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::Transactional;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, instrument};

/// Record store on three sled trees
///
/// `records` maps id -> bincode [`Record`], `paths` maps path -> id and
/// `uuids` maps uuid -> id. Ids are big-endian `u64` keys.
pub struct SledRecordStore {
    db: sled::Db,
    records: sled::Tree,
    paths: sled::Tree,
    uuids: sled::Tree,
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode_id(bytes: &[u8]) -> Result<u64, VfsError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| VfsError::Storage(format!("Invalid record id of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

fn decode_record(bytes: &[u8]) -> Result<Record, VfsError> {
    bincode::deserialize(bytes)
        .map_err(|e| VfsError::Storage(format!("Failed to deserialize record: {}", e)))
}

fn encode_record(record: &Record) -> Result<Vec<u8>, VfsError> {
    bincode::serialize(record)
        .map_err(|e| VfsError::Storage(format!("Failed to serialize record: {}", e)))
}

fn abort<T>(err: VfsError) -> ConflictableTransactionResult<T, VfsError> {
    Err(ConflictableTransactionError::Abort(err))
}

fn in_tx<T>(result: Result<T, VfsError>) -> ConflictableTransactionResult<T, VfsError> {
    result.map_err(ConflictableTransactionError::Abort)
}

/// Id of the row `path` should hang from
fn resolve_parent(
    paths: &TransactionalTree,
    pending: &HashMap<String, u64>,
    item_path: &str,
    root: &str,
) -> ConflictableTransactionResult<Option<u64>, VfsError> {
    let parent = path::parent(item_path).unwrap_or("");
    if parent == root {
        return Ok(None);
    }
    if let Some(id) = pending.get(parent) {
        return Ok(Some(*id));
    }
    match paths.get(parent.as_bytes())? {
        Some(id) => Ok(Some(in_tx(decode_id(&id))?)),
        None => abort(VfsError::Logic(format!(
            "Parent '{}' of '{}' is not tracked",
            parent, item_path
        ))),
    }
}

impl SledRecordStore {
    /// Open (or create) a store in the directory `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VfsError> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            VfsError::Storage(format!(
                "Failed to open sled database at {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        Self::from_db(db)
    }

    /// Open a store that lives only as long as this value.
    pub fn temporary() -> Result<Self, VfsError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, VfsError> {
        Ok(Self {
            records: db.open_tree("records")?,
            paths: db.open_tree("paths")?,
            uuids: db.open_tree("uuids")?,
            db,
        })
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), VfsError> {
        self.db.flush()?;
        Ok(())
    }

    fn record_for_id_bytes(&self, id: &[u8]) -> Result<Option<Record>, VfsError> {
        match self.records.get(id)? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert the rows of one chunk of creates.
    fn apply_chunk(
        records: &TransactionalTree,
        paths: &TransactionalTree,
        uuids: &TransactionalTree,
        chunk: &[CreateItem],
        identities: &[(u64, Uuid)],
        options: &ApplyOptions<'_>,
    ) -> ConflictableTransactionResult<(), VfsError> {
        let mut record_batch = sled::Batch::default();
        let mut path_batch = sled::Batch::default();
        let mut uuid_batch = sled::Batch::default();
        let mut pending: HashMap<String, u64> = HashMap::new();

        for (item, (id, uuid)) in chunk.iter().zip(identities) {
            if pending.contains_key(&item.path) || paths.get(item.path.as_bytes())?.is_some() {
                return abort(VfsError::Logic(format!(
                    "Cannot create '{}': path is already tracked",
                    item.path
                )));
            }
            let pid = resolve_parent(paths, &pending, &item.path, options.root)?;

            let record = Record {
                id: *id,
                pid,
                uuid: *uuid,
                path: item.path.clone(),
                hash: item.hash,
                item_type: item.item_type,
                last_modified: item.last_modified,
                important_part: None,
                meta: Vec::new(),
                tstamp: options.now,
            };

            record_batch.insert(&id_key(*id)[..], in_tx(encode_record(&record))?);
            path_batch.insert(item.path.as_bytes(), &id_key(*id)[..]);
            uuid_batch.insert(&uuid.as_bytes()[..], &id_key(*id)[..]);
            pending.insert(item.path.clone(), *id);
        }

        records.apply_batch(&record_batch)?;
        paths.apply_batch(&path_batch)?;
        uuids.apply_batch(&uuid_batch)?;
        Ok(())
    }
}

impl RecordStore for SledRecordStore {
    fn get_by_id(&self, id: u64) -> Result<Option<Record>, VfsError> {
        self.record_for_id_bytes(&id_key(id))
    }

    fn get_by_uuid(&self, uuid: &Uuid) -> Result<Option<Record>, VfsError> {
        match self.uuids.get(&uuid.as_bytes()[..])? {
            Some(id) => self.record_for_id_bytes(&id),
            None => Ok(None),
        }
    }

    fn get_by_path(&self, path: &str) -> Result<Option<Record>, VfsError> {
        match self.paths.get(path.as_bytes())? {
            Some(id) => self.record_for_id_bytes(&id),
            None => Ok(None),
        }
    }

    fn list_prefix(&self, prefix: &str, deep: bool) -> Result<Vec<Record>, VfsError> {
        let entries = if prefix.is_empty() {
            self.paths.iter()
        } else {
            self.paths.scan_prefix(format!("{}/", prefix).as_bytes())
        };

        let mut rows = Vec::new();
        for entry in entries {
            let (key, id) = entry?;
            let row_path = String::from_utf8_lossy(&key);
            let rest = path::strip_prefix(&row_path, prefix).unwrap_or_default();
            if !deep && rest.contains('/') {
                continue;
            }
            match self.record_for_id_bytes(&id)? {
                Some(record) => rows.push(record),
                None => {
                    return Err(VfsError::Storage(format!(
                        "Path index entry '{}' points to a missing record",
                        row_path
                    )))
                }
            }
        }
        Ok(rows)
    }

    #[instrument(
        skip(self, change_set, options),
        fields(
            creates = change_set.items_to_create().len(),
            deletes = change_set.items_to_delete().len()
        )
    )]
    fn apply(&self, change_set: &ChangeSet, options: &ApplyOptions<'_>) -> Result<(), VfsError> {
        let batch_size = options.batch_size.max(1);
        let creates = change_set.items_to_create();
        let updates: Vec<_> = change_set.items_to_update(true).into_iter().collect();

        // Identity is assigned up front so a retried transaction reuses it
        let mut identities = Vec::with_capacity(creates.len());
        for _ in creates {
            identities.push((self.db.generate_id()?, Uuid::new_v4()));
        }

        let result = (&self.records, &self.paths, &self.uuids).transaction(
            |(records, paths, uuids)| -> ConflictableTransactionResult<(), VfsError> {
                for delete_path in change_set.items_to_delete().keys() {
                    let Some(id) = paths.remove(delete_path.as_bytes())? else {
                        return abort(VfsError::NotFound(format!(
                            "Cannot delete untracked path '{}'",
                            delete_path
                        )));
                    };
                    if let Some(bytes) = records.remove(&*id)? {
                        let record = in_tx(decode_record(&bytes))?;
                        uuids.remove(&record.uuid.as_bytes()[..])?;
                    }
                }

                // Resolve every update against the pre-move index
                let mut resolved = Vec::with_capacity(updates.len());
                for (old_path, delta) in &updates {
                    let Some(id) = paths.get(old_path.as_bytes())? else {
                        return abort(VfsError::NotFound(format!(
                            "Cannot update untracked path '{}'",
                            old_path
                        )));
                    };
                    let Some(bytes) = records.get(&*id)? else {
                        return abort(VfsError::Storage(format!(
                            "Path index entry '{}' points to a missing record",
                            old_path
                        )));
                    };
                    resolved.push((in_tx(decode_record(&bytes))?, delta));
                }

                for (record, delta) in &resolved {
                    if delta.path.is_some() {
                        paths.remove(record.path.as_bytes())?;
                    }
                }
                for (record, delta) in &resolved {
                    if let Some(new_path) = &delta.path {
                        if paths.get(new_path.as_bytes())?.is_some() {
                            return abort(VfsError::Logic(format!(
                                "Cannot move '{}' to '{}': target is already tracked",
                                record.path, new_path
                            )));
                        }
                        paths.insert(new_path.as_bytes(), &id_key(record.id)[..])?;
                    }
                }

                for (chunk, ids) in creates.chunks(batch_size).zip(identities.chunks(batch_size)) {
                    Self::apply_chunk(records, paths, uuids, chunk, ids, options)?;
                }

                // Moved rows re-resolve their parent once every create exists
                let no_pending = HashMap::new();
                for (mut record, delta) in resolved {
                    if let Some(hash) = delta.hash {
                        record.hash = hash;
                    }
                    if let Some(timestamp) = delta.last_modified {
                        record.last_modified = Some(timestamp);
                    }
                    if let Some(new_path) = &delta.path {
                        record.pid = resolve_parent(paths, &no_pending, new_path, options.root)?;
                        record.path = new_path.clone();
                    }
                    record.tstamp = options.now;
                    records.insert(&id_key(record.id)[..], in_tx(encode_record(&record))?)?;
                }
                Ok(())
            },
        );

        match result {
            Ok(()) => {
                debug!(rows = self.records.len(), "Change set applied");
                Ok(())
            }
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    fn set_extra_metadata(
        &self,
        path: &str,
        metadata: &ExtraMetadata,
        now: i64,
    ) -> Result<(), VfsError> {
        let Some(mut record) = self.get_by_path(path)? else {
            return Err(VfsError::NotFound(format!(
                "Cannot set metadata of untracked path '{}'",
                path
            )));
        };
        record.important_part = metadata.important_part;
        record.meta = metadata.localized.to_blob()?;
        record.tstamp = now;
        self.records
            .insert(&id_key(record.id)[..], encode_record(&record)?)?;
        Ok(())
    }
}
