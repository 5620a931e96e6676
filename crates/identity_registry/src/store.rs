//! Persistence for the identity registry
//!
//! Four structures back the registry: the record store, the owner index, the
//! history log and the per-identity sequence counter. Reads are point
//! lookups. Writes only ever arrive as a [`WriteBatch`] that is applied as one
//! unit, so the four structures never drift apart.

use crate::errors::{RegistryError, Result};
use crate::types::*;
use parking_lot::RwLock;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::collections::HashMap;
use std::path::Path;

/// Staged writes produced by a single registry operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    records: Vec<(IdentityHash, IdentityRecord)>,
    owner_removals: Vec<AccountId>,
    owner_inserts: Vec<(AccountId, IdentityHash)>,
    history: Vec<(IdentityHash, u64, HistoryEntry)>,
    sequences: Vec<(IdentityHash, u64)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_record(&mut self, hash: IdentityHash, record: IdentityRecord) -> &mut Self {
        self.records.push((hash, record));
        self
    }

    pub fn put_owner(&mut self, owner: AccountId, hash: IdentityHash) -> &mut Self {
        self.owner_inserts.push((owner, hash));
        self
    }

    pub fn remove_owner(&mut self, owner: AccountId) -> &mut Self {
        self.owner_removals.push(owner);
        self
    }

    /// Append a history entry under `sequence` and advance the counter to it
    pub fn append_history(
        &mut self,
        hash: IdentityHash,
        sequence: u64,
        entry: HistoryEntry,
    ) -> &mut Self {
        self.history.push((hash, sequence, entry));
        self.sequences.push((hash, sequence));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
            && self.owner_removals.is_empty()
            && self.owner_inserts.is_empty()
            && self.history.is_empty()
            && self.sequences.is_empty()
    }
}

/// Storage backend for the identity registry
pub trait IdentityStore {
    fn get_record(&self, hash: &IdentityHash) -> Result<Option<IdentityRecord>>;
    fn get_owned_identity(&self, owner: &AccountId) -> Result<Option<IdentityHash>>;
    fn get_history_entry(&self, hash: &IdentityHash, sequence: u64)
        -> Result<Option<HistoryEntry>>;
    /// Last used sequence number, 0 when nothing has been logged
    fn get_sequence(&self, hash: &IdentityHash) -> Result<u64>;
    /// Apply every staged write, or none of them
    fn commit(&self, batch: WriteBatch) -> Result<()>;
}

impl<T: IdentityStore + ?Sized> IdentityStore for Box<T> {
    fn get_record(&self, hash: &IdentityHash) -> Result<Option<IdentityRecord>> {
        (**self).get_record(hash)
    }

    fn get_owned_identity(&self, owner: &AccountId) -> Result<Option<IdentityHash>> {
        (**self).get_owned_identity(owner)
    }

    fn get_history_entry(
        &self,
        hash: &IdentityHash,
        sequence: u64,
    ) -> Result<Option<HistoryEntry>> {
        (**self).get_history_entry(hash, sequence)
    }

    fn get_sequence(&self, hash: &IdentityHash) -> Result<u64> {
        (**self).get_sequence(hash)
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        (**self).commit(batch)
    }
}

/// Full registry state held by [`MemoryStore`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryState {
    pub records: HashMap<IdentityHash, IdentityRecord>,
    pub owners: HashMap<AccountId, IdentityHash>,
    pub history: HashMap<(IdentityHash, u64), HistoryEntry>,
    pub sequences: HashMap<IdentityHash, u64>,
}

/// In-memory implementation
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<RegistryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the complete state, for comparison in tests and audits
    pub fn snapshot(&self) -> RegistryState {
        self.state.read().clone()
    }
}

impl IdentityStore for MemoryStore {
    fn get_record(&self, hash: &IdentityHash) -> Result<Option<IdentityRecord>> {
        Ok(self.state.read().records.get(hash).cloned())
    }

    fn get_owned_identity(&self, owner: &AccountId) -> Result<Option<IdentityHash>> {
        Ok(self.state.read().owners.get(owner).copied())
    }

    fn get_history_entry(
        &self,
        hash: &IdentityHash,
        sequence: u64,
    ) -> Result<Option<HistoryEntry>> {
        Ok(self.state.read().history.get(&(*hash, sequence)).cloned())
    }

    fn get_sequence(&self, hash: &IdentityHash) -> Result<u64> {
        Ok(self.state.read().sequences.get(hash).copied().unwrap_or(0))
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write();
        for (hash, record) in batch.records {
            state.records.insert(hash, record);
        }
        for owner in batch.owner_removals {
            state.owners.remove(&owner);
        }
        for (owner, hash) in batch.owner_inserts {
            state.owners.insert(owner, hash);
        }
        for (hash, sequence, entry) in batch.history {
            state.history.insert((hash, sequence), entry);
        }
        for (hash, sequence) in batch.sequences {
            state.sequences.insert(hash, sequence);
        }
        Ok(())
    }
}

/// Sled-backed implementation
pub struct SledStore {
    db: Db,
    records: Tree,
    owners: Tree,
    history: Tree,
    sequences: Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let records = db.open_tree("records")?;
        let owners = db.open_tree("owners")?;
        let history = db.open_tree("history")?;
        let sequences = db.open_tree("sequences")?;
        tracing::debug!(records = records.len(), "opened identity store");

        Ok(Self {
            db,
            records,
            owners,
            history,
            sequences,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn history_key(hash: &IdentityHash, sequence: u64) -> [u8; 40] {
        let mut key = [0u8; 40];
        key[..32].copy_from_slice(hash.as_bytes());
        key[32..].copy_from_slice(&sequence.to_be_bytes());
        key
    }
}

impl IdentityStore for SledStore {
    fn get_record(&self, hash: &IdentityHash) -> Result<Option<IdentityRecord>> {
        self.records
            .get(hash.as_bytes())?
            .map(|v| serde_json::from_slice(&v).map_err(RegistryError::from))
            .transpose()
    }

    fn get_owned_identity(&self, owner: &AccountId) -> Result<Option<IdentityHash>> {
        self.owners
            .get(owner.as_bytes())?
            .map(|v| IdentityHash::from_slice(&v))
            .transpose()
    }

    fn get_history_entry(
        &self,
        hash: &IdentityHash,
        sequence: u64,
    ) -> Result<Option<HistoryEntry>> {
        self.history
            .get(Self::history_key(hash, sequence))?
            .map(|v| serde_json::from_slice(&v).map_err(RegistryError::from))
            .transpose()
    }

    fn get_sequence(&self, hash: &IdentityHash) -> Result<u64> {
        match self.sequences.get(hash.as_bytes())? {
            Some(v) => Ok(serde_json::from_slice(&v)?),
            None => Ok(0),
        }
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        // Serialize up front; sled may run the closure more than once.
        let mut record_puts = Vec::with_capacity(batch.records.len());
        for (hash, record) in &batch.records {
            record_puts.push((hash.as_bytes().to_vec(), serde_json::to_vec(record)?));
        }
        let mut history_puts = Vec::with_capacity(batch.history.len());
        for (hash, sequence, entry) in &batch.history {
            history_puts.push((
                Self::history_key(hash, *sequence).to_vec(),
                serde_json::to_vec(entry)?,
            ));
        }
        let mut sequence_puts = Vec::with_capacity(batch.sequences.len());
        for (hash, sequence) in &batch.sequences {
            sequence_puts.push((hash.as_bytes().to_vec(), serde_json::to_vec(sequence)?));
        }

        let result: std::result::Result<(), TransactionError<()>> =
            (&self.records, &self.owners, &self.history, &self.sequences).transaction(
                |(records, owners, history, sequences)| {
                    for (key, value) in &record_puts {
                        records.insert(key.as_slice(), value.as_slice())?;
                    }
                    for owner in &batch.owner_removals {
                        owners.remove(&owner.as_bytes()[..])?;
                    }
                    for (owner, hash) in &batch.owner_inserts {
                        owners.insert(&owner.as_bytes()[..], &hash.as_bytes()[..])?;
                    }
                    for (key, value) in &history_puts {
                        history.insert(key.as_slice(), value.as_slice())?;
                    }
                    for (key, value) in &sequence_puts {
                        sequences.insert(key.as_slice(), value.as_slice())?;
                    }
                    Ok::<(), ConflictableTransactionError<()>>(())
                },
            );

        result.map_err(|e| match e {
            TransactionError::Storage(err) => RegistryError::Database(err),
            TransactionError::Abort(()) => RegistryError::Database(sled::Error::Unsupported(
                "identity store transaction aborted".to_string(),
            )),
        })
    }
}

/// Backend chosen at runtime from configuration
pub enum ConfiguredStore {
    Memory(MemoryStore),
    Sled(SledStore),
}

impl ConfiguredStore {
    /// Flush to disk; no-op for the memory backend
    pub fn flush(&self) -> Result<()> {
        match self {
            ConfiguredStore::Memory(_) => Ok(()),
            ConfiguredStore::Sled(store) => store.flush(),
        }
    }
}

impl IdentityStore for ConfiguredStore {
    fn get_record(&self, hash: &IdentityHash) -> Result<Option<IdentityRecord>> {
        match self {
            ConfiguredStore::Memory(store) => store.get_record(hash),
            ConfiguredStore::Sled(store) => store.get_record(hash),
        }
    }

    fn get_owned_identity(&self, owner: &AccountId) -> Result<Option<IdentityHash>> {
        match self {
            ConfiguredStore::Memory(store) => store.get_owned_identity(owner),
            ConfiguredStore::Sled(store) => store.get_owned_identity(owner),
        }
    }

    fn get_history_entry(
        &self,
        hash: &IdentityHash,
        sequence: u64,
    ) -> Result<Option<HistoryEntry>> {
        match self {
            ConfiguredStore::Memory(store) => store.get_history_entry(hash, sequence),
            ConfiguredStore::Sled(store) => store.get_history_entry(hash, sequence),
        }
    }

    fn get_sequence(&self, hash: &IdentityHash) -> Result<u64> {
        match self {
            ConfiguredStore::Memory(store) => store.get_sequence(hash),
            ConfiguredStore::Sled(store) => store.get_sequence(hash),
        }
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        match self {
            ConfiguredStore::Memory(store) => store.commit(batch),
            ConfiguredStore::Sled(store) => store.commit(batch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(owner: u8, metadata: &str) -> IdentityRecord {
        IdentityRecord {
            owner: AccountId::new([owner; 32]),
            registered_at: 10,
            metadata: metadata.to_string(),
            status: IdentityStatus::Registered,
            verified: false,
        }
    }

    fn entry(by: u8, changes: &str) -> HistoryEntry {
        HistoryEntry {
            updated_by: AccountId::new([by; 32]),
            timestamp: 11,
            changes: changes.to_string(),
            previous_metadata: "m1".to_string(),
        }
    }

    fn exercise_store<S: IdentityStore>(store: &S) {
        let hash = IdentityHash::new([1u8; 32]);
        let owner = AccountId::new([2u8; 32]);
        let next_owner = AccountId::new([3u8; 32]);

        assert!(store.get_record(&hash).unwrap().is_none());
        assert_eq!(store.get_sequence(&hash).unwrap(), 0);

        let mut batch = WriteBatch::new();
        batch.put_record(hash, record(2, "m1")).put_owner(owner, hash);
        store.commit(batch).unwrap();

        assert_eq!(store.get_record(&hash).unwrap(), Some(record(2, "m1")));
        assert_eq!(store.get_owned_identity(&owner).unwrap(), Some(hash));

        let mut batch = WriteBatch::new();
        batch
            .append_history(hash, 1, entry(2, "Ownership transferred"))
            .remove_owner(owner)
            .put_owner(next_owner, hash)
            .put_record(hash, record(3, "m1"));
        store.commit(batch).unwrap();

        assert!(store.get_owned_identity(&owner).unwrap().is_none());
        assert_eq!(store.get_owned_identity(&next_owner).unwrap(), Some(hash));
        assert_eq!(store.get_sequence(&hash).unwrap(), 1);
        assert_eq!(
            store.get_history_entry(&hash, 1).unwrap(),
            Some(entry(2, "Ownership transferred"))
        );
        assert!(store.get_history_entry(&hash, 2).unwrap().is_none());
    }

    #[test]
    fn test_memory_store_commit_and_read() {
        exercise_store(&MemoryStore::new());
    }

    #[test]
    fn test_sled_store_commit_and_read() {
        let dir = TempDir::new().expect("temp dir");
        let store = SledStore::open(dir.path()).expect("sled store");
        exercise_store(&store);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let store = MemoryStore::new();
        let before = store.snapshot();
        store.commit(WriteBatch::new()).unwrap();
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_history_keys_sort_by_sequence() {
        let hash = IdentityHash::new([5u8; 32]);
        assert!(SledStore::history_key(&hash, 2) < SledStore::history_key(&hash, 10));
        assert!(SledStore::history_key(&hash, 255) < SledStore::history_key(&hash, 256));
    }
}
