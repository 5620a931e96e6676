//! Identity registry implementation
//!
//! Binds an identity hash to exactly one controlling account, tracks the
//! verification lifecycle and keeps an append-only history of every change.
//! Each operation first stages its writes from plain reads and only then
//! hands the batch to the store, so a rejected call never touches state.

use crate::errors::{ErrorCategory, RegistryError, Result};
use crate::store::{IdentityStore, WriteBatch};
use crate::types::*;
use tracing::{debug, info, warn};

/// Identity registry
///
/// Mutating operations take `&mut self`: the hosting environment serializes
/// calls, and the borrow checker holds us to it.
#[derive(Debug)]
pub struct IdentityRegistry<S: IdentityStore> {
    store: S,
    admin: AccountId,
    last_height: Option<u64>,
}

impl<S: IdentityStore> IdentityRegistry<S> {
    /// Create a registry over `store` with a fixed admin identity
    pub fn new(store: S, admin: AccountId) -> Self {
        info!("Identity registry initialised with admin {}", admin);
        Self {
            store,
            admin,
            last_height: None,
        }
    }

    pub fn admin(&self) -> AccountId {
        self.admin
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register a new identity hash for the caller
    pub fn register(&mut self, ctx: &CallContext, hash: &[u8], metadata: &str) -> Result<()> {
        let staged = self.stage_register(ctx, hash, metadata);
        self.apply("register", ctx, hash, staged)
    }

    /// Replace the metadata of an owned identity
    pub fn update_metadata(
        &mut self,
        ctx: &CallContext,
        hash: &[u8],
        new_metadata: &str,
        changes: &str,
    ) -> Result<()> {
        let staged = self.stage_update_metadata(ctx, hash, new_metadata, changes);
        self.apply("update_metadata", ctx, hash, staged)
    }

    /// Owner-controlled status override. Leaves `verified` untouched.
    pub fn set_status(
        &mut self,
        ctx: &CallContext,
        hash: &[u8],
        new_status: &str,
        changes: &str,
    ) -> Result<()> {
        let staged = self.stage_set_status(ctx, hash, new_status, changes);
        self.apply("set_status", ctx, hash, staged)
    }

    /// Mark an identity verified (admin only)
    pub fn verify(&mut self, ctx: &CallContext, hash: &[u8]) -> Result<()> {
        let staged = self.stage_verify(ctx, hash);
        self.apply("verify", ctx, hash, staged)
    }

    /// Suspend an identity and clear its verification (admin only)
    pub fn suspend(&mut self, ctx: &CallContext, hash: &[u8], reason: &str) -> Result<()> {
        let staged = self.stage_suspend(ctx, hash, reason);
        self.apply("suspend", ctx, hash, staged)
    }

    /// Hand an owned identity to an account that owns none
    pub fn transfer_ownership(
        &mut self,
        ctx: &CallContext,
        hash: &[u8],
        new_owner: AccountId,
    ) -> Result<()> {
        let staged = self.stage_transfer(ctx, hash, new_owner);
        self.apply("transfer_ownership", ctx, hash, staged)
    }

    pub fn get_identity(&self, hash: &IdentityHash) -> Result<Option<IdentityRecord>> {
        self.store.get_record(hash)
    }

    /// Owner index lookup
    pub fn get_identity_by_owner(&self, owner: &AccountId) -> Result<Option<IdentityHash>> {
        self.store.get_owned_identity(owner)
    }

    pub fn get_history_entry(
        &self,
        hash: &IdentityHash,
        sequence: u64,
    ) -> Result<Option<HistoryEntry>> {
        self.store.get_history_entry(hash, sequence)
    }

    /// Number of logged mutations; registration itself is not counted
    pub fn get_update_count(&self, hash: &IdentityHash) -> Result<u64> {
        self.store.get_sequence(hash)
    }

    /// `false` for unknown identities
    pub fn is_verified(&self, hash: &IdentityHash) -> Result<bool> {
        Ok(self
            .store
            .get_record(hash)?
            .map(|record| record.verified)
            .unwrap_or(false))
    }

    /// Full history in sequence order
    pub fn history(&self, hash: &IdentityHash) -> Result<Vec<HistoryEntry>> {
        let count = self.store.get_sequence(hash)?;
        let mut entries = Vec::with_capacity(count as usize);
        for sequence in 1..=count {
            if let Some(entry) = self.store.get_history_entry(hash, sequence)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn apply(
        &mut self,
        op: &'static str,
        ctx: &CallContext,
        hash: &[u8],
        staged: Result<WriteBatch>,
    ) -> Result<()> {
        self.observe_clock(ctx);
        match staged.and_then(|batch| self.store.commit(batch)) {
            Ok(()) => {
                info!(
                    operation = op,
                    hash = %hex::encode(hash),
                    caller = %ctx.caller,
                    height = ctx.block_height,
                    "identity operation applied"
                );
                Ok(())
            }
            Err(err) => {
                if err.category() == ErrorCategory::Infrastructure {
                    warn!(operation = op, code = err.code(), "identity operation failed: {}", err);
                } else {
                    debug!(
                        operation = op,
                        hash = %hex::encode(hash),
                        caller = %ctx.caller,
                        code = err.code(),
                        "identity operation rejected: {}",
                        err
                    );
                }
                Err(err)
            }
        }
    }

    fn observe_clock(&mut self, ctx: &CallContext) {
        if let Some(last) = self.last_height {
            if ctx.block_height < last {
                warn!(
                    "Logical clock moved backwards: {} after {}",
                    ctx.block_height, last
                );
            }
        }
        self.last_height = Some(ctx.block_height);
    }

    fn load(&self, hash: &IdentityHash) -> Result<IdentityRecord> {
        self.store
            .get_record(hash)?
            .ok_or(RegistryError::IdentityNotFound)
    }

    fn load_owned(&self, ctx: &CallContext, hash: &IdentityHash) -> Result<IdentityRecord> {
        let record = self.load(hash)?;
        if record.owner != ctx.caller {
            return Err(RegistryError::NotOwner);
        }
        Ok(record)
    }

    fn load_as_admin(&self, ctx: &CallContext, hash: &IdentityHash) -> Result<IdentityRecord> {
        let record = self.load(hash)?;
        if ctx.caller != self.admin {
            return Err(RegistryError::Unauthorized);
        }
        Ok(record)
    }

    /// Stage the next history entry for `hash`
    fn stage_history(
        &self,
        batch: &mut WriteBatch,
        ctx: &CallContext,
        hash: IdentityHash,
        changes: &str,
        previous_metadata: &str,
    ) -> Result<()> {
        let sequence = self.store.get_sequence(&hash)? + 1;
        batch.append_history(
            hash,
            sequence,
            HistoryEntry {
                updated_by: ctx.caller,
                timestamp: ctx.block_height,
                changes: changes.to_string(),
                previous_metadata: previous_metadata.to_string(),
            },
        );
        Ok(())
    }

    fn stage_register(
        &self,
        ctx: &CallContext,
        hash: &[u8],
        metadata: &str,
    ) -> Result<WriteBatch> {
        let hash = IdentityHash::from_slice(hash)?;
        validate_metadata(metadata)?;

        if self.store.get_record(&hash)?.is_some()
            || self.store.get_owned_identity(&ctx.caller)?.is_some()
        {
            return Err(RegistryError::AlreadyRegistered);
        }

        let record = IdentityRecord {
            owner: ctx.caller,
            registered_at: ctx.block_height,
            metadata: metadata.to_string(),
            status: IdentityStatus::Registered,
            verified: false,
        };

        let mut batch = WriteBatch::new();
        batch.put_record(hash, record).put_owner(ctx.caller, hash);
        Ok(batch)
    }

    fn stage_update_metadata(
        &self,
        ctx: &CallContext,
        hash: &[u8],
        new_metadata: &str,
        changes: &str,
    ) -> Result<WriteBatch> {
        let hash = IdentityHash::from_slice(hash)?;
        let mut record = self.load_owned(ctx, &hash)?;
        validate_metadata(new_metadata)?;
        validate_changes(changes)?;

        let mut batch = WriteBatch::new();
        self.stage_history(&mut batch, ctx, hash, changes, &record.metadata)?;
        record.metadata = new_metadata.to_string();
        batch.put_record(hash, record);
        Ok(batch)
    }

    fn stage_set_status(
        &self,
        ctx: &CallContext,
        hash: &[u8],
        new_status: &str,
        changes: &str,
    ) -> Result<WriteBatch> {
        let hash = IdentityHash::from_slice(hash)?;
        let mut record = self.load_owned(ctx, &hash)?;
        let status = IdentityStatus::parse(new_status)?;
        validate_changes(changes)?;

        let mut batch = WriteBatch::new();
        self.stage_history(&mut batch, ctx, hash, changes, &record.metadata)?;
        record.status = status;
        batch.put_record(hash, record);
        Ok(batch)
    }

    fn stage_verify(&self, ctx: &CallContext, hash: &[u8]) -> Result<WriteBatch> {
        let hash = IdentityHash::from_slice(hash)?;
        let mut record = self.load_as_admin(ctx, &hash)?;
        if record.verified {
            return Err(RegistryError::AlreadyVerified);
        }

        let mut batch = WriteBatch::new();
        self.stage_history(&mut batch, ctx, hash, VERIFIED_DESCRIPTION, &record.metadata)?;
        record.verified = true;
        record.status = IdentityStatus::Verified;
        batch.put_record(hash, record);
        Ok(batch)
    }

    fn stage_suspend(&self, ctx: &CallContext, hash: &[u8], reason: &str) -> Result<WriteBatch> {
        let hash = IdentityHash::from_slice(hash)?;
        let mut record = self.load_as_admin(ctx, &hash)?;
        validate_changes(reason)?;

        let mut batch = WriteBatch::new();
        self.stage_history(&mut batch, ctx, hash, reason, &record.metadata)?;
        record.status = IdentityStatus::Suspended;
        record.verified = false;
        batch.put_record(hash, record);
        Ok(batch)
    }

    fn stage_transfer(
        &self,
        ctx: &CallContext,
        hash: &[u8],
        new_owner: AccountId,
    ) -> Result<WriteBatch> {
        let hash = IdentityHash::from_slice(hash)?;
        let mut record = self.load_owned(ctx, &hash)?;
        if self.store.get_owned_identity(&new_owner)?.is_some() {
            return Err(RegistryError::AlreadyRegistered);
        }

        let mut batch = WriteBatch::new();
        self.stage_history(&mut batch, ctx, hash, TRANSFER_DESCRIPTION, &record.metadata)?;
        batch.remove_owner(record.owner).put_owner(new_owner, hash);
        record.owner = new_owner;
        batch.put_record(hash, record);
        Ok(batch)
    }
}
