//! Read-only identity lookups for collaborating services
//!
//! Eligibility, claims and distribution components only ever need to ask who
//! controls an identity and whether it is verified. They depend on this trait
//! rather than on the registry itself.

use crate::errors::Result;
use crate::registry::IdentityRegistry;
use crate::store::IdentityStore;
use crate::types::*;

pub trait IdentityDirectory {
    /// Account controlling `hash`, if registered
    fn owner_of(&self, hash: &IdentityHash) -> Result<Option<AccountId>>;

    /// Identity owned by `account`, if any
    fn identity_of(&self, account: &AccountId) -> Result<Option<IdentityHash>>;

    fn is_verified(&self, hash: &IdentityHash) -> Result<bool>;

    fn status_of(&self, hash: &IdentityHash) -> Result<Option<IdentityStatus>>;
}

impl<S: IdentityStore> IdentityDirectory for IdentityRegistry<S> {
    fn owner_of(&self, hash: &IdentityHash) -> Result<Option<AccountId>> {
        Ok(self.get_identity(hash)?.map(|record| record.owner))
    }

    fn identity_of(&self, account: &AccountId) -> Result<Option<IdentityHash>> {
        self.get_identity_by_owner(account)
    }

    fn is_verified(&self, hash: &IdentityHash) -> Result<bool> {
        IdentityRegistry::is_verified(self, hash)
    }

    fn status_of(&self, hash: &IdentityHash) -> Result<Option<IdentityStatus>> {
        Ok(self.get_identity(hash)?.map(|record| record.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    /// Stand-in for an eligibility rule living outside the registry
    fn eligible<D: IdentityDirectory>(directory: &D, account: &AccountId) -> bool {
        match directory.identity_of(account).unwrap() {
            Some(hash) => directory.is_verified(&hash).unwrap(),
            None => false,
        }
    }

    #[test]
    fn test_directory_reflects_registry_state() {
        let admin = AccountId::new([9u8; 32]);
        let user = AccountId::new([1u8; 32]);
        let hash = IdentityHash::new([7u8; 32]);
        let mut registry = IdentityRegistry::new(MemoryStore::new(), admin);

        assert!(registry.owner_of(&hash).unwrap().is_none());
        assert!(!eligible(&registry, &user));

        registry
            .register(&CallContext::new(user, 1), hash.as_bytes(), "meta")
            .unwrap();
        assert_eq!(registry.owner_of(&hash).unwrap(), Some(user));
        assert_eq!(
            registry.status_of(&hash).unwrap(),
            Some(IdentityStatus::Registered)
        );
        assert!(!eligible(&registry, &user));

        registry
            .verify(&CallContext::new(admin, 2), hash.as_bytes())
            .unwrap();
        assert!(eligible(&registry, &user));

        registry
            .suspend(&CallContext::new(admin, 3), hash.as_bytes(), "appeal pending")
            .unwrap();
        assert!(!eligible(&registry, &user));
        assert_eq!(
            registry.status_of(&hash).unwrap(),
            Some(IdentityStatus::Suspended)
        );
    }
}
