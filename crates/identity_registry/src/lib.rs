//! Identity Registry
//!
//! Stores a privacy-preserving hash of a person's identity data, binds it to
//! exactly one controlling account, tracks a verification lifecycle and keeps
//! an append-only audit trail of every change.
//!
//! The hosting environment serializes calls and asserts the caller identity
//! and block height for each one through [`CallContext`]. Collaborators that
//! only need to read ownership or verification status go through
//! [`IdentityDirectory`].

pub mod config;
pub mod directory;
pub mod errors;
pub mod registry;
pub mod store;
pub mod types;

pub use config::RegistryConfig;
pub use directory::IdentityDirectory;
pub use errors::*;
pub use registry::IdentityRegistry;
pub use store::{ConfiguredStore, IdentityStore, MemoryStore, RegistryState, SledStore, WriteBatch};
pub use types::*;
