// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage seams consumed by the vault engine.
//!
//! The engine is byte-oriented towards its storage: it reads and writes
//! whole vault files and attachment blobs through the [`DatasourceBackend`]
//! trait and never interprets paths. Remote backends (WebDAV, cloud APIs)
//! live with the embedder; this crate ships the trait, an in-memory backend
//! for tests and embedding, and the process-wide credential registry used
//! while vaults are unlocked.

pub mod credentials;
pub mod memory;
pub mod traits;

pub use credentials::{CredentialStore, Credentials};
pub use memory::MemoryBackend;
pub use traits::{DatasourceBackend, StoreError};
