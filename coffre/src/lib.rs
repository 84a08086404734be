// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local-first, end-to-end encrypted credential store engine.
//!
//! This crate ties the engine layers together: the [`VaultSource`] drives
//! the load/save pipeline (envelope → encryption → compression → command
//! log) against a datasource backend, manages lock state through the
//! process-wide credential registry, and hosts the attachment subsystem.
//!
//! The individual layers live in the sibling crates and are re-exported
//! here for convenience:
//!
//! - `coffre-core` — vault tree, command log, replay, merge
//! - `coffre-crypto` — envelope codec, cryptor, compressor
//! - `coffre-store` — datasource backends and credentials
//! - `coffre-search` — keyword and URL search over facades

pub mod attachments;
pub mod source;

pub use attachments::{
    AttachmentDetails, AttachmentError, AttachmentManager, ATTACHMENT_ATTRIBUTE_PREFIX,
    ATTACHMENT_KEY_ATTRIBUTE, ATTACHMENT_KEY_LENGTH, MAX_ATTACHMENT_SIZE,
};
pub use source::{SourceError, SourceStatus, VaultSource};

pub use coffre_core as core;
pub use coffre_crypto as crypto;
pub use coffre_search as search;
pub use coffre_store as store;
