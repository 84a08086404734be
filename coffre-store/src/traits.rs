// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors surfaced by datasource backends.
///
/// Backends are opaque to the engine: it only ever distinguishes "not
/// found" and "cancelled" from everything else.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("backend error: {0}")]
    Backend(String),
}

/// Byte-oriented storage capability consumed by the vault source and the
/// attachment subsystem.
///
/// Every network-bound method takes a [`CancellationToken`] and must fail
/// with [`StoreError::Cancelled`] once it is triggered.
#[async_trait]
pub trait DatasourceBackend: Send + Sync {
    async fn get_file_contents(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, StoreError>;

    async fn put_file_contents(
        &self,
        path: &str,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;

    /// Remaining storage in bytes, or `None` when unknown or unlimited.
    async fn get_available_storage(&self) -> Result<Option<u64>, StoreError>;

    async fn get_attachment(
        &self,
        vault_id: &str,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, StoreError>;

    async fn put_attachment(
        &self,
        vault_id: &str,
        attachment_id: &str,
        bytes: &[u8],
        details_json: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;

    async fn remove_attachment(
        &self,
        vault_id: &str,
        attachment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;

    fn supports_attachments(&self) -> bool;

    fn supports_remote_bypass(&self) -> bool {
        false
    }
}
