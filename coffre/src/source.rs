// SPDX-License-Identifier: MIT OR Apache-2.0

//! A vault bound to its datasource.
//!
//! The source owns the format engine and drives the serialization pipeline
//! around it. Loading runs bytes → envelope verification → decryption →
//! decompression → command lines → replay; saving is the exact inverse.
//! While a vault is unlocked its password lives in the process-wide
//! [`CredentialStore`] under this source's credentials id.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use coffre_core::{
    extract_shares, merge_histories, EngineError, EventListener, FormatEngine, History, LexError,
    MergeError, VaultEvent, VaultFacade,
};
use coffre_crypto::{
    app_env, require_format, sign, strip_signature, CodecError, CompressError, CryptoError,
};
use coffre_store::{CredentialStore, Credentials, DatasourceBackend, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceStatus {
    Locked,
    Unlocked,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("vault is locked")]
    Locked,

    #[error("vault has no id yet")]
    MissingVaultId,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Compress(#[from] CompressError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A vault plus the datasource it loads from and saves to.
pub struct VaultSource<B: DatasourceBackend> {
    backend: Arc<B>,
    path: String,
    credentials_id: String,
    engine: FormatEngine,
    status: SourceStatus,
    listeners: Vec<Arc<dyn EventListener>>,
}

impl<B: DatasourceBackend> VaultSource<B> {
    pub fn new(
        backend: Arc<B>,
        path: impl Into<String>,
        credentials_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            path: path.into(),
            credentials_id: credentials_id.into(),
            engine: FormatEngine::new(),
            status: SourceStatus::Locked,
            listeners: Vec::new(),
        }
    }

    /// Create a brand-new vault in memory. The caller saves it afterwards.
    pub fn initialise(&mut self, password: &str) -> Result<(), SourceError> {
        CredentialStore::put(&self.credentials_id, Credentials::new(password));
        self.engine.initialise()?;
        self.status = SourceStatus::Unlocked;
        Ok(())
    }

    /// Register the password and load the vault from the datasource.
    ///
    /// On failure the credentials are dropped again; a wrong password is a
    /// [`CryptoError::AuthFailed`] bubbling out of the decryption step.
    pub async fn unlock(
        &mut self,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        CredentialStore::put(&self.credentials_id, Credentials::new(password));
        match self.load(cancel).await {
            Ok(()) => {
                self.status = SourceStatus::Unlocked;
                Ok(())
            }
            Err(err) => {
                CredentialStore::remove(&self.credentials_id);
                Err(err)
            }
        }
    }

    /// Seal the engine and forget the password.
    pub fn lock(&mut self) {
        self.engine.seal();
        CredentialStore::remove(&self.credentials_id);
        self.status = SourceStatus::Locked;
    }

    /// Truncate the history and clear the tree.
    pub fn erase(&mut self) {
        self.engine.clear();
    }

    /// Re-read the vault file and replace the in-memory state.
    pub async fn load(&mut self, cancel: &CancellationToken) -> Result<(), SourceError> {
        let bytes = self.backend.get_file_contents(&self.path, cancel).await?;
        let history = self.decode(&bytes).await?;
        self.install_engine(FormatEngine::from_history(history)?);
        debug!(path = %self.path, "vault loaded");
        Ok(())
    }

    /// Serialize the current history and write it to the datasource.
    ///
    /// Emits [`VaultEvent::Updated`] after the write resolves.
    pub async fn save(&mut self, cancel: &CancellationToken) -> Result<(), SourceError> {
        let credentials = self.credentials()?;
        let text = self.engine.history().to_text();

        let compressed = app_env().compressor().compress_text(&text).await?;
        let ciphertext = app_env()
            .cryptor()
            .encrypt_buffer(&compressed, &credentials.password)
            .await?;
        let signed = sign(&ciphertext);

        self.backend
            .put_file_contents(&self.path, &signed, cancel)
            .await?;
        self.engine.mark_clean();
        self.emit(&VaultEvent::Updated);
        debug!(path = %self.path, bytes = signed.len(), "vault saved");
        Ok(())
    }

    /// Fetch the remote copy and reconcile it with the local history.
    ///
    /// The local side wins ordering; destructive commands in the remote
    /// divergent suffix are dropped. The caller saves afterwards to push
    /// the merged history back out.
    pub async fn merge_from_remote(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        let bytes = self.backend.get_file_contents(&self.path, cancel).await?;
        let remote = self.decode(&bytes).await?;
        let merged = merge_histories(self.engine.history(), &remote)?;
        debug!(commands = merged.len(), "histories merged");
        self.install_engine(FormatEngine::from_history(merged)?);
        Ok(())
    }

    async fn decode(&self, bytes: &[u8]) -> Result<History, SourceError> {
        require_format(bytes)?;
        let body = strip_signature(bytes)?;
        let credentials = self.credentials()?;

        let compressed = app_env()
            .cryptor()
            .decrypt_buffer(body, &credentials.password)
            .await?;
        let text = app_env().compressor().decompress_text(&compressed).await?;
        Ok(History::from_text(&text)?)
    }

    fn credentials(&self) -> Result<Credentials, SourceError> {
        CredentialStore::get(&self.credentials_id).ok_or(SourceError::Locked)
    }

    fn install_engine(&mut self, mut engine: FormatEngine) {
        for listener in &self.listeners {
            engine.subscribe(listener.clone());
        }
        self.engine = engine;
    }

    /// Observe both engine events and source events (`Updated`).
    pub fn subscribe(&mut self, listener: Arc<dyn EventListener>) {
        self.engine.subscribe(listener.clone());
        self.listeners.push(listener);
    }

    fn emit(&self, event: &VaultEvent) {
        for listener in &self.listeners {
            listener.handle(event);
        }
    }

    pub fn engine(&self) -> &FormatEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut FormatEngine {
        &mut self.engine
    }

    pub fn status(&self) -> SourceStatus {
        self.status
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.engine.set_read_only(read_only);
    }

    pub fn is_read_only(&self) -> bool {
        self.engine.is_read_only()
    }

    /// Snapshot for UI and host code.
    pub fn facade(&self) -> VaultFacade {
        VaultFacade::from(self.engine.vault())
    }

    /// Demultiplex the combined history into base and per-share buckets.
    pub fn shares(&self) -> BTreeMap<String, History> {
        extract_shares(self.engine.history()).shares
    }

    pub(crate) fn vault_id(&self) -> Result<String, SourceError> {
        self.engine
            .vault()
            .id
            .clone()
            .ok_or(SourceError::MissingVaultId)
    }
}
