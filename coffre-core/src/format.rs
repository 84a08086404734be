// SPDX-License-Identifier: MIT OR Apache-2.0

//! The format engine: owns a history and the tree derived from it.
//!
//! The engine is the only writer of both. Mutations enter through
//! [`FormatEngine::execute`] (or the thin typed wrappers around it), which
//! lexes, routes to the executor, appends to the history and finally
//! appends a padding line so command boundaries are obscured in the
//! ciphertext. A command that fails leaves both history and tree untouched.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::command::{Command, LexError, Opcode};
use crate::event::{EventListener, VaultEvent};
use crate::executor::{apply, ExecContext, ReplayError};
use crate::history::History;
use crate::vault::Vault;

/// Format identity token for the textual command-log format.
pub const FORMAT_A: &str = "coffre/a";

/// Tag written by the `fmt` command of newly initialised histories.
pub const FORMAT_TAG: u32 = 1;

/// Engine lifecycle.
///
/// `Empty → Initialised → Mutable ↔ ReadOnly → Sealed`, with `clear()`
/// returning to `Empty` from anywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Empty,
    Initialised,
    Mutable,
    ReadOnly,
    Sealed,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("vault is read-only")]
    ReadOnly,

    #[error("vault is sealed")]
    Sealed,

    #[error("engine is not initialised")]
    NotInitialised,

    #[error("engine is already initialised")]
    AlreadyInitialised,

    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Replay(#[from] ReplayError),
}

/// Owns `(tree, history, state, dirty)` for one vault.
pub struct FormatEngine {
    vault: Vault,
    history: History,
    state: EngineState,
    dirty: bool,
    listeners: Vec<Arc<dyn EventListener>>,
}

impl Default for FormatEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatEngine {
    pub fn new() -> Self {
        Self {
            vault: Vault::new(),
            history: History::new(),
            state: EngineState::Empty,
            dirty: false,
            listeners: Vec::new(),
        }
    }

    /// Start a fresh history: `fmt` then `aid <uuid>`. No padding is
    /// appended, so a freshly initialised history is exactly two lines.
    pub fn initialise(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Empty {
            return Err(EngineError::AlreadyInitialised);
        }
        let commands = vec![
            Command::new(Opcode::Fmt, vec![FORMAT_TAG.to_string()]),
            Command::new(Opcode::Aid, vec![Uuid::new_v4().to_string()]),
        ];
        for command in commands {
            let ctx = ExecContext {
                share_id: None,
                seq: self.history.len() as u64,
            };
            apply(&mut self.vault, ctx, &command)?;
            self.history.push(command);
        }
        self.state = EngineState::Initialised;
        self.dirty = true;
        Ok(())
    }

    /// Rebuild an engine by replaying a history against an empty tree.
    ///
    /// Share-prefixed commands are applied with their share id in context.
    /// Fails on the first semantic violation; nothing partial survives.
    pub fn from_history(history: History) -> Result<Self, EngineError> {
        if !history.has_valid_root() {
            return Err(ReplayError::MalformedHistory.into());
        }
        let mut vault = Vault::new();
        for (seq, command) in history.iter().enumerate() {
            let ctx = ExecContext {
                share_id: command.share.as_deref(),
                seq: seq as u64,
            };
            apply(&mut vault, ctx, command)?;
        }
        debug!(commands = history.len(), "history replayed");
        Ok(Self {
            vault,
            history,
            state: EngineState::Initialised,
            dirty: false,
            listeners: Vec::new(),
        })
    }

    /// Execute a single command line.
    pub fn execute(&mut self, line: &str) -> Result<(), EngineError> {
        self.execute_all(&[line])
    }

    /// Execute a batch of command lines.
    ///
    /// Execution is atomic per command: a failing command is neither
    /// applied nor appended, but commands before it in the batch stay.
    /// Unless the batch ends with a `pad`, one padding line is appended
    /// afterwards, and `CommandsExecuted` fires once for the whole call.
    pub fn execute_all(&mut self, lines: &[&str]) -> Result<(), EngineError> {
        let mut commands = Vec::with_capacity(lines.len());
        for line in lines {
            commands.push(line.parse::<Command>()?);
        }
        self.execute_commands(commands)
    }

    /// Execute already-parsed commands. The typed mutators route here.
    pub fn execute_commands(&mut self, commands: Vec<Command>) -> Result<(), EngineError> {
        match self.state {
            EngineState::Empty => return Err(EngineError::NotInitialised),
            EngineState::ReadOnly => return Err(EngineError::ReadOnly),
            EngineState::Sealed => return Err(EngineError::Sealed),
            EngineState::Initialised | EngineState::Mutable => {}
        }

        let count = commands.len();
        for command in commands {
            let ctx = ExecContext {
                share_id: command.share.as_deref(),
                seq: self.history.len() as u64,
            };
            apply(&mut self.vault, ctx, &command)?;
            self.history.push(command);
        }

        let ends_with_pad = self
            .history
            .commands()
            .last()
            .is_some_and(Command::is_padding);
        if !ends_with_pad {
            self.history.push(Command::pad());
        }

        self.state = EngineState::Mutable;
        self.dirty = true;
        self.emit(&VaultEvent::CommandsExecuted { count });
        Ok(())
    }

    // Typed mutators. Each builds the command through the encoder and
    // delegates to `execute_commands`.

    pub fn create_group(&mut self, parent_id: &str, group_id: &str) -> Result<(), EngineError> {
        self.execute_one(Opcode::Cgr, &[parent_id, group_id])
    }

    pub fn set_group_title(&mut self, group_id: &str, title: &str) -> Result<(), EngineError> {
        self.execute_one(Opcode::Tgr, &[group_id, title])
    }

    pub fn move_group(&mut self, group_id: &str, new_parent_id: &str) -> Result<(), EngineError> {
        self.execute_one(Opcode::Mgr, &[group_id, new_parent_id])
    }

    pub fn delete_group(&mut self, group_id: &str) -> Result<(), EngineError> {
        self.execute_one(Opcode::Dgr, &[group_id])
    }

    pub fn set_group_attribute(
        &mut self,
        group_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        self.execute_one(Opcode::Sga, &[group_id, key, value])
    }

    pub fn delete_group_attribute(&mut self, group_id: &str, key: &str) -> Result<(), EngineError> {
        self.execute_one(Opcode::Dga, &[group_id, key])
    }

    pub fn create_entry(&mut self, group_id: &str, entry_id: &str) -> Result<(), EngineError> {
        self.execute_one(Opcode::Cen, &[group_id, entry_id])
    }

    pub fn move_entry(&mut self, entry_id: &str, group_id: &str) -> Result<(), EngineError> {
        self.execute_one(Opcode::Men, &[entry_id, group_id])
    }

    pub fn delete_entry(&mut self, entry_id: &str) -> Result<(), EngineError> {
        self.execute_one(Opcode::Den, &[entry_id])
    }

    pub fn set_entry_property(
        &mut self,
        entry_id: &str,
        property: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        self.execute_one(Opcode::Sep, &[entry_id, property, value])
    }

    pub fn delete_entry_property(
        &mut self,
        entry_id: &str,
        property: &str,
    ) -> Result<(), EngineError> {
        self.execute_one(Opcode::Dep, &[entry_id, property])
    }

    pub fn set_entry_attribute(
        &mut self,
        entry_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        self.execute_one(Opcode::Sea, &[entry_id, key, value])
    }

    pub fn delete_entry_attribute(&mut self, entry_id: &str, key: &str) -> Result<(), EngineError> {
        self.execute_one(Opcode::Dea, &[entry_id, key])
    }

    pub fn set_vault_attribute(&mut self, key: &str, value: &str) -> Result<(), EngineError> {
        self.execute_one(Opcode::Saa, &[key, value])
    }

    pub fn delete_vault_attribute(&mut self, key: &str) -> Result<(), EngineError> {
        self.execute_one(Opcode::Daa, &[key])
    }

    fn execute_one(&mut self, opcode: Opcode, args: &[&str]) -> Result<(), EngineError> {
        let args = args.iter().map(|a| a.to_string()).collect();
        self.execute_commands(vec![Command::new(opcode, args)])
    }

    /// Compact the history when it qualifies; see [`crate::flatten`].
    pub fn optimise(&mut self) -> Result<bool, EngineError> {
        if !crate::flatten::can_be_flattened(&self.history) {
            return Ok(false);
        }
        let flattened = crate::flatten::flatten(&self.history)?;
        let replayed = Self::from_history(flattened)?;
        debug!(
            before = self.history.len(),
            after = replayed.history.len(),
            "history flattened"
        );
        self.vault = replayed.vault;
        self.history = replayed.history;
        self.dirty = true;
        Ok(true)
    }

    /// Freeze or unfreeze mutations. The flag is authoritative; there is no
    /// bypass.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.state = match (self.state, read_only) {
            (EngineState::Empty, _) => EngineState::Empty,
            (EngineState::Sealed, _) => EngineState::Sealed,
            (_, true) => EngineState::ReadOnly,
            (EngineState::ReadOnly, false) => EngineState::Mutable,
            (other, false) => other,
        };
    }

    pub fn is_read_only(&self) -> bool {
        self.state == EngineState::ReadOnly
    }

    /// Mark the history as serialized; mutators fail until the engine is
    /// cleared or rebuilt by replay.
    pub fn seal(&mut self) {
        if self.state != EngineState::Empty {
            self.state = EngineState::Sealed;
        }
    }

    /// Erase: truncate the history and clear the tree.
    pub fn clear(&mut self) {
        self.vault = Vault::new();
        self.history.clear();
        self.state = EngineState::Empty;
        self.dirty = false;
        self.emit(&VaultEvent::Erased);
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Called by the save path once the serialized form has been written.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Format identity token.
    pub fn format(&self) -> &'static str {
        FORMAT_A
    }

    pub fn subscribe(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub(crate) fn emit(&self, event: &VaultEvent) {
        for listener in &self.listeners {
            listener.handle(event);
        }
    }
}
