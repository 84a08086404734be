// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciling two histories that diverged from a common base.
//!
//! The local history wins ordering: the merged history is the shared prefix,
//! then the local divergent suffix, then the remote suffix with destructive
//! commands stripped. A concurrent delete is conservatively dropped so that
//! concurrent edits on the deleted item are not lost. The result is
//! re-validated by replay; commands that no longer apply are demoted to
//! comments, which keeps them auditable without breaking the log.

use thiserror::Error;
use tracing::warn;

use crate::command::{Command, Opcode};
use crate::executor::{apply, ExecContext};
use crate::history::History;
use crate::vault::Vault;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("histories share no valid common root")]
    NoCommonRoot,
}

/// Strip destructive commands from a divergent suffix.
///
/// Creates, sets and moves are kept; `dgr`, `den`, `dep`, `dea`, `dga` and
/// `daa` are dropped. Dropping `daa` as well protects concurrent writes to
/// vault attributes — most importantly the attachment key.
pub fn prepare_history_for_merge(commands: &[Command]) -> Vec<Command> {
    commands
        .iter()
        .filter(|command| !command.opcode.is_destructive())
        .cloned()
        .collect()
}

/// Merge two histories sharing a common prefix.
///
/// Fails with [`MergeError::NoCommonRoot`] when the shared prefix does not
/// contain at least `fmt` and `aid`. Replay failures in the combined
/// history never fail the merge; the offending commands are demoted to
/// `cmm` lines.
pub fn merge_histories(local: &History, remote: &History) -> Result<History, MergeError> {
    let prefix_len = local.common_prefix_len(remote);
    let prefix = &local.commands()[..prefix_len];

    let mut meaningful = prefix.iter().filter(|c| !c.is_padding());
    let rooted = matches!(
        (meaningful.next(), meaningful.next()),
        (Some(first), Some(second))
            if first.opcode == Opcode::Fmt && second.opcode == Opcode::Aid
    );
    if !rooted {
        return Err(MergeError::NoCommonRoot);
    }

    let local_suffix: Vec<Command> = local.commands()[prefix_len..]
        .iter()
        .filter(|c| !c.is_padding())
        .cloned()
        .collect();
    let remote_suffix: Vec<Command> = prepare_history_for_merge(&remote.commands()[prefix_len..])
        .into_iter()
        .filter(|c| !c.is_padding())
        .collect();

    let mut candidate: Vec<Command> = prefix.to_vec();
    candidate.extend(local_suffix);
    candidate.extend(remote_suffix);

    // Re-validate against an empty tree, demoting commands that no longer
    // apply (e.g. an edit in the remote suffix whose target the local side
    // deleted).
    let mut vault = Vault::new();
    let mut merged: Vec<Command> = Vec::with_capacity(candidate.len());
    for (index, command) in candidate.into_iter().enumerate() {
        let within_prefix = index < prefix_len;
        let ctx = ExecContext {
            share_id: command.share.as_deref(),
            seq: merged.len() as u64,
        };
        match apply(&mut vault, ctx, &command) {
            Ok(()) => merged.push(command),
            Err(err) => {
                warn!(command = %command, %err, "demoting unreplayable command to comment");
                merged.push(Command::comment(command.to_string()));
            }
        }
        // Regenerate padding for the divergent tail only; the prefix keeps
        // its original padding.
        if !within_prefix {
            merged.push(Command::pad());
        }
    }

    Ok(History::from_commands(merged))
}
