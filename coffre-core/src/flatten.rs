// SPDX-License-Identifier: MIT OR Apache-2.0

//! History flattening.
//!
//! A long or delete-bearing history is replaced by the minimal construction
//! sequence for its final tree: `fmt`, `aid`, vault attributes, then each
//! group in pre-order with its attributes and entries. Per-property change
//! history does not survive flattening; it restarts from the flattened
//! prefix. Vault attributes are re-emitted even though they are not part of
//! the group walk, since state such as the attachment key lives there.

use crate::command::{Command, Opcode};
use crate::format::{EngineError, FormatEngine, FORMAT_TAG};
use crate::history::History;
use crate::vault::{Entry, Group, Vault};

/// Histories at least this long qualify for flattening regardless of
/// content.
pub const FLATTEN_THRESHOLD: usize = 1000;

/// True when `optimise()` would rewrite the history: it is long, or it
/// contains destructive commands whose effects can be folded away.
pub fn can_be_flattened(history: &History) -> bool {
    history.len() >= FLATTEN_THRESHOLD || history.contains_destructive()
}

/// Rewrite `history` into an equivalent minimal construction sequence.
///
/// Equivalence means "produces the same final tree". Share provenance is
/// preserved by re-emitting share-created nodes under their share prefix.
pub fn flatten(history: &History) -> Result<History, EngineError> {
    let engine = FormatEngine::from_history(history.clone())?;
    let vault = engine.vault();

    let mut out: Vec<Command> = Vec::new();

    let format = vault.format.unwrap_or(FORMAT_TAG);
    out.push(Command::new(Opcode::Fmt, vec![format.to_string()]));
    if let Some(id) = &vault.id {
        out.push(Command::new(Opcode::Aid, vec![id.clone()]));
    }
    for (key, value) in &vault.attributes {
        out.push(Command::new(Opcode::Saa, vec![key.clone(), value.clone()]));
    }

    emit_groups(&vault.groups, crate::vault::ROOT_PARENT_ID, &mut out);

    Ok(History::from_commands(out))
}

fn emit_groups(groups: &[Group], parent_id: &str, out: &mut Vec<Command>) {
    for group in groups {
        push(
            out,
            group.share_id.as_deref(),
            Opcode::Cgr,
            vec![parent_id.to_string(), group.id.clone()],
        );
        push(
            out,
            group.share_id.as_deref(),
            Opcode::Tgr,
            vec![group.id.clone(), group.title.clone()],
        );
        for (key, value) in &group.attributes {
            push(
                out,
                group.share_id.as_deref(),
                Opcode::Sga,
                vec![group.id.clone(), key.clone(), value.clone()],
            );
        }
        for entry in &group.entries {
            emit_entry(entry, &group.id, out);
        }
        emit_groups(&group.groups, &group.id, out);
    }
}

fn emit_entry(entry: &Entry, group_id: &str, out: &mut Vec<Command>) {
    push(
        out,
        entry.share_id.as_deref(),
        Opcode::Cen,
        vec![group_id.to_string(), entry.id.clone()],
    );
    for (key, value) in &entry.properties {
        push(
            out,
            entry.share_id.as_deref(),
            Opcode::Sep,
            vec![entry.id.clone(), key.clone(), value.clone()],
        );
    }
    for (key, value) in &entry.attributes {
        push(
            out,
            entry.share_id.as_deref(),
            Opcode::Sea,
            vec![entry.id.clone(), key.clone(), value.clone()],
        );
    }
}

fn push(out: &mut Vec<Command>, share_id: Option<&str>, opcode: Opcode, args: Vec<String>) {
    let command = match share_id {
        Some(share) => Command::shared(share, opcode, args),
        None => Command::new(opcode, args),
    };
    out.push(command);
}

/// Compare the trees produced by two histories, ignoring per-property
/// change history (which flattening intentionally resets).
pub fn trees_equivalent(left: &Vault, right: &Vault) -> bool {
    strip_history(left.clone()) == strip_history(right.clone())
}

fn strip_history(mut vault: Vault) -> Vault {
    fn walk(groups: &mut [Group]) {
        for group in groups {
            for entry in &mut group.entries {
                entry.history.clear();
            }
            walk(&mut group.groups);
        }
    }
    walk(&mut vault.groups);
    vault
}
