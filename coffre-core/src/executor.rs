// SPDX-License-Identifier: MIT OR Apache-2.0

//! One pure function per opcode.
//!
//! Executors validate every precondition before touching the tree, so a
//! failed command leaves the vault exactly as it was. The share a command
//! belongs to is an explicit parameter, which keeps replay a pure function
//! of `(tree, history, share mapping)`.

use thiserror::Error;

use crate::command::{Command, Opcode};
use crate::vault::{Entry, Group, PropertyChange, Vault, ROOT_PARENT_ID};

/// Replay context for a single command.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ExecContext<'a> {
    /// Share the command belongs to, if any.
    pub share_id: Option<&'a str>,

    /// Position of the command within its history; used as the logical
    /// timestamp on property changes.
    pub seq: u64,
}

/// Semantic violation during command execution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("command references unknown id {0:?}")]
    UnknownId(String),

    #[error("id {0:?} already exists in the tree")]
    DuplicateId(String),

    #[error("unknown parent group {0:?}")]
    UnknownParent(String),

    #[error("moving group {0:?} into its own subtree")]
    GroupCycle(String),

    #[error("format tag declared more than once")]
    DuplicateFormat,

    #[error("vault id declared more than once")]
    DuplicateVaultId,

    #[error("malformed format tag {0:?}")]
    BadFormatTag(String),

    #[error("command {0} is missing arguments")]
    MalformedCommand(Opcode),

    #[error("history does not begin with fmt and aid")]
    MalformedHistory,
}

/// Apply one command to the vault.
pub(crate) fn apply(
    vault: &mut Vault,
    ctx: ExecContext<'_>,
    command: &Command,
) -> Result<(), ReplayError> {
    let args = &command.args;
    match command.opcode {
        Opcode::Fmt => set_format(vault, arg(command, args, 0)?),
        Opcode::Aid => set_vault_id(vault, arg(command, args, 0)?),
        Opcode::Cmm | Opcode::Pad => Ok(()),
        Opcode::Cgr => create_group(vault, ctx, arg(command, args, 0)?, arg(command, args, 1)?),
        Opcode::Tgr => set_group_title(vault, arg(command, args, 0)?, arg(command, args, 1)?),
        Opcode::Mgr => move_group(vault, arg(command, args, 0)?, arg(command, args, 1)?),
        Opcode::Dgr => delete_group(vault, arg(command, args, 0)?),
        Opcode::Sga => set_group_attribute(
            vault,
            arg(command, args, 0)?,
            arg(command, args, 1)?,
            arg(command, args, 2)?,
        ),
        Opcode::Dga => delete_group_attribute(vault, arg(command, args, 0)?, arg(command, args, 1)?),
        Opcode::Cen => create_entry(vault, ctx, arg(command, args, 0)?, arg(command, args, 1)?),
        Opcode::Men => move_entry(vault, arg(command, args, 0)?, arg(command, args, 1)?),
        Opcode::Den => delete_entry(vault, arg(command, args, 0)?),
        Opcode::Sep => set_entry_property(
            vault,
            ctx,
            arg(command, args, 0)?,
            arg(command, args, 1)?,
            arg(command, args, 2)?,
        ),
        Opcode::Dep => {
            delete_entry_property(vault, ctx, arg(command, args, 0)?, arg(command, args, 1)?)
        }
        Opcode::Sea => set_entry_attribute(
            vault,
            arg(command, args, 0)?,
            arg(command, args, 1)?,
            arg(command, args, 2)?,
        ),
        Opcode::Dea => delete_entry_attribute(vault, arg(command, args, 0)?, arg(command, args, 1)?),
        Opcode::Saa => set_vault_attribute(vault, arg(command, args, 0)?, arg(command, args, 1)?),
        Opcode::Daa => delete_vault_attribute(vault, arg(command, args, 0)?),
    }
}

fn arg<'a>(command: &Command, args: &'a [String], index: usize) -> Result<&'a str, ReplayError> {
    args.get(index)
        .map(String::as_str)
        .ok_or(ReplayError::MalformedCommand(command.opcode))
}

fn set_format(vault: &mut Vault, tag: &str) -> Result<(), ReplayError> {
    if vault.format.is_some() {
        return Err(ReplayError::DuplicateFormat);
    }
    let parsed = tag
        .parse::<u32>()
        .map_err(|_| ReplayError::BadFormatTag(tag.to_string()))?;
    vault.format = Some(parsed);
    Ok(())
}

fn set_vault_id(vault: &mut Vault, id: &str) -> Result<(), ReplayError> {
    if vault.id.is_some() {
        return Err(ReplayError::DuplicateVaultId);
    }
    vault.id = Some(id.to_string());
    Ok(())
}

fn create_group(
    vault: &mut Vault,
    ctx: ExecContext<'_>,
    parent_id: &str,
    group_id: &str,
) -> Result<(), ReplayError> {
    if vault.group_exists(group_id) {
        return Err(ReplayError::DuplicateId(group_id.to_string()));
    }
    let mut group = Group::new(group_id);
    group.share_id = ctx.share_id.map(str::to_string);
    if parent_id == ROOT_PARENT_ID {
        vault.groups.push(group);
    } else {
        let parent = vault
            .find_group_mut(parent_id)
            .ok_or_else(|| ReplayError::UnknownParent(parent_id.to_string()))?;
        parent.groups.push(group);
    }
    Ok(())
}

fn set_group_title(vault: &mut Vault, group_id: &str, title: &str) -> Result<(), ReplayError> {
    let group = vault
        .find_group_mut(group_id)
        .ok_or_else(|| ReplayError::UnknownId(group_id.to_string()))?;
    group.title = title.to_string();
    Ok(())
}

fn move_group(vault: &mut Vault, group_id: &str, new_parent_id: &str) -> Result<(), ReplayError> {
    if !vault.group_exists(group_id) {
        return Err(ReplayError::UnknownId(group_id.to_string()));
    }
    if new_parent_id != ROOT_PARENT_ID {
        if !vault.group_exists(new_parent_id) {
            return Err(ReplayError::UnknownParent(new_parent_id.to_string()));
        }
        if group_id == new_parent_id || vault.is_group_descendant(group_id, new_parent_id) {
            return Err(ReplayError::GroupCycle(group_id.to_string()));
        }
    }

    // All preconditions hold; detach and attach cannot fail now.
    let group = vault
        .detach_group(group_id)
        .ok_or_else(|| ReplayError::UnknownId(group_id.to_string()))?;
    if new_parent_id == ROOT_PARENT_ID {
        vault.groups.push(group);
    } else {
        match vault.find_group_mut(new_parent_id) {
            Some(parent) => parent.groups.push(group),
            None => return Err(ReplayError::UnknownParent(new_parent_id.to_string())),
        }
    }
    Ok(())
}

fn delete_group(vault: &mut Vault, group_id: &str) -> Result<(), ReplayError> {
    vault
        .detach_group(group_id)
        .map(drop)
        .ok_or_else(|| ReplayError::UnknownId(group_id.to_string()))
}

fn set_group_attribute(
    vault: &mut Vault,
    group_id: &str,
    key: &str,
    value: &str,
) -> Result<(), ReplayError> {
    let group = vault
        .find_group_mut(group_id)
        .ok_or_else(|| ReplayError::UnknownId(group_id.to_string()))?;
    group.attributes.insert(key.to_string(), value.to_string());
    Ok(())
}

fn delete_group_attribute(vault: &mut Vault, group_id: &str, key: &str) -> Result<(), ReplayError> {
    let group = vault
        .find_group_mut(group_id)
        .ok_or_else(|| ReplayError::UnknownId(group_id.to_string()))?;
    group.attributes.remove(key);
    Ok(())
}

fn create_entry(
    vault: &mut Vault,
    ctx: ExecContext<'_>,
    group_id: &str,
    entry_id: &str,
) -> Result<(), ReplayError> {
    if vault.entry_exists(entry_id) {
        return Err(ReplayError::DuplicateId(entry_id.to_string()));
    }
    let share_id = ctx.share_id.map(str::to_string);
    let group = vault
        .find_group_mut(group_id)
        .ok_or_else(|| ReplayError::UnknownParent(group_id.to_string()))?;
    let mut entry = Entry::new(entry_id);
    entry.share_id = share_id;
    group.entries.push(entry);
    Ok(())
}

fn move_entry(vault: &mut Vault, entry_id: &str, group_id: &str) -> Result<(), ReplayError> {
    if !vault.entry_exists(entry_id) {
        return Err(ReplayError::UnknownId(entry_id.to_string()));
    }
    if !vault.group_exists(group_id) {
        return Err(ReplayError::UnknownParent(group_id.to_string()));
    }
    let entry = vault
        .detach_entry(entry_id)
        .ok_or_else(|| ReplayError::UnknownId(entry_id.to_string()))?;
    match vault.find_group_mut(group_id) {
        Some(group) => group.entries.push(entry),
        None => return Err(ReplayError::UnknownParent(group_id.to_string())),
    }
    Ok(())
}

fn delete_entry(vault: &mut Vault, entry_id: &str) -> Result<(), ReplayError> {
    vault
        .detach_entry(entry_id)
        .map(drop)
        .ok_or_else(|| ReplayError::UnknownId(entry_id.to_string()))
}

fn set_entry_property(
    vault: &mut Vault,
    ctx: ExecContext<'_>,
    entry_id: &str,
    property: &str,
    value: &str,
) -> Result<(), ReplayError> {
    let entry = vault
        .find_entry_mut(entry_id)
        .ok_or_else(|| ReplayError::UnknownId(entry_id.to_string()))?;
    let old_value = entry.properties.get(property).cloned();
    entry.history.push(PropertyChange {
        property: property.to_string(),
        old_value,
        new_value: Some(value.to_string()),
        ts: ctx.seq,
    });
    entry
        .properties
        .insert(property.to_string(), value.to_string());
    Ok(())
}

fn delete_entry_property(
    vault: &mut Vault,
    ctx: ExecContext<'_>,
    entry_id: &str,
    property: &str,
) -> Result<(), ReplayError> {
    let entry = vault
        .find_entry_mut(entry_id)
        .ok_or_else(|| ReplayError::UnknownId(entry_id.to_string()))?;
    if let Some(old_value) = entry.properties.remove(property) {
        entry.history.push(PropertyChange {
            property: property.to_string(),
            old_value: Some(old_value),
            new_value: None,
            ts: ctx.seq,
        });
    }
    Ok(())
}

fn set_entry_attribute(
    vault: &mut Vault,
    entry_id: &str,
    key: &str,
    value: &str,
) -> Result<(), ReplayError> {
    let entry = vault
        .find_entry_mut(entry_id)
        .ok_or_else(|| ReplayError::UnknownId(entry_id.to_string()))?;
    entry.attributes.insert(key.to_string(), value.to_string());
    Ok(())
}

fn delete_entry_attribute(vault: &mut Vault, entry_id: &str, key: &str) -> Result<(), ReplayError> {
    let entry = vault
        .find_entry_mut(entry_id)
        .ok_or_else(|| ReplayError::UnknownId(entry_id.to_string()))?;
    entry.attributes.remove(key);
    Ok(())
}

fn set_vault_attribute(vault: &mut Vault, key: &str, value: &str) -> Result<(), ReplayError> {
    vault.attributes.insert(key.to_string(), value.to_string());
    Ok(())
}

fn delete_vault_attribute(vault: &mut Vault, key: &str) -> Result<(), ReplayError> {
    vault.attributes.remove(key);
    Ok(())
}
