// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory tree of groups and entries.
//!
//! The tree is owned data: groups contain their child groups and entries
//! directly. Structural ids (group and entry ids) are unique across the
//! whole vault, which the command executors enforce on creation. Moving a
//! node is detach-then-attach and never changes its id.

use std::collections::BTreeMap;

/// Sentinel parent id marking a group as a root-level group.
pub const ROOT_PARENT_ID: &str = "0";

/// A rooted tree of groups and entries plus vault-level metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Vault {
    /// Vault id, set by an `aid` command. Exactly one per history.
    pub id: Option<String>,

    /// Format tag written by a `fmt` command. Must precede any structural
    /// command.
    pub format: Option<u32>,

    /// Vault-level attributes. Reserved keys include the attachment key
    /// (`bc_attachments_key`).
    pub attributes: BTreeMap<String, String>,

    /// Root-level groups, in creation order.
    pub groups: Vec<Group>,
}

/// A named container for entries and further groups.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub title: String,
    pub attributes: BTreeMap<String, String>,
    pub groups: Vec<Group>,
    pub entries: Vec<Entry>,

    /// Share which introduced this group, if it arrived through a
    /// share-prefixed command.
    pub share_id: Option<String>,
}

/// A single credential record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Entry {
    pub id: String,

    /// User-facing key/value data (`username`, `password`, `url`, ...).
    pub properties: BTreeMap<String, String>,

    /// Engine-controlled metadata. Keys prefixed `BC_ATTACHMENT:` identify
    /// attachments.
    pub attributes: BTreeMap<String, String>,

    /// Append-only per-property change log.
    pub history: Vec<PropertyChange>,

    /// Share which introduced this entry, if any.
    pub share_id: Option<String>,
}

/// One recorded change of an entry property.
///
/// The `old_value` of a change equals the `new_value` of the previous change
/// for the same property, or `None` if there was none. `ts` is a logical
/// timestamp: the position of the generating command within the history,
/// which keeps replay a pure function of the history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyChange {
    pub property: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub ts: u64,
}

impl Group {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

impl Entry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a group anywhere in the tree.
    pub fn find_group(&self, id: &str) -> Option<&Group> {
        find_group_in(&self.groups, id)
    }

    pub fn find_group_mut(&mut self, id: &str) -> Option<&mut Group> {
        find_group_in_mut(&mut self.groups, id)
    }

    /// Find an entry anywhere in the tree.
    pub fn find_entry(&self, id: &str) -> Option<&Entry> {
        find_entry_in(&self.groups, id)
    }

    pub fn find_entry_mut(&mut self, id: &str) -> Option<&mut Entry> {
        find_entry_in_mut(&mut self.groups, id)
    }

    pub fn group_exists(&self, id: &str) -> bool {
        self.find_group(id).is_some()
    }

    pub fn entry_exists(&self, id: &str) -> bool {
        self.find_entry(id).is_some()
    }

    /// Remove a group (with its whole subtree) from wherever it is attached
    /// and return it, or `None` when the id is unknown.
    pub fn detach_group(&mut self, id: &str) -> Option<Group> {
        detach_group_in(&mut self.groups, id)
    }

    /// Remove an entry from its containing group and return it.
    pub fn detach_entry(&mut self, id: &str) -> Option<Entry> {
        detach_entry_in(&mut self.groups, id)
    }

    /// True when the group `candidate` lives inside the subtree rooted at
    /// `ancestor` (the group itself does not count as its own descendant).
    pub fn is_group_descendant(&self, ancestor: &str, candidate: &str) -> bool {
        match self.find_group(ancestor) {
            Some(group) => find_group_in(&group.groups, candidate).is_some(),
            None => false,
        }
    }

    /// Walk all groups depth-first, yielding each group with its parent id.
    pub fn walk_groups(&self) -> Vec<(&Group, String)> {
        let mut out = Vec::new();
        for group in &self.groups {
            walk_groups_in(group, ROOT_PARENT_ID, &mut out);
        }
        out
    }

    /// Id of the group directly containing `entry_id`.
    pub fn parent_of_entry(&self, entry_id: &str) -> Option<&str> {
        for (group, _) in self.walk_groups() {
            if group.entries.iter().any(|e| e.id == entry_id) {
                return Some(&group.id);
            }
        }
        None
    }

    /// Count of entries in the whole tree.
    pub fn entry_count(&self) -> usize {
        self.walk_groups().iter().map(|(g, _)| g.entries.len()).sum()
    }
}

fn find_group_in<'a>(groups: &'a [Group], id: &str) -> Option<&'a Group> {
    for group in groups {
        if group.id == id {
            return Some(group);
        }
        if let Some(found) = find_group_in(&group.groups, id) {
            return Some(found);
        }
    }
    None
}

fn find_group_in_mut<'a>(groups: &'a mut [Group], id: &str) -> Option<&'a mut Group> {
    for group in groups {
        if group.id == id {
            return Some(group);
        }
        if let Some(found) = find_group_in_mut(&mut group.groups, id) {
            return Some(found);
        }
    }
    None
}

fn find_entry_in<'a>(groups: &'a [Group], id: &str) -> Option<&'a Entry> {
    for group in groups {
        if let Some(entry) = group.entries.iter().find(|e| e.id == id) {
            return Some(entry);
        }
        if let Some(found) = find_entry_in(&group.groups, id) {
            return Some(found);
        }
    }
    None
}

fn find_entry_in_mut<'a>(groups: &'a mut [Group], id: &str) -> Option<&'a mut Entry> {
    for group in groups {
        if group.entries.iter().any(|e| e.id == id) {
            return group.entries.iter_mut().find(|e| e.id == id);
        }
        if let Some(found) = find_entry_in_mut(&mut group.groups, id) {
            return Some(found);
        }
    }
    None
}

fn detach_group_in(groups: &mut Vec<Group>, id: &str) -> Option<Group> {
    if let Some(index) = groups.iter().position(|g| g.id == id) {
        return Some(groups.remove(index));
    }
    for group in groups {
        if let Some(detached) = detach_group_in(&mut group.groups, id) {
            return Some(detached);
        }
    }
    None
}

fn detach_entry_in(groups: &mut Vec<Group>, id: &str) -> Option<Entry> {
    for group in groups {
        if let Some(index) = group.entries.iter().position(|e| e.id == id) {
            return Some(group.entries.remove(index));
        }
        if let Some(detached) = detach_entry_in(&mut group.groups, id) {
            return Some(detached);
        }
    }
    None
}

fn walk_groups_in<'a>(group: &'a Group, parent: &str, out: &mut Vec<(&'a Group, String)>) {
    out.push((group, parent.to_string()));
    for child in &group.groups {
        walk_groups_in(child, &group.id, out);
    }
}
