// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plain-data snapshots of vault contents for UI and host code.
//!
//! Facades flatten the tree into parallel group and entry lists; consumers
//! never touch engine internals. Detection is duck-typed over JSON values
//! since facades cross host boundaries as plain data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::vault::Vault;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VaultFacade {
    /// Always the literal `"vault"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub groups: Vec<GroupFacade>,
    pub entries: Vec<EntryFacade>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupFacade {
    pub id: String,
    pub title: String,
    #[serde(rename = "parentID")]
    pub parent_id: String,
    pub attributes: BTreeMap<String, String>,
    #[serde(rename = "shareID", skip_serializing_if = "Option::is_none")]
    pub share_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryFacade {
    pub id: String,
    #[serde(rename = "parentGroupID")]
    pub parent_group_id: String,
    pub properties: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
    #[serde(rename = "shareID", skip_serializing_if = "Option::is_none")]
    pub share_id: Option<String>,
}

impl From<&Vault> for VaultFacade {
    fn from(vault: &Vault) -> Self {
        let mut groups = Vec::new();
        let mut entries = Vec::new();
        for (group, parent_id) in vault.walk_groups() {
            groups.push(GroupFacade {
                id: group.id.clone(),
                title: group.title.clone(),
                parent_id,
                attributes: group.attributes.clone(),
                share_id: group.share_id.clone(),
            });
            for entry in &group.entries {
                entries.push(EntryFacade {
                    id: entry.id.clone(),
                    parent_group_id: group.id.clone(),
                    properties: entry.properties.clone(),
                    attributes: entry.attributes.clone(),
                    share_id: entry.share_id.clone(),
                });
            }
        }
        Self {
            kind: "vault".to_string(),
            id: vault.id.clone().unwrap_or_default(),
            groups,
            entries,
        }
    }
}

/// A value is a vault facade iff it is an object with `type == "vault"`, a
/// string `id`, and both `groups` and `entries` present. The collection
/// types are deliberately not checked further.
pub fn is_vault_facade(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    object.get("type").and_then(Value::as_str) == Some("vault")
        && object.get("id").is_some_and(Value::is_string)
        && object.contains_key("groups")
        && object.contains_key("entries")
}
