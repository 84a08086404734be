// SPDX-License-Identifier: MIT OR Apache-2.0

//! The append-only command log a vault is derived from.
//!
//! A history is the canonical serialization of all mutations ever applied
//! to a vault. Its textual form is a newline-separated sequence of command
//! lines with no trailing newline required; the byte shape of those lines is
//! part of the on-disk contract.

use std::fmt;
use std::slice;
use std::str::FromStr;

use crate::command::{Command, LexError, Opcode};

/// An ordered sequence of commands.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History(Vec<Command>);

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_commands(commands: Vec<Command>) -> Self {
        Self(commands)
    }

    /// Parse a newline-separated log. Blank lines are skipped.
    pub fn from_text(text: &str) -> Result<Self, LexError> {
        let mut commands = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            commands.push(line.parse()?);
        }
        Ok(Self(commands))
    }

    pub fn to_text(&self) -> String {
        let lines: Vec<String> = self.0.iter().map(Command::to_string).collect();
        lines.join("\n")
    }

    pub fn push(&mut self, command: Command) {
        self.0.push(command);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.0
    }

    pub fn iter(&self) -> slice::Iter<'_, Command> {
        self.0.iter()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Copy of this history with all padding lines removed.
    pub fn without_padding(&self) -> Self {
        Self(self.0.iter().filter(|c| !c.is_padding()).cloned().collect())
    }

    /// Length of the longest common prefix with `other`, compared by full
    /// command equality (padding included).
    pub fn common_prefix_len(&self, other: &History) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// True when the first two non-padding commands are `fmt` then `aid`.
    pub fn has_valid_root(&self) -> bool {
        let mut meaningful = self.0.iter().filter(|c| !c.is_padding());
        matches!(
            (meaningful.next(), meaningful.next()),
            (Some(first), Some(second))
                if first.opcode == Opcode::Fmt && second.opcode == Opcode::Aid
        )
    }

    pub fn contains_destructive(&self) -> bool {
        self.0.iter().any(|c| c.opcode.is_destructive())
    }
}

impl From<Vec<Command>> for History {
    fn from(commands: Vec<Command>) -> Self {
        Self(commands)
    }
}

impl FromIterator<Command> for History {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Command> for History {
    fn extend<I: IntoIterator<Item = Command>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for History {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Command;
    type IntoIter = slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for History {
    type Err = LexError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::from_text(text)
    }
}
