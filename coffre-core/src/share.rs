// SPDX-License-Identifier: MIT OR Apache-2.0

//! Demultiplexing share-prefixed lines out of a combined history.
//!
//! Lines of the form `$<uuid> <cmd>` belong to the share identified by the
//! uuid; everything else is the vault's own base history. Extraction strips
//! the prefix; recombination puts it back, so the pair is lossless modulo
//! ordering between buckets.

use std::collections::BTreeMap;

use crate::history::History;

/// A history split into its base and per-share sub-histories.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Shares {
    pub base: History,
    pub shares: BTreeMap<String, History>,
}

impl Shares {
    /// Recompose a combined history: base lines first, then each share's
    /// lines re-prefixed, shares in id order.
    pub fn recombine(&self) -> History {
        let mut out = self.base.clone();
        for (share_id, history) in &self.shares {
            out.extend(
                history
                    .iter()
                    .cloned()
                    .map(|command| command.with_share(share_id.clone())),
            );
        }
        out
    }
}

/// Route every command into its share bucket (prefix stripped) or the base.
pub fn extract_shares(history: &History) -> Shares {
    let mut shares = Shares::default();
    for command in history {
        match &command.share {
            Some(share_id) => {
                let mut stripped = command.clone();
                stripped.share = None;
                shares
                    .shares
                    .entry(share_id.clone())
                    .or_default()
                    .push(stripped);
            }
            None => shares.base.push(command.clone()),
        }
    }
    shares
}
