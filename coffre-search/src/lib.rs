// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword and URL-domain search over vault entries.
//!
//! The index is built from facade snapshots so it never touches engine
//! internals. Two access paths are offered: fuzzy term search over title,
//! username and url, and domain-oriented URL search whose ranking learns
//! from use — every confirmed hit increments a per-`(vault, entry, domain)`
//! counter persisted in a host-provided key/value store.

mod ranking;
mod scores;

use coffre_core::{EntryFacade, VaultFacade};
use url::Url;

pub use ranking::{default_ranker, levenshtein, Ranker};
pub use scores::{score_store_key, MemoryScoreStore, ScoreStore};

/// Group attribute marking a subtree as trash; entries below it are not
/// indexed.
pub const TRASH_ROLE_ATTRIBUTE: &str = "bc_group_role";
pub const TRASH_ROLE: &str = "trash";

/// Minimum term-search score for a result to be reported.
const MIN_TERM_SCORE: f64 = 0.3;

#[derive(Clone, Debug)]
struct IndexedEntry {
    vault_id: String,
    entry_id: String,
    title: String,
    username: String,
    url: String,
    host: Option<String>,
}

/// A ranked search hit.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResult {
    pub vault_id: String,
    pub entry_id: String,
    pub title: String,
    pub score: f64,
}

/// Search index over the non-trashed entries of a set of vaults.
pub struct SearchIndex {
    entries: Vec<IndexedEntry>,
    ranker: Box<Ranker>,
    store: Box<dyn ScoreStore>,
}

impl SearchIndex {
    pub fn new(store: Box<dyn ScoreStore>) -> Self {
        Self::with_ranker(store, Box::new(default_ranker))
    }

    /// The term ranker is pluggable; it scores a `(query, candidate)` pair
    /// in `0.0..=1.0`.
    pub fn with_ranker(store: Box<dyn ScoreStore>, ranker: Box<Ranker>) -> Self {
        Self {
            entries: Vec::new(),
            ranker,
            store,
        }
    }

    /// Add one vault's entries to the index, skipping everything below a
    /// trash group.
    pub fn add_vault(&mut self, facade: &VaultFacade) {
        let trashed = trashed_group_ids(facade);
        for entry in &facade.entries {
            if trashed.contains(&entry.parent_group_id) {
                continue;
            }
            self.entries.push(index_entry(&facade.id, entry));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fuzzy term search over title, username and url.
    pub fn search_by_term(&self, term: &str) -> Vec<SearchResult> {
        let term = term.to_lowercase();
        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let score = [&entry.title, &entry.username, &entry.url]
                    .into_iter()
                    .map(|field| (self.ranker)(&term, &field.to_lowercase()))
                    .fold(0.0_f64, f64::max);
                (score >= MIN_TERM_SCORE).then(|| SearchResult {
                    vault_id: entry.vault_id.clone(),
                    entry_id: entry.entry_id.clone(),
                    title: entry.title.clone(),
                    score,
                })
            })
            .collect();
        sort_by_score(&mut results);
        results
    }

    /// URL search: candidates whose host is related to the query host,
    /// ranked by learned domain hits first and URL closeness second.
    pub fn search_by_url(&self, query_url: &str) -> Vec<SearchResult> {
        let Some(query_host) = host_of(query_url) else {
            return Vec::new();
        };

        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .filter(|entry| {
                entry
                    .host
                    .as_deref()
                    .is_some_and(|host| hosts_related(&query_host, host))
            })
            .map(|entry| {
                let host = entry.host.as_deref().unwrap_or_default();
                let hits = self
                    .store
                    .domain_hits(&entry.vault_id, &entry.entry_id, host);
                let distance = levenshtein(query_url, &entry.url);
                SearchResult {
                    vault_id: entry.vault_id.clone(),
                    entry_id: entry.entry_id.clone(),
                    title: entry.title.clone(),
                    score: hits as f64 + 1.0 / (1.0 + distance as f64),
                }
            })
            .collect();
        sort_by_score(&mut results);
        results
    }

    /// Record a confirmed hit: the user opened `entry_id` for `url`. The
    /// only write the index performs.
    pub fn increment_score(&self, vault_id: &str, entry_id: &str, url: &str) {
        let Some(host) = host_of(url) else {
            return;
        };
        self.store.increment(vault_id, entry_id, &host);
    }
}

fn index_entry(vault_id: &str, entry: &EntryFacade) -> IndexedEntry {
    let property = |key: &str| entry.properties.get(key).cloned().unwrap_or_default();
    let url = property("url");
    let host = host_of(&url);
    IndexedEntry {
        vault_id: vault_id.to_string(),
        entry_id: entry.id.clone(),
        title: property("title"),
        username: property("username"),
        url,
        host,
    }
}

/// Ids of groups inside a trash subtree (the trash group included).
fn trashed_group_ids(facade: &VaultFacade) -> Vec<String> {
    let mut trashed: Vec<String> = facade
        .groups
        .iter()
        .filter(|group| {
            group.attributes.get(TRASH_ROLE_ATTRIBUTE).map(String::as_str) == Some(TRASH_ROLE)
        })
        .map(|group| group.id.clone())
        .collect();

    // Propagate down the (flat) parent links until stable.
    loop {
        let before = trashed.len();
        for group in &facade.groups {
            if trashed.contains(&group.parent_id) && !trashed.contains(&group.id) {
                trashed.push(group.id.clone());
            }
        }
        if trashed.len() == before {
            break;
        }
    }
    trashed
}

fn host_of(value: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    // Accept bare hosts as well as full URLs.
    let parsed = Url::parse(value)
        .or_else(|_| Url::parse(&format!("https://{value}")))
        .ok()?;
    parsed.host_str().map(str::to_lowercase)
}

/// Two hosts are related when one is a dot-boundary suffix of the other,
/// e.g. `login.example.com` and `example.com`.
fn hosts_related(left: &str, right: &str) -> bool {
    left == right
        || left.ends_with(&format!(".{right}"))
        || right.ends_with(&format!(".{left}"))
}

fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entry_id.cmp(&b.entry_id))
    });
}
