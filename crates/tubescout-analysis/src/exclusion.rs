//! Exclusion-term extraction and matching.
//!
//! An [`ExclusionIndex`] is built once per analysis run from recent
//! competitor titles/descriptions: every known game/content term that appears
//! (word-bounded, case-insensitive) in the source texts becomes an exclusion
//! term. Matching against candidate videos is deliberately a plain
//! case-insensitive substring test (no stemming, no tokenization) so that
//! every exclusion is auditable against the term list.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Outcome of matching one piece of content against the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionMatch {
    pub excluded: bool,
    pub matched_terms: Vec<String>,
}

/// Immutable snapshot of exclusion terms for one analysis run.
///
/// Terms are stored lowercase; `BTreeSet` keeps iteration (and therefore
/// matched-term ordering) deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionIndex {
    terms: BTreeSet<String>,
}

impl ExclusionIndex {
    /// Extract known terms present in `source_texts`.
    ///
    /// A term counts as present when it appears with word boundaries on both
    /// sides, case-insensitively ("DOORS gameplay" yields "doors", but
    /// "indoorsy" does not). Patterns that fail to compile (a term consisting
    /// solely of non-word characters) fall back to substring containment.
    #[must_use]
    pub fn build(source_texts: &[String], known_terms: &[String]) -> Self {
        let haystack = source_texts.join("\n").to_lowercase();
        let mut terms = BTreeSet::new();
        for term in known_terms {
            let term = term.trim().to_lowercase();
            if term.is_empty() {
                continue;
            }
            let found = match Regex::new(&format!(r"\b{}\b", regex::escape(&term))) {
                Ok(pattern) => pattern.is_match(&haystack),
                Err(_) => haystack.contains(&term),
            };
            if found {
                terms.insert(term);
            }
        }
        tracing::debug!(term_count = terms.len(), "built exclusion index");
        Self { terms }
    }

    #[must_use]
    pub fn from_terms<I: IntoIterator<Item = String>>(terms: I) -> Self {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive substring containment against the term set.
    #[must_use]
    pub fn matches(&self, content: &str) -> ExclusionMatch {
        let content = content.to_lowercase();
        let matched_terms: Vec<String> = self
            .terms
            .iter()
            .filter(|term| content.contains(term.as_str()))
            .cloned()
            .collect();
        ExclusionMatch {
            excluded: !matched_terms.is_empty(),
            matched_terms,
        }
    }

    /// Union with another index; terms are never dropped by a merge.
    #[must_use]
    pub fn merged(&self, other: &ExclusionIndex) -> Self {
        Self {
            terms: self.terms.union(&other.terms).cloned().collect(),
        }
    }

    #[must_use]
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// A named, persistent exclusion list with provenance and refresh policy.
///
/// The running pipeline never reads this directly; it takes an immutable
/// [`ExclusionIndex`] snapshot via [`ExclusionList::index`], so a concurrent
/// refresh cannot mutate a set an active run is iterating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionList {
    pub items: BTreeSet<String>,
    pub source_channels: Vec<String>,
    pub auto_update: bool,
    pub update_frequency_days: i64,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl ExclusionList {
    #[must_use]
    pub fn new(source_channels: Vec<String>, auto_update: bool, update_frequency_days: i64) -> Self {
        Self {
            items: BTreeSet::new(),
            source_channels,
            auto_update,
            update_frequency_days,
            last_updated_at: None,
        }
    }

    /// Union-merge freshly extracted terms into the list. Shrinking only ever
    /// happens through [`ExclusionList::reset`].
    pub fn merge(&mut self, index: &ExclusionIndex, now: DateTime<Utc>) {
        self.items.extend(index.terms().map(str::to_string));
        self.last_updated_at = Some(now);
    }

    /// Explicitly discard all terms. The only destructive operation.
    pub fn reset(&mut self) {
        self.items.clear();
        self.last_updated_at = None;
    }

    /// Whether the refresh schedule says this list is due for an update.
    #[must_use]
    pub fn due_for_update(&self, now: DateTime<Utc>) -> bool {
        if !self.auto_update {
            return false;
        }
        match self.last_updated_at {
            None => true,
            Some(last) => now - last >= chrono::Duration::days(self.update_frequency_days),
        }
    }

    /// Immutable snapshot for a pipeline run.
    #[must_use]
    pub fn index(&self) -> ExclusionIndex {
        ExclusionIndex {
            terms: self.items.clone(),
        }
    }
}
