//! Keyword matching shared by every `MemoryIndex` backend.
//!
//! A query is split on whitespace into lowercase tokens. An entry matches when
//! its lowercased text contains at least one token as a substring. There is no
//! stemming, punctuation stripping, or scoring.

use std::collections::BTreeSet;

use crate::storage_traits::MemoryEntry;

/// Parsed search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTokens {
    tokens: BTreeSet<String>,
}

impl QueryTokens {
    pub fn parse(query: &str) -> Self {
        Self {
            tokens: query
                .split_whitespace()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    /// An empty query matches nothing.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Match against text that is already lowercase.
    pub fn matches_lowercase(&self, lowered: &str) -> bool {
        self.tokens.iter().any(|t| lowered.contains(t.as_str()))
    }

    pub fn matches_text(&self, text: &str) -> bool {
        !self.is_empty() && self.matches_lowercase(&text.to_lowercase())
    }

    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        self.matches_text(&entry.content.text())
    }

    /// Keep matching entries, preserving their order.
    pub fn filter<'a, I>(&self, entries: I) -> Vec<MemoryEntry>
    where
        I: IntoIterator<Item = &'a MemoryEntry>,
    {
        if self.is_empty() {
            return Vec::new();
        }
        entries
            .into_iter()
            .filter(|e| self.matches(e))
            .cloned()
            .collect()
    }
}
