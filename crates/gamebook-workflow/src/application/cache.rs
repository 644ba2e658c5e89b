//! Per-section memoization of rules and narrative.
//!
//! Entries are keyed by `(game_id, section)` and live until the content source
//! reports the section changed. Failed stage outputs are never cached.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::domain::state::{Narrative, Rules};

#[derive(Debug, Clone, Default)]
struct CachedSection {
    rules: Option<Rules>,
    narrative: Option<Narrative>,
}

/// Shared section cache.
#[derive(Debug, Default)]
pub struct SectionCache {
    entries: RwLock<HashMap<(String, u32), CachedSection>>,
}

impl SectionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached rules for a section.
    #[must_use]
    pub fn rules(&self, game_id: &str, section: u32) -> Option<Rules> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&(game_id.to_owned(), section))
            .and_then(|e| e.rules.clone())
    }

    /// Cached narrative for a section.
    #[must_use]
    pub fn narrative(&self, game_id: &str, section: u32) -> Option<Narrative> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&(game_id.to_owned(), section))
            .and_then(|e| e.narrative.clone())
    }

    /// Remembers `rules` unless they carry an error.
    pub fn remember_rules(&self, game_id: &str, rules: &Rules) {
        if rules.error.is_some() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry((game_id.to_owned(), rules.section_number))
            .or_default()
            .rules = Some(rules.clone());
    }

    /// Remembers `narrative` unless it carries an error.
    pub fn remember_narrative(&self, game_id: &str, narrative: &Narrative) {
        if narrative.error.is_some() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry((game_id.to_owned(), narrative.section_number))
            .or_default()
            .narrative = Some(narrative.clone());
    }

    /// Drops the given sections of a game. Returns how many entries went.
    pub fn invalidate(&self, game_id: &str, sections: &[u32]) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        sections
            .iter()
            .filter(|section| entries.remove(&(game_id.to_owned(), **section)).is_some())
            .count()
    }

    /// Number of cached sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
