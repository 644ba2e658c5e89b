//! The loaded book, served to the engine as its content collaborators.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use gamebook_workflow::application::collaborators::{
    CharacterKeeper, ContentSource, RulesSource, SectionText,
};
use gamebook_workflow::application::stages::StageError;
use gamebook_workflow::domain::state::{Character, Decision, Rules, SourceKind};
use serde::Serialize;
use tracing::{debug, info};

use crate::book::Book;
use crate::error::ContentError;

#[derive(Debug)]
struct Loaded {
    book: Arc<Book>,
    hashes: BTreeMap<u32, String>,
}

/// What a reload changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    /// Game of the reloaded book.
    pub game_id: String,
    /// Sections added, removed or edited, ascending.
    pub changed_sections: Vec<u32>,
}

/// Holds the current book and swaps it on reload.
#[derive(Debug)]
pub struct ContentLibrary {
    loaded: RwLock<Loaded>,
    path: Option<PathBuf>,
}

impl ContentLibrary {
    /// A library over an in-memory book. It cannot be reloaded.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Hash` if the sections cannot be hashed.
    pub fn from_book(book: Book) -> Result<Self, ContentError> {
        let hashes = book.section_hashes()?;
        Ok(Self {
            loaded: RwLock::new(Loaded {
                book: Arc::new(book),
                hashes,
            }),
            path: None,
        })
    }

    /// Loads the book at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` if the file cannot be read or is not a valid
    /// book.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ContentError> {
        let path = path.as_ref().to_path_buf();
        let book = read_book(&path)?;
        info!(path = %path.display(), game_id = %book.game_id, sections = book.sections.len(), "book loaded");

        let mut library = Self::from_book(book)?;
        library.path = Some(path);
        Ok(library)
    }

    /// The current book.
    #[must_use]
    pub fn book(&self) -> Arc<Book> {
        Arc::clone(&self.read().book)
    }

    /// Identifier of the current book.
    #[must_use]
    pub fn game_id(&self) -> String {
        self.read().book.game_id.clone()
    }

    /// Re-reads the source file and swaps the book in. Sections are compared
    /// by content hash; only those whose hash changed are reported.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::NoSource` for an in-memory library, or the
    /// loading error; the current book stays in place on error.
    pub fn reload(&self) -> Result<ReloadReport, ContentError> {
        let path = self.path.as_ref().ok_or(ContentError::NoSource)?;
        let book = read_book(path)?;
        let hashes = book.section_hashes()?;

        let mut loaded = self
            .loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let changed_sections: Vec<u32> = if loaded.book.game_id == book.game_id {
            let numbers: BTreeSet<u32> = loaded.hashes.keys().chain(hashes.keys()).copied().collect();
            numbers
                .into_iter()
                .filter(|n| loaded.hashes.get(n) != hashes.get(n))
                .collect()
        } else {
            loaded.hashes.keys().copied().collect()
        };

        let report = ReloadReport {
            game_id: loaded.book.game_id.clone(),
            changed_sections,
        };
        info!(game_id = %report.game_id, changed = report.changed_sections.len(), "book reloaded");

        *loaded = Loaded {
            book: Arc::new(book),
            hashes,
        };
        Ok(report)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Loaded> {
        self.loaded.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn book_for(&self, game_id: &str) -> Option<Arc<Book>> {
        let book = self.book();
        (book.game_id == game_id).then_some(book)
    }
}

fn read_book(path: &Path) -> Result<Book, ContentError> {
    let yaml = std::fs::read_to_string(path).map_err(|source| ContentError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Book::from_yaml_str(&yaml)
}

#[async_trait]
impl RulesSource for ContentLibrary {
    async fn rules_for(
        &self,
        game_id: &str,
        section: u32,
        _content: Option<&str>,
    ) -> Result<Rules, StageError> {
        let book = self
            .book_for(game_id)
            .ok_or_else(|| StageError::Retrieval(format!("unknown game {game_id}")))?;
        let spec = book
            .section(section)
            .ok_or_else(|| StageError::Retrieval(format!("{game_id} has no section {section}")))?;
        Ok(spec.to_rules(section))
    }
}

#[async_trait]
impl ContentSource for ContentLibrary {
    async fn content_for(&self, game_id: &str, section: u32) -> Result<SectionText, StageError> {
        let book = self
            .book_for(game_id)
            .ok_or_else(|| StageError::ContentUnavailable(format!("unknown game {game_id}")))?;
        let content = book
            .section(section)
            .map(crate::book::SectionSpec::plain_text)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                StageError::ContentUnavailable(format!("{game_id} section {section} has no text"))
            })?;

        Ok(SectionText {
            content,
            source_kind: SourceKind::Authored,
        })
    }
}

#[async_trait]
impl CharacterKeeper for ContentLibrary {
    async fn initial_character(&self, game_id: &str) -> Result<Character, StageError> {
        self.book_for(game_id)
            .map(|book| book.character.clone())
            .ok_or_else(|| StageError::Retrieval(format!("unknown game {game_id}")))
    }

    async fn character_update(
        &self,
        game_id: &str,
        character: &Character,
        decision: &Decision,
    ) -> Result<Character, StageError> {
        let Some(target) = decision.next_section else {
            return Ok(character.clone());
        };
        let book = self
            .book_for(game_id)
            .ok_or_else(|| StageError::Retrieval(format!("unknown game {game_id}")))?;
        let spec = book
            .section(target)
            .ok_or_else(|| StageError::Retrieval(format!("{game_id} has no section {target}")))?;

        if spec.on_enter.is_empty() {
            return Ok(character.clone());
        }
        debug!(target, "applying on-enter effects");
        Ok(spec.on_enter.apply(character))
    }
}
