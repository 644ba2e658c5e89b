//! Gamebook Content: authored books for the workflow engine.
//!
//! A book is a YAML document of numbered sections with Markdown text,
//! choices and on-enter effects. [`library::ContentLibrary`] serves it to the
//! engine as its rules, content and character collaborators, and reports
//! which sections changed when the file is reloaded.

pub mod book;
pub mod error;
pub mod library;
pub mod markdown;
