//! Gamebook Core: shared domain abstractions.
//!
//! This crate defines the fundamental traits and types that the workflow
//! engine, the session stores and the transport layer depend on. It contains
//! no infrastructure code.

pub mod clock;
pub mod command;
pub mod error;
pub mod repository;
pub mod rng;
