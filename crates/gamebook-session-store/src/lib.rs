//! Session state stores for the gamebook workflow engine.
//!
//! Both stores keep one flat, versioned JSON document per session and reject
//! writes whose expected version does not match the stored one.

pub mod in_memory;
pub mod pg_session_repository;
pub mod schema;
