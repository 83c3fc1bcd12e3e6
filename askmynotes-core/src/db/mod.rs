//! Database layer for askmynotes
//!
//! Local durable storage is a single SQLite file holding keyed JSON blobs.
//! The subject collection lives under one key and is rewritten whole on
//! every change.
//!
//! - Schema migrations
//! - Repository for blob reads and writes

pub mod repo;
pub mod schema;

pub use repo::Database;
