//! # askmynotes-core
//!
//! Core library for askmynotes - a study assistant that answers questions
//! grounded in your own notes.
//!
//! This library provides:
//! - Domain types for subjects, files, chat messages and study material
//! - The subject store, the single source of truth shared by every frontend
//! - An HTTP client for the notes backend
//! - SQLite persistence, configuration and logging
//!
//! ## Architecture
//!
//! Every user action is applied to the [`SubjectStore`] and persisted first.
//! The backend is then told about it from a spawned task, and the outcome is
//! merged back into the store when the frontend drains settlements:
//! - **Local:** subjects, files and messages (authoritative, persisted)
//! - **Remote:** the backend's copy of uploaded notes (mirrored, never read back)
//! - **Transient:** loading flag and study material (never persisted)
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use askmynotes_core::backend::BackendClient;
//! use askmynotes_core::{Config, Database, SubjectStore};
//!
//! # async fn run() -> askmynotes_core::Result<()> {
//! let config = Config::load()?;
//!
//! let db = Database::open(&Config::database_path())?;
//! db.migrate()?;
//!
//! let backend = Arc::new(BackendClient::new(&config.backend)?);
//! let mut store = SubjectStore::open(db, backend, tokio::runtime::Handle::current());
//!
//! if let Some(id) = store.add_subject("Operating Systems") {
//!     store.send_message(&id, "What is a semaphore?");
//!     store.settle_all().await;
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use store::{SubjectStore, SyncEvent};
pub use types::*;

// Public modules
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod format;
pub mod logging;
pub mod store;
pub mod types;
