//! Notes backend client
//!
//! The backend owns retrieval, indexing and answer generation. This client
//! only speaks its REST contract:
//!
//! | Method | Path | Fields | Response |
//! |--------|------|--------|----------|
//! | POST | `/upload` | `subject_id`, `files` (multipart) | acknowledged, ignored |
//! | DELETE | `/file` | `subject_id`, `file_name` | acknowledged, ignored |
//! | POST | `/chat` | `subject_id`, `subject_name`, `message`, `conversation_history` | [`ChatReply`] |
//! | POST | `/study` | `subject_id`, `subject_name`, `topic` | [`StudyMaterial`] |
//!
//! ## Usage
//!
//! Point the client at a backend in `~/.config/askmynotes/config.toml`:
//!
//! ```toml
//! [backend]
//! base_url = "http://localhost:8000"
//! ```

mod client;
mod wire;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{FilePayload, StudyMaterial};

pub use client::BackendClient;
pub use wire::{ChatReply, ChatRequest, HistoryEntry, StudyRequest};

/// Operations the store mirrors to, or requests from, the notes backend.
///
/// [`BackendClient`] is the HTTP implementation; tests substitute their own.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Upload one note file into a subject's index.
    async fn upload(&self, subject_id: &str, file: &FilePayload) -> Result<()>;

    /// Drop a file's content from a subject's index.
    async fn delete_file(&self, subject_id: &str, file_name: &str) -> Result<()>;

    /// Ask a question grounded in the subject's notes.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply>;

    /// Generate study material for a topic.
    async fn study(&self, request: &StudyRequest) -> Result<StudyMaterial>;
}
