//! Core domain types for askmynotes
//!
//! These types are the client-side model of a study workspace. They are
//! persisted as one JSON blob and most of them also travel over the wire to
//! the notes backend, so field names are serialized in camelCase.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Subject** | A user-defined topic bucket owning its own files and chat history |
//! | **UploadedFile** | Metadata for a note file attached to a subject |
//! | **ChatMessage** | One turn of a subject's conversation, append-only |
//! | **Citation** | Backend-supplied pointer into source material, displayed verbatim |
//! | **StudyMaterial** | Generated explanation + quiz bundle for one topic |
//! | **Confidence** | Coarse reliability label the backend attaches to answers |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of subjects that can exist at once.
pub const MAX_SUBJECTS: usize = 3;

/// Icons a new subject can be assigned.
pub const SUBJECT_ICONS: &[&str] = &["🧮", "🗄️", "⚙️", "📘", "🧪", "🧬", "📐", "🌍"];

/// Generate a fresh entity id.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================
// Subjects
// ============================================

/// A topic bucket with its own files and chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Emoji shown next to the name
    pub icon: String,
    /// Files attached to this subject
    #[serde(default)]
    pub files: Vec<UploadedFile>,
    /// Conversation, oldest first
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Subject {
    /// Create an empty subject.
    pub fn new(name: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            icon: icon.into(),
            files: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Whether any notes have been attached.
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }
}

// ============================================
// Files
// ============================================

/// Accepted note formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Txt,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Txt => "txt",
        }
    }

    /// MIME type sent with the upload
    pub fn mime_type(&self) -> &'static str {
        match self {
            FileKind::Pdf => "application/pdf",
            FileKind::Txt => "text/plain",
        }
    }

    /// Classify a file name by extension, case-insensitively.
    ///
    /// Returns `None` for anything that is not `.pdf` or `.txt`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileKind::Pdf),
            "txt" => Some(FileKind::Txt),
            _ => None,
        }
    }
}

/// Metadata for a note file attached to a subject.
///
/// The client copy is authoritative for display; the backend only mirrors it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Unique identifier
    pub id: String,
    /// File name as picked by the user (no directory)
    pub name: String,
    /// Note format
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// Size in bytes
    pub size: u64,
    /// When the file was added locally
    pub uploaded_at: DateTime<Utc>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, kind: FileKind, size: u64) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            kind,
            size,
            uploaded_at: Utc::now(),
        }
    }
}

/// Raw file contents handed to the upload request.
#[derive(Debug, Clone)]
pub struct FilePayload {
    /// File name sent as the multipart file name
    pub name: String,
    /// Note format
    pub kind: FileKind,
    /// File contents
    pub bytes: Vec<u8>,
}

// ============================================
// Chat
// ============================================

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Backend-assigned reliability of an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Label shown on answer badges
    pub fn label(&self) -> &'static str {
        match self {
            Confidence::High => "High Confidence",
            Confidence::Medium => "Medium Confidence",
            Confidence::Low => "Low Confidence",
        }
    }
}

/// Pointer into the source notes backing an answer.
///
/// Passed through from the backend and only ever displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default)]
    pub chunk: String,
    #[serde(default)]
    pub evidence: String,
}

impl Citation {
    /// One-line source label, e.g. `notes.pdf · Page 12 · Chapter 3`
    pub fn source_label(&self) -> String {
        match self.page {
            Some(page) => format!("{} · Page {} · {}", self.file_name, page, self.chunk),
            None => format!("{} · {}", self.file_name, self.chunk),
        }
    }
}

/// One turn of a subject's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    /// Set on synthetic answers produced when the backend could not answer
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub not_found: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A message typed by the user.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role: Role::User,
            content: content.into(),
            confidence: None,
            citations: None,
            not_found: false,
            timestamp: Utc::now(),
        }
    }

    /// An answer returned by the backend.
    pub fn assistant(
        content: impl Into<String>,
        confidence: Option<Confidence>,
        citations: Option<Vec<Citation>>,
    ) -> Self {
        Self {
            id: new_id(),
            role: Role::Assistant,
            content: content.into(),
            confidence,
            citations,
            not_found: false,
            timestamp: Utc::now(),
        }
    }

    /// A synthetic answer standing in for a failed request.
    pub fn not_found(content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role: Role::Assistant,
            content: content.into(),
            confidence: Some(Confidence::Low),
            citations: None,
            not_found: true,
            timestamp: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Citations attached to this message, empty if none
    pub fn citations(&self) -> &[Citation] {
        self.citations.as_deref().unwrap_or(&[])
    }
}

// ============================================
// Study material
// ============================================

/// A multiple-choice question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mcq {
    pub question: String,
    pub options: Vec<String>,
    /// Index into `options` of the correct option
    pub answer: usize,
    #[serde(default)]
    pub explanation: String,
}

impl Mcq {
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.answer
    }
}

/// A short-answer question with its model answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortQuestion {
    pub question: String,
    pub answer: String,
}

/// Generated study bundle for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyMaterial {
    pub topic: String,
    pub explanation: String,
    #[serde(default)]
    pub mcqs: Vec<Mcq>,
    #[serde(default)]
    pub short_questions: Vec<ShortQuestion>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

// ============================================
// Views
// ============================================

/// Which panel is shown for the active subject
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ActiveView {
    #[default]
    Chat,
    Files,
    Study,
}

impl ActiveView {
    /// All views in sidebar order
    pub const ALL: [ActiveView; 3] = [ActiveView::Chat, ActiveView::Files, ActiveView::Study];

    pub fn label(&self) -> &'static str {
        match self {
            ActiveView::Chat => "Chat",
            ActiveView::Files => "Files",
            ActiveView::Study => "Study Mode",
        }
    }
}
