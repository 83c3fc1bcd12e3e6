//! Subject store
//!
//! The single source of truth for the client: subjects with their files and
//! chat history, the active subject and view, the loading flag, and the
//! transient study-material result.
//!
//! ## Update model
//!
//! Every mutation is two-phase:
//!
//! 1. The local change is applied and persisted immediately.
//! 2. If the backend has to hear about it, a request is spawned on the tokio
//!    runtime. Its outcome comes back as a settlement on a channel and is
//!    merged into the store by [`SubjectStore::drain_settled`] or
//!    [`SubjectStore::settle_next`], on whichever thread owns the store.
//!
//! Settlements apply in arrival order, not request order. Each applied
//! settlement is also published as a [`SyncEvent`] to subscribers.
//!
//! Mirroring requests (upload, delete) never roll local state back. A failed
//! chat still produces an assistant message (flagged not-found); a failed
//! study request only clears the loading flag.
//!
//! ## Cancellation
//!
//! Each subject owns a [`CancellationToken`]. Removing the subject cancels
//! it, which aborts its in-flight requests and guarantees their responses
//! are discarded.

mod events;

pub use events::{DropReason, Operation, SyncEvent};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, ChatReply, ChatRequest, HistoryEntry, StudyRequest};
use crate::db::Database;
use crate::error::Result;
use crate::types::{
    ActiveView, ChatMessage, FilePayload, StudyMaterial, Subject, UploadedFile, MAX_SUBJECTS,
    SUBJECT_ICONS,
};

/// Blob key the subject collection is persisted under
pub const SUBJECTS_KEY: &str = "askmynotes.subjects";

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 64;

/// Icon used if the palette is somehow empty
const FALLBACK_ICON: &str = "📘";

/// A finished backend request waiting to be merged into the store
enum Settlement {
    Mirrored {
        subject_id: String,
        operation: Operation,
        file_name: String,
        result: Result<()>,
    },
    Answered {
        subject_id: String,
        result: Result<ChatReply>,
    },
    Generated {
        subject_id: String,
        ticket: u64,
        result: Result<StudyMaterial>,
    },
    Cancelled {
        subject_id: String,
        operation: Operation,
    },
}

/// Load the persisted subject collection.
///
/// A missing blob, an unreadable one, or one that no longer parses all yield
/// an empty collection.
pub fn load_subjects(db: &Database) -> Vec<Subject> {
    let raw = match db.get_blob(SUBJECTS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read stored subjects, starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<Subject>>(&raw) {
        Ok(mut subjects) => {
            if subjects.len() > MAX_SUBJECTS {
                tracing::warn!(
                    stored = subjects.len(),
                    max = MAX_SUBJECTS,
                    "Stored subjects exceed the limit, keeping the first ones"
                );
                subjects.truncate(MAX_SUBJECTS);
            }
            subjects
        }
        Err(e) => {
            tracing::warn!(error = %e, "Stored subjects do not parse, starting empty");
            Vec::new()
        }
    }
}

/// Persist the whole subject collection as one blob.
pub fn save_subjects(db: &Database, subjects: &[Subject]) -> Result<()> {
    let raw = serde_json::to_string(subjects)?;
    db.put_blob(SUBJECTS_KEY, &raw)
}

/// Client state container, constructed once at startup and handed to views.
pub struct SubjectStore {
    db: Database,
    backend: Arc<dyn Backend>,
    runtime: Handle,
    subjects: Vec<Subject>,
    active_subject_id: Option<String>,
    active_view: ActiveView,
    is_loading: bool,
    study_material: Option<StudyMaterial>,
    /// Bumped by every study request and every selection change; a study
    /// response only lands if its ticket is still current.
    study_ticket: u64,
    tokens: HashMap<String, CancellationToken>,
    pending: usize,
    settle_tx: mpsc::UnboundedSender<Settlement>,
    settle_rx: mpsc::UnboundedReceiver<Settlement>,
    events: broadcast::Sender<SyncEvent>,
}

impl SubjectStore {
    /// Rehydrate the store from `db` and wire it to `backend`.
    ///
    /// Requests are spawned on `runtime`. The first stored subject, if any,
    /// becomes active.
    pub fn open(db: Database, backend: Arc<dyn Backend>, runtime: Handle) -> Self {
        let subjects = load_subjects(&db);
        let tokens = subjects
            .iter()
            .map(|s| (s.id.clone(), CancellationToken::new()))
            .collect();
        let active_subject_id = subjects.first().map(|s| s.id.clone());
        let (settle_tx, settle_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        tracing::info!(subjects = subjects.len(), "Subject store opened");

        Self {
            db,
            backend,
            runtime,
            subjects,
            active_subject_id,
            active_view: ActiveView::default(),
            is_loading: false,
            study_material: None,
            study_ticket: 0,
            tokens,
            pending: 0,
            settle_tx,
            settle_rx,
            events,
        }
    }

    // ============================================
    // Reads
    // ============================================

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    /// Find a subject by name, ignoring case
    pub fn subject_by_name(&self, name: &str) -> Option<&Subject> {
        let name = name.trim();
        self.subjects
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn active_subject_id(&self) -> Option<&str> {
        self.active_subject_id.as_deref()
    }

    pub fn active_subject(&self) -> Option<&Subject> {
        self.active_subject_id
            .as_deref()
            .and_then(|id| self.subject(id))
    }

    pub fn active_view(&self) -> ActiveView {
        self.active_view
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn study_material(&self) -> Option<&StudyMaterial> {
        self.study_material.as_ref()
    }

    /// Whether another subject can be added
    pub fn is_full(&self) -> bool {
        self.subjects.len() >= MAX_SUBJECTS
    }

    /// Spawned requests whose settlement has not been applied yet
    pub fn pending_requests(&self) -> usize {
        self.pending
    }

    /// Subscribe to reconciliation outcomes
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    // ============================================
    // Subjects and selection
    // ============================================

    /// Create a subject and make it active.
    ///
    /// Returns the new id, or `None` if the name is blank or the store
    /// already holds [`MAX_SUBJECTS`] subjects.
    pub fn add_subject(&mut self, name: &str) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        if self.is_full() {
            tracing::debug!(name, "Subject limit reached, ignoring add");
            return None;
        }

        let icon = SUBJECT_ICONS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(FALLBACK_ICON);
        let subject = Subject::new(name, icon);
        let id = subject.id.clone();

        self.tokens.insert(id.clone(), CancellationToken::new());
        self.subjects.push(subject);
        self.active_subject_id = Some(id.clone());
        self.clear_study_material();
        self.persist();

        tracing::info!(subject_id = %id, name, "Subject added");
        Some(id)
    }

    /// Delete a subject and cancel its in-flight requests.
    ///
    /// If it was active, the first remaining subject (or none) becomes active.
    pub fn remove_subject(&mut self, id: &str) -> bool {
        let Some(index) = self.subjects.iter().position(|s| s.id == id) else {
            return false;
        };

        let removed = self.subjects.remove(index);
        if let Some(token) = self.tokens.remove(&removed.id) {
            token.cancel();
        }

        if self.active_subject_id.as_deref() == Some(id) {
            self.active_subject_id = self.subjects.first().map(|s| s.id.clone());
            self.clear_study_material();
        }
        self.persist();

        tracing::info!(subject_id = %id, name = %removed.name, "Subject removed");
        true
    }

    /// Rename a subject. Blank names are ignored.
    pub fn rename_subject(&mut self, id: &str, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let Some(subject) = self.subject_mut(id) else {
            return false;
        };

        subject.name = name.to_string();
        self.persist();
        true
    }

    /// Switch the active subject, clearing any study material.
    pub fn set_active_subject(&mut self, id: &str) -> bool {
        if self.subject(id).is_none() {
            return false;
        }
        self.active_subject_id = Some(id.to_string());
        self.clear_study_material();
        true
    }

    /// Switch the active view, clearing any study material.
    pub fn set_active_view(&mut self, view: ActiveView) {
        self.active_view = view;
        self.clear_study_material();
    }

    // ============================================
    // Files
    // ============================================

    /// Attach a file to a subject, then upload `payload` if one is given.
    pub fn add_file(
        &mut self,
        subject_id: &str,
        file: UploadedFile,
        payload: Option<FilePayload>,
    ) -> bool {
        let Some(subject) = self.subject_mut(subject_id) else {
            return false;
        };

        tracing::info!(subject_id, file = %file.name, size = file.size, "File added");
        subject.files.push(file);
        self.persist();

        if let Some(payload) = payload {
            let backend = Arc::clone(&self.backend);
            let owner = subject_id.to_string();
            let file_name = payload.name.clone();
            self.spawn_request(
                subject_id,
                Operation::Upload,
                async move { backend.upload(&owner, &payload).await },
                move |subject_id, result| Settlement::Mirrored {
                    subject_id,
                    operation: Operation::Upload,
                    file_name,
                    result,
                },
            );
        }
        true
    }

    /// Detach a file from a subject, then ask the backend to forget it.
    pub fn remove_file(&mut self, subject_id: &str, file_id: &str) -> bool {
        let Some(subject) = self.subject_mut(subject_id) else {
            return false;
        };
        let Some(index) = subject.files.iter().position(|f| f.id == file_id) else {
            return false;
        };

        let file = subject.files.remove(index);
        self.persist();
        tracing::info!(subject_id, file = %file.name, "File removed");

        let backend = Arc::clone(&self.backend);
        let owner = subject_id.to_string();
        let file_name = file.name.clone();
        self.spawn_request(
            subject_id,
            Operation::Delete,
            async move { backend.delete_file(&owner, &file.name).await },
            move |subject_id, result| Settlement::Mirrored {
                subject_id,
                operation: Operation::Delete,
                file_name,
                result,
            },
        );
        true
    }

    // ============================================
    // Chat and study
    // ============================================

    /// Append a user message and ask the backend for an answer.
    ///
    /// Blank text is ignored. Exactly one assistant message follows once the
    /// request settles, whatever the outcome, unless the subject is removed
    /// first.
    pub fn send_message(&mut self, subject_id: &str, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let Some(subject) = self.subject_mut(subject_id) else {
            return false;
        };

        let history = subject.messages.iter().map(HistoryEntry::from).collect();
        subject.messages.push(ChatMessage::user(text));
        let request = ChatRequest {
            subject_id: subject.id.clone(),
            subject_name: subject.name.clone(),
            message: text.to_string(),
            history,
        };

        self.is_loading = true;
        self.persist();

        let backend = Arc::clone(&self.backend);
        self.spawn_request(
            subject_id,
            Operation::Chat,
            async move { backend.chat(&request).await },
            |subject_id, result| Settlement::Answered { subject_id, result },
        );
        true
    }

    /// Request study material for `topic`.
    ///
    /// The result replaces the current study material unless a newer request
    /// or a selection change happens first.
    pub fn generate_study_material(&mut self, subject_id: &str, topic: &str) -> bool {
        let topic = topic.trim();
        if topic.is_empty() {
            return false;
        }
        let Some(subject) = self.subject(subject_id) else {
            return false;
        };

        let request = StudyRequest {
            subject_id: subject.id.clone(),
            subject_name: subject.name.clone(),
            topic: topic.to_string(),
        };

        self.is_loading = true;
        self.study_ticket += 1;
        let ticket = self.study_ticket;

        let backend = Arc::clone(&self.backend);
        self.spawn_request(
            subject_id,
            Operation::Study,
            async move { backend.study(&request).await },
            move |subject_id, result| Settlement::Generated {
                subject_id,
                ticket,
                result,
            },
        );
        true
    }

    // ============================================
    // Settlement
    // ============================================

    /// Apply every settlement that has already arrived, without waiting.
    ///
    /// Returns how many were applied.
    pub fn drain_settled(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(settlement) = self.settle_rx.try_recv() {
            self.apply(settlement);
            applied += 1;
        }
        applied
    }

    /// Wait for the next settlement and apply it.
    ///
    /// Returns `false` immediately if nothing is in flight.
    pub async fn settle_next(&mut self) -> bool {
        if self.pending == 0 {
            return false;
        }
        match self.settle_rx.recv().await {
            Some(settlement) => {
                self.apply(settlement);
                true
            }
            None => false,
        }
    }

    /// Wait until every in-flight request has settled.
    pub async fn settle_all(&mut self) {
        while self.settle_next().await {}
    }

    fn apply(&mut self, settlement: Settlement) {
        self.pending = self.pending.saturating_sub(1);

        let event = match settlement {
            Settlement::Mirrored {
                subject_id,
                operation,
                file_name,
                result,
            } => self.apply_mirrored(subject_id, operation, file_name, result),
            Settlement::Answered { subject_id, result } => self.apply_answer(subject_id, result),
            Settlement::Generated {
                subject_id,
                ticket,
                result,
            } => self.apply_study(subject_id, ticket, result),
            Settlement::Cancelled {
                subject_id,
                operation,
            } => {
                if operation.sets_loading() {
                    self.is_loading = false;
                }
                tracing::debug!(subject_id = %subject_id, %operation, "Request cancelled");
                SyncEvent::Dropped {
                    subject_id,
                    operation,
                    reason: DropReason::SubjectRemoved,
                }
            }
        };

        let _ = self.events.send(event);
    }

    fn apply_mirrored(
        &mut self,
        subject_id: String,
        operation: Operation,
        file_name: String,
        result: Result<()>,
    ) -> SyncEvent {
        if self.subject(&subject_id).is_none() {
            return SyncEvent::Dropped {
                subject_id,
                operation,
                reason: DropReason::SubjectRemoved,
            };
        }

        match result {
            Ok(()) => SyncEvent::Settled {
                subject_id,
                operation,
            },
            Err(e) => {
                tracing::warn!(
                    subject_id = %subject_id,
                    %operation,
                    file = %file_name,
                    error = %e,
                    "Backend mirror failed, keeping local state"
                );
                SyncEvent::Failed {
                    subject_id,
                    operation,
                    target: Some(file_name),
                    transient: e.is_transient(),
                    error: e.to_string(),
                }
            }
        }
    }

    fn apply_answer(&mut self, subject_id: String, result: Result<ChatReply>) -> SyncEvent {
        self.is_loading = false;

        let Some(subject) = self.subject_mut(&subject_id) else {
            return SyncEvent::Dropped {
                subject_id,
                operation: Operation::Chat,
                reason: DropReason::SubjectRemoved,
            };
        };

        let (message, event) = match result {
            Ok(reply) => (
                reply.into_message(),
                SyncEvent::Settled {
                    subject_id,
                    operation: Operation::Chat,
                },
            ),
            Err(e) => {
                tracing::warn!(subject_id = %subject_id, error = %e, "Chat request failed");
                let content = format!("Not found in your notes for {} ({})", subject.name, e);
                (
                    ChatMessage::not_found(content),
                    SyncEvent::Failed {
                        subject_id,
                        operation: Operation::Chat,
                        target: None,
                        transient: e.is_transient(),
                        error: e.to_string(),
                    },
                )
            }
        };

        subject.messages.push(message);
        self.persist();
        event
    }

    fn apply_study(
        &mut self,
        subject_id: String,
        ticket: u64,
        result: Result<StudyMaterial>,
    ) -> SyncEvent {
        self.is_loading = false;

        if self.subject(&subject_id).is_none() {
            return SyncEvent::Dropped {
                subject_id,
                operation: Operation::Study,
                reason: DropReason::SubjectRemoved,
            };
        }

        match result {
            Ok(material) if ticket == self.study_ticket => {
                tracing::debug!(subject_id = %subject_id, topic = %material.topic, "Study material ready");
                self.study_material = Some(material);
                SyncEvent::Settled {
                    subject_id,
                    operation: Operation::Study,
                }
            }
            Ok(_) => SyncEvent::Dropped {
                subject_id,
                operation: Operation::Study,
                reason: DropReason::Superseded,
            },
            Err(e) => {
                tracing::warn!(subject_id = %subject_id, error = %e, "Study request failed");
                SyncEvent::Failed {
                    subject_id,
                    operation: Operation::Study,
                    target: None,
                    transient: e.is_transient(),
                    error: e.to_string(),
                }
            }
        }
    }

    // ============================================
    // Internals
    // ============================================

    fn subject_mut(&mut self, id: &str) -> Option<&mut Subject> {
        self.subjects.iter_mut().find(|s| s.id == id)
    }

    fn clear_study_material(&mut self) {
        self.study_material = None;
        self.study_ticket += 1;
    }

    fn persist(&self) {
        if let Err(e) = save_subjects(&self.db, &self.subjects) {
            tracing::error!(error = %e, "Failed to persist subjects");
        }
    }

    /// Spawn a backend request tied to `subject_id`'s cancellation token.
    fn spawn_request<T, F, S>(&mut self, subject_id: &str, operation: Operation, request: F, settle: S)
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
        S: FnOnce(String, Result<T>) -> Settlement + Send + 'static,
    {
        let token = self
            .tokens
            .entry(subject_id.to_string())
            .or_default()
            .clone();
        let tx = self.settle_tx.clone();
        let subject_id = subject_id.to_string();
        self.pending += 1;

        tracing::debug!(subject_id = %subject_id, %operation, "Spawning backend request");

        self.runtime.spawn(async move {
            let settlement = tokio::select! {
                biased;
                _ = token.cancelled() => Settlement::Cancelled { subject_id, operation },
                result = request => settle(subject_id, result),
            };
            let _ = tx.send(settlement);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, FileKind, UploadedFile};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn test_load_subjects_empty() {
        let db = test_db();
        assert!(load_subjects(&db).is_empty());
    }

    #[test]
    fn test_load_subjects_round_trip() {
        let db = test_db();
        let mut subject = Subject::new("DSA", "🧮");
        subject
            .files
            .push(UploadedFile::new("notes.pdf", FileKind::Pdf, 4096));
        subject.messages.push(ChatMessage::user("what is a stack"));
        subject
            .messages
            .push(ChatMessage::not_found("Not found in your notes for DSA"));

        save_subjects(&db, std::slice::from_ref(&subject)).unwrap();
        let loaded = load_subjects(&db);

        assert_eq!(loaded, vec![subject]);
    }

    #[test]
    fn test_load_subjects_incompatible_blob() {
        let db = test_db();
        db.put_blob(SUBJECTS_KEY, r#"{"subjects": "not a list"}"#)
            .unwrap();
        assert!(load_subjects(&db).is_empty());
    }

    #[test]
    fn test_load_subjects_truncates_over_limit() {
        let db = test_db();
        let subjects: Vec<Subject> = ["A", "B", "C", "D"]
            .into_iter()
            .map(|n| Subject::new(n, "📘"))
            .collect();
        save_subjects(&db, &subjects).unwrap();

        let loaded = load_subjects(&db);
        assert_eq!(loaded.len(), MAX_SUBJECTS);
        assert_eq!(loaded[2].name, "C");
    }
}
