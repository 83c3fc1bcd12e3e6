//! Integration tests for the subject store
//!
//! These tests drive a [`SubjectStore`] against an in-process fake backend to
//! verify the optimistic update flow, reconciliation, cancellation and
//! persistence end to end.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use askmynotes_core::backend::{Backend, ChatReply, ChatRequest, StudyRequest};
use askmynotes_core::store::{DropReason, Operation, SyncEvent};
use askmynotes_core::types::{
    ActiveView, Citation, Confidence, FileKind, FilePayload, Role, StudyMaterial, UploadedFile,
    MAX_SUBJECTS,
};
use askmynotes_core::{Database, Error, Result, SubjectStore};
use tempfile::TempDir;
use tokio::sync::Semaphore;

// ============================================
// Fake backend
// ============================================

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    /// Answer every request successfully
    Succeed,
    /// Fail every request with a 500
    Fail,
    /// Wait for a gate permit, then succeed
    Gated,
    /// Never answer
    Hang,
}

struct FakeBackend {
    mode: Mutex<Mode>,
    gate: Semaphore,
    calls: Mutex<Vec<String>>,
    histories: Mutex<Vec<usize>>,
}

impl FakeBackend {
    fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            gate: Semaphore::new(0),
            calls: Mutex::new(Vec::new()),
            histories: Mutex::new(Vec::new()),
        })
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn open_gate(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn respond(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        let mode = *self.mode.lock().unwrap();
        match mode {
            Mode::Succeed => Ok(()),
            Mode::Fail => Err(Error::Api {
                status: 500,
                body: "backend exploded".to_string(),
            }),
            Mode::Gated => {
                self.gate
                    .acquire()
                    .await
                    .expect("gate closed")
                    .forget();
                Ok(())
            }
            Mode::Hang => std::future::pending().await,
        }
    }
}

fn dsa_material(topic: &str) -> StudyMaterial {
    serde_json::from_value(serde_json::json!({
        "topic": topic,
        "explanation": "Binary search halves the search space each step.",
        "mcqs": [{
            "question": "What is the time complexity of binary search?",
            "options": ["O(n)", "O(log n)", "O(n log n)", "O(1)"],
            "answer": 1,
            "explanation": "The interval halves every comparison."
        }],
        "shortQuestions": [{"question": "Why must the input be sorted?", "answer": "To discard half safely."}],
        "citations": [{"fileName": "dsa.pdf", "page": 4, "chunk": "Searching", "evidence": "halves"}]
    }))
    .expect("valid study material")
}

#[async_trait]
impl Backend for FakeBackend {
    async fn upload(&self, subject_id: &str, file: &FilePayload) -> Result<()> {
        self.respond(format!("upload {} {}", subject_id, file.name))
            .await
    }

    async fn delete_file(&self, subject_id: &str, file_name: &str) -> Result<()> {
        self.respond(format!("delete {} {}", subject_id, file_name))
            .await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        self.histories.lock().unwrap().push(request.history.len());
        self.respond(format!("chat {} {}", request.subject_id, request.message))
            .await?;
        Ok(ChatReply {
            content: format!("Answer about {}", request.message),
            confidence: Some(Confidence::High),
            citations: Some(vec![Citation {
                file_name: "notes.pdf".to_string(),
                page: Some(3),
                chunk: "Chapter 1".to_string(),
                evidence: "quoted text".to_string(),
            }]),
        })
    }

    async fn study(&self, request: &StudyRequest) -> Result<StudyMaterial> {
        self.respond(format!("study {} {}", request.subject_id, request.topic))
            .await?;
        Ok(dsa_material(&request.topic))
    }
}

// ============================================
// Helpers
// ============================================

fn memory_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();
    db
}

fn open_store(backend: Arc<FakeBackend>) -> SubjectStore {
    askmynotes_core::logging::init_test();
    SubjectStore::open(memory_db(), backend, tokio::runtime::Handle::current())
}

fn note(name: &str) -> (UploadedFile, FilePayload) {
    let kind = FileKind::from_file_name(name).unwrap();
    let bytes = b"lecture notes".to_vec();
    (
        UploadedFile::new(name, kind, bytes.len() as u64),
        FilePayload {
            name: name.to_string(),
            kind,
            bytes,
        },
    )
}

// ============================================
// Subjects
// ============================================

#[tokio::test]
async fn test_subject_capacity() {
    let mut store = open_store(FakeBackend::new(Mode::Succeed));

    let a = store.add_subject("A").unwrap();
    let _b = store.add_subject("B").unwrap();
    let c = store.add_subject("C").unwrap();
    assert_eq!(store.subjects().len(), MAX_SUBJECTS);
    assert!(store.is_full());
    assert_eq!(store.active_subject_id(), Some(c.as_str()));

    assert!(store.add_subject("D").is_none());
    assert_eq!(store.subjects().len(), MAX_SUBJECTS);
    assert_eq!(store.active_subject_id(), Some(c.as_str()));

    store.set_active_subject(&a);
    assert_eq!(store.active_subject().unwrap().name, "A");
}

#[tokio::test]
async fn test_new_subject_gets_known_icon() {
    let mut store = open_store(FakeBackend::new(Mode::Succeed));
    let id = store.add_subject("  Operating Systems  ").unwrap();

    let subject = store.subject(&id).unwrap();
    assert_eq!(subject.name, "Operating Systems");
    assert!(askmynotes_core::SUBJECT_ICONS.contains(&subject.icon.as_str()));
    assert!(subject.files.is_empty());
    assert!(subject.messages.is_empty());
}

#[tokio::test]
async fn test_blank_subject_name_ignored() {
    let mut store = open_store(FakeBackend::new(Mode::Succeed));
    assert!(store.add_subject("   ").is_none());
    assert!(store.subjects().is_empty());
    assert!(store.active_subject_id().is_none());
}

#[tokio::test]
async fn test_remove_active_subject_falls_back() {
    let mut store = open_store(FakeBackend::new(Mode::Succeed));
    let a = store.add_subject("A").unwrap();
    let b = store.add_subject("B").unwrap();
    assert_eq!(store.active_subject_id(), Some(b.as_str()));

    assert!(store.remove_subject(&b));
    assert_eq!(store.active_subject_id(), Some(a.as_str()));

    assert!(store.remove_subject(&a));
    assert!(store.active_subject_id().is_none());
    assert!(store.subjects().is_empty());

    assert!(!store.remove_subject("missing"));
}

#[tokio::test]
async fn test_remove_inactive_subject_keeps_selection() {
    let mut store = open_store(FakeBackend::new(Mode::Succeed));
    let a = store.add_subject("A").unwrap();
    let b = store.add_subject("B").unwrap();

    store.remove_subject(&a);
    assert_eq!(store.active_subject_id(), Some(b.as_str()));
}

#[tokio::test]
async fn test_rename_subject() {
    let mut store = open_store(FakeBackend::new(Mode::Succeed));
    let id = store.add_subject("Networks").unwrap();

    assert!(store.rename_subject(&id, "Computer Networks"));
    assert_eq!(store.subject(&id).unwrap().name, "Computer Networks");
    assert!(!store.rename_subject(&id, "  "));
    assert!(!store.rename_subject("missing", "X"));
}

// ============================================
// Files
// ============================================

#[tokio::test]
async fn test_add_then_remove_file_restores_list() {
    let backend = FakeBackend::new(Mode::Succeed);
    let mut store = open_store(backend.clone());
    let id = store.add_subject("DBMS").unwrap();

    let (existing, _) = note("intro.txt");
    store.add_file(&id, existing, None);
    let before = store.subject(&id).unwrap().files.clone();

    let (file, payload) = note("normalization.pdf");
    let file_id = file.id.clone();
    assert!(store.add_file(&id, file, Some(payload)));
    assert_eq!(store.subject(&id).unwrap().files.len(), 2);

    assert!(store.remove_file(&id, &file_id));
    assert_eq!(store.subject(&id).unwrap().files, before);

    store.settle_all().await;
    assert_eq!(
        backend.calls(),
        vec![
            format!("upload {} normalization.pdf", id),
            format!("delete {} normalization.pdf", id),
        ]
    );
}

#[tokio::test]
async fn test_remove_unknown_file_sends_nothing() {
    let backend = FakeBackend::new(Mode::Succeed);
    let mut store = open_store(backend.clone());
    let id = store.add_subject("DBMS").unwrap();

    assert!(!store.remove_file(&id, "no-such-file"));
    assert_eq!(store.pending_requests(), 0);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_upload_failure_keeps_file_and_reports() {
    let mut store = open_store(FakeBackend::new(Mode::Fail));
    let mut events = store.subscribe();
    let id = store.add_subject("OS").unwrap();

    let (file, payload) = note("paging.pdf");
    store.add_file(&id, file, Some(payload));
    store.settle_all().await;

    assert_eq!(store.subject(&id).unwrap().files.len(), 1);
    match events.try_recv().unwrap() {
        SyncEvent::Failed {
            operation,
            target,
            transient,
            ..
        } => {
            assert_eq!(operation, Operation::Upload);
            assert_eq!(target.as_deref(), Some("paging.pdf"));
            assert!(transient);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

// ============================================
// Chat
// ============================================

#[tokio::test]
async fn test_send_message_appends_user_then_assistant() {
    let backend = FakeBackend::new(Mode::Succeed);
    let mut store = open_store(backend.clone());
    let id = store.add_subject("DSA").unwrap();

    assert!(store.send_message(&id, "What is a heap?"));
    assert!(store.is_loading());
    let messages = &store.subject(&id).unwrap().messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);

    store.settle_all().await;
    assert!(!store.is_loading());

    let messages = &store.subject(&id).unwrap().messages;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].confidence, Some(Confidence::High));
    assert_eq!(messages[1].citations().len(), 1);
    assert!(!messages[1].not_found);

    store.send_message(&id, "And a stack?");
    store.settle_all().await;
    assert_eq!(*backend.histories.lock().unwrap(), vec![0, 2]);
}

#[tokio::test]
async fn test_failed_chat_appends_not_found_answer() {
    let mut store = open_store(FakeBackend::new(Mode::Fail));
    let id = store.add_subject("DSA").unwrap();

    store.send_message(&id, "Explain AVL rotations");
    store.settle_all().await;

    let messages = &store.subject(&id).unwrap().messages;
    assert_eq!(messages.len(), 2);
    let answer = &messages[1];
    assert_eq!(answer.role, Role::Assistant);
    assert!(answer.not_found);
    assert_eq!(answer.confidence, Some(Confidence::Low));
    assert!(answer.content.contains("Not found in your notes for DSA"));
    assert!(!store.is_loading());
}

#[tokio::test]
async fn test_blank_message_ignored() {
    let backend = FakeBackend::new(Mode::Succeed);
    let mut store = open_store(backend.clone());
    let id = store.add_subject("DSA").unwrap();

    assert!(!store.send_message(&id, "   \n"));
    assert!(store.subject(&id).unwrap().messages.is_empty());
    assert!(!store.is_loading());
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_removed_subject_drops_inflight_chat() {
    let mut store = open_store(FakeBackend::new(Mode::Hang));
    let mut events = store.subscribe();
    let keep = store.add_subject("Keep").unwrap();
    let doomed = store.add_subject("Doomed").unwrap();

    store.send_message(&doomed, "Will this ever answer?");
    assert!(store.is_loading());

    store.remove_subject(&doomed);
    store.settle_all().await;

    assert!(!store.is_loading());
    assert!(store.subject(&doomed).is_none());
    assert!(store.subject(&keep).unwrap().messages.is_empty());
    assert_eq!(
        events.try_recv().unwrap(),
        SyncEvent::Dropped {
            subject_id: doomed,
            operation: Operation::Chat,
            reason: DropReason::SubjectRemoved,
        }
    );
}

// ============================================
// Study
// ============================================

#[tokio::test]
async fn test_generate_study_material() {
    let mut store = open_store(FakeBackend::new(Mode::Succeed));
    let id = store.add_subject("DSA").unwrap();
    store.set_active_view(ActiveView::Study);

    assert!(store.generate_study_material(&id, "Binary Search"));
    assert!(store.is_loading());
    store.settle_all().await;

    assert!(!store.is_loading());
    let material = store.study_material().unwrap();
    assert_eq!(material.topic, "Binary Search");
    assert_eq!(material.mcqs.len(), 1);
}

#[tokio::test]
async fn test_selection_change_clears_study_material() {
    let mut store = open_store(FakeBackend::new(Mode::Succeed));
    let a = store.add_subject("A").unwrap();
    let b = store.add_subject("B").unwrap();

    store.generate_study_material(&b, "Graphs");
    store.settle_all().await;
    assert!(store.study_material().is_some());

    store.set_active_subject(&a);
    assert!(store.study_material().is_none());

    store.generate_study_material(&a, "Trees");
    store.settle_all().await;
    assert!(store.study_material().is_some());

    store.set_active_view(ActiveView::Files);
    assert!(store.study_material().is_none());
}

#[tokio::test]
async fn test_superseded_study_result_dropped() {
    let backend = FakeBackend::new(Mode::Gated);
    let mut store = open_store(backend.clone());
    let mut events = store.subscribe();
    let id = store.add_subject("DSA").unwrap();

    store.generate_study_material(&id, "Heaps");
    store.set_active_view(ActiveView::Chat);
    backend.open_gate(1);
    store.settle_all().await;

    assert!(store.study_material().is_none());
    assert!(!store.is_loading());
    assert_eq!(
        events.try_recv().unwrap(),
        SyncEvent::Dropped {
            subject_id: id,
            operation: Operation::Study,
            reason: DropReason::Superseded,
        }
    );
}

#[tokio::test]
async fn test_failed_study_only_clears_loading() {
    let backend = FakeBackend::new(Mode::Succeed);
    let mut store = open_store(backend.clone());
    let id = store.add_subject("DSA").unwrap();

    backend.set_mode(Mode::Fail);
    store.generate_study_material(&id, "Tries");
    store.settle_all().await;

    assert!(!store.is_loading());
    assert!(store.study_material().is_none());
    assert!(store.subject(&id).unwrap().messages.is_empty());
}

// ============================================
// Persistence
// ============================================

#[tokio::test]
async fn test_reload_restores_subjects() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("data.db");
    let backend = FakeBackend::new(Mode::Succeed);

    let (subject_id, expected) = {
        let db = Database::open(&db_path).unwrap();
        db.migrate().unwrap();
        let mut store =
            SubjectStore::open(db, backend.clone(), tokio::runtime::Handle::current());

        let id = store.add_subject("DBMS").unwrap();
        let (file, payload) = note("sql.pdf");
        store.add_file(&id, file, Some(payload));
        store.send_message(&id, "What is 3NF?");
        store.settle_all().await;

        (id.clone(), store.subjects().to_vec())
    };

    let db = Database::open(&db_path).unwrap();
    db.migrate().unwrap();
    let store = SubjectStore::open(db, backend, tokio::runtime::Handle::current());

    assert_eq!(store.subjects(), expected.as_slice());
    assert_eq!(store.active_subject_id(), Some(subject_id.as_str()));
    assert_eq!(store.active_view(), ActiveView::Chat);
    assert!(!store.is_loading());
    assert!(store.study_material().is_none());
}
