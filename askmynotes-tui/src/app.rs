//! Application state for the TUI.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use askmynotes_core::files::{accepted_paths, parse_dropped_paths, read_note_file};
use askmynotes_core::store::{Operation, SyncEvent};
use askmynotes_core::{ActiveView, ChatMessage, Subject, SubjectStore};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::widgets::TableState;
use tokio::sync::broadcast::{self, error::TryRecvError};

/// What the input line is currently collecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Chat question for the active subject
    Message,
    /// Path to a note file to attach
    FilePath,
    /// Topic to generate study material for
    Topic,
    /// Name for a new subject
    NewSubject,
    /// New name for the active subject
    RenameSubject,
}

impl Prompt {
    pub fn label(&self) -> &'static str {
        match self {
            Prompt::Message => "Ask",
            Prompt::FilePath => "File path",
            Prompt::Topic => "Topic",
            Prompt::NewSubject => "New subject",
            Prompt::RenameSubject => "Rename subject",
        }
    }

    /// Placeholder shown while the input is empty
    pub fn placeholder(&self) -> &'static str {
        match self {
            Prompt::Message => "Ask a question about your notes...",
            Prompt::FilePath => "Path to a .pdf or .txt file (or drop files here)",
            Prompt::Topic => "e.g. Binary Search Trees",
            Prompt::NewSubject => "e.g. Operating Systems",
            Prompt::RenameSubject => "New name",
        }
    }
}

/// Local interaction state for the study panel.
///
/// Never persisted; reset whenever new material arrives.
#[derive(Debug, Default)]
pub struct StudyState {
    /// Chosen option per multiple-choice question, locked once set
    pub selected_answers: HashMap<usize, usize>,
    /// Short-answer questions whose model answer is shown
    pub revealed: HashSet<usize>,
    /// Question under the cursor (MCQs first, then short questions)
    pub cursor: usize,
    /// Scroll offset for the study panel
    pub scroll_offset: usize,
}

impl StudyState {
    /// Lock in an answer. Returns false if the question was already answered.
    pub fn answer(&mut self, question: usize, option: usize) -> bool {
        if self.selected_answers.contains_key(&question) {
            return false;
        }
        self.selected_answers.insert(question, option);
        true
    }

    pub fn toggle_revealed(&mut self, question: usize) {
        if !self.revealed.remove(&question) {
            self.revealed.insert(question);
        }
    }
}

/// Main application state.
pub struct App {
    /// Subject store, the only source of domain state
    pub store: SubjectStore,
    /// Reconciliation outcomes from the store
    events: broadcast::Receiver<SyncEvent>,
    /// Active input prompt, if typing
    pub prompt: Option<Prompt>,
    /// Text typed into the prompt
    pub input: String,
    /// Scroll offset for the chat panel (clamped at render time)
    pub chat_scroll: usize,
    /// Message ids whose citations are expanded
    pub expanded_citations: HashSet<String>,
    /// Index into the active subject's messages of the cited message the
    /// citation toggle acts on
    pub citation_cursor: Option<usize>,
    /// (message count, loading) last time the chat followed the newest message
    chat_watermark: (usize, bool),
    /// File table selection state
    pub file_table_state: TableState,
    /// Study panel interaction state
    pub study: StudyState,
    /// Last status line message (most recent failure or notice)
    pub status: Option<String>,
    /// Animation frame counter (increments each tick)
    pub animation_frame: u64,
    /// Whether the app should exit
    pub should_quit: bool,
}

impl App {
    /// Create a new App around the given store.
    pub fn new(store: SubjectStore) -> Self {
        let events = store.subscribe();
        Self {
            store,
            events,
            prompt: None,
            input: String::new(),
            chat_scroll: 0,
            expanded_citations: HashSet::new(),
            citation_cursor: None,
            chat_watermark: (0, false),
            file_table_state: TableState::default(),
            study: StudyState::default(),
            status: None,
            animation_frame: 0,
            should_quit: false,
        }
    }

    /// Merge settled backend requests and react to store changes.
    ///
    /// Called once per frame.
    pub fn tick(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
        self.store.drain_settled();

        loop {
            match self.events.try_recv() {
                Ok(event) => self.on_sync_event(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Sync event receiver lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        self.follow_newest();
        self.clamp_file_selection();
    }

    fn on_sync_event(&mut self, event: SyncEvent) {
        match &event {
            SyncEvent::Failed { .. } => {
                self.status = Some(event.to_string());
            }
            SyncEvent::Settled {
                operation: Operation::Study,
                ..
            } => {
                self.study = StudyState::default();
            }
            _ => {}
        }
    }

    /// Jump to the newest message whenever the count or loading flag changes.
    fn follow_newest(&mut self) {
        let count = self
            .store
            .active_subject()
            .map(|s| s.messages.len())
            .unwrap_or(0);
        let watermark = (count, self.store.is_loading());
        if watermark != self.chat_watermark {
            self.chat_watermark = watermark;
            self.chat_scroll = usize::MAX;
            self.citation_cursor = self.last_cited_message();
        }
    }

    fn clamp_file_selection(&mut self) {
        let count = self
            .store
            .active_subject()
            .map(|s| s.files.len())
            .unwrap_or(0);
        match self.file_table_state.selected() {
            _ if count == 0 => self.file_table_state.select(None),
            Some(idx) if idx >= count => self.file_table_state.select(Some(count - 1)),
            None => self.file_table_state.select(Some(0)),
            _ => {}
        }
    }

    // ========== Derived state ==========

    pub fn active_subject(&self) -> Option<&Subject> {
        self.store.active_subject()
    }

    pub fn active_view(&self) -> ActiveView {
        self.store.active_view()
    }

    /// Whether submitting the current input would do anything
    pub fn can_submit(&self) -> bool {
        match self.prompt {
            Some(Prompt::Message | Prompt::Topic) => {
                !self.store.is_loading() && !self.input.trim().is_empty()
            }
            Some(_) => !self.input.trim().is_empty(),
            None => false,
        }
    }

    /// Whether the citations of a message are shown
    pub fn citations_expanded(&self, message: &ChatMessage) -> bool {
        self.expanded_citations.contains(&message.id)
    }

    fn last_cited_message(&self) -> Option<usize> {
        self.active_subject()?
            .messages
            .iter()
            .rposition(|m| !m.citations().is_empty())
    }

    /// Number of selectable study questions (MCQs, then short questions)
    pub fn study_question_count(&self) -> usize {
        self.store
            .study_material()
            .map(|m| m.mcqs.len() + m.short_questions.len())
            .unwrap_or(0)
    }

    // ========== Input ==========

    /// Handle keyboard input.
    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        if self.prompt.is_some() {
            self.handle_prompt_key(key);
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Tab => self.cycle_view(1),
            KeyCode::BackTab => self.cycle_view(ActiveView::ALL.len() - 1),
            KeyCode::Char(c @ '1'..='3') => {
                let idx = c as usize - '1' as usize;
                self.select_subject(idx);
            }
            KeyCode::Char('n') => {
                if self.store.is_full() {
                    self.status = Some("Subject limit reached".to_string());
                } else {
                    self.open_prompt(Prompt::NewSubject);
                }
            }
            KeyCode::Char('r') if self.active_subject().is_some() => {
                let name = self
                    .active_subject()
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                self.open_prompt(Prompt::RenameSubject);
                self.input = name;
            }
            KeyCode::Char('X') => self.remove_active_subject(),
            KeyCode::Esc => self.status = None,
            _ => match self.active_view() {
                ActiveView::Chat => self.handle_chat_key(key),
                ActiveView::Files => self.handle_files_key(key),
                ActiveView::Study => self.handle_study_key(key),
            },
        }
    }

    /// Handle pasted text (terminals deliver drag-and-drop as a paste).
    pub fn handle_paste(&mut self, text: &str) {
        let dropping_files = self.prompt == Some(Prompt::FilePath)
            || (self.prompt.is_none() && self.active_view() == ActiveView::Files);

        if dropping_files {
            let paths = parse_dropped_paths(text);
            self.add_files(paths);
            self.close_prompt();
            return;
        }

        if self.prompt.is_some() {
            // Single-line input
            let line = text.replace(['\r', '\n'], " ");
            self.input.push_str(&line);
        }
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.close_prompt(),
            KeyCode::Enter => self.submit_prompt(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            _ => {}
        }
    }

    fn handle_chat_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter | KeyCode::Char('i') if self.active_subject().is_some() => {
                self.open_prompt(Prompt::Message)
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.chat_scroll = self.chat_scroll.saturating_add(1);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.chat_scroll = self.chat_scroll.saturating_sub(1);
            }
            KeyCode::PageDown | KeyCode::Char('d') => {
                self.chat_scroll = self.chat_scroll.saturating_add(10);
            }
            KeyCode::PageUp | KeyCode::Char('u') => {
                self.chat_scroll = self.chat_scroll.saturating_sub(10);
            }
            KeyCode::Home | KeyCode::Char('g') => self.chat_scroll = 0,
            KeyCode::End | KeyCode::Char('G') => self.chat_scroll = usize::MAX,
            KeyCode::Char('c') => self.toggle_citations(),
            KeyCode::Char('[') => self.move_citation_cursor(false),
            KeyCode::Char(']') => self.move_citation_cursor(true),
            _ => {}
        }
    }

    fn handle_files_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter | KeyCode::Char('a') | KeyCode::Char('i')
                if self.active_subject().is_some() =>
            {
                self.open_prompt(Prompt::FilePath)
            }
            KeyCode::Down | KeyCode::Char('j') => self.file_table_state.select_next(),
            KeyCode::Up | KeyCode::Char('k') => self.file_table_state.select_previous(),
            KeyCode::Char('d') | KeyCode::Delete => self.remove_selected_file(),
            _ => {}
        }
    }

    fn handle_study_key(&mut self, key: KeyEvent) {
        let count = self.study_question_count();
        match key.code {
            KeyCode::Enter | KeyCode::Char('i') if self.active_subject().is_some() => {
                self.open_prompt(Prompt::Topic)
            }
            KeyCode::Down | KeyCode::Char('j') if count > 0 => {
                self.study.cursor = (self.study.cursor + 1).min(count - 1);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.study.cursor = self.study.cursor.saturating_sub(1);
            }
            KeyCode::Char(c @ 'a'..='f') => {
                let option = c as usize - 'a' as usize;
                self.answer_current(option);
            }
            KeyCode::Char(' ') => self.reveal_current(),
            KeyCode::PageDown => {
                self.study.scroll_offset = self.study.scroll_offset.saturating_add(10);
            }
            KeyCode::PageUp => {
                self.study.scroll_offset = self.study.scroll_offset.saturating_sub(10);
            }
            _ => {}
        }
    }

    // ========== Actions ==========

    fn open_prompt(&mut self, prompt: Prompt) {
        self.prompt = Some(prompt);
        self.input.clear();
    }

    fn close_prompt(&mut self) {
        self.prompt = None;
        self.input.clear();
    }

    fn submit_prompt(&mut self) {
        let Some(prompt) = self.prompt else {
            return;
        };
        if !self.can_submit() {
            return;
        }
        let text = std::mem::take(&mut self.input);

        match prompt {
            Prompt::Message => {
                if let Some(id) = self.store.active_subject_id().map(str::to_string) {
                    self.store.send_message(&id, &text);
                }
            }
            Prompt::Topic => {
                if let Some(id) = self.store.active_subject_id().map(str::to_string) {
                    self.study = StudyState::default();
                    self.store.generate_study_material(&id, &text);
                }
            }
            Prompt::FilePath => {
                self.add_files(parse_dropped_paths(&text));
            }
            Prompt::NewSubject => {
                if self.store.add_subject(&text).is_some() {
                    self.reset_subject_view();
                }
            }
            Prompt::RenameSubject => {
                if let Some(id) = self.store.active_subject_id().map(str::to_string) {
                    self.store.rename_subject(&id, &text);
                }
            }
        }
        self.close_prompt();
    }

    fn cycle_view(&mut self, step: usize) {
        let views = ActiveView::ALL;
        let current = views
            .iter()
            .position(|v| *v == self.active_view())
            .unwrap_or(0);
        let next = views[(current + step) % views.len()];
        self.store.set_active_view(next);
        self.study = StudyState::default();
    }

    fn select_subject(&mut self, idx: usize) {
        let Some(id) = self.store.subjects().get(idx).map(|s| s.id.clone()) else {
            return;
        };
        if self.store.set_active_subject(&id) {
            self.reset_subject_view();
        }
    }

    fn remove_active_subject(&mut self) {
        if let Some(id) = self.store.active_subject_id().map(str::to_string) {
            self.store.remove_subject(&id);
            self.reset_subject_view();
        }
    }

    fn reset_subject_view(&mut self) {
        self.expanded_citations.clear();
        self.study = StudyState::default();
        self.file_table_state.select(None);
        self.chat_watermark = (usize::MAX, false);
    }

    /// Attach files through the shared extension filter.
    pub fn add_files(&mut self, paths: Vec<PathBuf>) {
        let Some(id) = self.store.active_subject_id().map(str::to_string) else {
            return;
        };

        for path in accepted_paths(paths) {
            match read_note_file(&path) {
                Ok((meta, payload)) => {
                    self.store.add_file(&id, meta, Some(payload));
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read note file");
                    self.status = Some(format!("Could not read {}: {}", path.display(), e));
                }
            }
        }
    }

    fn remove_selected_file(&mut self) {
        let Some(idx) = self.file_table_state.selected() else {
            return;
        };
        let Some(subject) = self.active_subject() else {
            return;
        };
        let Some(file_id) = subject.files.get(idx).map(|f| f.id.clone()) else {
            return;
        };
        let subject_id = subject.id.clone();
        self.store.remove_file(&subject_id, &file_id);
    }

    fn toggle_citations(&mut self) {
        let Some(idx) = self.citation_cursor else {
            return;
        };
        let Some(id) = self
            .active_subject()
            .and_then(|s| s.messages.get(idx))
            .map(|m| m.id.clone())
        else {
            return;
        };
        if !self.expanded_citations.remove(&id) {
            self.expanded_citations.insert(id);
        }
    }

    fn move_citation_cursor(&mut self, forward: bool) {
        let Some(subject) = self.active_subject() else {
            return;
        };
        let cited: Vec<usize> = subject
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.citations().is_empty())
            .map(|(i, _)| i)
            .collect();

        let next = match (self.citation_cursor, forward) {
            (None, _) => cited.last().copied(),
            (Some(cur), true) => cited.iter().copied().find(|&i| i > cur).or(Some(cur)),
            (Some(cur), false) => cited.iter().rev().copied().find(|&i| i < cur).or(Some(cur)),
        };
        self.citation_cursor = next;
    }

    fn answer_current(&mut self, option: usize) {
        let Some(material) = self.store.study_material() else {
            return;
        };
        let Some(mcq) = material.mcqs.get(self.study.cursor) else {
            return;
        };
        if option < mcq.options.len() {
            let cursor = self.study.cursor;
            self.study.answer(cursor, option);
        }
    }

    fn reveal_current(&mut self) {
        let Some(material) = self.store.study_material() else {
            return;
        };
        let mcq_count = material.mcqs.len();
        if self.study.cursor >= mcq_count {
            let short = self.study.cursor - mcq_count;
            if short < material.short_questions.len() {
                self.study.toggle_revealed(short);
            }
        }
    }
}
