//! UI rendering for the TUI.

use askmynotes_core::format::{format_clock, format_date, format_size};
use askmynotes_core::{ActiveView, ChatMessage, Confidence, StudyMaterial, Subject, MAX_SUBJECTS};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{
        Block, BorderType, Borders, Cell, Paragraph, Row, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Table, Wrap,
    },
    Frame,
};

use crate::app::{App, Prompt};

// ========== Colors ==========

/// Accent for the app name and active selections
const ACCENT: Color = Color::Rgb(120, 140, 255);
/// Separator line color
const SEPARATOR_COLOR: Color = Color::Rgb(60, 60, 60);
/// Border color for the sidebar
const BORDER_SIDEBAR: Color = Color::Rgb(90, 90, 140);
/// Border color for the chat panel
const BORDER_CHAT: Color = Color::Rgb(80, 160, 80);
/// Border color for the file panel
const BORDER_FILES: Color = Color::Rgb(0, 150, 150);
/// Border color for the study panel
const BORDER_STUDY: Color = Color::Rgb(180, 100, 180);
/// Label color for section headings
const LABEL_COLOR: Color = Color::Rgb(100, 180, 180);
/// Citation evidence color
const EVIDENCE_COLOR: Color = Color::Rgb(150, 150, 150);

/// Spinner frames for pending requests
const SPINNER: [&str; 4] = ["◐", "◓", "◑", "◒"];

/// Render the application UI.
pub fn render(frame: &mut Frame, app: &mut App) {
    let area = frame.area();

    // Layout: header, body, input, footer
    let chunks = Layout::vertical([
        Constraint::Length(2), // Header
        Constraint::Min(5),    // Body
        Constraint::Length(3), // Input
        Constraint::Length(1), // Footer
    ])
    .split(area);

    render_header(frame, app, chunks[0]);

    let body = Layout::horizontal([
        Constraint::Length(28), // Sidebar
        Constraint::Min(20),    // Active view
    ])
    .split(chunks[1]);

    render_sidebar(frame, app, body[0]);

    if app.active_subject().is_none() {
        render_no_subject(frame, body[1]);
    } else {
        match app.active_view() {
            ActiveView::Chat => render_chat(frame, app, body[1]),
            ActiveView::Files => render_files(frame, app, body[1]),
            ActiveView::Study => render_study(frame, app, body[1]),
        }
    }

    render_input(frame, app, chunks[2]);
    render_footer(frame, app, chunks[3]);
}

/// Render the header with app name and view tabs.
fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::horizontal([
        Constraint::Length(14), // App name
        Constraint::Min(1),     // Tabs
    ])
    .split(area);

    let app_name = Paragraph::new(" askmynotes").style(Style::default().fg(ACCENT).bold());
    frame.render_widget(app_name, chunks[0]);

    let active = app.active_view();
    let mut spans = Vec::new();
    for view in ActiveView::ALL {
        let style = if view == active {
            Style::default()
                .fg(ACCENT)
                .bold()
                .add_modifier(Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!(" {} ", view.label()), style));
        spans.push(Span::raw("  "));
    }

    let tabs = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(tabs, chunks[1]);
}

/// Render the subject sidebar.
fn render_sidebar(frame: &mut Frame, app: &App, area: Rect) {
    let active_id = app.store.active_subject_id();
    let mut lines: Vec<Line> = Vec::new();

    for (idx, subject) in app.store.subjects().iter().enumerate() {
        let is_active = Some(subject.id.as_str()) == active_id;
        let name_style = if is_active {
            Style::default().fg(ACCENT).bold()
        } else {
            Style::default().fg(Color::White)
        };
        let marker = if is_active { "▶" } else { " " };

        lines.push(Line::from(vec![
            Span::styled(format!("{} {} ", marker, idx + 1), Style::default().fg(Color::Yellow)),
            Span::raw(format!("{} ", subject.icon)),
            Span::styled(subject.name.clone(), name_style),
        ]));
        lines.push(Line::from(Span::styled(
            format!(
                "     {} files · {} msgs",
                subject.files.len(),
                subject.messages.len()
            ),
            Style::default().fg(Color::DarkGray),
        )));
    }

    if app.store.subjects().is_empty() {
        lines.push(Line::from(Span::styled(
            " No subjects yet",
            Style::default().fg(Color::DarkGray),
        )));
    }

    lines.push(Line::raw(""));
    let capacity = format!(
        " {}/{} subjects",
        app.store.subjects().len(),
        MAX_SUBJECTS
    );
    let capacity_style = if app.store.is_full() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    lines.push(Line::from(Span::styled(capacity, capacity_style)));

    let sidebar = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(BORDER_SIDEBAR))
            .title(" Subjects "),
    );
    frame.render_widget(sidebar, area);
}

/// Render the placeholder shown when no subject exists.
fn render_no_subject(frame: &mut Frame, area: Rect) {
    let lines = vec![
        Line::raw(""),
        Line::from(Span::styled(
            "Create a subject to get started",
            Style::default().fg(Color::White).bold(),
        )),
        Line::raw(""),
        Line::from(vec![
            Span::raw("Press "),
            Span::styled("n", Style::default().fg(Color::Yellow)),
            Span::raw(" to add one (up to 3)"),
        ]),
    ];
    let placeholder = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        );
    frame.render_widget(placeholder, area);
}

// ========== Chat ==========

/// Render the chat panel for the active subject.
fn render_chat(frame: &mut Frame, app: &mut App, area: Rect) {
    let Some(subject) = app.active_subject() else {
        return;
    };
    let title = format!(" {} {} ", subject.icon, subject.name);

    let lines = if subject.messages.is_empty() && !app.store.is_loading() {
        chat_empty_state(subject)
    } else {
        chat_lines(app, subject)
    };

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    let rows = wrapped_rows(&paragraph, area);
    let max_scroll = rows.saturating_sub(area.height.saturating_sub(2) as usize);
    app.chat_scroll = app.chat_scroll.min(max_scroll);

    let paragraph = paragraph
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(BORDER_CHAT))
                .title(title)
                .title_style(Style::default().fg(BORDER_CHAT).bold()),
        )
        .scroll((app.chat_scroll as u16, 0));
    frame.render_widget(paragraph, area);

    let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
        .begin_symbol(Some("↑"))
        .end_symbol(Some("↓"));
    let mut scrollbar_state = ScrollbarState::new(max_scroll).position(app.chat_scroll);
    frame.render_stateful_widget(
        scrollbar,
        area.inner(Margin {
            vertical: 1,
            horizontal: 0,
        }),
        &mut scrollbar_state,
    );
}

/// Rows a wrapped, block-less paragraph takes inside a bordered `area`.
fn wrapped_rows(paragraph: &Paragraph, area: Rect) -> usize {
    paragraph.line_count(area.width.saturating_sub(2))
}

fn chat_empty_state(subject: &Subject) -> Vec<Line<'static>> {
    let (heading, hint) = if subject.has_files() {
        (
            format!("Ask anything about {}", subject.name),
            "Answers come only from the notes you uploaded.".to_string(),
        )
    } else {
        (
            format!("No notes in {} yet", subject.name),
            "Upload .pdf or .txt notes in the Files tab to get started.".to_string(),
        )
    };
    vec![
        Line::raw(""),
        Line::from(Span::styled(heading, Style::default().fg(Color::White).bold())).centered(),
        Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))).centered(),
    ]
}

fn chat_lines(app: &App, subject: &Subject) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = Vec::new();

    for (idx, msg) in subject.messages.iter().enumerate() {
        if idx > 0 {
            lines.push(Line::from(Span::styled(
                "─".repeat(40),
                Style::default().fg(SEPARATOR_COLOR),
            )));
        }
        let selected = app.citation_cursor == Some(idx);
        lines.extend(format_message(msg, app.citations_expanded(msg), selected));
        lines.push(Line::raw(""));
    }

    if app.store.is_loading() {
        let spinner = SPINNER[(app.animation_frame / 3) as usize % SPINNER.len()];
        lines.push(Line::from(vec![
            Span::styled(format!("{} ", spinner), Style::default().fg(ACCENT)),
            Span::styled(
                "Searching your notes...",
                Style::default().fg(Color::DarkGray).italic(),
            ),
        ]));
    }

    lines
}

/// Format a single chat message into display lines.
fn format_message(msg: &ChatMessage, expanded: bool, selected: bool) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let mut header = if msg.is_user() {
        vec![Span::styled("💬 You", Style::default().fg(Color::Cyan).bold())]
    } else {
        vec![Span::styled("🤖 Assistant", Style::default().fg(Color::Green))]
    };
    header.push(Span::styled(
        format!("  {}", format_clock(msg.timestamp)),
        Style::default().fg(Color::DarkGray),
    ));
    if let Some(confidence) = msg.confidence {
        header.push(Span::raw("  "));
        header.push(Span::styled(
            format!(" {} ", confidence.label()),
            confidence_style(confidence),
        ));
    }
    lines.push(Line::from(header));

    let content_style = if msg.not_found {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    for line in msg.content.lines() {
        lines.push(Line::from(Span::styled(format!("  {}", line), content_style)));
    }

    let citations = msg.citations();
    if !citations.is_empty() {
        let toggle = if expanded {
            "Hide Evidence"
        } else {
            "Show Evidence"
        };
        let noun = if citations.len() == 1 {
            "Citation"
        } else {
            "Citations"
        };
        let mut style = Style::default().fg(LABEL_COLOR);
        if selected {
            style = style.add_modifier(Modifier::REVERSED);
        }
        lines.push(Line::from(Span::styled(
            format!("  📎 {} {} · {}", citations.len(), noun, toggle),
            style,
        )));

        if expanded {
            for citation in citations {
                lines.push(Line::from(Span::styled(
                    format!("    {}", citation.source_label()),
                    Style::default().fg(Color::White),
                )));
                if !citation.evidence.is_empty() {
                    lines.push(Line::from(Span::styled(
                        format!("      \"{}\"", citation.evidence),
                        Style::default().fg(EVIDENCE_COLOR).italic(),
                    )));
                }
            }
        }
    }

    lines
}

fn confidence_style(confidence: Confidence) -> Style {
    let color = match confidence {
        Confidence::High => Color::Green,
        Confidence::Medium => Color::Yellow,
        Confidence::Low => Color::Red,
    };
    Style::default().fg(Color::Black).bg(color)
}

// ========== Files ==========

/// Render the file panel for the active subject.
fn render_files(frame: &mut Frame, app: &mut App, area: Rect) {
    let Some(subject) = app.store.active_subject() else {
        return;
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_FILES))
        .title(format!(" {} Files ", subject.name))
        .title_style(Style::default().fg(BORDER_FILES).bold());

    if subject.files.is_empty() {
        let lines = vec![
            Line::raw(""),
            Line::from(Span::styled(
                "Drop .pdf or .txt files onto the terminal",
                Style::default().fg(Color::White).bold(),
            )),
            Line::from(vec![
                Span::raw("or press "),
                Span::styled("a", Style::default().fg(Color::Yellow)),
                Span::raw(" to type a path"),
            ]),
        ];
        let empty = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let header_cells = ["Name", "Type", "Size", "Added"]
        .into_iter()
        .map(|h| Cell::from(h).style(Style::default().fg(Color::Yellow).bold()));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = subject
        .files
        .iter()
        .map(|file| {
            Row::new([
                Cell::from(file.name.clone()),
                Cell::from(file.kind.as_str().to_uppercase()),
                Cell::from(format_size(file.size)),
                Cell::from(format_date(file.uploaded_at)).style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Fill(1),    // Name (flexible)
        Constraint::Length(6),  // Type
        Constraint::Length(10), // Size
        Constraint::Length(14), // Added
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .row_highlight_style(
            Style::default()
                .add_modifier(Modifier::REVERSED)
                .fg(Color::Cyan),
        )
        .highlight_symbol("▶ ");

    frame.render_stateful_widget(table, area, &mut app.file_table_state);
}

// ========== Study ==========

/// Render the study panel for the active subject.
fn render_study(frame: &mut Frame, app: &mut App, area: Rect) {
    let lines = match app.store.study_material() {
        Some(material) => study_lines(app, material),
        None if app.store.is_loading() => {
            let spinner = SPINNER[(app.animation_frame / 3) as usize % SPINNER.len()];
            vec![
                Line::raw(""),
                Line::from(Span::styled(
                    format!("{} Generating study material...", spinner),
                    Style::default().fg(Color::DarkGray).italic(),
                ))
                .centered(),
            ]
        }
        None => vec![
            Line::raw(""),
            Line::from(Span::styled(
                "Turn your notes into a study session",
                Style::default().fg(Color::White).bold(),
            ))
            .centered(),
            Line::from(vec![
                Span::raw("Press "),
                Span::styled("Enter", Style::default().fg(Color::Yellow)),
                Span::raw(" and type a topic"),
            ])
            .centered(),
        ],
    };

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    let rows = wrapped_rows(&paragraph, area);
    let max_scroll = rows.saturating_sub(area.height.saturating_sub(2) as usize);
    app.study.scroll_offset = app.study.scroll_offset.min(max_scroll);

    let paragraph = paragraph
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(BORDER_STUDY))
                .title(" Study Mode ")
                .title_style(Style::default().fg(BORDER_STUDY).bold()),
        )
        .scroll((app.study.scroll_offset as u16, 0));
    frame.render_widget(paragraph, area);
}

fn study_lines(app: &App, material: &StudyMaterial) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = Vec::new();
    let heading = Style::default().fg(LABEL_COLOR).bold();

    lines.push(Line::from(Span::styled(
        material.topic.clone(),
        Style::default().fg(Color::White).bold(),
    )));
    lines.push(Line::raw(""));
    lines.push(Line::from(Span::styled("Explanation", heading)));
    for line in material.explanation.lines() {
        lines.push(Line::raw(format!("  {}", line)));
    }

    if !material.citations.is_empty() {
        lines.push(Line::raw(""));
        lines.push(Line::from(Span::styled("Sources", heading)));
        for citation in &material.citations {
            lines.push(Line::from(Span::styled(
                format!("  📎 {}", citation.source_label()),
                Style::default().fg(EVIDENCE_COLOR),
            )));
        }
    }

    if !material.mcqs.is_empty() {
        lines.push(Line::raw(""));
        lines.push(Line::from(Span::styled("Multiple Choice", heading)));
    }
    for (q_idx, mcq) in material.mcqs.iter().enumerate() {
        let cursor = if app.study.cursor == q_idx { "▶" } else { " " };
        lines.push(Line::from(vec![
            Span::styled(format!("{} {}. ", cursor, q_idx + 1), Style::default().fg(Color::Yellow)),
            Span::styled(mcq.question.clone(), Style::default().bold()),
        ]));

        let chosen = app.study.selected_answers.get(&q_idx).copied();
        for (o_idx, option) in mcq.options.iter().enumerate() {
            let letter = (b'a' + o_idx as u8) as char;
            let style = match chosen {
                Some(_) if mcq.is_correct(o_idx) => Style::default().fg(Color::Green).bold(),
                Some(c) if c == o_idx => Style::default().fg(Color::Red),
                _ => Style::default(),
            };
            lines.push(Line::from(Span::styled(
                format!("     {}) {}", letter, option),
                style,
            )));
        }

        if chosen.is_some() && !mcq.explanation.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("     {}", mcq.explanation),
                Style::default().fg(EVIDENCE_COLOR).italic(),
            )));
        }
    }

    if !material.short_questions.is_empty() {
        lines.push(Line::raw(""));
        lines.push(Line::from(Span::styled("Short Answer", heading)));
    }
    let offset = material.mcqs.len();
    for (s_idx, short) in material.short_questions.iter().enumerate() {
        let cursor = if app.study.cursor == offset + s_idx {
            "▶"
        } else {
            " "
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{} {}. ", cursor, s_idx + 1), Style::default().fg(Color::Yellow)),
            Span::styled(short.question.clone(), Style::default().bold()),
        ]));
        if app.study.revealed.contains(&s_idx) {
            lines.push(Line::from(Span::styled(
                format!("     {}", short.answer),
                Style::default().fg(Color::Green),
            )));
        } else {
            lines.push(Line::from(Span::styled(
                "     (space to show answer)",
                Style::default().fg(Color::DarkGray),
            )));
        }
    }

    lines
}

// ========== Input & footer ==========

/// Render the input line.
fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let (title, content) = match app.prompt {
        Some(prompt) => {
            let waiting = matches!(prompt, Prompt::Message | Prompt::Topic) && app.store.is_loading();
            let title = if waiting {
                format!(" {} (waiting for the last answer) ", prompt.label())
            } else {
                format!(" {} ", prompt.label())
            };
            let content = if app.input.is_empty() {
                Line::from(vec![
                    Span::styled("█", Style::default().fg(ACCENT)),
                    Span::styled(prompt.placeholder(), Style::default().fg(Color::DarkGray)),
                ])
            } else {
                Line::from(vec![
                    Span::raw(app.input.clone()),
                    Span::styled("█", Style::default().fg(ACCENT)),
                ])
            };
            (title, content)
        }
        None => (
            " Input ".to_string(),
            Line::from(Span::styled(
                "Press Enter to type",
                Style::default().fg(Color::DarkGray),
            )),
        ),
    };

    let border = if app.prompt.is_some() {
        Style::default().fg(ACCENT)
    } else {
        Style::default().fg(SEPARATOR_COLOR)
    };
    let input = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(border)
            .title(title),
    );
    frame.render_widget(input, area);
}

/// Render the footer with key hints and the status line.
fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    let mut spans = if app.prompt.is_some() {
        vec![
            key(" Enter"),
            Span::raw(" submit  "),
            key("Esc"),
            Span::raw(" cancel  "),
        ]
    } else {
        let mut spans = vec![
            key(" Tab"),
            Span::raw(" view  "),
            key("1-3"),
            Span::raw(" subject  "),
            key("n"),
            Span::raw(" new  "),
            key("r"),
            Span::raw(" rename  "),
            key("X"),
            Span::raw(" delete  "),
        ];
        match app.active_view() {
            ActiveView::Chat => spans.extend([
                key("c"),
                Span::raw(" citations  "),
                key("[/]"),
                Span::raw(" prev/next cited  "),
            ]),
            ActiveView::Files => spans.extend([
                key("a"),
                Span::raw(" add  "),
                key("d"),
                Span::raw(" remove  "),
            ]),
            ActiveView::Study => spans.extend([
                key("a-f"),
                Span::raw(" answer  "),
                key("Space"),
                Span::raw(" reveal  "),
            ]),
        }
        spans.extend([key("q"), Span::raw(" quit  ")]);
        spans
    };

    if let Some(status) = &app.status {
        spans.push(Span::raw("│ "));
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Red)));
    } else if app.store.pending_requests() > 0 {
        spans.push(Span::raw("│ "));
        spans.push(Span::styled(
            format!("{} syncing", app.store.pending_requests()),
            Style::default().fg(Color::DarkGray),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use askmynotes_core::backend::{Backend, ChatReply, ChatRequest, StudyRequest};
    use askmynotes_core::{Database, FilePayload, Result, SubjectStore};
    use async_trait::async_trait;
    use ratatui::{backend::TestBackend, Terminal};

    /// Backend whose answers are one long line ending in `end-<question>`
    struct WordyBackend;

    #[async_trait]
    impl Backend for WordyBackend {
        async fn upload(&self, _: &str, _: &FilePayload) -> Result<()> {
            Ok(())
        }
        async fn delete_file(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
            Ok(ChatReply {
                content: format!("{}end-{}", "notes ".repeat(90), request.message),
                confidence: None,
                citations: None,
            })
        }
        async fn study(&self, _: &StudyRequest) -> Result<StudyMaterial> {
            std::future::pending().await
        }
    }

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[tokio::test]
    async fn test_newest_wrapped_answer_stays_on_screen() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let store = SubjectStore::open(
            db,
            Arc::new(WordyBackend),
            tokio::runtime::Handle::current(),
        );
        let mut app = App::new(store);
        let id = app.store.add_subject("DSA").unwrap();

        for question in ["q1", "q2", "q3", "q4"] {
            assert!(app.store.send_message(&id, question));
            app.store.settle_all().await;
        }
        app.tick();
        assert_eq!(app.chat_scroll, usize::MAX);

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| render(frame, &mut app)).unwrap();

        let text = screen_text(&terminal);
        assert!(text.contains("end-q4"), "newest answer is off screen");
        assert!(!text.contains("end-q1"));
    }

    #[test]
    fn test_wrapped_rows_counts_wrapped_lines() {
        let long = "word ".repeat(20);
        let paragraph = Paragraph::new(vec![Line::raw(long.trim_end().to_string()), Line::raw("")])
            .wrap(Wrap { trim: false });
        // four words per 22-column row
        assert!(wrapped_rows(&paragraph, Rect::new(0, 0, 24, 10)) >= 6);
        assert_eq!(wrapped_rows(&paragraph, Rect::new(0, 0, 200, 10)), 2);
    }
}
