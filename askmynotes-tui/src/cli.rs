//! askmynotes-cli - headless access to your subjects
//!
//! Works on the same local state as the TUI, so subjects, files and chat
//! history are shared between the two.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/askmynotes/data.db (~/.local/share/askmynotes/data.db)
//! - Logs: $XDG_STATE_HOME/askmynotes/askmynotes.log (~/.local/state/askmynotes/askmynotes.log)
//! - Config: $XDG_CONFIG_HOME/askmynotes/config.toml (~/.config/askmynotes/config.toml)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use askmynotes_core::backend::BackendClient;
use askmynotes_core::files::{accepted_paths, read_note_file};
use askmynotes_core::format::{format_relative_time, format_size};
use askmynotes_core::{ChatMessage, Config, Database, StudyMaterial, SubjectStore, SyncEvent};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "askmynotes-cli")]
#[command(about = "Manage subjects and ask questions about your notes")]
#[command(version)]
struct Args {
    /// Override the backend URL from the config file
    #[arg(long, global = true)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List subjects
    Subjects,
    /// Create a subject (at most 3 can exist)
    AddSubject {
        name: String,
    },
    /// Delete a subject with its files and history
    RemoveSubject {
        /// Subject name or number from `subjects`
        subject: String,
    },
    /// Rename a subject
    RenameSubject {
        /// Subject name or number from `subjects`
        subject: String,
        new_name: String,
    },
    /// Attach .pdf or .txt notes to a subject
    Upload {
        /// Subject name or number from `subjects`
        subject: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Detach a file from a subject
    RemoveFile {
        /// Subject name or number from `subjects`
        subject: String,
        file_name: String,
    },
    /// Show a subject's files and chat history
    Show {
        /// Subject name or number from `subjects`
        subject: String,
    },
    /// Ask a question grounded in a subject's notes
    Ask {
        /// Subject name or number from `subjects`
        subject: String,
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Generate study material for a topic
    Study {
        /// Subject name or number from `subjects`
        subject: String,
        #[arg(required = true, trailing_var_arg = true)]
        topic: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(url) = args.backend_url {
        config.backend.base_url = url;
    }

    // Initialize logging
    let _log_guard =
        askmynotes_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("askmynotes-cli starting");

    // Open database at XDG-compliant path
    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let backend = BackendClient::new(&config.backend).context("invalid backend configuration")?;
    let mut store = SubjectStore::open(db, Arc::new(backend), tokio::runtime::Handle::current());
    let mut events = store.subscribe();

    match args.command {
        Command::Subjects => print_subjects(&store),
        Command::AddSubject { name } => match store.add_subject(&name) {
            Some(id) => {
                let subject = store.subject(&id).context("subject vanished")?;
                println!("Created {} {}", subject.icon, subject.name);
            }
            None if store.is_full() => bail!("subject limit reached, remove one first"),
            None => bail!("subject name must not be blank"),
        },
        Command::RemoveSubject { subject } => {
            let id = resolve_subject(&store, &subject)?;
            store.remove_subject(&id);
            println!("Removed {}", subject);
        }
        Command::RenameSubject { subject, new_name } => {
            let id = resolve_subject(&store, &subject)?;
            if !store.rename_subject(&id, &new_name) {
                bail!("subject name must not be blank");
            }
            println!("Renamed {} to {}", subject, new_name.trim());
        }
        Command::Upload { subject, paths } => {
            let id = resolve_subject(&store, &subject)?;
            let requested = paths.len();
            let accepted = accepted_paths(paths);
            if accepted.len() < requested {
                eprintln!(
                    "Skipped {} file(s): only .pdf and .txt are accepted",
                    requested - accepted.len()
                );
            }
            for path in accepted {
                match read_note_file(&path) {
                    Ok((meta, payload)) => {
                        println!("  + {} ({})", meta.name, format_size(meta.size));
                        store.add_file(&id, meta, Some(payload));
                    }
                    Err(e) => eprintln!("Skipped {}: {}", path.display(), e),
                }
            }
            wait_for_backend(&mut store, "Uploading notes...").await?;
        }
        Command::RemoveFile { subject, file_name } => {
            let id = resolve_subject(&store, &subject)?;
            let file_id = store
                .subject(&id)
                .and_then(|s| s.files.iter().find(|f| f.name == file_name))
                .map(|f| f.id.clone())
                .with_context(|| format!("no file named {:?} in {}", file_name, subject))?;
            store.remove_file(&id, &file_id);
            wait_for_backend(&mut store, "Removing file...").await?;
            println!("Removed {}", file_name);
        }
        Command::Show { subject } => {
            let id = resolve_subject(&store, &subject)?;
            print_subject(&store, &id);
        }
        Command::Ask { subject, question } => {
            let id = resolve_subject(&store, &subject)?;
            let question = question.join(" ");
            if !store.send_message(&id, &question) {
                bail!("question must not be blank");
            }
            wait_for_backend(&mut store, "Searching your notes...").await?;
            if let Some(answer) = store.subject(&id).and_then(|s| s.messages.last()) {
                print_message(answer);
            }
        }
        Command::Study { subject, topic } => {
            let id = resolve_subject(&store, &subject)?;
            if !store.generate_study_material(&id, &topic.join(" ")) {
                bail!("topic must not be blank");
            }
            wait_for_backend(&mut store, "Generating study material...").await?;
            match store.study_material() {
                Some(material) => print_study_material(material),
                None => eprintln!("No study material was generated"),
            }
        }
    }

    report_failures(&mut events);
    tracing::info!("askmynotes-cli complete");
    Ok(())
}

/// Find a subject by name or 1-based position.
fn resolve_subject(store: &SubjectStore, query: &str) -> Result<String> {
    if let Some(subject) = store.subject_by_name(query) {
        return Ok(subject.id.clone());
    }
    if let Ok(position) = query.trim().parse::<usize>() {
        if let Some(subject) = position
            .checked_sub(1)
            .and_then(|idx| store.subjects().get(idx))
        {
            return Ok(subject.id.clone());
        }
    }
    bail!("no subject named {:?}", query)
}

/// Show a spinner until every in-flight backend request has settled.
async fn wait_for_backend(store: &mut SubjectStore, message: &'static str) -> Result<()> {
    if store.pending_requests() == 0 {
        return Ok(());
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
            .context("invalid spinner template")?,
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));

    store.settle_all().await;

    pb.finish_and_clear();
    Ok(())
}

/// Print backend failures the store published.
fn report_failures(events: &mut broadcast::Receiver<SyncEvent>) {
    while let Ok(event) = events.try_recv() {
        if event.is_failure() {
            eprintln!("warning: {}", event);
        }
    }
}

fn print_subjects(store: &SubjectStore) {
    if store.subjects().is_empty() {
        println!("No subjects yet. Create one with `askmynotes-cli add-subject <name>`.");
        return;
    }
    for (idx, subject) in store.subjects().iter().enumerate() {
        println!(
            "{}. {} {}  ({} files, {} messages)",
            idx + 1,
            subject.icon,
            subject.name,
            subject.files.len(),
            subject.messages.len()
        );
    }
}

fn print_subject(store: &SubjectStore, id: &str) {
    let Some(subject) = store.subject(id) else {
        return;
    };
    println!("{} {}", subject.icon, subject.name);

    println!("\nFiles ({}):", subject.files.len());
    for file in &subject.files {
        println!(
            "  {}  {}  {}",
            file.name,
            format_size(file.size),
            format_relative_time(file.uploaded_at)
        );
    }

    println!("\nMessages ({}):", subject.messages.len());
    for msg in &subject.messages {
        print_message(msg);
    }
}

fn print_message(msg: &ChatMessage) {
    let who = if msg.is_user() { "You" } else { "Assistant" };
    match msg.confidence {
        Some(confidence) => println!("\n[{}] {}", who, confidence.label()),
        None => println!("\n[{}]", who),
    }
    println!("{}", msg.content);
    for citation in msg.citations() {
        println!("  - {}", citation.source_label());
        if !citation.evidence.is_empty() {
            println!("    \"{}\"", citation.evidence);
        }
    }
}

fn print_study_material(material: &StudyMaterial) {
    println!("{}\n", material.topic);
    println!("{}", material.explanation);

    if !material.mcqs.is_empty() {
        println!("\nMultiple choice:");
    }
    for (idx, mcq) in material.mcqs.iter().enumerate() {
        println!("\n{}. {}", idx + 1, mcq.question);
        for (o_idx, option) in mcq.options.iter().enumerate() {
            let marker = if mcq.is_correct(o_idx) { "*" } else { " " };
            println!("  {} {}) {}", marker, (b'a' + o_idx as u8) as char, option);
        }
        if !mcq.explanation.is_empty() {
            println!("     {}", mcq.explanation);
        }
    }

    if !material.short_questions.is_empty() {
        println!("\nShort answer:");
    }
    for (idx, short) in material.short_questions.iter().enumerate() {
        println!("\n{}. {}", idx + 1, short.question);
        println!("   {}", short.answer);
    }

    if !material.citations.is_empty() {
        println!("\nSources:");
        for citation in &material.citations {
            println!("  - {}", citation.source_label());
        }
    }
}
