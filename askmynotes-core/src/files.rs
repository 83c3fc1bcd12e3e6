//! Intake of note files picked or dropped by the user
//!
//! Both intake paths (typing a path, dropping files onto the terminal which
//! pastes their paths) go through [`accepted_paths`], so the extension rule
//! is the same everywhere.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{FileKind, FilePayload, UploadedFile};

/// Note kind for a path, or `None` if the extension is not accepted.
pub fn accepted_kind(path: &Path) -> Option<FileKind> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(FileKind::from_file_name)
}

/// Keep only paths with an accepted extension.
///
/// Rejected paths are dropped without an error.
pub fn accepted_paths<I>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    paths
        .into_iter()
        .filter(|path| {
            let accepted = accepted_kind(path).is_some();
            if !accepted {
                tracing::debug!(path = %path.display(), "Ignoring unsupported file");
            }
            accepted
        })
        .collect()
}

/// Read a note file into its metadata and upload payload.
pub fn read_note_file(path: &Path) -> Result<(UploadedFile, FilePayload)> {
    let kind =
        accepted_kind(path).ok_or_else(|| Error::UnsupportedFile(path.display().to_string()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::UnsupportedFile(path.display().to_string()))?
        .to_string();

    let bytes = std::fs::read(path)?;
    let meta = UploadedFile::new(name.clone(), kind, bytes.len() as u64);
    Ok((meta, FilePayload { name, kind, bytes }))
}

/// Split text pasted into the terminal into file paths.
///
/// Terminals paste dropped files as whitespace-separated paths, escaping
/// spaces with backslashes or wrapping paths in quotes; some send
/// `file://` URIs one per line.
pub fn parse_dropped_paths(text: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => quote = Some(c),
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (None, c) if c.is_whitespace() => flush_path(&mut current, &mut paths),
            (None, c) => current.push(c),
        }
    }
    flush_path(&mut current, &mut paths);

    paths
}

fn flush_path(current: &mut String, paths: &mut Vec<PathBuf>) {
    if current.is_empty() {
        return;
    }
    let raw = std::mem::take(current);
    let path = raw.strip_prefix("file://").map(decode_uri_path).unwrap_or(raw);
    paths.push(PathBuf::from(path));
}

/// Decode `%XX` escapes in a `file://` URI path.
fn decode_uri_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
