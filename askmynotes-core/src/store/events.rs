//! Reconciliation outcomes published by the store
//!
//! Every backend request the store spawns ends in exactly one [`SyncEvent`].
//! The store already applied (or deliberately skipped) the matching state
//! change by the time the event is sent, so subscribers only observe.

use std::fmt;

/// Which backend call a request was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Upload,
    Delete,
    Chat,
    Study,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Upload => "upload",
            Operation::Delete => "delete",
            Operation::Chat => "chat",
            Operation::Study => "study",
        }
    }

    /// Whether the request holds the store's loading flag.
    pub fn sets_loading(&self) -> bool {
        matches!(self, Operation::Chat | Operation::Study)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a settled response was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The subject was removed while the request was in flight
    SubjectRemoved,
    /// A newer study request or a selection change replaced this one
    Superseded,
}

/// Outcome of one spawned backend request
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The backend accepted the request and its result was applied
    Settled {
        subject_id: String,
        operation: Operation,
    },
    /// The request failed; local state was not rolled back
    Failed {
        subject_id: String,
        operation: Operation,
        /// File name for uploads and deletes
        target: Option<String>,
        error: String,
        /// Network trouble or a 5xx, worth retrying by hand
        transient: bool,
    },
    /// The response (if any) was discarded without touching state
    Dropped {
        subject_id: String,
        operation: Operation,
        reason: DropReason,
    },
}

impl SyncEvent {
    pub fn subject_id(&self) -> &str {
        match self {
            SyncEvent::Settled { subject_id, .. }
            | SyncEvent::Failed { subject_id, .. }
            | SyncEvent::Dropped { subject_id, .. } => subject_id,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            SyncEvent::Settled { operation, .. }
            | SyncEvent::Failed { operation, .. }
            | SyncEvent::Dropped { operation, .. } => *operation,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncEvent::Failed { .. })
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Settled { operation, .. } => write!(f, "{} done", operation),
            SyncEvent::Failed {
                operation,
                target: Some(target),
                error,
                ..
            } => write!(f, "{} of {} failed: {}", operation, target, error),
            SyncEvent::Failed {
                operation, error, ..
            } => write!(f, "{} failed: {}", operation, error),
            SyncEvent::Dropped {
                operation, reason, ..
            } => match reason {
                DropReason::SubjectRemoved => {
                    write!(f, "{} dropped: subject removed", operation)
                }
                DropReason::Superseded => write!(f, "{} dropped: superseded", operation),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_loading() {
        assert!(Operation::Chat.sets_loading());
        assert!(Operation::Study.sets_loading());
        assert!(!Operation::Upload.sets_loading());
        assert!(!Operation::Delete.sets_loading());
    }

    #[test]
    fn test_display_failed_with_target() {
        let event = SyncEvent::Failed {
            subject_id: "s1".to_string(),
            operation: Operation::Upload,
            target: Some("notes.pdf".to_string()),
            error: "API error (500): boom".to_string(),
            transient: true,
        };
        assert_eq!(
            event.to_string(),
            "upload of notes.pdf failed: API error (500): boom"
        );
        assert!(event.is_failure());
        assert_eq!(event.subject_id(), "s1");
    }
}
