//! Request and response shapes for the notes backend

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Citation, Confidence, Role};

/// Response body of `POST /chat`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    pub content: String,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub citations: Option<Vec<Citation>>,
}

impl ChatReply {
    /// Turn the reply into the assistant message appended to the subject.
    pub fn into_message(self) -> ChatMessage {
        ChatMessage::assistant(self.content, self.confidence, self.citations)
    }
}

/// One prior turn, sent as context with a chat request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl From<&ChatMessage> for HistoryEntry {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

/// Everything `POST /chat` needs
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub subject_id: String,
    pub subject_name: String,
    pub message: String,
    /// Earlier turns, oldest first, not including `message`
    pub history: Vec<HistoryEntry>,
}

/// Everything `POST /study` needs
#[derive(Debug, Clone)]
pub struct StudyRequest {
    pub subject_id: String,
    pub subject_name: String,
    pub topic: String,
}

/// Form body of `POST /chat`
#[derive(Serialize)]
pub(super) struct ChatForm<'a> {
    pub subject_id: &'a str,
    pub subject_name: &'a str,
    pub message: &'a str,
    pub conversation_history: String,
}

/// Form body of `POST /study`
#[derive(Serialize)]
pub(super) struct StudyForm<'a> {
    pub subject_id: &'a str,
    pub subject_name: &'a str,
    pub topic: &'a str,
}

/// Form body of `DELETE /file`
#[derive(Serialize)]
pub(super) struct DeleteFileForm<'a> {
    pub subject_id: &'a str,
    pub file_name: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_reply_minimal() {
        let reply: ChatReply =
            serde_json::from_str(r#"{"content": "Real AI integration requires API key setup."}"#)
                .unwrap();
        assert!(reply.confidence.is_none());
        assert!(reply.citations.is_none());

        let msg = reply.into_message();
        assert_eq!(msg.role, Role::Assistant);
        assert!(!msg.not_found);
    }

    #[test]
    fn test_chat_reply_with_citations() {
        let reply: ChatReply = serde_json::from_str(
            r#"{
                "content": "Not found in your notes for DSA",
                "confidence": "Low",
                "citations": []
            }"#,
        )
        .unwrap();
        assert_eq!(reply.confidence, Some(Confidence::Low));
        assert_eq!(reply.citations, Some(vec![]));
    }

    #[test]
    fn test_history_entry_serializes_role() {
        let entry = HistoryEntry::from(&ChatMessage::user("what is a stack"));
        let json = serde_json::to_string(&[entry]).unwrap();
        assert_eq!(json, r#"[{"role":"user","content":"what is a stack"}]"#);
    }
}
