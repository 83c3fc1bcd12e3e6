//! HTTP client for the notes backend
//!
//! All requests are form-encoded (multipart for uploads). Responses to the
//! mirroring calls are acknowledged by status only.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::types::{FilePayload, StudyMaterial};

use super::wire::{ChatForm, ChatReply, ChatRequest, DeleteFileForm, StudyForm, StudyRequest};
use super::Backend;

/// HTTP client for the notes backend
#[derive(Clone)]
pub struct BackendClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a new backend client from configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config.base_url.trim().trim_end_matches('/').to_string();

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a non-2xx response into [`Error::Api`]
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}

/// Read a successful response body as JSON.
///
/// A body that does not parse is [`Error::Json`], never a transport error.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = ensure_success(response).await?.text().await?;
    parse_body(&body)
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        tracing::warn!(error = %e, "Backend returned an unreadable body");
        Error::Json(e)
    })
}

#[async_trait]
impl Backend for BackendClient {
    async fn upload(&self, subject_id: &str, file: &FilePayload) -> Result<()> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(file.kind.mime_type())?;
        let form = Form::new()
            .text("subject_id", subject_id.to_string())
            .part("files", part);

        let response = self
            .http_client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await?;
        ensure_success(response).await?;

        tracing::debug!(subject_id, file = %file.name, "Upload acknowledged");
        Ok(())
    }

    async fn delete_file(&self, subject_id: &str, file_name: &str) -> Result<()> {
        let form = DeleteFileForm {
            subject_id,
            file_name,
        };

        let response = self
            .http_client
            .delete(self.url("/file"))
            .form(&form)
            .send()
            .await?;
        ensure_success(response).await?;

        tracing::debug!(subject_id, file_name, "Delete acknowledged");
        Ok(())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        let form = ChatForm {
            subject_id: &request.subject_id,
            subject_name: &request.subject_name,
            message: &request.message,
            conversation_history: serde_json::to_string(&request.history)?,
        };

        let response = self
            .http_client
            .post(self.url("/chat"))
            .form(&form)
            .send()
            .await?;
        read_json::<ChatReply>(response).await
    }

    async fn study(&self, request: &StudyRequest) -> Result<StudyMaterial> {
        let form = StudyForm {
            subject_id: &request.subject_id,
            subject_name: &request.subject_name,
            topic: &request.topic,
        };

        let response = self
            .http_client
            .post(self.url("/study"))
            .form(&form)
            .send()
            .await?;
        read_json::<StudyMaterial>(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_rejects_invalid_config() {
        let config = BackendConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(BackendClient::new(&config).is_err());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let config = BackendConfig {
            base_url: "http://localhost:8000/".to_string(),
            timeout_secs: Some(10),
        };
        let client = BackendClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/chat"), "http://localhost:8000/chat");
    }

    #[test]
    fn test_malformed_body_is_not_transient() {
        let err = parse_body::<ChatReply>("<html>502 from proxy</html>").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert!(!err.is_transient());

        let err = parse_body::<StudyMaterial>(r#"{"topic": "Heaps"}"#).unwrap_err();
        assert!(!err.is_transient());

        let reply: ChatReply = parse_body(r#"{"content": "From your notes"}"#).unwrap();
        assert_eq!(reply.content, "From your notes");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transient_error() {
        // Port 9 (discard) is closed on any sane test host.
        let config = BackendConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: Some(5),
        };
        let client = BackendClient::new(&config).unwrap();
        let err = client.delete_file("s1", "notes.pdf").await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
        assert!(err.is_transient());
    }
}
