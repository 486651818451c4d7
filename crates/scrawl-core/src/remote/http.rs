//! JSON-over-HTTP client for the Scrawl API.

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::normalize_api_base_url;
use crate::error::Result;
use crate::models::{NoteId, OwnerId, RemoteNote};
use crate::session::Session;
use crate::util::compact_text;

use super::{RemoteError, RemoteNoteService, RemoteResult};

/// Remote note service reached over HTTP with a bearer token.
#[derive(Clone)]
pub struct HttpRemoteNoteService {
    base_url: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteNoteService {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteNoteService")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpRemoteNoteService {
    /// Build a client for `base_url` using the session's access token.
    ///
    /// Per-call deadlines are enforced by the sync engine, not here.
    pub fn new(base_url: &str, session: &Session) -> Result<Self> {
        let base_url = normalize_api_base_url(base_url)?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| crate::Error::InvalidInput(format!("HTTP client: {error}")))?;
        Ok(Self {
            base_url,
            access_token: session.access_token.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn notes_url(&self) -> String {
        format!("{}/v1/notes", self.base_url)
    }

    fn note_url(&self, id: &NoteId) -> String {
        format!("{}/v1/notes/{id}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(reqwest::header::ACCEPT, "application/json");
        match self.access_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|error| RemoteError::Transient(format!("request failed: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| RemoteError::Transient(format!("failed to read response: {error}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|error| RemoteError::Rejected(format!("invalid response payload: {error}")))
    }
}

impl RemoteNoteService for HttpRemoteNoteService {
    async fn create_remote_note(&self, note: &RemoteNote) -> RemoteResult<RemoteNote> {
        self.execute(self.client.post(self.notes_url()).json(note))
            .await
    }

    async fn update_remote_note(
        &self,
        id: &NoteId,
        payload: &RemoteNote,
        expected_version: i64,
    ) -> RemoteResult<RemoteNote> {
        let request = self
            .client
            .put(self.note_url(id))
            .query(&[("expected_version", expected_version)])
            .json(payload);
        self.execute(request).await
    }

    async fn delete_remote_note(
        &self,
        id: &NoteId,
        expected_version: i64,
    ) -> RemoteResult<RemoteNote> {
        let request = self
            .client
            .delete(self.note_url(id))
            .query(&[("expected_version", expected_version)]);
        self.execute(request).await
    }

    async fn list_remote_notes_since(
        &self,
        owner_id: &OwnerId,
        checkpoint: u64,
    ) -> RemoteResult<Vec<RemoteNote>> {
        let since = checkpoint.to_string();
        let request = self
            .client
            .get(self.notes_url())
            .query(&[("owner", owner_id.as_str()), ("since", since.as_str())]);
        self.execute(request).await
    }
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    current: Option<RemoteNote>,
}

fn classify_error(status: StatusCode, body: &str) -> RemoteError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();

    if status == StatusCode::NOT_FOUND {
        return RemoteError::NotFound;
    }

    if status == StatusCode::CONFLICT {
        if let Some(ApiErrorBody {
            code,
            current: Some(current),
            ..
        }) = parsed
        {
            return if code.as_deref() == Some("already_exists") {
                RemoteError::AlreadyExists(Box::new(current))
            } else {
                RemoteError::VersionMismatch(Box::new(current))
            };
        }
        return RemoteError::Rejected(format!("conflict without current note ({})", status.as_u16()));
    }

    let message = parsed
        .and_then(|payload| payload.error)
        .map_or_else(
            || {
                let trimmed = compact_text(body);
                if trimmed.is_empty() {
                    format!("HTTP {}", status.as_u16())
                } else {
                    format!("{trimmed} ({})", status.as_u16())
                }
            },
            |message| format!("{} ({})", message.trim(), status.as_u16()),
        );

    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        RemoteError::Transient(message)
    } else {
        RemoteError::Rejected(message)
    }
}
