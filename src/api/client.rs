/// HTTP client for the remote note service.
///
/// Every operation validates nothing beyond types (business validation is the
/// service's job) and returns a classified [`ApiError`] instead of raising:
/// the resilient facade upstream decides what a failure means, this layer only
/// names it and logs it.
use std::time::Duration;

use log::{debug, error, warn};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::graph::{GraphPayload, GraphView};
use crate::models::{Note, NoteDraft, NoteId, NotePatch, OwnerId};

/// Liveness paths tried in order by [`NoteBackend::probe_health`]. The first
/// response with a status below 500 marks the service healthy.
const HEALTH_PATHS: [&str; 4] = ["/health", "/api/health", "/api/docs", "/"];

/// Per-attempt timeout for health probes. Probes run before externally
/// visible operations, so they must stay cheap.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Classified failures from the note service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection-level failures: refused, DNS, reset.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The request or connect timeout elapsed.
    #[error("request timed out")]
    Timeout(#[source] reqwest::Error),

    /// Non-success HTTP status outside the dedicated variants below.
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// Response body did not parse as the expected shape.
    #[error("response decode error: {0}")]
    Decode(String),

    /// The service rejected the request, e.g. a link between notes the
    /// caller does not own.
    #[error("request rejected by the note service")]
    Validation,

    /// The addressed note does not exist under this owner.
    #[error("not found")]
    NotFound,

    /// Anything reqwest reports that is none of the above.
    #[error("unexpected request error: {0}")]
    Unexpected(#[source] reqwest::Error),

    /// Invalid base URL at build time.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err)
        } else if err.is_connect() {
            ApiError::Transport(err)
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Unexpected(err)
        }
    }

    fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            404 => ApiError::NotFound,
            400 => ApiError::Validation,
            s => ApiError::Http { status: s },
        }
    }
}

/// Typed operations against the remote note service.
///
/// The resilient facade holds a `Box<dyn NoteBackend>`, which keeps tests
/// free of the network: a mock implementation stands in for the HTTP client.
pub trait NoteBackend: Send + Sync {
    /// Creates a note; the service assigns the ID.
    fn create_note(&self, draft: &NoteDraft) -> Result<Note, ApiError>;

    /// Lists all notes for one owner, newest first.
    fn list_notes(&self, owner: OwnerId) -> Result<Vec<Note>, ApiError>;

    /// Server-side substring search. The facade normally searches locally;
    /// this stays available for callers that want the service's own matching.
    fn search_notes(&self, owner: OwnerId, query: &str) -> Result<Vec<Note>, ApiError>;

    /// Fetches a single note by ID, scoped to its owner.
    fn get_note(&self, id: NoteId, owner: OwnerId) -> Result<Note, ApiError>;

    /// Applies a partial update to an existing note.
    fn update_note(&self, id: NoteId, owner: OwnerId, patch: &NotePatch) -> Result<(), ApiError>;

    /// Deletes a note; [`ApiError::NotFound`] when nothing matched.
    fn delete_note(&self, id: NoteId, owner: OwnerId) -> Result<(), ApiError>;

    /// Creates a directed link. Both notes must exist under the owner, or
    /// the service answers with a validation failure.
    fn create_link(&self, from: NoteId, to: NoteId, owner: OwnerId) -> Result<(), ApiError>;

    /// Fetches the owner's graph, normalized into the canonical view.
    fn fetch_graph(&self, owner: OwnerId) -> Result<GraphView, ApiError>;

    /// Best-effort liveness check. Side-effect free and cheap enough to run
    /// before every operation; a `true` is a hint, not a guarantee.
    fn probe_health(&self) -> bool;
}

/// Builder for [`ApiClient`] instances.
///
/// # Examples
///
/// ```
/// use zettelbot::ApiClientBuilder;
///
/// let client = ApiClientBuilder::new()
///     .base_url("http://localhost:8000")
///     .build()
///     .expect("failed to create client");
/// ```
#[derive(Debug, Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    request_timeout: Option<Duration>,
}

impl ApiClientBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the note service base URL (e.g. "http://localhost:8000").
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the per-request timeout. Defaults to 10 seconds; a degraded
    /// remote must never stall the conversation loop longer than this.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Builds the client.
    ///
    /// If `base_url()` was not called, the `ZETTEL_API_URL` environment
    /// variable is consulted, falling back to `http://localhost:8000`.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let base_url = if let Some(url) = self.base_url {
            url
        } else {
            std::env::var("ZETTEL_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string())
        };

        reqwest::Url::parse(&base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.request_timeout.unwrap_or(Duration::from_secs(10)))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(ApiError::Unexpected)?;

        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Synchronous HTTP client implementing [`NoteBackend`].
pub struct ApiClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

/// Create responses carry only the assigned ID; the client materializes the
/// full note from the draft it sent.
#[derive(Debug, Deserialize)]
struct CreateReply {
    id: NoteId,
}

/// Search rows omit `user_id` and `created_at`; the owner comes from the
/// request and the timestamp is marked as unknown (epoch).
#[derive(Debug, Deserialize)]
struct SearchRow {
    id: NoteId,
    title: String,
    content: String,
    #[serde(default)]
    tags: Option<String>,
}

impl ApiClient {
    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn check_status(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_status(status))
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<T, ApiError> {
        response.json().map_err(ApiError::from_request)
    }
}

impl NoteBackend for ApiClient {
    fn create_note(&self, draft: &NoteDraft) -> Result<Note, ApiError> {
        let body = serde_json::json!({
            "user_id": draft.owner,
            "title": draft.title,
            "content": draft.content,
            "tags": draft.tags,
        });

        let result = self
            .client
            .post(self.url("/api/notes"))
            .json(&body)
            .send()
            .map_err(ApiError::from_request)
            .and_then(Self::check_status)
            .and_then(Self::decode::<CreateReply>);

        match result {
            Ok(reply) => {
                debug!("note created remotely: id={} owner={}", reply.id, draft.owner);
                Ok(Note {
                    id: reply.id,
                    owner: draft.owner,
                    title: draft.title.clone(),
                    content: draft.content.clone(),
                    tags: draft.tags.clone(),
                    created_at: OffsetDateTime::now_utc(),
                })
            }
            Err(err) => {
                error!("create_note failed: owner={} error={err}", draft.owner);
                Err(err)
            }
        }
    }

    fn list_notes(&self, owner: OwnerId) -> Result<Vec<Note>, ApiError> {
        self.client
            .get(self.url(&format!("/api/notes/{owner}")))
            .send()
            .map_err(ApiError::from_request)
            .and_then(Self::check_status)
            .and_then(Self::decode::<Vec<Note>>)
            .inspect(|notes| debug!("listed {} notes for owner={owner}", notes.len()))
            .inspect_err(|err| error!("list_notes failed: owner={owner} error={err}"))
    }

    fn search_notes(&self, owner: OwnerId, query: &str) -> Result<Vec<Note>, ApiError> {
        let rows = self
            .client
            .get(self.url(&format!("/api/notes/{owner}/search")))
            .query(&[("q", query)])
            .send()
            .map_err(ApiError::from_request)
            .and_then(Self::check_status)
            .and_then(Self::decode::<Vec<SearchRow>>)
            .inspect_err(|err| error!("search_notes failed: owner={owner} error={err}"))?;

        Ok(rows
            .into_iter()
            .map(|row| Note {
                id: row.id,
                owner,
                title: row.title,
                content: row.content,
                tags: row.tags,
                created_at: OffsetDateTime::UNIX_EPOCH,
            })
            .collect())
    }

    fn get_note(&self, id: NoteId, owner: OwnerId) -> Result<Note, ApiError> {
        self.client
            .get(self.url(&format!("/api/notes/{id}")))
            .query(&[("user_id", owner.get())])
            .send()
            .map_err(ApiError::from_request)
            .and_then(Self::check_status)
            .and_then(Self::decode::<Note>)
            .inspect_err(|err| warn!("get_note failed: id={id} owner={owner} error={err}"))
    }

    fn update_note(&self, id: NoteId, owner: OwnerId, patch: &NotePatch) -> Result<(), ApiError> {
        let mut body = serde_json::json!({ "user_id": owner });
        if let Some(title) = &patch.title {
            body["title"] = serde_json::Value::String(title.clone());
        }
        if let Some(content) = &patch.content {
            body["content"] = serde_json::Value::String(content.clone());
        }
        if let Some(tags) = &patch.tags {
            body["tags"] = serde_json::Value::String(tags.clone());
        }

        self.client
            .put(self.url(&format!("/api/notes/{id}")))
            .json(&body)
            .send()
            .map_err(ApiError::from_request)
            .and_then(Self::check_status)
            .map(|_| ())
            .inspect_err(|err| error!("update_note failed: id={id} owner={owner} error={err}"))
    }

    fn delete_note(&self, id: NoteId, owner: OwnerId) -> Result<(), ApiError> {
        self.client
            .delete(self.url(&format!("/api/notes/{id}")))
            .query(&[("user_id", owner.get())])
            .send()
            .map_err(ApiError::from_request)
            .and_then(Self::check_status)
            .map(|_| ())
            .inspect(|()| debug!("note deleted remotely: id={id} owner={owner}"))
            .inspect_err(|err| error!("delete_note failed: id={id} owner={owner} error={err}"))
    }

    fn create_link(&self, from: NoteId, to: NoteId, owner: OwnerId) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "from_note_id": from,
            "to_note_id": to,
            "user_id": owner,
        });

        self.client
            .post(self.url("/api/links"))
            .json(&body)
            .send()
            .map_err(ApiError::from_request)
            .and_then(Self::check_status)
            .map(|_| ())
            .inspect(|()| debug!("link created: {from}->{to} owner={owner}"))
            .inspect_err(|err| error!("create_link failed: {from}->{to} owner={owner} error={err}"))
    }

    fn fetch_graph(&self, owner: OwnerId) -> Result<GraphView, ApiError> {
        let payload = self
            .client
            .get(self.url(&format!("/api/notes/{owner}/graph")))
            .send()
            .map_err(ApiError::from_request)
            .and_then(Self::check_status)
            .and_then(Self::decode::<GraphPayload>)
            .inspect_err(|err| error!("fetch_graph failed: owner={owner} error={err}"))?;

        payload.into_view().map_err(|msg| {
            error!("fetch_graph payload malformed: owner={owner} error={msg}");
            ApiError::Decode(msg)
        })
    }

    fn probe_health(&self) -> bool {
        for path in HEALTH_PATHS {
            let attempt = self
                .client
                .get(self.url(path))
                .timeout(PROBE_TIMEOUT)
                .send();
            match attempt {
                Ok(response) if response.status().as_u16() < 500 => {
                    debug!("health probe ok: path={path} status={}", response.status());
                    return true;
                }
                Ok(response) => {
                    debug!("health probe server error: path={path} status={}", response.status());
                }
                Err(err) => {
                    debug!("health probe failed: path={path} error={err}");
                }
            }
        }
        warn!("note service unhealthy: no liveness path answered below 500");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::error::Error as _;
    use std::io::{Read as _, Write as _};
    use std::net::TcpListener;

    /// Answers one HTTP request per scripted status on a local port, in
    /// order, then stops listening. Enough of a server for probe tests.
    fn serve_statuses(statuses: &'static [u16]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        std::thread::spawn(move || {
            for &status in statuses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut buf = [0u8; 512];
                let mut request = Vec::new();
                while let Ok(n) = stream.read(&mut buf) {
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let reply = format!(
                    "HTTP/1.1 {status} Scripted\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = stream.write_all(reply.as_bytes());
            }
        });
        base
    }

    fn client_for(base_url: String) -> ApiClient {
        ApiClientBuilder::new().base_url(base_url).build().unwrap()
    }

    #[test]
    fn probe_accepts_the_first_answering_path() {
        // A single scripted response: /health answers 200 and the walk stops.
        let client = client_for(serve_statuses(&[200]));
        assert!(client.probe_health());
    }

    #[test]
    fn probe_falls_through_a_server_error_to_the_next_path() {
        // /health answers 503; /api/health answers 404. Any status below 500
        // means something is alive up there, 404 included.
        let client = client_for(serve_statuses(&[503, 404]));
        assert!(client.probe_health());
    }

    #[test]
    fn probe_reports_unhealthy_when_every_path_answers_5xx() {
        let client = client_for(serve_statuses(&[500, 502, 503, 500]));
        assert!(!client.probe_health());
    }

    #[test]
    fn probe_reports_unhealthy_when_nothing_listens() {
        // Bind and immediately drop to get a port with no listener behind it.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = client_for(format!("http://127.0.0.1:{port}"));
        assert!(!client.probe_health());
    }

    #[test]
    fn transport_error_display_is_classified() {
        // A builder error is the easiest reqwest::Error to conjure offline.
        let reqwest_error = reqwest::blocking::Client::new()
            .get("not-a-valid-url")
            .build()
            .unwrap_err();
        let err = ApiError::Transport(reqwest_error);

        let msg = format!("{err}");
        assert!(msg.contains("transport error"));
        assert!(err.source().is_some());
    }

    #[test]
    fn timeout_error_display() {
        let reqwest_error = reqwest::blocking::Client::new()
            .get("http://")
            .build()
            .unwrap_err();
        let err = ApiError::Timeout(reqwest_error);

        assert_eq!(format!("{err}"), "request timed out");
    }

    #[test]
    fn http_error_carries_status() {
        let err = ApiError::Http { status: 503 };
        assert!(format!("{err}").contains("503"));
    }

    #[test]
    fn status_classification_maps_dedicated_variants() {
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND),
            ApiError::NotFound
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST),
            ApiError::Validation
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Http { status: 500 }
        ));
    }

    #[test]
    fn non_network_reqwest_errors_classify_as_unexpected() {
        let reqwest_error = reqwest::blocking::Client::new()
            .get("not-a-valid-url")
            .build()
            .unwrap_err();

        assert!(matches!(
            ApiError::from_request(reqwest_error),
            ApiError::Unexpected(_)
        ));
    }

    #[test]
    fn builder_rejects_invalid_url() {
        let result = ApiClientBuilder::new().base_url("not-a-valid-url").build();
        assert!(matches!(result, Err(ApiError::InvalidUrl(_))));
    }

    #[test]
    fn builder_strips_trailing_slash() {
        let client = ApiClientBuilder::new()
            .base_url("http://localhost:8000/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    #[serial]
    fn builder_uses_default_url_without_env_var() {
        unsafe {
            std::env::remove_var("ZETTEL_API_URL");
        }

        let client = ApiClientBuilder::new().build().unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    #[serial]
    fn builder_reads_env_var_but_explicit_url_wins() {
        unsafe {
            std::env::set_var("ZETTEL_API_URL", "http://env-host:8000");
        }

        let from_env = ApiClientBuilder::new().build().unwrap();
        assert_eq!(from_env.base_url(), "http://env-host:8000");

        let explicit = ApiClientBuilder::new()
            .base_url("http://explicit-host:8000")
            .build()
            .unwrap();
        assert_eq!(explicit.base_url(), "http://explicit-host:8000");

        unsafe {
            std::env::remove_var("ZETTEL_API_URL");
        }
    }

    #[test]
    fn health_paths_start_specific_and_end_at_root() {
        // Probe order matters: first sub-500 answer wins.
        assert_eq!(HEALTH_PATHS.first(), Some(&"/health"));
        assert_eq!(HEALTH_PATHS.last(), Some(&"/"));
    }

    #[test]
    fn search_rows_upgrade_to_notes_with_requested_owner() {
        let rows: Vec<SearchRow> =
            serde_json::from_str(r#"[{"id": 4, "title": "T", "content": "C"}]"#).unwrap();
        let owner = OwnerId::new(9);

        let note = Note {
            id: rows[0].id,
            owner,
            title: rows[0].title.clone(),
            content: rows[0].content.clone(),
            tags: rows[0].tags.clone(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };

        assert_eq!(note.owner, owner);
        assert_eq!(note.tags, None);
    }
}
