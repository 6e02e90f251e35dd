//! Remote API boundary.
//!
//! The managers talk to the server only through the [`RemoteApi`]
//! trait, so they are testable without a network stack. [`HttpApi`]
//! is the production implementation over the reading app's REST API.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Chapter JSON as served by `GET /api/books/{id}/chapters/{n}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterPayload {
    /// Server-assigned chapter ID.
    pub id: String,
    /// Owning book ID.
    pub book_id: String,
    /// Chapter number (1-based).
    pub chapter_number: u32,
    /// English title.
    pub title_en: String,
    /// Sinhala title.
    pub title_si: Option<String>,
    /// Chapter content.
    pub content: String,
    /// Word count.
    #[serde(default)]
    pub word_count: i64,
    /// Reading time estimate in minutes.
    #[serde(default)]
    pub reading_time_minutes: i64,
}

/// Progress payload for `POST /api/progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpload {
    /// Book ID.
    pub book_id: String,
    /// Current chapter ID, if known.
    pub chapter_id: Option<String>,
    /// Scroll position within the chapter (0.0 - 100.0).
    pub scroll_position: f64,
    /// Whether this save marks the chapter complete.
    pub is_chapter_complete: bool,
    /// Completed chapter numbers.
    pub completed_chapters: Vec<u32>,
}

/// Server-side progress as returned by `GET /api/progress?bookId=`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProgress {
    /// Book ID.
    pub book_id: String,
    /// Current chapter ID, if known.
    pub chapter_id: Option<String>,
    /// Scroll position within the chapter.
    pub scroll_position: f64,
    /// Completed chapter numbers.
    #[serde(default)]
    pub completed_chapters: Vec<u32>,
}

/// Draft payload for `POST /api/admin/books/{id}/chapters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftUpload {
    /// Chapter number.
    pub chapter_number: u32,
    /// English title.
    pub title_en: String,
    /// Sinhala title.
    pub title_si: Option<String>,
    /// Draft content as HTML.
    pub content_html: String,
}

/// Draft payload for `PUT /api/admin/chapters/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftUpdate {
    /// Chapter number.
    pub chapter_number: u32,
    /// English title.
    pub title_en: String,
    /// Sinhala title.
    pub title_si: Option<String>,
    /// Draft content.
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ProgressEnvelope {
    progress: Option<RemoteProgress>,
}

#[derive(Debug, Deserialize)]
struct ChapterEnvelope {
    chapter: ChapterPayload,
}

/// Boundary calls the core makes outward.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetch one chapter. A 403-class response maps to
    /// [`AppError::NoAccess`] and means "skip", not "fail".
    async fn fetch_chapter(&self, book_id: &str, chapter_number: u32) -> Result<ChapterPayload>;

    /// Fetch a cover asset. Callers treat failure as best-effort.
    async fn fetch_cover(&self, url: &str) -> Result<Vec<u8>>;

    /// Push a progress record to the server.
    async fn push_progress(&self, upload: &ProgressUpload) -> Result<()>;

    /// Fetch server-side progress for a book.
    async fn fetch_progress(&self, book_id: &str) -> Result<Option<RemoteProgress>>;

    /// Create a chapter draft on the server, returning the
    /// server-assigned chapter.
    async fn create_chapter(&self, book_id: &str, draft: &DraftUpload) -> Result<ChapterPayload>;

    /// Update an existing chapter draft on the server.
    async fn update_chapter(&self, chapter_id: &str, draft: &DraftUpdate) -> Result<()>;

    /// Push a queued purchase confirmation.
    async fn push_purchase(&self, payload: &serde_json::Value) -> Result<()>;
}

/// HTTP implementation of [`RemoteApi`].
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    /// Create a client for the given API base URL.
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Map an error status to the application taxonomy.
    fn check_status(status: StatusCode, context: &str) -> Result<()> {
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(AppError::Unauthorized),
            StatusCode::FORBIDDEN => Err(AppError::NoAccess(context.to_string())),
            StatusCode::NOT_FOUND => Err(AppError::NotFound(context.to_string())),
            s => Err(AppError::Internal(format!(
                "Server returned {} for {}",
                s, context
            ))),
        }
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn fetch_chapter(&self, book_id: &str, chapter_number: u32) -> Result<ChapterPayload> {
        let path = format!("/api/books/{}/chapters/{}", book_id, chapter_number);
        let resp = self.request(reqwest::Method::GET, &path).send().await?;
        Self::check_status(resp.status(), &path)?;
        Ok(resp.json().await?)
    }

    async fn fetch_cover(&self, url: &str) -> Result<Vec<u8>> {
        // Cover URLs may be absolute (CDN) or relative to the API.
        let resp = if url.starts_with("http") {
            self.client.get(url).send().await?
        } else {
            self.request(reqwest::Method::GET, url).send().await?
        };
        Self::check_status(resp.status(), url)?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn push_progress(&self, upload: &ProgressUpload) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, "/api/progress")
            .json(upload)
            .send()
            .await?;
        Self::check_status(resp.status(), "/api/progress")
    }

    async fn fetch_progress(&self, book_id: &str) -> Result<Option<RemoteProgress>> {
        let path = format!("/api/progress?bookId={}", book_id);
        let resp = self.request(reqwest::Method::GET, &path).send().await?;
        Self::check_status(resp.status(), &path)?;
        let envelope: ProgressEnvelope = resp.json().await?;
        Ok(envelope.progress)
    }

    async fn create_chapter(&self, book_id: &str, draft: &DraftUpload) -> Result<ChapterPayload> {
        let path = format!("/api/admin/books/{}/chapters", book_id);
        let resp = self
            .request(reqwest::Method::POST, &path)
            .json(draft)
            .send()
            .await?;
        Self::check_status(resp.status(), &path)?;
        let envelope: ChapterEnvelope = resp.json().await?;
        Ok(envelope.chapter)
    }

    async fn update_chapter(&self, chapter_id: &str, draft: &DraftUpdate) -> Result<()> {
        let path = format!("/api/admin/chapters/{}", chapter_id);
        let resp = self
            .request(reqwest::Method::PUT, &path)
            .json(draft)
            .send()
            .await?;
        Self::check_status(resp.status(), &path)
    }

    async fn push_purchase(&self, payload: &serde_json::Value) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST, "/api/purchases/confirm")
            .json(payload)
            .send()
            .await?;
        Self::check_status(resp.status(), "/api/purchases/confirm")
    }
}
