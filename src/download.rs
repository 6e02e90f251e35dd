//! Download manager: fetches a book's metadata, cover and chapters
//! into the local store for disconnected reading.

use crate::api::RemoteApi;
use crate::error::{AppError, Result};
use crate::store::{Database, OfflineBook, OfflineChapter, now_timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Download state machine.
///
/// `Error` is only reached for failures that prevent even starting;
/// per-chapter failures are skipped, not fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadPhase {
    /// No download in flight.
    Idle,
    /// Chapters are being fetched.
    Downloading,
    /// All accessible chapters were written.
    Complete,
    /// The caller cancelled mid-flight.
    Cancelled,
    /// The download could not start.
    Error,
}

/// Live progress, emitted after every chapter attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadProgress {
    /// Current state.
    pub phase: DownloadPhase,
    /// Chapter number last attempted.
    pub current_chapter: u32,
    /// Total chapters in the book.
    pub total_chapters: u32,
    /// Percent of chapters attempted (0.0 - 100.0).
    pub percent: f64,
}

impl DownloadProgress {
    fn idle() -> Self {
        Self {
            phase: DownloadPhase::Idle,
            current_chapter: 0,
            total_chapters: 0,
            percent: 0.0,
        }
    }
}

/// Input to a download: what the store front knows about a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDescriptor {
    /// Server-assigned book ID.
    pub id: String,
    /// English title.
    pub title_en: String,
    /// Sinhala title.
    pub title_si: Option<String>,
    /// Authors.
    pub authors: Vec<String>,
    /// Remote cover URL.
    pub cover_url: Option<String>,
    /// Total chapters on the server.
    pub total_chapters: u32,
}

/// Downloaded vs. total chapter counts, recomputed from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadCount {
    /// Chapters fully present in the local store.
    pub downloaded: u32,
    /// Total chapters the book has on the server.
    pub total: u32,
}

/// Orchestrates book downloads against the local store.
pub struct DownloadManager {
    store: Database,
    api: Arc<dyn RemoteApi>,
    progress_tx: watch::Sender<DownloadProgress>,
}

impl DownloadManager {
    /// Create a manager over the given store and API boundary.
    pub fn new(store: Database, api: Arc<dyn RemoteApi>) -> Self {
        let (progress_tx, _) = watch::channel(DownloadProgress::idle());
        Self {
            store,
            api,
            progress_tx,
        }
    }

    /// Subscribe to live download progress. The receiver sees the
    /// current state immediately.
    pub fn subscribe(&self) -> watch::Receiver<DownloadProgress> {
        self.progress_tx.subscribe()
    }

    /// Download a book: cover (best-effort), metadata, then chapters
    /// strictly in ascending order from 1 to `total_chapters`.
    ///
    /// A chapter the user has no access to is skipped and the loop
    /// continues; any other single-chapter failure is logged and
    /// skipped. Cancellation stops issuing new fetches promptly and
    /// leaves the store in a valid partially-downloaded state.
    pub async fn download_book(
        &self,
        descriptor: &BookDescriptor,
        cancel: &CancellationToken,
    ) -> Result<DownloadPhase> {
        let total = descriptor.total_chapters;
        self.emit(DownloadPhase::Downloading, 0, total);

        // Cover is best-effort: failure must not abort the download.
        let cover_data = match &descriptor.cover_url {
            Some(url) => match self.api.fetch_cover(url).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(book = %descriptor.id, error = %e, "Cover fetch failed, continuing without");
                    None
                }
            },
            None => None,
        };

        let book = OfflineBook {
            id: descriptor.id.clone(),
            title_en: descriptor.title_en.clone(),
            title_si: descriptor.title_si.clone(),
            authors_json: Some(serde_json::to_string(&descriptor.authors)?),
            cover_url: descriptor.cover_url.clone(),
            cover_data,
            total_chapters: total,
            downloaded_at: now_timestamp(),
            last_synced_at: None,
        };

        // Failing to write the book record is the one failure that
        // prevents the download from starting at all.
        if let Err(e) = self.store.save_book(&book) {
            tracing::error!(book = %descriptor.id, error = %e, "Cannot write book metadata");
            self.emit(DownloadPhase::Error, 0, total);
            return Err(e);
        }

        for n in 1..=total {
            if cancel.is_cancelled() {
                tracing::info!(book = %descriptor.id, chapter = n, "Download cancelled");
                self.emit(DownloadPhase::Cancelled, n, total);
                return Ok(DownloadPhase::Cancelled);
            }

            let fetched = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(book = %descriptor.id, chapter = n, "Download cancelled mid-fetch");
                    self.emit(DownloadPhase::Cancelled, n, total);
                    return Ok(DownloadPhase::Cancelled);
                }
                result = self.fetch_and_store(&descriptor.id, n) => result,
            };

            match fetched {
                Ok(()) => {}
                Err(AppError::NoAccess(_)) => {
                    // Free-preview books have fewer accessible chapters
                    // than total_chapters.
                    tracing::debug!(book = %descriptor.id, chapter = n, "No access, skipping");
                }
                Err(e) => {
                    tracing::warn!(book = %descriptor.id, chapter = n, error = %e, "Chapter fetch failed, skipping");
                }
            }

            self.emit(DownloadPhase::Downloading, n, total);
        }

        self.emit(DownloadPhase::Complete, total, total);
        tracing::info!(book = %descriptor.id, total = total, "Download complete");
        Ok(DownloadPhase::Complete)
    }

    /// Download a single chapter, e.g. to top up access after a
    /// purchase unlocks new chapters. Same no-partial-write guarantee
    /// as the full download.
    pub async fn download_chapter(&self, book_id: &str, chapter_number: u32) -> Result<()> {
        self.fetch_and_store(book_id, chapter_number).await
    }

    /// Fetch one chapter and write it in a single insert. The row
    /// only appears once the full payload arrived.
    async fn fetch_and_store(&self, book_id: &str, chapter_number: u32) -> Result<()> {
        let payload = self.api.fetch_chapter(book_id, chapter_number).await?;

        let chapter = OfflineChapter {
            id: payload.id,
            book_id: book_id.to_string(),
            chapter_number,
            title_en: payload.title_en,
            title_si: payload.title_si,
            content: payload.content,
            word_count: payload.word_count,
            reading_time_minutes: payload.reading_time_minutes,
            downloaded_at: now_timestamp(),
        };

        self.store.save_chapter(&chapter)
    }

    /// Remove a book and all its chapters from the local store.
    pub fn delete_download(&self, book_id: &str) -> Result<bool> {
        let removed = self.store.delete_book(book_id)?;
        if removed {
            tracing::info!(book = %book_id, "Offline copy removed");
        }
        Ok(removed)
    }

    /// Recompute downloaded vs. total chapter counts from the store.
    /// The store is the source of truth, never a cached counter.
    pub fn check_download_status(&self, book_id: &str) -> Result<DownloadCount> {
        let total = match self.store.get_book(book_id)? {
            Some(book) => book.total_chapters,
            None => return Ok(DownloadCount {
                downloaded: 0,
                total: 0,
            }),
        };

        let downloaded = self.store.count_chapters(book_id)?;
        Ok(DownloadCount { downloaded, total })
    }

    fn emit(&self, phase: DownloadPhase, current_chapter: u32, total_chapters: u32) {
        let percent = if total_chapters == 0 {
            0.0
        } else {
            (current_chapter as f64 / total_chapters as f64) * 100.0
        };
        let _ = self.progress_tx.send(DownloadProgress {
            phase,
            current_chapter,
            total_chapters,
            percent,
        });
    }
}
