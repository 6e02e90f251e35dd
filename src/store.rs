mod schema;

pub use schema::Database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A book downloaded for offline reading.
///
/// Created when a download starts; mutated only by re-download;
/// deleting it cascades to its chapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineBook {
    /// Server-assigned book ID.
    pub id: String,
    /// English title.
    pub title_en: String,
    /// Sinhala title.
    pub title_si: Option<String>,
    /// Authors (JSON array).
    pub authors_json: Option<String>,
    /// Remote cover URL.
    pub cover_url: Option<String>,
    /// Cached cover image bytes (best-effort).
    pub cover_data: Option<Vec<u8>>,
    /// Total chapters the book has on the server.
    pub total_chapters: u32,
    /// Download timestamp.
    pub downloaded_at: i64,
    /// Last successful progress sync for this book.
    pub last_synced_at: Option<i64>,
}

/// A fully downloaded chapter.
///
/// Keyed by `(book_id, chapter_number)`. A chapter row either fully
/// exists or not at all; partial content is never written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineChapter {
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
    /// Denormalized chapter content.
    pub content: String,
    /// Word count.
    pub word_count: i64,
    /// Reading time estimate in minutes.
    pub reading_time_minutes: i64,
    /// Download timestamp.
    pub downloaded_at: i64,
}

/// Locally tracked reading progress, keyed by book ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Book ID.
    pub book_id: String,
    /// Current chapter ID, if known.
    pub chapter_id: Option<String>,
    /// Current chapter number.
    pub current_chapter: u32,
    /// Scroll position within the chapter (0.0 - 100.0).
    pub scroll_position: f64,
    /// Completed chapter numbers. Only grows from the client's
    /// perspective; saves merge rather than replace this set.
    pub completed_chapters: Vec<u32>,
    /// Last read timestamp.
    pub last_read_at: i64,
    /// Whether the server has acknowledged this state.
    pub synced: bool,
    /// Client-side update timestamp (last-write-wins ordering).
    pub client_updated_at: i64,
}

impl ProgressRecord {
    /// New unsynced record at the start of a chapter.
    pub fn new(book_id: &str, chapter_number: u32) -> Self {
        let now = now_timestamp();
        Self {
            book_id: book_id.to_string(),
            chapter_id: None,
            current_chapter: chapter_number,
            scroll_position: 0.0,
            completed_chapters: Vec::new(),
            last_read_at: now,
            synced: false,
            client_updated_at: now,
        }
    }

    /// Whether the given chapter is marked complete.
    pub fn is_chapter_complete(&self, chapter_number: u32) -> bool {
        self.completed_chapters.contains(&chapter_number)
    }
}

/// Kind of a queued sync item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncItemKind {
    /// Reading progress payload.
    Progress,
    /// Purchase confirmation payload.
    Purchase,
}

impl SyncItemKind {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncItemKind::Progress => "progress",
            SyncItemKind::Purchase => "purchase",
        }
    }

    /// Parse from the database string form.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "progress" => Some(SyncItemKind::Progress),
            "purchase" => Some(SyncItemKind::Purchase),
            _ => None,
        }
    }
}

/// A mutation that could not be delivered inline and awaits retry.
///
/// Deleted on success, or dropped once `attempts` reaches the cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSyncItem {
    /// Auto-incrementing queue ID.
    pub id: i64,
    /// Item kind.
    pub kind: SyncItemKind,
    /// Arbitrary JSON payload delivered to the server.
    pub payload: serde_json::Value,
    /// Creation timestamp.
    pub created_at: i64,
    /// Failed delivery attempts so far.
    pub attempts: u32,
}

/// A locally saved content draft for the admin editor.
///
/// `chapter_id` is either a real server identifier or a
/// client-generated temporary one; `pending_create` is true iff the
/// identifier is temporary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminDraft {
    /// Chapter ID (server-assigned or temporary).
    pub chapter_id: String,
    /// Owning book ID.
    pub book_id: String,
    /// Chapter number.
    pub chapter_number: u32,
    /// English title.
    pub title_en: String,
    /// Sinhala title.
    pub title_si: Option<String>,
    /// Draft content.
    pub content: String,
    /// Last edit timestamp.
    pub updated_at: i64,
    /// Whether the server has this version.
    pub synced: bool,
    /// Whether the chapter has no server identity yet.
    pub pending_create: bool,
}

/// Freeform key/value setting cached offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    /// Setting key.
    pub key: String,
    /// Setting value.
    pub value: String,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
