use crate::error::{AppError, Result};
use crate::store::*;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;

/// Current schema version (PRAGMA user_version).
const SCHEMA_VERSION: i64 = 2;

/// Database wrapper for thread-safe access.
///
/// All writes go through one connection behind a mutex, which
/// serializes mutations to the same record.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Storage(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Storage(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Open a database frozen at schema version 1 (for migration tests).
    #[cfg(test)]
    pub(crate) fn open_v1(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| AppError::Storage(format!("Failed to open database: {}", e)))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| AppError::Storage(format!("Failed to enable foreign keys: {}", e)))?;
        Self::migrate_v1(&conn)?;
        conn.execute_batch("PRAGMA user_version = 1")
            .map_err(|e| AppError::Storage(format!("Failed to set schema version: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Apply additive migrations up to `SCHEMA_VERSION`.
    ///
    /// Opening a store at a higher version creates any new tables and
    /// indexes without touching existing data. There is no destructive
    /// path: downgrades are not supported.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| AppError::Storage(format!("Failed to enable foreign keys: {}", e)))?;

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|e| AppError::Storage(format!("Failed to read schema version: {}", e)))?;

        if version < 1 {
            Self::migrate_v1(&conn)?;
        }
        if version < 2 {
            Self::migrate_v2(&conn)?;
        }

        if version < SCHEMA_VERSION {
            conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
                .map_err(|e| AppError::Storage(format!("Failed to set schema version: {}", e)))?;
        }

        Ok(())
    }

    /// Version 1: core offline collections.
    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Offline books table
            CREATE TABLE IF NOT EXISTS offline_books (
                id TEXT PRIMARY KEY,
                title_en TEXT NOT NULL,
                title_si TEXT,
                authors_json TEXT,
                cover_url TEXT,
                cover_data BLOB,
                total_chapters INTEGER NOT NULL,
                downloaded_at INTEGER NOT NULL,
                last_synced_at INTEGER
            );

            -- Offline chapters table (composite key)
            CREATE TABLE IF NOT EXISTS offline_chapters (
                book_id TEXT NOT NULL,
                chapter_number INTEGER NOT NULL,
                id TEXT NOT NULL,
                title_en TEXT NOT NULL,
                title_si TEXT,
                content TEXT NOT NULL,
                word_count INTEGER NOT NULL DEFAULT 0,
                reading_time_minutes INTEGER NOT NULL DEFAULT 0,
                downloaded_at INTEGER NOT NULL,
                PRIMARY KEY (book_id, chapter_number),
                FOREIGN KEY (book_id) REFERENCES offline_books(id) ON DELETE CASCADE
            );

            -- Reading progress table (one row per book)
            CREATE TABLE IF NOT EXISTS reading_progress (
                book_id TEXT PRIMARY KEY,
                chapter_id TEXT,
                current_chapter INTEGER NOT NULL,
                scroll_position REAL NOT NULL DEFAULT 0,
                completed_chapters_json TEXT NOT NULL DEFAULT '[]',
                last_read_at INTEGER NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0,
                client_updated_at INTEGER NOT NULL
            );

            -- Pending sync queue
            CREATE TABLE IF NOT EXISTS pending_sync (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0
            );

            -- Admin content drafts
            CREATE TABLE IF NOT EXISTS admin_drafts (
                chapter_id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL,
                chapter_number INTEGER NOT NULL,
                title_en TEXT NOT NULL,
                title_si TEXT,
                content TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0,
                pending_create INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .map_err(|e| AppError::Storage(format!("Failed to apply schema v1: {}", e)))?;

        Ok(())
    }

    /// Version 2: settings collection and secondary indexes.
    fn migrate_v2(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Reader preferences cached offline
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_chapters_book ON offline_chapters(book_id);
            CREATE INDEX IF NOT EXISTS idx_progress_synced ON reading_progress(synced);
            CREATE INDEX IF NOT EXISTS idx_drafts_synced ON admin_drafts(synced);
            CREATE INDEX IF NOT EXISTS idx_drafts_book ON admin_drafts(book_id);
            "#,
        )
        .map_err(|e| AppError::Storage(format!("Failed to apply schema v2: {}", e)))?;

        Ok(())
    }

    // ========== BOOK OPERATIONS ==========

    /// Save or update an offline book.
    pub fn save_book(&self, book: &OfflineBook) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO offline_books
             (id, title_en, title_si, authors_json, cover_url, cover_data,
              total_chapters, downloaded_at, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (id) DO UPDATE SET
                title_en = excluded.title_en,
                title_si = excluded.title_si,
                authors_json = excluded.authors_json,
                cover_url = excluded.cover_url,
                cover_data = excluded.cover_data,
                total_chapters = excluded.total_chapters,
                downloaded_at = excluded.downloaded_at,
                last_synced_at = COALESCE(excluded.last_synced_at, offline_books.last_synced_at)",
            params![
                book.id,
                book.title_en,
                book.title_si,
                book.authors_json,
                book.cover_url,
                book.cover_data,
                book.total_chapters,
                book.downloaded_at,
                book.last_synced_at,
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to save book: {}", e)))?;
        Ok(())
    }

    /// Get offline book by ID.
    pub fn get_book(&self, id: &str) -> Result<Option<OfflineBook>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, title_en, title_si, authors_json, cover_url, cover_data,
                    total_chapters, downloaded_at, last_synced_at
             FROM offline_books WHERE id = ?1",
            params![id],
            Self::row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Storage(format!("Failed to get book: {}", e)))
    }

    /// List all offline books.
    pub fn list_books(&self) -> Result<Vec<OfflineBook>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, title_en, title_si, authors_json, cover_url, cover_data,
                        total_chapters, downloaded_at, last_synced_at
                 FROM offline_books ORDER BY downloaded_at DESC",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map([], Self::row_to_book)
            .map_err(|e| AppError::Storage(format!("Failed to list books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to collect books: {}", e)))?;

        Ok(books)
    }

    fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<OfflineBook> {
        Ok(OfflineBook {
            id: row.get(0)?,
            title_en: row.get(1)?,
            title_si: row.get(2)?,
            authors_json: row.get(3)?,
            cover_url: row.get(4)?,
            cover_data: row.get(5)?,
            total_chapters: row.get(6)?,
            downloaded_at: row.get(7)?,
            last_synced_at: row.get(8)?,
        })
    }

    /// Stamp the book's last successful sync time.
    pub fn touch_book_synced(&self, book_id: &str, ts: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE offline_books SET last_synced_at = ?1 WHERE id = ?2",
            params![ts, book_id],
        )
        .map_err(|e| AppError::Storage(format!("Failed to update book sync time: {}", e)))?;
        Ok(())
    }

    /// Delete an offline book. Chapters cascade.
    pub fn delete_book(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM offline_books WHERE id = ?1", params![id])
            .map_err(|e| AppError::Storage(format!("Failed to delete book: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== CHAPTER OPERATIONS ==========

    /// Save a fully fetched chapter. Replaces any existing row for the
    /// same `(book_id, chapter_number)` in one statement, so a chapter
    /// is never observable half-written.
    pub fn save_chapter(&self, chapter: &OfflineChapter) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO offline_chapters
             (book_id, chapter_number, id, title_en, title_si, content,
              word_count, reading_time_minutes, downloaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                chapter.book_id,
                chapter.chapter_number,
                chapter.id,
                chapter.title_en,
                chapter.title_si,
                chapter.content,
                chapter.word_count,
                chapter.reading_time_minutes,
                chapter.downloaded_at,
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to save chapter: {}", e)))?;
        Ok(())
    }

    /// Get a chapter by composite key.
    pub fn get_chapter(&self, book_id: &str, chapter_number: u32) -> Result<Option<OfflineChapter>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT book_id, chapter_number, id, title_en, title_si, content,
                    word_count, reading_time_minutes, downloaded_at
             FROM offline_chapters WHERE book_id = ?1 AND chapter_number = ?2",
            params![book_id, chapter_number],
            Self::row_to_chapter,
        )
        .optional()
        .map_err(|e| AppError::Storage(format!("Failed to get chapter: {}", e)))
    }

    /// List chapters of a book in reading order.
    pub fn list_chapters(&self, book_id: &str) -> Result<Vec<OfflineChapter>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT book_id, chapter_number, id, title_en, title_si, content,
                        word_count, reading_time_minutes, downloaded_at
                 FROM offline_chapters WHERE book_id = ?1
                 ORDER BY chapter_number",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let chapters = stmt
            .query_map(params![book_id], Self::row_to_chapter)
            .map_err(|e| AppError::Storage(format!("Failed to list chapters: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to collect chapters: {}", e)))?;

        Ok(chapters)
    }

    fn row_to_chapter(row: &rusqlite::Row<'_>) -> rusqlite::Result<OfflineChapter> {
        Ok(OfflineChapter {
            book_id: row.get(0)?,
            chapter_number: row.get(1)?,
            id: row.get(2)?,
            title_en: row.get(3)?,
            title_si: row.get(4)?,
            content: row.get(5)?,
            word_count: row.get(6)?,
            reading_time_minutes: row.get(7)?,
            downloaded_at: row.get(8)?,
        })
    }

    /// Count fully downloaded chapters of a book.
    pub fn count_chapters(&self, book_id: &str) -> Result<u32> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM offline_chapters WHERE book_id = ?1",
            params![book_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Storage(format!("Failed to count chapters: {}", e)))
    }

    // ========== PROGRESS OPERATIONS ==========

    /// Save reading progress for a book.
    ///
    /// Full replacement per field (last-write-wins), except
    /// `completed_chapters` which merges with the stored set so the
    /// set only grows.
    pub fn save_progress(&self, progress: &ProgressRecord) -> Result<()> {
        let conn = self.conn.lock();

        let existing: Option<String> = conn
            .query_row(
                "SELECT completed_chapters_json FROM reading_progress WHERE book_id = ?1",
                params![progress.book_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Storage(format!("Failed to read progress: {}", e)))?;

        let mut completed: Vec<u32> = existing
            .and_then(|j| serde_json::from_str(&j).ok())
            .unwrap_or_default();
        for n in &progress.completed_chapters {
            if !completed.contains(n) {
                completed.push(*n);
            }
        }
        completed.sort_unstable();
        let completed_json = serde_json::to_string(&completed)?;

        conn.execute(
            "INSERT INTO reading_progress
             (book_id, chapter_id, current_chapter, scroll_position,
              completed_chapters_json, last_read_at, synced, client_updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (book_id) DO UPDATE SET
                chapter_id = excluded.chapter_id,
                current_chapter = excluded.current_chapter,
                scroll_position = excluded.scroll_position,
                completed_chapters_json = excluded.completed_chapters_json,
                last_read_at = excluded.last_read_at,
                synced = excluded.synced,
                client_updated_at = excluded.client_updated_at",
            params![
                progress.book_id,
                progress.chapter_id,
                progress.current_chapter,
                progress.scroll_position,
                completed_json,
                progress.last_read_at,
                progress.synced,
                progress.client_updated_at,
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to save progress: {}", e)))?;
        Ok(())
    }

    /// Get reading progress for a book.
    pub fn get_progress(&self, book_id: &str) -> Result<Option<ProgressRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT book_id, chapter_id, current_chapter, scroll_position,
                    completed_chapters_json, last_read_at, synced, client_updated_at
             FROM reading_progress WHERE book_id = ?1",
            params![book_id],
            Self::row_to_progress,
        )
        .optional()
        .map_err(|e| AppError::Storage(format!("Failed to get progress: {}", e)))
    }

    /// Get all progress records not yet acknowledged by the server,
    /// oldest edits first.
    pub fn get_unsynced_progress(&self) -> Result<Vec<ProgressRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT book_id, chapter_id, current_chapter, scroll_position,
                        completed_chapters_json, last_read_at, synced, client_updated_at
                 FROM reading_progress WHERE synced = 0
                 ORDER BY client_updated_at",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map([], Self::row_to_progress)
            .map_err(|e| AppError::Storage(format!("Failed to get unsynced progress: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to collect progress: {}", e)))?;

        Ok(records)
    }

    fn row_to_progress(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProgressRecord> {
        let completed_json: String = row.get(4)?;
        Ok(ProgressRecord {
            book_id: row.get(0)?,
            chapter_id: row.get(1)?,
            current_chapter: row.get(2)?,
            scroll_position: row.get(3)?,
            completed_chapters: serde_json::from_str(&completed_json).unwrap_or_default(),
            last_read_at: row.get(5)?,
            synced: row.get(6)?,
            client_updated_at: row.get(7)?,
        })
    }

    /// Flip the synced flag after a confirmed server acknowledgment,
    /// but only if the record was not edited since the push started.
    pub fn mark_progress_synced(&self, book_id: &str, as_of: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE reading_progress SET synced = 1
             WHERE book_id = ?1 AND client_updated_at <= ?2",
            params![book_id, as_of],
        )
        .map_err(|e| AppError::Storage(format!("Failed to mark progress synced: {}", e)))?;
        Ok(())
    }

    /// Count records still awaiting a server acknowledgment.
    pub fn count_unsynced(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let progress: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM reading_progress WHERE synced = 0",
                [],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Storage(format!("Failed to count unsynced: {}", e)))?;
        let pending: i64 = conn
            .query_row("SELECT COUNT(*) FROM pending_sync", [], |row| row.get(0))
            .map_err(|e| AppError::Storage(format!("Failed to count pending: {}", e)))?;
        Ok((progress + pending) as usize)
    }

    // ========== PENDING SYNC QUEUE ==========

    /// Queue a mutation that could not be delivered inline.
    pub fn enqueue_pending(&self, kind: SyncItemKind, payload: &serde_json::Value) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO pending_sync (kind, payload, created_at, attempts)
             VALUES (?1, ?2, ?3, 0)",
            params![kind.as_str(), payload.to_string(), now_timestamp()],
        )
        .map_err(|e| AppError::Storage(format!("Failed to enqueue sync item: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    /// List queued items in insertion order.
    pub fn list_pending(&self) -> Result<Vec<PendingSyncItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, kind, payload, created_at, attempts
                 FROM pending_sync ORDER BY id",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let items = stmt
            .query_map([], |row| {
                let kind: String = row.get(1)?;
                let payload: String = row.get(2)?;
                Ok(PendingSyncItem {
                    id: row.get(0)?,
                    kind: SyncItemKind::from_str(&kind).unwrap_or(SyncItemKind::Progress),
                    payload: serde_json::from_str(&payload)
                        .unwrap_or(serde_json::Value::Null),
                    created_at: row.get(3)?,
                    attempts: row.get(4)?,
                })
            })
            .map_err(|e| AppError::Storage(format!("Failed to list pending items: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to collect pending items: {}", e)))?;

        Ok(items)
    }

    /// Record a failed delivery attempt. Returns the new attempt count.
    pub fn bump_pending_attempts(&self, id: i64) -> Result<u32> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE pending_sync SET attempts = attempts + 1 WHERE id = ?1",
            params![id],
        )
        .map_err(|e| AppError::Storage(format!("Failed to bump attempts: {}", e)))?;

        conn.query_row(
            "SELECT attempts FROM pending_sync WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Storage(format!("Failed to read attempts: {}", e)))
    }

    /// Remove a queued item (delivered, or dropped at the cap).
    pub fn delete_pending(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM pending_sync WHERE id = ?1", params![id])
            .map_err(|e| AppError::Storage(format!("Failed to delete pending item: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== ADMIN DRAFT OPERATIONS ==========

    /// Save or update a draft.
    pub fn save_draft(&self, draft: &AdminDraft) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO admin_drafts
             (chapter_id, book_id, chapter_number, title_en, title_si,
              content, updated_at, synced, pending_create)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (chapter_id) DO UPDATE SET
                book_id = excluded.book_id,
                chapter_number = excluded.chapter_number,
                title_en = excluded.title_en,
                title_si = excluded.title_si,
                content = excluded.content,
                updated_at = excluded.updated_at,
                synced = excluded.synced,
                pending_create = excluded.pending_create",
            params![
                draft.chapter_id,
                draft.book_id,
                draft.chapter_number,
                draft.title_en,
                draft.title_si,
                draft.content,
                draft.updated_at,
                draft.synced,
                draft.pending_create,
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to save draft: {}", e)))?;
        Ok(())
    }

    /// Get a draft by chapter ID (server-assigned or temporary).
    pub fn get_draft(&self, chapter_id: &str) -> Result<Option<AdminDraft>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT chapter_id, book_id, chapter_number, title_en, title_si,
                    content, updated_at, synced, pending_create
             FROM admin_drafts WHERE chapter_id = ?1",
            params![chapter_id],
            Self::row_to_draft,
        )
        .optional()
        .map_err(|e| AppError::Storage(format!("Failed to get draft: {}", e)))
    }

    /// List drafts the server does not have yet, oldest edits first.
    pub fn get_unsynced_drafts(&self) -> Result<Vec<AdminDraft>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT chapter_id, book_id, chapter_number, title_en, title_si,
                        content, updated_at, synced, pending_create
                 FROM admin_drafts WHERE synced = 0
                 ORDER BY updated_at",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let drafts = stmt
            .query_map([], Self::row_to_draft)
            .map_err(|e| AppError::Storage(format!("Failed to list drafts: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to collect drafts: {}", e)))?;

        Ok(drafts)
    }

    fn row_to_draft(row: &rusqlite::Row<'_>) -> rusqlite::Result<AdminDraft> {
        Ok(AdminDraft {
            chapter_id: row.get(0)?,
            book_id: row.get(1)?,
            chapter_number: row.get(2)?,
            title_en: row.get(3)?,
            title_si: row.get(4)?,
            content: row.get(5)?,
            updated_at: row.get(6)?,
            synced: row.get(7)?,
            pending_create: row.get(8)?,
        })
    }

    /// Remap a draft from a temporary chapter ID to its server-assigned
    /// one in a single transaction: an external reader always finds the
    /// draft under exactly one of the two keys.
    pub fn remap_draft_id(&self, old_id: &str, new_id: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Storage(format!("Failed to start transaction: {}", e)))?;

        let draft = tx
            .query_row(
                "SELECT chapter_id, book_id, chapter_number, title_en, title_si,
                        content, updated_at, synced, pending_create
                 FROM admin_drafts WHERE chapter_id = ?1",
                params![old_id],
                Self::row_to_draft,
            )
            .optional()
            .map_err(|e| AppError::Storage(format!("Failed to read draft: {}", e)))?
            .ok_or_else(|| AppError::NotFound(format!("Draft not found: {}", old_id)))?;

        tx.execute(
            "DELETE FROM admin_drafts WHERE chapter_id = ?1",
            params![old_id],
        )
        .map_err(|e| AppError::Storage(format!("Failed to delete old draft: {}", e)))?;

        tx.execute(
            "INSERT INTO admin_drafts
             (chapter_id, book_id, chapter_number, title_en, title_si,
              content, updated_at, synced, pending_create)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 0)",
            params![
                new_id,
                draft.book_id,
                draft.chapter_number,
                draft.title_en,
                draft.title_si,
                draft.content,
                draft.updated_at,
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to insert remapped draft: {}", e)))?;

        tx.commit()
            .map_err(|e| AppError::Storage(format!("Failed to commit remap: {}", e)))?;
        Ok(())
    }

    /// Flip a draft's synced flag after a confirmed server update.
    pub fn mark_draft_synced(&self, chapter_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE admin_drafts SET synced = 1 WHERE chapter_id = ?1",
            params![chapter_id],
        )
        .map_err(|e| AppError::Storage(format!("Failed to mark draft synced: {}", e)))?;
        Ok(())
    }

    /// Delete a draft.
    pub fn delete_draft(&self, chapter_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM admin_drafts WHERE chapter_id = ?1",
                params![chapter_id],
            )
            .map_err(|e| AppError::Storage(format!("Failed to delete draft: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== SETTINGS ==========

    /// Save or update a setting.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![key, value, now_timestamp()],
        )
        .map_err(|e| AppError::Storage(format!("Failed to save setting: {}", e)))?;
        Ok(())
    }

    /// Get a setting value.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| AppError::Storage(format!("Failed to get setting: {}", e)))
    }
}
