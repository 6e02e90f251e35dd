use crate::api::{
    ChapterPayload, DraftUpdate, DraftUpload, ProgressUpload, RemoteApi, RemoteProgress,
};
use crate::config::{Config, SyncConfig};
use crate::connectivity::Connectivity;
use crate::download::{BookDescriptor, DownloadManager, DownloadPhase};
use crate::drafts::{self, AdminDraftManager, DraftData};
use crate::error::{AppError, Result};
use crate::store::{
    AdminDraft, Database, OfflineBook, OfflineChapter, ProgressRecord, SyncItemKind,
    now_timestamp,
};
use crate::sync::{ProgressSave, SyncManager, SyncStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn test_book(id: &str, total_chapters: u32) -> OfflineBook {
    OfflineBook {
        id: id.to_string(),
        title_en: "Test Book".to_string(),
        title_si: Some("පරීක්ෂණ පොත".to_string()),
        authors_json: Some(r#"["Author"]"#.to_string()),
        cover_url: None,
        cover_data: None,
        total_chapters,
        downloaded_at: now_timestamp(),
        last_synced_at: None,
    }
}

fn test_chapter(book_id: &str, n: u32) -> OfflineChapter {
    OfflineChapter {
        id: format!("ch-{}", n),
        book_id: book_id.to_string(),
        chapter_number: n,
        title_en: format!("Chapter {}", n),
        title_si: None,
        content: format!("Content of chapter {}", n),
        word_count: 500,
        reading_time_minutes: 3,
        downloaded_at: now_timestamp(),
    }
}

fn test_sync_config() -> SyncConfig {
    SyncConfig {
        interval_seconds: 3600,
        max_attempts: 5,
        scroll_threshold: 5.0,
    }
}

/// Scripted in-process API for manager tests.
#[derive(Default)]
struct FakeApi {
    /// Highest chapter number the user can access per book; anything
    /// above returns a 403-equivalent.
    accessible_up_to: Mutex<std::collections::HashMap<String, u32>>,
    /// Chapters that fail with a transient error.
    failing_chapters: Mutex<Vec<(String, u32)>>,
    cover_fails: AtomicBool,
    progress_fails: AtomicBool,
    purchase_fails: AtomicBool,
    unauthorized: AtomicBool,
    progress_pushes: Mutex<Vec<ProgressUpload>>,
    purchase_pushes: Mutex<Vec<serde_json::Value>>,
    create_counter: AtomicUsize,
    update_calls: Mutex<Vec<String>>,
    /// Cancel this token after serving the given chapter number.
    cancel_after: Mutex<Option<(u32, CancellationToken)>>,
}

impl FakeApi {
    fn with_access(book_id: &str, up_to: u32) -> Self {
        let api = Self::default();
        api.accessible_up_to
            .lock()
            .insert(book_id.to_string(), up_to);
        api
    }

    fn progress_push_count(&self) -> usize {
        self.progress_pushes.lock().len()
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn fetch_chapter(&self, book_id: &str, chapter_number: u32) -> Result<ChapterPayload> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(AppError::Unauthorized);
        }
        if self
            .failing_chapters
            .lock()
            .contains(&(book_id.to_string(), chapter_number))
        {
            return Err(AppError::Internal("server error".to_string()));
        }
        let limit = self
            .accessible_up_to
            .lock()
            .get(book_id)
            .copied()
            .unwrap_or(u32::MAX);
        if chapter_number > limit {
            return Err(AppError::NoAccess(format!(
                "chapter {} locked",
                chapter_number
            )));
        }

        if let Some((after, token)) = self.cancel_after.lock().as_ref()
            && chapter_number == *after
        {
            token.cancel();
        }

        Ok(ChapterPayload {
            id: format!("srv-ch-{}", chapter_number),
            book_id: book_id.to_string(),
            chapter_number,
            title_en: format!("Chapter {}", chapter_number),
            title_si: None,
            content: format!("Content {}", chapter_number),
            word_count: 1000,
            reading_time_minutes: 5,
        })
    }

    async fn fetch_cover(&self, _url: &str) -> Result<Vec<u8>> {
        if self.cover_fails.load(Ordering::SeqCst) {
            return Err(AppError::Internal("cover unavailable".to_string()));
        }
        Ok(vec![0xFF, 0xD8, 0xFF])
    }

    async fn push_progress(&self, upload: &ProgressUpload) -> Result<()> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(AppError::Unauthorized);
        }
        if self.progress_fails.load(Ordering::SeqCst) {
            return Err(AppError::Internal("server error".to_string()));
        }
        self.progress_pushes.lock().push(upload.clone());
        Ok(())
    }

    async fn fetch_progress(&self, _book_id: &str) -> Result<Option<RemoteProgress>> {
        Ok(None)
    }

    async fn create_chapter(&self, book_id: &str, draft: &DraftUpload) -> Result<ChapterPayload> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(AppError::Unauthorized);
        }
        let n = self.create_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ChapterPayload {
            id: format!("srv-new-{}", n),
            book_id: book_id.to_string(),
            chapter_number: draft.chapter_number,
            title_en: draft.title_en.clone(),
            title_si: draft.title_si.clone(),
            content: draft.content_html.clone(),
            word_count: 0,
            reading_time_minutes: 0,
        })
    }

    async fn update_chapter(&self, chapter_id: &str, _draft: &DraftUpdate) -> Result<()> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(AppError::Unauthorized);
        }
        self.update_calls.lock().push(chapter_id.to_string());
        Ok(())
    }

    async fn push_purchase(&self, payload: &serde_json::Value) -> Result<()> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(AppError::Unauthorized);
        }
        if self.purchase_fails.load(Ordering::SeqCst) {
            return Err(AppError::Internal("server error".to_string()));
        }
        self.purchase_pushes.lock().push(payload.clone());
        Ok(())
    }
}

// ========== STORE ==========

#[test]
fn store_save_and_get_book() {
    let db = test_db();
    db.save_book(&test_book("book-1", 12)).unwrap();

    let found = db.get_book("book-1").unwrap().unwrap();
    assert_eq!(found.title_en, "Test Book");
    assert_eq!(found.total_chapters, 12);
    assert!(found.last_synced_at.is_none());
}

#[test]
fn store_delete_book_cascades_chapters() {
    let db = test_db();
    db.save_book(&test_book("book-1", 3)).unwrap();
    for n in 1..=3 {
        db.save_chapter(&test_chapter("book-1", n)).unwrap();
    }
    assert_eq!(db.count_chapters("book-1").unwrap(), 3);

    assert!(db.delete_book("book-1").unwrap());
    assert_eq!(db.count_chapters("book-1").unwrap(), 0);
    assert!(db.get_chapter("book-1", 1).unwrap().is_none());
}

#[test]
fn store_chapter_composite_key() {
    let db = test_db();
    db.save_book(&test_book("book-1", 5)).unwrap();
    db.save_book(&test_book("book-2", 5)).unwrap();
    db.save_chapter(&test_chapter("book-1", 2)).unwrap();
    db.save_chapter(&test_chapter("book-2", 2)).unwrap();

    assert!(db.get_chapter("book-1", 2).unwrap().is_some());
    assert!(db.get_chapter("book-1", 3).unwrap().is_none());
    assert_eq!(db.list_chapters("book-1").unwrap().len(), 1);
}

#[test]
fn store_progress_completed_set_only_grows() {
    let db = test_db();

    let mut progress = ProgressRecord::new("book-1", 3);
    progress.completed_chapters = vec![1, 2];
    db.save_progress(&progress).unwrap();

    // A later save with a smaller set must not shrink the stored set.
    let mut later = ProgressRecord::new("book-1", 4);
    later.completed_chapters = vec![3];
    db.save_progress(&later).unwrap();

    let found = db.get_progress("book-1").unwrap().unwrap();
    assert_eq!(found.completed_chapters, vec![1, 2, 3]);
    assert_eq!(found.current_chapter, 4);
}

#[test]
fn store_progress_last_write_wins() {
    let db = test_db();

    let mut first = ProgressRecord::new("book-1", 1);
    first.scroll_position = 40.0;
    db.save_progress(&first).unwrap();

    let mut second = ProgressRecord::new("book-1", 2);
    second.scroll_position = 10.0;
    db.save_progress(&second).unwrap();

    let found = db.get_progress("book-1").unwrap().unwrap();
    assert_eq!(found.scroll_position, 10.0);
    assert_eq!(found.current_chapter, 2);
}

#[test]
fn store_mark_synced_skips_newer_edits() {
    let db = test_db();

    let mut progress = ProgressRecord::new("book-1", 1);
    progress.client_updated_at = 100;
    db.save_progress(&progress).unwrap();

    // An edit landed after the push started; the ack must not mark it.
    db.mark_progress_synced("book-1", 50).unwrap();
    assert!(!db.get_progress("book-1").unwrap().unwrap().synced);

    db.mark_progress_synced("book-1", 100).unwrap();
    assert!(db.get_progress("book-1").unwrap().unwrap().synced);
}

#[test]
fn store_pending_queue_attempts() {
    let db = test_db();
    let payload = serde_json::json!({"bookId": "book-1"});
    let id = db.enqueue_pending(SyncItemKind::Purchase, &payload).unwrap();

    assert_eq!(db.bump_pending_attempts(id).unwrap(), 1);
    assert_eq!(db.bump_pending_attempts(id).unwrap(), 2);

    let items = db.list_pending().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].attempts, 2);
    assert_eq!(items[0].kind, SyncItemKind::Purchase);

    assert!(db.delete_pending(id).unwrap());
    assert!(db.list_pending().unwrap().is_empty());
}

#[test]
fn store_remap_draft_id() {
    let db = test_db();
    let temp_id = drafts::generate_temp_id();

    db.save_draft(&AdminDraft {
        chapter_id: temp_id.clone(),
        book_id: "book-1".to_string(),
        chapter_number: 7,
        title_en: "New Chapter".to_string(),
        title_si: None,
        content: "Draft body".to_string(),
        updated_at: now_timestamp(),
        synced: false,
        pending_create: true,
    })
    .unwrap();

    db.remap_draft_id(&temp_id, "srv-42").unwrap();

    assert!(db.get_draft(&temp_id).unwrap().is_none());
    let remapped = db.get_draft("srv-42").unwrap().unwrap();
    assert!(!remapped.pending_create);
    assert!(remapped.synced);
    assert_eq!(remapped.content, "Draft body");
}

#[test]
fn store_remap_missing_draft_fails() {
    let db = test_db();
    assert!(matches!(
        db.remap_draft_id("tmp-missing", "srv-1"),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn store_settings_roundtrip() {
    let db = test_db();
    db.set_setting("reader.font_size", "18").unwrap();
    db.set_setting("reader.font_size", "20").unwrap();

    assert_eq!(
        db.get_setting("reader.font_size").unwrap(),
        Some("20".to_string())
    );
    assert!(db.get_setting("reader.theme").unwrap().is_none());
}

#[test]
fn store_migration_is_additive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline.db");

    {
        let db = Database::open_v1(&path).unwrap();
        db.save_book(&test_book("book-1", 5)).unwrap();
        db.save_chapter(&test_chapter("book-1", 1)).unwrap();
    }

    // Reopening at the current version adds the settings table and
    // indexes without touching existing rows.
    let db = Database::open(&path).unwrap();
    assert!(db.get_book("book-1").unwrap().is_some());
    assert_eq!(db.count_chapters("book-1").unwrap(), 1);
    db.set_setting("reader.theme", "dark").unwrap();
    assert_eq!(
        db.get_setting("reader.theme").unwrap(),
        Some("dark".to_string())
    );
}

#[test]
fn store_count_unsynced_spans_progress_and_queue() {
    let db = test_db();
    db.save_progress(&ProgressRecord::new("book-1", 1)).unwrap();
    db.enqueue_pending(SyncItemKind::Progress, &serde_json::json!({}))
        .unwrap();

    assert_eq!(db.count_unsynced().unwrap(), 2);
}

// ========== DOWNLOAD MANAGER ==========

#[tokio::test]
async fn download_free_preview_skips_locked_chapters() {
    let db = test_db();
    let api = Arc::new(FakeApi::with_access("book-1", 3));
    let manager = DownloadManager::new(db.clone(), api);

    let descriptor = BookDescriptor {
        id: "book-1".to_string(),
        title_en: "Preview Book".to_string(),
        title_si: None,
        authors: vec!["Author".to_string()],
        cover_url: None,
        total_chapters: 10,
    };

    let phase = manager
        .download_book(&descriptor, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(phase, DownloadPhase::Complete);

    let book = db.get_book("book-1").unwrap().unwrap();
    assert!(book.downloaded_at > 0);

    let counts = manager.check_download_status("book-1").unwrap();
    assert_eq!(counts.downloaded, 3);
    assert_eq!(counts.total, 10);
}

#[tokio::test]
async fn download_single_chapter_failure_not_fatal() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    api.failing_chapters
        .lock()
        .push(("book-1".to_string(), 2));
    let manager = DownloadManager::new(db.clone(), api);

    let descriptor = BookDescriptor {
        id: "book-1".to_string(),
        title_en: "Flaky Book".to_string(),
        title_si: None,
        authors: Vec::new(),
        cover_url: None,
        total_chapters: 3,
    };

    let phase = manager
        .download_book(&descriptor, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(phase, DownloadPhase::Complete);

    // Chapter 2 is absent, not half-written.
    assert!(db.get_chapter("book-1", 1).unwrap().is_some());
    assert!(db.get_chapter("book-1", 2).unwrap().is_none());
    assert!(db.get_chapter("book-1", 3).unwrap().is_some());
}

#[tokio::test]
async fn download_cover_failure_not_fatal() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    api.cover_fails.store(true, Ordering::SeqCst);
    let manager = DownloadManager::new(db.clone(), api);

    let descriptor = BookDescriptor {
        id: "book-1".to_string(),
        title_en: "Coverless".to_string(),
        title_si: None,
        authors: Vec::new(),
        cover_url: Some("/covers/book-1.jpg".to_string()),
        total_chapters: 2,
    };

    let phase = manager
        .download_book(&descriptor, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(phase, DownloadPhase::Complete);

    let book = db.get_book("book-1").unwrap().unwrap();
    assert!(book.cover_data.is_none());
    assert_eq!(db.count_chapters("book-1").unwrap(), 2);
}

#[tokio::test]
async fn download_cancellation_leaves_valid_state() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    let cancel = CancellationToken::new();
    *api.cancel_after.lock() = Some((2, cancel.clone()));
    let manager = DownloadManager::new(db.clone(), api);

    let descriptor = BookDescriptor {
        id: "book-1".to_string(),
        title_en: "Interrupted".to_string(),
        title_si: None,
        authors: Vec::new(),
        cover_url: None,
        total_chapters: 10,
    };

    let phase = manager.download_book(&descriptor, &cancel).await.unwrap();
    assert_eq!(phase, DownloadPhase::Cancelled);

    // Only fully written chapters are reported.
    let counts = manager.check_download_status("book-1").unwrap();
    assert_eq!(counts.downloaded, db.count_chapters("book-1").unwrap());
    assert!(counts.downloaded <= 2);
    assert_eq!(counts.total, 10);
}

#[tokio::test]
async fn download_chapter_tops_up_after_purchase() {
    let db = test_db();
    let api = Arc::new(FakeApi::with_access("book-1", 3));
    let manager = DownloadManager::new(db.clone(), api.clone());

    let descriptor = BookDescriptor {
        id: "book-1".to_string(),
        title_en: "Preview Book".to_string(),
        title_si: None,
        authors: Vec::new(),
        cover_url: None,
        total_chapters: 5,
    };
    manager
        .download_book(&descriptor, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(manager.check_download_status("book-1").unwrap().downloaded, 3);

    // Purchase unlocks the rest.
    api.accessible_up_to.lock().insert("book-1".to_string(), 5);
    manager.download_chapter("book-1", 4).await.unwrap();
    manager.download_chapter("book-1", 5).await.unwrap();

    assert_eq!(manager.check_download_status("book-1").unwrap().downloaded, 5);
}

#[tokio::test]
async fn download_status_unknown_book() {
    let db = test_db();
    let manager = DownloadManager::new(db, Arc::new(FakeApi::default()));

    let counts = manager.check_download_status("nope").unwrap();
    assert_eq!(counts.downloaded, 0);
    assert_eq!(counts.total, 0);
}

// ========== SYNC MANAGER ==========

#[tokio::test]
async fn sync_marks_progress_synced() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    let manager = SyncManager::new(
        db.clone(),
        api.clone(),
        Connectivity::new(true),
        test_sync_config(),
    );

    let mut progress = ProgressRecord::new("book-1", 2);
    progress.scroll_position = 55.0;
    db.save_progress(&progress).unwrap();

    manager.sync_all().await.unwrap();

    assert!(db.get_progress("book-1").unwrap().unwrap().synced);
    assert_eq!(api.progress_push_count(), 1);

    let state = manager.state();
    assert_eq!(state.status, SyncStatus::Idle);
    assert!(state.last_synced_at.is_some());
    assert_eq!(state.pending_count, 0);
}

#[tokio::test]
async fn save_progress_coalesces_small_scrolls() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    let manager = SyncManager::new(
        db.clone(),
        api.clone(),
        Connectivity::new(true),
        test_sync_config(),
    );

    let save = |scroll: f64, complete: bool| ProgressSave {
        book_id: "book-1".to_string(),
        chapter_id: Some("ch-1".to_string()),
        chapter_number: 1,
        scroll_position: scroll,
        is_chapter_complete: complete,
    };

    // First save has no prior dispatch: goes out.
    manager.save_progress(&save(10.0, false)).await.unwrap();
    assert_eq!(api.progress_push_count(), 1);

    // Under-threshold scroll: local write only.
    manager.save_progress(&save(12.0, false)).await.unwrap();
    assert_eq!(api.progress_push_count(), 1);
    assert_eq!(
        db.get_progress("book-1").unwrap().unwrap().scroll_position,
        12.0
    );

    // Completion always dispatches, regardless of delta.
    manager.save_progress(&save(12.5, true)).await.unwrap();
    assert_eq!(api.progress_push_count(), 2);
    let pushed = api.progress_pushes.lock().last().cloned().unwrap();
    assert!(pushed.is_chapter_complete);
    assert_eq!(pushed.completed_chapters, vec![1]);
}

#[tokio::test]
async fn sync_unauthorized_aborts_batch_without_burning_retries() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    api.unauthorized.store(true, Ordering::SeqCst);
    let manager = SyncManager::new(
        db.clone(),
        api.clone(),
        Connectivity::new(true),
        test_sync_config(),
    );

    db.save_progress(&ProgressRecord::new("book-1", 1)).unwrap();
    db.enqueue_pending(SyncItemKind::Purchase, &serde_json::json!({"orderId": 7}))
        .unwrap();

    assert!(matches!(
        manager.sync_all().await,
        Err(AppError::Unauthorized)
    ));

    // Nothing synced, nothing dropped, no retry budget consumed.
    assert!(!db.get_progress("book-1").unwrap().unwrap().synced);
    let items = db.list_pending().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].attempts, 0);

    // Re-authenticated: the next cycle delivers everything.
    api.unauthorized.store(false, Ordering::SeqCst);
    manager.sync_all().await.unwrap();
    assert!(db.get_progress("book-1").unwrap().unwrap().synced);
    assert!(db.list_pending().unwrap().is_empty());
}

#[tokio::test]
async fn pending_item_dropped_after_attempt_cap() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    api.purchase_fails.store(true, Ordering::SeqCst);
    let manager = SyncManager::new(
        db.clone(),
        api.clone(),
        Connectivity::new(true),
        test_sync_config(),
    );

    manager
        .queue_item(SyncItemKind::Purchase, serde_json::json!({"orderId": 1}))
        .unwrap();

    for _ in 0..5 {
        manager.sync_all().await.unwrap();
    }

    // Dropped at the cap; a now-healthy server never sees it again.
    assert!(db.list_pending().unwrap().is_empty());
    api.purchase_fails.store(false, Ordering::SeqCst);
    manager.sync_all().await.unwrap();
    assert!(api.purchase_pushes.lock().is_empty());
}

#[tokio::test]
async fn pending_item_delivered_once() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    let manager = SyncManager::new(
        db.clone(),
        api.clone(),
        Connectivity::new(true),
        test_sync_config(),
    );

    manager
        .queue_item(SyncItemKind::Purchase, serde_json::json!({"orderId": 9}))
        .unwrap();

    manager.sync_all().await.unwrap();
    manager.sync_all().await.unwrap();

    // Retrying stops after a confirmed success.
    assert_eq!(api.purchase_pushes.lock().len(), 1);
    assert!(db.list_pending().unwrap().is_empty());
}

#[tokio::test]
async fn connectivity_transitions_drive_status() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    let connectivity = Connectivity::new(true);
    let manager = SyncManager::new(
        db.clone(),
        api.clone(),
        connectivity.clone(),
        test_sync_config(),
    );

    db.save_progress(&ProgressRecord::new("book-1", 1)).unwrap();

    let mut states = manager.subscribe();
    assert_eq!(states.borrow_and_update().status, SyncStatus::Idle);

    connectivity.set_online(false);
    tokio::time::timeout(Duration::from_secs(1), states.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(states.borrow_and_update().status, SyncStatus::Offline);

    // Restore triggers an immediate sync.
    connectivity.set_online(true);
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            states.changed().await.unwrap();
            if states.borrow_and_update().status == SyncStatus::Idle
                && db.get_progress("book-1").unwrap().unwrap().synced
            {
                break;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(api.progress_push_count(), 1);
}

#[tokio::test]
async fn save_progress_while_offline_stays_local() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    let manager = SyncManager::new(
        db.clone(),
        api.clone(),
        Connectivity::new(false),
        test_sync_config(),
    );

    manager
        .save_progress(&ProgressSave {
            book_id: "book-1".to_string(),
            chapter_id: None,
            chapter_number: 1,
            scroll_position: 30.0,
            is_chapter_complete: false,
        })
        .await
        .unwrap();

    assert_eq!(api.progress_push_count(), 0);
    let stored = db.get_progress("book-1").unwrap().unwrap();
    assert!(!stored.synced);
    assert_eq!(stored.scroll_position, 30.0);
    assert_eq!(manager.state().pending_count, 1);
}

#[tokio::test]
async fn final_save_is_fire_and_forget() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    let manager = SyncManager::new(
        db.clone(),
        api.clone(),
        Connectivity::new(true),
        test_sync_config(),
    );

    manager
        .final_save(&ProgressSave {
            book_id: "book-1".to_string(),
            chapter_id: Some("ch-3".to_string()),
            chapter_number: 3,
            scroll_position: 80.0,
            is_chapter_complete: false,
        })
        .unwrap();

    // The local record is durable immediately, before any response.
    let stored = db.get_progress("book-1").unwrap().unwrap();
    assert_eq!(stored.scroll_position, 80.0);
    assert!(!stored.synced);

    // The detached dispatch carries the same payload.
    tokio::time::timeout(Duration::from_secs(1), async {
        while api.progress_push_count() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    let pushed = api.progress_pushes.lock().last().cloned().unwrap();
    assert_eq!(pushed.scroll_position, 80.0);
}

// ========== ADMIN DRAFT MANAGER ==========

#[test]
fn temp_ids_are_recognizable_and_unique() {
    let a = drafts::generate_temp_id();
    let b = drafts::generate_temp_id();

    assert!(drafts::is_temp_id(&a));
    assert!(drafts::is_temp_id(&b));
    assert_ne!(a, b);
    assert!(!drafts::is_temp_id("srv-123"));
}

#[tokio::test]
async fn save_draft_offline_is_local_first() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    let manager = AdminDraftManager::new(db.clone(), api.clone(), Connectivity::new(false));

    let temp_id = drafts::generate_temp_id();
    manager
        .save_draft(
            &temp_id,
            &DraftData {
                book_id: "book-1".to_string(),
                chapter_number: 4,
                title_en: "Draft".to_string(),
                title_si: Some("කෙටුම්පත".to_string()),
                content: "Work in progress".to_string(),
            },
        )
        .unwrap();

    let draft = manager.get_draft(&temp_id).unwrap().unwrap();
    assert!(draft.pending_create);
    assert!(!draft.synced);
    assert_eq!(api.create_counter.load(Ordering::SeqCst), 0);
    assert_eq!(manager.get_unsynced_drafts().unwrap().len(), 1);
}

#[tokio::test]
async fn sync_draft_create_then_remap() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    let manager = AdminDraftManager::new(db.clone(), api, Connectivity::new(false));

    let temp_id = drafts::generate_temp_id();
    let draft = manager
        .save_draft(
            &temp_id,
            &DraftData {
                book_id: "book-1".to_string(),
                chapter_number: 9,
                title_en: "Fresh".to_string(),
                title_si: None,
                content: "Body".to_string(),
            },
        )
        .unwrap();

    let result = manager.sync_draft_to_server(&draft).await.unwrap();
    assert!(result.success);
    let new_id = result.new_chapter_id.unwrap();
    assert!(!drafts::is_temp_id(&new_id));

    manager.update_chapter_id(&temp_id, &new_id).unwrap();

    assert!(manager.get_draft(&temp_id).unwrap().is_none());
    let remapped = manager.get_draft(&new_id).unwrap().unwrap();
    assert!(!remapped.pending_create);
    assert!(remapped.synced);
}

#[tokio::test]
async fn sync_draft_update_path() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    let manager = AdminDraftManager::new(db.clone(), api.clone(), Connectivity::new(false));

    let draft = manager
        .save_draft(
            "srv-77",
            &DraftData {
                book_id: "book-1".to_string(),
                chapter_number: 2,
                title_en: "Edited".to_string(),
                title_si: None,
                content: "Revised body".to_string(),
            },
        )
        .unwrap();
    assert!(!draft.pending_create);

    let result = manager.sync_draft_to_server(&draft).await.unwrap();
    assert!(result.success);
    assert!(result.new_chapter_id.is_none());
    assert_eq!(api.update_calls.lock().first().map(String::as_str), Some("srv-77"));
    assert!(manager.get_draft("srv-77").unwrap().unwrap().synced);
}

#[tokio::test]
async fn sync_pending_drafts_handles_both_paths() {
    let db = test_db();
    let api = Arc::new(FakeApi::default());
    let manager = AdminDraftManager::new(db.clone(), api.clone(), Connectivity::new(false));

    let temp_id = drafts::generate_temp_id();
    manager
        .save_draft(
            &temp_id,
            &DraftData {
                book_id: "book-1".to_string(),
                chapter_number: 10,
                title_en: "New".to_string(),
                title_si: None,
                content: "A".to_string(),
            },
        )
        .unwrap();
    manager
        .save_draft(
            "srv-5",
            &DraftData {
                book_id: "book-1".to_string(),
                chapter_number: 5,
                title_en: "Old".to_string(),
                title_si: None,
                content: "B".to_string(),
            },
        )
        .unwrap();

    let accepted = manager.sync_pending_drafts().await.unwrap();
    assert_eq!(accepted, 2);
    assert!(manager.get_unsynced_drafts().unwrap().is_empty());
    assert!(manager.get_draft(&temp_id).unwrap().is_none());
}

// ========== CONFIG ==========

#[test]
fn config_parse_toml() {
    let toml = r#"
[api]
base_url = "https://reader.example.com"
token = "secret"

[database]
path = "/tmp/offline.db"

[sync]
interval_seconds = 60
max_attempts = 3
scroll_threshold = 10.0
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.api.base_url, "https://reader.example.com");
    assert_eq!(config.api.token.as_deref(), Some("secret"));
    assert_eq!(config.sync.interval_seconds, 60);
    assert_eq!(config.sync.max_attempts, 3);
    assert_eq!(config.sync.scroll_threshold, 10.0);
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.sync.interval_seconds, 30);
    assert_eq!(config.sync.max_attempts, 5);
    assert_eq!(config.sync.scroll_threshold, 5.0);
    assert!(config.api.token.is_none());
}

// ========== CONNECTIVITY ==========

#[test]
fn connectivity_reports_transitions() {
    let connectivity = Connectivity::new(true);
    assert!(connectivity.is_online());

    let rx = connectivity.subscribe();
    assert!(*rx.borrow());

    connectivity.set_online(false);
    assert!(!connectivity.is_online());
    assert!(!*rx.borrow());
}
