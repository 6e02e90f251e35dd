//! Sync manager: background loop pushing locally recorded reading
//! progress to the server, with bounded retries and an observable
//! aggregate status.

use crate::api::{ProgressUpload, RemoteApi};
use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::error::{AppError, Result};
use crate::store::{Database, ProgressRecord, SyncItemKind, now_timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Aggregate sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Nothing in flight.
    Idle,
    /// A sync cycle is running.
    Syncing,
    /// The last cycle failed; the next timer tick retries.
    Error,
    /// Connectivity was lost; syncing is suspended.
    Offline,
}

/// Full sync state delivered to subscribers on every change and
/// immediately on subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SyncState {
    /// Current status.
    pub status: SyncStatus,
    /// Timestamp of the last successful cycle.
    pub last_synced_at: Option<i64>,
    /// Records and queue items awaiting server acknowledgment.
    pub pending_count: usize,
    /// Message from the last failed cycle.
    pub error: Option<String>,
}

/// A progress save as issued by the reading UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSave {
    /// Book ID.
    pub book_id: String,
    /// Current chapter ID, if known.
    pub chapter_id: Option<String>,
    /// Current chapter number.
    pub chapter_number: u32,
    /// Scroll position within the chapter (0.0 - 100.0).
    pub scroll_position: f64,
    /// Whether this save marks the chapter complete.
    pub is_chapter_complete: bool,
}

/// Background sync coordinator. Construct one per running app and
/// inject it; cloning shares the same coordinator state.
#[derive(Clone)]
pub struct SyncManager {
    store: Database,
    api: Arc<dyn RemoteApi>,
    connectivity: Connectivity,
    config: SyncConfig,
    state_tx: Arc<watch::Sender<SyncState>>,
    /// One sync cycle at a time; timer ticks and opportunistic
    /// triggers queue up behind this.
    cycle_gate: Arc<tokio::sync::Mutex<()>>,
    /// Last scroll position dispatched per book, for coalescing.
    last_dispatched: Arc<parking_lot::Mutex<HashMap<String, f64>>>,
    timer: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

impl SyncManager {
    /// Create a manager and start watching the connectivity signal.
    /// Must be called within a tokio runtime.
    pub fn new(
        store: Database,
        api: Arc<dyn RemoteApi>,
        connectivity: Connectivity,
        config: SyncConfig,
    ) -> Self {
        let pending_count = store.count_unsynced().unwrap_or(0);
        let status = if connectivity.is_online() {
            SyncStatus::Idle
        } else {
            SyncStatus::Offline
        };
        let (state_tx, _) = watch::channel(SyncState {
            status,
            last_synced_at: None,
            pending_count,
            error: None,
        });

        let manager = Self {
            store,
            api,
            connectivity,
            config,
            state_tx: Arc::new(state_tx),
            cycle_gate: Arc::new(tokio::sync::Mutex::new(())),
            last_dispatched: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            timer: Arc::new(parking_lot::Mutex::new(None)),
        };

        manager.spawn_connectivity_watcher();
        manager
    }

    /// Subscribe to sync state. The receiver sees the current state
    /// immediately, so there is no missed-initial-state race.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Current state snapshot.
    pub fn state(&self) -> SyncState {
        self.state_tx.borrow().clone()
    }

    /// Flip to `Offline` the moment connectivity drops; flip back to
    /// `Idle` and run an immediate cycle when it returns.
    fn spawn_connectivity_watcher(&self) {
        let manager = self.clone();
        let mut rx = self.connectivity.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if online {
                    tracing::info!("Connectivity restored, syncing");
                    manager.set_status(SyncStatus::Idle, None);
                    if let Err(e) = manager.sync_all().await {
                        tracing::warn!(error = %e, "Reconnect sync failed");
                    }
                } else {
                    tracing::info!("Connectivity lost, sync suspended");
                    manager.set_status(SyncStatus::Offline, None);
                }
            }
        });
    }

    /// Arm the recurring sync timer. Fixed interval, no jitter or
    /// backoff, matching the observable retry timing callers expect.
    pub fn start_auto_sync(&self) {
        let mut guard = self.timer.lock();
        if guard.is_some() {
            return;
        }

        let manager = self.clone();
        let interval = Duration::from_secs(self.config.interval_seconds);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip first immediate tick

            loop {
                ticker.tick().await;
                if !manager.connectivity.is_online() {
                    continue;
                }
                if let Err(e) = manager.sync_all().await {
                    tracing::warn!(error = %e, "Scheduled sync failed");
                }
            }
        });

        *guard = Some(handle);
        tracing::debug!(interval_seconds = self.config.interval_seconds, "Auto-sync armed");
    }

    /// Disarm the recurring sync timer.
    pub fn stop_auto_sync(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
            tracing::debug!("Auto-sync disarmed");
        }
    }

    /// Write path used by the reading UI. The local store is written
    /// immediately (optimistic); a network round trip is only
    /// triggered when the scroll moved at least the configured
    /// threshold since the last dispatched save, or when the save
    /// marks chapter completion.
    pub async fn save_progress(&self, save: &ProgressSave) -> Result<()> {
        self.write_local(save)?;
        self.refresh_pending_count();

        if !self.should_dispatch(save) {
            return Ok(());
        }

        if self.connectivity.is_online() {
            // Opportunistic: don't wait for the timer.
            self.sync_all().await?;
        }
        Ok(())
    }

    /// Best-effort final save for page teardown. Persists locally,
    /// then fires a detached dispatch whose response is never read;
    /// the queued sync path recovers the record on next load.
    pub fn final_save(&self, save: &ProgressSave) -> Result<()> {
        self.write_local(save)?;
        self.refresh_pending_count();

        let api = self.api.clone();
        let upload = ProgressUpload {
            book_id: save.book_id.clone(),
            chapter_id: save.chapter_id.clone(),
            scroll_position: save.scroll_position,
            is_chapter_complete: save.is_chapter_complete,
            completed_chapters: self
                .store
                .get_progress(&save.book_id)?
                .map(|p| p.completed_chapters)
                .unwrap_or_default(),
        };
        tokio::spawn(async move {
            let _ = api.push_progress(&upload).await;
        });
        Ok(())
    }

    /// Queue a mutation that could not be delivered inline. Items are
    /// retried each cycle and dropped once the attempt cap is
    /// reached: callers must treat delivery as at-least-once with a
    /// bounded horizon, not guaranteed.
    pub fn queue_item(&self, kind: SyncItemKind, payload: serde_json::Value) -> Result<i64> {
        let id = self.store.enqueue_pending(kind, &payload)?;
        self.refresh_pending_count();
        Ok(id)
    }

    /// Run one sync cycle: push unsynced progress records, then drain
    /// the pending queue. Sequential per record so a stale progress
    /// value is never synced after a newer one for the same book.
    pub async fn sync_all(&self) -> Result<()> {
        if !self.connectivity.is_online() {
            return Ok(());
        }

        let _gate = self.cycle_gate.lock().await;
        self.set_status(SyncStatus::Syncing, None);

        let outcome = async {
            self.push_unsynced_progress().await?;
            self.drain_pending_queue().await?;
            Ok::<(), AppError>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                self.state_tx.send_modify(|state| {
                    state.status = SyncStatus::Idle;
                    state.last_synced_at = Some(now_timestamp());
                    state.pending_count = self.store.count_unsynced().unwrap_or(0);
                    state.error = None;
                });
                Ok(())
            }
            Err(AppError::Unauthorized) => {
                // The batch is aborted for this cycle; records keep
                // their retry budget and stay queued.
                self.set_status(SyncStatus::Error, Some("Not authenticated".to_string()));
                Err(AppError::Unauthorized)
            }
            Err(e) => {
                self.set_status(SyncStatus::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Push all `synced = false` progress records, one at a time.
    async fn push_unsynced_progress(&self) -> Result<()> {
        let records = self.store.get_unsynced_progress()?;

        for record in records {
            let as_of = record.client_updated_at;
            let upload = Self::record_to_upload(&record);

            match self.api.push_progress(&upload).await {
                Ok(()) => {
                    self.store.mark_progress_synced(&record.book_id, as_of)?;
                    self.store
                        .touch_book_synced(&record.book_id, now_timestamp())?;
                    self.last_dispatched
                        .lock()
                        .insert(record.book_id.clone(), record.scroll_position);
                    tracing::debug!(book = %record.book_id, "Progress synced");
                }
                Err(AppError::Unauthorized) => return Err(AppError::Unauthorized),
                Err(e) => {
                    // Record stays unsynced; next cycle retries.
                    tracing::warn!(book = %record.book_id, error = %e, "Progress sync failed");
                }
            }
        }
        Ok(())
    }

    /// Drain the pending queue. Items failing `max_attempts` times
    /// are dropped with a warning; this data loss is accepted.
    async fn drain_pending_queue(&self) -> Result<()> {
        let items = self.store.list_pending()?;

        for item in items {
            let delivery = match item.kind {
                SyncItemKind::Progress => {
                    match serde_json::from_value::<ProgressUpload>(item.payload.clone()) {
                        Ok(upload) => self.api.push_progress(&upload).await,
                        Err(e) => {
                            // Unparseable payloads can never succeed.
                            tracing::warn!(item = item.id, error = %e, "Dropping malformed sync item");
                            self.store.delete_pending(item.id)?;
                            continue;
                        }
                    }
                }
                SyncItemKind::Purchase => self.api.push_purchase(&item.payload).await,
            };

            match delivery {
                Ok(()) => {
                    self.store.delete_pending(item.id)?;
                    tracing::debug!(item = item.id, kind = ?item.kind, "Sync item delivered");
                }
                Err(e) if !e.counts_against_retries() => return Err(e),
                Err(e) => {
                    let attempts = self.store.bump_pending_attempts(item.id)?;
                    if attempts >= self.config.max_attempts {
                        self.store.delete_pending(item.id)?;
                        tracing::warn!(
                            item = item.id,
                            attempts = attempts,
                            error = %e,
                            "Sync item dropped after repeated failures"
                        );
                    } else {
                        tracing::debug!(item = item.id, attempts = attempts, error = %e, "Sync item delivery failed");
                    }
                }
            }
        }
        Ok(())
    }

    /// Persist the save to the local store, last-write-wins.
    fn write_local(&self, save: &ProgressSave) -> Result<()> {
        let now = now_timestamp();
        let completed = if save.is_chapter_complete {
            vec![save.chapter_number]
        } else {
            Vec::new()
        };

        // The store merges completed_chapters with the existing set.
        self.store.save_progress(&ProgressRecord {
            book_id: save.book_id.clone(),
            chapter_id: save.chapter_id.clone(),
            current_chapter: save.chapter_number,
            scroll_position: save.scroll_position,
            completed_chapters: completed,
            last_read_at: now,
            synced: false,
            client_updated_at: now,
        })
    }

    /// Scroll-driven saves are coalesced: only a move of at least the
    /// threshold since the last dispatched save, or a chapter
    /// completion, goes to the network.
    fn should_dispatch(&self, save: &ProgressSave) -> bool {
        if save.is_chapter_complete {
            return true;
        }
        match self.last_dispatched.lock().get(&save.book_id) {
            Some(last) => (save.scroll_position - last).abs() >= self.config.scroll_threshold,
            None => true,
        }
    }

    fn record_to_upload(record: &ProgressRecord) -> ProgressUpload {
        ProgressUpload {
            book_id: record.book_id.clone(),
            chapter_id: record.chapter_id.clone(),
            scroll_position: record.scroll_position,
            is_chapter_complete: record.is_chapter_complete(record.current_chapter),
            completed_chapters: record.completed_chapters.clone(),
        }
    }

    fn set_status(&self, status: SyncStatus, error: Option<String>) {
        self.state_tx.send_modify(|state| {
            state.status = status;
            state.error = error;
            state.pending_count = self.store.count_unsynced().unwrap_or(state.pending_count);
        });
    }

    fn refresh_pending_count(&self) {
        self.state_tx.send_modify(|state| {
            state.pending_count = self.store.count_unsynced().unwrap_or(state.pending_count);
        });
    }
}
