//! Admin draft manager: local-first saves for content authoring,
//! with identifier remapping once a server create succeeds.
//!
//! Unlike the sync manager this component owns no timer: draft sync
//! is driven by explicit user action, so callers invoke
//! [`AdminDraftManager::sync_pending_drafts`] (or sync drafts one by
//! one) themselves.

use crate::api::{DraftUpdate, DraftUpload, RemoteApi};
use crate::connectivity::Connectivity;
use crate::error::{AppError, Result};
use crate::store::{AdminDraft, Database, now_timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Reserved marker distinguishing client-generated temporary chapter
/// identifiers from server-assigned ones.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Produce a client-unique temporary chapter identifier.
pub fn generate_temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4())
}

/// Whether an identifier is a client-generated temporary one.
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Draft content as edited in the admin UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftData {
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
}

/// Outcome of a server sync for one draft.
///
/// `new_chapter_id` is only present when `success` is true and the
/// operation was a create; callers must not assume it otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct DraftSyncResult {
    /// Whether the server accepted the draft.
    pub success: bool,
    /// Server-assigned chapter ID for a successful create.
    pub new_chapter_id: Option<String>,
}

/// Coordinates local-first draft saves and server sync.
#[derive(Clone)]
pub struct AdminDraftManager {
    store: Database,
    api: Arc<dyn RemoteApi>,
    connectivity: Connectivity,
    saving_tx: Arc<watch::Sender<bool>>,
}

impl AdminDraftManager {
    /// Create a manager over the given store and API boundary.
    pub fn new(store: Database, api: Arc<dyn RemoteApi>, connectivity: Connectivity) -> Self {
        let (saving_tx, _) = watch::channel(false);
        Self {
            store,
            api,
            connectivity,
            saving_tx: Arc::new(saving_tx),
        }
    }

    /// Observe the `is_saving` flag toggled around local writes.
    pub fn subscribe_saving(&self) -> watch::Receiver<bool> {
        self.saving_tx.subscribe()
    }

    /// Save a draft locally. Never blocks on the network: the local
    /// write always happens regardless of connectivity, and a server
    /// sync is only handed off as a detached task when online.
    pub fn save_draft(&self, chapter_id: &str, data: &DraftData) -> Result<AdminDraft> {
        let _ = self.saving_tx.send(true);

        let draft = AdminDraft {
            chapter_id: chapter_id.to_string(),
            book_id: data.book_id.clone(),
            chapter_number: data.chapter_number,
            title_en: data.title_en.clone(),
            title_si: data.title_si.clone(),
            content: data.content.clone(),
            updated_at: now_timestamp(),
            synced: false,
            pending_create: is_temp_id(chapter_id),
        };
        let written = self.store.save_draft(&draft);

        let _ = self.saving_tx.send(false);
        written?;

        if self.connectivity.is_online() {
            let manager = self.clone();
            let draft_clone = draft.clone();
            tokio::spawn(async move {
                if let Err(e) = manager.sync_and_remap(&draft_clone).await {
                    tracing::warn!(chapter = %draft_clone.chapter_id, error = %e, "Draft sync failed");
                }
            });
        }

        Ok(draft)
    }

    /// Push one draft to the server.
    ///
    /// A pending-create draft issues a create call; on success the
    /// server-assigned ID is returned and the caller is responsible
    /// for invoking [`update_chapter_id`](Self::update_chapter_id) to
    /// remap the local record. Other drafts issue an update keyed by
    /// the existing identifier.
    ///
    /// Transient failures surface as `success = false`, not as a
    /// blocking error.
    pub async fn sync_draft_to_server(&self, draft: &AdminDraft) -> Result<DraftSyncResult> {
        if draft.pending_create {
            let upload = DraftUpload {
                chapter_number: draft.chapter_number,
                title_en: draft.title_en.clone(),
                title_si: draft.title_si.clone(),
                content_html: draft.content.clone(),
            };
            match self.api.create_chapter(&draft.book_id, &upload).await {
                Ok(created) => Ok(DraftSyncResult {
                    success: true,
                    new_chapter_id: Some(created.id),
                }),
                Err(AppError::Unauthorized) => Err(AppError::Unauthorized),
                Err(e) => {
                    tracing::warn!(chapter = %draft.chapter_id, error = %e, "Draft create failed");
                    Ok(DraftSyncResult {
                        success: false,
                        new_chapter_id: None,
                    })
                }
            }
        } else {
            let update = DraftUpdate {
                chapter_number: draft.chapter_number,
                title_en: draft.title_en.clone(),
                title_si: draft.title_si.clone(),
                content: draft.content.clone(),
            };
            match self.api.update_chapter(&draft.chapter_id, &update).await {
                Ok(()) => {
                    self.store.mark_draft_synced(&draft.chapter_id)?;
                    Ok(DraftSyncResult {
                        success: true,
                        new_chapter_id: None,
                    })
                }
                Err(AppError::Unauthorized) => Err(AppError::Unauthorized),
                Err(e) => {
                    tracing::warn!(chapter = %draft.chapter_id, error = %e, "Draft update failed");
                    Ok(DraftSyncResult {
                        success: false,
                        new_chapter_id: None,
                    })
                }
            }
        }
    }

    /// Remap a draft from its temporary identifier to the
    /// server-assigned one. Atomic for external readers: after this
    /// returns, the old key is gone, the new key holds the draft
    /// with `pending_create` cleared.
    pub fn update_chapter_id(&self, old_id: &str, new_id: &str) -> Result<()> {
        self.store.remap_draft_id(old_id, new_id)?;
        tracing::info!(old = %old_id, new = %new_id, "Draft remapped to server ID");
        Ok(())
    }

    /// Get a draft by chapter ID.
    pub fn get_draft(&self, chapter_id: &str) -> Result<Option<AdminDraft>> {
        self.store.get_draft(chapter_id)
    }

    /// Enumerate drafts the server does not have yet.
    pub fn get_unsynced_drafts(&self) -> Result<Vec<AdminDraft>> {
        self.store.get_unsynced_drafts()
    }

    /// Delete a draft.
    pub fn delete_draft(&self, chapter_id: &str) -> Result<bool> {
        self.store.delete_draft(chapter_id)
    }

    /// Sync every unsynced draft once, sequentially. Invoked by
    /// explicit user action; this component owns no timer. Returns
    /// the number of drafts the server accepted.
    pub async fn sync_pending_drafts(&self) -> Result<usize> {
        let drafts = self.get_unsynced_drafts()?;
        let mut accepted = 0;

        for draft in drafts {
            match self.sync_and_remap(&draft).await {
                Ok(true) => accepted += 1,
                Ok(false) => {}
                // Retrying is pointless this cycle.
                Err(AppError::Unauthorized) => return Err(AppError::Unauthorized),
                Err(e) => {
                    tracing::warn!(chapter = %draft.chapter_id, error = %e, "Draft sync failed");
                }
            }
        }

        Ok(accepted)
    }

    /// Sync one draft and perform the create-path remap.
    async fn sync_and_remap(&self, draft: &AdminDraft) -> Result<bool> {
        let result = self.sync_draft_to_server(draft).await?;
        if !result.success {
            return Ok(false);
        }
        if let Some(new_id) = result.new_chapter_id {
            self.update_chapter_id(&draft.chapter_id, &new_id)?;
        }
        Ok(true)
    }
}
