//! readsync: offline-first local store and sync engine for a
//! bilingual reading app.
//!
//! This crate provides the device-resident half of a reading
//! application: a durable local store for downloaded books, a
//! download manager with cancellation, a background sync loop
//! pushing reading progress to the remote API, and a local-first
//! draft manager for content authoring while offline.
//!
//! # Features
//!
//! - SQLite-backed local store with additive schema migration
//! - Book downloads with live progress and cooperative cancellation
//! - Free-preview aware chapter fetching (no-access chapters skipped)
//! - Optimistic, coalesced reading-progress saves
//! - Bounded-retry queue for mutations recorded while offline
//! - Temporary-to-server identifier remapping for admin drafts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Remote API boundary.
pub mod api;
/// Configuration and CLI.
pub mod config;
/// Online/offline signal.
pub mod connectivity;
/// Book download orchestration.
pub mod download;
/// Admin content drafts.
pub mod drafts;
/// Error types.
pub mod error;
/// Local persistent store.
pub mod store;
/// Background progress sync.
pub mod sync;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use connectivity::Connectivity;
pub use download::DownloadManager;
pub use drafts::AdminDraftManager;
pub use error::{AppError, Result};
pub use store::Database;
pub use sync::SyncManager;
