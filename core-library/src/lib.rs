//! # Library Storage Module
//!
//! Durable and cached state behind list synchronization.
//!
//! ## Overview
//!
//! This crate manages:
//! - SQLite schema, migrations and pooling ([`db`])
//! - Account bindings, the per-kind reverse index and schedule records
//!   ([`repositories`])
//! - The TTL cache for list snapshots, media documents and alias lookups
//!   ([`cache`])

pub mod cache;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use cache::{CacheStore, MediaCache, MemoryCacheStore, SqliteCacheStore};
pub use error::{LibraryError, Result};
pub use models::{
    Account, AnimeDoc, ListSnapshot, LocalAccountId, MangaDoc, MediaCommon, MediaDocument,
    MediaStatEntry, ScheduleRecord, SnapshotEntry, SnapshotUser, Tracker, SYNC_JOB_TYPE,
};
pub use repositories::{
    AccountRepository, ReverseIndexStore, ScheduleRepository, SqliteAccountRepository,
    SqliteReverseIndexStore, SqliteScheduleRepository, TrackOutcome, UntrackOutcome,
    UpsertOutcome,
};
