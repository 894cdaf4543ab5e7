//! # Repository Pattern Implementation
//!
//! Traits define each store's contract; SQLite implementations use sqlx
//! against the pool created by [`crate::db::create_pool`].
//!
//! ## Available Repositories
//!
//! - `AccountRepository` - Local account bindings and sealed tokens
//! - `ReverseIndexStore` - Media id to tracking accounts, per media kind
//! - `ScheduleRepository` - Recurring job records

pub mod account;
pub mod media_stats;
pub mod schedule;

pub use account::{AccountRepository, SqliteAccountRepository, UpsertOutcome};
pub use media_stats::{ReverseIndexStore, SqliteReverseIndexStore, TrackOutcome, UntrackOutcome};
pub use schedule::{ScheduleRepository, SqliteScheduleRepository};
