//! # Host Bridge Traits
//!
//! Collaborator contracts the list synchronization core depends on but does
//! not implement.
//!
//! ## Overview
//!
//! The core coordinates caching, indexing and scheduling. Talking to the
//! external list-tracking API and protecting credentials are host concerns;
//! this crate defines the seams where the host plugs those in.
//!
//! ## Traits
//!
//! ### External service
//! - [`MediaListProvider`](media::MediaListProvider) - GraphQL client abstraction
//!   (`fetch_viewer`, `fetch_media_collection`)
//!
//! ### Security
//! - [`SealedBox`](crypto::SealedBox) - Encrypt/decrypt credential material
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits return [`BridgeError`](error::BridgeError). Implementations
//! must keep [`BridgeError::Unauthorized`] distinct from transport failures:
//! the core turns the former into "re-bind required" and the latter into a
//! retryable sync failure.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`; bridges are shared across the
//! interactive path and the scheduler task behind `Arc`.

pub mod crypto;
pub mod error;
pub mod media;
pub mod time;

pub use error::BridgeError;

pub use crypto::SealedBox;
pub use media::{
    AiringSchedule, ExternalAccountId, ListOwner, MediaId, MediaKind, MediaList,
    MediaListCollection, MediaListEntry, MediaListProvider, MediaPayload, MediaTitle, Viewer,
};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
