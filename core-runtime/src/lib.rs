//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the list synchronization core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its configuration types,
//! logging conventions and the broadcast channel used to surface account,
//! sync and scheduler activity to the host.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CacheBackend, CoreConfig, CoreConfigBuilder, SyncSettings};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus};
