//! Workspace facade crate.
//!
//! Host applications depend on `listsync-workspace` and reach the list
//! synchronization core through the [`core_service`] re-export, without
//! wiring each workspace crate individually.

pub use core_service::*;
