//! # Authentication Module
//!
//! Account binding and encrypted credential storage.
//!
//! ## Overview
//!
//! - [`CredentialVault`] seals tokens with the host's [`SealedBox`] and opens
//!   them on demand (`get_token`, `set_token`, `clear`).
//! - [`AccountBinder`] validates a raw token against the external service
//!   before storing it, and re-binds when the account already exists.
//! - [`AesGcmSealedBox`] is a ready-made sealed box for hosts that keep a
//!   local key.
//!
//! [`SealedBox`]: bridge_traits::SealedBox

pub mod binder;
pub mod error;
pub mod sealed_box;
pub mod vault;

pub use binder::{AccountBinder, BindOutcome};
pub use error::{AuthError, Result};
pub use sealed_box::{AesGcmSealedBox, EncryptionKey};
pub use vault::{AccessToken, BoundCredentials, CredentialVault};
