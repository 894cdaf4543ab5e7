//! # Credential Vault
//!
//! Per-account encrypted token storage.
//!
//! ## Overview
//!
//! Tokens are sealed with the injected [`SealedBox`] before they reach the
//! `accounts` table and opened on every read; the raw credential is never
//! persisted or logged. Clearing a binding does not purge derived data
//! (reverse-index trackers, cached snapshots); callers run the wipe flow for
//! that.

use crate::error::{AuthError, Result};
use bridge_traits::{Clock, ExternalAccountId, SealedBox};
use core_library::{AccountRepository, LocalAccountId, UpsertOutcome};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A decrypted access token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for handing to the list provider.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// What the synchronizer needs to call the external service for an account.
#[derive(Debug, Clone)]
pub struct BoundCredentials {
    pub local_id: LocalAccountId,
    pub external_id: ExternalAccountId,
    pub token: AccessToken,
}

pub struct CredentialVault {
    accounts: Arc<dyn AccountRepository>,
    sealed_box: Arc<dyn SealedBox>,
    clock: Arc<dyn Clock>,
}

impl CredentialVault {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        sealed_box: Arc<dyn SealedBox>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            sealed_box,
            clock,
        }
    }

    /// Open the stored token of `local_id`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotBound`] when the account has no binding
    /// - [`AuthError::DecryptionFailed`] when the sealed box cannot open the
    ///   stored blob
    #[instrument(skip(self), fields(local_id = %local_id))]
    pub async fn get_token(&self, local_id: &LocalAccountId) -> Result<BoundCredentials> {
        let account = self
            .accounts
            .find(local_id)
            .await?
            .ok_or_else(|| AuthError::NotBound {
                local_id: local_id.to_string(),
            })?;

        let plaintext = self
            .sealed_box
            .open(&account.encrypted_token)
            .await
            .map_err(|e| {
                warn!(error = %e, "Stored credential could not be opened");
                AuthError::DecryptionFailed(e.to_string())
            })?;

        let token = String::from_utf8(plaintext)
            .map_err(|_| AuthError::DecryptionFailed("credential is not valid UTF-8".to_string()))?;

        Ok(BoundCredentials {
            local_id: account.local_id,
            external_id: account.external_id,
            token: AccessToken(token),
        })
    }

    /// Seal `raw_token` and store it with the external id it belongs to.
    #[instrument(skip(self, raw_token), fields(local_id = %local_id, external_id = %external_id))]
    pub async fn set_token(
        &self,
        local_id: &LocalAccountId,
        external_id: ExternalAccountId,
        raw_token: &AccessToken,
    ) -> Result<UpsertOutcome> {
        let sealed = self
            .sealed_box
            .seal(raw_token.expose().as_bytes())
            .await
            .map_err(|e| AuthError::EncryptionFailed(e.to_string()))?;

        let outcome = self
            .accounts
            .upsert(local_id, external_id, &sealed, self.clock.unix_timestamp_millis())
            .await?;

        debug!(outcome = ?outcome, "Credential stored");
        Ok(outcome)
    }

    /// Remove the binding. Returns `false` when there was none.
    pub async fn clear(&self, local_id: &LocalAccountId) -> Result<bool> {
        Ok(self.accounts.delete(local_id).await?)
    }

    /// External id of a bound account, without opening the token.
    pub async fn external_id(&self, local_id: &LocalAccountId) -> Result<Option<ExternalAccountId>> {
        Ok(self.accounts.find(local_id).await?.map(|a| a.external_id))
    }
}
