//! # Account Binder
//!
//! Binds a local account to an external identity.
//!
//! ## Overview
//!
//! A bind request carries a raw token. The binder asks the external service
//! who the token belongs to, then seals and stores it together with that
//! external id. Binding an already bound account replaces the token and
//! external id (re-binding); derived data is left alone until the next sync.
//!
//! ```text
//! bind(local, token)
//!   └─ fetch_viewer(token)  ── rejected ──> AuthError::AuthInvalid
//!        └─ vault.set_token(local, viewer.id, token)
//!             └─ AccountEvent::Bound | AccountEvent::Rebound
//! ```

use crate::error::{AuthError, Result};
use crate::vault::{AccessToken, CredentialVault};
use bridge_traits::{BridgeError, ExternalAccountId, MediaListProvider, Viewer};
use core_library::{LocalAccountId, UpsertOutcome};
use core_runtime::events::{AccountEvent, CoreEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

/// Result of a successful bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindOutcome {
    pub viewer: Viewer,
    /// An existing binding was replaced
    pub rebound: bool,
}

pub struct AccountBinder {
    vault: Arc<CredentialVault>,
    provider: Arc<dyn MediaListProvider>,
    event_bus: EventBus,
    request_timeout: Duration,
}

impl AccountBinder {
    pub fn new(
        vault: Arc<CredentialVault>,
        provider: Arc<dyn MediaListProvider>,
        event_bus: EventBus,
        request_timeout: Duration,
    ) -> Self {
        Self {
            vault,
            provider,
            event_bus,
            request_timeout,
        }
    }

    /// Validate `raw_token` against the external service and store it.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AuthInvalid`] when the token is empty or rejected
    /// - [`AuthError::Timeout`] / [`AuthError::Provider`] when the service
    ///   could not answer
    #[instrument(skip(self, raw_token), fields(local_id = %local_id))]
    pub async fn bind(&self, local_id: &LocalAccountId, raw_token: AccessToken) -> Result<BindOutcome> {
        if raw_token.expose().trim().is_empty() {
            return Err(AuthError::AuthInvalid("Invalid token".to_string()));
        }

        let viewer = self.resolve_viewer(&raw_token).await?;
        let external_id = ExternalAccountId::new(viewer.id);

        let outcome = self.vault.set_token(local_id, external_id, &raw_token).await?;
        let rebound = outcome == UpsertOutcome::Updated;

        let event = if rebound {
            AccountEvent::Rebound {
                local_id: local_id.to_string(),
                external_id: viewer.id,
            }
        } else {
            AccountEvent::Bound {
                local_id: local_id.to_string(),
                external_id: viewer.id,
            }
        };
        let _ = self.event_bus.emit(CoreEvent::Account(event));

        info!(external_id = viewer.id, rebound, "Account bound");
        Ok(BindOutcome { viewer, rebound })
    }

    async fn resolve_viewer(&self, token: &AccessToken) -> Result<Viewer> {
        match timeout(self.request_timeout, self.provider.fetch_viewer(token.expose())).await {
            Ok(Ok(viewer)) => Ok(viewer),
            Ok(Err(BridgeError::Unauthorized(reason))) => {
                warn!(reason = %reason, "Token rejected by external service");
                Err(AuthError::AuthInvalid("Invalid token".to_string()))
            }
            Ok(Err(BridgeError::Timeout(reason))) => {
                error!(reason = %reason, "Viewer lookup timed out in transport");
                Err(AuthError::Timeout {
                    operation: "viewer lookup".to_string(),
                    after: self.request_timeout,
                })
            }
            Ok(Err(e)) => {
                error!(error = %e, "Viewer lookup failed");
                Err(AuthError::Provider(e.to_string()))
            }
            Err(_) => {
                error!(timeout = ?self.request_timeout, "Viewer lookup timed out");
                Err(AuthError::Timeout {
                    operation: "viewer lookup".to_string(),
                    after: self.request_timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sealed_box::{AesGcmSealedBox, EncryptionKey};
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{MediaKind, MediaListCollection, SystemClock};
    use core_library::db::create_test_pool;
    use core_library::SqliteAccountRepository;
    use mockall::mock;

    mock! {
        Provider {}

        #[async_trait]
        impl MediaListProvider for Provider {
            async fn fetch_viewer(&self, token: &str) -> BridgeResult<Viewer>;
            async fn fetch_media_collection(
                &self,
                external_id: ExternalAccountId,
                kind: MediaKind,
                token: &str,
            ) -> BridgeResult<Option<MediaListCollection>>;
        }
    }

    async fn binder(provider: MockProvider) -> (Arc<CredentialVault>, AccountBinder, EventBus) {
        let vault = Arc::new(CredentialVault::new(
            Arc::new(SqliteAccountRepository::new(create_test_pool().await.unwrap())),
            Arc::new(AesGcmSealedBox::new(&EncryptionKey::generate())),
            Arc::new(SystemClock),
        ));
        let bus = EventBus::new(16);
        let binder = AccountBinder::new(
            vault.clone(),
            Arc::new(provider),
            bus.clone(),
            Duration::from_millis(200),
        );
        (vault, binder, bus)
    }

    #[tokio::test]
    async fn test_bind_then_rebind() {
        let mut provider = MockProvider::new();
        provider.expect_fetch_viewer().returning(|token| {
            let id = if token == "first" { 10 } else { 11 };
            Ok(Viewer {
                id,
                name: "hina".to_string(),
            })
        });
        let (vault, binder, bus) = binder(provider).await;
        let mut events = bus.subscribe();
        let id = LocalAccountId::new("3001");

        let first = binder.bind(&id, AccessToken::new("first")).await.unwrap();
        assert!(!first.rebound);
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Account(AccountEvent::Bound {
                local_id: "3001".to_string(),
                external_id: 10
            })
        );

        let second = binder.bind(&id, AccessToken::new("second")).await.unwrap();
        assert!(second.rebound);
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Account(AccountEvent::Rebound { external_id: 11, .. })
        ));

        let creds = vault.get_token(&id).await.unwrap();
        assert_eq!(creds.external_id, ExternalAccountId::new(11));
        assert_eq!(creds.token.expose(), "second");
    }

    #[tokio::test]
    async fn test_rejected_token_stores_nothing() {
        let mut provider = MockProvider::new();
        provider
            .expect_fetch_viewer()
            .returning(|_| Err(BridgeError::Unauthorized("401".to_string())));
        let (vault, binder, _) = binder(provider).await;
        let id = LocalAccountId::new("3001");

        let err = binder.bind(&id, AccessToken::new("bad")).await.unwrap_err();
        assert!(matches!(err, AuthError::AuthInvalid(_)));
        assert!(vault.external_id(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_token_is_rejected_without_calling_provider() {
        let mut provider = MockProvider::new();
        provider.expect_fetch_viewer().never();
        let (_, binder, _) = binder(provider).await;

        let err = binder
            .bind(&"3001".into(), AccessToken::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthInvalid(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_auth_invalid() {
        let mut provider = MockProvider::new();
        provider
            .expect_fetch_viewer()
            .returning(|_| Err(BridgeError::OperationFailed("502".to_string())));
        let (_, binder, _) = binder(provider).await;

        let err = binder
            .bind(&"3001".into(), AccessToken::new("tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Provider(_)));
        assert!(!err.requires_rebind());
    }
}
