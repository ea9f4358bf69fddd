//! OAuth authorization-code grant orchestration
//!
//! `begin_authorization` mints a state and hands out the provider's
//! authorization URL. `complete_authorization` runs on the callback:
//! consume the state, exchange the code, fetch the profile, store the
//! credential, return the subject id. The state is consumed before any
//! upstream call, so a forged or replayed callback never reaches GitHub.

use std::sync::Arc;

use provider::Provider;
use serde::Serialize;
use session::{CredentialStore, PendingAuthRegistry, SubjectId};
use tracing::{info, instrument, warn};

use crate::error::ApiError;
use crate::metrics;

/// Response of `GET /auth/github`
#[derive(Debug, Serialize)]
pub struct AuthorizationRequest {
    pub auth_url: String,
    pub state: String,
}

pub struct AuthorizationFlow {
    provider: Arc<dyn Provider>,
    pending: Arc<PendingAuthRegistry>,
    credentials: Arc<CredentialStore>,
}

impl AuthorizationFlow {
    pub fn new(
        provider: Arc<dyn Provider>,
        pending: Arc<PendingAuthRegistry>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            provider,
            pending,
            credentials,
        }
    }

    pub async fn begin_authorization(&self) -> AuthorizationRequest {
        let state = self.pending.issue().await;
        let auth_url = self.provider.authorization_url(&state);
        info!(provider = self.provider.id(), "authorization initiated");
        AuthorizationRequest { auth_url, state }
    }

    /// Finish the grant for a callback carrying `code` and `state`.
    #[instrument(skip_all, fields(provider = self.provider.id()))]
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> Result<SubjectId, ApiError> {
        let result = self.complete(code, state).await;
        match &result {
            Ok(subject_id) => {
                metrics::record_authorization("success");
                info!(subject_id, "authorization completed");
            }
            Err(e) => {
                metrics::record_authorization(e.kind());
                warn!(error = %e, "authorization failed");
            }
        }
        result
    }

    async fn complete(&self, code: &str, state: &str) -> Result<SubjectId, ApiError> {
        if !self.pending.consume(state).await {
            return Err(ApiError::InvalidState);
        }

        let token = self.provider.exchange_code(code).await.map_err(|e| {
            metrics::record_upstream_error(e.kind());
            ApiError::TokenExchangeFailed(e.to_string())
        })?;

        let profile = self.provider.fetch_profile(&token).await.map_err(|e| {
            metrics::record_upstream_error(e.kind());
            ApiError::ProfileFetchFailed(e.to_string())
        })?;

        let subject_id = self.provider.subject_id(&profile).ok_or_else(|| {
            ApiError::ProfileFetchFailed("profile has no numeric id".to_string())
        })?;

        self.credentials
            .put(subject_id, token, profile)
            .await
            .map_err(|e| ApiError::Storage(e.to_string()))?;

        Ok(subject_id)
    }

    /// Callback that carries an `error` instead of a code (user pressed
    /// "Cancel", app suspended, ...). The state is still consumed.
    pub async fn deny_authorization(&self, state: &str, error: &str) -> ApiError {
        let err = if self.pending.consume(state).await {
            ApiError::AuthorizationDenied(error.to_string())
        } else {
            ApiError::InvalidState
        };
        metrics::record_authorization(err.kind());
        warn!(error, "authorization not granted");
        err
    }

    /// Forget the credential for `subject_id`.
    pub async fn revoke(&self, subject_id: SubjectId) -> Result<(), ApiError> {
        let removed = self
            .credentials
            .remove(subject_id)
            .await
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        match removed {
            Some(_) => {
                info!(subject_id, "credential revoked");
                Ok(())
            }
            None => Err(ApiError::Unauthenticated),
        }
    }
}
