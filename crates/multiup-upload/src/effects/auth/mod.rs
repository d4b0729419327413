//! Authentication against hosts, one strategy per [`AuthKind`].

mod api_key;
mod session_login;
mod token_login;

use std::sync::Arc;

use multiup_hosts::{AuthKind, HostDescriptor};
use tracing::{debug, info, warn};

use crate::data::{AuthContext, AuthMaterial, CachedToken, Credential, SessionBundle, Secret};
use crate::effects::http::HttpTransport;
use crate::effects::token_store::TokenStore;
use crate::error::{Result, UploadError};

/// Produces [`AuthContext`]s for hosts, caching what it can in the [`TokenStore`].
pub struct AuthProvider<T> {
    transport: Arc<T>,
    store: Arc<TokenStore>,
    safety_margin_secs: u64,
}

impl<T> std::fmt::Debug for AuthProvider<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthProvider")
            .field("store", &self.store)
            .field("safety_margin_secs", &self.safety_margin_secs)
            .finish_non_exhaustive()
    }
}

impl<T: HttpTransport> AuthProvider<T> {
    pub fn new(transport: Arc<T>, store: Arc<TokenStore>, safety_margin_secs: u64) -> Self {
        Self {
            transport,
            store,
            safety_margin_secs,
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Check that `credential` has the shape `host` needs and is not blank.
    ///
    /// Runs once when a host is enabled for a gallery, not per task.
    pub fn validate_credential(host: &HostDescriptor, credential: Option<&Credential>) -> Result<()> {
        match (host.auth_kind, credential) {
            (AuthKind::ApiKey, Some(Credential::ApiKey(key))) if !key.is_blank() => Ok(()),
            (AuthKind::ApiKey, _) => Err(UploadError::Validation(format!(
                "{} needs a non-empty API key",
                host.id
            ))),
            (
                AuthKind::TokenLogin | AuthKind::SessionLogin,
                Some(Credential::Login { username, password }),
            ) if !username.trim().is_empty() && !password.is_blank() => Ok(()),
            (AuthKind::TokenLogin | AuthKind::SessionLogin, _) => Err(UploadError::Validation(format!(
                "{} needs a username and password",
                host.id
            ))),
        }
    }

    /// Return a ready-to-use context for `host`, logging in if the cached
    /// token is missing or too close to expiry.
    ///
    /// Concurrent callers for the same host share one login: the first one
    /// in refreshes while the rest wait and then reuse its token, or get
    /// its error if it failed.
    pub async fn ensure_authenticated(&self, host: &HostDescriptor, credential: &Credential) -> Result<AuthContext> {
        if host.auth_kind == AuthKind::ApiKey {
            return api_key::context(host, credential);
        }

        if let Some(token) = self.store.fresh(&host.id, self.safety_margin_secs) {
            return to_context(host, &token);
        }

        let gate = self.store.refresh_gate(&host.id);
        let turn = gate.enter().await;

        // another caller may have refreshed while we waited
        if let Some(token) = self.store.fresh(&host.id, self.safety_margin_secs) {
            debug!(host = %host.id, "reusing token refreshed by a concurrent task");
            return to_context(host, &token);
        }
        if let Some(error) = turn.shared_failure() {
            debug!(host = %host.id, error = %error, "earlier login failed, not retrying it");
            return Err(error);
        }

        let token = self.login(host, credential).await;
        turn.finish(&token);
        to_context(host, &*token?)
    }

    async fn login(&self, host: &HostDescriptor, credential: &Credential) -> Result<Arc<CachedToken>> {
        let (username, password) = login_parts(host, credential)?;
        info!(host = %host.id, kind = %host.auth_kind, "logging in");
        let token = match host.auth_kind {
            AuthKind::TokenLogin => token_login::login(self.transport.as_ref(), host, username, password).await?,
            AuthKind::SessionLogin => session_login::login(self.transport.as_ref(), host, username, password).await?,
            AuthKind::ApiKey => {
                return Err(UploadError::Validation(format!("{} takes an API key, not a login", host.id)));
            }
        };
        self.store.put(&host.id, token)
    }

    /// Drop any cached session and log in again.
    ///
    /// Used before creating a gallery container so that no cookie or token
    /// from an unrelated earlier session is reused.
    pub async fn fresh_session(&self, host: &HostDescriptor, credential: &Credential) -> Result<AuthContext> {
        if host.auth_kind != AuthKind::ApiKey {
            self.store.invalidate(&host.id)?;
        }
        self.ensure_authenticated(host, credential).await
    }

    /// Whether an error response means the cached authentication is stale.
    pub fn looks_like_stale_auth(&self, host: &HostDescriptor, body: Option<&str>, status: Option<u16>) -> bool {
        crate::core::looks_like_stale_auth(host, body, status)
    }

    /// Forget the cached token for `host`, but only if it is still the one
    /// `seen` was built from.
    pub fn invalidate(&self, host: &HostDescriptor, seen: &AuthContext) -> Result<()> {
        if host.auth_kind == AuthKind::ApiKey {
            return Ok(());
        }
        match self.store.get(&host.id) {
            Some(current) if to_context(host, &current).is_ok_and(|ctx| ctx == *seen) => {
                warn!(host = %host.id, "invalidating stale token");
                self.store.invalidate_if(&host.id, &current)?;
            }
            Some(_) => debug!(host = %host.id, "token already replaced, keeping it"),
            None => {}
        }
        Ok(())
    }
}

fn login_parts<'a>(host: &HostDescriptor, credential: &'a Credential) -> Result<(&'a str, &'a str)> {
    match credential {
        Credential::Login { username, password } if !username.trim().is_empty() && !password.is_blank() => {
            Ok((username.as_str(), password.expose()))
        }
        _ => Err(UploadError::Validation(format!(
            "{} needs a username and password",
            host.id
        ))),
    }
}

fn to_context(host: &HostDescriptor, token: &CachedToken) -> Result<AuthContext> {
    let material = match host.auth_kind {
        AuthKind::SessionLogin => {
            let session: SessionBundle = serde_json::from_str(&token.value)
                .map_err(|e| UploadError::auth(format!("cached session for {} is corrupt: {e}", host.id)))?;
            AuthMaterial::Session(session)
        }
        _ => AuthMaterial::Bearer(Secret::new(token.value.clone())),
    };
    Ok(AuthContext::new(host.id.clone(), material))
}
