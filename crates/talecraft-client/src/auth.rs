//! Credential capability consumed by the request executor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

/// Opaque bearer token. Never persisted by the client.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", talecraft_logging::redact_token(&self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("credential refresh failed: {0}")]
pub struct AuthError(pub String);

/// Source of bearer credentials, owned by the host application
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Credential to attach to the next request, `None` for anonymous calls
    async fn current_token(&self) -> Option<Credential>;

    /// Obtain a new credential after the server rejected the current one
    async fn refresh(&self) -> Result<Credential, AuthError>;
}

/// No credentials at all; every request goes out unauthenticated
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

#[async_trait]
impl AuthProvider for Anonymous {
    async fn current_token(&self) -> Option<Credential> {
        None
    }

    async fn refresh(&self) -> Result<Credential, AuthError> {
        Err(AuthError("no credential source configured".to_string()))
    }
}

/// A fixed token, e.g. from the environment
#[derive(Debug, Clone)]
pub struct StaticToken {
    credential: Credential,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credential: Credential::new(token),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticToken {
    async fn current_token(&self) -> Option<Credential> {
        Some(self.credential.clone())
    }

    async fn refresh(&self) -> Result<Credential, AuthError> {
        Ok(self.credential.clone())
    }
}

/// Wraps a provider so concurrent refreshes share one underlying call.
///
/// A caller that queued behind an in-flight refresh reuses its result instead
/// of refreshing again.
pub struct CoalescingAuth {
    inner: Arc<dyn AuthProvider>,
    latest: Mutex<Option<Credential>>,
    generation: AtomicU64,
}

impl CoalescingAuth {
    pub fn new(inner: Arc<dyn AuthProvider>) -> Self {
        Self {
            inner,
            latest: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl AuthProvider for CoalescingAuth {
    async fn current_token(&self) -> Option<Credential> {
        self.inner.current_token().await
    }

    async fn refresh(&self) -> Result<Credential, AuthError> {
        let seen = self.generation.load(Ordering::SeqCst);
        let mut latest = self.latest.lock().await;

        if self.generation.load(Ordering::SeqCst) != seen {
            if let Some(credential) = latest.as_ref() {
                log::debug!("reusing credential from concurrent refresh");
                return Ok(credential.clone());
            }
        }

        let credential = self.inner.refresh().await?;
        *latest = Some(credential.clone());
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(credential)
    }
}
