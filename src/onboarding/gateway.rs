//! AuthGateway — remote commits of draft fields, account type, and completion.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::GatewayConfig;
use crate::error::NetworkError;

use super::model::{AccountType, ProfileDraft};

/// Remote account backend. Every call is idempotent.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Merge `fields` into the user's remote profile.
    async fn commit_fields(&self, fields: &ProfileDraft) -> Result<(), NetworkError>;

    async fn set_account_type(&self, account_type: AccountType) -> Result<(), NetworkError>;

    /// Mark the remote account as fully onboarded.
    async fn complete_onboarding(&self) -> Result<(), NetworkError>;
}

// ── HTTP implementation ─────────────────────────────────────────────

const PROFILE_PATH: &str = "/v1/profile";
const ACCOUNT_TYPE_PATH: &str = "/v1/profile/account-type";
const COMPLETE_PATH: &str = "/v1/onboarding/complete";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountTypeBody {
    account_type: AccountType,
}

/// REST client for the marketplace account API.
pub struct HttpAuthGateway {
    base_url: String,
    token: SecretString,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpAuthGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| NetworkError::RequestFailed {
                endpoint: config.base_url.clone(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            timeout: config.request_timeout,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, path: &str, request: reqwest::RequestBuilder) -> Result<(), NetworkError> {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| self.map_transport_error(path, e))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(endpoint = path, status = status.as_u16(), "Gateway call succeeded");
            return Ok(());
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(NetworkError::Unauthorized {
                endpoint: path.to_string(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(endpoint = path, status = status.as_u16(), "Gateway call rejected");
        Err(NetworkError::Status {
            endpoint: path.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    fn map_transport_error(&self, path: &str, e: reqwest::Error) -> NetworkError {
        if e.is_timeout() {
            NetworkError::Timeout {
                endpoint: path.to_string(),
                timeout: self.timeout,
            }
        } else {
            NetworkError::RequestFailed {
                endpoint: path.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn commit_fields(&self, fields: &ProfileDraft) -> Result<(), NetworkError> {
        let request = self.client.patch(self.url(PROFILE_PATH)).json(fields);
        self.send(PROFILE_PATH, request).await
    }

    async fn set_account_type(&self, account_type: AccountType) -> Result<(), NetworkError> {
        let request = self
            .client
            .put(self.url(ACCOUNT_TYPE_PATH))
            .json(&AccountTypeBody { account_type });
        self.send(ACCOUNT_TYPE_PATH, request).await
    }

    async fn complete_onboarding(&self) -> Result<(), NetworkError> {
        let request = self.client.post(self.url(COMPLETE_PATH));
        self.send(COMPLETE_PATH, request).await
    }
}

// ── In-memory implementation ────────────────────────────────────────

/// What the in-memory backend currently holds for the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteProfile {
    pub fields: ProfileDraft,
    pub account_type: Option<AccountType>,
    pub onboarded: bool,
}

/// Number of calls made per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub commit_fields: usize,
    pub set_account_type: usize,
    pub complete_onboarding: usize,
}

#[derive(Default)]
struct Inner {
    remote: RemoteProfile,
    calls: CallCounts,
    fail_commits: usize,
    fail_account_type: usize,
    fail_completion: usize,
}

/// Backend stand-in for tests and offline previews.
///
/// Failures can be injected per operation; each injected failure is consumed
/// by one call.
#[derive(Default)]
pub struct InMemoryAuthGateway {
    inner: Mutex<Inner>,
}

impl InMemoryAuthGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `n` `commit_fields` calls fail.
    pub fn fail_next_commits(&self, n: usize) {
        self.inner().fail_commits = n;
    }

    pub fn fail_next_account_type(&self, n: usize) {
        self.inner().fail_account_type = n;
    }

    pub fn fail_next_completion(&self, n: usize) {
        self.inner().fail_completion = n;
    }

    pub fn remote(&self) -> RemoteProfile {
        self.inner().remote.clone()
    }

    pub fn calls(&self) -> CallCounts {
        self.inner().calls
    }
}

fn injected(endpoint: &str) -> NetworkError {
    NetworkError::RequestFailed {
        endpoint: endpoint.to_string(),
        reason: "injected failure".to_string(),
    }
}

/// Consume one injected failure if any are pending.
fn take_failure(remaining: &mut usize) -> bool {
    if *remaining > 0 {
        *remaining -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl AuthGateway for InMemoryAuthGateway {
    async fn commit_fields(&self, fields: &ProfileDraft) -> Result<(), NetworkError> {
        let mut inner = self.inner();
        inner.calls.commit_fields += 1;
        if take_failure(&mut inner.fail_commits) {
            return Err(injected(PROFILE_PATH));
        }
        inner.remote.fields.merge(fields.clone());
        Ok(())
    }

    async fn set_account_type(&self, account_type: AccountType) -> Result<(), NetworkError> {
        let mut inner = self.inner();
        inner.calls.set_account_type += 1;
        if take_failure(&mut inner.fail_account_type) {
            return Err(injected(ACCOUNT_TYPE_PATH));
        }
        inner.remote.account_type = Some(account_type);
        Ok(())
    }

    async fn complete_onboarding(&self) -> Result<(), NetworkError> {
        let mut inner = self.inner();
        inner.calls.complete_onboarding += 1;
        if take_failure(&mut inner.fail_completion) {
            return Err(injected(COMPLETE_PATH));
        }
        inner.remote.onboarded = true;
        Ok(())
    }
}
