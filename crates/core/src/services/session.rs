//! Login session revocation against each region's auth service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::debug;
use twinchat_common::config::{BackendsConfig, SessionConfig};
use twinchat_common::{AppError, AppResult, BestEffort, Region};

/// Invalidates a session token at the auth layer.
#[async_trait]
pub trait SessionRevoker: Send + Sync {
    /// Revoke a token. An already-invalid token counts as revoked.
    async fn revoke(&self, session_token: &str) -> AppResult<()>;
}

/// Where and how to send a revocation.
#[derive(Debug, Clone)]
enum RevokeTarget {
    /// `POST {auth_url}/logout?scope=local` with the session as bearer.
    Global {
        auth_url: String,
        service_key: Option<String>,
    },
    /// `POST {endpoint}/v1/envs/{env_id}/auth/sessions/revoke`.
    Cn {
        endpoint: String,
        env_id: String,
        api_key: String,
    },
}

/// Revoker that calls the region's auth HTTP API.
pub struct HttpSessionRevoker {
    client: Client,
    target: RevokeTarget,
}

impl HttpSessionRevoker {
    /// Build the revoker for a region, if that region has an auth endpoint.
    pub fn for_region(region: Region, backends: &BackendsConfig) -> AppResult<Option<Self>> {
        let target = match region {
            Region::Global => backends.global.as_ref().and_then(|g| {
                g.auth_url.as_ref().map(|auth_url| RevokeTarget::Global {
                    auth_url: auth_url.trim_end_matches('/').to_string(),
                    service_key: g.service_key.clone(),
                })
            }),
            Region::Cn => backends.cn.as_ref().map(|c| RevokeTarget::Cn {
                endpoint: c.endpoint.trim_end_matches('/').to_string(),
                env_id: c.env_id.clone(),
                api_key: c.api_key.clone(),
            }),
        };

        let Some(target) = target else {
            return Ok(None);
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Some(Self { client, target }))
    }
}

#[async_trait]
impl SessionRevoker for HttpSessionRevoker {
    async fn revoke(&self, session_token: &str) -> AppResult<()> {
        let request = match &self.target {
            RevokeTarget::Global {
                auth_url,
                service_key,
            } => {
                let mut request = self
                    .client
                    .post(format!("{auth_url}/logout?scope=local"))
                    .bearer_auth(session_token);
                if let Some(key) = service_key {
                    request = request.header("apikey", key);
                }
                request
            }
            RevokeTarget::Cn {
                endpoint,
                env_id,
                api_key,
            } => self
                .client
                .post(format!("{endpoint}/v1/envs/{env_id}/auth/sessions/revoke"))
                .bearer_auth(api_key)
                .json(&json!({ "session_token": session_token })),
        };

        let response = request
            .send()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED => {
                debug!("Session already invalid at auth layer");
                Ok(())
            }
            s => Err(AppError::ExternalService(format!(
                "session revocation returned {s}"
            ))),
        }
    }
}

/// Revoke with bounded retries and exponential backoff.
pub async fn revoke_with_retry(
    revoker: Option<&Arc<dyn SessionRevoker>>,
    session_token: &str,
    policy: &SessionConfig,
) -> BestEffort {
    let Some(revoker) = revoker else {
        return BestEffort::Skipped("no auth endpoint configured".to_string());
    };

    let attempts = policy.revoke_attempts.max(1);
    let mut delay = Duration::from_millis(policy.revoke_backoff_ms);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match revoker.revoke(session_token).await {
            Ok(()) => return BestEffort::Applied,
            Err(e) => {
                debug!(attempt, error = %e, "Session revocation attempt failed");
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    BestEffort::Failed(format!("{attempts} attempts: {last_error}"))
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::testing::ScriptedRevoker;
    use super::*;
    use std::sync::atomic::Ordering;
    use twinchat_common::config::{CnBackendConfig, GlobalBackendConfig};

    fn policy(attempts: u32) -> SessionConfig {
        SessionConfig {
            revoke_attempts: attempts,
            revoke_backoff_ms: 10,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let scripted = Arc::new(ScriptedRevoker::failing(2));
        let revoker: Arc<dyn SessionRevoker> = scripted.clone();

        let outcome = revoke_with_retry(Some(&revoker), "tok", &policy(3)).await;
        assert_eq!(outcome, BestEffort::Applied);
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 3);
        assert_eq!(scripted.revoked.lock().unwrap().as_slice(), ["tok"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_bounded_attempts() {
        let scripted = Arc::new(ScriptedRevoker::failing(10));
        let revoker: Arc<dyn SessionRevoker> = scripted.clone();

        let outcome = revoke_with_retry(Some(&revoker), "tok", &policy(3)).await;
        assert!(matches!(outcome, BestEffort::Failed(_)));
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_without_revoker_is_skipped() {
        let outcome = revoke_with_retry(None, "tok", &policy(3)).await;
        assert!(matches!(outcome, BestEffort::Skipped(_)));
    }

    #[test]
    fn test_for_region_requires_auth_endpoint() {
        let mut backends = BackendsConfig::default();
        assert!(HttpSessionRevoker::for_region(Region::Global, &backends).unwrap().is_none());
        assert!(HttpSessionRevoker::for_region(Region::Cn, &backends).unwrap().is_none());

        backends.global = Some(GlobalBackendConfig {
            database_url: "postgres://localhost/twinchat".to_string(),
            max_connections: 5,
            min_connections: 1,
            auth_url: None,
            service_key: None,
        });
        assert!(HttpSessionRevoker::for_region(Region::Global, &backends).unwrap().is_none());

        backends.cn = Some(CnBackendConfig {
            endpoint: "https://db.example.cn".to_string(),
            env_id: "prod".to_string(),
            api_key: "key".to_string(),
            timeout_secs: 5,
        });
        assert!(HttpSessionRevoker::for_region(Region::Cn, &backends).unwrap().is_some());
    }
}
