//! Tenant access token acquisition and caching.
//!
//! The tabular backend's REST API is bearer-authenticated with a
//! short-lived tenant token fetched from `app_id`/`app_secret`. A single
//! cached token is shared across calls and refreshed shortly before
//! expiry.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use cw_domain::error::{Error, Result};

use crate::util::from_reqwest;

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct TokenCache {
    app_id: String,
    app_secret: String,
    base_url: String,
    client: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            cached: RwLock::new(None),
        }
    }

    /// Returns a valid tenant access token, refreshing if expired or
    /// within 60 seconds of expiry.
    pub async fn get(&self) -> Result<String> {
        {
            let guard = self.cached.read().await;
            if let Some(tok) = guard.as_ref() {
                if tok.expires_at > Utc::now() + chrono::Duration::seconds(60) {
                    return Ok(tok.value.clone());
                }
            }
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<String> {
        let url = format!("{}/auth/v3/tenant_access_token/internal", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "app_id": self.app_id,
                "app_secret": self.app_secret,
            }))
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Auth(format!("token acquisition failed: HTTP {status}")));
        }

        let body: serde_json::Value = resp.json().await.map_err(from_reqwest)?;
        let code = body["code"].as_i64().unwrap_or(-1);
        if code != 0 {
            let msg = body["msg"].as_str().unwrap_or("unknown error");
            return Err(Error::Auth(format!("token acquisition failed: {msg}")));
        }

        let token = body["tenant_access_token"]
            .as_str()
            .ok_or_else(|| Error::Auth("missing tenant_access_token in response".into()))?
            .to_string();
        let expire_seconds = body["expire"].as_i64().unwrap_or(7200);

        let mut guard = self.cached.write().await;
        *guard = Some(CachedToken {
            value: token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(expire_seconds),
        });
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_starts_empty_and_requires_refresh() {
        let cache = TokenCache::new("id", "secret", "http://127.0.0.1:0");
        let guard = cache.cached.read().await;
        assert!(guard.is_none());
    }
}
