// src/pfclient/oauth.rs
//! OAuth2 client-credentials token source.
//!
//! This module only performs the grant exchange against `{base}/oauth2/token`.
//! Caching, refresh scheduling, jitter and error backoff are handled by an
//! `aliri_tokens::TokenWatcher`, spawned on the first request that needs a
//! token.

use aliri_clock::DurationSecs;
use aliri_tokens::backoff::ErrorBackoffConfig;
use aliri_tokens::jitter::RandomEarlyJitter;
use aliri_tokens::sources::AsyncTokenSource;
use aliri_tokens::{
    AccessToken, IdToken, TokenLifetimeConfig, TokenStatus, TokenWatcher, TokenWithLifetime,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::error::ClientError;

/// Lifetime assumed when the server omits `expires_in`.
const DEFAULT_TTL_SECS: u64 = 3600;
/// Upper bound on the lifetime accepted from the server.
const MAX_TTL_SECS: u64 = 24 * 3600;
/// Refresh this long before expiry.
const REFRESH_OFFSET_SECS: u64 = 60;
const MIN_REFRESH_PERIOD: Duration = Duration::from_secs(10);
const JITTER_MAX_SECS: u64 = 5;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Posts the client-credentials grant; one call per token the watcher asks for.
#[derive(Clone)]
pub(crate) struct CredentialsSource {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    timeout: Duration,
}

impl CredentialsSource {
    pub(crate) fn new(
        http: Client,
        token_url: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id,
            client_secret,
            timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl AsyncTokenSource for CredentialsSource {
    type Error = ClientError;

    async fn request_token(&mut self) -> Result<TokenWithLifetime, Self::Error> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let resp = self
            .http
            .post(&self.token_url)
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await
            .map_err(|e| ClientError::Auth {
                status: 0,
                body: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| ClientError::Auth {
            status,
            body: e.to_string(),
        })?;
        if !(200..300).contains(&status) {
            tracing::warn!(target: "pfclient", status, "token request rejected");
            return Err(ClientError::Auth { status, body });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| ClientError::Auth {
            status,
            body: format!("malformed token response: {e}"),
        })?;
        if let Some(kind) = parsed.token_type.as_deref() {
            if !kind.eq_ignore_ascii_case("bearer") {
                return Err(ClientError::Auth {
                    status,
                    body: format!("unsupported token type `{kind}`"),
                });
            }
        }

        let lifetime = token_lifetime(parsed.expires_in);
        let (freshness, min_stale) = refresh_params(lifetime);
        tracing::debug!(target: "pfclient", lifetime, "access token acquired");

        let access_token = AccessToken::new(parsed.access_token);
        Ok(TokenLifetimeConfig::new(freshness, min_stale).create_token(
            &access_token,
            None::<&IdToken>,
            DurationSecs(lifetime),
        ))
    }
}

/// Server-reported lifetime, bounded to `1..=MAX_TTL_SECS`.
fn token_lifetime(expires_in: Option<u64>) -> u64 {
    expires_in.unwrap_or(DEFAULT_TTL_SECS).clamp(1, MAX_TTL_SECS)
}

/// Freshness fraction and minimum stale period so the token goes stale
/// `REFRESH_OFFSET_SECS` before expiry, or at half its lifetime when shorter.
fn refresh_params(lifetime_secs: u64) -> (f64, DurationSecs) {
    let desired_delay = if REFRESH_OFFSET_SECS < lifetime_secs {
        lifetime_secs - REFRESH_OFFSET_SECS
    } else {
        lifetime_secs / 2
    };
    let freshness = desired_delay as f64 / lifetime_secs as f64;
    let min_stale = MIN_REFRESH_PERIOD.as_secs().min(desired_delay);
    (freshness, DurationSecs(min_stale))
}

/// Bearer tokens for the API, backed by a lazily spawned watcher.
pub(crate) struct TokenSession {
    source: CredentialsSource,
    watcher: OnceCell<TokenWatcher>,
}

impl TokenSession {
    pub(crate) fn new(source: CredentialsSource) -> Self {
        Self {
            source,
            watcher: OnceCell::new(),
        }
    }

    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.source.timeout = timeout;
        self
    }

    /// Current access token. The first call performs the initial exchange;
    /// if it fails, the next call tries again.
    pub(crate) async fn bearer(&self) -> Result<String, ClientError> {
        let watcher = self
            .watcher
            .get_or_try_init(|| spawn_watcher(self.source.clone()))
            .await?;

        let token = watcher.token();
        if matches!(token.token_status(), TokenStatus::Expired) {
            return Err(ClientError::Auth {
                status: 0,
                body: "access token expired, refresh pending".into(),
            });
        }
        Ok(token.access_token().as_str().to_string())
    }
}

async fn spawn_watcher(source: CredentialsSource) -> Result<TokenWatcher, ClientError> {
    let jitter = RandomEarlyJitter::new(DurationSecs(JITTER_MAX_SECS));
    let backoff = ErrorBackoffConfig::new(MIN_REFRESH_PERIOD, MIN_REFRESH_PERIOD * 30, 2);
    TokenWatcher::spawn_from_token_source(source, jitter, backoff).await
}
