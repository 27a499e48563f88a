//! Request authentication.
//!
//! Three credential sources are supported: a static API token (`SSWS`), a
//! pre-minted OAuth access token (`Bearer`), and the OAuth private-key flow,
//! where a signed client assertion is exchanged for a short-lived access
//! token. Exchanged tokens are cached for the lifetime of the client and
//! refreshed shortly before they expire.

use crate::config::{CredentialSource, ProviderConfig};
use crate::error::{ProviderError, ProviderResult};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Refresh exchanged tokens when less than this much validity remains.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime of a signed client assertion.
const ASSERTION_LIFETIME: Duration = Duration::from_secs(60 * 60);

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Credentials the authenticator signs requests with.
#[derive(Clone)]
pub enum Credentials {
    ApiToken(String),
    AccessToken(String),
    PrivateKey {
        client_id: String,
        private_key: String,
        private_key_id: Option<String>,
        scopes: Vec<String>,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiToken(_) => f.debug_tuple("ApiToken").field(&"[REDACTED]").finish(),
            Self::AccessToken(_) => f.debug_tuple("AccessToken").field(&"[REDACTED]").finish(),
            Self::PrivateKey {
                client_id,
                private_key_id,
                scopes,
                ..
            } => f
                .debug_struct("PrivateKey")
                .field("client_id", client_id)
                .field("private_key", &"[REDACTED]")
                .field("private_key_id", private_key_id)
                .field("scopes", scopes)
                .finish(),
        }
    }
}

impl Credentials {
    /// Select credentials from validated provider settings.
    pub fn from_config(config: &ProviderConfig, source: CredentialSource) -> ProviderResult<Self> {
        let missing = |field: &str| ProviderError::auth(format!("{field} is not set"));
        Ok(match source {
            CredentialSource::ApiToken => {
                Self::ApiToken(config.api_token.clone().ok_or_else(|| missing("api_token"))?)
            }
            CredentialSource::AccessToken => Self::AccessToken(
                config
                    .access_token
                    .clone()
                    .ok_or_else(|| missing("access_token"))?,
            ),
            CredentialSource::PrivateKey => Self::PrivateKey {
                client_id: config.client_id.clone().ok_or_else(|| missing("client_id"))?,
                private_key: config
                    .private_key
                    .clone()
                    .ok_or_else(|| missing("private_key"))?,
                private_key_id: config.private_key_id.clone(),
                scopes: config.scopes.clone(),
            },
        })
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    jti: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Cached exchanged access token.
#[derive(Debug, Clone)]
struct CachedToken {
    header: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let margin = chrono::Duration::from_std(REFRESH_MARGIN).unwrap_or_default();
        now + margin < self.expires_at
    }
}

/// Produces the `Authorization` header for outbound requests.
#[derive(Debug)]
pub struct Authenticator {
    credentials: Credentials,
    token_url: String,
    http: reqwest::Client,
    /// Snapshot read by every request
    cached: RwLock<Option<Arc<CachedToken>>>,
    /// Held for the duration of one token exchange
    refresh_lock: Mutex<()>,
}

impl Authenticator {
    pub fn new(credentials: Credentials, org_url: &str, http: reqwest::Client) -> Self {
        Self {
            credentials,
            token_url: format!("{}/oauth2/v1/token", org_url.trim_end_matches('/')),
            http,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// True when the credentials are exchanged and can be refreshed after a 401.
    pub fn is_refreshable(&self) -> bool {
        matches!(self.credentials, Credentials::PrivateKey { .. })
    }

    /// Value for the `Authorization` header.
    pub async fn authorization_header(&self) -> ProviderResult<String> {
        match &self.credentials {
            Credentials::ApiToken(token) => Ok(format!("SSWS {token}")),
            Credentials::AccessToken(token) => Ok(format!("Bearer {token}")),
            Credentials::PrivateKey { .. } => {
                if let Some(token) = self.fresh_snapshot().await {
                    return Ok(token.header.clone());
                }
                let token = self.refresh().await?;
                Ok(token.header.clone())
            }
        }
    }

    /// Drop the cached token so the next request exchanges a new one.
    pub async fn invalidate(&self) {
        if self.is_refreshable() {
            debug!("Invalidating cached access token");
            *self.cached.write().await = None;
        }
    }

    async fn fresh_snapshot(&self) -> Option<Arc<CachedToken>> {
        let cached = self.cached.read().await.clone()?;
        cached.is_fresh(Utc::now()).then_some(cached)
    }

    async fn refresh(&self) -> ProviderResult<Arc<CachedToken>> {
        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = self.fresh_snapshot().await {
            return Ok(token);
        }

        let Credentials::PrivateKey { client_id, scopes, .. } = &self.credentials else {
            return Err(ProviderError::internal("token refresh without private key credentials"));
        };

        let assertion = self.client_assertion(Utc::now())?;
        let scope = scopes.join(" ");
        let form = [
            ("grant_type", "client_credentials"),
            ("scope", scope.as_str()),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
        ];

        info!("Exchanging client assertion for access token (client {})", client_id);
        let response = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::auth(format!(
                "token endpoint returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        let cached = Arc::new(CachedToken {
            header: format!(
                "{} {}",
                token.token_type.as_deref().unwrap_or("Bearer"),
                token.access_token
            ),
            expires_at: Utc::now() + chrono::Duration::from_std(lifetime).unwrap_or_default(),
        });
        *self.cached.write().await = Some(cached.clone());
        Ok(cached)
    }

    /// Sign the client assertion for the token exchange.
    fn client_assertion(&self, now: DateTime<Utc>) -> ProviderResult<String> {
        let Credentials::PrivateKey {
            client_id,
            private_key,
            private_key_id,
            ..
        } = &self.credentials
        else {
            return Err(ProviderError::internal("client assertion without private key credentials"));
        };

        let (algorithm, key) = if private_key.contains("EC PRIVATE KEY") {
            (Algorithm::ES256, EncodingKey::from_ec_pem(private_key.as_bytes()))
        } else {
            (Algorithm::RS256, EncodingKey::from_rsa_pem(private_key.as_bytes()))
        };
        let key = key.map_err(|e| ProviderError::auth(format!("invalid private_key: {e}")))?;

        let mut header = Header::new(algorithm);
        header.kid = private_key_id.clone();

        let claims = AssertionClaims {
            iss: client_id,
            sub: client_id,
            aud: &self.token_url,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME.as_secs() as i64,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| ProviderError::auth(format!("failed to sign client assertion: {e}")))
    }
}
