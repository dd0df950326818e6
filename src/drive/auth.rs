//! OAuth access tokens for the Drive API.
//!
//! Service accounts use the JWT bearer grant: a claim set signed with the
//! account's RSA key is exchanged at `token_uri` for a short-lived token.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::CredentialSource;
use crate::error::{DriveTagError, DriveTagResult};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// Refresh this long before the token actually expires.
const EXPIRY_SLACK_SECS: u64 = 60;

/// Service account key fields, as found in the JSON key file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> DriveTagResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriveTagError::auth(format!("cannot read credentials {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| DriveTagError::auth(format!("invalid credentials {}: {}", path.display(), e)))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: u64,
}

enum Source {
    Static(String),
    ServiceAccount {
        key: ServiceAccountKey,
        encoding_key: EncodingKey,
        scope: String,
    },
}

/// Hands out bearer tokens, refreshing service account tokens when stale.
pub struct TokenProvider {
    source: Source,
    agent: ureq::Agent,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// A fixed token, used as-is for every request.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            source: Source::Static(token.into()),
            agent: ureq::Agent::new(),
            cached: Mutex::new(None),
        }
    }

    /// Build from a service account key. Fails if the private key is not a
    /// valid RSA PEM, which is the session-fatal credential error.
    pub fn from_service_account(key: ServiceAccountKey, scope: &str, timeout: Duration) -> DriveTagResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| DriveTagError::auth(format!("invalid private key for {}: {}", key.client_email, e)))?;
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();

        Ok(Self {
            source: Source::ServiceAccount {
                key,
                encoding_key,
                scope: scope.to_string(),
            },
            agent,
            cached: Mutex::new(None),
        })
    }

    pub fn from_source(source: CredentialSource, scope: &str, timeout: Duration) -> DriveTagResult<Self> {
        match source {
            CredentialSource::AccessToken(token) => Ok(Self::from_token(token)),
            CredentialSource::ServiceAccount(key) => Self::from_service_account(key, scope, timeout),
            CredentialSource::KeyFile(path) => {
                let key = ServiceAccountKey::from_file(&path)?;
                Self::from_service_account(key, scope, timeout)
            }
        }
    }

    /// Identity the token is issued for, if known.
    pub fn account(&self) -> Option<&str> {
        match &self.source {
            Source::Static(_) => None,
            Source::ServiceAccount { key, .. } => Some(&key.client_email),
        }
    }

    pub fn token(&self) -> DriveTagResult<String> {
        let (key, encoding_key, scope) = match &self.source {
            Source::Static(token) => return Ok(token.clone()),
            Source::ServiceAccount { key, encoding_key, scope } => (key, encoding_key, scope),
        };

        let now = unix_now();
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| DriveTagError::auth("token cache poisoned"))?;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > now + EXPIRY_SLACK_SECS {
                return Ok(token.value.clone());
            }
        }

        let claims = Claims {
            iss: &key.client_email,
            scope,
            aud: &key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();
        let assertion = jsonwebtoken::encode(&header, &claims, encoding_key)
            .map_err(|e| DriveTagError::auth(format!("failed to sign assertion: {}", e)))?;

        tracing::debug!(account = %key.client_email, "Requesting access token");
        let response: TokenResponse = self
            .agent
            .post(&key.token_uri)
            .send_form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
            .map_err(|e| match DriveTagError::from(e) {
                // Any rejection from the token endpoint is a credential problem
                DriveTagError::Remote { message, .. } => DriveTagError::Auth(message),
                other => other,
            })?
            .into_json()
            .map_err(|e| DriveTagError::auth(format!("malformed token response: {}", e)))?;

        let expires_at = now + response.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at,
        });

        Ok(response.access_token)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
