//! OAuth 2.0 credential storage and refresh for YouTube API authentication.
//!
//! The credential is a flat JSON token document of the kind written by Google's client
//! libraries (`token`, `refresh_token`, `token_uri`, `client_id`, `client_secret`, `scopes`,
//! and optionally `expiry`). Obtaining one in the first place (the consent flow) happens
//! elsewhere; this module only loads, refreshes, and writes it back.

use crate::error::AuthError;
use jiff::{SignedDuration, Timestamp};
use oauth2::basic::BasicClient;
use oauth2::{ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl, reqwest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Google OAuth2 token endpoint, used when a stored credential does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The only scope uploads need.
pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

/// Refreshed tokens are considered expired this long before the platform says they are.
const EXPIRY_BUFFER: Duration = Duration::from_secs(300);

/// Lifetime assumed when a token response carries no `expires_in` (one hour minus the buffer).
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3300);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// An OAuth access/refresh token bundle authorizing platform API calls.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "token", default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// `None` means the expiry is unknown; such a token is used until the platform rejects it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<Timestamp>,
    /// Keys we don't interpret (`universe_domain`, `account`, ...), kept so a rewrite is lossless.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[redacted]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        self.access_token.is_empty() || self.expiry.is_some_and(|expiry| expiry <= Timestamp::now())
    }

    fn expiry_after(expires_in: Option<Duration>) -> Timestamp {
        let lifetime = match expires_in {
            Some(expires_in) => expires_in.saturating_sub(EXPIRY_BUFFER),
            None => DEFAULT_LIFETIME,
        };
        let lifetime = SignedDuration::try_from(lifetime).unwrap_or(SignedDuration::MAX);
        Timestamp::now()
            .checked_add(lifetime)
            .unwrap_or(Timestamp::MAX)
    }
}

/// Loads the persisted credential and keeps it usable.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    persist_refreshed: bool,
    http: reqwest::Client,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, persist_refreshed: bool) -> Self {
        let http = reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("building reqwest client should not fail");
        Self {
            path: path.into(),
            persist_refreshed,
            http,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored credential and refreshes it if it has expired.
    ///
    /// A successful return always holds an unexpired access token.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Credential, AuthError> {
        let mut credential = self.read().await?;
        self.ensure_fresh(&mut credential).await?;
        Ok(credential)
    }

    /// Reads the stored credential as-is.
    pub async fn read(&self) -> Result<Credential, AuthError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("no stored credential");
                return Err(AuthError::NotFound {
                    path: self.path.clone(),
                });
            }
            Err(source) => {
                return Err(AuthError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&content).map_err(|source| AuthError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Refreshes `credential` if it has expired, and persists the result if configured to.
    ///
    /// Returns whether a refresh took place. Failing to write the refreshed credential back is
    /// only logged: the refreshed token in `credential` is valid either way.
    pub async fn ensure_fresh(&self, credential: &mut Credential) -> Result<bool, AuthError> {
        if !credential.is_expired() {
            return Ok(false);
        }
        tracing::debug!("access token expired, attempting refresh");
        self.refresh(credential).await?;
        if self.persist_refreshed {
            if let Err(e) = self.persist(credential).await {
                tracing::warn!(error = %error_chain(&e), "could not persist refreshed credential");
            }
        }
        Ok(true)
    }

    /// Exchanges the credential's refresh token for a new access token.
    ///
    /// A single attempt is made. If the response carries no new refresh token, the existing one
    /// is kept.
    pub async fn refresh(&self, credential: &mut Credential) -> Result<(), AuthError> {
        let Some(refresh_token) = credential.refresh_token.clone() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Err(AuthError::Expired);
        };

        let token_url = TokenUrl::new(credential.token_uri.clone()).map_err(|e| {
            AuthError::RefreshFailed(format!(
                "invalid token endpoint {:?}: {e}",
                credential.token_uri
            ))
        })?;
        let client = BasicClient::new(ClientId::new(credential.client_id.clone()))
            .set_client_secret(ClientSecret::new(credential.client_secret.clone()))
            .set_token_uri(token_url);

        let refresh_token = RefreshToken::new(refresh_token);
        let new_token = match client
            .exchange_refresh_token(&refresh_token)
            .request_async(&self.http)
            .await
        {
            Ok(new_token) => new_token,
            Err(oauth2::RequestTokenError::ServerResponse(sr)) => {
                tracing::warn!("OAuth refresh rejected by token endpoint: {}", sr);
                return Err(AuthError::RefreshFailed(sr.to_string()));
            }
            Err(e) => {
                tracing::warn!("OAuth refresh request failed: {}", e);
                return Err(AuthError::RefreshFailed(error_chain(&e)));
            }
        };

        credential.access_token = new_token.access_token().secret().clone();
        if let Some(rotated) = new_token.refresh_token() {
            tracing::debug!("new token includes refresh token");
            credential.refresh_token = Some(rotated.secret().clone());
        }
        if let Some(scopes) = new_token.scopes() {
            credential.scopes = scopes.iter().map(|s| s.to_string()).collect();
        }
        credential.expiry = Some(Credential::expiry_after(new_token.expires_in()));
        tracing::debug!(expiry = ?credential.expiry, "successfully refreshed OAuth token");
        Ok(())
    }

    /// Writes `credential` back to the store's path.
    ///
    /// The document is written next to the target and then renamed over it, so a crash never
    /// leaves a truncated credential behind. The existing file's permissions carry over to the
    /// new one.
    pub async fn persist(&self, credential: &Credential) -> Result<(), AuthError> {
        let persist_err = |source| AuthError::Persist {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_vec_pretty(credential)
            .map_err(|e| persist_err(std::io::Error::other(e)))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let permissions = tokio::fs::metadata(&self.path)
            .await
            .ok()
            .map(|metadata| metadata.permissions());
        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            if let Some(permissions) = permissions {
                file.set_permissions(permissions).await?;
            }
            file.write_all(&json).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;
        if let Err(source) = written {
            match tokio::fs::remove_file(&tmp).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %tmp.display(), error = %e, "could not remove temporary file");
                }
                _ => {}
            }
            return Err(persist_err(source));
        }
        tracing::debug!(path = %self.path.display(), "persisted refreshed credential");
        Ok(())
    }
}

/// Renders an error with all of its sources, since `oauth2` hides the interesting part there.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
