//! Boundary to the external auth/user service.
//!
//! Remote and friend play require a verified identity before a session is
//! constructed: the bearer token is verified first, then the user id is
//! exchanged for a username with a second call. Both calls go to the HTTP
//! service this process does not own.

use async_trait::async_trait;
use serde::Deserialize;
use shared::PlayerInfo;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing auth token")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("unknown user")]
    UnknownUser,
    #[error("auth service unreachable: {0}")]
    Unreachable(String),
    #[error("malformed auth service response")]
    BadResponse,
}

/// Injection seam for the auth collaborator, so sessions and routes can be
/// tested without the real HTTP service.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verifies a bearer token, returning the user id it belongs to.
    async fn verify(&self, token: &str) -> Result<String, AuthError>;

    /// Resolves a user id to a display username.
    async fn lookup_username(&self, user_id: &str, token: &str) -> Result<String, AuthError>;

    /// Full connect-time flow: verify, then resolve the username.
    async fn authenticate(&self, token: &str) -> Result<PlayerInfo, AuthError> {
        let user_id = self.verify(token).await?;
        let username = self.lookup_username(&user_id, token).await?;
        Ok(PlayerInfo { user_id, username })
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(rename = "userId")]
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    username: String,
}

/// Talks to the real auth service over HTTP with bearer tokens.
pub struct HttpAuthenticator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthenticator {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        let url = format!("{}/auth/verify", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::InvalidToken);
        }
        let body: VerifyResponse = response.json().await.map_err(|_| AuthError::BadResponse)?;
        Ok(body.user_id)
    }

    async fn lookup_username(&self, user_id: &str, token: &str) -> Result<String, AuthError> {
        let url = format!("{}/users/{}", self.base_url, user_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::UnknownUser);
        }
        let body: UserResponse = response.json().await.map_err(|_| AuthError::BadResponse)?;
        Ok(body.username)
    }
}

/// Fixed-identity authenticator for tests: any non-empty token maps to the
/// configured user.
pub struct StubAuthenticator {
    pub user_id: String,
    pub username: String,
}

#[async_trait]
impl Authenticator for StubAuthenticator {
    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(self.user_id.clone())
    }

    async fn lookup_username(&self, _user_id: &str, _token: &str) -> Result<String, AuthError> {
        Ok(self.username.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_authenticate_flow() {
        let auth = StubAuthenticator {
            user_id: "7".to_string(),
            username: "alice".to_string(),
        };

        let player = auth.authenticate("token-abc").await.unwrap();
        assert_eq!(player.user_id, "7");
        assert_eq!(player.username, "alice");
    }

    #[tokio::test]
    async fn test_stub_rejects_empty_token() {
        let auth = StubAuthenticator {
            user_id: "7".to_string(),
            username: "alice".to_string(),
        };
        assert!(matches!(
            auth.authenticate("").await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_verify_response_parsing() {
        let body: VerifyResponse = serde_json::from_str(r#"{"userId":"42"}"#).unwrap();
        assert_eq!(body.user_id, "42");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let auth = HttpAuthenticator::new("http://auth.local/");
        assert_eq!(auth.base_url, "http://auth.local");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(AuthError::MissingToken.to_string(), "missing auth token");
        assert_eq!(AuthError::InvalidToken.to_string(), "invalid or expired token");
    }
}
