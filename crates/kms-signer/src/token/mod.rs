mod jwt;
mod kms;
mod cache;
mod metadata;
mod client;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::TokenError;

pub use jwt::{Claims, decode_claims, encode_signed};
pub use kms::{KmsTokenConfig, KmsTokenSource};
pub use cache::CachedTokenSource;
pub use metadata::MetadataTokenSource;
pub use client::AuthorizedClient;

/// A bearer credential for outbound API calls.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    /// `None` means the token does not expire on its own.
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expiry: None,
        }
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// True if the token is still usable `early` before its expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>, early: Duration) -> bool {
        match self.expiry {
            Some(expiry) => now + early < expiry,
            None => !self.access_token.is_empty(),
        }
    }

    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Produces bearer tokens on demand.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<Token, TokenError>;
}

#[async_trait]
impl<T: TokenSource + ?Sized> TokenSource for Arc<T> {
    async fn token(&self) -> Result<Token, TokenError> {
        (**self).token().await
    }
}

/// Always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: Token,
}

impl StaticTokenSource {
    pub fn new(token: Token) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<Token, TokenError> {
        Ok(self.token.clone())
    }
}

/// OAuth2 token endpoint response, shared by the token exchange and the
/// metadata server.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    pub(crate) fn into_token(self, now: DateTime<Utc>) -> Token {
        Token {
            access_token: self.access_token,
            token_type: self.token_type,
            expiry: self.expires_in.map(|secs| now + Duration::seconds(secs)),
        }
    }
}

/// Decode a token endpoint response, keeping the body for errors.
pub(crate) async fn read_token_response(
    response: reqwest::Response,
) -> Result<Token, TokenError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(TokenError::Exchange { status, body });
    }
    let decoded: TokenResponse =
        serde_json::from_str(&body).map_err(|e| TokenError::Decode(e.to_string()))?;
    Ok(decoded.into_token(Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_without_expiry_stays_valid() {
        assert!(Token::bearer("abc").is_valid_at(Utc::now(), Duration::seconds(10)));
    }

    #[test]
    fn token_expires_early() {
        let now = Utc::now();
        let token = Token::bearer("abc").with_expiry(now + Duration::seconds(5));
        assert!(token.is_valid_at(now, Duration::zero()));
        assert!(!token.is_valid_at(now, Duration::seconds(10)));
    }

    #[test]
    fn debug_output_hides_access_token() {
        let rendered = format!("{:?}", Token::bearer("ya29.secret"));
        assert!(!rendered.contains("ya29.secret"));
    }

    #[test]
    fn token_response_defaults_to_bearer() {
        let now = Utc::now();
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"ya29.x","expires_in":3599}"#).unwrap();
        let token = response.into_token(now);
        assert_eq!(token.authorization_header(), "Bearer ya29.x");
        assert_eq!(token.expiry, Some(now + Duration::seconds(3599)));
    }
}
