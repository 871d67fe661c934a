use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::config::{CLOUD_PLATFORM_SCOPE, DEFAULT_TOKEN_URI, TokenSettings};
use crate::error::{ConfigError, TokenError};
use crate::signing::Signer;

use super::jwt::{Claims, encode_signed};
use super::{Token, TokenSource, read_token_response};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Debug, Clone)]
pub struct KmsTokenConfig {
    /// Service account e-mail; the issuer of every assertion.
    pub email: String,
    pub audience: Option<String>,
    pub key_id: Option<String>,
    pub scopes: Vec<String>,
    pub use_oauth_token: bool,
    pub token_uri: String,
    pub lifetime: Duration,
}

impl KmsTokenConfig {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            audience: None,
            key_id: None,
            scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
            use_oauth_token: true,
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            lifetime: Duration::from_secs(3600),
        }
    }

    pub fn from_settings(
        email: impl Into<String>,
        key_id: Option<String>,
        token_uri: impl Into<String>,
        settings: &TokenSettings,
    ) -> Self {
        Self {
            email: email.into(),
            audience: settings.audience.clone(),
            key_id,
            scopes: settings.scopes.clone(),
            use_oauth_token: settings.use_oauth_token,
            token_uri: token_uri.into(),
            lifetime: Duration::from_secs(settings.lifetime_secs),
        }
    }
}

/// Mints tokens for a service account whose key lives in KMS.
///
/// With `use_oauth_token` the KMS-signed assertion is exchanged at the
/// OAuth2 token endpoint for an access token. Otherwise the signed JWT is
/// itself the bearer token (a JWT access token), which some APIs accept
/// directly; Cloud Storage does not.
pub struct KmsTokenSource<S> {
    config: KmsTokenConfig,
    signer: S,
    http: reqwest::Client,
}

impl<S: Signer> KmsTokenSource<S> {
    pub fn new(config: KmsTokenConfig, signer: S) -> Result<Self, ConfigError> {
        if config.email.is_empty() {
            return Err(ConfigError::EmptyField("service account email"));
        }
        if !config.use_oauth_token && config.audience.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingAudience);
        }
        Ok(Self {
            config,
            signer,
            http: reqwest::Client::new(),
        })
    }

    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn claims(&self, iat: i64) -> Claims {
        let exp = iat + self.config.lifetime.as_secs() as i64;
        if self.config.use_oauth_token {
            Claims {
                iss: self.config.email.clone(),
                sub: None,
                scope: Some(self.config.scopes.join(" ")),
                aud: self.config.token_uri.clone(),
                iat,
                exp,
            }
        } else {
            Claims {
                iss: self.config.email.clone(),
                sub: Some(self.config.email.clone()),
                scope: None,
                aud: self.config.audience.clone().unwrap_or_default(),
                iat,
                exp,
            }
        }
    }

    async fn exchange(&self, assertion: &str) -> Result<Token, TokenError> {
        let response = self
            .http
            .post(&self.config.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)])
            .send()
            .await?;
        read_token_response(response).await
    }
}

#[async_trait]
impl<S: Signer> TokenSource for KmsTokenSource<S> {
    async fn token(&self) -> Result<Token, TokenError> {
        let now = Utc::now();
        let claims = self.claims(now.timestamp());
        let jwt = encode_signed(&self.signer, self.config.key_id.as_deref(), &claims).await?;

        if self.config.use_oauth_token {
            debug!(issuer = %claims.iss, token_uri = %self.config.token_uri, "exchanging signed assertion");
            return self.exchange(&jwt).await;
        }

        debug!(issuer = %claims.iss, audience = %claims.aud, "minted JWT access token");
        let expiry = chrono::DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| TokenError::Decode(format!("expiry {} out of range", claims.exp)))?;
        Ok(Token::bearer(jwt).with_expiry(expiry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::StubSigner;
    use crate::token::decode_claims;

    #[test]
    fn jwt_access_tokens_require_audience() {
        let config = KmsTokenConfig {
            use_oauth_token: false,
            ..KmsTokenConfig::new("svc@p.iam.gserviceaccount.com")
        };
        assert!(matches!(
            KmsTokenSource::new(config, StubSigner::fixed(vec![0])),
            Err(ConfigError::MissingAudience)
        ));
    }

    #[test]
    fn assertion_claims_target_token_endpoint() {
        let source = KmsTokenSource::new(
            KmsTokenConfig::new("svc@p.iam.gserviceaccount.com"),
            StubSigner::fixed(vec![0]),
        )
        .unwrap();
        let claims = source.claims(100);
        assert_eq!(claims.aud, DEFAULT_TOKEN_URI);
        assert_eq!(claims.scope.as_deref(), Some(CLOUD_PLATFORM_SCOPE));
        assert_eq!(claims.exp, 3700);
        assert_eq!(claims.sub, None);
    }

    #[tokio::test]
    async fn jwt_access_token_is_returned_without_exchange() {
        let audience = "https://pubsub.googleapis.com/google.pubsub.v1.Publisher";
        let config = KmsTokenConfig {
            use_oauth_token: false,
            audience: Some(audience.into()),
            // Unroutable: the test fails if an exchange is attempted.
            token_uri: "http://127.0.0.1:9/token".into(),
            ..KmsTokenConfig::new("svc@p.iam.gserviceaccount.com")
        };
        let source = KmsTokenSource::new(config, StubSigner::fixed(vec![1u8; 256])).unwrap();

        let token = source.token().await.unwrap();
        let claims = decode_claims(&token.access_token).unwrap();
        assert_eq!(claims.aud, audience);
        assert_eq!(claims.sub.as_deref(), Some("svc@p.iam.gserviceaccount.com"));
        assert_eq!(token.expiry.unwrap().timestamp(), claims.exp);
    }
}
