use async_trait::async_trait;

use crate::config::DEFAULT_METADATA_ENDPOINT;
use crate::error::TokenError;

use super::{Token, TokenSource, read_token_response};

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens for the default service account of the VM, served by the
/// compute metadata server. Used to authorize the KMS calls themselves.
#[derive(Debug, Clone)]
pub struct MetadataTokenSource {
    http: reqwest::Client,
    endpoint: String,
}

impl MetadataTokenSource {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_METADATA_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for MetadataTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn token(&self) -> Result<Token, TokenError> {
        let response = self
            .http
            .get(format!("{}{TOKEN_PATH}", self.endpoint))
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        read_token_response(response).await
    }
}
