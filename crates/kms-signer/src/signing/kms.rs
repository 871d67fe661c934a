use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DEFAULT_KMS_ENDPOINT, KeyReference};
use crate::error::{SignerError, remote_message};
use crate::token::TokenSource;

use super::signer::{HashAlgorithm, Signer};

/// Signs digests with an asymmetric key version held by Cloud KMS.
///
/// The private key never leaves KMS: every `sign` call is one
/// `asymmetricSign` request against the configured key version. Nothing is
/// cached or retried, so a failed request fails the whole operation.
pub struct KmsSigner {
    http: reqwest::Client,
    endpoint: String,
    key: KeyReference,
    tokens: Arc<dyn TokenSource>,
}

#[derive(Debug, Serialize)]
struct AsymmetricSignRequest {
    digest: DigestField,
}

/// Serializes as `{"sha256": "<base64>"}` and friends.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum DigestField {
    Sha256(String),
    Sha384(String),
    Sha512(String),
}

impl DigestField {
    fn new(algorithm: HashAlgorithm, digest: &[u8]) -> Self {
        let encoded = STANDARD.encode(digest);
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(encoded),
            HashAlgorithm::Sha384 => Self::Sha384(encoded),
            HashAlgorithm::Sha512 => Self::Sha512(encoded),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AsymmetricSignResponse {
    signature: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyResponse {
    pem: String,
    #[serde(default)]
    algorithm: Option<String>,
}

impl KmsSigner {
    pub fn new(key: KeyReference, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: DEFAULT_KMS_ENDPOINT.to_string(),
            key,
            tokens,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn key(&self) -> &KeyReference {
        &self.key
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/v1/{}{}", self.endpoint, self.key, suffix)
    }

    /// Fetch the PEM-encoded public key of the key version.
    pub async fn public_key_pem(&self) -> Result<String, SignerError> {
        let token = self.tokens.token().await?;
        let response = self
            .http
            .get(self.url("/publicKey"))
            .header(reqwest::header::AUTHORIZATION, token.authorization_header())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SignerError::Remote {
                status,
                message: remote_message(&body),
            });
        }

        let decoded: PublicKeyResponse =
            serde_json::from_str(&body).map_err(|e| SignerError::Decode(e.to_string()))?;
        if let Some(algorithm) = &decoded.algorithm {
            debug!(key = %self.key, algorithm, "fetched KMS public key");
        }
        Ok(decoded.pem)
    }
}

#[async_trait]
impl Signer for KmsSigner {
    async fn sign(&self, digest: &[u8], algorithm: HashAlgorithm) -> Result<Vec<u8>, SignerError> {
        algorithm.check_digest(digest)?;

        let token = self.tokens.token().await?;
        let request = AsymmetricSignRequest {
            digest: DigestField::new(algorithm, digest),
        };

        debug!(key = %self.key, %algorithm, "requesting KMS signature");
        let response = self
            .http
            .post(self.url(":asymmetricSign"))
            .header(reqwest::header::AUTHORIZATION, token.authorization_header())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SignerError::Remote {
                status,
                message: remote_message(&body),
            });
        }

        let decoded: AsymmetricSignResponse =
            serde_json::from_str(&body).map_err(|e| SignerError::Decode(e.to_string()))?;
        if let Some(name) = decoded.name.as_deref() {
            debug!(key = name, "KMS signature received");
        }

        STANDARD
            .decode(decoded.signature.as_bytes())
            .map_err(|e| SignerError::Decode(format!("signature is not base64: {e}")))
    }
}
