use reqwest::StatusCode;
use serde::Deserialize;

use crate::signing::HashAlgorithm;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("invalid {field} {value:?}: key path segments cannot contain '/' or whitespace")]
    InvalidKeySegment { field: &'static str, value: String },
    #[error("malformed key version name: {0}")]
    MalformedKeyName(String),
    #[error("an audience is required for JWT access tokens")]
    MissingAudience,
}

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("{algorithm} digest must be {expected} bytes, got {actual}")]
    DigestLength {
        algorithm: HashAlgorithm,
        expected: usize,
        actual: usize,
    },
    #[error("KMS returned {status}: {message}")]
    Remote { status: StatusCode, message: String },
    #[error("KMS request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to obtain credentials for KMS: {0}")]
    Credentials(#[source] Box<TokenError>),
    #[error("failed to decode KMS response: {0}")]
    Decode(String),
    #[error("local signing failed: {0}")]
    Local(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SignedUrlError {
    #[error("unsupported HTTP method {0:?}")]
    InvalidMethod(String),
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("expiry is {requested}s after the start time, max is {max}s")]
    ExpiryTooFar { requested: i64, max: i64 },
    #[error("query parameter {0} is set by the signer")]
    ReservedQueryParam(String),
    #[error("invalid header value for {0}")]
    InvalidHeader(String),
    #[error("the host header is derived from the URL style and cannot be set")]
    HostHeader,
    #[error("object name {0:?} has a '.' or '..' path segment")]
    DotSegment(String),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error("signed URL did not parse: {0}")]
    UrlParse(#[from] url::ParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("GET returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("GET failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("signing token assertion: {0}")]
    Signer(#[from] SignerError),
    #[error("token endpoint returned {status}: {body}")]
    Exchange { status: StatusCode, body: String },
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode token: {0}")]
    Decode(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<TokenError> for SignerError {
    fn from(error: TokenError) -> Self {
        Self::Credentials(Box::new(error))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("list request returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("list request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode list response: {0}")]
    Decode(String),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// The error envelope returned by Google APIs.
#[derive(Debug, Deserialize)]
pub(crate) struct GoogleErrorEnvelope {
    pub error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Pulls a readable message out of an error response body, falling back to
/// the raw body when it is not a Google error envelope.
pub(crate) fn remote_message(body: &str) -> String {
    match serde_json::from_str::<GoogleErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(status) => format!("{status}: {}", envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) => body.trim().to_string(),
    }
}
