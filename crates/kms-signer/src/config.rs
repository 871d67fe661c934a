use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_KMS_ENDPOINT: &str = "https://cloudkms.googleapis.com";
pub const DEFAULT_STORAGE_HOST: &str = "storage.googleapis.com";
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://metadata.google.internal";
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Identifies one version of an asymmetric signing key held by KMS.
///
/// Only the shape of the reference is checked locally. Whether the key
/// exists, and whether the caller may use it, is decided by KMS on the
/// first signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyReference {
    project: String,
    location: String,
    key_ring: String,
    key: String,
    version: String,
}

impl KeyReference {
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        key_ring: impl Into<String>,
        key: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let reference = Self {
            project: project.into(),
            location: location.into(),
            key_ring: key_ring.into(),
            key: key.into(),
            version: version.into(),
        };
        for (field, value) in [
            ("project", &reference.project),
            ("location", &reference.location),
            ("key ring", &reference.key_ring),
            ("key", &reference.key),
            ("key version", &reference.version),
        ] {
            check_segment(field, value)?;
        }
        Ok(reference)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn key_ring(&self) -> &str {
        &self.key_ring
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The `cryptoKeyVersions` resource name used in KMS request paths.
    pub fn resource_name(&self) -> String {
        self.to_string()
    }
}

fn check_segment(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::EmptyField(field));
    }
    if value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidKeySegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for KeyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}/cryptoKeyVersions/{}",
            self.project, self.location, self.key_ring, self.key, self.version
        )
    }
}

impl FromStr for KeyReference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim_matches('/').split('/').collect();
        match parts.as_slice() {
            [
                "projects",
                project,
                "locations",
                location,
                "keyRings",
                key_ring,
                "cryptoKeys",
                key,
                "cryptoKeyVersions",
                version,
            ] => Self::new(*project, *location, *key_ring, *key, *version),
            _ => Err(ConfigError::MalformedKeyName(s.to_string())),
        }
    }
}

/// Base URLs of the remote services. Overridable so tests and emulators
/// can point the clients at a local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub kms: String,
    pub storage_host: String,
    pub storage: String,
    pub pubsub: String,
    pub token_uri: String,
    pub metadata: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            kms: DEFAULT_KMS_ENDPOINT.to_string(),
            storage_host: DEFAULT_STORAGE_HOST.to_string(),
            storage: DEFAULT_STORAGE_ENDPOINT.to_string(),
            pubsub: DEFAULT_PUBSUB_ENDPOINT.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            metadata: DEFAULT_METADATA_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSettings {
    pub scopes: Vec<String>,
    /// Audience of self-signed JWT access tokens. Required when
    /// `use_oauth_token` is false.
    pub audience: Option<String>,
    /// Exchange the signed assertion for an OAuth2 access token instead of
    /// using it directly as a JWT access token. Storage only accepts the
    /// former.
    pub use_oauth_token: bool,
    pub lifetime_secs: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
            audience: None,
            use_oauth_token: true,
            lifetime_secs: 3600,
        }
    }
}

/// Immutable runtime configuration, built once at startup and handed to
/// constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub key: KeyReference,
    pub bucket: String,
    pub object: String,
    /// Service account e-mail used as the signed URL access id and as the
    /// token issuer. Must belong to the KMS key.
    pub service_account_email: String,
    /// Optional `kid` placed in JWT headers.
    pub key_id: Option<String>,
    pub endpoints: Endpoints,
    pub token: TokenSettings,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_account_email.is_empty() {
            return Err(ConfigError::EmptyField("service account email"));
        }
        if !self.token.use_oauth_token && self.token.audience.is_none() {
            return Err(ConfigError::MissingAudience);
        }
        Ok(())
    }
}
