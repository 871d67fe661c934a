//! Cloud Storage V4 signed URLs.
//!
//! The canonical request and string-to-sign follow
//! <https://cloud.google.com/storage/docs/access-control/signing-urls-manually>.
//! Only the final RSA signature is delegated to a [`Signer`], so any backend
//! holding the service account key can produce the URL.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, warn};
use url::Url;

use crate::config::DEFAULT_STORAGE_HOST;
use crate::error::SignedUrlError;
use crate::signing::{HashAlgorithm, Signer, sign_message};

pub const SIGNING_ALGORITHM: &str = "GOOG4-RSA-SHA256";

/// Longest lifetime Cloud Storage accepts for a V4 URL.
pub const MAX_EXPIRY_SECS: i64 = 7 * 24 * 60 * 60;

const SUPPORTED_METHODS: [&str; 5] = ["DELETE", "GET", "HEAD", "POST", "PUT"];

const RESERVED_PARAMS: [&str; 6] = [
    "X-Goog-Algorithm",
    "X-Goog-Credential",
    "X-Goog-Date",
    "X-Goog-Expires",
    "X-Goog-SignedHeaders",
    "X-Goog-Signature",
];

/// RFC 3986 unreserved characters pass through, everything else is escaped.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const PATH: &AsciiSet = &UNRESERVED.remove(b'/');

/// The object a URL grants access to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub object: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UrlStyle {
    /// `https://storage.googleapis.com/{bucket}/{object}`
    #[default]
    PathStyle,
    /// `https://{bucket}.storage.googleapis.com/{object}`
    VirtualHostedStyle,
    /// `https://{hostname}/{object}` for a CNAME bound to the bucket.
    BucketBoundHostname(String),
}

#[derive(Debug, Clone)]
pub struct SignedUrlOptions {
    /// Service account e-mail that owns the signing key.
    pub access_id: String,
    pub method: String,
    pub expires: DateTime<Utc>,
    /// When the URL becomes valid. Defaults to the time of signing.
    pub start: Option<DateTime<Utc>>,
    pub headers: Vec<(String, String)>,
    pub query_params: Vec<(String, String)>,
    pub style: UrlStyle,
    pub region: String,
    /// Use `http` instead of `https`. Only meaningful for bucket-bound hosts.
    pub insecure: bool,
}

impl SignedUrlOptions {
    pub fn new(
        access_id: impl Into<String>,
        method: impl Into<String>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            access_id: access_id.into(),
            method: method.into(),
            expires,
            start: None,
            headers: Vec::new(),
            query_params: Vec::new(),
            style: UrlStyle::default(),
            region: "auto".to_string(),
            insecure: false,
        }
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((name.into(), value.into()));
        self
    }

    pub fn style(mut self, style: UrlStyle) -> Self {
        self.style = style;
        self
    }
}

/// A canonicalized request, ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUrl {
    pub canonical_request: String,
    pub string_to_sign: String,
    /// Everything but the signature parameter.
    unsigned_url: String,
}

impl PreparedUrl {
    fn finish(&self, signature: &[u8]) -> Result<Url, SignedUrlError> {
        let url = format!("{}&X-Goog-Signature={}", self.unsigned_url, hex::encode(signature));
        Ok(Url::parse(&url)?)
    }
}

/// Builds V4 signed URLs, delegating the signature to `S`.
pub struct UrlSigner<S> {
    signer: S,
    host: String,
}

impl<S: Signer> UrlSigner<S> {
    pub fn new(signer: S) -> Self {
        Self {
            signer,
            host: DEFAULT_STORAGE_HOST.to_string(),
        }
    }

    /// Storage host used for path and virtual-hosted style URLs.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sign a URL for `object`. Nothing is returned unless the signer
    /// succeeds.
    ///
    /// The access id is not checked against the signing key; a mismatch
    /// only shows up when the URL is used.
    pub async fn generate(
        &self,
        object: &ObjectRef,
        options: &SignedUrlOptions,
    ) -> Result<Url, SignedUrlError> {
        let prepared = self.prepare(object, options, Utc::now())?;
        let signature = sign_message(
            &self.signer,
            HashAlgorithm::Sha256,
            prepared.string_to_sign.as_bytes(),
        )
        .await?;
        prepared.finish(&signature)
    }

    /// Build the canonical request and string-to-sign without signing.
    /// `now` is the start time when `options.start` is unset.
    pub fn prepare(
        &self,
        object: &ObjectRef,
        options: &SignedUrlOptions,
        now: DateTime<Utc>,
    ) -> Result<PreparedUrl, SignedUrlError> {
        let method = options.method.trim().to_ascii_uppercase();
        if !SUPPORTED_METHODS.contains(&method.as_str()) {
            return Err(SignedUrlError::InvalidMethod(options.method.clone()));
        }
        if object.bucket.is_empty() {
            return Err(SignedUrlError::MissingField("bucket"));
        }
        if options.access_id.is_empty() {
            return Err(SignedUrlError::MissingField("access id"));
        }
        // URL parsing would collapse these and point the URL at another object.
        if object.object.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(SignedUrlError::DotSegment(object.object.clone()));
        }
        if let Some((name, _)) = options
            .query_params
            .iter()
            .find(|(name, _)| RESERVED_PARAMS.iter().any(|r| r.eq_ignore_ascii_case(name)))
        {
            return Err(SignedUrlError::ReservedQueryParam(name.clone()));
        }

        let start = options.start.unwrap_or(now);
        let expires_in = (options.expires - start).num_seconds();
        if expires_in > MAX_EXPIRY_SECS {
            return Err(SignedUrlError::ExpiryTooFar {
                requested: expires_in,
                max: MAX_EXPIRY_SECS,
            });
        }
        let expires_in = if expires_in <= 0 {
            warn!(
                bucket = %object.bucket,
                object = %object.object,
                expires = %options.expires,
                "signing a URL that has already expired"
            );
            0
        } else {
            expires_in
        };

        let timestamp = start.format("%Y%m%dT%H%M%SZ").to_string();
        let credential_scope = format!("{}/{}/storage/goog4_request", &timestamp[..8], options.region);
        let credential = format!("{}/{credential_scope}", options.access_id);

        let (scheme, host, path) = self.locate(object, options);

        let headers = canonical_headers(&host, &options.headers)?;
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
        let header_block: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();

        let mut query: Vec<(String, String)> = options
            .query_params
            .iter()
            .map(|(k, v)| (encode(k), encode(v)))
            .collect();
        query.extend(
            [
                ("X-Goog-Algorithm", SIGNING_ALGORITHM.to_string()),
                ("X-Goog-Credential", credential),
                ("X-Goog-Date", timestamp.clone()),
                ("X-Goog-Expires", expires_in.to_string()),
                ("X-Goog-SignedHeaders", signed_headers.clone()),
            ]
            .into_iter()
            .map(|(k, v)| (encode(k), encode(&v))),
        );
        query.sort();
        let canonical_query = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_request = format!(
            "{method}\n{path}\n{canonical_query}\n{header_block}\n{signed_headers}\nUNSIGNED-PAYLOAD"
        );
        let hashed_request = hex::encode(HashAlgorithm::Sha256.digest(canonical_request.as_bytes()));
        let string_to_sign =
            format!("{SIGNING_ALGORITHM}\n{timestamp}\n{credential_scope}\n{hashed_request}");

        debug!(%method, %path, "prepared canonical request");

        Ok(PreparedUrl {
            canonical_request,
            string_to_sign,
            unsigned_url: format!("{scheme}://{host}{path}?{canonical_query}"),
        })
    }

    /// Scheme, host and escaped resource path for the chosen URL style.
    fn locate(&self, object: &ObjectRef, options: &SignedUrlOptions) -> (&'static str, String, String) {
        let object_path = utf8_percent_encode(&object.object, PATH).to_string();
        match &options.style {
            UrlStyle::PathStyle => {
                let bucket = utf8_percent_encode(&object.bucket, PATH).to_string();
                let path = if object_path.is_empty() {
                    format!("/{bucket}")
                } else {
                    format!("/{bucket}/{object_path}")
                };
                ("https", self.host.clone(), path)
            }
            UrlStyle::VirtualHostedStyle => (
                "https",
                format!("{}.{}", object.bucket, self.host),
                format!("/{object_path}"),
            ),
            UrlStyle::BucketBoundHostname(hostname) => (
                if options.insecure { "http" } else { "https" },
                hostname.clone(),
                format!("/{object_path}"),
            ),
        }
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, UNRESERVED).to_string()
}

/// Lower-cased header names mapped to their trimmed, comma-joined values.
/// `host` is always present and always matches the URL host.
fn canonical_headers(
    host: &str,
    extra: &[(String, String)],
) -> Result<BTreeMap<String, String>, SignedUrlError> {
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in extra {
        let name = name.trim().to_ascii_lowercase();
        if name == "host" {
            return Err(SignedUrlError::HostHeader);
        }
        if name.is_empty() || value.chars().any(|c| c == '\n' || c == '\r') {
            return Err(SignedUrlError::InvalidHeader(name));
        }
        let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        headers.entry(name).or_default().push(value);
    }
    headers.insert("host".to_string(), vec![host.to_string()]);

    Ok(headers
        .into_iter()
        .map(|(name, values)| (name, values.join(",")))
        .collect())
}
