use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::SignerError;

/// Hash algorithm a digest was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    pub fn digest(self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(message).to_vec(),
            Self::Sha384 => Sha384::digest(message).to_vec(),
            Self::Sha512 => Sha512::digest(message).to_vec(),
        }
    }

    /// Rejects digests whose length does not match the algorithm.
    pub fn check_digest(self, digest: &[u8]) -> Result<(), SignerError> {
        if digest.len() != self.digest_len() {
            return Err(SignerError::DigestLength {
                algorithm: self,
                expected: self.digest_len(),
                actual: digest.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A signing capability over precomputed digests.
///
/// Backends may be remote (KMS), local keys, or stubs. Each call is
/// independent: implementations hold no per-call state and may be shared
/// across tasks.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign a digest produced with `algorithm`. Returns raw signature bytes.
    async fn sign(&self, digest: &[u8], algorithm: HashAlgorithm) -> Result<Vec<u8>, SignerError>;
}

#[async_trait]
impl<S: Signer + ?Sized> Signer for Arc<S> {
    async fn sign(&self, digest: &[u8], algorithm: HashAlgorithm) -> Result<Vec<u8>, SignerError> {
        (**self).sign(digest, algorithm).await
    }
}

#[async_trait]
impl<S: Signer + ?Sized> Signer for &S {
    async fn sign(&self, digest: &[u8], algorithm: HashAlgorithm) -> Result<Vec<u8>, SignerError> {
        (**self).sign(digest, algorithm).await
    }
}

/// Hash `message` with `algorithm` and sign the digest.
pub async fn sign_message<S>(
    signer: &S,
    algorithm: HashAlgorithm,
    message: &[u8],
) -> Result<Vec<u8>, SignerError>
where
    S: Signer + ?Sized,
{
    let digest = algorithm.digest(message);
    signer.sign(&digest, algorithm).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_lengths_match_output() {
        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Sha384, HashAlgorithm::Sha512] {
            assert_eq!(algorithm.digest(b"test").len(), algorithm.digest_len());
            algorithm.check_digest(&algorithm.digest(b"test")).unwrap();
        }
    }

    #[test]
    fn short_digest_is_rejected() {
        let err = HashAlgorithm::Sha512.check_digest(&[0u8; 32]).unwrap_err();
        assert!(matches!(
            err,
            SignerError::DigestLength { expected: 64, actual: 32, .. }
        ));
    }

    #[test]
    fn serializes_as_kms_digest_field_name() {
        assert_eq!(serde_json::to_string(&HashAlgorithm::Sha384).unwrap(), r#""sha384""#);
    }

    #[test]
    fn sha256_of_test() {
        assert_eq!(
            hex::encode(HashAlgorithm::Sha256.digest(b"test")),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }
}
