use async_trait::async_trait;
use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::SeedableRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::SignerError;

use super::signer::{HashAlgorithm, Signer};

const RSA_KEY_BITS: usize = 2048;

fn padding(algorithm: HashAlgorithm) -> Pkcs1v15Sign {
    match algorithm {
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    }
}

/// Local RSA PKCS#1 v1.5 signer over prehashed digests.
///
/// Produces the same signatures a KMS `RSA_SIGN_PKCS1_*` key would, which
/// makes it a drop-in backend for development and tests. PKCS#1 v1.5 is
/// deterministic, so repeated calls return identical bytes.
pub struct RsaSigner {
    private_key: RsaPrivateKey,
}

impl RsaSigner {
    /// The SHA-256 hash of the seed seeds a deterministic CSPRNG used for
    /// key generation.
    pub fn from_seed(seed: &str) -> Result<Self, SignerError> {
        let hash = Sha256::digest(seed.as_bytes());
        let mut rng = ChaCha20Rng::from_seed(hash.into());
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| SignerError::Local(format!("generating RSA key from seed: {e}")))?;
        Ok(Self { private_key })
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, SignerError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| SignerError::Local(format!("parsing PKCS#8 key: {e}")))?;
        Ok(Self { private_key })
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }

    pub fn public_key_pem(&self) -> Result<String, SignerError> {
        self.public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SignerError::Local(format!("encoding RSA public key: {e}")))
    }

    pub fn algorithm(&self) -> &str {
        "rsa-pkcs1v15"
    }

    /// Check a signature over `digest` against this signer's public key.
    pub fn verify(
        &self,
        digest: &[u8],
        algorithm: HashAlgorithm,
        signature: &[u8],
    ) -> Result<(), SignerError> {
        self.public_key()
            .verify(padding(algorithm), digest, signature)
            .map_err(|e| SignerError::Local(format!("signature does not verify: {e}")))
    }
}

#[async_trait]
impl Signer for RsaSigner {
    async fn sign(&self, digest: &[u8], algorithm: HashAlgorithm) -> Result<Vec<u8>, SignerError> {
        algorithm.check_digest(digest)?;
        self.private_key
            .sign(padding(algorithm), digest)
            .map_err(|e| SignerError::Local(format!("RSA signing failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::sign_message;

    fn test_signer() -> RsaSigner {
        RsaSigner::from_seed("test-seed").unwrap()
    }

    #[tokio::test]
    async fn deterministic_signing() {
        let signer = test_signer();
        let digest = HashAlgorithm::Sha256.digest(b"hello");
        let sig1 = signer.sign(&digest, HashAlgorithm::Sha256).await.unwrap();
        let sig2 = signer.sign(&digest, HashAlgorithm::Sha256).await.unwrap();
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn deterministic_key_generation() {
        let signer_a = RsaSigner::from_seed("test-seed").unwrap();
        let signer_b = RsaSigner::from_seed("test-seed").unwrap();
        assert_eq!(signer_a.public_key(), signer_b.public_key());
    }

    #[tokio::test]
    async fn signature_is_256_bytes() {
        let signer = test_signer();
        let sig = sign_message(&signer, HashAlgorithm::Sha256, b"data").await.unwrap();
        assert_eq!(sig.len(), RSA_KEY_BITS / 8);
    }

    #[tokio::test]
    async fn signature_verifies_for_each_algorithm() {
        let signer = test_signer();
        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Sha384, HashAlgorithm::Sha512] {
            let digest = algorithm.digest(b"verify me");
            let sig = signer.sign(&digest, algorithm).await.unwrap();
            signer.verify(&digest, algorithm, &sig).unwrap();
        }
    }

    #[tokio::test]
    async fn digest_of_wrong_length_is_rejected() {
        let err = test_signer()
            .sign(&[0u8; 20], HashAlgorithm::Sha256)
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::DigestLength { .. }));
    }

    #[test]
    fn public_key_pem_is_spki() {
        let pem = test_signer().public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    }
}
