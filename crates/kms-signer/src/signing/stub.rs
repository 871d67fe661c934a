use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::SignerError;

use super::signer::{HashAlgorithm, Signer};

enum Response {
    Signature(Vec<u8>),
    Error(String),
}

/// Signer that answers every call with a fixed result and counts calls.
///
/// Stands in for a remote backend where the signature itself does not
/// matter, or where a failure has to be injected.
pub struct StubSigner {
    response: Response,
    calls: AtomicUsize,
}

impl StubSigner {
    pub fn fixed(signature: impl Into<Vec<u8>>) -> Self {
        Self {
            response: Response::Signature(signature.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: Response::Error(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of digests that reached the stub, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for StubSigner {
    async fn sign(&self, digest: &[u8], algorithm: HashAlgorithm) -> Result<Vec<u8>, SignerError> {
        algorithm.check_digest(digest)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Response::Signature(signature) => Ok(signature.clone()),
            Response::Error(message) => Err(SignerError::Local(message.clone())),
        }
    }
}
