use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::TokenError;

use super::{Token, TokenSource};

const DEFAULT_EARLY_EXPIRY_SECS: i64 = 10;

/// Hands out the last token until it is about to expire.
///
/// Concurrent callers wait on the same refresh instead of each minting a
/// token of their own.
pub struct CachedTokenSource<T> {
    inner: T,
    early_expiry: Duration,
    current: Mutex<Option<Token>>,
}

impl<T: TokenSource> CachedTokenSource<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            early_expiry: Duration::seconds(DEFAULT_EARLY_EXPIRY_SECS),
            current: Mutex::new(None),
        }
    }

    pub fn with_early_expiry(mut self, early_expiry: Duration) -> Self {
        self.early_expiry = early_expiry;
        self
    }
}

#[async_trait]
impl<T: TokenSource> TokenSource for CachedTokenSource<T> {
    async fn token(&self) -> Result<Token, TokenError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            if token.is_valid_at(Utc::now(), self.early_expiry) {
                return Ok(token.clone());
            }
        }

        debug!("refreshing cached token");
        let token = self.inner.token().await?;
        *current = Some(token.clone());
        Ok(token)
    }
}
