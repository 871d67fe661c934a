use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response};

use crate::error::{FetchError, TokenError};

use super::TokenSource;

/// HTTP client that authorizes every request with a token source.
#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl AuthorizedClient {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self::with_client(reqwest::Client::new(), tokens)
    }

    pub fn with_client(http: reqwest::Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self { http, tokens }
    }

    /// Start a request carrying the current bearer token.
    pub async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, TokenError> {
        let token = self.tokens.token().await?;
        Ok(self
            .http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, token.authorization_header()))
    }

    /// Authorized GET. The response is returned whatever its status.
    pub async fn get(&self, url: &str) -> Result<Response, FetchError> {
        let response = self.request(Method::GET, url).await?.send().await?;
        Ok(response)
    }
}
