use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use crate::config::DEFAULT_STORAGE_ENDPOINT;
use crate::error::ListError;
use crate::token::AuthorizedClient;

use super::{Page, PageSource, get_json};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBucketsResponse {
    #[serde(default)]
    items: Vec<Bucket>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Pages of `buckets.list` for one project.
///
/// Cloud Storage rejects self-signed JWT access tokens, so the client must
/// carry OAuth2 access tokens.
pub struct StorageBuckets {
    client: AuthorizedClient,
    endpoint: String,
    project: String,
}

impl StorageBuckets {
    pub fn new(client: AuthorizedClient, project: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
            project: project.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PageSource for StorageBuckets {
    type Item = Bucket;

    async fn fetch_page(&self, page_token: Option<&str>) -> Result<Page<Bucket>, ListError> {
        let url = format!("{}/storage/v1/b", self.endpoint);
        let mut request = self
            .client
            .request(Method::GET, &url)
            .await?
            .query(&[("project", self.project.as_str())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        let response: ListBucketsResponse = get_json(request).await?;
        Ok(Page {
            items: response.items,
            next_page_token: response.next_page_token,
        })
    }
}
