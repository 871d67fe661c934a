use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use crate::config::DEFAULT_PUBSUB_ENDPOINT;
use crate::error::ListError;
use crate::token::AuthorizedClient;

use super::{Page, PageSource, get_json};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Topic {
    /// Full resource name, `projects/{project}/topics/{topic}`.
    pub name: String,
}

impl Topic {
    /// The short topic id.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTopicsResponse {
    #[serde(default)]
    topics: Vec<Topic>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Pages of `projects.topics.list`.
pub struct PubSubTopics {
    client: AuthorizedClient,
    endpoint: String,
    project: String,
}

impl PubSubTopics {
    pub fn new(client: AuthorizedClient, project: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: DEFAULT_PUBSUB_ENDPOINT.to_string(),
            project: project.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PageSource for PubSubTopics {
    type Item = Topic;

    async fn fetch_page(&self, page_token: Option<&str>) -> Result<Page<Topic>, ListError> {
        let url = format!("{}/v1/projects/{}/topics", self.endpoint, self.project);
        let mut request = self.client.request(Method::GET, &url).await?;
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        let response: ListTopicsResponse = get_json(request).await?;
        Ok(Page {
            items: response.topics,
            next_page_token: response.next_page_token,
        })
    }
}
