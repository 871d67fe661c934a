//! Lazy iteration over paginated list APIs.

mod pubsub;
mod storage;

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::Stream;
use serde::de::DeserializeOwned;

use crate::error::ListError;

pub use pubsub::{PubSubTopics, Topic};
pub use storage::{Bucket, StorageBuckets};

/// One page of results and the token of the page after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// Fetches a single page of a list API.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// `None` requests the first page.
    async fn fetch_page(&self, page_token: Option<&str>) -> Result<Page<Self::Item>, ListError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Start,
    Next(String),
    Done,
}

/// A restartable sequence over every item of a [`PageSource`].
///
/// Pages are fetched on demand. `next` yields `Ok(None)` once the last page
/// is drained, and keeps doing so until [`Pager::restart`]. A failed fetch
/// leaves the cursor where it was, so calling `next` again retries the same
/// page.
pub struct Pager<S: PageSource> {
    source: S,
    buffered: VecDeque<S::Item>,
    cursor: Cursor,
}

impl<S: PageSource> Pager<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffered: VecDeque::new(),
            cursor: Cursor::Start,
        }
    }

    pub async fn next(&mut self) -> Result<Option<S::Item>, ListError> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Ok(Some(item));
            }
            let page_token = match &self.cursor {
                Cursor::Start => None,
                Cursor::Next(token) => Some(token.clone()),
                Cursor::Done => return Ok(None),
            };

            let page = self.source.fetch_page(page_token.as_deref()).await?;
            self.cursor = match page.next_page_token {
                Some(token) if !token.is_empty() => Cursor::Next(token),
                _ => Cursor::Done,
            };
            self.buffered.extend(page.items);
        }
    }

    /// Go back to the first page, dropping anything buffered.
    pub fn restart(&mut self) {
        self.buffered.clear();
        self.cursor = Cursor::Start;
    }

    pub async fn collect_all(&mut self) -> Result<Vec<S::Item>, ListError> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<S::Item, ListError>> {
        futures::stream::try_unfold(self, |mut pager| async move {
            Ok::<_, ListError>(pager.next().await?.map(|item| (item, pager)))
        })
    }
}

/// Send an authorized GET and decode a JSON list response.
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ListError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ListError::Status { status, body });
    }
    serde_json::from_str(&body).map_err(|e| ListError::Decode(e.to_string()))
}
