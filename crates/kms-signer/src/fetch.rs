use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::error::FetchError;

/// GET a signed URL. The body of a 2xx response is returned as is; any
/// other status is an error carrying the response body.
pub async fn fetch(client: &reqwest::Client, url: &Url) -> Result<Bytes, FetchError> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    debug!(%status, host = url.host_str().unwrap_or_default(), "signed URL fetched");

    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
        return Err(FetchError::Status { status, body });
    }
    Ok(response.bytes().await?)
}
