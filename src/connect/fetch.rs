use async_trait::async_trait;
use brdata_pipeline::{PipelineError, Result, SourceFetcher};
use bytes::Bytes;
use tracing::debug;

/// Plain GET. Non-2xx responses are network errors.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::network(url, format!("HTTP {}", status)));
        }
        response
            .bytes()
            .await
            .map_err(|e| PipelineError::network(url, e))
    }
}
