use async_trait::async_trait;
use brdata_core::Watermark;
use brdata_pipeline::{FreshnessSignal, PipelineError, Result};
use chrono::{DateTime, Datelike};
use reqwest::header::LAST_MODIFIED;
use tracing::debug;

/// Latest complete period of the sources, from their `Last-Modified` headers.
pub struct LastModifiedSignal {
    client: reqwest::Client,
    urls: Vec<String>,
    lag_months: u32,
}

impl LastModifiedSignal {
    pub fn new(client: reqwest::Client, urls: Vec<String>, lag_months: u32) -> Self {
        Self {
            client,
            urls,
            lag_months,
        }
    }
}

/// Month of an HTTP date, moved back by the publication lag.
pub fn period_from_last_modified(value: &str, lag_months: u32) -> Option<Watermark> {
    let modified = DateTime::parse_from_rfc2822(value.trim()).ok()?;
    Watermark::from_year_month(modified.year(), modified.month())?.months_back(lag_months)
}

#[async_trait]
impl FreshnessSignal for LastModifiedSignal {
    async fn latest(&self, dataset_id: &str, table_id: &str) -> Result<Watermark> {
        let mut latest: Option<Watermark> = None;
        for url in &self.urls {
            let response = self
                .client
                .head(url)
                .send()
                .await
                .map_err(|e| PipelineError::network(url.as_str(), e))?;
            if !response.status().is_success() {
                return Err(PipelineError::network(
                    url.as_str(),
                    format!("HTTP {}", response.status()),
                ));
            }

            let header = response
                .headers()
                .get(LAST_MODIFIED)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| PipelineError::network(url.as_str(), "missing Last-Modified header"))?;
            let period = period_from_last_modified(header, self.lag_months).ok_or_else(|| {
                PipelineError::network(url.as_str(), format!("unparseable Last-Modified '{}'", header))
            })?;
            debug!(url = %url, last_modified = header, period = %period, "Read source freshness");

            latest = Some(latest.map_or(period, |current| current.max(period)));
        }

        latest.ok_or_else(|| {
            PipelineError::invalid_argument(format!(
                "no sources to check for {}.{}",
                dataset_id, table_id
            ))
        })
    }
}
