use async_trait::async_trait;
use brdata_config::MaterializationMode;
use brdata_pipeline::{
    MaterializationParams, MaterializationTrigger, PipelineError, Result, RunHandle, RunStatus,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Downstream job service: `POST <endpoint>/runs` starts a run,
/// `GET <endpoint>/runs/<id>` reports its status.
pub struct HttpMaterializer {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    dataset_id: &'a str,
    table_id: &'a str,
    mode: MaterializationMode,
    dbt_alias: bool,
}

#[derive(Deserialize)]
struct RunCreated {
    id: String,
}

#[derive(Deserialize)]
struct RunState {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

impl HttpMaterializer {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    fn runs_url(&self) -> String {
        format!("{}/runs", self.endpoint)
    }
}

/// Map a status body to a run state. Unknown statuses count as failures.
pub fn parse_status(body: &[u8]) -> std::result::Result<RunStatus, String> {
    let state: RunState = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    Ok(match state.status.to_ascii_lowercase().as_str() {
        "success" | "succeeded" => RunStatus::Success,
        "running" | "pending" | "queued" => RunStatus::Running,
        "failed" | "error" => {
            RunStatus::Failed(state.message.unwrap_or_else(|| "no message".to_string()))
        }
        other => RunStatus::Failed(format!("unknown status '{}'", other)),
    })
}

#[async_trait]
impl MaterializationTrigger for HttpMaterializer {
    async fn run_materialization(
        &self,
        dataset_id: &str,
        table_id: &str,
        params: MaterializationParams,
    ) -> Result<RunHandle> {
        let url = self.runs_url();
        let response = self
            .client
            .post(&url)
            .json(&RunRequest {
                dataset_id,
                table_id,
                mode: params.mode,
                dbt_alias: params.dbt_alias,
            })
            .send()
            .await
            .map_err(|e| PipelineError::network(url.as_str(), e))?;
        if !response.status().is_success() {
            return Err(PipelineError::network(
                url.as_str(),
                format!("HTTP {}", response.status()),
            ));
        }

        let created: RunCreated = response
            .json()
            .await
            .map_err(|e| PipelineError::network(url.as_str(), e))?;
        Ok(RunHandle(created.id))
    }

    async fn status(&self, handle: &RunHandle) -> Result<RunStatus> {
        let url = format!("{}/{}", self.runs_url(), handle.0);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::network(url.as_str(), e))?;
        if !response.status().is_success() {
            return Err(PipelineError::network(
                url.as_str(),
                format!("HTTP {}", response.status()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::network(url.as_str(), e))?;
        let status = parse_status(&body).map_err(|e| PipelineError::network(url.as_str(), e))?;
        debug!(run_id = %handle.0, status = ?status, "Materialization status");
        Ok(status)
    }
}
