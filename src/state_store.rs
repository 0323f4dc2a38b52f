// Local table state
//
// One JSON document per dataset/table under the state directory. Serves as
// both the watermark store and the metadata updater of a local run.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use brdata_core::{DateFormat, Watermark};
use brdata_pipeline::{MetadataUpdater, PipelineError, Result, WatermarkStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableState {
    pub watermark: Option<Watermark>,
    /// Coverage end as published to the metadata catalogue.
    pub coverage_end: Option<String>,
    pub date_format: Option<DateFormat>,
    pub metadata_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, dataset_id: &str, table_id: &str) -> PathBuf {
        self.dir.join(dataset_id).join(format!("{table_id}.json"))
    }

    pub async fn read(&self, dataset_id: &str, table_id: &str) -> Result<TableState> {
        let path = self.path(dataset_id, table_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                PipelineError::metadata(format!("corrupt state file {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TableState::default()),
            Err(e) => Err(PipelineError::metadata(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write(&self, dataset_id: &str, table_id: &str, state: &TableState) -> Result<()> {
        let path = self.path(dataset_id, table_id);
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| PipelineError::metadata(e.to_string()))?;
        write_atomic(&path, &bytes)
            .await
            .map_err(|e| PipelineError::metadata(format!("failed to write {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Stored table state");
        Ok(())
    }
}

/// Write next to the target, then rename over it.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

#[async_trait]
impl WatermarkStore for JsonStateStore {
    async fn load(&self, dataset_id: &str, table_id: &str) -> Result<Option<Watermark>> {
        Ok(self.read(dataset_id, table_id).await?.watermark)
    }

    async fn advance(&self, dataset_id: &str, table_id: &str, watermark: Watermark) -> Result<()> {
        let mut state = self.read(dataset_id, table_id).await?;
        state.watermark = Some(
            state
                .watermark
                .map_or(watermark, |current| current.advance(watermark)),
        );
        self.write(dataset_id, table_id, &state).await
    }
}

#[async_trait]
impl MetadataUpdater for JsonStateStore {
    async fn update(
        &self,
        dataset_id: &str,
        table_id: &str,
        watermark: Watermark,
        format: DateFormat,
    ) -> Result<()> {
        let mut state = self.read(dataset_id, table_id).await?;
        state.coverage_end = Some(watermark.format(format));
        state.date_format = Some(format);
        state.metadata_updated_at = Some(Utc::now());
        self.write(dataset_id, table_id, &state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wm(year: i32, month: u32) -> Watermark {
        Watermark::from_year_month(year, month).unwrap()
    }

    #[tokio::test]
    async fn test_missing_state_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        assert_eq!(store.load("ds", "tbl").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_advance_never_moves_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());

        store.advance("ds", "tbl", wm(2020, 3)).await.unwrap();
        store.advance("ds", "tbl", wm(2019, 12)).await.unwrap();
        assert_eq!(store.load("ds", "tbl").await.unwrap(), Some(wm(2020, 3)));

        store.advance("ds", "tbl", wm(2021, 1)).await.unwrap();
        assert_eq!(store.load("ds", "tbl").await.unwrap(), Some(wm(2021, 1)));
        assert!(store.path("ds", "tbl").exists());
        assert!(!store.path("ds", "tbl").with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_metadata_update_keeps_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        store.advance("ds", "tbl", wm(2020, 3)).await.unwrap();

        store
            .update("ds", "tbl", wm(2020, 3), DateFormat::YearMonth)
            .await
            .unwrap();

        let state = store.read("ds", "tbl").await.unwrap();
        assert_eq!(state.watermark, Some(wm(2020, 3)));
        assert_eq!(state.coverage_end.as_deref(), Some("2020-03"));
        assert_eq!(state.date_format, Some(DateFormat::YearMonth));
        assert!(state.metadata_updated_at.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_metadata_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        let path = store.path("ds", "tbl");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{not json").unwrap();

        let err = store.load("ds", "tbl").await.unwrap_err();
        assert_eq!(err.error_type(), "MetadataFailed");
    }
}
