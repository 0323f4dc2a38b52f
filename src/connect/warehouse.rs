use std::path::Path;

use async_trait::async_trait;
use brdata_config::LoadMode;
use brdata_pipeline::{Result, WarehouseLoader};
use opendal::Operator;

/// Uploads a table tree under `<dataset>/<table>/`.
pub struct OpendalLoader {
    operator: Operator,
}

impl OpendalLoader {
    pub fn new(operator: Operator) -> Self {
        Self { operator }
    }
}

#[async_trait]
impl WarehouseLoader for OpendalLoader {
    async fn upload(
        &self,
        local_path: &Path,
        dataset_id: &str,
        table_id: &str,
        mode: LoadMode,
    ) -> Result<()> {
        let prefix = format!("{}/{}", dataset_id, table_id);
        brdata_writer::upload_tree(&self.operator, local_path, &prefix, mode).await?;
        Ok(())
    }
}
