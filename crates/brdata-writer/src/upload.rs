//! Mirror a local output tree into object storage.

use std::path::{Path, PathBuf};

use brdata_config::LoadMode;
use opendal::{ErrorKind, Operator};
use tracing::{debug, info};

use crate::error::{Result, WriterError};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub files: usize,
    pub bytes: u64,
    /// Remote objects removed before upload (overwrite mode).
    pub deleted: usize,
}

/// Upload every file under `local_dir` to `<remote_prefix>/<relative path>`.
///
/// In `Overwrite` mode everything already under the prefix is deleted first.
pub async fn upload_tree(
    op: &Operator,
    local_dir: &Path,
    remote_prefix: &str,
    mode: LoadMode,
) -> Result<UploadReport> {
    let prefix = normalize_prefix(remote_prefix);
    let mut report = UploadReport::default();

    if mode == LoadMode::Overwrite {
        report.deleted = clear_prefix(op, &prefix).await?;
    }

    let mut files = Vec::new();
    collect_files(local_dir, &mut files)?;
    files.sort();

    for file in files {
        let relative = file.strip_prefix(local_dir).map_err(|e| {
            WriterError::upload_failure(file.display().to_string(), e.to_string())
        })?;
        let key = remote_key(&prefix, relative);
        let content = tokio::fs::read(&file).await.map_err(|e| {
            WriterError::upload_failure(file.display().to_string(), e.to_string())
        })?;

        let size = content.len() as u64;
        op.write(&key, content)
            .await
            .map_err(|e| WriterError::upload_failure(key.clone(), e.to_string()))?;
        debug!(key = %key, bytes = size, "Uploaded file");

        report.files += 1;
        report.bytes += size;
    }

    info!(
        prefix = %prefix,
        mode = %mode,
        files = report.files,
        bytes = report.bytes,
        deleted = report.deleted,
        "Upload complete"
    );
    Ok(report)
}

async fn clear_prefix(op: &Operator, prefix: &str) -> Result<usize> {
    let entries = match op.list_with(prefix).recursive(true).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(WriterError::upload_failure(prefix.to_string(), e.to_string())),
    };

    let mut deleted = 0;
    for entry in entries {
        if !entry.metadata().mode().is_file() {
            continue;
        }
        op.delete(entry.path())
            .await
            .map_err(|e| WriterError::upload_failure(entry.path().to_string(), e.to_string()))?;
        deleted += 1;
    }
    Ok(deleted)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| WriterError::upload_failure(dir.display().to_string(), e.to_string()))?;
    for entry in entries {
        let path = entry
            .map_err(|e| WriterError::upload_failure(dir.display().to_string(), e.to_string()))?
            .path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

fn remote_key(prefix: &str, relative: &Path) -> String {
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("{}{}", prefix, parts.join("/"))
}
