use crate::types::{FinalReport, PersistenceError};
use std::path::{Path, PathBuf};
use tracing::info;

/// Persists the final Markdown report to disk, overwriting any previous
/// report at the same path.
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the report as UTF-8. The parent directory is created if
    /// missing; repeated writes fully replace the previous content.
    pub async fn persist(&self, report: &FinalReport) -> Result<PathBuf, PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistenceError {
                    path: self.path.clone(),
                    source,
                })?;
        }

        tokio::fs::write(&self.path, report.markdown.as_bytes())
            .await
            .map_err(|source| PersistenceError {
                path: self.path.clone(),
                source,
            })?;

        info!(path = %self.path.display(), "Report written");
        Ok(self.path.clone())
    }
}
