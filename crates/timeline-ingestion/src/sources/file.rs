//! File-backed series source.
//!
//! Serves a captured backend response from disk, restricted to the
//! requested range. Useful for replaying incidents offline.

use super::{decode_series, restrict_to_range, SeriesSource};
use async_trait::async_trait;
use incident_timeline_core::{records::TimeWindow, series::RawSeries, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Series source reading a JSON payload from a file
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    /// Create a source named after the file
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        Self { name, path }
    }

    /// Override the source name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode the whole file
    pub async fn load(&self) -> Result<Vec<RawSeries>> {
        let payload = tokio::fs::read_to_string(&self.path).await?;
        decode_series(&payload)
    }
}

#[async_trait]
impl SeriesSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, range: &TimeWindow) -> Result<Vec<RawSeries>> {
        let series = restrict_to_range(self.load().await?, range);
        debug!(
            source = %self.name,
            path = %self.path.display(),
            series = series.len(),
            "Read series from file"
        );
        Ok(series)
    }
}
