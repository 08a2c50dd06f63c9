use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::File;

use crate::backends::line_reader::LineReader;
use crate::backends::{CommonSourceConfig, InputOrigin, Source};
use crate::progress::ProgressMetrics;

// -- 📂 FileSourceConfig lives here, next to the FileSource that uses it.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FileSourceConfig {
    pub file_name: PathBuf,
    #[serde(default)]
    pub common_config: CommonSourceConfig,
}

impl FileSourceConfig {
    /// 🎯 A config pointing at `file_name` with every other knob at its default.
    pub fn for_path(file_name: impl Into<PathBuf>) -> Self {
        Self {
            file_name: file_name.into(),
            common_config: CommonSourceConfig::default(),
        }
    }
}

/// 📂 FileSource reads a local clickstream export one line at a time.
///
/// 🧵 Async, non-blocking. A tokio `File` behind a sized `BufReader`.
/// ⚠️ If the file is still being written while we read it, the size estimate on the
/// progress bar will be wrong. The lines will still be right.
pub(crate) struct FileSource {
    lines: LineReader<File>,
    source_config: FileSourceConfig,
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("source_config", &self.source_config)
            .finish()
    }
}

impl FileSource {
    /// 🚀 Open the file, grab its size for the progress bar, and get ready to stream.
    pub(crate) async fn new(source_config: FileSourceConfig, show_progress: bool) -> Result<Self> {
        let file_handle = File::open(&source_config.file_name)
            .await
            .context(format!(
                "💀 The door to '{}' would not budge. We knocked. We checked if it existed \
                (it might not). We checked permissions (they might be wrong). The file remains unopened.",
                source_config.file_name.display()
            ))?;

        // 📏 metadata failure just means an unknown size. the bar copes.
        let file_size = file_handle.metadata().await.map(|m| m.len()).unwrap_or(0);
        let progress = ProgressMetrics::new(
            source_config.file_name.display().to_string(),
            file_size,
            show_progress,
        );
        let lines = LineReader::new(file_handle, &source_config.common_config, progress);

        Ok(Self {
            lines,
            source_config,
        })
    }
}

#[async_trait]
impl Source for FileSource {
    async fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        self.lines.read_line(buf).await.context(format!(
            "💀 Reading '{}' failed partway through.",
            self.source_config.file_name.display()
        ))
    }

    fn origin(&self) -> InputOrigin {
        InputOrigin::File(self.source_config.file_name.clone())
    }
}
