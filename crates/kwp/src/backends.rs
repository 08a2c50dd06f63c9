//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Sources pour the clickstream in, one line at a time. Publishers carry the
//! report and the diagnostics log out to wherever somebody is waiting for them.
//! Everything in between is pure CPU and two hash maps.
//!
//! 🎭 This module is the casting agency. Local file? S3 object? A handful of lines
//! typed into a test? We've got a source for that. Outbound directory? S3 bucket?
//! Nowhere at all? We've got a publisher for that too.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls → `*Backend` enum that dispatches → `*Config`
//!   enum that builds the backend. Configs live next to the backend that uses them.
//! - `SourceConfig` / `PublishConfig` are externally tagged: `[source_config.File]`.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod common_config;
pub mod file;
pub mod in_mem;
pub(crate) mod line_reader;
pub mod s3;

pub use common_config::CommonSourceConfig;
pub use file::{DirectoryPublishConfig, FileSourceConfig};
pub use in_mem::InMemorySourceConfig;
pub use s3::{ObjectPath, ObjectPathError, S3PublishConfig, S3SourceConfig};

// ===== Source Trait and Backend Enum =====

/// 🚰 A forward-only stream of raw lines.
///
/// # Contract 📜
/// - `read_line` clears `buf`, then fills it with the next line, terminator included.
/// - Returns the number of bytes read. `0` means the input is exhausted, and stays exhausted.
/// - A line longer than `max_line_bytes` is consumed whole but handed back as an
///   empty `buf` with a non-zero count.
/// - Bytes are handed over uninterpreted. Decoding and column splitting happen downstream.
#[async_trait]
pub(crate) trait Source: std::fmt::Debug + Send {
    async fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize>;

    /// 🏷️ Where the lines came from. The publisher needs it to archive the input.
    fn origin(&self) -> InputOrigin;
}

/// 🏷️ Where a run's input lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InputOrigin {
    InMemory,
    File(PathBuf),
    S3 { object: ObjectPath, region: String },
}

impl std::fmt::Display for InputOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory => write!(f, "in-memory"),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::S3 { object, .. } => write!(f, "{object}"),
        }
    }
}

/// 🔧 Which source to read from. Exactly one per run.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub enum SourceConfig {
    InMemory(InMemorySourceConfig),
    File(FileSourceConfig),
    S3(S3SourceConfig),
}

impl SourceConfig {
    /// 📏 The line buffer knobs for this source. In-memory lines get the defaults.
    pub fn common_config(&self) -> CommonSourceConfig {
        match self {
            SourceConfig::InMemory(_) => CommonSourceConfig::default(),
            SourceConfig::File(file_config) => file_config.common_config.clone(),
            SourceConfig::S3(s3_config) => s3_config.common_config.clone(),
        }
    }
}

/// 🎭 The many faces of a Source.
#[derive(Debug)]
pub(crate) enum SourceBackend {
    InMemory(in_mem::InMemorySource),
    File(file::FileSource),
    S3(s3::S3Source),
}

impl SourceBackend {
    /// 🚀 Open whatever the config points at.
    pub(crate) async fn from_config(config: &SourceConfig, show_progress: bool) -> Result<Self> {
        Ok(match config {
            SourceConfig::InMemory(in_mem_config) => {
                Self::InMemory(in_mem::InMemorySource::new(in_mem_config.clone()))
            }
            SourceConfig::File(file_config) => {
                Self::File(file::FileSource::new(file_config.clone(), show_progress).await?)
            }
            SourceConfig::S3(s3_config) => {
                Self::S3(s3::S3Source::new(s3_config.clone(), show_progress).await?)
            }
        })
    }
}

#[async_trait]
impl Source for SourceBackend {
    async fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        match self {
            SourceBackend::InMemory(source) => source.read_line(buf).await,
            SourceBackend::File(source) => source.read_line(buf).await,
            SourceBackend::S3(source) => source.read_line(buf).await,
        }
    }

    fn origin(&self) -> InputOrigin {
        match self {
            SourceBackend::InMemory(source) => source.origin(),
            SourceBackend::File(source) => source.origin(),
            SourceBackend::S3(source) => source.origin(),
        }
    }
}

// ===== Publisher Trait and Backend Enum =====

/// 📦 Everything a successful run leaves behind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunArtifacts {
    pub input: InputOrigin,
    /// 📅 `YYYY-MM-DD`, the same stamp used in the artifact file names.
    pub date: String,
    pub report_path: PathBuf,
    /// 📝 `None` when nothing was ever written to the diagnostics log.
    pub log_path: Option<PathBuf>,
}

/// 📤 Ships a finished run's artifacts somewhere.
///
/// # Contract 📜
/// - Called at most once per run, only after the report and the log are closed.
/// - Any error is a publish stage failure. Retries are somebody else's job.
#[async_trait]
pub(crate) trait Publisher: std::fmt::Debug + Send {
    async fn publish(&mut self, artifacts: &RunArtifacts) -> Result<()>;

    /// 🏷️ Human-readable destination for the run summary.
    fn destination(&self) -> String;
}

/// 🔧 Where the artifacts go. `None` leaves them in the output directory.
#[derive(Debug, Deserialize, Clone, Default)]
pub enum PublishConfig {
    #[default]
    None,
    Directory(DirectoryPublishConfig),
    S3(S3PublishConfig),
}

/// 🎭 The many faces of a Publisher.
#[derive(Debug)]
pub(crate) enum PublisherBackend {
    None,
    Directory(file::DirectoryPublisher),
    S3(s3::S3Publisher),
}

impl PublisherBackend {
    pub(crate) async fn from_config(config: &PublishConfig) -> Self {
        match config {
            PublishConfig::None => Self::None,
            PublishConfig::Directory(directory_config) => {
                Self::Directory(file::DirectoryPublisher::new(directory_config.clone()))
            }
            PublishConfig::S3(s3_config) => Self::S3(s3::S3Publisher::new(s3_config.clone()).await),
        }
    }
}

#[async_trait]
impl Publisher for PublisherBackend {
    async fn publish(&mut self, artifacts: &RunArtifacts) -> Result<()> {
        match self {
            PublisherBackend::None => Ok(()),
            PublisherBackend::Directory(publisher) => publisher.publish(artifacts).await,
            PublisherBackend::S3(publisher) => publisher.publish(artifacts).await,
        }
    }

    fn destination(&self) -> String {
        match self {
            PublisherBackend::None => "none".to_string(),
            PublisherBackend::Directory(publisher) => publisher.destination(),
            PublisherBackend::S3(publisher) => publisher.destination(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        source_config: SourceConfig,
        #[serde(default)]
        publish_config: PublishConfig,
    }

    #[test]
    fn the_one_where_the_table_name_picks_the_backend() {
        let the_wrapper: Wrapper = toml::from_str(
            r#"
            [source_config.S3]
            object = "clickstream/inbound/data.tsv"

            [publish_config.Directory]
            path = "outbound"
            "#,
        )
        .expect("💀 tagged tables should deserialize");

        assert!(matches!(the_wrapper.source_config, SourceConfig::S3(ref s3) if s3.object == "clickstream/inbound/data.tsv"));
        assert!(matches!(the_wrapper.publish_config, PublishConfig::Directory(ref dir) if dir.path == PathBuf::from("outbound")));
    }

    #[test]
    fn the_one_where_no_publisher_means_none() {
        let the_wrapper: Wrapper = toml::from_str(
            r#"
            [source_config.File]
            file_name = "data.tsv"
            "#,
        )
        .expect("💀 publish_config is optional");

        assert!(matches!(the_wrapper.publish_config, PublishConfig::None));
    }

    #[tokio::test]
    async fn the_one_where_the_enum_forwards_to_the_in_memory_source() -> Result<()> {
        let the_config = SourceConfig::InMemory(InMemorySourceConfig {
            lines: vec!["only line".to_string()],
        });
        let mut the_backend = SourceBackend::from_config(&the_config, false).await?;
        let mut the_buf = Vec::new();

        assert_eq!(the_backend.read_line(&mut the_buf).await?, 10);
        assert_eq!(the_backend.read_line(&mut the_buf).await?, 0);
        assert_eq!(the_backend.origin(), InputOrigin::InMemory);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_none_publisher_does_nothing_gracefully() -> Result<()> {
        let mut the_publisher = PublisherBackend::from_config(&PublishConfig::None).await;
        the_publisher
            .publish(&RunArtifacts {
                input: InputOrigin::InMemory,
                date: "2026-10-14".to_string(),
                report_path: PathBuf::from("never/read.tab"),
                log_path: None,
            })
            .await?;
        assert_eq!(the_publisher.destination(), "none");
        Ok(())
    }
}
