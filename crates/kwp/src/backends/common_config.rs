//! 📦 Common source config: the knobs every line source shares.
//!
//! 🧠 Knowledge graph:
//! - Embedded in `FileSourceConfig` and `S3SourceConfig` as `common_config`.
//! - Re-exported from `backends` so callers write `backends::CommonSourceConfig`.

use serde::{Deserialize, Serialize};

/// 📦 Shared configuration embedded by every streaming source backend.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CommonSourceConfig {
    /// 📖 Capacity of the read buffer sitting between the byte stream and the line splitter.
    #[serde(default = "default_read_buffer_bytes")]
    pub read_buffer_bytes: usize,
    /// 📏 Starting capacity of the reusable line buffer. It grows if a line is longer.
    #[serde(default = "default_line_capacity_bytes")]
    pub line_capacity_bytes: usize,
    /// 🚧 Longest line worth keeping. Longer ones are skipped and logged as malformed.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

// -- 📖 1 MiB. big enough that a 10GB file is ten thousand reads, not ten million.
fn default_read_buffer_bytes() -> usize {
    1024 * 1024
}

// -- 📏 clickstream lines carry a user agent and two URLs. 4 KiB covers nearly all of them.
fn default_line_capacity_bytes() -> usize {
    4096
}

// -- 🚧 1 MiB. a real clickstream line is a few KiB, a missing newline is gigabytes.
fn default_max_line_bytes() -> usize {
    1024 * 1024
}

impl Default for CommonSourceConfig {
    fn default() -> Self {
        Self {
            read_buffer_bytes: default_read_buffer_bytes(),
            line_capacity_bytes: default_line_capacity_bytes(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}
