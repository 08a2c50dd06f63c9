//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment. Environment variables prefixed `KWP_` are the base layer,
//! an optional TOML file goes on top. Nested keys use `__` in env var names:
//! `KWP_REPORT__OUTPUT_DIR=/tmp/out` sets `report.output_dir`.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
    value::{Dict, Value},
};
use serde::Deserialize;
use tracing::info;

use crate::attribution::AttributionConfig;
use crate::backends::{PublishConfig, SourceConfig};
use crate::diagnostics::DiagnosticsConfig;
use crate::report::ReportConfig;

/// 📦 The AppConfig: one struct to rule them all.
///
/// Only `source_config` is required. Every other section falls back to defaults
/// that reproduce the classic run: header skipped, purchases are event `1`, the
/// shop's own pages are excluded, and the report lands in the working directory.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub source_config: SourceConfig,
    #[serde(default)]
    pub publish_config: PublishConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🏃 How the run itself behaves, as opposed to what it computes.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 📋 The export always starts with a header row. It is skipped unread.
    #[serde(default = "default_skip_header")]
    pub skip_header: bool,
    /// 📊 Draw the terminal progress bar while the input streams.
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_skip_header() -> bool {
    true
}

fn default_show_progress() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            skip_header: default_skip_header(),
            show_progress: default_show_progress(),
        }
    }
}

/// 🚀 Load the config from env vars (`KWP_*`) and, if given, a TOML file.
///
/// 📐 `None` means env vars only. `Some(path)` means env vars + TOML, with the
/// file winning on conflicts. No file is ever assumed.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    load_config_with_source(config_file_name, None)
}

/// 🎯 Same layers as [`load_config`], plus a source that beats all of them.
///
/// With `source_override` set, the layers no longer need a `[source_config.*]`
/// table at all (`kwp --file data.tsv` with nothing else around).
pub fn load_config_with_source(
    config_file_name: Option<&Path>,
    source_override: Option<SourceConfig>,
) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("KWP_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (KWP_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (KWP_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    let Some(the_source) = source_override else {
        return config.extract().context(context_msg);
    };

    // -- 🔁 replace the table whole. a figment merge would fold `File` and `S3` into one table.
    let mut the_layers: Dict = config.extract().context(context_msg.clone())?;
    let the_source = Value::serialize(the_source)
        .context("💀 The source override refused to become a config value. That one's on us.")?;
    the_layers.insert("source_config".to_string(), the_source);
    Value::from(the_layers).deserialize().context(context_msg)
}
