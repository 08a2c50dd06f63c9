//! 🚀 kwp-cli: the front door, the bouncer, the maitre d' of kwp.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config, sets up
//! logging, runs the pipeline, prints the receipt, and picks an exit code
//! that tells cron exactly which stage fell over. 🦆

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use kwp::RunSummary;
use kwp::backends::{FileSourceConfig, S3SourceConfig, SourceConfig};
use tracing::error;
use tracing_subscriber::EnvFilter;

// -- 🔧 picked up from the working directory when --config is not given
const DEFAULT_CONFIG_FILE: &str = "kwp.toml";

/// 🔎 Attribute clickstream revenue to search engine referrals.
#[derive(Debug, Parser)]
#[command(name = "kwp", version, about)]
struct Cli {
    /// TOML config file. Defaults to ./kwp.toml when it exists, else env vars (KWP_*) only.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Read the clickstream from a local file, overriding the configured source.
    #[arg(long, conflicts_with = "s3")]
    file: Option<PathBuf>,

    /// Read the clickstream from S3 (`bucket/key`), overriding the configured source.
    #[arg(long)]
    s3: Option<String>,

    /// How to print the end-of-run summary.
    #[arg(long, value_enum, default_value_t = SummaryFormat::Table)]
    summary: SummaryFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SummaryFormat {
    Table,
    Json,
}

/// 🚀 main(): where it all begins.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config and apply CLI overrides
/// 4. Run the thing
/// 5. Print the summary, or peel the error onion and exit with the stage's code
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let app_config = match load(&cli) {
        Ok(app_config) => app_config,
        Err(err) => return report_failure(&err.context(kwp::StageFailure::Configuration)),
    };

    match kwp::run(app_config).await {
        Ok(summary) => match print_summary(&summary, cli.summary) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => report_failure(&err),
        },
        Err(err) => report_failure(&err),
    }
}

fn load(cli: &Cli) -> Result<kwp::app_config::AppConfig> {
    let config_file = resolve_config_file(cli.config.as_deref())?;
    kwp::app_config::load_config_with_source(config_file.as_deref(), source_override(cli)).context(
        "💀 In kwp-cli, main, we couldn't load the configuration. Take a look at the file and the \
         KWP_* environment, make sure a [source_config.*] table exists, or pass --file / --s3.",
    )
}

/// 🎯 `--file` / `--s3` become the run's source, whatever the config says.
fn source_override(cli: &Cli) -> Option<SourceConfig> {
    match (&cli.file, &cli.s3) {
        (Some(file), _) => Some(SourceConfig::File(FileSourceConfig::for_path(file))),
        (None, Some(object)) => Some(SourceConfig::S3(S3SourceConfig::for_object(object))),
        (None, None) => None,
    }
}

/// 🔒 An explicit --config must exist. The default file is optional.
fn resolve_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            let exists = path.try_exists().context(format!(
                "💀 Couldn't check whether '{}' exists. Permissions, maybe.",
                path.display()
            ))?;
            anyhow::ensure!(
                exists,
                "💀 Configuration file '{}' does not exist. If it's a relative path, check the \
                 working directory, or use an absolute path to be absolutely certain.",
                path.display()
            );
            Ok(Some(path.to_path_buf()))
        }
        None => {
            let the_default = Path::new(DEFAULT_CONFIG_FILE);
            Ok(the_default
                .try_exists()
                .unwrap_or(false)
                .then(|| the_default.to_path_buf()))
        }
    }
}

fn print_summary(summary: &RunSummary, format: SummaryFormat) -> Result<()> {
    match format {
        SummaryFormat::Json => {
            let the_json = serde_json::to_string_pretty(summary)
                .context("💀 The run summary refused to become JSON.")?;
            println!("{the_json}");
        }
        SummaryFormat::Table => println!("{}", summary_table(summary)),
    }
    Ok(())
}

fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["kwp run", ""]);

    let the_log = summary
        .log_path
        .as_ref()
        .map_or_else(|| "(nothing logged)".to_string(), |path| path.display().to_string());
    let rows = [
        ("input", summary.input.clone()),
        ("date", summary.date.clone()),
        ("lines read", summary.lines_read.to_string()),
        ("malformed lines", summary.engine.malformed_lines.to_string()),
        ("referrals recorded", summary.engine.referrals_recorded.to_string()),
        ("distinct ips", summary.distinct_ips.to_string()),
        ("purchases seen", summary.engine.purchases_seen.to_string()),
        ("purchases attributed", summary.engine.purchases_attributed.to_string()),
        ("errors logged", summary.error_count.to_string()),
        ("report rows", summary.report_rows.to_string()),
        ("report", summary.report_path.display().to_string()),
        ("log", the_log),
        ("published to", summary.published_to.clone()),
        ("parse time", format!("{:.3}s", summary.parse_seconds)),
        ("sort time", format!("{:.3}s", summary.sort_seconds)),
        ("total time", format!("{:.3}s", summary.total_seconds)),
    ];
    for (label, value) in rows {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

/// 💀 Peel the onion of sadness, one layer at a time, then pick the exit door.
fn report_failure(err: &anyhow::Error) -> ExitCode {
    error!("💀 error: {}", err);
    let mut the_vibes_are_giving_aws_issues = false;
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
        let cause_str = cause.to_string();
        if cause_str.contains("dispatch failure")
            || cause_str.contains("credentials")
            || cause_str.contains("NoSuchBucket")
            || cause_str.contains("NoSuchKey")
        {
            the_vibes_are_giving_aws_issues = true;
        }
    }

    if the_vibes_are_giving_aws_issues {
        error!(
            "🔧 hint: this smells like AWS. Check AWS_PROFILE / AWS_REGION, the credentials chain, \
             and that the bucket and key really exist in that region. ☕"
        );
    }

    let the_code = kwp::exit_code_for(err);
    ExitCode::from(u8::try_from(the_code).unwrap_or(1))
}
