//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where every purchase had a past..."
//! 🎬 "One supervisor dared to ask where it came from."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor drives one run, start to finish, strictly in order:
//!
//! 1. Create the output directory, construct the diagnostics log (lazily opened).
//! 2. Open the source. Skip the header.
//! 3. Stream every line through the `AttributionEngine`.
//! 4. Hand the aggregates to the report writer (write, sort, clean up).
//! 5. Write the closing lines to the diagnostics log and close it.
//! 6. Publish.
//!
//! Every structural failure is tagged with a [`StageFailure`] and written into the
//! diagnostics log before it is returned. A failed run never publishes.
//!
//! ⚠️ DO NOT MAKE THIS PUB. `kwp::run` is the front door.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info};

use crate::app_config::AppConfig;
use crate::attribution::{AttributionEngine, EngineStats};
use crate::backends::{
    InputOrigin, Publisher, PublisherBackend, RunArtifacts, Source, SourceBackend,
};
use crate::diagnostics::{Diagnostics, format_stage_time};
use crate::error::StageFailure;
use crate::record::RecordError;
use crate::report::{self, ReportArtifact, run_date, stamp_file_name};

/// 📊 The end-of-run receipt. Printed by the CLI as a table or as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input: String,
    pub date: String,
    /// 📏 Physical lines read, header included.
    pub lines_read: u64,
    pub error_count: u64,
    pub distinct_ips: usize,
    pub engine: EngineStats,
    pub report_rows: usize,
    pub report_path: PathBuf,
    pub log_path: Option<PathBuf>,
    pub published_to: String,
    pub parse_seconds: f64,
    pub sort_seconds: f64,
    pub total_seconds: f64,
}

/// 📦 What the streaming half of a run produces, before the log closes.
struct Processed {
    origin: InputOrigin,
    lines_read: u64,
    distinct_ips: usize,
    stats: EngineStats,
    artifact: ReportArtifact,
    parse_seconds: f64,
}

/// 📦 The Supervisor: owns the config, runs the stages, tags the failures.
pub(crate) struct Supervisor {
    app_config: AppConfig,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🚀 One full run, stamped with today's date.
    pub(crate) async fn run(&self) -> Result<RunSummary> {
        self.run_for_date(&run_date()).await
    }

    /// 🚀 One full run with an explicit `{date}` stamp.
    pub(crate) async fn run_for_date(&self, date: &str) -> Result<RunSummary> {
        let run_started = Instant::now();
        let config = &self.app_config;

        tokio::fs::create_dir_all(&config.report.output_dir)
            .await
            .context(format!(
                "💀 Could not create the output directory '{}'.",
                config.report.output_dir.display()
            ))
            .context(StageFailure::OutputWrite)?;

        let log_path = config
            .report
            .output_dir
            .join(stamp_file_name(&config.diagnostics.file_name, date));
        let mut diagnostics = Diagnostics::new(&log_path, &config.diagnostics);

        let processed = match self.process(date, &mut diagnostics).await {
            Ok(processed) => processed,
            Err(err) => return Err(record_failure(&mut diagnostics, err)),
        };

        diagnostics
            .close()
            .context(StageFailure::Diagnostics)?;

        let artifacts = RunArtifacts {
            input: processed.origin.clone(),
            date: date.to_string(),
            report_path: processed.artifact.report_path.clone(),
            log_path: diagnostics.was_opened().then(|| log_path.clone()),
        };

        let mut publisher = PublisherBackend::from_config(&config.publish_config).await;
        if let Err(err) = publisher
            .publish(&artifacts)
            .await
            .context(StageFailure::Publish)
        {
            return Err(record_failure(&mut diagnostics, err));
        }

        let summary = RunSummary {
            input: processed.origin.to_string(),
            date: date.to_string(),
            lines_read: processed.lines_read,
            error_count: diagnostics.error_count(),
            distinct_ips: processed.distinct_ips,
            engine: processed.stats,
            report_rows: processed.artifact.row_count,
            report_path: artifacts.report_path,
            log_path: artifacts.log_path,
            published_to: publisher.destination(),
            parse_seconds: processed.parse_seconds,
            sort_seconds: processed.artifact.sort_elapsed.as_secs_f64(),
            total_seconds: run_started.elapsed().as_secs_f64(),
        };
        info!(
            "✅ run complete: {} lines, {} report rows, {} errors",
            summary.lines_read, summary.report_rows, summary.error_count
        );
        Ok(summary)
    }

    async fn process(&self, date: &str, diagnostics: &mut Diagnostics) -> Result<Processed> {
        let config = &self.app_config;

        let mut source = SourceBackend::from_config(&config.source_config, config.runtime.show_progress)
            .await
            .context(StageFailure::InputAcquisition)?;
        let origin = source.origin();
        info!("🚰 streaming clickstream from {}", origin);

        let parse_started = Instant::now();
        let mut engine = AttributionEngine::new(config.attribution.clone());
        let common_config = config.source_config.common_config();
        let mut line = Vec::with_capacity(common_config.line_capacity_bytes);
        let mut line_number: u64 = 0;

        if config.runtime.skip_header && read_next(&mut source, &mut line).await? > 0 {
            line_number += 1;
        }

        loop {
            let bytes_read = read_next(&mut source, &mut line).await?;
            if bytes_read == 0 {
                break;
            }
            line_number += 1;
            if line.is_empty() {
                let the_err = RecordError::LineTooLong {
                    limit: common_config.max_line_bytes,
                    found: bytes_read,
                };
                engine.reject_line(line_number, &the_err, diagnostics);
            } else {
                engine.consume_line(line_number, &line, diagnostics);
            }
        }

        let parse_elapsed = parse_started.elapsed();
        diagnostics.debug(format_args!("Parsing Time: {}", format_stage_time(parse_elapsed)));

        let stats = engine.stats();
        let distinct_ips = engine.distinct_ips();
        let artifact = report::finalize(engine.into_aggregates(), &config.report, date, diagnostics).await?;

        let the_error_count = diagnostics.error_count();
        diagnostics.info("File finished processing.");
        diagnostics.info(format_args!("Exceptions: {the_error_count}"));

        Ok(Processed {
            origin,
            lines_read: line_number,
            distinct_ips,
            stats,
            artifact,
            parse_seconds: parse_elapsed.as_secs_f64(),
        })
    }
}

async fn read_next(source: &mut SourceBackend, line: &mut Vec<u8>) -> Result<usize> {
    source
        .read_line(line)
        .await
        .context(StageFailure::InputAcquisition)
}

/// 💀 Write the failure into the run's own log, close it, hand the error back.
fn record_failure(diagnostics: &mut Diagnostics, err: anyhow::Error) -> anyhow::Error {
    error!("💀 run failed: {:#}", err);
    diagnostics.error(format_args!("{err:#}"));
    if let Err(close_err) = diagnostics.close() {
        error!("💀 and the diagnostics log could not record it: {:#}", close_err);
    }
    err
}
