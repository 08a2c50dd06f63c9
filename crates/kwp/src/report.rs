//! 📑 Report: turning a hash map of money into a file a human can read.
//!
//! 🎬 *[the stream is over. the engine hands over a bag of (engine, phrase) → dollars.]*
//! *[the bag is in no particular order. the report writer sighs and gets to work.]*
//!
//! Three moves, in this order:
//! 1. Dump every aggregate to an intermediate tab-delimited file, unsorted.
//! 2. Read it back, sort it descending by revenue, write the header plus the rows
//!    to `<report>.partial`, rename it into place. This step runs on the blocking
//!    pool under a timeout.
//! 3. Delete the intermediate file.
//!
//! A sort that fails or runs out of time is called off through a [`SortGate`]: the
//! blocking job can no longer rename its output into place, and every file the
//! stage created is removed. A failed run leaves no report behind.
//!
//! Each move tags its failures with a [`StageFailure`] so the CLI can tell a full
//! disk (`OutputWrite`) from a sort that took forever (`Sort`).

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::attribution::AggregateKey;
use crate::diagnostics::{Diagnostics, format_stage_time};
use crate::error::StageFailure;

/// 📋 First line of every report. Three columns, tab separated, no surprises.
pub const REPORT_HEADER: &str = "Search Engine Domain\tSearch Keyword\tRevenue";

// -- 📦 same 1 MiB the diagnostics log buffers with
const WRITE_BUFFER_BYTES: usize = 1024 * 1024;

/// 🔧 Where the report goes and how long sorting may take.
#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    /// 📁 Directory for the report, the intermediate file and the diagnostics log.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// 📄 `{date}` expands to the run date, `YYYY-MM-DD`.
    #[serde(default = "default_report_file_name")]
    pub report_file_name: String,
    #[serde(default = "default_intermediate_file_name")]
    pub intermediate_file_name: String,
    /// ⏱️ Budget for the sort stage, in milliseconds. `0` means no limit.
    #[serde(default = "default_sort_timeout_ms")]
    pub sort_timeout_ms: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_report_file_name() -> String {
    "{date}_SearchKeywordPerformance.tab".to_string()
}

fn default_intermediate_file_name() -> String {
    "{date}_tempfile".to_string()
}

// -- ⏱️ five minutes. the whole sort is one Vec in memory, so hitting this means something is wrong.
fn default_sort_timeout_ms() -> u64 {
    300_000
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            report_file_name: default_report_file_name(),
            intermediate_file_name: default_intermediate_file_name(),
            sort_timeout_ms: default_sort_timeout_ms(),
        }
    }
}

impl ReportConfig {
    pub fn report_path(&self, date: &str) -> PathBuf {
        self.output_dir
            .join(stamp_file_name(&self.report_file_name, date))
    }

    pub fn intermediate_path(&self, date: &str) -> PathBuf {
        self.output_dir
            .join(stamp_file_name(&self.intermediate_file_name, date))
    }

    fn sort_timeout(&self) -> Option<Duration> {
        (self.sort_timeout_ms > 0).then(|| Duration::from_millis(self.sort_timeout_ms))
    }
}

/// 📅 Replace every `{date}` in a file name template.
pub fn stamp_file_name(template: &str, date: &str) -> String {
    template.replace("{date}", date)
}

/// 📅 Today, local time, as `YYYY-MM-DD`.
pub fn run_date() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// 📄 One line of the final report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub domain: String,
    pub keywords: String,
    pub revenue: f64,
}

impl ReportRow {
    fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}",
            sanitize_field(&self.domain),
            sanitize_field(&self.keywords),
            self.revenue
        )
    }

    fn from_line(line: &str) -> Option<Self> {
        let mut fields = line.splitn(3, '\t');
        let domain = fields.next()?;
        let keywords = fields.next()?;
        let revenue = fields.next()?.trim().parse::<f64>().ok()?;
        Some(Self {
            domain: domain.to_string(),
            keywords: keywords.to_string(),
            revenue,
        })
    }
}

/// 📦 What the report stage leaves behind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportArtifact {
    pub report_path: PathBuf,
    pub row_count: usize,
    #[serde(skip)]
    pub sort_elapsed: Duration,
}

/// 🧽 Tabs and newlines would break the row layout. They become spaces.
pub fn sanitize_field(field: &str) -> Cow<'_, str> {
    if field.contains(['\t', '\n', '\r']) {
        Cow::Owned(field.replace(['\t', '\n', '\r'], " "))
    } else {
        Cow::Borrowed(field)
    }
}

/// 📉 Highest revenue first. Stable, so equal revenues keep their relative order.
pub fn sort_rows(rows: &mut [ReportRow]) {
    rows.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
}

/// 🚧 The handshake between the run and a sort job on the blocking pool.
///
/// The job only renames its output into place through [`SortGate::commit`]. Once
/// the run calls the sort off, no commit can land.
#[derive(Debug, Default)]
struct SortGate {
    called_off: Mutex<bool>,
}

impl SortGate {
    fn call_off(&self) {
        *self.called_off.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// ✅ Run `publish` unless the sort was called off. The lock is held throughout.
    fn commit(&self, publish: impl FnOnce() -> std::io::Result<()>) -> Result<()> {
        let called_off = self.called_off.lock().unwrap_or_else(PoisonError::into_inner);
        if *called_off {
            return Err(anyhow!("💀 The sort was called off before its report could be put in place."));
        }
        publish().context("💀 The sorted report could not be moved into place.")
    }
}

/// 📦 Move a finished `<report>.partial` into place through the gate.
/// A refused or failed move takes the partial file with it.
fn publish_partial(partial: &Path, report_path: &Path, gate: &SortGate) -> Result<()> {
    let committed = gate.commit(|| fs::rename(partial, report_path));
    if committed.is_err() {
        let _ = fs::remove_file(partial);
    }
    committed
}

/// 📄 `<report>.partial`, where the sort job writes before the rename.
fn partial_path(report_path: &Path) -> PathBuf {
    let mut the_name = OsString::from(report_path.as_os_str());
    the_name.push(".partial");
    PathBuf::from(the_name)
}

/// 🏁 Write, sort, publish-ready. Consumes the engine's aggregates.
pub async fn finalize(
    aggregates: HashMap<AggregateKey, f64>,
    config: &ReportConfig,
    date: &str,
    diagnostics: &mut Diagnostics,
) -> Result<ReportArtifact> {
    finalize_with(aggregates, config, date, diagnostics, sort_into_report).await
}

async fn finalize_with<J>(
    aggregates: HashMap<AggregateKey, f64>,
    config: &ReportConfig,
    date: &str,
    diagnostics: &mut Diagnostics,
    sort_job: J,
) -> Result<ReportArtifact>
where
    J: FnOnce(&Path, &Path, &SortGate) -> Result<usize> + Send + 'static,
{
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .context(format!(
            "💀 Could not create the output directory '{}'. The report needs somewhere to live.",
            config.output_dir.display()
        ))
        .context(StageFailure::OutputWrite)?;

    let intermediate_path = config.intermediate_path(date);
    let report_path = config.report_path(date);

    write_intermediate(&aggregates, &intermediate_path)
        .await
        .context(StageFailure::OutputWrite)?;
    drop(aggregates);

    let sort_started = Instant::now();
    let the_gate = Arc::new(SortGate::default());
    let sorted = sort_stage(
        sort_job,
        intermediate_path.clone(),
        report_path.clone(),
        config.sort_timeout(),
        Arc::clone(&the_gate),
    )
    .await;
    let row_count = match sorted {
        Ok(row_count) => row_count,
        Err(err) => {
            the_gate.call_off();
            let the_partial = partial_path(&report_path);
            discard(&[
                intermediate_path.as_path(),
                the_partial.as_path(),
                report_path.as_path(),
            ])
            .await;
            return Err(err.context(StageFailure::Sort));
        }
    };
    let sort_elapsed = sort_started.elapsed();
    diagnostics.debug(format_args!("Sorting Time: {}", format_stage_time(sort_elapsed)));

    tokio::fs::remove_file(&intermediate_path)
        .await
        .context(format!(
            "💀 The intermediate file '{}' refused to leave. It has overstayed its welcome.",
            intermediate_path.display()
        ))
        .context(StageFailure::OutputWrite)?;

    info!(
        "📑 report '{}' written with {} rows",
        report_path.display(),
        row_count
    );
    Ok(ReportArtifact {
        report_path,
        row_count,
        sort_elapsed,
    })
}

async fn write_intermediate(aggregates: &HashMap<AggregateKey, f64>, path: &Path) -> Result<()> {
    let the_file = tokio::fs::File::create(path).await.context(format!(
        "💀 Could not create the intermediate file '{}'.",
        path.display()
    ))?;
    let mut writer = tokio::io::BufWriter::with_capacity(WRITE_BUFFER_BYTES, the_file);

    for (key, revenue) in aggregates {
        let the_row = ReportRow {
            domain: key.domain.clone(),
            keywords: key.keywords.clone(),
            revenue: *revenue,
        };
        let mut the_line = the_row.to_line();
        the_line.push('\n');
        writer
            .write_all(the_line.as_bytes())
            .await
            .context(format!(
                "💀 Writing to the intermediate file '{}' failed mid-row.",
                path.display()
            ))?;
    }

    writer.flush().await.context(format!(
        "💀 Flushing the intermediate file '{}' failed. The last rows are stuck in the buffer.",
        path.display()
    ))?;
    debug!("📝 {} aggregates written to '{}'", aggregates.len(), path.display());
    Ok(())
}

async fn sort_stage<J>(
    sort_job: J,
    intermediate_path: PathBuf,
    report_path: PathBuf,
    timeout: Option<Duration>,
    gate: Arc<SortGate>,
) -> Result<usize>
where
    J: FnOnce(&Path, &Path, &SortGate) -> Result<usize> + Send + 'static,
{
    let the_job =
        tokio::task::spawn_blocking(move || sort_job(&intermediate_path, &report_path, &gate));

    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, the_job).await.map_err(|_| {
            anyhow!(
                "💀 Sorting did not finish within {} ms. We stopped waiting.",
                limit.as_millis()
            )
        })?,
        None => the_job.await,
    };

    joined.context("💀 The sort job panicked or was cancelled before it could finish.")?
}

/// 🧹 Best-effort removal of whatever a failed sort stage left lying around.
async fn discard(paths: &[&Path]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("🧹 removed '{}' after a failed sort", path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("💀 could not remove '{}' after a failed sort: {}", path.display(), err),
        }
    }
}

fn sort_into_report(intermediate_path: &Path, report_path: &Path, gate: &SortGate) -> Result<usize> {
    let the_input = fs::File::open(intermediate_path).context(format!(
        "💀 Could not reopen the intermediate file '{}' for sorting.",
        intermediate_path.display()
    ))?;

    let mut rows = Vec::new();
    for (index, line) in BufReader::new(the_input).lines().enumerate() {
        let line = line.context(format!(
            "💀 Reading the intermediate file '{}' failed.",
            intermediate_path.display()
        ))?;
        if line.is_empty() {
            continue;
        }
        let the_row = ReportRow::from_line(&line).ok_or_else(|| {
            anyhow!(
                "💀 Intermediate row {} is not `domain\\tkeywords\\trevenue`: {:?}",
                index + 1,
                line
            )
        })?;
        rows.push(the_row);
    }

    sort_rows(&mut rows);

    let the_partial = partial_path(report_path);
    let the_output = fs::File::create(&the_partial).context(format!(
        "💀 Could not create the report file '{}'.",
        the_partial.display()
    ))?;
    write_report(BufWriter::with_capacity(WRITE_BUFFER_BYTES, the_output), &rows).context(
        format!("💀 Writing the report file '{}' failed.", the_partial.display()),
    )?;

    publish_partial(&the_partial, report_path, gate)?;
    Ok(rows.len())
}

fn write_report(mut writer: impl Write, rows: &[ReportRow]) -> std::io::Result<()> {
    writeln!(writer, "{REPORT_HEADER}")?;
    for row in rows {
        writeln!(writer, "{}", row.to_line())?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticsConfig;

    fn config_in(dir: &Path) -> ReportConfig {
        ReportConfig {
            output_dir: dir.to_path_buf(),
            ..ReportConfig::default()
        }
    }

    fn aggregates_of(entries: &[(&str, &str, f64)]) -> HashMap<AggregateKey, f64> {
        entries
            .iter()
            .map(|(domain, keywords, revenue)| (AggregateKey::new(*domain, *keywords), *revenue))
            .collect()
    }

    #[tokio::test]
    async fn the_one_where_the_big_spenders_go_first() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let config = config_in(the_dir.path());
        let mut diagnostics =
            Diagnostics::new(the_dir.path().join("log.txt"), &DiagnosticsConfig::default());

        let the_artifact = finalize(
            aggregates_of(&[
                ("Bing", "Zune", 250.0),
                ("Google", "Ipod", 480.0),
                ("Yahoo", "Cd Player", 49.99),
            ]),
            &config,
            "2026-10-14",
            &mut diagnostics,
        )
        .await?;

        assert_eq!(
            the_artifact.report_path,
            the_dir.path().join("2026-10-14_SearchKeywordPerformance.tab")
        );
        assert_eq!(the_artifact.row_count, 3);
        assert_eq!(
            std::fs::read_to_string(&the_artifact.report_path)?,
            "Search Engine Domain\tSearch Keyword\tRevenue\n\
             Google\tIpod\t480\n\
             Bing\tZune\t250\n\
             Yahoo\tCd Player\t49.99\n"
        );
        assert!(
            !config.intermediate_path("2026-10-14").exists(),
            "the intermediate file must be cleaned up"
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_nobody_bought_anything_and_the_header_stands_alone() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let config = config_in(the_dir.path());
        let mut diagnostics =
            Diagnostics::new(the_dir.path().join("log.txt"), &DiagnosticsConfig::default());

        let the_artifact = finalize(HashMap::new(), &config, "2026-10-14", &mut diagnostics).await?;

        assert_eq!(the_artifact.row_count, 0);
        assert_eq!(
            std::fs::read_to_string(&the_artifact.report_path)?,
            format!("{REPORT_HEADER}\n")
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_ties_both_make_the_cut() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let config = config_in(the_dir.path());
        let mut diagnostics =
            Diagnostics::new(the_dir.path().join("log.txt"), &DiagnosticsConfig::default());

        let the_artifact = finalize(
            aggregates_of(&[("Google", "A", 10.0), ("Bing", "B", 10.0), ("Yahoo", "C", 99.0)]),
            &config,
            "d",
            &mut diagnostics,
        )
        .await?;

        let the_report = std::fs::read_to_string(&the_artifact.report_path)?;
        let the_rows: Vec<&str> = the_report.lines().skip(1).collect();
        assert_eq!(the_rows.len(), 3);
        assert_eq!(the_rows[0], "Yahoo\tC\t99");
        assert!(the_rows[1..].contains(&"Google\tA\t10"));
        assert!(the_rows[1..].contains(&"Bing\tB\t10"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_sort_time_lands_in_the_log() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let config = config_in(the_dir.path());
        let the_log = the_dir.path().join("log.txt");
        let mut diagnostics = Diagnostics::new(&the_log, &DiagnosticsConfig::default());

        finalize(aggregates_of(&[("Google", "Ipod", 1.0)]), &config, "d", &mut diagnostics).await?;
        diagnostics.close()?;

        assert!(std::fs::read_to_string(&the_log)?.starts_with("[Debug]\tSorting Time: 0:"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_unwritable_output_dir_is_an_output_write_failure() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_blocker = the_dir.path().join("not_a_dir");
        std::fs::write(&the_blocker, "i am a file")?;
        let config = config_in(&the_blocker.join("nested"));
        let mut diagnostics =
            Diagnostics::new(the_dir.path().join("log.txt"), &DiagnosticsConfig::default());

        let the_error = finalize(aggregates_of(&[("Google", "Ipod", 1.0)]), &config, "d", &mut diagnostics)
            .await
            .expect_err("💀 a file in the way of the output dir should fail");

        assert_eq!(StageFailure::of(&the_error), Some(StageFailure::OutputWrite));
        Ok(())
    }

    #[test]
    fn the_one_where_tabs_and_newlines_cannot_break_a_row() {
        assert_eq!(sanitize_field("Ipod\tNano\nBlue"), "Ipod Nano Blue");
        assert!(matches!(sanitize_field("Ipod Nano"), Cow::Borrowed(_)));
    }

    #[test]
    fn the_one_where_sorting_is_numeric_not_alphabetic() {
        let mut the_rows: Vec<ReportRow> = [9.0, 100.0, 25.5]
            .into_iter()
            .map(|revenue| ReportRow {
                domain: "Google".to_string(),
                keywords: revenue.to_string(),
                revenue,
            })
            .collect();
        sort_rows(&mut the_rows);

        let the_order: Vec<f64> = the_rows.iter().map(|row| row.revenue).collect();
        assert_eq!(the_order, vec![100.0, 25.5, 9.0]);
    }

    #[test]
    fn the_one_where_the_date_gets_stamped_into_every_placeholder() {
        assert_eq!(
            stamp_file_name("{date}_SearchKeywordPerformance.tab", "2009-10-08"),
            "2009-10-08_SearchKeywordPerformance.tab"
        );
        assert_eq!(stamp_file_name("report.tab", "2009-10-08"), "report.tab");
        assert_eq!(run_date().len(), 10);
    }

    #[tokio::test]
    async fn the_one_where_a_slow_sort_is_called_off_and_leaves_nothing_behind() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let config = ReportConfig {
            sort_timeout_ms: 20,
            ..config_in(the_dir.path())
        };
        let mut diagnostics =
            Diagnostics::new(the_dir.path().join("log.txt"), &DiagnosticsConfig::default());

        let the_error = finalize_with(
            aggregates_of(&[("Google", "Ipod", 290.0)]),
            &config,
            "d",
            &mut diagnostics,
            |_intermediate: &Path, report: &Path, gate: &SortGate| {
                let the_partial = partial_path(report);
                std::fs::write(&the_partial, "Search Engine Domain\tSearch Keyword\tRevenue\n")?;
                std::thread::sleep(Duration::from_millis(300));
                publish_partial(&the_partial, report, gate)?;
                Ok(1)
            },
        )
        .await
        .expect_err("💀 a sort slower than its budget must fail the stage");

        assert_eq!(StageFailure::of(&the_error), Some(StageFailure::Sort));
        assert_eq!(crate::error::exit_code_for(&the_error), 4);
        assert!(!config.intermediate_path("d").exists(), "the intermediate file goes too");

        // -- ⏳ give the abandoned job time to wake up and try its rename
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!config.report_path("d").exists(), "a called-off sort must not publish a report");
        assert!(!partial_path(&config.report_path("d")).exists());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_sort_that_falls_over_cleans_up_after_itself() -> Result<()> {
        let the_dir = tempfile::tempdir()?;
        let config = config_in(the_dir.path());
        let mut diagnostics =
            Diagnostics::new(the_dir.path().join("log.txt"), &DiagnosticsConfig::default());

        let the_error = finalize_with(
            aggregates_of(&[("Google", "Ipod", 290.0)]),
            &config,
            "d",
            &mut diagnostics,
            |_intermediate: &Path, report: &Path, _gate: &SortGate| {
                std::fs::write(partial_path(report), "half a report")?;
                Err(anyhow!("disk gremlins"))
            },
        )
        .await
        .expect_err("💀 a failing sort job must fail the stage");

        assert_eq!(StageFailure::of(&the_error), Some(StageFailure::Sort));
        assert!(!config.intermediate_path("d").exists());
        assert!(!partial_path(&config.report_path("d")).exists());
        assert!(!config.report_path("d").exists());
        Ok(())
    }

    #[test]
    fn the_one_where_a_called_off_gate_refuses_every_commit() {
        let the_gate = SortGate::default();
        let mut the_commits = 0;
        assert!(the_gate
            .commit(|| {
                the_commits += 1;
                Ok(())
            })
            .is_ok());

        the_gate.call_off();
        assert!(the_gate
            .commit(|| {
                the_commits += 1;
                Ok(())
            })
            .is_err());
        assert_eq!(the_commits, 1, "nothing runs once the sort is called off");
    }

    #[test]
    fn the_one_where_the_timeout_is_counted_in_milliseconds() {
        let the_config = ReportConfig {
            sort_timeout_ms: 250,
            ..ReportConfig::default()
        };
        assert_eq!(the_config.sort_timeout(), Some(Duration::from_millis(250)));
        let the_unbounded = ReportConfig {
            sort_timeout_ms: 0,
            ..ReportConfig::default()
        };
        assert_eq!(the_unbounded.sort_timeout(), None);
        assert_eq!(ReportConfig::default().sort_timeout(), Some(Duration::from_secs(300)));
    }
}
