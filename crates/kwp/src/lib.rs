//! 🔎 kwp: search keyword performance, one clickstream at a time.
//!
//! 🎬 *[a shop sells an iPod. the finance team asks "which search got us that?"]*
//! *[nobody knows. a ten gigabyte log file knows. this crate reads it.]*
//!
//! Streams a tab-delimited hit-level clickstream export, remembers which search
//! engine and phrase each client IP arrived from, credits later purchases by the
//! same IP to that referral, and writes a report of revenue per (engine, phrase),
//! biggest first. Bad lines are logged, counted, and skipped.
//!
//! 🧠 Knowledge graph:
//! - [`url_classifier`] → [`record`] → [`attribution`] → [`report`], leaf first.
//! - [`diagnostics`] is the per-run log artifact; [`backends`] are the I/O edges.
//! - `supervisors` (private) sequences the stages; [`run`] is the only way in.

pub mod app_config;
pub mod attribution;
pub mod backends;
pub mod diagnostics;
pub mod error;
pub(crate) mod progress;
pub mod record;
pub mod report;
mod supervisors;
pub mod url_classifier;

use anyhow::Result;

use crate::app_config::AppConfig;
pub use crate::error::{StageFailure, exit_code_for};
use crate::supervisors::Supervisor;
pub use crate::supervisors::RunSummary;

/// 🚀 One complete run: stream, attribute, report, publish.
pub async fn run(app_config: AppConfig) -> Result<RunSummary> {
    Supervisor::new(app_config).run().await
}
