//! 📂 Previously, on "Things That Could Go Wrong With A File"...
//!
//! The export landed at 2am. Ten gigabytes, tab separated, one header line, and a
//! quiet promise that every row has twelve columns. (It does not.)
//!
//! This module is the local-disk side of the pipeline. [`FileSource`] streams the
//! export line by line through a sized `BufReader`. [`DirectoryPublisher`] copies
//! the finished report and diagnostics log into an outbound directory for whoever
//! comes to collect them.
//!
//! 🚰 File → BufReader → one line → AttributionEngine → Report → outbound dir
//! 💀 Disk full → a stage failure with a very specific exit code
//! 🦆 (mandatory, no notes)

mod directory_publisher;
mod file_source;

pub use directory_publisher::DirectoryPublishConfig;
pub(crate) use directory_publisher::DirectoryPublisher;
pub(crate) use file_source::FileSource;
pub use file_source::FileSourceConfig;
