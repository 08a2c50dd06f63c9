//! 📄 Line records: one tab-delimited line, twelve columns, four that matter.
//!
//! The clickstream export has a strict shape. Twelve fields, tab-separated.
//! We care about the client IP (3), the event list (4), the product list (10)
//! and the referrer (11). Everything else rides along untouched.
//!
//! A line with the wrong number of columns is not a crisis. It gets written up
//! in the diagnostics log and the stream keeps moving. 🚰

use memchr::{memchr_iter, memrchr};
use thiserror::Error;

/// 📏 The column count the clickstream export promises.
pub const EXPECTED_COLUMNS: usize = 12;

const CLIENT_IP_COLUMN: usize = 3;
const EVENT_LIST_COLUMN: usize = 4;
const PRODUCT_LIST_COLUMN: usize = 10;
const REFERRER_COLUMN: usize = 11;

/// 💀 Why a line could not become a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Record does not contain {expected} columns (found {found}). Possible invalid file format.")]
    WrongColumnCount { expected: usize, found: usize },
    #[error("Record is not valid UTF-8: {0}")]
    InvalidUtf8(String),
    #[error("Record is longer than {limit} bytes (read {found}). Possible invalid file format.")]
    LineTooLong { limit: usize, found: usize },
    #[error("Record layout needs at least {needed} columns but only {configured} were configured.")]
    LayoutTooNarrow { needed: usize, configured: usize },
}

/// 📄 One parsed line. Borrows from the line buffer and dies with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord<'a> {
    pub client_ip: &'a str,
    pub event_list: &'a str,
    pub product_list: &'a str,
    pub referrer_url: &'a str,
}

impl<'a> LineRecord<'a> {
    /// 🔪 Split on tabs and demand exactly `expected_columns` fields.
    pub fn parse(line: &'a str, expected_columns: usize) -> Result<Self, RecordError> {
        if expected_columns <= REFERRER_COLUMN {
            return Err(RecordError::LayoutTooNarrow {
                needed: REFERRER_COLUMN + 1,
                configured: expected_columns,
            });
        }

        // -- 🔍 count tabs first so a bad line costs one memchr pass and zero slicing
        let found = memchr_iter(b'\t', line.as_bytes()).count() + 1;
        if found != expected_columns {
            return Err(RecordError::WrongColumnCount {
                expected: expected_columns,
                found,
            });
        }

        let mut client_ip = "";
        let mut event_list = "";
        let mut product_list = "";
        let mut referrer_url = "";
        for (index, field) in line.split('\t').enumerate() {
            match index {
                CLIENT_IP_COLUMN => client_ip = field,
                EVENT_LIST_COLUMN => event_list = field,
                PRODUCT_LIST_COLUMN => product_list = field,
                REFERRER_COLUMN => referrer_url = field,
                _ => {}
            }
        }

        Ok(Self {
            client_ip,
            event_list,
            product_list,
            referrer_url,
        })
    }

    /// 🎟️ The comma-separated event codes, trimmed, empties skipped.
    pub fn event_codes(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.event_list
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }

    /// 🛒 Does this line carry `code` in its event list? Exact token match.
    pub fn has_event(&self, code: &str) -> bool {
        self.event_codes().any(|candidate| candidate == code)
    }
}

/// 🧹 Bytes off the wire into a `&str`, minus one trailing `\n` / `\r\n`.
pub fn decode_line(raw: &[u8]) -> Result<&str, RecordError> {
    let without_newline = match memrchr(b'\n', raw) {
        Some(at) if at + 1 == raw.len() => &raw[..at],
        _ => raw,
    };
    let the_line = without_newline.strip_suffix(b"\r").unwrap_or(without_newline);
    std::str::from_utf8(the_line).map_err(|err| RecordError::InvalidUtf8(err.to_string()))
}
