//! 💰 Attribution: the part where a purchase finds out who to thank.
//!
//! 🎬 *[INT. CLICKSTREAM - LINE 118. An IP arrives from Google, searching
//! "ipod nano". It browses. It leaves. Forty lines later the same IP comes back
//! with event code `1` and a product list worth $190.]*
//! *["Google," whispers the engine, "you did this."]*
//!
//! Two maps carry the whole story across the stream:
//! - **referrals by IP**: the latest search referral seen for each client IP.
//!   Last write wins, never merged, never removed on purchase.
//! - **revenue by key**: `(search engine, keywords)` → realized revenue. Only
//!   ever goes up.
//!
//! Correlation is look-back only. A purchase can only be credited to a referral
//! seen on an earlier (or the same) line. One pass, memory bounded by distinct
//! IPs plus distinct keys, no matter how many gigabytes stream past.
//!
//! Nothing in here aborts the run. Bad lines and bad product entries get written
//! up in the diagnostics log and skipped at the smallest possible granularity. 🦆

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostics;
use crate::record::{EXPECTED_COLUMNS, LineRecord, RecordError, decode_line};
pub use crate::url_classifier::ReferralInfo;
use crate::url_classifier::{ClassifierConfig, classify};

/// 🔧 The attribution rules. Literal values from the clickstream export, made configurable.
#[derive(Debug, Deserialize, Clone)]
pub struct AttributionConfig {
    /// 🚫 Referrer URLs containing this are never treated as a referral (the shop's own pages).
    /// Empty disables the exclusion.
    #[serde(default = "default_excluded_marker")]
    pub excluded_marker: String,
    /// 🛒 The event code that marks a completed purchase.
    #[serde(default = "default_purchase_event")]
    pub purchase_event: String,
    /// 📏 Exact tab-separated column count per line.
    #[serde(default = "default_expected_columns")]
    pub expected_columns: usize,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

fn default_excluded_marker() -> String {
    "esshopzilla".to_string()
}

// -- 🛒 "1" is the purchase event in the export's event list. it has no other documented meaning.
fn default_purchase_event() -> String {
    "1".to_string()
}

fn default_expected_columns() -> usize {
    EXPECTED_COLUMNS
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            excluded_marker: default_excluded_marker(),
            purchase_event: default_purchase_event(),
            expected_columns: default_expected_columns(),
            classifier: ClassifierConfig::default(),
        }
    }
}

/// 🗝️ The grouping key for revenue: which engine, which phrase.
///
/// Displays as `domain|keywords`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateKey {
    pub domain: String,
    pub keywords: String,
}

impl AggregateKey {
    pub fn new(domain: impl Into<String>, keywords: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            keywords: keywords.into(),
        }
    }
}

impl From<&ReferralInfo> for AggregateKey {
    fn from(referral: &ReferralInfo) -> Self {
        Self::new(&referral.search_engine_domain, &referral.keywords)
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.domain, self.keywords)
    }
}

/// 📊 What happened to the lines that went through the engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub lines_consumed: u64,
    pub malformed_lines: u64,
    pub referrals_recorded: u64,
    pub excluded_referrers: u64,
    pub purchases_seen: u64,
    pub purchases_without_referral: u64,
    pub purchases_attributed: u64,
    pub purchases_without_products: u64,
    pub purchases_without_revenue: u64,
    pub malformed_products: u64,
}

/// 💰 The stateful heart. One writer, no locks, two maps.
#[derive(Debug)]
pub struct AttributionEngine {
    config: AttributionConfig,
    referrals_by_ip: HashMap<String, Arc<ReferralInfo>>,
    // -- 🧶 one shared copy per distinct referral, however many IPs point at it
    interned_referrals: HashSet<Arc<ReferralInfo>>,
    revenue_by_key: HashMap<AggregateKey, f64>,
    stats: EngineStats,
}

impl AttributionEngine {
    pub fn new(config: AttributionConfig) -> Self {
        Self {
            config,
            referrals_by_ip: HashMap::new(),
            interned_referrals: HashSet::new(),
            revenue_by_key: HashMap::new(),
            stats: EngineStats::default(),
        }
    }

    /// 📥 Raw bytes in: decode, parse, then [`consume`](Self::consume).
    ///
    /// Lines that fail to decode or have the wrong shape are logged and skipped.
    pub fn consume_line(&mut self, line_number: u64, raw: &[u8], diagnostics: &mut Diagnostics) {
        let parsed = decode_line(raw)
            .and_then(|line| LineRecord::parse(line, self.config.expected_columns));
        match parsed {
            Ok(record) => self.consume(line_number, &record, diagnostics),
            Err(err) => self.reject_line(line_number, &err, diagnostics),
        }
    }

    /// 🚮 Write up a line that never became a record.
    pub fn reject_line(&mut self, line_number: u64, err: &RecordError, diagnostics: &mut Diagnostics) {
        self.stats.lines_consumed += 1;
        self.stats.malformed_lines += 1;
        diagnostics.error(format_args!("Line: {line_number}\t {err}"));
    }

    /// 🔄 Apply the attribution rule to one record.
    pub fn consume(&mut self, line_number: u64, record: &LineRecord<'_>, diagnostics: &mut Diagnostics) {
        self.stats.lines_consumed += 1;

        self.remember_referral(record);

        if !record.has_event(&self.config.purchase_event) {
            return;
        }
        self.stats.purchases_seen += 1;

        let Some(referral) = self.referrals_by_ip.get(record.client_ip).cloned() else {
            self.stats.purchases_without_referral += 1;
            return;
        };

        let Some(total_revenue) = self.total_revenue(line_number, record.product_list, diagnostics) else {
            return;
        };

        *self
            .revenue_by_key
            .entry(AggregateKey::from(referral.as_ref()))
            .or_insert(0.0) += total_revenue;
        self.stats.purchases_attributed += 1;
        diagnostics.debug(format_args!("Purchase found for ip {}", record.client_ip));
    }

    /// 🧭 Step one of every line: is this a search referral worth remembering?
    fn remember_referral(&mut self, record: &LineRecord<'_>) {
        let marker = self.config.excluded_marker.as_str();
        if !marker.is_empty() && record.referrer_url.contains(marker) {
            self.stats.excluded_referrers += 1;
            return;
        }

        let Some(referral) = classify(record.referrer_url, &self.config.classifier) else {
            return;
        };

        let shared = match self.interned_referrals.get(&referral) {
            Some(existing) => Arc::clone(existing),
            None => {
                let fresh = Arc::new(referral);
                self.interned_referrals.insert(Arc::clone(&fresh));
                fresh
            }
        };

        // -- 🔁 overwrite, never merge. skip the key allocation when the IP is already known.
        match self.referrals_by_ip.get_mut(record.client_ip) {
            Some(slot) => *slot = shared,
            None => {
                self.referrals_by_ip.insert(record.client_ip.to_owned(), shared);
            }
        }
        self.stats.referrals_recorded += 1;
    }

    /// 🧮 Sum the non-negative revenues in a product list. `None` means "contributes nothing".
    fn total_revenue(
        &mut self,
        line_number: u64,
        product_list: &str,
        diagnostics: &mut Diagnostics,
    ) -> Option<f64> {
        if product_list.trim().is_empty() {
            self.stats.purchases_without_products += 1;
            diagnostics.error(format_args!(
                "Line: {line_number}\t Record shows a verified purchase, but no products are listed."
            ));
            return None;
        }

        let mut total = 0.0;
        for product in product_list.split(',') {
            let Some(revenue_field) = product.split(';').nth(3) else {
                self.stats.malformed_products += 1;
                diagnostics.error(format_args!(
                    "Line: {line_number}\t Invalid Product Attribute in Product List: {product}"
                ));
                continue;
            };

            match revenue_field.trim().parse::<f64>() {
                Ok(revenue) if revenue.is_finite() => {
                    // -- 🤷 negative revenue is valid data that simply doesn't count
                    if revenue >= 0.0 {
                        total += revenue;
                    }
                }
                _ => {
                    self.stats.malformed_products += 1;
                    diagnostics.error(format_args!(
                        "Line: {line_number}\t Invalid Revenue in Product List: {product}"
                    ));
                }
            }
        }

        if total > 0.0 {
            Some(total)
        } else {
            self.stats.purchases_without_revenue += 1;
            diagnostics.error(format_args!(
                "Line: {line_number}\t Record shows a verified purchase, but total revenue could not be determined."
            ));
            None
        }
    }

    /// 🧭 The referral currently on file for `ip`, if any.
    pub fn referral_for(&self, ip: &str) -> Option<&ReferralInfo> {
        self.referrals_by_ip.get(ip).map(Arc::as_ref)
    }

    pub fn distinct_ips(&self) -> usize {
        self.referrals_by_ip.len()
    }

    pub fn aggregates(&self) -> &HashMap<AggregateKey, f64> {
        &self.revenue_by_key
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// 🚰 Drain the revenue map for the report writer.
    pub fn into_aggregates(self) -> HashMap<AggregateKey, f64> {
        self.revenue_by_key
    }
}
