//! 📊 progress.rs: "Are we there yet?" asked of a 10GB clickstream, every 200ms.
//!
//! A progress bar over input bytes, plus a comfy-table of lines/s, MiB/s and ETA
//! stuffed into the bar's message. Sources own one of these and feed it every line.
//! Rendering is throttled so the hot path pays for an `Instant::now()` and two adds,
//! not a table redraw.
//!
//! 🦆 The duck watches the bar. The bar does not watch back.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

// -- 📏 one mebibyte. not a megabyte.
const MIB: u64 = 1024 * 1024;

// -- ⏱️ redraw at most five times a second. a line every microsecond would otherwise mean a table every microsecond.
const RENDER_INTERVAL: Duration = Duration::from_millis(200);

// -- 🔄 throughput is averaged over this window so one slow read doesn't look like a crash
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 📦 Bytes scaled to the size of the whole input. "1073741824 bytes" helps nobody.
fn format_bytes(bytes: u64, total_size: u64) -> String {
    if total_size >= 512 * MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if total_size >= MIB {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// 🔢 `1000000` → `1,000,000`.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS once a run goes long.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

struct Rates {
    lines_per_sec: f64,
    mib_per_sec: f64,
}

/// 📊 Byte and line counters behind the terminal progress bar.
pub(crate) struct ProgressMetrics {
    source_name: String,
    /// 📏 0 when the size is unknown up front
    total_size: u64,
    total_bytes: u64,
    total_lines: u64,
    progress_bar: ProgressBar,
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
    last_render: Option<Instant>,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar doesn't derive Debug. the counters are what anyone wants anyway.
        f.debug_struct("ProgressMetrics")
            .field("source_name", &self.source_name)
            .field("total_size", &self.total_size)
            .field("total_bytes", &self.total_bytes)
            .field("total_lines", &self.total_lines)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 New tracker for `source_name`. `visible = false` keeps the bar hidden (tests, cron).
    pub(crate) fn new(source_name: String, total_size: u64, visible: bool) -> Self {
        let progress_bar = if visible {
            ProgressBar::new(total_size)
        } else {
            ProgressBar::hidden()
        };
        // -- 🎨 the template is a constant. if it ever fails to parse we keep indicatif's default look.
        if let Ok(style) = ProgressStyle::default_bar().template("{msg}\n| [{bar:40.cyan/blue}]") {
            progress_bar.set_style(style.progress_chars("=>-"));
        }

        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            source_name,
            total_size,
            total_bytes: 0,
            total_lines: 0,
            progress_bar,
            rate_samples,
            start_time,
            last_render: None,
        }
    }

    /// 🔄 Count one read. Redraws only when the render interval has passed.
    pub(crate) fn update(&mut self, bytes_read: u64, lines_read: u64) {
        self.total_bytes += bytes_read;
        self.total_lines += lines_read;

        let now = Instant::now();
        let due = self
            .last_render
            .is_none_or(|last| now.duration_since(last) >= RENDER_INTERVAL);
        if !due {
            return;
        }
        self.last_render = Some(now);

        let rates = self.calculate_rates(now);
        self.render(rates);
        self.progress_bar.set_position(self.total_bytes);
    }

    #[cfg(test)]
    pub(crate) fn total_lines(&self) -> u64 {
        self.total_lines
    }

    #[cfg(test)]
    pub(crate) fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// ✅ Draw the final numbers and stop the bar.
    pub(crate) fn finish(&mut self) {
        let rates = self.calculate_rates(Instant::now());
        self.render(rates);
        self.progress_bar.set_position(self.total_bytes);
        self.progress_bar.finish();
    }

    fn calculate_rates(&mut self, now: Instant) -> Rates {
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > RATE_WINDOW {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples
            .push_back((now, self.total_bytes, self.total_lines));

        if let Some(&(oldest_time, oldest_bytes, oldest_lines)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                let bytes_delta = self.total_bytes.saturating_sub(oldest_bytes);
                let lines_delta = self.total_lines.saturating_sub(oldest_lines);
                return Rates {
                    lines_per_sec: lines_delta as f64 / elapsed,
                    mib_per_sec: (bytes_delta as f64 / elapsed) / MIB as f64,
                };
            }
        }

        Rates {
            lines_per_sec: 0.0,
            mib_per_sec: 0.0,
        }
    }

    fn percent_done(&self) -> f64 {
        if self.total_size > 0 {
            (self.total_bytes as f64 / self.total_size as f64) * 100.0
        } else {
            0.0
        }
    }

    /// 🎨 Layout:
    /// ```text
    /// source: <name>
    ///   <lines/s>    <total lines>
    ///   <MiB/s>      <bytes progress>
    ///   <elapsed>    <remaining>
    /// | [=====>----------]
    /// ```
    fn render(&self, rates: Rates) {
        let percent = self.percent_done();
        let elapsed = self.start_time.elapsed();
        let remaining = if percent > 0.0 {
            // 🔮 linear extrapolation. file reads are steady enough for it.
            let total_estimated = elapsed.as_secs_f64() / (percent / 100.0);
            let remaining_secs = total_estimated - elapsed.as_secs_f64();
            if remaining_secs > 0.0 {
                format_duration(Duration::from_secs_f64(remaining_secs))
            } else {
                "--:--".to_string()
            }
        } else {
            "--:--".to_string()
        };

        let bytes_progress = format!(
            "{} / {} ({:.2}%)",
            format_bytes(self.total_bytes, self.total_size),
            format_bytes(self.total_size, self.total_size),
            percent
        );

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Lines/s", format_number(rates.lines_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} Lines", format_number(self.total_lines)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(bytes_progress).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining", remaining)).set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("source: {}\n{}", self.source_name, table));
    }
}
