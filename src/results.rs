use crate::aggregate::Metric;
use crate::metrics::utils::format_latency;
use crate::metrics::LatencyMetrics;
use crate::report::{ChartPoint, ReportConfig, SortOrder};
use crate::stats::{ErrorEstimate, Tally};
use crate::trace::TraceSummary;
use crate::utils::{format_packet_rate, format_seconds, table_row, table_separator};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// System information for reproducibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub rust_version: String,
    pub tool_version: String,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
            tool_version: crate::VERSION.to_string(),
        }
    }
}

/// Describes how a chart series was computed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartMetadata {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub packets_per_second: u64,
    pub metric: Metric,
    pub metric_label: String,
    pub error_estimate: ErrorEstimate,
    pub order: SortOrder,
    /// Summary files the series was computed from
    pub total_runs: usize,
    pub system_info: SystemInfo,
}

/// A bar chart series with its metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartDocument {
    pub metadata: ChartMetadata,
    pub series: Vec<ChartPoint>,
}

impl ChartDocument {
    pub fn new(config: &ReportConfig, total_runs: usize, series: Vec<ChartPoint>) -> Self {
        Self {
            metadata: ChartMetadata {
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                packets_per_second: config.packets_per_second,
                metric: config.metric,
                metric_label: config.metric.label().to_string(),
                error_estimate: config.estimate,
                order: config.order,
                total_runs,
                system_info: SystemInfo::default(),
            },
            series,
        }
    }

    /// Plain text rendering, one line per bar
    pub fn to_table(&self, decimals: usize) -> String {
        let header = ["Configuration", "Mean", "± radius", "Lower", "Upper", "Runs"];
        let rows: Vec<[String; 6]> = self
            .series
            .iter()
            .map(|p| {
                [
                    p.name.clone(),
                    format!("{:.*}", decimals, p.mean),
                    format!("{:.*}", decimals, p.confidence_radius),
                    format!("{:.*}", decimals, p.lower_error),
                    format!("{:.*}", decimals, p.upper_error),
                    p.runs.to_string(),
                ]
            })
            .collect();

        let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = format!(
            "{} at {} pps ({})\n",
            self.metadata.metric_label,
            self.metadata.packets_per_second,
            self.metadata.error_estimate
        );
        out.push_str(&table_separator(&widths));
        out.push_str(&table_row(&header, &widths));
        out.push_str(&table_separator(&widths));
        for row in &rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            out.push_str(&table_row(&cells, &widths));
        }
        out.push_str(&table_separator(&widths));
        out
    }
}

/// Latency figures of one trace file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceDocument {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub trace: PathBuf,
    pub summary: TraceSummary,
    pub latency: LatencyMetrics,
    /// Latency figures of the middle one-second window, if requested
    pub middle_second: Option<LatencyMetrics>,
    /// Latency change (µs) between consecutive packets, if requested
    pub jitter: Option<Tally>,
    pub system_info: SystemInfo,
}

impl TraceDocument {
    pub fn new(trace: &Path, summary: TraceSummary, latency: LatencyMetrics) -> Self {
        Self {
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            trace: trace.to_path_buf(),
            summary,
            latency,
            middle_second: None,
            jitter: None,
            system_info: SystemInfo::default(),
        }
    }

    /// Plain text rendering
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Trace: {}", self.trace.display());
        let _ = writeln!(
            out,
            "{} packets over {} ({})",
            self.summary.sample_count,
            format_seconds(self.summary.total_duration_secs as f64),
            format_packet_rate(self.summary.samples_per_second as f64)
        );
        let _ = writeln!(
            out,
            "Mean latency: {}, standard deviation: {}",
            format_seconds(self.summary.mean_latency),
            format_seconds(self.summary.std_dev_latency)
        );
        write_latency(&mut out, "Whole trace", &self.latency);
        if let Some(middle) = &self.middle_second {
            write_latency(&mut out, "Middle second", middle);
        }
        if let Some(jitter) = &self.jitter {
            let _ = writeln!(
                out,
                "Jitter: min {:.3} µs, avg {:.3} µs, max {:.3} µs, standard deviation {:.3} µs",
                jitter.min,
                jitter.avg(),
                jitter.max,
                jitter.stddev()
            );
        }
        out
    }
}

fn write_latency(out: &mut String, label: &str, metrics: &LatencyMetrics) {
    let _ = writeln!(
        out,
        "{}: min {}, median {}, max {}",
        label,
        format_latency(metrics.min_ns),
        format_latency(metrics.median_ns as u64),
        format_latency(metrics.max_ns)
    );
    for p in &metrics.percentiles {
        let _ = writeln!(out, "  p{}: {}", p.percentile, format_latency(p.value_ns));
    }
    if metrics.negative_samples > 0 {
        let _ = writeln!(
            out,
            "  {} samples arrived before they were sent",
            metrics.negative_samples
        );
    }
}

/// Writes rendered output to a file, or to stdout when no file is given
#[derive(Debug, Clone, Default)]
pub struct ResultsManager {
    output_file: Option<PathBuf>,
}

impl ResultsManager {
    pub fn new(output_file: Option<&Path>) -> Self {
        Self {
            output_file: output_file.map(Path::to_path_buf),
        }
    }

    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    /// Write text as is
    pub fn write_text(&self, text: &str) -> Result<()> {
        match &self.output_file {
            Some(path) => {
                std::fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))?;
                info!("Results written to: {:?}", path);
            }
            None => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                handle
                    .write_all(text.as_bytes())
                    .context("Failed to write to stdout")?;
                handle.flush()?;
            }
        }
        Ok(())
    }

    /// Append a summary block to the output file, separated by a blank line
    pub fn append_text(&self, text: &str) -> Result<()> {
        let Some(path) = &self.output_file else {
            return self.write_text(text);
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {:?}", path))?;
        let existing = file.metadata()?.len();
        if existing > 0 {
            writeln!(file)?;
        }
        file.write_all(text.as_bytes())?;
        file.flush()?;
        info!("Results appended to: {:?}", path);
        Ok(())
    }

    /// Write a value as pretty-printed JSON
    pub fn write_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let mut json = serde_json::to_string_pretty(value)?;
        json.push('\n');
        debug!("Serialized {} bytes of JSON", json.len());
        self.write_text(&json)
    }
}
