//! # Anomaly Detection
//!
//! Scans one trace for latency excursions and produces the summary report
//! that [`crate::summary::SummaryParser`] reads back.
//!
//! An excursion is a run of consecutive packets at or above the threshold.
//! It counts as an anomaly once a packet below the threshold closes it and it
//! is at least `min_packets` long. Shorter excursions are discarded, and an
//! excursion still open when the trace ends is never reported.
//!
//! The threshold is either fixed in microseconds or derived from the trace's
//! own average latency, which costs a second pass over the file.

use crate::error::{AnalysisError, Result};
use crate::stats::Tally;
use crate::trace::{RawTraceSample, TraceFile};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing::{debug, info};

/// Latency at or above which a packet belongs to an excursion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Threshold {
    /// Fixed threshold in microseconds
    Micros(f64),
    /// Percentage above the average latency of the analyzed window
    Deviation(f64),
}

/// Detector settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub threshold: Threshold,
    /// Consecutive packets needed for an excursion to count
    pub min_packets: usize,
    /// Seconds ignored at both ends of the trace
    pub cut_secs: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: Threshold::Micros(crate::defaults::ANOMALY_THRESHOLD_US),
            min_packets: crate::defaults::ANOMALY_MIN_PACKETS,
            cut_secs: 0.0,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.cut_secs >= 0.0 && self.cut_secs.is_finite()) {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "cut must be a non-negative number of seconds, got {}",
                self.cut_secs
            )));
        }
        if self.min_packets == 0 {
            return Err(AnalysisError::InvalidConfiguration(
                "an anomaly needs at least one packet".to_string(),
            ));
        }
        let value = match self.threshold {
            Threshold::Micros(v) | Threshold::Deviation(v) => v,
        };
        if !value.is_finite() {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "threshold must be finite, got {}",
                value
            )));
        }
        Ok(())
    }
}

/// One excursion that met the length requirement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Transmit time of its first packet, relative to the start of the trace
    pub timestamp: f64,
    /// Latencies (µs) of its packets
    pub latency: Tally,
}

/// Outcome of scanning one trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Span of the analyzed window in seconds
    pub duration_secs: f64,
    pub threshold_us: f64,
    pub min_packets: usize,
    /// Latencies (µs) of every analyzed packet
    pub latency: Tally,
    pub anomalies: Vec<Anomaly>,
    /// Packets of an excursion left open at the end of the trace
    pub open_excursion: usize,
}

impl ValidationReport {
    /// Length in packets of each anomaly
    pub fn anomaly_durations(&self) -> Tally {
        self.anomalies.iter().map(|a| a.latency.count as f64).collect()
    }

    /// Average latency of each anomaly
    pub fn anomaly_averages(&self) -> Tally {
        self.anomalies.iter().map(|a| a.latency.avg()).collect()
    }

    /// Peak latency of each anomaly
    pub fn anomaly_maxima(&self) -> Tally {
        self.anomalies.iter().map(|a| a.latency.max).collect()
    }

    /// The summary block, optionally preceded by a title line
    pub fn render(&self, title: Option<&str>, decimals: usize) -> String {
        let d = decimals;
        let mut out = String::new();
        if let Some(title) = title {
            let _ = writeln!(out, "{}", title);
        }
        out.push_str("===== Summary =====\n");
        let _ = writeln!(out, "Total duration: {:.*} s", d, self.duration_secs);
        let _ = writeln!(out, "Total packets: {}", self.latency.count);
        let _ = writeln!(
            out,
            "Latency (min/avg/max): {:.*}/{:.*}/{:.*} µs",
            d,
            self.latency.min,
            d,
            self.latency.avg(),
            d,
            self.latency.max
        );
        let _ = writeln!(out, "Standard deviation: {:.*} µs", d, self.latency.stddev());
        let _ = writeln!(
            out,
            "Anomaly treshold: {:.*} µs, n >= {}",
            d, self.threshold_us, self.min_packets
        );
        let _ = writeln!(out, "Total anomalies: {}", self.anomalies.len());

        if !self.anomalies.is_empty() {
            let durations = self.anomaly_durations();
            let _ = writeln!(out, "Average anomaly duration: {:.*} packets", d, durations.avg());
            for (label, tally) in [
                ("average", self.anomaly_averages()),
                ("maximum", self.anomaly_maxima()),
            ] {
                let _ = writeln!(
                    out,
                    "Anomaly {} latency (min/avg/max): {:.*}/{:.*}/{:.*} µs",
                    label,
                    d,
                    tally.min,
                    d,
                    tally.avg(),
                    d,
                    tally.max
                );
            }
        }
        out
    }

    /// One line per anomaly
    pub fn render_anomalies(&self, decimals: usize) -> String {
        if self.anomalies.is_empty() {
            return "No anomalies found!\n".to_string();
        }
        let d = decimals;
        let mut out = String::new();
        for anomaly in &self.anomalies {
            let _ = writeln!(
                out,
                "{:.*}: {:>6} packets, {:.*}/{:.*}/{:.*} µs min/avg/max",
                d,
                anomaly.timestamp,
                anomaly.latency.count,
                d,
                anomaly.latency.min,
                d,
                anomaly.latency.avg(),
                d,
                anomaly.latency.max
            );
        }
        out
    }
}

/// Sample range and time origin of one analysis
#[derive(Debug, Clone, Copy)]
struct Window {
    origin: f64,
    duration_secs: f64,
    skip: usize,
    take: usize,
}

/// Finds latency excursions in traces
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn window(&self, first: &RawTraceSample, last: &RawTraceSample, len: usize) -> Result<Window> {
        let total = last.transmit_time - first.transmit_time;
        let cut = self.config.cut_secs;
        let skip = if cut > 0.0 {
            (len as f64 * cut / total) as usize
        } else {
            0
        };
        if skip.saturating_mul(2) >= len {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "cutting {} s from both ends of a {:.3} s trace leaves no samples",
                cut, total
            )));
        }
        debug!("Analyzing samples {}..{} of {}", skip, len - skip, len);
        Ok(Window {
            origin: first.transmit_time,
            duration_secs: total - 2.0 * cut,
            skip,
            take: len - 2 * skip,
        })
    }

    fn threshold_from_average(&self, average_us: f64) -> f64 {
        match self.config.threshold {
            Threshold::Micros(t) => t,
            Threshold::Deviation(d) => average_us * (1.0 + d / 100.0),
        }
    }

    /// Scan a trace held in memory
    pub fn detect_samples(&self, samples: &[RawTraceSample]) -> Result<ValidationReport> {
        let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
            return Err(AnalysisError::EmptyTrace);
        };
        let window = self.window(first, last, samples.len())?;
        let analyzed = &samples[window.skip..window.skip + window.take];

        let threshold_us = match self.config.threshold {
            Threshold::Micros(t) => t,
            Threshold::Deviation(_) => {
                let tally: Tally = analyzed.iter().map(RawTraceSample::latency_us).collect();
                self.threshold_from_average(tally.avg())
            }
        };
        Ok(self.scan(analyzed.iter().copied(), &window, threshold_us))
    }

    /// Scan a trace file without loading it into memory
    ///
    /// Reads the file twice when the threshold is relative to the average.
    pub fn detect_file(&self, trace: &mut TraceFile) -> Result<ValidationReport> {
        trace.rewind()?;
        let len = trace.expected_samples();
        let Some(first) = trace.next() else {
            trace.check()?;
            return Err(AnalysisError::EmptyTrace);
        };
        let last = trace.last_sample()?.unwrap_or(first);
        trace.rewind()?;
        let window = self.window(&first, &last, len)?;
        info!("Reading {} packet data points from {:?}", len, trace.path());

        let threshold_us = match self.config.threshold {
            Threshold::Micros(t) => t,
            Threshold::Deviation(_) => {
                let tally: Tally = trace
                    .by_ref()
                    .skip(window.skip)
                    .take(window.take)
                    .map(|s| s.latency_us())
                    .collect();
                trace.check()?;
                trace.rewind()?;
                self.threshold_from_average(tally.avg())
            }
        };

        let report = self.scan(
            trace.by_ref().skip(window.skip).take(window.take),
            &window,
            threshold_us,
        );
        trace.check()?;
        Ok(report)
    }

    fn scan<I>(&self, samples: I, window: &Window, threshold_us: f64) -> ValidationReport
    where
        I: IntoIterator<Item = RawTraceSample>,
    {
        let mut latency = Tally::new();
        let mut anomalies = Vec::new();
        // (relative transmit time, latency µs) of the open excursion
        let mut excursion: Vec<(f64, f64)> = Vec::new();

        for sample in samples {
            let latency_us = sample.latency_us();
            latency.add(latency_us);
            if latency_us >= threshold_us {
                excursion.push((sample.transmit_time - window.origin, latency_us));
                continue;
            }
            if excursion.is_empty() {
                continue;
            }
            if excursion.len() >= self.config.min_packets {
                anomalies.push(Anomaly {
                    timestamp: excursion[0].0,
                    latency: excursion.iter().map(|&(_, l)| l).collect(),
                });
            }
            excursion.clear();
        }

        if !excursion.is_empty() {
            debug!(
                "Ignoring excursion of {} packets still open at the end of the trace",
                excursion.len()
            );
        }
        debug!(
            "{} anomalies in {} packets at threshold {:.3} µs",
            anomalies.len(),
            latency.count,
            threshold_us
        );

        ValidationReport {
            duration_secs: window.duration_secs,
            threshold_us,
            min_packets: self.config.min_packets,
            latency,
            anomalies,
            open_excursion: excursion.len(),
        }
    }
}
