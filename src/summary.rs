//! # Summary Report Parser
//!
//! A summary file holds one block per test run, separated by blank lines.
//! Each block is the report printed by the anomaly detector
//! ([`crate::detect::ValidationReport::render`]) under a title line naming the
//! trace it was computed from:
//!
//! ```text
//! stock-router-d600-l1900-0.data
//! ===== Summary =====
//! Total duration: 602.004 s
//! Total packets: 1143800
//! Latency (min/avg/max): 9.113/12.871/131.066 µs
//! Standard deviation: 1.204 µs
//! Anomaly treshold: 500.000 µs, n >= 2
//! Total anomalies: 1
//! Average anomaly duration: 4.000 packets
//! Anomaly average latency (min/avg/max): 611.2/611.2/611.2 µs
//! Anomaly maximum latency (min/avg/max): 790.5/790.5/790.5 µs
//! ```
//!
//! Fields are located by line number and whitespace token index, as listed
//! in [`layout`]. The format has no other structure to rely on, so a change
//! in the report layout must be mirrored there. The last three lines only
//! exist when the anomaly count is non-zero and are never read otherwise.
//!
//! Any field that is missing or unparseable fails the whole file.

use crate::error::{AnalysisError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Which whitespace-separated token of a line holds a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    At(usize),
    Last,
}

/// Position of one field inside a summary block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPosition {
    pub name: &'static str,
    pub line: usize,
    pub token: Token,
}

/// Field positions of the summary report, relative to the block's title line
pub mod layout {
    use super::{FieldPosition, Token};

    pub const TITLE_LINE: usize = 0;

    pub const MEASURED_DURATION: FieldPosition = FieldPosition {
        name: "total duration",
        line: 2,
        token: Token::At(2),
    };
    pub const PACKET_COUNT: FieldPosition = FieldPosition {
        name: "total packets",
        line: 3,
        token: Token::At(2),
    };
    pub const LATENCY: FieldPosition = FieldPosition {
        name: "latency",
        line: 4,
        token: Token::At(2),
    };
    pub const STANDARD_DEVIATION: FieldPosition = FieldPosition {
        name: "standard deviation",
        line: 5,
        token: Token::At(2),
    };
    pub const ANOMALY_THRESHOLD: FieldPosition = FieldPosition {
        name: "anomaly threshold",
        line: 6,
        token: Token::At(2),
    };
    pub const ANOMALY_WINDOW: FieldPosition = FieldPosition {
        name: "anomaly threshold window",
        line: 6,
        token: Token::Last,
    };
    pub const ANOMALY_COUNT: FieldPosition = FieldPosition {
        name: "total anomalies",
        line: 7,
        token: Token::At(2),
    };
    pub const ANOMALY_DURATION: FieldPosition = FieldPosition {
        name: "average anomaly duration",
        line: 8,
        token: Token::At(3),
    };
    pub const ANOMALY_LATENCY_AVG: FieldPosition = FieldPosition {
        name: "anomaly average latency",
        line: 9,
        token: Token::At(4),
    };
    pub const ANOMALY_LATENCY_MAX: FieldPosition = FieldPosition {
        name: "anomaly maximum latency",
        line: 10,
        token: Token::At(4),
    };
}

fn title_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"d(\d+)-l(\d+)-(\d+)").expect("title pattern is valid"))
}

/// A `min/avg/max` value group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triplet {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

impl FromStr for Triplet {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let mut next = || -> std::result::Result<f64, ()> {
            parts.next().ok_or(())?.parse::<f64>().map_err(|_| ())
        };
        let triplet = Triplet {
            min: next()?,
            avg: next()?,
            max: next()?,
        };
        if parts.next().is_some() {
            return Err(());
        }
        Ok(triplet)
    }
}

/// Anomaly detail lines, present only for runs with at least one anomaly
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyDetail {
    /// Mean anomaly length in packets
    pub duration_avg: f64,
    /// Distribution of the per-anomaly average latency (µs)
    pub latency_avg: Triplet,
    /// Distribution of the per-anomaly peak latency (µs)
    pub latency_max: Triplet,
}

/// One test run parsed from a summary block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunRecord {
    /// Raw run identifier the summary file belongs to
    pub title: String,
    pub configured_duration_secs: u64,
    pub packets_per_second: u64,
    pub run_index: usize,
    /// Reported duration minus the configured correction
    pub measured_duration_secs: f64,
    pub packet_count: u64,
    /// Packet latency min/avg/max (µs)
    pub latency: Triplet,
    /// Packet latency standard deviation (µs)
    pub standard_deviation: f64,
    pub anomaly_threshold_window: usize,
    pub anomaly_threshold_micros: f64,
    pub anomaly_count: usize,
    pub anomaly: Option<AnomalyDetail>,
}

impl TestRunRecord {
    /// Fraction of expected packets that never arrived
    ///
    /// Negative when more packets arrived than the nominal rate predicts.
    /// `None` when no packets were expected at all.
    pub fn packet_loss(&self) -> Option<f64> {
        let expected = self.packets_per_second as f64 * self.measured_duration_secs;
        if !(expected > 0.0 && expected.is_finite()) {
            return None;
        }
        Some(1.0 - self.packet_count as f64 / expected)
    }

    pub fn anomaly_duration_avg(&self) -> Option<f64> {
        self.anomaly.map(|a| a.duration_avg)
    }

    pub fn anomaly_latency_avg(&self) -> Option<Triplet> {
        self.anomaly.map(|a| a.latency_avg)
    }

    pub fn anomaly_latency_max(&self) -> Option<Triplet> {
        self.anomaly.map(|a| a.latency_max)
    }
}

/// Split text into blank-line separated blocks of lines
pub fn split_blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Field access on one block, with errors that name the run and block
struct Block<'a> {
    run: &'a str,
    index: usize,
    lines: &'a [&'a str],
}

impl<'a> Block<'a> {
    fn line(&self, line: usize, field: &'static str) -> Result<&'a str> {
        self.lines
            .get(line)
            .copied()
            .ok_or_else(|| AnalysisError::MissingLine {
                run: self.run.to_string(),
                block: self.index,
                line,
                field,
            })
    }

    fn malformed(&self, field: &'static str, value: &str) -> AnalysisError {
        AnalysisError::MalformedField {
            run: self.run.to_string(),
            block: self.index,
            field,
            value: value.to_string(),
        }
    }

    fn token(&self, pos: FieldPosition) -> Result<&'a str> {
        let line = self.line(pos.line, pos.name)?;
        let mut tokens = line.split_whitespace();
        let token = match pos.token {
            Token::At(i) => tokens.nth(i),
            Token::Last => tokens.last(),
        };
        token.ok_or_else(|| self.malformed(pos.name, line))
    }

    fn value<T: FromStr>(&self, pos: FieldPosition) -> Result<T> {
        let token = self.token(pos)?;
        token.parse().map_err(|_| self.malformed(pos.name, token))
    }
}

/// Parser for summary files
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryParser {
    /// Seconds subtracted from every reported duration
    pub duration_correction_secs: f64,
}

impl Default for SummaryParser {
    fn default() -> Self {
        Self {
            duration_correction_secs: crate::defaults::DURATION_CORRECTION_SECS,
        }
    }
}

impl SummaryParser {
    pub fn new(duration_correction_secs: f64) -> Self {
        Self {
            duration_correction_secs,
        }
    }

    /// Parse every block of a summary file belonging to run `run`
    pub fn parse(&self, run: &str, text: &str) -> Result<Vec<TestRunRecord>> {
        let records = split_blocks(text)
            .iter()
            .enumerate()
            .map(|(index, lines)| self.parse_block(run, index, lines))
            .collect::<Result<Vec<_>>>()?;
        debug!("Parsed {} runs for {}", records.len(), run);
        Ok(records)
    }

    /// Parse one block; `index` is only used in error messages
    pub fn parse_block(&self, run: &str, index: usize, lines: &[&str]) -> Result<TestRunRecord> {
        let block = Block { run, index, lines };

        let title = block.line(layout::TITLE_LINE, "title")?;
        let malformed_title = || AnalysisError::MalformedTitle {
            run: run.to_string(),
            block: index,
            line: title.to_string(),
        };
        let captures = title_pattern().captures(title).ok_or_else(malformed_title)?;
        let configured_duration_secs = captures[1].parse().map_err(|_| malformed_title())?;
        let packets_per_second = captures[2].parse().map_err(|_| malformed_title())?;
        let run_index = captures[3]
            .parse::<usize>()
            .ok()
            .filter(|&i| i < crate::defaults::MAX_RUNS)
            .ok_or_else(malformed_title)?;

        let reported_duration: f64 = block.value(layout::MEASURED_DURATION)?;
        let latency_token = block.token(layout::LATENCY)?;
        let latency = latency_token
            .parse()
            .map_err(|_| block.malformed(layout::LATENCY.name, latency_token))?;
        let anomaly_count: usize = block.value(layout::ANOMALY_COUNT)?;

        let anomaly = if anomaly_count > 0 {
            Some(self.parse_anomaly_detail(&block)?)
        } else {
            None
        };

        let measured_duration_secs = reported_duration - self.duration_correction_secs;
        if measured_duration_secs <= 0.0 {
            warn!(
                "{}: block {}: duration {} s leaves no time after the {} s correction, packet loss is undefined",
                run, index, reported_duration, self.duration_correction_secs
            );
        }

        Ok(TestRunRecord {
            title: run.to_string(),
            configured_duration_secs,
            packets_per_second,
            run_index,
            measured_duration_secs,
            packet_count: block.value(layout::PACKET_COUNT)?,
            latency,
            standard_deviation: block.value(layout::STANDARD_DEVIATION)?,
            anomaly_threshold_window: block.value(layout::ANOMALY_WINDOW)?,
            anomaly_threshold_micros: block.value(layout::ANOMALY_THRESHOLD)?,
            anomaly_count,
            anomaly,
        })
    }

    fn parse_anomaly_detail(&self, block: &Block<'_>) -> Result<AnomalyDetail> {
        let triplet = |pos: FieldPosition| -> Result<Triplet> {
            let token = block.token(pos)?;
            token.parse().map_err(|_| block.malformed(pos.name, token))
        };
        Ok(AnomalyDetail {
            duration_avg: block.value(layout::ANOMALY_DURATION)?,
            latency_avg: triplet(layout::ANOMALY_LATENCY_AVG)?,
            latency_max: triplet(layout::ANOMALY_LATENCY_MAX)?,
        })
    }
}

/// Parse a summary file with the default duration correction
pub fn parse_summary(run: &str, text: &str) -> Result<Vec<TestRunRecord>> {
    SummaryParser::default().parse(run, text)
}
