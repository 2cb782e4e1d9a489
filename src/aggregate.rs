//! # Metric Extraction and Anomaly Aggregation
//!
//! A [`Metric`] picks one number out of a [`TestRunRecord`]. Most metrics are
//! defined for every run. The anomaly detail metrics are not: a run without
//! anomalies has no anomaly duration or anomaly latency at all, and treating
//! those as zero would drag every average towards zero.
//!
//! [`AnomalyAggregator`] therefore drops runs where the value is undefined
//! before handing the rest to the statistics engine, and reports an explicit
//! `{mean: 0, confidence_radius: 0}` placeholder when nothing is left.

use crate::error::Result;
use crate::stats::{AggregatedStat, ErrorEstimate};
use crate::summary::TestRunRecord;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A per-run value that reports can be built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    /// Fraction of expected packets that did not arrive
    PacketLoss,
    /// Packets received
    PacketCount,
    /// Corrected run duration in seconds
    Duration,
    /// Minimum packet latency (µs)
    LatencyMin,
    /// Average packet latency (µs)
    LatencyAvg,
    /// Maximum packet latency (µs)
    LatencyMax,
    /// Packet latency standard deviation (µs)
    StandardDeviation,
    /// Number of detected anomalies
    AnomalyCount,
    /// Average anomaly length in packets; undefined without anomalies
    AnomalyDuration,
    /// Mean of the per-anomaly average latency (µs); undefined without anomalies
    AnomalyLatencyAvg,
    /// Mean of the per-anomaly peak latency (µs); undefined without anomalies
    AnomalyLatencyMax,
}

impl Metric {
    /// Value of this metric for one run, `None` where it is undefined
    pub fn extract(self, record: &TestRunRecord) -> Option<f64> {
        match self {
            Metric::PacketLoss => record.packet_loss(),
            Metric::PacketCount => Some(record.packet_count as f64),
            Metric::Duration => Some(record.measured_duration_secs),
            Metric::LatencyMin => Some(record.latency.min),
            Metric::LatencyAvg => Some(record.latency.avg),
            Metric::LatencyMax => Some(record.latency.max),
            Metric::StandardDeviation => Some(record.standard_deviation),
            Metric::AnomalyCount => Some(record.anomaly_count as f64),
            Metric::AnomalyDuration => record.anomaly_duration_avg(),
            Metric::AnomalyLatencyAvg => record.anomaly_latency_avg().map(|t| t.avg),
            Metric::AnomalyLatencyMax => record.anomaly_latency_max().map(|t| t.avg),
        }
    }

    /// Whether the metric only exists for runs with anomalies
    pub fn is_anomaly_gated(self) -> bool {
        matches!(
            self,
            Metric::AnomalyDuration | Metric::AnomalyLatencyAvg | Metric::AnomalyLatencyMax
        )
    }

    /// Whether values can never drop below zero
    ///
    /// Packet loss goes negative when more packets arrive than the nominal
    /// rate predicts.
    pub fn is_non_negative(self) -> bool {
        !matches!(self, Metric::PacketLoss)
    }

    /// Human readable axis label
    pub fn label(self) -> &'static str {
        match self {
            Metric::PacketLoss => "Packet loss",
            Metric::PacketCount => "Packet count",
            Metric::Duration => "Duration (s)",
            Metric::LatencyMin => "Minimum latency (µs)",
            Metric::LatencyAvg => "Average latency (µs)",
            Metric::LatencyMax => "Maximum latency (µs)",
            Metric::StandardDeviation => "Standard deviation (µs)",
            Metric::AnomalyCount => "Anomaly count",
            Metric::AnomalyDuration => "Average anomaly duration (packets)",
            Metric::AnomalyLatencyAvg => "Anomaly average latency (µs)",
            Metric::AnomalyLatencyMax => "Anomaly maximum latency (µs)",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Aggregates values that are undefined for some runs
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyAggregator {
    estimate: ErrorEstimate,
}

impl AnomalyAggregator {
    pub fn new(estimate: ErrorEstimate) -> Self {
        Self { estimate }
    }

    /// Mean and error radius over the runs where `extract` is defined
    pub fn aggregate<'a, I, F>(&self, name: &str, records: I, extract: F) -> Result<AggregatedStat>
    where
        I: IntoIterator<Item = &'a TestRunRecord>,
        F: Fn(&TestRunRecord) -> Option<f64>,
    {
        let mut total = 0;
        let values: Vec<f64> = records
            .into_iter()
            .inspect(|_| total += 1)
            .filter_map(|r| extract(r))
            .collect();

        if values.is_empty() {
            debug!("{}: none of {} runs define the value", name, total);
            return Ok(AggregatedStat::empty(name));
        }
        if values.len() < total {
            debug!("{}: using {} of {} runs", name, values.len(), total);
        }
        AggregatedStat::from_values(name, &values, self.estimate)
    }

    /// Aggregate one metric, skipping runs where it is undefined
    pub fn aggregate_metric<'a, I>(&self, name: &str, records: I, metric: Metric) -> Result<AggregatedStat>
    where
        I: IntoIterator<Item = &'a TestRunRecord>,
    {
        self.aggregate(name, records, |r| metric.extract(r))
    }
}
