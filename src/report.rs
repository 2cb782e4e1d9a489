//! # Report Assembly
//!
//! Turns parsed runs into the two report shapes used downstream:
//!
//! - a **chart series**: one [`AggregatedStat`] per configuration, for bar
//!   charts with error bars;
//! - a **run table**: one row per configuration and one column per run
//!   index, rendered as CSV or as a LaTeX `tabularx`.
//!
//! Runs are keyed by their raw name and canonicalized on the way in, so an
//! unknown run name fails the whole report. Rows are ordered by canonical
//! name unless [`SortOrder::Mean`] is requested.

use crate::aggregate::{AnomalyAggregator, Metric};
use crate::error::{AnalysisError, Result};
use crate::naming;
use crate::stats::{self, AggregatedStat, ErrorEstimate};
use crate::summary::TestRunRecord;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::{debug, warn};

/// Parsed runs keyed by raw run name
pub type RunCollection = BTreeMap<String, Vec<TestRunRecord>>;

/// Row order of reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Alphabetical by canonical configuration name
    #[default]
    Name,
    /// Ascending by aggregated mean, ties broken by name
    Mean,
}

/// What to report on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub packets_per_second: u64,
    pub metric: Metric,
    pub estimate: ErrorEstimate,
    pub order: SortOrder,
    /// Values dropped from each end for the table's average column
    pub trim: usize,
    pub include_average: bool,
}

impl ReportConfig {
    pub fn new(packets_per_second: u64, metric: Metric) -> Self {
        Self {
            packets_per_second,
            metric,
            estimate: ErrorEstimate::default(),
            order: SortOrder::default(),
            trim: crate::defaults::TRIMMED_MEAN_DROP,
            include_average: true,
        }
    }
}

/// One bar of a chart series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub name: String,
    pub mean: f64,
    pub confidence_radius: f64,
    /// Lower error bar; clipped at zero for metrics that cannot be negative
    pub lower_error: f64,
    pub upper_error: f64,
    /// Runs that contributed a defined value
    pub runs: usize,
}

impl ChartPoint {
    fn new(stat: AggregatedStat, runs: usize, bounded_at_zero: bool) -> Self {
        let bar = stat.error_bar(bounded_at_zero);
        Self {
            name: stat.name,
            mean: stat.mean,
            confidence_radius: stat.confidence_radius,
            lower_error: bar.lower,
            upper_error: bar.upper,
            runs,
        }
    }
}

/// One configuration's per-run values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub name: String,
    /// Value per run index; `None` where the run is missing or undefined
    pub values: Vec<Option<f64>>,
    /// Trimmed mean of the defined values
    pub average: Option<f64>,
}

/// Per-run values of every configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTable {
    pub columns: usize,
    pub include_average: bool,
    pub rows: Vec<TableRow>,
}

fn cell(value: Option<f64>, decimals: usize) -> String {
    value.map(|v| format!("{:.*}", decimals, v)).unwrap_or_default()
}

impl RunTable {
    /// `Name,0,1,...,<N-1>[,Average]` followed by one line per row
    pub fn to_csv(&self, decimals: usize) -> String {
        let mut header = vec!["Name".to_string()];
        header.extend((0..self.columns).map(|i| i.to_string()));
        if self.include_average {
            header.push("Average".to_string());
        }

        let mut out = header.join(",");
        for row in &self.rows {
            let mut fields = vec![row.name.clone()];
            fields.extend(row.values.iter().map(|v| cell(*v, decimals)));
            if self.include_average {
                fields.push(cell(row.average, decimals));
            }
            out.push('\n');
            out.push_str(&fields.join(","));
        }
        out.push('\n');
        out
    }

    /// A `tabularx` table in a `tiny` environment
    pub fn to_latex(&self, decimals: usize) -> String {
        let data_columns = self.columns + usize::from(self.include_average);
        let mut out = String::new();
        out.push_str("\\begin{tiny}\n");
        let _ = writeln!(
            out,
            "\\begin{{tabularx}}{{\\linewidth}}{{ |X{}| }}",
            "|l".repeat(data_columns)
        );
        out.push_str("\\hline\n");

        let mut header: Vec<String> = (0..self.columns).map(|i| i.to_string()).collect();
        if self.include_average {
            header.push("Average".to_string());
        }
        let _ = writeln!(out, " & {}\\\\", header.join(" & "));

        for row in &self.rows {
            out.push_str("\\hline\n");
            out.push_str(&row.name);
            let mut values: Vec<Option<f64>> = row.values.clone();
            if self.include_average {
                values.push(row.average);
            }
            for value in values {
                match value {
                    Some(v) => {
                        let _ = write!(out, " & ${:.*}$", decimals, v);
                    }
                    None => out.push_str(" & "),
                }
            }
            out.push_str("\\\\\n");
        }
        out.push_str("\\hline\n");
        out.push_str("\\end{tabularx}\n");
        out.push_str("\\end{tiny}\n");
        out
    }
}

/// Builds chart series and run tables from parsed runs
pub struct ReportAssembler {
    config: ReportConfig,
}

impl ReportAssembler {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Runs of one configuration at the configured packet rate
    fn matching<'a>(&self, records: &'a [TestRunRecord]) -> Vec<&'a TestRunRecord> {
        records
            .iter()
            .filter(|r| r.packets_per_second == self.config.packets_per_second)
            .collect()
    }

    /// Canonical name and matching runs of every configuration
    fn groups<'a>(&self, runs: &'a RunCollection) -> Result<Vec<(String, Vec<&'a TestRunRecord>)>> {
        runs.iter()
            .map(|(raw, records)| {
                let name = naming::canonical_name(raw)?;
                let matching = self.matching(records);
                debug!(
                    "{} ({}): {} of {} runs at {} pps",
                    name,
                    raw,
                    matching.len(),
                    records.len(),
                    self.config.packets_per_second
                );
                Ok((name, matching))
            })
            .collect()
    }

    /// Aggregate one group with the statistic appropriate for the metric
    pub fn aggregate_group(&self, name: &str, records: &[&TestRunRecord]) -> Result<AggregatedStat> {
        let metric = self.config.metric;
        if metric.is_anomaly_gated() {
            AnomalyAggregator::new(self.config.estimate).aggregate_metric(
                name,
                records.iter().copied(),
                metric,
            )
        } else {
            let values: Vec<f64> = records.iter().filter_map(|r| metric.extract(r)).collect();
            AggregatedStat::from_values(name, &values, self.config.estimate)
        }
    }

    /// One aggregated bar per configuration, in the configured order
    pub fn chart_series(&self, runs: &RunCollection) -> Result<Vec<ChartPoint>> {
        let mut points = self
            .groups(runs)?
            .into_iter()
            .map(|(name, records)| {
                let defined = records
                    .iter()
                    .filter(|r| self.config.metric.extract(r).is_some())
                    .count();
                let stat = self.aggregate_group(&name, &records)?;
                Ok(ChartPoint::new(
                    stat,
                    defined,
                    self.config.metric.is_non_negative(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        match self.config.order {
            SortOrder::Name => points.sort_by(|a, b| a.name.cmp(&b.name)),
            SortOrder::Mean => points.sort_by(|a, b| {
                a.mean
                    .total_cmp(&b.mean)
                    .then_with(|| a.name.cmp(&b.name))
            }),
        }
        Ok(points)
    }

    /// Per-run values of every configuration, one column per run index
    pub fn run_table(&self, runs: &RunCollection) -> Result<RunTable> {
        let groups = self.groups(runs)?;
        let mut columns = 0;
        for (name, records) in &groups {
            for record in records {
                let width = record
                    .run_index
                    .checked_add(1)
                    .filter(|&w| w <= crate::defaults::MAX_RUNS)
                    .ok_or_else(|| {
                        AnalysisError::InvalidConfiguration(format!(
                            "{}: run index {} exceeds the table limit of {} runs",
                            name,
                            record.run_index,
                            crate::defaults::MAX_RUNS
                        ))
                    })?;
                columns = columns.max(width);
            }
        }

        let mut rows: Vec<TableRow> = groups
            .into_iter()
            .map(|(name, records)| {
                let mut values = vec![None; columns];
                for record in records {
                    if values[record.run_index].is_some() {
                        warn!("{}: run {} appears more than once", name, record.run_index);
                    }
                    values[record.run_index] = self.config.metric.extract(record);
                }
                let defined: Vec<f64> = values.iter().flatten().copied().collect();
                TableRow {
                    average: stats::trimmed_mean(&defined, self.config.trim),
                    name,
                    values,
                }
            })
            .collect();

        match self.config.order {
            SortOrder::Name => rows.sort_by(|a, b| a.name.cmp(&b.name)),
            SortOrder::Mean => rows.sort_by(|a, b| {
                let key = |row: &TableRow| row.average.unwrap_or(f64::INFINITY);
                key(a).total_cmp(&key(b)).then_with(|| a.name.cmp(&b.name))
            }),
        }

        Ok(RunTable {
            columns,
            include_average: self.config.include_average,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::Triplet;

    fn record(run: &str, pps: u64, index: usize, avg_latency: f64) -> TestRunRecord {
        TestRunRecord {
            title: run.to_string(),
            configured_duration_secs: 600,
            packets_per_second: pps,
            run_index: index,
            measured_duration_secs: 600.0,
            packet_count: pps * 600,
            latency: Triplet {
                min: avg_latency - 1.0,
                avg: avg_latency,
                max: avg_latency + 1.0,
            },
            standard_deviation: 1.0,
            anomaly_threshold_window: 2,
            anomaly_threshold_micros: 500.0,
            anomaly_count: 0,
            anomaly: None,
        }
    }

    fn collection() -> RunCollection {
        let mut runs = RunCollection::new();
        runs.insert(
            "stock-router".to_string(),
            vec![
                record("stock-router", 1900, 0, 10.0),
                record("stock-router", 1900, 1, 14.0),
                record("stock-router", 19000, 0, 99.0),
            ],
        );
        runs.insert(
            "rt-stock".to_string(),
            vec![
                record("rt-stock", 1900, 1, 8.0),
                record("rt-stock", 1900, 2, 9.0),
            ],
        );
        runs
    }

    #[test]
    fn test_chart_series_filters_by_rate() {
        let config = ReportConfig::new(1900, Metric::LatencyAvg);
        let points = ReportAssembler::new(config).chart_series(&collection()).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].name, "rt-default-default-idle");
        assert_eq!(points[0].mean, 8.5);
        assert_eq!(points[1].name, "stock-default-default-idle");
        assert_eq!(points[1].mean, 12.0);
        assert_eq!(points[1].runs, 2);
        // df = 1, sample sd = 2 * sqrt(2), se = 2
        assert!((points[1].confidence_radius - 2.0 * 12.706).abs() < 1e-9);
        assert_eq!(points[1].lower_error, 12.0);
        assert_eq!(points[1].upper_error, points[1].confidence_radius);
    }

    #[test]
    fn test_sort_by_mean() {
        let mut config = ReportConfig::new(1900, Metric::LatencyAvg);
        config.order = SortOrder::Mean;
        let mut runs = collection();
        runs.get_mut("rt-stock").unwrap()[0].latency.avg = 40.0;
        let points = ReportAssembler::new(config).chart_series(&runs).unwrap();
        assert_eq!(points[0].name, "stock-default-default-idle");
        assert_eq!(points[1].name, "rt-default-default-idle");
    }

    #[test]
    fn test_unknown_run_fails_the_report() {
        let mut runs = collection();
        runs.insert("mystery-run".to_string(), vec![record("mystery-run", 1900, 0, 1.0)]);
        let err = ReportAssembler::new(ReportConfig::new(1900, Metric::LatencyAvg))
            .chart_series(&runs)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownConfiguration(name) if name == "mystery-run"));
    }

    #[test]
    fn test_group_without_matching_runs_gets_placeholder() {
        let config = ReportConfig::new(190000, Metric::AnomalyDuration);
        let points = ReportAssembler::new(config).chart_series(&collection()).unwrap();
        assert_eq!(points.len(), 2);
        for point in points {
            assert_eq!(point.mean, 0.0);
            assert_eq!(point.confidence_radius, 0.0);
            assert_eq!(point.runs, 0);
        }
    }

    #[test]
    fn test_run_table_places_values_by_run_index() {
        let config = ReportConfig::new(1900, Metric::LatencyAvg);
        let table = ReportAssembler::new(config).run_table(&collection()).unwrap();
        assert_eq!(table.columns, 3);
        assert_eq!(table.rows[0].name, "rt-default-default-idle");
        assert_eq!(table.rows[0].values, vec![None, Some(8.0), Some(9.0)]);
        assert_eq!(table.rows[1].values, vec![Some(10.0), Some(14.0), None]);
        // Too few runs to drop two from each end
        assert_eq!(table.rows[1].average, None);
    }

    #[test]
    fn test_trimmed_average_column() {
        let mut runs = RunCollection::new();
        let latencies = [50.0, 11.0, 12.0, 1.0, 13.0, 2.0, 90.0];
        runs.insert(
            "rt-load".to_string(),
            latencies
                .iter()
                .enumerate()
                .map(|(i, &l)| record("rt-load", 1900, i, l))
                .collect(),
        );
        let table = ReportAssembler::new(ReportConfig::new(1900, Metric::LatencyAvg))
            .run_table(&runs)
            .unwrap();
        assert_eq!(table.rows[0].average, Some(12.0));
    }

    #[test]
    fn test_packet_loss_bars_are_not_clipped() {
        let mut runs = RunCollection::new();
        let records = [1000, 1010]
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let mut r = record("stock-router", 100, i, 10.0);
                r.measured_duration_secs = 8.0;
                r.packet_count = count;
                r
            })
            .collect();
        runs.insert("stock-router".to_string(), records);

        let points = ReportAssembler::new(ReportConfig::new(100, Metric::PacketLoss))
            .chart_series(&runs)
            .unwrap();
        let point = &points[0];
        assert!((point.mean - -0.25625).abs() < 1e-12);
        assert!(point.confidence_radius > 0.0);
        assert_eq!(point.lower_error, point.confidence_radius);
        assert_eq!(point.upper_error, point.confidence_radius);
    }

    #[test]
    fn test_oversized_run_index_is_rejected() {
        let mut runs = RunCollection::new();
        runs.insert(
            "stock-router".to_string(),
            vec![
                record("stock-router", 1900, 0, 10.0),
                record("stock-router", 1900, usize::MAX, 11.0),
            ],
        );
        let err = ReportAssembler::new(ReportConfig::new(1900, Metric::LatencyAvg))
            .run_table(&runs)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfiguration(_)));

        runs.get_mut("stock-router").unwrap()[1].run_index = crate::defaults::MAX_RUNS;
        assert!(ReportAssembler::new(ReportConfig::new(1900, Metric::LatencyAvg))
            .run_table(&runs)
            .is_err());
    }

    #[test]
    fn test_csv_layout() {
        let table = RunTable {
            columns: 2,
            include_average: true,
            rows: vec![TableRow {
                name: "rt-default-default-load".to_string(),
                values: vec![Some(1.0), None],
                average: Some(1.23456),
            }],
        };
        assert_eq!(
            table.to_csv(3),
            "Name,0,1,Average\nrt-default-default-load,1.000,,1.235\n"
        );

        let bare = RunTable {
            include_average: false,
            ..table
        };
        assert_eq!(bare.to_csv(3), "Name,0,1\nrt-default-default-load,1.000,\n");
    }

    #[test]
    fn test_latex_layout() {
        let table = RunTable {
            columns: 2,
            include_average: false,
            rows: vec![TableRow {
                name: "stock-default-half-idle".to_string(),
                values: vec![Some(0.5), Some(2.0)],
                average: None,
            }],
        };
        let expected = "\\begin{tiny}\n\
            \\begin{tabularx}{\\linewidth}{ |X|l|l| }\n\
            \\hline\n\
            \x20& 0 & 1\\\\\n\
            \\hline\n\
            stock-default-half-idle & $0.500$ & $2.000$\\\\\n\
            \\hline\n\
            \\end{tabularx}\n\
            \\end{tiny}\n";
        assert_eq!(table.to_latex(3), expected);
    }
}
