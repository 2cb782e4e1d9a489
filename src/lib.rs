//! # Latency Post-Processor Library
//!
//! Offline analysis of network load tests. A test run leaves two kinds of
//! files behind: a binary trace with the transmit and arrival time of every
//! probe packet, and a text summary with one block per repeated run. This
//! library turns both into statistics and report tables.
//!
//! ## Architecture Overview
//!
//! - `trace`: decoding of binary trace files
//! - `detect`: latency anomaly detection over a trace, producing summary blocks
//! - `metrics`: HDR histogram latency distribution of a trace
//! - `summary`: parsing of summary blocks into [`TestRunRecord`]s
//! - `naming`: mapping of raw run names onto test configurations
//! - `stats`: means, standard deviations and Student-t confidence intervals
//! - `aggregate`: per-run metric extraction and anomaly-gated aggregation
//! - `report`: chart series and per-run CSV / LaTeX tables
//! - `input`: parallel loading of a results directory
//! - `results`: JSON documents and output files
//! - `cli`, `logging`, `utils`: the command-line front end
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use latency_postprocessor::{load_runs, Metric, ReportAssembler, ReportConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let runs = load_runs("results")?;
//!     let assembler = ReportAssembler::new(ReportConfig::new(1900, Metric::LatencyAvg));
//!     for point in assembler.chart_series(&runs)? {
//!         println!("{}: {:.3} ± {:.3}", point.name, point.mean, point.confidence_radius);
//!     }
//!     println!("{}", assembler.run_table(&runs)?.to_csv(3));
//!     Ok(())
//! }
//! ```

pub mod aggregate;

/// Command-line interface and configuration
///
/// Subcommand arguments parsed with clap, converted into the library's
/// configuration structures.
pub mod cli;

pub mod detect;
pub mod error;

/// Parallel loading of `<root>/<run>/summary.txt` trees
pub mod input;

pub mod logging;

/// Latency distribution of a trace using HDR histograms
pub mod metrics;

pub mod naming;
pub mod report;

/// Output documents and writers
///
/// JSON documents carry metadata (tool version, timestamp, system
/// information) alongside the computed values for reproducibility.
pub mod results;

pub mod stats;
pub mod summary;
pub mod trace;
pub mod utils;

pub use aggregate::{AnomalyAggregator, Metric};
pub use detect::{AnomalyDetector, DetectorConfig, Threshold, ValidationReport};
pub use error::{AnalysisError, Result};
pub use input::{load_runs, RunLoader};
pub use metrics::{LatencyCollector, LatencyMetrics};
pub use naming::{canonical_name, canonicalize, CanonicalRunKey};
pub use report::{ChartPoint, ReportAssembler, ReportConfig, RunCollection, RunTable, SortOrder};
pub use results::{ChartDocument, ResultsManager};
pub use stats::{AggregatedStat, ErrorEstimate, Tally};
pub use summary::{parse_summary, SummaryParser, TestRunRecord};
pub use trace::{RawTraceSample, TraceFile, TraceReader, TraceSummary};

/// The current version of the post-processor
///
/// Populated from Cargo.toml and written into JSON output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Seconds subtracted from every reported run duration
    ///
    /// The traffic generator reports two seconds more than the traffic
    /// actually lasted.
    pub const DURATION_CORRECTION_SECS: f64 = 2.0;

    /// Latency (µs) at or above which a packet is part of an excursion
    pub const ANOMALY_THRESHOLD_US: f64 = 500.0;

    /// Consecutive packets needed for an excursion to count as an anomaly
    pub const ANOMALY_MIN_PACKETS: usize = 2;

    /// Decimals printed for float values
    pub const DECIMALS: usize = 3;

    /// Values dropped from each end before averaging a table row
    pub const TRIMMED_MEAN_DROP: usize = 2;

    /// Percentiles reported for trace latency distributions
    pub const PERCENTILES: [f64; 4] = [50.0, 95.0, 99.0, 99.9];

    /// Upper bound on runs per configuration, and so on run table columns
    pub const MAX_RUNS: usize = 10_000;

    /// Summary file name inside each run directory
    pub const SUMMARY_FILE: &str = "summary.txt";
}
