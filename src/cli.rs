use crate::aggregate::Metric;
use crate::detect::{DetectorConfig, Threshold};
use crate::report::{ReportConfig, SortOrder};
use crate::stats::ErrorEstimate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Latency Post-Processor - statistics over network load test traces and run summaries
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Verbose output
    #[clap(short = 'v', long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Latency distribution and percentiles of one trace file
    Summarize(SummarizeArgs),
    /// Scan one trace file for latency anomalies and print its summary block
    Validate(ValidateArgs),
    /// Aggregate the summaries of every run into a chart series or run table
    Report(ReportArgs),
}

#[derive(clap::Args, Debug)]
pub struct SummarizeArgs {
    /// Binary trace file
    pub input: PathBuf,

    /// Also report the one-second window in the middle of the trace
    #[clap(long, default_value_t = false)]
    pub middle_second: bool,

    /// Also report how latency changes from one packet to the next
    #[clap(long, default_value_t = false)]
    pub jitter: bool,

    /// Percentiles to calculate for latency metrics
    #[clap(long, value_parser = parse_percentile, default_values_t = crate::defaults::PERCENTILES.to_vec())]
    pub percentiles: Vec<f64>,

    /// Write JSON instead of a text summary
    #[clap(long, default_value_t = false)]
    pub json: bool,

    /// Output file (stdout if omitted)
    #[clap(short = 'o', long)]
    pub output_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Binary trace file
    pub input: PathBuf,

    /// Latency (µs) at which a packet counts as anomalous. Ignored if --deviation is given
    #[clap(short = 't', long, default_value_t = crate::defaults::ANOMALY_THRESHOLD_US)]
    pub threshold: f64,

    /// Consecutive packets required for an anomaly
    #[clap(short = 'n', long, default_value_t = crate::defaults::ANOMALY_MIN_PACKETS)]
    pub n_packets: usize,

    /// Threshold as a percentage above the average latency. Reads the trace twice
    #[clap(short = 'd', long, allow_negative_numbers = true)]
    pub deviation: Option<f64>,

    /// Seconds to cut off at both ends of the trace
    #[clap(short = 'c', long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub cut: f64,

    /// Decimals to print for float values
    #[clap(long, default_value_t = crate::defaults::DECIMALS)]
    pub decimals: usize,

    /// Only print the summary block, not every anomaly
    #[clap(long, default_value_t = false)]
    pub summary_only: bool,

    /// Title line written above the summary block (defaults to the trace file name)
    #[clap(long)]
    pub title: Option<String>,

    /// Output file (stdout if omitted)
    #[clap(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// Append the block to the output file instead of replacing it
    #[clap(long, default_value_t = false, requires = "output_file")]
    pub append: bool,
}

#[derive(clap::Args, Debug)]
pub struct ReportArgs {
    /// Directory holding one sub-directory per run
    pub root: PathBuf,

    /// Packet rate to report on
    #[clap(short = 'p', long)]
    pub pps: u64,

    /// Per-run value to aggregate
    #[clap(short = 'm', long, value_enum, default_value_t = Metric::LatencyAvg)]
    pub metric: Metric,

    /// How error bars are derived
    #[clap(short = 'e', long, value_enum, default_value_t = ErrorEstimate::default())]
    pub estimate: ErrorEstimate,

    /// Output format
    #[clap(short = 'f', long, value_enum, default_value_t = OutputFormat::default())]
    pub format: OutputFormat,

    /// Row order
    #[clap(long, value_enum, default_value_t = SortOrder::default())]
    pub order: SortOrder,

    /// Output file (stdout if omitted)
    #[clap(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// Leave out the trimmed Average column of CSV and LaTeX tables
    #[clap(long, default_value_t = false)]
    pub no_average: bool,

    /// Values dropped from each end before averaging a table row
    #[clap(long, default_value_t = crate::defaults::TRIMMED_MEAN_DROP)]
    pub trim: usize,

    /// Seconds subtracted from every reported run duration
    #[clap(long, default_value_t = crate::defaults::DURATION_CORRECTION_SECS, allow_negative_numbers = true)]
    pub duration_correction: f64,

    /// Name of the summary file inside each run directory
    #[clap(long, default_value = crate::defaults::SUMMARY_FILE)]
    pub summary_file: String,

    /// Decimals to print for float values
    #[clap(long, default_value_t = crate::defaults::DECIMALS)]
    pub decimals: usize,

    /// Threads used to parse summary files
    #[clap(short = 'j', long, default_value_t = num_cpus::get())]
    pub jobs: usize,
}

/// Rendering of a report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Aggregated series as a text table
    #[default]
    Chart,
    /// Aggregated series as a JSON document
    Json,
    /// Per-run values as CSV
    Csv,
    /// Per-run values as a LaTeX table
    Latex,
}

impl OutputFormat {
    /// Whether the format shows per-run values rather than aggregates
    pub fn is_table(self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Latex)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Chart => write!(f, "chart"),
            OutputFormat::Json => write!(f, "JSON"),
            OutputFormat::Csv => write!(f, "CSV"),
            OutputFormat::Latex => write!(f, "LaTeX"),
        }
    }
}

impl From<&ValidateArgs> for DetectorConfig {
    fn from(args: &ValidateArgs) -> Self {
        Self {
            threshold: match args.deviation {
                Some(d) => Threshold::Deviation(d),
                None => Threshold::Micros(args.threshold),
            },
            min_packets: args.n_packets,
            cut_secs: args.cut,
        }
    }
}

impl From<&ReportArgs> for ReportConfig {
    fn from(args: &ReportArgs) -> Self {
        Self {
            packets_per_second: args.pps,
            metric: args.metric,
            estimate: args.estimate,
            order: args.order,
            trim: args.trim,
            include_average: !args.no_average,
        }
    }
}

/// Parse a percentile in the range 0 to 100
fn parse_percentile(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid percentile: {}", s))?;
    if !(0.0..=100.0).contains(&value) {
        return Err(format!("Percentile {} is outside 0..=100", value));
    }
    Ok(value)
}
