//! # Latency Post-Processor - Main Entry Point
//!
//! Thin front end over the library:
//!
//! - `summarize`: latency distribution of one trace file
//! - `validate`: anomaly scan of one trace file, printing the summary block
//!   that `report` later reads
//! - `report`: aggregation of every run's summary into a chart series, JSON
//!   document, CSV table or LaTeX table
//!
//! Logging goes to stderr so that reports written to stdout can be piped.

use anyhow::{Context, Result};
use clap::Parser;
use latency_postprocessor::{
    cli::{Args, Command, OutputFormat, ReportArgs, SummarizeArgs, ValidateArgs},
    logging::init_logging,
    metrics::collect_latencies,
    results::{ChartDocument, ResultsManager, TraceDocument},
    trace::{jitter, middle_second, TraceFile, TraceSummary},
    AnalysisError, AnomalyDetector, DetectorConfig, ReportAssembler, ReportConfig, RunLoader,
    SummaryParser,
};
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;
    debug!("Configuration: {:?}", args);

    let outcome = match &args.command {
        Command::Summarize(summarize) => run_summarize(summarize),
        Command::Validate(validate) => run_validate(validate),
        Command::Report(report) => run_report(report),
    };
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

fn run_summarize(args: &SummarizeArgs) -> Result<()> {
    let mut trace = TraceFile::open(&args.input)?;
    let samples = trace.read_all()?;
    let summary = TraceSummary::from_samples(&samples)
        .ok_or(AnalysisError::EmptyTrace)
        .with_context(|| format!("Cannot summarize {:?}", args.input))?;
    info!(
        "Read {} samples covering {} s",
        summary.sample_count, summary.total_duration_secs
    );

    let latency = collect_latencies(&samples, &args.percentiles)?;
    let mut document = TraceDocument::new(&args.input, summary, latency);
    if args.middle_second {
        let window = middle_second(&samples, &document.summary);
        debug!("Middle second holds {} samples", window.len());
        document.middle_second = Some(collect_latencies(window, &args.percentiles)?);
    }
    if args.jitter {
        document.jitter = Some(jitter(&samples));
    }

    let manager = ResultsManager::new(args.output_file.as_deref());
    if args.json {
        manager.write_json(&document)
    } else {
        manager.write_text(&document.to_text())
    }
}

fn run_validate(args: &ValidateArgs) -> Result<()> {
    let detector = AnomalyDetector::new(DetectorConfig::from(args))?;
    let mut trace = TraceFile::open(&args.input)?;
    let report = detector
        .detect_file(&mut trace)
        .with_context(|| format!("Anomaly scan of {:?} failed", args.input))?;
    info!(
        "Found {} anomalies in {} packets",
        report.anomalies.len(),
        report.latency.count
    );

    let title = match &args.title {
        Some(title) => title.clone(),
        None => args
            .input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.input.display().to_string()),
    };

    if !args.summary_only {
        print!("{}", report.render_anomalies(args.decimals));
    }
    let block = report.render(Some(title.as_str()), args.decimals);
    let manager = ResultsManager::new(args.output_file.as_deref());
    if args.append {
        manager.append_text(&block)
    } else {
        manager.write_text(&block)
    }
}

fn run_report(args: &ReportArgs) -> Result<()> {
    let loader = RunLoader::new(SummaryParser::new(args.duration_correction), args.jobs)
        .with_summary_file(args.summary_file.as_str());
    let runs = loader.load(&args.root)?;
    let total_runs = runs.values().map(Vec::len).sum();

    let config = ReportConfig::from(args);
    let assembler = ReportAssembler::new(config);
    info!(
        "Building {} report of {} at {} pps",
        args.format, config.metric, config.packets_per_second
    );

    let manager = ResultsManager::new(args.output_file.as_deref());
    if args.format.is_table() {
        let table = assembler.run_table(&runs)?;
        let text = match args.format {
            OutputFormat::Latex => table.to_latex(args.decimals),
            _ => table.to_csv(args.decimals),
        };
        return manager.write_text(&text);
    }

    let series = assembler.chart_series(&runs)?;
    let document = ChartDocument::new(&config, total_runs, series);
    match args.format {
        OutputFormat::Json => manager.write_json(&document),
        _ => manager.write_text(&document.to_table(args.decimals)),
    }
}
