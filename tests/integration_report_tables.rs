use anyhow::Result;
use latency_postprocessor::{
    cli::OutputFormat, AnalysisError, ChartDocument, ErrorEstimate, Metric, ReportAssembler,
    ReportConfig, ResultsManager, RunLoader, SummaryParser,
};
use std::path::Path;
use tempfile::TempDir;

fn block(rate: u64, index: usize, avg_latency: f64, anomalies: usize) -> String {
    let mut text = format!(
        "stock-router-d600-l{rate}-{index}.data\n\
         ===== Summary =====\n\
         Total duration: 602.000 s\n\
         Total packets: {}\n\
         Latency (min/avg/max): 5.000/{avg_latency:.3}/90.000 µs\n\
         Standard deviation: 2.000 µs\n\
         Anomaly treshold: 500.000 µs, n >= 2\n\
         Total anomalies: {anomalies}\n",
        rate * 600
    );
    if anomalies > 0 {
        text.push_str(
            "Average anomaly duration: 4.000 packets\n\
             Anomaly average latency (min/avg/max): 600.000/650.000/700.000 µs\n\
             Anomaly maximum latency (min/avg/max): 800.000/900.000/1000.000 µs\n",
        );
    }
    text
}

fn write_summary(root: &Path, run: &str, blocks: &[String]) -> Result<()> {
    let dir = root.join(run);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("summary.txt"), blocks.join("\n"))?;
    Ok(())
}

fn results_tree() -> Result<TempDir> {
    let root = TempDir::new()?;
    write_summary(
        root.path(),
        "stock-router",
        &[
            block(1900, 0, 10.0, 0),
            block(1900, 1, 14.0, 1),
            block(19000, 0, 99.0, 0),
        ],
    )?;
    write_summary(
        root.path(),
        "rt-threaded-half-queue",
        &[block(1900, 0, 7.0, 2), block(1900, 1, 8.0, 0)],
    )?;
    Ok(root)
}

/// Only runs at the requested packet rate contribute.
#[test]
fn groups_by_packet_rate() -> Result<()> {
    let root = results_tree()?;
    let runs = RunLoader::new(SummaryParser::default(), 2).load(root.path())?;

    let assembler = ReportAssembler::new(ReportConfig::new(1900, Metric::LatencyAvg));
    let series = assembler.chart_series(&runs)?;
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].name, "rt-threaded-half-idle");
    assert_eq!(series[0].mean, 7.5);
    assert_eq!(series[1].name, "stock-default-default-idle");
    assert_eq!(series[1].mean, 12.0);
    assert_eq!(series[1].runs, 2);

    let fast = ReportAssembler::new(ReportConfig::new(19000, Metric::LatencyAvg));
    let series = fast.chart_series(&runs)?;
    assert_eq!(series[1].mean, 99.0);
    assert_eq!(series[1].confidence_radius, 0.0);
    assert_eq!(series[0].runs, 0);
    Ok(())
}

/// The LaTeX table wraps one row per configuration in tabularx.
#[test]
fn latex_table_layout() -> Result<()> {
    let root = results_tree()?;
    let runs = RunLoader::default().load(root.path())?;

    let mut config = ReportConfig::new(1900, Metric::AnomalyLatencyMax);
    config.include_average = false;
    let latex = ReportAssembler::new(config).run_table(&runs)?.to_latex(1);

    assert!(latex.starts_with("\\begin{tiny}\n\\begin{tabularx}{\\linewidth}{ |X|l|l| }\n"));
    assert!(latex.contains("rt-threaded-half-idle & $900.0$ & \\\\\n"));
    assert!(latex.contains("stock-default-default-idle &  & $900.0$\\\\\n"));
    assert!(latex.ends_with("\\hline\n\\end{tabularx}\n\\end{tiny}\n"));
    Ok(())
}

/// The JSON chart document carries the series and how it was computed.
#[test]
fn chart_document_round_trip() -> Result<()> {
    let root = results_tree()?;
    let runs = RunLoader::default().load(root.path())?;

    let mut config = ReportConfig::new(1900, Metric::AnomalyCount);
    config.estimate = ErrorEstimate::HalfStdDev;
    let series = ReportAssembler::new(config).chart_series(&runs)?;
    let document = ChartDocument::new(&config, 5, series);

    let output = root.path().join("chart.json");
    ResultsManager::new(Some(output.as_path())).write_json(&document)?;
    let parsed: ChartDocument = serde_json::from_str(&std::fs::read_to_string(&output)?)?;

    assert_eq!(parsed.metadata.error_estimate, ErrorEstimate::HalfStdDev);
    assert_eq!(parsed.metadata.total_runs, 5);
    assert_eq!(parsed.series.len(), 2);
    // counts 2 and 0: mean 1, population sd 1
    assert_eq!(parsed.series[0].mean, 1.0);
    assert_eq!(parsed.series[0].confidence_radius, 0.5);
    assert!(!OutputFormat::Json.is_table());
    Ok(())
}

/// A run directory outside the naming table fails the whole report.
#[test]
fn unknown_run_name_is_fatal() -> Result<()> {
    let root = results_tree()?;
    write_summary(root.path(), "stock-triple-queue", &[block(1900, 0, 1.0, 0)])?;
    let runs = RunLoader::default().load(root.path())?;

    let err = ReportAssembler::new(ReportConfig::new(1900, Metric::LatencyAvg))
        .run_table(&runs)
        .unwrap_err();
    assert!(matches!(err, AnalysisError::UnknownConfiguration(ref name) if name == "stock-triple-queue"));
    Ok(())
}
