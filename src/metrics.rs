use crate::trace::RawTraceSample;
use anyhow::Result;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Latency distribution of one trace, including percentiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub median_ns: f64,
    pub std_dev_ns: f64,
    pub percentiles: Vec<PercentileValue>,
    pub total_samples: usize,
    /// Samples whose arrival time preceded the transmit time
    pub negative_samples: usize,
}

/// Percentile value pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value_ns: u64,
}

/// Latency collector using HDR histogram for accurate measurement
pub struct LatencyCollector {
    histogram: Histogram<u64>,
    sample_count: usize,
    negative_samples: usize,
}

impl LatencyCollector {
    /// Create a new latency collector
    pub fn new() -> Result<Self> {
        // 3 significant figures, auto-resizing
        let histogram = Histogram::<u64>::new(3)?;

        Ok(Self {
            histogram,
            sample_count: 0,
            negative_samples: 0,
        })
    }

    /// Record a latency in seconds
    ///
    /// Clock skew between the transmit and receive ports can produce
    /// negative latencies; those are counted and recorded as zero.
    pub fn record_secs(&mut self, latency: f64) -> Result<()> {
        let latency_ns = if latency < 0.0 {
            self.negative_samples += 1;
            0
        } else {
            (latency * 1_000_000_000.0).round() as u64
        };
        self.histogram.record(latency_ns)?;
        self.sample_count += 1;
        Ok(())
    }

    /// Record the latency of one packet
    pub fn record_sample(&mut self, sample: &RawTraceSample) -> Result<()> {
        self.record_secs(sample.latency())
    }

    /// Get the current metrics
    pub fn get_metrics(&self, percentiles: &[f64]) -> LatencyMetrics {
        let percentiles = percentiles
            .iter()
            .map(|&p| PercentileValue {
                percentile: p,
                value_ns: self.histogram.value_at_percentile(p),
            })
            .collect();

        LatencyMetrics {
            min_ns: self.histogram.min(),
            max_ns: self.histogram.max(),
            mean_ns: self.histogram.mean(),
            median_ns: self.histogram.value_at_percentile(50.0) as f64,
            std_dev_ns: self.histogram.stdev(),
            percentiles,
            total_samples: self.sample_count,
            negative_samples: self.negative_samples,
        }
    }

    pub fn len(&self) -> usize {
        self.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Reset the collector
    pub fn reset(&mut self) {
        self.histogram.reset();
        self.sample_count = 0;
        self.negative_samples = 0;
    }
}

/// Collect the latency distribution of a whole trace
pub fn collect_latencies<'a, I>(samples: I, percentiles: &[f64]) -> Result<LatencyMetrics>
where
    I: IntoIterator<Item = &'a RawTraceSample>,
{
    let mut collector = LatencyCollector::new()?;
    for sample in samples {
        collector.record_sample(sample)?;
    }
    if collector.negative_samples > 0 {
        debug!(
            "{} of {} samples had negative latency",
            collector.negative_samples, collector.sample_count
        );
    }
    Ok(collector.get_metrics(percentiles))
}

/// Utility functions for metrics display
pub mod utils {
    /// Format latency value for human-readable output
    pub fn format_latency(latency_ns: u64) -> String {
        if latency_ns < 1_000 {
            format!("{}ns", latency_ns)
        } else if latency_ns < 1_000_000 {
            format!("{:.2}μs", latency_ns as f64 / 1_000.0)
        } else if latency_ns < 1_000_000_000 {
            format!("{:.2}ms", latency_ns as f64 / 1_000_000.0)
        } else {
            format!("{:.2}s", latency_ns as f64 / 1_000_000_000.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_collector() {
        let mut collector = LatencyCollector::new().unwrap();

        collector.record_secs(0.001).unwrap();
        collector.record_secs(0.002).unwrap();
        collector.record_secs(0.003).unwrap();

        let metrics = collector.get_metrics(&[50.0, 95.0, 99.0]);
        assert_eq!(metrics.total_samples, 3);
        assert_eq!(metrics.percentiles.len(), 3);
        assert!(metrics.mean_ns > 1_900_000.0 && metrics.mean_ns < 2_100_000.0);
        assert!(metrics.min_ns <= metrics.max_ns);
    }

    #[test]
    fn test_negative_latency_is_counted() {
        let samples = vec![
            RawTraceSample::new(1.0, 1.000_010),
            RawTraceSample::new(2.0, 1.999_999),
        ];
        let metrics = collect_latencies(&samples, &[50.0]).unwrap();
        assert_eq!(metrics.total_samples, 2);
        assert_eq!(metrics.negative_samples, 1);
        assert_eq!(metrics.min_ns, 0);
    }

    #[test]
    fn test_reset() {
        let mut collector = LatencyCollector::new().unwrap();
        collector.record_secs(0.5).unwrap();
        assert_eq!(collector.len(), 1);
        collector.reset();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_format_latency() {
        assert_eq!(utils::format_latency(500), "500ns");
        assert_eq!(utils::format_latency(1500), "1.50μs");
        assert_eq!(utils::format_latency(1500000), "1.50ms");
        assert_eq!(utils::format_latency(1500000000), "1.50s");
    }
}
