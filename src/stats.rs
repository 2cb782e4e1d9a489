//! # Statistics Engine
//!
//! Descriptive statistics and confidence intervals over plain `f64` samples.
//!
//! Two standard deviations are provided because they answer different
//! questions:
//!
//! - [`population_std_dev`] (divisor N) describes a complete set of values,
//!   such as every packet latency of one run.
//! - [`sample_std_dev`] (divisor N-1) estimates the spread of repeated,
//!   independent runs and feeds the Student-t confidence interval.
//!
//! Degenerate inputs never panic. Empty slices give a mean of zero, and the
//! confidence interval of fewer than two samples is zero. The only hard
//! failure is a confidence interval past the tabulated degrees of freedom.

use crate::error::{AnalysisError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Two-tailed Student-t critical values at the 97.5th percentile, indexed by
/// degrees of freedom minus one.
const T_CRITICAL_975: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, //
    2.201, 2.179, 2.160, 2.145, 2.131, 2.120, 2.110, 2.101, 2.093, 2.086, //
    2.080, 2.074, 2.069, 2.064, 2.060, 2.056, 2.052, 2.048, 2.045, 2.042,
];

/// Arithmetic mean, or 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with divisor N, or 0.0 for an empty slice
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Bessel-corrected standard deviation (divisor N-1)
///
/// Returns `None` for fewer than two values, where the estimate is undefined.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values);
    let variance =
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Standard error of the mean, `sample_std_dev / sqrt(N)`
pub fn standard_error(values: &[f64]) -> Option<f64> {
    sample_std_dev(values).map(|sd| sd / (values.len() as f64).sqrt())
}

/// Critical value of the t distribution for a two-sided 95% interval
///
/// Only degrees of freedom 1 through 30 are tabulated; anything else is an
/// error rather than an extrapolation.
pub fn t_critical_975(degrees_of_freedom: usize) -> Result<f64> {
    if degrees_of_freedom == 0 || degrees_of_freedom > T_CRITICAL_975.len() {
        return Err(AnalysisError::DegreesOfFreedomOutOfRange {
            degrees_of_freedom,
            max: T_CRITICAL_975.len(),
        });
    }
    Ok(T_CRITICAL_975[degrees_of_freedom - 1])
}

/// Half-width of the 95% Student-t confidence interval around the mean
///
/// Returns 0.0 for fewer than two values.
pub fn confidence_interval_95(values: &[f64]) -> Result<f64> {
    let Some(sd) = sample_std_dev(values) else {
        return Ok(0.0);
    };
    let t = t_critical_975(values.len() - 1)?;
    Ok(t * sd / (values.len() as f64).sqrt())
}

/// Mean of the values left after dropping `trim` lowest and `trim` highest
///
/// Returns `None` unless at least one value survives the trim.
pub fn trimmed_mean(values: &[f64], trim: usize) -> Option<f64> {
    if values.len() <= 2 * trim {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(mean(&sorted[trim..sorted.len() - trim]))
}

/// How the error bar of an aggregated value is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorEstimate {
    /// Half-width of the 95% Student-t confidence interval
    #[default]
    StudentT,
    /// Half the population standard deviation. A plotting shortcut, not an
    /// interval; kept only for comparison with older charts.
    HalfStdDev,
}

impl ErrorEstimate {
    /// Compute the error radius of `values` with this method
    pub fn radius(self, values: &[f64]) -> Result<f64> {
        match self {
            ErrorEstimate::StudentT => confidence_interval_95(values),
            ErrorEstimate::HalfStdDev => Ok(population_std_dev(values) / 2.0),
        }
    }
}

impl std::fmt::Display for ErrorEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorEstimate::StudentT => write!(f, "95% Student-t interval"),
            ErrorEstimate::HalfStdDev => write!(f, "half standard deviation"),
        }
    }
}

/// Lower and upper error bar lengths
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorBar {
    pub lower: f64,
    pub upper: f64,
}

impl ErrorBar {
    pub fn symmetric(radius: f64) -> Self {
        Self {
            lower: radius,
            upper: radius,
        }
    }

    /// Clip the lower bar so the rendered interval never drops below zero
    pub fn non_negative(mean: f64, radius: f64) -> Self {
        Self {
            lower: mean.min(radius),
            upper: radius,
        }
    }
}

/// One aggregated value with its error radius
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStat {
    pub name: String,
    pub mean: f64,
    pub confidence_radius: f64,
}

impl AggregatedStat {
    /// Mean and error radius of `values`
    pub fn from_values(name: impl Into<String>, values: &[f64], estimate: ErrorEstimate) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            mean: mean(values),
            confidence_radius: estimate.radius(values)?,
        })
    }

    /// The zero-valued placeholder for groups without any defined value
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mean: 0.0,
            confidence_radius: 0.0,
        }
    }

    /// Error bar, clipped at zero when the value cannot be negative
    pub fn error_bar(&self, bounded_at_zero: bool) -> ErrorBar {
        if bounded_at_zero {
            ErrorBar::non_negative(self.mean, self.confidence_radius)
        } else {
            ErrorBar::symmetric(self.confidence_radius)
        }
    }
}

/// Running count, extremes, mean and population variance of a value stream
///
/// Uses Welford's update so long traces do not lose precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    mean: f64,
    m2: f64,
}

impl Default for Tally {
    fn default() -> Self {
        Self::new()
    }
}

impl Tally {
    pub fn new() -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            mean: 0.0,
            m2: 0.0,
        }
    }

    /// Add one value
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Mean of the values seen so far, 0.0 when empty
    pub fn avg(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation of the values seen so far
    pub fn stddev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.m2 / self.count as f64).sqrt()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl FromIterator<f64> for Tally {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut tally = Tally::new();
        iter.into_iter().for_each(|v| tally.add(v));
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_mean_and_population_std_dev() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(mean(&values), 3.0);
        assert!(close(population_std_dev(&values), 2.0_f64.sqrt()));
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(population_std_dev(&[]), 0.0);
    }

    #[test]
    fn test_population_std_dev_of_constant_is_zero() {
        assert_eq!(population_std_dev(&[7.5; 12]), 0.0);
    }

    #[test]
    fn test_sample_std_dev_needs_two_values() {
        assert_eq!(sample_std_dev(&[]), None);
        assert_eq!(sample_std_dev(&[4.0]), None);
        assert_eq!(standard_error(&[4.0]), None);

        let sd = sample_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!(close(sd, (32.0_f64 / 7.0).sqrt()));
    }

    #[test]
    fn test_standard_error() {
        let values = [1.0, 3.0];
        let se = standard_error(&values).unwrap();
        assert!(close(se, 1.0));
    }

    #[test]
    fn test_confidence_interval_degenerate_inputs() {
        assert_eq!(confidence_interval_95(&[]).unwrap(), 0.0);
        assert_eq!(confidence_interval_95(&[42.0]).unwrap(), 0.0);
        assert_eq!(confidence_interval_95(&[3.0, 3.0]).unwrap(), 0.0);
        assert_eq!(confidence_interval_95(&[3.0; 15]).unwrap(), 0.0);
    }

    #[test]
    fn test_confidence_interval_uses_t_table() {
        // df = 1: sd of [1, 3] is sqrt(2), se is 1
        let ci = confidence_interval_95(&[1.0, 3.0]).unwrap();
        assert!(close(ci, 12.706));

        let values = [10.0, 12.0, 11.0, 13.0, 14.0];
        let expected = 2.776 * sample_std_dev(&values).unwrap() / 5.0_f64.sqrt();
        assert!(close(confidence_interval_95(&values).unwrap(), expected));
    }

    #[test]
    fn test_t_table_bounds() {
        assert_eq!(t_critical_975(1).unwrap(), 12.706);
        assert_eq!(t_critical_975(30).unwrap(), 2.042);
        assert!(matches!(
            t_critical_975(0),
            Err(AnalysisError::DegreesOfFreedomOutOfRange { .. })
        ));
        assert!(matches!(
            t_critical_975(31),
            Err(AnalysisError::DegreesOfFreedomOutOfRange {
                degrees_of_freedom: 31,
                max: 30
            })
        ));
    }

    #[test]
    fn test_confidence_interval_past_table_fails() {
        let values: Vec<f64> = (0..32).map(f64::from).collect();
        assert!(confidence_interval_95(&values).is_err());
        let values: Vec<f64> = (0..31).map(f64::from).collect();
        assert!(confidence_interval_95(&values).is_ok());
    }

    #[test]
    fn test_trimmed_mean_drops_both_ends() {
        let values = [100.0, 1.0, 5.0, 6.0, 7.0, -50.0, 2.0];
        // sorted: -50 1 2 5 6 7 100; trimming 2 leaves 2 5 6
        assert!(close(trimmed_mean(&values, 2).unwrap(), 13.0 / 3.0));
        assert_eq!(trimmed_mean(&[1.0, 2.0, 3.0, 4.0], 2), None);
        assert_eq!(trimmed_mean(&[9.0], 0), Some(9.0));
    }

    #[test]
    fn test_error_bar_is_clipped_at_zero() {
        let bar = ErrorBar::non_negative(0.5, 2.0);
        assert_eq!(bar.lower, 0.5);
        assert_eq!(bar.upper, 2.0);

        let bar = ErrorBar::non_negative(10.0, 2.0);
        assert_eq!(bar.lower, 2.0);
        assert_eq!(bar.upper, 2.0);
    }

    #[test]
    fn test_unbounded_error_bar_keeps_negative_mean() {
        let stat = AggregatedStat {
            name: "loss".to_string(),
            mean: -0.25,
            confidence_radius: 0.08,
        };
        let bar = stat.error_bar(false);
        assert_eq!(bar.lower, 0.08);
        assert_eq!(bar.upper, 0.08);
    }

    #[test]
    fn test_error_estimates_differ() {
        let values = [1.0, 3.0];
        assert!(close(ErrorEstimate::StudentT.radius(&values).unwrap(), 12.706));
        assert!(close(ErrorEstimate::HalfStdDev.radius(&values).unwrap(), 0.5));
    }

    #[test]
    fn test_tally_matches_batch_statistics() {
        let values = [3.0, 9.0, 1.0, 4.0, 8.0];
        let tally: Tally = values.iter().copied().collect();
        assert_eq!(tally.count, 5);
        assert_eq!(tally.min, 1.0);
        assert_eq!(tally.max, 9.0);
        assert!(close(tally.avg(), mean(&values)));
        assert!(close(tally.stddev(), population_std_dev(&values)));

        let empty = Tally::new();
        assert!(empty.is_empty());
        assert_eq!(empty.avg(), 0.0);
        assert_eq!(empty.stddev(), 0.0);
    }
}
