//! # Binary Trace Reader
//!
//! The traffic generator writes one 16-byte record per probe packet:
//!
//! ```text
//! +----------------------+----------------------+
//! | transmit time (f64)  | arrival time (f64)   |   repeated until EOF
//! +----------------------+----------------------+
//! ```
//!
//! Both values are seconds in the host's native byte order. A writer that is
//! interrupted can leave a partial record at the end of the file; such a tail
//! is dropped silently and reading simply ends.
//!
//! [`TraceReader`] decodes any `Read` lazily. [`TraceFile`] adds buffered
//! file access, the expected sample count and random access to the last
//! record, which the anomaly detector needs before it starts its pass.

use crate::error::{AnalysisError, Result};
use crate::stats::Tally;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Size in bytes of one encoded sample
pub const RECORD_SIZE: usize = 16;

/// One probe packet as recorded by the traffic generator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawTraceSample {
    pub transmit_time: f64,
    pub arrival_time: f64,
}

impl RawTraceSample {
    pub fn new(transmit_time: f64, arrival_time: f64) -> Self {
        Self {
            transmit_time,
            arrival_time,
        }
    }

    /// One-way latency in seconds
    pub fn latency(&self) -> f64 {
        self.arrival_time - self.transmit_time
    }

    /// One-way latency in microseconds
    pub fn latency_us(&self) -> f64 {
        self.latency() * 1_000_000.0
    }

    /// Decode one record
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let mut transmit = [0u8; 8];
        let mut arrival = [0u8; 8];
        transmit.copy_from_slice(&bytes[..8]);
        arrival.copy_from_slice(&bytes[8..]);
        Self {
            transmit_time: f64::from_ne_bytes(transmit),
            arrival_time: f64::from_ne_bytes(arrival),
        }
    }

    /// Encode one record in the on-disk layout
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[..8].copy_from_slice(&self.transmit_time.to_ne_bytes());
        bytes[8..].copy_from_slice(&self.arrival_time.to_ne_bytes());
        bytes
    }
}

/// Lazy decoder over any byte stream
///
/// The iterator ends at end-of-stream, at a trailing partial record, or at
/// the first I/O error. An error is kept and can be retrieved with
/// [`TraceReader::take_error`].
pub struct TraceReader<R> {
    reader: R,
    samples_read: usize,
    error: Option<io::Error>,
}

impl<R: Read> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            samples_read: 0,
            error: None,
        }
    }

    /// Number of samples decoded so far
    pub fn samples_read(&self) -> usize {
        self.samples_read
    }

    /// The I/O error that stopped iteration, if any
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Fill `buf` completely, returning how many bytes were available
    fn fill_record(&mut self, buf: &mut [u8; RECORD_SIZE]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read + Seek> TraceReader<R> {
    /// Start reading again from the first record
    pub fn rewind(&mut self) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.samples_read = 0;
        self.error = None;
        Ok(())
    }
}

impl<R: Read> Iterator for TraceReader<R> {
    type Item = RawTraceSample;

    fn next(&mut self) -> Option<Self::Item> {
        if self.error.is_some() {
            return None;
        }
        let mut buf = [0u8; RECORD_SIZE];
        match self.fill_record(&mut buf) {
            Ok(RECORD_SIZE) => {
                self.samples_read += 1;
                Some(RawTraceSample::from_bytes(&buf))
            }
            Ok(0) => None,
            Ok(partial) => {
                debug!(
                    "Dropping {} trailing bytes after {} samples",
                    partial, self.samples_read
                );
                None
            }
            Err(e) => {
                warn!("Trace read failed after {} samples: {}", self.samples_read, e);
                self.error = Some(e);
                None
            }
        }
    }
}

/// Decode every sample of a stream into memory
pub fn read_trace<R: Read>(reader: R) -> io::Result<Vec<RawTraceSample>> {
    let mut trace = TraceReader::new(reader);
    let samples: Vec<RawTraceSample> = trace.by_ref().collect();
    match trace.take_error() {
        Some(e) => Err(e),
        None => Ok(samples),
    }
}

/// A trace file on disk
pub struct TraceFile {
    path: PathBuf,
    reader: TraceReader<BufReader<File>>,
    expected_samples: usize,
}

impl TraceFile {
    /// Open a trace file for reading
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| AnalysisError::io(&path, e))?;
        let size = file
            .metadata()
            .map_err(|e| AnalysisError::io(&path, e))?
            .len();
        let expected_samples = size as usize / RECORD_SIZE;
        debug!("Opened {:?}: {} samples", path, expected_samples);

        Ok(Self {
            path,
            reader: TraceReader::new(BufReader::new(file)),
            expected_samples,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of complete records in the file
    pub fn expected_samples(&self) -> usize {
        self.expected_samples
    }

    /// Read the last complete record without disturbing the read position
    pub fn last_sample(&mut self) -> Result<Option<RawTraceSample>> {
        if self.expected_samples == 0 {
            return Ok(None);
        }
        let offset = ((self.expected_samples - 1) * RECORD_SIZE) as u64;
        let path = self.path.clone();
        let inner = &mut self.reader.reader;

        let position = inner.stream_position().map_err(|e| AnalysisError::io(&path, e))?;
        inner
            .seek(SeekFrom::Start(offset))
            .map_err(|e| AnalysisError::io(&path, e))?;
        let mut buf = [0u8; RECORD_SIZE];
        inner
            .read_exact(&mut buf)
            .map_err(|e| AnalysisError::io(&path, e))?;
        inner
            .seek(SeekFrom::Start(position))
            .map_err(|e| AnalysisError::io(&path, e))?;

        Ok(Some(RawTraceSample::from_bytes(&buf)))
    }

    /// Start again from the first record
    pub fn rewind(&mut self) -> Result<()> {
        self.reader
            .rewind()
            .map_err(|e| AnalysisError::io(&self.path, e))
    }

    /// Read all remaining samples into memory
    pub fn read_all(&mut self) -> Result<Vec<RawTraceSample>> {
        let mut samples = Vec::with_capacity(self.expected_samples);
        samples.extend(self.reader.by_ref());
        match self.reader.take_error() {
            Some(e) => Err(AnalysisError::io(&self.path, e)),
            None => Ok(samples),
        }
    }

    /// Surface an I/O error that ended a lazy pass early
    pub fn check(&mut self) -> Result<()> {
        match self.reader.take_error() {
            Some(e) => Err(AnalysisError::io(&self.path, e)),
            None => Ok(()),
        }
    }
}

impl Iterator for TraceFile {
    type Item = RawTraceSample;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next()
    }
}

/// Whole-trace latency figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Span between the first and last transmit time, rounded to seconds
    pub total_duration_secs: u64,
    pub sample_count: usize,
    pub samples_per_second: usize,
    /// Mean latency in seconds
    pub mean_latency: f64,
    /// Population standard deviation of the latency in seconds
    pub std_dev_latency: f64,
}

impl TraceSummary {
    /// Summarize a complete trace; `None` when it holds no samples
    pub fn from_samples(samples: &[RawTraceSample]) -> Option<Self> {
        let first = samples.first()?;
        let last = samples.last()?;

        let total_duration_secs = (last.transmit_time - first.transmit_time).round().max(0.0) as u64;
        // Sub-second traces count as one second
        let samples_per_second = samples.len() / total_duration_secs.max(1) as usize;

        let latencies: Vec<f64> = samples.iter().map(RawTraceSample::latency).collect();

        Some(Self {
            total_duration_secs,
            sample_count: samples.len(),
            samples_per_second,
            mean_latency: crate::stats::mean(&latencies),
            std_dev_latency: crate::stats::population_std_dev(&latencies),
        })
    }

    /// Index range of the one-second window around the middle of the trace
    pub fn middle_window(&self) -> std::ops::Range<usize> {
        let start = (self.total_duration_secs as usize / 2).saturating_sub(1) * self.samples_per_second;
        let start = start.min(self.sample_count);
        let end = (start + self.samples_per_second).min(self.sample_count);
        start..end
    }
}

/// The one-second slice of `samples` centered on the middle of the trace
pub fn middle_second<'a>(samples: &'a [RawTraceSample], summary: &TraceSummary) -> &'a [RawTraceSample] {
    &samples[summary.middle_window()]
}

/// Latency change (µs) from each packet to the next
pub fn jitter(samples: &[RawTraceSample]) -> Tally {
    samples
        .windows(2)
        .map(|pair| pair[1].latency_us() - pair[0].latency_us())
        .collect()
}
