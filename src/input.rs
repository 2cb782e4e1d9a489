//! # Input Loader
//!
//! Reads a results tree laid out as `<root>/<raw-run-name>/summary.txt`.
//! Summary files are independent, so they are parsed in parallel on a
//! dedicated rayon pool. Every file is parsed before anything is returned,
//! and results are keyed by run name so the outcome does not depend on
//! scheduling.

use crate::report::RunCollection;
use crate::summary::{SummaryParser, TestRunRecord};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Loads every run's summary file below a root directory
#[derive(Debug, Clone)]
pub struct RunLoader {
    parser: SummaryParser,
    jobs: usize,
    summary_file: String,
}

impl Default for RunLoader {
    fn default() -> Self {
        Self::new(SummaryParser::default(), num_cpus::get())
    }
}

impl RunLoader {
    pub fn new(parser: SummaryParser, jobs: usize) -> Self {
        Self {
            parser,
            jobs: jobs.max(1),
            summary_file: crate::defaults::SUMMARY_FILE.to_string(),
        }
    }

    /// Look for summaries under a different file name
    pub fn with_summary_file(mut self, name: impl Into<String>) -> Self {
        self.summary_file = name.into();
        self
    }

    /// Run directories below `root` that hold a summary file, by name
    pub fn discover(&self, root: &Path) -> Result<Vec<(String, PathBuf)>> {
        let entries = fs::read_dir(root)
            .with_context(|| format!("Failed to list run directories in {:?}", root))?;

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to list {:?}", root))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!("Skipping run directory with non UTF-8 name: {:?}", path);
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let summary = path.join(&self.summary_file);
            if !summary.is_file() {
                warn!("Skipping {:?}: no {}", path, self.summary_file);
                continue;
            }
            runs.push((name, summary));
        }
        runs.sort();
        debug!("Found {} runs in {:?}", runs.len(), root);
        Ok(runs)
    }

    /// Parse one summary file
    pub fn load_file(&self, run: &str, path: &Path) -> Result<Vec<TestRunRecord>> {
        let text =
            fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let records = self
            .parser
            .parse(run, &text)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(records)
    }

    /// Parse every run below `root`
    pub fn load(&self, root: &Path) -> Result<RunCollection> {
        let runs = self.discover(root)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .context("Failed to start parser threads")?;

        let parsed = pool.install(|| {
            runs.par_iter()
                .map(|(run, path)| -> Result<(String, Vec<TestRunRecord>)> {
                    Ok((run.clone(), self.load_file(run, path)?))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let total: usize = parsed.iter().map(|(_, records)| records.len()).sum();
        info!(
            "Loaded {} test runs from {} summary files in {:?}",
            total,
            parsed.len(),
            root
        );
        Ok(parsed.into_iter().collect())
    }
}

/// Parse every run below `root` with default settings
pub fn load_runs(root: impl AsRef<Path>) -> Result<RunCollection> {
    RunLoader::default().load(root.as_ref())
}
