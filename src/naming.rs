//! # Run Name Canonicalization
//!
//! Test runs were named ad hoc while the measurements were taken
//! (`stock-router`, `load-half-threaded`, `rt-load`, ...). Reports group and
//! sort by a structured configuration key instead, so every known raw name is
//! listed here together with its key.
//!
//! The table is closed. A name that is not listed is rejected with
//! [`AnalysisError::UnknownConfiguration`] so runs from an unrecognized setup
//! never end up averaged together with a known one.

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kernel flavour of the device under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Stock,
    Rt,
}

/// Packet processing mode of the NIC driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    Default,
    Threaded,
}

/// Receive queue length relative to the driver default
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadLevel {
    Default,
    Half,
    Double,
}

/// Whether background traffic was running alongside the probe packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficState {
    Idle,
    Load,
}

impl Driver {
    pub fn as_str(self) -> &'static str {
        match self {
            Driver::Stock => "stock",
            Driver::Rt => "rt",
        }
    }
}

impl QueueMode {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueMode::Default => "default",
            QueueMode::Threaded => "threaded",
        }
    }
}

impl LoadLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadLevel::Default => "default",
            LoadLevel::Half => "half",
            LoadLevel::Double => "double",
        }
    }
}

impl TrafficState {
    pub fn as_str(self) -> &'static str {
        match self {
            TrafficState::Idle => "idle",
            TrafficState::Load => "load",
        }
    }
}

/// Structured configuration a test run belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalRunKey {
    pub driver: Driver,
    pub queue_mode: QueueMode,
    pub load_level: LoadLevel,
    pub traffic_state: TrafficState,
}

impl CanonicalRunKey {
    const fn new(
        driver: Driver,
        queue_mode: QueueMode,
        load_level: LoadLevel,
        traffic_state: TrafficState,
    ) -> Self {
        Self {
            driver,
            queue_mode,
            load_level,
            traffic_state,
        }
    }

    /// Dash-joined display name, e.g. `rt-threaded-half-load`
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CanonicalRunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.driver.as_str(),
            self.queue_mode.as_str(),
            self.load_level.as_str(),
            self.traffic_state.as_str()
        )
    }
}

use Driver::{Rt, Stock};
use LoadLevel::{Default as DefaultQueue, Double, Half};
use QueueMode::{Default as DefaultMode, Threaded};
use TrafficState::{Idle, Load};

/// Every raw run name that has been recorded, with its configuration
pub const RUN_NAMES: [(&str, CanonicalRunKey); 24] = [
    ("stock-router", CanonicalRunKey::new(Stock, DefaultMode, DefaultQueue, Idle)),
    ("stock-half-queue", CanonicalRunKey::new(Stock, DefaultMode, Half, Idle)),
    ("stock-double-queue", CanonicalRunKey::new(Stock, DefaultMode, Double, Idle)),
    ("threaded-default", CanonicalRunKey::new(Stock, Threaded, DefaultQueue, Idle)),
    ("threaded-half-queue", CanonicalRunKey::new(Stock, Threaded, Half, Idle)),
    ("threaded-double-queue", CanonicalRunKey::new(Stock, Threaded, Double, Idle)),
    ("load-default", CanonicalRunKey::new(Stock, DefaultMode, DefaultQueue, Load)),
    ("load-half", CanonicalRunKey::new(Stock, DefaultMode, Half, Load)),
    ("load-double", CanonicalRunKey::new(Stock, DefaultMode, Double, Load)),
    ("load-default-threaded", CanonicalRunKey::new(Stock, Threaded, DefaultQueue, Load)),
    ("load-half-threaded", CanonicalRunKey::new(Stock, Threaded, Half, Load)),
    ("load-double-threaded", CanonicalRunKey::new(Stock, Threaded, Double, Load)),
    ("rt-stock", CanonicalRunKey::new(Rt, DefaultMode, DefaultQueue, Idle)),
    ("rt-half-queue", CanonicalRunKey::new(Rt, DefaultMode, Half, Idle)),
    ("rt-double-queue", CanonicalRunKey::new(Rt, DefaultMode, Double, Idle)),
    ("rt-threaded-default", CanonicalRunKey::new(Rt, Threaded, DefaultQueue, Idle)),
    ("rt-threaded-half-queue", CanonicalRunKey::new(Rt, Threaded, Half, Idle)),
    ("rt-threaded-double-queue", CanonicalRunKey::new(Rt, Threaded, Double, Idle)),
    ("rt-load", CanonicalRunKey::new(Rt, DefaultMode, DefaultQueue, Load)),
    ("rt-load-half", CanonicalRunKey::new(Rt, DefaultMode, Half, Load)),
    ("rt-load-double", CanonicalRunKey::new(Rt, DefaultMode, Double, Load)),
    ("rt-load-default-threaded", CanonicalRunKey::new(Rt, Threaded, DefaultQueue, Load)),
    ("rt-load-half-threaded", CanonicalRunKey::new(Rt, Threaded, Half, Load)),
    ("rt-load-double-threaded", CanonicalRunKey::new(Rt, Threaded, Double, Load)),
];

/// Look up the configuration of a raw run name
pub fn canonicalize(raw: &str) -> Result<CanonicalRunKey> {
    RUN_NAMES
        .iter()
        .find(|(name, _)| *name == raw)
        .map(|(_, key)| *key)
        .ok_or_else(|| AnalysisError::UnknownConfiguration(raw.to_string()))
}

/// Look up the canonical display name of a raw run name
pub fn canonical_name(raw: &str) -> Result<String> {
    canonicalize(raw).map(|key| key.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_known_name_maps_to_a_unique_key() {
        let names: HashSet<String> = RUN_NAMES
            .iter()
            .map(|(raw, _)| canonical_name(raw).unwrap())
            .collect();
        assert_eq!(names.len(), RUN_NAMES.len());

        let raws: HashSet<&str> = RUN_NAMES.iter().map(|(raw, _)| *raw).collect();
        assert_eq!(raws.len(), RUN_NAMES.len());
    }

    #[test]
    fn test_table_covers_every_configuration() {
        let keys: HashSet<CanonicalRunKey> = RUN_NAMES.iter().map(|(_, key)| *key).collect();
        // 2 drivers x 2 queue modes x 3 queue lengths x 2 traffic states
        assert_eq!(keys.len(), 24);
    }

    #[test]
    fn test_known_names() {
        assert_eq!(
            canonical_name("stock-router").unwrap(),
            "stock-default-default-idle"
        );
        assert_eq!(
            canonical_name("load-double").unwrap(),
            "stock-default-double-load"
        );
        assert_eq!(
            canonical_name("rt-load-half-threaded").unwrap(),
            "rt-threaded-half-load"
        );
        assert_eq!(canonical_name("rt-stock").unwrap(), "rt-default-default-idle");

        let key = canonicalize("threaded-half-queue").unwrap();
        assert_eq!(key.driver, Driver::Stock);
        assert_eq!(key.queue_mode, QueueMode::Threaded);
        assert_eq!(key.load_level, LoadLevel::Half);
        assert_eq!(key.traffic_state, TrafficState::Idle);
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        for raw in ["", "stock", "rt-load-triple", "Stock-Router", " rt-load"] {
            match canonicalize(raw) {
                Err(AnalysisError::UnknownConfiguration(name)) => assert_eq!(name, raw),
                other => panic!("expected unknown configuration for {raw:?}, got {other:?}"),
            }
        }
    }
}
