use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch. The formula core never interprets
/// this value beyond ordering and equality; the wire format is the CLI's
/// business, not the core's.
pub type Timestamp = i64;

/// The reserved target name carrying a tick's reference (global) measurement.
pub const ALL_TARGET: &str = "all";

/// `group name -> socket id -> core id -> event name -> raw counter value`,
/// exactly the shape described in spec.md §6. Signed so that a corrupt or
/// adversarial sensor reading can actually arrive as a negative counter
/// instead of being rejected by the deserializer before the engine ever
/// sees it — validation of individual counters is the engine's job
/// (`extract::validate_counter`), not the wire format's.
pub type Groups = BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, i64>>>>;

/// One sensor sample for one target at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputReport {
    pub timestamp: Timestamp,
    pub sensor: String,
    pub target: String,
    pub groups: Groups,
}

/// Metadata carried by a power report, per spec.md §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerReportMetadata {
    pub scope: String,
    pub socket: String,
    /// For target reports, the model hash; for the RAPL report, the
    /// configured RAPL event name.
    pub formula: String,
    pub ratio: f64,
    pub raw_prediction: f64,
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerReport {
    pub timestamp: Timestamp,
    pub sensor: String,
    pub target: String,
    pub power_watts: f64,
    pub metadata: PowerReportMetadata,
}

/// Metadata carried by a formula (diagnostic) report, per spec.md §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaReportMetadata {
    pub scope: String,
    pub socket: String,
    pub layer_freq: u32,
    pub pkg_freq: f64,
    pub samples: usize,
    pub model_id: u64,
    pub error: f64,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaReport {
    pub timestamp: Timestamp,
    pub sensor: String,
    /// The power model's content hash, per spec.md §3.
    pub target: String,
    pub metadata: FormulaReportMetadata,
}

/// Everything the engine can emit for one input report, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum OutputReport {
    Power(PowerReport),
    Formula(FormulaReport),
}
