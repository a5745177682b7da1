use crate::topology::CpuTopology;

/// Which power domain the formula reports for. Only `Cpu` is implemented;
/// `Dram` is accepted for forward-compatibility with the metadata's `scope`
/// field but the engine treats it identically (spec.md §6: "only `cpu` is
/// implemented").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaScope {
    Cpu,
    Dram,
}

impl FormulaScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormulaScope::Cpu => "cpu",
            FormulaScope::Dram => "dram",
        }
    }
}

/// Configuration for a [`crate::engine::FormulaEngine`], mirroring
/// `SmartWattsFormulaConfig` in `original_source/smartwatts/context.py`.
#[derive(Debug, Clone)]
pub struct FormulaConfig {
    /// Which RAPL counter to use as the ground-truth reference, e.g.
    /// `"RAPL_ENERGY_PKG"`.
    pub rapl_event: String,
    /// Minimum history samples required before a model's first fit.
    pub min_samples_required: usize,
    /// Ring buffer capacity for each frequency layer's history.
    pub history_window_size: usize,
    pub cpu_topology: CpuTopology,
    pub scope: FormulaScope,
    /// `true`: process the oldest tick once 3 ticks are buffered (threshold
    /// 2). `false` (batch): once 6 are buffered (threshold 5).
    pub real_time_mode: bool,
    /// Watts; exceeding this after a prediction triggers a refit.
    pub error_threshold: f64,
    /// The sensor's sampling period, in seconds, used to convert the RAPL
    /// energy counter to Watts.
    pub reports_frequency_seconds: f64,
    /// Which socket id (as it appears in the wire format) to read.
    pub socket_domain_value: String,
}

impl FormulaConfig {
    /// The tick-buffer threshold implied by `real_time_mode` (spec.md §4.6).
    pub fn tick_threshold(&self) -> usize {
        if self.real_time_mode {
            2
        } else {
            5
        }
    }
}
