use clap::Parser;

/// Feeds newline-delimited JSON input reports through the SmartWatts formula
/// engine and prints newline-delimited JSON output reports.
///
/// Defaults mirror the Kaby Lake R dataset configuration shipped with the
/// original formula: 125W TDP, 1.9GHz base clock, RAPL_ENERGY_PKG, a 60-tick
/// history window and batch-mode buffering.
#[derive(Parser)]
#[command(author, version)]
pub struct Cli {
    /// Input file of newline-delimited JSON `InputReport`s; reads stdin if omitted.
    #[arg(short, long)]
    pub input: Option<String>,

    /// Output file for newline-delimited JSON `OutputReport`s; writes stdout if omitted.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Which RAPL counter to treat as ground truth.
    #[arg(long, default_value = "RAPL_ENERGY_PKG")]
    pub rapl_event: String,

    /// Minimum history samples required before a model's first fit.
    #[arg(long, default_value_t = 10)]
    pub min_samples_required: usize,

    /// Ring buffer capacity for each frequency layer's history.
    #[arg(long, default_value_t = 60)]
    pub history_window_size: usize,

    /// CPU thermal design power, in Watts.
    #[arg(long, default_value_t = 125.0)]
    pub tdp_watts: f64,

    /// CPU base clock, in MHz.
    #[arg(long, default_value_t = 1900)]
    pub base_clock_mhz: u32,

    /// Minimum (max-efficiency) frequency ratio, in MHz.
    #[arg(long, default_value_t = 400)]
    pub ratio_min_mhz: u32,

    /// Base (nominal) frequency ratio, in MHz.
    #[arg(long, default_value_t = 1900)]
    pub ratio_base_mhz: u32,

    /// Maximum (turbo) frequency ratio, in MHz.
    #[arg(long, default_value_t = 4200)]
    pub ratio_max_mhz: u32,

    /// Process the oldest tick once 3 are buffered, instead of 6 (spec.md §4.6).
    #[arg(long)]
    pub real_time: bool,

    /// Watts; a prediction error above this after a fit triggers a refit.
    #[arg(long, default_value_t = 2.0)]
    pub error_threshold: f64,

    /// The sensor's sampling period, in seconds.
    #[arg(long, default_value_t = 1.0)]
    pub reports_frequency_seconds: f64,

    /// Which socket id (as it appears in the input reports) to read.
    #[arg(long, default_value = "0")]
    pub socket: String,
}
