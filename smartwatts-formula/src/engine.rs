use crate::config::FormulaConfig;
use crate::error::{FormulaError, Result};
use crate::extract::{self, MSR_GROUP};
use crate::registry::ModelRegistry;
use crate::report::{FormulaReport, FormulaReportMetadata, InputReport, OutputReport, PowerReport, PowerReportMetadata, Timestamp, ALL_TARGET};
use crate::tick::{TickBuffer, TickReports};

const APERF_EVENT: &str = "APERF";
const MPERF_EVENT: &str = "MPERF";

/// The streaming stream operator at the heart of SmartWatts: ingests one
/// input report at a time, buffers it until its tick is safe to close, then
/// attributes that tick's RAPL measurement across its running targets.
///
/// Single-threaded, synchronous, cooperative: `process` never blocks and
/// returns all of the tick's outputs (if any) before control returns to the
/// caller. Dropping the engine silently discards any buffered ticks.
pub struct FormulaEngine {
    config: FormulaConfig,
    ticks: TickBuffer,
    registry: ModelRegistry,
    sensor: Option<String>,
}

impl FormulaEngine {
    pub fn new(config: FormulaConfig) -> FormulaEngine {
        let registry = ModelRegistry::new(&config.cpu_topology, config.history_window_size);
        FormulaEngine {
            config,
            ticks: TickBuffer::new(),
            registry,
            sensor: None,
        }
    }

    pub fn config(&self) -> &FormulaConfig {
        &self.config
    }

    /// Direct access to the model registry, mainly for diagnostics and
    /// tests that want to inspect a layer's revision/hash/fit state without
    /// waiting for a `FormulaReport`.
    pub fn registry_mut(&mut self) -> &mut ModelRegistry {
        &mut self.registry
    }

    /// Ingests one input report, triggering processing of the oldest
    /// buffered tick once enough later ticks have arrived to make it safe
    /// to close (spec.md §4.6). Returns that tick's outputs, if any —
    /// empty otherwise.
    pub fn process(&mut self, report: InputReport) -> Vec<OutputReport> {
        self.sensor = Some(report.sensor.clone());
        self.ticks.ingest(report);

        if self.ticks.len() > self.config.tick_threshold() {
            self.process_oldest_tick()
        } else {
            Vec::new()
        }
    }

    /// Processes every remaining buffered tick, oldest first, regardless of
    /// whether it has crossed the real_time/batch threshold yet. Intended
    /// for a clean shutdown; dropping the engine without calling this
    /// discards buffered ticks silently, as specified.
    pub fn flush(&mut self) -> Vec<OutputReport> {
        let mut outputs = Vec::new();
        while !self.ticks.is_empty() {
            outputs.extend(self.process_oldest_tick());
        }
        outputs
    }

    fn process_oldest_tick(&mut self) -> Vec<OutputReport> {
        let (timestamp, reports) = match self.ticks.pop_oldest() {
            Some(t) => t,
            None => return Vec::new(),
        };
        let outputs = self.process_tick(timestamp, reports);
        log::debug!("processed tick {timestamp}: emitted {} report(s)", outputs.len());
        outputs
    }

    fn process_tick(&mut self, timestamp: Timestamp, mut reports: TickReports) -> Vec<OutputReport> {
        let global_report = match reports.remove(ALL_TARGET) {
            Some(r) => r,
            None => return Vec::new(), // cannot attribute without the reference
        };

        let socket = self.config.socket_domain_value.clone();
        let sensor = self.sensor.clone().unwrap_or_default();

        let rapl_watts = match extract::extract_rapl_watts(&global_report, &socket, &self.config.rapl_event, self.config.reports_frequency_seconds) {
            Ok(w) => w,
            Err(e) => {
                log::warn!("skipping tick {timestamp}: {e}");
                return Vec::new();
            }
        };

        let avg_msr = match extract::extract_msr_averages(&global_report, &socket) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("skipping tick {timestamp}: {e}");
                return Vec::new();
            }
        };

        let global_core = match extract::extract_core_events_sum(reports.iter().map(|(_, r)| r), &socket) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("skipping tick {timestamp}: {e}");
                return Vec::new();
            }
        };

        let mut outputs = Vec::new();
        outputs.push(OutputReport::Power(self.gen_power_report(
            timestamp,
            &sensor,
            "rapl",
            &self.config.rapl_event,
            rapl_watts,
            1.0,
            0.0,
            0.0,
        )));

        if global_core.is_empty() {
            return outputs;
        }

        let pkg_freq = match self.pkg_frequency(&avg_msr) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("skipping tick {timestamp}: {e}");
                return outputs;
            }
        };

        let layer_freq;
        let raw_global_power: f64;
        {
            let model = self.registry.model_for(pkg_freq.round().max(0.0) as u32);
            layer_freq = model.frequency_mhz();
            match model.predict(&global_core) {
                Ok(power) => raw_global_power = power,
                Err(FormulaError::NotFitted { .. }) => {
                    model.store(rapl_watts, &global_core);
                    model.fit(self.config.min_samples_required, 0.0, self.config.cpu_topology.tdp_watts);
                    return outputs;
                }
                Err(_) => return outputs,
            }
        }

        let model_error = (rapl_watts - raw_global_power).abs();
        let model_hash = self.registry.model_for(layer_freq).hash().to_string();
        outputs.push(OutputReport::Power(self.gen_power_report(
            timestamp,
            &sensor,
            "global",
            &model_hash,
            raw_global_power,
            1.0,
            raw_global_power,
            model_error,
        )));

        outputs.extend(self.attribute_targets(timestamp, &sensor, &socket, &reports, &model_hash, layer_freq, raw_global_power));

        let model = self.registry.model_for(layer_freq);
        model.store(rapl_watts, &global_core);
        if model_error > self.config.error_threshold {
            model.fit(self.config.min_samples_required, 0.0, self.config.cpu_topology.tdp_watts);
        }

        outputs.push(OutputReport::Formula(self.gen_formula_report(timestamp, &sensor, &socket, layer_freq, pkg_freq, model_error)));
        outputs
    }

    fn attribute_targets(
        &mut self,
        timestamp: Timestamp,
        sensor: &str,
        socket: &str,
        reports: &TickReports,
        model_hash: &str,
        layer_freq: u32,
        raw_global_power: f64,
    ) -> Vec<OutputReport> {
        let mut outputs = Vec::new();
        for (target, target_report) in reports.iter() {
            let target_core = match extract::extract_core_events(target_report, socket) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("skipping target '{target}' at tick {timestamp}: {e}");
                    continue;
                }
            };

            let model = self.registry.model_for(layer_freq);
            let raw_target_power = match model.predict(&target_core) {
                Ok(p) => p,
                Err(e) => {
                    // the global prediction above already succeeded on the same
                    // model, so this would only happen if the model somehow
                    // became unfitted in between; treat it like any other
                    // per-target failure and move on to the next target.
                    log::warn!("skipping target '{target}' at tick {timestamp}: {e}");
                    continue;
                }
            };
            let (capped, ratio) = model.cap(raw_target_power, raw_global_power);
            let final_power = model.apply_intercept_share(capped, ratio);
            let error = (final_power - raw_global_power).abs();

            outputs.push(OutputReport::Power(PowerReport {
                timestamp,
                sensor: sensor.to_string(),
                target: target.to_string(),
                power_watts: final_power,
                metadata: PowerReportMetadata {
                    scope: self.config.scope.as_str().to_string(),
                    socket: socket.to_string(),
                    formula: model_hash.to_string(),
                    ratio,
                    raw_prediction: raw_target_power,
                    error,
                },
            }));
        }
        outputs
    }

    fn pkg_frequency(&self, avg_msr: &std::collections::BTreeMap<String, f64>) -> Result<f64> {
        let aperf = avg_msr
            .get(APERF_EVENT)
            .ok_or_else(|| FormulaError::missing_index(APERF_EVENT, MSR_GROUP, "msr event"))?;
        let mperf = avg_msr
            .get(MPERF_EVENT)
            .ok_or_else(|| FormulaError::missing_index(MPERF_EVENT, MSR_GROUP, "msr event"))?;
        if *mperf == 0.0 {
            return Err(FormulaError::missing_index(MPERF_EVENT, MSR_GROUP, "msr event"));
        }
        Ok(self.config.cpu_topology.base_frequency() as f64 * aperf / mperf)
    }

    #[allow(clippy::too_many_arguments)]
    fn gen_power_report(
        &self,
        timestamp: Timestamp,
        sensor: &str,
        target: &str,
        formula: &str,
        power_watts: f64,
        ratio: f64,
        raw_prediction: f64,
        error: f64,
    ) -> PowerReport {
        PowerReport {
            timestamp,
            sensor: sensor.to_string(),
            target: target.to_string(),
            power_watts,
            metadata: PowerReportMetadata {
                scope: self.config.scope.as_str().to_string(),
                socket: self.config.socket_domain_value.clone(),
                formula: formula.to_string(),
                ratio,
                raw_prediction,
                error,
            },
        }
    }

    fn gen_formula_report(&mut self, timestamp: Timestamp, sensor: &str, socket: &str, layer_freq: u32, pkg_freq: f64, error: f64) -> FormulaReport {
        let model = self.registry.model_for(layer_freq);
        FormulaReport {
            timestamp,
            sensor: sensor.to_string(),
            target: model.hash().to_string(),
            metadata: FormulaReportMetadata {
                scope: self.config.scope.as_str().to_string(),
                socket: socket.to_string(),
                layer_freq,
                pkg_freq,
                samples: model.history_len(),
                model_id: model.revision_id(),
                error,
                intercept: model.intercept().unwrap_or(0.0),
                coefficients: model.coefficients().unwrap_or_default(),
            },
        }
    }
}
