//! Deterministic projection of an [`InputReport`]'s nested `groups` map into
//! the RAPL/MSR/CORE feature dictionaries the engine consumes, restricted to
//! one configured socket. Kept separate from `engine` because, unlike the
//! rest of the engine, these functions only know about the wire shape of
//! `InputReport` — nothing about models, ticks or history.

use std::collections::BTreeMap;

use crate::error::{FormulaError, Result};
use crate::model::EventsGroup;
use crate::report::InputReport;

pub const RAPL_GROUP: &str = "rapl";
pub const MSR_GROUP: &str = "msr";
pub const CORE_GROUP: &str = "core";

/// Events whose name starts with this prefix are excluded from CORE
/// aggregation — they measure wall-clock time, not activity, and would
/// otherwise be summed nonsensically across cores/targets.
pub const TIME_EVENT_PREFIX: &str = "time_";

fn socket_group<'a>(report: &'a InputReport, group_name: &str, socket: &str) -> Result<&'a BTreeMap<String, BTreeMap<String, i64>>> {
    let group = report
        .groups
        .get(group_name)
        .ok_or_else(|| FormulaError::missing_index(group_name, group_name, "group"))?;
    group.get(socket).ok_or_else(|| FormulaError::missing_index(socket, group_name, "socket"))
}

/// Validates one raw counter before it enters the feature pipeline. A
/// negative or non-finite sample cannot represent real hardware activity;
/// it is logged and dropped, and the caller continues with the rest of the
/// events in the same group (spec.md §7: "drop the sample, continue").
fn validate_counter(event_name: &str, value: i64) -> Option<f64> {
    let as_f64 = value as f64;
    if value < 0 || !as_f64.is_finite() {
        let err = FormulaError::InvalidSample {
            event_name: event_name.to_string(),
            value: as_f64,
        };
        log::warn!("{err}");
        return None;
    }
    Some(as_f64)
}

/// Converts the configured RAPL event's raw energy counter to Watts:
/// `energy_j = counter * 2^-32`, `watts = energy_j / reports_frequency_seconds`.
/// Averages the event across the socket's cores first, the same way the
/// original source reads a single per-socket RAPL column (RAPL counters are
/// reported once per socket, so in practice there is exactly one core here).
pub fn extract_rapl_watts(report: &InputReport, socket: &str, rapl_event: &str, reports_frequency_seconds: f64) -> Result<f64> {
    let cores = socket_group(report, RAPL_GROUP, socket)?;
    let mut total = 0.0;
    let mut count = 0usize;
    for events in cores.values() {
        if let Some(&value) = events.get(rapl_event) {
            if let Some(v) = validate_counter(rapl_event, value) {
                total += v;
                count += 1;
            }
        }
    }
    if count == 0 {
        return Err(FormulaError::missing_index(rapl_event, RAPL_GROUP, "rapl event"));
    }
    let avg_counter = total / count as f64;
    let energy_joules = avg_counter * 2f64.powi(-32);
    Ok(energy_joules / reports_frequency_seconds)
}

/// Averages every MSR event across all cores of the configured socket
/// (typically APERF/MPERF/TSC).
pub fn extract_msr_averages(report: &InputReport, socket: &str) -> Result<BTreeMap<String, f64>> {
    let cores = socket_group(report, MSR_GROUP, socket)?;
    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for events in cores.values() {
        for (name, &value) in events {
            let Some(v) = validate_counter(name, value) else { continue };
            *sums.entry(name.clone()).or_insert(0.0) += v;
            *counts.entry(name.clone()).or_insert(0) += 1;
        }
    }
    Ok(sums.into_iter().map(|(name, sum)| {
        let n = counts[&name] as f64;
        (name, sum / n)
    }).collect())
}

/// Sums every non-time CORE event across all cores of the configured socket,
/// for a single target's report.
pub fn extract_core_events(report: &InputReport, socket: &str) -> Result<EventsGroup> {
    let cores = socket_group(report, CORE_GROUP, socket)?;
    let mut sums: EventsGroup = EventsGroup::new();
    for events in cores.values() {
        for (name, &value) in events {
            if name.starts_with(TIME_EVENT_PREFIX) {
                continue;
            }
            let Some(v) = validate_counter(name, value) else { continue };
            *sums.entry(name.clone()).or_insert(0.0) += v;
        }
    }
    Ok(sums)
}

/// Sums the (already per-target, per-core-summed) CORE events of every
/// report in `reports` into one aggregate feature dictionary. This is "what
/// all active targets did together" during the tick.
pub fn extract_core_events_sum<'a>(reports: impl Iterator<Item = &'a InputReport>, socket: &str) -> Result<EventsGroup> {
    let mut total: EventsGroup = EventsGroup::new();
    for report in reports {
        let per_target = extract_core_events(report, socket)?;
        for (name, value) in per_target {
            *total.entry(name).or_insert(0.0) += value;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn report_with(group: &str, socket: &str, core: &str, events: &[(&str, i64)]) -> InputReport {
        let core_map: BTreeMap<String, i64> = events.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        let mut cores: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
        cores.insert(core.to_string(), core_map);
        let mut socketed: BTreeMap<String, BTreeMap<String, BTreeMap<String, i64>>> = BTreeMap::new();
        socketed.insert(socket.to_string(), cores);
        let mut groups: crate::report::Groups = BTreeMap::new();
        groups.insert(group.to_string(), socketed);
        InputReport {
            timestamp: 0,
            sensor: "sensor0".into(),
            target: "all".into(),
            groups,
        }
    }

    #[test]
    fn rapl_conversion_matches_counter_and_period() {
        // counter C, period P seconds -> watts = (C * 2^-32) / P
        let counter = 4_294_967_296i64; // 2^32
        let report = report_with(RAPL_GROUP, "0", "0", &[("RAPL_ENERGY_PKG", counter)]);
        let watts = extract_rapl_watts(&report, "0", "RAPL_ENERGY_PKG", 2.0).unwrap();
        assert!((watts - 0.5).abs() < 1e-9); // 1 joule over 2 seconds
    }

    #[test]
    fn missing_socket_is_missing_index() {
        let report = report_with(RAPL_GROUP, "0", "0", &[("RAPL_ENERGY_PKG", 1)]);
        let err = extract_rapl_watts(&report, "1", "RAPL_ENERGY_PKG", 1.0).unwrap_err();
        assert!(matches!(err, FormulaError::MissingIndex { .. }));
    }

    #[test]
    fn core_events_exclude_time_prefix() {
        let report = report_with(CORE_GROUP, "0", "0", &[("instructions", 10), ("time_enabled", 999)]);
        let events = extract_core_events(&report, "0").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events.get("instructions"), Some(&10.0));
    }

    #[test]
    fn negative_core_counter_is_dropped_but_siblings_survive() {
        let report = report_with(CORE_GROUP, "0", "0", &[("instructions", 10), ("cycles", -5)]);
        let events = extract_core_events(&report, "0").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events.get("instructions"), Some(&10.0));
        assert!(events.get("cycles").is_none());
    }

    #[test]
    fn negative_rapl_counter_is_dropped_like_a_missing_one() {
        let report = report_with(RAPL_GROUP, "0", "0", &[("RAPL_ENERGY_PKG", -1)]);
        let err = extract_rapl_watts(&report, "0", "RAPL_ENERGY_PKG", 1.0).unwrap_err();
        assert!(matches!(err, FormulaError::MissingIndex { .. }));
    }

    #[test]
    fn msr_events_are_averaged_across_cores() {
        let mut groups: crate::report::Groups = BTreeMap::new();
        let mut cores: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
        cores.insert("0".into(), [("APERF".to_string(), 100i64)].into_iter().collect());
        cores.insert("1".into(), [("APERF".to_string(), 200i64)].into_iter().collect());
        let mut socketed = BTreeMap::new();
        socketed.insert("0".to_string(), cores);
        groups.insert(MSR_GROUP.to_string(), socketed);
        let report = InputReport {
            timestamp: 0,
            sensor: "s".into(),
            target: "all".into(),
            groups,
        };
        let avg = extract_msr_averages(&report, "0").unwrap();
        assert_eq!(avg.get("APERF"), Some(&150.0));
    }
}
