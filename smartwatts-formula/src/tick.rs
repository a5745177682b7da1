use std::collections::{HashMap, VecDeque};

use crate::report::{InputReport, Timestamp};

/// The reports seen so far for one sampling instant, keyed by target and
/// kept in first-insertion order. A second report for a target already
/// present overwrites it in place — it does not move to the end — so that
/// "per-target reports in their insertion order" (spec.md §5) is a stable
/// property of the tick, not an accident of iteration.
#[derive(Debug, Default, Clone)]
pub struct TickReports {
    order: Vec<String>,
    reports: HashMap<String, InputReport>,
}

impl TickReports {
    fn insert(&mut self, target: String, report: InputReport) {
        if !self.reports.contains_key(&target) {
            self.order.push(target.clone());
        }
        self.reports.insert(target, report);
    }

    /// Removes and returns the report for `target`, if present. Used to pull
    /// out the reserved `"all"` target's reference measurement.
    pub fn remove(&mut self, target: &str) -> Option<InputReport> {
        let removed = self.reports.remove(target);
        if removed.is_some() {
            self.order.retain(|t| t != target);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates the remaining `(target, report)` pairs in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputReport)> {
        self.order.iter().map(move |t| (t.as_str(), &self.reports[t]))
    }
}

/// Ordered mapping `timestamp -> {target -> report}`, kept in insertion
/// order (which, given monotone arrival, coincides with chronological
/// order). Ingesting a `(timestamp, target)` pair that was already seen
/// silently overwrites it; it does not move the tick in the order.
#[derive(Debug, Default)]
pub struct TickBuffer {
    order: VecDeque<Timestamp>,
    ticks: HashMap<Timestamp, TickReports>,
}

impl TickBuffer {
    pub fn new() -> TickBuffer {
        TickBuffer {
            order: VecDeque::new(),
            ticks: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Places `report` under its `(timestamp, target)` slot, creating a new
    /// tick at the back of the order if this is the first report seen for
    /// that timestamp.
    pub fn ingest(&mut self, report: InputReport) {
        let timestamp = report.timestamp;
        let target = report.target.clone();
        let is_new_tick = !self.ticks.contains_key(&timestamp);
        let tick = self.ticks.entry(timestamp).or_default();
        tick.insert(target, report);
        if is_new_tick {
            self.order.push_back(timestamp);
        }
    }

    /// Removes and returns the oldest tick, in O(1) amortised time.
    pub fn pop_oldest(&mut self) -> Option<(Timestamp, TickReports)> {
        let timestamp = self.order.pop_front()?;
        let reports = self.ticks.remove(&timestamp).unwrap_or_default();
        Some((timestamp, reports))
    }
}
