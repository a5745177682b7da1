use std::collections::BTreeMap;

use ndarray::Array2;
use sha1::{Digest, Sha1};

use crate::error::{FormulaError, Result};
use crate::history::HistoryBuffer;
use crate::regression::{Fit, NonNegativeElasticNet};

/// An events group (event name -> raw counter value), always projected into
/// a feature vector by sorting on the event name. A `BTreeMap` gives us that
/// ordering for free and for nothing extra at the call site.
pub type EventsGroup = BTreeMap<String, f64>;

/// One frequency layer's power model: a non-negative linear regression plus
/// the bounded history used to (re)fit it.
///
/// Hash is `"uninitialized"` until the first successful fit; revision id
/// starts at 0 and increments by exactly one per successful fit.
#[derive(Debug, Clone)]
pub struct PowerModel {
    frequency_mhz: u32,
    history: HistoryBuffer,
    solver: NonNegativeElasticNet,
    fit: Option<Fit>,
    revision_id: u64,
    hash: String,
}

impl PowerModel {
    pub fn new(frequency_mhz: u32, history_window_size: usize) -> PowerModel {
        PowerModel {
            frequency_mhz,
            history: HistoryBuffer::new(history_window_size),
            solver: NonNegativeElasticNet::default(),
            fit: None,
            revision_id: 0,
            hash: "uninitialized".to_string(),
        }
    }

    pub fn frequency_mhz(&self) -> u32 {
        self.frequency_mhz
    }

    pub fn revision_id(&self) -> u64 {
        self.revision_id
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn intercept(&self) -> Option<f64> {
        self.fit.as_ref().map(|f| f.intercept)
    }

    pub fn coefficients(&self) -> Option<Vec<f64>> {
        self.fit.as_ref().map(|f| f.coefficients.to_vec())
    }

    fn project(events: &EventsGroup) -> Vec<f64> {
        events.values().copied().collect()
    }

    /// Appends `(feature vector of events, reference_power_watts)` to the
    /// history.
    pub fn store(&mut self, reference_power_watts: f64, events: &EventsGroup) {
        self.history.store(Self::project(events), reference_power_watts);
    }

    /// Attempts to (re)fit the model from its history.
    ///
    /// No-op if there are fewer than `min_samples` samples. The intercept is
    /// fitted only when the history is exactly at capacity; otherwise it is
    /// forced to zero (spec.md §4.3). A fit whose intercept falls outside
    /// `[min_intercept, max_intercept)` is discarded and the previous model
    /// (if any) is left untouched.
    pub fn fit(&mut self, min_samples: usize, min_intercept: f64, max_intercept: f64) {
        if self.history.len() < min_samples {
            return;
        }

        let fit_intercept = self.history.is_full();
        let n_samples = self.history.len();
        let n_features = self.history.features().next().map(|f| f.len()).unwrap_or(0);

        let mut x = Array2::<f64>::zeros((n_samples, n_features));
        for (i, row) in self.history.features().enumerate() {
            for (j, v) in row.iter().enumerate() {
                x[[i, j]] = *v;
            }
        }
        let y = ndarray::Array1::from_iter(self.history.references().copied());

        let candidate = self.solver.fit(&x, &y, fit_intercept);

        if !(candidate.intercept >= min_intercept && candidate.intercept < max_intercept) {
            log::debug!(
                "discarding fit for frequency layer {} MHz: intercept {} out of range [{}, {})",
                self.frequency_mhz,
                candidate.intercept,
                min_intercept,
                max_intercept
            );
            return;
        }

        self.hash = content_hash(&candidate);
        self.fit = Some(candidate);
        self.revision_id += 1;
        log::info!(
            "power model for frequency layer {} MHz refitted: revision {}, hash {}",
            self.frequency_mhz,
            self.revision_id,
            self.hash
        );
    }

    /// Predicts the power (in Watts, sans any unit attached by the caller)
    /// for the given events group. Fails with `NotFitted` if the model has
    /// never completed a successful fit.
    pub fn predict(&self, events: &EventsGroup) -> Result<f64> {
        let fit = self.fit.as_ref().ok_or(FormulaError::NotFitted {
            layer_freq: self.frequency_mhz,
        })?;
        let features = Self::project(events);
        let dot: f64 = fit.coefficients.iter().zip(features.iter()).map(|(c, v)| c * v).sum();
        Ok(fit.intercept + dot)
    }

    /// Caps `raw_target_power` to the global estimate after subtracting the
    /// intercept from both, returning the capped power and its ratio of the
    /// (intercept-subtracted) global power.
    pub fn cap(&self, raw_target_power: f64, raw_global_power: f64) -> (f64, f64) {
        let intercept = self.fit.as_ref().map(|f| f.intercept).unwrap_or(0.0);
        let t = raw_target_power - intercept;
        let g = raw_global_power - intercept;
        let ratio = if g > 0.0 && t > 0.0 { t / g } else { 0.0 };
        let capped = t.max(0.0);
        (capped, ratio)
    }

    /// Adds the target's share (by `target_ratio`) of the model's intercept
    /// back onto an already-capped target power.
    pub fn apply_intercept_share(&self, target_power: f64, target_ratio: f64) -> f64 {
        let intercept = self.fit.as_ref().map(|f| f.intercept).unwrap_or(0.0);
        target_power + target_ratio * intercept
    }
}

/// Deterministic 40-hex-char sha1 over the fitted parameters. The same
/// history always produces the same hash, because the fit and this encoding
/// are both pure functions of the stored samples.
fn content_hash(fit: &Fit) -> String {
    let mut hasher = Sha1::new();
    hasher.update(fit.intercept.to_le_bytes());
    for c in fit.coefficients.iter() {
        hasher.update(c.to_le_bytes());
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(pairs: &[(&str, f64)]) -> EventsGroup {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn uninitialized_until_first_fit() {
        let model = PowerModel::new(2000, 4);
        assert_eq!(model.hash(), "uninitialized");
        assert_eq!(model.revision_id(), 0);
        assert!(!model.is_fitted());
    }

    #[test]
    fn predict_fails_before_fit() {
        let model = PowerModel::new(2000, 4);
        let err = model.predict(&events(&[("instructions", 10.0)])).unwrap_err();
        assert_eq!(err, FormulaError::NotFitted { layer_freq: 2000 });
    }

    #[test]
    fn fit_below_min_samples_is_a_no_op() {
        let mut model = PowerModel::new(2000, 4);
        model.store(10.0, &events(&[("e", 1.0)]));
        model.fit(2, 0.0, 125.0);
        assert!(!model.is_fitted());
    }

    #[test]
    fn intercept_forced_to_zero_until_history_is_full() {
        let mut model = PowerModel::new(2000, 4);
        model.store(10.0, &events(&[("e", 1.0)]));
        model.store(20.0, &events(&[("e", 2.0)]));
        model.fit(2, 0.0, 125.0);
        assert!(model.is_fitted());
        assert_eq!(model.intercept(), Some(0.0));
        assert_eq!(model.revision_id(), 1);
    }

    #[test]
    fn out_of_range_intercept_is_discarded() {
        let mut model = PowerModel::new(2000, 2);
        // full history with a huge, clearly-out-of-tdp intercept
        model.store(200.0, &events(&[("e", 0.0)]));
        model.store(200.0, &events(&[("e", 0.0)]));
        model.fit(2, 0.0, 125.0);
        assert!(!model.is_fitted());
        assert_eq!(model.hash(), "uninitialized");
        assert_eq!(model.revision_id(), 0);
    }

    #[test]
    fn hash_is_deterministic_for_same_history() {
        let run = || {
            let mut model = PowerModel::new(2000, 2);
            model.store(10.0, &events(&[("e", 1.0)]));
            model.store(20.0, &events(&[("e", 2.0)]));
            model.fit(2, 0.0, 125.0);
            model.hash().to_string()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn cap_and_intercept_share_are_non_negative_and_bounded() {
        let mut model = PowerModel::new(2000, 2);
        model.store(10.0, &events(&[("e", 1.0)]));
        model.store(20.0, &events(&[("e", 2.0)]));
        model.fit(2, 0.0, 125.0); // intercept forced to 0 here
        let (capped, ratio) = model.cap(30.0, 50.0);
        assert!(capped >= 0.0);
        assert!((0.0..=1.0).contains(&ratio));
        let shared = model.apply_intercept_share(capped, ratio);
        assert!(shared >= 0.0);
    }

    #[test]
    fn cap_with_nonzero_intercept_stays_non_negative_per_target() {
        // intercept=10, raw_global=50, two targets whose raw predictions
        // (30, 40) deliberately sum past raw_global: cap() still keeps each
        // target's own capped power and ratio within bounds.
        let mut model = PowerModel::new(2000, 2);
        model.store(10.0, &events(&[("e", 0.0)]));
        model.store(10.0, &events(&[("e", 0.0)]));
        model.fit(2, 0.0, 125.0);
        assert_eq!(model.intercept(), Some(10.0));

        let (capped_a, ratio_a) = model.cap(30.0, 50.0);
        let (capped_b, ratio_b) = model.cap(40.0, 50.0);
        let final_a = model.apply_intercept_share(capped_a, ratio_a);
        let final_b = model.apply_intercept_share(capped_b, ratio_b);

        for (capped, ratio, final_power) in [(capped_a, ratio_a, final_a), (capped_b, ratio_b, final_b)] {
            assert!(capped >= 0.0);
            assert!((0.0..=1.0).contains(&ratio));
            assert!(final_power >= 0.0);
        }
    }

    #[test]
    fn revision_increments_by_one_iff_fit_accepted() {
        let mut model = PowerModel::new(2000, 2);
        model.store(10.0, &events(&[("e", 1.0)]));
        model.store(20.0, &events(&[("e", 2.0)]));
        let before_hash = model.hash().to_string();
        model.fit(2, 0.0, 125.0);
        assert_ne!(model.hash(), before_hash);
        assert_eq!(model.revision_id(), 1);

        let revision_before_second_fit = model.revision_id();
        model.store(15.0, &events(&[("e", 1.5)]));
        model.fit(2, 0.0, 125.0);
        assert_eq!(model.revision_id(), revision_before_second_fit + 1);
    }
}
