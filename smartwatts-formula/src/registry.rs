use std::collections::BTreeMap;

use crate::model::PowerModel;
use crate::topology::CpuTopology;

/// One power model per frequency layer supported by the CPU topology.
/// `BTreeMap` keeps the layers in ascending order, which is exactly what
/// nearest-layer lookup needs.
#[derive(Debug)]
pub struct ModelRegistry {
    models: BTreeMap<u32, PowerModel>,
}

impl ModelRegistry {
    pub fn new(topology: &CpuTopology, history_window_size: usize) -> ModelRegistry {
        let models = topology
            .supported_frequencies()
            .into_iter()
            .map(|freq| (freq, PowerModel::new(freq, history_window_size)))
            .collect();
        ModelRegistry { models }
    }

    /// The layer whose frequency is the largest supported frequency `<= frequency`,
    /// or the smallest supported frequency if `frequency` is below it. Panics
    /// if the registry has no layers at all, which only happens for a
    /// topology with zero supported frequencies (impossible: `CpuTopology`
    /// always has at least one layer, `min_frequency`).
    fn layer_for(&self, frequency_mhz: u32) -> u32 {
        let mut last = *self.models.keys().next().expect("registry has at least one frequency layer");
        for &layer in self.models.keys() {
            if layer <= frequency_mhz {
                last = layer;
            } else {
                break;
            }
        }
        last
    }

    pub fn model_for(&mut self, frequency_mhz: u32) -> &mut PowerModel {
        let layer = self.layer_for(frequency_mhz);
        self.models.get_mut(&layer).expect("layer_for returns an existing key")
    }

    pub fn layers(&self) -> impl Iterator<Item = u32> + '_ {
        self.models.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModelRegistry {
        // layers {1900, 2000, 2100}, per spec.md §8 scenario 6
        let topo = CpuTopology::new(125.0, 100, 1900, 2000, 2100).unwrap();
        ModelRegistry::new(&topo, 4)
    }

    #[test]
    fn picks_nearest_layer_at_or_below_frequency() {
        let mut r = registry();
        assert_eq!(r.model_for(2050).frequency_mhz(), 2000);
        assert_eq!(r.model_for(2100).frequency_mhz(), 2100);
    }

    #[test]
    fn clamps_to_minimum_layer_when_below_range() {
        let mut r = registry();
        assert_eq!(r.model_for(1800).frequency_mhz(), 1900);
    }

    #[test]
    fn exact_layer_match() {
        let mut r = registry();
        assert_eq!(r.model_for(1900).frequency_mhz(), 1900);
    }
}
