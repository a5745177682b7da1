use thiserror::Error;

/// Errors raised by the formula core.
///
/// `MissingIndex` and `NotFitted` are expected, routine occurrences (a
/// straggler report with a different socket id, a model that hasn't seen
/// enough samples yet) and are handled by the engine itself; they are public
/// so that callers driving the engine in unusual ways (tests, benches) can
/// match on them too.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    /// The CPU topology's ratios are inconsistent (`min > base`, `base > max`)
    /// or a value is not strictly positive. Fatal: raised only at construction.
    #[error("invalid CPU topology: {0}")]
    InvalidTopology(String),

    /// A required (socket, group, event) index is absent from an input report.
    /// Aborts processing of the current tick only.
    #[error("missing index for {entity_type} '{entity_name}' in group '{group_name}'")]
    MissingIndex {
        entity_name: String,
        group_name: String,
        entity_type: String,
    },

    /// The model was consulted before completing its first successful fit.
    /// Caught internally by the engine, which trains the model and moves on.
    #[error("power model for frequency layer {layer_freq} has not been fitted yet")]
    NotFitted { layer_freq: u32 },

    /// A counter value was non-finite or negative; the sample is dropped.
    #[error("invalid sample for event '{event_name}': {value}")]
    InvalidSample { event_name: String, value: f64 },
}

impl FormulaError {
    pub fn missing_index(entity_name: impl Into<String>, group_name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        FormulaError::MissingIndex {
            entity_name: entity_name.into(),
            group_name: group_name.into(),
            entity_type: entity_type.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FormulaError>;
