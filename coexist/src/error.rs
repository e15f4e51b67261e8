use crate::dims::{Axis, Cell};

/// Problems found while building a scenario, before any step runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown option '{name}' (known options: {known})")]
    UnknownOption { name: String, known: String },
    #[error("schema version {found} is not supported (expected {expected})")]
    SchemaVersion { expected: u32, found: u32 },
    #[error("failed to parse options: {0}")]
    Parse(String),
    #[error("{what}: expected {expected} entries along the {axis} axis, got {actual}")]
    AxisMismatch {
        what: String,
        axis: Axis,
        expected: usize,
        actual: usize,
    },
    #[error("invalid value for '{option}': {reason}")]
    InvalidValue { option: String, reason: String },
    #[error(
        "contact matrix '{name}' is not symmetric at ({row}, {col}): {value} vs {transposed}"
    )]
    AsymmetricContact {
        name: String,
        row: usize,
        col: usize,
        value: f64,
        transposed: f64,
    },
}

impl ConfigError {
    pub(crate) fn invalid(option: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

/// Ensure `values` has exactly `expected` entries along `axis`.
pub(crate) fn check_len(
    what: &str,
    axis: Axis,
    expected: usize,
    values: &[f64],
) -> Result<(), ConfigError> {
    if values.len() != expected {
        return Err(ConfigError::AxisMismatch {
            what: what.to_string(),
            axis,
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

/// Ensure every entry of `values` is finite and non-negative.
pub(crate) fn check_rates(option: &str, values: &[f64]) -> Result<(), ConfigError> {
    for (i, v) in values.iter().enumerate() {
        if !v.is_finite() || *v < 0.0 {
            return Err(ConfigError::invalid(
                option,
                format!("entry {i} must be finite and >= 0, got {v}"),
            ));
        }
    }
    Ok(())
}

/// Failures of a single run. A run that returns one of these has been aborted;
/// other runs are unaffected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("non-finite {quantity} ({value}) at day {day:.4} in cell {cell}")]
    NonFinite {
        quantity: &'static str,
        value: f64,
        cell: Cell,
        day: f64,
    },
    #[error("negative occupancy {value:e} at day {day:.4} in cell {cell}")]
    NegativeState { value: f64, cell: Cell, day: f64 },
    #[error("model '{model}' produced negative rate {rate:e} from {from} to {to} at day {day:.4}")]
    NegativeRate {
        model: &'static str,
        rate: f64,
        from: Cell,
        to: Cell,
        day: f64,
    },
    #[error("model '{model}' produced a forbidden transition {from} -> {to}: {reason}")]
    ForbiddenTransition {
        model: &'static str,
        from: Cell,
        to: Cell,
        reason: &'static str,
    },
    #[error(
        "testing policy requested {requested:.3} '{test}' tests at day {day:.4}, capacity is {capacity:.3}"
    )]
    CapacityExceeded {
        test: String,
        requested: f64,
        capacity: f64,
        day: f64,
    },
    #[error("step starting at day {day:.4} still went negative after {halvings} halvings (cell {cell}, value {value:e})")]
    StepFailed {
        day: f64,
        halvings: u32,
        cell: Cell,
        value: f64,
    },
    #[error("population drifted from {expected} to {actual} by day {day}")]
    ConservationViolated {
        expected: f64,
        actual: f64,
        day: u32,
    },
    #[error("cannot seed {requested} exposed in age group {age}: only {available} unrestricted susceptibles")]
    InsufficientSusceptibles {
        age: usize,
        requested: f64,
        available: f64,
    },
}
