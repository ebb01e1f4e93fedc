use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

/// Failures surfaced by the simulation core.
#[derive(Debug, Error)]
pub enum SimError {
    /// Malformed input detected at setup time: bad shapes, non-finite values,
    /// out-of-range parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to find the interaction with name '{name}', available interactions: {available:?}")]
    NotFound { name: String, available: Vec<String> },

    /// The ODE integrator reported a negative status. Never retried here.
    #[error("integration failed with status {status}: {reason}")]
    Integration { status: i32, reason: String },

    #[error("non-finite {what} at t = {time}")]
    NonFinite { what: &'static str, time: f64 },

    /// Unit-length deviation above the hard sanity bound.
    #[error("spin length deviation {deviation} exceeds the bound {bound}")]
    NumericalInvariant { deviation: f64, bound: f64 },

    #[error("recorder failed at step {step}: {message}")]
    Recording { step: usize, message: String },

    #[error("checkpoint failed at step {step}: {message}")]
    Checkpoint { step: usize, message: String },
}

impl SimError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        SimError::Configuration(message.into())
    }
}

/// Non-fatal observation made after a committed step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericalWarning {
    #[error("step {step} (t = {time:e}): spin length deviates from 1 by {deviation:e}")]
    UnitLengthDeviation { step: usize, time: f64, deviation: f64 },

    #[error("step {step} (t = {time:e}): effective field is not finite")]
    NonFiniteField { step: usize, time: f64 },
}
