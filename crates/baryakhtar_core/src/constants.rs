use serde::{Deserialize, Serialize};

/// Physical constants shared read-only by the simulation and its force terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constants {
    /// Vacuum permeability (T·m/A).
    pub mu_0: f64,
    /// Gyromagnetic ratio times mu_0 for a free electron (m/(A·s)). Seeds the
    /// default `SimOptions::gamma`.
    pub gamma: f64,
}

impl Constants {
    pub const SI: Constants = Constants {
        mu_0: 4.0 * std::f64::consts::PI * 1e-7,
        gamma: 2.21e5,
    };
}

impl Default for Constants {
    fn default() -> Self {
        Self::SI
    }
}
