use crate::constants::Constants;
use crate::error::{Result, SimError};
use crate::mesh::Mesh;
use crate::relax::RelaxSettings;
use crate::solvers::{IntegratorKind, SolverSettings};
use serde::{Deserialize, Serialize};

/// Dynamics and solver options of a simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    pub rtol: f64,
    pub atol: f64,
    /// Gyromagnetic ratio (m/(A·s)).
    pub gamma: f64,
    pub alpha: f64,
    pub beta: f64,
    pub do_precession: bool,
    /// Fixed coefficient of the length-restoring term; adaptive when `None`.
    pub norm_correction: Option<f64>,
    pub integrator: IntegratorKind,
    pub max_solver_steps: usize,
    /// Internal step of the fixed-step integrator (s).
    pub rk4_step: f64,
    /// Unit-length deviation above which a warning is emitted.
    pub unit_length_warning: f64,
    /// Unit-length deviation above which stepping fails.
    pub unit_length_bound: f64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-12,
            gamma: Constants::SI.gamma,
            alpha: 0.1,
            beta: 0.0,
            do_precession: true,
            norm_correction: None,
            integrator: IntegratorKind::Tsit5,
            max_solver_steps: 100_000,
            rk4_step: 1e-14,
            unit_length_warning: 1e-6,
            unit_length_bound: 0.1,
        }
    }
}

impl SimOptions {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("rtol", self.rtol),
            ("atol", self.atol),
            ("rk4_step", self.rk4_step),
            ("unit_length_warning", self.unit_length_warning),
            ("unit_length_bound", self.unit_length_bound),
        ];
        for (label, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::config(format!(
                    "{label} must be positive and finite, got {value}"
                )));
            }
        }
        if !self.gamma.is_finite() {
            return Err(SimError::config("gamma must be finite"));
        }
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(SimError::config(format!(
                "alpha must be non-negative and finite, got {}",
                self.alpha
            )));
        }
        if !self.beta.is_finite() {
            return Err(SimError::config("beta must be finite"));
        }
        if let Some(c) = self.norm_correction {
            if !c.is_finite() {
                return Err(SimError::config("norm_correction must be finite"));
            }
        }
        if self.max_solver_steps == 0 {
            return Err(SimError::config("max_solver_steps must be at least 1"));
        }
        if self.unit_length_warning > self.unit_length_bound {
            return Err(SimError::config(format!(
                "unit_length_warning ({}) exceeds unit_length_bound ({})",
                self.unit_length_warning, self.unit_length_bound
            )));
        }
        Ok(())
    }

    pub fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            rtol: self.rtol,
            atol: self.atol,
            max_steps: self.max_solver_steps,
            fixed_step: self.rk4_step,
        }
    }
}

/// A complete run description, loadable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub mesh: Mesh,
    /// Uniform saturation magnetisation (A/m).
    pub ms: f64,
    #[serde(default)]
    pub options: SimOptions,
    #[serde(default)]
    pub relax: RelaxSettings,
}

fn default_name() -> String {
    "unnamed".to_string()
}

impl SimConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: SimConfig = serde_json::from_str(text)
            .map_err(|e| SimError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SimError::config(format!("cannot serialize configuration: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        self.mesh.validate()?;
        if !(self.ms.is_finite() && self.ms >= 0.0) {
            return Err(SimError::config(format!(
                "Ms must be non-negative and finite, got {}",
                self.ms
            )));
        }
        self.options.validate()?;
        self.relax.validate()
    }
}
