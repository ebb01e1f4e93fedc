use crate::error::{Result, SimError};
use crate::sim::Simulation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaxSettings {
    /// Lower bound on the time advanced per iteration (s).
    pub dt: f64,
    /// Stop once `max |dM/dt|` falls below this.
    pub stopping_dmdt: f64,
    pub max_steps: usize,
    /// Save the magnetization every N iterations.
    pub save_m_steps: Option<usize>,
    /// Save the per-cell `|dM/dt|` map every N iterations.
    pub save_map_steps: Option<usize>,
}

impl Default for RelaxSettings {
    fn default() -> Self {
        Self {
            dt: 1e-12,
            stopping_dmdt: 0.01,
            max_steps: 1000,
            save_m_steps: Some(100),
            save_map_steps: Some(100),
        }
    }
}

impl RelaxSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimError::config(format!(
                "relaxation dt must be positive and finite, got {}",
                self.dt
            )));
        }
        if !(self.stopping_dmdt.is_finite() && self.stopping_dmdt > 0.0) {
            return Err(SimError::config(format!(
                "stopping_dmdt must be positive and finite, got {}",
                self.stopping_dmdt
            )));
        }
        if self.save_m_steps == Some(0) || self.save_map_steps == Some(0) {
            return Err(SimError::config("checkpoint intervals must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelaxState {
    Stepping,
    Converged,
    Exhausted,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelaxReport {
    pub state: RelaxState,
    pub iterations: usize,
    pub max_dmdt: f64,
    pub t: f64,
    pub step: usize,
}

/// Destination for relaxation checkpoints.
pub trait CheckpointSink {
    fn save_state(&mut self, step: usize, t: f64, spin: &[f64]) -> anyhow::Result<()>;

    fn save_scalar_map(&mut self, step: usize, t: f64, name: &str, map: &[f64])
        -> anyhow::Result<()>;
}

/// Name under which the per-cell rate map is saved.
pub const DMDT_MAP: &str = "dmdt";

impl Simulation {
    /// Steps the dynamics until `max |dM/dt|` drops below `stopping_dmdt` or
    /// `max_steps + 1` iterations have run.
    ///
    /// Each iteration advances by `max(dt, current integrator step)`. With a
    /// sink, checkpoints are written every `save_*_steps` iterations and once
    /// more on exit.
    pub fn relax(
        &mut self,
        settings: &RelaxSettings,
        mut sink: Option<&mut dyn CheckpointSink>,
    ) -> Result<RelaxReport> {
        settings.validate()?;
        let mut state = RelaxState::Stepping;
        let mut iterations = 0;
        let mut max_dmdt = f64::NAN;
        let mut rates = Vec::new();

        for i in 0..=settings.max_steps {
            let increment = settings.dt.max(self.current_step_size());
            self.run_until(self.t() + increment)?;
            iterations = i + 1;
            (max_dmdt, rates) = self.state().max_dm_dt(increment);

            if let Some(sink) = sink.as_deref_mut() {
                let due = |every: Option<usize>| every.map_or(false, |every| i % every == 0);
                self.checkpoint(
                    sink,
                    due(settings.save_m_steps),
                    due(settings.save_map_steps),
                    &rates,
                )?;
            }

            log::info!(
                "relax step={}, time={:e}, max_dmdt={:e}, ode_step={:e}",
                self.step(),
                self.t(),
                max_dmdt,
                self.current_step_size()
            );
            if max_dmdt < settings.stopping_dmdt {
                state = RelaxState::Converged;
                break;
            }
        }
        if state == RelaxState::Stepping {
            state = RelaxState::Exhausted;
        }

        if let Some(sink) = sink {
            self.checkpoint(
                sink,
                settings.save_m_steps.is_some(),
                settings.save_map_steps.is_some(),
                &rates,
            )?;
        }

        log::info!(
            "relaxation {:?} after {} iterations at t={:e} (max_dmdt={:e})",
            state,
            iterations,
            self.t(),
            max_dmdt
        );
        Ok(RelaxReport {
            state,
            iterations,
            max_dmdt,
            t: self.t(),
            step: self.step(),
        })
    }

    fn checkpoint(
        &self,
        sink: &mut dyn CheckpointSink,
        save_state: bool,
        save_map: bool,
        rates: &[f64],
    ) -> Result<()> {
        let failed = |err: anyhow::Error| SimError::Checkpoint {
            step: self.step(),
            message: format!("{err:#}"),
        };
        if save_state {
            sink.save_state(self.step(), self.t(), self.spin())
                .map_err(failed)?;
        }
        if save_map {
            sink.save_scalar_map(self.step(), self.t(), DMDT_MAP, rates)
                .map_err(failed)?;
        }
        Ok(())
    }
}
