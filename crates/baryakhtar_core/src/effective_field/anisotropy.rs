use super::{ForceTerm, SetupContext, TermBase};
use crate::error::{Result, SimError};
use crate::source::CellSource;

/// Uniaxial anisotropy with energy density `Ku [1 - (m·u)^2]`.
///
/// Field: `H = 2 Ku / (mu_0 Ms) (m·u) u`, zero in vacuum cells.
pub struct UniaxialAnisotropy {
    name: String,
    ku: CellSource<f64>,
    axis: CellSource<[f64; 3]>,
    ku_cells: Vec<f64>,
    axis_cells: Vec<[f64; 3]>,
    base: TermBase,
}

impl UniaxialAnisotropy {
    pub fn new(ku: CellSource<f64>, axis: CellSource<[f64; 3]>) -> Self {
        Self {
            name: "anis".to_string(),
            ku,
            axis,
            ku_cells: Vec::new(),
            axis_cells: Vec::new(),
            base: TermBase::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn m_dot_u(&self, spin: &[f64], idx: usize) -> f64 {
        let n = self.base.n;
        let u = self.axis_cells[idx];
        spin[idx] * u[0] + spin[n + idx] * u[1] + spin[2 * n + idx] * u[2]
    }
}

impl ForceTerm for UniaxialAnisotropy {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn setup(&mut self, ctx: &SetupContext<'_>) -> Result<()> {
        let ku = self.ku.resolve(ctx.mesh)?;
        if let Some(idx) = ku.iter().position(|v| !v.is_finite()) {
            return Err(SimError::config(format!(
                "anisotropy constant at cell {idx} is not finite"
            )));
        }
        let mut axis = self.axis.resolve(ctx.mesh)?;
        for (idx, u) in axis.iter_mut().enumerate() {
            if u.iter().any(|c| !c.is_finite()) {
                return Err(SimError::config(format!(
                    "anisotropy axis at cell {idx} is not finite"
                )));
            }
            let norm = (u[0] * u[0] + u[1] * u[1] + u[2] * u[2]).sqrt();
            if norm > 0.0 {
                *u = [u[0] / norm, u[1] / norm, u[2] / norm];
            }
        }
        self.base.setup(ctx)?;
        self.ku_cells = ku;
        self.axis_cells = axis;
        Ok(())
    }

    fn compute_field(&mut self, _t: f64, spin: &[f64]) -> &[f64] {
        let n = self.base.n;
        for idx in 0..n {
            let coeff = 2.0 * self.ku_cells[idx] * self.base.ms_inv[idx] / self.base.mu_0;
            let scale = coeff * self.m_dot_u(spin, idx);
            let u = self.axis_cells[idx];
            self.base.field[idx] = scale * u[0];
            self.base.field[n + idx] = scale * u[1];
            self.base.field[2 * n + idx] = scale * u[2];
        }
        &self.base.field
    }

    fn compute_energy(&self, spin: &[f64]) -> f64 {
        let mut sum = 0.0;
        for idx in (0..self.base.n).filter(|&idx| self.base.ms[idx] != 0.0) {
            let mu = self.m_dot_u(spin, idx);
            sum += self.ku_cells[idx] * (1.0 - mu * mu);
        }
        sum * self.base.volume
    }

    fn average_field(&self) -> [f64; 3] {
        self.base.average_field()
    }
}
