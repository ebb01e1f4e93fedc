use crate::effective_field::ForceAggregator;
use crate::error::SimError;
use crate::laplace::LaplaceOperator;
use crate::mesh::Mesh;
use crate::traits::DynamicalSystem;
use nalgebra::Vector3;

/// Material and dynamics parameters of the extended LLG equation.
#[derive(Debug, Clone)]
pub struct LlgParams {
    /// Gyromagnetic ratio (m/(A·s)).
    pub gamma: f64,
    /// Nonlocal (exchange) relaxation constant multiplying the Laplacian of H.
    pub beta: f64,
    /// Local damping per cell.
    pub alpha: Vec<f64>,
    pub pins: Vec<bool>,
    pub do_precession: bool,
    /// Coefficient of the `(1 - |m|^2) m` length-restoring term. `None` uses
    /// `6 |dm/dt|` per cell.
    pub norm_correction: Option<f64>,
}

impl LlgParams {
    pub fn new(n: usize, gamma: f64, alpha: f64) -> Self {
        Self {
            gamma,
            beta: 0.0,
            alpha: vec![alpha; n],
            pins: vec![false; n],
            do_precession: true,
            norm_correction: None,
        }
    }
}

/// Extended LLG (Baryakhtar) right-hand side for block-layout arrays.
///
/// Per cell, with `g = gamma / (1 + alpha^2)` and `P v = v - (m·v) m`:
///
/// ```text
/// dm/dt = -g m × H  +  g P(alpha H - beta ΔH)  +  c (1 - |m|^2) m
/// ```
///
/// The precession term is dropped when `do_precession` is false; pinned cells get zero.
pub fn llg_rhs_baryakhtar(
    dm_dt: &mut [f64],
    m: &[f64],
    h: &[f64],
    delta_h: &[f64],
    params: &LlgParams,
) {
    let n = params.alpha.len();
    for id in 0..n {
        let (i, j, k) = (id, id + n, id + 2 * n);
        if params.pins[id] {
            dm_dt[i] = 0.0;
            dm_dt[j] = 0.0;
            dm_dt[k] = 0.0;
            continue;
        }

        let alpha = params.alpha[id];
        let g = params.gamma / (1.0 + alpha * alpha);
        let mv = Vector3::new(m[i], m[j], m[k]);
        let hv = Vector3::new(h[i], h[j], h[k]);
        let dh = Vector3::new(delta_h[i], delta_h[j], delta_h[k]);

        let mut rate = Vector3::zeros();
        if params.do_precession {
            rate -= g * mv.cross(&hv);
        }

        let hp = alpha * hv - params.beta * dh;
        rate += g * (hp - mv.dot(&hp) * mv);

        let c = params.norm_correction.unwrap_or_else(|| 6.0 * rate.norm());
        rate += c * (1.0 - mv.norm_squared()) * mv;

        dm_dt[i] = rate.x;
        dm_dt[j] = rate.y;
        dm_dt[k] = rate.z;
    }
}

/// Assembles dm/dt for the integrator: syncs the spin copy, sums the force
/// terms, applies the Laplacian and evaluates the torque kernel.
pub struct RhsAssembler {
    n: usize,
    forces: ForceAggregator,
    laplace: LaplaceOperator,
    params: LlgParams,
    spin: Vec<f64>,
    field: Vec<f64>,
    delta_h: Vec<f64>,
}

impl RhsAssembler {
    pub fn new(mesh: &Mesh, params: LlgParams) -> Self {
        let n = mesh.n_cells();
        Self {
            n,
            forces: ForceAggregator::new(),
            laplace: LaplaceOperator::new(mesh),
            params,
            spin: vec![0.0; 3 * n],
            field: vec![0.0; 3 * n],
            delta_h: vec![0.0; 3 * n],
        }
    }

    pub fn forces(&self) -> &ForceAggregator {
        &self.forces
    }

    pub fn forces_mut(&mut self) -> &mut ForceAggregator {
        &mut self.forces
    }

    pub fn params(&self) -> &LlgParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut LlgParams {
        &mut self.params
    }

    pub fn effective_field(&self) -> &[f64] {
        &self.field
    }

    pub fn relaxation_field(&self) -> &[f64] {
        &self.delta_h
    }

    /// Recomputes the effective field for `spin` outside of a solve.
    /// Returns false if any component is non-finite.
    pub fn compute_effective_field(&mut self, t: f64, spin: &[f64]) -> bool {
        self.forces.compute_effective_field(t, spin, &mut self.field);
        self.field.iter().all(|v| v.is_finite())
    }
}

impl DynamicalSystem<f64> for RhsAssembler {
    fn dimension(&self) -> usize {
        3 * self.n
    }

    fn apply(&mut self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), SimError> {
        if y.len() != 3 * self.n || out.len() != 3 * self.n {
            return Err(SimError::config(format!(
                "rhs expects {} values, got state {} and output {}",
                3 * self.n,
                y.len(),
                out.len()
            )));
        }
        self.spin.copy_from_slice(y);

        self.forces
            .compute_effective_field(t, &self.spin, &mut self.field);
        if self.field.iter().any(|v| !v.is_finite()) {
            return Err(SimError::NonFinite {
                what: "effective field",
                time: t,
            });
        }

        self.laplace.apply(&self.field, &mut self.delta_h);
        if self.delta_h.iter().any(|v| !v.is_finite()) {
            return Err(SimError::NonFinite {
                what: "relaxation field",
                time: t,
            });
        }

        llg_rhs_baryakhtar(out, &self.spin, &self.field, &self.delta_h, &self.params);
        if out.iter().any(|v| !v.is_finite()) {
            return Err(SimError::NonFinite {
                what: "dm/dt",
                time: t,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{llg_rhs_baryakhtar, LlgParams, RhsAssembler};
    use crate::constants::Constants;
    use crate::effective_field::{SetupContext, Zeeman};
    use crate::error::SimError;
    use crate::mesh::Mesh;
    use crate::traits::DynamicalSystem;

    fn single(alpha: f64) -> LlgParams {
        LlgParams::new(1, 2.0, alpha)
    }

    #[test]
    fn precession_rotates_about_the_field() {
        let mut params = single(0.0);
        params.norm_correction = Some(0.0);
        let mut out = [0.0; 3];
        llg_rhs_baryakhtar(&mut out, &[1.0, 0.0, 0.0], &[0.0, 0.0, 3.0], &[0.0; 3], &params);
        // -gamma m × H = -2 (x × 3z) = 6 y
        assert_eq!(out, [0.0, 6.0, 0.0]);
    }

    #[test]
    fn damping_pulls_towards_the_field_with_llg_scaling() {
        let alpha = 0.5;
        let mut params = single(alpha);
        params.do_precession = false;
        let mut out = [0.0; 3];
        llg_rhs_baryakhtar(&mut out, &[1.0, 0.0, 0.0], &[0.0, 0.0, 3.0], &[0.0; 3], &params);
        let g = 2.0 / (1.0 + alpha * alpha);
        assert!(out[0].abs() < 1e-15);
        assert!(out[1].abs() < 1e-15);
        assert!((out[2] - g * alpha * 3.0).abs() < 1e-12);
    }

    #[test]
    fn nonlocal_term_uses_the_perpendicular_laplacian() {
        let mut params = single(0.0);
        params.do_precession = false;
        params.beta = 0.25;
        let mut out = [0.0; 3];
        // the parallel part of delta_h is projected out
        llg_rhs_baryakhtar(&mut out, &[0.0, 0.0, 1.0], &[0.0; 3], &[4.0, 0.0, 8.0], &params);
        assert!((out[0] + 2.0 * 0.25 * 4.0).abs() < 1e-12);
        assert_eq!(out[1], 0.0);
        assert!(out[2].abs() < 1e-12);
    }

    #[test]
    fn length_correction_acts_along_m() {
        let mut params = single(0.0);
        params.do_precession = false;
        params.norm_correction = Some(1.0);
        let mut out = [0.0; 3];
        llg_rhs_baryakhtar(&mut out, &[0.0, 0.0, 2.0], &[0.0; 3], &[0.0; 3], &params);
        // (1 - 4) * 2 = -6 along z
        assert_eq!(out, [0.0, 0.0, -6.0]);
    }

    #[test]
    fn pinned_cells_do_not_move() {
        let mut params = LlgParams::new(2, 2.0, 0.1);
        params.pins[1] = true;
        let m = [1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let h = [0.0, 0.0, 0.0, 0.0, 5.0, 5.0];
        let mut out = [f64::NAN; 6];
        llg_rhs_baryakhtar(&mut out, &m, &h, &[0.0; 6], &params);
        assert!(out[4] > 0.0);
        assert_eq!([out[1], out[3], out[5]], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn assembler_syncs_state_and_rejects_non_finite_fields() {
        let mesh = Mesh::new((1, 1, 1), (1.0, 1.0, 1.0), 1e-9).expect("mesh");
        let constants = Constants::default();
        let spin = vec![1.0, 0.0, 0.0];
        let ms = vec![1e6];
        let ctx = SetupContext {
            mesh: &mesh,
            spin: &spin,
            ms: &ms,
            constants: &constants,
        };
        let mut rhs = RhsAssembler::new(&mesh, LlgParams::new(1, 2.21e5, 0.1));
        rhs.forces_mut()
            .add(Box::new(Zeeman::new([0.0, 0.0, 1e5])), &ctx)
            .expect("add");

        let mut out = [0.0; 3];
        rhs.apply(0.0, &[0.0, 1.0, 0.0], &mut out).expect("rhs");
        assert_eq!(rhs.effective_field(), &[0.0, 0.0, 1e5]);
        assert_eq!(rhs.relaxation_field(), &[0.0, 0.0, 0.0]);
        // m along y precesses towards -x
        assert!(out[0] < 0.0);

        let mut broken = RhsAssembler::new(&mesh, LlgParams::new(1, 2.21e5, 0.1));
        broken
            .forces_mut()
            .add(Box::new(Zeeman::time_dependent([0.0, 0.0, 1.0], |_| f64::NAN)), &ctx)
            .expect("add");
        match broken.apply(0.0, &[1.0, 0.0, 0.0], &mut out) {
            Err(SimError::NonFinite { what, .. }) => assert_eq!(what, "effective field"),
            other => panic!("expected a non-finite error, got {other:?}"),
        }
    }
}
