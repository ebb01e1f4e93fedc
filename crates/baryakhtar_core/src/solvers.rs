use crate::traits::{DynamicalSystem, OdeIntegrator, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons an integrator gives up. Each maps onto a negative status code.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverFailure {
    #[error("exceeded {max_steps} internal steps before reaching t = {target:e}")]
    TooMuchWork { max_steps: usize, target: f64 },
    #[error("step size {step:e} underflowed at t = {time:e}")]
    StepSizeUnderflow { step: f64, time: f64 },
    #[error("solution became non-finite at t = {time:e}")]
    NonFiniteSolution { time: f64 },
    #[error("right-hand side failed: {0}")]
    RhsFailed(String),
    #[error("illegal input: {0}")]
    IllegalInput(String),
}

impl SolverFailure {
    /// Negative status code in the usual stiff-solver convention.
    pub fn status(&self) -> i32 {
        match self {
            SolverFailure::TooMuchWork { .. } => -1,
            SolverFailure::StepSizeUnderflow { .. } => -3,
            SolverFailure::NonFiniteSolution { .. } => -4,
            SolverFailure::RhsFailed(_) => -8,
            SolverFailure::IllegalInput(_) => -22,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverStats {
    pub steps: usize,
    pub rejected_steps: usize,
    pub rhs_evaluations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegratorKind {
    /// Adaptive Tsitouras 5(4) with embedded error control.
    Tsit5,
    /// Classic RK4 with a fixed internal step.
    Rk4,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverSettings {
    pub rtol: f64,
    pub atol: f64,
    /// Internal step budget for a single `run_until` call.
    pub max_steps: usize,
    /// Internal step of the fixed-step integrator.
    pub fixed_step: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-12,
            max_steps: 100_000,
            fixed_step: 1e-14,
        }
    }
}

impl IntegratorKind {
    pub fn build(self, settings: &SolverSettings, y0: &[f64], t0: f64) -> Integrator {
        match self {
            IntegratorKind::Tsit5 => Integrator::Tsit5(Tsit5Integrator::new(
                y0,
                t0,
                settings.rtol,
                settings.atol,
                settings.max_steps,
            )),
            IntegratorKind::Rk4 => Integrator::Rk4(Rk4Integrator::new(
                y0,
                t0,
                settings.fixed_step,
                settings.max_steps,
            )),
        }
    }
}

/// Integrator selected at runtime.
pub enum Integrator {
    Tsit5(Tsit5Integrator<f64>),
    Rk4(Rk4Integrator<f64>),
}

impl OdeIntegrator<f64> for Integrator {
    fn set_initial_value(&mut self, y: &[f64], t: f64) {
        match self {
            Integrator::Tsit5(s) => s.set_initial_value(y, t),
            Integrator::Rk4(s) => s.set_initial_value(y, t),
        }
    }

    fn run_until<S: DynamicalSystem<f64>>(
        &mut self,
        system: &mut S,
        target: f64,
    ) -> Result<(), SolverFailure> {
        match self {
            Integrator::Tsit5(s) => s.run_until(system, target),
            Integrator::Rk4(s) => s.run_until(system, target),
        }
    }

    fn solution(&self) -> &[f64] {
        match self {
            Integrator::Tsit5(s) => s.solution(),
            Integrator::Rk4(s) => s.solution(),
        }
    }

    fn time(&self) -> f64 {
        match self {
            Integrator::Tsit5(s) => s.time(),
            Integrator::Rk4(s) => s.time(),
        }
    }

    fn current_step_size(&self) -> f64 {
        match self {
            Integrator::Tsit5(s) => s.current_step_size(),
            Integrator::Rk4(s) => s.current_step_size(),
        }
    }

    fn stats(&self) -> SolverStats {
        match self {
            Integrator::Tsit5(s) => s.stats(),
            Integrator::Rk4(s) => s.stats(),
        }
    }
}

#[inline]
fn lit<T: Scalar>(v: f64) -> T {
    T::from_f64(v).unwrap_or_else(T::nan)
}

#[inline]
fn as_f64<T: Scalar>(v: T) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

fn check_target<T: Scalar>(
    t: T,
    target: T,
    dim: usize,
    system_dim: usize,
) -> Result<(), SolverFailure> {
    if system_dim != dim {
        return Err(SolverFailure::IllegalInput(format!(
            "system dimension {} does not match solution length {}",
            system_dim, dim
        )));
    }
    if !target.is_finite() {
        return Err(SolverFailure::IllegalInput("target time is not finite".to_string()));
    }
    if target < t {
        return Err(SolverFailure::IllegalInput(format!(
            "target time {:e} lies before the current time {:e}",
            as_f64(target),
            as_f64(t)
        )));
    }
    Ok(())
}

/// Classic Runge-Kutta 4th order, advancing in equal substeps no larger than `step`.
pub struct Rk4Integrator<T: Scalar> {
    step: T,
    max_steps: usize,
    y: Vec<T>,
    t: T,
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
    stats: SolverStats,
}

impl<T: Scalar> Rk4Integrator<T> {
    pub fn new(y0: &[T], t0: T, step: T, max_steps: usize) -> Self {
        let dim = y0.len();
        let z = T::zero();
        Self {
            step,
            max_steps,
            y: y0.to_vec(),
            t: t0,
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
            stats: SolverStats::default(),
        }
    }

    fn advance<S: DynamicalSystem<T>>(&mut self, system: &mut S, dt: T) -> Result<(), SolverFailure> {
        let half = lit::<T>(0.5);
        let sixth = lit::<T>(1.0 / 6.0);
        let two = lit::<T>(2.0);
        let t0 = self.t;
        let rhs = |e: crate::error::SimError| SolverFailure::RhsFailed(e.to_string());

        // k1 = f(t, y)
        system.apply(t0, &self.y, &mut self.k1).map_err(rhs)?;

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..self.y.len() {
            self.tmp[i] = self.y[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2).map_err(rhs)?;

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..self.y.len() {
            self.tmp[i] = self.y[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3).map_err(rhs)?;

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..self.y.len() {
            self.tmp[i] = self.y[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4).map_err(rhs)?;
        self.stats.rhs_evaluations += 4;

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..self.y.len() {
            self.tmp[i] = self.y[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }
        if self.tmp.iter().any(|v| !v.is_finite()) {
            return Err(SolverFailure::NonFiniteSolution {
                time: as_f64(t0 + dt),
            });
        }
        std::mem::swap(&mut self.y, &mut self.tmp);
        self.t = t0 + dt;
        self.stats.steps += 1;
        Ok(())
    }
}

impl<T: Scalar> OdeIntegrator<T> for Rk4Integrator<T> {
    fn set_initial_value(&mut self, y: &[T], t: T) {
        let dim = y.len();
        self.y = y.to_vec();
        self.t = t;
        for buf in [&mut self.k1, &mut self.k2, &mut self.k3, &mut self.k4, &mut self.tmp] {
            buf.resize(dim, T::zero());
        }
    }

    fn run_until<S: DynamicalSystem<T>>(
        &mut self,
        system: &mut S,
        target: T,
    ) -> Result<(), SolverFailure> {
        check_target(self.t, target, self.y.len(), system.dimension())?;
        if !(self.step > T::zero()) {
            return Err(SolverFailure::IllegalInput("fixed step must be positive".to_string()));
        }
        let span = target - self.t;
        if span <= T::zero() {
            return Ok(());
        }
        let substeps = (span / self.step).ceil().to_usize().unwrap_or(usize::MAX).max(1);
        if substeps > self.max_steps {
            return Err(SolverFailure::TooMuchWork {
                max_steps: self.max_steps,
                target: as_f64(target),
            });
        }
        let dt = span / lit::<T>(substeps as f64);
        for _ in 0..substeps {
            self.advance(system, dt)?;
        }
        // land exactly on the target regardless of rounding in the substeps
        self.t = target;
        Ok(())
    }

    fn solution(&self) -> &[T] {
        &self.y
    }

    fn time(&self) -> T {
        self.t
    }

    fn current_step_size(&self) -> T {
        self.step
    }

    fn stats(&self) -> SolverStats {
        self.stats
    }
}

/// Tsitouras 5/4 integrator with embedded error estimate and step-size control.
///
/// Steps are clipped so that `run_until` lands exactly on the target; a clipped
/// step never shrinks the step size proposed for the next call.
pub struct Tsit5Integrator<T: Scalar> {
    rtol: T,
    atol: T,
    max_steps: usize,
    y: Vec<T>,
    t: T,
    h: T,
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    k7: Vec<T>,
    tmp: Vec<T>,
    y_new: Vec<T>,
    stats: SolverStats,
}

impl<T: Scalar> Tsit5Integrator<T> {
    const SAFETY: f64 = 0.9;
    const FAC_MIN: f64 = 0.2;
    const FAC_MAX: f64 = 10.0;

    pub fn new(y0: &[T], t0: T, rtol: T, atol: T, max_steps: usize) -> Self {
        let dim = y0.len();
        let z = T::zero();
        Self {
            rtol,
            atol,
            max_steps,
            y: y0.to_vec(),
            t: t0,
            h: z,
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            k7: vec![z; dim],
            tmp: vec![z; dim],
            y_new: vec![z; dim],
            stats: SolverStats::default(),
        }
    }

    fn weight(&self, a: T, b: T) -> T {
        self.atol + self.rtol * a.abs().max(b.abs())
    }

    /// Starting step from the scaled norms of y and f(t0, y), capped by the span.
    fn initial_step(&self, span: T) -> T {
        let n = lit::<T>(self.y.len().max(1) as f64);
        let mut d0 = T::zero();
        let mut d1 = T::zero();
        for i in 0..self.y.len() {
            let sc = self.weight(self.y[i], self.y[i]);
            d0 = d0 + (self.y[i] / sc).powi(2);
            d1 = d1 + (self.k1[i] / sc).powi(2);
        }
        let d0 = (d0 / n).sqrt();
        let d1 = (d1 / n).sqrt();
        let tiny = lit::<T>(1e-5);
        let h0 = if d0 < tiny || d1 < tiny || !d1.is_finite() {
            span * lit::<T>(1e-3)
        } else {
            lit::<T>(0.01) * d0 / d1
        };
        h0.min(span)
    }

    /// Computes stages k2..k7 and the candidate solution for a step of size `dt`
    /// starting from `(self.t, self.y)` with `k1` already evaluated.
    fn attempt<S: DynamicalSystem<T>>(&mut self, system: &mut S, dt: T) -> Result<(), SolverFailure> {
        let t0 = self.t;
        let rhs = |e: crate::error::SimError| SolverFailure::RhsFailed(e.to_string());

        // Tsit5 Coefficients
        let c2 = lit::<T>(0.161);
        let c3 = lit::<T>(0.327);
        let c4 = lit::<T>(0.9);
        let c5 = lit::<T>(0.9800255409045097);

        let a21 = lit::<T>(0.161);

        let a31 = lit::<T>(-0.008480655492356989);
        let a32 = lit::<T>(0.335480655492357);

        let a41 = lit::<T>(2.897153057105493);
        let a42 = lit::<T>(-6.359448489975075);
        let a43 = lit::<T>(4.3622954328695815);

        let a51 = lit::<T>(5.325864828439257);
        let a52 = lit::<T>(-11.748883564062828);
        let a53 = lit::<T>(7.4955393428898365);
        let a54 = lit::<T>(-0.09249506636175525);

        let a61 = lit::<T>(5.86145544294642);
        let a62 = lit::<T>(-12.92096931784711);
        let a63 = lit::<T>(8.159367898576159);
        let a64 = lit::<T>(-0.071584973281401);
        let a65 = lit::<T>(-0.028269050394068383);

        // b coefficients (5th order), also row 7 of the tableau
        let b1 = lit::<T>(0.09646076681806523);
        let b2 = lit::<T>(0.01);
        let b3 = lit::<T>(0.4798896504144996);
        let b4 = lit::<T>(1.379008574103742);
        let b5 = lit::<T>(-3.290069515436081);
        let b6 = lit::<T>(2.324710524099774);

        let y = &self.y;

        for i in 0..y.len() {
            self.tmp[i] = y[i] + dt * (a21 * self.k1[i]);
        }
        system.apply(t0 + c2 * dt, &self.tmp, &mut self.k2).map_err(rhs)?;

        for i in 0..y.len() {
            self.tmp[i] = y[i] + dt * (a31 * self.k1[i] + a32 * self.k2[i]);
        }
        system.apply(t0 + c3 * dt, &self.tmp, &mut self.k3).map_err(rhs)?;

        for i in 0..y.len() {
            self.tmp[i] = y[i] + dt * (a41 * self.k1[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        system.apply(t0 + c4 * dt, &self.tmp, &mut self.k4).map_err(rhs)?;

        for i in 0..y.len() {
            self.tmp[i] = y[i]
                + dt * (a51 * self.k1[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        system.apply(t0 + c5 * dt, &self.tmp, &mut self.k5).map_err(rhs)?;

        for i in 0..y.len() {
            self.tmp[i] = y[i]
                + dt * (a61 * self.k1[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k6).map_err(rhs)?;

        for i in 0..y.len() {
            self.y_new[i] = y[i]
                + dt * (b1 * self.k1[i]
                    + b2 * self.k2[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }
        // FSAL stage, reused as k1 of the next step when accepted
        system.apply(t0 + dt, &self.y_new, &mut self.k7).map_err(rhs)?;
        self.stats.rhs_evaluations += 6;
        Ok(())
    }

    /// RMS of the embedded error estimate scaled by the tolerances.
    fn error_norm(&self, dt: T) -> T {
        let e1 = lit::<T>(-0.00178001105222577714);
        let e2 = lit::<T>(-0.0008164344596567469);
        let e3 = lit::<T>(0.007880878010261995);
        let e4 = lit::<T>(-0.1447110071732629);
        let e5 = lit::<T>(0.5823571654525552);
        let e6 = lit::<T>(-0.45808210592918697);
        let e7 = lit::<T>(0.015151515151515152);

        let mut acc = T::zero();
        for i in 0..self.y.len() {
            let err = dt
                * (e1 * self.k1[i]
                    + e2 * self.k2[i]
                    + e3 * self.k3[i]
                    + e4 * self.k4[i]
                    + e5 * self.k5[i]
                    + e6 * self.k6[i]
                    + e7 * self.k7[i]);
            let sc = self.weight(self.y[i], self.y_new[i]);
            acc = acc + (err / sc).powi(2);
        }
        (acc / lit::<T>(self.y.len().max(1) as f64)).sqrt()
    }
}

impl<T: Scalar> OdeIntegrator<T> for Tsit5Integrator<T> {
    fn set_initial_value(&mut self, y: &[T], t: T) {
        let dim = y.len();
        self.y = y.to_vec();
        self.t = t;
        self.h = T::zero();
        for buf in [
            &mut self.k1,
            &mut self.k2,
            &mut self.k3,
            &mut self.k4,
            &mut self.k5,
            &mut self.k6,
            &mut self.k7,
            &mut self.tmp,
            &mut self.y_new,
        ] {
            buf.resize(dim, T::zero());
        }
    }

    fn run_until<S: DynamicalSystem<T>>(
        &mut self,
        system: &mut S,
        target: T,
    ) -> Result<(), SolverFailure> {
        check_target(self.t, target, self.y.len(), system.dimension())?;
        if target <= self.t {
            return Ok(());
        }

        // parameters of the system may have changed since the last call
        system
            .apply(self.t, &self.y, &mut self.k1)
            .map_err(|e| SolverFailure::RhsFailed(e.to_string()))?;
        self.stats.rhs_evaluations += 1;

        if !(self.h > T::zero()) {
            self.h = self.initial_step(target - self.t);
        }

        let safety = lit::<T>(Self::SAFETY);
        let fac_min = lit::<T>(Self::FAC_MIN);
        let fac_max = lit::<T>(Self::FAC_MAX);
        let order_exp = lit::<T>(-0.2);
        let resolution = T::epsilon() * lit::<T>(16.0);

        let mut attempts = 0usize;
        while self.t < target {
            let remaining = target - self.t;
            let floor = resolution * self.t.abs().max(target.abs());
            if remaining <= floor {
                self.t = target;
                break;
            }
            if attempts >= self.max_steps {
                return Err(SolverFailure::TooMuchWork {
                    max_steps: self.max_steps,
                    target: as_f64(target),
                });
            }
            attempts += 1;

            let clipped = self.h >= remaining;
            let dt = if clipped { remaining } else { self.h };
            if dt <= floor {
                return Err(SolverFailure::StepSizeUnderflow {
                    step: as_f64(dt),
                    time: as_f64(self.t),
                });
            }

            self.attempt(system, dt)?;
            let err = self.error_norm(dt);

            if err.is_finite() && err <= T::one() {
                std::mem::swap(&mut self.y, &mut self.y_new);
                std::mem::swap(&mut self.k1, &mut self.k7);
                self.t = if clipped { target } else { self.t + dt };
                self.stats.steps += 1;

                let fac = if err > T::zero() {
                    (safety * err.powf(order_exp)).max(fac_min).min(fac_max)
                } else {
                    fac_max
                };
                let proposed = dt * fac;
                self.h = if clipped { self.h.max(proposed) } else { proposed };
            } else {
                self.stats.rejected_steps += 1;
                let fac = if err.is_finite() {
                    (safety * err.powf(order_exp)).max(fac_min).min(T::one())
                } else {
                    fac_min
                };
                self.h = dt * fac;
            }
        }

        if self.y.iter().any(|v| !v.is_finite()) {
            return Err(SolverFailure::NonFiniteSolution {
                time: as_f64(self.t),
            });
        }
        Ok(())
    }

    fn solution(&self) -> &[T] {
        &self.y
    }

    fn time(&self) -> T {
        self.t
    }

    fn current_step_size(&self) -> T {
        self.h
    }

    fn stats(&self) -> SolverStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::{IntegratorKind, Rk4Integrator, SolverFailure, SolverSettings, Tsit5Integrator};
    use crate::error::SimError;
    use crate::traits::{DynamicalSystem, OdeIntegrator};

    struct Decay {
        rate: f64,
    }

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&mut self, _t: f64, y: &[f64], out: &mut [f64]) -> Result<(), SimError> {
            out[0] = -self.rate * y[0];
            Ok(())
        }
    }

    struct Oscillator;

    impl DynamicalSystem<f64> for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&mut self, _t: f64, y: &[f64], out: &mut [f64]) -> Result<(), SimError> {
            out[0] = y[1];
            out[1] = -y[0];
            Ok(())
        }
    }

    struct Failing;

    impl DynamicalSystem<f64> for Failing {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&mut self, t: f64, _y: &[f64], _out: &mut [f64]) -> Result<(), SimError> {
            Err(SimError::NonFinite {
                what: "effective field",
                time: t,
            })
        }
    }

    #[test]
    fn tsit5_matches_exponential_decay() {
        let mut solver = Tsit5Integrator::new(&[1.0], 0.0, 1e-10, 1e-12, 10_000);
        let mut system = Decay { rate: 2.0 };
        for k in 1..=10 {
            let t = 0.1 * k as f64;
            solver.run_until(&mut system, t).expect("decay should integrate");
            assert_eq!(solver.time(), t);
            let expected = (-2.0 * t).exp();
            assert!((solver.solution()[0] - expected).abs() < 1e-8);
        }
        assert!(solver.current_step_size() > 0.0);
        assert!(solver.stats().steps > 0);
    }

    #[test]
    fn tsit5_error_control_matches_the_requested_tolerance() {
        let mut solver = Tsit5Integrator::new(&[1.0], 0.0, 1e-10, 1e-12, 10_000);
        let mut system = Decay { rate: 2.0 };
        solver.run_until(&mut system, 1.0).expect("decay should integrate");
        let err = (solver.solution()[0] - (-2.0f64).exp()).abs();
        assert!(err < 1e-10, "global error {err:e}");
        // a fifth-order pair needs far fewer steps than a degraded tableau
        assert!(solver.stats().steps < 120, "steps = {}", solver.stats().steps);
    }

    #[test]
    fn tsit5_tracks_oscillator_over_several_periods() {
        let mut solver = Tsit5Integrator::new(&[1.0, 0.0], 0.0, 1e-10, 1e-12, 100_000);
        let mut system = Oscillator;
        let t_end = 6.0 * std::f64::consts::PI;
        solver.run_until(&mut system, t_end).expect("oscillator should integrate");
        let y = solver.solution();
        assert!((y[0] - t_end.cos()).abs() < 1e-7);
        assert!((y[1] + t_end.sin()).abs() < 1e-7);
    }

    #[test]
    fn tsit5_step_size_is_not_shrunk_by_clipping() {
        let mut solver = Tsit5Integrator::new(&[1.0], 0.0, 1e-6, 1e-9, 10_000);
        let mut system = Decay { rate: 1e-3 };
        solver.run_until(&mut system, 1.0).expect("first call");
        let h = solver.current_step_size();
        solver.run_until(&mut system, 1.0 + 1e-6).expect("tiny call");
        assert!(solver.current_step_size() >= h);
    }

    #[test]
    fn tsit5_reports_rhs_failure_with_negative_status() {
        let mut solver = Tsit5Integrator::new(&[1.0], 0.0, 1e-8, 1e-12, 100);
        let err = solver
            .run_until(&mut Failing, 1.0)
            .expect_err("failing rhs must fail the solve");
        assert!(matches!(err, SolverFailure::RhsFailed(_)));
        assert_eq!(err.status(), -8);
        assert_eq!(solver.time(), 0.0);
    }

    #[test]
    fn tsit5_gives_up_after_step_budget() {
        let mut solver = Tsit5Integrator::new(&[1.0, 0.0], 0.0, 1e-12, 1e-14, 3);
        let err = solver
            .run_until(&mut Oscillator, 1000.0)
            .expect_err("budget should be exhausted");
        assert_eq!(err.status(), -1);
    }

    #[test]
    fn integrators_reject_backward_targets() {
        let mut solver = Tsit5Integrator::new(&[1.0], 1.0, 1e-8, 1e-12, 100);
        let err = solver
            .run_until(&mut Decay { rate: 1.0 }, 0.5)
            .expect_err("backward target");
        assert_eq!(err.status(), -22);

        let mut rk4 = Rk4Integrator::new(&[1.0], 1.0, 0.1, 100);
        assert!(rk4.run_until(&mut Decay { rate: 1.0 }, 0.5).is_err());
    }

    #[test]
    fn rk4_lands_on_target_with_equal_substeps() {
        let mut solver = Rk4Integrator::new(&[1.0], 0.0, 0.015625, 1_000);
        let mut system = Decay { rate: 1.0 };
        solver.run_until(&mut system, 0.25).expect("rk4 should integrate");
        assert_eq!(solver.time(), 0.25);
        assert_eq!(solver.stats().steps, 16);
        assert!((solver.solution()[0] - (-0.25f64).exp()).abs() < 1e-9);
        assert_eq!(solver.current_step_size(), 0.015625);
    }

    #[test]
    fn set_initial_value_resets_solution_and_step() {
        let settings = SolverSettings {
            rtol: 1e-8,
            atol: 1e-12,
            max_steps: 1000,
            fixed_step: 0.1,
        };
        let mut solver = IntegratorKind::Tsit5.build(&settings, &[1.0], 0.0);
        solver.run_until(&mut Decay { rate: 1.0 }, 1.0).expect("solve");
        assert!(solver.current_step_size() > 0.0);
        solver.set_initial_value(&[2.0], 5.0);
        assert_eq!(solver.solution(), &[2.0]);
        assert_eq!(solver.time(), 5.0);
        assert_eq!(solver.current_step_size(), 0.0);
    }
}
