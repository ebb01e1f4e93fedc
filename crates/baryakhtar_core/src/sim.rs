//! The simulation object: owns the magnetization, the force terms, the RHS
//! assembler and the integrator, and advances them together in time.

use crate::config::{SimConfig, SimOptions};
use crate::constants::Constants;
use crate::effective_field::{ForceTerm, SetupContext};
use crate::error::{NumericalWarning, Result, SimError};
use crate::mesh::Mesh;
use crate::observables::{Observable, ObservableRegistry, ObservableValue, Recorder};
use crate::rhs::{LlgParams, RhsAssembler};
use crate::solvers::{Integrator, SolverStats};
use crate::source::CellSource;
use crate::state::MagnetizationState;
use crate::traits::OdeIntegrator;

pub struct Simulation {
    name: String,
    mesh: Mesh,
    constants: Constants,
    options: SimOptions,
    ms: Vec<f64>,
    vacuum: Vec<bool>,
    state: MagnetizationState,
    rhs: RhsAssembler,
    integrator: Integrator,
    t: f64,
    step: usize,
    seeded: bool,
    observables: ObservableRegistry,
    recorder: Option<Box<dyn Recorder>>,
    warnings: Vec<NumericalWarning>,
}

impl Simulation {
    /// Cells with `Ms == 0` are vacuum: zero magnetization, always pinned.
    pub fn new(
        mesh: Mesh,
        ms: impl Into<CellSource<f64>>,
        constants: &Constants,
        options: SimOptions,
    ) -> Result<Self> {
        mesh.validate()?;
        options.validate()?;
        let ms = ms.into().resolve_at_least(&mesh, 0.0, "Ms")?;
        let n = mesh.n_cells();
        let vacuum: Vec<bool> = ms.iter().map(|&v| v == 0.0).collect();

        let mut state = MagnetizationState::new(n);
        state.clear_cells(&vacuum);

        let mut params = LlgParams::new(n, options.gamma, options.alpha);
        params.beta = options.beta;
        params.do_precession = options.do_precession;
        params.norm_correction = options.norm_correction;
        params.pins = vacuum.clone();

        let integrator = options
            .integrator
            .build(&options.solver_settings(), state.as_slice(), 0.0);

        let mut observables = ObservableRegistry::default();
        observables.insert("E_total", Observable::TotalEnergy);
        observables.insert("m_error", Observable::SpinError);

        Ok(Self {
            name: "unnamed".to_string(),
            rhs: RhsAssembler::new(&mesh, params),
            mesh,
            constants: *constants,
            options,
            ms,
            vacuum,
            state,
            integrator,
            t: 0.0,
            step: 0,
            seeded: false,
            observables,
            recorder: None,
            warnings: Vec::new(),
        })
    }

    pub fn from_config(config: &SimConfig, constants: &Constants) -> Result<Self> {
        config.validate()?;
        let sim = Self::new(config.mesh, config.ms, constants, config.options.clone())?;
        Ok(sim.with_name(config.name.clone()))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the magnetization and re-seeds the integrator at the current time.
    pub fn set_m(
        &mut self,
        source: impl Into<CellSource<[f64; 3]>>,
        normalize: bool,
    ) -> Result<()> {
        self.state.set(&self.mesh, &source.into(), normalize)?;
        self.state.clear_cells(&self.vacuum);
        self.integrator.set_initial_value(self.state.as_slice(), self.t);
        Ok(())
    }

    pub fn set_alpha(&mut self, source: impl Into<CellSource<f64>>) -> Result<()> {
        let alpha = source.into().resolve_at_least(&self.mesh, 0.0, "alpha")?;
        self.rhs.params_mut().alpha = alpha;
        Ok(())
    }

    /// Pins the flagged cells. Vacuum cells stay pinned regardless.
    pub fn set_pins(&mut self, source: impl Into<CellSource<bool>>) -> Result<()> {
        let mut pins = source.into().resolve(&self.mesh)?;
        for (pin, &vacuum) in pins.iter_mut().zip(&self.vacuum) {
            *pin |= vacuum;
        }
        self.rhs.params_mut().pins = pins;
        Ok(())
    }

    pub fn set_gamma(&mut self, gamma: f64) -> Result<()> {
        if !gamma.is_finite() {
            return Err(SimError::config(format!("gamma must be finite, got {gamma}")));
        }
        self.rhs.params_mut().gamma = gamma;
        Ok(())
    }

    pub fn set_beta(&mut self, beta: f64) -> Result<()> {
        if !beta.is_finite() {
            return Err(SimError::config(format!("beta must be finite, got {beta}")));
        }
        self.rhs.params_mut().beta = beta;
        Ok(())
    }

    pub fn set_precession(&mut self, enabled: bool) {
        self.rhs.params_mut().do_precession = enabled;
    }

    /// `None` selects the adaptive coefficient `6 |dm/dt|`.
    pub fn set_norm_correction(&mut self, coefficient: Option<f64>) -> Result<()> {
        if let Some(c) = coefficient {
            if !c.is_finite() {
                return Err(SimError::config(format!(
                    "norm correction must be finite, got {c}"
                )));
            }
        }
        self.rhs.params_mut().norm_correction = coefficient;
        Ok(())
    }

    /// Registers a force term and its energy observable `E_<name>`. With
    /// `record_field` its average field is recorded as `<name>` too.
    /// Returns the name the term was registered under.
    pub fn add(&mut self, term: impl ForceTerm + 'static, record_field: bool) -> Result<String> {
        let ctx = SetupContext {
            mesh: &self.mesh,
            spin: self.state.as_slice(),
            ms: &self.ms,
            constants: &self.constants,
        };
        let name = self.rhs.forces_mut().add(Box::new(term), &ctx)?;
        self.observables
            .insert(format!("E_{name}"), Observable::TermEnergy(name.clone()));
        if record_field {
            self.observables
                .insert(name.clone(), Observable::TermAverageField(name.clone()));
        }
        Ok(name)
    }

    /// Records the magnetization of cell `(i, j, k)` under `name`.
    pub fn add_monitor_at(&mut self, i: usize, j: usize, k: usize, name: &str) -> Result<()> {
        if !self.mesh.contains(i, j, k) {
            return Err(SimError::config(format!(
                "probe ({i}, {j}, {k}) lies outside the {}x{}x{} mesh",
                self.mesh.nx, self.mesh.ny, self.mesh.nz
            )));
        }
        self.observables.insert(name, Observable::Probe { i, j, k });
        Ok(())
    }

    pub fn set_recorder(&mut self, recorder: impl Recorder + 'static) {
        self.recorder = Some(Box::new(recorder));
    }

    pub fn interaction(&self, name: &str) -> Result<&dyn ForceTerm> {
        self.rhs.forces().lookup(name)
    }

    pub fn interaction_mut(&mut self, name: &str) -> Result<&mut (dyn ForceTerm + 'static)> {
        self.rhs.forces_mut().lookup_mut(name)
    }

    /// Advances the magnetization to `target`.
    ///
    /// Targets at or before the current time do nothing, except the first
    /// `run_until(0.0)` at `t = 0`, which evaluates the field and records the
    /// initial state. On failure the state and clock are left as they were.
    pub fn run_until(&mut self, target: f64) -> Result<()> {
        if !target.is_finite() {
            return Err(SimError::config(format!(
                "target time must be finite, got {target}"
            )));
        }

        if target <= self.t {
            if target == 0.0 && self.t == 0.0 && !self.seeded {
                self.seeded = true;
                let field_ok = self.rhs.compute_effective_field(self.t, self.state.as_slice());
                if !field_ok {
                    self.warn(NumericalWarning::NonFiniteField {
                        step: self.step,
                        time: self.t,
                    });
                }
                self.record()?;
            }
            return Ok(());
        }

        self.state.snapshot();
        if let Err(failure) = self.integrator.run_until(&mut self.rhs, target) {
            self.integrator.set_initial_value(self.state.as_slice(), self.t);
            return Err(SimError::Integration {
                status: failure.status(),
                reason: failure.to_string(),
            });
        }

        self.state.commit(self.integrator.solution());
        self.t = target;
        self.step += 1;
        self.seeded = true;
        log::debug!(
            "step {} reached t = {:e} (solver steps {}, next h = {:e})",
            self.step,
            self.t,
            self.integrator.stats().steps,
            self.integrator.current_step_size()
        );

        let field_ok = self.rhs.compute_effective_field(self.t, self.state.as_slice());
        self.check_invariants(field_ok)?;
        self.record()
    }

    fn check_invariants(&mut self, field_ok: bool) -> Result<()> {
        if !field_ok {
            self.warn(NumericalWarning::NonFiniteField {
                step: self.step,
                time: self.t,
            });
        }
        let deviation = self.compute_spin_error();
        let bound = self.options.unit_length_bound;
        if deviation.is_nan() || deviation > bound {
            return Err(SimError::NumericalInvariant { deviation, bound });
        }
        if deviation > self.options.unit_length_warning {
            self.warn(NumericalWarning::UnitLengthDeviation {
                step: self.step,
                time: self.t,
                deviation,
            });
        }
        Ok(())
    }

    fn warn(&mut self, warning: NumericalWarning) {
        log::warn!("{}: {}", self.name, warning);
        self.warnings.push(warning);
    }

    fn record(&mut self) -> Result<()> {
        let Some(mut recorder) = self.recorder.take() else {
            return Ok(());
        };
        let outcome = recorder.record(self);
        self.recorder = Some(recorder);
        outcome.map_err(|err| SimError::Recording {
            step: self.step,
            message: format!("{err:#}"),
        })
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn constants(&self) -> &Constants {
        &self.constants
    }

    pub fn options(&self) -> &SimOptions {
        &self.options
    }

    pub fn state(&self) -> &MagnetizationState {
        &self.state
    }

    pub fn spin(&self) -> &[f64] {
        self.state.as_slice()
    }

    pub fn ms(&self) -> &[f64] {
        &self.ms
    }

    pub fn params(&self) -> &LlgParams {
        self.rhs.params()
    }

    pub fn pins(&self) -> &[bool] {
        &self.rhs.params().pins
    }

    /// Effective field from the last evaluation (seed, step or explicit refresh).
    pub fn effective_field(&self) -> &[f64] {
        self.rhs.effective_field()
    }

    /// Re-evaluates the effective field for the current state at the current time.
    pub fn compute_effective_field(&mut self) -> &[f64] {
        if !self.rhs.compute_effective_field(self.t, self.state.as_slice()) {
            self.warn(NumericalWarning::NonFiniteField {
                step: self.step,
                time: self.t,
            });
        }
        self.rhs.effective_field()
    }

    pub fn compute_energy(&self) -> f64 {
        self.rhs.forces().compute_total_energy(self.state.as_slice())
    }

    /// Largest unit-length deviation over non-pinned cells.
    pub fn compute_spin_error(&self) -> f64 {
        self.state
            .max_deviation_from_unit_length(&self.rhs.params().pins)
    }

    pub fn compute_average(&self) -> Result<[f64; 3]> {
        self.state.average_magnetization(&self.ms)
    }

    pub fn spin_at(&self, i: usize, j: usize, k: usize) -> Result<[f64; 3]> {
        if !self.mesh.contains(i, j, k) {
            return Err(SimError::config(format!(
                "cell ({i}, {j}, {k}) lies outside the mesh"
            )));
        }
        Ok(self.state.spin_at(self.mesh.index(i, j, k)))
    }

    pub fn observables(&self) -> &ObservableRegistry {
        &self.observables
    }

    pub fn evaluate(&self, observable: &Observable) -> Result<ObservableValue> {
        Ok(match observable {
            Observable::TotalEnergy => ObservableValue::Scalar(self.compute_energy()),
            Observable::SpinError => ObservableValue::Scalar(self.compute_spin_error()),
            Observable::AverageMagnetization => ObservableValue::Vector(self.compute_average()?),
            Observable::TermEnergy(name) => {
                ObservableValue::Scalar(self.interaction(name)?.compute_energy(self.spin()))
            }
            Observable::TermAverageField(name) => {
                ObservableValue::Vector(self.interaction(name)?.average_field())
            }
            Observable::Probe { i, j, k } => ObservableValue::Vector(self.spin_at(*i, *j, *k)?),
        })
    }

    pub fn warnings(&self) -> &[NumericalWarning] {
        &self.warnings
    }

    pub fn stats(&self) -> SolverStats {
        self.integrator.stats()
    }

    /// Step size the integrator will try next; zero before the first step.
    pub fn current_step_size(&self) -> f64 {
        self.integrator.current_step_size()
    }
}

#[cfg(test)]
mod tests {
    use super::Simulation;
    use crate::config::SimOptions;
    use crate::constants::Constants;
    use crate::effective_field::Zeeman;
    use crate::error::{NumericalWarning, SimError};
    use crate::mesh::Mesh;
    use crate::observables::{Observable, ObservableValue};

    fn assert_err_contains<T>(result: crate::error::Result<T>, needle: &str) {
        let message = match result {
            Ok(_) => panic!("expected error containing \"{needle}\""),
            Err(err) => format!("{err}"),
        };
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn strip(ms: Vec<f64>) -> Simulation {
        let mesh = Mesh::new((ms.len(), 1, 1), (1.0, 1.0, 1.0), 1e-9).expect("mesh");
        Simulation::new(mesh, ms, &Constants::default(), SimOptions::default()).expect("sim")
    }

    #[test]
    fn vacuum_cells_are_zero_and_pinned() {
        let mut sim = strip(vec![8e5, 0.0, 8e5]);
        sim.set_m((0.0, 0.0, 1.0), true).expect("set m");
        assert_eq!(sim.spin_at(1, 0, 0).expect("cell"), [0.0, 0.0, 0.0]);
        assert_eq!(sim.spin_at(2, 0, 0).expect("cell"), [0.0, 0.0, 1.0]);
        assert_eq!(sim.pins(), &[false, true, false]);

        sim.set_pins(vec![true, false, false]).expect("pins");
        assert_eq!(sim.pins(), &[true, true, false]);
        assert_eq!(sim.compute_spin_error(), 0.0);
        assert_eq!(sim.compute_average().expect("average"), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn setters_validate_before_mutating() {
        let mut sim = strip(vec![1.0, 1.0]);
        assert_err_contains(sim.set_alpha(-0.1), "alpha");
        assert_err_contains(sim.set_alpha(vec![0.1]), "expected 2 per-cell values");
        assert_eq!(sim.params().alpha, vec![0.1, 0.1]);
        sim.set_alpha(vec![0.2, 0.3]).expect("alpha");
        assert_eq!(sim.params().alpha, vec![0.2, 0.3]);

        assert_err_contains(sim.set_gamma(f64::NAN), "gamma");
        assert_err_contains(sim.set_beta(f64::INFINITY), "beta");
        assert_err_contains(sim.set_norm_correction(Some(f64::NAN)), "norm correction");
        assert_err_contains(sim.set_m([f64::NAN, 0.0, 0.0], false), "not finite");
        assert_eq!(sim.spin_at(0, 0, 0).expect("cell"), [1.0, 0.0, 0.0]);
        assert_err_contains(sim.spin_at(2, 0, 0), "outside");
        assert_err_contains(sim.run_until(f64::NAN), "target time");
    }

    #[test]
    fn add_registers_energy_and_field_observables() {
        let mut sim = strip(vec![1e6]);
        assert_eq!(sim.observables().names(), vec!["E_total", "m_error"]);
        let first = sim.add(Zeeman::new([0.0, 0.0, 1e5]), true).expect("add");
        let second = sim.add(Zeeman::new([0.0, 0.0, 2e5]), false).expect("add");
        assert_eq!(first, "Zeeman");
        assert_eq!(second, "Zeeman_2");
        assert_eq!(
            sim.observables().names(),
            vec!["E_total", "m_error", "E_Zeeman", "Zeeman", "E_Zeeman_2"]
        );

        sim.set_m((0.0, 0.0, 1.0), true).expect("set m");
        sim.compute_effective_field();
        let e1 = sim
            .evaluate(&Observable::TermEnergy("Zeeman".into()))
            .expect("energy");
        let total = sim.evaluate(&Observable::TotalEnergy).expect("total");
        match (e1, total) {
            (ObservableValue::Scalar(e1), ObservableValue::Scalar(total)) => {
                assert!(e1 < 0.0);
                assert!((total - 3.0 * e1).abs() <= 1e-12 * total.abs());
            }
            other => panic!("unexpected values {other:?}"),
        }
        assert_eq!(
            sim.evaluate(&Observable::TermAverageField("Zeeman".into()))
                .expect("field"),
            ObservableValue::Vector([0.0, 0.0, 1e5])
        );

        match sim.interaction("demag") {
            Err(SimError::NotFound { available, .. }) => {
                assert_eq!(available, vec!["Zeeman", "Zeeman_2"]);
            }
            _ => panic!("lookup of an unknown interaction should fail"),
        }
    }

    #[test]
    fn monitors_must_lie_inside_the_mesh() {
        let mut sim = strip(vec![1.0, 1.0]);
        assert_err_contains(sim.add_monitor_at(0, 1, 0, "probe"), "outside");
        sim.add_monitor_at(1, 0, 0, "probe").expect("probe");
        assert_eq!(
            sim.evaluate(&Observable::Probe { i: 1, j: 0, k: 0 })
                .expect("probe"),
            ObservableValue::Vector([1.0, 0.0, 0.0])
        );
    }

    #[test]
    fn backward_targets_do_nothing() {
        let mut sim = strip(vec![1e6]);
        sim.add(Zeeman::new([0.0, 0.0, 1e5]), false).expect("add");
        sim.run_until(1e-12).expect("run");
        let spin = sim.spin().to_vec();
        sim.run_until(1e-12).expect("same time");
        sim.run_until(0.0).expect("earlier time");
        assert_eq!(sim.t(), 1e-12);
        assert_eq!(sim.step(), 1);
        assert_eq!(sim.spin(), spin.as_slice());
        assert_eq!(sim.state().previous().len(), 3);
    }

    #[test]
    fn large_length_deviation_fails_after_the_step_is_committed() {
        let mut sim = strip(vec![8e5]);
        sim.set_m((1.5, 0.0, 0.0), false).expect("set m");
        match sim.run_until(1e-15) {
            Err(SimError::NumericalInvariant { deviation, bound }) => {
                assert!(deviation > 0.4, "deviation = {deviation}");
                assert_eq!(bound, 0.1);
            }
            other => panic!("expected a numerical invariant error, got {other:?}"),
        }
        assert_eq!(sim.t(), 1e-15);
        assert_eq!(sim.step(), 1);
        assert_eq!(sim.state().previous()[0], 1.5);
        assert!((sim.compute_spin_error() - 0.5).abs() < 0.01);
    }

    #[test]
    fn small_length_deviation_is_a_warning() {
        let mut sim = strip(vec![8e5]);
        sim.set_m((1.001, 0.0, 0.0), false).expect("set m");
        sim.run_until(1e-15).expect("run");
        assert_eq!(sim.t(), 1e-15);
        assert_eq!(sim.step(), 1);
        match sim.warnings() {
            [NumericalWarning::UnitLengthDeviation {
                step,
                time,
                deviation,
            }] => {
                assert_eq!(*step, 1);
                assert_eq!(*time, 1e-15);
                assert!(*deviation > 1e-6 && *deviation < 0.1, "deviation = {deviation}");
            }
            other => panic!("expected one unit-length warning, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_seed_field_is_a_warning() {
        let mut sim = strip(vec![8e5]);
        sim.add(
            Zeeman::time_dependent([0.0, 0.0, 1e5], |t| if t == 0.0 { f64::NAN } else { 1.0 }),
            false,
        )
        .expect("add");
        sim.run_until(0.0).expect("seed");
        assert_eq!(sim.t(), 0.0);
        assert_eq!(sim.step(), 0);
        assert_eq!(
            sim.warnings(),
            &[NumericalWarning::NonFiniteField { step: 0, time: 0.0 }]
        );
        sim.run_until(0.0).expect("seeded once");
        assert_eq!(sim.warnings().len(), 1);
    }
}
