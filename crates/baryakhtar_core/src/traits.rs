use crate::error::SimError;
use crate::solvers::{SolverFailure, SolverStats};
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars by the integrators.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Right-hand side of an ODE system `dy/dt = f(t, y)`.
///
/// The integrator may call `apply` many times per requested output time.
/// Implementations may keep scratch buffers (hence `&mut self`) but must be
/// deterministic for identical inputs.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// y: current state
    /// out: buffer to write dy/dt into
    fn apply(&mut self, t: T, y: &[T], out: &mut [T]) -> Result<(), SimError>;
}

/// An integrator that advances a stored solution to a requested time.
pub trait OdeIntegrator<T: Scalar> {
    /// Replaces the stored solution and time. Discards any step history.
    fn set_initial_value(&mut self, y: &[T], t: T);

    /// Advances the stored solution to exactly `target`.
    fn run_until<S: DynamicalSystem<T>>(
        &mut self,
        system: &mut S,
        target: T,
    ) -> Result<(), SolverFailure>;

    /// Current solution vector.
    fn solution(&self) -> &[T];

    /// Time of the current solution.
    fn time(&self) -> T;

    /// Step size the integrator intends to attempt next (zero before the first step).
    fn current_step_size(&self) -> T;

    fn stats(&self) -> SolverStats;
}
