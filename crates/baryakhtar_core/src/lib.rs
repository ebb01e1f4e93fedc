//! The `baryakhtar_core` crate advances a discretized magnetization field under
//! the extended Landau-Lifshitz-Gilbert (Baryakhtar) equation.
//!
//! Key components:
//! - **Traits**: `Scalar`, `DynamicalSystem` (RHS callback), `OdeIntegrator` (solvers).
//! - **Solvers**: adaptive Tsit5 and fixed-step RK4 behind one runtime-selected `Integrator`.
//! - **Effective field**: the `ForceTerm` plug-in trait, the `ForceAggregator` and reference terms.
//! - **RHS**: the Laplacian relaxation operator and the extended LLG torque kernel.
//! - **Simulation**: the time-stepping driver, observables and the relaxation controller.
pub mod config;
pub mod constants;
pub mod effective_field;
pub mod error;
pub mod laplace;
pub mod mesh;
pub mod observables;
pub mod relax;
pub mod rhs;
pub mod sim;
pub mod solvers;
pub mod source;
pub mod state;
pub mod traits;

pub use config::{SimConfig, SimOptions};
pub use constants::Constants;
pub use error::{NumericalWarning, Result, SimError};
pub use mesh::Mesh;
pub use relax::{CheckpointSink, RelaxReport, RelaxSettings, RelaxState};
pub use sim::Simulation;
pub use source::CellSource;
