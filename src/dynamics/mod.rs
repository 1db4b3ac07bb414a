//! Substep dynamics: integration, velocity reconstruction and the XPBD
//! contact solver.

pub mod integrator;
pub mod solver;

pub use integrator::Integrator;
pub use solver::ContactSolver;
