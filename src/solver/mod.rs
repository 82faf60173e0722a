pub mod adams;
pub mod brent;
pub mod cubic;
pub mod rk4;

pub use adams::{AdaptiveIntegrator, IntegrationStats, SolverSettings, MAX_ORDER};
