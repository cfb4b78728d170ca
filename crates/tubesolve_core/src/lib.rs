/// The `tubesolve_core` crate encloses every solution of a differential inclusion
/// `x' ∈ f(t, x)` on a bounded time domain, under optional extra constraints.
///
/// Key components:
/// - **Interval**: Outward-rounded interval arithmetic and boxes.
/// - **Tubes**: `Tube` and `TubeVector`, piecewise-constant enclosures with gates.
/// - **Contractors**: Derivative, Picard and integration contractors tightening tubes.
/// - **Solver**: Branch-and-prune search with refining, var3b and clustering.
/// - **Equation Engine**: A small bytecode VM evaluating user expressions over intervals.
pub mod clustering;
pub mod contractors;
pub mod equation_engine;
pub mod error;
pub mod interval;
pub mod interval_tube;
pub mod solver;
pub mod traits;
pub mod trajectory;
pub mod tube;

pub use clustering::cluster;
pub use equation_engine::IntervalFunction;
pub use error::TubeError;
pub use interval::{Interval, IntervalVector};
pub use interval_tube::IntervalTube;
pub use solver::{
    solutions_contain, BisectionPolicy, ContractionMode, RefiningMode, Solver, SolverSettings,
    StoppingMode, Var3bTimePolicy,
};
pub use traits::{ConstraintStep, DynamicalSystem};
pub use trajectory::{BoolInterval, Trajectory};
pub use tube::{Tube, TubeVector};
