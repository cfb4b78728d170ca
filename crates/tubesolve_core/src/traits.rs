use crate::interval::Interval;
use crate::tube::TubeVector;

/// Right-hand side of a differential inclusion `x' ∈ f(t, x)`.
pub trait DynamicalSystem {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates an enclosure of the vector field.
    /// t: time interval
    /// x: state box
    /// out: buffer receiving an enclosure of dx/dt
    fn apply(&self, t: Interval, x: &[Interval], out: &mut [Interval]);

    /// Same as [`apply`](Self::apply) but with access to the whole enclosure,
    /// for systems whose derivative depends on past or future values (delays).
    fn apply_on_tube(&self, t: Interval, x: &[Interval], _tube: &TubeVector, out: &mut [Interval]) {
        self.apply(t, x, out);
    }
}

/// Tightens an enclosure with non-differential constraints.
///
/// `t0` is the time from which new information was exposed (the last
/// bisection time) and `incremental` tells whether only that neighbourhood
/// needs to be revisited.
pub trait ConstraintStep {
    fn contract(&self, x: &mut TubeVector, t0: f64, incremental: bool);
}

impl<F> ConstraintStep for F
where
    F: Fn(&mut TubeVector, f64, bool),
{
    fn contract(&self, x: &mut TubeVector, t0: f64, incremental: bool) {
        self(x, t0, incremental)
    }
}
