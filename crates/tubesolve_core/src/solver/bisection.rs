use super::settings::BisectionPolicy;
use super::Solver;
use crate::error::TubeError;
use crate::interval::Interval;
use crate::tube::{TubeVector, BISECTION_RATIO};
use log::debug;
use rand::Rng;

impl<R: Rng> Solver<R> {
    /// Time at which the configured policy splits `x`.
    pub(super) fn bisection_time(&mut self, x: &TubeVector, level: usize) -> Result<f64, TubeError> {
        let tdomain = x.tdomain();
        let t = match self.settings.bisection_policy {
            BisectionPolicy::MaxGateDiam | BisectionPolicy::Disabled => {
                if x.volume() < f64::MAX {
                    x.max_gate_diam().1
                } else {
                    one_finite_gate(x)?
                }
            }
            BisectionPolicy::UpperBound => tdomain.ub(),
            BisectionPolicy::LowerBound => tdomain.lb(),
            BisectionPolicy::Random => {
                if self.rng.gen_bool(0.5) {
                    tdomain.lb()
                } else {
                    tdomain.ub()
                }
            }
            BisectionPolicy::Alternate => {
                if level % 2 != 0 {
                    tdomain.lb()
                } else {
                    tdomain.ub()
                }
            }
        };
        Ok(t)
    }

    /// Splits `x` at the policy time, falling back once to the time of the
    /// widest gate. Returns the time used with both halves.
    pub(super) fn bisect(
        &mut self,
        x: &TubeVector,
        level: usize,
    ) -> Result<(f64, TubeVector, TubeVector), TubeError> {
        let attempt = self
            .bisection_time(x, level)
            .and_then(|t| x.bisect(t, BISECTION_RATIO).map(|(a, b)| (t, a, b)));
        let halves = match attempt {
            Ok(halves) => halves,
            Err(err) => {
                debug!("{}, retrying at the widest gate", err);
                let t = x.max_gate_diam().1;
                let (first, second) = x.bisect(t, BISECTION_RATIO)?;
                (t, first, second)
            }
        };
        self.bisections += 1;
        Ok(halves)
    }
}

/// Bisection time for a tube that is still unbounded somewhere: the lower
/// bound if the first gate is finite, else the upper bound if the last one
/// is, else the first finite non-degenerate gate.
pub fn one_finite_gate(x: &TubeVector) -> Result<f64, TubeError> {
    let tdomain = x.tdomain();
    let finite = |gate: &[Interval]| gate.iter().all(|g| g.diam() < f64::MAX);
    if finite(&x.input_gate(0)) {
        return Ok(tdomain.lb());
    }
    if finite(&x.output_gate(x.nb_slices() - 1)) {
        return Ok(tdomain.ub());
    }
    for tube in x.iter() {
        for i in 0..tube.nb_slices() {
            let d = tube.input_gate(i).diam();
            if d < f64::MAX && d > 0.0 {
                return Ok(tube.slice_tdomain(i).lb());
            }
        }
    }
    Err(TubeError::not_bisectable(tdomain.lb(), "no finite gate"))
}
