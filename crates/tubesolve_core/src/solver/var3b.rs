use super::settings::Var3bTimePolicy;
use super::{fixed_point_reached, Problem, Solver};
use crate::tube::TubeVector;
use rand::Rng;

impl<R: Rng> Solver<R> {
    /// Repeats var3b until it no longer shrinks `x` by the var3b ratio.
    pub(super) fn fixed_point_var3b(&mut self, problem: &Problem<'_>, x: &mut TubeVector) {
        let ratio = self.settings.var3b_fxpt_ratio;
        if ratio < 0.0 {
            return;
        }
        loop {
            let before = x.volume();
            self.var3b(problem, x);
            if x.is_empty()
                || self.stopping_condition_met(x)
                || fixed_point_reached(before, x.volume(), ratio)
            {
                break;
            }
        }
    }

    /// Peels growing slices off both ends of every component's gate at one
    /// time point, dropping those the derivative contractor proves empty.
    fn var3b(&mut self, problem: &Problem<'_>, x: &mut TubeVector) {
        let s = self.settings;
        let tdomain = x.tdomain();
        let t = match s.var3b_time_policy {
            Var3bTimePolicy::UpperBound => tdomain.ub(),
            Var3bTimePolicy::LowerBound => tdomain.lb(),
            Var3bTimePolicy::Random => {
                if self.rng.gen_bool(0.5) {
                    tdomain.lb()
                } else {
                    tdomain.ub()
                }
            }
            Var3bTimePolicy::MaxGateDiam => x.max_gate_diam().1,
        };
        let ratio = s.var3b_propa_fxpt_ratio;

        for k in 0..x.size() {
            let mut rate = s.var3b_min_rate;
            while rate < s.var3b_max_rate {
                let (mut low, high) = match x.bisect_dim(t, k, rate) {
                    Ok(halves) => halves,
                    Err(_) => break,
                };
                self.fixed_point_contraction(problem, &mut low, ratio, true, t, true);
                if low.is_empty() {
                    *x = high;
                    rate *= s.var3b_rate_factor;
                } else {
                    let mut merged = high;
                    merged |= &low;
                    *x = merged;
                    break;
                }
            }
            self.fixed_point_contraction(problem, x, ratio, true, t, true);
            if x.is_empty() {
                return;
            }

            let mut rate = 1.0 - s.var3b_min_rate;
            while rate > 1.0 - s.var3b_max_rate {
                let (low, mut high) = match x.bisect_dim(t, k, rate) {
                    Ok(halves) => halves,
                    Err(_) => break,
                };
                self.fixed_point_contraction(problem, &mut high, ratio, true, t, true);
                if high.is_empty() {
                    *x = low;
                    rate = 1.0 - s.var3b_rate_factor * (1.0 - rate);
                } else {
                    let mut merged = low;
                    merged |= &high;
                    *x = merged;
                    break;
                }
            }
            self.fixed_point_contraction(problem, x, ratio, true, t, true);
            if x.is_empty() {
                return;
            }
        }
    }
}
