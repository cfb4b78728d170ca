//! Branch-and-prune search over tube enclosures.
//!
//! Each node of the depth-first search is contracted to a fixed point,
//! refined in time, optionally narrowed at its boundaries (var3b), then either
//! accepted as a solution or bisected. Accepted tubes are clustered at the end.

pub mod bisection;
mod refining;
#[cfg(test)]
mod scenarios;
pub mod settings;
pub mod stopping;
mod var3b;

pub use settings::{
    BisectionPolicy, ContractionMode, RefiningMode, SolverSettings, StoppingMode, Var3bTimePolicy,
};

use crate::clustering::cluster;
use crate::contractors::OdeContractor;
use crate::traits::{ConstraintStep, DynamicalSystem};
use crate::trajectory::{BoolInterval, Trajectory};
use crate::tube::TubeVector;
use anyhow::{bail, Result};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

/// Callbacks of the problem being solved, with the ODE contractors they use.
struct Problem<'a> {
    dynamics: Option<&'a dyn DynamicalSystem>,
    constraints: Option<&'a dyn ConstraintStep>,
    ode: OdeContractor,
    var3b_ode: OdeContractor,
}

struct Node {
    level: usize,
    t_bisect: f64,
    x: TubeVector,
}

pub struct Solver<R = StdRng> {
    thresholds: Vec<f64>,
    settings: SolverSettings,
    rng: R,
    bisections: usize,
    solving_time: Duration,
}

impl Solver<StdRng> {
    /// Solver whose random policies draw from a generator seeded with
    /// `settings.seed`.
    pub fn new(thresholds: &[f64], settings: SolverSettings) -> Self {
        let rng = StdRng::seed_from_u64(settings.seed);
        Self::with_rng(thresholds, settings, rng)
    }
}

impl<R: Rng> Solver<R> {
    pub fn with_rng(thresholds: &[f64], settings: SolverSettings, rng: R) -> Self {
        Self {
            thresholds: thresholds.to_vec(),
            settings,
            rng,
            bisections: 0,
            solving_time: Duration::ZERO,
        }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// Bisections performed by the last call to `solve`.
    pub fn bisections(&self) -> usize {
        self.bisections
    }

    /// Wall-clock duration of the last call to `solve`, clustering included.
    pub fn solving_time(&self) -> Duration {
        self.solving_time
    }

    pub fn solve_dynamics(
        &mut self,
        x0: &TubeVector,
        dynamics: &dyn DynamicalSystem,
    ) -> Result<Vec<TubeVector>> {
        self.solve(x0, Some(dynamics), None)
    }

    pub fn solve_constraints(
        &mut self,
        x0: &TubeVector,
        constraints: &dyn ConstraintStep,
    ) -> Result<Vec<TubeVector>> {
        self.solve(x0, None, Some(constraints))
    }

    /// Returns tubes whose union encloses every solution consistent with
    /// `dynamics` and `constraints`.
    pub fn solve(
        &mut self,
        x0: &TubeVector,
        dynamics: Option<&dyn DynamicalSystem>,
        constraints: Option<&dyn ConstraintStep>,
    ) -> Result<Vec<TubeVector>> {
        self.settings.validate()?;
        if x0.size() != self.thresholds.len() {
            bail!(
                "Initial enclosure dimension mismatch. Expected {}, got {}.",
                self.thresholds.len(),
                x0.size()
            );
        }
        if let Some(f) = dynamics {
            if f.dimension() != x0.size() {
                bail!(
                    "Dynamics dimension mismatch. Expected {}, got {}.",
                    x0.size(),
                    f.dimension()
                );
            }
        }

        let start = Instant::now();
        self.bisections = 0;
        let problem = Problem {
            dynamics,
            constraints,
            ode: OdeContractor::from_mode(self.settings.contraction_mode),
            var3b_ode: OdeContractor::from_mode(ContractionMode::PicardDeriv),
        };

        let mut stack = vec![Node {
            level: 0,
            t_bisect: x0.tdomain().lb(),
            x: x0.clone(),
        }];
        let mut solutions = Vec::new();

        while let Some(Node { level, t_bisect, mut x }) = stack.pop() {
            self.contraction_step(&problem, &mut x, level > 0, t_bisect);
            if self.settings.trace && !x.is_empty() {
                info!("volume after contraction {:e}", x.volume());
            }

            if self.settings.refining_fxpt_ratio >= 0.0 && !x.is_empty() {
                loop {
                    let before = x.volume();
                    if !self.refining(&mut x) {
                        break;
                    }
                    let lb = x.tdomain().lb();
                    self.contraction_step(&problem, &mut x, false, lb);
                    if self.settings.trace {
                        info!(
                            "{} slices after refining, volume {:e}",
                            x.nb_slices(),
                            x.volume()
                        );
                    }
                    if x.is_empty()
                        || self.stopping_condition_met(&x)
                        || fixed_point_reached(before, x.volume(), self.settings.refining_fxpt_ratio)
                    {
                        break;
                    }
                }
            }

            if x.is_empty() {
                continue;
            }
            if self.stopping_condition_met(&x)
                || self.settings.bisection_policy == BisectionPolicy::Disabled
            {
                self.accept(&mut solutions, x);
                continue;
            }

            match self.bisect(&x, level) {
                Ok((t, first, second)) => {
                    if self.settings.trace {
                        info!(
                            "bisection at t = {} (level {}), volume {:e}, {} slices",
                            t,
                            level,
                            x.volume(),
                            x.nb_slices()
                        );
                    }
                    stack.push(Node {
                        level: level + 1,
                        t_bisect: t,
                        x: second,
                    });
                    stack.push(Node {
                        level: level + 1,
                        t_bisect: t,
                        x: first,
                    });
                }
                Err(err) => {
                    warn!("tube cannot be bisected ({}), kept as a solution", err);
                    self.accept(&mut solutions, x);
                }
            }
        }

        if self.settings.trace {
            info!(
                "search done in {:?}: {} solutions, {} bisections",
                start.elapsed(),
                solutions.len(),
                self.bisections
            );
        }
        let solutions = cluster(solutions);
        self.solving_time = start.elapsed();
        if self.settings.trace {
            info!(
                "{} solutions after clustering, total time {:?}",
                solutions.len(),
                self.solving_time
            );
        }
        Ok(solutions)
    }

    fn accept(&self, solutions: &mut Vec<TubeVector>, x: TubeVector) {
        if self.settings.trace {
            info!(
                "solution {}: volume {:e}, max diam {:e}, boundary gates {:e}",
                solutions.len() + 1,
                x.volume(),
                x.max_diam(),
                stopping::extreme_gates_sum_of_diams(&x)
            );
        }
        solutions.push(x);
    }

    fn stopping_condition_met(&self, x: &TubeVector) -> bool {
        stopping::stopping_condition_met(self.settings.stopping_mode, x, &self.thresholds)
    }

    /// Propagation to a fixed point followed by the var3b fixed point.
    fn contraction_step(&mut self, problem: &Problem<'_>, x: &mut TubeVector, incremental: bool, t0: f64) {
        self.fixed_point_contraction(
            problem,
            x,
            self.settings.propa_fxpt_ratio,
            incremental,
            t0,
            false,
        );
        if !x.is_empty() && self.settings.var3b_fxpt_ratio >= 0.0 {
            self.fixed_point_var3b(problem, x);
        }
    }

    /// Repeats contraction passes until the volume stops shrinking by the
    /// requested ratio. Only the first pass is incremental.
    fn fixed_point_contraction(
        &self,
        problem: &Problem<'_>,
        x: &mut TubeVector,
        ratio: f64,
        mut incremental: bool,
        t0: f64,
        var3b: bool,
    ) {
        if ratio < 0.0 {
            return;
        }
        loop {
            let before = x.volume();
            self.contraction(problem, x, t0, incremental, var3b);
            let after = x.volume();
            incremental = false;
            if x.is_empty()
                || ratio == 0.0
                || after == before
                || self.stopping_condition_met(x)
                || fixed_point_reached(before, after, ratio)
            {
                break;
            }
        }
    }

    /// One pass: the constraint callback, then the ODE contractor.
    fn contraction(
        &self,
        problem: &Problem<'_>,
        x: &mut TubeVector,
        t0: f64,
        mut incremental: bool,
        var3b: bool,
    ) {
        if let Some(constraints) = problem.constraints {
            if !var3b || self.settings.var3b_external_contraction {
                constraints.contract(x, t0, incremental);
                incremental = false;
            }
        }
        if let Some(f) = problem.dynamics {
            if x.is_empty() {
                return;
            }
            let ode = if var3b { &problem.var3b_ode } else { &problem.ode };
            ode.contract(f, x, t0, incremental, var3b);
        }
    }
}

/// Whether a pass going from `before` to `after` ends a fixed-point loop
/// configured with `ratio`.
pub fn fixed_point_reached(before: f64, after: f64, ratio: f64) -> bool {
    if ratio > 1.0 {
        return false;
    }
    if ratio == 0.0 || after == before {
        return true;
    }
    after / before >= ratio
}

/// YES if a solution provably contains `truth`, NO if all of them exclude it.
pub fn solutions_contain(solutions: &[TubeVector], truth: &Trajectory) -> BoolInterval {
    let mut result = BoolInterval::No;
    for x in solutions {
        match x.contains(truth) {
            BoolInterval::Yes => return BoolInterval::Yes,
            BoolInterval::Maybe => result = BoolInterval::Maybe,
            BoolInterval::No => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::IntervalFunction;
    use crate::interval::Interval;
    use std::cell::RefCell;

    fn constraints_only(constraints: &dyn ConstraintStep) -> Problem<'_> {
        Problem {
            dynamics: None,
            constraints: Some(constraints),
            ode: OdeContractor::from_mode(ContractionMode::ConstraintsOnly),
            var3b_ode: OdeContractor::from_mode(ContractionMode::ConstraintsOnly),
        }
    }

    #[test]
    fn fixed_point_ratio_semantics() {
        assert!(!fixed_point_reached(10.0, 1.0, 1.5));
        assert!(!fixed_point_reached(10.0, 10.0, 2.0));
        assert!(fixed_point_reached(10.0, 1.0, 0.0));
        assert!(fixed_point_reached(10.0, 10.0, 0.5));
        assert!(fixed_point_reached(10.0, 9.5, 0.9));
        assert!(!fixed_point_reached(10.0, 5.0, 0.9));
        assert!(fixed_point_reached(f64::MAX, f64::MAX, 0.9));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let x0 = TubeVector::new(Interval::new(0.0, 1.0), 0.5, 2);
        let mut solver = Solver::new(&[0.1], SolverSettings::default());
        let err = solver
            .solve(&x0, None, None)
            .expect_err("dimension mismatch");
        assert!(err.to_string().contains("dimension mismatch"));

        let f = IntervalFunction::parse(&["x"], &["-x"]).expect("should compile");
        let mut solver = Solver::new(&[0.1, 0.1], SolverSettings::default());
        let err = solver
            .solve_dynamics(&x0, &f)
            .expect_err("dynamics dimension mismatch");
        assert!(err.to_string().contains("Dynamics dimension mismatch"));
    }

    #[test]
    fn wide_threshold_accepts_without_bisection() {
        let x0 = TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.25, &[Interval::new(-1.0, 1.0)]);
        let settings = SolverSettings {
            refining_fxpt_ratio: -1.0,
            var3b_fxpt_ratio: -1.0,
            ..SolverSettings::default()
        };
        let mut solver = Solver::new(&[2.0], settings);
        let constraint = |_: &mut TubeVector, _: f64, _: bool| {};
        let solutions = solver.solve_constraints(&x0, &constraint).expect("valid problem");
        assert_eq!(solutions, vec![x0]);
        assert_eq!(solver.bisections(), 0);
    }

    #[test]
    fn constraint_only_search_bisects_until_thin() {
        // x(t) stays constant and x(0)² = 1: two solutions, x ≡ -1 and x ≡ 1.
        let x0 = TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.5, &[Interval::new(-2.0, 2.0)]);
        let constraint = |x: &mut TubeVector, _: f64, _: bool| {
            let hull = x.codomain()[0];
            let start = x[0].gate(0).inverse_sqr(&Interval::point(1.0));
            let mut value = hull & start;
            for k in 0..=x.nb_slices() {
                value &= x[0].gate(k);
            }
            for k in 0..=x.nb_slices() {
                x[0].set_gate(k, value);
            }
            for i in 0..x.nb_slices() {
                let c = x[0].slice_codomain(i) & value;
                x[0].set_codomain(i, c);
            }
        };
        let settings = SolverSettings {
            refining_fxpt_ratio: -1.0,
            var3b_fxpt_ratio: -1.0,
            contraction_mode: ContractionMode::ConstraintsOnly,
            ..SolverSettings::default()
        };
        let mut solver = Solver::new(&[0.1], settings);
        let solutions = solver.solve_constraints(&x0, &constraint).expect("valid problem");
        assert_eq!(solutions.len(), 2);
        assert!(solver.bisections() > 0);

        let plus = Trajectory::analytic(Interval::new(0.0, 1.0), &["1"]).expect("compiles");
        let minus = Trajectory::analytic(Interval::new(0.0, 1.0), &["-1"]).expect("compiles");
        let zero = Trajectory::analytic(Interval::new(0.0, 1.0), &["0"]).expect("compiles");
        assert_eq!(solutions_contain(&solutions, &plus), BoolInterval::Yes);
        assert_eq!(solutions_contain(&solutions, &minus), BoolInterval::Yes);
        assert_eq!(solutions_contain(&solutions, &zero), BoolInterval::No);
    }

    #[test]
    fn seeded_random_policy_is_reproducible() {
        let f = IntervalFunction::parse(&["x"], &["0"]).expect("should compile");
        let x0 = TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.5, &[Interval::new(0.0, 1.0)]);
        let settings = SolverSettings {
            bisection_policy: BisectionPolicy::Random,
            refining_fxpt_ratio: -1.0,
            var3b_fxpt_ratio: -1.0,
            contraction_mode: ContractionMode::PicardDeriv,
            seed: 7,
            ..SolverSettings::default()
        };
        let run = || {
            let mut solver = Solver::new(&[0.3], settings);
            let solutions = solver.solve_dynamics(&x0, &f).expect("valid problem");
            (solutions, solver.bisections())
        };
        let (a, bisections_a) = run();
        let (b, bisections_b) = run();
        assert_eq!(a, b);
        assert_eq!(bisections_a, bisections_b);
        assert!(bisections_a > 0);
    }

    #[test]
    fn var3b_calls_constraints_only_when_enabled() {
        let calls = RefCell::new(Vec::new());
        let recorder = |_: &mut TubeVector, t0: f64, incremental: bool| {
            calls.borrow_mut().push((t0, incremental));
        };
        let problem = constraints_only(&recorder);
        let x0 = TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.5, &[Interval::new(-1.0, 1.0)]);

        for external in [false, true] {
            let settings = SolverSettings {
                var3b_external_contraction: external,
                var3b_time_policy: Var3bTimePolicy::UpperBound,
                ..SolverSettings::default()
            };
            let mut solver = Solver::new(&[0.1], settings);
            let mut x = x0.clone();

            solver.contraction(&problem, &mut x, 0.5, true, false);
            assert_eq!(calls.take(), vec![(0.5, true)]);
            solver.contraction(&problem, &mut x, 0.5, true, true);
            solver.fixed_point_var3b(&problem, &mut x);

            let var3b_calls = calls.take();
            if external {
                assert!(var3b_calls.len() > 1);
                assert_eq!(var3b_calls[0], (0.5, true));
                assert!(var3b_calls[1..].iter().all(|&call| call == (1.0, true)));
            } else {
                assert!(var3b_calls.is_empty());
            }
            assert_eq!(x.gate(2), vec![Interval::new(-1.0, 1.0)]);
        }
    }

    #[test]
    fn only_the_first_pass_is_incremental() {
        let calls = RefCell::new(Vec::new());
        let halve = |x: &mut TubeVector, t0: f64, incremental: bool| {
            calls.borrow_mut().push((t0, incremental));
            for i in 0..x.nb_slices() {
                let c = x[0].slice_codomain(i) * Interval::point(0.5);
                x[0].set_codomain(i, c);
            }
        };
        let problem = constraints_only(&halve);
        let mut x = TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.5, &[Interval::new(-1.0, 1.0)]);
        let solver = Solver::new(&[0.1], SolverSettings::default());

        // Diameters 1, 0.5, 0.25, 0.125, 0.0625: the fifth pass meets the threshold.
        solver.fixed_point_contraction(&problem, &mut x, 0.9, true, 0.5, false);
        let calls = calls.take();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[0], (0.5, true));
        assert!(calls[1..].iter().all(|&call| call == (0.5, false)));
        assert_eq!(x.codomain(), vec![Interval::new(-0.03125, 0.03125)]);
    }

    #[test]
    fn bisected_nodes_start_with_an_incremental_pass() {
        let calls = RefCell::new(Vec::new());
        let constraint = |x: &mut TubeVector, t0: f64, incremental: bool| {
            calls.borrow_mut().push((t0, incremental));
            let start = x[0].gate(0).inverse_sqr(&Interval::point(1.0));
            let mut value = x.codomain()[0] & start;
            for k in 0..=x.nb_slices() {
                value &= x[0].gate(k);
            }
            for i in 0..x.nb_slices() {
                x[0].set_codomain(i, value);
            }
        };
        let settings = SolverSettings {
            refining_fxpt_ratio: -1.0,
            var3b_fxpt_ratio: -1.0,
            contraction_mode: ContractionMode::ConstraintsOnly,
            ..SolverSettings::default()
        };
        let x0 = TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.5, &[Interval::new(-2.0, 2.0)]);
        let mut solver = Solver::new(&[0.1], settings);
        let solutions = solver.solve_constraints(&x0, &constraint).expect("valid problem");
        assert_eq!(solutions.len(), 2);

        let calls = calls.take();
        assert_eq!(calls[0], (0.0, false));
        let incremental = calls.iter().filter(|&&(_, incremental)| incremental).count();
        assert!(solver.bisections() > 0);
        assert_eq!(incremental, 2 * solver.bisections());
    }
}
