//! End-to-end solves of small reference problems.

use super::*;
use crate::equation_engine::IntervalFunction;
use crate::interval::Interval;

fn assert_not_excluded(solutions: &[TubeVector], truth: &Trajectory) {
    let answer = solutions_contain(solutions, truth);
    assert_ne!(answer, BoolInterval::No, "a true solution was pruned");
}

#[test]
fn exponential_decay_from_uncertain_start() {
    let domain = Interval::new(0.0, 1.0);
    let f = IntervalFunction::parse(&["x"], &["-x"]).expect("should compile");
    let mut x0 = TubeVector::new(domain, 0.1, 1);
    x0.set(&[Interval::new(0.5, 1.0)], 0.0);

    let settings = SolverSettings {
        contraction_mode: ContractionMode::CidGuess,
        refining_fxpt_ratio: 0.9,
        var3b_fxpt_ratio: -1.0,
        max_slices: 40,
        ..SolverSettings::default()
    };
    let mut solver = Solver::new(&[0.5], settings);
    let solutions = solver.solve_dynamics(&x0, &f).expect("valid problem");
    assert_eq!(solutions.len(), 1);

    let middle = Trajectory::analytic(domain, &["0.75 * exp(-t)"]).expect("compiles");
    assert_eq!(solutions_contain(&solutions, &middle), BoolInterval::Yes);
    for expr in ["0.5 * exp(-t)", "exp(-t)"] {
        let extreme = Trajectory::analytic(domain, &[expr]).expect("compiles");
        assert_not_excluded(&solutions, &extreme);
    }
    let above = Trajectory::analytic(domain, &["2 * exp(-t)"]).expect("compiles");
    assert_eq!(solutions_contain(&solutions, &above), BoolInterval::No);

    // Gates are pointwise enclosures of [0.5, 1]·e^{-t}.
    let x = &solutions[0];
    for (k, &t) in x.times().iter().enumerate() {
        let gate = x.gate(k)[0];
        let (low, high) = (0.5 * (-t).exp() - 0.05, (-t).exp() + 0.05);
        assert!(gate.lb() >= low, "gate {} at t = {} too low: {}", k, t, gate);
        assert!(gate.ub() <= high, "gate {} at t = {} too high: {}", k, t, gate);
    }
}

#[test]
fn circle_search_returns_one_solution() {
    let domain = Interval::new(0.0, std::f64::consts::PI);
    let f = IntervalFunction::parse(&["x1", "x2"], &["-x2", "x1"]).expect("should compile");
    let mut x0 = TubeVector::new(domain, domain.diam(), 2);
    x0.set(&[Interval::point(0.0), Interval::point(1.0)], 0.0);

    let settings = SolverSettings {
        contraction_mode: ContractionMode::CidGuess,
        refining_fxpt_ratio: 2.0,
        propa_fxpt_ratio: 0.0,
        var3b_fxpt_ratio: -1.0,
        max_slices: 256,
        ..SolverSettings::default()
    };
    assert_eq!(settings.bisection_policy, BisectionPolicy::MaxGateDiam);
    let mut solver = Solver::new(&[0.1, 0.1], settings);
    let solutions = solver.solve_dynamics(&x0, &f).expect("valid problem");

    assert_eq!(solutions.len(), 1);
    let x = &solutions[0];
    let volume = x.volume();
    assert!(volume > 0.0 && volume < f64::MAX);

    let truth = Trajectory::analytic(domain, &["-sin(t)", "cos(t)"]).expect("compiles");
    assert_not_excluded(&solutions, &truth);
    let end = x.output_gate(x.nb_slices() - 1);
    assert!(end[1].contains(-1.0));
}

/// `x'(t) = x(t)` while `t - delay` precedes the domain, `e^delay · x(t - delay)` after.
struct DelayedGrowth {
    delay: f64,
}

impl DynamicalSystem for DelayedGrowth {
    fn dimension(&self) -> usize {
        1
    }

    fn apply(&self, _t: Interval, x: &[Interval], out: &mut [Interval]) {
        out[0] = x[0];
    }

    fn apply_on_tube(&self, t: Interval, x: &[Interval], tube: &TubeVector, out: &mut [Interval]) {
        let tdomain = tube.tdomain();
        let delayed = t - Interval::point(self.delay);
        let mut v = Interval::EMPTY;
        if delayed.lb() <= tdomain.lb() {
            v |= x[0];
        }
        if delayed.ub() >= tdomain.lb() {
            let gain = Interval::point(self.delay).exp();
            v |= gain * tube[0].eval_over(delayed & tdomain);
        }
        out[0] = v;
    }
}

#[test]
fn delayed_boundary_value_problem_keeps_both_branches() {
    // x(0)² + x(1)² = 1 leaves x(t) = ±e^t / sqrt(1 + e²).
    let domain = Interval::new(0.0, 1.0);
    let x0 = TubeVector::new(domain, 0.1, 1);
    let dynamics = DelayedGrowth { delay: 0.5 };
    let boundary = |x: &mut TubeVector, _: f64, _: bool| {
        let last = x.nb_slices();
        let one = Interval::point(1.0);
        let end = x[0].gate(last);
        let start = x[0].gate(0).inverse_sqr(&(one - end.sqr()));
        let end = end.inverse_sqr(&(one - start.sqr()));
        x.set(&[start], domain.lb());
        x.set(&[end], domain.ub());
    };

    let settings = SolverSettings {
        contraction_mode: ContractionMode::PicardDeriv,
        stopping_mode: StoppingMode::BoundaryGate,
        refining_fxpt_ratio: 0.99,
        propa_fxpt_ratio: 0.99,
        var3b_fxpt_ratio: 0.0,
        max_slices: 64,
        ..SolverSettings::default()
    };
    let mut solver = Solver::new(&[0.05], settings);
    let solutions = solver
        .solve(&x0, Some(&dynamics), Some(&boundary))
        .expect("valid problem");
    assert!(!solutions.is_empty());

    let plus = Trajectory::analytic(domain, &["exp(t) / sqrt(1 + exp(2))"]).expect("compiles");
    let minus = Trajectory::analytic(domain, &["-exp(t) / sqrt(1 + exp(2))"]).expect("compiles");
    assert_eq!(solutions_contain(&solutions, &plus), BoolInterval::Yes);
    assert_eq!(solutions_contain(&solutions, &minus), BoolInterval::Yes);

    let zero = Trajectory::analytic(domain, &["0"]).expect("compiles");
    assert_eq!(solutions_contain(&solutions, &zero), BoolInterval::No);
}
