pub mod deriv;
pub mod integration;
pub mod picard;

pub use deriv::CtcDeriv;
pub use integration::{CtcIntegration, DynKind};
pub use picard::CtcPicard;

use crate::interval::{Interval, IntervalVector};
use crate::solver::settings::ContractionMode;
use crate::traits::DynamicalSystem;
use crate::tube::{Tube, TubeVector};

/// Direction(s) in which a contractor sweeps the slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePropag {
    Forward,
    Backward,
    ForwardBackward,
}

impl TimePropag {
    pub fn forward(self) -> bool {
        matches!(self, TimePropag::Forward | TimePropag::ForwardBackward)
    }

    pub fn backward(self) -> bool {
        matches!(self, TimePropag::Backward | TimePropag::ForwardBackward)
    }
}

/// Evaluates `f` on every slice and gate of `x`, giving an enclosure of `x'`
/// with the same slicing.
pub fn derivative_tube<F: DynamicalSystem + ?Sized>(f: &F, x: &TubeVector) -> TubeVector {
    let n = x.nb_slices();
    let dim = x.size();
    let mut codomains = vec![Vec::with_capacity(n); dim];
    let mut gates = vec![Vec::with_capacity(n + 1); dim];

    for (k, &t) in x.times().iter().enumerate() {
        let v = eval_on_tube(f, Interval::point(t), &x.gate(k), x);
        for (dst, val) in gates.iter_mut().zip(v) {
            dst.push(val);
        }
    }
    for i in 0..n {
        let v = eval_on_tube(f, x.slice_tdomain(i), &x.slice_codomain(i), x);
        for (dst, val) in codomains.iter_mut().zip(v) {
            dst.push(val);
        }
    }

    TubeVector::from_tubes(
        codomains
            .into_iter()
            .zip(gates)
            .map(|(c, g)| Tube::from_parts(x.times().to_vec(), c, g))
            .collect(),
    )
}

pub(crate) fn eval_on_tube<F: DynamicalSystem + ?Sized>(
    f: &F,
    t: Interval,
    state: &[Interval],
    tube: &TubeVector,
) -> IntervalVector {
    let mut out = vec![Interval::ENTIRE; f.dimension()];
    f.apply_on_tube(t, state, tube, &mut out);
    out
}

/// Enclosure of `t1 - t0` for a slice domain.
pub(crate) fn slice_width(tdom: Interval) -> Interval {
    Interval::point(tdom.ub()) - Interval::point(tdom.lb())
}

pub(crate) fn is_bounded(x: &[Interval]) -> bool {
    x.iter().all(|c| !c.is_empty() && !c.is_unbounded())
}

/// ODE contraction strategy selected by [`ContractionMode`].
#[derive(Debug, Clone, Copy)]
pub enum OdeContractor {
    Integration(CtcIntegration),
    PicardDeriv { picard: CtcPicard, deriv: CtcDeriv },
    Disabled,
}

impl OdeContractor {
    pub fn from_mode(mode: ContractionMode) -> Self {
        let integration = |kind| {
            OdeContractor::Integration(CtcIntegration {
                kind,
                picard_mode: false,
                incremental: false,
            })
        };
        match mode {
            ContractionMode::Basic => integration(DynKind::Basic),
            ContractionMode::Cid => integration(DynKind::Cid),
            ContractionMode::CidGuess => integration(DynKind::CidGuess),
            ContractionMode::ConstraintsOnly => OdeContractor::Disabled,
            ContractionMode::PicardDeriv => OdeContractor::PicardDeriv {
                picard: CtcPicard {
                    preserve_slicing: true,
                    ..CtcPicard::default()
                },
                deriv: CtcDeriv,
            },
        }
    }

    /// Contracts `x` against `f`. `t0` and `incremental` tell where new
    /// information appeared; `var3b` skips the Picard stage.
    pub fn contract<F: DynamicalSystem + ?Sized>(
        &self,
        f: &F,
        x: &mut TubeVector,
        t0: f64,
        incremental: bool,
        var3b: bool,
    ) {
        let tdomain = x.tdomain();
        match self {
            OdeContractor::Integration(ctc) => {
                let ctc = CtcIntegration {
                    picard_mode: x.volume() >= f64::MAX,
                    incremental: false,
                    ..*ctc
                };
                ctc.contract(f, x, tdomain.lb(), TimePropag::Forward);
                ctc.contract(f, x, tdomain.ub(), TimePropag::Backward);
            }
            OdeContractor::PicardDeriv { picard, deriv } => {
                if !var3b && x.volume() >= f64::MAX {
                    picard.contract(f, x, TimePropag::ForwardBackward);
                }
                let v = derivative_tube(f, x);
                let propag = if incremental && t0 == tdomain.lb() {
                    TimePropag::Forward
                } else if incremental && t0 == tdomain.ub() {
                    TimePropag::Backward
                } else {
                    TimePropag::ForwardBackward
                };
                deriv.contract(x, &v, propag);
            }
            OdeContractor::Disabled => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::IntervalFunction;

    #[test]
    fn derivative_tube_follows_slicing() {
        let f = IntervalFunction::parse(&["x"], &["-x"]).expect("should compile");
        let x = TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.5, &[Interval::new(1.0, 2.0)]);
        let v = derivative_tube(&f, &x);
        assert_eq!(v.nb_slices(), 2);
        assert_eq!(v.slice_codomain(1), vec![Interval::new(-2.0, -1.0)]);
        assert_eq!(v.gate(2), vec![Interval::new(-2.0, -1.0)]);
    }

    #[test]
    fn every_mode_contracts_without_losing_the_solution() {
        let f = IntervalFunction::parse(&["x"], &["-x"]).expect("should compile");
        for mode in [
            ContractionMode::Basic,
            ContractionMode::Cid,
            ContractionMode::CidGuess,
            ContractionMode::PicardDeriv,
        ] {
            let mut x = TubeVector::new(Interval::new(0.0, 1.0), 0.1, 1);
            x.set(&[Interval::new(0.9, 1.1)], 0.0);
            let ctc = OdeContractor::from_mode(mode);
            ctc.contract(&f, &mut x, 0.0, false, false);
            ctc.contract(&f, &mut x, 0.0, false, false);
            assert!(x.volume() < f64::MAX, "{:?} left the tube unbounded", mode);
            for (k, &t) in x.times().iter().enumerate() {
                let truth = (-t).exp();
                assert!(x.gate(k)[0].contains(truth), "{:?} lost exp(-{})", mode, t);
            }
        }
    }

    #[test]
    fn contraction_never_increases_volume() {
        let f = IntervalFunction::parse(&["x"], &["-x"]).expect("should compile");
        for mode in [ContractionMode::Basic, ContractionMode::Cid, ContractionMode::PicardDeriv] {
            let mut x = TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.25, &[Interval::new(-1.0, 2.0)]);
            x.set(&[Interval::new(0.5, 1.0)], 0.0);
            let ctc = OdeContractor::from_mode(mode);
            let mut before = x.volume();
            for _ in 0..3 {
                ctc.contract(&f, &mut x, 0.0, false, false);
                let after = x.volume();
                assert!(after <= before, "{:?} grew the tube", mode);
                before = after;
            }
        }
    }

    #[test]
    fn constraints_only_mode_leaves_tube_untouched() {
        let f = IntervalFunction::parse(&["x"], &["-x"]).expect("should compile");
        let mut x = TubeVector::new(Interval::new(0.0, 1.0), 0.5, 1);
        let before = x.clone();
        OdeContractor::from_mode(ContractionMode::ConstraintsOnly).contract(
            &f, &mut x, 0.0, false, false,
        );
        assert_eq!(x, before);
    }
}
