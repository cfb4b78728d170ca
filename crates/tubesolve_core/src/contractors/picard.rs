use super::{eval_on_tube, is_bounded, slice_width, TimePropag};
use crate::interval::{box_intersection, box_is_subset, Interval, IntervalVector};
use crate::traits::DynamicalSystem;
use crate::tube::TubeVector;
use log::debug;

const MAX_ITERATIONS: usize = 50;

/// Slices narrower than this fraction of the time domain are not split further.
const MIN_SLICE_FRACTION: f64 = 1e-3;

/// Bounds unbounded slices with a Picard–Lindelöf enclosure.
///
/// Starting from a bounded gate `x0`, a box `G` satisfying
/// `x0 + [0, dt]·f(G) ⊆ G` encloses every solution over the slice. Candidate
/// boxes are inflated by `delta` until this holds or the iteration budget is
/// exhausted. When `preserve_slicing` is off, a slice on which no enclosure is
/// found is sampled at its midpoint and both halves are tried again.
#[derive(Debug, Clone, Copy)]
pub struct CtcPicard {
    pub delta: f64,
    pub preserve_slicing: bool,
}

impl Default for CtcPicard {
    fn default() -> Self {
        Self {
            delta: 1.1,
            preserve_slicing: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Skipped,
    Enclosed,
    Failed,
}

impl CtcPicard {
    /// Returns whether at least one slice was bounded.
    pub fn contract<F: DynamicalSystem + ?Sized>(
        &self,
        f: &F,
        x: &mut TubeVector,
        propag: TimePropag,
    ) -> bool {
        let min_width = x.tdomain().diam() * MIN_SLICE_FRACTION;
        let mut enclosed = false;

        if propag.forward() {
            let mut i = 0;
            while i < x.nb_slices() {
                match self.contract_slice(f, x, i, true) {
                    Outcome::Failed if self.splittable(x, i, min_width) => {
                        x.sample(x.slice_tdomain(i).mid());
                    }
                    outcome => {
                        enclosed |= outcome == Outcome::Enclosed;
                        i += 1;
                    }
                }
            }
        }

        if propag.backward() {
            let mut i = x.nb_slices();
            while i > 0 {
                let k = i - 1;
                match self.contract_slice(f, x, k, false) {
                    Outcome::Failed if self.splittable(x, k, min_width) => {
                        x.sample(x.slice_tdomain(k).mid());
                        i = k + 2;
                    }
                    outcome => {
                        enclosed |= outcome == Outcome::Enclosed;
                        i -= 1;
                    }
                }
            }
        }

        enclosed
    }

    fn splittable(&self, x: &TubeVector, i: usize, min_width: f64) -> bool {
        !self.preserve_slicing && x.slice_tdomain(i).diam() > min_width
    }

    fn contract_slice<F: DynamicalSystem + ?Sized>(
        &self,
        f: &F,
        x: &mut TubeVector,
        i: usize,
        forward: bool,
    ) -> Outcome {
        if is_bounded(&x.slice_codomain(i)) {
            return Outcome::Skipped;
        }
        let (entry_k, exit_k) = if forward { (i, i + 1) } else { (i + 1, i) };
        let entry = x.gate(entry_k);
        if !is_bounded(&entry) {
            return Outcome::Skipped;
        }

        let tdom = x.slice_tdomain(i);
        match self.enclosure(f, x, tdom, &entry, forward) {
            Some((codomain, exit)) => {
                for j in 0..x.size() {
                    let tube = &mut x[j];
                    *tube.codomain_mut(i) &= codomain[j];
                    let c = tube.slice_codomain(i);
                    *tube.gate_mut(entry_k) &= c;
                    *tube.gate_mut(exit_k) &= exit[j] & c;
                }
                Outcome::Enclosed
            }
            None => {
                debug!("no Picard enclosure over {}", tdom);
                Outcome::Failed
            }
        }
    }

    /// Enclosure of the solutions over `tdom` through `entry`, together with
    /// an enclosure of the value at the other end of the slice.
    pub(crate) fn enclosure<F: DynamicalSystem + ?Sized>(
        &self,
        f: &F,
        x: &TubeVector,
        tdom: Interval,
        entry: &[Interval],
        forward: bool,
    ) -> Option<(IntervalVector, IntervalVector)> {
        let dt = slice_width(tdom);
        let span = Interval::new(0.0, dt.ub());
        let step = |v: &[Interval], h: Interval| -> IntervalVector {
            entry
                .iter()
                .zip(v)
                .map(|(e, v)| if forward { *e + h * *v } else { *e - h * *v })
                .collect()
        };

        let mut guess = entry.to_vec();
        for _ in 0..MAX_ITERATIONS {
            let next = step(&eval_on_tube(f, tdom, &guess, x), span);
            if !is_bounded(&next) {
                return None;
            }
            if box_is_subset(&next, &guess) {
                let v = eval_on_tube(f, tdom, &next, x);
                let codomain = box_intersection(&step(&v, span), &next);
                let exit = box_intersection(&step(&v, dt), &codomain);
                return Some((codomain, exit));
            }
            guess = next
                .iter()
                .zip(&guess)
                .map(|(n, g)| {
                    let hull = *n | *g;
                    let r = (self.delta - 1.0) * hull.rad()
                        + f64::EPSILON * (1.0 + hull.mid().abs());
                    hull.inflate(r)
                })
                .collect();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::IntervalFunction;

    #[test]
    fn bounds_slices_forward() {
        let f = IntervalFunction::parse(&["x"], &["-x"]).expect("should compile");
        let mut x = TubeVector::new(Interval::new(0.0, 1.0), 0.1, 1);
        x.set(&[Interval::point(1.0)], 0.0);
        assert!(CtcPicard::default().contract(&f, &mut x, TimePropag::Forward));
        assert!(x.volume() < f64::MAX);
        for (k, &t) in x.times().iter().enumerate() {
            assert!(x.gate(k)[0].contains((-t).exp()));
        }
    }

    #[test]
    fn bounds_slices_backward() {
        let f = IntervalFunction::parse(&["x"], &["1"]).expect("should compile");
        let mut x = TubeVector::new(Interval::new(0.0, 1.0), 0.25, 1);
        x.set(&[Interval::point(2.0)], 1.0);

        let mut forward_only = x.clone();
        assert!(!CtcPicard::default().contract(&f, &mut forward_only, TimePropag::Forward));

        assert!(CtcPicard::default().contract(&f, &mut x, TimePropag::Backward));
        assert!(x.gate(0)[0].contains(1.0));
        assert!(x.gate(0)[0].is_subset(&Interval::new(0.9, 1.1)));
    }

    #[test]
    fn long_slice_is_split_unless_slicing_is_preserved() {
        let f = IntervalFunction::parse(&["x"], &["x"]).expect("should compile");
        let mut x = TubeVector::new(Interval::new(0.0, 3.0), 3.0, 1);
        x.set(&[Interval::point(1.0)], 0.0);

        let mut preserved = x.clone();
        let ctc = CtcPicard {
            preserve_slicing: true,
            ..CtcPicard::default()
        };
        assert!(!ctc.contract(&f, &mut preserved, TimePropag::Forward));
        assert_eq!(preserved.nb_slices(), 1);
        assert_eq!(preserved.volume(), f64::MAX);

        assert!(CtcPicard::default().contract(&f, &mut x, TimePropag::Forward));
        assert!(x.nb_slices() > 1);
        assert!(x.volume() < f64::MAX);
        for (k, &t) in x.times().iter().enumerate() {
            assert!(x.gate(k)[0].contains(t.exp()));
        }
    }
}
