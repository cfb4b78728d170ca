use super::{eval_on_tube, is_bounded, slice_width, CtcPicard, TimePropag};
use crate::interval::{box_hull, box_intersection, box_is_empty, Interval, IntervalVector};
use crate::traits::DynamicalSystem;
use crate::tube::TubeVector;

const LOCAL_ITERATIONS: usize = 10;
const CID_SUBDIVISIONS: usize = 4;

/// How each slice is integrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynKind {
    /// Fixed point of `X = X ∩ (entry + [0, dt]·f(X))`.
    Basic,
    /// Basic integration on sub-gates of the widest entry component, hulled.
    Cid,
    /// Like `Cid`, seeding each sub-gate with its own Picard enclosure.
    CidGuess,
}

/// Integrates the dynamics slice by slice from a starting time.
///
/// In `picard_mode`, slices with an unbounded codomain are first bounded by a
/// Picard enclosure of their entry gate. With `incremental`, a sweep stops at
/// the first slice it fails to contract.
#[derive(Debug, Clone, Copy)]
pub struct CtcIntegration {
    pub kind: DynKind,
    pub picard_mode: bool,
    pub incremental: bool,
}

impl CtcIntegration {
    /// Sweeps forward from `t0` and/or backward to it. Returns whether
    /// anything was narrowed.
    pub fn contract<F: DynamicalSystem + ?Sized>(
        &self,
        f: &F,
        x: &mut TubeVector,
        t0: f64,
        propag: TimePropag,
    ) -> bool {
        let (start, end) = match (x[0].slice_index(t0), x[0].gate_index(t0)) {
            (_, Some(k)) => (k, k),
            (Some(i), None) => (i, i + 1),
            (None, None) => return false,
        };
        let mut contracted = false;

        if propag.forward() {
            for i in start..x.nb_slices() {
                let narrowed = self.contract_slice(f, x, i, true);
                contracted |= narrowed;
                if x.is_empty() || (self.incremental && !narrowed) {
                    break;
                }
            }
        }
        if propag.backward() && !x.is_empty() {
            for i in (0..end.min(x.nb_slices())).rev() {
                let narrowed = self.contract_slice(f, x, i, false);
                contracted |= narrowed;
                if x.is_empty() || (self.incremental && !narrowed) {
                    break;
                }
            }
        }
        contracted
    }

    fn contract_slice<F: DynamicalSystem + ?Sized>(
        &self,
        f: &F,
        x: &mut TubeVector,
        i: usize,
        forward: bool,
    ) -> bool {
        let (entry_k, exit_k) = if forward { (i, i + 1) } else { (i + 1, i) };
        let entry = x.gate(entry_k);
        if box_is_empty(&entry) {
            return false;
        }
        let tdom = x.slice_tdomain(i);

        let mut seed = x.slice_codomain(i);
        if !is_bounded(&seed) {
            if !self.picard_mode || !is_bounded(&entry) {
                return false;
            }
            match CtcPicard::default().enclosure(f, x, tdom, &entry, forward) {
                Some((codomain, _)) => seed = box_intersection(&seed, &codomain),
                None => return false,
            }
        }

        let (codomain, exit) = match self.kind {
            DynKind::Basic => integrate(f, x, tdom, &entry, &seed, forward),
            DynKind::Cid | DynKind::CidGuess => self.cid(f, x, tdom, &entry, &seed, forward),
        };

        let mut narrowed = false;
        for j in 0..x.size() {
            let tube = &mut x[j];
            let c = tube.slice_codomain(i) & codomain[j];
            let entry_gate = tube.gate(entry_k) & c;
            let exit_gate = tube.gate(exit_k) & exit[j] & c;
            narrowed |= c != tube.slice_codomain(i)
                || entry_gate != tube.gate(entry_k)
                || exit_gate != tube.gate(exit_k);
            *tube.codomain_mut(i) = c;
            *tube.gate_mut(entry_k) = entry_gate;
            *tube.gate_mut(exit_k) = exit_gate;
        }
        narrowed
    }

    fn cid<F: DynamicalSystem + ?Sized>(
        &self,
        f: &F,
        x: &TubeVector,
        tdom: Interval,
        entry: &[Interval],
        seed: &[Interval],
        forward: bool,
    ) -> (IntervalVector, IntervalVector) {
        let mut widest = 0;
        for (k, g) in entry.iter().enumerate() {
            if g.diam() > entry[widest].diam() {
                widest = k;
            }
        }
        if !is_bounded(entry) || entry[widest].is_degenerated() {
            return integrate(f, x, tdom, entry, seed, forward);
        }

        let mut codomain = vec![Interval::EMPTY; entry.len()];
        let mut exit = vec![Interval::EMPTY; entry.len()];
        for part in subdivide(entry[widest], CID_SUBDIVISIONS) {
            let mut sub_entry = entry.to_vec();
            sub_entry[widest] = part;
            let mut sub_seed = seed.to_vec();
            if self.kind == DynKind::CidGuess {
                if let Some((guess, _)) =
                    CtcPicard::default().enclosure(f, x, tdom, &sub_entry, forward)
                {
                    sub_seed = box_intersection(&sub_seed, &guess);
                }
            }
            let (c, e) = integrate(f, x, tdom, &sub_entry, &sub_seed, forward);
            if box_is_empty(&c) || box_is_empty(&e) {
                continue;
            }
            codomain = box_hull(&codomain, &c);
            exit = box_hull(&exit, &e);
        }
        (codomain, exit)
    }
}

fn integrate<F: DynamicalSystem + ?Sized>(
    f: &F,
    x: &TubeVector,
    tdom: Interval,
    entry: &[Interval],
    seed: &[Interval],
    forward: bool,
) -> (IntervalVector, IntervalVector) {
    let dt = slice_width(tdom);
    let span = Interval::new(0.0, dt.ub());
    let step = |v: &[Interval], h: Interval| -> IntervalVector {
        entry
            .iter()
            .zip(v)
            .map(|(e, v)| if forward { *e + h * *v } else { *e - h * *v })
            .collect()
    };

    let mut enclosure = seed.to_vec();
    for _ in 0..LOCAL_ITERATIONS {
        let v = eval_on_tube(f, tdom, &enclosure, x);
        let next = box_intersection(&enclosure, &step(&v, span));
        let stable = next == enclosure;
        enclosure = next;
        if stable || box_is_empty(&enclosure) {
            break;
        }
    }
    let v = eval_on_tube(f, tdom, &enclosure, x);
    let exit = box_intersection(&step(&v, dt), &enclosure);
    (enclosure, exit)
}

/// `n` consecutive pieces covering `x` exactly.
fn subdivide(x: Interval, n: usize) -> Vec<Interval> {
    let bound = |k: usize| {
        if k == 0 {
            x.lb()
        } else if k == n {
            x.ub()
        } else {
            x.lb() + x.diam() * k as f64 / n as f64
        }
    };
    (0..n).map(|k| Interval::new(bound(k), bound(k + 1))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::IntervalFunction;

    fn decay() -> IntervalFunction {
        IntervalFunction::parse(&["x"], &["-x"]).expect("should compile")
    }

    #[test]
    fn subdivision_covers_the_interval() {
        let parts = subdivide(Interval::new(0.0, 1.0), 4);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].lb(), 0.0);
        assert_eq!(parts[3].ub(), 1.0);
        for pair in parts.windows(2) {
            assert_eq!(pair[0].ub(), pair[1].lb());
        }
    }

    #[test]
    fn cid_is_at_least_as_tight_as_basic() {
        let f = decay();
        let mut basic = TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.25, &[Interval::new(-2.0, 2.0)]);
        basic.set(&[Interval::new(0.0, 1.0)], 0.0);
        let mut cid = basic.clone();

        let ctc = |kind| CtcIntegration {
            kind,
            picard_mode: false,
            incremental: false,
        };
        assert!(ctc(DynKind::Basic).contract(&f, &mut basic, 0.0, TimePropag::Forward));
        assert!(ctc(DynKind::Cid).contract(&f, &mut cid, 0.0, TimePropag::Forward));

        for k in 0..=basic.nb_slices() {
            assert!(cid.gate(k)[0].is_subset(&basic.gate(k)[0].inflate(1e-9)));
        }
        let last = basic.nb_slices();
        assert!(basic.gate(last)[0].contains(0.5 * (-1.0f64).exp()));
        assert!(cid.gate(last)[0].contains((-1.0f64).exp()));
    }

    #[test]
    fn picard_mode_bounds_unbounded_slices() {
        let f = decay();
        let mut x = TubeVector::new(Interval::new(0.0, 1.0), 0.1, 1);
        x.set(&[Interval::point(1.0)], 0.0);

        let mut plain = x.clone();
        let without = CtcIntegration {
            kind: DynKind::CidGuess,
            picard_mode: false,
            incremental: false,
        };
        assert!(!without.contract(&f, &mut plain, 0.0, TimePropag::Forward));

        let with = CtcIntegration {
            picard_mode: true,
            ..without
        };
        assert!(with.contract(&f, &mut x, 0.0, TimePropag::Forward));
        assert!(x.volume() < f64::MAX);
        assert!(x.output_gate(x.nb_slices() - 1)[0].contains((-1.0f64).exp()));
    }

    #[test]
    fn incremental_sweep_stops_at_first_idle_slice() {
        let f = decay();
        let mut x = TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.1, &[Interval::new(-10.0, 10.0)]);
        x.set(&[Interval::point(1.0)], 0.5);

        let incremental = CtcIntegration {
            kind: DynKind::Basic,
            picard_mode: false,
            incremental: true,
        };
        let mut idle = x.clone();
        assert!(!incremental.contract(&f, &mut idle, 0.0, TimePropag::Forward));
        assert_eq!(idle, x);

        assert!(incremental.contract(&f, &mut x, 0.5, TimePropag::Forward));
        let last = x.nb_slices();
        assert!(x.gate(last)[0].contains((-0.5f64).exp()));
        assert!(x.gate(last)[0].diam() < 1.0);
    }
}
