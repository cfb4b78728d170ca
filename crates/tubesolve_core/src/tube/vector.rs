use super::{merge_times, Tube};
use crate::error::TubeError;
use crate::interval::{Interval, IntervalVector};
use crate::trajectory::{BoolInterval, Trajectory};
use log::warn;
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Index, IndexMut};

/// Vector of tubes sharing one time partition.
///
/// Sampling goes through the vector so that all components keep identical
/// breakpoints; components are reachable by index for contraction.
#[derive(Debug, Clone, PartialEq)]
pub struct TubeVector {
    components: Vec<Tube>,
}

impl TubeVector {
    /// `dim` unbounded tubes over `tdomain`.
    pub fn new(tdomain: Interval, time_step: f64, dim: usize) -> Self {
        assert!(dim > 0, "a tube vector needs at least one component");
        Self {
            components: vec![Tube::new(tdomain, time_step); dim],
        }
    }

    pub fn from_codomain(tdomain: Interval, time_step: f64, codomain: &[Interval]) -> Self {
        assert!(!codomain.is_empty(), "a tube vector needs at least one component");
        Self {
            components: codomain
                .iter()
                .map(|c| Tube::from_codomain(tdomain, time_step, *c))
                .collect(),
        }
    }

    pub fn from_tubes(components: Vec<Tube>) -> Self {
        assert!(!components.is_empty(), "a tube vector needs at least one component");
        let times = components[0].times();
        assert!(
            components.iter().all(|c| c.times() == times),
            "components must share the same time partition"
        );
        Self { components }
    }

    pub fn size(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[Tube] {
        &self.components
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tube> {
        self.components.iter()
    }

    pub fn nb_slices(&self) -> usize {
        self.components[0].nb_slices()
    }

    pub fn tdomain(&self) -> Interval {
        self.components[0].tdomain()
    }

    pub fn times(&self) -> &[f64] {
        self.components[0].times()
    }

    pub fn slice_tdomain(&self, i: usize) -> Interval {
        self.components[0].slice_tdomain(i)
    }

    pub fn codomain(&self) -> IntervalVector {
        self.components.iter().map(Tube::codomain).collect()
    }

    pub fn slice_codomain(&self, i: usize) -> IntervalVector {
        self.components.iter().map(|c| c.slice_codomain(i)).collect()
    }

    pub fn input_gate(&self, i: usize) -> IntervalVector {
        self.gate(i)
    }

    pub fn output_gate(&self, i: usize) -> IntervalVector {
        self.gate(i + 1)
    }

    pub fn gate(&self, k: usize) -> IntervalVector {
        self.components.iter().map(|c| c.gate(k)).collect()
    }

    pub fn eval(&self, t: f64) -> IntervalVector {
        self.components.iter().map(|c| c.eval(t)).collect()
    }

    pub fn eval_over(&self, tdom: Interval) -> IntervalVector {
        self.components.iter().map(|c| c.eval_over(tdom)).collect()
    }

    /// Sets the value at `t`, sampling every component there first.
    pub fn set(&mut self, values: &[Interval], t: f64) {
        assert_eq!(values.len(), self.size(), "dimension mismatch in TubeVector::set");
        for (tube, y) in self.components.iter_mut().zip(values) {
            tube.set(*y, t);
        }
    }

    pub fn sample(&mut self, t: f64) -> bool {
        let mut sampled = false;
        for tube in &mut self.components {
            sampled |= tube.sample(t);
        }
        sampled
    }

    /// Sum of the component volumes, `f64::MAX` when any of them is unbounded.
    pub fn volume(&self) -> f64 {
        let mut volume = 0.0;
        for tube in &self.components {
            let v = tube.volume();
            if v >= f64::MAX {
                return f64::MAX;
            }
            volume += v;
        }
        volume.min(f64::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.components.iter().any(Tube::is_empty)
    }

    pub fn max_diam(&self) -> f64 {
        self.components
            .iter()
            .map(Tube::max_diam)
            .fold(0.0, f64::max)
    }

    /// Largest gate diameter over all components, with its time.
    pub fn max_gate_diam(&self) -> (f64, f64) {
        let mut best = self.components[0].max_gate_diam();
        for tube in &self.components[1..] {
            let candidate = tube.max_gate_diam();
            if candidate.0 > best.0 {
                best = candidate;
            }
        }
        best
    }

    pub fn widest_slice(&self) -> usize {
        self.components[0].widest_slice()
    }

    /// Slice with the largest gate discrepancy over all components.
    pub fn steepest_slice(&self) -> usize {
        let steepness = |i: usize| {
            self.components
                .iter()
                .map(|c| c.steepness(i))
                .fold(0.0, f64::max)
        };
        let mut best = 0;
        for i in 1..self.nb_slices() {
            if steepness(i) > steepness(best) {
                best = i;
            }
        }
        best
    }

    /// Samples at `t` and splits the widest gate component there.
    /// Both halves keep the whole time domain.
    pub fn bisect(&self, t: f64, ratio: f64) -> Result<(TubeVector, TubeVector), TubeError> {
        self.check_time(t)?;
        let mut base = self.clone();
        base.sample(t);
        let gate = base.eval(t);
        let mut widest = 0;
        for (k, g) in gate.iter().enumerate() {
            if g.diam() > gate[widest].diam() {
                widest = k;
            }
        }
        base.bisect_sampled(t, widest, ratio)
    }

    /// Value bisection of component `k` at `t`.
    pub fn bisect_dim(
        &self,
        t: f64,
        k: usize,
        ratio: f64,
    ) -> Result<(TubeVector, TubeVector), TubeError> {
        self.check_time(t)?;
        let mut base = self.clone();
        base.sample(t);
        base.bisect_sampled(t, k, ratio)
    }

    fn bisect_sampled(
        self,
        t: f64,
        k: usize,
        ratio: f64,
    ) -> Result<(TubeVector, TubeVector), TubeError> {
        let (lo, hi) = self.components[k].bisect(t, ratio)?;
        let mut first = self.clone();
        first.components[k] = lo;
        let mut second = self;
        second.components[k] = hi;
        Ok((first, second))
    }

    fn check_time(&self, t: f64) -> Result<(), TubeError> {
        let domain = self.tdomain();
        if domain.contains(t) {
            Ok(())
        } else {
            Err(TubeError::OutOfDomain {
                t,
                lb: domain.lb(),
                ub: domain.ub(),
            })
        }
    }

    pub fn enforce_gate_inclusion(&mut self) {
        for tube in &mut self.components {
            tube.enforce_gate_inclusion();
        }
    }

    /// Whether `truth` is inside (YES), outside (NO) or undecided (MAYBE).
    pub fn contains(&self, truth: &Trajectory) -> BoolInterval {
        assert_eq!(
            truth.dim(),
            self.size(),
            "trajectory and tube vector dimensions differ"
        );
        if !truth.domain().is_superset(&self.tdomain()) {
            warn!(
                "trajectory domain {} does not cover tube domain {}",
                truth.domain(),
                self.tdomain()
            );
            return BoolInterval::Maybe;
        }

        let mut result = BoolInterval::Yes;
        let mut check = |x: &[Interval], y: &[Interval]| -> bool {
            for (xi, yi) in x.iter().zip(y) {
                if (*xi & *yi).is_empty() {
                    return false;
                }
                if !yi.is_subset(xi) {
                    result = BoolInterval::Maybe;
                }
            }
            true
        };

        for (k, &t) in self.times().iter().enumerate() {
            if !check(&self.gate(k)[..], &truth.eval(Interval::point(t))[..]) {
                return BoolInterval::No;
            }
        }
        for i in 0..self.nb_slices() {
            if !check(&self.slice_codomain(i)[..], &truth.eval(self.slice_tdomain(i))[..]) {
                return BoolInterval::No;
            }
        }
        result
    }

    fn combine(&self, other: &TubeVector, op: fn(&Tube, &Tube) -> Tube) -> TubeVector {
        assert_eq!(
            self.size(),
            other.size(),
            "cannot combine tube vectors of different dimensions"
        );
        assert_eq!(
            self.tdomain(),
            other.tdomain(),
            "cannot combine tube vectors with different time domains"
        );
        let times = merge_times(self.times(), other.times());
        TubeVector {
            components: self
                .components
                .iter()
                .zip(&other.components)
                .map(|(a, b)| op(&a.refined(&times), &b.refined(&times)))
                .collect(),
        }
    }
}

impl Index<usize> for TubeVector {
    type Output = Tube;
    fn index(&self, i: usize) -> &Tube {
        &self.components[i]
    }
}

impl IndexMut<usize> for TubeVector {
    fn index_mut(&mut self, i: usize) -> &mut Tube {
        &mut self.components[i]
    }
}

impl BitOr for &TubeVector {
    type Output = TubeVector;
    fn bitor(self, rhs: &TubeVector) -> TubeVector {
        self.combine(rhs, |a, b| a | b)
    }
}

impl BitAnd for &TubeVector {
    type Output = TubeVector;
    fn bitand(self, rhs: &TubeVector) -> TubeVector {
        self.combine(rhs, |a, b| a & b)
    }
}

impl BitOrAssign<&TubeVector> for TubeVector {
    fn bitor_assign(&mut self, rhs: &TubeVector) {
        *self = &*self | rhs;
    }
}

impl BitAndAssign<&TubeVector> for TubeVector {
    fn bitand_assign(&mut self, rhs: &TubeVector) {
        *self = &*self & rhs;
    }
}

impl fmt::Display for TubeVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}↦(", self.tdomain())?;
        for (i, c) in self.codomain().iter().enumerate() {
            if i > 0 {
                write!(f, " ; ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "), {} slices", self.nb_slices())
    }
}
