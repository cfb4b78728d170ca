pub mod vector;

pub use vector::TubeVector;

use crate::error::TubeError;
use crate::interval::Interval;
use crate::interval_tube::IntervalTube;
use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Default split ratio when bisecting a gate.
pub const BISECTION_RATIO: f64 = 0.49;

/// One-dimensional sliced enclosure.
///
/// The time domain is partitioned by breakpoints `t_0 < … < t_n`. Slice `i`
/// covers `[t_i, t_{i+1}]` and holds a codomain; gate `k` encloses the value
/// at `t_k` and is shared by slice `k-1` (as output gate) and slice `k` (as
/// input gate). Every gate is a subset of its adjacent codomains.
#[derive(Debug, Clone, PartialEq)]
pub struct Tube {
    times: Vec<f64>,
    codomains: Vec<Interval>,
    gates: Vec<Interval>,
}

impl Tube {
    /// Tube over `tdomain` with slices of width `time_step` (the last one is
    /// clipped to the domain), unbounded everywhere.
    pub fn new(tdomain: Interval, time_step: f64) -> Self {
        Self::from_codomain(tdomain, time_step, Interval::ENTIRE)
    }

    pub fn from_codomain(tdomain: Interval, time_step: f64, codomain: Interval) -> Self {
        assert!(
            !tdomain.is_degenerated() && !tdomain.is_unbounded(),
            "time domain must be bounded with positive width, got {}",
            tdomain
        );
        let times = partition(tdomain, time_step);
        let n = times.len() - 1;
        Self {
            times,
            codomains: vec![codomain; n],
            gates: vec![codomain; n + 1],
        }
    }

    pub(crate) fn from_parts(times: Vec<f64>, codomains: Vec<Interval>, gates: Vec<Interval>) -> Self {
        debug_assert_eq!(times.len(), codomains.len() + 1);
        debug_assert_eq!(times.len(), gates.len());
        Self {
            times,
            codomains,
            gates,
        }
    }

    /// Uniformly sliced tube rebuilt from an [`IntervalTube`]. Inner gates are
    /// the intersection of the two adjacent slices.
    pub fn from_interval_tube(tube: &IntervalTube) -> Self {
        let n = tube.size();
        let mut times = Vec::with_capacity(n + 1);
        let mut codomains = Vec::with_capacity(n);
        for i in 0..n {
            if let Some(slice) = tube.slice(i) {
                times.push(slice.domain().lb());
                codomains.push(slice.value());
            }
        }
        times.push(tube.domain().ub());
        let mut gates = Vec::with_capacity(n + 1);
        gates.push(codomains[0]);
        for pair in codomains.windows(2) {
            gates.push(pair[0] & pair[1]);
        }
        gates.push(codomains[codomains.len() - 1]);
        Self::from_parts(times, codomains, gates)
    }

    /// Uniform resampling of this tube, each leaf holding the tube's hull over its time span.
    pub fn to_interval_tube(&self, time_step: f64) -> IntervalTube {
        let mut tube = IntervalTube::new(self.tdomain(), time_step, Interval::ENTIRE);
        for i in 0..tube.size() {
            if let Some(tdom) = tube.slice_domain(i) {
                tube.set(i, self.eval_over(tdom));
            }
        }
        tube
    }

    pub fn nb_slices(&self) -> usize {
        self.codomains.len()
    }

    pub fn tdomain(&self) -> Interval {
        Interval::new(self.times[0], self.times[self.times.len() - 1])
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn codomains(&self) -> &[Interval] {
        &self.codomains
    }

    pub fn gates(&self) -> &[Interval] {
        &self.gates
    }

    pub fn slice_tdomain(&self, i: usize) -> Interval {
        Interval::new(self.times[i], self.times[i + 1])
    }

    pub fn slice_codomain(&self, i: usize) -> Interval {
        self.codomains[i]
    }

    /// Hull of all codomains.
    pub fn codomain(&self) -> Interval {
        self.codomains
            .iter()
            .fold(Interval::EMPTY, |acc, c| acc | *c)
    }

    pub fn input_gate(&self, i: usize) -> Interval {
        self.gates[i]
    }

    pub fn output_gate(&self, i: usize) -> Interval {
        self.gates[i + 1]
    }

    pub fn gate(&self, k: usize) -> Interval {
        self.gates[k]
    }

    /// Index of the slice containing `t`; a breakpoint maps to the slice it starts.
    pub fn slice_index(&self, t: f64) -> Option<usize> {
        if !self.tdomain().contains(t) {
            return None;
        }
        let after = self.times.partition_point(|&s| s <= t);
        Some((after - 1).min(self.nb_slices() - 1))
    }

    /// Index of the gate located exactly at `t`.
    pub fn gate_index(&self, t: f64) -> Option<usize> {
        self.times.binary_search_by(|s| s.total_cmp(&t)).ok()
    }

    pub fn set_codomain(&mut self, i: usize, y: Interval) {
        self.codomains[i] = y;
        self.gates[i] &= y;
        self.gates[i + 1] &= y;
    }

    /// Assigns gate `k`, restricted to its adjacent codomains.
    pub fn set_gate(&mut self, k: usize, y: Interval) {
        let mut gate = y;
        if k > 0 {
            gate &= self.codomains[k - 1];
        }
        if k < self.codomains.len() {
            gate &= self.codomains[k];
        }
        self.gates[k] = gate;
    }

    /// Sets the value at `t`, sampling the tube there first.
    pub fn set(&mut self, y: Interval, t: f64) {
        self.sample(t);
        if let Some(k) = self.gate_index(t) {
            self.set_gate(k, y);
        }
    }

    /// Splits the slice strictly containing `t`. The new gate takes the slice codomain.
    /// Returns `false` when `t` is outside the domain or already a breakpoint.
    pub fn sample(&mut self, t: f64) -> bool {
        let i = match self.slice_index(t) {
            Some(i) => i,
            None => return false,
        };
        if t <= self.times[i] || t >= self.times[i + 1] {
            return false;
        }
        let codomain = self.codomains[i];
        self.times.insert(i + 1, t);
        self.codomains.insert(i + 1, codomain);
        self.gates.insert(i + 1, codomain);
        true
    }

    /// Value at `t`: the gate on a breakpoint, the slice codomain elsewhere.
    pub fn eval(&self, t: f64) -> Interval {
        if let Some(k) = self.gate_index(t) {
            return self.gates[k];
        }
        match self.slice_index(t) {
            Some(i) => self.codomains[i],
            None => Interval::EMPTY,
        }
    }

    /// Hull of the values over `tdom`.
    pub fn eval_over(&self, tdom: Interval) -> Interval {
        let tdom = tdom & self.tdomain();
        if tdom.is_empty() {
            return Interval::EMPTY;
        }
        if tdom.is_degenerated() {
            return self.eval(tdom.lb());
        }
        let mut result = Interval::EMPTY;
        let start = self.slice_index(tdom.lb()).unwrap_or(0);
        for i in start..self.nb_slices() {
            if self.times[i] > tdom.ub() {
                break;
            }
            let overlap = self.slice_tdomain(i) & tdom;
            if overlap.is_empty() {
                continue;
            }
            result |= if overlap.is_degenerated() {
                self.eval(overlap.lb())
            } else {
                self.codomains[i]
            };
        }
        result
    }

    /// Σ dt·diam over non-empty slices, `f64::MAX` when a codomain is unbounded.
    pub fn volume(&self) -> f64 {
        let mut volume = 0.0;
        for (i, c) in self.codomains.iter().enumerate() {
            if c.is_empty() {
                continue;
            }
            if c.is_unbounded() {
                return f64::MAX;
            }
            volume += (self.times[i + 1] - self.times[i]) * c.diam();
        }
        volume.min(f64::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.codomains.iter().any(Interval::is_empty) || self.gates.iter().any(Interval::is_empty)
    }

    pub fn max_diam(&self) -> f64 {
        self.codomains
            .iter()
            .map(Interval::diam)
            .fold(0.0, f64::max)
    }

    /// Largest gate diameter and the (first) time where it is reached.
    pub fn max_gate_diam(&self) -> (f64, f64) {
        let mut best = (self.gates[0].diam(), self.times[0]);
        for (gate, &t) in self.gates.iter().zip(&self.times).skip(1) {
            let d = gate.diam();
            if d > best.0 {
                best = (d, t);
            }
        }
        best
    }

    /// Index of the slice with the largest time width.
    pub fn widest_slice(&self) -> usize {
        let mut best = 0;
        for i in 1..self.nb_slices() {
            if self.slice_tdomain(i).diam() > self.slice_tdomain(best).diam() {
                best = i;
            }
        }
        best
    }

    /// Discrepancy `|mid(output gate) - mid(input gate)|` of slice `i`.
    pub fn steepness(&self, i: usize) -> f64 {
        let (a, b) = (self.gates[i], self.gates[i + 1]);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        (b.mid() - a.mid()).abs()
    }

    pub fn steepest_slice(&self) -> usize {
        let mut best = 0;
        for i in 1..self.nb_slices() {
            if self.steepness(i) > self.steepness(best) {
                best = i;
            }
        }
        best
    }

    /// Splits the gate value at `t` in two. Both halves keep the whole time domain.
    pub fn bisect(&self, t: f64, ratio: f64) -> Result<(Tube, Tube), TubeError> {
        let domain = self.tdomain();
        if !domain.contains(t) {
            return Err(TubeError::OutOfDomain {
                t,
                lb: domain.lb(),
                ub: domain.ub(),
            });
        }
        let mut base = self.clone();
        base.sample(t);
        let k = base
            .gate_index(t)
            .ok_or_else(|| TubeError::not_bisectable(t, "no gate at this time"))?;
        let gate = base.gates[k];
        let (lo, hi) = gate
            .bisect(ratio)
            .ok_or_else(|| TubeError::not_bisectable(t, format!("gate {} cannot be split", gate)))?;
        let mut first = base.clone();
        first.gates[k] = lo;
        let mut second = base;
        second.gates[k] = hi;
        Ok((first, second))
    }

    /// Restores `gate ⊆ adjacent codomains` everywhere.
    pub fn enforce_gate_inclusion(&mut self) {
        let n = self.codomains.len();
        for k in 0..=n {
            if k > 0 {
                self.gates[k] &= self.codomains[k - 1];
            }
            if k < n {
                self.gates[k] &= self.codomains[k];
            }
        }
    }

    pub(crate) fn codomain_mut(&mut self, i: usize) -> &mut Interval {
        &mut self.codomains[i]
    }

    pub(crate) fn gate_mut(&mut self, k: usize) -> &mut Interval {
        &mut self.gates[k]
    }

    /// Same values over a finer partition containing all current breakpoints.
    pub(crate) fn refined(&self, times: &[f64]) -> Tube {
        let n = times.len() - 1;
        let mut codomains = Vec::with_capacity(n);
        let mut gates = Vec::with_capacity(n + 1);
        for (j, &t) in times.iter().enumerate() {
            let gate = match self.gate_index(t) {
                Some(k) => self.gates[k],
                None => self.eval(t),
            };
            gates.push(gate);
            if j < n {
                let i = self.slice_index(t).unwrap_or(0);
                codomains.push(self.codomains[i]);
            }
        }
        Tube::from_parts(times.to_vec(), codomains, gates)
    }

    fn combine(&self, other: &Tube, op: fn(Interval, Interval) -> Interval) -> Tube {
        assert_eq!(
            self.tdomain(),
            other.tdomain(),
            "cannot combine tubes with different time domains"
        );
        let times = merge_times(&self.times, &other.times);
        let a = self.refined(&times);
        let b = other.refined(&times);
        Tube::from_parts(
            times,
            a.codomains.iter().zip(&b.codomains).map(|(x, y)| op(*x, *y)).collect(),
            a.gates.iter().zip(&b.gates).map(|(x, y)| op(*x, *y)).collect(),
        )
    }
}

pub(crate) fn partition(tdomain: Interval, time_step: f64) -> Vec<f64> {
    let (lb, ub) = (tdomain.lb(), tdomain.ub());
    let mut times = vec![lb];
    if time_step > 0.0 && time_step.is_finite() {
        let mut i = 1u64;
        loop {
            let t = lb + i as f64 * time_step;
            if t >= ub {
                break;
            }
            times.push(t);
            i += 1;
        }
    }
    times.push(ub);
    times
}

/// Sorted union of two breakpoint lists.
pub(crate) fn merge_times(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let next = match (a.get(i), b.get(j)) {
            (Some(&x), Some(&y)) if x < y => {
                i += 1;
                x
            }
            (Some(&x), Some(&y)) if y < x => {
                j += 1;
                y
            }
            (Some(&x), Some(_)) => {
                i += 1;
                j += 1;
                x
            }
            (Some(&x), None) => {
                i += 1;
                x
            }
            (None, Some(&y)) => {
                j += 1;
                y
            }
            (None, None) => break,
        };
        merged.push(next);
    }
    merged
}

impl BitOr for &Tube {
    type Output = Tube;
    fn bitor(self, rhs: &Tube) -> Tube {
        self.combine(rhs, |a, b| a | b)
    }
}

impl BitAnd for &Tube {
    type Output = Tube;
    fn bitand(self, rhs: &Tube) -> Tube {
        self.combine(rhs, |a, b| a & b)
    }
}

impl fmt::Display for Tube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}↦{}, {} slices",
            self.tdomain(),
            self.codomain(),
            self.nb_slices()
        )
    }
}
