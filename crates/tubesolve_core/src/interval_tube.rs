use crate::error::TubeError;
use crate::interval::Interval;
use log::{error, warn};
use std::fmt;
use std::ops::{BitAndAssign, BitOrAssign};

/// Interval-valued function of time over a uniform partition, stored as a
/// binary tree whose internal nodes cache the hull of their leaves.
///
/// The list of slices is split at `ceil(n/2)` at every level. Leaves also
/// keep their "enclosed bounds" (the lower and upper bound of their value as
/// degenerate intervals); internal nodes keep the hull of those pairs, which
/// is what [`IntervalTube::time_integration`] works with.
///
/// Mutators resynchronise the ancestors of the leaves they touch.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalTube {
    domain: Interval,
    dt: f64,
    size: usize,
    value: Interval,
    enclosed_bounds: (Interval, Interval),
    children: Option<Box<(IntervalTube, IntervalTube)>>,
}

impl IntervalTube {
    /// Slices of width `time_step` from `domain.lb()` until `domain.ub()` is
    /// reached. The last slice may overhang the domain.
    pub fn new(domain: Interval, time_step: f64, default: Interval) -> Self {
        let mut slices = Vec::new();
        let mut ub = domain.lb();
        loop {
            let lb = ub;
            ub = lb + time_step;
            slices.push(Interval::new(lb, ub));
            if !(ub < domain.ub()) || !(time_step > 0.0) {
                break;
            }
        }
        let mut tube = Self::build(&slices, default);
        tube.update();
        tube
    }

    /// Builds a tube from contiguous slices, all sharing the width of the first one.
    pub fn from_slices(slices: &[Interval], default: Interval) -> Result<Self, TubeError> {
        if slices.is_empty() {
            return Err(TubeError::EmptySlicing);
        }
        let mut tube = Self::build(slices, default);
        tube.update();
        Ok(tube)
    }

    fn build(slices: &[Interval], default: Interval) -> Self {
        let first = slices[0];
        let last = slices[slices.len() - 1];
        let children = if slices.len() == 1 {
            None
        } else {
            let k = (slices.len() + 1) / 2;
            Some(Box::new((
                Self::build(&slices[..k], default),
                Self::build(&slices[k..], default),
            )))
        };
        Self {
            domain: Interval::new(first.lb(), last.ub()),
            dt: first.diam(),
            size: slices.len(),
            value: default,
            enclosed_bounds: (Interval::EMPTY, Interval::EMPTY),
            children,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn domain(&self) -> Interval {
        self.domain
    }

    /// Hull of all slice values.
    pub fn value(&self) -> Interval {
        self.value
    }

    pub fn is_slice(&self) -> bool {
        self.children.is_none()
    }

    pub fn enclosed_bounds(&self) -> (Interval, Interval) {
        self.enclosed_bounds
    }

    fn mid_index(&self) -> usize {
        (self.size + 1) / 2
    }

    /// The leaf at `index`, or `None` (with an error report) when out of range.
    pub fn slice(&self, index: usize) -> Option<&IntervalTube> {
        if index >= self.size {
            error!(
                "IntervalTube::slice: index {} out of range [0,{})",
                index, self.size
            );
            return None;
        }
        let mut node = self;
        let mut index = index;
        while let Some(children) = &node.children {
            let mid = node.mid_index();
            if index < mid {
                node = &children.0;
            } else {
                index -= mid;
                node = &children.1;
            }
        }
        Some(node)
    }

    fn slice_mut(&mut self, index: usize) -> Option<&mut IntervalTube> {
        if index >= self.size {
            error!(
                "IntervalTube::slice: index {} out of range [0,{})",
                index, self.size
            );
            return None;
        }
        let mut node = self;
        let mut index = index;
        loop {
            let mid = node.mid_index();
            match node.children {
                Some(ref mut children) => {
                    if index < mid {
                        node = &mut children.0;
                    } else {
                        index -= mid;
                        node = &mut children.1;
                    }
                }
                None => return Some(node),
            }
        }
    }

    /// Index of the slice containing `t`. A time shared by two slices maps to the first one.
    pub fn input_to_index(&self, t: f64) -> Option<usize> {
        if !self.domain.contains(t) {
            error!(
                "IntervalTube::input_to_index: no slice for t={} in {}",
                t, self.domain
            );
            return None;
        }
        let mut node = self;
        let mut offset = 0;
        while let Some(children) = &node.children {
            if children.0.domain.contains(t) {
                node = &children.0;
            } else {
                offset += children.0.size;
                node = &children.1;
            }
        }
        Some(offset)
    }

    /// Lower bound of the time domain of slice `index`.
    pub fn index_to_input(&self, index: usize) -> Option<f64> {
        self.slice(index).map(|s| s.domain.lb())
    }

    pub fn slice_domain(&self, index: usize) -> Option<Interval> {
        self.slice(index).map(|s| s.domain)
    }

    pub fn get(&self, index: usize) -> Option<Interval> {
        self.slice(index).map(|s| s.value)
    }

    pub fn at(&self, t: f64) -> Option<Interval> {
        self.input_to_index(t).and_then(|i| self.get(i))
    }

    /// Hull of the values of all slices overlapping `tdom`.
    pub fn over(&self, tdom: Interval) -> Interval {
        if !self.domain.intersects(&tdom) {
            return Interval::EMPTY;
        }
        match &self.children {
            Some(children) if !tdom.is_unbounded() && !tdom.is_superset(&self.domain) => {
                children.0.over(tdom) | children.1.over(tdom)
            }
            _ => self.value,
        }
    }

    pub fn set(&mut self, index: usize, y: Interval) {
        if let Some(leaf) = self.slice_mut(index) {
            leaf.value = y;
            self.update_from_index(index);
        }
    }

    pub fn set_at(&mut self, t: f64, y: Interval) {
        if let Some(index) = self.input_to_index(t) {
            self.set(index, y);
        }
    }

    /// Assigns `y` to every slice overlapping `tdom`.
    pub fn set_over(&mut self, tdom: Interval, y: Interval) {
        if !self.domain.intersects(&tdom) {
            return;
        }
        match &mut self.children {
            Some(children) => {
                children.0.set_over(tdom, y);
                children.1.set_over(tdom, y);
            }
            None => self.value = y,
        }
        self.sync();
    }

    /// Intersects slice `index` with `y`. Returns whether the slice narrowed.
    pub fn intersect(&mut self, index: usize, y: Interval) -> bool {
        let contracted = match self.slice_mut(index) {
            Some(leaf) => leaf.intersect_leaf(y),
            None => return false,
        };
        self.update_from_index(index);
        contracted
    }

    pub fn intersect_at(&mut self, t: f64, y: Interval) -> bool {
        match self.input_to_index(t) {
            Some(index) => self.intersect(index, y),
            None => false,
        }
    }

    /// Intersects every slice overlapping `tdom` with `y`.
    pub fn intersect_over(&mut self, tdom: Interval, y: Interval) -> bool {
        if !self.domain.intersects(&tdom) {
            return false;
        }
        let contracted = match &mut self.children {
            Some(children) => {
                let first = children.0.intersect_over(tdom, y);
                let second = children.1.intersect_over(tdom, y);
                first | second
            }
            None => self.intersect_leaf(y),
        };
        if contracted {
            self.sync();
        }
        contracted
    }

    fn intersect_leaf(&mut self, y: Interval) -> bool {
        if self.value.is_empty() {
            return false;
        }
        let diam = self.value.diam();
        self.value &= y;
        self.value.is_empty() || self.value.diam() < diam
    }

    /// Pointwise hull with a tube of the same structure.
    pub fn union_with(&mut self, other: &IntervalTube) {
        self.check_structure(other, "union_with");
        self.combine(other, &|a, b| a | b);
        self.update();
    }

    /// Pointwise intersection with a tube of the same structure.
    pub fn intersect_with(&mut self, other: &IntervalTube) {
        self.check_structure(other, "intersect_with");
        self.combine(other, &|a, b| a & b);
        self.update();
    }

    fn check_structure(&self, other: &IntervalTube, op: &str) {
        if self.size != other.size {
            warn!(
                "IntervalTube::{}: tubes of different sizes ({} and {})",
                op, self.size, other.size
            );
        }
        if self.domain != other.domain {
            warn!(
                "IntervalTube::{}: tubes of different domains ({} and {})",
                op, self.domain, other.domain
            );
        }
    }

    fn combine(&mut self, other: &IntervalTube, op: &dyn Fn(Interval, Interval) -> Interval) {
        self.value = op(self.value, other.value);
        if let (Some(mine), Some(theirs)) = (&mut self.children, &other.children) {
            mine.0.combine(&theirs.0, op);
            mine.1.combine(&theirs.1, op);
        }
    }

    /// Discretised antiderivative: slice `i` holds `initial + Σ_{j<i} value[j]·dt`.
    pub fn primitive(&self, initial: Interval) -> IntervalTube {
        let dt = Interval::point(self.dt);
        let mut sum = initial;
        let values: Vec<Interval> = self
            .leaf_values()
            .into_iter()
            .map(|v| {
                let current = sum;
                sum += v * dt;
                current
            })
            .collect();
        let mut primitive = self.clone();
        primitive.assign_leaves(&mut values.into_iter());
        primitive.update();
        primitive
    }

    /// Hull of the enclosed bounds of the slices overlapping `tdom`.
    pub fn enclosed_bounds_over(&self, tdom: Interval) -> (Interval, Interval) {
        if tdom == Interval::ENTIRE {
            return self.enclosed_bounds;
        }
        if tdom.is_empty() || !self.domain.intersects(&tdom) {
            return (Interval::EMPTY, Interval::EMPTY);
        }
        match &self.children {
            Some(children) if !tdom.is_superset(&self.domain) => {
                let past = children.0.enclosed_bounds_over(tdom);
                let future = children.1.enclosed_bounds_over(tdom);
                (past.0 | future.0, past.1 | future.1)
            }
            _ => self.enclosed_bounds,
        }
    }

    /// Encloses `∫_{t1}^{t2}` of this tube, given its `primitive`.
    pub fn time_integration(&self, primitive: &IntervalTube, t1: Interval, t2: Interval) -> Interval {
        let (lower, upper) = self.partial_time_integration(primitive, t1, t2);
        Interval::new(lower.lb(), upper.ub())
    }

    /// Encloses separately the integrals of the lower and upper bounds,
    /// by subtracting the primitive's envelopes at `t2` and `t1`.
    pub fn partial_time_integration(
        &self,
        primitive: &IntervalTube,
        t1: Interval,
        t2: Interval,
    ) -> (Interval, Interval) {
        self.check_structure(primitive, "partial_time_integration");
        let at_t1 = primitive.enclosed_bounds_over(t1);
        let at_t2 = primitive.enclosed_bounds_over(t2);
        (at_t2.0 - at_t1.0, at_t2.1 - at_t1.1)
    }

    /// Forward Euler consistency: slice `i` is intersected with `x[i-1] + v[i-1]·dt`.
    pub fn ctc_fwd(&mut self, derivative: &IntervalTube) -> bool {
        if self.size != derivative.size {
            warn!("IntervalTube::ctc_fwd: derivative tube of different size");
        }
        let dt = Interval::point(derivative.dt);
        let mut values = self.leaf_values();
        let dvalues = derivative.leaf_values();
        let n = values.len().min(dvalues.len());
        let mut contracted = false;
        for i in 1..n {
            let y = values[i - 1] + dvalues[i - 1] * dt;
            contracted |= narrow(&mut values[i], y);
        }
        self.assign_leaves(&mut values.into_iter());
        self.update();
        contracted
    }

    /// Backward Euler consistency: slice `i` is intersected with `x[i+1] - v[i+1]·dt`.
    pub fn ctc_bwd(&mut self, derivative: &IntervalTube) -> bool {
        if self.size != derivative.size {
            warn!("IntervalTube::ctc_bwd: derivative tube of different size");
        }
        let dt = Interval::point(derivative.dt);
        let mut values = self.leaf_values();
        let dvalues = derivative.leaf_values();
        let n = values.len().min(dvalues.len());
        let mut contracted = false;
        for i in (0..n.saturating_sub(1)).rev() {
            let y = values[i + 1] - dvalues[i + 1] * dt;
            contracted |= narrow(&mut values[i], y);
        }
        self.assign_leaves(&mut values.into_iter());
        self.update();
        contracted
    }

    pub fn ctc_fwd_bwd(&mut self, derivative: &IntervalTube) -> bool {
        let fwd = self.ctc_fwd(derivative);
        let bwd = self.ctc_bwd(derivative);
        fwd || bwd
    }

    /// Sum of `dt × diam` over non-empty slices.
    pub fn volume(&self) -> f64 {
        self.leaf_values()
            .iter()
            .filter(|v| !v.is_empty())
            .map(|v| self.dt * v.diam())
            .sum()
    }

    /// Slice values in time order.
    pub fn leaf_values(&self) -> Vec<Interval> {
        let mut out = Vec::with_capacity(self.size);
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<Interval>) {
        match &self.children {
            Some(children) => {
                children.0.collect_leaves(out);
                children.1.collect_leaves(out);
            }
            None => out.push(self.value),
        }
    }

    fn assign_leaves(&mut self, values: &mut impl Iterator<Item = Interval>) {
        match &mut self.children {
            Some(children) => {
                children.0.assign_leaves(values);
                children.1.assign_leaves(values);
            }
            None => {
                if let Some(v) = values.next() {
                    self.value = v;
                }
            }
        }
    }

    /// Resynchronises every node from its leaves.
    pub fn update(&mut self) {
        if let Some(children) = &mut self.children {
            children.0.update();
            children.1.update();
        }
        self.sync();
    }

    /// Resynchronises only the path from slice `index` to the root.
    pub fn update_from_index(&mut self, index: usize) {
        if index >= self.size {
            return;
        }
        let mid = self.mid_index();
        if let Some(children) = &mut self.children {
            if index < mid {
                children.0.update_from_index(index);
            } else {
                children.1.update_from_index(index - mid);
            }
        }
        self.sync();
    }

    pub fn update_from_input(&mut self, t: f64) {
        if let Some(index) = self.input_to_index(t) {
            self.update_from_index(index);
        }
    }

    fn sync(&mut self) {
        match &self.children {
            Some(children) => {
                let (first, second) = (&children.0, &children.1);
                self.value = first.value | second.value;
                self.enclosed_bounds = (
                    first.enclosed_bounds.0 | second.enclosed_bounds.0,
                    first.enclosed_bounds.1 | second.enclosed_bounds.1,
                );
            }
            None => {
                self.enclosed_bounds = if self.value.is_empty() {
                    (Interval::EMPTY, Interval::EMPTY)
                } else {
                    (
                        Interval::point(self.value.lb()),
                        Interval::point(self.value.ub()),
                    )
                };
            }
        }
    }
}

fn narrow(slot: &mut Interval, y: Interval) -> bool {
    if slot.is_empty() {
        return false;
    }
    let diam = slot.diam();
    *slot &= y;
    slot.is_empty() || slot.diam() < diam
}

impl BitOrAssign<&IntervalTube> for IntervalTube {
    fn bitor_assign(&mut self, rhs: &IntervalTube) {
        self.union_with(rhs);
    }
}

impl BitAndAssign<&IntervalTube> for IntervalTube {
    fn bitand_assign(&mut self, rhs: &IntervalTube) {
        self.intersect_with(rhs);
    }
}

impl fmt::Display for IntervalTube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IntervalTube: t={}, y={}, slices={}, dt={}",
            self.domain, self.value, self.size, self.dt
        )
    }
}
