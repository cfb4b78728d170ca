use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::fmt;
use std::ops::{
    Add, AddAssign, BitAnd, BitAndAssign, BitOr, BitOrAssign, Div, DivAssign, Mul, MulAssign,
    Neg, Sub, SubAssign,
};

/// Closed real interval `[lb, ub]` with `f64` bounds.
///
/// An interval may be empty (stored as `lb > ub`) or unbounded on either side.
/// All arithmetic is outward rounded: the result of an operation always
/// contains the exact real result for every pair of operands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    lb: f64,
    ub: f64,
}

/// A box: one interval per dimension.
pub type IntervalVector = Vec<Interval>;

impl Interval {
    pub const EMPTY: Interval = Interval {
        lb: f64::INFINITY,
        ub: f64::NEG_INFINITY,
    };

    pub const ENTIRE: Interval = Interval {
        lb: f64::NEG_INFINITY,
        ub: f64::INFINITY,
    };

    pub const POS_REALS: Interval = Interval {
        lb: 0.0,
        ub: f64::INFINITY,
    };

    /// Creates `[lb, ub]`. Returns the empty set when `lb > ub` or a bound is NaN.
    pub fn new(lb: f64, ub: f64) -> Self {
        if lb.is_nan() || ub.is_nan() || lb > ub || lb == f64::INFINITY || ub == f64::NEG_INFINITY
        {
            Self::EMPTY
        } else {
            Self { lb, ub }
        }
    }

    pub fn point(x: f64) -> Self {
        Self::new(x, x)
    }

    /// Smallest interval containing every value of `values`.
    pub fn hull_of(values: impl IntoIterator<Item = f64>) -> Self {
        values
            .into_iter()
            .fold(Self::EMPTY, |acc, v| acc | Self::point(v))
    }

    pub fn lb(&self) -> f64 {
        self.lb
    }

    pub fn ub(&self) -> f64 {
        self.ub
    }

    pub fn is_empty(&self) -> bool {
        self.lb > self.ub
    }

    pub fn is_unbounded(&self) -> bool {
        !self.is_empty() && (self.lb == f64::NEG_INFINITY || self.ub == f64::INFINITY)
    }

    pub fn is_degenerated(&self) -> bool {
        self.is_empty() || self.lb == self.ub
    }

    /// Width of the interval, rounded up. Zero for the empty set.
    pub fn diam(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else if self.is_unbounded() {
            f64::INFINITY
        } else {
            add_up(self.ub, -self.lb)
        }
    }

    pub fn rad(&self) -> f64 {
        let d = self.diam();
        if d.is_finite() {
            next_up(0.5 * d)
        } else {
            d
        }
    }

    /// Midpoint. Half lines use `±f64::MAX`, the whole line uses 0.
    pub fn mid(&self) -> f64 {
        if self.is_empty() {
            return f64::NAN;
        }
        match (self.lb == f64::NEG_INFINITY, self.ub == f64::INFINITY) {
            (true, true) => 0.0,
            (true, false) => -f64::MAX,
            (false, true) => f64::MAX,
            (false, false) => (0.5 * self.lb + 0.5 * self.ub).clamp(self.lb, self.ub),
        }
    }

    pub fn contains(&self, x: f64) -> bool {
        self.lb <= x && x <= self.ub
    }

    pub fn intersects(&self, other: &Interval) -> bool {
        !self.is_empty() && !other.is_empty() && self.lb <= other.ub && other.lb <= self.ub
    }

    pub fn is_subset(&self, other: &Interval) -> bool {
        self.is_empty() || (other.lb <= self.lb && self.ub <= other.ub)
    }

    pub fn is_superset(&self, other: &Interval) -> bool {
        other.is_subset(self)
    }

    pub fn intersection(&self, other: &Interval) -> Interval {
        Interval::new(self.lb.max(other.lb), self.ub.min(other.ub))
    }

    pub fn hull(&self, other: &Interval) -> Interval {
        if self.is_empty() {
            *other
        } else if other.is_empty() {
            *self
        } else {
            Interval {
                lb: self.lb.min(other.lb),
                ub: self.ub.max(other.ub),
            }
        }
    }

    /// `[lb - r, ub + r]`, outward rounded.
    pub fn inflate(&self, r: f64) -> Interval {
        if self.is_empty() {
            return *self;
        }
        Interval::new(add_down(self.lb, -r), add_up(self.ub, r))
    }

    /// Splits at `lb + ratio * diam` (at the midpoint for unbounded intervals).
    ///
    /// Returns `None` when the interval is empty or too thin to be split.
    pub fn bisect(&self, ratio: f64) -> Option<(Interval, Interval)> {
        if self.is_empty() {
            return None;
        }
        let split = if self.is_unbounded() {
            self.mid()
        } else {
            self.lb * (1.0 - ratio) + self.ub * ratio
        };
        if split > self.lb && split < self.ub {
            Some((
                Interval {
                    lb: self.lb,
                    ub: split,
                },
                Interval {
                    lb: split,
                    ub: self.ub,
                },
            ))
        } else {
            None
        }
    }

    pub fn abs(&self) -> Interval {
        if self.is_empty() {
            *self
        } else if self.lb >= 0.0 {
            *self
        } else if self.ub <= 0.0 {
            -*self
        } else {
            Interval::new(0.0, (-self.lb).max(self.ub))
        }
    }

    pub fn sqr(&self) -> Interval {
        if self.is_empty() {
            return *self;
        }
        let a = self.abs();
        Interval::new(mul_down(a.lb, a.lb), mul_up(a.ub, a.ub))
    }

    /// Integer power.
    pub fn powi(&self, n: i32) -> Interval {
        if self.is_empty() {
            return *self;
        }
        if n == 0 {
            return Interval::one();
        }
        if n < 0 {
            return Interval::one() / self.powi(-n);
        }
        let n = n as u32;
        if n % 2 == 0 {
            let a = self.abs();
            Interval::new(pow_abs_down(a.lb, n), pow_abs_up(a.ub, n))
        } else {
            Interval::new(odd_pow_down(self.lb, n), odd_pow_up(self.ub, n))
        }
    }

    pub fn sqrt(&self) -> Interval {
        let x = self.intersection(&Interval::POS_REALS);
        if x.is_empty() {
            return Interval::EMPTY;
        }
        Interval::new(sqrt_down(x.lb), sqrt_up(x.ub))
    }

    pub fn exp(&self) -> Interval {
        if self.is_empty() {
            return *self;
        }
        Interval::new(
            next_down(self.lb.exp()).max(0.0),
            widen_up(self.ub.exp()),
        )
    }

    pub fn ln(&self) -> Interval {
        let x = self.intersection(&Interval::POS_REALS);
        if x.is_empty() || x.ub == 0.0 {
            return Interval::EMPTY;
        }
        let lb = if x.lb == 0.0 {
            f64::NEG_INFINITY
        } else {
            widen_down(x.lb.ln())
        };
        Interval::new(lb, widen_up(x.ub.ln()))
    }

    pub fn sin(&self) -> Interval {
        self.periodic(f64::sin, FRAC_PI_2, -FRAC_PI_2)
    }

    pub fn cos(&self) -> Interval {
        self.periodic(f64::cos, 0.0, PI)
    }

    fn periodic(&self, f: fn(f64) -> f64, max_phase: f64, min_phase: f64) -> Interval {
        if self.is_empty() {
            return *self;
        }
        if self.is_unbounded() || self.diam() >= TAU {
            return Interval::new(-1.0, 1.0);
        }
        let a = f(self.lb);
        let b = f(self.ub);
        let mut lo = next_down(a.min(b)).max(-1.0);
        let mut hi = next_up(a.max(b)).min(1.0);
        if contains_phase(self, max_phase) {
            hi = 1.0;
        }
        if contains_phase(self, min_phase) {
            lo = -1.0;
        }
        Interval::new(lo, hi)
    }

    /// Backward projection of `y = x²`: the values of `self` whose square lies in `y`.
    pub fn inverse_sqr(&self, y: &Interval) -> Interval {
        let root = y.sqrt();
        if root.is_empty() {
            return Interval::EMPTY;
        }
        let positive = self.intersection(&root);
        let negative = self.intersection(&-root);
        positive | negative
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::ENTIRE
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "[ empty ]")
        } else {
            write!(f, "[{}, {}]", self.lb, self.ub)
        }
    }
}

impl From<f64> for Interval {
    fn from(x: f64) -> Self {
        Interval::point(x)
    }
}

// --- Directed rounding helpers ---
//
// Bounds are computed in round-to-nearest and moved one ulp outward only when
// the floating-point result is known (or not known not) to be inexact.

pub(crate) fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

pub(crate) fn next_down(x: f64) -> f64 {
    -next_up(-x)
}

fn widen_down(x: f64) -> f64 {
    if x.is_finite() {
        next_down(x)
    } else {
        x
    }
}

fn widen_up(x: f64) -> f64 {
    if x.is_finite() {
        next_up(x)
    } else {
        x
    }
}

fn is_tiny(x: f64) -> bool {
    x.abs() < f64::MIN_POSITIVE
}

fn two_sum_err(a: f64, b: f64, s: f64) -> f64 {
    let bb = s - a;
    (a - (s - bb)) + (b - bb)
}

pub(crate) fn add_down(a: f64, b: f64) -> f64 {
    let s = a + b;
    if s.is_nan() {
        return f64::NEG_INFINITY;
    }
    if s.is_infinite() {
        return if a.is_finite() && b.is_finite() && s > 0.0 {
            f64::MAX
        } else {
            s
        };
    }
    if two_sum_err(a, b, s) < 0.0 {
        next_down(s)
    } else {
        s
    }
}

pub(crate) fn add_up(a: f64, b: f64) -> f64 {
    let s = a + b;
    if s.is_nan() {
        return f64::INFINITY;
    }
    if s.is_infinite() {
        return if a.is_finite() && b.is_finite() && s < 0.0 {
            -f64::MAX
        } else {
            s
        };
    }
    if two_sum_err(a, b, s) > 0.0 {
        next_up(s)
    } else {
        s
    }
}

pub(crate) fn mul_down(a: f64, b: f64) -> f64 {
    if a == 0.0 || b == 0.0 {
        return 0.0;
    }
    let p = a * b;
    if p.is_nan() {
        return f64::NEG_INFINITY;
    }
    if p.is_infinite() {
        return if a.is_finite() && b.is_finite() && p > 0.0 {
            f64::MAX
        } else {
            p
        };
    }
    if is_tiny(p) || a.mul_add(b, -p) < 0.0 {
        next_down(p)
    } else {
        p
    }
}

pub(crate) fn mul_up(a: f64, b: f64) -> f64 {
    if a == 0.0 || b == 0.0 {
        return 0.0;
    }
    let p = a * b;
    if p.is_nan() {
        return f64::INFINITY;
    }
    if p.is_infinite() {
        return if a.is_finite() && b.is_finite() && p < 0.0 {
            -f64::MAX
        } else {
            p
        };
    }
    if is_tiny(p) || a.mul_add(b, -p) > 0.0 {
        next_up(p)
    } else {
        p
    }
}

/// Sign of the rounding error of `q = a / b`: positive when the exact quotient is above `q`.
fn div_err_sign(a: f64, b: f64, q: f64) -> f64 {
    let r = -q.mul_add(b, -a);
    if r == 0.0 {
        0.0
    } else if (r > 0.0) == (b > 0.0) {
        1.0
    } else {
        -1.0
    }
}

fn div_down(a: f64, b: f64) -> f64 {
    let q = a / b;
    if q.is_nan() {
        return f64::NEG_INFINITY;
    }
    if a == 0.0 {
        return 0.0;
    }
    if q.is_infinite() || a.is_infinite() || b.is_infinite() {
        return q;
    }
    if is_tiny(q) || div_err_sign(a, b, q) < 0.0 {
        next_down(q)
    } else {
        q
    }
}

fn div_up(a: f64, b: f64) -> f64 {
    let q = a / b;
    if q.is_nan() {
        return f64::INFINITY;
    }
    if a == 0.0 {
        return 0.0;
    }
    if q.is_infinite() || a.is_infinite() || b.is_infinite() {
        return q;
    }
    if is_tiny(q) || div_err_sign(a, b, q) > 0.0 {
        next_up(q)
    } else {
        q
    }
}

fn sqrt_down(x: f64) -> f64 {
    let s = x.sqrt();
    if !s.is_finite() || s == 0.0 {
        return s;
    }
    if (-s).mul_add(s, x) < 0.0 {
        next_down(s)
    } else {
        s
    }
}

fn sqrt_up(x: f64) -> f64 {
    let s = x.sqrt();
    if !s.is_finite() {
        return s;
    }
    if s == 0.0 {
        return if x == 0.0 { 0.0 } else { next_up(s) };
    }
    if (-s).mul_add(s, x) > 0.0 {
        next_up(s)
    } else {
        s
    }
}

fn pow_abs_down(a: f64, n: u32) -> f64 {
    (0..n).fold(1.0, |acc, _| mul_down(acc, a))
}

fn pow_abs_up(a: f64, n: u32) -> f64 {
    (0..n).fold(1.0, |acc, _| mul_up(acc, a))
}

fn odd_pow_down(x: f64, n: u32) -> f64 {
    if x >= 0.0 {
        pow_abs_down(x, n)
    } else {
        -pow_abs_up(-x, n)
    }
}

fn odd_pow_up(x: f64, n: u32) -> f64 {
    if x >= 0.0 {
        pow_abs_up(x, n)
    } else {
        -pow_abs_down(-x, n)
    }
}

/// Whether `phase + 2kπ` may lie in `x` for some integer `k`.
/// Errs on the side of `true` near the bounds.
fn contains_phase(x: &Interval, phase: f64) -> bool {
    let margin = 1e-9 * (1.0 + x.lb.abs().max(x.ub.abs()));
    let k = ((x.lb - phase) / TAU).ceil();
    let below = phase + (k - 1.0) * TAU;
    let candidate = phase + k * TAU;
    below >= x.lb - margin || candidate <= x.ub + margin
}

// --- Arithmetic ---

impl Neg for Interval {
    type Output = Interval;
    fn neg(self) -> Interval {
        if self.is_empty() {
            self
        } else {
            Interval {
                lb: -self.ub,
                ub: -self.lb,
            }
        }
    }
}

impl Add for Interval {
    type Output = Interval;
    fn add(self, rhs: Interval) -> Interval {
        if self.is_empty() || rhs.is_empty() {
            return Interval::EMPTY;
        }
        Interval::new(add_down(self.lb, rhs.lb), add_up(self.ub, rhs.ub))
    }
}

impl Sub for Interval {
    type Output = Interval;
    fn sub(self, rhs: Interval) -> Interval {
        self + (-rhs)
    }
}

impl Mul for Interval {
    type Output = Interval;
    fn mul(self, rhs: Interval) -> Interval {
        if self.is_empty() || rhs.is_empty() {
            return Interval::EMPTY;
        }
        let pairs = [
            (self.lb, rhs.lb),
            (self.lb, rhs.ub),
            (self.ub, rhs.lb),
            (self.ub, rhs.ub),
        ];
        let lb = pairs
            .iter()
            .map(|&(a, b)| mul_down(a, b))
            .fold(f64::INFINITY, f64::min);
        let ub = pairs
            .iter()
            .map(|&(a, b)| mul_up(a, b))
            .fold(f64::NEG_INFINITY, f64::max);
        Interval::new(lb, ub)
    }
}

impl Div for Interval {
    type Output = Interval;
    fn div(self, rhs: Interval) -> Interval {
        if self.is_empty() || rhs.is_empty() || (rhs.lb == 0.0 && rhs.ub == 0.0) {
            return Interval::EMPTY;
        }
        if self.lb == 0.0 && self.ub == 0.0 {
            return self;
        }
        if rhs.lb > 0.0 || rhs.ub < 0.0 {
            let pairs = [
                (self.lb, rhs.lb),
                (self.lb, rhs.ub),
                (self.ub, rhs.lb),
                (self.ub, rhs.ub),
            ];
            let lb = pairs
                .iter()
                .map(|&(a, b)| div_down(a, b))
                .fold(f64::INFINITY, f64::min);
            let ub = pairs
                .iter()
                .map(|&(a, b)| div_up(a, b))
                .fold(f64::NEG_INFINITY, f64::max);
            return Interval::new(lb, ub);
        }
        if rhs.lb == 0.0 {
            // divisor in (0, ub]
            if self.lb >= 0.0 {
                let lb = if self.lb == 0.0 { 0.0 } else { div_down(self.lb, rhs.ub) };
                return Interval::new(lb, f64::INFINITY);
            }
            if self.ub <= 0.0 {
                let ub = if self.ub == 0.0 { 0.0 } else { div_up(self.ub, rhs.ub) };
                return Interval::new(f64::NEG_INFINITY, ub);
            }
        } else if rhs.ub == 0.0 {
            // divisor in [lb, 0)
            if self.lb >= 0.0 {
                let ub = if self.lb == 0.0 { 0.0 } else { div_up(self.lb, rhs.lb) };
                return Interval::new(f64::NEG_INFINITY, ub);
            }
            if self.ub <= 0.0 {
                let lb = if self.ub == 0.0 { 0.0 } else { div_down(self.ub, rhs.lb) };
                return Interval::new(lb, f64::INFINITY);
            }
        }
        Interval::ENTIRE
    }
}

impl Add<f64> for Interval {
    type Output = Interval;
    fn add(self, rhs: f64) -> Interval {
        self + Interval::point(rhs)
    }
}

impl Sub<f64> for Interval {
    type Output = Interval;
    fn sub(self, rhs: f64) -> Interval {
        self - Interval::point(rhs)
    }
}

impl Mul<f64> for Interval {
    type Output = Interval;
    fn mul(self, rhs: f64) -> Interval {
        self * Interval::point(rhs)
    }
}

impl Mul<Interval> for f64 {
    type Output = Interval;
    fn mul(self, rhs: Interval) -> Interval {
        Interval::point(self) * rhs
    }
}

impl Div<f64> for Interval {
    type Output = Interval;
    fn div(self, rhs: f64) -> Interval {
        self / Interval::point(rhs)
    }
}

impl BitAnd for Interval {
    type Output = Interval;
    fn bitand(self, rhs: Interval) -> Interval {
        self.intersection(&rhs)
    }
}

impl BitOr for Interval {
    type Output = Interval;
    fn bitor(self, rhs: Interval) -> Interval {
        self.hull(&rhs)
    }
}

impl AddAssign for Interval {
    fn add_assign(&mut self, rhs: Interval) {
        *self = *self + rhs;
    }
}
impl SubAssign for Interval {
    fn sub_assign(&mut self, rhs: Interval) {
        *self = *self - rhs;
    }
}
impl MulAssign for Interval {
    fn mul_assign(&mut self, rhs: Interval) {
        *self = *self * rhs;
    }
}
impl DivAssign for Interval {
    fn div_assign(&mut self, rhs: Interval) {
        *self = *self / rhs;
    }
}
impl BitAndAssign for Interval {
    fn bitand_assign(&mut self, rhs: Interval) {
        *self = *self & rhs;
    }
}
impl BitOrAssign for Interval {
    fn bitor_assign(&mut self, rhs: Interval) {
        *self = *self | rhs;
    }
}

impl Zero for Interval {
    fn zero() -> Self {
        Interval::point(0.0)
    }
    fn is_zero(&self) -> bool {
        self.lb == 0.0 && self.ub == 0.0
    }
}

impl One for Interval {
    fn one() -> Self {
        Interval::point(1.0)
    }
}

// --- Boxes ---

pub fn box_is_empty(x: &[Interval]) -> bool {
    x.iter().any(Interval::is_empty)
}

pub fn box_hull(a: &[Interval], b: &[Interval]) -> IntervalVector {
    a.iter().zip(b).map(|(x, y)| *x | *y).collect()
}

pub fn box_intersection(a: &[Interval], b: &[Interval]) -> IntervalVector {
    a.iter().zip(b).map(|(x, y)| *x & *y).collect()
}

pub fn box_is_subset(a: &[Interval], b: &[Interval]) -> bool {
    a.iter().zip(b).all(|(x, y)| x.is_subset(y))
}

pub fn box_max_diam(x: &[Interval]) -> f64 {
    x.iter().map(Interval::diam).fold(0.0, f64::max)
}
