use crate::equation_engine::IntervalFunction;
use crate::interval::{Interval, IntervalVector};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Three-valued answer of a set-membership test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolInterval {
    No,
    Maybe,
    Yes,
}

impl fmt::Display for BoolInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BoolInterval::No => "NO",
            BoolInterval::Maybe => "MAYBE",
            BoolInterval::Yes => "YES",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone)]
enum Definition {
    /// Expressions of `t`, evaluated at `t + shift`.
    Analytic { function: IntervalFunction, shift: f64 },
    /// Sorted samples, linearly interpolated.
    Sampled(Vec<(f64, Vec<f64>)>),
}

/// A concrete vector-valued function of time, used as a reference solution.
#[derive(Debug, Clone)]
pub struct Trajectory {
    domain: Interval,
    dim: usize,
    definition: Definition,
}

impl Trajectory {
    /// Trajectory given by one expression of `t` per component.
    pub fn analytic(domain: Interval, exprs: &[&str]) -> Result<Self> {
        if domain.is_empty() || domain.is_unbounded() {
            bail!("Trajectory domain must be bounded and non-empty, got {}.", domain);
        }
        if exprs.is_empty() {
            bail!("Trajectory needs at least one component.");
        }
        let function = IntervalFunction::parse(&[], exprs)?;
        Ok(Self {
            domain,
            dim: exprs.len(),
            definition: Definition::Analytic { function, shift: 0.0 },
        })
    }

    /// Piecewise linear trajectory through `(t, value)` samples.
    pub fn sampled(mut points: Vec<(f64, Vec<f64>)>) -> Result<Self> {
        if points.is_empty() {
            bail!("Trajectory needs at least one sample.");
        }
        let dim = points[0].1.len();
        if dim == 0 {
            bail!("Trajectory needs at least one component.");
        }
        for (t, value) in &points {
            if !t.is_finite() {
                bail!("Sample time must be finite, got {}.", t);
            }
            if value.len() != dim {
                bail!(
                    "Sample dimension mismatch. Expected {}, got {}.",
                    dim,
                    value.len()
                );
            }
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        points.dedup_by(|a, b| a.0 == b.0);
        let domain = Interval::new(points[0].0, points[points.len() - 1].0);
        Ok(Self {
            domain,
            dim,
            definition: Definition::Sampled(points),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn domain(&self) -> Interval {
        self.domain
    }

    pub fn codomain(&self) -> IntervalVector {
        self.eval(self.domain)
    }

    /// Enclosure of the values over `t ∩ domain`.
    pub fn eval(&self, t: Interval) -> IntervalVector {
        let t = t & self.domain;
        if t.is_empty() {
            return vec![Interval::EMPTY; self.dim];
        }
        match &self.definition {
            Definition::Analytic { function, shift } => function.eval(t + *shift, &[]),
            Definition::Sampled(points) => {
                let mut result = interpolate(points, t.lb());
                if !t.is_degenerated() {
                    for (r, v) in result.iter_mut().zip(interpolate(points, t.ub())) {
                        *r |= v;
                    }
                    let start = points.partition_point(|(s, _)| *s < t.lb());
                    for (_, value) in points[start..].iter().take_while(|(s, _)| *s <= t.ub()) {
                        for (r, v) in result.iter_mut().zip(value) {
                            *r |= Interval::point(*v);
                        }
                    }
                }
                result
            }
        }
    }

    /// Approximate value at `t`, `None` outside the domain.
    pub fn value_at(&self, t: f64) -> Option<Vec<f64>> {
        if !self.domain.contains(t) {
            return None;
        }
        Some(self.eval(Interval::point(t)).iter().map(Interval::mid).collect())
    }

    /// Restricts the domain, dropping samples outside of it.
    pub fn truncate_domain(&mut self, domain: Interval) {
        self.domain &= domain;
        if let Definition::Sampled(points) = &mut self.definition {
            let kept = self.domain;
            points.retain(|(t, _)| kept.contains(*t));
        }
    }

    /// Moves the time origin: the value formerly at `t` is now at `t - shift`.
    pub fn shift_domain(&mut self, shift: f64) {
        self.domain = self.domain - shift;
        match &mut self.definition {
            Definition::Analytic { shift: s, .. } => *s += shift,
            Definition::Sampled(points) => {
                for (t, _) in points.iter_mut() {
                    *t -= shift;
                }
            }
        }
    }
}

fn interpolate(points: &[(f64, Vec<f64>)], t: f64) -> IntervalVector {
    let upper = points.partition_point(|(s, _)| *s < t);
    if upper < points.len() && points[upper].0 == t {
        return points[upper].1.iter().map(|v| Interval::point(*v)).collect();
    }
    if upper == 0 || upper == points.len() {
        let dim = points[0].1.len();
        return vec![Interval::EMPTY; dim];
    }
    let (t0, a) = &points[upper - 1];
    let (t1, b) = &points[upper];
    let ratio = (Interval::point(t) - Interval::point(*t0)) / (Interval::point(*t1) - Interval::point(*t0));
    a.iter()
        .zip(b)
        .map(|(va, vb)| {
            let (va, vb) = (Interval::point(*va), Interval::point(*vb));
            (va + ratio * (vb - va)) & (va | vb)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampled_trajectory_interpolates() {
        let traj = Trajectory::sampled(vec![(2.0, vec![4.0]), (0.0, vec![0.0]), (1.0, vec![1.0])])
            .expect("valid samples");
        assert_eq!(traj.domain(), Interval::new(0.0, 2.0));
        assert_eq!(traj.eval(Interval::point(1.5)), vec![Interval::point(2.5)]);
        assert_eq!(traj.eval(Interval::new(0.5, 2.0)), vec![Interval::new(0.5, 4.0)]);
        assert_eq!(traj.value_at(1.0), Some(vec![1.0]));
        assert_eq!(traj.value_at(3.0), None);
    }

    #[test]
    fn sampled_trajectory_rejects_bad_input() {
        let err = Trajectory::sampled(vec![(0.0, vec![0.0]), (1.0, vec![1.0, 2.0])])
            .expect_err("dimension mismatch");
        assert!(err.to_string().contains("Sample dimension mismatch"));
        assert!(Trajectory::sampled(Vec::new()).is_err());
    }

    #[test]
    fn analytic_trajectory_encloses_values() {
        let traj = Trajectory::analytic(Interval::new(0.0, 1.0), &["exp(t)", "-t"])
            .expect("should compile");
        assert_eq!(traj.dim(), 2);
        let y = traj.eval(Interval::point(1.0));
        assert!(y[0].contains(1.0f64.exp()));
        assert_eq!(y[1], Interval::point(-1.0));
        let outside = traj.eval(Interval::new(2.0, 3.0));
        assert!(outside[0].is_empty());
    }

    #[test]
    fn shifting_and_truncating() {
        let mut traj = Trajectory::analytic(Interval::new(0.0, 2.0), &["t"]).expect("compiles");
        traj.shift_domain(1.0);
        assert_eq!(traj.domain(), Interval::new(-1.0, 1.0));
        assert_eq!(traj.eval(Interval::point(0.0)), vec![Interval::point(1.0)]);
        traj.truncate_domain(Interval::new(0.0, 5.0));
        assert_eq!(traj.domain(), Interval::new(0.0, 1.0));

        let mut sampled =
            Trajectory::sampled(vec![(0.0, vec![0.0]), (1.0, vec![1.0]), (2.0, vec![2.0])])
                .expect("valid samples");
        sampled.truncate_domain(Interval::new(0.5, 2.0));
        assert_eq!(sampled.eval(Interval::point(2.0)), vec![Interval::point(2.0)]);
        assert!(sampled.eval(Interval::point(0.6))[0].is_empty());
    }
}
