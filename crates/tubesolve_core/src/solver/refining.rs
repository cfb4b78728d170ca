use super::settings::RefiningMode;
use super::Solver;
use crate::tube::TubeVector;
use rand::Rng;

impl<R: Rng> Solver<R> {
    /// Adds time breakpoints according to the refining mode. Returns `false`
    /// once the slice budget is spent.
    pub(super) fn refining(&self, x: &mut TubeVector) -> bool {
        let nb_slices = x.nb_slices();
        let max_slices = self.settings.max_slices;
        if nb_slices >= max_slices {
            return false;
        }

        match self.settings.refining_mode {
            RefiningMode::SteepestSlice => {
                let t = x.slice_tdomain(x.steepest_slice()).mid();
                x.sample(t);
            }
            RefiningMode::AllSlices => refine_all_slices(x, max_slices),
            _ if x.volume() >= f64::MAX => refine_all_slices(x, max_slices),
            mode @ (RefiningMode::AverageThreshold | RefiningMode::MedianThreshold) => {
                let nb_refining = nb_slices / 10 + 1;
                for k in 0..nb_refining {
                    let t = x.slice_tdomain(x.widest_slice()).mid();
                    x.sample(t);
                    if k + nb_slices + 1 >= max_slices {
                        return true;
                    }
                }
                refine_with_threshold(x, mode, max_slices);
            }
        }
        true
    }
}

/// Samples every slice at its midpoint, within the budget.
fn refine_all_slices(x: &mut TubeVector, max_slices: usize) {
    let nb_before = x.nb_slices();
    let mids: Vec<f64> = (0..nb_before).map(|i| x.slice_tdomain(i).mid()).collect();
    let mut added = 0;
    for t in mids {
        if added + nb_before >= max_slices {
            break;
        }
        if x.sample(t) {
            added += 1;
        }
    }
}

/// Samples the slices whose gate discrepancy reaches the average or median
/// discrepancy, skipping slices that are already very narrow.
fn refine_with_threshold(x: &mut TubeVector, mode: RefiningMode, max_slices: usize) {
    let nb_before = x.nb_slices();
    let steps: Vec<f64> = (0..nb_before).map(|i| slice_step(x, i)).collect();
    let threshold = match mode {
        RefiningMode::MedianThreshold => median_threshold(&steps),
        _ => average_threshold(&steps),
    };
    let min_diam = x.tdomain().diam() / (100.0 * nb_before as f64);

    let targets: Vec<f64> = (0..nb_before)
        .filter(|&i| steps[i] >= threshold && x.slice_tdomain(i).diam() > min_diam)
        .map(|i| x.slice_tdomain(i).mid())
        .collect();
    let mut added = 0;
    for t in targets {
        if added + nb_before >= max_slices {
            break;
        }
        if x.sample(t) {
            added += 1;
        }
    }
}

/// Largest `|mid(output gate) - mid(input gate)|` over the components.
fn slice_step(x: &TubeVector, i: usize) -> f64 {
    x.iter().map(|tube| tube.steepness(i)).fold(0.0, f64::max)
}

/// Mean of the finite steps, 0 when there is none.
fn average_threshold(steps: &[f64]) -> f64 {
    let mut average = 0.0;
    let mut count = 0.0;
    for &step in steps.iter().filter(|s| **s < f64::MAX) {
        count += 1.0;
        average = (average * (count - 1.0) + step) / count;
    }
    average
}

/// Upper median of the finite steps, 0 when there is none.
fn median_threshold(steps: &[f64]) -> f64 {
    let mut finite: Vec<f64> = steps.iter().copied().filter(|s| *s < f64::MAX).collect();
    if finite.is_empty() {
        return 0.0;
    }
    finite.sort_by(f64::total_cmp);
    finite[finite.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;
    use crate::solver::SolverSettings;

    fn solver(mode: RefiningMode, max_slices: usize) -> Solver {
        Solver::new(
            &[0.1],
            SolverSettings {
                refining_mode: mode,
                max_slices,
                ..SolverSettings::default()
            },
        )
    }

    /// Tube enclosing `t²` tightly on a uniform partition.
    fn parabola(nb_slices: usize) -> TubeVector {
        let mut x = TubeVector::new(Interval::new(0.0, 1.0), 1.0 / nb_slices as f64, 1);
        let times = x.times().to_vec();
        for i in 0..x.nb_slices() {
            let (a, b) = (times[i], times[i + 1]);
            x[0].set_codomain(i, Interval::new(a * a, b * b));
        }
        for (k, t) in times.iter().enumerate() {
            x[0].set_gate(k, Interval::point(t * t));
        }
        x
    }

    #[test]
    fn thresholds_ignore_infinite_steps() {
        assert_eq!(average_threshold(&[1.0, 3.0, f64::MAX]), 2.0);
        assert_eq!(median_threshold(&[5.0, 1.0, 3.0, f64::INFINITY]), 3.0);
        assert_eq!(average_threshold(&[f64::MAX]), 0.0);
        assert_eq!(median_threshold(&[]), 0.0);
    }

    #[test]
    fn all_slices_doubles_within_budget() {
        let mut x = parabola(4);
        assert!(solver(RefiningMode::AllSlices, 100).refining(&mut x));
        assert_eq!(x.nb_slices(), 8);

        let mut x = parabola(4);
        assert!(solver(RefiningMode::AllSlices, 6).refining(&mut x));
        assert_eq!(x.nb_slices(), 6);
        assert!(!solver(RefiningMode::AllSlices, 6).refining(&mut x));
    }

    #[test]
    fn steepest_slice_mode_adds_one_breakpoint() {
        let mut x = parabola(4);
        assert!(solver(RefiningMode::SteepestSlice, 100).refining(&mut x));
        assert_eq!(x.nb_slices(), 5);
        // t² is steepest on the last slice.
        assert!(x.times().contains(&0.875));
    }

    #[test]
    fn threshold_modes_focus_on_steep_slices() {
        let mut x = parabola(10);
        assert!(solver(RefiningMode::AverageThreshold, 1000).refining(&mut x));
        let first_half = x.times().iter().filter(|t| **t < 0.5).count();
        let second_half = x.times().iter().filter(|t| **t > 0.5).count();
        assert!(x.nb_slices() > 10);
        assert!(second_half > first_half);

        let mut x = parabola(10);
        assert!(solver(RefiningMode::MedianThreshold, 1000).refining(&mut x));
        assert!(x.nb_slices() > 10);
    }

    #[test]
    fn unbounded_tube_refines_everywhere() {
        let mut x = TubeVector::new(Interval::new(0.0, 1.0), 0.25, 1);
        assert!(solver(RefiningMode::MedianThreshold, 100).refining(&mut x));
        assert_eq!(x.nb_slices(), 8);
    }
}
