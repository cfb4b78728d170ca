use super::settings::StoppingMode;
use crate::tube::TubeVector;

/// Whether `x` is thin enough, component `i` being compared with `thresholds[i]`.
pub fn stopping_condition_met(mode: StoppingMode, x: &TubeVector, thresholds: &[f64]) -> bool {
    assert_eq!(x.size(), thresholds.len(), "threshold dimension mismatch");
    match mode {
        StoppingMode::Diam => diam_condition(x, thresholds),
        StoppingMode::Gate => gate_condition(x, thresholds),
        StoppingMode::BoundaryGate => boundary_gate_condition(x, thresholds),
    }
}

fn diam_condition(x: &TubeVector, thresholds: &[f64]) -> bool {
    x.iter()
        .zip(thresholds)
        .all(|(tube, &max)| tube.codomains().iter().all(|c| c.diam() <= max))
}

fn gate_condition(x: &TubeVector, thresholds: &[f64]) -> bool {
    x.iter()
        .zip(thresholds)
        .all(|(tube, &max)| tube.max_gate_diam().0 <= max)
}

fn boundary_gate_condition(x: &TubeVector, thresholds: &[f64]) -> bool {
    let last = x.nb_slices() - 1;
    x.iter().zip(thresholds).all(|(tube, &max)| {
        tube.input_gate(0).diam() <= max && tube.output_gate(last).diam() <= max
    })
}

/// Sum of the diameters of the first and last gates of every component.
pub fn extreme_gates_sum_of_diams(x: &TubeVector) -> f64 {
    let last = x.nb_slices() - 1;
    x.iter()
        .map(|tube| tube.input_gate(0).diam() + tube.output_gate(last).diam())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;

    /// Wide in the middle, thin at both ends.
    fn waist() -> TubeVector {
        let mut x = TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.5, &[Interval::new(0.0, 1.0)]);
        x.set(&[Interval::new(0.0, 0.1)], 0.0);
        x.set(&[Interval::new(0.0, 0.1)], 1.0);
        x
    }

    #[test]
    fn modes_look_at_different_parts() {
        let x = waist();
        assert!(!stopping_condition_met(StoppingMode::Diam, &x, &[0.5]));
        assert!(!stopping_condition_met(StoppingMode::Gate, &x, &[0.5]));
        assert!(stopping_condition_met(StoppingMode::BoundaryGate, &x, &[0.5]));
        assert!(stopping_condition_met(StoppingMode::Diam, &x, &[1.0]));
    }

    #[test]
    fn full_initial_width_holds_immediately() {
        let x = TubeVector::from_codomain(Interval::new(0.0, 1.0), 0.1, &[Interval::new(-3.0, 3.0)]);
        assert!(stopping_condition_met(StoppingMode::Diam, &x, &[6.0]));
        assert!(!stopping_condition_met(StoppingMode::Diam, &x, &[5.9]));
    }

    #[test]
    fn extreme_gates_are_summed() {
        let x = waist();
        assert!((extreme_gates_sum_of_diams(&x) - 0.2).abs() < 1e-12);
    }
}
