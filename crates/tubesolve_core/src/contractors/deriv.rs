use super::{slice_width, TimePropag};
use crate::interval::Interval;
use crate::tube::{Tube, TubeVector};

/// Contracts a tube against an enclosure of its derivative, slice by slice.
///
/// On a slice `[t0, t1]` with derivative enclosure `v`:
/// `out ⊆ in + dt·v`, `in ⊆ out - dt·v` and the codomain is bounded by the
/// two cones `in + [0, dt]·v` and `out - [0, dt]·v`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CtcDeriv;

impl CtcDeriv {
    /// Returns whether any slice of `x` was narrowed.
    pub fn contract(&self, x: &mut TubeVector, v: &TubeVector, propag: TimePropag) -> bool {
        assert_eq!(x.size(), v.size(), "derivative dimension mismatch");
        assert_eq!(x.nb_slices(), v.nb_slices(), "derivative slicing mismatch");
        let n = x.nb_slices();
        let mut contracted = false;
        for j in 0..x.size() {
            if propag.forward() {
                for i in 0..n {
                    contracted |= contract_slice(&mut x[j], i, v[j].slice_codomain(i));
                }
            }
            if propag.backward() {
                for i in (0..n).rev() {
                    contracted |= contract_slice(&mut x[j], i, v[j].slice_codomain(i));
                }
            }
        }
        contracted
    }
}

/// Returns whether anything was narrowed.
pub(crate) fn contract_slice(tube: &mut Tube, i: usize, v: Interval) -> bool {
    let dt = slice_width(tube.slice_tdomain(i));
    let span = Interval::new(0.0, dt.ub());

    let x_in = tube.input_gate(i);
    let x_out = tube.output_gate(i);
    let x = tube.slice_codomain(i);

    let out = x_out & (x_in + dt * v);
    let inp = x_in & (out - dt * v);
    let codomain = x & (inp + span * v) & (out - span * v);
    let inp = inp & codomain;
    let out = out & codomain;

    let contracted = inp != x_in || out != x_out || codomain != x;
    *tube.codomain_mut(i) = codomain;
    *tube.gate_mut(i) = inp;
    *tube.gate_mut(i + 1) = out;
    contracted
}
