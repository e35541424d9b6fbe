use crate::debug::format_polar_vec;
use crate::math::{Phasors, ZERO_PHASORS};
use crate::opt::SolveOpt;
use crate::order::Order;
use num_complex::Complex64;

/// Result of one backward/forward sweep solve.
pub(crate) struct Sweep {
    /// Line-to-neutral voltage (V) per bus and phase.
    pub voltages: Vec<Phasors>,
    /// Current (A) entering the downstream end of each branch.
    pub currents: Vec<Phasors>,
    pub converged: bool,
    pub iterations: usize,
}

/// Solves a radial network by backward/forward sweep.
///
/// `bus_current` returns the current (A) drawn at every bus and phase for
/// the given voltages. The backward pass accumulates these currents towards
/// the source; the forward pass then recomputes the voltages from the
/// source outward. Iteration stops once the largest voltage update, in
/// per unit of each bus's line-to-neutral base, falls below the tolerance.
///
/// Non-finite voltages end the solve as not converged.
pub(crate) fn radial_pf<F>(
    order: &Order,
    v_source: Phasors,
    v0: Vec<Phasors>,
    v_base_ln: &[f64],
    opt: &SolveOpt,
    mut bus_current: F,
) -> Sweep
where
    F: FnMut(&[Phasors]) -> Vec<Phasors>,
{
    let nb = order.bus_count();
    let mut v = v0;
    let mut i_branch = vec![ZERO_PHASORS; order.branches.len()];

    for it in 1..=opt.max_it {
        // backward sweep
        let mut acc = bus_current(&v);
        for (k, br) in order.branches.iter().enumerate().rev() {
            let mut i_to = ZERO_PHASORS;
            for &p in &br.phases {
                i_to[p] = acc[br.to][p];
                acc[br.from][p] += i_to[p] * br.ratio;
            }
            i_branch[k] = i_to;
        }

        // forward sweep
        let mut v_new = vec![ZERO_PHASORS; nb];
        v_new[order.source] = v_source;
        for (k, br) in order.branches.iter().enumerate() {
            for &p in &br.phases {
                v_new[br.to][p] = v_new[br.from][p] * br.ratio - br.z * i_branch[k][p];
            }
        }

        let mut dv_max = 0.0_f64;
        for b in 0..nb {
            for p in 0..v_new[b].len() {
                let dv = (v_new[b][p] - v[b][p]).norm() / v_base_ln[b];
                if !dv.is_finite() || !v_new[b][p].is_finite() {
                    log::debug!("sweep diverged at iteration {}", it);
                    return Sweep {
                        voltages: v_new,
                        currents: i_branch,
                        converged: false,
                        iterations: it,
                    };
                }
                dv_max = dv_max.max(dv);
            }
        }
        v = v_new;
        log::trace!("it {}: max dV {:e} p.u.", it, dv_max);

        if dv_max < opt.tolerance {
            log::trace!("V[source]: {}", format_polar_vec(&v[order.source]));
            return Sweep {
                voltages: v,
                currents: i_branch,
                converged: true,
                iterations: it,
            };
        }
    }

    Sweep {
        voltages: v,
        currents: i_branch,
        converged: false,
        iterations: opt.max_it,
    }
}

/// Flat start: every energised phase at its nominal magnitude with the
/// source angles.
pub(crate) fn flat_start(order: &Order, v_source: Phasors, v_base_ln: &[f64]) -> Vec<Phasors> {
    let scale = v_base_ln[order.source];
    (0..order.bus_count())
        .map(|b| {
            let mut v = ZERO_PHASORS;
            for p in 0..v.len() {
                if order.energised[b][p] {
                    v[p] = v_source[p] / scale * v_base_ln[b];
                }
            }
            v
        })
        .collect()
}

/// Current drawn by a constant-power element at voltage `v`.
pub(crate) fn pq_current(s_va: Complex64, v: Complex64) -> Complex64 {
    (s_va / v).conj()
}
