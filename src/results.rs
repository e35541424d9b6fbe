use crate::error::SolverError;
use crate::profile::INTERVALS_PER_DAY;
use crate::traits::CircuitSolver;

use ndarray::{Array2, Axis};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Per-customer, per-interval readings of one simulated day.
///
/// Rows follow the customer order used for allocation. Cells that were
/// never recorded hold NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSeries {
    pub customers: Vec<String>,
    /// Active power (kW).
    pub active: Array2<f64>,
    /// Reactive power (kvar).
    pub reactive: Array2<f64>,
    /// Voltage magnitude (p.u.).
    pub voltage: Array2<f64>,
}

impl MeasurementSeries {
    pub fn new(customers: Vec<String>) -> Self {
        let shape = (customers.len(), INTERVALS_PER_DAY);
        Self {
            customers,
            active: Array2::from_elem(shape, f64::NAN),
            reactive: Array2::from_elem(shape, f64::NAN),
            voltage: Array2::from_elem(shape, f64::NAN),
        }
    }

    pub fn record(&mut self, customer: usize, interval: usize, power: Complex64, voltage: f64) {
        self.active[[customer, interval]] = power.re;
        self.reactive[[customer, interval]] = power.im;
        self.voltage[[customer, interval]] = voltage;
    }

    /// Number of intervals with every customer recorded.
    pub fn recorded_intervals(&self) -> usize {
        self.voltage
            .axis_iter(Axis(1))
            .take_while(|col| col.iter().all(|v| !v.is_nan()))
            .count()
    }

    /// Customers whose voltage exceeds `limit_pu` at any interval.
    pub fn non_compliant_customers(&self, limit_pu: f64) -> Vec<&str> {
        self.voltage
            .axis_iter(Axis(0))
            .zip(&self.customers)
            .filter(|(row, _)| row.iter().any(|&v| v > limit_pu))
            .map(|(_, id)| id.as_str())
            .collect()
    }

    pub fn non_compliant_count(&self, limit_pu: f64) -> usize {
        self.non_compliant_customers(limit_pu).len()
    }

    /// Customers whose voltage falls below `limit_pu` at any interval.
    pub fn under_voltage_count(&self, limit_pu: f64) -> usize {
        self.voltage
            .axis_iter(Axis(0))
            .filter(|row| row.iter().any(|&v| v < limit_pu))
            .count()
    }

    /// Highest recorded voltage, ignoring unrecorded cells.
    pub fn max_voltage(&self) -> Option<f64> {
        self.voltage
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .reduce(f64::max)
    }

    pub fn min_voltage(&self) -> Option<f64> {
        self.voltage
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .reduce(f64::min)
    }
}

/// Per-phase flow through one element, positive from the upstream network
/// towards the customers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerFlow {
    pub element: String,
    /// Active power (kW), phases x intervals.
    pub active: Array2<f64>,
    /// Reactive power (kvar), phases x intervals.
    pub reactive: Array2<f64>,
}

impl TransformerFlow {
    pub fn new(element: &str, phases: usize) -> Self {
        Self {
            element: element.to_string(),
            active: Array2::from_elem((phases, INTERVALS_PER_DAY), f64::NAN),
            reactive: Array2::from_elem((phases, INTERVALS_PER_DAY), f64::NAN),
        }
    }

    pub fn phase_count(&self) -> usize {
        self.active.nrows()
    }

    /// Reads the element's flow for `interval`.
    ///
    /// The readback is power into the element at each terminal; the second
    /// terminal is taken and its sign flipped, which gives the power
    /// delivered downstream.
    pub fn record<S: CircuitSolver + ?Sized>(
        &mut self,
        solver: &S,
        interval: usize,
    ) -> Result<(), SolverError> {
        let s = solver.read_element_power(&self.element)?;
        let n = self.phase_count();
        if s.len() < 2 * n {
            return Err(SolverError::Network(format!(
                "{} reported {} values, expected {} per terminal",
                self.element,
                s.len(),
                n
            )));
        }
        for (p, sp) in s[n..2 * n].iter().enumerate() {
            self.active[[p, interval]] = -sp.re;
            self.reactive[[p, interval]] = -sp.im;
        }
        Ok(())
    }

    /// Apparent power `sqrt(P^2 + Q^2)` (kVA), phases x intervals.
    pub fn apparent(&self) -> Array2<f64> {
        let mut s = self.active.clone();
        s.zip_mut_with(&self.reactive, |p, &q| *p = p.hypot(q));
        s
    }

    /// Apparent power as a fraction of the per-phase share of `rated_kva`.
    pub fn utilisation(&self, rated_kva: f64) -> Array2<f64> {
        let per_phase = rated_kva / self.phase_count() as f64;
        self.apparent() / per_phase
    }

    pub fn max_utilisation(&self, rated_kva: f64) -> Option<f64> {
        self.utilisation(rated_kva)
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .reduce(f64::max)
    }

    /// Intervals where any phase exceeds its share of `rated_kva`.
    pub fn overloaded_intervals(&self, rated_kva: f64) -> Vec<usize> {
        self.utilisation(rated_kva)
            .axis_iter(Axis(1))
            .enumerate()
            .filter(|(_, col)| col.iter().any(|&u| u > 1.0))
            .map(|(t, _)| t)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series() -> MeasurementSeries {
        let mut m = MeasurementSeries::new(vec!["a".into(), "b".into(), "c".into()]);
        for t in 0..INTERVALS_PER_DAY {
            m.record(0, t, Complex64::new(1.0, 0.2), 1.0);
            m.record(1, t, Complex64::new(0.5, 0.1), if t == 20 { 1.12 } else { 1.01 });
            m.record(2, t, Complex64::new(2.0, 0.4), if t == 40 { 0.92 } else { 0.98 });
        }
        m
    }

    #[test]
    fn unrecorded_cells_are_nan() {
        let mut m = MeasurementSeries::new(vec!["a".into()]);
        assert_eq!(m.recorded_intervals(), 0);
        assert!(m.max_voltage().is_none());

        m.record(0, 0, Complex64::new(1.0, 0.0), 1.0);
        m.record(0, 1, Complex64::new(1.0, 0.0), 1.0);
        assert_eq!(m.recorded_intervals(), 2);
        assert!(m.voltage[[0, 2]].is_nan());
    }

    #[test]
    fn counts_voltage_violations() {
        let m = series();
        assert_eq!(m.non_compliant_customers(1.10), vec!["b"]);
        assert_eq!(m.non_compliant_count(1.15), 0);
        assert_eq!(m.under_voltage_count(0.94), 1);
        assert_relative_eq!(m.max_voltage().unwrap(), 1.12);
        assert_relative_eq!(m.min_voltage().unwrap(), 0.92);
    }

    #[test]
    fn utilisation_uses_per_phase_rating() {
        let mut flow = TransformerFlow::new("transformer.tr1", 3);
        flow.active.fill(10.0);
        flow.reactive.fill(0.0);
        flow.active[[1, 5]] = 30.0;
        flow.reactive[[1, 5]] = 40.0;

        let u = flow.utilisation(150.0);
        assert_relative_eq!(u[[0, 0]], 0.2);
        assert_relative_eq!(u[[1, 5]], 1.0);
        assert_eq!(flow.overloaded_intervals(150.0), Vec::<usize>::new());
        assert_eq!(flow.overloaded_intervals(120.0), vec![5]);
        assert_relative_eq!(flow.max_utilisation(150.0).unwrap(), 1.0);
    }
}
