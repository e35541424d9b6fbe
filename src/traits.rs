use crate::circuit::{LoadShape, PvSystemSpec};
use crate::error::SolverError;
use crate::opt::SolveMode;
use num_complex::Complex64;
use std::path::Path;

/// Time-series power flow engine driven by the scenario driver.
///
/// Element ids take the form `class.name` (for example `load.house1` or
/// `transformer.tr1`); bus references are `bus` or `bus.node`. Names are
/// case-insensitive.
pub trait CircuitSolver {
    /// Loads the network description at `path`, replacing any previous
    /// circuit and all attached shapes and PV systems.
    fn compile(&mut self, path: &Path) -> Result<(), SolverError>;

    /// Candidate line-to-line base voltages (kV).
    fn set_voltage_bases(&mut self, bases: &[f64]) -> Result<(), SolverError>;

    /// Assigns each bus the nearest candidate base.
    fn calc_voltage_bases(&mut self) -> Result<(), SolverError>;

    /// Creates or replaces a shape by name.
    fn upsert_shape(&mut self, shape: LoadShape) -> Result<(), SolverError>;

    fn attach_shape_to_load(&mut self, load_id: &str, shape: &str) -> Result<(), SolverError>;

    /// Creates a PV system at the bus of `spec.host_load`.
    fn create_pv_system(&mut self, spec: &PvSystemSpec) -> Result<(), SolverError>;

    fn attach_shape_to_pv(&mut self, pv_id: &str, shape: &str) -> Result<(), SolverError>;

    fn set_mode(&mut self, mode: SolveMode) -> Result<(), SolverError>;

    /// Rewinds simulation time and element state to the start of the day.
    fn reset(&mut self) -> Result<(), SolverError>;

    /// Solves the next step of the current mode. Failing to converge is
    /// not an error; see [`CircuitSolver::is_converged`].
    fn solve_step(&mut self) -> Result<(), SolverError>;

    /// Whether every solve since the last reset converged.
    fn is_converged(&self) -> bool;

    /// Load names in definition order.
    fn load_ids(&self) -> Result<Vec<String>, SolverError>;

    /// Bus references of each terminal of `element`.
    fn element_buses(&self, element: &str) -> Result<Vec<String>, SolverError>;

    /// Complex power (kW + j kvar) flowing into `element`, per terminal
    /// and phase.
    fn read_element_power(&self, element: &str) -> Result<Vec<Complex64>, SolverError>;

    /// Voltage magnitudes (p.u.) of the requested node, or of every
    /// energised node when only the bus is named.
    fn read_bus_voltage_pu(&self, bus: &str) -> Result<Vec<f64>, SolverError>;
}
