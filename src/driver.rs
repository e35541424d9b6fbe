use crate::allocate::{allocate_load, allocate_pv, RandomStreams};
use crate::circuit::{BusRef, LoadShape, PvSystemSpec};
use crate::debug::format_f64_vec;
use crate::error::{ConfigError, Result, SolverError};
use crate::math::NPHASE;
use crate::opt::SolveMode;
use crate::profile::{ProfileStore, INTERVALS_PER_DAY, INTERVAL_MINUTES};
use crate::results::{MeasurementSeries, TransformerFlow};
use crate::scenario::{PvDefaults, ReseedPolicy, Scenario, StudyConfig};
use crate::traits::CircuitSolver;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Progress of one simulated day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayState {
    Init,
    ProfilesAllocated,
    PvAllocated,
    Stepping,
    Converged,
    NotConverged,
}

/// A network load treated as a residential customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    /// Bus and nodes the load connects to, e.g. `house1.1`.
    pub bus: String,
}

impl Customer {
    pub fn element(&self) -> String {
        format!("load.{}", self.id)
    }

    fn phase_count(&self) -> usize {
        BusRef::parse(&self.bus, 3).map_or(1, |b| b.phases.len())
    }
}

/// Historical profile drawn for a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadAssignment {
    pub customer: String,
    pub profile_index: usize,
}

/// Everything produced by one simulated day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayOutcome {
    pub day: usize,
    pub state: DayState,
    pub series: MeasurementSeries,
    pub load_assignments: Vec<LoadAssignment>,
    /// Customers given PV, in selection order.
    pub pv_assignments: Vec<String>,
    pub transformer: Option<TransformerFlow>,
}

impl DayOutcome {
    pub fn converged(&self) -> bool {
        self.state == DayState::Converged
    }
}

/// Settings the driver needs besides the scenario itself.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub network: PathBuf,
    pub voltage_bases: Vec<f64>,
    pub reseed: ReseedPolicy,
    pub pv: PvDefaults,
    /// Element whose flow is recorded each interval.
    pub transformer: Option<String>,
}

impl From<&StudyConfig> for DriverOptions {
    fn from(config: &StudyConfig) -> Self {
        Self {
            network: config.network.clone(),
            voltage_bases: config.voltage_bases.clone(),
            reseed: config.reseed,
            pv: config.pv,
            transformer: config.transformer.clone(),
        }
    }
}

/// Replays a scenario against a solver one simulated day at a time.
///
/// Days run strictly in order. Each starts from a freshly compiled network
/// and freshly seeded random streams, so a day's allocation depends only
/// on the scenario and the day index.
pub struct ScenarioDriver<'a, S: CircuitSolver> {
    solver: S,
    store: &'a ProfileStore,
    options: DriverOptions,
    scenario: Scenario,
    streams: RandomStreams,
    state: DayState,
}

impl<'a, S: CircuitSolver> ScenarioDriver<'a, S> {
    pub fn new(solver: S, store: &'a ProfileStore, options: DriverOptions, scenario: Scenario) -> Self {
        Self {
            streams: RandomStreams::new(scenario.seeds),
            solver,
            store,
            options,
            scenario,
            state: DayState::Init,
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Changes the PV penetration used by later days.
    pub fn set_penetration(&mut self, penetration: f64) -> std::result::Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&penetration) {
            return Err(ConfigError::Penetration(penetration));
        }
        self.scenario.penetration = penetration;
        Ok(())
    }

    pub fn state(&self) -> DayState {
        self.state
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn into_solver(self) -> S {
        self.solver
    }

    /// Runs every day of the scenario. Inputs are checked before the solver
    /// is first used; days that fail to converge are reported, not retried.
    pub fn run(&mut self) -> Result<Vec<DayOutcome>> {
        self.scenario.validate(self.store)?;

        let mut outcomes = Vec::with_capacity(self.scenario.days);
        for day in self.scenario.day_range() {
            outcomes.push(self.run_day(day)?);
        }
        let failed = outcomes.iter().filter(|o| !o.converged()).count();
        if failed > 0 {
            log::warn!("{} of {} days did not converge", failed, outcomes.len());
        }
        Ok(outcomes)
    }

    pub fn run_day(&mut self, day: usize) -> Result<DayOutcome> {
        // INIT
        self.state = DayState::Init;
        self.store.check_day(day)?;
        if !(0.0..=100.0).contains(&self.scenario.penetration) {
            return Err(ConfigError::Penetration(self.scenario.penetration).into());
        }

        self.solver.compile(&self.options.network)?;
        self.solver.set_voltage_bases(&self.options.voltage_bases)?;
        self.solver.calc_voltage_bases()?;
        self.streams = RandomStreams::new(self.scenario.seeds);

        let customers = self
            .solver
            .load_ids()?
            .into_iter()
            .map(|id| {
                let buses = self.solver.element_buses(&format!("load.{}", id))?;
                Ok(Customer {
                    bus: buses.into_iter().next().unwrap_or_else(|| id.clone()),
                    id,
                })
            })
            .collect::<Result<Vec<Customer>>>()?;
        if customers.is_empty() {
            return Err(ConfigError::EmptyDataset("network has no loads".to_string()).into());
        }

        // PROFILES_ALLOCATED
        let mut load_assignments = Vec::with_capacity(customers.len());
        for customer in &customers {
            if self.options.reseed == ReseedPolicy::PerCustomer {
                self.streams.reseed_pv_shuffle();
            }
            let alloc = allocate_load(self.store, day, &mut self.streams.profile)?;
            log::trace!(
                "{}: profile {}, pf {}",
                customer.id,
                alloc.profile_index,
                format_f64_vec(&alloc.power_factors)
            );
            let shape = format!("load_{}", customer.id);
            self.solver.upsert_shape(LoadShape {
                name: shape.clone(),
                p: alloc.active,
                q: Some(alloc.reactive),
                interval_minutes: INTERVAL_MINUTES,
            })?;
            self.solver.attach_shape_to_load(&customer.id, &shape)?;
            load_assignments.push(LoadAssignment {
                customer: customer.id.clone(),
                profile_index: alloc.profile_index,
            });
        }
        self.state = DayState::ProfilesAllocated;

        // PV_ALLOCATED
        let assigned = allocate_pv(
            self.scenario.penetration,
            &customers,
            day,
            self.store.pv(),
            &mut self.streams.pv_shuffle,
        )?;
        let pv = self.options.pv;
        for a in &assigned {
            let id = format!("pv_{}", a.customer.id);
            self.solver.create_pv_system(&PvSystemSpec {
                id: id.clone(),
                host_load: a.customer.id.clone(),
                kva: pv.kva,
                kwp: pv.kwp,
                phases: a.customer.phase_count(),
                cutoff: (pv.cut_in, pv.cut_out),
                voltage_limits: (pv.v_min_pu, pv.v_max_pu),
            })?;
            self.solver.upsert_shape(LoadShape {
                name: id.clone(),
                p: a.profile.clone(),
                q: None,
                interval_minutes: INTERVAL_MINUTES,
            })?;
            self.solver.attach_shape_to_pv(&id, &id)?;
        }
        let pv_assignments: Vec<String> = assigned.into_iter().map(|a| a.customer.id).collect();
        self.state = DayState::PvAllocated;

        // STEPPING
        self.solver.set_mode(SolveMode::Daily {
            steps: 1,
            step_minutes: INTERVAL_MINUTES,
        })?;
        self.solver.reset()?;
        self.state = DayState::Stepping;

        let mut series = MeasurementSeries::new(customers.iter().map(|c| c.id.clone()).collect());
        let mut transformer = match self.options.transformer.as_deref() {
            Some(element) => Some(TransformerFlow::new(element, self.monitored_phases(element)?)),
            None => None,
        };

        for t in 0..INTERVALS_PER_DAY {
            self.solver.solve_step()?;
            for (c, customer) in customers.iter().enumerate() {
                let power: Complex64 = self.solver.read_element_power(&customer.element())?.iter().sum();
                let voltage = self
                    .solver
                    .read_bus_voltage_pu(&customer.bus)?
                    .into_iter()
                    .reduce(f64::max)
                    .unwrap_or(f64::NAN);
                series.record(c, t, power, voltage);
            }
            if let Some(flow) = transformer.as_mut() {
                flow.record(&self.solver, t)?;
            }
        }

        self.state = if self.solver.is_converged() {
            DayState::Converged
        } else {
            DayState::NotConverged
        };

        match self.state {
            DayState::Converged => log::info!(
                "day {}: {} customers, {} with PV, voltage {:.4}..{:.4} p.u.",
                day,
                customers.len(),
                pv_assignments.len(),
                series.min_voltage().unwrap_or(f64::NAN),
                series.max_voltage().unwrap_or(f64::NAN)
            ),
            _ => log::warn!(
                "day {}: solver did not converge at {}% penetration",
                day,
                self.scenario.penetration
            ),
        }

        Ok(DayOutcome {
            day,
            state: self.state,
            series,
            load_assignments,
            pv_assignments,
            transformer,
        })
    }

    /// Phases of the monitored element, taken from its first terminal.
    fn monitored_phases(&self, element: &str) -> std::result::Result<usize, SolverError> {
        let buses = self.solver.element_buses(element)?;
        let bus = buses
            .first()
            .ok_or_else(|| SolverError::Network(format!("{} has no terminals", element)))?;
        BusRef::parse(bus, NPHASE)
            .map(|b| b.phases.len())
            .map_err(SolverError::Network)
    }
}
