use crate::circuit::{BusRef, Circuit, LoadShape, PvSystem, PvSystemSpec};
use crate::debug::format_power_vec;
use crate::error::SolverError;
use crate::loadcase::load_circuit;
use crate::math::{balanced, Phasors, SQRT3, ZERO_PHASORS};
use crate::opt::{SolveMode, SolveOpt};
use crate::order::{BranchKind, Order};
use crate::radial::{flat_start, pq_current, radial_pf};
use crate::traits::CircuitSolver;

use num_complex::Complex64;
use std::path::Path;
use std::time::Instant;

/// Power drawn by a load or PV system during one step.
#[derive(Debug, Clone)]
struct Injection {
    bus: usize,
    phases: Vec<usize>,
    /// Complex power per phase (VA), load convention.
    s: Complex64,
    /// Voltage band (p.u.) of constant-power operation. Outside it the
    /// element is a constant impedance.
    v_band: Option<(f64, f64)>,
}

impl Injection {
    fn current(&self, v: Complex64, v_base_ln: f64) -> Complex64 {
        if let Some((v_min, v_max)) = self.v_band {
            let vpu = v.norm() / v_base_ln;
            if vpu < v_min || vpu > v_max {
                let v_lim = vpu.clamp(v_min, v_max) * v_base_ln;
                return self.s.conj() / (v_lim * v_lim) * v;
            }
        }
        pq_current(self.s, v)
    }
}

struct Compiled {
    circuit: Circuit,
    order: Order,
    /// Nominal line-to-neutral voltage (V) per bus.
    v_nominal_ln: Vec<f64>,
    /// Per unit base (kV, line-to-line) per bus.
    base_kv: Vec<f64>,
    mode: SolveMode,
    minutes: u32,
    pv_on: Vec<bool>,
    solves: usize,
    converged: bool,
    voltages: Vec<Phasors>,
    currents: Vec<Phasors>,
    /// Loads followed by PV systems, as used by the last solve.
    injections: Vec<Injection>,
}

/// Built-in solver for radial LV networks, solved per phase by
/// backward/forward sweep.
///
/// Transformers are modelled as an ideal ratio with the series impedance
/// on the secondary side and without phase shift.
pub struct RadialSolver {
    opt: SolveOpt,
    compiled: Option<Compiled>,
}

impl Default for RadialSolver {
    fn default() -> Self {
        Self::new(SolveOpt::default())
    }
}

impl RadialSolver {
    pub fn new(opt: SolveOpt) -> Self {
        Self {
            opt,
            compiled: None,
        }
    }

    fn compiled(&self) -> Result<&Compiled, SolverError> {
        self.compiled.as_ref().ok_or(SolverError::NotCompiled)
    }

    fn compiled_mut(&mut self) -> Result<&mut Compiled, SolverError> {
        self.compiled.as_mut().ok_or(SolverError::NotCompiled)
    }
}

/// Splits `class.name` into lowercase parts.
fn split_id(id: &str) -> Result<(String, String), SolverError> {
    match id.split_once('.') {
        Some((class, name)) => Ok((class.to_lowercase(), name.to_lowercase())),
        None => Err(SolverError::UnknownElement(id.to_string())),
    }
}

/// Name of an element of `class`, with or without the class prefix.
fn element_name(id: &str, class: &str) -> String {
    let id = id.to_lowercase();
    match id.split_once('.') {
        Some((c, name)) if c == class => name.to_string(),
        _ => id,
    }
}

fn nearest_base(bases: &[f64], nominal: f64) -> f64 {
    bases
        .iter()
        .copied()
        .min_by(|a, b| (a - nominal).abs().total_cmp(&(b - nominal).abs()))
        .unwrap_or(nominal)
}

impl Compiled {
    fn new(circuit: Circuit) -> Result<Self, SolverError> {
        let order = Order::new(&circuit)?;
        let v_nominal_ln: Vec<f64> = order.nominal_kv.iter().map(|kv| kv * 1000.0 / SQRT3).collect();
        let mut compiled = Self {
            base_kv: order.nominal_kv.clone(),
            pv_on: vec![false; circuit.pv_systems.len()],
            voltages: Vec::new(),
            currents: vec![ZERO_PHASORS; order.branches.len()],
            circuit,
            order,
            v_nominal_ln,
            mode: SolveMode::Snapshot,
            minutes: 0,
            solves: 0,
            converged: false,
            injections: Vec::new(),
        };
        if compiled.circuit.calc_voltage_bases {
            compiled.calc_voltage_bases();
        }
        compiled.reset();
        Ok(compiled)
    }

    fn v_source(&self) -> Phasors {
        let src = &self.circuit.source;
        balanced(src.pu * src.base_kv * 1000.0 / SQRT3, src.angle)
    }

    fn calc_voltage_bases(&mut self) {
        for (b, base) in self.base_kv.iter_mut().enumerate() {
            *base = nearest_base(&self.circuit.voltage_bases, self.order.nominal_kv[b]);
        }
    }

    fn reset(&mut self) {
        self.minutes = 0;
        self.pv_on.iter_mut().for_each(|on| *on = false);
        self.solves = 0;
        self.converged = false;
        self.voltages = flat_start(&self.order, self.v_source(), &self.v_nominal_ln);
        self.currents = vec![ZERO_PHASORS; self.order.branches.len()];
        self.injections.clear();
    }

    fn shape_value(&self, shape: &Option<String>) -> Option<(f64, Option<f64>)> {
        let shape = self.circuit.shape(shape.as_deref()?)?;
        let i = shape.index_at(self.minutes);
        Some((shape.p[i], shape.q.as_ref().map(|q| q[i])))
    }

    fn bus_of(&self, bus: &BusRef) -> Result<usize, SolverError> {
        self.order
            .bus_index(&bus.bus)
            .ok_or_else(|| SolverError::UnknownBus(bus.bus.clone()))
    }

    /// Samples every load and PV system at the current time.
    fn sample(&mut self) -> Result<(), SolverError> {
        let daily = matches!(self.mode, SolveMode::Daily { .. });
        let mut injections = Vec::with_capacity(self.circuit.loads.len() + self.circuit.pv_systems.len());

        for load in &self.circuit.loads {
            let (kw, kvar) = match self.shape_value(&load.shape).filter(|_| daily) {
                Some((p, Some(q))) => (p, q),
                Some((p, None)) if load.kw != 0.0 => (p, p * load.kvar / load.kw),
                Some((p, None)) => (p, 0.0),
                None => (load.kw, load.kvar),
            };
            let n = load.bus.phases.len().max(1) as f64;
            injections.push(Injection {
                bus: self.bus_of(&load.bus)?,
                phases: load.bus.phases.clone(),
                s: Complex64::new(kw, kvar) * 1000.0 / n,
                v_band: None,
            });
        }

        for k in 0..self.circuit.pv_systems.len() {
            let pv = &self.circuit.pv_systems[k];
            let irradiance = match self.shape_value(&pv.shape).filter(|_| daily) {
                Some((p, _)) => p,
                None => 1.0,
            };
            let available = (pv.pmpp * irradiance).min(pv.kva);
            let on = if self.pv_on[k] {
                available >= pv.cut_out * pv.kva
            } else {
                available >= pv.cut_in * pv.kva && available > 0.0
            };
            let kw = if on { available } else { 0.0 };
            let n = pv.bus.phases.len().max(1) as f64;
            injections.push(Injection {
                bus: self.bus_of(&pv.bus)?,
                phases: pv.bus.phases.clone(),
                s: Complex64::new(-kw * 1000.0 / n, 0.0),
                v_band: Some((pv.v_min_pu, pv.v_max_pu)),
            });
            self.pv_on[k] = on;
        }

        self.injections = injections;
        Ok(())
    }

    fn solve_once(&mut self, opt: &SolveOpt) -> Result<(), SolverError> {
        self.sample()?;

        let v_source = self.v_source();
        let v0 = if self.voltages.iter().flatten().all(|v| v.is_finite()) {
            self.voltages.clone()
        } else {
            flat_start(&self.order, v_source, &self.v_nominal_ln)
        };

        let t0 = Instant::now();
        let injections = &self.injections;
        let v_nominal_ln = &self.v_nominal_ln;
        let nb = self.order.bus_count();
        let sweep = radial_pf(&self.order, v_source, v0, v_nominal_ln, opt, |v| {
            let mut i_bus = vec![ZERO_PHASORS; nb];
            for inj in injections {
                for &p in &inj.phases {
                    i_bus[inj.bus][p] += inj.current(v[inj.bus][p], v_nominal_ln[inj.bus]);
                }
            }
            i_bus
        });

        log::debug!(
            "t = {} min: {} in {} iterations ({:.3} ms)",
            self.minutes,
            if sweep.converged { "converged" } else { "did not converge" },
            sweep.iterations,
            t0.elapsed().as_secs_f64() * 1000.0
        );

        self.voltages = sweep.voltages;
        self.currents = sweep.currents;
        self.converged = sweep.converged && (self.solves == 0 || self.converged);
        self.solves += 1;
        Ok(())
    }

    fn element_power(&self, class: &str, name: &str) -> Result<Vec<Complex64>, SolverError> {
        let unknown = || SolverError::UnknownElement(format!("{}.{}", class, name));
        let injection_power = |k: usize, phases: &[usize], bus: &BusRef| -> Result<Vec<Complex64>, SolverError> {
            let b = self.bus_of(bus)?;
            Ok(phases
                .iter()
                .map(|&p| match self.injections.get(k) {
                    Some(inj) => {
                        let v = self.voltages[b][p];
                        v * inj.current(v, self.v_nominal_ln[b]).conj() / 1000.0
                    }
                    None => Complex64::new(0.0, 0.0),
                })
                .collect())
        };

        match class {
            "load" => {
                let k = self
                    .circuit
                    .loads
                    .iter()
                    .position(|l| l.name == name)
                    .ok_or_else(unknown)?;
                let load = &self.circuit.loads[k];
                injection_power(k, &load.bus.phases, &load.bus)
            }
            "pvsystem" => {
                let k = self
                    .circuit
                    .pv_systems
                    .iter()
                    .position(|pv| pv.name == name)
                    .ok_or_else(unknown)?;
                let pv = &self.circuit.pv_systems[k];
                injection_power(self.circuit.loads.len() + k, &pv.bus.phases, &pv.bus)
            }
            "transformer" | "line" => {
                let (kind, bus1) = if class == "transformer" {
                    let i = self
                        .circuit
                        .transformers
                        .iter()
                        .position(|t| t.name == name)
                        .ok_or_else(unknown)?;
                    (BranchKind::Transformer(i), self.circuit.transformers[i].bus1.clone())
                } else {
                    let i = self
                        .circuit
                        .lines
                        .iter()
                        .position(|l| l.name == name)
                        .ok_or_else(unknown)?;
                    (BranchKind::Line(i), self.circuit.lines[i].bus1.bus.clone())
                };
                let k = self.order.branch_index(kind).ok_or_else(unknown)?;
                let br = &self.order.branches[k];

                let mut upstream = Vec::with_capacity(br.phases.len());
                let mut downstream = Vec::with_capacity(br.phases.len());
                for &p in &br.phases {
                    let i_to = self.currents[k][p];
                    let i_from = i_to * br.ratio;
                    upstream.push(self.voltages[br.from][p] * i_from.conj() / 1000.0);
                    downstream.push(-self.voltages[br.to][p] * i_to.conj() / 1000.0);
                }
                if self.order.bus_names[br.from] == bus1 {
                    upstream.extend(downstream);
                    Ok(upstream)
                } else {
                    downstream.extend(upstream);
                    Ok(downstream)
                }
            }
            _ => Err(unknown()),
        }
    }
}

fn validate_shape(shape: &LoadShape) -> Result<(), SolverError> {
    let err = |msg: &str| SolverError::Shape {
        name: shape.name.clone(),
        msg: msg.to_string(),
    };
    if shape.p.is_empty() {
        return Err(err("no values"));
    }
    if shape.interval_minutes == 0 {
        return Err(err("interval must be positive"));
    }
    if let Some(q) = &shape.q {
        if q.len() != shape.p.len() {
            return Err(err("reactive values differ in length from active values"));
        }
    }
    if shape.p.iter().chain(shape.q.iter().flatten()).any(|v| !v.is_finite()) {
        return Err(err("values must be finite"));
    }
    Ok(())
}

impl CircuitSolver for RadialSolver {
    fn compile(&mut self, path: &Path) -> Result<(), SolverError> {
        let circuit = load_circuit(path)?;
        log::debug!("compiling '{}' from {}", circuit.name, path.display());
        self.compiled = Some(Compiled::new(circuit)?);
        Ok(())
    }

    fn set_voltage_bases(&mut self, bases: &[f64]) -> Result<(), SolverError> {
        if bases.iter().any(|&kv| !(kv > 0.0)) {
            return Err(SolverError::Network(format!(
                "voltage bases must be positive: {:?}",
                bases
            )));
        }
        self.compiled_mut()?.circuit.voltage_bases = bases.to_vec();
        Ok(())
    }

    fn calc_voltage_bases(&mut self) -> Result<(), SolverError> {
        self.compiled_mut()?.calc_voltage_bases();
        Ok(())
    }

    fn upsert_shape(&mut self, mut shape: LoadShape) -> Result<(), SolverError> {
        shape.name = shape.name.to_lowercase();
        validate_shape(&shape)?;
        self.compiled_mut()?.circuit.upsert_shape(shape);
        Ok(())
    }

    fn attach_shape_to_load(&mut self, load_id: &str, shape: &str) -> Result<(), SolverError> {
        let c = self.compiled_mut()?;
        let shape = shape.to_lowercase();
        if c.circuit.shape(&shape).is_none() {
            return Err(SolverError::UnknownShape(shape));
        }
        let name = element_name(load_id, "load");
        let load = c
            .circuit
            .load_mut(&name)
            .ok_or_else(|| SolverError::UnknownElement(format!("load.{}", name)))?;
        load.shape = Some(shape);
        Ok(())
    }

    fn create_pv_system(&mut self, spec: &PvSystemSpec) -> Result<(), SolverError> {
        let c = self.compiled_mut()?;
        let host = element_name(&spec.host_load, "load");
        let bus = c
            .circuit
            .load(&host)
            .map(|l| l.bus.clone())
            .ok_or_else(|| SolverError::UnknownElement(format!("load.{}", host)))?;
        if spec.phases != bus.phases.len() {
            return Err(SolverError::Network(format!(
                "PV system '{}' has {} phases but load '{}' has {}",
                spec.id,
                spec.phases,
                host,
                bus.phases.len()
            )));
        }
        if !(spec.kva > 0.0) || !(spec.kwp >= 0.0) {
            return Err(SolverError::Network(format!(
                "PV system '{}' needs a positive rating",
                spec.id
            )));
        }

        let pv = PvSystem {
            name: element_name(&spec.id, "pvsystem"),
            bus,
            kva: spec.kva,
            pmpp: spec.kwp,
            cut_in: spec.cutoff.0,
            cut_out: spec.cutoff.1,
            v_min_pu: spec.voltage_limits.0,
            v_max_pu: spec.voltage_limits.1,
            shape: None,
        };
        match c.circuit.pv_system_mut(&pv.name) {
            Some(existing) => *existing = pv,
            None => {
                c.circuit.pv_systems.push(pv);
                c.pv_on.push(false);
            }
        }
        Ok(())
    }

    fn attach_shape_to_pv(&mut self, pv_id: &str, shape: &str) -> Result<(), SolverError> {
        let c = self.compiled_mut()?;
        let shape = shape.to_lowercase();
        if c.circuit.shape(&shape).is_none() {
            return Err(SolverError::UnknownShape(shape));
        }
        let name = element_name(pv_id, "pvsystem");
        let pv = c
            .circuit
            .pv_system_mut(&name)
            .ok_or_else(|| SolverError::UnknownElement(format!("pvsystem.{}", name)))?;
        pv.shape = Some(shape);
        Ok(())
    }

    fn set_mode(&mut self, mode: SolveMode) -> Result<(), SolverError> {
        let c = self.compiled_mut()?;
        c.mode = mode;
        c.minutes = 0;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.compiled_mut()?.reset();
        Ok(())
    }

    fn solve_step(&mut self) -> Result<(), SolverError> {
        let opt = self.opt;
        let c = self.compiled_mut()?;
        match c.mode {
            SolveMode::Snapshot => c.solve_once(&opt)?,
            SolveMode::Daily {
                steps,
                step_minutes,
            } => {
                for _ in 0..steps {
                    c.solve_once(&opt)?;
                    c.minutes += step_minutes;
                }
            }
        }
        if log::log_enabled!(log::Level::Trace) {
            for load in &c.circuit.loads {
                let s = c.element_power("load", &load.name)?;
                log::trace!("load.{}: {}", load.name, format_power_vec(&s));
            }
        }
        Ok(())
    }

    fn is_converged(&self) -> bool {
        self.compiled
            .as_ref()
            .map_or(false, |c| c.solves > 0 && c.converged)
    }

    fn load_ids(&self) -> Result<Vec<String>, SolverError> {
        Ok(self
            .compiled()?
            .circuit
            .loads
            .iter()
            .map(|l| l.name.clone())
            .collect())
    }

    fn element_buses(&self, element: &str) -> Result<Vec<String>, SolverError> {
        let c = self.compiled()?;
        let (class, name) = split_id(element)?;
        let unknown = || SolverError::UnknownElement(element.to_string());
        let buses = match class.as_str() {
            "load" => vec![c.circuit.load(&name).ok_or_else(unknown)?.bus.to_dss()],
            "pvsystem" => {
                let pv = c.circuit.pv_systems.iter().find(|pv| pv.name == name);
                vec![pv.ok_or_else(unknown)?.bus.to_dss()]
            }
            "line" => {
                let l = c.circuit.lines.iter().find(|l| l.name == name).ok_or_else(unknown)?;
                vec![l.bus1.to_dss(), l.bus2.to_dss()]
            }
            "transformer" => {
                let t = c
                    .circuit
                    .transformers
                    .iter()
                    .find(|t| t.name == name)
                    .ok_or_else(unknown)?;
                vec![format!("{}.1.2.3", t.bus1), format!("{}.1.2.3", t.bus2)]
            }
            _ => return Err(unknown()),
        };
        Ok(buses)
    }

    fn read_element_power(&self, element: &str) -> Result<Vec<Complex64>, SolverError> {
        let (class, name) = split_id(element)?;
        self.compiled()?.element_power(&class, &name)
    }

    fn read_bus_voltage_pu(&self, bus: &str) -> Result<Vec<f64>, SolverError> {
        let c = self.compiled()?;
        let unknown = || SolverError::UnknownBus(bus.to_string());
        let r = BusRef::parse(bus, 0).map_err(|_| unknown())?;
        let b = c.order.bus_index(&r.bus).ok_or_else(unknown)?;
        let phases: Vec<usize> = if r.phases.is_empty() {
            (0..c.order.energised[b].len())
                .filter(|&p| c.order.energised[b][p])
                .collect()
        } else {
            r.phases
        };
        let v_base = c.base_kv[b] * 1000.0 / SQRT3;
        phases
            .into_iter()
            .map(|p| {
                if c.order.energised[b][p] {
                    Ok(c.voltages[b][p].norm() / v_base)
                } else {
                    Err(unknown())
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::env;
    use std::path::PathBuf;

    fn toy() -> PathBuf {
        let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into());
        Path::new(&manifest_dir).join("casedata").join("toy").join("Master.dss")
    }

    fn shape(name: &str, p: Vec<f64>) -> LoadShape {
        LoadShape {
            name: name.to_string(),
            q: Some(vec![0.0; p.len()]),
            p,
            interval_minutes: 30,
        }
    }

    #[test]
    fn requires_compiled_circuit() {
        let mut s = RadialSolver::default();
        assert!(matches!(s.solve_step(), Err(SolverError::NotCompiled)));
        assert!(!s.is_converged());
    }

    #[test]
    fn snapshot_of_toy_network() -> anyhow::Result<()> {
        let mut s = RadialSolver::default();
        s.compile(&toy())?;
        s.solve_step()?;
        assert!(s.is_converged());

        assert_eq!(s.load_ids()?, vec!["house1", "house2", "house3"]);
        assert_eq!(s.element_buses("Load.House2")?, vec!["house2.2"]);

        let v = s.read_bus_voltage_pu("house1.1")?;
        assert_eq!(v.len(), 1);
        assert!(v[0] < 1.0 && v[0] > 0.95);
        assert_eq!(s.read_bus_voltage_pu("lv_bus")?.len(), 3);
        assert!(s.read_bus_voltage_pu("house1.2").is_err());

        let load = s.read_element_power("load.house1")?;
        assert_relative_eq!(load[0].re, 1.0, epsilon = 1e-6);

        // Power into the primary covers the loads and the losses.
        let tr = s.read_element_power("transformer.tr1")?;
        assert_eq!(tr.len(), 6);
        let p_in: f64 = tr[..3].iter().map(|s| s.re).sum();
        let p_out: f64 = tr[3..].iter().map(|s| -s.re).sum();
        assert!(p_in > p_out && p_out > 3.0);
        Ok(())
    }

    #[test]
    fn daily_mode_follows_shapes() -> anyhow::Result<()> {
        let mut s = RadialSolver::default();
        s.compile(&toy())?;
        let mut p = vec![0.0; 48];
        p[1] = 2.5;
        s.upsert_shape(shape("Load_House1", p))?;
        s.attach_shape_to_load("house1", "load_house1")?;
        s.set_mode(SolveMode::Daily {
            steps: 1,
            step_minutes: 30,
        })?;
        s.reset()?;

        s.solve_step()?;
        let first = s.read_element_power("load.house1")?;
        s.solve_step()?;
        let second = s.read_element_power("load.house1")?;
        assert_relative_eq!(first[0].re, 0.0, epsilon = 1e-9);
        assert_relative_eq!(second[0].re, 2.5, epsilon = 1e-6);
        assert!(s.is_converged());
        Ok(())
    }

    #[test]
    fn pv_system_exports_at_host_bus() -> anyhow::Result<()> {
        let mut s = RadialSolver::default();
        s.compile(&toy())?;
        s.upsert_shape(shape("pv_house3", vec![0.5; 48]))?;
        s.create_pv_system(&PvSystemSpec {
            id: "pv_house3".to_string(),
            host_load: "load.house3".to_string(),
            kva: 4.0,
            kwp: 5.0,
            phases: 1,
            cutoff: (0.05, 0.05),
            voltage_limits: (0.5, 1.5),
        })?;
        s.attach_shape_to_pv("pvsystem.pv_house3", "pv_house3")?;
        s.set_mode(SolveMode::Daily {
            steps: 1,
            step_minutes: 30,
        })?;
        s.reset()?;
        s.solve_step()?;

        assert_eq!(s.element_buses("pvsystem.pv_house3")?, vec!["house3.3"]);
        let pv = s.read_element_power("pvsystem.pv_house3")?;
        assert_relative_eq!(pv[0].re, -2.5, epsilon = 1e-6);
        assert!(s.read_bus_voltage_pu("house3.3")?[0] > s.read_bus_voltage_pu("house2.2")?[0]);
        Ok(())
    }

    #[test]
    fn pv_cut_in_and_cut_out() -> anyhow::Result<()> {
        let mut s = RadialSolver::default();
        s.compile(&toy())?;
        // 10% rising to 30% and back down to 10% of a 10 kVA inverter
        s.upsert_shape(shape("sun", vec![0.1, 0.3, 0.15, 0.1]))?;
        s.create_pv_system(&PvSystemSpec {
            id: "pv1".to_string(),
            host_load: "house1".to_string(),
            kva: 10.0,
            kwp: 10.0,
            phases: 1,
            cutoff: (0.2, 0.12),
            voltage_limits: (0.5, 1.5),
        })?;
        s.attach_shape_to_pv("pv1", "sun")?;
        s.set_mode(SolveMode::Daily {
            steps: 1,
            step_minutes: 30,
        })?;
        s.reset()?;

        let mut out = Vec::new();
        for _ in 0..4 {
            s.solve_step()?;
            out.push(-s.read_element_power("pvsystem.pv1")?[0].re);
        }
        assert_relative_eq!(out[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(out[1], 3.0, epsilon = 1e-6);
        assert_relative_eq!(out[2], 1.5, epsilon = 1e-6);
        assert_relative_eq!(out[3], 0.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn massive_load_does_not_converge() -> anyhow::Result<()> {
        let mut s = RadialSolver::default();
        s.compile(&toy())?;
        s.upsert_shape(shape("huge", vec![2000.0; 48]))?;
        s.attach_shape_to_load("load.house2", "huge")?;
        s.set_mode(SolveMode::Daily {
            steps: 1,
            step_minutes: 30,
        })?;
        s.reset()?;
        s.solve_step()?;
        assert!(!s.is_converged());

        s.reset()?;
        assert!(!s.is_converged());
        Ok(())
    }

    #[test]
    fn unknown_names_are_errors() -> anyhow::Result<()> {
        let mut s = RadialSolver::default();
        s.compile(&toy())?;
        assert!(matches!(
            s.attach_shape_to_load("house1", "missing"),
            Err(SolverError::UnknownShape(_))
        ));
        s.upsert_shape(shape("x", vec![1.0]))?;
        assert!(matches!(
            s.attach_shape_to_load("nobody", "x"),
            Err(SolverError::UnknownElement(_))
        ));
        assert!(matches!(
            s.read_element_power("capacitor.c1"),
            Err(SolverError::UnknownElement(_))
        ));
        assert!(matches!(
            s.read_bus_voltage_pu("nowhere"),
            Err(SolverError::UnknownBus(_))
        ));
        Ok(())
    }

    #[test]
    fn voltage_bases_pick_nearest() -> anyhow::Result<()> {
        let mut s = RadialSolver::default();
        s.compile(&toy())?;
        s.set_voltage_bases(&[11.0, 0.4])?;
        s.calc_voltage_bases()?;
        s.solve_step()?;
        // 416 V nominal measured against a 400 V base
        let v = s.read_bus_voltage_pu("lv_bus.1")?[0];
        assert!(v > 1.03 && v < 1.05);
        assert!(s.set_voltage_bases(&[0.0]).is_err());
        Ok(())
    }
}
