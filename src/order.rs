use crate::circuit::{BusRef, Circuit};
use crate::error::SolverError;
use crate::math::NPHASE;
use num_complex::Complex64;
use std::collections::{HashMap, VecDeque};

/// Element a branch was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    /// Index into `Circuit::transformers`.
    Transformer(usize),
    /// Index into `Circuit::lines`.
    Line(usize),
}

/// Series element oriented away from the source.
#[derive(Debug, Clone)]
pub struct Branch {
    pub kind: BranchKind,
    /// Upstream bus index.
    pub from: usize,
    /// Downstream bus index.
    pub to: usize,
    /// Zero-based phases carried.
    pub phases: Vec<usize>,
    /// Voltage ratio `V_to / V_from` at no load.
    pub ratio: f64,
    /// Series impedance on the downstream side (ohm).
    pub z: Complex64,
}

/// Buses of a radial circuit indexed from zero, with the branches in
/// breadth-first order from the source.
#[derive(Debug, Clone)]
pub struct Order {
    pub bus_names: Vec<String>,
    index: HashMap<String, usize>,
    pub source: usize,
    /// Branches sorted so that every branch comes after the one feeding
    /// its upstream bus.
    pub branches: Vec<Branch>,
    /// Phases that are connected back to the source, per bus.
    pub energised: Vec<[bool; NPHASE]>,
    /// Nominal line-to-line voltage (kV) per bus, following the
    /// transformer ratios.
    pub nominal_kv: Vec<f64>,
}

impl Order {
    pub fn new(circuit: &Circuit) -> Result<Self, SolverError> {
        let mut bus_names: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut add_bus = |name: &str| -> usize {
            if let Some(&i) = index.get(name) {
                return i;
            }
            index.insert(name.to_string(), bus_names.len());
            bus_names.push(name.to_string());
            bus_names.len() - 1
        };

        let source = add_bus(&circuit.source.bus);

        // (kind, bus1, bus2, phases, ratio, z)
        let mut edges = Vec::with_capacity(circuit.transformers.len() + circuit.lines.len());
        for (i, tr) in circuit.transformers.iter().enumerate() {
            let (r, x) = tr.z_ohm();
            edges.push((
                BranchKind::Transformer(i),
                add_bus(&tr.bus1),
                add_bus(&tr.bus2),
                (0..NPHASE).collect::<Vec<usize>>(),
                tr.ratio(),
                Complex64::new(r, x),
            ));
        }
        for (i, ln) in circuit.lines.iter().enumerate() {
            edges.push((
                BranchKind::Line(i),
                add_bus(&ln.bus1.bus),
                add_bus(&ln.bus2.bus),
                ln.bus1.phases.clone(),
                1.0,
                Complex64::new(ln.r, ln.x),
            ));
        }
        for load in &circuit.loads {
            add_bus(&load.bus.bus);
        }
        for pv in &circuit.pv_systems {
            add_bus(&pv.bus.bus);
        }

        let nb = bus_names.len();
        let mut adjacent: Vec<Vec<usize>> = vec![Vec::new(); nb];
        for (e, edge) in edges.iter().enumerate() {
            adjacent[edge.1].push(e);
            adjacent[edge.2].push(e);
        }

        let mut visited = vec![false; nb];
        let mut used = vec![false; edges.len()];
        let mut energised = vec![[false; NPHASE]; nb];
        let mut nominal_kv = vec![0.0; nb];
        let mut branches = Vec::with_capacity(edges.len());

        visited[source] = true;
        energised[source] = [true; NPHASE];
        nominal_kv[source] = circuit.source.base_kv;

        let mut queue = VecDeque::from([source]);
        while let Some(b) = queue.pop_front() {
            for &e in &adjacent[b] {
                if used[e] {
                    continue;
                }
                used[e] = true;
                let (kind, b1, b2, phases, ratio, z) = &edges[e];
                let to = if *b1 == b { *b2 } else { *b1 };
                let name = element_name(circuit, *kind);
                if visited[to] {
                    return Err(SolverError::Network(format!(
                        "{} closes a loop at bus '{}'",
                        name, bus_names[to]
                    )));
                }
                if matches!(kind, BranchKind::Transformer(_)) && *b1 != b {
                    return Err(SolverError::Network(format!(
                        "{} is fed from its secondary winding",
                        name
                    )));
                }
                for &p in phases {
                    if !energised[b][p] {
                        return Err(SolverError::Network(format!(
                            "{} uses phase {} which is not energised at bus '{}'",
                            name,
                            p + 1,
                            bus_names[b]
                        )));
                    }
                    energised[to][p] = true;
                }
                visited[to] = true;
                nominal_kv[to] = nominal_kv[b] * ratio;
                branches.push(Branch {
                    kind: *kind,
                    from: b,
                    to,
                    phases: phases.clone(),
                    ratio: *ratio,
                    z: *z,
                });
                queue.push_back(to);
            }
        }

        if let Some(i) = visited.iter().position(|v| !v) {
            return Err(SolverError::Network(format!(
                "bus '{}' is not connected to the source",
                bus_names[i]
            )));
        }

        let order = Self {
            bus_names,
            index,
            source,
            branches,
            energised,
            nominal_kv,
        };
        for load in &circuit.loads {
            order.check_connection(&format!("load.{}", load.name), &load.bus)?;
        }
        for pv in &circuit.pv_systems {
            order.check_connection(&format!("pvsystem.{}", pv.name), &pv.bus)?;
        }
        Ok(order)
    }

    pub fn bus_count(&self) -> usize {
        self.bus_names.len()
    }

    pub fn bus_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Position in `branches` of the branch built from `kind`.
    pub fn branch_index(&self, kind: BranchKind) -> Option<usize> {
        self.branches.iter().position(|br| br.kind == kind)
    }

    /// Errors unless every phase of `bus` is energised.
    pub fn check_connection(&self, element: &str, bus: &BusRef) -> Result<(), SolverError> {
        let b = self
            .bus_index(&bus.bus)
            .ok_or_else(|| SolverError::UnknownBus(bus.bus.clone()))?;
        match bus.phases.iter().find(|&&p| !self.energised[b][p]) {
            Some(p) => Err(SolverError::Network(format!(
                "{} is connected to phase {} of bus '{}' which is not energised",
                element,
                p + 1,
                bus.bus
            ))),
            None => Ok(()),
        }
    }
}

fn element_name(circuit: &Circuit, kind: BranchKind) -> String {
    match kind {
        BranchKind::Transformer(i) => format!("transformer.{}", circuit.transformers[i].name),
        BranchKind::Line(i) => format!("line.{}", circuit.lines[i].name),
    }
}
