use crate::math::NPHASE;
use serde::{Deserialize, Serialize};

/// A compiled low-voltage circuit: a stiff source feeding a radial tree of
/// transformers and lines with single- or three-phase loads.
///
/// All element and bus names are stored lowercase.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    pub name: String,

    pub source: Source,

    pub transformers: Vec<Transformer>,

    pub line_codes: Vec<LineCode>,

    pub lines: Vec<Line>,

    pub loads: Vec<Load>,

    pub pv_systems: Vec<PvSystem>,

    pub shapes: Vec<LoadShape>,

    /// Candidate line-to-line base voltages (kV).
    pub voltage_bases: Vec<f64>,

    /// Set when the description asks for bus bases to be computed.
    pub calc_voltage_bases: bool,
}

impl Circuit {
    pub fn line_code(&self, name: &str) -> Option<&LineCode> {
        self.line_codes.iter().find(|lc| lc.name == name)
    }

    pub fn load(&self, name: &str) -> Option<&Load> {
        self.loads.iter().find(|l| l.name == name)
    }

    pub fn load_mut(&mut self, name: &str) -> Option<&mut Load> {
        self.loads.iter_mut().find(|l| l.name == name)
    }

    pub fn pv_system_mut(&mut self, name: &str) -> Option<&mut PvSystem> {
        self.pv_systems.iter_mut().find(|pv| pv.name == name)
    }

    pub fn shape(&self, name: &str) -> Option<&LoadShape> {
        self.shapes.iter().find(|s| s.name == name)
    }

    /// Adds `shape`, replacing any shape of the same name.
    pub fn upsert_shape(&mut self, shape: LoadShape) {
        match self.shapes.iter_mut().find(|s| s.name == shape.name) {
            Some(existing) => *existing = shape,
            None => self.shapes.push(shape),
        }
    }
}

/// Bus reference with the nodes (phases 1..=3) it connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRef {
    pub bus: String,
    /// Zero-based phase indices.
    pub phases: Vec<usize>,
}

impl BusRef {
    /// Parses `name` or `name.1.2.3`. Node 0 (neutral) is dropped. When no
    /// node is given the first `default_phases` phases are used.
    pub fn parse(s: &str, default_phases: usize) -> Result<Self, String> {
        let mut parts = s.trim().split('.');
        let bus = parts.next().unwrap_or_default().to_lowercase();
        if bus.is_empty() {
            return Err(format!("empty bus name in '{}'", s));
        }
        let mut phases = Vec::new();
        for node in parts {
            let n: usize = node
                .parse()
                .map_err(|_| format!("invalid node '{}' in '{}'", node, s))?;
            match n {
                0 => {}
                1..=NPHASE => {
                    if !phases.contains(&(n - 1)) {
                        phases.push(n - 1)
                    }
                }
                _ => return Err(format!("node {} out of range in '{}'", n, s)),
            }
        }
        if phases.is_empty() {
            phases = (0..default_phases.min(NPHASE)).collect();
        }
        Ok(Self { bus, phases })
    }

    /// `bus.n1.n2` with one-based nodes.
    pub fn to_dss(&self) -> String {
        let nodes: Vec<String> = self.phases.iter().map(|p| (p + 1).to_string()).collect();
        format!("{}.{}", self.bus, nodes.join("."))
    }
}

/// Stiff three-phase source.
#[derive(Debug, Clone)]
pub struct Source {
    pub bus: String,

    /// Base voltage, line-to-line (kV).
    pub base_kv: f64,

    /// Operating voltage (p.u.).
    pub pu: f64,

    /// Phase A angle (degrees).
    pub angle: f64,
}

impl Default for Source {
    fn default() -> Self {
        Self {
            bus: "sourcebus".to_string(),
            base_kv: 11.0,
            pu: 1.0,
            angle: 0.0,
        }
    }
}

/// Two-winding transformer, modelled as an ideal ratio followed by the
/// series impedance referred to the secondary.
#[derive(Debug, Clone)]
pub struct Transformer {
    pub name: String,

    pub bus1: String,

    pub bus2: String,

    /// Winding voltages, line-to-line (kV).
    pub kv: [f64; 2],

    /// Rating (kVA).
    pub kva: f64,

    /// Total winding resistance (% on rating).
    pub pct_r: f64,

    /// Leakage reactance (% on rating).
    pub xhl: f64,
}

impl Transformer {
    /// Series impedance in ohms on the secondary side.
    pub fn z_ohm(&self) -> (f64, f64) {
        let z_base = self.kv[1] * self.kv[1] / (self.kva / 1000.0);
        (self.pct_r / 100.0 * z_base, self.xhl / 100.0 * z_base)
    }

    pub fn ratio(&self) -> f64 {
        self.kv[1] / self.kv[0]
    }
}

/// Length units accepted for lines and line codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    None,
    Metre,
    Kilometre,
    Foot,
    Kilofoot,
    Mile,
}

impl LengthUnit {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(LengthUnit::None),
            "m" => Some(LengthUnit::Metre),
            "km" => Some(LengthUnit::Kilometre),
            "ft" => Some(LengthUnit::Foot),
            "kft" => Some(LengthUnit::Kilofoot),
            "mi" => Some(LengthUnit::Mile),
            _ => None,
        }
    }

    /// Length of one unit in metres. `None` counts as one metre.
    pub fn metres(self) -> f64 {
        match self {
            LengthUnit::None | LengthUnit::Metre => 1.0,
            LengthUnit::Kilometre => 1000.0,
            LengthUnit::Foot => 0.3048,
            LengthUnit::Kilofoot => 304.8,
            LengthUnit::Mile => 1609.344,
        }
    }
}

/// Positive-sequence impedance per unit length.
#[derive(Debug, Clone)]
pub struct LineCode {
    pub name: String,

    /// Resistance (ohm per `units`).
    pub r1: f64,

    /// Reactance (ohm per `units`).
    pub x1: f64,

    pub units: LengthUnit,
}

#[derive(Debug, Clone)]
pub struct Line {
    pub name: String,

    pub bus1: BusRef,

    pub bus2: BusRef,

    /// Series resistance (ohm).
    pub r: f64,

    /// Series reactance (ohm).
    pub x: f64,
}

/// Constant-power load.
#[derive(Debug, Clone)]
pub struct Load {
    pub name: String,

    pub bus: BusRef,

    /// Nominal active power (kW), used when no shape is attached.
    pub kw: f64,

    /// Nominal reactive power (kvar).
    pub kvar: f64,

    /// Attached shape of actual kW / kvar values.
    pub shape: Option<String>,
}

/// Rooftop PV system connected at its host load's bus.
#[derive(Debug, Clone)]
pub struct PvSystem {
    pub name: String,

    pub bus: BusRef,

    /// Inverter rating (kVA).
    pub kva: f64,

    /// Array rating (kWp) at irradiance 1.0.
    pub pmpp: f64,

    /// Inverter switches on above this fraction of `kva`.
    pub cut_in: f64,

    /// Inverter switches off below this fraction of `kva`.
    pub cut_out: f64,

    /// Outside [v_min_pu, v_max_pu] the output behaves as a constant
    /// impedance.
    pub v_min_pu: f64,

    pub v_max_pu: f64,

    /// Attached irradiance shape (normalized 0..1).
    pub shape: Option<String>,
}

/// Parameters of a PV system to be created at a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvSystemSpec {
    pub id: String,
    pub host_load: String,
    pub kva: f64,
    pub kwp: f64,
    pub phases: usize,
    /// (cut-in, cut-out) as fractions of `kva`.
    pub cutoff: (f64, f64),
    /// (min, max) voltage (p.u.) of constant-power operation.
    pub voltage_limits: (f64, f64),
}

/// Named time series sampled every `interval_minutes`.
///
/// Applied to a load, `p` and `q` are actual kW / kvar. Applied to a PV
/// system, `p` is the normalized irradiance and `q` is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadShape {
    pub name: String,
    pub p: Vec<f64>,
    pub q: Option<Vec<f64>>,
    pub interval_minutes: u32,
}

impl LoadShape {
    /// Value index at `minutes` past the start of the day, wrapping around.
    pub fn index_at(&self, minutes: u32) -> usize {
        if self.p.is_empty() || self.interval_minutes == 0 {
            return 0;
        }
        (minutes / self.interval_minutes) as usize % self.p.len()
    }
}
