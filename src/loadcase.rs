use crate::circuit::{
    BusRef, Circuit, LengthUnit, Line, LineCode, Load, LoadShape, PvSystem, Source, Transformer,
};
use crate::error::SolverError;
use crate::math::q_from_pf;
use std::fs;
use std::path::{Path, PathBuf};

const MAX_REDIRECT_DEPTH: usize = 16;

/// Reads a network description: a master file plus any files it
/// `Redirect`s to, in a subset of the DSS text syntax.
pub fn load_circuit(path: &Path) -> Result<Circuit, SolverError> {
    let mut parser = Parser::default();
    parser.read_file(path, 0)?;
    parser.finish(path)
}

/// One command with its origin, after comments and `~` continuations are
/// folded.
struct Statement {
    text: String,
    line: usize,
}

struct PendingLine {
    name: String,
    bus1: String,
    bus2: Option<String>,
    phases: usize,
    linecode: Option<String>,
    length: f64,
    units: Option<LengthUnit>,
    r1: Option<f64>,
    x1: Option<f64>,
    origin: (PathBuf, usize),
}

#[derive(Default)]
struct Parser {
    circuit: Option<Circuit>,
    lines: Vec<PendingLine>,
}

fn strip_comment(line: &str) -> &str {
    let cut = [line.find('!'), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..cut]
}

fn statements(text: &str) -> Vec<Statement> {
    let mut out: Vec<Statement> = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_lowercase();
        let continuation = if line.starts_with('~') {
            Some(&line[1..])
        } else if lower.starts_with("more ") {
            Some(&line[5..])
        } else {
            None
        };
        if let (Some(rest), Some(prev)) = (continuation, out.last_mut()) {
            prev.text.push(' ');
            prev.text.push_str(rest.trim());
            continue;
        }
        out.push(Statement {
            text: line.to_string(),
            line: i + 1,
        });
    }
    out
}

/// Splits a statement into tokens, keeping bracketed and quoted values
/// whole and joining `key = value` into `key=value`.
fn tokenize(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut tokens = Vec::new();
    let mut cur = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            cur.push(c);
            if c == q {
                quote = None;
            }
        } else if c == '"' || c == '\'' {
            quote = Some(c);
            cur.push(c);
        } else if c == '[' || c == '(' || c == '{' {
            depth += 1;
            cur.push(c);
        } else if c == ']' || c == ')' || c == '}' {
            depth = depth.saturating_sub(1);
            cur.push(c);
        } else if depth == 0 && (c.is_whitespace() || c == ',') {
            let next = chars[i..].iter().find(|c| !c.is_whitespace());
            let joins = cur.ends_with('=') || next == Some(&'=');
            if !joins && !cur.is_empty() {
                tokens.push(std::mem::take(&mut cur));
            }
        } else {
            cur.push(c);
        }
        i += 1;
    }
    if !cur.is_empty() {
        tokens.push(cur);
    }
    tokens
}

fn unquote(v: &str) -> &str {
    v.trim_matches(|c| c == '"' || c == '\'')
}

fn parse_array(v: &str) -> Result<Vec<f64>, String> {
    let inner = v.trim_matches(|c: char| "[](){}\"'".contains(c));
    if inner.to_lowercase().contains("file=") {
        return Err("file references in arrays are not supported".to_string());
    }
    inner
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().map_err(|_| format!("invalid number '{}'", s)))
        .collect()
}

fn parse_names(v: &str) -> Vec<String> {
    v.trim_matches(|c: char| "[](){}\"'".contains(c))
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_f64(key: &str, v: &str) -> Result<f64, String> {
    unquote(v)
        .parse::<f64>()
        .map_err(|_| format!("{}: invalid number '{}'", key, v))
}

fn parse_usize(key: &str, v: &str) -> Result<usize, String> {
    unquote(v)
        .parse::<usize>()
        .map_err(|_| format!("{}: invalid integer '{}'", key, v))
}

fn parse_units(v: &str) -> Result<LengthUnit, String> {
    LengthUnit::parse(unquote(v)).ok_or_else(|| format!("unknown length unit '{}'", v))
}

/// `key=value` pairs in statement order, keys lowercased.
fn properties(tokens: &[String]) -> Result<Vec<(String, String)>, String> {
    tokens
        .iter()
        .map(|t| match t.split_once('=') {
            Some((k, v)) => Ok((k.trim().to_lowercase(), v.trim().to_string())),
            None => Err(format!("positional parameter '{}' is not supported", t)),
        })
        .collect()
}

fn ignored(class: &str, name: &str, key: &str) {
    log::debug!("ignoring {}.{} property '{}'", class, name, key);
}

impl Parser {
    fn read_file(&mut self, path: &Path, depth: usize) -> Result<(), SolverError> {
        if depth > MAX_REDIRECT_DEPTH {
            return Err(SolverError::Parse {
                path: path.to_path_buf(),
                line: 0,
                msg: "redirects nested too deeply".to_string(),
            });
        }
        let text = fs::read_to_string(path).map_err(|source| SolverError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        for stmt in statements(&text) {
            let err = |msg: String| SolverError::Parse {
                path: path.to_path_buf(),
                line: stmt.line,
                msg,
            };
            let tokens = tokenize(&stmt.text);
            let (command, args) = match tokens.split_first() {
                Some((c, a)) => (c.to_lowercase(), a),
                None => continue,
            };
            match command.as_str() {
                "clear" => {
                    self.circuit = None;
                    self.lines.clear();
                }
                "redirect" | "compile" => {
                    let file = args
                        .first()
                        .ok_or_else(|| err("missing file name".to_string()))?;
                    self.read_file(&dir.join(unquote(file)), depth + 1)?;
                }
                "new" => {
                    let (target, rest) = args
                        .split_first()
                        .ok_or_else(|| err("missing element name".to_string()))?;
                    let target = target.as_str();
                    let target = target
                        .strip_prefix("object=")
                        .or_else(|| target.strip_prefix("Object="))
                        .unwrap_or(target);
                    let (class, name) = target
                        .split_once('.')
                        .ok_or_else(|| err(format!("expected Class.name, found '{}'", target)))?;
                    let props = properties(rest).map_err(&err)?;
                    self.new_element(&class.to_lowercase(), &name.to_lowercase(), props, (path, stmt.line))
                        .map_err(&err)?;
                }
                "set" => {
                    let props = properties(args).map_err(&err)?;
                    let circuit = self.circuit_mut().map_err(&err)?;
                    for (key, value) in props {
                        match key.as_str() {
                            "voltagebases" => {
                                circuit.voltage_bases = parse_array(&value).map_err(&err)?
                            }
                            _ => log::warn!("{}:{}: ignoring 'set {}'", path.display(), stmt.line, key),
                        }
                    }
                }
                "calcvoltagebases" | "calcv" => {
                    self.circuit_mut().map_err(&err)?.calc_voltage_bases = true;
                }
                "solve" | "show" | "plot" | "export" | "buscoords" | "sample" | "interpolate" => {
                    log::warn!("{}:{}: ignoring '{}'", path.display(), stmt.line, command);
                }
                _ => return Err(err(format!("unsupported command '{}'", command))),
            }
        }
        Ok(())
    }

    fn circuit_mut(&mut self) -> Result<&mut Circuit, String> {
        self.circuit
            .as_mut()
            .ok_or_else(|| "no circuit defined yet".to_string())
    }

    fn new_element(
        &mut self,
        class: &str,
        name: &str,
        props: Vec<(String, String)>,
        origin: (&Path, usize),
    ) -> Result<(), String> {
        if class == "circuit" {
            self.lines.clear();
            self.circuit = Some(new_circuit(name, &props)?);
            return Ok(());
        }
        let circuit = self
            .circuit
            .as_mut()
            .ok_or_else(|| "no circuit defined yet".to_string())?;

        match class {
            "transformer" => circuit.transformers.push(new_transformer(name, &props)?),
            "linecode" => circuit.line_codes.push(new_line_code(name, &props)?),
            "load" => circuit.loads.push(new_load(name, &props)?),
            "loadshape" => circuit.upsert_shape(new_load_shape(name, &props)?),
            "pvsystem" => circuit.pv_systems.push(new_pv_system(name, &props)?),
            "line" => {
                let line = pending_line(name, &props, origin)?;
                self.lines.push(line);
            }
            _ => return Err(format!("unsupported element class '{}'", class)),
        }
        Ok(())
    }

    /// Resolves line codes, which may be defined after the lines using
    /// them.
    fn finish(self, path: &Path) -> Result<Circuit, SolverError> {
        let mut circuit = self.circuit.ok_or_else(|| SolverError::Parse {
            path: path.to_path_buf(),
            line: 0,
            msg: "no circuit defined".to_string(),
        })?;
        for pl in self.lines {
            let err = |msg: String| SolverError::Parse {
                path: pl.origin.0.clone(),
                line: pl.origin.1,
                msg,
            };
            let (r, x) = match &pl.linecode {
                Some(code) => {
                    let lc = circuit
                        .line_code(code)
                        .ok_or_else(|| err(format!("unknown linecode '{}'", code)))?;
                    let units = pl.units.unwrap_or(lc.units);
                    let len = pl.length * units.metres() / lc.units.metres();
                    (lc.r1 * len, lc.x1 * len)
                }
                None => match (pl.r1, pl.x1) {
                    (Some(r1), Some(x1)) => (r1 * pl.length, x1 * pl.length),
                    _ => return Err(err(format!("line '{}' needs a linecode or r1/x1", pl.name))),
                },
            };
            let bus1 = BusRef::parse(&pl.bus1, pl.phases).map_err(&err)?;
            let bus2_text = pl
                .bus2
                .as_deref()
                .ok_or_else(|| err(format!("line '{}' has no bus2", pl.name)))?;
            let mut bus2 = BusRef::parse(bus2_text, bus1.phases.len()).map_err(&err)?;
            if !bus2_text.contains('.') {
                bus2.phases = bus1.phases.clone();
            }
            if bus1.phases != bus2.phases {
                return Err(err(format!(
                    "line '{}' connects {} to {}: phases must match",
                    pl.name,
                    bus1.to_dss(),
                    bus2.to_dss()
                )));
            }
            circuit.lines.push(Line {
                name: pl.name,
                bus1,
                bus2,
                r,
                x,
            });
        }
        log::debug!(
            "compiled circuit '{}': {} transformers, {} lines, {} loads, {} PV systems",
            circuit.name,
            circuit.transformers.len(),
            circuit.lines.len(),
            circuit.loads.len(),
            circuit.pv_systems.len()
        );
        Ok(circuit)
    }
}

fn new_circuit(name: &str, props: &[(String, String)]) -> Result<Circuit, String> {
    let mut source = Source::default();
    for (key, value) in props {
        match key.as_str() {
            "basekv" => source.base_kv = parse_f64(key, value)?,
            "pu" => source.pu = parse_f64(key, value)?,
            "angle" => source.angle = parse_f64(key, value)?,
            "bus1" => source.bus = BusRef::parse(unquote(value), 3)?.bus,
            _ => ignored("circuit", name, key),
        }
    }
    Ok(Circuit {
        name: name.to_string(),
        source,
        ..Default::default()
    })
}

fn new_transformer(name: &str, props: &[(String, String)]) -> Result<Transformer, String> {
    let mut buses: [Option<String>; 2] = [None, None];
    let mut kv = [None, None];
    let mut kva = None;
    let mut pct_r = 0.0;
    let mut xhl = 7.0;
    let mut wdg = 0usize;

    let winding = |w: usize| -> Result<usize, String> {
        if w < 2 {
            Ok(w)
        } else {
            Err(format!("transformer '{}': only two windings are supported", name))
        }
    };

    for (key, value) in props {
        match key.as_str() {
            "windings" => {
                if parse_usize(key, value)? != 2 {
                    return Err(format!("transformer '{}': only two windings are supported", name));
                }
            }
            "buses" => {
                for (i, b) in parse_names(value).iter().enumerate() {
                    buses[winding(i)?] = Some(BusRef::parse(b, 3)?.bus);
                }
            }
            "kvs" => {
                for (i, v) in parse_array(value)?.into_iter().enumerate() {
                    kv[winding(i)?] = Some(v);
                }
            }
            "kvas" => {
                kva = parse_array(value)?.first().copied();
            }
            "%rs" => pct_r = parse_array(value)?.iter().sum(),
            "%r" => pct_r = 2.0 * parse_f64(key, value)?,
            "%loadloss" => pct_r = parse_f64(key, value)?,
            "xhl" | "%xhl" => xhl = parse_f64(key, value)?,
            "wdg" => wdg = winding(parse_usize(key, value)?.saturating_sub(1))?,
            "bus" => buses[wdg] = Some(BusRef::parse(unquote(value), 3)?.bus),
            "kv" => kv[wdg] = Some(parse_f64(key, value)?),
            "kva" => {
                if wdg == 0 {
                    kva = Some(parse_f64(key, value)?)
                }
            }
            _ => ignored("transformer", name, key),
        }
    }

    let missing = |what: &str| format!("transformer '{}': missing {}", name, what);
    let [bus1, bus2] = buses;
    let tr = Transformer {
        name: name.to_string(),
        bus1: bus1.ok_or_else(|| missing("primary bus"))?,
        bus2: bus2.ok_or_else(|| missing("secondary bus"))?,
        kv: [
            kv[0].ok_or_else(|| missing("primary kv"))?,
            kv[1].ok_or_else(|| missing("secondary kv"))?,
        ],
        kva: kva.ok_or_else(|| missing("kva"))?,
        pct_r,
        xhl,
    };
    if tr.kva <= 0.0 || tr.kv.iter().any(|&v| v <= 0.0) {
        return Err(format!("transformer '{}': ratings must be positive", name));
    }
    Ok(tr)
}

fn new_line_code(name: &str, props: &[(String, String)]) -> Result<LineCode, String> {
    let mut lc = LineCode {
        name: name.to_string(),
        r1: 0.0,
        x1: 0.0,
        units: LengthUnit::None,
    };
    for (key, value) in props {
        match key.as_str() {
            "r1" => lc.r1 = parse_f64(key, value)?,
            "x1" => lc.x1 = parse_f64(key, value)?,
            "units" => lc.units = parse_units(value)?,
            _ => ignored("linecode", name, key),
        }
    }
    Ok(lc)
}

fn pending_line(
    name: &str,
    props: &[(String, String)],
    origin: (&Path, usize),
) -> Result<PendingLine, String> {
    let mut pl = PendingLine {
        name: name.to_string(),
        bus1: String::new(),
        bus2: None,
        phases: 3,
        linecode: None,
        length: 1.0,
        units: None,
        r1: None,
        x1: None,
        origin: (origin.0.to_path_buf(), origin.1),
    };
    for (key, value) in props {
        match key.as_str() {
            "bus1" => pl.bus1 = unquote(value).to_string(),
            "bus2" => pl.bus2 = Some(unquote(value).to_string()),
            "phases" => pl.phases = parse_usize(key, value)?,
            "linecode" => pl.linecode = Some(unquote(value).to_lowercase()),
            "length" => pl.length = parse_f64(key, value)?,
            "units" => pl.units = Some(parse_units(value)?),
            "r1" => pl.r1 = Some(parse_f64(key, value)?),
            "x1" => pl.x1 = Some(parse_f64(key, value)?),
            _ => ignored("line", name, key),
        }
    }
    if pl.bus1.is_empty() {
        return Err(format!("line '{}' has no bus1", name));
    }
    Ok(pl)
}

fn new_load(name: &str, props: &[(String, String)]) -> Result<Load, String> {
    let mut bus = None;
    let mut phases = 3;
    let mut kw = 10.0;
    let mut kvar = None;
    let mut pf = 0.88;
    let mut shape = None;
    for (key, value) in props {
        match key.as_str() {
            "bus1" => bus = Some(unquote(value).to_string()),
            "phases" => phases = parse_usize(key, value)?,
            "kw" => kw = parse_f64(key, value)?,
            "kvar" => kvar = Some(parse_f64(key, value)?),
            "pf" => pf = parse_f64(key, value)?,
            "daily" | "yearly" | "duty" => shape = Some(unquote(value).to_lowercase()),
            _ => ignored("load", name, key),
        }
    }
    let bus = bus.ok_or_else(|| format!("load '{}' has no bus1", name))?;
    if !(pf > 0.0 && pf <= 1.0) {
        return Err(format!("load '{}': power factor {} outside (0, 1]", name, pf));
    }
    Ok(Load {
        name: name.to_string(),
        bus: BusRef::parse(&bus, phases)?,
        kw,
        kvar: kvar.unwrap_or_else(|| q_from_pf(kw, pf)),
        shape,
    })
}

fn new_load_shape(name: &str, props: &[(String, String)]) -> Result<LoadShape, String> {
    let mut npts = None;
    let mut minutes = 60.0;
    let mut p = None;
    let mut q = None;
    for (key, value) in props {
        match key.as_str() {
            "npts" => npts = Some(parse_usize(key, value)?),
            "interval" => minutes = parse_f64(key, value)? * 60.0,
            "minterval" => minutes = parse_f64(key, value)?,
            "sinterval" => minutes = parse_f64(key, value)? / 60.0,
            "mult" | "pmult" => p = Some(parse_array(value)?),
            "qmult" => q = Some(parse_array(value)?),
            _ => ignored("loadshape", name, key),
        }
    }
    let p = p
        .filter(|p| !p.is_empty())
        .ok_or_else(|| format!("loadshape '{}' has no multipliers", name))?;
    if p.iter().chain(q.iter().flatten()).any(|v| !v.is_finite()) {
        return Err(format!("loadshape '{}': multipliers must be finite", name));
    }
    if let Some(n) = npts {
        if n != p.len() {
            return Err(format!("loadshape '{}': npts={} but {} values", name, n, p.len()));
        }
    }
    if q.as_ref().map_or(false, |q: &Vec<f64>| q.len() != p.len()) {
        return Err(format!("loadshape '{}': qmult length differs from pmult", name));
    }
    if minutes < 1.0 || minutes.fract() != 0.0 {
        return Err(format!("loadshape '{}': interval must be whole minutes", name));
    }
    Ok(LoadShape {
        name: name.to_string(),
        p,
        q,
        interval_minutes: minutes as u32,
    })
}

fn new_pv_system(name: &str, props: &[(String, String)]) -> Result<PvSystem, String> {
    let mut bus = None;
    let mut phases = 3;
    let mut pv = PvSystem {
        name: name.to_string(),
        bus: BusRef {
            bus: String::new(),
            phases: Vec::new(),
        },
        kva: 500.0,
        pmpp: 500.0,
        cut_in: 0.2,
        cut_out: 0.2,
        v_min_pu: 0.9,
        v_max_pu: 1.1,
        shape: None,
    };
    for (key, value) in props {
        match key.as_str() {
            "bus1" => bus = Some(unquote(value).to_string()),
            "phases" => phases = parse_usize(key, value)?,
            "kva" => pv.kva = parse_f64(key, value)?,
            "pmpp" => pv.pmpp = parse_f64(key, value)?,
            "%cutin" => pv.cut_in = parse_f64(key, value)? / 100.0,
            "%cutout" => pv.cut_out = parse_f64(key, value)? / 100.0,
            "vminpu" => pv.v_min_pu = parse_f64(key, value)?,
            "vmaxpu" => pv.v_max_pu = parse_f64(key, value)?,
            "daily" | "yearly" | "duty" => pv.shape = Some(unquote(value).to_lowercase()),
            _ => ignored("pvsystem", name, key),
        }
    }
    let bus = bus.ok_or_else(|| format!("pvsystem '{}' has no bus1", name))?;
    pv.bus = BusRef::parse(&bus, phases)?;
    Ok(pv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn casedata(name: &str) -> PathBuf {
        let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into());
        Path::new(&manifest_dir).join("casedata").join(name)
    }

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn tokenizes_arrays_and_spaced_assignments() {
        let t = tokenize("New Transformer.TR1 buses=[a b] kvs = [11, 0.416] %r=0.5");
        assert_eq!(
            t,
            vec!["New", "Transformer.TR1", "buses=[a b]", "kvs=[11, 0.416]", "%r=0.5"]
        );
    }

    #[test]
    fn folds_continuations_and_comments() {
        let stmts = statements("New Load.a bus1=x ! trailing\n~ kw=2\n\n// note\nsolve");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].text, "New Load.a bus1=x kw=2");
        assert_eq!(stmts[0].line, 1);
        assert_eq!(stmts[1].line, 5);
    }

    #[test]
    fn loads_toy_network_through_redirects() -> anyhow::Result<()> {
        let c = load_circuit(&casedata("toy/Master.dss"))?;

        assert_eq!(c.name, "toy");
        assert_eq!(c.source.bus, "sourcebus");
        assert_eq!(c.voltage_bases, vec![11.0, 0.416]);
        assert!(c.calc_voltage_bases);

        assert_eq!(c.transformers.len(), 1);
        let tr = &c.transformers[0];
        assert_eq!((tr.bus1.as_str(), tr.bus2.as_str()), ("sourcebus", "lv_bus"));
        assert_eq!(tr.kva, 100.0);
        assert_eq!(tr.pct_r, 1.0);

        assert_eq!(c.lines.len(), 5);
        let l1 = c.lines.iter().find(|l| l.name == "l1").unwrap();
        assert!((l1.r - 0.0166).abs() < 1e-12);
        let s2 = c.lines.iter().find(|l| l.name == "s2").unwrap();
        assert_eq!(s2.bus2.phases, vec![1]);

        let names: Vec<&str> = c.loads.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["house1", "house2", "house3"]);
        assert_eq!(c.loads[2].bus.to_dss(), "house3.3");
        Ok(())
    }

    #[test]
    fn line_length_converts_between_units() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let master = write(
            dir.path(),
            "master.dss",
            "New Circuit.c basekv=0.4\n\
             New Line.a bus1=sourcebus bus2=b linecode=lc length=0.5 units=km\n\
             New Linecode.lc r1=0.2 x1=0.1 units=m\n",
        );
        let c = load_circuit(&master)?;
        assert!((c.lines[0].r - 100.0).abs() < 1e-9);
        assert!((c.lines[0].x - 50.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn errors_carry_file_and_line() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path(), "bad.txt", "\nNew Widget.w foo=1\n");
        let master = write(dir.path(), "master.dss", "New Circuit.c\nRedirect bad.txt\n");

        match load_circuit(&master) {
            Err(SolverError::Parse { path, line, msg }) => {
                assert!(path.ends_with("bad.txt"));
                assert_eq!(line, 2);
                assert!(msg.contains("widget"));
            }
            other => panic!("unexpected result: {:?}", other.map(|c| c.name)),
        }
        Ok(())
    }

    #[test]
    fn elements_need_a_circuit() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let master = write(dir.path(), "master.dss", "New Load.a bus1=x\n");
        assert!(matches!(load_circuit(&master), Err(SolverError::Parse { .. })));
        Ok(())
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load_circuit(Path::new("/nonexistent/master.dss")),
            Err(SolverError::Io { .. })
        ));
    }

    #[test]
    fn load_kvar_from_power_factor() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let master = write(
            dir.path(),
            "master.dss",
            "New Circuit.c\nNew Load.a bus1=x.2 phases=1 kw=4 pf=0.8 daily=Shape_A\n",
        );
        let c = load_circuit(&master)?;
        let load = &c.loads[0];
        assert_eq!(load.bus.phases, vec![1]);
        assert!((load.kvar - 3.0).abs() < 1e-12);
        assert_eq!(load.shape.as_deref(), Some("shape_a"));
        Ok(())
    }

    #[test]
    fn empty_load_shape_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let master = write(
            dir.path(),
            "master.dss",
            "New Circuit.c\n\
             New Loadshape.e npts=0 minterval=30 mult=[]\n\
             New Load.a bus1=x.1 phases=1 daily=e\n",
        );
        match load_circuit(&master) {
            Err(SolverError::Parse { line, msg, .. }) => {
                assert_eq!(line, 2);
                assert!(msg.contains("no multipliers"), "{}", msg);
            }
            other => panic!("unexpected result: {:?}", other.map(|c| c.name)),
        }
        Ok(())
    }
}
