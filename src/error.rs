//! Error types.
//!
//! Configuration problems are detected before the solver is touched and are
//! never retried. Solver errors (missing files, malformed network text,
//! unknown elements) abort the run. Non-convergence is not an error at all:
//! it is reported through [`crate::DayState::NotConverged`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("solver error: {0}")]
    Solver(#[from] SolverError),
}

/// Invalid scenario inputs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("PV penetration must be within [0, 100] percent, got {0}")]
    Penetration(f64),

    #[error("PV target of {target} customers exceeds the {available} available")]
    PvTarget { target: usize, available: usize },

    #[error("day {day} is outside the dataset ({days} days)")]
    DayOutOfRange { day: usize, days: usize },

    #[error("customer {customer} is outside the dataset ({customers} customers)")]
    CustomerOutOfRange { customer: usize, customers: usize },

    #[error("profile length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("power factor {0} is outside (0, 1]")]
    PowerFactor(f64),

    #[error("load reading {value} kW at customer {customer}, day {day}, interval {interval} is negative or not finite")]
    LoadReading {
        customer: usize,
        day: usize,
        interval: usize,
        value: f64,
    },

    #[error("PV reading {value} at interval {interval} is outside [0, 1]")]
    PvReading { interval: usize, value: f64 },

    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    #[error("{path}: {msg}")]
    Dataset { path: PathBuf, msg: String },

    #[error("invalid scenario: {0}")]
    Scenario(String),
}

/// Failures reported by a circuit solver.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {msg}")]
    Parse {
        path: PathBuf,
        line: usize,
        msg: String,
    },

    #[error("no circuit has been compiled")]
    NotCompiled,

    #[error("unknown element '{0}'")]
    UnknownElement(String),

    #[error("unknown bus '{0}'")]
    UnknownBus(String),

    #[error("unknown load shape '{0}'")]
    UnknownShape(String),

    #[error("invalid network: {0}")]
    Network(String),

    #[error("invalid load shape '{name}': {msg}")]
    Shape { name: String, msg: String },
}
