use serde::{Deserialize, Serialize};

/// How `solve_step` advances time.
#[derive(Debug, PartialEq, Copy, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SolveMode {
    /// Solves the nominal load, time does not advance.
    Snapshot,
    /// Solves `steps` intervals of `step_minutes` per call, sampling
    /// attached shapes at each.
    Daily { steps: usize, step_minutes: u32 },
}

impl Default for SolveMode {
    fn default() -> Self {
        SolveMode::Snapshot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOpt {
    // Termination tolerance on the per unit voltage update. Default value is 1e-6.
    pub tolerance: f64,

    // Maximum number of sweep iterations per solve. Default value is 100.
    pub max_it: usize,
}

impl Default for SolveOpt {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_it: 100,
        }
    }
}
