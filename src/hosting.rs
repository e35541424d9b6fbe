use crate::driver::{DayState, ScenarioDriver};
use crate::error::{ConfigError, Result};
use crate::traits::CircuitSolver;
use serde::{Deserialize, Serialize};

/// Limits a penetration level must respect to count as hosted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostingLimits {
    /// Upper customer voltage (p.u.).
    pub voltage_pu: f64,
    /// Transformer rating (kVA). Thermal limits are ignored without it.
    pub transformer_kva: Option<f64>,
}

/// Result of simulating one penetration level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostingPoint {
    pub penetration: f64,
    pub pv_systems: usize,
    pub state: DayState,
    pub non_compliant: usize,
    pub max_voltage: Option<f64>,
    pub min_voltage: Option<f64>,
    pub max_utilisation: Option<f64>,
}

impl HostingPoint {
    /// Whether the level converged and respected both limits.
    pub fn hosted(&self) -> bool {
        self.state == DayState::Converged
            && self.non_compliant == 0
            && self.max_utilisation.map_or(true, |u| u <= 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostingReport {
    pub day: usize,
    pub limits: HostingLimits,
    pub points: Vec<HostingPoint>,
    /// Largest penetration reached before the first violation, if the
    /// lowest level was already hosted.
    pub capacity: Option<f64>,
}

/// Penetration levels `0, step, 2*step, ..` up to and including 100.
pub fn penetration_steps(step: f64) -> std::result::Result<Vec<f64>, ConfigError> {
    if !(step > 0.0 && step <= 100.0) {
        return Err(ConfigError::Scenario(format!(
            "penetration step must be within (0, 100], got {}",
            step
        )));
    }
    let n = (100.0 / step).floor() as usize;
    let mut levels: Vec<f64> = (0..=n).map(|i| i as f64 * step).collect();
    if levels.last().map_or(true, |&p| (100.0 - p).abs() > 1e-9) {
        levels.push(100.0);
    }
    Ok(levels)
}

/// Runs `day` once per penetration level in ascending order and finds the
/// hosting capacity.
///
/// The driver's penetration is left at the last level simulated.
pub fn hosting_capacity<S: CircuitSolver>(
    driver: &mut ScenarioDriver<S>,
    penetrations: &[f64],
    day: usize,
    limits: HostingLimits,
) -> Result<HostingReport> {
    let mut levels = penetrations.to_vec();
    if let Some(&p) = levels.iter().find(|p| !(0.0..=100.0).contains(*p)) {
        return Err(ConfigError::Penetration(p).into());
    }
    levels.sort_by(f64::total_cmp);
    levels.dedup();

    let mut points = Vec::with_capacity(levels.len());
    let mut capacity = None;
    let mut violated = false;

    for penetration in levels {
        driver.set_penetration(penetration)?;
        let outcome = driver.run_day(day)?;

        let point = HostingPoint {
            penetration,
            pv_systems: outcome.pv_assignments.len(),
            state: outcome.state,
            non_compliant: outcome.series.non_compliant_count(limits.voltage_pu),
            max_voltage: outcome.series.max_voltage(),
            min_voltage: outcome.series.min_voltage(),
            max_utilisation: match (&outcome.transformer, limits.transformer_kva) {
                (Some(flow), Some(kva)) => flow.max_utilisation(kva),
                _ => None,
            },
        };
        log::info!(
            "{:5.1}% PV ({} systems): {} non-compliant customers{}",
            penetration,
            point.pv_systems,
            point.non_compliant,
            if point.hosted() { "" } else { ", limit exceeded" }
        );

        if !violated {
            if point.hosted() {
                capacity = Some(penetration);
            } else {
                violated = true;
            }
        }
        points.push(point);
    }

    Ok(HostingReport {
        day,
        limits,
        points,
        capacity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_cover_both_ends() {
        assert_eq!(penetration_steps(25.0).unwrap(), vec![0.0, 25.0, 50.0, 75.0, 100.0]);
        assert_eq!(penetration_steps(40.0).unwrap(), vec![0.0, 40.0, 80.0, 100.0]);
        assert_eq!(penetration_steps(100.0).unwrap(), vec![0.0, 100.0]);
        assert!(penetration_steps(0.0).is_err());
    }

    #[test]
    fn hosted_requires_every_limit() {
        let mut point = HostingPoint {
            penetration: 20.0,
            pv_systems: 2,
            state: DayState::Converged,
            non_compliant: 0,
            max_voltage: Some(1.05),
            min_voltage: Some(0.98),
            max_utilisation: None,
        };
        assert!(point.hosted());

        point.max_utilisation = Some(1.2);
        assert!(!point.hosted());

        point.max_utilisation = Some(0.8);
        point.state = DayState::NotConverged;
        assert!(!point.hosted());
    }
}
