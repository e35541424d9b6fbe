use crate::allocate::Seeds;
use crate::error::ConfigError;
use crate::opt::SolveOpt;
use crate::profile::ProfileStore;

use anyhow::{Context, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Simulated horizon, PV penetration and seed pair of a study.
///
/// Together with fixed profile data a scenario fully determines which
/// profile each customer receives and which customers host PV.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(default, build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct Scenario {
    /// First dataset day to simulate.
    pub start_day: usize,

    /// Number of consecutive days.
    pub days: usize,

    /// Share of customers with PV (percent).
    pub penetration: f64,

    pub seeds: Seeds,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            start_day: 0,
            days: 1,
            penetration: 0.0,
            seeds: Seeds::default(),
        }
    }
}

impl ScenarioBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(p) = self.penetration {
            if !(0.0..=100.0).contains(&p) {
                return Err(ConfigError::Penetration(p).to_string());
            }
        }
        if self.days == Some(0) {
            return Err("a scenario must simulate at least one day".to_string());
        }
        Ok(())
    }
}

impl Scenario {
    /// Dataset days simulated, in order.
    pub fn day_range(&self) -> std::ops::Range<usize> {
        self.start_day..self.start_day.saturating_add(self.days)
    }

    /// Checks the scenario against the profile data before any solver
    /// work is done.
    pub fn validate(&self, store: &ProfileStore) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.penetration) {
            return Err(ConfigError::Penetration(self.penetration));
        }
        if self.days == 0 {
            return Err(ConfigError::Scenario(
                "a scenario must simulate at least one day".to_string(),
            ));
        }
        let end = self.start_day.checked_add(self.days).ok_or_else(|| {
            ConfigError::Scenario(format!(
                "{} days from day {} overflow the day index",
                self.days, self.start_day
            ))
        })?;
        // days are contiguous, so both ends in range covers the rest
        store.check_day(self.start_day)?;
        store.check_day(end - 1)?;
        Ok(())
    }
}

/// When the PV-shuffle stream is reseeded from its seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReseedPolicy {
    /// Once at the start of each day, together with the profile stream.
    #[default]
    PerDay,
    /// Additionally before every customer's load allocation.
    PerCustomer,
}

/// Parameters of each PV system installed by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvDefaults {
    /// Inverter rating (kVA).
    pub kva: f64,
    /// Array rating (kWp).
    pub kwp: f64,
    /// Inverter cut-in, as a fraction of `kva`.
    pub cut_in: f64,
    /// Inverter cut-out, as a fraction of `kva`.
    pub cut_out: f64,
    pub v_min_pu: f64,
    pub v_max_pu: f64,
}

impl Default for PvDefaults {
    fn default() -> Self {
        Self {
            kva: 5.0,
            kwp: 5.0,
            cut_in: 0.1,
            cut_out: 0.1,
            v_min_pu: 0.9,
            v_max_pu: 1.1,
        }
    }
}

impl PvDefaults {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.kva > 0.0) || !(self.kwp >= 0.0) {
            return Err(ConfigError::Scenario(
                "PV ratings must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.cut_in) || !(0.0..=1.0).contains(&self.cut_out) {
            return Err(ConfigError::Scenario(
                "PV cut-in and cut-out must be fractions of the rating".to_string(),
            ));
        }
        if !(self.v_min_pu < self.v_max_pu) {
            return Err(ConfigError::Scenario(
                "PV voltage limits must satisfy v_min_pu < v_max_pu".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_voltage_bases() -> Vec<f64> {
    vec![11.0, 0.416]
}

fn default_voltage_limit() -> f64 {
    1.10
}

fn default_lower_voltage_limit() -> f64 {
    0.94
}

/// Everything needed to run a study, read from YAML or JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Master file of the network description.
    pub network: PathBuf,

    /// Candidate line-to-line base voltages (kV).
    #[serde(default = "default_voltage_bases")]
    pub voltage_bases: Vec<f64>,

    /// Load CSV, one row per `customer,day` with 48 kW readings.
    pub load_profiles: PathBuf,

    /// PV CSV, one row per day or a single flat row.
    pub pv_profiles: PathBuf,

    #[serde(default)]
    pub scenario: Scenario,

    #[serde(default)]
    pub reseed: ReseedPolicy,

    #[serde(default)]
    pub pv: PvDefaults,

    /// Element whose flow is recorded, e.g. `transformer.tr1`.
    #[serde(default)]
    pub transformer: Option<String>,

    /// Rating (kVA) of `transformer` for utilisation checks.
    #[serde(default)]
    pub transformer_kva: Option<f64>,

    /// Customers above this voltage (p.u.) are non-compliant.
    #[serde(default = "default_voltage_limit")]
    pub voltage_limit_pu: f64,

    #[serde(default = "default_lower_voltage_limit")]
    pub lower_voltage_limit_pu: f64,

    #[serde(default)]
    pub solve: SolveOpt,
}

impl StudyConfig {
    /// Reads a config file. Relative paths inside it are taken relative to
    /// the file's directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading study config '{}'", path.display()))?;
        let mut config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                serde_yaml::from_str(&data).context("parsing study config yaml")?
            }
            Some(ext) if ext.eq_ignore_ascii_case("json") => {
                serde_json::from_str(&data).context("parsing study config json")?
            }
            _ => serde_yaml::from_str(&data)
                .or_else(|_| serde_json::from_str(&data))
                .context("parsing study config")?,
        };

        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        for p in [
            &mut config.network,
            &mut config.load_profiles,
            &mut config.pv_profiles,
        ] {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        }
        Ok(config)
    }

    /// Checks every setting that does not need the profile data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.scenario.penetration) {
            return Err(ConfigError::Penetration(self.scenario.penetration));
        }
        if self.voltage_bases.iter().any(|&kv| !(kv > 0.0)) {
            return Err(ConfigError::Scenario(format!(
                "voltage bases must be positive: {:?}",
                self.voltage_bases
            )));
        }
        if !(self.lower_voltage_limit_pu < self.voltage_limit_pu) {
            return Err(ConfigError::Scenario(
                "lower voltage limit must be below the upper limit".to_string(),
            ));
        }
        if self.transformer_kva.map_or(false, |kva| !(kva > 0.0)) {
            return Err(ConfigError::Scenario(
                "transformer rating must be positive".to_string(),
            ));
        }
        self.pv.validate()
    }

    pub fn load_profile_store(&self) -> Result<ProfileStore, ConfigError> {
        ProfileStore::from_csv(&self.load_profiles, &self.pv_profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{PvSource, INTERVALS_PER_DAY};
    use ndarray::{Array2, Array3};

    #[test]
    fn builder_fills_defaults() {
        let s = ScenarioBuilder::default()
            .penetration(40.0)
            .start_day(3)
            .build()
            .unwrap();
        assert_eq!(s.days, 1);
        assert_eq!(s.seeds, Seeds::default());
        assert_eq!(s.day_range(), 3..4);
    }

    #[test]
    fn builder_rejects_bad_penetration() {
        assert!(ScenarioBuilder::default().penetration(120.0).build().is_err());
        assert!(ScenarioBuilder::default().days(0).build().is_err());
    }

    #[test]
    fn scenario_days_must_exist() {
        let load = Array3::zeros((2, 3, INTERVALS_PER_DAY));
        let pv = PvSource::new_daily(Array2::zeros((3, INTERVALS_PER_DAY))).unwrap();
        let store = ProfileStore::new(load, pv).unwrap();

        let mut s = Scenario {
            start_day: 1,
            days: 2,
            ..Default::default()
        };
        assert!(s.validate(&store).is_ok());

        s.days = 3;
        assert_eq!(
            s.validate(&store),
            Err(ConfigError::DayOutOfRange { day: 3, days: 3 })
        );
    }

    #[test]
    fn day_span_overflow_is_a_config_error() {
        let load = Array3::zeros((2, 3, INTERVALS_PER_DAY));
        let pv = PvSource::new_daily(Array2::zeros((3, INTERVALS_PER_DAY))).unwrap();
        let store = ProfileStore::new(load, pv).unwrap();

        let s = Scenario {
            start_day: usize::MAX - 1,
            days: 5,
            ..Default::default()
        };
        assert!(matches!(s.validate(&store), Err(ConfigError::Scenario(_))));
        assert_eq!(s.day_range().end, usize::MAX);

        let s = Scenario {
            start_day: 2,
            days: usize::MAX,
            ..Default::default()
        };
        assert!(matches!(s.validate(&store), Err(ConfigError::Scenario(_))));
    }

    #[test]
    fn reads_yaml_and_resolves_paths() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("study.yaml");
        fs::write(
            &path,
            "network: net/Master.dss\n\
             load_profiles: load.csv\n\
             pv_profiles: /data/pv.csv\n\
             scenario:\n  penetration: 30\n  seeds: {profile: 7, pv_shuffle: 8}\n\
             reseed: per_customer\n\
             pv: {kva: 4.0}\n",
        )?;
        let config = StudyConfig::from_path(&path)?;

        assert_eq!(config.network, dir.path().join("net/Master.dss"));
        assert_eq!(config.pv_profiles, PathBuf::from("/data/pv.csv"));
        assert_eq!(config.scenario.penetration, 30.0);
        assert_eq!(config.scenario.days, 1);
        assert_eq!(config.scenario.seeds.pv_shuffle, 8);
        assert_eq!(config.reseed, ReseedPolicy::PerCustomer);
        assert_eq!(config.pv.kva, 4.0);
        assert_eq!(config.pv.kwp, PvDefaults::default().kwp);
        assert_eq!(config.voltage_bases, vec![11.0, 0.416]);
        assert_eq!(config.voltage_limit_pu, 1.10);
        assert!(config.validate().is_ok());
        Ok(())
    }

    #[test]
    fn reads_json() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("study.json");
        fs::write(
            &path,
            r#"{"network": "m.dss", "load_profiles": "l.csv", "pv_profiles": "p.csv",
                "transformer": "transformer.tr1", "transformer_kva": 100,
                "solve": {"max_it": 20}}"#,
        )?;
        let config = StudyConfig::from_path(&path)?;
        assert_eq!(config.transformer.as_deref(), Some("transformer.tr1"));
        assert_eq!(config.solve.max_it, 20);
        assert_eq!(config.solve.tolerance, 1e-6);
        Ok(())
    }

    #[test]
    fn validation_catches_inconsistent_settings() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("study.yml");
        fs::write(
            &path,
            "network: m.dss\nload_profiles: l.csv\npv_profiles: p.csv\n",
        )?;
        let mut config = StudyConfig::from_path(&path)?;
        assert!(config.validate().is_ok());

        config.scenario.penetration = 101.0;
        assert_eq!(config.validate(), Err(ConfigError::Penetration(101.0)));

        config.scenario.penetration = 50.0;
        config.lower_voltage_limit_pu = 1.2;
        assert!(config.validate().is_err());
        Ok(())
    }
}
