
use crate::allocate::Seeds;
use crate::driver::DriverOptions;
use crate::profile::{PvSource, ProfileStore, INTERVALS_PER_DAY};
use crate::scenario::{PvDefaults, ReseedPolicy, Scenario};
use ndarray::Array3;
use std::env;
use std::path::{Path, PathBuf};

pub(crate) fn casedata_dir() -> PathBuf {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into());
    Path::new(&manifest_dir).join("casedata")
}

pub(crate) fn toy_options(transformer: bool) -> DriverOptions {
    DriverOptions {
        network: casedata_dir().join("toy").join("Master.dss"),
        voltage_bases: vec![11.0, 0.416],
        reseed: ReseedPolicy::PerDay,
        pv: PvDefaults::default(),
        transformer: transformer.then(|| "transformer.tr1".to_string()),
    }
}

pub(crate) fn scenario(days: usize, penetration: f64) -> Scenario {
    Scenario {
        start_day: 0,
        days,
        penetration,
        seeds: Seeds {
            profile: 2024,
            pv_shuffle: 7,
        },
    }
}

/// Five historical customers over `days` days sharing one daily shape.
pub(crate) fn uniform_store(days: usize, shape: impl Fn(usize) -> f64, pv: PvSource) -> ProfileStore {
    let load = Array3::from_shape_fn((5, days, INTERVALS_PER_DAY), |(_, _, t)| shape(t));
    ProfileStore::new(load, pv).unwrap()
}
