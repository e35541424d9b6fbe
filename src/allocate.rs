use crate::error::ConfigError;
use crate::profile::{PvSource, ProfileStore};
use crate::reactive::{draw_power_factors, reactive_power};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Seed pair of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Seeds {
    /// Governs which historical profile each customer receives.
    pub profile: u64,
    /// Governs which customers receive PV.
    pub pv_shuffle: u64,
}

/// The two independent pseudo-random streams of a scenario.
///
/// Each stream is only ever reseeded from its own seed, so draws on one
/// never disturb the other.
#[derive(Debug, Clone)]
pub struct RandomStreams {
    seeds: Seeds,
    pub profile: StdRng,
    pub pv_shuffle: StdRng,
}

impl RandomStreams {
    pub fn new(seeds: Seeds) -> Self {
        Self {
            seeds,
            profile: StdRng::seed_from_u64(seeds.profile),
            pv_shuffle: StdRng::seed_from_u64(seeds.pv_shuffle),
        }
    }

    pub fn seeds(&self) -> Seeds {
        self.seeds
    }

    pub fn reseed_profile(&mut self) {
        self.profile = StdRng::seed_from_u64(self.seeds.profile);
    }

    pub fn reseed_pv_shuffle(&mut self) {
        self.pv_shuffle = StdRng::seed_from_u64(self.seeds.pv_shuffle);
    }

    pub fn reseed(&mut self) {
        self.reseed_profile();
        self.reseed_pv_shuffle();
    }
}

/// Load profile drawn for one customer on one simulated day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadAllocation {
    /// Index of the historical customer the profile was taken from.
    pub profile_index: usize,
    /// Active power (kW) per interval.
    pub active: Vec<f64>,
    /// Reactive power (kvar) per interval.
    pub reactive: Vec<f64>,
    /// Drawn power factor per interval.
    pub power_factors: Vec<f64>,
}

/// Draws a historical load profile for one customer on `day`.
///
/// Consumes one index draw followed by one power-factor draw per interval
/// from `rng`.
pub fn allocate_load<R: Rng>(
    store: &ProfileStore,
    day: usize,
    rng: &mut R,
) -> Result<LoadAllocation, ConfigError> {
    if day >= store.day_count() {
        return Err(ConfigError::DayOutOfRange {
            day,
            days: store.day_count(),
        });
    }
    let profile_index = rng.gen_range(0..store.customer_count());
    let active = store.load_profile(profile_index, day)?.to_vec();
    let power_factors = draw_power_factors(rng, active.len());
    let reactive = reactive_power(&active, Some(&power_factors))?;

    Ok(LoadAllocation {
        profile_index,
        active,
        reactive,
        power_factors,
    })
}

/// Number of PV systems for `customers` at `penetration` percent.
pub fn pv_target_count(customers: usize, penetration: f64) -> Result<usize, ConfigError> {
    if !(0.0..=100.0).contains(&penetration) {
        return Err(ConfigError::Penetration(penetration));
    }
    let target = (customers as f64 * penetration / 100.0).round() as usize;
    if target > customers {
        return Err(ConfigError::PvTarget {
            target,
            available: customers,
        });
    }
    Ok(target)
}

/// A customer selected to host a PV system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvAssignment<T> {
    pub customer: T,
    /// Normalized generation per interval.
    pub profile: Vec<f64>,
}

/// Selects `round(len(customers) * penetration / 100)` distinct customers
/// to host PV on `day`.
///
/// A copy of `customers` is shuffled, then customers are drawn one at a
/// time from the remaining pool, each removed as soon as it is picked.
/// Every selected customer shares the day's PV profile.
pub fn allocate_pv<T: Clone, R: Rng>(
    penetration: f64,
    customers: &[T],
    day: usize,
    pv: &PvSource,
    rng: &mut R,
) -> Result<Vec<PvAssignment<T>>, ConfigError> {
    let target = pv_target_count(customers.len(), penetration)?;
    let profile = pv.profile(day)?;

    let mut pool = customers.to_vec();
    pool.shuffle(rng);

    let mut assigned = Vec::with_capacity(target);
    for _ in 0..target {
        let pick = rng.gen_range(0..pool.len());
        assigned.push(PvAssignment {
            customer: pool.remove(pick),
            profile: profile.clone(),
        });
    }
    Ok(assigned)
}
