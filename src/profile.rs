use crate::error::ConfigError;
use ndarray::{Array2, Array3, ArrayView1};
use std::path::Path;

/// Half-hour intervals in a simulated day.
pub const INTERVALS_PER_DAY: usize = 48;

/// Length of one interval in minutes.
pub const INTERVAL_MINUTES: u32 = 30;

/// Normalized PV generation, either one profile per historical day or a
/// single profile applied to every day.
#[derive(Debug, Clone, PartialEq)]
pub enum PvSource {
    /// Shape `(day_count, 48)`.
    Daily(Array2<f64>),
    /// One chosen (typically worst-case) profile.
    Flat(Vec<f64>),
}

impl PvSource {
    pub fn new_daily(pv: Array2<f64>) -> Result<Self, ConfigError> {
        if pv.nrows() == 0 {
            return Err(ConfigError::EmptyDataset("PV dataset has no days".into()));
        }
        if pv.ncols() != INTERVALS_PER_DAY {
            return Err(ConfigError::LengthMismatch {
                expected: INTERVALS_PER_DAY,
                actual: pv.ncols(),
            });
        }
        for row in pv.rows() {
            check_pv_readings(row.iter())?;
        }
        Ok(PvSource::Daily(pv))
    }

    pub fn new_flat(pv: Vec<f64>) -> Result<Self, ConfigError> {
        if pv.len() != INTERVALS_PER_DAY {
            return Err(ConfigError::LengthMismatch {
                expected: INTERVALS_PER_DAY,
                actual: pv.len(),
            });
        }
        check_pv_readings(pv.iter())?;
        Ok(PvSource::Flat(pv))
    }

    /// Number of days covered, `None` for a flat profile.
    pub fn day_count(&self) -> Option<usize> {
        match self {
            PvSource::Daily(pv) => Some(pv.nrows()),
            PvSource::Flat(_) => None,
        }
    }

    /// PV profile for `day`. A flat source ignores the day.
    pub fn profile(&self, day: usize) -> Result<Vec<f64>, ConfigError> {
        match self {
            PvSource::Daily(pv) => {
                if day >= pv.nrows() {
                    return Err(ConfigError::DayOutOfRange {
                        day,
                        days: pv.nrows(),
                    });
                }
                Ok(pv.row(day).to_vec())
            }
            PvSource::Flat(pv) => Ok(pv.clone()),
        }
    }
}

fn check_pv_readings<'a>(values: impl Iterator<Item = &'a f64>) -> Result<(), ConfigError> {
    for (interval, &value) in values.enumerate() {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::PvReading { interval, value });
        }
    }
    Ok(())
}

/// Historical load and PV measurements. Read-only once built.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    /// Active power (kW), shape `(customer_count, day_count, 48)`.
    load: Array3<f64>,

    pv: PvSource,
}

impl ProfileStore {
    pub fn new(load: Array3<f64>, pv: PvSource) -> Result<Self, ConfigError> {
        let (customers, days, intervals) = load.dim();
        if customers == 0 || days == 0 {
            return Err(ConfigError::EmptyDataset(format!(
                "load dataset has shape ({}, {}, {})",
                customers, days, intervals
            )));
        }
        if intervals != INTERVALS_PER_DAY {
            return Err(ConfigError::LengthMismatch {
                expected: INTERVALS_PER_DAY,
                actual: intervals,
            });
        }
        if let Some(((customer, day, interval), &value)) = load
            .indexed_iter()
            .find(|&(_, &v)| !v.is_finite() || v < 0.0)
        {
            return Err(ConfigError::LoadReading {
                customer,
                day,
                interval,
                value,
            });
        }
        Ok(Self { load, pv })
    }

    pub fn customer_count(&self) -> usize {
        self.load.dim().0
    }

    pub fn day_count(&self) -> usize {
        self.load.dim().1
    }

    pub fn pv(&self) -> &PvSource {
        &self.pv
    }

    /// Checks that `day` can be simulated with both datasets.
    pub fn check_day(&self, day: usize) -> Result<(), ConfigError> {
        if day >= self.day_count() {
            return Err(ConfigError::DayOutOfRange {
                day,
                days: self.day_count(),
            });
        }
        if let Some(days) = self.pv.day_count() {
            if day >= days {
                return Err(ConfigError::DayOutOfRange { day, days });
            }
        }
        Ok(())
    }

    /// The 48 active-power readings of `customer` on `day`.
    pub fn load_profile(&self, customer: usize, day: usize) -> Result<ArrayView1<f64>, ConfigError> {
        if customer >= self.customer_count() {
            return Err(ConfigError::CustomerOutOfRange {
                customer,
                customers: self.customer_count(),
            });
        }
        if day >= self.day_count() {
            return Err(ConfigError::DayOutOfRange {
                day,
                days: self.day_count(),
            });
        }
        Ok(self.load.slice(ndarray::s![customer, day, ..]))
    }

    /// Reads the load and PV datasets from CSV.
    ///
    /// Load rows are `customer,day,v0..v47`. PV rows are `day,v0..v47`, or a
    /// single row of 48 readings for a flat profile.
    pub fn from_csv(load_path: &Path, pv_path: &Path) -> Result<Self, ConfigError> {
        let load = read_load_csv(load_path)?;
        let pv = read_pv_csv(pv_path)?;
        Self::new(load, pv)
    }
}

fn read_rows(path: &Path) -> Result<Vec<Vec<f64>>, ConfigError> {
    let dataset_err = |msg: String| ConfigError::Dataset {
        path: path.to_path_buf(),
        msg,
    };
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| dataset_err(e.to_string()))?;

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| dataset_err(e.to_string()))?;
        let row = record
            .iter()
            .map(|field| {
                field
                    .parse::<f64>()
                    .map_err(|_| dataset_err(format!("row {}: invalid number '{}'", i + 1, field)))
            })
            .collect::<Result<Vec<f64>, ConfigError>>()?;
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(dataset_err("no rows".into()));
    }
    Ok(rows)
}

/// Parses a key column as an index below `bound`. A complete dataset of `n`
/// rows never keys a customer or day at or past `n`.
fn as_index(value: f64, bound: usize, what: &str, path: &Path) -> Result<usize, ConfigError> {
    if value < 0.0 || value.fract() != 0.0 {
        return Err(ConfigError::Dataset {
            path: path.to_path_buf(),
            msg: format!("{} index {} is not a non-negative integer", what, value),
        });
    }
    if value >= bound as f64 {
        return Err(ConfigError::Dataset {
            path: path.to_path_buf(),
            msg: format!("{} {} leaves gaps in a dataset of {} rows", what, value, bound),
        });
    }
    Ok(value as usize)
}

fn read_load_csv(path: &Path) -> Result<Array3<f64>, ConfigError> {
    let rows = read_rows(path)?;
    let width = INTERVALS_PER_DAY + 2;

    let n = rows.len();
    let mut keyed = Vec::with_capacity(n);
    for row in rows {
        if row.len() != width {
            return Err(ConfigError::Dataset {
                path: path.to_path_buf(),
                msg: format!("expected {} columns, found {}", width, row.len()),
            });
        }
        let customer = as_index(row[0], n, "customer", path)?;
        let day = as_index(row[1], n, "day", path)?;
        keyed.push((customer, day, row));
    }
    let customers = keyed.iter().map(|(c, _, _)| c + 1).max().unwrap_or(0);
    let days = keyed.iter().map(|(_, d, _)| d + 1).max().unwrap_or(0);
    if customers.checked_mul(days).map_or(true, |cells| cells > n) {
        return Err(ConfigError::Dataset {
            path: path.to_path_buf(),
            msg: format!(
                "{} rows cannot cover {} customers over {} days",
                n, customers, days
            ),
        });
    }

    let mut load = Array3::<f64>::zeros((customers, days, INTERVALS_PER_DAY));
    let mut seen = Array2::<bool>::from_elem((customers, days), false);
    for (customer, day, row) in keyed {
        if seen[[customer, day]] {
            return Err(ConfigError::Dataset {
                path: path.to_path_buf(),
                msg: format!("duplicate row for customer {}, day {}", customer, day),
            });
        }
        seen[[customer, day]] = true;
        for (t, &v) in row[2..].iter().enumerate() {
            load[[customer, day, t]] = v;
        }
    }
    if let Some(((customer, day), _)) = seen.indexed_iter().find(|&(_, &s)| !s) {
        return Err(ConfigError::Dataset {
            path: path.to_path_buf(),
            msg: format!("missing row for customer {}, day {}", customer, day),
        });
    }
    Ok(load)
}

fn read_pv_csv(path: &Path) -> Result<PvSource, ConfigError> {
    let rows = read_rows(path)?;

    if rows.len() == 1 && rows[0].len() == INTERVALS_PER_DAY {
        return PvSource::new_flat(rows.into_iter().next().unwrap_or_default());
    }

    let width = INTERVALS_PER_DAY + 1;
    let mut days = vec![None; rows.len()];
    for row in rows {
        if row.len() != width {
            return Err(ConfigError::Dataset {
                path: path.to_path_buf(),
                msg: format!("expected {} columns, found {}", width, row.len()),
            });
        }
        let day = as_index(row[0], days.len(), "day", path)?;
        let slot = &mut days[day];
        if slot.is_some() {
            return Err(ConfigError::Dataset {
                path: path.to_path_buf(),
                msg: format!("duplicate row for day {}", day),
            });
        }
        *slot = Some(row[1..].to_vec());
    }

    let n = days.len();
    let mut pv = Array2::<f64>::zeros((n, INTERVALS_PER_DAY));
    for (d, row) in days.into_iter().enumerate() {
        // Every slot is filled: n rows, each mapped to a distinct day below n.
        if let Some(row) = row {
            for (t, v) in row.into_iter().enumerate() {
                pv[[d, t]] = v;
            }
        }
    }
    PvSource::new_daily(pv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ramp() -> Vec<f64> {
        (0..INTERVALS_PER_DAY).map(|t| t as f64 * 0.1).collect()
    }

    fn csv_row(prefix: &[usize], values: &[f64]) -> String {
        prefix
            .iter()
            .map(|v| v.to_string())
            .chain(values.iter().map(|v| v.to_string()))
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn rejects_negative_load() {
        let mut load = Array3::<f64>::zeros((2, 1, INTERVALS_PER_DAY));
        load[[1, 0, 5]] = -0.1;
        let pv = PvSource::new_flat(vec![0.0; INTERVALS_PER_DAY]).unwrap();
        assert!(matches!(
            ProfileStore::new(load, pv),
            Err(ConfigError::LoadReading {
                customer: 1,
                day: 0,
                interval: 5,
                ..
            })
        ));
    }

    #[test]
    fn rejects_wrong_interval_count() {
        let load = Array3::<f64>::zeros((1, 1, 24));
        let pv = PvSource::new_flat(vec![0.0; INTERVALS_PER_DAY]).unwrap();
        assert!(matches!(
            ProfileStore::new(load, pv),
            Err(ConfigError::LengthMismatch { expected: 48, actual: 24 })
        ));
    }

    #[test]
    fn pv_readings_must_be_normalized() {
        let mut pv = vec![0.5; INTERVALS_PER_DAY];
        pv[10] = 1.5;
        assert!(matches!(
            PvSource::new_flat(pv),
            Err(ConfigError::PvReading { interval: 10, .. })
        ));
    }

    #[test]
    fn day_bounds_cover_both_datasets() {
        let load = Array3::<f64>::zeros((1, 3, INTERVALS_PER_DAY));
        let pv = PvSource::new_daily(Array2::zeros((2, INTERVALS_PER_DAY))).unwrap();
        let store = ProfileStore::new(load, pv).unwrap();
        assert!(store.check_day(1).is_ok());
        assert_eq!(
            store.check_day(2),
            Err(ConfigError::DayOutOfRange { day: 2, days: 2 })
        );
        assert_eq!(
            store.check_day(3),
            Err(ConfigError::DayOutOfRange { day: 3, days: 3 })
        );
    }

    #[test]
    fn reads_csv_datasets() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let load_path = dir.path().join("load.csv");
        let pv_path = dir.path().join("pv.csv");

        let mut f = std::fs::File::create(&load_path)?;
        writeln!(f, "# customer,day,readings")?;
        for c in 0..2 {
            for d in 0..2 {
                let values: Vec<f64> = ramp().iter().map(|v| v * (c + d + 1) as f64).collect();
                writeln!(f, "{}", csv_row(&[c, d], &values))?;
            }
        }
        let mut f = std::fs::File::create(&pv_path)?;
        writeln!(f, "{}", csv_row(&[1], &[0.25; INTERVALS_PER_DAY]))?;
        writeln!(f, "{}", csv_row(&[0], &[0.5; INTERVALS_PER_DAY]))?;

        let store = ProfileStore::from_csv(&load_path, &pv_path)?;
        assert_eq!(store.customer_count(), 2);
        assert_eq!(store.day_count(), 2);
        assert_eq!(store.load_profile(1, 1)?[10], 3.0);
        assert_eq!(store.pv().profile(0)?[0], 0.5);
        assert_eq!(store.pv().profile(1)?[47], 0.25);
        Ok(())
    }

    #[test]
    fn single_row_pv_is_flat() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let pv_path = dir.path().join("pv.csv");
        std::fs::write(&pv_path, csv_row(&[], &[0.75; INTERVALS_PER_DAY]))?;

        let pv = read_pv_csv(&pv_path)?;
        assert_eq!(pv.day_count(), None);
        assert_eq!(pv.profile(123)?, vec![0.75; INTERVALS_PER_DAY]);
        Ok(())
    }

    #[test]
    fn missing_load_rows_are_reported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let load_path = dir.path().join("load.csv");
        std::fs::write(&load_path, csv_row(&[1, 0], &ramp()))?;

        assert!(matches!(
            read_load_csv(&load_path),
            Err(ConfigError::Dataset { .. })
        ));
        Ok(())
    }

    #[test]
    fn out_of_range_keys_are_reported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let values = ramp().iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",");
        for key in ["1e300,0", "0,1e300", "5e9,0"] {
            let load_path = dir.path().join("load.csv");
            std::fs::write(&load_path, format!("0,0,{}\n{},{}\n", values, key, values))?;
            match read_load_csv(&load_path) {
                Err(ConfigError::Dataset { msg, .. }) => assert!(msg.contains("gaps"), "{}", msg),
                other => panic!("{}: unexpected {:?}", key, other.map(|a| a.dim())),
            }
        }

        let pv_path = dir.path().join("pv.csv");
        std::fs::write(&pv_path, format!("1e300,{}\n", values))?;
        assert!(matches!(
            read_pv_csv(&pv_path),
            Err(ConfigError::Dataset { .. })
        ));
        Ok(())
    }

    #[test]
    fn sparse_keys_are_reported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let load_path = dir.path().join("load.csv");
        std::fs::write(
            &load_path,
            format!("{}\n{}\n", csv_row(&[0, 0], &ramp()), csv_row(&[1, 1], &ramp())),
        )?;
        match read_load_csv(&load_path) {
            Err(ConfigError::Dataset { msg, .. }) => assert!(msg.contains("cannot cover"), "{}", msg),
            other => panic!("unexpected {:?}", other.map(|a| a.dim())),
        }
        Ok(())
    }
}
