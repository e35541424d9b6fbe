use crate::error::ConfigError;
use crate::math::q_from_pf;
use rand::Rng;
use std::ops::Range;

/// Power factor used when no per-interval sequence has been drawn.
pub const DEFAULT_POWER_FACTOR: f64 = 0.95;

/// Range customer power factors are drawn from, per interval.
pub const POWER_FACTOR_RANGE: Range<f64> = 0.9..0.98;

/// Synthesizes reactive power `Q[i] = P[i] * tan(acos(pf[i]))`.
///
/// Without a power-factor sequence the profile is a placeholder: active
/// power is taken as zero at [`DEFAULT_POWER_FACTOR`], giving zero reactive
/// power of the same length.
pub fn reactive_power(p: &[f64], pf: Option<&[f64]>) -> Result<Vec<f64>, ConfigError> {
    let pf = match pf {
        Some(pf) => pf,
        None => return Ok(vec![q_from_pf(0.0, DEFAULT_POWER_FACTOR); p.len()]),
    };
    if pf.len() != p.len() {
        return Err(ConfigError::LengthMismatch {
            expected: p.len(),
            actual: pf.len(),
        });
    }
    if let Some(&bad) = pf.iter().find(|&&f| !(f > 0.0 && f <= 1.0)) {
        return Err(ConfigError::PowerFactor(bad));
    }
    Ok(p.iter().zip(pf).map(|(&p, &f)| q_from_pf(p, f)).collect())
}

/// Draws `n` power factors uniformly from [`POWER_FACTOR_RANGE`].
pub fn draw_power_factors<R: Rng>(rng: &mut R, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.gen_range(POWER_FACTOR_RANGE)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn reactive_is_non_negative_and_zero_without_load() {
        let mut rng = StdRng::seed_from_u64(7);
        let pf = draw_power_factors(&mut rng, 48);
        let p: Vec<f64> = (0..48).map(|i| if i % 5 == 0 { 0.0 } else { i as f64 * 0.1 }).collect();

        let q = reactive_power(&p, Some(&pf)).unwrap();
        assert_eq!(q.len(), 48);
        for (i, (&qi, &pi)) in q.iter().zip(&p).enumerate() {
            assert!(qi >= 0.0);
            if pi == 0.0 {
                assert_eq!(qi, 0.0, "interval {}", i);
            }
        }
    }

    #[test]
    fn matches_power_triangle() {
        let q = reactive_power(&[4.0, 2.0], Some(&[0.8, 1.0])).unwrap();
        assert_abs_diff_eq!(q[0], 3.0, epsilon = 1e-12);
        assert_eq!(q[1], 0.0);
    }

    #[test]
    fn placeholder_is_all_zero() {
        let q = reactive_power(&[5.0; 48], None).unwrap();
        assert_eq!(q, vec![0.0; 48]);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let err = reactive_power(&[1.0; 48], Some(&[0.95; 47])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::LengthMismatch {
                expected: 48,
                actual: 47
            }
        );
    }

    #[test]
    fn rejects_invalid_power_factor() {
        assert!(matches!(
            reactive_power(&[1.0], Some(&[0.0])),
            Err(ConfigError::PowerFactor(_))
        ));
        assert!(matches!(
            reactive_power(&[1.0], Some(&[1.2])),
            Err(ConfigError::PowerFactor(_))
        ));
    }

    #[test]
    fn drawn_factors_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(0);
        for f in draw_power_factors(&mut rng, 1000) {
            assert!(POWER_FACTOR_RANGE.contains(&f));
        }
    }
}
