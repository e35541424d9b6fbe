use num_complex::Complex64;
use std::f64::consts::PI;

/// Number of phases carried by every bus of the model.
pub const NPHASE: usize = 3;

pub const SQRT3: f64 = 1.732_050_807_568_877_2;

#[macro_export]
macro_rules! cmplx {
    () => {
        num_complex::Complex64::new(0.0, 0.0)
    };
    ($arg1:expr) => {
        num_complex::Complex64::new($arg1, 0.0)
    };
    ($arg1:expr, $arg2:expr) => {
        num_complex::Complex64::new($arg1, $arg2)
    };
}

/// Per-phase complex quantities of a three-phase bus or branch.
pub type Phasors = [Complex64; NPHASE];

pub const ZERO_PHASORS: Phasors = [Complex64 { re: 0.0, im: 0.0 }; NPHASE];

/// Balanced positive-sequence set of magnitude `mag` with phase A at
/// `angle_deg`.
pub fn balanced(mag: f64, angle_deg: f64) -> Phasors {
    let mut v = ZERO_PHASORS;
    for (p, vp) in v.iter_mut().enumerate() {
        let ang = (angle_deg - 120.0 * p as f64) * PI / 180.0;
        *vp = Complex64::from_polar(mag, ang);
    }
    v
}

/// Reactive power implied by active power `p` at power factor `pf`.
pub fn q_from_pf(p: f64, pf: f64) -> f64 {
    p * pf.acos().tan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn balanced_set_sums_to_zero() {
        let v = balanced(240.0, 0.0);
        let sum: Complex64 = v.iter().sum();
        assert_abs_diff_eq!(sum.norm(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v[1].arg().to_degrees(), -120.0, epsilon = 1e-9);
    }

    #[test]
    fn unity_pf_has_no_reactive() {
        assert_eq!(q_from_pf(3.0, 1.0), 0.0);
        assert_abs_diff_eq!(q_from_pf(1.0, 0.8), 0.75, epsilon = 1e-12);
    }
}
