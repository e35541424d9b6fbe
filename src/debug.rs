use num_complex::Complex64;
use pretty_dtoa::{dtoa, FmtFloatConfig};

const FLOAT_CONFIG: FmtFloatConfig = FmtFloatConfig::default()
    .add_point_zero(false)
    .max_significant_digits(6);

pub fn format_f64_vec(v: &[f64]) -> String {
    let a: Vec<String> = v.iter().map(|f| dtoa(*f, FLOAT_CONFIG)).collect();
    format!("[{}]", a.join(", "))
}

fn format_polar(z: &Complex64) -> String {
    format!(
        "{}\u{2220}{}\u{00B0}",
        dtoa(z.norm(), FLOAT_CONFIG),
        dtoa(z.arg().to_degrees(), FLOAT_CONFIG)
    )
}

pub fn format_polar_vec(v: &[Complex64]) -> String {
    let a: Vec<String> = v.iter().map(format_polar).collect();
    format!("[{}]", a.join(", "))
}

/// Formats kW + j kvar pairs as `P+jQ`.
pub fn format_power_vec(v: &[Complex64]) -> String {
    let a: Vec<String> = v
        .iter()
        .map(|s| {
            format!(
                "{}{}j{}",
                dtoa(s.re, FLOAT_CONFIG),
                if s.im.is_sign_negative() { "-" } else { "+" },
                dtoa(s.im.abs(), FLOAT_CONFIG)
            )
        })
        .collect();
    format!("[{}]", a.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmplx;

    #[test]
    fn formats_compactly() {
        assert_eq!(format_f64_vec(&[1.0, 0.5]), "[1, 0.5]");
        assert_eq!(format_power_vec(&[cmplx!(2.0, -1.5)]), "[2-j1.5]");
    }
}
