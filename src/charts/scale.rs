//! Axis Scale Module
//! Rounds axis limits to "nice" values: 1, 1.25, 1.5, 1.75 or 2 times a
//! leading multiple of the value's power of ten.

const UPPER_STEPS: [f64; 4] = [1.25, 1.5, 1.75, 2.0];
const LOWER_STEPS: [f64; 4] = [1.75, 1.5, 1.25, 1.0];

/// Leading multiple of the power of ten of `x >= 1` (1234 -> 1000), and
/// that power.
fn leading(x: f64) -> (f64, f64) {
    let scale = 10f64.powi(x.log10().floor() as i32);
    ((x / scale).floor() * scale, scale)
}

/// Smallest nice value strictly above `|x|`, carrying the sign of `x`.
pub fn scale_upper_limit(x: f64) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return 0.0;
    }
    let sign = x.signum();
    let abs = x.abs();

    if abs < 1.0 {
        let mut factor = 1.0;
        let mut shifted = abs;
        while shifted < 1.0 {
            factor *= 10.0;
            shifted *= 10.0;
        }
        return scale_upper_limit(shifted * sign) / factor;
    }

    let (lower, scale) = leading(abs);
    UPPER_STEPS
        .iter()
        .map(|step| lower * step)
        .find(|limit| abs < *limit)
        .unwrap_or(lower + scale)
        * sign
}

/// Largest nice value at or below `|x|`, carrying the sign of `x`.
pub fn scale_lower_limit(x: f64) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return 0.0;
    }
    let sign = x.signum();
    let abs = x.abs();

    if abs < 1.0 {
        let mut factor = 1.0;
        let mut shifted = abs;
        while shifted < 1.0 {
            factor *= 10.0;
            shifted *= 10.0;
        }
        return scale_lower_limit(shifted * sign) / factor;
    }

    let (lower, _) = leading(abs);
    LOWER_STEPS
        .iter()
        .map(|step| lower * step)
        .find(|limit| abs >= *limit)
        .unwrap_or(lower)
        * sign
}

/// Nice `(min, max)` range covering `values`. All-negative ranges round both
/// ends away from zero.
pub fn generate_scale(values: &[f64]) -> Option<(f64, f64)> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold(None, |acc: Option<(f64, f64)>, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })?;

    if values.iter().filter(|v| v.is_finite()).all(|v| *v < 0.0) {
        Some((scale_upper_limit(min), scale_lower_limit(max)))
    } else {
        Some((scale_lower_limit(min), scale_upper_limit(max)))
    }
}
