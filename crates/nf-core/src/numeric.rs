use crate::NfError;

/// Host-side float: time grids, closed forms, losses and meters.
pub type Real = f64;

/// Absolute/relative tolerance pair, used for float comparisons and for
/// adaptive step control (`abs + rel * |y|`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Tolerances {
    pub const fn new(abs: Real, rel: Real) -> Self {
        Self { abs, rel }
    }

    /// `abs + rel * scale`
    pub fn bound(&self, scale: Real) -> Real {
        self.abs + self.rel * scale.abs()
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self::new(1e-12, 1e-9)
    }
}

/// `|a - b|` within the absolute or the relative tolerance.
pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    diff <= tol.abs || diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, NfError> {
    if !v.is_finite() {
        return Err(NfError::NonFinite { what, value: v });
    }
    Ok(v)
}

/// `n` evenly spaced samples over `[start, end]`, both endpoints exact.
///
/// Interior points are computed as `start + i * step`; the last sample is
/// pinned to `end` so rounding never drops the endpoint.
pub fn linspace(start: Real, end: Real, n: usize) -> Vec<Real> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as Real;
            let mut out: Vec<Real> = (0..n).map(|i| start + i as Real * step).collect();
            out[n - 1] = end;
            out
        }
    }
}
