// ── Normal Survival Function (A&S 26.2.17 with Horner's method) ─────

/// Computes P(Z > z) for the standard normal distribution.
///
/// Uses the Abramowitz & Stegun 26.2.17 rational approximation (absolute
/// error below 7.5e-8) on the upper half-line and reflects negative inputs
/// through `sf(z) = 1 - sf(-z)`. Infinite inputs saturate to 0 or 1; NaN
/// propagates.
pub fn normal_sf(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    if z < 0.0 {
        return 1.0 - upper_tail(-z);
    }
    upper_tail(z)
}

fn upper_tail(z: f64) -> f64 {
    debug_assert!(z >= 0.0, "upper_tail requires z >= 0, got {}", z);

    if z.is_infinite() {
        return 0.0;
    }

    let t = 1.0 / (1.0 + 0.2316419 * z);
    let d = 0.3989422804014327; // 1/sqrt(2*pi)
    let p = d * (-z * z / 2.0).exp();

    // Horner's method for the polynomial
    let poly = t
        * (0.319381530
            + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));

    p * poly
}
