//! Two-proportion significance test for a Control/Treatment conversion experiment.
//!
//! Rates are expressed as percentages. Standard errors use the normal
//! approximation to the binomial on the proportion scale, and the z-score
//! divides the percentage-scale difference by the proportion-scale standard
//! error and then by 100. The p-value branches on [`HypothesisMode`]:
//!
//! | mode      | z      | p             |
//! |-----------|--------|---------------|
//! | two-sided | any    | `sf(z)`       |
//! | one-sided | z < 0  | `1 - sf(z)`   |
//! | one-sided | z >= 0 | `sf(z) / 2`   |
//!
//! These branches are part of the public contract and are pinned by tests.
//!
//! Zero control rate (lift) and zero combined variance (z-score) are data
//! conditions, not errors: the affected fields are reported as `None`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::config::{AnalysisParams, HypothesisMode};
use super::stats;

// ── Inputs ──────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Control,
    Treatment,
}

impl Group {
    pub fn label(&self) -> &'static str {
        match self {
            Group::Control => "Control",
            Group::Treatment => "Treatment",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Conversion and visitor counts observed for one arm.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VariantObservation {
    pub conversions: u64,
    pub visitors: u64,
}

impl VariantObservation {
    pub fn new(conversions: u64, visitors: u64) -> Self {
        Self {
            conversions,
            visitors,
        }
    }

    pub fn validate(&self, group: Group) -> Result<(), InvalidInputError> {
        if self.visitors == 0 {
            return Err(InvalidInputError::ZeroVisitors { group });
        }
        if self.conversions > self.visitors {
            return Err(InvalidInputError::ConversionsExceedVisitors {
                group,
                conversions: self.conversions,
                visitors: self.visitors,
            });
        }
        Ok(())
    }

    /// Percentage of visitors that converted. Caller must have validated `visitors > 0`.
    pub fn conversion_rate(&self) -> f64 {
        conversion_rate(self.conversions, self.visitors)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidInputError {
    #[error("{group} group must have at least one visitor")]
    ZeroVisitors { group: Group },
    #[error("{group} group has {conversions} conversions but only {visitors} visitors")]
    ConversionsExceedVisitors {
        group: Group,
        conversions: u64,
        visitors: u64,
    },
    #[error("alpha must be strictly between 0 and 1, got {alpha}")]
    AlphaOutOfRange { alpha: f64 },
}

// ── Result ──────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Significant,
    NotSignificant,
    Undetermined,
}

/// Outcome of one significance computation.
///
/// `lift` is `None` when the control rate is zero. `z_score`, `p_value` and
/// `is_significant` are `None` together when the combined standard error is zero.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignificanceResult {
    pub hypothesis: HypothesisMode,
    pub alpha: f64,
    pub conversion_rate_control: f64,
    pub conversion_rate_treatment: f64,
    pub lift: Option<f64>,
    pub standard_error_control: f64,
    pub standard_error_treatment: f64,
    pub standard_error_diff: f64,
    pub z_score: Option<f64>,
    pub p_value: Option<f64>,
    pub is_significant: Option<bool>,
}

impl SignificanceResult {
    pub fn verdict(&self) -> Verdict {
        match self.is_significant {
            Some(true) => Verdict::Significant,
            Some(false) => Verdict::NotSignificant,
            None => Verdict::Undetermined,
        }
    }

    /// Absolute difference of the two rates, in percentage points.
    pub fn delta(&self) -> f64 {
        self.conversion_rate_treatment - self.conversion_rate_control
    }
}

// ── Engine ──────────────────────────────────────────────────────────

/// Runs the significance test for one Control/Treatment pair.
///
/// All inputs are validated before any arithmetic; the first violation is
/// returned. The function has no state and always yields the same output for
/// the same input.
pub fn compute(
    control: VariantObservation,
    treatment: VariantObservation,
    mode: HypothesisMode,
    alpha: f64,
) -> Result<SignificanceResult, InvalidInputError> {
    control.validate(Group::Control)?;
    treatment.validate(Group::Treatment)?;
    AnalysisParams::new(mode, alpha).validate()?;

    let rate_control = control.conversion_rate();
    let rate_treatment = treatment.conversion_rate();
    let lift = relative_lift(rate_control, rate_treatment);

    let se_control = standard_error(rate_control, control.visitors);
    let se_treatment = standard_error(rate_treatment, treatment.visitors);
    let se_diff = standard_error_diff(se_control, se_treatment);

    let z = z_score(rate_control, rate_treatment, se_diff);
    let p = z.map(|z| p_value(z, mode));
    let is_significant = p.map(|p| p < alpha);

    if lift.is_none() {
        tracing::warn!(
            control_conversions = control.conversions,
            control_visitors = control.visitors,
            "control conversion rate is zero; lift is undetermined"
        );
    }
    if z.is_none() {
        tracing::warn!(
            rate_control,
            rate_treatment,
            "combined standard error is zero; z-score and p-value are undetermined"
        );
    }
    tracing::debug!(
        hypothesis = %mode,
        alpha,
        rate_control,
        rate_treatment,
        z_score = ?z,
        p_value = ?p,
        significant = ?is_significant,
        "significance computed"
    );

    Ok(SignificanceResult {
        hypothesis: mode,
        alpha,
        conversion_rate_control: rate_control,
        conversion_rate_treatment: rate_treatment,
        lift,
        standard_error_control: se_control,
        standard_error_treatment: se_treatment,
        standard_error_diff: se_diff,
        z_score: z,
        p_value: p,
        is_significant,
    })
}

/// [`compute`] with the hypothesis and alpha taken from `params`.
pub fn compute_with(
    control: VariantObservation,
    treatment: VariantObservation,
    params: &AnalysisParams,
) -> Result<SignificanceResult, InvalidInputError> {
    compute(control, treatment, params.hypothesis, params.alpha)
}

// ── Building blocks ─────────────────────────────────────────────────

pub fn conversion_rate(conversions: u64, visitors: u64) -> f64 {
    (conversions as f64 / visitors as f64) * 100.0
}

/// Relative change of the treatment rate over the control rate, in percent.
/// `None` when the control rate is zero.
pub fn relative_lift(rate_control: f64, rate_treatment: f64) -> Option<f64> {
    if rate_control == 0.0 {
        return None;
    }
    Some(((rate_treatment - rate_control) / rate_control) * 100.0)
}

/// Standard error of a proportion given as a percentage rate.
pub fn standard_error(rate: f64, visitors: u64) -> f64 {
    ((rate / 100.0 * (1.0 - rate / 100.0)) / visitors as f64).sqrt()
}

pub fn standard_error_diff(se_control: f64, se_treatment: f64) -> f64 {
    (se_control.powi(2) + se_treatment.powi(2)).sqrt()
}

/// `None` when `se_diff` is zero (both arms at 0% or 100%).
pub fn z_score(rate_control: f64, rate_treatment: f64, se_diff: f64) -> Option<f64> {
    if se_diff == 0.0 {
        return None;
    }
    Some(((rate_treatment - rate_control) / se_diff) / 100.0)
}

pub fn p_value(z: f64, mode: HypothesisMode) -> f64 {
    let p = match mode {
        HypothesisMode::OneSided if z < 0.0 => 1.0 - stats::normal_sf(z),
        HypothesisMode::OneSided => stats::normal_sf(z) / 2.0,
        HypothesisMode::TwoSided => stats::normal_sf(z),
    };
    p.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(conversions: u64, visitors: u64) -> VariantObservation {
        VariantObservation::new(conversions, visitors)
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {} ± {}, got {}",
            expected,
            tol,
            actual
        );
    }

    // ── Validation ──────────────────────────────────────────────────

    #[test]
    fn zero_control_visitors_is_invalid() {
        let err = compute(obs(0, 0), obs(5, 50), HypothesisMode::TwoSided, 0.05).unwrap_err();
        assert_eq!(
            err,
            InvalidInputError::ZeroVisitors {
                group: Group::Control
            }
        );
    }

    #[test]
    fn zero_treatment_visitors_is_invalid() {
        let err = compute(obs(5, 50), obs(0, 0), HypothesisMode::TwoSided, 0.05).unwrap_err();
        assert_eq!(
            err,
            InvalidInputError::ZeroVisitors {
                group: Group::Treatment
            }
        );
    }

    #[test]
    fn conversions_above_visitors_is_invalid() {
        let err = compute(obs(5, 50), obs(51, 50), HypothesisMode::OneSided, 0.05).unwrap_err();
        assert_eq!(
            err,
            InvalidInputError::ConversionsExceedVisitors {
                group: Group::Treatment,
                conversions: 51,
                visitors: 50,
            }
        );
    }

    #[test]
    fn alpha_at_bounds_is_invalid() {
        for alpha in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            let err = compute(obs(5, 50), obs(6, 50), HypothesisMode::OneSided, alpha);
            assert!(
                matches!(err, Err(InvalidInputError::AlphaOutOfRange { .. })),
                "alpha={} should be rejected",
                alpha
            );
        }
    }

    #[test]
    fn group_errors_are_reported_before_alpha() {
        let err = compute(obs(0, 0), obs(5, 50), HypothesisMode::OneSided, 0.0).unwrap_err();
        assert!(matches!(err, InvalidInputError::ZeroVisitors { .. }));
    }

    #[test]
    fn conversions_equal_to_visitors_is_valid() {
        assert!(obs(50, 50).validate(Group::Control).is_ok());
    }

    #[test]
    fn error_message_names_group() {
        let err = obs(0, 0).validate(Group::Treatment).unwrap_err();
        assert!(err.to_string().contains("Treatment"), "{}", err);
    }

    // ── Reference scenarios ─────────────────────────────────────────

    #[test]
    fn large_effect_two_sided_is_significant() {
        let r = compute(obs(50, 300), obs(48, 100), HypothesisMode::TwoSided, 0.05).unwrap();
        assert_close(r.conversion_rate_control, 16.6667, 1e-3);
        assert_close(r.conversion_rate_treatment, 48.0, 1e-12);
        assert_close(r.lift.unwrap(), 188.0, 0.5);
        assert_close(r.standard_error_control, 0.0215166, 1e-6);
        assert_close(r.standard_error_treatment, 0.0499600, 1e-6);
        assert_close(r.standard_error_diff, 0.0543964, 1e-6);
        assert_close(r.z_score.unwrap(), 5.7602, 1e-3);
        let p = r.p_value.unwrap();
        assert!(p > 0.0 && p < 1e-6, "p={}", p);
        assert_eq!(r.is_significant, Some(true));
        assert_eq!(r.verdict(), Verdict::Significant);
    }

    #[test]
    fn identical_arms_give_zero_z_and_half_p() {
        let r = compute(obs(10, 100), obs(10, 100), HypothesisMode::TwoSided, 0.05).unwrap();
        assert_eq!(r.z_score, Some(0.0));
        assert_eq!(r.lift, Some(0.0));
        assert_close(r.p_value.unwrap(), 0.5, 1e-6);
        assert_eq!(r.is_significant, Some(false));
    }

    #[test]
    fn zero_control_rate_leaves_lift_undetermined_but_p_defined() {
        let r = compute(obs(0, 50), obs(5, 50), HypothesisMode::TwoSided, 0.05).unwrap();
        assert_eq!(r.conversion_rate_control, 0.0);
        assert!(r.lift.is_none());
        assert_eq!(r.standard_error_control, 0.0);
        assert_close(r.z_score.unwrap(), 2.35702, 1e-4);
        assert_close(r.p_value.unwrap(), 0.009211, 1e-5);
        assert_eq!(r.is_significant, Some(true));
        assert_eq!(r.verdict(), Verdict::Significant);
    }

    #[test]
    fn zero_variance_in_both_arms_is_undetermined() {
        let r = compute(obs(0, 50), obs(0, 80), HypothesisMode::OneSided, 0.05).unwrap();
        assert_eq!(r.standard_error_diff, 0.0);
        assert!(r.lift.is_none());
        assert!(r.z_score.is_none());
        assert!(r.p_value.is_none());
        assert!(r.is_significant.is_none());
        assert_eq!(r.verdict(), Verdict::Undetermined);
    }

    #[test]
    fn full_conversion_in_both_arms_keeps_lift_but_not_z() {
        let r = compute(obs(50, 50), obs(20, 20), HypothesisMode::TwoSided, 0.05).unwrap();
        assert_eq!(r.lift, Some(0.0));
        assert!(r.z_score.is_none());
        assert!(r.is_significant.is_none());
    }

    // ── p-value branches ────────────────────────────────────────────

    #[test]
    fn two_sided_uses_upper_tail_of_signed_z() {
        assert_eq!(p_value(1.5, HypothesisMode::TwoSided), stats::normal_sf(1.5));
        assert_eq!(p_value(-1.5, HypothesisMode::TwoSided), stats::normal_sf(-1.5));
        assert!(p_value(-1.5, HypothesisMode::TwoSided) > 0.9);
    }

    #[test]
    fn one_sided_negative_z_uses_lower_tail() {
        let p = p_value(-1.5, HypothesisMode::OneSided);
        assert_eq!(p, 1.0 - stats::normal_sf(-1.5));
        assert_close(p, 0.0668, 1e-3);
    }

    #[test]
    fn one_sided_non_negative_z_halves_upper_tail() {
        assert_eq!(
            p_value(1.5, HypothesisMode::OneSided),
            stats::normal_sf(1.5) / 2.0
        );
        assert_close(p_value(0.0, HypothesisMode::OneSided), 0.25, 1e-6);
    }

    #[test]
    fn p_value_stays_in_unit_interval() {
        let mut z = -10.0;
        while z <= 10.0 {
            for mode in [HypothesisMode::OneSided, HypothesisMode::TwoSided] {
                let p = p_value(z, mode);
                assert!((0.0..=1.0).contains(&p), "p({}, {:?})={}", z, mode, p);
            }
            z += 0.1;
        }
    }

    // ── Properties ──────────────────────────────────────────────────

    #[test]
    fn significance_is_strict_at_alpha_boundary() {
        let base = compute(obs(120, 1000), obs(100, 1000), HypothesisMode::OneSided, 0.5).unwrap();
        let p = base.p_value.unwrap();

        let at = compute(obs(120, 1000), obs(100, 1000), HypothesisMode::OneSided, p).unwrap();
        assert_eq!(at.is_significant, Some(false), "p == alpha is not significant");

        let above = f64::from_bits(p.to_bits() + 1);
        let r = compute(obs(120, 1000), obs(100, 1000), HypothesisMode::OneSided, above).unwrap();
        assert_eq!(r.is_significant, Some(true));
    }

    #[test]
    fn conversion_rate_is_monotonic_in_conversions() {
        let mut prev = -1.0;
        for c in 0..=200 {
            let rate = conversion_rate(c, 200);
            assert!(rate >= prev, "rate({})={} < {}", c, rate, prev);
            assert!((0.0..=100.0).contains(&rate));
            prev = rate;
        }
    }

    #[test]
    fn swapping_arms_negates_z_and_flips_lift() {
        let fwd = compute(obs(50, 300), obs(48, 100), HypothesisMode::OneSided, 0.05).unwrap();
        let rev = compute(obs(48, 100), obs(50, 300), HypothesisMode::OneSided, 0.05).unwrap();

        let z = fwd.z_score.unwrap();
        assert_eq!(rev.z_score.unwrap(), -z);
        assert!(fwd.lift.unwrap() > 0.0);
        assert!(rev.lift.unwrap() < 0.0);
        assert_close(rev.lift.unwrap(), -65.2778, 1e-3);

        assert_eq!(fwd.p_value.unwrap(), stats::normal_sf(z) / 2.0);
        assert_eq!(rev.p_value.unwrap(), 1.0 - stats::normal_sf(-z));
    }

    #[test]
    fn swapping_arms_under_two_sided_gives_complementary_tails() {
        let fwd = compute(obs(120, 1000), obs(100, 1000), HypothesisMode::TwoSided, 0.05).unwrap();
        let rev = compute(obs(100, 1000), obs(120, 1000), HypothesisMode::TwoSided, 0.05).unwrap();
        assert_close(fwd.p_value.unwrap(), 0.923646, 1e-5);
        assert_close(rev.p_value.unwrap(), 0.076354, 1e-5);
        assert_close(fwd.p_value.unwrap() + rev.p_value.unwrap(), 1.0, 1e-12);
        assert_eq!(fwd.is_significant, Some(false));
        assert_eq!(rev.is_significant, Some(false));
    }

    #[test]
    fn repeated_calls_are_bit_identical() {
        let a = compute(obs(37, 411), obs(52, 398), HypothesisMode::TwoSided, 0.1).unwrap();
        let b = compute(obs(37, 411), obs(52, 398), HypothesisMode::TwoSided, 0.1).unwrap();
        assert_eq!(a.z_score.unwrap().to_bits(), b.z_score.unwrap().to_bits());
        assert_eq!(a.p_value.unwrap().to_bits(), b.p_value.unwrap().to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn compute_with_uses_params() {
        let params = AnalysisParams::new(HypothesisMode::TwoSided, 0.01);
        let r = compute_with(obs(10, 100), obs(12, 100), &params).unwrap();
        assert_eq!(r.hypothesis, HypothesisMode::TwoSided);
        assert_eq!(r.alpha, 0.01);
    }

    #[test]
    fn result_serializes_undetermined_fields_as_null() {
        let r = compute(obs(0, 10), obs(0, 10), HypothesisMode::TwoSided, 0.05).unwrap();
        let json = serde_json::to_value(&r).unwrap();
        assert!(json["lift"].is_null());
        assert!(json["zScore"].is_null());
        assert!(json["pValue"].is_null());
        assert!(json["isSignificant"].is_null());
        assert_eq!(json["hypothesis"], "two-sided");
        assert_eq!(json["conversionRateControl"], 0.0);
    }
}
