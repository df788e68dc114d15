use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::significance::InvalidInputError;

pub const DEFAULT_ALPHA: f64 = 0.05;

/// Form of the alternative hypothesis used when turning a z-score into a
/// p-value. Fixed per analysis request.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HypothesisMode {
    #[default]
    OneSided,
    TwoSided,
}

impl HypothesisMode {
    pub fn label(&self) -> &'static str {
        match self {
            HypothesisMode::OneSided => "One-sided",
            HypothesisMode::TwoSided => "Two-sided",
        }
    }
}

impl fmt::Display for HypothesisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown hypothesis mode '{0}', expected one-sided or two-sided")]
pub struct ParseHypothesisError(pub String);

impl FromStr for HypothesisMode {
    type Err = ParseHypothesisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "onesided" => Ok(HypothesisMode::OneSided),
            "twosided" => Ok(HypothesisMode::TwoSided),
            _ => Err(ParseHypothesisError(s.to_string())),
        }
    }
}

/// Per-request analysis parameters: hypothesis form and significance threshold.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisParams {
    #[serde(default)]
    pub hypothesis: HypothesisMode,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            hypothesis: HypothesisMode::default(),
            alpha: DEFAULT_ALPHA,
        }
    }
}

impl AnalysisParams {
    pub fn new(hypothesis: HypothesisMode, alpha: f64) -> Self {
        Self { hypothesis, alpha }
    }

    /// Alpha must lie strictly inside (0, 1). NaN is rejected.
    pub fn validate(&self) -> Result<(), InvalidInputError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(InvalidInputError::AlphaOutOfRange { alpha: self.alpha });
        }
        Ok(())
    }
}
