//! Significance testing for two-variant A/B conversion experiments.
//!
//! The core is [`experiments::significance::compute`], a pure function from a
//! pair of [`VariantObservation`]s, a [`HypothesisMode`] and a significance
//! threshold to a [`SignificanceResult`]. The surrounding modules turn raw
//! tabular data into observations ([`experiments::ingest`]) and render results
//! ([`experiments::report`]).

pub mod error;
pub mod experiments;

pub use error::{AbTestError, Result};
pub use experiments::config::{AnalysisParams, HypothesisMode};
pub use experiments::ingest::{AggregatedGroups, IngestConfig, IngestError};
pub use experiments::report::{Report, ReportFormat};
pub use experiments::significance::{
    compute, Group, InvalidInputError, SignificanceResult, VariantObservation, Verdict,
};
