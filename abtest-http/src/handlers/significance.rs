use abtest::experiments::{
    ingest::{self, IngestConfig},
    report::Report,
    significance::{self, Verdict},
};
use abtest::{AbTestError, AnalysisParams, HypothesisMode, SignificanceResult, VariantObservation};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection, StringRejection},
        Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignificanceRequest {
    pub control: VariantObservation,
    pub treatment: VariantObservation,
    #[serde(default)]
    pub hypothesis: Option<HypothesisMode>,
    #[serde(default)]
    pub alpha: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvSignificanceQuery {
    pub group_column: String,
    pub result_column: String,
    #[serde(default)]
    pub treatment: Option<String>,
    #[serde(default)]
    pub hypothesis: Option<HypothesisMode>,
    #[serde(default)]
    pub alpha: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignificanceResponse {
    #[serde(flatten)]
    pub result: SignificanceResult,
    pub delta: f64,
    pub verdict: Verdict,
    pub explanation: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvSignificanceResponse {
    pub control_label: String,
    pub treatment_label: String,
    pub control: VariantObservation,
    pub treatment: VariantObservation,
    pub rows: u64,
    #[serde(flatten)]
    pub analysis: SignificanceResponse,
}

fn resolve_params(
    defaults: AnalysisParams,
    hypothesis: Option<HypothesisMode>,
    alpha: Option<f64>,
) -> AnalysisParams {
    AnalysisParams {
        hypothesis: hypothesis.unwrap_or(defaults.hypothesis),
        alpha: alpha.unwrap_or(defaults.alpha),
    }
}

fn respond(result: SignificanceResult, report: &Report<'_>) -> SignificanceResponse {
    let explanation = report.explanation();
    SignificanceResponse {
        delta: result.delta(),
        verdict: result.verdict(),
        explanation,
        result,
    }
}

/// Maps a body extractor rejection into the error envelope. Bodies over the
/// configured limit keep their 413; everything else becomes `otherwise`.
fn body_rejection(
    status: StatusCode,
    text: String,
    otherwise: fn(String) -> AbTestError,
) -> AbTestError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AbTestError::PayloadTooLarge(text)
    } else {
        otherwise(text)
    }
}

/// POST /2/significance
pub async fn significance(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SignificanceRequest>, JsonRejection>,
) -> Result<Json<SignificanceResponse>, AbTestError> {
    let Json(req) =
        body.map_err(|e| body_rejection(e.status(), e.body_text(), AbTestError::Json))?;
    let params = resolve_params(state.defaults, req.hypothesis, req.alpha);

    let result = significance::compute_with(req.control, req.treatment, &params)?;
    let report = Report::new(&result, req.control, req.treatment);
    let response = respond(result.clone(), &report);

    tracing::info!(
        hypothesis = %params.hypothesis,
        alpha = params.alpha,
        verdict = ?response.verdict,
        "significance request served"
    );
    Ok(Json(response))
}

/// POST /2/significance/csv
pub async fn significance_csv(
    State(state): State<Arc<AppState>>,
    query: Result<Query<CsvSignificanceQuery>, QueryRejection>,
    body: Result<String, StringRejection>,
) -> Result<Json<CsvSignificanceResponse>, AbTestError> {
    let Query(q) = query.map_err(|e| AbTestError::InvalidInput(e.body_text()))?;
    let body = body.map_err(|e| body_rejection(e.status(), e.body_text(), AbTestError::Csv))?;
    let params = resolve_params(state.defaults, q.hypothesis, q.alpha);

    let config = IngestConfig {
        group_column: q.group_column,
        result_column: q.result_column,
        treatment_label: q.treatment,
    };
    let groups = ingest::from_csv_reader(body.as_bytes(), &config)?;
    let result = groups.compute(&params)?;
    let report = Report::from_groups(&result, &groups);
    let analysis = respond(result.clone(), &report);

    tracing::info!(
        rows = groups.rows,
        control = %groups.control_label,
        treatment = %groups.treatment_label,
        verdict = ?analysis.verdict,
        "csv significance request served"
    );
    Ok(Json(CsvSignificanceResponse {
        control_label: groups.control_label,
        treatment_label: groups.treatment_label,
        control: groups.control,
        treatment: groups.treatment,
        rows: groups.rows,
        analysis,
    }))
}
