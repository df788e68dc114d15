//! Aggregation of raw per-row experiment records into per-group counts.
//!
//! Each row names the group it belongs to and carries a result cell. Every row
//! counts as one visitor of its group; the result cell is added to the group's
//! conversions. Exactly two distinct group labels must be present.
//!
//! Label order: the first label seen is Control and the second is Treatment,
//! unless [`IngestConfig::treatment_label`] names the Treatment explicitly.
//!
//! [`Aggregator`] is the pure core; [`from_csv_reader`] and [`from_csv_path`]
//! wrap it with CSV parsing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use super::config::AnalysisParams;
use super::significance::{self, InvalidInputError, SignificanceResult, VariantObservation};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("column '{0}' not found in header")]
    MissingColumn(String),
    #[error("row {row}: group label is empty")]
    EmptyLabel { row: u64 },
    #[error("row {row}: result value '{value}' is not a non-negative integer or boolean")]
    InvalidResult { row: u64, value: String },
    #[error("expected exactly 2 groups, found {found}: {labels:?}")]
    GroupCount { found: usize, labels: Vec<String> },
    #[error("treatment label '{0}' does not occur in the group column")]
    UnknownLabel(String),
    #[error("{0}")]
    Csv(String),
    #[error("{0}")]
    Io(String),
}

impl From<csv::Error> for IngestError {
    fn from(e: csv::Error) -> Self {
        if e.is_io_error() {
            IngestError::Io(e.to_string())
        } else {
            IngestError::Csv(e.to_string())
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::Io(e.to_string())
    }
}

/// Which columns hold the group label and the result, and optionally which
/// label is the Treatment.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngestConfig {
    pub group_column: String,
    pub result_column: String,
    #[serde(default)]
    pub treatment_label: Option<String>,
}

impl IngestConfig {
    pub fn new(group_column: impl Into<String>, result_column: impl Into<String>) -> Self {
        Self {
            group_column: group_column.into(),
            result_column: result_column.into(),
            treatment_label: None,
        }
    }

    pub fn with_treatment(mut self, label: impl Into<String>) -> Self {
        self.treatment_label = Some(label.into());
        self
    }
}

/// Counts for both groups together with the labels they were read from.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedGroups {
    pub control_label: String,
    pub treatment_label: String,
    pub control: VariantObservation,
    pub treatment: VariantObservation,
    pub rows: u64,
}

impl AggregatedGroups {
    pub fn compute(
        &self,
        params: &AnalysisParams,
    ) -> Result<SignificanceResult, InvalidInputError> {
        significance::compute_with(self.control, self.treatment, params)
    }
}

// ── Core aggregation (pure logic, no I/O) ───────────────────────────

#[derive(Debug, Default)]
struct GroupTally {
    label: String,
    visitors: u64,
    conversions: u64,
}

/// Accumulates rows one at a time, preserving first-appearance order of labels.
#[derive(Debug, Default)]
pub struct Aggregator {
    groups: Vec<GroupTally>,
    index: HashMap<String, usize>,
    rows: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: &str, result: &str) -> Result<(), IngestError> {
        self.rows += 1;
        let row = self.rows;

        let label = label.trim();
        if label.is_empty() {
            return Err(IngestError::EmptyLabel { row });
        }
        let value = parse_result(result).ok_or_else(|| IngestError::InvalidResult {
            row,
            value: result.to_string(),
        })?;

        let idx = match self.index.get(label) {
            Some(&idx) => idx,
            None => {
                self.groups.push(GroupTally {
                    label: label.to_string(),
                    ..Default::default()
                });
                self.index.insert(label.to_string(), self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        let tally = &mut self.groups[idx];
        tally.conversions =
            tally
                .conversions
                .checked_add(value)
                .ok_or_else(|| IngestError::InvalidResult {
                    row,
                    value: result.to_string(),
                })?;
        tally.visitors += 1;
        Ok(())
    }

    pub fn finish(self, treatment_label: Option<&str>) -> Result<AggregatedGroups, IngestError> {
        let rows = self.rows;
        let [first, second]: [GroupTally; 2] = match self.groups.try_into() {
            Ok(pair) => pair,
            Err(groups) => {
                let groups: Vec<GroupTally> = groups;
                return Err(IngestError::GroupCount {
                    found: groups.len(),
                    labels: groups.into_iter().map(|g| g.label).collect(),
                });
            }
        };

        let (control, treatment) = match treatment_label.map(str::trim) {
            None => (first, second),
            Some(t) if t == second.label => (first, second),
            Some(t) if t == first.label => (second, first),
            Some(t) => return Err(IngestError::UnknownLabel(t.to_string())),
        };

        tracing::info!(
            rows,
            control = %control.label,
            control_visitors = control.visitors,
            control_conversions = control.conversions,
            treatment = %treatment.label,
            treatment_visitors = treatment.visitors,
            treatment_conversions = treatment.conversions,
            "aggregated experiment rows"
        );

        Ok(AggregatedGroups {
            control: VariantObservation::new(control.conversions, control.visitors),
            treatment: VariantObservation::new(treatment.conversions, treatment.visitors),
            control_label: control.label,
            treatment_label: treatment.label,
            rows,
        })
    }
}

/// Aggregates `(label, result)` pairs.
pub fn aggregate_rows<I, L, V>(
    rows: I,
    treatment_label: Option<&str>,
) -> Result<AggregatedGroups, IngestError>
where
    I: IntoIterator<Item = (L, V)>,
    L: AsRef<str>,
    V: AsRef<str>,
{
    let mut agg = Aggregator::new();
    for (label, result) in rows {
        agg.push(label.as_ref(), result.as_ref())?;
    }
    agg.finish(treatment_label)
}

/// Accepts non-negative integers (`"3"`, `"1.0"`) and booleans
/// (`true`/`false`, `yes`/`no`).
fn parse_result(raw: &str) -> Option<u64> {
    let value = raw.trim();
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" => return Some(1),
        "false" | "no" => return Some(0),
        _ => {}
    }
    if let Ok(n) = value.parse::<u64>() {
        return Some(n);
    }
    let f = value.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

// ── CSV I/O ─────────────────────────────────────────────────────────

pub fn from_csv_reader<R: Read>(
    reader: R,
    config: &IngestConfig,
) -> Result<AggregatedGroups, IngestError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let group_idx = column_index(&headers, &config.group_column)?;
    let result_idx = column_index(&headers, &config.result_column)?;

    let mut agg = Aggregator::new();
    for record in rdr.records() {
        let record = record?;
        agg.push(
            record.get(group_idx).unwrap_or(""),
            record.get(result_idx).unwrap_or(""),
        )?;
    }
    agg.finish(config.treatment_label.as_deref())
}

pub fn from_csv_path(
    path: impl AsRef<Path>,
    config: &IngestConfig,
) -> Result<AggregatedGroups, IngestError> {
    let file = std::fs::File::open(path.as_ref())?;
    from_csv_reader(std::io::BufReader::new(file), config)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, IngestError> {
    headers
        .iter()
        .position(|h| h == name.trim())
        .ok_or_else(|| IngestError::MissingColumn(name.to_string()))
}
