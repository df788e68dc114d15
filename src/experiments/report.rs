//! Human-readable rendering of a [`SignificanceResult`].
//!
//! Numbers are shown with three significant figures, percentages carry a `%`
//! suffix, and undetermined values print as `n/a`. The text view also draws
//! a block bar per group scaled to the larger conversion rate.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ingest::AggregatedGroups;
use super::significance::{SignificanceResult, VariantObservation, Verdict};
use crate::error::Result;

const SIG_DIGITS: usize = 3;
const NOT_AVAILABLE: &str = "n/a";
/// Width in blocks of the longest bar in the conversion-rate chart.
const BAR_WIDTH: usize = 40;
const BAR_BLOCK: char = '█';

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!(
                "unknown report format '{}', expected text, markdown or json",
                other
            )),
        }
    }
}

/// Result of one analysis together with the counts and labels it came from.
#[derive(Debug, Clone)]
pub struct Report<'a> {
    result: &'a SignificanceResult,
    control_label: String,
    treatment_label: String,
    control: VariantObservation,
    treatment: VariantObservation,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'r> {
    control_label: &'r str,
    treatment_label: &'r str,
    control: VariantObservation,
    treatment: VariantObservation,
    delta: f64,
    verdict: Verdict,
    explanation: String,
    #[serde(flatten)]
    result: &'r SignificanceResult,
}

impl<'a> Report<'a> {
    pub fn new(
        result: &'a SignificanceResult,
        control: VariantObservation,
        treatment: VariantObservation,
    ) -> Self {
        Self {
            result,
            control_label: "Control".to_string(),
            treatment_label: "Treatment".to_string(),
            control,
            treatment,
        }
    }

    pub fn from_groups(result: &'a SignificanceResult, groups: &AggregatedGroups) -> Self {
        Self::new(result, groups.control, groups.treatment)
            .with_labels(&groups.control_label, &groups.treatment_label)
    }

    pub fn with_labels(mut self, control: impl Into<String>, treatment: impl Into<String>) -> Self {
        self.control_label = control.into();
        self.treatment_label = treatment.into();
        self
    }

    /// `YES`, `NO` or `UNDETERMINED`.
    pub fn verdict_label(&self) -> &'static str {
        match self.result.verdict() {
            Verdict::Significant => "YES",
            Verdict::NotSignificant => "NO",
            Verdict::Undetermined => "UNDETERMINED",
        }
    }

    pub fn explanation(&self) -> String {
        let r = self.result;
        let rate_t = percent(r.conversion_rate_treatment);
        let rate_c = percent(r.conversion_rate_control);
        let (t, c) = (&self.treatment_label, &self.control_label);

        match r.verdict() {
            Verdict::Significant => {
                let direction = if r.delta() >= 0.0 { "higher" } else { "lower" };
                let by = r
                    .lift
                    .map(|l| format!("{} ", percent(l.abs())))
                    .unwrap_or_default();
                format!(
                    "{t}'s conversion rate ({rate_t}) was {by}{direction} than {c}'s conversion rate ({rate_c}). \
                     You can be {}% confident that this is not a result of chance.",
                    format_sig((1.0 - r.alpha) * 100.0, SIG_DIGITS)
                )
            }
            Verdict::NotSignificant => format!(
                "The difference between {t}'s conversion rate ({rate_t}) and {c}'s conversion rate ({rate_c}) \
                 is not significant at alpha = {}.",
                format_sig(r.alpha, SIG_DIGITS)
            ),
            Verdict::Undetermined => format!(
                "Significance could not be determined: neither {c} ({rate_c}) nor {t} ({rate_t}) \
                 shows any variation in outcomes."
            ),
        }
    }

    pub fn render(&self, format: ReportFormat, color: bool) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(self.to_text(color)),
            ReportFormat::Markdown => Ok(self.to_markdown()),
            ReportFormat::Json => self.to_json(),
        }
    }

    pub fn to_text(&self, color: bool) -> String {
        TextView { report: self, color }.to_string()
    }

    pub fn to_markdown(&self) -> String {
        MarkdownView { report: self }.to_string()
    }

    pub fn to_json(&self) -> Result<String> {
        let body = JsonReport {
            control_label: &self.control_label,
            treatment_label: &self.treatment_label,
            control: self.control,
            treatment: self.treatment,
            delta: self.result.delta(),
            verdict: self.result.verdict(),
            explanation: self.explanation(),
            result: self.result,
        };
        Ok(serde_json::to_string_pretty(&body)?)
    }

    fn group_rows(&self) -> [[String; 4]; 2] {
        [
            [
                self.control_label.clone(),
                self.control.conversions.to_string(),
                self.control.visitors.to_string(),
                percent(self.result.conversion_rate_control),
            ],
            [
                self.treatment_label.clone(),
                self.treatment.conversions.to_string(),
                self.treatment.visitors.to_string(),
                percent(self.result.conversion_rate_treatment),
            ],
        ]
    }

    fn metric_cells(&self) -> [String; 3] {
        let r = self.result;
        [
            optional(r.p_value, |v| format_sig(v, SIG_DIGITS)),
            optional(r.z_score, |v| format_sig(v, SIG_DIGITS)),
            optional(r.lift, percent),
        ]
    }
}

// ── Text and markdown views ─────────────────────────────────────────

struct TextView<'r, 'a> {
    report: &'r Report<'a>,
    color: bool,
}

impl fmt::Display for TextView<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        let r = report.result;
        let rows = report.group_rows();
        let name_w = rows
            .iter()
            .map(|row| row[0].chars().count())
            .chain(std::iter::once("Group".len()))
            .max()
            .unwrap_or(5);

        writeln!(
            f,
            "Results for A/B test: {} (control) vs {} (treatment)",
            report.control_label, report.treatment_label
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "{:<name_w$}  {:>10}  {:>10}  {:>12}",
            "Group", "Converted", "Total", "% Converted"
        )?;
        for row in &rows {
            writeln!(
                f,
                "{:<name_w$}  {:>10}  {:>10}  {:>12}",
                row[0], row[1], row[2], row[3]
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Conversion rate")?;
        let rates = [r.conversion_rate_control, r.conversion_rate_treatment];
        let bars = bar_lengths(rates);
        for (i, row) in rows.iter().enumerate() {
            let bar = format!("{:<BAR_WIDTH$}", BAR_BLOCK.to_string().repeat(bars[i]));
            let bar = match (self.color, i) {
                (false, _) => bar,
                (true, 0) => bar.cyan().to_string(),
                (true, _) => bar.green().to_string(),
            };
            writeln!(f, "{:<name_w$}  {}  {}", row[0], bar, row[3])?;
        }
        writeln!(f)?;

        let [p, z, uplift] = report.metric_cells();
        let p = paint_p_value(format!("{:>10}", p), r.p_value, r.alpha, self.color);
        let z = paint_negative(format!("{:>10}", z), r.z_score, self.color);
        let uplift = paint_negative(format!("{:>10}", uplift), r.lift, self.color);
        writeln!(f, "{:>10}  {:>10}  {:>10}", "p-value", "z-score", "uplift")?;
        writeln!(f, "{}  {}  {}", p, z, uplift)?;
        writeln!(f)?;

        let verdict = report.verdict_label();
        let verdict = if self.color {
            match r.verdict() {
                Verdict::Significant => verdict.green().bold().to_string(),
                Verdict::NotSignificant => verdict.red().bold().to_string(),
                Verdict::Undetermined => verdict.yellow().bold().to_string(),
            }
        } else {
            verdict.to_string()
        };
        let delta = paint_negative(percent(r.delta()), Some(r.delta()), self.color);

        writeln!(
            f,
            "Hypothesis:   {} (alpha = {})",
            r.hypothesis,
            format_sig(r.alpha, SIG_DIGITS)
        )?;
        writeln!(f, "Delta:        {}", delta)?;
        writeln!(f, "Significant?  {}", verdict)?;
        writeln!(f)?;
        writeln!(f, "{}", report.explanation())
    }
}

struct MarkdownView<'r, 'a> {
    report: &'r Report<'a>,
}

impl fmt::Display for MarkdownView<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        let r = report.result;
        writeln!(
            f,
            "### Results: {} vs {}",
            report.control_label, report.treatment_label
        )?;
        writeln!(f)?;
        writeln!(f, "| Group | Converted | Total | % Converted |")?;
        writeln!(f, "|---|---:|---:|---:|")?;
        for row in report.group_rows() {
            writeln!(f, "| {} | {} | {} | {} |", row[0], row[1], row[2], row[3])?;
        }
        writeln!(f)?;

        let [p, z, uplift] = report.metric_cells();
        writeln!(f, "| p-value | z-score | uplift |")?;
        writeln!(f, "|---:|---:|---:|")?;
        writeln!(f, "| {} | {} | {} |", p, z, uplift)?;
        writeln!(f)?;

        writeln!(
            f,
            "- **Hypothesis:** {} (alpha = {})",
            r.hypothesis,
            format_sig(r.alpha, SIG_DIGITS)
        )?;
        writeln!(f, "- **Delta:** {}", percent(r.delta()))?;
        writeln!(f, "- **Significant?** {}", report.verdict_label())?;
        writeln!(f)?;
        writeln!(f, "{}", report.explanation())
    }
}

/// Bar lengths scaled so the larger rate fills [`BAR_WIDTH`].
fn bar_lengths(rates: [f64; 2]) -> [usize; 2] {
    let max = rates[0].max(rates[1]);
    if max <= 0.0 {
        return [0, 0];
    }
    rates.map(|rate| ((rate / max) * BAR_WIDTH as f64).round() as usize)
}

/// Green when the p-value clears alpha, red otherwise.
fn paint_p_value(cell: String, p_value: Option<f64>, alpha: f64, color: bool) -> String {
    match (color, p_value) {
        (true, Some(p)) if p < alpha => cell.green().to_string(),
        (true, Some(_)) => cell.red().to_string(),
        _ => cell,
    }
}

fn paint_negative(cell: String, value: Option<f64>, color: bool) -> String {
    match value {
        Some(v) if color && v < 0.0 => cell.red().to_string(),
        _ => cell,
    }
}

fn percent(value: f64) -> String {
    format!("{}%", format_sig(value, SIG_DIGITS))
}

fn optional(value: Option<f64>, f: impl Fn(f64) -> String) -> String {
    value.map(f).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Formats `value` with `digits` significant figures in the style of printf
/// `%g`: fixed notation for moderate magnitudes, scientific otherwise, with
/// trailing zeros removed.
pub fn format_sig(value: f64, digits: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let digits = digits.max(1);
    let sci = format!("{:.*e}", digits - 1, value);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= digits as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.abs())
    } else {
        let decimals = (digits as i32 - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
