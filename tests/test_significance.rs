use abtest::experiments::ingest::{self, IngestConfig};
use abtest::experiments::significance::compute_with;
use abtest::{
    compute, AbTestError, AnalysisParams, HypothesisMode, InvalidInputError, Report,
    ReportFormat, VariantObservation, Verdict,
};
use std::io::Write;
use tempfile::NamedTempFile;

fn obs(conversions: u64, visitors: u64) -> VariantObservation {
    VariantObservation::new(conversions, visitors)
}

#[test]
fn p_value_and_significance_agree_across_grid() {
    for mode in [HypothesisMode::OneSided, HypothesisMode::TwoSided] {
        for c in [0u64, 1, 7, 33, 100] {
            for t in [0u64, 2, 9, 40, 100] {
                let r = compute(obs(c, 100), obs(t, 100), mode, 0.05).unwrap();
                match (r.p_value, r.is_significant) {
                    (Some(p), Some(sig)) => {
                        assert!((0.0..=1.0).contains(&p), "p={} for {}/{}", p, c, t);
                        assert_eq!(sig, p < 0.05);
                    }
                    (None, None) => assert!(r.z_score.is_none()),
                    other => panic!("inconsistent result {:?} for {}/{}", other, c, t),
                }
            }
        }
    }
}

#[test]
fn lift_is_undetermined_only_when_control_rate_is_zero() {
    let r = compute(obs(0, 100), obs(10, 100), HypothesisMode::OneSided, 0.05).unwrap();
    assert!(r.lift.is_none());
    assert!(r.z_score.is_some());

    let r = compute(obs(10, 100), obs(0, 100), HypothesisMode::OneSided, 0.05).unwrap();
    assert_eq!(r.lift, Some(-100.0));
}

#[test]
fn invalid_inputs_surface_as_crate_errors() {
    let err: AbTestError = compute(obs(3, 2), obs(1, 10), HypothesisMode::OneSided, 0.05)
        .unwrap_err()
        .into();
    assert!(matches!(err, AbTestError::InvalidInput(_)));
    assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);

    let raw = compute(obs(1, 10), obs(1, 10), HypothesisMode::OneSided, -0.5).unwrap_err();
    assert_eq!(raw, InvalidInputError::AlphaOutOfRange { alpha: -0.5 });
}

#[test]
fn csv_file_to_report_pipeline() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "session,bucket,orders\n\
         s1,control,0\n\
         s2,variant,1\n\
         s3,control,1\n\
         s4,variant,1\n\
         s5,control,0\n\
         s6,variant,0\n\
         s7,control,0\n\
         s8,variant,1\n"
    )
    .unwrap();

    let config = IngestConfig::new("bucket", "orders");
    let groups = ingest::from_csv_path(file.path(), &config).unwrap();
    assert_eq!(groups.control_label, "control");
    assert_eq!(groups.control, obs(1, 4));
    assert_eq!(groups.treatment, obs(3, 4));

    let params = AnalysisParams::new(HypothesisMode::TwoSided, 0.05);
    let result = groups.compute(&params).unwrap();
    assert_eq!(result, compute_with(obs(1, 4), obs(3, 4), &params).unwrap());
    assert_eq!(result.lift, Some(200.0));

    let text = Report::from_groups(&result, &groups)
        .render(ReportFormat::Text, false)
        .unwrap();
    assert!(text.contains("control (control) vs variant (treatment)"), "{}", text);
    assert!(text.contains("25%"));
    assert!(text.contains("75%"));
    assert!(text.contains("200%"));
}

#[test]
fn two_sided_negative_effect_reports_large_p() {
    let r = compute(obs(120, 1000), obs(100, 1000), HypothesisMode::TwoSided, 0.05).unwrap();
    assert!(r.z_score.unwrap() < 0.0);
    assert!(r.p_value.unwrap() > 0.9);
    assert_eq!(r.verdict(), Verdict::NotSignificant);
}

#[test]
fn full_conversion_everywhere_is_undetermined() {
    let r = compute(obs(40, 40), obs(25, 25), HypothesisMode::OneSided, 0.05).unwrap();
    assert_eq!(r.conversion_rate_control, 100.0);
    assert_eq!(r.standard_error_diff, 0.0);
    assert_eq!(r.verdict(), Verdict::Undetermined);

    let json = Report::new(&r, obs(40, 40), obs(25, 25)).to_json().unwrap();
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(v["pValue"].is_null());
    assert_eq!(v["verdict"], "undetermined");
}
