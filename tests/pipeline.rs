use az_speed_impact::app::pipeline::{AnalysisRequest, run_analyses};
use az_speed_impact::data::{SampleEffect, SampleSpec, generate_panel};
use az_speed_impact::domain::{Aggregation, AnalysisConfig, InternetType, Outcome, Population};
use az_speed_impact::io::{export_all, load_observations, write_observations_csv};
use chrono::NaiveDate;

fn request(controls: &[&str]) -> AnalysisRequest {
    AnalysisRequest {
        treated: Population::new("Azerbaijan", InternetType::Fixed),
        aggregation: Aggregation::Median,
        controls: controls.iter().map(|c| c.to_string()).collect(),
        run_its: true,
        run_did: true,
    }
}

#[test]
fn csv_to_exports_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("speeds.csv");
    let out_dir = dir.path().join("outputs");

    let panel = generate_panel(&SampleSpec::default()).unwrap();
    write_observations_csv(&input, &panel).unwrap();
    let records = load_observations(&input).unwrap();
    assert_eq!(records.len(), panel.len());

    let output = run_analyses(&records, &request(&["Georgia"]), &AnalysisConfig::default()).unwrap();
    assert!(output.summary.failures.is_empty(), "{:?}", output.summary.failures);

    let written = export_all(&out_dir, &output.export_bundle(), &output.summary).unwrap();
    let names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    for expected in [
        "its_results.csv",
        "its_timeseries.csv",
        "placebo_download_speed.csv",
        "placebo_upload_speed.csv",
        "did_download_speed.csv",
        "did_upload_speed.csv",
        "pre_post_differences.csv",
        "summary.json",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected} in {names:?}");
    }

    let its_csv = std::fs::read_to_string(out_dir.join("its_results.csv")).unwrap();
    assert_eq!(its_csv.lines().count(), 3);
    assert!(its_csv.lines().next().unwrap().contains("level_change_p"));

    let placebo_csv = std::fs::read_to_string(out_dir.join("placebo_download_speed.csv")).unwrap();
    assert_eq!(placebo_csv.lines().count(), 101);

    let ts_csv = std::fs::read_to_string(out_dir.join("its_timeseries.csv")).unwrap();
    assert_eq!(ts_csv.lines().count(), 79);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out_dir.join("summary.json")).unwrap()).unwrap();
    assert_eq!(json["its"].as_array().unwrap().len(), 2);
    assert_eq!(json["did"].as_array().unwrap().len(), 2);
    assert_eq!(json["config"]["placebo_seed"], 42);
}

#[test]
fn clear_break_is_recovered_and_significant() {
    let cutoff = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
    let spec = SampleSpec {
        effects: vec![SampleEffect {
            cutoff,
            level_jump: 10.0,
            slope_change: 0.0,
        }],
        noise_rel: 0.005,
        ..SampleSpec::default()
    };
    let records = generate_panel(&spec).unwrap();
    let config = AnalysisConfig {
        outcomes: vec![Outcome::Download],
        ..AnalysisConfig::default()
    };
    let output = run_analyses(&records, &request(&["Georgia"]), &config).unwrap();

    let its = &output.its[0];
    assert!((its.result.level_change() - 10.0).abs() < 1.5, "level {}", its.result.level_change());
    let row = &output.summary.its[0].row;
    assert!(row.level_change_p < 0.05);
    assert!(row.interpretation.contains("statistically significant at α=0.05"));
    let placebo = its.placebo.as_ref().unwrap();
    assert!(placebo.p_value < 0.1, "placebo p {}", placebo.p_value);
}

#[test]
fn reruns_are_identical() {
    let records = generate_panel(&SampleSpec::default()).unwrap();
    let config = AnalysisConfig::default();
    let a = run_analyses(&records, &request(&["Georgia", "Armenia"]), &config).unwrap();
    let b = run_analyses(&records, &request(&["Georgia", "Armenia"]), &config).unwrap();

    let pa: Vec<f64> = a.its.iter().filter_map(|o| o.placebo.as_ref()).map(|p| p.p_value).collect();
    let pb: Vec<f64> = b.its.iter().filter_map(|o| o.placebo.as_ref()).map(|p| p.p_value).collect();
    assert_eq!(pa, pb);
    assert_eq!(a.did[0].att(), b.did[0].att());
}

#[test]
fn short_panel_fails_placebo_but_keeps_its() {
    let spec = SampleSpec {
        start: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
        months: 16,
        ..SampleSpec::default()
    };
    let records = generate_panel(&spec).unwrap();
    let req = AnalysisRequest {
        run_did: false,
        ..request(&["Georgia"])
    };
    let output = run_analyses(&records, &req, &AnalysisConfig::default()).unwrap();

    assert_eq!(output.its.len(), 2);
    assert!(output.its.iter().all(|o| o.placebo.is_none()));
    assert!(output.summary.failures.iter().all(|f| f.analysis == "Placebo"));
    assert!(output.summary.failures[0].error.contains("eligible"));
    assert!(output.failure().is_none());
}
