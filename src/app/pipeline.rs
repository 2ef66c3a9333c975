//! Shared analysis pipeline used by every CLI subcommand.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! records -> series -> ITS + placebo / DID per outcome -> aggregated summary
//!
//! Each outcome variable is analysed independently. A failing analysis is
//! recorded as a [`FailedAnalysis`] and its siblings still run.

use tracing::{info, warn};

use crate::data::build_series;
use crate::domain::{Aggregation, AnalysisConfig, Observation, Population, Series};
use crate::error::{AnalysisError, AppError};
use crate::fit::{DidResult, ItsResult, PlaceboDistribution, PlaceboSettings, fit_did, fit_its, run_placebo};
use crate::io::{ExportBundle, pool_mean};
use crate::report::{
    FailedAnalysis, ItsSummary, PrePostDifference, RunSummary, TimeSeriesTable, did_rows, did_summary, its_row,
    placebo_summary, pre_post_difference, time_series_table,
};

/// Which analyses to run, and on which populations.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub treated: Population,
    pub aggregation: Aggregation,
    /// Control countries for DID; more than one is pooled by monthly mean.
    pub controls: Vec<String>,
    pub run_its: bool,
    pub run_did: bool,
}

/// One outcome's successful ITS analysis.
#[derive(Debug, Clone)]
pub struct ItsOutput {
    pub result: ItsResult,
    pub placebo: Option<PlaceboDistribution>,
    pub pre_post: PrePostDifference,
}

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub its_series: Option<Series>,
    pub its: Vec<ItsOutput>,
    pub did: Vec<DidResult>,
    /// Descriptive differences at the DID cutoff for the treated series.
    pub did_pre_post: Vec<PrePostDifference>,
    pub summary: RunSummary,
    first_error: Option<AnalysisError>,
}

impl RunOutput {
    /// True when at least one analysis was attempted and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.its.is_empty() && self.did.is_empty() && !self.summary.failures.is_empty()
    }

    /// The error that aborts the process when every analysis failed.
    pub fn failure(&self) -> Option<AppError> {
        if !self.all_failed() {
            return None;
        }
        let count = self.summary.failures.len();
        Some(match &self.first_error {
            Some(err) => AppError::new(err.exit_code(), format!("all {count} analyses failed; first error: {err}")),
            None => AppError::new(3, format!("all {count} analyses failed")),
        })
    }

    pub fn time_series(&self) -> Option<TimeSeriesTable> {
        let series = self.its_series.as_ref()?;
        let results: Vec<ItsResult> = self.its.iter().map(|o| o.result.clone()).collect();
        (!results.is_empty()).then(|| time_series_table(series, &results))
    }

    /// Tables for [`crate::io::export_all`].
    pub fn export_bundle(&self) -> ExportBundle<'_> {
        ExportBundle {
            its_rows: self.summary.its.iter().map(|s| s.row.clone()).collect(),
            time_series: self.time_series(),
            placebo: self.its.iter().filter_map(|o| o.placebo.as_ref()).collect(),
            did_rows: self
                .did
                .iter()
                .map(|d| (d.outcome.column().to_string(), did_rows(d)))
                .collect(),
            pre_post: self
                .its
                .iter()
                .map(|o| o.pre_post.clone())
                .chain(self.did_pre_post.iter().cloned())
                .collect(),
        }
    }
}

#[derive(Default)]
struct Failures {
    entries: Vec<FailedAnalysis>,
    first: Option<AnalysisError>,
}

impl Failures {
    fn record(&mut self, analysis: &str, outcome: crate::domain::Outcome, err: &AnalysisError) {
        warn!(analysis, outcome = outcome.column(), error = %err, "analysis failed");
        self.entries.push(FailedAnalysis::new(analysis, outcome, err));
        if self.first.is_none() {
            self.first = Some(err.clone());
        }
    }
}

/// Execute the requested analyses over `records`.
///
/// Only configuration errors abort the run; analysis errors become
/// [`FailedAnalysis`] entries.
pub fn run_analyses(
    records: &[Observation],
    request: &AnalysisRequest,
    config: &AnalysisConfig,
) -> Result<RunOutput, AppError> {
    config.validate()?;
    let alpha = config.significance;
    let mut failures = Failures::default();

    let mut its_series = None;
    let mut its = Vec::new();
    if request.run_its {
        match build_series(records, &request.treated, request.aggregation, config.its_cutoff) {
            Ok(series) => {
                its = run_its_outcomes(&series, config, &mut failures);
                its_series = Some(series);
            }
            Err(err) => {
                for &outcome in &config.outcomes {
                    failures.record("ITS", outcome, &err);
                }
            }
        }
    }

    let mut did = Vec::new();
    let mut did_pre_post = Vec::new();
    if request.run_did {
        match did_series(records, request, config) {
            Ok((treated, control)) => {
                for &outcome in &config.outcomes {
                    match fit_did(&treated, &control, outcome, config.did_cutoff, alpha) {
                        Ok(res) => {
                            if res.parallel_trends_violated() {
                                warn!(
                                    outcome = outcome.column(),
                                    p_value = res.parallel_trends.interaction.p_value,
                                    "parallel-trends pre-test rejects; DID estimate is unreliable"
                                );
                            }
                            info!(
                                outcome = outcome.column(),
                                att = res.att(),
                                control = %res.control_label,
                                "DID complete"
                            );
                            did.push(res);
                        }
                        Err(err) => failures.record("DID", outcome, &err),
                    }
                    match pre_post_difference(&treated, outcome) {
                        Ok(d) => did_pre_post.push(d),
                        Err(err) => failures.record("PrePost", outcome, &err),
                    }
                }
            }
            Err(err) => {
                for &outcome in &config.outcomes {
                    failures.record("DID", outcome, &err);
                }
            }
        }
    }

    let its_summaries = its
        .iter()
        .map(|o: &ItsOutput| ItsSummary {
            row: its_row(&o.result, o.placebo.as_ref(), alpha),
            pre_post: o.pre_post.clone(),
            placebo: o.placebo.as_ref().map(placebo_summary),
        })
        .collect();
    let did_summaries = did.iter().map(|d| did_summary(d, alpha)).collect();
    let summary = RunSummary::new(config.clone(), its_summaries, did_summaries, failures.entries);

    Ok(RunOutput {
        its_series,
        its,
        did,
        did_pre_post,
        summary,
        first_error: failures.first,
    })
}

fn run_its_outcomes(series: &Series, config: &AnalysisConfig, failures: &mut Failures) -> Vec<ItsOutput> {
    let settings = PlaceboSettings::from_config(config);
    let mut out = Vec::new();

    for &outcome in &config.outcomes {
        let result = match fit_its(series, outcome, config.newey_west_lags) {
            Ok(r) => r,
            Err(err) => {
                failures.record("ITS", outcome, &err);
                continue;
            }
        };
        let pre_post = match pre_post_difference(series, outcome) {
            Ok(d) => d,
            Err(err) => {
                failures.record("PrePost", outcome, &err);
                continue;
            }
        };
        let placebo = match run_placebo(series, outcome, result.level_change(), &settings) {
            Ok(dist) => Some(dist),
            Err(err) => {
                failures.record("Placebo", outcome, &err);
                None
            }
        };
        info!(
            outcome = outcome.column(),
            level_change = result.level_change(),
            slope_change = result.slope_change(),
            placebo_p = placebo.as_ref().map(|p| p.p_value),
            "ITS complete"
        );
        out.push(ItsOutput {
            result,
            placebo,
            pre_post,
        });
    }
    out
}

/// Treated and control series at the DID cutoff.
fn did_series(
    records: &[Observation],
    request: &AnalysisRequest,
    config: &AnalysisConfig,
) -> Result<(Series, Series), AnalysisError> {
    let treated = build_series(records, &request.treated, request.aggregation, config.did_cutoff)?;
    let internet_type = request.treated.internet_type;

    let control = match request.controls.as_slice() {
        [] => {
            return Err(AnalysisError::InvalidConfig(
                "DID needs at least one control country".into(),
            ));
        }
        [single] => build_series(
            records,
            &Population::new(single.clone(), internet_type),
            request.aggregation,
            config.did_cutoff,
        )?,
        many => {
            let label = format!("Pooled({})", many.join("+"));
            let pooled = pool_mean(records, many, request.aggregation, internet_type, &label)?;
            build_series(
                &pooled,
                &Population::new(label, internet_type),
                request.aggregation,
                config.did_cutoff,
            )?
        }
    };
    Ok((treated, control))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SampleSpec, generate_panel};
    use crate::domain::{InternetType, Outcome};

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            treated: Population::new("Azerbaijan", InternetType::Fixed),
            aggregation: Aggregation::Median,
            controls: vec!["Georgia".into()],
            run_its: true,
            run_did: true,
        }
    }

    #[test]
    fn sample_panel_runs_every_analysis() {
        let records = generate_panel(&SampleSpec::default()).unwrap();
        let out = run_analyses(&records, &request(), &AnalysisConfig::default()).unwrap();

        assert_eq!(out.its.len(), 2);
        assert_eq!(out.did.len(), 2);
        assert!(out.summary.failures.is_empty(), "{:?}", out.summary.failures);
        assert!(out.its.iter().all(|o| o.placebo.is_some()));
        assert!(out.failure().is_none());

        let bundle = out.export_bundle();
        assert_eq!(bundle.its_rows.len(), 2);
        assert_eq!(bundle.placebo.len(), 2);
        assert_eq!(bundle.pre_post.len(), 4);
        assert_eq!(bundle.time_series.unwrap().columns.len(), 6);
    }

    #[test]
    fn placebo_survives_any_seed_on_sample_panel() {
        let records = generate_panel(&SampleSpec::default()).unwrap();
        let req = AnalysisRequest {
            run_did: false,
            ..request()
        };
        for placebo_seed in 0..24 {
            let config = AnalysisConfig {
                placebo_seed,
                ..AnalysisConfig::default()
            };
            let out = run_analyses(&records, &req, &config).unwrap();
            assert!(out.summary.failures.is_empty(), "seed {placebo_seed}: {:?}", out.summary.failures);
            assert!(out.its.iter().all(|o| o.placebo.is_some()));
        }
    }

    #[test]
    fn missing_control_fails_did_only() {
        let records = generate_panel(&SampleSpec::default()).unwrap();
        let req = AnalysisRequest {
            controls: vec!["Atlantis".into()],
            ..request()
        };
        let out = run_analyses(&records, &req, &AnalysisConfig::default()).unwrap();

        assert_eq!(out.its.len(), 2);
        assert!(out.did.is_empty());
        assert_eq!(out.summary.failures.len(), 2);
        assert!(out.summary.failures.iter().all(|f| f.analysis == "DID"));
        assert!(!out.all_failed());
    }

    #[test]
    fn pooled_controls_keep_two_groups() {
        let records = generate_panel(&SampleSpec::default()).unwrap();
        let req = AnalysisRequest {
            controls: vec!["Georgia".into(), "Armenia".into(), "Turkey".into()],
            run_its: false,
            ..request()
        };
        let config = AnalysisConfig {
            outcomes: vec![Outcome::Download],
            ..AnalysisConfig::default()
        };
        let out = run_analyses(&records, &req, &config).unwrap();
        assert_eq!(out.did.len(), 1);
        assert_eq!(out.did[0].control_label, "Pooled(Georgia+Armenia+Turkey) (fixed)");
    }

    #[test]
    fn every_failure_surfaces_an_error() {
        let records = generate_panel(&SampleSpec::default()).unwrap();
        let req = AnalysisRequest {
            treated: Population::new("Nowhere", InternetType::Fixed),
            ..request()
        };
        let out = run_analyses(&records, &req, &AnalysisConfig::default()).unwrap();
        assert!(out.all_failed());
        let err = out.failure().unwrap();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn invalid_config_aborts() {
        let records = generate_panel(&SampleSpec::default()).unwrap();
        let config = AnalysisConfig {
            significance: 1.5,
            ..AnalysisConfig::default()
        };
        let err = run_analyses(&records, &request(), &config).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
