//! Plain-text terminal rendering of a [`RunSummary`].

use crate::report::{DidSummary, ItsSummary, RunSummary};

/// Format the full run summary (config + ITS + DID + failures).
pub fn format_run_summary(summary: &RunSummary, source: &str) -> String {
    let cfg = &summary.config;
    let mut out = String::new();

    out.push_str("=== azimpact - Azerbaijan speed policy impact ===\n");
    out.push_str(&format!("Input: {source}\n"));
    out.push_str(&format!(
        "ITS cutoff: {} | DID cutoff: {} | α={}\n",
        cfg.its_cutoff, cfg.did_cutoff, cfg.significance
    ));
    out.push_str(&format!(
        "Newey-West lags: {} | placebo: {} draws, seed {}, buffer {} months\n",
        cfg.newey_west_lags, cfg.placebo_iterations, cfg.placebo_seed, cfg.placebo_buffer_months
    ));

    if !summary.its.is_empty() {
        out.push_str("\nInterrupted time series:\n");
        for s in &summary.its {
            out.push_str(&format_its_summary(s));
        }
    }

    if !summary.did.is_empty() {
        out.push_str("\nDifference-in-differences:\n");
        if summary.any_parallel_trends_violated() {
            out.push_str("  WARNING: parallel-trends pre-test rejects for at least one outcome; those ATTs are unreliable\n");
        }
        for d in &summary.did {
            out.push_str(&format_did_summary(d));
        }
    }

    if !summary.failures.is_empty() {
        out.push_str("\nFailed analyses:\n");
        for f in &summary.failures {
            out.push_str(&format!("  {:<6} {:<16} {}\n", f.analysis, f.variable, f.error));
        }
    }

    out
}

pub fn format_its_summary(s: &ItsSummary) -> String {
    let r = &s.row;
    let mut out = String::new();
    out.push_str(&format!("  [{}] n={} cutoff={}\n", r.variable, r.n_obs, r.cutoff));
    out.push_str(&format!(
        "    {:<22} {:>10} {:>10} {:>9}\n",
        "term", "estimate", "hac_se", "p"
    ));
    for (name, est, se, p) in [
        ("intercept", r.intercept, r.intercept_se, r.intercept_p),
        ("time_index", r.time_coef, r.time_se, r.time_p),
        ("level_change", r.level_change, r.level_change_se, r.level_change_p),
        ("slope_change", r.slope_change, r.slope_change_se, r.slope_change_p),
    ] {
        out.push_str(&format!("    {name:<22} {est:>10.4} {se:>10.4} {p:>9.4}\n"));
    }
    out.push_str(&format!(
        "    R²={:.4} adj R²={:.4} DW={:.3} (p={:.4})\n",
        r.r_squared, r.adj_r_squared, r.durbin_watson, r.durbin_watson_p
    ));
    match &s.placebo {
        Some(p) => out.push_str(&format!(
            "    placebo: p={:.3} ({} draws over {} eligible dates)\n",
            p.p_value, p.iterations, p.eligible_dates
        )),
        None => out.push_str("    placebo: not available\n"),
    }
    let d = &s.pre_post;
    out.push_str(&format!(
        "    pre mean {:.3} -> post mean {:.3} ({:+.3}, {:+.1}%)\n",
        d.pre_mean, d.post_mean, d.absolute_diff, d.relative_diff_pct
    ));
    out.push_str(&format!("    {}\n", r.interpretation));
    out
}

pub fn format_did_summary(d: &DidSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("  [{}] {} vs {}\n", d.variable, d.treated, d.control));
    out.push_str(&format!(
        "    {:<40} {:>10} {:>10} {:>9} {:>22}\n",
        "term", "estimate", "hc1_se", "p", "95% CI"
    ));
    for row in &d.rows {
        out.push_str(&format!(
            "    {:<40} {:>10.4} {:>10.4} {:>9.4} {:>22}\n",
            row.name,
            row.estimate,
            row.std_error,
            row.p_value,
            format!("[{:.3}, {:.3}]", row.ci_low, row.ci_high),
        ));
    }
    out.push_str(&format!("    manual ATT {:.4}\n", d.manual_att));
    if d.parallel_trends_violated {
        out.push_str("    WARNING: parallel-trends assumption violated\n");
    }
    if let Some(reason) = &d.parallel_trends_unavailable {
        out.push_str(&format!("    parallel-trends pre-test unavailable: {reason}\n"));
    }
    out.push_str(&format!("    {}\n", d.interpretation));
    out
}
