use std::fmt::Write;

use chrono::NaiveDate;

use crate::engine::BatchOutcome;
use crate::models::{RiskLevel, RiskPrediction};

/// Counts predictions per risk level, highest level first.
pub fn risk_distribution(predictions: &[RiskPrediction]) -> Vec<(RiskLevel, usize)> {
    let levels = [
        RiskLevel::Critical,
        RiskLevel::High,
        RiskLevel::Medium,
        RiskLevel::Low,
    ];
    levels
        .iter()
        .map(|level| {
            (
                *level,
                predictions.iter().filter(|p| p.risk_level == *level).count(),
            )
        })
        .collect()
}

/// Renders a markdown summary of one batch run.
pub fn build_report(as_of: NaiveDate, policy_version: &str, outcome: &BatchOutcome) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Dropout Risk Batch Report");
    let _ = writeln!(
        output,
        "Evaluated as of {} under policy {} ({} scored, {} failed, {} skipped, {:.1}s)",
        as_of,
        policy_version,
        outcome.predictions.len(),
        outcome.failures.len(),
        outcome.skipped.len(),
        outcome.duration.as_secs_f64()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Distribution");
    if outcome.predictions.is_empty() {
        let _ = writeln!(output, "No students scored in this run.");
    } else {
        for (level, count) in risk_distribution(&outcome.predictions) {
            let _ = writeln!(output, "- {}: {} student(s)", level, count);
        }
    }

    let mut ranked = outcome.predictions.clone();
    ranked.sort_by(|a, b| {
        b.risk_score
            .partial_cmp(&a.risk_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");
    if ranked.is_empty() {
        let _ = writeln!(output, "No students scored in this run.");
    } else {
        for prediction in ranked.iter().take(10) {
            let top_factor = prediction
                .contributing_factors
                .first()
                .map(|f| f.domain.as_str())
                .unwrap_or("none");
            let _ = writeln!(
                output,
                "- {} score {:.2} ({}) top factor {}",
                prediction.student_id, prediction.risk_score, prediction.risk_level, top_factor
            );
        }
    }

    let notified: Vec<&RiskPrediction> = ranked.iter().filter(|p| p.teacher_notified).collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Teacher Notifications");
    if notified.is_empty() {
        let _ = writeln!(output, "No notifications raised by this run.");
    } else {
        for prediction in notified {
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                prediction.student_id, prediction.risk_level, prediction.recommendation
            );
        }
    }

    if !outcome.failures.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Failures");
        for failure in &outcome.failures {
            let _ = writeln!(output, "- {}: {}", failure.student_id, failure.error);
        }
    }

    output
}
