use crate::models::{RiskLevel, RiskPrediction};
use crate::policy::AlgorithmPolicy;

/// Where the student sits relative to their previous prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationState {
    NoPriorPrediction,
    Stable,
    Escalating,
    DeEscalating,
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationDecision {
    pub notify: bool,
    pub state: NotificationState,
}

/// Decides whether the new prediction warrants a teacher notification.
///
/// Every risk-level transition upward is surfaced; score noise below the
/// policy's re-trigger delta at an unchanged level is suppressed. A prior
/// prediction computed under a different algorithm version is not comparable
/// and is treated as absent, which conservatively notifies.
pub fn decide(
    new_score: f64,
    new_level: RiskLevel,
    algorithm_version: &str,
    prior: Option<&RiskPrediction>,
    policy: &AlgorithmPolicy,
) -> NotificationDecision {
    let prior = match prior {
        Some(p) if p.algorithm_version == algorithm_version => p,
        _ => {
            return NotificationDecision {
                notify: true,
                state: NotificationState::NoPriorPrediction,
            }
        }
    };

    if new_level > prior.risk_level {
        NotificationDecision {
            notify: true,
            state: NotificationState::Escalating,
        }
    } else if new_level < prior.risk_level {
        NotificationDecision {
            notify: false,
            state: NotificationState::DeEscalating,
        }
    } else {
        NotificationDecision {
            notify: new_score - prior.risk_score >= policy.notify_delta,
            state: NotificationState::Stable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::builtin_v1;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn prior(score: f64, level: RiskLevel, version: &str) -> RiskPrediction {
        RiskPrediction {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            risk_score: score,
            risk_level: level,
            contributing_factors: Vec::new(),
            algorithm_version: version.to_string(),
            evaluated_at: Utc::now(),
            as_of: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            recommendation: "monitor".to_string(),
            teacher_notified: true,
        }
    }

    #[test]
    fn first_prediction_always_notifies() {
        let decision = decide(10.0, RiskLevel::Low, "heuristic_v1", None, &builtin_v1());
        assert!(decision.notify);
        assert_eq!(decision.state, NotificationState::NoPriorPrediction);
    }

    #[test]
    fn cross_version_prior_is_treated_as_absent() {
        let old = prior(10.0, RiskLevel::Low, "heuristic_v0");
        let decision = decide(10.0, RiskLevel::Low, "heuristic_v1", Some(&old), &builtin_v1());
        assert!(decision.notify);
        assert_eq!(decision.state, NotificationState::NoPriorPrediction);
    }

    #[test]
    fn every_level_increase_notifies() {
        let policy = builtin_v1();
        let steps = [
            (RiskLevel::Low, RiskLevel::Medium),
            (RiskLevel::Medium, RiskLevel::High),
            (RiskLevel::High, RiskLevel::Critical),
        ];
        for (from, to) in steps {
            let old = prior(20.0, from, "heuristic_v1");
            let decision = decide(60.0, to, "heuristic_v1", Some(&old), &policy);
            assert!(decision.notify, "{from:?} -> {to:?} must notify");
            assert_eq!(decision.state, NotificationState::Escalating);
        }
    }

    #[test]
    fn small_score_drift_at_same_level_is_suppressed() {
        let old = prior(52.0, RiskLevel::Medium, "heuristic_v1");
        let decision = decide(53.0, RiskLevel::Medium, "heuristic_v1", Some(&old), &builtin_v1());
        assert!(!decision.notify);
        assert_eq!(decision.state, NotificationState::Stable);
    }

    #[test]
    fn score_jump_at_same_level_renotifies() {
        let old = prior(52.0, RiskLevel::Medium, "heuristic_v1");
        let decision = decide(57.0, RiskLevel::Medium, "heuristic_v1", Some(&old), &builtin_v1());
        assert!(decision.notify);
    }

    #[test]
    fn level_decrease_never_notifies() {
        let old = prior(80.0, RiskLevel::Critical, "heuristic_v1");
        let decision = decide(40.0, RiskLevel::Medium, "heuristic_v1", Some(&old), &builtin_v1());
        assert!(!decision.notify);
        assert_eq!(decision.state, NotificationState::DeEscalating);
    }

    #[test]
    fn decrease_then_same_step_does_not_renotify() {
        let policy = builtin_v1();
        let dropped = prior(40.0, RiskLevel::Medium, "heuristic_v1");
        let decision = decide(41.0, RiskLevel::Medium, "heuristic_v1", Some(&dropped), &policy);
        assert!(!decision.notify);
        assert_eq!(decision.state, NotificationState::Stable);
    }
}
