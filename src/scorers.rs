use crate::models::{
    FactorDomain, FactorScore, IncomeRange, Severity, StudentSnapshot, TransportMethod,
};
use crate::policy::ScoringParams;

/// Runs every domain scorer against the snapshot, in domain order. Domains
/// with no underlying data (academic without grades, economic/family without
/// a guardian profile) are omitted; the aggregator re-normalizes around them.
pub fn score_all(snapshot: &StudentSnapshot, params: &ScoringParams) -> Vec<FactorScore> {
    let mut scores = Vec::with_capacity(6);
    if let Some(score) = score_economic(snapshot) {
        scores.push(score);
    }
    if let Some(score) = score_family(snapshot) {
        scores.push(score);
    }
    if let Some(score) = score_academic(snapshot) {
        scores.push(score);
    }
    scores.push(score_social(snapshot));
    scores.push(score_health(snapshot));
    scores.push(score_behavioral(snapshot, params));
    scores
}

/// Academic risk from the grade level and trend. A sustained decline weighs
/// as much as a deeply depressed average; repetition history adds on top.
pub fn score_academic(snapshot: &StudentSnapshot) -> Option<FactorScore> {
    let academic = snapshot.academic.as_ref()?;
    let deficit = ((70.0 - academic.mean_percentage) * 1.25).clamp(0.0, 50.0);
    let decline = (-academic.trend_delta * 2.5).clamp(0.0, 50.0);
    let repetition = (snapshot.class_repetitions as f64 * 10.0).min(20.0);
    let score = (deficit + decline + repetition).min(100.0);

    let severity = if academic.mean_percentage < 40.0 || academic.trend_delta < -15.0 {
        Severity::High
    } else if score >= 30.0 {
        Severity::Medium
    } else {
        Severity::Low
    };

    let mut justification = format!(
        "average {:.0}% across {} grade records, trend {:+.1} points over the window",
        academic.mean_percentage, academic.records, academic.trend_delta
    );
    if snapshot.class_repetitions > 0 {
        justification.push_str(&format!(
            ", {} class repetition(s)",
            snapshot.class_repetitions
        ));
    }

    Some(FactorScore {
        domain: FactorDomain::Academic,
        score,
        severity,
        justification,
    })
}

/// Attendance-driven behavioral risk. Always present: attendance is the
/// mandatory minimum signal. The unexcused-absence rate escalates both the
/// score and the severity once it crosses the policy threshold.
pub fn score_behavioral(snapshot: &StudentSnapshot, params: &ScoringParams) -> FactorScore {
    let attendance = &snapshot.attendance;
    let shortfall = ((1.0 - attendance.rate) * 150.0).clamp(0.0, 100.0);
    let unexcused_penalty = if attendance.unexcused_rate > params.unexcused_rate_threshold {
        25.0
    } else {
        0.0
    };
    let entry_points: f64 = snapshot
        .behavioral_entries
        .iter()
        .map(|e| match e.severity {
            Severity::Low => 5.0,
            Severity::Medium => 10.0,
            Severity::High => 20.0,
        })
        .sum();
    let score = (shortfall + unexcused_penalty + entry_points).min(100.0);

    let has_high_entry = snapshot
        .behavioral_entries
        .iter()
        .any(|e| e.severity == Severity::High);
    let severity = if attendance.unexcused_rate > params.unexcused_rate_threshold * 2.0
        || has_high_entry
    {
        Severity::High
    } else if attendance.unexcused_rate > params.unexcused_rate_threshold
        || !snapshot.behavioral_entries.is_empty()
        || attendance.rate < 0.8
    {
        Severity::Medium
    } else {
        Severity::Low
    };

    let mut justification = format!(
        "attendance {:.0}% over {} records, unexcused absence rate {:.0}%",
        attendance.rate * 100.0,
        attendance.records,
        attendance.unexcused_rate * 100.0
    );
    if !snapshot.behavioral_entries.is_empty() {
        justification.push_str(&format!(
            ", {} open behavioral note(s)",
            snapshot.behavioral_entries.len()
        ));
    }

    FactorScore {
        domain: FactorDomain::Behavioral,
        score,
        severity,
        justification,
    }
}

/// Social risk from bullying victimization. Zero incidents is a neutral
/// signal, not missing data. Unresolved incidents raise severity one level.
pub fn score_social(snapshot: &StudentSnapshot) -> FactorScore {
    let social = &snapshot.social;
    if social.incidents == 0 {
        return FactorScore {
            domain: FactorDomain::Social,
            score: 0.0,
            severity: Severity::Low,
            justification: "no bullying incidents recorded in the window".to_string(),
        };
    }

    let lower_severity = social.incidents - social.high_severity;
    let score = (social.high_severity as f64 * 30.0
        + lower_severity as f64 * 15.0
        + social.unresolved as f64 * 10.0)
        .min(100.0);

    let base = if social.high_severity > 0 {
        Severity::High
    } else if social.incidents >= 2 {
        Severity::Medium
    } else {
        Severity::Low
    };
    let severity = if social.unresolved > 0 {
        base.escalate()
    } else {
        base
    };

    FactorScore {
        domain: FactorDomain::Social,
        score,
        severity,
        justification: format!(
            "{} bullying incident(s) as victim ({} high severity, {} unresolved)",
            social.incidents, social.high_severity, social.unresolved
        ),
    }
}

/// Economic risk from household income and the commute. Long walking
/// commutes contribute on top of a low income range.
pub fn score_economic(snapshot: &StudentSnapshot) -> Option<FactorScore> {
    let household = snapshot.household.as_ref()?;
    let income_points: f64 = match household.income {
        IncomeRange::Low => 40.0,
        IncomeRange::Medium => 15.0,
        IncomeRange::High => 0.0,
    };
    let distance = household.distance_to_school_km;
    let commute_points = match household.transport {
        TransportMethod::Walking if distance > 5.0 => 25.0,
        TransportMethod::Walking if distance > 3.0 => 12.0,
        _ if distance > 7.0 => 10.0,
        _ => 0.0,
    };
    let score = (income_points + commute_points).min(100.0);

    let severity = if score >= 50.0 {
        Severity::High
    } else if score >= 25.0 {
        Severity::Medium
    } else {
        Severity::Low
    };

    Some(FactorScore {
        domain: FactorDomain::Economic,
        score,
        severity,
        justification: format!(
            "household income {}, {:.1} km to school by {}",
            household.income.as_str(),
            distance,
            household.transport.as_str()
        ),
    })
}

/// Family risk from guardian education and non-parent guardianship.
pub fn score_family(snapshot: &StudentSnapshot) -> Option<FactorScore> {
    let household = snapshot.household.as_ref()?;
    let education_points: f64 = match household.education {
        crate::models::EducationLevel::NoFormal => 30.0,
        crate::models::EducationLevel::Primary => 20.0,
        crate::models::EducationLevel::Secondary => 10.0,
        crate::models::EducationLevel::Tertiary => 0.0,
    };
    let guardianship_points = match household.relationship {
        crate::models::GuardianRelationship::Parent => 0.0,
        _ => 25.0,
    };
    let score = (education_points + guardianship_points).min(100.0);

    let severity = if score >= 45.0 {
        Severity::High
    } else if score >= 20.0 {
        Severity::Medium
    } else {
        Severity::Low
    };

    Some(FactorScore {
        domain: FactorDomain::Family,
        score,
        severity,
        justification: format!(
            "guardian education {}, relationship {}",
            household.education.as_str(),
            household.relationship.as_str()
        ),
    })
}

/// Health risk from open health-tagged risk factor entries.
pub fn score_health(snapshot: &StudentSnapshot) -> FactorScore {
    let entries = &snapshot.health_entries;
    let score: f64 = entries
        .iter()
        .map(|e| match e.severity {
            Severity::Low => 15.0,
            Severity::Medium => 30.0,
            Severity::High => 45.0,
        })
        .sum::<f64>()
        .min(100.0);
    let severity = entries
        .iter()
        .map(|e| e.severity)
        .max()
        .unwrap_or(Severity::Low);

    let justification = if entries.is_empty() {
        "no open health concerns".to_string()
    } else {
        format!("{} open health concern(s)", entries.len())
    };

    FactorScore {
        domain: FactorDomain::Health,
        score,
        severity,
        justification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AcademicSignals, AttendanceSignals, EducationLevel, GuardianRelationship,
        HouseholdSignals, RiskFactorEntry, SocialSignals, StudentSnapshot,
    };
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn params() -> ScoringParams {
        ScoringParams {
            unexcused_rate_threshold: 0.10,
        }
    }

    fn base_snapshot() -> StudentSnapshot {
        StudentSnapshot {
            student_id: Uuid::new_v4(),
            as_of: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            window_days: 30,
            class_name: Some("Standard 6".to_string()),
            enrollment_status: None,
            class_repetitions: 0,
            attendance: AttendanceSignals {
                rate: 0.98,
                unexcused_rate: 0.0,
                records: 30,
            },
            academic: None,
            social: SocialSignals::default(),
            household: None,
            behavioral_entries: Vec::new(),
            health_entries: Vec::new(),
        }
    }

    fn health_entry(severity: Severity) -> RiskFactorEntry {
        RiskFactorEntry {
            opened_on: NaiveDate::from_ymd_opt(2026, 2, 20).unwrap(),
            domain: FactorDomain::Health,
            severity,
            resolved: false,
            note: "referred to clinic".to_string(),
        }
    }

    #[test]
    fn academic_absent_without_grades() {
        assert!(score_academic(&base_snapshot()).is_none());
    }

    #[test]
    fn stable_average_grades_score_zero() {
        let mut snapshot = base_snapshot();
        snapshot.academic = Some(AcademicSignals {
            mean_percentage: 75.0,
            trend_delta: 0.0,
            records: 3,
        });
        let score = score_academic(&snapshot).unwrap();
        assert_eq!(score.score, 0.0);
        assert_eq!(score.severity, Severity::Low);
    }

    #[test]
    fn sustained_decline_is_high_severity() {
        let mut snapshot = base_snapshot();
        snapshot.academic = Some(AcademicSignals {
            mean_percentage: 55.0,
            trend_delta: -20.0,
            records: 3,
        });
        let score = score_academic(&snapshot).unwrap();
        assert_eq!(score.severity, Severity::High);
        assert!(score.score > 50.0);
    }

    #[test]
    fn low_average_is_high_severity_even_when_flat() {
        let mut snapshot = base_snapshot();
        snapshot.academic = Some(AcademicSignals {
            mean_percentage: 35.0,
            trend_delta: 0.0,
            records: 4,
        });
        assert_eq!(score_academic(&snapshot).unwrap().severity, Severity::High);
    }

    #[test]
    fn repetitions_add_to_academic_score() {
        let mut snapshot = base_snapshot();
        snapshot.academic = Some(AcademicSignals {
            mean_percentage: 70.0,
            trend_delta: 0.0,
            records: 3,
        });
        let without = score_academic(&snapshot).unwrap().score;
        snapshot.class_repetitions = 2;
        let with = score_academic(&snapshot).unwrap().score;
        assert_eq!(with - without, 20.0);
    }

    #[test]
    fn strong_attendance_scores_near_zero() {
        let score = score_behavioral(&base_snapshot(), &params());
        assert!(score.score < 5.0);
        assert_eq!(score.severity, Severity::Low);
    }

    #[test]
    fn unexcused_rate_above_threshold_escalates() {
        let mut snapshot = base_snapshot();
        snapshot.attendance = AttendanceSignals {
            rate: 0.60,
            unexcused_rate: 0.40,
            records: 20,
        };
        let score = score_behavioral(&snapshot, &params());
        assert_eq!(score.score, 85.0);
        assert_eq!(score.severity, Severity::High);
    }

    #[test]
    fn rate_just_under_threshold_stays_unescalated() {
        let mut snapshot = base_snapshot();
        snapshot.attendance = AttendanceSignals {
            rate: 0.92,
            unexcused_rate: 0.08,
            records: 25,
        };
        let score = score_behavioral(&snapshot, &params());
        assert!((score.score - 12.0).abs() < 1e-9);
    }

    #[test]
    fn zero_incidents_is_neutral_social() {
        let score = score_social(&base_snapshot());
        assert_eq!(score.score, 0.0);
        assert_eq!(score.severity, Severity::Low);
    }

    #[test]
    fn unresolved_high_incidents_score_heavily() {
        let mut snapshot = base_snapshot();
        snapshot.social = SocialSignals {
            incidents: 2,
            high_severity: 2,
            unresolved: 2,
        };
        let score = score_social(&snapshot);
        assert_eq!(score.score, 80.0);
        assert_eq!(score.severity, Severity::High);
    }

    #[test]
    fn unresolved_incident_escalates_severity_one_level() {
        let mut snapshot = base_snapshot();
        snapshot.social = SocialSignals {
            incidents: 1,
            high_severity: 0,
            unresolved: 1,
        };
        assert_eq!(score_social(&snapshot).severity, Severity::Medium);
    }

    #[test]
    fn economic_absent_without_household() {
        assert!(score_economic(&base_snapshot()).is_none());
        assert!(score_family(&base_snapshot()).is_none());
    }

    #[test]
    fn long_walking_commute_adds_risk() {
        let mut snapshot = base_snapshot();
        snapshot.household = Some(HouseholdSignals {
            income: IncomeRange::Low,
            education: EducationLevel::Primary,
            relationship: GuardianRelationship::Parent,
            distance_to_school_km: 8.0,
            transport: TransportMethod::Walking,
        });
        let score = score_economic(&snapshot).unwrap();
        assert_eq!(score.score, 65.0);
        assert_eq!(score.severity, Severity::High);
    }

    #[test]
    fn short_bus_commute_is_income_only() {
        let mut snapshot = base_snapshot();
        snapshot.household = Some(HouseholdSignals {
            income: IncomeRange::Medium,
            education: EducationLevel::Secondary,
            relationship: GuardianRelationship::Parent,
            distance_to_school_km: 2.0,
            transport: TransportMethod::PublicTransport,
        });
        assert_eq!(score_economic(&snapshot).unwrap().score, 15.0);
    }

    #[test]
    fn non_parent_guardian_raises_family_score() {
        let mut snapshot = base_snapshot();
        snapshot.household = Some(HouseholdSignals {
            income: IncomeRange::Medium,
            education: EducationLevel::Primary,
            relationship: GuardianRelationship::Relative,
            distance_to_school_km: 1.0,
            transport: TransportMethod::Walking,
        });
        let score = score_family(&snapshot).unwrap();
        assert_eq!(score.score, 45.0);
        assert_eq!(score.severity, Severity::High);
    }

    #[test]
    fn health_score_sums_open_entries() {
        let mut snapshot = base_snapshot();
        snapshot.health_entries = vec![health_entry(Severity::Medium), health_entry(Severity::High)];
        let score = score_health(&snapshot);
        assert_eq!(score.score, 75.0);
        assert_eq!(score.severity, Severity::High);
    }

    #[test]
    fn no_health_entries_is_neutral() {
        let score = score_health(&base_snapshot());
        assert_eq!(score.score, 0.0);
        assert_eq!(score.severity, Severity::Low);
    }

    #[test]
    fn score_all_skips_absent_domains() {
        let scores = score_all(&base_snapshot(), &params());
        let domains: Vec<FactorDomain> = scores.iter().map(|s| s.domain).collect();
        assert_eq!(
            domains,
            vec![
                FactorDomain::Social,
                FactorDomain::Health,
                FactorDomain::Behavioral
            ]
        );
    }

    #[test]
    fn all_scores_stay_in_range() {
        let mut snapshot = base_snapshot();
        snapshot.attendance = AttendanceSignals {
            rate: 0.0,
            unexcused_rate: 1.0,
            records: 30,
        };
        snapshot.social = SocialSignals {
            incidents: 20,
            high_severity: 20,
            unresolved: 20,
        };
        snapshot.health_entries = (0..10).map(|_| health_entry(Severity::High)).collect();
        for score in score_all(&snapshot, &params()) {
            assert!(
                (0.0..=100.0).contains(&score.score),
                "{} out of range: {}",
                score.domain,
                score.score
            );
        }
    }
}
