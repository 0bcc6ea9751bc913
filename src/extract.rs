use chrono::{Duration, NaiveDate};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    AcademicSignals, AttendanceSignals, EducationLevel, FactorDomain, HouseholdSignals,
    IncomeRange, RawStudentData, SocialSignals, StudentSnapshot, TransportMethod,
};

/// Builds the immutable per-run snapshot from fetched collaborator records.
///
/// Pure given its inputs: the store fetch already restricts records to the
/// window, and the same restriction is applied again here so the function
/// behaves identically on unfiltered fixtures. Missing data per domain
/// degrades to neutral or absent signals; only a total lack of attendance
/// records aborts the evaluation.
pub fn build_snapshot(
    student_id: Uuid,
    as_of: NaiveDate,
    window_days: i64,
    raw: RawStudentData,
) -> Result<StudentSnapshot, EngineError> {
    let cutoff = as_of - Duration::days(window_days.max(1));
    let in_window = |date: NaiveDate| date >= cutoff && date <= as_of;

    let attendance: Vec<_> = raw
        .attendance
        .iter()
        .filter(|r| in_window(r.date))
        .collect();
    if attendance.is_empty() {
        return Err(EngineError::InsufficientData(student_id));
    }
    let total = attendance.len() as f64;
    let attended = attendance.iter().filter(|r| r.status.attended()).count() as f64;
    let unexcused = attendance
        .iter()
        .filter(|r| !r.status.attended() && !matches!(r.status, crate::models::AttendanceStatus::ExcusedAbsence))
        .count() as f64;
    let attendance = AttendanceSignals {
        rate: attended / total,
        unexcused_rate: unexcused / total,
        records: total as u32,
    };

    let mut grades: Vec<_> = raw
        .grades
        .iter()
        .filter(|g| in_window(g.recorded_on))
        .collect();
    grades.sort_by_key(|g| g.recorded_on);
    let academic = if grades.is_empty() {
        warn!(%student_id, "no grade records in window, academic domain excluded");
        None
    } else {
        let values: Vec<f64> = grades.iter().map(|g| g.percentage).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let trend_delta = linear_slope(&values) * (values.len().saturating_sub(1)) as f64;
        Some(AcademicSignals {
            mean_percentage: mean,
            trend_delta,
            records: values.len() as u32,
        })
    };

    let incidents: Vec<_> = raw
        .incidents
        .iter()
        .filter(|i| in_window(i.occurred_on))
        .collect();
    let social = SocialSignals {
        incidents: incidents.len() as u32,
        high_severity: incidents
            .iter()
            .filter(|i| i.severity == crate::models::Severity::High)
            .count() as u32,
        unresolved: incidents.iter().filter(|i| !i.resolved).count() as u32,
    };

    let open_entries = |domain: FactorDomain| {
        raw.risk_factors
            .iter()
            .filter(|e| e.domain == domain && !e.resolved && in_window(e.opened_on))
            .cloned()
            .collect::<Vec<_>>()
    };
    let behavioral_entries = open_entries(FactorDomain::Behavioral);
    let health_entries = open_entries(FactorDomain::Health);

    let household = match &raw.guardian {
        None => {
            warn!(%student_id, "no guardian profile, economic and family domains excluded");
            None
        }
        Some(guardian) => {
            let income = guardian.income.unwrap_or_else(|| {
                warn!(%student_id, "guardian income missing, defaulting to medium");
                IncomeRange::Medium
            });
            let education = guardian.education.unwrap_or_else(|| {
                warn!(%student_id, "guardian education missing, defaulting to secondary");
                EducationLevel::Secondary
            });
            let (distance, transport) = match &raw.enrollment {
                Some(e) => (
                    e.distance_to_school_km.unwrap_or_else(|| {
                        warn!(%student_id, "distance to school missing, defaulting to 5 km");
                        5.0
                    }),
                    e.transport.unwrap_or(TransportMethod::PublicTransport),
                ),
                None => (5.0, TransportMethod::PublicTransport),
            };
            Some(HouseholdSignals {
                income,
                education,
                relationship: guardian.relationship,
                distance_to_school_km: distance,
                transport,
            })
        }
    };

    debug!(
        %student_id,
        attendance_rate = attendance.rate,
        grade_records = academic.as_ref().map(|a| a.records).unwrap_or(0),
        incidents = social.incidents,
        "snapshot built"
    );

    Ok(StudentSnapshot {
        student_id,
        as_of,
        window_days,
        class_name: raw.enrollment.as_ref().map(|e| e.class_name.clone()),
        enrollment_status: raw.enrollment.as_ref().map(|e| e.status),
        class_repetitions: raw
            .enrollment
            .as_ref()
            .map(|e| e.class_repetitions)
            .unwrap_or(0),
        attendance,
        academic,
        social,
        household,
        behavioral_entries,
        health_entries,
    })
}

/// Least-squares slope over equally spaced observations. Used for the grade
/// trend so the decline signal reflects the whole window, not the last score.
pub fn linear_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
    let denom = n * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}
