use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    AttendanceRecord, BullyingIncident, EnrollmentRecord, GradeRecord, GuardianProfile,
    RawStudentData, RiskFactorEntry, RiskPrediction,
};

/// Read surface into the collaborator record store. Implementations return
/// empty collections, never errors, when a student simply has no records.
#[async_trait]
pub trait CollaboratorStore: Send + Sync {
    async fn attendance_in_window(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, EngineError>;

    async fn grades_in_window(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<GradeRecord>, EngineError>;

    /// Bullying incidents where the student is the victim.
    async fn incidents_in_window(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BullyingIncident>, EngineError>;

    async fn risk_factors_in_window(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RiskFactorEntry>, EngineError>;

    async fn guardian_profile(
        &self,
        student_id: Uuid,
    ) -> Result<Option<GuardianProfile>, EngineError>;

    async fn enrollment(&self, student_id: Uuid) -> Result<Option<EnrollmentRecord>, EngineError>;
}

/// Append-only write surface for prediction records. History is never
/// overwritten: each run appends and `latest_for` returns the most recent.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    async fn append(&self, prediction: &RiskPrediction) -> Result<(), EngineError>;

    async fn latest_for(&self, student_id: Uuid) -> Result<Option<RiskPrediction>, EngineError>;
}

#[derive(Default)]
struct MemoryInner {
    attendance: HashMap<Uuid, Vec<AttendanceRecord>>,
    grades: HashMap<Uuid, Vec<GradeRecord>>,
    incidents: HashMap<Uuid, Vec<BullyingIncident>>,
    risk_factors: HashMap<Uuid, Vec<RiskFactorEntry>>,
    guardians: HashMap<Uuid, GuardianProfile>,
    enrollments: HashMap<Uuid, EnrollmentRecord>,
    predictions: Vec<RiskPrediction>,
}

/// In-memory implementation of both store surfaces. Used by the test suite
/// and handy for embedding the engine without a database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_attendance(&self, student_id: Uuid, record: AttendanceRecord) {
        self.lock().attendance.entry(student_id).or_default().push(record);
    }

    pub fn add_grade(&self, student_id: Uuid, record: GradeRecord) {
        self.lock().grades.entry(student_id).or_default().push(record);
    }

    pub fn add_incident(&self, student_id: Uuid, incident: BullyingIncident) {
        self.lock().incidents.entry(student_id).or_default().push(incident);
    }

    pub fn add_risk_factor(&self, student_id: Uuid, entry: RiskFactorEntry) {
        self.lock().risk_factors.entry(student_id).or_default().push(entry);
    }

    pub fn set_guardian(&self, student_id: Uuid, guardian: GuardianProfile) {
        self.lock().guardians.insert(student_id, guardian);
    }

    pub fn set_enrollment(&self, student_id: Uuid, enrollment: EnrollmentRecord) {
        self.lock().enrollments.insert(student_id, enrollment);
    }

    /// Loads a whole fixture bundle for one student.
    pub fn load_student(&self, student_id: Uuid, raw: RawStudentData) {
        let mut inner = self.lock();
        inner.attendance.entry(student_id).or_default().extend(raw.attendance);
        inner.grades.entry(student_id).or_default().extend(raw.grades);
        inner.incidents.entry(student_id).or_default().extend(raw.incidents);
        inner
            .risk_factors
            .entry(student_id)
            .or_default()
            .extend(raw.risk_factors);
        if let Some(guardian) = raw.guardian {
            inner.guardians.insert(student_id, guardian);
        }
        if let Some(enrollment) = raw.enrollment {
            inner.enrollments.insert(student_id, enrollment);
        }
    }

    /// Full append-only prediction history for one student, oldest first.
    pub fn predictions_for(&self, student_id: Uuid) -> Vec<RiskPrediction> {
        self.lock()
            .predictions
            .iter()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // Lock poisoning only happens when a test panicked mid-write.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CollaboratorStore for MemoryStore {
    async fn attendance_in_window(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, EngineError> {
        Ok(self
            .lock()
            .attendance
            .get(&student_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.date >= from && r.date <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn grades_in_window(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<GradeRecord>, EngineError> {
        Ok(self
            .lock()
            .grades
            .get(&student_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.recorded_on >= from && r.recorded_on <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn incidents_in_window(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BullyingIncident>, EngineError> {
        Ok(self
            .lock()
            .incidents
            .get(&student_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.occurred_on >= from && r.occurred_on <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn risk_factors_in_window(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RiskFactorEntry>, EngineError> {
        Ok(self
            .lock()
            .risk_factors
            .get(&student_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.opened_on >= from && r.opened_on <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn guardian_profile(
        &self,
        student_id: Uuid,
    ) -> Result<Option<GuardianProfile>, EngineError> {
        Ok(self.lock().guardians.get(&student_id).cloned())
    }

    async fn enrollment(&self, student_id: Uuid) -> Result<Option<EnrollmentRecord>, EngineError> {
        Ok(self.lock().enrollments.get(&student_id).cloned())
    }
}

#[async_trait]
impl PredictionStore for MemoryStore {
    async fn append(&self, prediction: &RiskPrediction) -> Result<(), EngineError> {
        self.lock().predictions.push(prediction.clone());
        Ok(())
    }

    async fn latest_for(&self, student_id: Uuid) -> Result<Option<RiskPrediction>, EngineError> {
        Ok(self
            .lock()
            .predictions
            .iter()
            .rev()
            .find(|p| p.student_id == student_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendanceStatus, RiskLevel};
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn prediction(student_id: Uuid, score: f64) -> RiskPrediction {
        RiskPrediction {
            id: Uuid::new_v4(),
            student_id,
            risk_score: score,
            risk_level: RiskLevel::Low,
            contributing_factors: Vec::new(),
            algorithm_version: "heuristic_v1".to_string(),
            evaluated_at: Utc::now(),
            as_of: date(2026, 3, 1),
            recommendation: "monitor".to_string(),
            teacher_notified: false,
        }
    }

    #[tokio::test]
    async fn unknown_student_yields_empty_collections() {
        let store = MemoryStore::new();
        let records = store
            .attendance_in_window(Uuid::new_v4(), date(2026, 1, 1), date(2026, 3, 1))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn window_bounds_are_inclusive() {
        let store = MemoryStore::new();
        let student = Uuid::new_v4();
        for day in [date(2026, 1, 1), date(2026, 2, 1), date(2026, 3, 1)] {
            store.add_attendance(
                student,
                AttendanceRecord {
                    date: day,
                    status: AttendanceStatus::Present,
                },
            );
        }
        let records = store
            .attendance_in_window(student, date(2026, 1, 1), date(2026, 2, 1))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn latest_prediction_is_the_most_recent_append() {
        let store = MemoryStore::new();
        let student = Uuid::new_v4();
        store.append(&prediction(student, 10.0)).await.unwrap();
        store.append(&prediction(student, 20.0)).await.unwrap();
        store.append(&prediction(Uuid::new_v4(), 99.0)).await.unwrap();

        let latest = store.latest_for(student).await.unwrap().unwrap();
        assert_eq!(latest.risk_score, 20.0);
        assert_eq!(store.predictions_for(student).len(), 2);
    }
}
