use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    AttendanceRecord, BullyingIncident, EnrollmentRecord, GradeRecord, GuardianProfile,
    RiskFactorEntry, RiskPrediction,
};
use crate::store::{CollaboratorStore, PredictionStore};

/// Postgres-backed implementation of both store surfaces.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Students eligible for a batch run.
    pub async fn active_students(&self) -> Result<Vec<Uuid>, EngineError> {
        let rows = sqlx::query(
            "SELECT id FROM dropout_engine.students WHERE enrollment_status = 'active'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::store)?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    pub async fn seed(&self) -> anyhow::Result<()> {
        let guardians = vec![
            (
                Uuid::parse_str("7b0f2c4e-5b7c-4f0d-9a44-1f4f3f2d6a01")?,
                "Grace Banda",
                Some("low"),
                Some("primary"),
                "parent",
            ),
            (
                Uuid::parse_str("b3a91d52-8c1e-4f4e-bb7e-2a6f9d0c4e02")?,
                "Peter Phiri",
                Some("medium"),
                Some("secondary"),
                "relative",
            ),
        ];
        for (id, name, income, education, relationship) in guardians {
            sqlx::query(
                r#"
                INSERT INTO dropout_engine.guardians
                (id, full_name, income_range, education_level, relationship)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(id)
            .bind(name)
            .bind(income)
            .bind(education)
            .bind(relationship)
            .execute(&self.pool)
            .await?;
        }

        let students = vec![
            (
                Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
                "Chikondi",
                "Mwale",
                "Standard 6",
                Uuid::parse_str("7b0f2c4e-5b7c-4f0d-9a44-1f4f3f2d6a01")?,
                6.5_f64,
                "walking",
                1_i32,
            ),
            (
                Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
                "Tamanda",
                "Gondwe",
                "Standard 7",
                Uuid::parse_str("b3a91d52-8c1e-4f4e-bb7e-2a6f9d0c4e02")?,
                1.2_f64,
                "bicycle",
                0_i32,
            ),
        ];
        for (id, first, last, class, guardian_id, distance, transport, repetitions) in students {
            sqlx::query(
                r#"
                INSERT INTO dropout_engine.students
                (id, first_name, last_name, current_class, enrollment_status,
                 guardian_id, distance_to_school_km, transport, class_repetitions)
                VALUES ($1, $2, $3, $4, 'active', $5, $6, $7, $8)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(id)
            .bind(first)
            .bind(last)
            .bind(class)
            .bind(guardian_id)
            .bind(distance)
            .bind(transport)
            .bind(repetitions)
            .execute(&self.pool)
            .await?;
        }

        let first_student = Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?;
        let second_student = Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?;
        let base = NaiveDate::from_ymd_opt(2026, 2, 2).context("invalid date")?;

        for offset in 0..20 {
            let date = base + chrono::Duration::days(offset);
            let status = if offset % 3 == 0 {
                "unexcused_absence"
            } else {
                "present"
            };
            sqlx::query(
                r#"
                INSERT INTO dropout_engine.attendance_records (id, student_id, date, status)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (student_id, date) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(first_student)
            .bind(date)
            .bind(status)
            .execute(&self.pool)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO dropout_engine.attendance_records (id, student_id, date, status)
                VALUES ($1, $2, $3, 'present')
                ON CONFLICT (student_id, date) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(second_student)
            .bind(date)
            .execute(&self.pool)
            .await?;
        }

        let grades = vec![
            (first_student, 0_i64, 58.0_f64),
            (first_student, 7, 49.0),
            (first_student, 14, 41.0),
            (second_student, 0, 74.0),
            (second_student, 7, 76.0),
            (second_student, 14, 75.0),
        ];
        for (student, offset, percentage) in grades {
            sqlx::query(
                r#"
                INSERT INTO dropout_engine.academic_results
                (id, student_id, recorded_on, subject, percentage)
                VALUES ($1, $2, $3, 'mathematics', $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(student)
            .bind(base + chrono::Duration::days(offset))
            .bind(percentage)
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO dropout_engine.bullying_incidents
            (id, victim_student_id, occurred_on, severity, resolved)
            VALUES ($1, $2, $3, 'high', false)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(first_student)
        .bind(base + chrono::Duration::days(10))
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO dropout_engine.risk_factor_notes
            (id, student_id, opened_on, domain, severity, resolved, note)
            VALUES ($1, $2, $3, 'health', 'medium', false, 'Referred to the clinic for recurring illness')
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(first_student)
        .bind(base + chrono::Duration::days(5))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Imports attendance records from a CSV with columns
    /// `student_id,date,status`. Re-imports are idempotent per student/day.
    pub async fn import_attendance_csv(&self, csv_path: &std::path::Path) -> anyhow::Result<usize> {
        #[derive(serde::Deserialize)]
        struct CsvRow {
            student_id: Uuid,
            date: NaiveDate,
            status: String,
        }

        let mut reader = csv::Reader::from_path(csv_path)?;
        let mut inserted = 0usize;

        for result in reader.deserialize::<CsvRow>() {
            let row = result?;
            // Validate the status against the known vocabulary before insert.
            row.status
                .parse::<crate::models::AttendanceStatus>()
                .with_context(|| format!("row for student {}", row.student_id))?;

            let result = sqlx::query(
                r#"
                INSERT INTO dropout_engine.attendance_records (id, student_id, date, status)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (student_id, date) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(row.student_id)
            .bind(row.date)
            .bind(&row.status)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        Ok(inserted)
    }
}

#[async_trait]
impl CollaboratorStore for PgStore {
    async fn attendance_in_window(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT date, status FROM dropout_engine.attendance_records
            WHERE student_id = $1 AND date >= $2 AND date <= $3
            ORDER BY date
            "#,
        )
        .bind(student_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::store)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(AttendanceRecord {
                date: row.get("date"),
                status: row
                    .get::<String, _>("status")
                    .parse()
                    .map_err(EngineError::store)?,
            });
        }
        Ok(records)
    }

    async fn grades_in_window(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<GradeRecord>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT recorded_on, subject, percentage FROM dropout_engine.academic_results
            WHERE student_id = $1 AND recorded_on >= $2 AND recorded_on <= $3
            ORDER BY recorded_on
            "#,
        )
        .bind(student_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::store)?;

        Ok(rows
            .iter()
            .map(|row| GradeRecord {
                recorded_on: row.get("recorded_on"),
                subject: row.get("subject"),
                percentage: row.get("percentage"),
            })
            .collect())
    }

    async fn incidents_in_window(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BullyingIncident>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT occurred_on, severity, resolved FROM dropout_engine.bullying_incidents
            WHERE victim_student_id = $1 AND occurred_on >= $2 AND occurred_on <= $3
            ORDER BY occurred_on
            "#,
        )
        .bind(student_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::store)?;

        let mut incidents = Vec::with_capacity(rows.len());
        for row in rows {
            incidents.push(BullyingIncident {
                occurred_on: row.get("occurred_on"),
                severity: row
                    .get::<String, _>("severity")
                    .parse()
                    .map_err(EngineError::store)?,
                resolved: row.get("resolved"),
            });
        }
        Ok(incidents)
    }

    async fn risk_factors_in_window(
        &self,
        student_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RiskFactorEntry>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT opened_on, domain, severity, resolved, note
            FROM dropout_engine.risk_factor_notes
            WHERE student_id = $1 AND opened_on >= $2 AND opened_on <= $3
            ORDER BY opened_on
            "#,
        )
        .bind(student_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::store)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(RiskFactorEntry {
                opened_on: row.get("opened_on"),
                domain: row
                    .get::<String, _>("domain")
                    .parse()
                    .map_err(EngineError::store)?,
                severity: row
                    .get::<String, _>("severity")
                    .parse()
                    .map_err(EngineError::store)?,
                resolved: row.get("resolved"),
                note: row.get("note"),
            });
        }
        Ok(entries)
    }

    async fn guardian_profile(
        &self,
        student_id: Uuid,
    ) -> Result<Option<GuardianProfile>, EngineError> {
        let row = sqlx::query(
            r#"
            SELECT g.income_range, g.education_level, g.relationship
            FROM dropout_engine.guardians g
            JOIN dropout_engine.students s ON s.guardian_id = g.id
            WHERE s.id = $1
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(EngineError::store)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let income = row
            .get::<Option<String>, _>("income_range")
            .map(|s| s.parse())
            .transpose()
            .map_err(EngineError::store)?;
        let education = row
            .get::<Option<String>, _>("education_level")
            .map(|s| s.parse())
            .transpose()
            .map_err(EngineError::store)?;
        Ok(Some(GuardianProfile {
            income,
            education,
            relationship: row
                .get::<String, _>("relationship")
                .parse()
                .map_err(EngineError::store)?,
        }))
    }

    async fn enrollment(&self, student_id: Uuid) -> Result<Option<EnrollmentRecord>, EngineError> {
        let row = sqlx::query(
            r#"
            SELECT current_class, enrollment_status, distance_to_school_km,
                   transport, class_repetitions
            FROM dropout_engine.students
            WHERE id = $1
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(EngineError::store)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let transport = row
            .get::<Option<String>, _>("transport")
            .map(|s| s.parse())
            .transpose()
            .map_err(EngineError::store)?;
        Ok(Some(EnrollmentRecord {
            class_name: row.get("current_class"),
            status: row
                .get::<String, _>("enrollment_status")
                .parse()
                .map_err(EngineError::store)?,
            distance_to_school_km: row.get("distance_to_school_km"),
            transport,
            class_repetitions: row.get::<i32, _>("class_repetitions") as u32,
        }))
    }
}

#[async_trait]
impl PredictionStore for PgStore {
    async fn append(&self, prediction: &RiskPrediction) -> Result<(), EngineError> {
        let factors =
            serde_json::to_string(&prediction.contributing_factors).map_err(EngineError::store)?;
        sqlx::query(
            r#"
            INSERT INTO dropout_engine.risk_predictions
            (id, student_id, risk_score, risk_level, contributing_factors,
             algorithm_version, evaluated_at, as_of, recommendation, teacher_notified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(prediction.id)
        .bind(prediction.student_id)
        .bind(prediction.risk_score)
        .bind(prediction.risk_level.as_str())
        .bind(factors)
        .bind(&prediction.algorithm_version)
        .bind(prediction.evaluated_at)
        .bind(prediction.as_of)
        .bind(&prediction.recommendation)
        .bind(prediction.teacher_notified)
        .execute(&self.pool)
        .await
        .map_err(EngineError::store)?;
        Ok(())
    }

    async fn latest_for(&self, student_id: Uuid) -> Result<Option<RiskPrediction>, EngineError> {
        let row = sqlx::query(
            r#"
            SELECT id, student_id, risk_score, risk_level, contributing_factors,
                   algorithm_version, evaluated_at, as_of, recommendation, teacher_notified
            FROM dropout_engine.risk_predictions
            WHERE student_id = $1
            ORDER BY evaluated_at DESC
            LIMIT 1
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(EngineError::store)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(RiskPrediction {
            id: row.get("id"),
            student_id: row.get("student_id"),
            risk_score: row.get("risk_score"),
            risk_level: row
                .get::<String, _>("risk_level")
                .parse()
                .map_err(EngineError::store)?,
            contributing_factors: serde_json::from_str(row.get::<String, _>("contributing_factors").as_str())
                .map_err(EngineError::store)?,
            algorithm_version: row.get("algorithm_version"),
            evaluated_at: row.get("evaluated_at"),
            as_of: row.get("as_of"),
            recommendation: row.get("recommendation"),
            teacher_notified: row.get("teacher_notified"),
        }))
    }
}
