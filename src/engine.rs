use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{Duration, NaiveDate, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate;
use crate::error::EngineError;
use crate::extract;
use crate::models::{RawStudentData, RiskPrediction};
use crate::notify;
use crate::policy::PolicyRegistry;
use crate::recommend;
use crate::scorers;
use crate::store::{CollaboratorStore, PredictionStore};

pub const DEFAULT_WINDOW_DAYS: i64 = 90;
pub const DEFAULT_CONCURRENCY: usize = 8;

/// The scoring pipeline: snapshot extraction through prediction write.
///
/// Holds no mutable scoring state; a prediction is always recomputable from
/// the snapshot and the policy version it references. The only synchronized
/// resource is the per-student write lock that keeps the notification
/// decider's prior-prediction read consistent with the write compared
/// against it.
pub struct Engine {
    records: Arc<dyn CollaboratorStore>,
    predictions: Arc<dyn PredictionStore>,
    policies: PolicyRegistry,
    window_days: i64,
    concurrency: usize,
    write_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub student_id: Uuid,
    pub error: EngineError,
}

/// Partitioned outcome of a batch run. The run always completes; individual
/// student failures land in `failures` instead of aborting the batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub predictions: Vec<RiskPrediction>,
    pub failures: Vec<BatchFailure>,
    /// Students not started because cancellation was requested.
    pub skipped: Vec<Uuid>,
    pub duration: std::time::Duration,
}

enum TaskResult {
    Done(Box<RiskPrediction>),
    Failed(Uuid, EngineError),
    Skipped(Uuid),
}

impl Engine {
    pub fn new(
        records: Arc<dyn CollaboratorStore>,
        predictions: Arc<dyn PredictionStore>,
        policies: PolicyRegistry,
    ) -> Self {
        Engine {
            records,
            predictions,
            policies,
            window_days: DEFAULT_WINDOW_DAYS,
            concurrency: DEFAULT_CONCURRENCY,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_window_days(mut self, days: i64) -> Self {
        self.window_days = days.max(1);
        self
    }

    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    /// Evaluates one student and appends the resulting prediction.
    ///
    /// The prediction is written only after the full pipeline succeeds, so a
    /// failed evaluation never leaves a partial record behind.
    pub async fn evaluate(
        &self,
        student_id: Uuid,
        as_of: NaiveDate,
        policy_version: Option<&str>,
    ) -> Result<RiskPrediction, EngineError> {
        let policy = self.policies.resolve(policy_version)?;
        let from = as_of - Duration::days(self.window_days);

        let raw = RawStudentData {
            attendance: self
                .records
                .attendance_in_window(student_id, from, as_of)
                .await?,
            grades: self.records.grades_in_window(student_id, from, as_of).await?,
            incidents: self
                .records
                .incidents_in_window(student_id, from, as_of)
                .await?,
            risk_factors: self
                .records
                .risk_factors_in_window(student_id, from, as_of)
                .await?,
            guardian: self.records.guardian_profile(student_id).await?,
            enrollment: self.records.enrollment(student_id).await?,
        };

        let snapshot = extract::build_snapshot(student_id, as_of, self.window_days, raw)?;
        let scores = scorers::score_all(&snapshot, &policy.scoring);
        let result = aggregate::aggregate(&scores, policy);
        let recommendation = recommend::recommend(result.risk_level, &result.ranked_factors);

        // Serialize the prior-read and the append per student so the decider
        // always compares against the write that actually precedes this one.
        // Different students never contend here.
        let lock = self.write_lock(student_id);
        let _guard = lock.lock().await;

        let prior = self.predictions.latest_for(student_id).await?;
        let decision = notify::decide(
            result.risk_score,
            result.risk_level,
            &policy.version,
            prior.as_ref(),
            policy,
        );

        let prediction = RiskPrediction {
            id: Uuid::new_v4(),
            student_id,
            risk_score: result.risk_score,
            risk_level: result.risk_level,
            contributing_factors: result.ranked_factors,
            algorithm_version: policy.version.clone(),
            evaluated_at: Utc::now(),
            as_of,
            recommendation,
            teacher_notified: decision.notify,
        };
        self.predictions.append(&prediction).await?;

        info!(
            %student_id,
            risk_score = prediction.risk_score,
            risk_level = %prediction.risk_level,
            notified = prediction.teacher_notified,
            state = ?decision.state,
            "prediction recorded"
        );
        Ok(prediction)
    }

    /// Evaluates a batch of students on a bounded worker pool.
    ///
    /// Students are independent; each worker owns one student's pipeline and
    /// no mutable state is shared. Cancellation is honored between student
    /// evaluations: an in-flight student runs to completion, students not
    /// yet started are skipped. An unknown policy version is fatal for the
    /// whole invocation; everything else is a per-student failure.
    pub async fn evaluate_batch(
        self: Arc<Self>,
        student_ids: Vec<Uuid>,
        as_of: NaiveDate,
        policy_version: Option<&str>,
        cancel: Arc<AtomicBool>,
    ) -> Result<BatchOutcome, EngineError> {
        let version = self.policies.resolve(policy_version)?.version.clone();
        let started = Instant::now();
        info!(
            students = student_ids.len(),
            policy = %version,
            %as_of,
            "batch evaluation started"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for student_id in student_ids {
            let engine = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            let cancel = Arc::clone(&cancel);
            let version = version.clone();
            tasks.spawn(async move {
                // Semaphore closure is unreachable: it lives as long as
                // every task.
                let _permit = semaphore.acquire_owned().await.ok();
                if cancel.load(Ordering::SeqCst) {
                    return TaskResult::Skipped(student_id);
                }
                match engine.evaluate(student_id, as_of, Some(&version)).await {
                    Ok(prediction) => TaskResult::Done(Box::new(prediction)),
                    Err(error) => TaskResult::Failed(student_id, error),
                }
            });
        }

        let mut outcome = BatchOutcome {
            predictions: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            duration: std::time::Duration::ZERO,
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TaskResult::Done(prediction)) => outcome.predictions.push(*prediction),
                Ok(TaskResult::Failed(student_id, error)) => {
                    warn!(%student_id, %error, "student evaluation failed");
                    outcome.failures.push(BatchFailure { student_id, error });
                }
                Ok(TaskResult::Skipped(student_id)) => outcome.skipped.push(student_id),
                Err(join_error) => {
                    warn!(%join_error, "evaluation task panicked");
                }
            }
        }

        outcome.duration = started.elapsed();
        info!(
            succeeded = outcome.predictions.len(),
            failed = outcome.failures.len(),
            skipped = outcome.skipped.len(),
            duration_ms = outcome.duration.as_millis() as u64,
            "batch evaluation finished"
        );
        Ok(outcome)
    }

    fn write_lock(&self, student_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .write_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(student_id).or_default())
    }
}
