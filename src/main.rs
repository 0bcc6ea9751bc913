use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use dropout_risk_engine::db::PgStore;
use dropout_risk_engine::store::{CollaboratorStore, PredictionStore};
use dropout_risk_engine::{report, Engine, PolicyRegistry};

#[derive(Parser)]
#[command(name = "dropout-risk-engine")]
#[command(about = "Dropout risk scoring engine for the school monitoring system", long_about = None)]
struct Cli {
    /// Optional JSON file with additional algorithm policies.
    #[arg(long, global = true)]
    policies: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import attendance records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Evaluate dropout risk for a single student
    Evaluate {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        policy: Option<String>,
        #[arg(long, default_value_t = 90)]
        window_days: i64,
    },
    /// Evaluate all active students and optionally write a markdown report
    Batch {
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        policy: Option<String>,
        #[arg(long, default_value_t = 90)]
        window_days: i64,
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = Arc::new(PgStore::new(pool));

    let mut policies = PolicyRegistry::with_builtin();
    if let Some(path) = &cli.policies {
        let loaded = policies.load_file(path)?;
        println!("Loaded {loaded} policies from {}.", path.display());
    }

    match cli.command {
        Commands::InitDb => {
            store.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            store.seed().await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = store.import_attendance_csv(&csv).await?;
            println!("Inserted {inserted} attendance records from {}.", csv.display());
        }
        Commands::Evaluate {
            student,
            as_of,
            policy,
            window_days,
        } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            let engine = Engine::new(
                Arc::clone(&store) as Arc<dyn CollaboratorStore>,
                Arc::clone(&store) as Arc<dyn PredictionStore>,
                policies,
            )
            .with_window_days(window_days);

            let prediction = engine.evaluate(student, as_of, policy.as_deref()).await?;
            println!(
                "Student {} scored {:.2} ({}) under {} as of {}.",
                prediction.student_id,
                prediction.risk_score,
                prediction.risk_level,
                prediction.algorithm_version,
                prediction.as_of
            );
            println!(
                "Teacher notified: {}.",
                if prediction.teacher_notified { "yes" } else { "no" }
            );
            for factor in &prediction.contributing_factors {
                println!("- {} (contribution {:.0}%)", factor.domain, factor.weight * 100.0);
            }
            println!("Recommendation: {}", prediction.recommendation);
        }
        Commands::Batch {
            as_of,
            policy,
            window_days,
            concurrency,
            report: report_path,
        } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            let students = store.active_students().await?;
            if students.is_empty() {
                println!("No active students found.");
                return Ok(());
            }

            let engine = Arc::new(
                Engine::new(
                    Arc::clone(&store) as Arc<dyn CollaboratorStore>,
                    Arc::clone(&store) as Arc<dyn PredictionStore>,
                    policies,
                )
                .with_window_days(window_days)
                .with_concurrency(concurrency),
            );
            let version = engine.policies().resolve(policy.as_deref())?.version.clone();

            // Ctrl-C stops the run between student evaluations; in-flight
            // students finish so no partial prediction is ever persisted.
            let cancel = Arc::new(AtomicBool::new(false));
            let cancel_on_signal = Arc::clone(&cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel_on_signal.store(true, Ordering::SeqCst);
                }
            });

            let outcome = engine
                .evaluate_batch(students, as_of, policy.as_deref(), cancel)
                .await?;

            println!(
                "Batch complete: {} scored, {} failed, {} skipped in {:.1}s.",
                outcome.predictions.len(),
                outcome.failures.len(),
                outcome.skipped.len(),
                outcome.duration.as_secs_f64()
            );
            for failure in &outcome.failures {
                println!("- failed {}: {}", failure.student_id, failure.error);
            }

            if let Some(out) = report_path {
                let rendered = report::build_report(as_of, &version, &outcome);
                std::fs::write(&out, rendered)?;
                println!("Report written to {}.", out.display());
            }
        }
    }

    Ok(())
}
