//! Dropout risk scoring engine for a school monitoring system.
//!
//! Turns a student's accumulated attendance, academic, behavioral and
//! household history into a reproducible 0-100 risk score, an ordinal risk
//! level, a ranked list of contributing factors and an intervention
//! recommendation, and decides whether a teacher must be notified. Scoring
//! is versioned through immutable [`policy::AlgorithmPolicy`] values so
//! historical predictions stay interpretable as the algorithm evolves.

pub mod aggregate;
pub mod db;
pub mod engine;
pub mod error;
pub mod extract;
pub mod models;
pub mod notify;
pub mod policy;
pub mod recommend;
pub mod report;
pub mod scorers;
pub mod store;

pub use engine::{BatchOutcome, Engine};
pub use error::EngineError;
pub use models::{FactorDomain, RiskLevel, RiskPrediction, StudentSnapshot};
pub use policy::{AlgorithmPolicy, PolicyRegistry};
pub use store::{CollaboratorStore, MemoryStore, PredictionStore};
