use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{FactorDomain, RiskLevel};

/// Allowed drift when checking that domain weights sum to 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Score boundaries for the ordinal risk levels. Each boundary is inclusive
/// on the lower edge: a score equal to `medium` is already medium risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

/// Tunables consumed by the factor scorers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringParams {
    /// Unexcused-absence rate above which the behavioral scorer escalates.
    pub unexcused_rate_threshold: f64,
}

/// Versioned, immutable scoring configuration. A policy is never edited
/// after publication; new behavior means a new version, so historical
/// predictions stay reproducible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmPolicy {
    pub version: String,
    pub weights: BTreeMap<FactorDomain, f64>,
    pub thresholds: RiskThresholds,
    /// Minimum score increase required to re-notify at an unchanged level.
    pub notify_delta: f64,
    pub scoring: ScoringParams,
}

impl AlgorithmPolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.weights.is_empty() {
            anyhow::bail!("policy {:?} has an empty weight table", self.version);
        }
        for (domain, weight) in &self.weights {
            if *weight < 0.0 {
                anyhow::bail!("policy {:?} has negative weight for {domain}", self.version);
            }
        }
        let sum: f64 = self.weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            anyhow::bail!(
                "policy {:?} weights sum to {sum}, expected 1.0",
                self.version
            );
        }
        let t = &self.thresholds;
        if !(0.0 < t.medium && t.medium < t.high && t.high < t.critical && t.critical <= 100.0) {
            anyhow::bail!("policy {:?} thresholds are not strictly ascending", self.version);
        }
        if self.notify_delta < 0.0 {
            anyhow::bail!("policy {:?} has a negative notify delta", self.version);
        }
        Ok(())
    }

    /// Pure step function from score to level, lower edge inclusive.
    pub fn risk_level_for(&self, score: f64) -> RiskLevel {
        if score >= self.thresholds.critical {
            RiskLevel::Critical
        } else if score >= self.thresholds.high {
            RiskLevel::High
        } else if score >= self.thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// The first published heuristic policy. Weights favor the academic and
/// attendance signals, mirroring how dropout cases surfaced historically.
pub fn builtin_v1() -> AlgorithmPolicy {
    let mut weights = BTreeMap::new();
    weights.insert(FactorDomain::Economic, 0.10);
    weights.insert(FactorDomain::Family, 0.10);
    weights.insert(FactorDomain::Academic, 0.30);
    weights.insert(FactorDomain::Social, 0.20);
    weights.insert(FactorDomain::Health, 0.05);
    weights.insert(FactorDomain::Behavioral, 0.25);

    AlgorithmPolicy {
        version: "heuristic_v1".to_string(),
        weights,
        thresholds: RiskThresholds {
            medium: 25.0,
            high: 50.0,
            critical: 75.0,
        },
        notify_delta: 5.0,
        scoring: ScoringParams {
            unexcused_rate_threshold: 0.10,
        },
    }
}

/// Lookup table of published policies plus the current default version.
pub struct PolicyRegistry {
    policies: HashMap<String, AlgorithmPolicy>,
    default_version: String,
}

impl PolicyRegistry {
    pub fn with_builtin() -> Self {
        let builtin = builtin_v1();
        let default_version = builtin.version.clone();
        let mut policies = HashMap::new();
        policies.insert(builtin.version.clone(), builtin);
        PolicyRegistry {
            policies,
            default_version,
        }
    }

    /// Publishes a policy. Re-registering an existing version is rejected:
    /// published policies are immutable.
    pub fn register(&mut self, policy: AlgorithmPolicy) -> anyhow::Result<()> {
        policy.validate()?;
        if self.policies.contains_key(&policy.version) {
            anyhow::bail!("policy version {:?} is already published", policy.version);
        }
        self.policies.insert(policy.version.clone(), policy);
        Ok(())
    }

    pub fn set_default(&mut self, version: &str) -> anyhow::Result<()> {
        if !self.policies.contains_key(version) {
            anyhow::bail!("cannot default to unpublished policy {version:?}");
        }
        self.default_version = version.to_string();
        Ok(())
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    pub fn get(&self, version: &str) -> Result<&AlgorithmPolicy, EngineError> {
        self.policies
            .get(version)
            .ok_or_else(|| EngineError::UnknownPolicyVersion(version.to_string()))
    }

    /// Resolves an explicit version or falls back to the current default.
    pub fn resolve(&self, version: Option<&str>) -> Result<&AlgorithmPolicy, EngineError> {
        self.get(version.unwrap_or(&self.default_version))
    }

    /// Loads additional policies from a JSON file (an array of policies).
    /// The last entry becomes the default.
    pub fn load_file(&mut self, path: &Path) -> anyhow::Result<usize> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read policy file {}", path.display()))?;
        let policies: Vec<AlgorithmPolicy> =
            serde_json::from_str(&raw).context("failed to parse policy file")?;
        let count = policies.len();
        let mut last_version = None;
        for policy in policies {
            last_version = Some(policy.version.clone());
            self.register(policy)?;
        }
        if let Some(version) = last_version {
            self.set_default(&version)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_policy_is_valid() {
        builtin_v1().validate().unwrap();
    }

    #[test]
    fn builtin_weights_sum_to_one() {
        let sum: f64 = builtin_v1().weights.values().sum();
        assert!((sum - 1.0).abs() <= WEIGHT_TOLERANCE);
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let mut policy = builtin_v1();
        policy.weights.insert(FactorDomain::Academic, 0.5);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn rejects_unordered_thresholds() {
        let mut policy = builtin_v1();
        policy.thresholds.high = policy.thresholds.critical + 1.0;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn level_boundaries_are_lower_edge_inclusive() {
        let policy = builtin_v1();
        assert_eq!(policy.risk_level_for(0.0), RiskLevel::Low);
        assert_eq!(policy.risk_level_for(24.99), RiskLevel::Low);
        assert_eq!(policy.risk_level_for(25.0), RiskLevel::Medium);
        assert_eq!(policy.risk_level_for(50.0), RiskLevel::High);
        assert_eq!(policy.risk_level_for(74.99), RiskLevel::High);
        assert_eq!(policy.risk_level_for(75.0), RiskLevel::Critical);
        assert_eq!(policy.risk_level_for(100.0), RiskLevel::Critical);
    }

    #[test]
    fn level_is_monotone_in_score() {
        let policy = builtin_v1();
        let mut prev = policy.risk_level_for(0.0);
        for step in 1..=1000 {
            let level = policy.risk_level_for(step as f64 / 10.0);
            assert!(level >= prev);
            prev = level;
        }
    }

    #[test]
    fn registry_rejects_duplicate_versions() {
        let mut registry = PolicyRegistry::with_builtin();
        assert!(registry.register(builtin_v1()).is_err());
    }

    #[test]
    fn unknown_version_surfaces_error() {
        let registry = PolicyRegistry::with_builtin();
        assert!(matches!(
            registry.resolve(Some("nope")),
            Err(EngineError::UnknownPolicyVersion(_))
        ));
    }

    #[test]
    fn resolve_defaults_to_builtin() {
        let registry = PolicyRegistry::with_builtin();
        let policy = registry.resolve(None).unwrap();
        assert_eq!(policy.version, "heuristic_v1");
    }
}
