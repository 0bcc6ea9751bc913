use crate::models::{ContributingFactor, FactorScore, RiskLevel};
use crate::policy::AlgorithmPolicy;

/// Output of combining domain sub-scores under a policy.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub ranked_factors: Vec<ContributingFactor>,
}

/// Combines domain sub-scores into the final score, level and ranked
/// contributing-factors list.
///
/// Only domains present in both the score list and the policy weight table
/// participate; the participating weights are re-normalized to sum to 1.0 so
/// missing data never silently depresses the score. Ranking is by
/// contribution (normalized weight x sub-score) descending, ties broken by
/// severity descending, then domain declaration order.
pub fn aggregate(scores: &[FactorScore], policy: &AlgorithmPolicy) -> Aggregate {
    let included: Vec<(&FactorScore, f64)> = scores
        .iter()
        .filter_map(|s| policy.weights.get(&s.domain).map(|w| (s, *w)))
        .collect();

    let weight_sum: f64 = included.iter().map(|(_, w)| w).sum();
    if included.is_empty() || weight_sum <= 0.0 {
        return Aggregate {
            risk_score: 0.0,
            risk_level: policy.risk_level_for(0.0),
            ranked_factors: Vec::new(),
        };
    }

    let mut contributions: Vec<(&FactorScore, f64, f64)> = included
        .into_iter()
        .map(|(score, weight)| {
            let normalized = weight / weight_sum;
            (score, normalized, normalized * score.score)
        })
        .collect();

    let raw_score: f64 = contributions.iter().map(|(_, _, c)| c).sum();
    let risk_score = round2(raw_score);
    let risk_level = policy.risk_level_for(risk_score);

    contributions.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.0.severity.cmp(&a.0.severity))
            .then(a.0.domain.cmp(&b.0.domain))
    });

    let contribution_total: f64 = contributions.iter().map(|(_, _, c)| c).sum();
    let ranked_factors = contributions
        .iter()
        .map(|(score, normalized, contribution)| ContributingFactor {
            domain: score.domain,
            // Contribution share; falls back to the re-normalized domain
            // weight when every sub-score is zero so the list still sums
            // to 1.0.
            weight: if contribution_total > 0.0 {
                contribution / contribution_total
            } else {
                *normalized
            },
        })
        .collect();

    Aggregate {
        risk_score,
        risk_level,
        ranked_factors,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FactorDomain, Severity};
    use crate::policy::builtin_v1;

    fn factor(domain: FactorDomain, score: f64, severity: Severity) -> FactorScore {
        FactorScore {
            domain,
            score,
            severity,
            justification: String::new(),
        }
    }

    #[test]
    fn weighted_sum_over_all_domains() {
        let scores: Vec<FactorScore> = FactorDomain::ALL
            .iter()
            .map(|d| factor(*d, 50.0, Severity::Medium))
            .collect();
        let result = aggregate(&scores, &builtin_v1());
        assert!((result.risk_score - 50.0).abs() < 1e-9);
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[test]
    fn missing_domain_renormalizes_instead_of_depressing() {
        // Every present domain scores 60; excluding domains must not pull
        // the weighted result below 60.
        let scores = vec![
            factor(FactorDomain::Academic, 60.0, Severity::Medium),
            factor(FactorDomain::Behavioral, 60.0, Severity::Medium),
        ];
        let result = aggregate(&scores, &builtin_v1());
        assert!((result.risk_score - 60.0).abs() < 1e-9);
    }

    #[test]
    fn renormalized_result_matches_manual_weights() {
        // academic 0.30 and social 0.20 renormalize to 0.6 and 0.4.
        let scores = vec![
            factor(FactorDomain::Academic, 80.0, Severity::High),
            factor(FactorDomain::Social, 30.0, Severity::Low),
        ];
        let result = aggregate(&scores, &builtin_v1());
        assert!((result.risk_score - (0.6 * 80.0 + 0.4 * 30.0)).abs() < 0.01);
    }

    #[test]
    fn contribution_weights_sum_to_one() {
        let scores = vec![
            factor(FactorDomain::Academic, 80.0, Severity::High),
            factor(FactorDomain::Social, 30.0, Severity::Low),
            factor(FactorDomain::Health, 0.0, Severity::Low),
        ];
        let result = aggregate(&scores, &builtin_v1());
        let sum: f64 = result.ranked_factors.iter().map(|f| f.weight).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn all_zero_scores_fall_back_to_domain_weights() {
        let scores = vec![
            factor(FactorDomain::Academic, 0.0, Severity::Low),
            factor(FactorDomain::Social, 0.0, Severity::Low),
        ];
        let result = aggregate(&scores, &builtin_v1());
        assert_eq!(result.risk_score, 0.0);
        let sum: f64 = result.ranked_factors.iter().map(|f| f.weight).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        // Academic holds the larger policy weight, so it ranks first.
        assert_eq!(result.ranked_factors[0].domain, FactorDomain::Academic);
    }

    #[test]
    fn ranking_orders_by_contribution() {
        let scores = vec![
            factor(FactorDomain::Academic, 90.0, Severity::High),
            factor(FactorDomain::Social, 40.0, Severity::Medium),
            factor(FactorDomain::Behavioral, 10.0, Severity::Low),
        ];
        let result = aggregate(&scores, &builtin_v1());
        let domains: Vec<FactorDomain> = result.ranked_factors.iter().map(|f| f.domain).collect();
        assert_eq!(
            domains,
            vec![
                FactorDomain::Academic,
                FactorDomain::Social,
                FactorDomain::Behavioral
            ]
        );
    }

    #[test]
    fn contribution_tie_breaks_by_severity_then_domain() {
        // Economic and family carry equal weight; equal scores tie on
        // contribution.
        let scores = vec![
            factor(FactorDomain::Economic, 50.0, Severity::Low),
            factor(FactorDomain::Family, 50.0, Severity::High),
        ];
        let result = aggregate(&scores, &builtin_v1());
        assert_eq!(result.ranked_factors[0].domain, FactorDomain::Family);

        let scores = vec![
            factor(FactorDomain::Family, 50.0, Severity::Medium),
            factor(FactorDomain::Economic, 50.0, Severity::Medium),
        ];
        let result = aggregate(&scores, &builtin_v1());
        // Full tie resolves by domain declaration order.
        assert_eq!(result.ranked_factors[0].domain, FactorDomain::Economic);
    }

    #[test]
    fn score_is_rounded_to_two_decimals() {
        let scores = vec![
            factor(FactorDomain::Academic, 33.333, Severity::Medium),
            factor(FactorDomain::Social, 66.667, Severity::Medium),
        ];
        let result = aggregate(&scores, &builtin_v1());
        assert_eq!(result.risk_score, (result.risk_score * 100.0).round() / 100.0);
    }

    #[test]
    fn no_scorable_domains_yields_floor() {
        let result = aggregate(&[], &builtin_v1());
        assert_eq!(result.risk_score, 0.0);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(result.ranked_factors.is_empty());
    }
}
