use crate::models::{ContributingFactor, FactorDomain, RiskLevel};

const FALLBACK: &str = "Monitor the student and reassess next period.";

/// Maps the risk level and the dominant contributing factor to an
/// intervention suggestion. Pure template lookup; always returns non-empty
/// text and never fails.
pub fn recommend(level: RiskLevel, ranked: &[ContributingFactor]) -> String {
    let top = match ranked.first() {
        Some(factor) => factor.domain,
        None => return FALLBACK.to_string(),
    };

    match level {
        RiskLevel::Low => FALLBACK.to_string(),
        RiskLevel::Medium => domain_action(top).to_string(),
        RiskLevel::High => format!(
            "{} Schedule weekly check-ins and involve the guardian in the intervention plan.",
            domain_action(top)
        ),
        RiskLevel::Critical => format!(
            "URGENT: schedule an immediate intervention meeting and assign a dedicated case manager. {}",
            domain_action(top)
        ),
    }
}

fn domain_action(domain: FactorDomain) -> &'static str {
    match domain {
        FactorDomain::Economic => {
            "Connect the family with social services and the school feeding program; explore transport assistance for the commute."
        }
        FactorDomain::Family => {
            "Engage the guardian directly and bring the household into the support plan."
        }
        FactorDomain::Academic => {
            "Provide additional tutoring support and put a personalized learning plan in place."
        }
        FactorDomain::Social => {
            "Arrange counseling and peer mediation; increase supervision under the anti-bullying program."
        }
        FactorDomain::Health => {
            "Refer the student to the school health officer and follow up on the open health concerns."
        }
        FactorDomain::Behavioral => {
            "Conduct a home visit to understand attendance barriers and track attendance weekly."
        }
    }
}
