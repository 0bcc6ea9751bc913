use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordinal risk classification derived from the risk score. Ordering matters:
/// the notification decider compares levels directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => anyhow::bail!("unknown risk level {other:?}"),
        }
    }
}

/// Risk domain tag. Declaration order is the deterministic tie-break order
/// used when ranking contributing factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorDomain {
    Economic,
    Family,
    Academic,
    Social,
    Health,
    Behavioral,
}

impl FactorDomain {
    pub const ALL: [FactorDomain; 6] = [
        FactorDomain::Economic,
        FactorDomain::Family,
        FactorDomain::Academic,
        FactorDomain::Social,
        FactorDomain::Health,
        FactorDomain::Behavioral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactorDomain::Economic => "economic",
            FactorDomain::Family => "family",
            FactorDomain::Academic => "academic",
            FactorDomain::Social => "social",
            FactorDomain::Health => "health",
            FactorDomain::Behavioral => "behavioral",
        }
    }
}

impl std::fmt::Display for FactorDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FactorDomain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "economic" => Ok(FactorDomain::Economic),
            "family" => Ok(FactorDomain::Family),
            "academic" => Ok(FactorDomain::Academic),
            "social" => Ok(FactorDomain::Social),
            "health" => Ok(FactorDomain::Health),
            "behavioral" => Ok(FactorDomain::Behavioral),
            other => anyhow::bail!("unknown factor domain {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// One step up, saturating at `High`. Used when unresolved incidents
    /// escalate an otherwise lower-severity domain.
    pub fn escalate(&self) -> Severity {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium | Severity::High => Severity::High,
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => anyhow::bail!("unknown severity {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Late,
    ExcusedAbsence,
    UnexcusedAbsence,
}

impl AttendanceStatus {
    /// Late arrivals still count as attended days.
    pub fn attended(&self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::ExcusedAbsence => "excused_absence",
            AttendanceStatus::UnexcusedAbsence => "unexcused_absence",
        }
    }
}

impl std::str::FromStr for AttendanceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(AttendanceStatus::Present),
            "late" => Ok(AttendanceStatus::Late),
            "excused_absence" => Ok(AttendanceStatus::ExcusedAbsence),
            "unexcused_absence" => Ok(AttendanceStatus::UnexcusedAbsence),
            other => anyhow::bail!("unknown attendance status {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IncomeRange {
    Low,
    Medium,
    High,
}

impl IncomeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncomeRange::Low => "low",
            IncomeRange::Medium => "medium",
            IncomeRange::High => "high",
        }
    }
}

impl std::str::FromStr for IncomeRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(IncomeRange::Low),
            "medium" => Ok(IncomeRange::Medium),
            "high" => Ok(IncomeRange::High),
            other => anyhow::bail!("unknown income range {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EducationLevel {
    NoFormal,
    Primary,
    Secondary,
    Tertiary,
}

impl EducationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EducationLevel::NoFormal => "no_formal",
            EducationLevel::Primary => "primary",
            EducationLevel::Secondary => "secondary",
            EducationLevel::Tertiary => "tertiary",
        }
    }
}

impl std::str::FromStr for EducationLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_formal" => Ok(EducationLevel::NoFormal),
            "primary" => Ok(EducationLevel::Primary),
            "secondary" => Ok(EducationLevel::Secondary),
            "tertiary" => Ok(EducationLevel::Tertiary),
            other => anyhow::bail!("unknown education level {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardianRelationship {
    Parent,
    Relative,
    OtherGuardian,
}

impl GuardianRelationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardianRelationship::Parent => "parent",
            GuardianRelationship::Relative => "relative",
            GuardianRelationship::OtherGuardian => "other_guardian",
        }
    }
}

impl std::str::FromStr for GuardianRelationship {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parent" => Ok(GuardianRelationship::Parent),
            "relative" => Ok(GuardianRelationship::Relative),
            "other_guardian" => Ok(GuardianRelationship::OtherGuardian),
            other => anyhow::bail!("unknown guardian relationship {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMethod {
    Walking,
    Bicycle,
    PublicTransport,
    PrivateTransport,
}

impl TransportMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMethod::Walking => "walking",
            TransportMethod::Bicycle => "bicycle",
            TransportMethod::PublicTransport => "public_transport",
            TransportMethod::PrivateTransport => "private_transport",
        }
    }
}

impl std::str::FromStr for TransportMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "walking" => Ok(TransportMethod::Walking),
            "bicycle" => Ok(TransportMethod::Bicycle),
            "public_transport" => Ok(TransportMethod::PublicTransport),
            "private_transport" => Ok(TransportMethod::PrivateTransport),
            other => anyhow::bail!("unknown transport method {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStatus {
    Active,
    Transferred,
    DroppedOut,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Transferred => "transferred",
            EnrollmentStatus::DroppedOut => "dropped_out",
        }
    }
}

impl std::str::FromStr for EnrollmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EnrollmentStatus::Active),
            "transferred" => Ok(EnrollmentStatus::Transferred),
            "dropped_out" => Ok(EnrollmentStatus::DroppedOut),
            other => anyhow::bail!("unknown enrollment status {other:?}"),
        }
    }
}

// --- raw collaborator records ---

#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone)]
pub struct GradeRecord {
    pub recorded_on: NaiveDate,
    pub subject: String,
    pub percentage: f64,
}

/// Bullying incident where the evaluated student is the victim.
#[derive(Debug, Clone)]
pub struct BullyingIncident {
    pub occurred_on: NaiveDate,
    pub severity: Severity,
    pub resolved: bool,
}

/// Open welfare note tagged with the risk domain it concerns.
#[derive(Debug, Clone)]
pub struct RiskFactorEntry {
    pub opened_on: NaiveDate,
    pub domain: FactorDomain,
    pub severity: Severity,
    pub resolved: bool,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct GuardianProfile {
    pub income: Option<IncomeRange>,
    pub education: Option<EducationLevel>,
    pub relationship: GuardianRelationship,
}

#[derive(Debug, Clone)]
pub struct EnrollmentRecord {
    pub class_name: String,
    pub status: EnrollmentStatus,
    pub distance_to_school_km: Option<f64>,
    pub transport: Option<TransportMethod>,
    pub class_repetitions: u32,
}

/// Everything the collaborator store returns for one student and window.
/// Collections are empty, not absent, when no records exist.
#[derive(Debug, Clone, Default)]
pub struct RawStudentData {
    pub attendance: Vec<AttendanceRecord>,
    pub grades: Vec<GradeRecord>,
    pub incidents: Vec<BullyingIncident>,
    pub risk_factors: Vec<RiskFactorEntry>,
    pub guardian: Option<GuardianProfile>,
    pub enrollment: Option<EnrollmentRecord>,
}

// --- snapshot ---

#[derive(Debug, Clone)]
pub struct AttendanceSignals {
    /// Fraction of windowed records where the student attended (0-1).
    pub rate: f64,
    /// Fraction of windowed records marked unexcused absence (0-1).
    pub unexcused_rate: f64,
    pub records: u32,
}

#[derive(Debug, Clone)]
pub struct AcademicSignals {
    pub mean_percentage: f64,
    /// Total percentage-point change across the window, negative when
    /// declining. Computed from a regression slope so a single bad score
    /// does not read as a sustained drop.
    pub trend_delta: f64,
    pub records: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SocialSignals {
    pub incidents: u32,
    pub high_severity: u32,
    pub unresolved: u32,
}

#[derive(Debug, Clone)]
pub struct HouseholdSignals {
    pub income: IncomeRange,
    pub education: EducationLevel,
    pub relationship: GuardianRelationship,
    pub distance_to_school_km: f64,
    pub transport: TransportMethod,
}

/// Immutable per-run feature bundle for one student. Built fresh by the
/// extractor for every evaluation; scoring only reads it.
#[derive(Debug, Clone)]
pub struct StudentSnapshot {
    pub student_id: Uuid,
    pub as_of: NaiveDate,
    pub window_days: i64,
    pub class_name: Option<String>,
    pub enrollment_status: Option<EnrollmentStatus>,
    pub class_repetitions: u32,
    pub attendance: AttendanceSignals,
    pub academic: Option<AcademicSignals>,
    pub social: SocialSignals,
    pub household: Option<HouseholdSignals>,
    /// Open behavioral-tagged risk factor entries in the window.
    pub behavioral_entries: Vec<RiskFactorEntry>,
    /// Open health-tagged risk factor entries in the window.
    pub health_entries: Vec<RiskFactorEntry>,
}

// --- scoring outputs ---

#[derive(Debug, Clone)]
pub struct FactorScore {
    pub domain: FactorDomain,
    /// Domain sub-score on the 0-100 scale.
    pub score: f64,
    pub severity: Severity,
    pub justification: String,
}

/// One entry of the ranked contributing-factors list. Weights are
/// contribution shares and sum to 1.0 across the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub domain: FactorDomain,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPrediction {
    pub id: Uuid,
    pub student_id: Uuid,
    /// 0-100, rounded to two decimals.
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub contributing_factors: Vec<ContributingFactor>,
    pub algorithm_version: String,
    pub evaluated_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub recommendation: String,
    pub teacher_notified: bool,
}
