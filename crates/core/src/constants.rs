//! Constants used throughout the CareScore core crate.
//!
//! Scoring thresholds and catalog identifiers live here so the risk scorer, the similarity
//! engine and the recommendation orchestrator agree on one set of values.

/// Default ceiling for the age component.
pub const DEFAULT_AGE_WEIGHT: f64 = 30.0;

/// Default ceiling for the condition component.
pub const DEFAULT_CONDITIONS_WEIGHT: f64 = 40.0;

/// Default ceiling for the observation (vitals) component.
pub const DEFAULT_OBSERVATIONS_WEIGHT: f64 = 20.0;

/// Default ceiling for the medication component.
pub const DEFAULT_MEDICATIONS_WEIGHT: f64 = 10.0;

/// Condition keywords that mark a diagnosis as high risk (matched case-insensitively).
pub const HIGH_RISK_KEYWORDS: [&str; 6] = [
    "diabetes",
    "hypertension",
    "heart",
    "cancer",
    "stroke",
    "asthma",
];

/// Raw contribution of a condition that matches a high-risk keyword.
pub const HIGH_RISK_CONDITION_RAW: f64 = 1.0;

/// Raw contribution of any other active condition.
pub const OTHER_CONDITION_RAW: f64 = 0.3;

/// Flat raw bonus when more than one condition is active.
pub const COMORBIDITY_BONUS_RAW: f64 = 0.5;

/// Raw contribution of each abnormal vital sign.
pub const ABNORMAL_VITAL_RAW: f64 = 0.5;

/// Raw contribution of each active medication.
pub const MEDICATION_RAW: f64 = 0.5;

pub const CONDITION_MULTIPLIER: f64 = 15.0;
pub const OBSERVATION_MULTIPLIER: f64 = 20.0;
pub const MEDICATION_MULTIPLIER: f64 = 10.0;

/// Systolic blood pressure above this value (mmHg) is abnormal.
pub const SYSTOLIC_THRESHOLD: f64 = 140.0;

/// Blood glucose above this value (mg/dL) is abnormal.
pub const GLUCOSE_THRESHOLD: f64 = 180.0;

/// Maximum number of patients returned in a similarity cohort.
pub const DEFAULT_COHORT_LIMIT: usize = 5;

/// Maximum age difference, in years, that counts as a similar age.
pub const DEFAULT_AGE_WINDOW_YEARS: i64 = 5;

/// Coverage sentinel for a plan that covers every condition.
pub const COVERS_ALL_SENTINEL: &str = "ALL";

/// Free-text spelling of the covers-all sentinel accepted in catalog documents.
pub const COVERS_ALL_TEXT: &str = "covers all";

/// Plan shortlist for a Low risk label.
pub const LOW_RISK_PLANS: &[&str] = &["basic"];

/// Plan shortlist for a Medium risk label.
pub const MEDIUM_RISK_PLANS: &[&str] = &["standard", "gold"];

/// Plan shortlist for a High risk label.
pub const HIGH_RISK_PLANS: &[&str] = &["gold", "platinum"];
