//! Rule-based patient risk scoring.
//!
//! Responsibilities:
//! - Score a patient from demographics and clinical history with four weighted components
//!   (age, conditions, vitals, medications), clamped to `[0, 100]`
//! - Label the score Low/Medium/High and render a pipe-delimited breakdown
//! - Persist default-weight assessments; "what-if" simulations with custom weights are never
//!   stored
//!
//! Notes:
//! - Records are filtered here, not by the caller: active conditions, final observations and
//!   active medications only
//! - A missing or malformed birth date contributes nothing and is never an error
//! - The scoring date is injected so results are reproducible in tests

use crate::constants::{
    ABNORMAL_VITAL_RAW, COMORBIDITY_BONUS_RAW, CONDITION_MULTIPLIER, DEFAULT_AGE_WEIGHT,
    DEFAULT_CONDITIONS_WEIGHT, DEFAULT_MEDICATIONS_WEIGHT, DEFAULT_OBSERVATIONS_WEIGHT,
    GLUCOSE_THRESHOLD, HIGH_RISK_CONDITION_RAW, HIGH_RISK_KEYWORDS, MEDICATION_MULTIPLIER,
    MEDICATION_RAW, OBSERVATION_MULTIPLIER, OTHER_CONDITION_RAW, SYSTOLIC_THRESHOLD,
};
use crate::store::ClinicalStore;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use fhir::{Condition, MedicationRequest, Observation, Patient, RiskAssessment, RiskLabel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Weights
// ============================================================================

/// Ceiling for each score component.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub age: f64,
    pub conditions: f64,
    pub observations: f64,
    pub medications: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            age: DEFAULT_AGE_WEIGHT,
            conditions: DEFAULT_CONDITIONS_WEIGHT,
            observations: DEFAULT_OBSERVATIONS_WEIGHT,
            medications: DEFAULT_MEDICATIONS_WEIGHT,
        }
    }
}

impl RiskWeights {
    /// Every weight must be a finite number greater than zero.
    pub fn validate(&self) -> CoreResult<()> {
        let named = [
            ("age", self.age),
            ("conditions", self.conditions),
            ("observations", self.observations),
            ("medications", self.medications),
        ];
        for (name, value) in named {
            if !value.is_finite() || value <= 0.0 {
                return Err(CoreError::InvalidInput(format!(
                    "weight '{name}' must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Whether these are exactly the default weights.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Partial weight overrides; omitted keys keep their default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct WeightOverrides {
    pub age: Option<f64>,
    pub conditions: Option<f64>,
    pub observations: Option<f64>,
    pub medications: Option<f64>,
}

impl WeightOverrides {
    /// Merge onto the defaults and validate.
    pub fn resolve(&self) -> CoreResult<RiskWeights> {
        let defaults = RiskWeights::default();
        let weights = RiskWeights {
            age: self.age.unwrap_or(defaults.age),
            conditions: self.conditions.unwrap_or(defaults.conditions),
            observations: self.observations.unwrap_or(defaults.observations),
            medications: self.medications.unwrap_or(defaults.medications),
        };
        weights.validate()?;
        Ok(weights)
    }
}

// ============================================================================
// Scoring
// ============================================================================

/// Component-level result of scoring one patient.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RiskScore {
    pub score: f64,
    pub label: RiskLabel,
    pub age: Option<i64>,
    pub age_component: f64,
    /// Capped condition contribution, comorbidity bonus included.
    pub conditions_component: f64,
    /// Condition contribution before the comorbidity bonus, capped.
    pub condition_base_component: f64,
    /// Share of the comorbidity bonus the conditions cap let through.
    pub comorbidity_component: f64,
    pub observations_component: f64,
    pub medications_component: f64,
    pub medication_count: usize,
}

impl RiskScore {
    /// Pipe-delimited breakdown, e.g. `Age 45: +9.9 | Conditions: +15.0 | Vitals: +10.0 | Meds (3): +10.0`.
    ///
    /// The entries add up to the score before clamping. The age entry is omitted when the age
    /// is unknown, the comorbidity entry when the conditions cap absorbed the bonus.
    pub fn breakdown(&self) -> String {
        let mut parts = Vec::with_capacity(5);
        if let Some(age) = self.age {
            parts.push(format!("Age {age}: +{:.1}", self.age_component));
        }
        parts.push(format!("Conditions: +{:.1}", self.condition_base_component));
        if self.comorbidity_component > 0.0 {
            parts.push(format!("Comorbidity Bonus: +{:.1}", self.comorbidity_component));
        }
        parts.push(format!("Vitals: +{:.1}", self.observations_component));
        parts.push(format!(
            "Meds ({}): +{:.1}",
            self.medication_count, self.medications_component
        ));
        parts.join(" | ")
    }
}

fn age_factor(age: i64) -> f64 {
    match age {
        a if a > 60 => 1.0,
        a if a > 45 => 0.66,
        a if a > 30 => 0.33,
        _ => 0.16,
    }
}

fn is_high_risk(condition_text: &str) -> bool {
    let text = condition_text.to_lowercase();
    HIGH_RISK_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

fn is_abnormal_vital(observation: &Observation) -> bool {
    let text = observation.code_text().unwrap_or_default().to_lowercase();
    let value = observation.value().unwrap_or(0.0);

    let blood_pressure = text.contains("blood pressure") || text.contains("systolic");
    let glucose = text.contains("glucose") || text.contains("sugar");

    (blood_pressure && value > SYSTOLIC_THRESHOLD) || (glucose && value > GLUCOSE_THRESHOLD)
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Score a patient on `today` with the given weights.
///
/// Inactive conditions, non-final observations and inactive medications are ignored.
pub fn score_risk(
    patient: &Patient,
    conditions: &[Condition],
    observations: &[Observation],
    medications: &[MedicationRequest],
    weights: &RiskWeights,
    today: NaiveDate,
) -> RiskScore {
    let age = patient.age_on(today);
    let age_component = age.map_or(0.0, |a| age_factor(a) * weights.age);

    let active_conditions: Vec<&Condition> =
        conditions.iter().filter(|c| c.is_active()).collect();
    let condition_raw: f64 = active_conditions
        .iter()
        .map(|c| {
            if c.code_text().is_some_and(is_high_risk) {
                HIGH_RISK_CONDITION_RAW
            } else {
                OTHER_CONDITION_RAW
            }
        })
        .sum();
    let bonus_raw = if active_conditions.len() > 1 {
        COMORBIDITY_BONUS_RAW
    } else {
        0.0
    };
    let condition_base_component = (condition_raw * CONDITION_MULTIPLIER).min(weights.conditions);
    let conditions_component =
        ((condition_raw + bonus_raw) * CONDITION_MULTIPLIER).min(weights.conditions);
    let comorbidity_component = conditions_component - condition_base_component;

    let abnormal_vitals = observations
        .iter()
        .filter(|o| o.is_final() && is_abnormal_vital(o))
        .count();
    let observations_component = (abnormal_vitals as f64 * ABNORMAL_VITAL_RAW
        * OBSERVATION_MULTIPLIER)
        .min(weights.observations);

    let medication_count = medications.iter().filter(|m| m.is_active()).count();
    let medications_component = (medication_count as f64 * MEDICATION_RAW
        * MEDICATION_MULTIPLIER)
        .min(weights.medications);

    let total =
        age_component + conditions_component + observations_component + medications_component;
    let score = round_one_decimal(total.clamp(0.0, 100.0));

    RiskScore {
        score,
        label: RiskLabel::from_score(score),
        age,
        age_component,
        conditions_component,
        condition_base_component,
        comorbidity_component,
        observations_component,
        medications_component,
        medication_count,
    }
}

/// Score a patient and build the assessment resource (not persisted).
///
/// `weights` defaults to [`RiskWeights::default`].
///
/// # Errors
///
/// Returns `CoreError::InvalidInput` if a weight is not a positive finite number.
pub fn compute_risk(
    patient: &Patient,
    conditions: &[Condition],
    observations: &[Observation],
    medications: &[MedicationRequest],
    weights: Option<&RiskWeights>,
    now: DateTime<Utc>,
) -> CoreResult<RiskAssessment> {
    let weights = weights.copied().unwrap_or_default();
    weights.validate()?;

    let result = score_risk(
        patient,
        conditions,
        observations,
        medications,
        &weights,
        now.date_naive(),
    );
    Ok(RiskAssessment::new(
        patient.id.as_deref().unwrap_or_default(),
        result.score,
        result.label,
        result.breakdown(),
        now,
    ))
}

// ============================================================================
// Service
// ============================================================================

/// Source of the current time.
pub type Clock = fn() -> DateTime<Utc>;

/// Risk operations over the clinical store.
#[derive(Clone)]
pub struct RiskService {
    store: Arc<dyn ClinicalStore>,
    clock: Clock,
}

impl RiskService {
    pub fn new(store: Arc<dyn ClinicalStore>) -> Self {
        Self {
            store,
            clock: Utc::now,
        }
    }

    /// Replace the clock used for age calculation and timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Score a patient with the default weights and persist the assessment.
    ///
    /// The returned assessment carries its store identifier.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::PatientNotFound` if the patient does not exist, or a store error.
    pub fn compute_risk(&self, patient_id: &str) -> CoreResult<RiskAssessment> {
        self.assess(patient_id, &RiskWeights::default(), true)
    }

    /// Score a patient with custom weights. Never persisted.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` for invalid weights and `CoreError::PatientNotFound`
    /// for an unknown patient.
    pub fn simulate_risk(
        &self,
        patient_id: &str,
        weights: &RiskWeights,
    ) -> CoreResult<RiskAssessment> {
        weights.validate()?;
        tracing::debug!("simulating risk for {patient_id} with {weights:?}");
        self.assess(patient_id, weights, false)
    }

    /// The most recently persisted assessment, if any.
    pub fn latest_risk(&self, patient_id: &str) -> CoreResult<Option<RiskAssessment>> {
        let natural_id = self.natural_id(patient_id)?;
        self.store.find_latest_risk_assessment(&natural_id)
    }

    /// Every persisted assessment, oldest first.
    pub fn risk_history(&self, patient_id: &str) -> CoreResult<Vec<RiskAssessment>> {
        let natural_id = self.natural_id(patient_id)?;
        self.store.find_risk_assessments(&natural_id)
    }

    fn natural_id(&self, patient_id: &str) -> CoreResult<String> {
        self.store
            .find_patient(patient_id)?
            .map(|p| p.natural_id().to_string())
            .ok_or_else(|| CoreError::PatientNotFound(patient_id.to_string()))
    }

    fn assess(
        &self,
        patient_id: &str,
        weights: &RiskWeights,
        persist: bool,
    ) -> CoreResult<RiskAssessment> {
        let stored = self
            .store
            .find_patient(patient_id)?
            .ok_or_else(|| CoreError::PatientNotFound(patient_id.to_string()))?;
        let natural_id = stored.natural_id();

        let conditions = self.store.find_conditions(natural_id, None)?;
        let observations = self.store.find_observations(natural_id, None)?;
        let medications = self.store.find_medications(natural_id, None)?;

        let mut assessment = compute_risk(
            &stored.patient,
            &conditions,
            &observations,
            &medications,
            Some(weights),
            (self.clock)(),
        )?;

        if persist && weights.is_default() {
            let id = self.store.create_risk_assessment(assessment.clone())?;
            tracing::info!(
                "persisted risk assessment {id} for {natural_id}: {:?} {:?}",
                assessment.score(),
                assessment.label()
            );
            assessment.id = Some(id);
        }
        Ok(assessment)
    }
}
