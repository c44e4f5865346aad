//! RiskAssessment resource and the qualitative risk label.
//!
//! A stored assessment carries a single prediction with the numeric score in
//! `probabilityDecimal`, the label in the `qualitativeRisk` coding (`code` lowercase,
//! `display` capitalised) and a pipe-delimited breakdown in the first note.

use crate::datatypes::{Annotation, CodeableConcept, Coding, Reference};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const RISK_PROBABILITY_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/risk-probability";
const OUTCOME_TEXT: &str = "General Health Risk";

/// Qualitative risk tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLabel {
    Low,
    Medium,
    High,
}

impl RiskLabel {
    /// Tier for a score: `<= 30` Low, `<= 60` Medium, otherwise High.
    pub fn from_score(score: f64) -> Self {
        if score <= 30.0 {
            RiskLabel::Low
        } else if score <= 60.0 {
            RiskLabel::Medium
        } else {
            RiskLabel::High
        }
    }

    /// Display form (`Low`, `Medium`, `High`).
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLabel::Low => "Low",
            RiskLabel::Medium => "Medium",
            RiskLabel::High => "High",
        }
    }

    /// Coded form (`low`, `medium`, `high`).
    pub fn code(self) -> &'static str {
        match self {
            RiskLabel::Low => "low",
            RiskLabel::Medium => "medium",
            RiskLabel::High => "high",
        }
    }

    /// Parse the display or coded form, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLabel::Low),
            "medium" => Some(RiskLabel::Medium),
            "high" => Some(RiskLabel::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One predicted outcome.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CodeableConcept>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualitative_risk: Option<CodeableConcept>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_decimal: Option<f64>,
}

/// RiskAssessment resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_date_time: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prediction: Vec<Prediction>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub note: Vec<Annotation>,
}

impl RiskAssessment {
    /// Build a final assessment for a patient. The identifier is assigned by the store.
    pub fn new(
        patient_id: &str,
        score: f64,
        label: RiskLabel,
        breakdown: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            status: Some("final".into()),
            subject: Some(Reference::to_patient(patient_id)),
            occurrence_date_time: Some(occurred_at.to_rfc3339()),
            prediction: vec![Prediction {
                outcome: Some(CodeableConcept::from_text(OUTCOME_TEXT)),
                qualitative_risk: Some(CodeableConcept {
                    coding: vec![Coding {
                        system: Some(RISK_PROBABILITY_SYSTEM.into()),
                        code: Some(label.code().into()),
                        display: Some(label.as_str().into()),
                    }],
                    text: None,
                }),
                probability_decimal: Some(score),
            }],
            note: vec![Annotation {
                text: breakdown.into(),
            }],
        }
    }

    /// Numeric score of the first prediction.
    pub fn score(&self) -> Option<f64> {
        self.prediction.first()?.probability_decimal
    }

    /// Display label of the first prediction exactly as stored.
    pub fn label_display(&self) -> Option<&str> {
        self.prediction
            .first()?
            .qualitative_risk
            .as_ref()?
            .first_display()
    }

    /// Parsed label of the first prediction, falling back to the coding code.
    pub fn label(&self) -> Option<RiskLabel> {
        let risk = self.prediction.first()?.qualitative_risk.as_ref()?;
        risk.first_display()
            .and_then(RiskLabel::parse)
            .or_else(|| risk.first_code().and_then(RiskLabel::parse))
    }

    /// Pipe-delimited score breakdown from the first note.
    pub fn breakdown(&self) -> Option<&str> {
        self.note.first().map(|n| n.text.as_str())
    }

    /// The assessed patient identifier, normalised to its bare form.
    pub fn patient_id(&self) -> Option<&str> {
        self.subject.as_ref().and_then(Reference::patient_id)
    }
}
