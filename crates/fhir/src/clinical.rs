//! Clinical resources attached to a patient: conditions, observations and medication requests.
//!
//! Stored documents are not uniform. Two shapes in particular need care:
//! - a condition's clinical status is sometimes plain text and sometimes a coded concept
//! - a medication's display name can live in one of several nested fields
//!
//! Both are resolved here through a single accessor each, so scoring code never inspects the
//! storage shape directly.

use crate::datatypes::{non_blank, CodeableConcept, Quantity, Reference};
use serde::{Deserialize, Serialize};

/// A record that belongs to a patient through a subject reference.
pub trait PatientSubject {
    /// The subject reference as stored.
    fn subject(&self) -> Option<&Reference>;

    /// The referenced patient identifier, normalised to its bare form.
    fn subject_id(&self) -> Option<&str> {
        self.subject().and_then(Reference::patient_id)
    }
}

// ============================================================================
// Condition
// ============================================================================

/// Clinical status in either of its storage shapes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClinicalStatus {
    /// Stored as a bare string, e.g. `"active"`.
    Text(String),
    /// Stored as a concept, e.g. `{"text": "Active"}` or `{"coding": [{"code": "active"}]}`.
    Concept(CodeableConcept),
}

impl ClinicalStatus {
    /// Resolve the status value, trying concept text, then coding codes, then plain text.
    pub fn resolve(&self) -> Option<&str> {
        match self {
            ClinicalStatus::Concept(concept) => concept.text().or_else(|| concept.first_code()),
            ClinicalStatus::Text(text) => non_blank(Some(text.as_str())),
        }
    }
}

/// Condition (diagnosis) resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_status: Option<ClinicalStatus>,
}

impl Condition {
    /// Free-text diagnosis name, if present and not blank.
    pub fn code_text(&self) -> Option<&str> {
        self.code.as_ref().and_then(CodeableConcept::text)
    }

    /// Resolved clinical status, regardless of storage shape.
    pub fn status(&self) -> Option<&str> {
        self.clinical_status.as_ref().and_then(ClinicalStatus::resolve)
    }

    /// Whether the resolved clinical status is `active` (case-insensitive).
    pub fn is_active(&self) -> bool {
        self.status()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("active"))
    }
}

impl PatientSubject for Condition {
    fn subject(&self) -> Option<&Reference> {
        self.subject.as_ref()
    }
}

// ============================================================================
// Observation
// ============================================================================

/// Observation (vital sign or lab result) resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,
}

impl Observation {
    /// Vital or lab name, if present and not blank.
    pub fn code_text(&self) -> Option<&str> {
        self.code.as_ref().and_then(CodeableConcept::text)
    }

    /// Numeric value of the quantity, if any.
    pub fn value(&self) -> Option<f64> {
        self.value_quantity.as_ref().and_then(|q| q.value)
    }

    /// Whether the observation status is `final` (case-insensitive).
    pub fn is_final(&self) -> bool {
        status_is(self.status.as_deref(), "final")
    }
}

impl PatientSubject for Observation {
    fn subject(&self) -> Option<&Reference> {
        self.subject.as_ref()
    }
}

// ============================================================================
// MedicationRequest
// ============================================================================

/// R5-style `medication` element: a concept and/or a reference.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeableReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<CodeableConcept>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
}

/// Medication request resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_codeable_concept: Option<CodeableConcept>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication: Option<CodeableReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_reference: Option<Reference>,
}

type NameExtractor = fn(&MedicationRequest) -> Option<&str>;

/// Places a medication name may be stored, in the order they are consulted.
const MEDICATION_NAME_EXTRACTORS: [NameExtractor; 5] = [
    concept_text,
    medication_concept_text,
    code_text,
    concept_first_display,
    reference_display,
];

fn concept_text(m: &MedicationRequest) -> Option<&str> {
    m.medication_codeable_concept.as_ref()?.text()
}

fn medication_concept_text(m: &MedicationRequest) -> Option<&str> {
    m.medication.as_ref()?.concept.as_ref()?.text()
}

fn code_text(m: &MedicationRequest) -> Option<&str> {
    m.code.as_ref()?.text()
}

fn concept_first_display(m: &MedicationRequest) -> Option<&str> {
    m.medication_codeable_concept.as_ref()?.first_display()
}

fn reference_display(m: &MedicationRequest) -> Option<&str> {
    let reference = m
        .medication_reference
        .as_ref()
        .or_else(|| m.medication.as_ref()?.reference.as_ref())?;
    non_blank(reference.display.as_deref())
}

impl MedicationRequest {
    /// Display name of the medication; the first stored location with a value wins.
    pub fn medication_name(&self) -> Option<&str> {
        MEDICATION_NAME_EXTRACTORS
            .iter()
            .find_map(|extract| extract(self))
    }

    /// Whether the request status is `active` (case-insensitive).
    pub fn is_active(&self) -> bool {
        status_is(self.status.as_deref(), "active")
    }
}

impl PatientSubject for MedicationRequest {
    fn subject(&self) -> Option<&Reference> {
        self.subject.as_ref()
    }
}

fn status_is(status: Option<&str>, expected: &str) -> bool {
    status.is_some_and(|s| s.trim().eq_ignore_ascii_case(expected))
}
