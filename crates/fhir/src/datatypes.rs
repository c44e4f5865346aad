//! Shared FHIR data types and subject reference normalisation.

use serde::{Deserialize, Serialize};

/// Prefix used by the typed form of a patient reference.
pub const PATIENT_REFERENCE_PREFIX: &str = "Patient/";

/// Strip the `Patient/` prefix from a reference, if present.
///
/// Records in the store reference their patient either as `Patient/{id}` or as the bare
/// `{id}`. Every lookup boundary normalises through this function so both forms compare equal.
pub fn bare_patient_id(reference: &str) -> &str {
    reference
        .strip_prefix(PATIENT_REFERENCE_PREFIX)
        .unwrap_or(reference)
}

/// Build the typed `Patient/{id}` form of a reference.
pub fn patient_reference(id: &str) -> String {
    format!("{PATIENT_REFERENCE_PREFIX}{}", bare_patient_id(id))
}

/// A reference from one resource to another.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    /// Reference to a patient in the typed `Patient/{id}` form.
    pub fn to_patient(id: &str) -> Self {
        Self {
            reference: Some(patient_reference(id)),
            display: None,
        }
    }

    /// The referenced patient identifier with any `Patient/` prefix removed.
    pub fn patient_id(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .map(bare_patient_id)
            .filter(|id| !id.is_empty())
    }
}

/// A single code from a terminology system.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// A concept expressed as free text and/or a list of codings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    /// Concept carrying only free text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            coding: Vec::new(),
            text: Some(text.into()),
        }
    }

    /// The free text, if present and not blank.
    pub fn text(&self) -> Option<&str> {
        non_blank(self.text.as_deref())
    }

    /// The first non-blank coding code.
    pub fn first_code(&self) -> Option<&str> {
        self.coding
            .iter()
            .find_map(|coding| non_blank(coding.code.as_deref()))
    }

    /// The display of the first coding, if present and not blank.
    pub fn first_display(&self) -> Option<&str> {
        self.coding
            .first()
            .and_then(|coding| non_blank(coding.display.as_deref()))
    }
}

/// A measured amount.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A free-text note.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub text: String,
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
