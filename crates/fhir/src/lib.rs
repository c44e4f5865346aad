//! FHIR-aligned resource models for the CareScore document store.
//!
//! This crate provides the **wire models** and **lenient accessors** the scoring engine reads
//! clinical records through:
//! - Patient, Condition, Observation, MedicationRequest, Consent and RiskAssessment resources
//! - subject reference normalisation (`Patient/{id}` and bare `{id}` both resolve)
//! - clinical status resolution across the plain-text and coded storage shapes
//! - the medication display-name fallback chain
//! - bundle parsing for loading a store from a JSON document
//!
//! Stored documents carry many more FHIR fields than the engine needs, so unlike strict
//! on-disk formats these models ignore unknown keys. Shape errors in the fields that *are*
//! modelled are reported with the failing path.

pub mod bundle;
pub mod clinical;
pub mod consent;
pub mod datatypes;
pub mod patient;
pub mod risk_assessment;

pub use bundle::{parse_resources, Resource};
pub use clinical::{ClinicalStatus, Condition, MedicationRequest, Observation, PatientSubject};
pub use consent::Consent;
pub use datatypes::{
    bare_patient_id, patient_reference, Annotation, CodeableConcept, Coding, Quantity, Reference,
    PATIENT_REFERENCE_PREFIX,
};
pub use patient::{Address, AdministrativeGender, HumanName, Patient};
pub use risk_assessment::{Prediction, RiskAssessment, RiskLabel};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
