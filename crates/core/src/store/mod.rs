//! Clinical record store contracts.
//!
//! The scoring engine reads patients, clinical history, risk assessments, plans and consents
//! through [`ClinicalStore`]. Implementations must:
//! - resolve a patient identifier against both the internal key and the natural identifier,
//!   with or without the `Patient/` prefix
//! - match a record's subject reference in either format
//! - make `upsert_patient` atomic on the natural identifier
//!
//! An in-memory implementation is provided in [`memory`], and [`bundle`] loads any store from a
//! JSON bundle.

pub mod bundle;
pub mod memory;

pub use bundle::{load_bundle, load_bundle_file, BundleSummary};
pub use memory::InMemoryStore;

use crate::plans::InsurancePlan;
use crate::CoreResult;
use fhir::{
    bare_patient_id, AdministrativeGender, Condition, Consent, MedicationRequest, Observation,
    Patient, RiskAssessment,
};
use serde::Serialize;
use std::collections::HashMap;

/// A patient as held by the store.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredPatient {
    /// Store-generated key (UUID, simple form).
    pub key: String,
    pub patient: Patient,
}

impl StoredPatient {
    /// The natural identifier, falling back to the key when the resource has none.
    pub fn natural_id(&self) -> &str {
        self.patient
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.key)
    }

    /// Whether `id` names this patient by key or natural identifier, in either reference format.
    pub fn is_identified_by(&self, id: &str) -> bool {
        let id = bare_patient_id(id.trim());
        !id.is_empty() && (self.key == id || self.natural_id() == id)
    }
}

/// Conditions grouped by the natural identifier of the patient they belong to.
pub type ConditionsByPatient = HashMap<String, Vec<Condition>>;

/// Read and write access to clinical records, risk assessments, plans and consents.
///
/// `status` filters compare case-insensitively against the record's resolved status. `None`
/// returns every record for the patient.
pub trait ClinicalStore: Send + Sync {
    fn find_patient(&self, id: &str) -> CoreResult<Option<StoredPatient>>;

    /// Every patient with exactly this gender value, in insertion order.
    fn patients_by_gender(
        &self,
        gender: Option<AdministrativeGender>,
    ) -> CoreResult<Vec<StoredPatient>>;

    fn find_conditions(&self, patient_id: &str, status: Option<&str>)
        -> CoreResult<Vec<Condition>>;

    fn find_observations(
        &self,
        patient_id: &str,
        status: Option<&str>,
    ) -> CoreResult<Vec<Observation>>;

    fn find_medications(
        &self,
        patient_id: &str,
        status: Option<&str>,
    ) -> CoreResult<Vec<MedicationRequest>>;

    /// Conditions for many patients in a single pass, keyed by natural identifier.
    ///
    /// Every requested patient has an entry, possibly empty.
    fn find_conditions_for(&self, patients: &[StoredPatient]) -> CoreResult<ConditionsByPatient>;

    /// The most recently created assessment for the patient.
    fn find_latest_risk_assessment(&self, patient_id: &str)
        -> CoreResult<Option<RiskAssessment>>;

    /// Every assessment for the patient, oldest first.
    fn find_risk_assessments(&self, patient_id: &str) -> CoreResult<Vec<RiskAssessment>>;

    /// Persist an assessment, returning its identifier.
    fn create_risk_assessment(&self, assessment: RiskAssessment) -> CoreResult<String>;

    /// Every plan, in catalog insertion order.
    fn find_all_plans(&self) -> CoreResult<Vec<InsurancePlan>>;

    fn create_plan(&self, plan: InsurancePlan) -> CoreResult<String>;

    fn find_active_consent(&self, patient_id: &str) -> CoreResult<Option<Consent>>;

    /// Insert a patient unless one with the same natural identifier exists.
    ///
    /// Returns the key of the stored record: the new key, or the existing record's key when the
    /// natural identifier was already registered.
    fn upsert_patient(&self, patient: Patient) -> CoreResult<String>;

    fn insert_condition(&self, condition: Condition) -> CoreResult<String>;

    fn insert_observation(&self, observation: Observation) -> CoreResult<String>;

    fn insert_medication(&self, medication: MedicationRequest) -> CoreResult<String>;

    fn insert_consent(&self, consent: Consent) -> CoreResult<String>;
}

/// Case-insensitive status comparison shared by store implementations.
pub(crate) fn status_matches(actual: Option<&str>, wanted: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => actual.is_some_and(|a| a.trim().eq_ignore_ascii_case(wanted.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(key: &str, id: Option<&str>) -> StoredPatient {
        StoredPatient {
            key: key.into(),
            patient: Patient {
                id: id.map(str::to_owned),
                ..Patient::default()
            },
        }
    }

    #[test]
    fn identified_by_key_or_natural_id_in_either_format() {
        let p = stored("0f3c9a", Some("p001"));
        assert!(p.is_identified_by("p001"));
        assert!(p.is_identified_by("Patient/p001"));
        assert!(p.is_identified_by("0f3c9a"));
        assert!(p.is_identified_by("Patient/0f3c9a"));
        assert!(!p.is_identified_by("p002"));
        assert!(!p.is_identified_by(""));
    }

    #[test]
    fn natural_id_falls_back_to_key() {
        assert_eq!(stored("abc", None).natural_id(), "abc");
        assert_eq!(stored("abc", Some("")).natural_id(), "abc");
        assert_eq!(stored("abc", Some("p9")).natural_id(), "p9");
    }

    #[test]
    fn status_filter() {
        assert!(status_matches(None, None));
        assert!(status_matches(Some("Active"), Some("active")));
        assert!(!status_matches(None, Some("active")));
        assert!(!status_matches(Some("inactive"), Some("active")));
    }
}
