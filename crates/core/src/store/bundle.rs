//! Load a [`ClinicalStore`] from a JSON bundle.

use super::ClinicalStore;
use crate::{CoreError, CoreResult};
use fhir::{parse_resources, Resource};
use serde::Serialize;
use std::path::Path;

/// Number of resources loaded per type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BundleSummary {
    pub patients: usize,
    pub conditions: usize,
    pub observations: usize,
    pub medications: usize,
    pub consents: usize,
    pub risk_assessments: usize,
}

/// Insert every supported resource of a bundle document into the store.
///
/// Patients are upserted on their natural identifier, so loading the same bundle twice does not
/// duplicate patients.
///
/// # Errors
///
/// Returns `CoreError::Fhir` if the document cannot be parsed, or a store error if an insert
/// fails.
pub fn load_bundle(store: &dyn ClinicalStore, json_text: &str) -> CoreResult<BundleSummary> {
    let mut summary = BundleSummary::default();

    for resource in parse_resources(json_text)? {
        match resource {
            Resource::Patient(patient) => {
                store.upsert_patient(patient)?;
                summary.patients += 1;
            }
            Resource::Condition(condition) => {
                store.insert_condition(condition)?;
                summary.conditions += 1;
            }
            Resource::Observation(observation) => {
                store.insert_observation(observation)?;
                summary.observations += 1;
            }
            Resource::MedicationRequest(medication) => {
                store.insert_medication(medication)?;
                summary.medications += 1;
            }
            Resource::Consent(consent) => {
                store.insert_consent(consent)?;
                summary.consents += 1;
            }
            Resource::RiskAssessment(assessment) => {
                store.create_risk_assessment(assessment)?;
                summary.risk_assessments += 1;
            }
            Resource::Unsupported => {}
        }
    }

    tracing::info!(
        "loaded bundle: {} patients, {} conditions, {} observations, {} medications, {} consents, {} risk assessments",
        summary.patients,
        summary.conditions,
        summary.observations,
        summary.medications,
        summary.consents,
        summary.risk_assessments
    );
    Ok(summary)
}

/// Read a bundle file and load it into the store.
pub fn load_bundle_file(store: &dyn ClinicalStore, path: &Path) -> CoreResult<BundleSummary> {
    let text = std::fs::read_to_string(path).map_err(CoreError::FileRead)?;
    load_bundle(store, &text)
}
