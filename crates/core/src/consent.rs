//! Consent gate for analytical processing.

use crate::store::ClinicalStore;
use crate::{CoreError, CoreResult};
use fhir::Consent;
use std::sync::Arc;

#[derive(Clone)]
pub struct ConsentGate {
    store: Arc<dyn ClinicalStore>,
}

impl ConsentGate {
    pub fn new(store: Arc<dyn ClinicalStore>) -> Self {
        Self { store }
    }

    /// Require an active consent for the patient.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConsentRequired` when no active consent is on record.
    pub fn require(&self, patient_id: &str) -> CoreResult<Consent> {
        match self.store.find_active_consent(patient_id)? {
            Some(consent) => Ok(consent),
            None => {
                tracing::warn!("analysis refused for {patient_id}: no active consent");
                Err(CoreError::ConsentRequired)
            }
        }
    }
}
