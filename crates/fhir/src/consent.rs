//! Consent resource: authorisation for analytical processing of a patient's data.

use crate::datatypes::Reference;
use serde::{Deserialize, Serialize};

/// Consent resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Consent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<Reference>,
}

impl Consent {
    /// Active consent for the given patient.
    pub fn active_for(patient_id: &str) -> Self {
        Self {
            id: None,
            status: Some("active".into()),
            patient: Some(Reference::to_patient(patient_id)),
        }
    }

    /// Whether the consent status is `active` (case-insensitive).
    pub fn is_active(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("active"))
    }

    /// The consenting patient identifier, normalised to its bare form.
    pub fn patient_id(&self) -> Option<&str> {
        self.patient.as_ref().and_then(Reference::patient_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_consent_round_trip() {
        let consent = Consent::active_for("p001");
        assert!(consent.is_active());
        assert_eq!(consent.patient_id(), Some("p001"));

        let json = serde_json::to_value(&consent).expect("serialise");
        assert_eq!(json["patient"]["reference"], "Patient/p001");
    }

    #[test]
    fn other_statuses_are_not_active() {
        for status in ["inactive", "rejected", "draft"] {
            let consent = Consent {
                status: Some(status.into()),
                ..Consent::active_for("p001")
            };
            assert!(!consent.is_active(), "{status}");
        }
    }
}
