//! Bundle parsing: turn a JSON document into typed resources.
//!
//! Accepted shapes:
//! - a FHIR `Bundle` (`{"resourceType": "Bundle", "entry": [{"resource": {...}}]}`)
//! - a bare JSON array of resources
//! - a single resource object
//!
//! Resources are routed by `resourceType`. Types the engine does not use are skipped with a
//! warning rather than rejected, so exports from the wider platform load unchanged.

use crate::{
    Condition, Consent, FhirError, FhirResult, MedicationRequest, Observation, Patient,
    RiskAssessment,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resource the engine understands, tagged by `resourceType`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resourceType")]
pub enum Resource {
    Patient(Patient),
    Condition(Condition),
    Observation(Observation),
    MedicationRequest(MedicationRequest),
    Consent(Consent),
    RiskAssessment(RiskAssessment),
    #[serde(other)]
    Unsupported,
}

/// Parse a JSON document into resources.
///
/// # Errors
///
/// Returns [`FhirError`] if:
/// - the text is not valid JSON,
/// - the top level is not a bundle, array or resource object,
/// - an entry lacks `resourceType`,
/// - a supported resource has a field of the wrong shape (the error names the entry index and
///   field path).
pub fn parse_resources(json_text: &str) -> FhirResult<Vec<Resource>> {
    let document: Value = serde_json::from_str(json_text)?;

    let raw_resources = match document {
        Value::Array(items) => items,
        Value::Object(mut object) => {
            if object.get("resourceType").and_then(Value::as_str) == Some("Bundle") {
                match object.remove("entry") {
                    Some(Value::Array(entries)) => entries
                        .into_iter()
                        .filter_map(|mut entry| entry.get_mut("resource").map(Value::take))
                        .collect(),
                    Some(_) => {
                        return Err(FhirError::InvalidInput(
                            "Bundle entry must be an array".into(),
                        ))
                    }
                    None => Vec::new(),
                }
            } else {
                vec![Value::Object(object)]
            }
        }
        _ => {
            return Err(FhirError::InvalidInput(
                "expected a Bundle, an array of resources or a single resource".into(),
            ))
        }
    };

    let mut resources = Vec::with_capacity(raw_resources.len());
    for (index, raw) in raw_resources.into_iter().enumerate() {
        let resource_type = raw
            .get("resourceType")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                FhirError::InvalidInput(format!("entry {index} has no resourceType"))
            })?;

        let resource = match serde_path_to_error::deserialize::<_, Resource>(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() {
                    "<root>"
                } else {
                    path.as_str()
                };
                return Err(FhirError::Translation(format!(
                    "{resource_type} at entry {index} schema mismatch at {path}: {source}"
                )));
            }
        };

        if matches!(resource, Resource::Unsupported) {
            tracing::warn!("skipping unsupported resource type {resource_type} at entry {index}");
            continue;
        }
        resources.push(resource);
    }

    Ok(resources)
}
