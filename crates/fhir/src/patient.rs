//! FHIR-aligned patient model and demographic helpers.
//!
//! Responsibilities:
//! - Define the patient document shape as stored (`id`, `gender`, `birthDate`, `name`, `address`)
//! - Derive the values the engine needs: display name, parsed birth date, age
//!
//! Notes:
//! - Birth dates are stored as text and may be malformed; parsing failures are treated as
//!   an absent birth date, never as an error
//! - Gender is a closed enumeration compared by exact value

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// Public domain-level types
// ============================================================================

/// Administrative gender of a patient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdministrativeGender {
    Male,
    Female,
    Other,
    Unknown,
}

impl AdministrativeGender {
    /// Wire value of the gender.
    pub fn as_str(self) -> &'static str {
        match self {
            AdministrativeGender::Male => "male",
            AdministrativeGender::Female => "female",
            AdministrativeGender::Other => "other",
            AdministrativeGender::Unknown => "unknown",
        }
    }
}

/// Human name (only the parts used for display are modelled).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HumanName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub given: Vec<String>,
}

/// Postal address.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Patient resource as held in the document store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Natural (human-readable) identifier, e.g. `p001`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<AdministrativeGender>,

    /// Date of birth as stored (expected `YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanName>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<Address>,
}

impl Patient {
    /// Display name taken from the first name entry.
    ///
    /// Uses the free-text form when present, otherwise given names followed by the family
    /// name. Returns `"Unknown"` when nothing usable is stored.
    pub fn display_name(&self) -> String {
        let Some(name) = self.name.first() else {
            return "Unknown".to_string();
        };

        if let Some(text) = name.text.as_deref().filter(|t| !t.trim().is_empty()) {
            return text.to_string();
        }

        let parts: Vec<&str> = name
            .given
            .iter()
            .map(String::as_str)
            .chain(name.family.as_deref())
            .filter(|p| !p.trim().is_empty())
            .collect();

        if parts.is_empty() {
            "Unknown".to_string()
        } else {
            parts.join(" ")
        }
    }

    /// Parsed birth date, or `None` if missing or malformed.
    pub fn parsed_birth_date(&self) -> Option<NaiveDate> {
        let raw = self.birth_date.as_deref()?;
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
    }

    /// Age in whole years on `today`: days since birth divided by 365 (floored).
    ///
    /// Returns `None` if the birth date is missing or malformed.
    pub fn age_on(&self, today: NaiveDate) -> Option<i64> {
        let birth = self.parsed_birth_date()?;
        let days = (today - birth).num_days();
        Some(days.div_euclid(365))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn parses_stored_patient_document() {
        let json = r#"{
            "resourceType": "Patient",
            "id": "p001",
            "gender": "female",
            "birthDate": "1992-03-20",
            "name": [{"use": "official", "family": "Williams", "given": ["Sarah", "Jane"]}],
            "address": [{"city": "Leeds", "country": "UK"}],
            "telecom": [{"system": "phone", "value": "0123"}]
        }"#;

        let patient: Patient = serde_json::from_str(json).expect("parse patient");
        assert_eq!(patient.id.as_deref(), Some("p001"));
        assert_eq!(patient.gender, Some(AdministrativeGender::Female));
        assert_eq!(patient.display_name(), "Sarah Jane Williams");
        assert_eq!(patient.address[0].city.as_deref(), Some("Leeds"));
    }

    #[test]
    fn name_text_takes_precedence() {
        let patient = Patient {
            name: vec![HumanName {
                text: Some("Dr Sarah Williams".into()),
                family: Some("Williams".into()),
                given: vec!["Sarah".into()],
            }],
            ..Patient::default()
        };
        assert_eq!(patient.display_name(), "Dr Sarah Williams");
        assert_eq!(Patient::default().display_name(), "Unknown");
    }

    #[test]
    fn age_uses_days_over_365() {
        let patient = Patient {
            birth_date: Some("1960-01-01".into()),
            ..Patient::default()
        };
        assert_eq!(patient.age_on(date(2025, 6, 1)), Some(65));

        // 365-day years drift ahead of calendar birthdays by the leap days elapsed.
        let patient = Patient {
            birth_date: Some("2000-06-10".into()),
            ..Patient::default()
        };
        assert_eq!(patient.age_on(date(2025, 6, 5)), Some(25));
    }

    #[test]
    fn malformed_birth_date_is_absent() {
        let patient = Patient {
            birth_date: Some("01/02/1980".into()),
            ..Patient::default()
        };
        assert_eq!(patient.parsed_birth_date(), None);
        assert_eq!(patient.age_on(date(2025, 1, 1)), None);
        assert_eq!(Patient::default().age_on(date(2025, 1, 1)), None);
    }

    #[test]
    fn rejects_unknown_gender_value() {
        let err = serde_json::from_str::<Patient>(r#"{"gender": "Male"}"#)
            .expect_err("gender values are exact");
        assert!(err.to_string().contains("Male"));
    }
}
