//! Patient similarity cohort.
//!
//! Every other patient with the target's exact gender is scored:
//! - 1 for the gender match
//! - 2 when both ages are known and within the configured window
//! - 3 when both have a persisted risk assessment with the same label
//! - 1 per distinct active condition name they share
//!
//! Candidates are ranked by descending score; equal scores keep store insertion order. The
//! result is truncated to the configured cohort size.

use crate::store::ClinicalStore;
use crate::{CoreConfig, CoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use fhir::{Condition, RiskLabel};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

const GENDER_SCORE: u32 = 1;
const AGE_SCORE: u32 = 2;
const RISK_LABEL_SCORE: u32 = 3;

/// One cohort member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SimilarPatient {
    pub patient_id: String,
    pub name: String,
    pub score: u32,
    pub reasons: Vec<String>,
}

/// Distinct, non-empty names of active conditions.
fn active_condition_names(conditions: &[Condition]) -> BTreeSet<&str> {
    conditions
        .iter()
        .filter(|c| c.is_active())
        .filter_map(Condition::code_text)
        .collect()
}

#[derive(Clone)]
pub struct SimilarityService {
    store: Arc<dyn ClinicalStore>,
    cfg: Arc<CoreConfig>,
    clock: fn() -> DateTime<Utc>,
}

impl SimilarityService {
    pub fn new(store: Arc<dyn ClinicalStore>, cfg: Arc<CoreConfig>) -> Self {
        Self {
            store,
            cfg,
            clock: Utc::now,
        }
    }

    /// Replace the clock used for age calculation.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Rank the patients most similar to `target_id`.
    ///
    /// An unknown target yields an empty cohort, not an error.
    pub fn find_similar_patients(&self, target_id: &str) -> CoreResult<Vec<SimilarPatient>> {
        let Some(target) = self.store.find_patient(target_id)? else {
            tracing::debug!("similarity target {target_id} not found");
            return Ok(Vec::new());
        };
        let today: NaiveDate = (self.clock)().date_naive();
        let target_id = target.natural_id().to_string();

        let candidates: Vec<_> = self
            .store
            .patients_by_gender(target.patient.gender)?
            .into_iter()
            .filter(|c| c.natural_id() != target_id)
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let target_age = target.patient.age_on(today);
        let target_label = self.latest_label(&target_id)?;
        let target_conditions = self.store.find_conditions(&target_id, None)?;
        let target_names = active_condition_names(&target_conditions);
        let conditions_by_patient = self.store.find_conditions_for(&candidates)?;

        let mut cohort = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let candidate_id = candidate.natural_id();
            let mut score = GENDER_SCORE;
            let mut reasons = Vec::new();

            if let (Some(target_age), Some(age)) = (target_age, candidate.patient.age_on(today)) {
                if (age - target_age).abs() <= self.cfg.age_window_years() {
                    score += AGE_SCORE;
                    reasons.push(format!("Similar Age ({age})"));
                }
            }

            if let Some(target_label) = target_label {
                if self.latest_label(candidate_id)? == Some(target_label) {
                    score += RISK_LABEL_SCORE;
                    reasons.push(format!("Same Risk Level ({target_label})"));
                }
            }

            let candidate_names = conditions_by_patient
                .get(candidate_id)
                .map(|c| active_condition_names(c))
                .unwrap_or_default();
            let shared: Vec<&str> = target_names
                .intersection(&candidate_names)
                .copied()
                .collect();
            if !shared.is_empty() {
                score += shared.len() as u32;
                reasons.push(format!("Shared Conditions: {}", shared.join(", ")));
            }

            if score > 0 {
                cohort.push(SimilarPatient {
                    patient_id: candidate_id.to_string(),
                    name: candidate.patient.display_name(),
                    score,
                    reasons,
                });
            }
        }

        // Stable sort keeps insertion order among equal scores.
        cohort.sort_by(|a, b| b.score.cmp(&a.score));
        cohort.truncate(self.cfg.cohort_limit());
        Ok(cohort)
    }

    fn latest_label(&self, patient_id: &str) -> CoreResult<Option<RiskLabel>> {
        Ok(self
            .store
            .find_latest_risk_assessment(patient_id)?
            .and_then(|a| a.label()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use fhir::{
        AdministrativeGender, ClinicalStatus, CodeableConcept, HumanName, Patient, Reference,
        RiskAssessment,
    };

    fn fixed_now() -> DateTime<Utc> {
        "2025-06-01T00:00:00Z"
            .parse::<DateTime<Utc>>()
            .expect("valid datetime")
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        service: SimilarityService,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(CoreConfig::default())
        }

        fn with_config(cfg: CoreConfig) -> Self {
            let store = Arc::new(InMemoryStore::new());
            let service =
                SimilarityService::new(store.clone(), Arc::new(cfg)).with_clock(fixed_now);
            Self { store, service }
        }

        fn patient(&self, id: &str, gender: Option<AdministrativeGender>, birth: Option<&str>) {
            self.store
                .upsert_patient(Patient {
                    id: Some(id.into()),
                    gender,
                    birth_date: birth.map(str::to_owned),
                    name: vec![HumanName {
                        text: Some(format!("Patient {id}")),
                        ..HumanName::default()
                    }],
                    ..Patient::default()
                })
                .expect("insert patient");
        }

        fn condition(&self, subject: &str, text: Option<&str>, status: &str) {
            self.store
                .insert_condition(Condition {
                    subject: Some(Reference {
                        reference: Some(subject.into()),
                        display: None,
                    }),
                    code: text.map(CodeableConcept::from_text),
                    clinical_status: Some(ClinicalStatus::Text(status.into())),
                    ..Condition::default()
                })
                .expect("insert condition");
        }

        fn assessment(&self, id: &str, label: RiskLabel) {
            self.store
                .create_risk_assessment(RiskAssessment::new(id, 50.0, label, "", fixed_now()))
                .expect("insert assessment");
        }
    }

    const MALE: Option<AdministrativeGender> = Some(AdministrativeGender::Male);
    const FEMALE: Option<AdministrativeGender> = Some(AdministrativeGender::Female);

    #[test]
    fn unknown_target_yields_empty_cohort() {
        let fx = Fixture::new();
        fx.patient("p001", MALE, None);
        assert!(fx
            .service
            .find_similar_patients("nobody")
            .expect("similar")
            .is_empty());
    }

    #[test]
    fn same_gender_same_birth_date_one_shared_condition_scores_four() {
        let fx = Fixture::new();
        fx.patient("p001", FEMALE, Some("1985-04-12"));
        fx.patient("p002", FEMALE, Some("1985-04-12"));
        fx.condition("Patient/p001", Some("Asthma"), "active");
        fx.condition("p002", Some("Asthma"), "Active");

        let cohort = fx.service.find_similar_patients("p001").expect("similar");
        assert_eq!(
            cohort,
            vec![SimilarPatient {
                patient_id: "p002".into(),
                name: "Patient p002".into(),
                score: 4,
                reasons: vec!["Similar Age (40)".into(), "Shared Conditions: Asthma".into()],
            }]
        );
    }

    #[test]
    fn target_is_never_in_its_own_cohort_and_gender_must_match() {
        let fx = Fixture::new();
        fx.patient("p001", MALE, None);
        fx.patient("p002", FEMALE, None);
        fx.patient("p003", None, None);
        fx.patient("p004", MALE, None);

        let cohort = fx.service.find_similar_patients("p001").expect("similar");
        let ids: Vec<&str> = cohort.iter().map(|p| p.patient_id.as_str()).collect();
        assert_eq!(ids, ["p004"]);
        assert_eq!(cohort[0].score, 1);
        assert!(cohort[0].reasons.is_empty());

        // A patient without gender only matches others without gender.
        fx.patient("p005", None, None);
        let cohort = fx.service.find_similar_patients("p003").expect("similar");
        let ids: Vec<&str> = cohort.iter().map(|p| p.patient_id.as_str()).collect();
        assert_eq!(ids, ["p005"]);
    }

    #[test]
    fn risk_label_match_requires_both_assessments() {
        let fx = Fixture::new();
        fx.patient("p001", MALE, None);
        fx.patient("p002", MALE, None);
        fx.patient("p003", MALE, None);
        fx.patient("p004", MALE, None);
        fx.assessment("p001", RiskLabel::Medium);
        fx.assessment("p002", RiskLabel::Medium);
        fx.assessment("p003", RiskLabel::High);

        let cohort = fx.service.find_similar_patients("p001").expect("similar");
        assert_eq!(cohort[0].patient_id, "p002");
        assert_eq!(cohort[0].score, 4);
        assert_eq!(cohort[0].reasons, ["Same Risk Level (Medium)"]);
        assert!(cohort[1..].iter().all(|p| p.score == 1));
    }

    #[test]
    fn latest_assessment_decides_the_label() {
        let fx = Fixture::new();
        fx.patient("p001", MALE, None);
        fx.patient("p002", MALE, None);
        fx.assessment("p001", RiskLabel::Low);
        fx.assessment("p002", RiskLabel::Low);
        fx.assessment("p002", RiskLabel::High);

        let cohort = fx.service.find_similar_patients("p001").expect("similar");
        assert_eq!(cohort[0].score, 1);
    }

    #[test]
    fn shared_conditions_are_distinct_active_and_named() {
        let fx = Fixture::new();
        fx.patient("p001", MALE, None);
        fx.patient("p002", MALE, None);
        for text in ["Hypertension", "Asthma", "Hypertension"] {
            fx.condition("p001", Some(text), "active");
        }
        fx.condition("p001", Some("Fracture"), "inactive");
        fx.condition("p001", None, "active");
        for text in ["Asthma", "Hypertension", "Fracture"] {
            fx.condition("Patient/p002", Some(text), "active");
        }
        fx.condition("p002", None, "active");

        let cohort = fx.service.find_similar_patients("p001").expect("similar");
        assert_eq!(cohort[0].score, 3);
        assert_eq!(cohort[0].reasons, ["Shared Conditions: Asthma, Hypertension"]);
    }

    #[test]
    fn age_window_is_inclusive_and_needs_both_dates() {
        let fx = Fixture::new();
        fx.patient("p001", FEMALE, Some("1980-01-01"));
        fx.patient("p002", FEMALE, Some("1975-01-01"));
        fx.patient("p003", FEMALE, Some("1970-01-01"));
        fx.patient("p004", FEMALE, Some("garbage"));

        let cohort = fx.service.find_similar_patients("p001").expect("similar");
        let scores: Vec<(&str, u32)> = cohort
            .iter()
            .map(|p| (p.patient_id.as_str(), p.score))
            .collect();
        assert_eq!(scores, [("p002", 3), ("p003", 1), ("p004", 1)]);
    }

    #[test]
    fn ranks_descending_with_stable_ties_and_truncates() {
        let fx = Fixture::with_config(CoreConfig::new(3, 5).expect("config"));
        fx.patient("p001", MALE, Some("1970-06-01"));
        fx.condition("p001", Some("Asthma"), "active");
        for (id, birth, shared) in [
            ("p002", "1990-01-01", false),
            ("p003", "1971-01-01", false),
            ("p004", "1990-01-01", true),
            ("p005", "1972-01-01", false),
            ("p006", "1969-01-01", true),
        ] {
            fx.patient(id, MALE, Some(birth));
            if shared {
                fx.condition(id, Some("Asthma"), "active");
            }
        }

        let cohort = fx.service.find_similar_patients("p001").expect("similar");
        let ids: Vec<&str> = cohort.iter().map(|p| p.patient_id.as_str()).collect();
        assert_eq!(ids, ["p006", "p003", "p005"]);
    }

    #[test]
    fn target_by_internal_key_excludes_itself() {
        let fx = Fixture::new();
        let key = fx
            .store
            .upsert_patient(Patient {
                id: Some("p001".into()),
                gender: MALE,
                ..Patient::default()
            })
            .expect("insert");
        fx.patient("p002", MALE, None);

        let cohort = fx.service.find_similar_patients(&key).expect("similar");
        let ids: Vec<&str> = cohort.iter().map(|p| p.patient_id.as_str()).collect();
        assert_eq!(ids, ["p002"]);
    }
}
