//! Insurance recommendation orchestration.
//!
//! Two caller-facing paths coexist:
//! - [`RecommendationService::get_insurance_recommendation`] answers "which plans suit my risk
//!   tier": latest risk label, tier shortlist, similarity cohort size in the explanation
//! - [`RecommendationService::get_coverage_recommendation`] answers "which plan covers my
//!   conditions": cheapest plan covering every active condition
//!
//! Both require an active consent before reading anything else.

use crate::consent::ConsentGate;
use crate::constants::{HIGH_RISK_PLANS, LOW_RISK_PLANS, MEDIUM_RISK_PLANS};
use crate::plans::{InsurancePlan, PlanCatalogService};
use crate::risk::{Clock, RiskService};
use crate::similarity::SimilarityService;
use crate::store::ClinicalStore;
use crate::{CoreConfig, CoreError, CoreResult};
use fhir::{Condition, MedicationRequest, RiskLabel};
use serde::Serialize;
use std::sync::Arc;

/// Risk-tier recommendation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InsuranceRecommendation {
    pub patient_id: String,
    /// Label exactly as displayed on the assessment.
    pub risk_level: String,
    pub recommended_plans: Vec<InsurancePlan>,
    pub explanation: String,
    pub similar_patient_count: usize,
}

/// Coverage-based recommendation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CoverageRecommendation {
    pub patient_id: String,
    pub condition_count: usize,
    pub conditions: Vec<String>,
    /// Display names of active medications; unnamed requests are left out.
    pub medications: Vec<String>,
    pub recommended_plan: InsurancePlan,
    pub similar_cohort_size: usize,
    pub similar_patients_preview: Vec<String>,
    pub all_plans: Vec<InsurancePlan>,
}

/// Plan ids suited to a risk tier, in preference order.
pub fn plan_shortlist(label: RiskLabel) -> &'static [&'static str] {
    match label {
        RiskLabel::Low => LOW_RISK_PLANS,
        RiskLabel::Medium => MEDIUM_RISK_PLANS,
        RiskLabel::High => HIGH_RISK_PLANS,
    }
}

/// Human-readable explanation for a risk-tier recommendation.
pub fn explanation(label: &str, similar_count: usize) -> String {
    let mut text = format!("Based on your {label} risk profile.");
    if similar_count > 0 {
        text.push_str(&format!(
            " {similar_count} similar patients were analyzed to refine this suggestion."
        ));
    }
    text
}

#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn ClinicalStore>,
    consent: ConsentGate,
    risk: RiskService,
    similarity: SimilarityService,
    catalog: PlanCatalogService,
}

impl RecommendationService {
    pub fn new(store: Arc<dyn ClinicalStore>, cfg: Arc<CoreConfig>) -> Self {
        Self {
            consent: ConsentGate::new(store.clone()),
            risk: RiskService::new(store.clone()),
            similarity: SimilarityService::new(store.clone(), cfg),
            catalog: PlanCatalogService::new(store.clone()),
            store,
        }
    }

    /// Replace the clock used by risk scoring and similarity.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.risk = self.risk.with_clock(clock);
        self.similarity = self.similarity.with_clock(clock);
        self
    }

    /// Recommend plans for the patient's risk tier.
    ///
    /// Uses the most recent persisted assessment, computing (and persisting) one when none
    /// exists. Shortlisted plans missing from the catalog are skipped.
    ///
    /// # Errors
    ///
    /// Returns a `CoreError` if:
    /// - the patient has no active consent (`ConsentRequired`),
    /// - the patient does not exist (`PatientNotFound`),
    /// - the store fails.
    pub fn get_insurance_recommendation(
        &self,
        patient_id: &str,
    ) -> CoreResult<InsuranceRecommendation> {
        self.consent.require(patient_id)?;

        let assessment = match self
            .risk
            .latest_risk(patient_id)?
            .filter(|a| a.label().is_some())
        {
            Some(latest) => latest,
            None => {
                tracing::info!("no stored risk assessment for {patient_id}; computing one");
                self.risk.compute_risk(patient_id)?
            }
        };
        let label = assessment.label().ok_or_else(|| {
            CoreError::InvalidInput(format!("risk assessment for {patient_id} has no label"))
        })?;
        let display = assessment
            .label_display()
            .unwrap_or(label.as_str())
            .to_string();

        let similar = self.similarity.find_similar_patients(patient_id)?;

        let catalog = self.catalog.plans()?;
        let recommended_plans: Vec<InsurancePlan> = plan_shortlist(label)
            .iter()
            .filter_map(|id| catalog.iter().find(|plan| plan.id == **id).cloned())
            .collect();

        Ok(InsuranceRecommendation {
            patient_id: assessment
                .patient_id()
                .unwrap_or(patient_id)
                .to_string(),
            explanation: explanation(&display, similar.len()),
            risk_level: display,
            recommended_plans,
            similar_patient_count: similar.len(),
        })
    }

    /// Recommend the cheapest plan covering every active condition.
    ///
    /// # Errors
    ///
    /// Returns a `CoreError` if:
    /// - the patient has no active consent (`ConsentRequired`),
    /// - the patient does not exist (`PatientNotFound`),
    /// - the catalog is empty (`EmptyCatalog`),
    /// - the store fails.
    pub fn get_coverage_recommendation(
        &self,
        patient_id: &str,
    ) -> CoreResult<CoverageRecommendation> {
        self.consent.require(patient_id)?;

        let stored = self
            .store
            .find_patient(patient_id)?
            .ok_or_else(|| CoreError::PatientNotFound(patient_id.to_string()))?;
        let natural_id = stored.natural_id();

        let conditions = self.store.find_conditions(natural_id, Some("active"))?;
        let medications = self.store.find_medications(natural_id, Some("active"))?;
        let recommended_plan = self.catalog.recommend(&conditions)?;
        let similar = self.similarity.find_similar_patients(natural_id)?;

        Ok(CoverageRecommendation {
            patient_id: natural_id.to_string(),
            condition_count: conditions.len(),
            conditions: conditions
                .iter()
                .filter_map(Condition::code_text)
                .map(str::to_owned)
                .collect(),
            medications: medications
                .iter()
                .filter_map(MedicationRequest::medication_name)
                .map(str::to_owned)
                .collect(),
            recommended_plan,
            similar_cohort_size: similar.len(),
            similar_patients_preview: similar.into_iter().map(|p| p.name).collect(),
            all_plans: self.catalog.plans()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::{DateTime, Utc};
    use fhir::{
        AdministrativeGender, ClinicalStatus, CodeableConcept, Consent, HumanName, Patient,
        Reference, RiskAssessment,
    };

    fn fixed_now() -> DateTime<Utc> {
        "2025-06-01T12:00:00Z"
            .parse::<DateTime<Utc>>()
            .expect("valid datetime")
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        service: RecommendationService,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            PlanCatalogService::new(store.clone())
                .ensure_seeded()
                .expect("seed catalog");
            let service = RecommendationService::new(store.clone(), Arc::new(CoreConfig::default()))
                .with_clock(fixed_now);
            Self { store, service }
        }

        fn patient(&self, id: &str, birth: &str, consent: bool) {
            self.store
                .upsert_patient(Patient {
                    id: Some(id.into()),
                    gender: Some(AdministrativeGender::Female),
                    birth_date: Some(birth.into()),
                    name: vec![HumanName {
                        given: vec!["Pat".into()],
                        family: Some(id.to_uppercase()),
                        ..HumanName::default()
                    }],
                    ..Patient::default()
                })
                .expect("insert patient");
            if consent {
                self.store
                    .insert_consent(Consent::active_for(id))
                    .expect("insert consent");
            }
        }

        fn condition(&self, id: &str, text: &str, status: &str) {
            self.store
                .insert_condition(Condition {
                    subject: Some(Reference::to_patient(id)),
                    code: Some(CodeableConcept::from_text(text)),
                    clinical_status: Some(ClinicalStatus::Text(status.into())),
                    ..Condition::default()
                })
                .expect("insert condition");
        }
    }

    impl Fixture {
        fn medication(&self, id: &str, medication_json: &str, status: &str) {
            let mut request: MedicationRequest =
                serde_json::from_str(medication_json).expect("medication json");
            request.subject = Some(Reference::to_patient(id));
            request.status = Some(status.into());
            self.store
                .insert_medication(request)
                .expect("insert medication");
        }
    }

    fn plan_ids(plans: &[InsurancePlan]) -> Vec<&str> {
        plans.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn shortlist_per_tier() {
        assert_eq!(plan_shortlist(RiskLabel::Low), ["basic"]);
        assert_eq!(plan_shortlist(RiskLabel::Medium), ["standard", "gold"]);
        assert_eq!(plan_shortlist(RiskLabel::High), ["gold", "platinum"]);
    }

    #[test]
    fn explanation_mentions_cohort_only_when_present() {
        assert_eq!(explanation("Low", 0), "Based on your Low risk profile.");
        assert_eq!(
            explanation("High", 3),
            "Based on your High risk profile. 3 similar patients were analyzed to refine this suggestion."
        );
    }

    #[test]
    fn consent_is_checked_first() {
        let fx = Fixture::new();
        fx.patient("p001", "1960-01-01", false);
        assert!(matches!(
            fx.service.get_insurance_recommendation("p001"),
            Err(CoreError::ConsentRequired)
        ));
        assert!(matches!(
            fx.service.get_coverage_recommendation("p001"),
            Err(CoreError::ConsentRequired)
        ));
        assert!(fx
            .store
            .find_risk_assessments("p001")
            .expect("history")
            .is_empty());
    }

    #[test]
    fn computes_and_persists_when_no_assessment_exists() {
        let fx = Fixture::new();
        fx.patient("p001", "1960-01-01", true);
        fx.condition("p001", "Coronary heart disease", "active");
        fx.condition("p001", "Type 2 diabetes", "active");

        let rec = fx
            .service
            .get_insurance_recommendation("p001")
            .expect("recommend");
        assert_eq!(rec.risk_level, "High");
        assert_eq!(plan_ids(&rec.recommended_plans), ["gold", "platinum"]);
        assert_eq!(rec.explanation, "Based on your High risk profile.");
        assert_eq!(rec.similar_patient_count, 0);
        assert_eq!(
            fx.store.find_risk_assessments("p001").expect("history").len(),
            1
        );

        // A second call reuses the stored assessment.
        fx.service
            .get_insurance_recommendation("p001")
            .expect("recommend again");
        assert_eq!(
            fx.store.find_risk_assessments("p001").expect("history").len(),
            1
        );
    }

    #[test]
    fn uses_latest_stored_label_and_counts_cohort() {
        let fx = Fixture::new();
        fx.patient("p001", "1990-01-01", true);
        fx.patient("p002", "1991-01-01", false);
        fx.patient("p003", "1950-01-01", false);
        fx.store
            .create_risk_assessment(RiskAssessment::new(
                "p001",
                45.0,
                RiskLabel::Medium,
                "",
                fixed_now(),
            ))
            .expect("insert assessment");

        let rec = fx
            .service
            .get_insurance_recommendation("Patient/p001")
            .expect("recommend");
        assert_eq!(rec.patient_id, "p001");
        assert_eq!(rec.risk_level, "Medium");
        assert_eq!(plan_ids(&rec.recommended_plans), ["standard", "gold"]);
        assert_eq!(rec.similar_patient_count, 2);
        assert_eq!(
            rec.explanation,
            "Based on your Medium risk profile. 2 similar patients were analyzed to refine this suggestion."
        );
    }

    #[test]
    fn shortlisted_plans_missing_from_catalog_are_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let gold = crate::plans::default_plans()
            .expect("defaults")
            .into_iter()
            .find(|p| p.id.as_str() == "gold")
            .expect("gold");
        store.create_plan(gold).expect("create plan");
        store
            .upsert_patient(Patient {
                id: Some("p001".into()),
                birth_date: Some("1960-01-01".into()),
                ..Patient::default()
            })
            .expect("insert patient");
        store
            .insert_consent(Consent::active_for("p001"))
            .expect("insert consent");
        store
            .create_risk_assessment(RiskAssessment::new(
                "p001",
                80.0,
                RiskLabel::High,
                "",
                fixed_now(),
            ))
            .expect("insert assessment");

        let service = RecommendationService::new(store, Arc::new(CoreConfig::default()))
            .with_clock(fixed_now);
        let rec = service
            .get_insurance_recommendation("p001")
            .expect("recommend");
        assert_eq!(plan_ids(&rec.recommended_plans), ["gold"]);
    }

    #[test]
    fn coverage_recommendation_uses_active_conditions() {
        let fx = Fixture::new();
        fx.patient("p001", "1980-01-01", true);
        fx.patient("p002", "1982-01-01", false);
        fx.condition("p001", "Essential hypertension", "active");
        fx.condition("p001", "Coronary heart disease", "inactive");
        fx.condition("p002", "Essential hypertension", "active");
        fx.medication("p001", r#"{"medicationCodeableConcept": {"text": "Amlodipine"}}"#, "active");
        fx.medication("p001", r#"{"medicationReference": {"display": "Aspirin 75mg"}}"#, "active");
        fx.medication("p001", r#"{"medicationCodeableConcept": {"text": "Warfarin"}}"#, "stopped");
        fx.medication("p001", "{}", "active");

        let rec = fx
            .service
            .get_coverage_recommendation("p001")
            .expect("recommend");
        assert_eq!(rec.recommended_plan.id.as_str(), "standard");
        assert_eq!(rec.condition_count, 1);
        assert_eq!(rec.conditions, ["Essential hypertension"]);
        assert_eq!(rec.medications, ["Amlodipine", "Aspirin 75mg"]);
        assert_eq!(rec.similar_cohort_size, 1);
        assert_eq!(rec.similar_patients_preview, ["Pat P002"]);
        assert_eq!(rec.all_plans.len(), 5);
    }

    #[test]
    fn coverage_recommendation_without_conditions_is_cheapest() {
        let fx = Fixture::new();
        fx.patient("p001", "2000-01-01", true);
        let rec = fx
            .service
            .get_coverage_recommendation("p001")
            .expect("recommend");
        assert_eq!(rec.recommended_plan.id.as_str(), "basic");
        assert_eq!(rec.condition_count, 0);
    }

    #[test]
    fn unknown_patient_with_consent_is_not_found() {
        let fx = Fixture::new();
        fx.store
            .insert_consent(Consent::active_for("ghost"))
            .expect("insert consent");
        assert!(matches!(
            fx.service.get_insurance_recommendation("ghost"),
            Err(CoreError::PatientNotFound(_))
        ));
        assert!(matches!(
            fx.service.get_coverage_recommendation("ghost"),
            Err(CoreError::PatientNotFound(_))
        ));
    }
}
