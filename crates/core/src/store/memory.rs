//! In-memory [`ClinicalStore`].
//!
//! Each collection sits behind its own `RwLock`. A poisoned lock is reported as
//! `CoreError::StorePoisoned` naming the collection.

use super::{status_matches, ClinicalStore, ConditionsByPatient, StoredPatient};
use crate::plans::InsurancePlan;
use crate::{CoreError, CoreResult};
use fhir::{
    bare_patient_id, AdministrativeGender, Condition, Consent, MedicationRequest, Observation,
    Patient, PatientSubject, RiskAssessment,
};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    patients: RwLock<Vec<StoredPatient>>,
    conditions: RwLock<Vec<Condition>>,
    observations: RwLock<Vec<Observation>>,
    medications: RwLock<Vec<MedicationRequest>>,
    consents: RwLock<Vec<Consent>>,
    risk_assessments: RwLock<Vec<RiskAssessment>>,
    plans: RwLock<Vec<InsurancePlan>>,
}

fn read<'a, T>(
    lock: &'a RwLock<T>,
    collection: &'static str,
) -> CoreResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| CoreError::StorePoisoned(collection))
}

fn write<'a, T>(
    lock: &'a RwLock<T>,
    collection: &'static str,
) -> CoreResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| CoreError::StorePoisoned(collection))
}

fn new_key() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Keep a caller-supplied identifier, or assign a fresh one.
fn assign_id(id: &mut Option<String>) -> String {
    match id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(existing) => existing.to_string(),
        None => {
            let key = new_key();
            *id = Some(key.clone());
            key
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every identifier a patient's records may be filed under.
    ///
    /// For a known patient this is its natural identifier and internal key. An unknown id is
    /// still matched verbatim so records filed before their patient remain reachable.
    fn patient_aliases(&self, patient_id: &str) -> CoreResult<Vec<String>> {
        let id = bare_patient_id(patient_id.trim());
        if id.is_empty() {
            return Ok(Vec::new());
        }

        let patients = read(&self.patients, "patients")?;
        Ok(match patients.iter().find(|p| p.is_identified_by(id)) {
            Some(p) if p.key != p.natural_id() => vec![p.natural_id().to_string(), p.key.clone()],
            Some(p) => vec![p.key.clone()],
            None => vec![id.to_string()],
        })
    }

    fn records_for<T: Clone>(
        &self,
        lock: &RwLock<Vec<T>>,
        collection: &'static str,
        patient_id: &str,
        subject_id: fn(&T) -> Option<&str>,
        keep: impl Fn(&T) -> bool,
    ) -> CoreResult<Vec<T>> {
        let aliases = self.patient_aliases(patient_id)?;
        if aliases.is_empty() {
            return Ok(Vec::new());
        }

        let records = read(lock, collection)?;
        Ok(records
            .iter()
            .filter(|r| subject_id(*r).is_some_and(|s| aliases.iter().any(|a| a == s)))
            .filter(|r| keep(*r))
            .cloned()
            .collect())
    }
}

impl ClinicalStore for InMemoryStore {
    fn find_patient(&self, id: &str) -> CoreResult<Option<StoredPatient>> {
        let patients = read(&self.patients, "patients")?;
        Ok(patients.iter().find(|p| p.is_identified_by(id)).cloned())
    }

    fn patients_by_gender(
        &self,
        gender: Option<AdministrativeGender>,
    ) -> CoreResult<Vec<StoredPatient>> {
        let patients = read(&self.patients, "patients")?;
        Ok(patients
            .iter()
            .filter(|p| p.patient.gender == gender)
            .cloned()
            .collect())
    }

    fn find_conditions(
        &self,
        patient_id: &str,
        status: Option<&str>,
    ) -> CoreResult<Vec<Condition>> {
        self.records_for(
            &self.conditions,
            "conditions",
            patient_id,
            Condition::subject_id,
            |c| status_matches(c.status(), status),
        )
    }

    fn find_observations(
        &self,
        patient_id: &str,
        status: Option<&str>,
    ) -> CoreResult<Vec<Observation>> {
        self.records_for(
            &self.observations,
            "observations",
            patient_id,
            Observation::subject_id,
            |o| status_matches(o.status.as_deref(), status),
        )
    }

    fn find_medications(
        &self,
        patient_id: &str,
        status: Option<&str>,
    ) -> CoreResult<Vec<MedicationRequest>> {
        self.records_for(
            &self.medications,
            "medications",
            patient_id,
            MedicationRequest::subject_id,
            |m| status_matches(m.status.as_deref(), status),
        )
    }

    fn find_conditions_for(&self, patients: &[StoredPatient]) -> CoreResult<ConditionsByPatient> {
        let mut owner_by_alias: HashMap<&str, &str> = HashMap::new();
        let mut grouped: ConditionsByPatient = HashMap::with_capacity(patients.len());
        for p in patients {
            owner_by_alias.insert(p.natural_id(), p.natural_id());
            owner_by_alias.insert(&p.key, p.natural_id());
            grouped.entry(p.natural_id().to_string()).or_default();
        }

        let conditions = read(&self.conditions, "conditions")?;
        for condition in conditions.iter() {
            let owner = condition
                .subject_id()
                .and_then(|s| owner_by_alias.get(s).copied());
            if let Some(owner) = owner {
                grouped
                    .entry(owner.to_string())
                    .or_default()
                    .push(condition.clone());
            }
        }
        Ok(grouped)
    }

    fn find_latest_risk_assessment(
        &self,
        patient_id: &str,
    ) -> CoreResult<Option<RiskAssessment>> {
        Ok(self.find_risk_assessments(patient_id)?.pop())
    }

    fn find_risk_assessments(&self, patient_id: &str) -> CoreResult<Vec<RiskAssessment>> {
        self.records_for(
            &self.risk_assessments,
            "risk_assessments",
            patient_id,
            RiskAssessment::patient_id,
            |_| true,
        )
    }

    fn create_risk_assessment(&self, mut assessment: RiskAssessment) -> CoreResult<String> {
        let id = assign_id(&mut assessment.id);
        write(&self.risk_assessments, "risk_assessments")?.push(assessment);
        Ok(id)
    }

    fn find_all_plans(&self) -> CoreResult<Vec<InsurancePlan>> {
        Ok(read(&self.plans, "plans")?.clone())
    }

    fn create_plan(&self, plan: InsurancePlan) -> CoreResult<String> {
        let mut plans = write(&self.plans, "plans")?;
        if plans.iter().any(|p| p.id == plan.id) {
            return Err(CoreError::DuplicatePlan(plan.id.to_string()));
        }
        let id = plan.id.to_string();
        plans.push(plan);
        Ok(id)
    }

    fn find_active_consent(&self, patient_id: &str) -> CoreResult<Option<Consent>> {
        Ok(self
            .records_for(
                &self.consents,
                "consents",
                patient_id,
                Consent::patient_id,
                Consent::is_active,
            )?
            .pop())
    }

    fn upsert_patient(&self, mut patient: Patient) -> CoreResult<String> {
        let mut patients = write(&self.patients, "patients")?;

        let natural_id = patient
            .id
            .as_deref()
            .map(|id| bare_patient_id(id.trim()).to_string())
            .filter(|id| !id.is_empty());

        if let Some(natural_id) = natural_id.as_deref() {
            if let Some(existing) = patients.iter().find(|p| p.natural_id() == natural_id) {
                tracing::debug!("patient {natural_id} already registered");
                return Ok(existing.key.clone());
            }
        }

        let key = new_key();
        patient.id = Some(natural_id.unwrap_or_else(|| key.clone()));
        patients.push(StoredPatient {
            key: key.clone(),
            patient,
        });
        Ok(key)
    }

    fn insert_condition(&self, mut condition: Condition) -> CoreResult<String> {
        let id = assign_id(&mut condition.id);
        write(&self.conditions, "conditions")?.push(condition);
        Ok(id)
    }

    fn insert_observation(&self, mut observation: Observation) -> CoreResult<String> {
        let id = assign_id(&mut observation.id);
        write(&self.observations, "observations")?.push(observation);
        Ok(id)
    }

    fn insert_medication(&self, mut medication: MedicationRequest) -> CoreResult<String> {
        let id = assign_id(&mut medication.id);
        write(&self.medications, "medications")?.push(medication);
        Ok(id)
    }

    fn insert_consent(&self, mut consent: Consent) -> CoreResult<String> {
        let id = assign_id(&mut consent.id);
        write(&self.consents, "consents")?.push(consent);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir::{ClinicalStatus, CodeableConcept, Reference, RiskLabel};
    use std::sync::Arc;

    fn patient(id: &str, gender: AdministrativeGender) -> Patient {
        Patient {
            id: Some(id.into()),
            gender: Some(gender),
            ..Patient::default()
        }
    }

    fn condition(subject: &str, text: &str, status: &str) -> Condition {
        Condition {
            subject: Some(Reference {
                reference: Some(subject.into()),
                display: None,
            }),
            code: Some(CodeableConcept::from_text(text)),
            clinical_status: Some(ClinicalStatus::Text(status.into())),
            ..Condition::default()
        }
    }

    #[test]
    fn upsert_is_idempotent_on_natural_id() {
        let store = InMemoryStore::new();
        let first = store
            .upsert_patient(patient("p001", AdministrativeGender::Male))
            .expect("insert");
        let second = store
            .upsert_patient(patient("Patient/p001", AdministrativeGender::Female))
            .expect("upsert");
        assert_eq!(first, second);

        let stored = store.find_patient("p001").expect("find").expect("present");
        assert_eq!(stored.patient.gender, Some(AdministrativeGender::Male));
        assert_eq!(store.find_patient(&first).expect("find by key"), Some(stored));
    }

    #[test]
    fn upsert_assigns_natural_id_when_missing() {
        let store = InMemoryStore::new();
        let key = store.upsert_patient(Patient::default()).expect("insert");
        let stored = store.find_patient(&key).expect("find").expect("present");
        assert_eq!(stored.natural_id(), key);
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn concurrent_registrations_collapse_to_one_record() {
        let store = Arc::new(InMemoryStore::new());
        let keys: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = Arc::clone(&store);
                    scope.spawn(move || {
                        store
                            .upsert_patient(patient("p042", AdministrativeGender::Other))
                            .expect("upsert")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("thread"))
                .collect()
        });

        assert!(keys.iter().all(|k| k == &keys[0]));
        assert_eq!(
            store
                .patients_by_gender(Some(AdministrativeGender::Other))
                .expect("list")
                .len(),
            1
        );
    }

    #[test]
    fn records_resolve_through_both_reference_formats_and_key() {
        let store = InMemoryStore::new();
        let key = store
            .upsert_patient(patient("p001", AdministrativeGender::Female))
            .expect("insert");
        store
            .insert_condition(condition("Patient/p001", "Asthma", "active"))
            .expect("insert");
        store
            .insert_condition(condition("p001", "Fever", "inactive"))
            .expect("insert");
        store
            .insert_condition(condition(&format!("Patient/{key}"), "Fracture", "Active"))
            .expect("insert");
        store
            .insert_condition(condition("p002", "Cancer", "active"))
            .expect("insert");

        assert_eq!(store.find_conditions("p001", None).expect("all").len(), 3);
        assert_eq!(store.find_conditions(&key, None).expect("by key").len(), 3);

        let active = store
            .find_conditions("Patient/p001", Some("active"))
            .expect("active");
        let names: Vec<_> = active.iter().filter_map(Condition::code_text).collect();
        assert_eq!(names, ["Asthma", "Fracture"]);
    }

    #[test]
    fn batched_conditions_group_by_natural_id() {
        let store = InMemoryStore::new();
        store
            .upsert_patient(patient("p001", AdministrativeGender::Male))
            .expect("insert");
        store
            .upsert_patient(patient("p002", AdministrativeGender::Male))
            .expect("insert");
        store
            .insert_condition(condition("Patient/p002", "Asthma", "active"))
            .expect("insert");
        store
            .insert_condition(condition("p002", "Fever", "active"))
            .expect("insert");
        store
            .insert_condition(condition("p999", "Stroke", "active"))
            .expect("insert");

        let patients = store
            .patients_by_gender(Some(AdministrativeGender::Male))
            .expect("list");
        let grouped = store.find_conditions_for(&patients).expect("batch");
        assert_eq!(grouped.len(), 2);
        assert!(grouped["p001"].is_empty());
        assert_eq!(grouped["p002"].len(), 2);
    }

    #[test]
    fn latest_assessment_is_last_created() {
        let store = InMemoryStore::new();
        let now = chrono::Utc::now();
        store
            .create_risk_assessment(RiskAssessment::new("p001", 20.0, RiskLabel::Low, "", now))
            .expect("create");
        let latest_id = store
            .create_risk_assessment(RiskAssessment::new("p001", 70.0, RiskLabel::High, "", now))
            .expect("create");

        let latest = store
            .find_latest_risk_assessment("p001")
            .expect("find")
            .expect("present");
        assert_eq!(latest.id.as_deref(), Some(latest_id.as_str()));
        assert_eq!(latest.label(), Some(RiskLabel::High));
        assert_eq!(store.find_risk_assessments("p001").expect("history").len(), 2);
        assert!(store
            .find_latest_risk_assessment("p002")
            .expect("find")
            .is_none());
    }

    #[test]
    fn only_active_consent_is_returned() {
        let store = InMemoryStore::new();
        store
            .insert_consent(Consent {
                status: Some("rejected".into()),
                ..Consent::active_for("p001")
            })
            .expect("insert");
        assert!(store.find_active_consent("p001").expect("find").is_none());

        store
            .insert_consent(Consent::active_for("p001"))
            .expect("insert");
        assert!(store
            .find_active_consent("Patient/p001")
            .expect("find")
            .is_some());
    }

    #[test]
    fn duplicate_plan_ids_are_rejected() {
        let store = InMemoryStore::new();
        let plans = crate::plans::default_plans().expect("defaults");
        store.create_plan(plans[0].clone()).expect("create");
        assert!(matches!(
            store.create_plan(plans[0].clone()),
            Err(CoreError::DuplicatePlan(id)) if id == "basic"
        ));
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let store = Arc::new(InMemoryStore::new());
        let poisoner = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.patients.write().expect("lock");
            panic!("poison the patients lock");
        })
        .join();

        assert!(matches!(
            store.find_patient("p001"),
            Err(CoreError::StorePoisoned("patients"))
        ));
    }
}
