//! # CareScore Core
//!
//! Core business logic for patient risk scoring and insurance recommendation.
//!
//! This crate contains the scoring engine and its collaborator contracts:
//! - Rule-based risk scoring with optional "what-if" weights ([`risk`])
//! - Patient similarity cohorts ([`similarity`])
//! - Plan catalog and coverage-based recommendation ([`plans`])
//! - Risk-tier recommendation orchestration behind a consent gate ([`recommendation`],
//!   [`consent`])
//! - Store contracts with an in-memory implementation ([`store`])
//!
//! **No API concerns**: HTTP servers and command-line handling belong in `api-rest` and
//! `carescore-cli`.

pub mod config;
pub mod consent;
pub mod constants;
pub mod error;
pub mod plans;
pub mod recommendation;
pub mod risk;
pub mod similarity;
pub mod store;

pub use carescore_types::NonEmptyText;
pub use config::CoreConfig;
pub use consent::ConsentGate;
pub use error::{CoreError, CoreResult};
pub use plans::{recommend_plan, Coverage, InsurancePlan, PlanCatalogService};
pub use recommendation::{CoverageRecommendation, InsuranceRecommendation, RecommendationService};
pub use risk::{compute_risk, RiskScore, RiskService, RiskWeights, WeightOverrides};
pub use similarity::{SimilarPatient, SimilarityService};
pub use store::{ClinicalStore, InMemoryStore, StoredPatient};

use std::sync::Arc;

/// Build an in-memory store ready to serve requests.
///
/// Loads the configured bundle, if any, then seeds the plan catalog from the configured YAML
/// file or the built-in defaults. Seeding is skipped when the bundle already populated plans.
///
/// # Errors
///
/// Returns a `CoreError` if the bundle or catalog file cannot be read or parsed.
pub fn bootstrap_store(cfg: &CoreConfig) -> CoreResult<Arc<InMemoryStore>> {
    let store = Arc::new(InMemoryStore::new());

    if let Some(bundle) = cfg.bundle_path() {
        tracing::info!("loading bundle from {}", bundle.display());
        store::load_bundle_file(store.as_ref(), bundle)?;
    }

    PlanCatalogService::new(store.clone()).ensure_seeded_from(cfg.plan_catalog_path())?;
    Ok(store)
}
