//! Insurance plan catalog and coverage-based recommendation.
//!
//! Responsibilities:
//! - Define the plan document shape (`id`, `name`, `cost`, `description`, `coverage`)
//! - Pick the cheapest plan whose coverage fits a patient's conditions
//! - Seed the catalog with the default plans (or a YAML catalog file) at bootstrap
//!
//! Notes:
//! - Coverage keywords match when the keyword is a substring of the condition name, never the
//!   reverse: a plan covering `"Diabetes mellitus"` does not cover `"Diabetes"`
//! - Seeding happens once at startup; reads never write

use crate::constants::{COVERS_ALL_SENTINEL, COVERS_ALL_TEXT};
use crate::store::ClinicalStore;
use crate::{CoreError, CoreResult};
use carescore_types::NonEmptyText;
use fhir::Condition;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Coverage
// ============================================================================

/// What a plan covers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoverage", into = "Vec<String>")]
pub enum Coverage {
    /// Covers every condition.
    All,
    /// Covers conditions whose name contains one of these keywords.
    Keywords(Vec<String>),
}

/// Coverage as stored: a bare string or a list of strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCoverage {
    Text(String),
    List(Vec<String>),
}

fn is_covers_all(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case(COVERS_ALL_SENTINEL) || value.eq_ignore_ascii_case(COVERS_ALL_TEXT)
}

impl TryFrom<RawCoverage> for Coverage {
    type Error = String;

    fn try_from(raw: RawCoverage) -> Result<Self, Self::Error> {
        let values = match raw {
            RawCoverage::Text(text) => vec![text],
            RawCoverage::List(list) => list,
        };

        if values.iter().any(|v| is_covers_all(v)) {
            return Ok(Coverage::All);
        }

        let keywords: Vec<String> = values
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if keywords.is_empty() {
            return Err("coverage must name at least one condition keyword".into());
        }
        Ok(Coverage::Keywords(keywords))
    }
}

impl From<Coverage> for Vec<String> {
    fn from(coverage: Coverage) -> Self {
        match coverage {
            Coverage::All => vec![COVERS_ALL_SENTINEL.to_string()],
            Coverage::Keywords(keywords) => keywords,
        }
    }
}

impl Coverage {
    /// Whether a single condition name is covered.
    pub fn covers(&self, condition_name: &str) -> bool {
        match self {
            Coverage::All => true,
            Coverage::Keywords(keywords) => {
                let name = condition_name.to_lowercase();
                keywords
                    .iter()
                    .any(|keyword| name.contains(&keyword.to_lowercase()))
            }
        }
    }

    /// Whether every condition name is covered.
    pub fn covers_every(&self, condition_names: &[&str]) -> bool {
        condition_names.iter().all(|name| self.covers(name))
    }
}

// ============================================================================
// Plans
// ============================================================================

/// An insurance plan in the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsurancePlan {
    pub id: NonEmptyText,
    pub name: NonEmptyText,
    /// Monthly cost.
    pub cost: f64,
    #[serde(default)]
    pub description: String,
    pub coverage: Coverage,
}

impl InsurancePlan {
    /// Reject plans whose cost cannot be ordered.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err(CoreError::InvalidInput(format!(
                "plan {} has invalid cost {}",
                self.id, self.cost
            )));
        }
        Ok(())
    }
}

/// A YAML catalog document.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    plans: Vec<InsurancePlan>,
}

const DEFAULT_PLAN_TABLE: [(&str, &str, f64, &str, &[&str]); 5] = [
    (
        "basic",
        "Basic Care",
        50.0,
        "Covers basic seasonal illnesses like cold, fever, and minor infections.",
        &["Acute upper respiratory infection", "Fever", "Cough", "Headache"],
    ),
    (
        "standard",
        "Standard Care",
        100.0,
        "Includes Basic coverage plus common chronic conditions management (early stage).",
        &[
            "Acute upper respiratory infection",
            "Fever",
            "Cough",
            "Headache",
            "Hypertension",
            "Allergic rhinitis",
        ],
    ),
    (
        "gold",
        "Gold Premium",
        200.0,
        "Comprehensive coverage including diabetes management and moderate conditions.",
        &[
            "Acute upper respiratory infection",
            "Fever",
            "Cough",
            "Headache",
            "Hypertension",
            "Allergic rhinitis",
            "Diabetes mellitus",
            "Asthma",
        ],
    ),
    (
        "platinum",
        "Platinum Elite",
        350.0,
        "Full coverage for serious chronic conditions, cardiac issues, and surgeries.",
        &[
            "Acute upper respiratory infection",
            "Fever",
            "Cough",
            "Headache",
            "Hypertension",
            "Allergic rhinitis",
            "Diabetes mellitus",
            "Asthma",
            "Coronary heart disease",
            "Fracture",
        ],
    ),
    (
        "comprehensive",
        "Universal Comprehensive",
        500.0,
        "Total coverage for all known conditions, rare diseases, and long-term care.",
        &[COVERS_ALL_SENTINEL],
    ),
];

/// The built-in catalog: basic, standard, gold, platinum and comprehensive.
pub fn default_plans() -> CoreResult<Vec<InsurancePlan>> {
    DEFAULT_PLAN_TABLE
        .iter()
        .map(|(id, name, cost, description, coverage)| -> CoreResult<InsurancePlan> {
            let coverage = if coverage.iter().any(|c| is_covers_all(c)) {
                Coverage::All
            } else {
                Coverage::Keywords(coverage.iter().map(|c| c.to_string()).collect())
            };
            Ok(InsurancePlan {
                id: NonEmptyText::new(id)?,
                name: NonEmptyText::new(name)?,
                cost: *cost,
                description: description.to_string(),
                coverage,
            })
        })
        .collect()
}

/// Load a catalog from a YAML file with a top-level `plans` list.
///
/// # Errors
///
/// Returns a `CoreError` if:
/// - the file cannot be read,
/// - the YAML does not match the catalog shape (the error names the failing field path),
/// - a plan has a negative or non-finite cost.
pub fn load_catalog_file(path: &Path) -> CoreResult<Vec<InsurancePlan>> {
    let text = std::fs::read_to_string(path).map_err(CoreError::FileRead)?;
    let catalog: CatalogFile =
        serde_path_to_error::deserialize(serde_yaml::Deserializer::from_str(&text)).map_err(
            |err| {
                let path = err.path().to_string();
                CoreError::YamlDeserialization {
                    path,
                    source: err.into_inner(),
                }
            },
        )?;

    for plan in &catalog.plans {
        plan.validate()?;
    }
    Ok(catalog.plans)
}

/// Catalog plans ordered by ascending cost. Equal costs keep their catalog order.
pub fn sorted_by_cost(catalog: &[InsurancePlan]) -> Vec<&InsurancePlan> {
    let mut plans: Vec<&InsurancePlan> = catalog.iter().collect();
    plans.sort_by(|a, b| a.cost.total_cmp(&b.cost));
    plans
}

/// Recommend the cheapest plan covering every condition.
///
/// - no conditions: the cheapest plan
/// - otherwise the first plan, by ascending cost, that covers all or whose keywords match every
///   condition name
/// - no match: the most expensive plan
///
/// A condition without code text has an empty name, which only a covers-all plan matches.
///
/// # Errors
///
/// Returns `CoreError::EmptyCatalog` if the catalog has no plans.
pub fn recommend_plan(
    conditions: &[Condition],
    catalog: &[InsurancePlan],
) -> CoreResult<InsurancePlan> {
    let plans = sorted_by_cost(catalog);
    let (Some(cheapest), Some(most_expensive)) = (plans.first(), plans.last()) else {
        return Err(CoreError::EmptyCatalog);
    };

    if conditions.is_empty() {
        return Ok((*cheapest).clone());
    }

    let names: Vec<&str> = conditions
        .iter()
        .map(|c| c.code_text().unwrap_or_default())
        .collect();

    let chosen = plans
        .iter()
        .find(|plan| plan.coverage.covers_every(&names))
        .unwrap_or(most_expensive);
    Ok((*chosen).clone())
}

// ============================================================================
// Catalog service
// ============================================================================

/// Catalog operations over the plan store.
#[derive(Clone)]
pub struct PlanCatalogService {
    store: Arc<dyn ClinicalStore>,
}

impl PlanCatalogService {
    pub fn new(store: Arc<dyn ClinicalStore>) -> Self {
        Self { store }
    }

    /// Seed the built-in plans if the catalog is empty.
    ///
    /// Returns the number of plans inserted (zero when the catalog was already populated).
    pub fn ensure_seeded(&self) -> CoreResult<usize> {
        self.seed_with(default_plans()?)
    }

    /// Seed the given plans if the catalog is empty.
    pub fn seed_with(&self, plans: Vec<InsurancePlan>) -> CoreResult<usize> {
        if !self.store.find_all_plans()?.is_empty() {
            tracing::debug!("plan catalog already populated; skipping seed");
            return Ok(0);
        }

        let count = plans.len();
        for plan in plans {
            plan.validate()?;
            self.store.create_plan(plan)?;
        }
        tracing::info!("seeded plan catalog with {count} plans");
        Ok(count)
    }

    /// Seed from a YAML catalog file when one is configured, otherwise from the defaults.
    pub fn ensure_seeded_from(&self, catalog_path: Option<&Path>) -> CoreResult<usize> {
        match catalog_path {
            Some(path) => {
                tracing::info!("loading plan catalog from {}", path.display());
                self.seed_with(load_catalog_file(path)?)
            }
            None => self.ensure_seeded(),
        }
    }

    /// All plans, cheapest first.
    pub fn plans(&self) -> CoreResult<Vec<InsurancePlan>> {
        let catalog = self.store.find_all_plans()?;
        Ok(sorted_by_cost(&catalog).into_iter().cloned().collect())
    }

    /// A single plan by id.
    pub fn plan(&self, id: &str) -> CoreResult<Option<InsurancePlan>> {
        let id = id.trim();
        Ok(self
            .store
            .find_all_plans()?
            .into_iter()
            .find(|plan| plan.id == *id))
    }

    /// Recommend a plan for the given conditions against the live catalog.
    pub fn recommend(&self, conditions: &[Condition]) -> CoreResult<InsurancePlan> {
        recommend_plan(conditions, &self.store.find_all_plans()?)
    }
}
