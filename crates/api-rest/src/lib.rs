//! # API REST
//!
//! REST API implementation for CareScore.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI documentation (served as JSON)
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Handlers are thin: every operation delegates to a `carescore-core` service and maps
//! `CoreError` onto a status code.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use carescore_core::config::path_from_env_value;
use carescore_core::{
    ClinicalStore, CoreConfig, CoreError, CoverageRecommendation, InsurancePlan,
    InsuranceRecommendation, PlanCatalogService, RecommendationService, RiskService,
    SimilarPatient, SimilarityService, WeightOverrides,
};
use fhir::RiskAssessment;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};

// ============================================================================
// State
// ============================================================================

/// Application state for the REST API server
///
/// Holds the core services shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    risk: RiskService,
    similarity: SimilarityService,
    catalog: PlanCatalogService,
    recommendation: RecommendationService,
}

/// Build the core configuration from the `CARESCORE_BUNDLE` and `CARESCORE_PLAN_CATALOG`
/// environment variables. Unset or blank values mean "not configured".
pub fn core_config_from_env() -> CoreConfig {
    CoreConfig::default()
        .with_bundle(path_from_env_value(std::env::var("CARESCORE_BUNDLE").ok()))
        .with_plan_catalog(path_from_env_value(
            std::env::var("CARESCORE_PLAN_CATALOG").ok(),
        ))
}

impl AppState {
    pub fn new(store: Arc<dyn ClinicalStore>, cfg: Arc<CoreConfig>) -> Self {
        Self {
            risk: RiskService::new(store.clone()),
            similarity: SimilarityService::new(store.clone(), cfg.clone()),
            catalog: PlanCatalogService::new(store.clone()),
            recommendation: RecommendationService::new(store, cfg),
        }
    }
}

// ============================================================================
// Request/response bodies
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RiskRes {
    #[serde(rename = "patientId")]
    pub patient_id: String,
    pub risk_score: f64,
    pub risk_label: String,
    /// Present only for persisted assessments.
    pub risk_assessment_id: Option<String>,
    pub breakdown: Option<String>,
    pub occurred_at: Option<String>,
}

impl RiskRes {
    fn from_assessment(patient_id: &str, assessment: &RiskAssessment) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            risk_score: assessment.score().unwrap_or_default(),
            risk_label: assessment.label_display().unwrap_or("Unknown").to_string(),
            risk_assessment_id: assessment.id.clone(),
            breakdown: assessment.breakdown().map(str::to_owned),
            occurred_at: assessment.occurrence_date_time.clone(),
        }
    }
}

/// Custom weights for a what-if simulation; omitted keys keep their default.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SimulateRiskReq {
    pub age: Option<f64>,
    pub conditions: Option<f64>,
    pub observations: Option<f64>,
    pub medications: Option<f64>,
}

impl From<SimulateRiskReq> for WeightOverrides {
    fn from(req: SimulateRiskReq) -> Self {
        WeightOverrides {
            age: req.age,
            conditions: req.conditions,
            observations: req.observations,
            medications: req.medications,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RiskHistoryRes {
    #[serde(rename = "patientId")]
    pub patient_id: String,
    pub assessments: Vec<RiskRes>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SimilarPatientRes {
    pub patient_id: String,
    pub name: String,
    pub similarity_score: u32,
    pub reasons: Vec<String>,
}

impl From<SimilarPatient> for SimilarPatientRes {
    fn from(p: SimilarPatient) -> Self {
        Self {
            patient_id: p.patient_id,
            name: p.name,
            similarity_score: p.score,
            reasons: p.reasons,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlanRes {
    pub id: String,
    pub name: String,
    pub cost: f64,
    pub description: String,
    /// Condition keywords, or `["ALL"]` for a plan that covers everything.
    pub coverage: Vec<String>,
}

impl From<InsurancePlan> for PlanRes {
    fn from(plan: InsurancePlan) -> Self {
        Self {
            id: plan.id.to_string(),
            name: plan.name.to_string(),
            cost: plan.cost,
            description: plan.description,
            coverage: plan.coverage.into(),
        }
    }
}

fn plan_list(plans: Vec<InsurancePlan>) -> Vec<PlanRes> {
    plans.into_iter().map(PlanRes::from).collect()
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InsuranceRecommendationRes {
    pub patient_id: String,
    pub risk_level: String,
    pub recommended_plans: Vec<PlanRes>,
    pub explanation: String,
    pub similar_patient_count: usize,
}

impl From<InsuranceRecommendation> for InsuranceRecommendationRes {
    fn from(rec: InsuranceRecommendation) -> Self {
        Self {
            patient_id: rec.patient_id,
            risk_level: rec.risk_level,
            recommended_plans: plan_list(rec.recommended_plans),
            explanation: rec.explanation,
            similar_patient_count: rec.similar_patient_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CoverageRecommendationRes {
    pub patient_id: String,
    pub condition_count: usize,
    pub conditions: Vec<String>,
    pub medications: Vec<String>,
    pub recommended_plan: PlanRes,
    pub similar_cohort_size: usize,
    pub similar_patients_preview: Vec<String>,
    pub all_plans: Vec<PlanRes>,
}

impl From<CoverageRecommendation> for CoverageRecommendationRes {
    fn from(rec: CoverageRecommendation) -> Self {
        Self {
            patient_id: rec.patient_id,
            condition_count: rec.condition_count,
            conditions: rec.conditions,
            medications: rec.medications,
            recommended_plan: rec.recommended_plan.into(),
            similar_cohort_size: rec.similar_cohort_size,
            similar_patients_preview: rec.similar_patients_preview,
            all_plans: plan_list(rec.all_plans),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

type ApiError = (StatusCode, Json<ErrorRes>);

/// Map a core error onto an HTTP status and JSON error body.
fn api_error(err: CoreError) -> ApiError {
    let status = match &err {
        CoreError::PatientNotFound(_) | CoreError::EmptyCatalog => StatusCode::NOT_FOUND,
        CoreError::ConsentRequired => StatusCode::FORBIDDEN,
        CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => {
            tracing::error!("request failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorRes {
            error: err.to_string(),
        }),
    )
}

// ============================================================================
// Router
// ============================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        get_patient_risk,
        simulate_patient_risk,
        get_risk_history,
        get_similar_patients,
        get_coverage_recommendation,
        get_insurance_recommendation,
        list_plans,
        get_plan,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        RiskRes,
        SimulateRiskReq,
        RiskHistoryRes,
        SimilarPatientRes,
        PlanRes,
        InsuranceRecommendationRes,
        CoverageRecommendationRes,
    ))
)]
pub struct ApiDoc;

/// Build the REST router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/patients/:id/risk", get(get_patient_risk))
        .route("/patients/:id/risk/simulate", post(simulate_patient_risk))
        .route("/patients/:id/risk/history", get(get_risk_history))
        .route("/patients/:id/similar", get(get_similar_patients))
        .route("/patients/:id/insurance-recommendation", get(get_insurance_recommendation))
        .route("/recommendation/:id", post(get_coverage_recommendation))
        .route("/plans", get(list_plans))
        .route("/plans/:id", get(get_plan))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// ============================================================================
// Handlers
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "CareScore REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/patients/{id}/risk",
    params(("id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Computed and persisted risk assessment", body = RiskRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    )
)]
/// Score a patient with the default weights and persist the assessment.
#[axum::debug_handler]
async fn get_patient_risk(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<RiskRes>, ApiError> {
    let assessment = state.risk.compute_risk(&id).map_err(api_error)?;
    Ok(Json(RiskRes::from_assessment(&id, &assessment)))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/risk/simulate",
    params(("id" = String, Path, description = "Patient identifier")),
    request_body = SimulateRiskReq,
    responses(
        (status = 200, description = "Simulated risk (never persisted)", body = RiskRes),
        (status = 400, description = "Invalid weights", body = ErrorRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    )
)]
/// What-if risk score with custom component weights.
///
/// # Errors
/// Returns `400 Bad Request` if any weight is not a positive finite number.
#[axum::debug_handler]
async fn simulate_patient_risk(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<SimulateRiskReq>,
) -> Result<Json<RiskRes>, ApiError> {
    let weights = WeightOverrides::from(req).resolve().map_err(api_error)?;
    let assessment = state
        .risk
        .simulate_risk(&id, &weights)
        .map_err(api_error)?;
    Ok(Json(RiskRes::from_assessment(&id, &assessment)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/risk/history",
    params(("id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Persisted assessments, oldest first", body = RiskHistoryRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    )
)]
/// Risk trend for a patient.
#[axum::debug_handler]
async fn get_risk_history(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<RiskHistoryRes>, ApiError> {
    let history = state.risk.risk_history(&id).map_err(api_error)?;
    Ok(Json(RiskHistoryRes {
        assessments: history
            .iter()
            .map(|a| RiskRes::from_assessment(&id, a))
            .collect(),
        patient_id: id,
    }))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/similar",
    params(("id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Similarity cohort (empty for unknown patients)", body = [SimilarPatientRes])
    )
)]
/// Patients most similar to the given patient.
#[axum::debug_handler]
async fn get_similar_patients(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Vec<SimilarPatientRes>>, ApiError> {
    let cohort = state
        .similarity
        .find_similar_patients(&id)
        .map_err(api_error)?;
    Ok(Json(cohort.into_iter().map(SimilarPatientRes::from).collect()))
}

#[utoipa::path(
    post,
    path = "/recommendation/{id}",
    params(("id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Cheapest plan covering the patient's active conditions", body = CoverageRecommendationRes),
        (status = 403, description = "Patient consent required", body = ErrorRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    )
)]
/// Coverage-based plan recommendation.
#[axum::debug_handler]
async fn get_coverage_recommendation(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<CoverageRecommendationRes>, ApiError> {
    let rec = state
        .recommendation
        .get_coverage_recommendation(&id)
        .map_err(api_error)?;
    Ok(Json(rec.into()))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/insurance-recommendation",
    params(("id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Risk-tier plan shortlist", body = InsuranceRecommendationRes),
        (status = 403, description = "Patient consent required", body = ErrorRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    )
)]
/// Risk-tier plan recommendation with cohort explanation.
#[axum::debug_handler]
async fn get_insurance_recommendation(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<InsuranceRecommendationRes>, ApiError> {
    let rec = state
        .recommendation
        .get_insurance_recommendation(&id)
        .map_err(api_error)?;
    Ok(Json(rec.into()))
}

#[utoipa::path(
    get,
    path = "/plans",
    responses(
        (status = 200, description = "Plan catalog, cheapest first", body = [PlanRes])
    )
)]
/// List the plan catalog.
#[axum::debug_handler]
async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<PlanRes>>, ApiError> {
    let plans = state.catalog.plans().map_err(api_error)?;
    Ok(Json(plan_list(plans)))
}

#[utoipa::path(
    get,
    path = "/plans/{id}",
    params(("id" = String, Path, description = "Plan identifier")),
    responses(
        (status = 200, description = "Catalog plan", body = PlanRes),
        (status = 404, description = "Plan not found", body = ErrorRes)
    )
)]
/// Fetch one plan from the catalog.
#[axum::debug_handler]
async fn get_plan(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<PlanRes>, ApiError> {
    match state.catalog.plan(&id).map_err(api_error)? {
        Some(plan) => Ok(Json(plan.into())),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorRes {
                error: format!("insurance plan not found: {id}"),
            }),
        )),
    }
}
