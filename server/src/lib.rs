use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use ranking::catalog::load_catalog;
use ranking::{
    AdView, CandidateSource, CategoryResult, DisplayEngine, DisplayMetrics, HomepageLimits, HomepageResult,
    InMemoryCatalog, PlanPolicy, SearchFilters, SearchRequest,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Upper bound for any page size requested over HTTP.
pub const MAX_LIMIT: usize = 100;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub category: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub state: Option<String>,
    pub city: Option<String>,
    /// Buyer's state, used for location scoring only.
    pub user_state: Option<String>,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
}
fn default_search_limit() -> i64 { 20 }

#[derive(Deserialize)]
pub struct HomepageParams {
    #[serde(default = "default_section_limit")]
    pub featured_limit: i64,
    #[serde(default = "default_section_limit")]
    pub premium_limit: i64,
    #[serde(default = "default_regular_limit")]
    pub regular_limit: i64,
    /// Featured carousel interval in seconds; 0 disables rotation.
    #[serde(default)]
    pub rotation_interval: u64,
}
fn default_section_limit() -> i64 { 4 }
fn default_regular_limit() -> i64 { 8 }

#[derive(Deserialize)]
pub struct SimilarParams {
    #[serde(default = "default_similar_limit")]
    pub limit: i64,
}
fn default_similar_limit() -> i64 { 6 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: Option<String>,
    pub took_s: f64,
    pub ads: Vec<AdView>,
    pub metrics: DisplayMetrics,
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<InMemoryCatalog>,
    pub engine: Arc<RwLock<DisplayEngine>>,
    pub policy_path: Option<PathBuf>,
    pub admin_token: Option<String>,
}

pub fn build_app(catalog_path: &std::path::Path, policy_path: Option<PathBuf>) -> Result<Router> {
    let catalog = load_catalog(catalog_path)?;
    let policy = match &policy_path {
        Some(p) => PlanPolicy::from_file(p)?,
        None => PlanPolicy::default(),
    };
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let state = AppState {
        catalog: Arc::new(catalog),
        engine: Arc::new(RwLock::new(DisplayEngine::new(policy))),
        policy_path,
        admin_token,
    };
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/ads", get(search_handler))
        .route("/ads/homepage", get(homepage_handler))
        .route("/ads/category/:category_id", get(category_handler))
        .route("/ads/slug/:slug", get(slug_handler))
        .route("/ads/:id", get(ad_handler))
        .route("/ads/:id/similar", get(similar_handler))
        .route("/admin/policy", get(policy_handler))
        .route("/admin/policy/reload", post(reload_policy))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Reject negative limits, clamp large ones.
fn limit_arg(name: &str, value: i64) -> Result<usize, ApiError> {
    if value < 0 {
        return Err((StatusCode::BAD_REQUEST, format!("{name} must be non-negative")));
    }
    Ok((value as usize).min(MAX_LIMIT))
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let limit = limit_arg("limit", params.limit)?;
    if let (Some(min), Some(max)) = (params.price_min, params.price_max) {
        if min > max {
            return Err((StatusCode::BAD_REQUEST, "price_min must not exceed price_max".into()));
        }
    }
    let req = SearchRequest {
        query: params.q.clone(),
        filters: SearchFilters {
            category_id: params.category,
            price_min: params.price_min,
            price_max: params.price_max,
            state: params.state,
            city: params.city,
        },
        buyer_state: params.user_state,
        limit,
    };
    let results = {
        let engine = state.engine.read();
        engine.search_with_metrics(state.catalog.as_ref(), &req, OffsetDateTime::now_utc(), &mut rand::thread_rng())
    };
    Ok(Json(SearchResponse {
        query: params.q,
        took_s: start.elapsed().as_secs_f64(),
        ads: results.ads,
        metrics: results.metrics,
    }))
}

pub async fn homepage_handler(
    State(state): State<AppState>,
    Query(params): Query<HomepageParams>,
) -> Result<Json<HomepageResult>, ApiError> {
    let limits = HomepageLimits {
        featured: limit_arg("featured_limit", params.featured_limit)?,
        premium: limit_arg("premium_limit", params.premium_limit)?,
        regular: limit_arg("regular_limit", params.regular_limit)?,
        rotation_interval: params.rotation_interval,
    };
    let engine = state.engine.read();
    let home = engine.homepage(state.catalog.as_ref(), limits, OffsetDateTime::now_utc(), &mut rand::thread_rng());
    Ok(Json(home))
}

pub async fn category_handler(State(state): State<AppState>, Path(category_id): Path<String>) -> Json<CategoryResult> {
    let engine = state.engine.read();
    Json(engine.category(state.catalog.as_ref(), &category_id, OffsetDateTime::now_utc(), &mut rand::thread_rng()))
}

pub async fn ad_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<AdView>, ApiError> {
    state
        .catalog
        .find(&id)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("ad {id} not found")))
}

/// Lookup by public slug. Like `/ads/:id`, any status resolves.
pub async fn slug_handler(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<AdView>, ApiError> {
    state
        .catalog
        .find_by_slug(&slug)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("ad with slug {slug} not found")))
}

pub async fn similar_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<Vec<AdView>>, ApiError> {
    let limit = limit_arg("limit", params.limit)?;
    let current = state
        .catalog
        .find(&id)
        .ok_or((StatusCode::NOT_FOUND, format!("ad {id} not found")))?;
    let engine = state.engine.read();
    Ok(Json(engine.similar(state.catalog.as_ref(), &current, limit, OffsetDateTime::now_utc())))
}

// --- Admin endpoints ---
async fn policy_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<PlanPolicy>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.engine.read().policy().clone()))
}

async fn reload_policy(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<PlanPolicy>, ApiError> {
    authorize(&state, &headers)?;
    let path = state
        .policy_path
        .as_ref()
        .ok_or((StatusCode::CONFLICT, "server was started without --policy".to_string()))?;
    let policy = PlanPolicy::from_file(path).map_err(|e| {
        tracing::warn!(error = %format!("{e:#}"), "policy reload rejected");
        (StatusCode::UNPROCESSABLE_ENTITY, format!("{e:#}"))
    })?;
    *state.engine.write() = DisplayEngine::new(policy.clone());
    tracing::info!(path = %path.display(), "plan policy swapped");
    Ok(Json(policy))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
