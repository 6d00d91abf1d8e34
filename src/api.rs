use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::classifier::Facets;
use crate::config::CONFIG;
use crate::db::Database;
use crate::dispatcher;
use crate::error::{Error, Result};
use crate::geo::valid_coordinate;
use crate::models::{
    ActivityStats, Article, Coordinate, QueryOutcome, TrendingArticle,
};
use crate::trending;
use crate::{LLMParams, TARGET_WEB_REQUEST};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub llm: LLMParams,
    /// Facet snapshot used by the classifier. Loaded at startup, refreshed
    /// whenever the facet endpoints are served.
    pub facets: Arc<RwLock<Facets>>,
}

pub async fn serve(db: Database, llm: LLMParams, port: u16) -> anyhow::Result<()> {
    let facets = Facets::load(&db).await?;
    info!(
        "Loaded {} categories and {} sources for classification",
        facets.categories.len(),
        facets.sources.len()
    );

    let state = AppState {
        db,
        llm,
        facets: Arc::new(RwLock::new(facets)),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/v1/news/query", post(intelligent_query))
        .route("/api/v1/news/category", get(news_by_category))
        .route("/api/v1/news/source", get(news_by_source))
        .route("/api/v1/news/search", get(news_search))
        .route("/api/v1/news/score", get(news_by_score))
        .route("/api/v1/news/nearby", get(news_nearby))
        .route("/api/v1/news/random", get(news_random))
        .route("/api/v1/news/{id}", get(news_by_id))
        .route("/api/v1/news/categories", get(list_categories))
        .route("/api/v1/news/sources", get(list_sources))
        .route("/api/v1/trending", get(trending_feed))
        .route("/api/v1/events/simulate", post(simulate_events))
        .route("/api/v1/events/stats", get(event_stats))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, stage, message) = match &self {
            Error::InvalidInput { stage, message } => {
                (StatusCode::BAD_REQUEST, *stage, message.clone())
            }
            Error::NotFound { what } => (StatusCode::NOT_FOUND, *what, format!("{} not found", what)),
            Error::Upstream { stage, message } => {
                // Never leak upstream internals to the caller.
                error!(target: TARGET_WEB_REQUEST, "Upstream error at {}: {}", stage, message);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    *stage,
                    "upstream service unavailable".to_string(),
                )
            }
        };

        (
            status,
            axum::Json(json!({
                "error": status.canonical_reason().unwrap_or("error"),
                "stage": stage,
                "message": message,
            })),
        )
            .into_response()
    }
}

// --- request/response shapes ---

#[derive(Deserialize)]
struct IntelligentQueryRequest {
    query: String,
    lat: Option<f64>,
    lon: Option<f64>,
    limit: Option<i64>,
    #[serde(default)]
    include_summary: bool,
}

#[derive(Deserialize)]
struct FacetParams {
    name: String,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct ScoreParams {
    min_score: f64,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct NearbyParams {
    lat: f64,
    lon: f64,
    radius: Option<f64>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct SimulateParams {
    count: Option<usize>,
}

#[derive(Deserialize)]
struct StatsParams {
    hours: Option<i64>,
}

#[derive(serde::Serialize)]
struct ArticlePage {
    articles: Vec<Article>,
    total_count: i64,
    limit: i64,
}

// --- validation ---

fn validate_limit(limit: Option<i64>) -> Result<i64> {
    let limit = limit.unwrap_or(CONFIG.default_limit);
    if limit < 1 || limit > CONFIG.max_limit {
        return Err(Error::invalid(
            "limit",
            format!("limit must be between 1 and {}", CONFIG.max_limit),
        ));
    }
    Ok(limit)
}

fn validate_coordinate(lat: f64, lon: f64) -> Result<()> {
    if !valid_coordinate(lat, lon) {
        return Err(Error::invalid(
            "coordinates",
            "latitude must be in [-90, 90] and longitude in [-180, 180]",
        ));
    }
    Ok(())
}

fn validate_radius(radius: Option<f64>) -> Result<f64> {
    let radius = radius.unwrap_or(CONFIG.default_radius_km);
    if radius <= 0.0 || radius > CONFIG.max_radius_km {
        return Err(Error::invalid(
            "radius",
            format!("radius must be > 0 and <= {} km", CONFIG.max_radius_km),
        ));
    }
    Ok(radius)
}

fn optional_coordinate(lat: Option<f64>, lon: Option<f64>) -> Result<Option<Coordinate>> {
    match (lat, lon) {
        (Some(lat), Some(lon)) => {
            validate_coordinate(lat, lon)?;
            Ok(Some(Coordinate {
                latitude: lat,
                longitude: lon,
            }))
        }
        (None, None) => Ok(None),
        _ => Err(Error::invalid(
            "coordinates",
            "lat and lon must be provided together",
        )),
    }
}

// --- handlers ---

async fn health(State(state): State<AppState>) -> Result<&'static str> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(state.db.pool())
        .await?;
    Ok("OK")
}

async fn intelligent_query(
    State(state): State<AppState>,
    Json(request): Json<IntelligentQueryRequest>,
) -> Result<axum::Json<QueryOutcome>> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(Error::invalid("query", "query text must not be empty"));
    }
    let limit = validate_limit(request.limit)?;
    let coordinate = optional_coordinate(request.lat, request.lon)?;

    let facets = state.facets.read().await.clone();
    let outcome = dispatcher::execute(
        &state.db,
        &state.llm,
        &facets,
        query,
        coordinate,
        limit,
        request.include_summary,
    )
    .await?;

    Ok(axum::Json(outcome))
}

async fn news_by_category(
    State(state): State<AppState>,
    Query(params): Query<FacetParams>,
) -> Result<axum::Json<ArticlePage>> {
    let limit = validate_limit(params.limit)?;
    let (articles, total_count) = state.db.articles_by_category(&params.name, limit).await?;
    Ok(axum::Json(ArticlePage {
        articles,
        total_count,
        limit,
    }))
}

async fn news_by_source(
    State(state): State<AppState>,
    Query(params): Query<FacetParams>,
) -> Result<axum::Json<ArticlePage>> {
    let limit = validate_limit(params.limit)?;
    let (articles, total_count) = state.db.articles_by_source(&params.name, limit).await?;
    Ok(axum::Json(ArticlePage {
        articles,
        total_count,
        limit,
    }))
}

async fn news_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<axum::Json<ArticlePage>> {
    let keyword = params.query.trim();
    if keyword.is_empty() {
        return Err(Error::invalid("query", "search text must not be empty"));
    }
    let limit = validate_limit(params.limit)?;
    let (articles, total_count) = state.db.search_articles(keyword, limit).await?;
    Ok(axum::Json(ArticlePage {
        articles,
        total_count,
        limit,
    }))
}

async fn news_by_score(
    State(state): State<AppState>,
    Query(params): Query<ScoreParams>,
) -> Result<axum::Json<ArticlePage>> {
    if !(0.0..=1.0).contains(&params.min_score) {
        return Err(Error::invalid("min_score", "min_score must be in [0, 1]"));
    }
    let limit = validate_limit(params.limit)?;
    let (articles, total_count) = state.db.articles_by_score(params.min_score, limit).await?;
    Ok(axum::Json(ArticlePage {
        articles,
        total_count,
        limit,
    }))
}

async fn news_nearby(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
) -> Result<axum::Json<ArticlePage>> {
    validate_coordinate(params.lat, params.lon)?;
    let radius = validate_radius(params.radius)?;
    let limit = validate_limit(params.limit)?;
    let (articles, total_count) = state
        .db
        .nearby_articles(params.lat, params.lon, radius, limit)
        .await?;
    Ok(axum::Json(ArticlePage {
        articles,
        total_count,
        limit,
    }))
}

async fn news_random(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<axum::Json<ArticlePage>> {
    let limit = validate_limit(params.limit)?;
    let articles = state.db.random_articles(limit).await?;
    let total_count = articles.len() as i64;
    Ok(axum::Json(ArticlePage {
        articles,
        total_count,
        limit,
    }))
}

async fn news_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<axum::Json<Article>> {
    match state.db.article_by_id(&id).await? {
        Some(article) => Ok(axum::Json(article)),
        None => Err(Error::NotFound { what: "article" }),
    }
}

async fn list_categories(State(state): State<AppState>) -> Result<axum::Json<Vec<String>>> {
    let categories = state.db.distinct_categories().await?;
    state.facets.write().await.categories = categories.clone();
    Ok(axum::Json(categories))
}

async fn list_sources(State(state): State<AppState>) -> Result<axum::Json<Vec<String>>> {
    let sources = state.db.distinct_sources().await?;
    state.facets.write().await.sources = sources.clone();
    Ok(axum::Json(sources))
}

async fn trending_feed(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
) -> Result<axum::Json<Vec<TrendingArticle>>> {
    validate_coordinate(params.lat, params.lon)?;
    let radius = validate_radius(params.radius)?;
    let limit = validate_limit(params.limit)?;
    let ranked = trending::trending(&state.db, params.lat, params.lon, radius, limit).await?;
    Ok(axum::Json(ranked))
}

async fn simulate_events(
    State(state): State<AppState>,
    Query(params): Query<SimulateParams>,
) -> Result<axum::Json<serde_json::Value>> {
    let count = params.count.unwrap_or(100);
    if count == 0 || count > 10_000 {
        return Err(Error::invalid("count", "count must be between 1 and 10000"));
    }
    let created = trending::simulate_events(&state.db, count, 50.0).await?;
    Ok(axum::Json(json!({ "events_created": created })))
}

async fn event_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<axum::Json<ActivityStats>> {
    let hours = params.hours.unwrap_or(24);
    if hours < 1 || hours > 24 * 30 {
        return Err(Error::invalid("hours", "hours must be between 1 and 720"));
    }
    let stats = state.db.activity_stats(hours).await?;
    Ok(axum::Json(stats))
}
