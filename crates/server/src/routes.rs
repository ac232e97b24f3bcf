//! HTTP routes: public cache-backed reads and the admin surface

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pecoin_core::{
    BatchBalanceRequest, BatchBalanceResponse, EntityKind, EntityUpdate, Error,
    NativeBalanceRequest, NewEntity,
};
use pecoin_engine::images::ImageSource;
use pecoin_engine::{format_address, Backend};
use pecoin_persistence::sqlite;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Largest `keys` array accepted by the batch signing endpoint
const MAX_SIGN_BATCH: usize = 500;

const RECENT_METRICS: usize = 20;

pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/balances", post(batch_balances))
        .route("/api/balances/native", post(native_balances))
        .route("/api/signed-url", get(signed_url))
        .route("/api/signed-urls", post(signed_urls))
        .route("/api/image", get(image_proxy))
        .route("/api/wallets/{address}/name", get(wallet_name))
        .route("/api/ecosystem/stats", get(ecosystem_stats));

    let admin_routes = Router::new()
        .route("/api/admin/caches", get(cache_stats))
        .route("/api/admin/caches/invalidate", post(invalidate_caches))
        .route("/api/admin/caches/cleanup", post(cleanup_caches))
        .route("/api/admin/caches/clear", post(clear_caches))
        .route("/api/admin/names/clear", post(clear_names))
        .route("/api/admin/performance", get(performance))
        .route("/api/admin/ecosystem/refresh", post(refresh_ecosystem))
        .route("/api/admin/uploads/refresh", post(refresh_upload))
        .route(
            "/api/admin/entities/{kind}",
            get(list_entities).post(create_entity),
        )
        .route(
            "/api/admin/entities/{kind}/{id}",
            get(get_entity).put(update_entity).delete(delete_entity),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

// ─── Admin Middleware ──────────────────────────────────────────────

fn tokens_match(provided: &[u8], expected: &[u8]) -> bool {
    provided.len() == expected.len()
        && provided
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Bearer-token gate for `/api/admin`
async fn admin_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return (StatusCode::FORBIDDEN, "Admin surface disabled").into_response();
    };

    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if tokens_match(token.as_bytes(), expected.as_bytes()) => next.run(req).await,
        _ => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
    }
}

// ─── Public Handlers ───────────────────────────────────────────────

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

async fn health() -> &'static str {
    "ok"
}

/// POST /api/balances
async fn batch_balances(
    State(state): State<AppState>,
    payload: Result<Json<BatchBalanceRequest>, JsonRejection>,
) -> ApiResult<Json<BatchBalanceResponse>> {
    let request = body(payload)?;
    let started = Instant::now();

    let lookup = state
        .balances
        .get_balances(&request.wallets, &request.mint)
        .await?;

    state
        .monitor
        .record_api_call(Backend::Internal, lookup.error.is_none(), started.elapsed());
    let total_ms = started.elapsed().as_millis() as u64;
    Ok(Json(BatchBalanceResponse::from_lookup(lookup, total_ms)))
}

/// POST /api/balances/native
async fn native_balances(
    State(state): State<AppState>,
    payload: Result<Json<NativeBalanceRequest>, JsonRejection>,
) -> ApiResult<Json<BatchBalanceResponse>> {
    let request = body(payload)?;
    let started = Instant::now();

    let lookup = state.balances.get_native_balances(&request.wallets).await?;

    state
        .monitor
        .record_api_call(Backend::Internal, lookup.error.is_none(), started.elapsed());
    let total_ms = started.elapsed().as_millis() as u64;
    Ok(Json(BatchBalanceResponse::from_lookup(lookup, total_ms)))
}

#[derive(Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

/// GET /api/signed-url?key=
async fn signed_url(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> ApiResult<Json<Value>> {
    let key = query
        .key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("key is required"))?;

    let url = state.signed_urls.get_signed_url(&key).await;
    Ok(Json(json!({ "key": key, "url": url })))
}

#[derive(Deserialize)]
struct SignedUrlsRequest {
    keys: Vec<String>,
}

/// POST /api/signed-urls
async fn signed_urls(
    State(state): State<AppState>,
    payload: Result<Json<SignedUrlsRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = body(payload)?;
    if request.keys.len() > MAX_SIGN_BATCH {
        return Err(ApiError::bad_request(format!(
            "too many keys: {} (max {})",
            request.keys.len(),
            MAX_SIGN_BATCH
        )));
    }

    let urls = state.signed_urls.get_signed_urls(&request.keys).await;
    Ok(Json(json!({ "urls": urls })))
}

#[derive(Deserialize)]
struct ImageQuery {
    url: Option<String>,
}

/// GET /api/image?url=
async fn image_proxy(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> ApiResult<Response> {
    let url = query
        .url
        .ok_or_else(|| ApiError::bad_request("url is required"))?;
    let served = state.images.load(&url).await?;

    let cache_control = match served.source {
        ImageSource::Placeholder => "public, max-age=60",
        ImageSource::Cache | ImageSource::Origin => "public, max-age=3600",
    };

    Ok((
        [
            (header::CONTENT_TYPE, served.content_type.clone()),
            (header::CACHE_CONTROL, cache_control.to_string()),
            (HeaderName::from_static("x-cache"), served.source.to_string()),
        ],
        served.bytes,
    )
        .into_response())
}

/// GET /api/wallets/{address}/name
async fn wallet_name(State(state): State<AppState>, Path(address): Path<String>) -> Json<Value> {
    let name = state.names.resolve(&address).await;
    Json(json!({
        "address": address,
        "shortAddress": format_address(&address),
        "name": name,
    }))
}

/// GET /api/ecosystem/stats
async fn ecosystem_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.ecosystem.stats_revalidating())
}

// ─── Admin Handlers ────────────────────────────────────────────────

async fn cache_stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "caches": state.registry.stats() }))
}

#[derive(Deserialize)]
struct InvalidateRequest {
    pattern: String,
    #[serde(default)]
    cache: Option<String>,
}

async fn invalidate_caches(
    State(state): State<AppState>,
    payload: Result<Json<InvalidateRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let request = body(payload)?;
    let report = state
        .registry
        .invalidate(&request.pattern, request.cache.as_deref())?;
    Ok(Json(report))
}

async fn cleanup_caches(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.cleanup())
}

#[derive(Deserialize)]
struct CacheQuery {
    cache: Option<String>,
}

async fn clear_caches(
    State(state): State<AppState>,
    Query(query): Query<CacheQuery>,
) -> ApiResult<Json<Value>> {
    let cleared = state.registry.clear(query.cache.as_deref())?;
    Ok(Json(json!({ "cleared": cleared })))
}

async fn clear_names(State(state): State<AppState>) -> StatusCode {
    state.names.clear_cache().await;
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct PerformanceQuery {
    limit: Option<usize>,
}

async fn performance(
    State(state): State<AppState>,
    Query(query): Query<PerformanceQuery>,
) -> Json<Value> {
    let monitor = &state.monitor;
    let advice = monitor.routing_advice();
    Json(json!({
        "stats": monitor.stats(),
        "recent": monitor.recent(query.limit.unwrap_or(RECENT_METRICS)),
        "slow": monitor.slow_operations(monitor.slow_threshold()),
        "recommendation": advice.to_string(),
        "routing": advice,
    }))
}

async fn refresh_ecosystem(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.ecosystem.refresh().await)
}

#[derive(Deserialize)]
struct UploadRefreshRequest {
    key: String,
}

/// Called by the upload pathway after an object was overwritten
async fn refresh_upload(
    State(state): State<AppState>,
    payload: Result<Json<UploadRefreshRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = body(payload)?;
    if request.key.trim().is_empty() {
        return Err(ApiError::bad_request("key is required"));
    }
    let url = state.signed_urls.refresh_after_upload(&request.key).await;
    Ok(Json(json!({ "key": request.key, "url": url })))
}

async fn list_entities(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let kind: EntityKind = kind.parse()?;
    let entities = sqlite::list_entities(state.database.pool(), kind).await?;
    Ok(Json(entities))
}

async fn get_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<impl IntoResponse> {
    let kind: EntityKind = kind.parse()?;
    let entity = sqlite::get_entity(state.database.pool(), kind, id)
        .await?
        .ok_or_else(|| Error::EntityNotFound {
            kind: kind.to_string(),
            id,
        })?;
    Ok(Json(entity))
}

async fn create_entity(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    payload: Result<Json<NewEntity>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let kind: EntityKind = kind.parse()?;
    let new = body(payload)?;
    let entity = sqlite::create_entity(state.database.pool(), kind, &new).await?;
    state.names.clear_cache().await;
    Ok((StatusCode::CREATED, Json(entity)))
}

async fn update_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
    payload: Result<Json<EntityUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let kind: EntityKind = kind.parse()?;
    let update = body(payload)?;
    let entity = sqlite::update_entity(state.database.pool(), kind, id, &update).await?;

    state.names.clear_cache().await;
    if let Some(logo) = update.logo_path.as_deref() {
        state.signed_urls.invalidate(logo);
    }
    Ok(Json(entity))
}

async fn delete_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<StatusCode> {
    let kind: EntityKind = kind.parse()?;
    if !sqlite::delete_entity(state.database.pool(), kind, id).await? {
        return Err(Error::EntityNotFound {
            kind: kind.to_string(),
            id,
        }
        .into());
    }
    state.names.clear_cache().await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Collaborators;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use pecoin_core::{
        ActivityProvider, BalanceProvider, FetchedImage, ImageOrigin, NftAsset, Result,
        TransactionSummary, UrlSigner,
    };
    use pecoin_engine::CacheSettings;
    use pecoin_persistence::Database;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const ADMIN: &str = "test-admin-token-0001";

    struct StaticChain;

    #[async_trait]
    impl BalanceProvider for StaticChain {
        async fn batch_token_balances(
            &self,
            wallets: &[String],
            _mint: &str,
        ) -> Result<HashMap<String, f64>> {
            Ok(wallets
                .iter()
                .filter(|w| w.as_str() == "W1")
                .map(|w| (w.clone(), 10.0))
                .collect())
        }

        async fn batch_native_balances(&self, wallets: &[String]) -> Result<HashMap<String, f64>> {
            Ok(wallets.iter().map(|w| (w.clone(), 0.5)).collect())
        }
    }

    #[async_trait]
    impl ActivityProvider for StaticChain {
        async fn batch_nfts(&self, _wallets: &[String]) -> Result<HashMap<String, Vec<NftAsset>>> {
            Ok(HashMap::new())
        }

        async fn batch_transactions(
            &self,
            _wallets: &[String],
            _limit: usize,
        ) -> Result<HashMap<String, Vec<TransactionSummary>>> {
            Ok(HashMap::new())
        }
    }

    struct StaticSigner;

    #[async_trait]
    impl UrlSigner for StaticSigner {
        async fn create_signed_url(&self, path: &str, _expires_in: Duration) -> Result<String> {
            Ok(format!("https://storage.test/{}?token=abc", path))
        }
    }

    struct NoImages;

    #[async_trait]
    impl ImageOrigin for NoImages {
        async fn fetch_image(&self, url: &str) -> Result<FetchedImage> {
            Err(Error::ApiError(format!("404 for {}", url)))
        }
    }

    async fn app() -> Router {
        let database = Arc::new(Database::connect_in_memory().await.unwrap());
        let chain = Arc::new(StaticChain);
        let collaborators = Collaborators {
            balances: chain.clone(),
            activity: chain,
            signer: Arc::new(StaticSigner),
            images: Arc::new(NoImages),
        };
        let mut settings = CacheSettings::default();
        settings.ecosystem.mint = "MINT".into();
        let state = AppState::assemble(collaborators, database, &settings, Some(ADMIN.into()));
        build_router(state, &ServerConfig::default())
    }

    fn post_json(uri: &str, payload: Value) -> HttpRequest<Body> {
        HttpRequest::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN))
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_batch_balances_endpoint() {
        let app = app().await;
        let response = app
            .oneshot(post_json(
                "/api/balances",
                json!({ "wallets": ["W1", "W2", "W1"], "mint": "MINT" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["balances"]["W1"], 10.0);
        assert_eq!(body["balances"]["W2"], 0.0);
        assert_eq!(body["failed"], json!(["W2"]));
        assert_eq!(body["timing"]["fetched"], 1);
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_bad_balance_requests_are_400() {
        let app = app().await;
        let missing = app
            .clone()
            .oneshot(post_json("/api/balances", json!({ "mint": "MINT" })))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let blank_mint = app
            .oneshot(post_json("/api/balances", json!({ "wallets": ["W1"], "mint": "" })))
            .await
            .unwrap();
        assert_eq!(blank_mint.status(), StatusCode::BAD_REQUEST);
        assert!(read_json(blank_mint).await["error"]
            .as_str()
            .unwrap()
            .contains("mint"));
    }

    #[tokio::test]
    async fn test_signed_url_endpoints() {
        let app = app().await;
        let single = app
            .clone()
            .oneshot(
                HttpRequest::get("/api/signed-url?key=logos/a.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            read_json(single).await["url"],
            "https://storage.test/logos/a.png?token=abc"
        );

        let missing = app
            .clone()
            .oneshot(HttpRequest::get("/api/signed-url").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let batch = app
            .oneshot(post_json(
                "/api/signed-urls",
                json!({ "keys": ["b.png", "https://x.test/c.png"] }),
            ))
            .await
            .unwrap();
        let urls = read_json(batch).await["urls"].clone();
        assert_eq!(urls[1], "https://x.test/c.png");
    }

    #[tokio::test]
    async fn test_image_failure_serves_placeholder() {
        let app = app().await;
        let response = app
            .oneshot(
                HttpRequest::get("/api/image?url=https://img.test/gone.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/svg+xml");
        assert_eq!(response.headers()["x-cache"], "PLACEHOLDER");
    }

    #[tokio::test]
    async fn test_admin_requires_bearer_token() {
        let app = app().await;
        let anonymous = app
            .clone()
            .oneshot(HttpRequest::get("/api/admin/caches").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let authorized = app
            .oneshot(
                HttpRequest::get("/api/admin/caches")
                    .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(authorized.status(), StatusCode::OK);
        let caches = read_json(authorized).await["caches"].clone();
        assert_eq!(caches.as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_entity_writes_refresh_wallet_names() {
        let app = app().await;
        let created = app
            .clone()
            .oneshot(post_json(
                "/api/admin/entities/teams",
                json!({ "name": "Alpha", "walletAddress": "AlphaWallet1111111111" }),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);

        let name_of = |wallet: &str| {
            HttpRequest::get(format!("/api/wallets/{}/name", wallet))
                .body(Body::empty())
                .unwrap()
        };

        // Absent from a non-empty snapshot: negatively cached
        let before = app.clone().oneshot(name_of("BetaWallet22222222222")).await.unwrap();
        assert!(read_json(before).await["name"].is_null());

        app.clone()
            .oneshot(post_json(
                "/api/admin/entities/startup",
                json!({ "name": "Beta", "walletAddress": "BetaWallet22222222222" }),
            ))
            .await
            .unwrap();

        let after = app.clone().oneshot(name_of("BetaWallet22222222222")).await.unwrap();
        let body = read_json(after).await;
        assert_eq!(body["name"]["name"], "Beta");
        assert_eq!(body["name"]["type"], "startup");
        assert_eq!(body["shortAddress"], "Beta...2222");

        let unknown_kind = app
            .oneshot(post_json("/api/admin/entities/investors", json!({ "name": "X" })))
            .await
            .unwrap();
        assert_eq!(unknown_kind.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalidate_rejects_bad_pattern() {
        let app = app().await;
        let response = app
            .oneshot(post_json("/api/admin/caches/invalidate", json!({ "pattern": "(" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match(b"secret", b"secret"));
        assert!(!tokens_match(b"secret", b"secreT"));
        assert!(!tokens_match(b"secret", b"secret-longer"));
    }
}
