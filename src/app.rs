use axum::{
    http::{header, HeaderName, HeaderValue, Method, Uri},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer, ExposeHeaders},
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::JwksCache;
use crate::config::Settings;
use crate::error::ApiError;
use crate::middleware::{request_id::X_REQUEST_ID, request_id_layer};
use crate::routes;
use crate::services::{RedisCache, StripeClient};

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static(X_REQUEST_ID);

/// Shared application state, handed to every handler as `State<Arc<AppState>>`
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub settings: Settings,
    pub jwks_cache: JwksCache,
    pub cache: RedisCache,
    pub stripe: StripeClient,
    /// Shared HTTP client for the Supabase auth proxy
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(
        db: PgPool,
        settings: Settings,
        jwks_cache: JwksCache,
        cache: RedisCache,
        stripe: StripeClient,
        http_client: reqwest::Client,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            settings,
            jwks_cache,
            cache,
            stripe,
            http_client,
        })
    }
}

/// Router plus the middleware stack. Layers run outermost-last: CORS sees
/// the request first, the body limit last.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    let (set_request_id, propagate_request_id) = request_id_layer();

    let body_limit = RequestBodyLimitLayer::new(state.settings.max_body_bytes);

    Router::new()
        .merge(routes::router())
        .fallback(route_not_found)
        .layer(body_limit)
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let max_age = if settings.env.is_dev() {
        Duration::from_secs(86400)
    } else {
        Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            REQUEST_ID_HEADER,
        ]))
        .expose_headers(ExposeHeaders::list([REQUEST_ID_HEADER]))
        .allow_credentials(true)
        .max_age(max_age)
}
