use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, Request, State};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub mod api_envelope;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod domain_store;
pub mod observability;
pub mod openapi;
pub mod payments;
pub mod reconcile;

mod event_team_routes;
mod payment_routes;
mod registration_routes;
mod team_routes;
mod user_routes;

#[cfg(test)]
mod tests;

use crate::api_envelope::{
    ApiErrorCode, ApiErrorResponse, ApiErrorTuple, conflict_error, created_data, error_response,
    error_response_with_status, forbidden_error, not_found_error, ok_data, unauthorized_error,
    validation_error,
};
use crate::auth::{AuthError, AuthService, AuthUser};
use crate::catalog::{EventCatalog, EventDetail, EventKind};
use crate::config::Config;
use crate::domain_store::{
    CreatePaymentOrderInput, CreateUserInput, DomainStore, DomainStoreError, LeaveEventOutcome,
    PaymentTarget, RegisterEventInput, TeamMemberIdentity, UpdateUserInput, normalize_email,
};
use crate::observability::{AuditEvent, Observability};
use crate::openapi::{
    ROUTE_ADMIN_TEAM_SHORTLIST, ROUTE_EVENT_BY_ID, ROUTE_EVENT_LEAVE,
    ROUTE_EVENT_MY_REGISTRATIONS, ROUTE_EVENT_REGISTER, ROUTE_EVENT_TEAM_BY_ID,
    ROUTE_EVENT_TEAM_PAY, ROUTE_EVENT_TEAM_REMOVE, ROUTE_EVENT_TEAMS_CREATE,
    ROUTE_EVENT_TEAMS_JOIN, ROUTE_EVENT_TEAMS_ME, ROUTE_EVENTS, ROUTE_OPENAPI_JSON,
    ROUTE_PAYMENT_BY_ID, ROUTE_PAYMENT_CREATE_ORDER, ROUTE_PAYMENT_VERIFY, ROUTE_PAYMENT_WEBHOOK,
    ROUTE_TEAM_CREATE, ROUTE_TEAM_DELETE, ROUTE_TEAM_DRIVE_LINK, ROUTE_TEAM_FINALIZE,
    ROUTE_TEAM_GET, ROUTE_TEAM_INVITE, ROUTE_TEAM_INVITE_ACCEPT, ROUTE_TEAM_INVITES,
    ROUTE_TEAM_JOIN, ROUTE_TEAM_LEAVE, ROUTE_TEAM_REMOVE, ROUTE_USER_CREATE, ROUTE_USER_EXISTS,
    ROUTE_USER_PROFILE, ROUTE_USER_UPDATE, ROUTE_USERS, ROUTE_USERS_CHECK_EMAILS,
    ROUTE_VERIFY_PAYMENT_BY_ORDER, openapi_document,
};
use crate::payments::{
    GatewayCustomer, GatewayError, GatewayOrderRequest, PaymentGateway, WebhookSignature,
    gateway_from_config, new_order_id, new_receipt,
};
use crate::reconcile::{CheckoutVerification, PaymentReconciler, ReconcileError, ReconcileOutcome};

const SERVICE_NAME: &str = "eventhub-service";
const HEADER_X_FORWARDED_FOR: &str = "x-forwarded-for";
const HEADER_X_REAL_IP: &str = "x-real-ip";
const HEADER_X_REQUEST_ID: &str = "x-request-id";
const CACHE_MANIFEST: &str = "no-cache, no-store, must-revalidate";
const REQUEST_TIMEOUT_SECONDS: u64 = 30;
const CORS_MAX_AGE_SECONDS: u64 = 60 * 60;
const THROTTLE_SWEEP_THRESHOLD: usize = 1024;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    auth: AuthService,
    catalog: Arc<EventCatalog>,
    store: DomainStore,
    reconciler: PaymentReconciler,
    observability: Observability,
    throttle_state: ThrottleState,
    started_at: SystemTime,
}

#[derive(Clone, Default)]
struct ThrottleState {
    buckets: Arc<Mutex<HashMap<String, VecDeque<i64>>>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    auth_provider: &'static str,
    payment_gateway: &'static str,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    payment_gateway: &'static str,
    payment_gateway_configured: bool,
    store_persistent: bool,
}

pub fn build_router(config: Config) -> Router {
    build_router_with_observability(config, Observability::default())
}

pub fn build_router_with_observability(config: Config, observability: Observability) -> Router {
    let gateway = gateway_from_config(&config);
    build_router_with_gateway(config, observability, gateway)
}

pub fn build_router_with_gateway(
    config: Config,
    observability: Observability,
    gateway: Arc<dyn PaymentGateway>,
) -> Router {
    let auth = AuthService::from_config(&config);
    let catalog = Arc::new(EventCatalog::from_config(&config));
    let store = DomainStore::from_config(&config);
    let reconciler =
        PaymentReconciler::new(&config, store.clone(), gateway, observability.clone());
    let cors = cors_layer(&config);
    let state = AppState {
        config: Arc::new(config),
        auth,
        catalog,
        store,
        reconciler,
        observability,
        throttle_state: ThrottleState::default(),
        started_at: SystemTime::now(),
    };
    let registration_throttle_state = state.clone();
    let payment_throttle_state = state.clone();
    let authenticated_routes_state = state.clone();
    let admin_state = state.clone();

    let public_api_router = Router::new()
        .route(ROUTE_EVENTS, get(registration_routes::list_events))
        .route(ROUTE_EVENT_BY_ID, get(registration_routes::get_event))
        .route(ROUTE_USER_EXISTS, get(user_routes::user_exists))
        .route(
            ROUTE_VERIFY_PAYMENT_BY_ORDER,
            get(payment_routes::verify_payment_by_order).route_layer(
                middleware::from_fn_with_state(
                    payment_throttle_state.clone(),
                    throttle_payment_gate,
                ),
            ),
        )
        .route(ROUTE_PAYMENT_WEBHOOK, post(payment_routes::payment_webhook));

    let protected_api_router = Router::new()
        .route(ROUTE_USER_CREATE, post(user_routes::create_user))
        .route(ROUTE_USER_UPDATE, post(user_routes::update_user))
        .route(ROUTE_USER_PROFILE, get(user_routes::user_profile))
        .route(ROUTE_USERS, get(user_routes::list_users))
        .route(ROUTE_USERS_CHECK_EMAILS, post(user_routes::check_emails))
        .route(
            ROUTE_EVENT_REGISTER,
            post(registration_routes::register_event).route_layer(
                middleware::from_fn_with_state(
                    registration_throttle_state.clone(),
                    throttle_registration_gate,
                ),
            ),
        )
        .route(
            ROUTE_EVENT_LEAVE,
            post(registration_routes::leave_event).route_layer(middleware::from_fn_with_state(
                registration_throttle_state.clone(),
                throttle_registration_gate,
            )),
        )
        .route(
            ROUTE_EVENT_MY_REGISTRATIONS,
            get(registration_routes::my_registrations),
        )
        .route(ROUTE_TEAM_CREATE, post(team_routes::create_team))
        .route(ROUTE_TEAM_JOIN, post(team_routes::join_team))
        .route(ROUTE_TEAM_GET, get(team_routes::get_team))
        .route(ROUTE_TEAM_REMOVE, post(team_routes::remove_member))
        .route(ROUTE_TEAM_LEAVE, post(team_routes::leave_team))
        .route(ROUTE_TEAM_DELETE, post(team_routes::delete_team))
        .route(ROUTE_TEAM_FINALIZE, post(team_routes::finalize_team))
        .route(ROUTE_TEAM_DRIVE_LINK, post(team_routes::set_drive_link))
        .route(ROUTE_TEAM_INVITE, post(team_routes::invite_member))
        .route(ROUTE_TEAM_INVITES, get(team_routes::list_invites))
        .route(ROUTE_TEAM_INVITE_ACCEPT, post(team_routes::accept_invite))
        .route(
            ROUTE_EVENT_TEAMS_ME,
            get(event_team_routes::my_event_team).post(event_team_routes::my_event_team),
        )
        .route(
            ROUTE_EVENT_TEAMS_CREATE,
            post(event_team_routes::create_event_team).route_layer(
                middleware::from_fn_with_state(
                    registration_throttle_state.clone(),
                    throttle_registration_gate,
                ),
            ),
        )
        .route(
            ROUTE_EVENT_TEAMS_JOIN,
            post(event_team_routes::join_event_team).route_layer(
                middleware::from_fn_with_state(
                    registration_throttle_state,
                    throttle_registration_gate,
                ),
            ),
        )
        .route(
            ROUTE_EVENT_TEAM_BY_ID,
            delete(event_team_routes::disband_event_team),
        )
        .route(
            ROUTE_EVENT_TEAM_REMOVE,
            post(event_team_routes::remove_event_team_member),
        )
        .route(
            ROUTE_EVENT_TEAM_PAY,
            post(event_team_routes::pay_event_team).route_layer(
                middleware::from_fn_with_state(
                    payment_throttle_state.clone(),
                    throttle_payment_gate,
                ),
            ),
        )
        .route(
            ROUTE_PAYMENT_CREATE_ORDER,
            post(payment_routes::create_order).route_layer(middleware::from_fn_with_state(
                payment_throttle_state.clone(),
                throttle_payment_gate,
            )),
        )
        .route(
            ROUTE_PAYMENT_VERIFY,
            post(payment_routes::verify_payment).route_layer(middleware::from_fn_with_state(
                payment_throttle_state,
                throttle_payment_gate,
            )),
        )
        .route(ROUTE_PAYMENT_BY_ID, get(payment_routes::get_payment))
        .route_layer(middleware::from_fn_with_state(
            authenticated_routes_state.clone(),
            auth_session_gate,
        ));

    let admin_router = Router::new()
        .route(ROUTE_ADMIN_TEAM_SHORTLIST, post(team_routes::shortlist_team))
        .route_layer(middleware::from_fn_with_state(admin_state, admin_email_gate))
        .route_layer(middleware::from_fn_with_state(
            authenticated_routes_state,
            auth_session_gate,
        ));

    Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(readiness))
        .route(ROUTE_OPENAPI_JSON, get(openapi_spec))
        .merge(public_api_router)
        .merge(protected_api_router)
        .merge(admin_router)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECONDS)))
                .layer(cors),
        )
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECONDS))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = match state.started_at.elapsed() {
        Ok(duration) => duration.as_secs(),
        Err(_) => 0,
    };

    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        auth_provider: state.auth.provider_name(),
        payment_gateway: state.reconciler.gateway().name(),
    })
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let gateway = state.reconciler.gateway();
    let configured = gateway.is_configured();
    let body = ReadinessResponse {
        status: if configured { "ready" } else { "not_ready" },
        payment_gateway: gateway.name(),
        payment_gateway_configured: configured,
        store_persistent: state.store.is_persistent(),
    };

    if configured {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

async fn auth_session_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match auth_user_from_headers(&state, request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(response) => response.into_response(),
    }
}

async fn admin_email_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let user = if let Some(existing) = request.extensions().get::<AuthUser>() {
        existing.clone()
    } else {
        match auth_user_from_headers(&state, request.headers()).await {
            Ok(user) => user,
            Err(response) => return response.into_response(),
        }
    };

    if !state.config.is_admin_email(&user.email) {
        return forbidden_error("Forbidden.").into_response();
    }

    next.run(request).await
}

async fn throttle_registration_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = format!("registration:{}", request_identity_key(request.headers()));
    match consume_throttle_token(
        &state.throttle_state,
        &key,
        state.config.throttle_registration_limit,
        state.config.throttle_registration_window_seconds,
    )
    .await
    {
        Ok(()) => next.run(request).await,
        Err(retry_after_seconds) => rate_limited(retry_after_seconds),
    }
}

async fn throttle_payment_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = format!("payment:{}", request_identity_key(request.headers()));
    match consume_throttle_token(
        &state.throttle_state,
        &key,
        state.config.throttle_payment_limit,
        state.config.throttle_payment_window_seconds,
    )
    .await
    {
        Ok(()) => next.run(request).await,
        Err(retry_after_seconds) => rate_limited(retry_after_seconds),
    }
}

fn rate_limited(retry_after_seconds: i64) -> Response {
    error_response_with_status(
        StatusCode::TOO_MANY_REQUESTS,
        ApiErrorCode::RateLimited,
        format!("Too many requests. Retry in {retry_after_seconds}s."),
    )
    .into_response()
}

async fn consume_throttle_token(
    throttle_state: &ThrottleState,
    bucket_key: &str,
    max_requests: usize,
    window_seconds: i64,
) -> Result<(), i64> {
    let now_epoch = Utc::now().timestamp();
    let window_start = now_epoch - window_seconds;

    let mut buckets = throttle_state.buckets.lock().await;
    if buckets.len() > THROTTLE_SWEEP_THRESHOLD {
        sweep_idle_buckets(&mut buckets, bucket_key, window_start);
    }
    let bucket = buckets.entry(bucket_key.to_string()).or_default();

    while let Some(oldest) = bucket.front() {
        if *oldest < window_start {
            let _ = bucket.pop_front();
        } else {
            break;
        }
    }

    if bucket.len() >= max_requests {
        let retry_after = bucket
            .front()
            .map(|oldest| ((*oldest + window_seconds) - now_epoch).max(1))
            .unwrap_or(1);
        return Err(retry_after);
    }

    bucket.push_back(now_epoch);
    Ok(())
}

/// Drops buckets sharing `bucket_key`'s gate prefix that saw no request inside
/// the window. Other gates keep their own windows.
fn sweep_idle_buckets(
    buckets: &mut HashMap<String, VecDeque<i64>>,
    bucket_key: &str,
    window_start: i64,
) {
    let prefix = bucket_key
        .split_once(':')
        .map_or(bucket_key, |(gate, _)| gate);
    buckets.retain(|key, timestamps| {
        let same_gate = key
            .split_once(':')
            .is_some_and(|(gate, _)| gate == prefix);
        match timestamps.back() {
            None => false,
            Some(latest) => !same_gate || *latest >= window_start,
        }
    });
}

async fn auth_user_from_headers(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthUser, ApiErrorTuple> {
    let id_token = access_token_from_headers(headers, &state.config.auth_cookie_name)
        .ok_or_else(|| unauthorized_error("Unauthenticated."))?;
    state
        .auth
        .verify_token(&id_token)
        .await
        .map_err(map_auth_error)
}

fn request_identity_key(headers: &HeaderMap) -> String {
    if let Some(id_token) = bearer_token(headers) {
        return format!("token:{id_token}");
    }

    if let Some(value) = header_string(headers, HEADER_X_FORWARDED_FOR) {
        let first_ip = value.split(',').next().unwrap_or_default().trim();
        if !first_ip.is_empty() {
            return format!("ip:{first_ip}");
        }
    }

    if let Some(value) = header_string(headers, HEADER_X_REAL_IP) {
        return format!("ip:{value}");
    }

    "ip:unknown".to_string()
}

async fn openapi_spec() -> Result<impl IntoResponse, (StatusCode, Json<ApiErrorResponse>)> {
    let document = openapi_document();
    let encoded = serde_json::to_vec(&document).map_err(|_| {
        error_response_with_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorCode::InternalError,
            "Failed to generate OpenAPI document.".to_string(),
        )
    })?;

    let mut response = Response::new(Body::from(encoded));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_MANIFEST));

    Ok(response)
}

fn map_auth_error(error: AuthError) -> ApiErrorTuple {
    match error {
        AuthError::Unauthorized { message } => unauthorized_error(&message),
        AuthError::Provider { message } => {
            tracing::warn!(reason = %message, "identity provider unavailable");
            error_response_with_status(
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorCode::ServiceUnavailable,
                "Identity provider is unavailable.",
            )
        }
    }
}

fn map_domain_store_error(error: DomainStoreError) -> ApiErrorTuple {
    match error {
        DomainStoreError::Validation { field, message } => validation_error(field, &message),
        DomainStoreError::Rejected { message } => {
            error_response(ApiErrorCode::InvalidRequest, message)
        }
        DomainStoreError::NotFound { message } => not_found_error(message),
        DomainStoreError::Forbidden { message } => forbidden_error(&message),
        DomainStoreError::Conflict { message } => conflict_error(message),
        DomainStoreError::Persistence { message } => {
            tracing::error!(reason = %message, "domain store persistence failed");
            error_response(
                ApiErrorCode::ServiceUnavailable,
                "Storage is temporarily unavailable.",
            )
        }
    }
}

fn map_gateway_error(error: GatewayError) -> ApiErrorTuple {
    match error {
        GatewayError::NotFound { message } => not_found_error(message),
        GatewayError::NotConfigured { message } => {
            error_response(ApiErrorCode::ServiceUnavailable, message)
        }
        other => {
            tracing::warn!(target: "eventhub.payments", reason = %other, "payment gateway request failed");
            error_response(
                ApiErrorCode::UpstreamUnavailable,
                "Payment gateway request failed.",
            )
        }
    }
}

fn map_reconcile_error(error: ReconcileError) -> ApiErrorTuple {
    match error {
        ReconcileError::UnknownOrder { .. } => not_found_error("Payment order not found."),
        ReconcileError::AmountMismatch { message } => {
            error_response(ApiErrorCode::PaymentRejected, message)
        }
        ReconcileError::NotCaptured { status } => error_response(
            ApiErrorCode::PaymentRejected,
            format!("Payment is {status}, not captured."),
        ),
        ReconcileError::InvalidSignature => {
            error_response(ApiErrorCode::PaymentRejected, "Invalid payment signature.")
        }
        ReconcileError::TargetMismatch => error_response(
            ApiErrorCode::InvalidRequest,
            "Order does not belong to this payment target.",
        ),
        ReconcileError::NotConfigured { message } => {
            error_response(ApiErrorCode::ServiceUnavailable, message)
        }
        // Lookups here follow a recorded order or a signed callback.
        ReconcileError::Gateway(GatewayError::NotFound { message }) => {
            tracing::warn!(
                target: "eventhub.payments",
                reason = %message,
                "payment gateway has no record of a known payment",
            );
            error_response(
                ApiErrorCode::UpstreamUnavailable,
                "Payment gateway request failed.",
            )
        }
        ReconcileError::Gateway(error) => map_gateway_error(error),
        ReconcileError::Store(error) => map_domain_store_error(error),
    }
}

fn orphaned_capture_error() -> ApiErrorTuple {
    conflict_error("Payment was captured but its registration no longer exists.")
}

/// Catalog lookup for write paths, where an unknown id is a bad request.
fn catalog_event(state: &AppState, event_id: u32) -> Result<EventDetail, ApiErrorTuple> {
    state
        .catalog
        .get(event_id)
        .cloned()
        .ok_or_else(|| error_response(ApiErrorCode::InvalidRequest, "Unknown event"))
}

async fn member_identity(state: &AppState, user: &AuthUser) -> TeamMemberIdentity {
    let name = state
        .store
        .get_user(&user.uid)
        .await
        .map(|profile| profile.name)
        .and_then(non_empty)
        .unwrap_or_else(|| user.name.clone());

    TeamMemberIdentity {
        uid: user.uid.clone(),
        name,
        email: user.email.clone(),
    }
}

/// Accepts a JSON number or a numeric string.
fn parse_event_id(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(number) => number.as_u64().and_then(|id| u32::try_from(id).ok()),
        Value::String(raw) => raw.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn path_event_id(raw: &str) -> Result<u32, ApiErrorTuple> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| validation_error("event_id", "The event id must be numeric."))
}

fn required_string(
    value: Option<String>,
    field: &'static str,
    message: &str,
) -> Result<String, ApiErrorTuple> {
    value
        .and_then(non_empty)
        .ok_or_else(|| validation_error(field, message))
}

fn required_email(
    value: Option<String>,
    field: &'static str,
    message: &str,
) -> Result<String, ApiErrorTuple> {
    value
        .as_deref()
        .and_then(normalize_email)
        .ok_or_else(|| validation_error(field, message))
}

fn access_token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    bearer_token(headers).or_else(|| extract_cookie_value(headers, cookie_name))
}

fn request_id(headers: &HeaderMap) -> String {
    header_string(headers, HEADER_X_REQUEST_ID)
        .unwrap_or_else(|| format!("req_{}", Uuid::new_v4().simple()))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = header_string(headers, AUTHORIZATION.as_str())?;
    let token = header.strip_prefix("Bearer ")?;
    non_empty(token.to_string())
}

fn header_string(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn extract_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let cookie_header = header_string(headers, COOKIE.as_str())?;
    for part in cookie_header.split(';') {
        let mut pieces = part.trim().splitn(2, '=');
        let key = pieces.next().unwrap_or_default().trim();
        let value = pieces.next().unwrap_or_default().trim();
        if key == cookie_name && !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
