use crate::culqi::{CardData, ChargeRequest, CulqiClient, RefundRequest};
use crate::error::{PaymentError, Result};
use crate::healthcheck::health_handler;
use crate::metrics::{self, metrics_handler, MetricsService};
use crate::observability::request_id_middleware;
use axum::{
    extract::{rejection::JsonRejection, MatchedPath, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<CulqiClient>,
    /// Cancelled on graceful shutdown; aborts pending charge retries
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(client: CulqiClient, shutdown: CancellationToken) -> Self {
        Self {
            client: Arc::new(client),
            shutdown,
            started_at: Instant::now(),
        }
    }
}

/// Success envelope: `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Build the HTTP application
pub fn build_app(state: AppState, metrics: Option<MetricsService>) -> Router {
    let mut app = Router::new()
        .route("/api/payments/charges", post(create_charge))
        .route("/api/payments/charges/:id", get(get_charge))
        .route("/api/payments/charges/:id/refunds", post(refund_charge))
        .route("/api/payments/tokens", post(create_token))
        .route("/health", get(health_handler))
        .with_state(state);

    if let Some(metrics) = metrics {
        app = app.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(metrics),
        );
    }

    app.layer(middleware::from_fn(track_metrics))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

/// `POST /api/payments/charges`
pub async fn create_charge(
    State(state): State<AppState>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(value) = body.map_err(rejection_error)?;
    let request = ChargeRequest::from_json(value)?;

    let charge = state
        .client
        .create_charge_with_cancel(&request, &state.shutdown)
        .await?;

    Ok((StatusCode::CREATED, ApiResponse::ok(charge)))
}

/// `GET /api/payments/charges/:id`
pub async fn get_charge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let charge = state.client.get_charge(&id).await?;
    Ok(ApiResponse::ok(charge))
}

/// `POST /api/payments/charges/:id/refunds`
pub async fn refund_charge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let request: RefundRequest = parse_body(body, "refund request")?;
    let refund = state.client.refund_charge(&id, request.amount).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(refund)))
}

/// `POST /api/payments/tokens`
pub async fn create_token(
    State(state): State<AppState>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let card: CardData = parse_body(body, "card data")?;
    let token = state.client.create_token(&card).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(token)))
}

fn parse_body<T: DeserializeOwned>(
    body: std::result::Result<Json<Value>, JsonRejection>,
    what: &str,
) -> Result<T> {
    let Json(value) = body.map_err(rejection_error)?;
    serde_json::from_value(value).map_err(|e| PaymentError::Validation {
        message: format!("Invalid {}: {}", what, e),
        details: None,
    })
}

fn rejection_error(rejection: JsonRejection) -> PaymentError {
    PaymentError::Validation {
        message: rejection.body_text(),
        details: Some(json!({ "status": rejection.status().as_u16() })),
    }
}

/// Record request count and latency per matched route
async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let latency = start.elapsed().as_secs_f64();
    metrics::record_request(method.as_str(), &route, status, latency);

    if response.status().is_server_error() {
        warn!(method = %method, route = %route, status, "Request failed");
    } else {
        info!(
            method = %method,
            route = %route,
            status,
            latency_ms = latency * 1000.0,
            "Request completed"
        );
    }

    response
}
