use std::{net::SocketAddr, time::Instant};

use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::{app_state::AppState, stations::Station};

const MAX_COUNTRY_LENGTH: usize = 128;

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

async fn log_requests(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let request_id = extract_request_id(request.headers());
    let method = request.method().clone();
    let raw_url = request.uri().to_string();
    let started_at = Instant::now();

    state.logger.info(
        "request.received",
        json!({
            "requestId": request_id,
            "method": method.as_str(),
            "rawUrl": raw_url,
        }),
    );

    let response = next.run(request).await;
    let duration_ms = started_at.elapsed().as_secs_f64() * 1000.0;

    state.logger.info(
        "request.completed",
        json!({
            "requestId": request_id,
            "method": method.as_str(),
            "rawUrl": raw_url,
            "statusCode": response.status().as_u16(),
            "durationMs": duration_ms,
        }),
    );
    response
}

fn json_response<T>(status: StatusCode, payload: T) -> Response
where
    T: Serialize,
{
    (status, Json(payload)).into_response()
}

#[derive(Debug)]
enum ApiError {
    BadRequest(&'static str),
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse { error: message }),
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StationsQuery {
    country: Option<String>,
}

#[derive(Serialize)]
struct StationsResponse {
    country: String,
    total: usize,
    stations: Vec<Station>,
}

#[derive(Serialize)]
struct CountriesResponse {
    total: usize,
    countries: Vec<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stations", get(get_stations))
        .route("/countries", get(get_countries))
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let logger = state.logger.clone();
    let router = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    logger.info(
        "server.listening",
        json!({
            "address": addr.to_string()
        }),
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz(State(state): State<AppState>) -> Response {
    match state.ping_store().await {
        Ok(_) => json_response(
            StatusCode::OK,
            json!({ "status": "ok", "store": state.resolver.store().backend_name() }),
        ),
        Err(error) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "status": "error",
                "message": error.to_string(),
            }),
        ),
    }
}

async fn get_stations(
    State(state): State<AppState>,
    Query(query): Query<StationsQuery>,
) -> Result<Response, ApiError> {
    let country = query
        .country
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::BadRequest("country query parameter is required"))?;
    if country.chars().count() > MAX_COUNTRY_LENGTH {
        return Err(ApiError::BadRequest("country query parameter is too long"));
    }

    let stations = state.resolver.resolve(&country).await;
    Ok(json_response(
        StatusCode::OK,
        StationsResponse {
            country,
            total: stations.len(),
            stations,
        },
    ))
}

async fn get_countries(State(state): State<AppState>) -> Response {
    let countries = state.resolver.list_countries().await;
    json_response(
        StatusCode::OK,
        CountriesResponse {
            total: countries.len(),
            countries,
        },
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
