//! HTTP boundary: JSON in, `ProbeResult` out

use std::convert::TryFrom;
use std::io;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use tokio::net::TcpListener;

use crate::probe::{ProbeForm, ProbeLog, ProbeRequest, ProbeResult, SmtpProbe};
use crate::smtp::Connector;

const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
const INVALID_BODY_MESSAGE: &str = "Request error: invalid request body";

/// Routes of the probe service
pub fn router<C>(probe: Arc<SmtpProbe<C>>) -> Router
where
    C: Connector + 'static,
{
    Router::new()
        .route("/", post(test_smtp::<C>).options(preflight))
        .route("/test-smtp", post(test_smtp::<C>).options(preflight))
        .route("/health", get(health_check))
        .layer(middleware::map_response(cors_headers))
        .with_state(probe)
}

/// Serves the probe on `listener` until the server fails
pub async fn serve<C>(listener: TcpListener, probe: Arc<SmtpProbe<C>>) -> io::Result<()>
where
    C: Connector + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("SMTP probe service listening on http://{}", addr);
    }
    axum::serve(listener, router(probe)).await
}

async fn test_smtp<C>(
    State(probe): State<Arc<SmtpProbe<C>>>,
    body: Result<Json<ProbeForm>, JsonRejection>,
) -> (StatusCode, Json<ProbeResult>)
where
    C: Connector + 'static,
{
    let form = match body {
        Ok(Json(form)) => form,
        Err(rejection) => {
            warn!("rejected request body: {}", rejection.body_text());
            return rejected(INVALID_BODY_MESSAGE.to_string());
        }
    };

    let request = match ProbeRequest::try_from(form) {
        Ok(request) => request,
        Err(err) => {
            warn!("invalid probe request: {}", err);
            return rejected(err.to_string());
        }
    };

    let result = probe.run(&request).await;
    (StatusCode::OK, Json(result))
}

fn rejected(message: String) -> (StatusCode, Json<ProbeResult>) {
    let mut log = ProbeLog::new();
    log.push(format_args!("ERROR: {}", message));
    (StatusCode::BAD_REQUEST, Json(ProbeResult::failure(log, message)))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "smtp-probe",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    response
}
