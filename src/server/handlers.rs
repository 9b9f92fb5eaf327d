//! HTTP request handlers

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::models::pod::PodInfo;
use crate::server::state::ServerState;

/// Aggregate status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub pods: HashMap<String, Vec<PodInfo>>,
    #[serde(rename = "rollingUpdates", skip_serializing_if = "Option::is_none")]
    pub rolling_updates: Option<Vec<String>>,
}

/// Overall health classification
pub fn overall_status(healthy_pods: usize, updating: bool) -> &'static str {
    if healthy_pods == 0 {
        "degraded"
    } else if updating {
        "updating"
    } else {
        "healthy"
    }
}

/// Admin status handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let snapshot = state.supervisor.status().await;

    let status = overall_status(snapshot.healthy_pods, !snapshot.rolling_updates.is_empty());
    let rolling_updates = if snapshot.rolling_updates.is_empty() {
        None
    } else {
        Some(snapshot.rolling_updates)
    };

    Json(StatusResponse {
        status: status.to_string(),
        pods: snapshot.pods,
        rolling_updates,
    })
}

/// Reverse proxy handler for every non-admin path
///
/// Forwards the inbound request to the next healthy backend and relays the
/// upstream response. Pod state is never mutated here; unhealthy backends
/// are handled out-of-band by the supervisor.
pub async fn proxy_handler(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    // 1. Pick a backend
    let Some(address) = state.dispatcher.next_address(&state.deployment_name).await else {
        return (StatusCode::SERVICE_UNAVAILABLE, "No healthy backends available")
            .into_response();
    };

    // 2. Compose the upstream URL, query included
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("http://{}{}", address, path);

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
                .into_response();
        }
    };

    // 3. Forward method, headers minus Host, and body
    let mut headers = parts.headers;
    headers.remove(header::HOST);

    let upstream = state
        .upstream
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await;

    let response = match upstream {
        Ok(response) => response,
        Err(e) => {
            error!("Proxy request to {} failed: {}", url, e);
            return (StatusCode::BAD_GATEWAY, format!("Backend error: {}", e)).into_response();
        }
    };

    // 4. Relay status, headers minus Transfer-Encoding, and body
    let status = response.status();
    let mut headers = response.headers().clone();
    headers.remove(header::TRANSFER_ENCODING);

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read upstream response from {}: {}", url, e);
            return (StatusCode::BAD_GATEWAY, format!("Backend error: {}", e)).into_response();
        }
    };

    let mut relayed = Response::builder().status(status);
    if let Some(relayed_headers) = relayed.headers_mut() {
        *relayed_headers = headers;
    }
    relayed
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}
