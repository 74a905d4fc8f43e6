//! HTTP transport for the Model Context Protocol dispatcher
//!
//! Exposes `POST /mcp` plus the liveness and discovery endpoints. The handlers stay thin: every
//! protocol decision lives in the dispatcher, this layer only maps its reply onto HTTP.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::AppState;

pub const MCP_ENDPOINT: &str = "/mcp";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: String,
    pub version: String,
    pub mcp_endpoint: &'static str,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: state.dispatcher.identity().name.clone(),
    })
}

pub async fn discovery(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    let identity = state.dispatcher.identity();
    Json(DiscoveryResponse {
        name: identity.name.clone(),
        version: identity.version.clone(),
        mcp_endpoint: MCP_ENDPOINT,
    })
}

pub async fn mcp_endpoint(State(state): State<AppState>, body: Bytes) -> Response {
    let reply = state.dispatcher.handle_body(&body);
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match reply.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    }
}
