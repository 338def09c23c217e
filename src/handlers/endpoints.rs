//! Webhook endpoint management for tenants. Secrets are returned in full
//! exactly once, by the operation that mints them; every read is masked.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::tenant::WebhookEndpoint;
use crate::error::AppError;
use crate::ports::TenantDirectory;
use crate::signing;
use crate::validation::{validate_endpoint_url, validate_event_names};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterEndpointRequest {
    pub url: String,
    pub events: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateEndpointRequest {
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct EndpointResponse {
    pub id: Uuid,
    pub url: String,
    pub events: Vec<String>,
    pub active: bool,
    pub secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EndpointResponse {
    fn masked(endpoint: &WebhookEndpoint) -> Self {
        Self {
            id: endpoint.id,
            url: endpoint.url.clone(),
            events: endpoint.events.clone(),
            active: endpoint.active,
            secret: signing::mask_secret(&endpoint.secret),
            created_at: endpoint.created_at,
            updated_at: endpoint.updated_at,
        }
    }

    fn with_secret(endpoint: &WebhookEndpoint) -> Self {
        Self {
            secret: endpoint.secret.clone(),
            ..Self::masked(endpoint)
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<RegisterEndpointRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_endpoint_url(&req.url)?;
    validate_event_names(&req.events)?;

    state
        .tenants
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("tenant {}", tenant_id)))?;

    let endpoint = WebhookEndpoint::new(
        tenant_id,
        req.url,
        req.events,
        signing::generate_secret(),
        state.clock.now(),
    );
    let stored = state.tenants.insert_endpoint(&endpoint).await?;

    Ok((
        StatusCode::CREATED,
        Json(EndpointResponse::with_secret(&stored)),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .tenants
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("tenant {}", tenant_id)))?;

    let endpoints = state.tenants.endpoints_for(tenant_id).await?;
    let response: Vec<EndpointResponse> =
        endpoints.iter().map(EndpointResponse::masked).collect();

    Ok(Json(response))
}

pub async fn update(
    State(state): State<AppState>,
    Path((tenant_id, endpoint_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateEndpointRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut endpoint = state
        .tenants
        .get_endpoint(tenant_id, endpoint_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("endpoint {}", endpoint_id)))?;

    if let Some(url) = req.url {
        validate_endpoint_url(&url)?;
        endpoint.url = url;
    }
    if let Some(events) = req.events {
        validate_event_names(&events)?;
        endpoint.events = events;
    }
    if let Some(active) = req.active {
        endpoint.active = active;
    }
    endpoint.updated_at = state.clock.now();

    let stored = state.tenants.update_endpoint(&endpoint).await?;

    Ok(Json(EndpointResponse::masked(&stored)))
}

pub async fn rotate_secret(
    State(state): State<AppState>,
    Path((tenant_id, endpoint_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let mut endpoint = state
        .tenants
        .get_endpoint(tenant_id, endpoint_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("endpoint {}", endpoint_id)))?;

    endpoint.secret = signing::generate_secret();
    endpoint.updated_at = state.clock.now();

    let stored = state.tenants.update_endpoint(&endpoint).await?;

    Ok(Json(EndpointResponse::with_secret(&stored)))
}
