use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::signing::QrPayload;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    #[serde(rename = "ref")]
    pub reference: String,
    pub amount: i64,
    pub ttl_minutes: Option<i64>,
}

/// Creation response: everything the paying client needs, including the
/// exact payload and signature it must echo back at confirmation time.
#[derive(Debug, Serialize)]
pub struct CreateTransactionResponse {
    pub id: Uuid,
    #[serde(rename = "ref")]
    pub reference: String,
    pub no: i64,
    pub amount: i64,
    pub expires_at: DateTime<Utc>,
    pub payload: QrPayload,
    pub signature: String,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let created = state
        .lifecycle
        .create(
            req.tenant_id,
            req.customer_id,
            &req.reference,
            req.amount,
            req.ttl_minutes,
        )
        .await?;

    let tx = created.transaction;
    let response = CreateTransactionResponse {
        id: tx.id,
        reference: tx.reference.clone(),
        no: tx.no,
        amount: tx.amount,
        expires_at: tx.expires_at,
        payload: created.payload,
        signature: tx.signature.clone(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmTransactionRequest {
    pub card_id: Uuid,
    pub signature: String,
}

pub async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfirmTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .lifecycle
        .confirm(id, req.card_id, &req.signature)
        .await?;

    Ok(Json(tx))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.lifecycle.cancel(id).await?;

    Ok(Json(tx))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.lifecycle.find(id).await?;

    Ok(Json(tx))
}
