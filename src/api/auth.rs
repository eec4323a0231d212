use crate::api::AppState;
use crate::api::middleware::{AuthUser, ClientIp};
use crate::api::schemas::{IssueParams, RefreshRequest, TokenPairResponse, UserResponse};
use crate::error::{AppError, Result};
use axum::extract::rejection::JsonRejection;
use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

fn parse_user_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::Validation("user_id must be a valid UUID".to_string()))
}

pub async fn issue_tokens(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Query(params): Query<IssueParams>,
) -> Result<impl IntoResponse> {
    let raw = params
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("user_id is required".to_string()))?;
    let user_id = parse_user_id(&raw)?;

    let pair = state.coordinator.issue(user_id, ip).await?;
    Ok(Json(TokenPairResponse::from(pair)))
}

pub async fn refresh(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    payload: std::result::Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(payload) = payload.map_err(|_| AppError::Validation("invalid request format".to_string()))?;
    let user_id = parse_user_id(&payload.user_id)?;

    let pair = state.coordinator.rotate(user_id, &payload.refresh_token, ip).await?;
    Ok(Json(TokenPairResponse::from(pair)))
}

pub async fn logout(State(state): State<AppState>, AuthUser(claims): AuthUser) -> Result<impl IntoResponse> {
    state.coordinator.revoke_all(claims.sub).await?;
    Ok(Json(json!({ "status": "logged out" })))
}

pub async fn current_user(AuthUser(claims): AuthUser) -> impl IntoResponse {
    Json(UserResponse { user_id: claims.sub, ip: claims.ip })
}
