use crate::api::AppState;
use crate::domain::auth::Claims;
use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts},
};
use std::net::{IpAddr, SocketAddr};

/// Claims of a verified `Authorization: Bearer` access token.
#[derive(Debug)]
pub struct AuthUser(pub Claims);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts.headers.get(header::AUTHORIZATION).ok_or(AppError::InvalidToken)?;
        let auth_str = auth_header.to_str().map_err(|_| AppError::InvalidToken)?;
        let token = auth_str.strip_prefix("Bearer ").ok_or(AppError::InvalidToken)?;

        let claims = state.coordinator.verify_access_token(token)?;
        tracing::Span::current().record("user_id", tracing::field::display(claims.sub));

        Ok(Self(claims))
    }
}

/// The resolved client address of the request.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub IpAddr);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or_else(|| AppError::Validation("invalid IP address".to_string()))?;

        Ok(Self(state.client_ip.identify_client_ip(&parts.headers, peer_ip)))
    }
}
