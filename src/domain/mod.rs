pub mod auth;
pub mod refresh_token;
