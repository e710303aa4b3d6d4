//! Request extractors that validate at the boundary and reject with [`ApiError`].

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::Json;

use crate::sessions::OwnerId;

use super::error::ApiError;
use super::state::AppState;

/// Owner id resolved by the auth layer and passed in a configured header.
#[derive(Clone, Debug)]
pub struct CallerIdentity(pub OwnerId);

impl FromRequestParts<Arc<AppState>> for CallerIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(&state.identity_header)
            .and_then(|v| v.to_str().ok())
            .and_then(OwnerId::new)
            .map(Self)
            .ok_or_else(|| ApiError::Unauthorized("Missing caller identity".to_string()))
    }
}

/// JSON body whose rejections (wrong content type, bad syntax, wrong field types)
/// become `400 {error}` responses.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| ApiError::Validation(rejection.body_text()))
    }
}
