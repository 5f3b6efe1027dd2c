//! JSON body extractor with the API's error body.

use crate::responses::AppError;
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use quill_core::QuillError;
use serde::de::DeserializeOwned;

/// Like [`axum::Json`], but a malformed body is answered with a 400 in the
/// same `{ "error": ... }` shape as every other failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError(QuillError::validation(format!(
                "Invalid JSON: {}",
                rejection.body_text()
            )))),
        }
    }
}
