//! HTTP API handlers, one router per service role.

pub mod catalog;
pub mod customers;
pub mod orders;

use axum::{
    BoxError, Json,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ecom_core::writer::WriteError;
use ecom_sdk::objects::Validate;
use serde::de::DeserializeOwned;

/// Errors returned by API handlers.
///
/// Internal failures are logged here and answered with a generic message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("request timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("write failed: {0}")]
    Write(#[from] WriteError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            ApiError::NotFound(what) => {
                (StatusCode::NOT_FOUND, format!("{what} not found")).into_response()
            }
            ApiError::Timeout => {
                (StatusCode::GATEWAY_TIMEOUT, "request timed out").into_response()
            }
            ApiError::Database(_) | ApiError::Write(_) | ApiError::Internal(_) => {
                tracing::error!(error = %self, "API internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

/// Maps errors raised by the middleware stack (the request deadline) to
/// responses.
pub async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::Timeout
    } else {
        ApiError::Internal(err.to_string())
    }
}

/// JSON body that has been checked with [`Validate`] before the handler
/// runs. Both malformed JSON and failed validation are rejected with 400.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        value
            .validate()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (ApiError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("order"), StatusCode::NOT_FOUND),
            (ApiError::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (
                ApiError::Database(sqlx::Error::PoolTimedOut),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_middleware_error_maps_elapsed_to_timeout() {
        let elapsed: BoxError = Box::new(tower::timeout::error::Elapsed::new());
        assert!(matches!(
            handle_middleware_error(elapsed).await,
            ApiError::Timeout
        ));

        let other: BoxError = "boom".into();
        assert!(matches!(
            handle_middleware_error(other).await,
            ApiError::Internal(_)
        ));
    }
}
