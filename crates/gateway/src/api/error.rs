//! HTTP error mapping. Every 4xx body carries `{"detail": string}`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }

    /// Bad payload or a referenced entity missing at creation time.
    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: "internal server error".to_owned(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

impl From<mur_domain::Error> for ApiError {
    fn from(error: mur_domain::Error) -> Self {
        use mur_domain::Error;
        match &error {
            Error::SessionNotFound(_) | Error::AgentNotFound(_) => {
                Self::not_found(error.to_string())
            }
            Error::UnknownAgentType(_) => Self::invalid_request(error.to_string()),
            _ => {
                tracing::error!(%error, "request failed");
                Self::internal()
            }
        }
    }
}

/// JSON extractor whose rejection matches the API error shape: malformed or
/// schema-violating bodies become 422 with a `detail`.
pub struct ValidJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::validation(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn four_xx_bodies_carry_detail() {
        let response = ApiError::not_found("Session with ID abc not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["detail"], "Session with ID abc not found");
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        use mur_domain::ids::SessionId;

        let err: ApiError = mur_domain::Error::SessionNotFound(SessionId::from("s1")).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = mur_domain::Error::UnknownAgentType("x".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = mur_domain::Error::Other("boom".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
