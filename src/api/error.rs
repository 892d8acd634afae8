use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::GatewayError;

/// Boundary wrapper that renders a [`GatewayError`] as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

/// Error body returned for every failed request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Stable error code
    #[schema(example = "authorization_failed")]
    pub error: String,
    /// Sanitized human-readable message
    pub message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorBody { error: self.0.code().to_string(), message: self.0.sanitized_message() };
        let mut response = (status, Json(body)).into_response();

        if let GatewayError::RateLimitExceeded { retry_after_secs } = self.0 {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }

        response
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(GatewayError::validation(format!("invalid request body: {}", rejection.body_text())))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(GatewayError::validation(format!(
            "invalid query parameters: {}",
            rejection.body_text()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GatewayError::blocked("ua"), StatusCode::FORBIDDEN),
            (GatewayError::PayloadTooLarge { size: 10, limit: 5 }, StatusCode::PAYLOAD_TOO_LARGE),
            (GatewayError::authentication("no token"), StatusCode::UNAUTHORIZED),
            (GatewayError::not_found("gone"), StatusCode::NOT_FOUND),
            (GatewayError::store_unavailable("down"), StatusCode::SERVICE_UNAVAILABLE),
            (GatewayError::validation("bad"), StatusCode::UNPROCESSABLE_ENTITY),
            (GatewayError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).status_code(), status);
        }
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError(GatewayError::RateLimitExceeded { retry_after_secs: 42 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "42");
    }
}
