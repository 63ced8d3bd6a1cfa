use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Errors surfaced over plain HTTP, before a WebSocket upgrade happens.
/// Post-upgrade failures use close codes instead (4004 and friends).
#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    /// 401 - no token supplied.
    AuthRequired,
    /// 401 - token supplied but wrong.
    AuthInvalid,
    /// 400 - viewer upgrade without an `id` query parameter.
    MissingSessionId,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AuthRequired | ApiError::AuthInvalid => StatusCode::UNAUTHORIZED,
            ApiError::MissingSessionId => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::AuthRequired => "auth_required",
            ApiError::AuthInvalid => "auth_invalid",
            ApiError::MissingSessionId => "missing_session_id",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ApiError::AuthRequired => "Authentication required. Supply ?token=.",
            ApiError::AuthInvalid => "Invalid token.",
            ApiError::MissingSessionId => "Viewer connections require ?id=.",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.message(),
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}
