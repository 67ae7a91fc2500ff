use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bazaar_core::{CarrierError, CoreError};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    Core(CoreError),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Core(CoreError::ValidationError(rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Core(CoreError::ValidationError(rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::Core(CoreError::ValidationError(rejection.body_text()))
    }
}

impl AppError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            AppError::Core(err) => {
                let kind = err.kind();
                let status = match &err {
                    CoreError::ValidationError(_) => StatusCode::BAD_REQUEST,
                    CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    CoreError::Conflict(_) => StatusCode::CONFLICT,
                    CoreError::InvalidOperation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    CoreError::Carrier(CarrierError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
                    CoreError::Carrier(_) => StatusCode::BAD_GATEWAY,
                    CoreError::InternalError(msg) => {
                        tracing::error!("Internal Server Error: {}", msg);
                        return (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            kind,
                            "Internal Server Error".to_string(),
                        );
                    }
                };
                (status, kind, err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();

        let body = Json(json!({
            "error": {
                "kind": kind,
                "message": message,
            },
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CoreError::ValidationError("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CoreError::Conflict("x".into()), StatusCode::CONFLICT),
            (CoreError::InvalidOperation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (
                CoreError::Carrier(CarrierError::Unavailable("timeout".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CoreError::Carrier(CarrierError::Auth("bad token".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).parts().0, expected);
        }
    }

    #[test]
    fn test_carrier_rejection_message_is_verbatim() {
        let err = AppError::from(CoreError::Carrier(CarrierError::Rejected {
            code: None,
            message: "Đơn hàng đã được lấy, không thể hủy".into(),
        }));
        let (status, kind, message) = err.parts();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(kind, "carrier_error");
        assert!(message.contains("Đơn hàng đã được lấy, không thể hủy"));
    }

    #[test]
    fn test_internal_detail_is_masked() {
        let (status, kind, message) =
            AppError::from(CoreError::InternalError("pool timed out".into())).parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(kind, "internal");
        assert_eq!(message, "Internal Server Error");
    }
}
