use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use massa_loadcell::LoadCellError;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Scale(#[from] LoadCellError),

    #[error("scale worker failed: {0}")]
    Worker(#[from] JoinError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Scale(err) if err.is_caller_error() => StatusCode::BAD_REQUEST,
            _ if self.device_lost() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The error itself says the load cell is gone. Other errors carry no
    /// evidence either way and leave `connected` out of the body.
    fn device_lost(&self) -> bool {
        matches!(
            self,
            ApiError::Scale(err)
                if *err == LoadCellError::DeviceUnavailable || err.is_transient_hardware()
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Scale(err) => err.kind(),
            ApiError::Worker(_) => "worker",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "{self}");
        } else {
            tracing::debug!(kind = self.kind(), "{self}");
        }

        let mut body = json!({
            "status": "error",
            "kind": self.kind(),
            "error": self.to_string(),
        });
        if self.device_lost() {
            body["connected"] = false.into();
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let unavailable = ApiError::from(LoadCellError::DeviceUnavailable);
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(unavailable.device_lost());

        let timeout = ApiError::from(LoadCellError::DeviceTimeout { polls: 3 });
        assert_eq!(timeout.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let bad_count = ApiError::from(LoadCellError::InvalidSampleCount);
        assert_eq!(bad_count.status_code(), StatusCode::BAD_REQUEST);
        assert!(!bad_count.device_lost());

        let config = ApiError::from(LoadCellError::Config("bad".into()));
        assert_eq!(config.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!config.device_lost());
    }
}
