use serde::Deserialize;

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Failures of a remote call, classified the way the UI reacts to them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },
    #[error("not allowed: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Validation,
    Permission,
    NotFound,
    Server,
}

impl ApiError {
    pub fn kind(&self) -> FailureKind {
        match self {
            // Timeouts are handled exactly like connectivity loss.
            ApiError::Network(_) | ApiError::Timeout => FailureKind::Network,
            ApiError::Validation { .. } => FailureKind::Validation,
            ApiError::PermissionDenied(_) => FailureKind::Permission,
            ApiError::NotFound(_) => FailureKind::NotFound,
            ApiError::Server { .. } | ApiError::Decode(_) => FailureKind::Server,
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ApiError::Validation { fields, .. } => fields,
            _ => &[],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "error")]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<FieldError>,
}

/// Map a non-success HTTP status and its body onto the taxonomy.
pub fn classify_status(status: u16, body: &str) -> ApiError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() || trimmed.starts_with('{') {
                format!("HTTP {status}")
            } else {
                trimmed.chars().take(200).collect()
            }
        });
    match status {
        400 | 422 => ApiError::Validation {
            message,
            fields: parsed.errors,
        },
        401 | 403 => ApiError::PermissionDenied(message),
        404 | 410 => ApiError::NotFound(message),
        408 | 504 => ApiError::Timeout,
        _ => ApiError::Server { status, message },
    }
}
