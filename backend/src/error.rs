//! Error handling for the stock transfer platform
//!
//! Provides consistent error responses in English and Spanish

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{Shortfall, TransferAction, TransferState, ValidationError};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String, message_es: String },

    /// Tenant scope was never bound for this call; a defect in the calling layer
    #[error("Tenant context missing")]
    TenantContextMissing,

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_es: String,
    },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business rule errors
    #[error("Transfer {code} is {current}; cannot {attempted}")]
    InvalidState {
        code: String,
        current: TransferState,
        attempted: TransferAction,
    },

    /// The transfer changed between read and write (e.g., a draft edit racing a dispatch)
    #[error("Transfer {0} was modified concurrently")]
    Conflict(String),

    #[error("Insufficient stock for {} line(s)", .shortfalls.len())]
    InsufficientStock { shortfalls: Vec<Shortfall> },

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error is a user-correctable rejection rather than a fault
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            AppError::Validation { .. }
                | AppError::DuplicateEntry(_)
                | AppError::NotFound(_)
                | AppError::InvalidState { .. }
                | AppError::Conflict(_)
                | AppError::InsufficientStock { .. }
        )
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation {
            field: err.field().to_string(),
            message: err.to_string(),
            message_es: err.message_es(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_default();
        AppError::Validation {
            message: format!("Invalid value for {}", field),
            message_es: format!("Valor no válido para {}", field),
            field,
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_es: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorDetail {
    fn new(code: &str, message_en: String, message_es: String) -> Self {
        Self {
            code: code.to_string(),
            message_en,
            message_es,
            field: None,
            details: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new(
                    "INVALID_TOKEN",
                    "Invalid or expired token".to_string(),
                    "Token inválido o expirado".to_string(),
                ),
            ),
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action".to_string(),
                    "No tiene permiso para realizar esta acción".to_string(),
                ),
            ),
            AppError::Unauthorized { message, message_es } => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", message.clone(), message_es.clone()),
            ),
            AppError::TenantContextMissing => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "TENANT_CONTEXT_MISSING",
                    "Request reached the inventory engine without a tenant context".to_string(),
                    "La solicitud no tiene un contexto de empresa".to_string(),
                ),
            ),
            AppError::Validation {
                field,
                message,
                message_es,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    field: Some(field.clone()),
                    ..ErrorDetail::new("VALIDATION_ERROR", message.clone(), message_es.clone())
                },
            ),
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    field: Some(field.clone()),
                    ..ErrorDetail::new(
                        "DUPLICATE_ENTRY",
                        format!("A record with this {} already exists", field),
                        format!("Ya existe un registro con este {}", field),
                    )
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new(
                    "NOT_FOUND",
                    format!("{} not found", resource),
                    format!("No se encontró {}", resource),
                ),
            ),
            AppError::InvalidState {
                code,
                current,
                attempted,
            } => {
                let allowed: Vec<&str> = current
                    .allowed_actions()
                    .iter()
                    .map(|a| a.as_str())
                    .collect();
                (
                    StatusCode::CONFLICT,
                    ErrorDetail {
                        details: Some(serde_json::json!({
                            "current_state": current,
                            "attempted": attempted,
                            "allowed_actions": allowed,
                        })),
                        ..ErrorDetail::new(
                            "INVALID_STATE",
                            self.to_string(),
                            format!(
                                "La transferencia {} está en estado {}; no se puede {}",
                                code,
                                current,
                                attempted_es(*attempted)
                            ),
                        )
                    },
                )
            }
            AppError::Conflict(code) => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "CONFLICT",
                    format!("Transfer {} was modified by another operator; reload and retry", code),
                    format!("La transferencia {} fue modificada por otro usuario; recargue e intente de nuevo", code),
                ),
            ),
            AppError::InsufficientStock { shortfalls } => {
                let lines: Vec<String> = shortfalls.iter().map(|s| s.to_string()).collect();
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorDetail {
                        details: Some(serde_json::json!({ "shortfalls": shortfalls })),
                        ..ErrorDetail::new(
                            "INSUFFICIENT_STOCK",
                            format!("Insufficient stock: {}", lines.join("; ")),
                            format!("Stock insuficiente en {} línea(s)", shortfalls.len()),
                        )
                    },
                )
            }
            AppError::DatabaseError(_) | AppError::MigrationError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    "Ocurrió un error en la base de datos".to_string(),
                ),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    msg.clone(),
                    "Error interno del servidor".to_string(),
                ),
            ),
        };

        if self.is_business_rejection() {
            tracing::debug!("Rejected: {}", self);
        } else {
            tracing::error!("Error: {:?}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

fn attempted_es(action: TransferAction) -> &'static str {
    match action {
        TransferAction::Edit => "editar",
        TransferAction::Dispatch => "enviar",
        TransferAction::Receive => "recibir",
        TransferAction::Cancel => "cancelar",
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
