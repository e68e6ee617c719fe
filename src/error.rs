//! Error taxonomy for the form backend.
//!
//! Recoverable kinds (taxonomy load failures, duplicate field ids,
//! personalization failures) are handled close to where they occur and only
//! logged; the variants here are the ones that cross module or API
//! boundaries.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  /// Taxonomy store unreachable and no fallback applied at this call site.
  #[error("taxonomy load failed: {0}")]
  TaxonomyLoad(String),

  /// Delete/rename attempt on a system category or protected field id.
  #[error("{0}")]
  ProtectedEntity(String),

  /// Configuration Validator failures; save is blocked until empty.
  #[error("configuration is invalid")]
  Validation(Vec<String>),

  /// Regeneration during progression failed; last good config stays in force.
  #[error("personalization failed: {0}")]
  Personalization(String),

  /// Demote succeeded but activate failed and recovery was impossible:
  /// the store was left with zero active configurations.
  #[error("activation inconsistency: {0}")]
  ActivationInconsistency(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("store error: {0}")]
  Store(String),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let (status, errors) = match &self {
      AppError::Validation(list) => (StatusCode::UNPROCESSABLE_ENTITY, Some(list.clone())),
      AppError::ProtectedEntity(_) => (StatusCode::CONFLICT, None),
      AppError::NotFound(_) => (StatusCode::NOT_FOUND, None),
      AppError::TaxonomyLoad(_) => (StatusCode::SERVICE_UNAVAILABLE, None),
      AppError::Personalization(_)
      | AppError::ActivationInconsistency(_)
      | AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };
    let body = serde_json::json!({
      "error": self.to_string(),
      "errors": errors,
    });
    (status, Json(body)).into_response()
  }
}
