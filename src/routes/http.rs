//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs include parameters and basic result info.

use axum::{
  extract::{Path, Query, State},
  response::IntoResponse,
  Json,
};
use chrono::Utc;
use tracing::{info, instrument};

use crate::domain::{BackgroundSelection, Category, StudyField};
use crate::error::AppError;
use crate::merge::merge_enhanced_config;
use crate::progression::{completion_percentage, section_completion, submission_readiness};
use crate::protocol::*;
use crate::state::AppState;
use crate::taxonomy::{CategoryPatch, StudyFieldPatch};
use crate::validate::validate_configuration;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

// ---- configurations -------------------------------------------------------

#[instrument(level = "info", skip(state))]
pub async fn http_get_active_config(State(state): State<AppState>) -> impl IntoResponse {
  let config = state.configs.get_active().await;
  info!(target: "form_config", id = %config.id, fields = config.fields.len(), "Active configuration served");
  Json(config)
}

#[instrument(level = "info", skip(body), fields(config = %body.config.id))]
pub async fn http_validate_config(Json(body): Json<ValidateIn>) -> impl IntoResponse {
  let errors = validate_configuration(&body.config);
  Json(ValidateOut { valid: errors.is_empty(), errors })
}

/// Run the merger without persisting; what the admin sees is exactly what a
/// save would produce (the merge is deterministic).
#[instrument(level = "info", skip(state, body), fields(config = %body.config.id))]
pub async fn http_preview_config(
  State(state): State<AppState>,
  Json(body): Json<MergeIn>,
) -> Result<impl IntoResponse, AppError> {
  let merged =
    merge_enhanced_config(&body.config, &body.overrides, body.include_background, &state.categories).await?;
  Ok(Json(merged))
}

#[instrument(level = "info", skip(state, body), fields(config = %body.config.id))]
pub async fn http_save_config(
  State(state): State<AppState>,
  Json(body): Json<MergeIn>,
) -> Result<impl IntoResponse, AppError> {
  let merged =
    merge_enhanced_config(&body.config, &body.overrides, body.include_background, &state.categories).await?;
  let saved = state.configs.save(merged).await?;
  Ok(Json(saved))
}

// ---- presets --------------------------------------------------------------

#[instrument(level = "info", skip(state))]
pub async fn http_list_presets(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
  Ok(Json(state.configs.get_all_presets().await?))
}

#[instrument(level = "info", skip(state, body), fields(config = %body.config.id))]
pub async fn http_save_preset(
  State(state): State<AppState>,
  Json(body): Json<MergeIn>,
) -> Result<impl IntoResponse, AppError> {
  let merged =
    merge_enhanced_config(&body.config, &body.overrides, body.include_background, &state.categories).await?;
  Ok(Json(state.configs.save_as_preset(merged).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_load_preset(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  Ok(Json(state.configs.load_preset(&id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_activate_preset(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  Ok(Json(state.configs.activate_preset(&id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_preset(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  state.configs.delete_preset(&id).await?;
  Ok(Json(serde_json::json!({ "deleted": id })))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_update_preset_metadata(
  State(state): State<AppState>,
  Path(id): Path<String>,
  Json(body): Json<PresetMetadataIn>,
) -> Result<impl IntoResponse, AppError> {
  Ok(Json(state.configs.update_preset_metadata(&id, body.name, body.description).await?))
}

// ---- taxonomy admin -------------------------------------------------------

#[instrument(level = "info", skip(state))]
pub async fn http_list_categories(State(state): State<AppState>) -> impl IntoResponse {
  Json(state.categories.get_all().await)
}

#[instrument(level = "info", skip(state, body), fields(id = %body.category_id))]
pub async fn http_add_category(
  State(state): State<AppState>,
  Json(body): Json<Category>,
) -> Result<impl IntoResponse, AppError> {
  Ok(Json(state.categories.add(body).await?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_update_category(
  State(state): State<AppState>,
  Path(id): Path<String>,
  Json(body): Json<CategoryPatch>,
) -> Result<impl IntoResponse, AppError> {
  Ok(Json(state.categories.update(&id, body).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_category(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  state.categories.delete(&id).await?;
  Ok(Json(serde_json::json!({ "deleted": id })))
}

#[instrument(level = "info", skip(state, body), fields(count = body.ids.len()))]
pub async fn http_reorder_categories(
  State(state): State<AppState>,
  Json(body): Json<ReorderIn>,
) -> Result<impl IntoResponse, AppError> {
  state.categories.reorder(&body.ids).await?;
  Ok(Json(state.categories.get_all().await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_toggle_category(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  Ok(Json(state.categories.toggle_status(&id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_study_fields(State(state): State<AppState>) -> impl IntoResponse {
  Json(state.study_fields.get_all().await)
}

#[instrument(level = "info", skip(state, body), fields(id = %body.field_id))]
pub async fn http_add_study_field(
  State(state): State<AppState>,
  Json(body): Json<StudyField>,
) -> Result<impl IntoResponse, AppError> {
  Ok(Json(state.study_fields.add(body).await?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_update_study_field(
  State(state): State<AppState>,
  Path(id): Path<String>,
  Json(body): Json<StudyFieldPatch>,
) -> Result<impl IntoResponse, AppError> {
  Ok(Json(state.study_fields.update(&id, body).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_study_field(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  state.study_fields.delete(&id).await?;
  Ok(Json(serde_json::json!({ "deleted": id })))
}

#[instrument(level = "info", skip(state))]
pub async fn http_toggle_study_field(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  Ok(Json(state.study_fields.toggle_status(&id).await?))
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len()))]
pub async fn http_detect_study_field(
  State(state): State<AppState>,
  Json(body): Json<DetectFieldIn>,
) -> impl IntoResponse {
  let detected = state.study_fields.detect_field_from_text(&body.text).await;
  Json(DetectFieldOut { field_id: detected.map(|f| f.field_id) })
}

// ---- background selections ------------------------------------------------

#[instrument(level = "info", skip(state, body), fields(user = %body.user_id))]
pub async fn http_upsert_background_selection(
  State(state): State<AppState>,
  Json(body): Json<BackgroundSelectionIn>,
) -> Result<impl IntoResponse, AppError> {
  let selection = BackgroundSelection {
    user_id: body.user_id,
    field_of_study: body.field_of_study,
    class_level: body.class_level,
    learning_goals: body.learning_goals,
    updated_at: Utc::now(),
  };
  state
    .db
    .upsert_background_selection(&selection)
    .await
    .map_err(|e| AppError::Store(e.to_string()))?;
  Ok(Json(selection))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_background_selection(
  State(state): State<AppState>,
  Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  let selection = state
    .db
    .get_background_selection(&user_id)
    .await
    .map_err(|e| AppError::Store(e.to_string()))?
    .ok_or_else(|| AppError::NotFound(format!("background selection for '{user_id}'")))?;
  Ok(Json(selection))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_background_selection(
  State(state): State<AppState>,
  Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  state
    .db
    .delete_background_selection(&user_id)
    .await
    .map_err(|e| AppError::Store(e.to_string()))?;
  Ok(Json(serde_json::json!({ "deleted": user_id })))
}

// ---- form-fill sessions ----------------------------------------------------

#[instrument(level = "info", skip(state, body))]
pub async fn http_open_session(
  State(state): State<AppState>,
  Json(body): Json<SessionOpenIn>,
) -> impl IntoResponse {
  let (session_id, session) = state.open_session(body.user_id).await;
  let guard = session.read().await;
  Json(SessionOpenOut { session_id, config: guard.config.clone(), phase: guard.phase })
}

#[instrument(level = "info", skip(state, body), fields(%body.session_id, %body.field_id))]
pub async fn http_field_change(
  State(state): State<AppState>,
  Json(body): Json<FieldChangeIn>,
) -> Result<impl IntoResponse, AppError> {
  let session = state
    .session(&body.session_id)
    .await
    .ok_or_else(|| AppError::NotFound(format!("session '{}'", body.session_id)))?;
  let outcome = state.engine.on_field_change(&session, &body.field_id, body.value).await;
  Ok(Json(outcome))
}

#[instrument(level = "info", skip(state), fields(%q.session_id))]
pub async fn http_completion(
  State(state): State<AppState>,
  Query(q): Query<SessionQuery>,
) -> Result<impl IntoResponse, AppError> {
  let session = state
    .session(&q.session_id)
    .await
    .ok_or_else(|| AppError::NotFound(format!("session '{}'", q.session_id)))?;
  let guard = session.read().await;
  Ok(Json(CompletionOut {
    completion_percentage: completion_percentage(&guard.form_data, &guard.config),
  }))
}

#[instrument(level = "info", skip(state), fields(%q.session_id, %q.section_id))]
pub async fn http_section_completion(
  State(state): State<AppState>,
  Query(q): Query<SectionQuery>,
) -> Result<impl IntoResponse, AppError> {
  let session = state
    .session(&q.session_id)
    .await
    .ok_or_else(|| AppError::NotFound(format!("session '{}'", q.session_id)))?;
  let guard = session.read().await;
  Ok(Json(section_completion(&guard.form_data, &guard.config, &q.section_id)))
}

#[instrument(level = "info", skip(state), fields(%q.session_id))]
pub async fn http_session_state(
  State(state): State<AppState>,
  Query(q): Query<SessionQuery>,
) -> Result<impl IntoResponse, AppError> {
  let session = state
    .session(&q.session_id)
    .await
    .ok_or_else(|| AppError::NotFound(format!("session '{}'", q.session_id)))?;
  let guard = session.read().await;
  Ok(Json(SessionStateOut {
    session_id: q.session_id,
    phase: guard.phase,
    form_data: guard.form_data.clone(),
    config: guard.config.clone(),
  }))
}

#[instrument(level = "info", skip(state), fields(%q.session_id))]
pub async fn http_readiness(
  State(state): State<AppState>,
  Query(q): Query<SessionQuery>,
) -> Result<impl IntoResponse, AppError> {
  let session = state
    .session(&q.session_id)
    .await
    .ok_or_else(|| AppError::NotFound(format!("session '{}'", q.session_id)))?;
  let guard = session.read().await;
  Ok(Json(submission_readiness(&guard.form_data, &guard.config)))
}
