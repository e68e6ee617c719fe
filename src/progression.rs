//! Progression Engine: reacts to field-change events during one student's
//! form fill, regenerates the configuration when the background trigger
//! answers complete, and computes completion/readiness metrics.
//!
//! Regeneration is asynchronous; completions are coalesced by a logical
//! sequence number so a stale regeneration never overwrites a newer
//! configuration, regardless of response arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::domain::{
  is_background_trigger, is_blank, AttrSource, BackgroundSelection, Field, FieldType,
  FormConfiguration, FormData,
};
use crate::error::AppError;
use crate::merge::merge_enhanced_config;
use crate::persistence::Db;
use crate::taxonomy::{CategoryProvider, StudyFieldProvider};
use crate::templates;
use crate::util::value_as_key;
use crate::validate::{validate_answers, AnswerValidation};

pub const EDUCATION_LEVEL_FIELD: &str = "education_level";
pub const WORK_EXPERIENCE_FIELD: &str = "work_experience";
const PROFESSIONAL_LEVEL: &str = "professional";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionPhase {
  CollectingBackground,
  Personalizing,
  Personalized,
  PersonalizationError,
  CollectingRemaining,
  ReadyToSubmit,
}

/// The three background answers as one comparable triple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackgroundTriple {
  pub field_of_study: String,
  pub class_level: String,
  pub learning_goals: String,
}

impl BackgroundTriple {
  /// Some(..) only when all three answers are present and non-blank.
  pub fn from_form_data(form_data: &FormData) -> Option<Self> {
    let get = |id: &str| {
      form_data.get(id).filter(|v| !is_blank(v)).map(value_as_key)
    };
    Some(Self {
      field_of_study: get("field_of_study")?,
      class_level: get("class_level")?,
      learning_goals: get("learning_goals")?,
    })
  }
}

/// One student's in-progress form fill.
pub struct FormSession {
  pub id: String,
  pub user_id: Option<String>,
  pub form_data: FormData,
  pub config: FormConfiguration,
  pub phase: ProgressionPhase,
  last_processed: Option<BackgroundTriple>,
  issued_seq: u64,
  applied_seq: u64,
}

impl FormSession {
  pub fn new(id: String, user_id: Option<String>, config: FormConfiguration) -> Self {
    Self {
      id,
      user_id,
      form_data: FormData::new(),
      config,
      phase: ProgressionPhase::CollectingBackground,
      last_processed: None,
      issued_seq: 0,
      applied_seq: 0,
    }
  }
}

pub type SharedSession = Arc<RwLock<FormSession>>;

/// Outcome of one field-change event, handed back to the renderer.
#[derive(Clone, Debug, Serialize)]
pub struct FieldChangeOutcome {
  pub form_data: FormData,
  pub config_updated: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub new_config: Option<FormConfiguration>,
  pub phase: ProgressionPhase,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub warning: Option<String>,
}

#[derive(Clone)]
pub struct ProgressionEngine {
  categories: CategoryProvider,
  study_fields: StudyFieldProvider,
  db: Arc<dyn Db>,
}

impl ProgressionEngine {
  pub fn new(categories: CategoryProvider, study_fields: StudyFieldProvider, db: Arc<dyn Db>) -> Self {
    Self { categories, study_fields, db }
  }

  /// Entry point for every field-change event from the renderer.
  #[instrument(level = "info", skip(self, session, value))]
  pub async fn on_field_change(
    &self,
    session: &SharedSession,
    field_id: &str,
    value: Value,
  ) -> FieldChangeOutcome {
    // Record the answer and decide what, if anything, must regenerate.
    let pending = {
      let mut s = session.write().await;
      if is_blank(&value) {
        s.form_data.remove(field_id);
      } else {
        s.form_data.insert(field_id.to_string(), value.clone());
      }

      if is_background_trigger(field_id) {
        let triple = BackgroundTriple::from_form_data(&s.form_data);
        match triple {
          Some(t) if s.last_processed.as_ref() != Some(&t) => {
            s.issued_seq += 1;
            s.phase = ProgressionPhase::Personalizing;
            Some((s.issued_seq, t, s.config.clone()))
          }
          Some(_) => None,
          None => {
            s.phase = ProgressionPhase::CollectingBackground;
            None
          }
        }
      } else {
        None
      }
    };

    if let Some((seq, triple, base)) = pending {
      let result = self.regenerate(&base, &triple).await;
      return self.finish_regeneration(session, seq, triple, result).await;
    }

    if field_id == EDUCATION_LEVEL_FIELD {
      return self.toggle_work_experience(session, &value).await;
    }

    // Data-only update.
    let mut s = session.write().await;
    settle_phase(&mut s);
    FieldChangeOutcome {
      form_data: s.form_data.clone(),
      config_updated: false,
      new_config: None,
      phase: s.phase,
      warning: None,
    }
  }

  /// Build the personalized configuration for a completed background triple:
  /// the session's current fields extended with the study-field bank, merged
  /// with the background templates.
  #[instrument(level = "info", skip(self, base), fields(study_field = %triple.field_of_study))]
  pub async fn regenerate(
    &self,
    base: &FormConfiguration,
    triple: &BackgroundTriple,
  ) -> Result<FormConfiguration, AppError> {
    let study_field_id = triple.field_of_study.clone();
    if self.study_fields.get_by_id(&study_field_id).await.is_none() {
      info!(target: "progression", %study_field_id, "Unknown study field; generic template bank applies");
    }

    let mut seeded = base.clone();
    seeded.fields.extend(templates::templates_for_study_field(&study_field_id));

    let mut merged = merge_enhanced_config(&seeded, &HashMap::new(), true, &self.categories)
      .await
      .map_err(|e| AppError::Personalization(e.to_string()))?;
    merged.metadata.field_category = Some(study_field_id.clone());
    merged.updated_at = Utc::now();
    Ok(merged)
  }

  /// Apply a finished regeneration, last-write-wins by sequence number.
  /// A stale completion (an older seq resolving after a newer one was
  /// applied) is discarded.
  pub async fn finish_regeneration(
    &self,
    session: &SharedSession,
    seq: u64,
    triple: BackgroundTriple,
    result: Result<FormConfiguration, AppError>,
  ) -> FieldChangeOutcome {
    let mut s = session.write().await;
    match result {
      Ok(config) => {
        if seq <= s.applied_seq {
          info!(target: "progression", session = %s.id, seq, applied = s.applied_seq, "Discarding stale regeneration");
          return FieldChangeOutcome {
            form_data: s.form_data.clone(),
            config_updated: false,
            new_config: None,
            phase: s.phase,
            warning: None,
          };
        }
        s.applied_seq = seq;
        s.last_processed = Some(triple.clone());
        s.config = config.clone();
        s.phase = ProgressionPhase::Personalized;
        info!(target: "progression", session = %s.id, study_field = %triple.field_of_study, "Configuration personalized");
        self.persist_background(&s, &triple).await;
        FieldChangeOutcome {
          form_data: s.form_data.clone(),
          config_updated: true,
          new_config: Some(config),
          phase: s.phase,
          warning: None,
        }
      }
      Err(e) => {
        // The previous configuration stays in force; the user is never left
        // without a usable form.
        error!(target: "progression", session = %s.id, error = %e, "Personalization failed; keeping previous configuration");
        if seq > s.applied_seq {
          s.phase = ProgressionPhase::PersonalizationError;
        }
        FieldChangeOutcome {
          form_data: s.form_data.clone(),
          config_updated: false,
          new_config: None,
          phase: s.phase,
          warning: Some(format!("personalization failed: {e}")),
        }
      }
    }
  }

  /// Upsert the per-user background record. Failure here only degrades the
  /// stored intake history and is never surfaced to the form.
  async fn persist_background(&self, session: &FormSession, triple: &BackgroundTriple) {
    let Some(user_id) = &session.user_id else { return };
    let selection = BackgroundSelection {
      user_id: user_id.clone(),
      field_of_study: triple.field_of_study.clone(),
      class_level: triple.class_level.clone(),
      learning_goals: triple.learning_goals.split(',').map(str::to_string).collect(),
      updated_at: Utc::now(),
    };
    if let Err(e) = self.db.upsert_background_selection(&selection).await {
      warn!(target: "progression", %user_id, error = %e, "Background selection upsert failed");
    }
  }

  /// Add or remove the `work_experience` field depending on whether the
  /// education level is "professional". Idempotent in both directions.
  async fn toggle_work_experience(&self, session: &SharedSession, value: &Value) -> FieldChangeOutcome {
    let professional = value.as_str() == Some(PROFESSIONAL_LEVEL);
    let section_meta = match self.categories.ensure_exists("academic_info").await {
      Ok(category) => Some(category.section_meta()),
      Err(e) => {
        warn!(target: "progression", error = %e, "Could not resolve academic_info section");
        None
      }
    };

    let mut s = session.write().await;
    let present = s.config.field(WORK_EXPERIENCE_FIELD).is_some();
    let config_updated = match (professional, present) {
      (true, false) => {
        s.config.fields.push(work_experience_field());
        s.config
          .fields
          .sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(meta) = section_meta {
          s.config.sections.entry("academic_info".to_string()).or_insert(meta);
        }
        info!(target: "progression", session = %s.id, "Added work_experience field");
        true
      }
      (false, true) => {
        s.config.fields.retain(|f| f.id != WORK_EXPERIENCE_FIELD);
        s.form_data.remove(WORK_EXPERIENCE_FIELD);
        info!(target: "progression", session = %s.id, "Removed work_experience field");
        true
      }
      _ => false,
    };
    settle_phase(&mut s);
    FieldChangeOutcome {
      form_data: s.form_data.clone(),
      config_updated,
      new_config: config_updated.then(|| s.config.clone()),
      phase: s.phase,
      warning: None,
    }
  }
}

/// Recompute the resting phase after a data-only change. Personalizing and
/// error phases are sticky until the next regeneration settles them.
fn settle_phase(session: &mut FormSession) {
  match session.phase {
    ProgressionPhase::Personalizing | ProgressionPhase::PersonalizationError => {}
    _ => {
      if session.config.has_background_selection
        && BackgroundTriple::from_form_data(&session.form_data).is_none()
      {
        session.phase = ProgressionPhase::CollectingBackground;
      } else if submission_readiness(&session.form_data, &session.config).is_ready {
        session.phase = ProgressionPhase::ReadyToSubmit;
      } else if session.last_processed.is_some() {
        session.phase = ProgressionPhase::CollectingRemaining;
      }
    }
  }
}

fn work_experience_field() -> Field {
  let mut f = Field::new(WORK_EXPERIENCE_FIELD, FieldType::Textarea, "Work Experience");
  f.order = 100.0;
  f.section = Some("academic_info".into());
  f.study_field_id = "general".into();
  f.category_id = "academic_info".into();
  f.provenance.label = AttrSource::SemanticDefault;
  f
}

// ---------------------------------------------------------------------------
// Completion metrics (pure functions of form data + configuration)
// ---------------------------------------------------------------------------

/// Percentage of required fields answered, rounded; 100 when a configuration
/// has no required fields at all.
pub fn completion_percentage(form_data: &FormData, config: &FormConfiguration) -> u32 {
  let required: Vec<_> = config.fields.iter().filter(|f| f.is_required()).collect();
  if required.is_empty() {
    return 100;
  }
  let done = required
    .iter()
    .filter(|f| form_data.get(&f.id).map(|v| !is_blank(v)).unwrap_or(false))
    .count();
  ((100.0 * done as f64) / required.len() as f64).round() as u32
}

#[derive(Clone, Debug, Serialize)]
pub struct SectionCompletion {
  pub completed: usize,
  pub total: usize,
  pub missing_labels: Vec<String>,
}

/// Completed vs. total required fields within one section, plus the labels
/// still missing.
pub fn section_completion(form_data: &FormData, config: &FormConfiguration, section_id: &str) -> SectionCompletion {
  let mut completed = 0;
  let mut total = 0;
  let mut missing_labels = Vec::new();
  for field in config.fields.iter().filter(|f| f.effective_section() == section_id && f.is_required()) {
    total += 1;
    if form_data.get(&field.id).map(|v| !is_blank(v)).unwrap_or(false) {
      completed += 1;
    } else {
      missing_labels.push(if field.label.is_empty() { field.id.clone() } else { field.label.clone() });
    }
  }
  SectionCompletion { completed, total, missing_labels }
}

#[derive(Clone, Debug, Serialize)]
pub struct SubmissionReadiness {
  pub is_ready: bool,
  pub completion_percentage: u32,
  pub validation_errors: HashMap<String, String>,
  pub can_submit: bool,
}

/// Combined readiness: structurally valid answers and every required field
/// filled in.
pub fn submission_readiness(form_data: &FormData, config: &FormConfiguration) -> SubmissionReadiness {
  let validation: AnswerValidation = validate_answers(form_data, config);
  let completion = completion_percentage(form_data, config);
  SubmissionReadiness {
    is_ready: validation.is_valid && completion == 100,
    completion_percentage: completion,
    validation_errors: validation.errors.clone(),
    can_submit: validation.is_valid,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::persistence::MemoryDb;
  use crate::seeds;
  use pretty_assertions::assert_eq;
  use serde_json::json;

  async fn engine_and_db() -> (ProgressionEngine, Arc<MemoryDb>) {
    let db = Arc::new(MemoryDb::new());
    for category in seeds::default_categories() {
      db.upsert_category(&category).await.unwrap();
    }
    for field in seeds::default_study_fields() {
      db.upsert_study_field(&field).await.unwrap();
    }
    let categories = CategoryProvider::new(db.clone());
    let study_fields = StudyFieldProvider::new(db.clone());
    (ProgressionEngine::new(categories, study_fields, db.clone()), db)
  }

  fn session(user: Option<&str>) -> SharedSession {
    Arc::new(RwLock::new(FormSession::new(
      "s1".into(),
      user.map(str::to_string),
      seeds::default_configuration(),
    )))
  }

  async fn complete_background(engine: &ProgressionEngine, s: &SharedSession, study_field: &str) -> FieldChangeOutcome {
    engine.on_field_change(s, "field_of_study", json!(study_field)).await;
    engine.on_field_change(s, "class_level", json!("undergraduate")).await;
    engine.on_field_change(s, "learning_goals", json!(["exam_prep"])).await
  }

  #[tokio::test]
  async fn completed_background_triggers_personalization() {
    let (engine, db) = engine_and_db().await;
    let s = session(Some("u1"));
    let outcome = complete_background(&engine, &s, "business").await;

    assert!(outcome.config_updated);
    let config = outcome.new_config.unwrap();
    assert_eq!(config.metadata.field_category.as_deref(), Some("business"));
    assert!(config.field("business_areas").is_some());
    assert!(config.has_background_selection);
    assert_eq!(outcome.phase, ProgressionPhase::Personalized);

    // Intake record persisted, one row per user.
    let stored = db.get_background_selection("u1").await.unwrap().unwrap();
    assert_eq!(stored.field_of_study, "business");
  }

  #[tokio::test]
  async fn same_triple_is_not_reprocessed() {
    let (engine, _db) = engine_and_db().await;
    let s = session(None);
    complete_background(&engine, &s, "stem").await;
    // Re-sending the same last answer must not regenerate again.
    let outcome = engine.on_field_change(&s, "learning_goals", json!(["exam_prep"])).await;
    assert!(!outcome.config_updated);
  }

  #[tokio::test]
  async fn changed_triple_regenerates_again() {
    let (engine, _db) = engine_and_db().await;
    let s = session(None);
    complete_background(&engine, &s, "stem").await;
    let outcome = engine.on_field_change(&s, "field_of_study", json!("business")).await;
    assert!(outcome.config_updated);
    assert_eq!(outcome.new_config.unwrap().metadata.field_category.as_deref(), Some("business"));
  }

  #[tokio::test]
  async fn stale_regeneration_never_overwrites_newer_one() {
    let (engine, _db) = engine_and_db().await;
    let s = session(None);

    let base = seeds::default_configuration();
    let old_triple = BackgroundTriple {
      field_of_study: "stem".into(),
      class_level: "undergraduate".into(),
      learning_goals: "exam_prep".into(),
    };
    let new_triple = BackgroundTriple { field_of_study: "business".into(), ..old_triple.clone() };

    // Two in-flight regenerations; the newer one resolves first.
    let (old_seq, new_seq) = {
      let mut guard = s.write().await;
      guard.issued_seq += 1;
      let old_seq = guard.issued_seq;
      guard.issued_seq += 1;
      (old_seq, guard.issued_seq)
    };
    let old_config = engine.regenerate(&base, &old_triple).await.unwrap();
    let new_config = engine.regenerate(&base, &new_triple).await.unwrap();

    let newer = engine.finish_regeneration(&s, new_seq, new_triple, Ok(new_config)).await;
    assert!(newer.config_updated);
    let stale = engine.finish_regeneration(&s, old_seq, old_triple, Ok(old_config)).await;
    assert!(!stale.config_updated);

    let guard = s.read().await;
    assert_eq!(guard.config.metadata.field_category.as_deref(), Some("business"));
  }

  #[tokio::test]
  async fn personalization_failure_keeps_previous_config() {
    let (engine, _db) = engine_and_db().await;
    let s = session(None);
    let before = s.read().await.config.clone();

    let triple = BackgroundTriple {
      field_of_study: "stem".into(),
      class_level: "undergraduate".into(),
      learning_goals: "exam_prep".into(),
    };
    let seq = {
      let mut guard = s.write().await;
      guard.issued_seq += 1;
      guard.issued_seq
    };
    let outcome = engine
      .finish_regeneration(&s, seq, triple, Err(AppError::Personalization("store down".into())))
      .await;

    assert!(!outcome.config_updated);
    assert!(outcome.warning.is_some());
    let guard = s.read().await;
    assert_eq!(guard.phase, ProgressionPhase::PersonalizationError);
    assert_eq!(guard.config, before);
  }

  #[tokio::test]
  async fn education_level_toggle_is_idempotent() {
    let (engine, _db) = engine_and_db().await;
    let s = session(None);

    engine.on_field_change(&s, EDUCATION_LEVEL_FIELD, json!("professional")).await;
    engine.on_field_change(&s, EDUCATION_LEVEL_FIELD, json!("professional")).await;
    {
      let guard = s.read().await;
      let count = guard.config.fields.iter().filter(|f| f.id == WORK_EXPERIENCE_FIELD).count();
      assert_eq!(count, 1);
      let work = guard.config.field(WORK_EXPERIENCE_FIELD).unwrap();
      assert_eq!(work.order, 100.0);
      assert_eq!(work.section.as_deref(), Some("academic_info"));
    }

    engine.on_field_change(&s, EDUCATION_LEVEL_FIELD, json!("undergraduate")).await;
    engine.on_field_change(&s, EDUCATION_LEVEL_FIELD, json!("undergraduate")).await;
    let guard = s.read().await;
    assert!(guard.config.field(WORK_EXPERIENCE_FIELD).is_none());
  }

  #[tokio::test]
  async fn completion_percentage_zero_then_hundred() {
    let mut config = seeds::default_configuration();
    config.fields.truncate(3); // name, email, grade: all required
    let empty = FormData::new();
    assert_eq!(completion_percentage(&empty, &config), 0);

    let filled = FormData::from([
      ("name".to_string(), json!("Ada")),
      ("email".to_string(), json!("ada@example.com")),
      ("grade".to_string(), json!("undergraduate")),
    ]);
    assert_eq!(completion_percentage(&filled, &config), 100);
  }

  #[test]
  fn completion_is_hundred_with_no_required_fields() {
    let mut config = seeds::default_configuration();
    config.fields.clear();
    assert_eq!(completion_percentage(&FormData::new(), &config), 100);
  }

  #[tokio::test]
  async fn section_completion_lists_missing_labels() {
    let config = seeds::default_configuration();
    let data = FormData::from([("name".to_string(), json!("Ada"))]);
    let personal = section_completion(&data, &config, "personal_info");
    assert_eq!(personal.total, 2);
    assert_eq!(personal.completed, 1);
    assert_eq!(personal.missing_labels, vec!["Email Address".to_string()]);
  }

  #[tokio::test]
  async fn readiness_requires_valid_and_complete() {
    let mut config = seeds::default_configuration();
    config.fields.truncate(2); // name + email
    let data = FormData::from([("name".to_string(), json!("Ada"))]);
    let readiness = submission_readiness(&data, &config);
    assert!(!readiness.is_ready);
    assert!(!readiness.can_submit);
    assert_eq!(readiness.completion_percentage, 50);

    let data = FormData::from([
      ("name".to_string(), json!("Ada")),
      ("email".to_string(), json!("ada@example.com")),
    ]);
    let readiness = submission_readiness(&data, &config);
    assert!(readiness.is_ready);
  }
}
