//! Taxonomy Providers: cache-backed lookups for Categories (form sections)
//! and Study Fields (subject domains).
//!
//! Each provider owns an explicit cache object injected with its `Db` handle,
//! so tests can build isolated instances. Loading is lazy with a
//! single-flight guard: concurrent first lookups share one in-flight load
//! instead of issuing N redundant store calls. Invalidation is explicit only
//! (`refresh()` after every admin mutation), no TTL.
//!
//! On store failure `load_all` falls back to the built-in defaults and never
//! throws, so the app stays usable with degraded (static) options.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::domain::{Category, Field, FieldOption, StudyField, GENERAL_SECTION};
use crate::error::AppError;
use crate::persistence::Db;
use crate::seeds;
use crate::util::title_case_from_id;

/// Keyword table for bucketing section-less fields into a category.
/// Scored against the field's id and label.
const CATEGORY_KEYWORDS: [(&str, &[&str]); 4] = [
  ("personal_info", &["name", "email", "phone", "address", "age", "contact"]),
  ("academic_info", &["grade", "school", "education", "degree", "class", "experience"]),
  ("preferences", &["prefer", "interest", "goal", "hobby", "style"]),
  ("background_selection", &["background", "field_of_study", "learning"]),
];

/// First entry reaching the maximum score wins. Deterministic but arbitrary
/// on ties: stable iteration order decides, never randomization.
pub fn pick_best<I>(scores: I) -> Option<String>
where
  I: IntoIterator<Item = (String, u32)>,
{
  let mut best: Option<(String, u32)> = None;
  for (id, score) in scores {
    if score == 0 {
      continue;
    }
    match &best {
      Some((_, top)) if *top >= score => {}
      _ => best = Some((id, score)),
    }
  }
  best.map(|(id, _)| id)
}

/// Pure scoring of a field against the category keyword table, in table order.
pub fn score_category_keywords(field: &Field) -> Vec<(String, u32)> {
  let haystack = format!("{} {}", field.id, field.label).to_lowercase();
  CATEGORY_KEYWORDS
    .iter()
    .map(|(id, keywords)| {
      let score = keywords.iter().filter(|k| haystack.contains(*k)).count() as u32;
      ((*id).to_string(), score)
    })
    .collect()
}

/// Pure scoring of free text against study fields, in provider order.
/// Name match = 10, description match = 5, each keyword hit = 1.
pub fn score_fields_against_text(text: &str, fields: &[StudyField]) -> Vec<(String, u32)> {
  let text = text.to_lowercase();
  fields
    .iter()
    .map(|field| {
      let mut score = 0u32;
      if text.contains(&field.name.to_lowercase()) {
        score += 10;
      }
      let description_hit = field
        .description
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word.len() >= 4 && text.contains(word));
      if description_hit {
        score += 5;
      }
      score += field.keywords.iter().filter(|k| text.contains(&k.to_lowercase())).count() as u32;
      (field.field_id.clone(), score)
    })
    .collect()
}

struct Cached<T> {
  initialized: bool,
  entries: Vec<T>,
  by_id: HashMap<String, usize>,
  by_name: HashMap<String, usize>,
}

impl<T> Default for Cached<T> {
  fn default() -> Self {
    Self { initialized: false, entries: Vec::new(), by_id: HashMap::new(), by_name: HashMap::new() }
  }
}

impl<T> Cached<T> {
  fn rebuild(entries: Vec<T>, id_of: impl Fn(&T) -> &str, name_of: impl Fn(&T) -> &str) -> Self {
    let mut by_id = HashMap::new();
    let mut by_name = HashMap::new();
    for (idx, entry) in entries.iter().enumerate() {
      by_id.insert(id_of(entry).to_string(), idx);
      by_name.insert(name_of(entry).to_lowercase(), idx);
    }
    Self { initialized: true, entries, by_id, by_name }
  }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CategoryProvider {
  db: Arc<dyn Db>,
  cache: Arc<RwLock<Cached<Category>>>,
  load_guard: Arc<Mutex<()>>,
}

impl CategoryProvider {
  pub fn new(db: Arc<dyn Db>) -> Self {
    Self { db, cache: Arc::new(RwLock::new(Cached::default())), load_guard: Arc::new(Mutex::new(())) }
  }

  async fn ensure_loaded(&self) {
    if self.cache.read().await.initialized {
      return;
    }
    let _guard = self.load_guard.lock().await;
    if self.cache.read().await.initialized {
      return;
    }
    self.load_into_cache().await;
  }

  /// Fetch active categories ordered by display_order. Falls back to the
  /// built-in set on store failure; never throws.
  #[instrument(level = "debug", skip(self))]
  async fn load_into_cache(&self) {
    let entries = match self.db.list_active_categories().await {
      Ok(listed) => {
        info!(target: "taxonomy", count = listed.len(), "Loaded categories");
        listed
      }
      Err(e) => {
        warn!(target: "taxonomy", error = %e, "Category load failed; using built-in defaults");
        let mut defaults: Vec<_> = seeds::default_categories().into_iter().filter(|c| c.is_active).collect();
        defaults.sort_by(|a, b| a.display_order.partial_cmp(&b.display_order).unwrap_or(std::cmp::Ordering::Equal));
        defaults
      }
    };
    *self.cache.write().await = Cached::rebuild(entries, |c| &c.category_id, |c| &c.name);
  }

  /// Drop the cache and reload. Called after every admin mutation.
  pub async fn refresh(&self) {
    let _guard = self.load_guard.lock().await;
    self.load_into_cache().await;
  }

  pub async fn get_by_id(&self, id: &str) -> Option<Category> {
    self.ensure_loaded().await;
    let cache = self.cache.read().await;
    cache.by_id.get(id).map(|&idx| cache.entries[idx].clone())
  }

  pub async fn get_by_name(&self, name: &str) -> Option<Category> {
    self.ensure_loaded().await;
    let cache = self.cache.read().await;
    cache.by_name.get(&name.to_lowercase()).map(|&idx| cache.entries[idx].clone())
  }

  pub async fn get_all(&self) -> Vec<Category> {
    self.ensure_loaded().await;
    self.cache.read().await.entries.clone()
  }

  /// Options for UI population, in load order.
  pub async fn get_options(&self) -> Vec<FieldOption> {
    self.ensure_loaded().await;
    self
      .cache
      .read()
      .await
      .entries
      .iter()
      .map(|c| FieldOption {
        value: c.category_id.clone(),
        label: c.name.clone(),
        icon: Some(c.icon.clone()),
        description: Some(c.description.clone()),
      })
      .collect()
  }

  /// Return the existing category or synthesize + persist one derived from
  /// the id (title-cased name, default icon/color, last display order).
  /// Persist failure propagates: callers in the personalization path treat
  /// it as a regeneration error.
  #[instrument(level = "debug", skip(self))]
  pub async fn ensure_exists(&self, id: &str) -> Result<Category, AppError> {
    if let Some(existing) = self.get_by_id(id).await {
      return Ok(existing);
    }
    let next_order = {
      let cache = self.cache.read().await;
      cache.entries.iter().map(|c| c.display_order).fold(0.0f64, f64::max) + 1.0
    };
    let synthesized = Category {
      category_id: id.to_string(),
      name: title_case_from_id(id),
      description: String::new(),
      icon: seeds::DEFAULT_CATEGORY_ICON.into(),
      color: seeds::DEFAULT_CATEGORY_COLOR.into(),
      display_order: next_order,
      is_active: true,
      is_system: false,
      created_at: chrono::Utc::now(),
    };
    self
      .db
      .upsert_category(&synthesized)
      .await
      .map_err(|e| AppError::Store(format!("persisting synthesized category '{id}': {e}")))?;
    info!(target: "taxonomy", %id, "Synthesized missing category");
    {
      let mut cache = self.cache.write().await;
      let idx = cache.entries.len();
      cache.entries.push(synthesized.clone());
      cache.by_id.insert(synthesized.category_id.clone(), idx);
      cache.by_name.insert(synthesized.name.to_lowercase(), idx);
    }
    Ok(synthesized)
  }

  #[instrument(level = "info", skip(self, category), fields(id = %category.category_id))]
  pub async fn add(&self, category: Category) -> Result<Category, AppError> {
    self.db.upsert_category(&category).await.map_err(|e| AppError::Store(e.to_string()))?;
    self.refresh().await;
    Ok(category)
  }

  #[instrument(level = "info", skip(self, patch))]
  pub async fn update(&self, id: &str, patch: CategoryPatch) -> Result<Category, AppError> {
    let mut category = self
      .db
      .get_category(id)
      .await
      .map_err(|e| AppError::TaxonomyLoad(e.to_string()))?
      .ok_or_else(|| AppError::NotFound(format!("category '{id}'")))?;
    patch.apply(&mut category);
    self.db.upsert_category(&category).await.map_err(|e| AppError::Store(e.to_string()))?;
    self.refresh().await;
    Ok(category)
  }

  /// System categories are protected from deletion.
  // TODO: check whether any study field or configuration still references
  // the category before deleting it.
  #[instrument(level = "info", skip(self))]
  pub async fn delete(&self, id: &str) -> Result<(), AppError> {
    let category = self
      .db
      .get_category(id)
      .await
      .map_err(|e| AppError::TaxonomyLoad(e.to_string()))?
      .ok_or_else(|| AppError::NotFound(format!("category '{id}'")))?;
    if category.is_system {
      return Err(AppError::ProtectedEntity(format!("category '{id}' is a system category and cannot be deleted")));
    }
    self.db.delete_category(id).await.map_err(|e| AppError::Store(e.to_string()))?;
    self.refresh().await;
    Ok(())
  }

  /// Bulk reorder: display_order is reassigned from the given id order.
  #[instrument(level = "info", skip(self, ids), fields(count = ids.len()))]
  pub async fn reorder(&self, ids: &[String]) -> Result<(), AppError> {
    let mut updated = Vec::with_capacity(ids.len());
    for (idx, id) in ids.iter().enumerate() {
      let mut category = self
        .db
        .get_category(id)
        .await
        .map_err(|e| AppError::TaxonomyLoad(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("category '{id}'")))?;
      category.display_order = idx as f64;
      updated.push(category);
    }
    self.db.upsert_categories(&updated).await.map_err(|e| AppError::Store(e.to_string()))?;
    self.refresh().await;
    Ok(())
  }

  #[instrument(level = "info", skip(self))]
  pub async fn toggle_status(&self, id: &str) -> Result<Category, AppError> {
    let mut category = self
      .db
      .get_category(id)
      .await
      .map_err(|e| AppError::TaxonomyLoad(e.to_string()))?
      .ok_or_else(|| AppError::NotFound(format!("category '{id}'")))?;
    category.is_active = !category.is_active;
    self.db.upsert_category(&category).await.map_err(|e| AppError::Store(e.to_string()))?;
    self.refresh().await;
    Ok(category)
  }

  /// Resolve the category a field belongs to. An explicit section wins;
  /// otherwise the keyword table is scored and "general" is the default.
  pub async fn detect_category_from_field(&self, field: &Field) -> Result<Category, AppError> {
    if let Some(section) = &field.section {
      return self.ensure_exists(section).await;
    }
    let winner = pick_best(score_category_keywords(field)).unwrap_or_else(|| GENERAL_SECTION.to_string());
    self.ensure_exists(&winner).await
  }
}

/// Partial update payload for a category. The id itself is never patchable.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct CategoryPatch {
  pub name: Option<String>,
  pub description: Option<String>,
  pub icon: Option<String>,
  pub color: Option<String>,
  pub display_order: Option<f64>,
}

impl CategoryPatch {
  fn apply(&self, category: &mut Category) {
    if let Some(name) = &self.name {
      category.name = name.clone();
    }
    if let Some(description) = &self.description {
      category.description = description.clone();
    }
    if let Some(icon) = &self.icon {
      category.icon = icon.clone();
    }
    if let Some(color) = &self.color {
      category.color = color.clone();
    }
    if let Some(order) = self.display_order {
      category.display_order = order;
    }
  }
}

// ---------------------------------------------------------------------------
// Study fields
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StudyFieldProvider {
  db: Arc<dyn Db>,
  cache: Arc<RwLock<Cached<StudyField>>>,
  load_guard: Arc<Mutex<()>>,
}

impl StudyFieldProvider {
  pub fn new(db: Arc<dyn Db>) -> Self {
    Self { db, cache: Arc::new(RwLock::new(Cached::default())), load_guard: Arc::new(Mutex::new(())) }
  }

  async fn ensure_loaded(&self) {
    if self.cache.read().await.initialized {
      return;
    }
    let _guard = self.load_guard.lock().await;
    if self.cache.read().await.initialized {
      return;
    }
    self.load_into_cache().await;
  }

  /// Fetch active study fields in insertion order. Falls back to the
  /// built-in set on store failure; never throws.
  #[instrument(level = "debug", skip(self))]
  async fn load_into_cache(&self) {
    let entries = match self.db.list_active_study_fields().await {
      Ok(listed) => {
        info!(target: "taxonomy", count = listed.len(), "Loaded study fields");
        listed
      }
      Err(e) => {
        warn!(target: "taxonomy", error = %e, "Study field load failed; using built-in defaults");
        seeds::default_study_fields().into_iter().filter(|f| f.is_active).collect()
      }
    };
    *self.cache.write().await = Cached::rebuild(entries, |f| &f.field_id, |f| &f.name);
  }

  pub async fn refresh(&self) {
    let _guard = self.load_guard.lock().await;
    self.load_into_cache().await;
  }

  pub async fn get_by_id(&self, id: &str) -> Option<StudyField> {
    self.ensure_loaded().await;
    let cache = self.cache.read().await;
    cache.by_id.get(id).map(|&idx| cache.entries[idx].clone())
  }

  pub async fn get_by_name(&self, name: &str) -> Option<StudyField> {
    self.ensure_loaded().await;
    let cache = self.cache.read().await;
    cache.by_name.get(&name.to_lowercase()).map(|&idx| cache.entries[idx].clone())
  }

  pub async fn get_all(&self) -> Vec<StudyField> {
    self.ensure_loaded().await;
    self.cache.read().await.entries.clone()
  }

  /// Options for UI population (used to refresh `field_of_study` on read).
  pub async fn get_options(&self) -> Vec<FieldOption> {
    self.ensure_loaded().await;
    self
      .cache
      .read()
      .await
      .entries
      .iter()
      .map(|f| FieldOption {
        value: f.field_id.clone(),
        label: f.name.clone(),
        icon: Some(f.icon.clone()),
        description: Some(f.description.clone()),
      })
      .collect()
  }

  #[instrument(level = "info", skip(self, field), fields(id = %field.field_id))]
  pub async fn add(&self, field: StudyField) -> Result<StudyField, AppError> {
    self.db.upsert_study_field(&field).await.map_err(|e| AppError::Store(e.to_string()))?;
    self.refresh().await;
    Ok(field)
  }

  #[instrument(level = "info", skip(self, patch))]
  pub async fn update(&self, id: &str, patch: StudyFieldPatch) -> Result<StudyField, AppError> {
    let mut field = self
      .db
      .get_study_field(id)
      .await
      .map_err(|e| AppError::TaxonomyLoad(e.to_string()))?
      .ok_or_else(|| AppError::NotFound(format!("study field '{id}'")))?;
    patch.apply(&mut field);
    self.db.upsert_study_field(&field).await.map_err(|e| AppError::Store(e.to_string()))?;
    self.refresh().await;
    Ok(field)
  }

  /// Refuses deletion while question mappings still reference the field.
  #[instrument(level = "info", skip(self))]
  pub async fn delete(&self, id: &str) -> Result<(), AppError> {
    let dependents = self
      .db
      .question_mapping_count(id)
      .await
      .map_err(|e| AppError::Store(e.to_string()))?;
    if dependents > 0 {
      return Err(AppError::ProtectedEntity(format!(
        "study field '{id}' is referenced by {dependents} question mappings"
      )));
    }
    let deleted = self.db.delete_study_field(id).await.map_err(|e| AppError::Store(e.to_string()))?;
    if !deleted {
      return Err(AppError::NotFound(format!("study field '{id}'")));
    }
    self.refresh().await;
    Ok(())
  }

  #[instrument(level = "info", skip(self))]
  pub async fn toggle_status(&self, id: &str) -> Result<StudyField, AppError> {
    let mut field = self
      .db
      .get_study_field(id)
      .await
      .map_err(|e| AppError::TaxonomyLoad(e.to_string()))?
      .ok_or_else(|| AppError::NotFound(format!("study field '{id}'")))?;
    field.is_active = !field.is_active;
    self.db.upsert_study_field(&field).await.map_err(|e| AppError::Store(e.to_string()))?;
    self.refresh().await;
    Ok(field)
  }

  /// Best-scoring study field for free text, or None when nothing scores.
  pub async fn detect_field_from_text(&self, text: &str) -> Option<StudyField> {
    self.ensure_loaded().await;
    let winner = {
      let cache = self.cache.read().await;
      pick_best(score_fields_against_text(text, &cache.entries))?
    };
    self.get_by_id(&winner).await
  }
}

/// Partial update payload for a study field. The id is never patchable.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct StudyFieldPatch {
  pub name: Option<String>,
  pub description: Option<String>,
  pub icon: Option<String>,
  pub color: Option<String>,
  pub keywords: Option<Vec<String>>,
}

impl StudyFieldPatch {
  fn apply(&self, field: &mut StudyField) {
    if let Some(name) = &self.name {
      field.name = name.clone();
    }
    if let Some(description) = &self.description {
      field.description = description.clone();
    }
    if let Some(icon) = &self.icon {
      field.icon = icon.clone();
    }
    if let Some(color) = &self.color {
      field.color = color.clone();
    }
    if let Some(keywords) = &self.keywords {
      field.keywords = keywords.clone();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::FieldType;
  use crate::persistence::MemoryDb;
  use pretty_assertions::assert_eq;

  async fn seeded_db() -> Arc<MemoryDb> {
    let db = Arc::new(MemoryDb::new());
    for category in seeds::default_categories() {
      db.upsert_category(&category).await.unwrap();
    }
    for field in seeds::default_study_fields() {
      db.upsert_study_field(&field).await.unwrap();
    }
    db
  }

  #[tokio::test]
  async fn load_failure_falls_back_to_defaults() {
    let db = Arc::new(MemoryDb::new());
    db.set_failing(true);
    let provider = CategoryProvider::new(db.clone());
    let general = provider.get_by_id("general").await;
    assert!(general.is_some(), "fallback set must contain 'general'");
  }

  #[tokio::test]
  async fn ensure_exists_synthesizes_and_persists() {
    let db = seeded_db().await;
    let provider = CategoryProvider::new(db.clone());
    let created = provider.ensure_exists("hobby_projects").await.unwrap();
    assert_eq!(created.name, "Hobby Projects");
    assert!(!created.is_system);
    let persisted = db.get_category("hobby_projects").await.unwrap();
    assert!(persisted.is_some());
    // Idempotent on the second call.
    let again = provider.ensure_exists("hobby_projects").await.unwrap();
    assert_eq!(again.category_id, created.category_id);
  }

  #[tokio::test]
  async fn deleting_system_category_is_rejected() {
    let db = seeded_db().await;
    let provider = CategoryProvider::new(db);
    let err = provider.delete("general").await.unwrap_err();
    assert!(matches!(err, AppError::ProtectedEntity(_)));
  }

  #[tokio::test]
  async fn deleting_referenced_study_field_is_rejected() {
    let db = seeded_db().await;
    db.set_question_mapping_count("stem", 4).await;
    let provider = StudyFieldProvider::new(db);
    let err = provider.delete("stem").await.unwrap_err();
    assert!(matches!(err, AppError::ProtectedEntity(_)));
  }

  #[tokio::test]
  async fn detect_field_from_text_finds_stem() {
    let db = seeded_db().await;
    let provider = StudyFieldProvider::new(db);
    let detected = provider.detect_field_from_text("I love python and machine learning").await;
    assert_eq!(detected.unwrap().field_id, "stem");
  }

  #[tokio::test]
  async fn detect_field_from_text_none_when_nothing_scores() {
    let db = seeded_db().await;
    let provider = StudyFieldProvider::new(db);
    assert!(provider.detect_field_from_text("xyzzy").await.is_none());
  }

  #[tokio::test]
  async fn detect_category_prefers_explicit_section() {
    let db = seeded_db().await;
    let provider = CategoryProvider::new(db);
    let mut field = Field::new("email", FieldType::Email, "Email Address");
    field.section = Some("personal_info".into());
    let detected = provider.detect_category_from_field(&field).await.unwrap();
    assert_eq!(detected.category_id, "personal_info");

    field.section = None;
    let detected = provider.detect_category_from_field(&field).await.unwrap();
    assert_eq!(detected.category_id, "personal_info");
  }

  #[test]
  fn pick_best_is_first_max_in_order() {
    let scores = vec![("a".to_string(), 2), ("b".to_string(), 3), ("c".to_string(), 3)];
    assert_eq!(pick_best(scores), Some("b".to_string()));
    assert_eq!(pick_best(vec![("a".to_string(), 0)]), None);
  }

  #[tokio::test]
  async fn refresh_picks_up_admin_mutations() {
    let db = seeded_db().await;
    let provider = CategoryProvider::new(db);
    assert!(provider.get_by_name("hobbies").await.is_none());
    let category = Category {
      category_id: "hobbies".into(),
      name: "Hobbies".into(),
      description: String::new(),
      icon: "star".into(),
      color: "#123456".into(),
      display_order: 4.5,
      is_active: true,
      is_system: false,
      created_at: chrono::Utc::now(),
    };
    provider.add(category).await.unwrap();
    assert!(provider.get_by_name("hobbies").await.is_some());
  }
}
