//! Persistence façade: collection-style load/save/query operations.
//!
//! The real deployment sits on a generic key/value table store; this core
//! only ever talks to it through the `Db` trait below, so tests (and the
//! default standalone server) run on the in-memory implementation. The trait
//! is injected as `Arc<dyn Db>` everywhere, never reached through globals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::{BackgroundSelection, Category, FormConfiguration, StudyField};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Db: Send + Sync {
  // form_configs
  async fn get_active_config(&self) -> StoreResult<Option<FormConfiguration>>;
  async fn get_config(&self, id: &str) -> StoreResult<Option<FormConfiguration>>;
  async fn upsert_config(&self, config: &FormConfiguration) -> StoreResult<()>;
  async fn set_all_configs_inactive(&self) -> StoreResult<()>;
  async fn delete_config(&self, id: &str) -> StoreResult<bool>;
  async fn list_configs_by_updated_desc(&self) -> StoreResult<Vec<FormConfiguration>>;

  // categories
  async fn list_active_categories(&self) -> StoreResult<Vec<Category>>;
  async fn get_category(&self, id: &str) -> StoreResult<Option<Category>>;
  async fn upsert_category(&self, category: &Category) -> StoreResult<()>;
  async fn upsert_categories(&self, categories: &[Category]) -> StoreResult<()>;
  async fn delete_category(&self, id: &str) -> StoreResult<bool>;

  // study_fields
  async fn list_active_study_fields(&self) -> StoreResult<Vec<StudyField>>;
  async fn get_study_field(&self, id: &str) -> StoreResult<Option<StudyField>>;
  async fn upsert_study_field(&self, field: &StudyField) -> StoreResult<()>;
  async fn delete_study_field(&self, id: &str) -> StoreResult<bool>;
  /// Dependent-count check against the question-mapping collection,
  /// consulted before a study field may be deleted.
  async fn question_mapping_count(&self, study_field_id: &str) -> StoreResult<usize>;

  // background_selections (one row per user)
  async fn upsert_background_selection(&self, selection: &BackgroundSelection) -> StoreResult<()>;
  async fn get_background_selection(&self, user_id: &str) -> StoreResult<Option<BackgroundSelection>>;
  async fn delete_background_selection(&self, user_id: &str) -> StoreResult<bool>;
}

/// In-memory implementation backing the standalone server and the tests.
///
/// Categories and study fields keep insertion order (study fields are listed
/// in that order; categories are re-sorted by `display_order` on read).
/// The `failing` toggle lets tests exercise every fallback path.
#[derive(Default)]
pub struct MemoryDb {
  configs: RwLock<HashMap<String, FormConfiguration>>,
  categories: RwLock<Vec<Category>>,
  study_fields: RwLock<Vec<StudyField>>,
  background: RwLock<HashMap<String, BackgroundSelection>>,
  question_mappings: RwLock<HashMap<String, usize>>,
  failing: AtomicBool,
}

impl MemoryDb {
  pub fn new() -> Self {
    Self::default()
  }

  /// Simulate an unreachable store; every operation fails until reset.
  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  /// Test hook for the study-field dependent-count check.
  pub async fn set_question_mapping_count(&self, study_field_id: &str, count: usize) {
    self.question_mappings.write().await.insert(study_field_id.to_string(), count);
  }

  fn check(&self) -> StoreResult<()> {
    if self.failing.load(Ordering::SeqCst) {
      Err(StoreError("store unreachable (simulated)".into()))
    } else {
      Ok(())
    }
  }
}

#[async_trait]
impl Db for MemoryDb {
  async fn get_active_config(&self) -> StoreResult<Option<FormConfiguration>> {
    self.check()?;
    Ok(self.configs.read().await.values().find(|c| c.is_active).cloned())
  }

  async fn get_config(&self, id: &str) -> StoreResult<Option<FormConfiguration>> {
    self.check()?;
    Ok(self.configs.read().await.get(id).cloned())
  }

  async fn upsert_config(&self, config: &FormConfiguration) -> StoreResult<()> {
    self.check()?;
    self.configs.write().await.insert(config.id.clone(), config.clone());
    Ok(())
  }

  async fn set_all_configs_inactive(&self) -> StoreResult<()> {
    self.check()?;
    for config in self.configs.write().await.values_mut() {
      config.is_active = false;
    }
    Ok(())
  }

  async fn delete_config(&self, id: &str) -> StoreResult<bool> {
    self.check()?;
    Ok(self.configs.write().await.remove(id).is_some())
  }

  async fn list_configs_by_updated_desc(&self) -> StoreResult<Vec<FormConfiguration>> {
    self.check()?;
    let mut all: Vec<_> = self.configs.read().await.values().cloned().collect();
    all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(all)
  }

  async fn list_active_categories(&self) -> StoreResult<Vec<Category>> {
    self.check()?;
    let mut active: Vec<_> = self
      .categories
      .read()
      .await
      .iter()
      .filter(|c| c.is_active)
      .cloned()
      .collect();
    active.sort_by(|a, b| a.display_order.partial_cmp(&b.display_order).unwrap_or(std::cmp::Ordering::Equal));
    Ok(active)
  }

  async fn get_category(&self, id: &str) -> StoreResult<Option<Category>> {
    self.check()?;
    Ok(self.categories.read().await.iter().find(|c| c.category_id == id).cloned())
  }

  async fn upsert_category(&self, category: &Category) -> StoreResult<()> {
    self.check()?;
    let mut all = self.categories.write().await;
    match all.iter_mut().find(|c| c.category_id == category.category_id) {
      Some(existing) => *existing = category.clone(),
      None => all.push(category.clone()),
    }
    Ok(())
  }

  async fn upsert_categories(&self, categories: &[Category]) -> StoreResult<()> {
    self.check()?;
    let mut all = self.categories.write().await;
    for category in categories {
      match all.iter_mut().find(|c| c.category_id == category.category_id) {
        Some(existing) => *existing = category.clone(),
        None => all.push(category.clone()),
      }
    }
    Ok(())
  }

  async fn delete_category(&self, id: &str) -> StoreResult<bool> {
    self.check()?;
    let mut all = self.categories.write().await;
    let before = all.len();
    all.retain(|c| c.category_id != id);
    Ok(all.len() < before)
  }

  async fn list_active_study_fields(&self) -> StoreResult<Vec<StudyField>> {
    self.check()?;
    Ok(self.study_fields.read().await.iter().filter(|f| f.is_active).cloned().collect())
  }

  async fn get_study_field(&self, id: &str) -> StoreResult<Option<StudyField>> {
    self.check()?;
    Ok(self.study_fields.read().await.iter().find(|f| f.field_id == id).cloned())
  }

  async fn upsert_study_field(&self, field: &StudyField) -> StoreResult<()> {
    self.check()?;
    let mut all = self.study_fields.write().await;
    match all.iter_mut().find(|f| f.field_id == field.field_id) {
      Some(existing) => *existing = field.clone(),
      None => all.push(field.clone()),
    }
    Ok(())
  }

  async fn delete_study_field(&self, id: &str) -> StoreResult<bool> {
    self.check()?;
    let mut all = self.study_fields.write().await;
    let before = all.len();
    all.retain(|f| f.field_id != id);
    Ok(all.len() < before)
  }

  async fn question_mapping_count(&self, study_field_id: &str) -> StoreResult<usize> {
    self.check()?;
    Ok(*self.question_mappings.read().await.get(study_field_id).unwrap_or(&0))
  }

  async fn upsert_background_selection(&self, selection: &BackgroundSelection) -> StoreResult<()> {
    self.check()?;
    self.background.write().await.insert(selection.user_id.clone(), selection.clone());
    Ok(())
  }

  async fn get_background_selection(&self, user_id: &str) -> StoreResult<Option<BackgroundSelection>> {
    self.check()?;
    Ok(self.background.read().await.get(user_id).cloned())
  }

  async fn delete_background_selection(&self, user_id: &str) -> StoreResult<bool> {
    self.check()?;
    Ok(self.background.write().await.remove(user_id).is_some())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::seeds;

  #[tokio::test]
  async fn upsert_background_selection_is_one_row_per_user() {
    let db = MemoryDb::new();
    let mut sel = BackgroundSelection {
      user_id: "u1".into(),
      field_of_study: "stem".into(),
      class_level: "undergraduate".into(),
      learning_goals: vec!["exam_prep".into()],
      updated_at: chrono::Utc::now(),
    };
    db.upsert_background_selection(&sel).await.unwrap();
    sel.field_of_study = "business".into();
    db.upsert_background_selection(&sel).await.unwrap();

    let stored = db.get_background_selection("u1").await.unwrap().unwrap();
    assert_eq!(stored.field_of_study, "business");
  }

  #[tokio::test]
  async fn failing_toggle_propagates_errors() {
    let db = MemoryDb::new();
    db.set_failing(true);
    assert!(db.list_active_categories().await.is_err());
    db.set_failing(false);
    assert!(db.list_active_categories().await.is_ok());
  }

  #[tokio::test]
  async fn categories_list_by_display_order() {
    let db = MemoryDb::new();
    for category in seeds::default_categories() {
      db.upsert_category(&category).await.unwrap();
    }
    let listed = db.list_active_categories().await.unwrap();
    let orders: Vec<f64> = listed.iter().map(|c| c.display_order).collect();
    let mut sorted = orders.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(orders, sorted);
  }
}
