//! Configuration Store: persistence façade over the form-config collection.
//!
//! `get_active` never fails from the caller's perspective: stored configs are
//! patched on read (core fields injected, `field_of_study` options refreshed
//! from the live study-field taxonomy) and a built-in default stands in when
//! no active row exists or the read fails. `save` treats demote-then-activate
//! as one logical operation and recovers the previous active configuration
//! when activation fails halfway.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::FormConfiguration;
use crate::error::AppError;
use crate::persistence::Db;
use crate::seeds;
use crate::taxonomy::StudyFieldProvider;
use crate::validate::validate_configuration;

#[derive(Clone)]
pub struct ConfigStore {
  db: Arc<dyn Db>,
  study_fields: StudyFieldProvider,
}

impl ConfigStore {
  pub fn new(db: Arc<dyn Db>, study_fields: StudyFieldProvider) -> Self {
    Self { db, study_fields }
  }

  /// The single active configuration, patched so the three core fields are
  /// always present and `field_of_study` options never go stale relative to
  /// taxonomy edits. Falls back to the built-in default configuration.
  #[instrument(level = "debug", skip(self))]
  pub async fn get_active(&self) -> FormConfiguration {
    let mut config = match self.db.get_active_config().await {
      Ok(Some(found)) => found,
      Ok(None) => {
        info!(target: "form_config", "No active configuration; serving built-in default");
        seeds::default_configuration()
      }
      Err(e) => {
        warn!(target: "form_config", error = %e, "Active configuration read failed; serving built-in default");
        seeds::default_configuration()
      }
    };
    self.patch_on_read(&mut config).await;
    config
  }

  async fn patch_on_read(&self, config: &mut FormConfiguration) {
    for core in seeds::core_field_defaults() {
      if config.field(&core.id).is_none() {
        info!(target: "form_config", config = %config.id, field = %core.id, "Injecting missing core field");
        config.fields.push(core);
      }
    }
    config
      .fields
      .sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(std::cmp::Ordering::Equal));

    let live_options = self.study_fields.get_options().await;
    if let Some(fos) = config.fields.iter_mut().find(|f| f.id == "field_of_study") {
      fos.options = live_options;
    }
  }

  /// Save as the new active configuration. Validation failures block the
  /// save; demotion and activation succeed or fail together.
  #[instrument(level = "info", skip(self, config), fields(id = %config.id))]
  pub async fn save(&self, mut config: FormConfiguration) -> Result<FormConfiguration, AppError> {
    let errors = validate_configuration(&config);
    if !errors.is_empty() {
      return Err(AppError::Validation(errors));
    }
    if config.id.is_empty() {
      config.id = Uuid::new_v4().to_string();
    }
    config.is_active = true;
    config.updated_at = Utc::now();

    let previous = self.db.get_active_config().await.ok().flatten();
    self
      .db
      .set_all_configs_inactive()
      .await
      .map_err(|e| AppError::Store(format!("demoting configurations: {e}")))?;

    if let Err(e) = self.db.upsert_config(&config).await {
      // Demote succeeded but activate failed; without recovery the store
      // would hold zero active configurations.
      error!(target: "form_config", error = %e, "Activation failed after demote; attempting recovery");
      match previous {
        Some(mut prev) => {
          prev.is_active = true;
          self.db.upsert_config(&prev).await.map_err(|re| {
            AppError::ActivationInconsistency(format!(
              "activation failed ({e}) and previous configuration could not be restored ({re})"
            ))
          })?;
          warn!(target: "form_config", restored = %prev.id, "Previous active configuration restored");
          return Err(AppError::Store(format!("saving configuration: {e}")));
        }
        None => {
          return Err(AppError::ActivationInconsistency(format!(
            "activation failed ({e}) and no previous active configuration exists"
          )));
        }
      }
    }
    info!(target: "form_config", id = %config.id, "Configuration saved as active");
    Ok(config)
  }

  /// Store an inactive snapshot for later activation.
  #[instrument(level = "info", skip(self, config))]
  pub async fn save_as_preset(&self, mut config: FormConfiguration) -> Result<FormConfiguration, AppError> {
    let errors = validate_configuration(&config);
    if !errors.is_empty() {
      return Err(AppError::Validation(errors));
    }
    if config.id.is_empty() {
      config.id = Uuid::new_v4().to_string();
    }
    config.is_active = false;
    config.updated_at = Utc::now();
    self.db.upsert_config(&config).await.map_err(|e| AppError::Store(e.to_string()))?;
    info!(target: "form_config", id = %config.id, "Configuration saved as preset");
    Ok(config)
  }

  /// Inactive snapshots, most recently updated first.
  pub async fn get_all_presets(&self) -> Result<Vec<FormConfiguration>, AppError> {
    let all = self
      .db
      .list_configs_by_updated_desc()
      .await
      .map_err(|e| AppError::Store(e.to_string()))?;
    Ok(all.into_iter().filter(|c| !c.is_active).collect())
  }

  pub async fn load_preset(&self, id: &str) -> Result<FormConfiguration, AppError> {
    self
      .db
      .get_config(id)
      .await
      .map_err(|e| AppError::Store(e.to_string()))?
      .ok_or_else(|| AppError::NotFound(format!("configuration '{id}'")))
  }

  /// Same demote-then-activate sequence as `save`.
  #[instrument(level = "info", skip(self))]
  pub async fn activate_preset(&self, id: &str) -> Result<FormConfiguration, AppError> {
    let preset = self.load_preset(id).await?;
    self.save(preset).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn delete_preset(&self, id: &str) -> Result<(), AppError> {
    let preset = self.load_preset(id).await?;
    if preset.is_active {
      return Err(AppError::ProtectedEntity(format!(
        "configuration '{id}' is active and cannot be deleted"
      )));
    }
    self.db.delete_config(id).await.map_err(|e| AppError::Store(e.to_string()))?;
    Ok(())
  }

  #[instrument(level = "info", skip(self, name, description))]
  pub async fn update_preset_metadata(
    &self,
    id: &str,
    name: Option<String>,
    description: Option<String>,
  ) -> Result<FormConfiguration, AppError> {
    let mut preset = self.load_preset(id).await?;
    if let Some(name) = name {
      preset.name = name;
    }
    if let Some(description) = description {
      preset.description = description;
    }
    preset.updated_at = Utc::now();
    self.db.upsert_config(&preset).await.map_err(|e| AppError::Store(e.to_string()))?;
    Ok(preset)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::persistence::MemoryDb;
  use pretty_assertions::assert_eq;

  async fn store_and_db() -> (ConfigStore, Arc<MemoryDb>) {
    let db = Arc::new(MemoryDb::new());
    for field in seeds::default_study_fields() {
      db.upsert_study_field(&field).await.unwrap();
    }
    let store = ConfigStore::new(db.clone(), StudyFieldProvider::new(db.clone()));
    (store, db)
  }

  fn named(id: &str, name: &str) -> FormConfiguration {
    let mut config = seeds::default_configuration();
    config.id = id.into();
    config.name = name.into();
    config
  }

  #[tokio::test]
  async fn at_most_one_active_configuration() {
    let (store, db) = store_and_db().await;
    store.save(named("a", "Config A")).await.unwrap();
    store.save(named("b", "Config B")).await.unwrap();

    let all = db.list_configs_by_updated_desc().await.unwrap();
    let active: Vec<_> = all.iter().filter(|c| c.is_active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "b");
  }

  #[tokio::test]
  async fn get_active_falls_back_to_default_with_live_options() {
    let (store, _db) = store_and_db().await;
    let config = store.get_active().await;
    assert_eq!(config.id, seeds::DEFAULT_CONFIG_ID);
    let fos = config.field("field_of_study").unwrap();
    assert!(fos.options.iter().any(|o| o.value == "stem"));
  }

  #[tokio::test]
  async fn get_active_patches_missing_core_fields() {
    let (store, _db) = store_and_db().await;
    let mut config = named("bare", "Bare Config");
    config.fields.retain(|f| f.id == "name" || f.id == "email");
    store.save(config).await.unwrap();

    let served = store.get_active().await;
    for id in ["grade", "field_of_study", "question_category"] {
      assert!(served.field(id).is_some(), "core field {id} must be injected");
    }
  }

  #[tokio::test]
  async fn stale_field_of_study_options_are_refreshed() {
    let (store, db) = store_and_db().await;
    let mut config = named("stale", "Stale Options");
    if let Some(fos) = config.fields.iter_mut().find(|f| f.id == "field_of_study") {
      fos.options = vec![crate::domain::FieldOption::new("obsolete", "Obsolete")];
    }
    store.save(config).await.unwrap();
    // Taxonomy changes after the config was stored.
    db.delete_study_field("health").await.unwrap();
    store.study_fields.refresh().await;

    let served = store.get_active().await;
    let fos = served.field("field_of_study").unwrap();
    assert!(fos.options.iter().all(|o| o.value != "obsolete"));
    assert!(fos.options.iter().all(|o| o.value != "health"));
    assert!(fos.options.iter().any(|o| o.value == "stem"));
  }

  #[tokio::test]
  async fn invalid_configuration_blocks_save() {
    let (store, db) = store_and_db().await;
    let mut config = named("bad", "Bad Config");
    config.fields[0].study_field_id = String::new();
    let err = store.save(config).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(db.get_active_config().await.unwrap().is_none());
  }

  #[tokio::test]
  async fn presets_listed_newest_first_and_activatable() {
    let (store, _db) = store_and_db().await;
    store.save_as_preset(named("p1", "Preset One")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    store.save_as_preset(named("p2", "Preset Two")).await.unwrap();

    let presets = store.get_all_presets().await.unwrap();
    assert_eq!(presets[0].id, "p2");

    store.activate_preset("p1").await.unwrap();
    let active = store.get_active().await;
    assert_eq!(active.id, "p1");
    // The activated preset no longer shows up in the preset list.
    let presets = store.get_all_presets().await.unwrap();
    assert!(presets.iter().all(|p| p.id != "p1"));
  }

  #[tokio::test]
  async fn active_configuration_cannot_be_deleted() {
    let (store, _db) = store_and_db().await;
    store.save(named("a", "Config A")).await.unwrap();
    let err = store.delete_preset("a").await.unwrap_err();
    assert!(matches!(err, AppError::ProtectedEntity(_)));
  }

  #[tokio::test]
  async fn update_preset_metadata_stamps_updated_at() {
    let (store, _db) = store_and_db().await;
    let saved = store.save_as_preset(named("p", "Old Name")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let updated = store
      .update_preset_metadata("p", Some("New Name".into()), None)
      .await
      .unwrap();
    assert_eq!(updated.name, "New Name");
    assert!(updated.updated_at > saved.updated_at);
  }
}
