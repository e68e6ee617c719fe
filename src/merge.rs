//! Configuration Merger: combines a base configuration's fields with the
//! background-selection templates and assigns sections/order.
//!
//! The merge is referentially transparent: the same inputs always produce
//! the same field order, so admin previews stay deterministic.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{instrument, warn};

use crate::domain::{
  AttrSource, Field, FormConfiguration, SectionMeta, BACKGROUND_SECTION,
};
use crate::error::AppError;
use crate::taxonomy::CategoryProvider;
use crate::templates;

/// Admin-supplied per-field override applied to a background template.
/// Every overridden attribute becomes user-authored, which is the precedence
/// the provenance union type-checks: user edits always win.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct FieldOverride {
  pub label: Option<String>,
  pub placeholder: Option<String>,
  pub help_text: Option<String>,
  pub required: Option<bool>,
  pub order: Option<f64>,
}

impl FieldOverride {
  fn apply(&self, field: &mut Field) {
    if let Some(label) = &self.label {
      field.label = label.clone();
      field.provenance.label = AttrSource::UserAuthored;
    }
    if let Some(placeholder) = &self.placeholder {
      field.placeholder = placeholder.clone();
      field.provenance.placeholder = AttrSource::UserAuthored;
    }
    if let Some(help_text) = &self.help_text {
      field.help_text = help_text.clone();
    }
    if let Some(required) = self.required {
      field.required = required;
    }
    if let Some(order) = self.order {
      field.order = order;
    }
  }
}

/// Build the resolved configuration from a base config and the background
/// templates. Background fields precede base fields, duplicates are dropped
/// first-wins, the result is stable-sorted by `order`, and every referenced
/// section gets an entry in the sections map (synthesizing categories that
/// do not exist yet).
#[instrument(level = "debug", skip_all, fields(base = %base.id, include_background))]
pub async fn merge_enhanced_config(
  base: &FormConfiguration,
  overrides: &HashMap<String, FieldOverride>,
  include_background: bool,
  categories: &CategoryProvider,
) -> Result<FormConfiguration, AppError> {
  let mut merged: Vec<Field> = Vec::with_capacity(base.fields.len() + 4);

  if include_background {
    let mut backgrounds = templates::background_selection_templates();
    for field in &mut backgrounds {
      if let Some(over) = overrides.get(&field.id) {
        over.apply(field);
        // Overrides never move a background field out of its section.
        field.section = Some(BACKGROUND_SECTION.into());
      }
    }
    let background_ids: HashSet<String> = backgrounds.iter().map(|f| f.id.clone()).collect();
    merged.extend(backgrounds);
    // Background templates take precedence over same-id base fields.
    merged.extend(base.fields.iter().filter(|f| !background_ids.contains(&f.id)).cloned());
  } else {
    merged.extend(base.fields.iter().cloned());
  }

  // First occurrence wins; later duplicates are dropped, never fatal.
  let mut seen = HashSet::new();
  let mut fields: Vec<Field> = Vec::with_capacity(merged.len());
  for field in merged {
    if seen.insert(field.id.clone()) {
      fields.push(field);
    } else {
      warn!(target: "form_config", id = %field.id, "Dropping duplicate field id during merge");
    }
  }

  // Vec::sort_by is stable: fields sharing an order keep their input order,
  // which matters because many templates share order 0.
  fields.sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(std::cmp::Ordering::Equal));

  let mut sections: BTreeMap<String, SectionMeta> = BTreeMap::new();
  for field in &fields {
    let section_id = field.effective_section().to_string();
    if !sections.contains_key(&section_id) {
      let category = categories.ensure_exists(&section_id).await?;
      sections.insert(section_id, category.section_meta());
    }
  }

  Ok(FormConfiguration {
    fields,
    sections,
    has_background_selection: include_background,
    ..base.clone()
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::FieldType;
  use crate::persistence::{Db, MemoryDb};
  use crate::seeds;
  use pretty_assertions::assert_eq;
  use std::sync::Arc;

  async fn provider() -> CategoryProvider {
    let db = Arc::new(MemoryDb::new());
    for category in seeds::default_categories() {
      db.upsert_category(&category).await.unwrap();
    }
    CategoryProvider::new(db)
  }

  fn base_with(ids: &[&str]) -> FormConfiguration {
    let mut config = seeds::default_configuration();
    config.fields = ids
      .iter()
      .map(|id| {
        let mut f = Field::new(id, FieldType::Text, id);
        f.study_field_id = "general".into();
        f.category_id = "general".into();
        f
      })
      .collect();
    config
  }

  fn ids(config: &FormConfiguration) -> Vec<&str> {
    config.fields.iter().map(|f| f.id.as_str()).collect()
  }

  #[tokio::test]
  async fn background_fields_precede_unordered_base_fields() {
    let categories = provider().await;
    let base = base_with(&["name", "email"]);
    let merged = merge_enhanced_config(&base, &HashMap::new(), true, &categories).await.unwrap();
    assert_eq!(
      ids(&merged),
      ["field_of_study", "class_level", "learning_goals", "question_category", "name", "email"],
    );
    assert!(merged.has_background_selection);
  }

  #[tokio::test]
  async fn merge_is_deterministic() {
    let categories = provider().await;
    let base = base_with(&["name", "email", "extra"]);
    let overrides = HashMap::from([("class_level".to_string(), FieldOverride { order: Some(7.5), ..Default::default() })]);
    let first = merge_enhanced_config(&base, &overrides, true, &categories).await.unwrap();
    let second = merge_enhanced_config(&base, &overrides, true, &categories).await.unwrap();
    assert_eq!(first.fields, second.fields);
    assert_eq!(first.sections, second.sections);
  }

  #[tokio::test]
  async fn duplicate_ids_first_occurrence_wins() {
    let categories = provider().await;
    let mut base = base_with(&["alpha"]);
    let mut dup = Field::new("alpha", FieldType::Textarea, "Shadow Alpha");
    dup.order = 50.0;
    base.fields.push(dup);

    let merged = merge_enhanced_config(&base, &HashMap::new(), false, &categories).await.unwrap();
    let alphas: Vec<_> = merged.fields.iter().filter(|f| f.id == "alpha").collect();
    assert_eq!(alphas.len(), 1);
    assert_eq!(alphas[0].field_type, FieldType::Text);
  }

  #[tokio::test]
  async fn background_template_beats_same_id_base_field() {
    let categories = provider().await;
    let mut base = base_with(&["name"]);
    let mut shadow = Field::new("field_of_study", FieldType::Text, "Hand-authored FOS");
    shadow.order = -99.0;
    base.fields.insert(0, shadow);

    let merged = merge_enhanced_config(&base, &HashMap::new(), true, &categories).await.unwrap();
    let fos = merged.field("field_of_study").unwrap();
    assert_eq!(fos.field_type, FieldType::Select);
    assert_eq!(fos.section.as_deref(), Some(BACKGROUND_SECTION));
  }

  #[tokio::test]
  async fn equal_orders_keep_insertion_order() {
    let categories = provider().await;
    let base = base_with(&["one", "two", "three"]);
    let merged = merge_enhanced_config(&base, &HashMap::new(), false, &categories).await.unwrap();
    assert_eq!(ids(&merged), ["one", "two", "three"]);
  }

  #[tokio::test]
  async fn every_referenced_section_has_metadata() {
    let categories = provider().await;
    let mut base = base_with(&["name"]);
    base.fields[0].section = Some("brand_new_section".into());
    let mut free = Field::new("floating", FieldType::Text, "Floating");
    free.section = None;
    base.fields.push(free);

    let merged = merge_enhanced_config(&base, &HashMap::new(), true, &categories).await.unwrap();
    for field in &merged.fields {
      assert!(
        merged.sections.contains_key(field.effective_section()),
        "missing section meta for {}",
        field.effective_section(),
      );
    }
    assert_eq!(merged.sections["brand_new_section"].title, "Brand New Section");
  }

  #[tokio::test]
  async fn overrides_apply_but_keep_section() {
    let categories = provider().await;
    let base = base_with(&[]);
    let overrides = HashMap::from([(
      "learning_goals".to_string(),
      FieldOverride { label: Some("Goals".into()), required: Some(false), order: Some(99.0), ..Default::default() },
    )]);
    let merged = merge_enhanced_config(&base, &overrides, true, &categories).await.unwrap();
    let goals = merged.field("learning_goals").unwrap();
    assert_eq!(goals.label, "Goals");
    assert_eq!(goals.provenance.label, AttrSource::UserAuthored);
    assert_eq!(goals.section.as_deref(), Some(BACKGROUND_SECTION));
    // Pushed to the end by the order override.
    assert_eq!(merged.fields.last().unwrap().id, "learning_goals");
  }

  #[tokio::test]
  async fn empty_base_is_a_valid_background_only_form() {
    let categories = provider().await;
    let base = base_with(&[]);
    let merged = merge_enhanced_config(&base, &HashMap::new(), true, &categories).await.unwrap();
    assert_eq!(merged.fields.len(), 4);
    assert!(merged.sections.contains_key(BACKGROUND_SECTION));
  }
}
