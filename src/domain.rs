//! Domain models used by the backend: fields, configurations, sections, and
//! the two taxonomies (categories and study fields).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field ids that are always required and can never be deleted,
/// regardless of what the stored `required` flag says.
pub const PROTECTED_FIELD_IDS: [&str; 5] =
  ["name", "email", "grade", "field_of_study", "question_category"];

/// Field ids whose options are populated at read/render time from the live
/// taxonomies. These are persisted with empty options on purpose.
pub const DYNAMIC_OPTION_FIELD_IDS: [&str; 2] = ["field_of_study", "question_category"];

/// The three background answers that trigger configuration regeneration
/// once all of them are present.
pub const BACKGROUND_TRIGGER_FIELD_IDS: [&str; 3] =
  ["field_of_study", "class_level", "learning_goals"];

pub const BACKGROUND_SECTION: &str = "background_selection";
pub const GENERAL_SECTION: &str = "general";

pub fn is_protected_field(id: &str) -> bool {
  PROTECTED_FIELD_IDS.contains(&id)
}

pub fn has_dynamic_options(id: &str) -> bool {
  DYNAMIC_OPTION_FIELD_IDS.contains(&id)
}

pub fn is_background_trigger(id: &str) -> bool {
  BACKGROUND_TRIGGER_FIELD_IDS.contains(&id)
}

/// Input widget kind for a form field.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
  Text,
  Email,
  Number,
  Textarea,
  Select,
  Radio,
  Checkbox,
  MultiSelect,
}

impl FieldType {
  /// Choice types must carry options (unless the field's options are dynamic).
  pub fn is_choice(self) -> bool {
    matches!(self, FieldType::Select | FieldType::Radio | FieldType::MultiSelect)
  }
}

/// One selectable option of a choice field.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldOption {
  pub value: String,
  pub label: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl FieldOption {
  pub fn new(value: &str, label: &str) -> Self {
    Self { value: value.into(), label: label.into(), icon: None, description: None }
  }
}

/// Value constraints checked against student answers (not against the schema).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldValidation {
  #[serde(default)] pub min: Option<f64>,
  #[serde(default)] pub max: Option<f64>,
  #[serde(default)] pub min_length: Option<usize>,
  #[serde(default)] pub max_length: Option<usize>,
  #[serde(default)] pub pattern: Option<String>,
}

/// Presentation hints consumed by the renderer only; never interpreted here.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldStyling {
  #[serde(default)] pub variant: Option<String>,
  #[serde(default)] pub columns: Option<u8>,
  #[serde(default)] pub show_icons: Option<bool>,
  #[serde(default)] pub show_descriptions: Option<bool>,
}

/// Who authored an attribute value. User edits always win over defaults,
/// and the precedence is carried explicitly instead of ad hoc flags.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttrSource {
  #[default]
  UserAuthored,
  SemanticDefault,
  TypeDefault,
}

/// Provenance of the overridable display attributes of a field.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
  #[serde(default)] pub label: AttrSource,
  #[serde(default)] pub placeholder: AttrSource,
}

/// One form input definition. `id` doubles as the answer data key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Field {
  pub id: String,
  #[serde(rename = "type")]
  pub field_type: FieldType,
  #[serde(default)] pub label: String,
  #[serde(default)] pub placeholder: String,
  #[serde(default)] pub help_text: String,
  #[serde(default)] pub required: bool,
  #[serde(default)] pub options: Vec<FieldOption>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub validation: Option<FieldValidation>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub section: Option<String>,
  /// Floats allowed so a field can be inserted between two integers
  /// without renumbering everything.
  #[serde(default)] pub order: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub styling: Option<FieldStyling>,
  #[serde(default)] pub study_field_id: String,
  #[serde(default)] pub category_id: String,
  #[serde(default)] pub provenance: Provenance,
}

impl Field {
  /// Blank field of the given type; callers fill in what differs.
  pub fn new(id: &str, field_type: FieldType, label: &str) -> Self {
    Self {
      id: id.into(),
      field_type,
      label: label.into(),
      placeholder: String::new(),
      help_text: String::new(),
      required: false,
      options: vec![],
      validation: None,
      section: None,
      order: 0.0,
      styling: None,
      study_field_id: String::new(),
      category_id: String::new(),
      provenance: Provenance::default(),
    }
  }

  /// Section bucket, defaulting to "general" for fields with none assigned.
  pub fn effective_section(&self) -> &str {
    self.section.as_deref().unwrap_or(GENERAL_SECTION)
  }

  /// Protected ids are required no matter what the stored flag says.
  pub fn is_required(&self) -> bool {
    self.required || is_protected_field(&self.id)
  }
}

/// Metadata of one form section, resolved from a Category.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SectionMeta {
  pub title: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub icon: String,
  #[serde(default)] pub order: f64,
  #[serde(default)] pub color: String,
  #[serde(default)] pub is_system: bool,
}

/// Free-form classification attached to a resolved configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigMetadata {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub field_category: Option<String>,
}

/// A named, versioned bundle of fields plus the section map derived from them.
/// At most one configuration in the store is active at a time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FormConfiguration {
  pub id: String,
  pub name: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub fields: Vec<Field>,
  #[serde(default)] pub sections: BTreeMap<String, SectionMeta>,
  #[serde(default)] pub is_active: bool,
  #[serde(default)] pub has_background_selection: bool,
  #[serde(default)] pub metadata: ConfigMetadata,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl FormConfiguration {
  pub fn field(&self, id: &str) -> Option<&Field> {
    self.fields.iter().find(|f| f.id == id)
  }
}

/// Taxonomy entry backing a form section.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Category {
  pub category_id: String,
  pub name: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub icon: String,
  #[serde(default)] pub color: String,
  #[serde(default)] pub display_order: f64,
  #[serde(default = "default_true")] pub is_active: bool,
  /// System categories cannot be deleted or have their id changed.
  #[serde(default)] pub is_system: bool,
  #[serde(default = "Utc::now")] pub created_at: DateTime<Utc>,
}

impl Category {
  pub fn section_meta(&self) -> SectionMeta {
    SectionMeta {
      title: self.name.clone(),
      description: self.description.clone(),
      icon: self.icon.clone(),
      order: self.display_order,
      color: self.color.clone(),
      is_system: self.is_system,
    }
  }
}

/// Taxonomy entry for a subject domain (STEM, Business, ...).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StudyField {
  pub field_id: String,
  pub name: String,
  #[serde(default)] pub icon: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub color: String,
  #[serde(default = "default_true")] pub is_active: bool,
  /// Substrings scored by `detect_field_from_text`.
  #[serde(default)] pub keywords: Vec<String>,
  #[serde(default = "Utc::now")] pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
  true
}

/// Per-user intake record; one row per user, upserted on `user_id`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackgroundSelection {
  pub user_id: String,
  pub field_of_study: String,
  pub class_level: String,
  #[serde(default)] pub learning_goals: Vec<String>,
  #[serde(default = "Utc::now")] pub updated_at: DateTime<Utc>,
}

/// Answers collected so far, keyed by field id.
pub type FormData = std::collections::HashMap<String, Value>;

/// True when an answer counts as "not filled in".
pub fn is_blank(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.trim().is_empty(),
    Value::Array(a) => a.is_empty(),
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn protected_fields_are_always_required() {
    let f = Field::new("email", FieldType::Email, "Email");
    assert!(f.is_required());
    assert_eq!(f.effective_section(), "general");
  }

  #[test]
  fn blank_values() {
    assert!(is_blank(&Value::Null));
    assert!(is_blank(&Value::String("  ".into())));
    assert!(is_blank(&serde_json::json!([])));
    assert!(!is_blank(&serde_json::json!(0)));
    assert!(!is_blank(&serde_json::json!(["a"])));
  }
}
