//! Built-in defaults: categories, study fields, and the fallback
//! configuration. These guarantee the app stays usable even when the
//! persistence store is empty or unreachable.

use chrono::Utc;

use crate::domain::{
  AttrSource, Category, Field, FieldOption, FieldType, FormConfiguration, StudyField,
  BACKGROUND_SECTION,
};

pub const DEFAULT_CONFIG_ID: &str = "default";
pub const DEFAULT_CATEGORY_ICON: &str = "folder";
pub const DEFAULT_CATEGORY_COLOR: &str = "#6b7280";

/// Form-section taxonomy shipped with the binary. The system-flagged entries
/// are referenced by core fields and must never be deletable.
pub fn default_categories() -> Vec<Category> {
  let make = |id: &str, name: &str, description: &str, icon: &str, color: &str, order: f64, system: bool| Category {
    category_id: id.into(),
    name: name.into(),
    description: description.into(),
    icon: icon.into(),
    color: color.into(),
    display_order: order,
    is_active: true,
    is_system: system,
    created_at: Utc::now(),
  };
  vec![
    make("background_selection", "Background Selection", "Who you are and what you want to learn", "compass", "#8b5cf6", 0.0, true),
    make("personal_info", "Personal Information", "Contact and identity details", "user", "#3b82f6", 1.0, true),
    make("academic_info", "Academic Information", "Education history and current level", "graduation-cap", "#10b981", 2.0, true),
    make("preferences", "Preferences", "Interests and learning preferences", "sliders", "#f59e0b", 3.0, false),
    make("general", "General", "Everything else", "folder", DEFAULT_CATEGORY_COLOR, 9.0, true),
  ]
}

/// Subject-domain taxonomy shipped with the binary, with the keyword lists
/// scored by text detection.
pub fn default_study_fields() -> Vec<StudyField> {
  let make = |id: &str, name: &str, icon: &str, description: &str, color: &str, keywords: &[&str]| StudyField {
    field_id: id.into(),
    name: name.into(),
    icon: icon.into(),
    description: description.into(),
    color: color.into(),
    is_active: true,
    keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
    created_at: Utc::now(),
  };
  vec![
    make(
      "stem",
      "STEM",
      "flask",
      "Science, technology, engineering and mathematics",
      "#3b82f6",
      &["python", "programming", "coding", "software", "machine learning", "math", "physics", "engineering", "data", "computer"],
    ),
    make(
      "business",
      "Business",
      "briefcase",
      "Management, finance, marketing and entrepreneurship",
      "#10b981",
      &["business", "finance", "marketing", "management", "startup", "economics", "accounting", "sales"],
    ),
    make(
      "arts",
      "Arts & Humanities",
      "palette",
      "Visual arts, music, literature and history",
      "#f59e0b",
      &["art", "music", "design", "literature", "history", "writing", "philosophy", "painting"],
    ),
    make(
      "social_sciences",
      "Social Sciences",
      "users",
      "Psychology, sociology, politics and education",
      "#8b5cf6",
      &["psychology", "sociology", "politics", "education", "anthropology", "teaching", "society"],
    ),
    make(
      "health",
      "Health & Medicine",
      "heart-pulse",
      "Medicine, nursing, nutrition and public health",
      "#ef4444",
      &["medicine", "health", "nursing", "anatomy", "nutrition", "biology", "clinical"],
    ),
    make(
      "general",
      "General Studies",
      "book",
      "Broad or undecided study focus",
      DEFAULT_CATEGORY_COLOR,
      &[],
    ),
  ]
}

/// The three core fields `get_active` guarantees on every configuration it
/// hands out. Missing ones are injected from here.
pub fn core_field_defaults() -> Vec<Field> {
  vec![grade_field(), field_of_study_field(), question_category_field()]
}

fn grade_field() -> Field {
  let mut f = Field::new("grade", FieldType::Select, "Grade Level");
  f.required = true;
  f.options = vec![
    FieldOption::new("middle_school", "Middle School"),
    FieldOption::new("high_school", "High School"),
    FieldOption::new("undergraduate", "Undergraduate"),
    FieldOption::new("graduate", "Graduate"),
    FieldOption::new("professional", "Professional"),
  ];
  f.section = Some("academic_info".into());
  f.order = 3.0;
  f.study_field_id = "general".into();
  f.category_id = "academic_info".into();
  f.provenance.label = AttrSource::SemanticDefault;
  f
}

fn field_of_study_field() -> Field {
  let mut f = Field::new("field_of_study", FieldType::Select, "Field of Study");
  f.required = true;
  // Options come from the live study-field taxonomy at read time.
  f.section = Some(BACKGROUND_SECTION.into());
  f.order = 4.0;
  f.study_field_id = "general".into();
  f.category_id = BACKGROUND_SECTION.into();
  f.provenance.label = AttrSource::SemanticDefault;
  f
}

fn question_category_field() -> Field {
  let mut f = Field::new("question_category", FieldType::Select, "Question Category");
  f.required = true;
  // Options come from the live category taxonomy at read time.
  f.section = Some("preferences".into());
  f.order = 5.0;
  f.study_field_id = "general".into();
  f.category_id = "preferences".into();
  f.provenance.label = AttrSource::SemanticDefault;
  f
}

/// Hard-coded fallback configuration served when no active row exists or the
/// read fails. Options of `field_of_study` are still refreshed from the live
/// taxonomy before this leaves the store.
pub fn default_configuration() -> FormConfiguration {
  let mut name = Field::new("name", FieldType::Text, "Full Name");
  name.required = true;
  name.placeholder = "Jane Doe".into();
  name.section = Some("personal_info".into());
  name.order = 1.0;
  name.study_field_id = "general".into();
  name.category_id = "personal_info".into();

  let mut email = Field::new("email", FieldType::Email, "Email Address");
  email.required = true;
  email.placeholder = "jane@example.com".into();
  email.section = Some("personal_info".into());
  email.order = 2.0;
  email.study_field_id = "general".into();
  email.category_id = "personal_info".into();

  let mut fields = vec![name, email];
  fields.extend(core_field_defaults());

  let now = Utc::now();
  FormConfiguration {
    id: DEFAULT_CONFIG_ID.into(),
    name: "Default Intake Form".into(),
    description: "Built-in fallback intake form".into(),
    fields,
    sections: Default::default(),
    is_active: true,
    has_background_selection: false,
    metadata: Default::default(),
    created_at: now,
    updated_at: now,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{has_dynamic_options, is_protected_field};

  #[test]
  fn default_configuration_carries_all_core_fields() {
    let config = default_configuration();
    for id in ["name", "email", "grade", "field_of_study", "question_category"] {
      let field = config.field(id).unwrap_or_else(|| panic!("missing {id}"));
      assert!(is_protected_field(&field.id));
      assert!(!field.study_field_id.is_empty());
      assert!(!field.category_id.is_empty());
    }
  }

  #[test]
  fn dynamic_option_fields_ship_without_options() {
    for field in core_field_defaults() {
      if has_dynamic_options(&field.id) {
        assert!(field.options.is_empty(), "{} must not persist options", field.id);
      }
    }
  }
}
