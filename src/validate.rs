//! Two distinct validators:
//!
//! - `validate_configuration` checks the schema of a configuration before it
//!   may be saved (admin-facing, returns a message list, empty = valid).
//! - `validate_answers` checks student answers against a resolved
//!   configuration (required-ness, length/numeric bounds, pattern).

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::domain::{has_dynamic_options, Field, FormConfiguration, FormData, is_blank};

/// Structural validation of a configuration. Non-throwing: every violated
/// rule contributes one message naming the offending field's 1-based
/// position. Save is blocked until the list is empty.
pub fn validate_configuration(config: &FormConfiguration) -> Vec<String> {
  let mut errors = Vec::new();

  if config.name.trim().is_empty() {
    errors.push("configuration name is required".to_string());
  }

  let mut seen_ids: HashSet<&str> = HashSet::new();
  for (idx, field) in config.fields.iter().enumerate() {
    let pos = idx + 1;
    if field.id.trim().is_empty() {
      errors.push(format!("field {pos}: id is required"));
    } else if !seen_ids.insert(field.id.as_str()) {
      // Uniqueness is also enforced by the Merger's dedup step, but a
      // hand-edited configuration can reach the store without ever passing
      // through the Merger, so it is checked again here.
      errors.push(format!("field {pos}: duplicate id '{}'", field.id));
    }
    if field.label.trim().is_empty() {
      errors.push(format!("field {pos}: label is required"));
    }
    // Classification must be assigned before save; this blocks templates
    // that were never run through the merger's classification step.
    if field.study_field_id.trim().is_empty() {
      errors.push(format!("field {pos}: study_field_id is required"));
    }
    if field.category_id.trim().is_empty() {
      errors.push(format!("field {pos}: category_id is required"));
    }
    if field.field_type.is_choice() && field.options.is_empty() && !has_dynamic_options(&field.id) {
      errors.push(format!("field {pos}: choice field '{}' needs at least one option", field.id));
    }
  }

  errors
}

/// Result of validating student answers: per-field messages keyed by id.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct AnswerValidation {
  pub is_valid: bool,
  pub errors: HashMap<String, String>,
}

/// Validate the answers collected so far against a resolved configuration.
pub fn validate_answers(form_data: &FormData, config: &FormConfiguration) -> AnswerValidation {
  let mut errors = HashMap::new();

  for field in &config.fields {
    match form_data.get(&field.id) {
      Some(value) if !is_blank(value) => {
        if let Some(message) = check_value(field, value) {
          errors.insert(field.id.clone(), message);
        }
      }
      _ => {
        if field.is_required() {
          errors.insert(field.id.clone(), format!("{} is required", display_name(field)));
        }
      }
    }
  }

  AnswerValidation { is_valid: errors.is_empty(), errors }
}

fn display_name(field: &Field) -> &str {
  if field.label.is_empty() { &field.id } else { &field.label }
}

fn check_value(field: &Field, value: &Value) -> Option<String> {
  let rules = field.validation.as_ref()?;

  if let Value::String(s) = value {
    let chars = s.chars().count();
    if let Some(min) = rules.min_length {
      if chars < min {
        return Some(format!("{} must be at least {min} characters", display_name(field)));
      }
    }
    if let Some(max) = rules.max_length {
      if chars > max {
        return Some(format!("{} must be at most {max} characters", display_name(field)));
      }
    }
    if let Some(pattern) = &rules.pattern {
      match Regex::new(pattern) {
        Ok(re) => {
          if !re.is_match(s) {
            return Some(format!("{} has an invalid format", display_name(field)));
          }
        }
        Err(e) => {
          // An unparsable pattern is an authoring bug, not a student error.
          warn!(target: "form_config", field = %field.id, error = %e, "Skipping invalid validation pattern");
        }
      }
    }
  }

  if let Some(n) = value.as_f64() {
    if let Some(min) = rules.min {
      if n < min {
        return Some(format!("{} must be at least {min}", display_name(field)));
      }
    }
    if let Some(max) = rules.max {
      if n > max {
        return Some(format!("{} must be at most {max}", display_name(field)));
      }
    }
  }

  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Field, FieldOption, FieldType, FieldValidation};
  use crate::seeds;
  use pretty_assertions::assert_eq;
  use serde_json::json;

  fn classified(mut field: Field) -> Field {
    field.study_field_id = "general".into();
    field.category_id = "general".into();
    field
  }

  #[test]
  fn default_configuration_is_valid() {
    assert_eq!(validate_configuration(&seeds::default_configuration()), Vec::<String>::new());
  }

  #[test]
  fn missing_classification_is_rejected_then_accepted_when_filled() {
    let mut config = seeds::default_configuration();
    config.fields[0].study_field_id = String::new();
    let errors = validate_configuration(&config);
    assert_eq!(errors, vec!["field 1: study_field_id is required".to_string()]);

    config.fields[0].study_field_id = "general".into();
    assert!(validate_configuration(&config).is_empty());
  }

  #[test]
  fn choice_fields_need_options_unless_dynamic() {
    let mut config = seeds::default_configuration();
    config.fields.push(classified(Field::new("mood", FieldType::Select, "Mood")));
    let errors = validate_configuration(&config);
    assert_eq!(errors, vec!["field 6: choice field 'mood' needs at least one option".to_string()]);

    // field_of_study / question_category are exempt: options are dynamic.
    let base = seeds::default_configuration();
    assert!(base.field("field_of_study").unwrap().options.is_empty());
    assert!(validate_configuration(&base).is_empty());
  }

  #[test]
  fn duplicate_ids_are_rejected() {
    let mut config = seeds::default_configuration();
    let clone = config.fields[0].clone();
    config.fields.push(clone);
    let errors = validate_configuration(&config);
    assert_eq!(errors, vec!["field 6: duplicate id 'name'".to_string()]);
  }

  #[test]
  fn empty_name_and_label_are_rejected() {
    let mut config = seeds::default_configuration();
    config.name = "  ".into();
    config.fields.push(classified(Field::new("notes", FieldType::Text, "")));
    let errors = validate_configuration(&config);
    assert!(errors.contains(&"configuration name is required".to_string()));
    assert!(errors.contains(&"field 6: label is required".to_string()));
  }

  #[test]
  fn required_answers_are_enforced() {
    let config = seeds::default_configuration();
    let empty = FormData::new();
    let result = validate_answers(&empty, &config);
    assert!(!result.is_valid);
    assert!(result.errors.contains_key("name"));
    assert!(result.errors.contains_key("email"));
  }

  #[test]
  fn bounds_and_pattern_checks() {
    let mut config = seeds::default_configuration();
    let mut age = classified(Field::new("age", FieldType::Number, "Age"));
    age.validation = Some(FieldValidation { min: Some(10.0), max: Some(99.0), ..Default::default() });
    let mut code = classified(Field::new("code", FieldType::Text, "Code"));
    code.validation = Some(FieldValidation {
      min_length: Some(3),
      pattern: Some("^[A-Z]+$".into()),
      ..Default::default()
    });
    config.fields = vec![age, code];

    let data = FormData::from([("age".to_string(), json!(7)), ("code".to_string(), json!("abcd"))]);
    let result = validate_answers(&data, &config);
    assert_eq!(result.errors["age"], "Age must be at least 10");
    assert_eq!(result.errors["code"], "Code has an invalid format");

    let data = FormData::from([("age".to_string(), json!(25)), ("code".to_string(), json!("ABCD"))]);
    assert!(validate_answers(&data, &config).is_valid);
  }

  #[test]
  fn protected_fields_required_even_if_flag_cleared() {
    let mut config = seeds::default_configuration();
    for field in &mut config.fields {
      field.required = false;
    }
    let mut grade_option_values = FormData::new();
    grade_option_values.insert("grade".into(), json!(""));
    let result = validate_answers(&grade_option_values, &config);
    assert!(result.errors.contains_key("grade"));
  }

  #[test]
  fn choice_option_types_sanity() {
    // checkbox is not a choice type for the options rule
    assert!(!FieldType::Checkbox.is_choice());
    assert!(FieldType::MultiSelect.is_choice());
    let _ = FieldOption::new("a", "A");
  }
}
