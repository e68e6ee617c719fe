//! Small utility helpers used across modules.

/// Derive a human-readable title from a snake_case identifier:
/// "background_selection" -> "Background Selection".
pub fn title_case_from_id(id: &str) -> String {
  id.split(['_', '-'])
    .filter(|part| !part.is_empty())
    .map(|part| {
      let mut chars = part.chars();
      match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

/// Canonical string form of an answer value for trigger comparisons.
/// Arrays are joined so reordering the same goals still counts as a change.
pub fn value_as_key(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::String(s) => s.clone(),
    serde_json::Value::Array(items) => items
      .iter()
      .map(|v| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
      })
      .collect::<Vec<_>>()
      .join(","),
    other => other.to_string(),
  }
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
#[allow(dead_code)]
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max { s.to_string() } else { format!("{}… ({} bytes total)", &s[..max], s.len()) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn title_case() {
    assert_eq!(title_case_from_id("background_selection"), "Background Selection");
    assert_eq!(title_case_from_id("general"), "General");
    assert_eq!(title_case_from_id("academic-info"), "Academic Info");
  }

  #[test]
  fn value_keys() {
    assert_eq!(value_as_key(&serde_json::json!("stem")), "stem");
    assert_eq!(value_as_key(&serde_json::json!(["a", "b"])), "a,b");
  }
}
