//! Loading the optional seed bank (extra categories and study fields) from
//! TOML. Lets a deployment extend the built-in taxonomies without touching
//! the store by hand.
//!
//! See `SeedBank` for the expected schema.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{Category, StudyField};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct SeedBank {
  #[serde(default)]
  pub categories: Vec<Category>,
  #[serde(default)]
  pub study_fields: Vec<StudyField>,
}

/// Attempt to load a `SeedBank` from FORM_SEED_PATH. On any parsing/IO
/// error, returns None; startup never aborts over a bad seed file.
pub fn load_seed_bank_from_env() -> Option<SeedBank> {
  let path = std::env::var("FORM_SEED_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<SeedBank>(&s) {
      Ok(bank) => {
        info!(
          target: "formforge_backend",
          %path,
          categories = bank.categories.len(),
          study_fields = bank.study_fields.len(),
          "Loaded seed bank (TOML)"
        );
        Some(bank)
      }
      Err(e) => {
        error!(target: "formforge_backend", %path, error = %e, "Failed to parse TOML seed bank");
        None
      }
    },
    Err(e) => {
      error!(target: "formforge_backend", %path, error = %e, "Failed to read TOML seed bank file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn seed_bank_parses_minimal_toml() {
    let bank: SeedBank = toml::from_str(
      r#"
        [[study_fields]]
        field_id = "law"
        name = "Law"
        keywords = ["contract", "legal"]

        [[categories]]
        category_id = "legal_background"
        name = "Legal Background"
      "#,
    )
    .unwrap();
    assert_eq!(bank.study_fields[0].field_id, "law");
    assert!(bank.study_fields[0].is_active);
    assert_eq!(bank.categories[0].name, "Legal Background");
  }
}
