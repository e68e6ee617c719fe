//! Field Template Library: static catalogue of field templates keyed by
//! study field, plus the fixed background-selection templates usable by any
//! form. Pure lookups; nothing here touches the store.

use crate::domain::{AttrSource, Field, FieldOption, FieldType, BACKGROUND_SECTION};

fn template(id: &str, field_type: FieldType, label: &str, order: f64, study_field_id: &str) -> Field {
  let mut f = Field::new(id, field_type, label);
  f.order = order;
  f.section = Some("academic_info".into());
  f.study_field_id = study_field_id.into();
  f.category_id = "academic_info".into();
  f.provenance.label = AttrSource::SemanticDefault;
  f.provenance.placeholder = AttrSource::TypeDefault;
  f
}

/// The four fixed background-selection templates. Negative/zero orders make
/// them sort before every domain field. `field_of_study` and
/// `question_category` carry empty options on purpose: those are populated
/// at render time from the taxonomies and never persisted stale.
pub fn background_selection_templates() -> Vec<Field> {
  let mut field_of_study = Field::new("field_of_study", FieldType::Select, "Field of Study");
  field_of_study.required = true;
  field_of_study.order = -3.0;

  let mut class_level = Field::new("class_level", FieldType::Select, "Class Level");
  class_level.required = true;
  class_level.order = -2.0;
  class_level.options = vec![
    FieldOption::new("high_school", "High School"),
    FieldOption::new("undergraduate", "Undergraduate"),
    FieldOption::new("graduate", "Graduate"),
    FieldOption::new("professional", "Professional"),
  ];

  let mut learning_goals = Field::new("learning_goals", FieldType::MultiSelect, "Learning Goals");
  learning_goals.required = true;
  learning_goals.order = -1.0;
  learning_goals.options = vec![
    FieldOption::new("exam_prep", "Exam Preparation"),
    FieldOption::new("skill_building", "Skill Building"),
    FieldOption::new("career_change", "Career Change"),
    FieldOption::new("curiosity", "Curiosity & Exploration"),
  ];

  let mut question_category = Field::new("question_category", FieldType::Select, "Question Category");
  question_category.required = true;
  question_category.order = 0.0;

  let mut all = vec![field_of_study, class_level, learning_goals, question_category];
  for f in &mut all {
    f.section = Some(BACKGROUND_SECTION.into());
    f.study_field_id = "general".into();
    f.category_id = BACKGROUND_SECTION.into();
    f.provenance.label = AttrSource::SemanticDefault;
  }
  all
}

/// Domain-specific templates for a study field. Unknown ids get the generic
/// three-field fallback so personalization always yields something useful.
pub fn templates_for_study_field(study_field_id: &str) -> Vec<Field> {
  match study_field_id {
    "stem" => stem_templates(),
    "business" => business_templates(),
    "arts" => arts_templates(),
    "social_sciences" => social_sciences_templates(),
    "health" => health_templates(),
    _ => generic_templates(study_field_id),
  }
}

fn stem_templates() -> Vec<Field> {
  let mut languages = template("programming_languages", FieldType::MultiSelect, "Programming Languages", 10.0, "stem");
  languages.options = vec![
    FieldOption::new("python", "Python"),
    FieldOption::new("javascript", "JavaScript"),
    FieldOption::new("rust", "Rust"),
    FieldOption::new("java", "Java"),
    FieldOption::new("none", "None yet"),
  ];

  let mut math = template("math_background", FieldType::Select, "Math Background", 11.0, "stem");
  math.options = vec![
    FieldOption::new("algebra", "Algebra"),
    FieldOption::new("calculus", "Calculus"),
    FieldOption::new("statistics", "Statistics"),
    FieldOption::new("advanced", "Advanced / Proof-based"),
  ];

  let mut interests = template("stem_interests", FieldType::Textarea, "STEM Interests", 12.0, "stem");
  interests.placeholder = "Robotics, machine learning, astronomy...".into();

  vec![languages, math, interests]
}

fn business_templates() -> Vec<Field> {
  let mut experience = template("business_experience", FieldType::Select, "Business Experience", 10.0, "business");
  experience.options = vec![
    FieldOption::new("none", "No experience"),
    FieldOption::new("student", "Student projects"),
    FieldOption::new("junior", "1-3 years"),
    FieldOption::new("manager", "Management experience"),
  ];

  let mut areas = template("business_areas", FieldType::MultiSelect, "Areas of Interest", 11.0, "business");
  areas.options = vec![
    FieldOption::new("marketing", "Marketing"),
    FieldOption::new("finance", "Finance"),
    FieldOption::new("operations", "Operations"),
    FieldOption::new("entrepreneurship", "Entrepreneurship"),
  ];

  let mut goals = template("business_goals", FieldType::Textarea, "Career Goals", 12.0, "business");
  goals.placeholder = "Where do you want business skills to take you?".into();

  vec![experience, areas, goals]
}

fn arts_templates() -> Vec<Field> {
  let mut medium = template("creative_medium", FieldType::MultiSelect, "Creative Medium", 10.0, "arts");
  medium.options = vec![
    FieldOption::new("visual", "Visual Arts"),
    FieldOption::new("music", "Music"),
    FieldOption::new("writing", "Writing"),
    FieldOption::new("performance", "Performance"),
  ];

  let mut influences = template("influences", FieldType::Textarea, "Influences & Inspirations", 11.0, "arts");
  influences.placeholder = "Artists, movements or works that inspire you".into();

  vec![medium, influences]
}

fn social_sciences_templates() -> Vec<Field> {
  let mut focus = template("social_focus", FieldType::Select, "Primary Focus", 10.0, "social_sciences");
  focus.options = vec![
    FieldOption::new("psychology", "Psychology"),
    FieldOption::new("sociology", "Sociology"),
    FieldOption::new("politics", "Political Science"),
    FieldOption::new("education", "Education"),
  ];

  let mut topics = template("research_topics", FieldType::Textarea, "Topics of Interest", 11.0, "social_sciences");
  topics.placeholder = "Questions about people and society you want to explore".into();

  vec![focus, topics]
}

fn health_templates() -> Vec<Field> {
  let mut track = template("health_track", FieldType::Select, "Health Track", 10.0, "health");
  track.options = vec![
    FieldOption::new("medicine", "Medicine"),
    FieldOption::new("nursing", "Nursing"),
    FieldOption::new("nutrition", "Nutrition"),
    FieldOption::new("public_health", "Public Health"),
  ];

  let mut background = template("science_background", FieldType::Textarea, "Science Background", 11.0, "health");
  background.placeholder = "Biology, chemistry or clinical exposure so far".into();

  vec![track, background]
}

/// Generic three-field fallback for study fields without a dedicated bank.
fn generic_templates(study_field_id: &str) -> Vec<Field> {
  let mut detail = template("field_of_study_detail", FieldType::Text, "Your Field of Study", 10.0, study_field_id);
  detail.placeholder = "Tell us what you study".into();

  let mut skills = template("current_skills", FieldType::Textarea, "Current Skills", 11.0, study_field_id);
  skills.placeholder = "What can you already do?".into();

  let mut interests = template("interests", FieldType::Textarea, "Interests", 12.0, study_field_id);
  interests.placeholder = "What would you like to learn next?".into();

  vec![detail, skills, interests]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::has_dynamic_options;

  #[test]
  fn background_templates_sort_before_domain_fields() {
    let backgrounds = background_selection_templates();
    assert_eq!(
      backgrounds.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(),
      ["field_of_study", "class_level", "learning_goals", "question_category"],
    );
    for f in &backgrounds {
      assert!(f.order <= 0.0);
      assert_eq!(f.section.as_deref(), Some(BACKGROUND_SECTION));
      if has_dynamic_options(&f.id) {
        assert!(f.options.is_empty());
      } else {
        assert!(!f.options.is_empty());
      }
    }
  }

  #[test]
  fn unknown_study_field_gets_generic_fallback() {
    let fields = templates_for_study_field("underwater_basket_weaving");
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[0].id, "field_of_study_detail");
    assert!(fields.iter().all(|f| f.study_field_id == "underwater_basket_weaving"));
  }

  #[test]
  fn business_bank_includes_business_areas() {
    let fields = templates_for_study_field("business");
    assert!(fields.iter().any(|f| f.id == "business_areas"));
  }
}
