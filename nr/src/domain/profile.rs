//! Student profile
//!
//! The profile is collected once and embedded verbatim (as JSON) into the
//! plan-generation prompts, so the wire shape is camelCase like the stored file.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Educational stage of the student
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    #[serde(rename = "")]
    Unset,
    Primary,
    #[serde(rename = "High School")]
    HighSchool,
    University,
    #[serde(rename = "Professional Studies")]
    ProfessionalStudies,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Unset => "",
            Self::Primary => "Primary",
            Self::HighSchool => "High School",
            Self::University => "University",
            Self::ProfessionalStudies => "Professional Studies",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneralInfo {
    pub name: String,
    pub email: String,
    pub country: String,
    pub timezone: String,
    pub usage: String,
    pub usage_other: String,
    pub stage: Stage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrimaryInfo {
    pub school_name: String,
    pub grade: String,
    pub syllabus: String,
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetGrade {
    pub subject: String,
    pub grade: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HighSchoolInfo {
    pub school_name: String,
    pub grade: String,
    pub syllabus: String,
    pub subjects: Vec<String>,
    pub exam_series: String,
    pub exam_year: String,
    pub target_grades: Vec<TargetGrade>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UniversityInfo {
    pub institution: String,
    pub course_name: String,
    pub year_of_study: String,
    pub modules: Vec<String>,
    pub assessment_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfessionalInfo {
    pub field: String,
    pub qualification: String,
    pub exam_date: String,
    pub modules: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearningPreferences {
    pub study_hours: String,
    pub preferred_mode: Vec<String>,
    pub devices: Vec<String>,
    pub motivation: String,
    pub motivation_other: String,
    pub limitations: Vec<String>,
}

/// Special educational needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SenInfo {
    #[serde(rename = "hasSEN")]
    pub has_sen: bool,
    pub condition: String,
    pub condition_other: String,
    pub accommodations: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub relationship: String,
}

/// Everything the tutor knows about the student
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub general: GeneralInfo,
    pub primary: PrimaryInfo,
    pub high_school: HighSchoolInfo,
    pub university: UniversityInfo,
    pub professional: ProfessionalInfo,
    pub learning_preferences: LearningPreferences,
    pub sen: SenInfo,
    pub guardian: GuardianInfo,
}

impl UserProfile {
    /// Profile used when no profile has been stored yet
    pub fn dev_default() -> Self {
        debug!("UserProfile::dev_default: called");
        let mut profile = Self::default();
        profile.general.usage = "Part-time".to_string();
        profile.learning_preferences.study_hours = "10".to_string();
        profile.general.name = "Dev User".to_string();
        profile.general.email = super::goal::DEV_USER_EMAIL.to_string();
        profile.general.stage = Stage::University;
        profile.university.course_name = "AI Engineering".to_string();
        profile
    }

    /// The stage-specific section as JSON (`{}` when no stage is set)
    pub fn stage_details(&self) -> Value {
        debug!(stage = %self.general.stage, "UserProfile::stage_details: called");
        let section = match self.general.stage {
            Stage::Unset => return Value::Object(Default::default()),
            Stage::Primary => serde_json::to_value(&self.primary),
            Stage::HighSchool => serde_json::to_value(&self.high_school),
            Stage::University => serde_json::to_value(&self.university),
            Stage::ProfessionalStudies => serde_json::to_value(&self.professional),
        };
        section.unwrap_or_else(|_| Value::Object(Default::default()))
    }

    /// Pretty JSON for prompt embedding
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wire_names() {
        assert_eq!(serde_json::to_string(&Stage::HighSchool).unwrap(), "\"High School\"");
        assert_eq!(serde_json::to_string(&Stage::Unset).unwrap(), "\"\"");
        let stage: Stage = serde_json::from_str("\"Professional Studies\"").unwrap();
        assert_eq!(stage, Stage::ProfessionalStudies);
    }

    #[test]
    fn test_profile_is_camel_case() {
        let json = serde_json::to_value(UserProfile::dev_default()).unwrap();
        assert_eq!(json["general"]["name"], "Dev User");
        assert_eq!(json["university"]["courseName"], "AI Engineering");
        assert!(json["sen"].get("hasSEN").is_some());
        assert!(json.get("learningPreferences").is_some());
    }

    #[test]
    fn test_partial_profile_loads() {
        let profile: UserProfile = serde_json::from_str(r#"{"general":{"name":"Ada","stage":"High School"}}"#).unwrap();
        assert_eq!(profile.general.name, "Ada");
        assert_eq!(profile.general.stage, Stage::HighSchool);
        assert!(profile.high_school.subjects.is_empty());
    }

    #[test]
    fn test_stage_details_picks_matching_section() {
        let mut profile = UserProfile::default();
        assert_eq!(profile.stage_details(), serde_json::json!({}));

        profile.general.stage = Stage::HighSchool;
        profile.high_school.exam_series = "June".to_string();
        assert_eq!(profile.stage_details()["examSeries"], "June");
    }
}
