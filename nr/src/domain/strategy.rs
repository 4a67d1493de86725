//! The finalized learning strategy returned by plan generation
//!
//! The JSON field names are a contract with the strategy and refinement
//! prompts and must not be renamed.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

use super::milestone::GOAL_KEY;
use crate::llm::strip_json_fence;

/// Why a model reply could not be used as a strategy
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("The model returned no JSON strategy")]
    NoJson,

    #[error("Failed to parse the learning strategy from the model's response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("The model returned a strategy in an unexpected format (missing {0})")]
    MissingField(&'static str),

    #[error("The model returned a strategy with duplicate milestone key '{0}'")]
    DuplicateKey(String),

    #[error("The model returned a strategy using the reserved milestone key '{0}'")]
    ReservedKey(String),
}

/// Model numbers arrive as JSON numbers that may carry a fraction
pub fn whole_days(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

fn deserialize_whole_days<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    f64::deserialize(deserializer).map(whole_days)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    #[serde(alias = "Low")]
    Low,
    #[default]
    #[serde(alias = "Medium")]
    Medium,
    #[serde(alias = "High")]
    High,
}

impl std::fmt::Display for Risk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityAssessment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_hours: Option<f64>,
    pub risk: Risk,
    #[serde(default)]
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyOverview {
    #[serde(default)]
    pub approach: String,
    #[serde(default)]
    pub reasoning: String,
}

/// One planned phase of study, in sequence order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMilestone {
    pub key: String,
    pub title: String,
    #[serde(deserialize_with = "deserialize_whole_days")]
    pub duration_days: u32,
    #[serde(default)]
    pub focus: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub assessment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScientificBasis {
    pub citation: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyResponse {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub goal: String,
    pub feasibility: FeasibilityAssessment,
    #[serde(default)]
    pub strategy_overview: StrategyOverview,
    pub milestones: Vec<PlanMilestone>,
    #[serde(default)]
    pub scientific_basis: Vec<ScientificBasis>,
}

impl StrategyResponse {
    /// Parse a model reply, tolerating a ```json fence around the object
    pub fn parse(reply: &str) -> Result<Self, StrategyError> {
        debug!(len = reply.len(), "StrategyResponse::parse: called");
        let body = strip_json_fence(reply);
        if body.is_empty() {
            return Err(StrategyError::NoJson);
        }

        let value: serde_json::Value = serde_json::from_str(body)?;
        if !value.is_object() {
            debug!("StrategyResponse::parse: reply is not an object");
            return Err(StrategyError::NoJson);
        }
        for field in ["feasibility", "milestones"] {
            if value.get(field).is_none_or(|v| v.is_null()) {
                warn!(%field, "Strategy reply is missing a required field");
                return Err(StrategyError::MissingField(field));
            }
        }

        let strategy: Self = serde_json::from_value(value)?;
        strategy.validate()?;
        Ok(strategy)
    }

    fn validate(&self) -> Result<(), StrategyError> {
        let mut seen = HashSet::new();
        for milestone in &self.milestones {
            if milestone.key == GOAL_KEY {
                return Err(StrategyError::ReservedKey(milestone.key.clone()));
            }
            if !seen.insert(milestone.key.as_str()) {
                return Err(StrategyError::DuplicateKey(milestone.key.clone()));
            }
        }
        Ok(())
    }

    pub fn total_days(&self) -> u32 {
        self.milestones.iter().map(|m| m.duration_days).sum()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn milestone(key: &str, days: u32) -> PlanMilestone {
        PlanMilestone {
            key: key.to_string(),
            title: format!("Milestone {}", key),
            duration_days: days,
            focus: vec![format!("{} topic a", key), format!("{} topic b", key)],
            methods: vec!["Retrieval practice".to_string()],
            assessment: format!("{} quiz", key),
        }
    }

    pub fn strategy(days: &[u32]) -> StrategyResponse {
        StrategyResponse {
            subject: "Chemistry".to_string(),
            goal: "Get an A".to_string(),
            feasibility: FeasibilityAssessment {
                required_hours: Some(118.0),
                available_hours: Some(100.0),
                risk: Risk::Medium,
                recommendation: "Increase to 1.5h/day.".to_string(),
            },
            strategy_overview: StrategyOverview {
                approach: "Retrieval and error analysis".to_string(),
                reasoning: "Examiner reports".to_string(),
            },
            milestones: days
                .iter()
                .enumerate()
                .map(|(i, d)| milestone(&format!("M{}", i + 1), *d))
                .collect(),
            scientific_basis: vec![ScientificBasis {
                citation: "Dunlosky et al. (2013)".to_string(),
                description: "Retrieval practice".to_string(),
                uri: Some("https://example.org/dunlosky".to_string()),
            }],
        }
    }

    pub fn strategy_json(days: &[u32]) -> String {
        serde_json::to_string_pretty(&strategy(days)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"```json
{
  "subject": "Chemistry (IGCSE 0620)",
  "goal": "Get an A by 20 Oct 2025",
  "feasibility": {"required_hours": 118, "available_hours": 100, "risk": "medium", "recommendation": "Extend deadline."},
  "strategy_overview": {"approach": "Retrieval", "reasoning": "Research"},
  "milestones": [
    {"key": "M1", "title": "Foundations", "duration_days": 8, "focus": ["The atom"], "methods": ["Dual coding"], "assessment": "Test"},
    {"key": "M2", "title": "The Mole", "duration_days": 12, "focus": ["Avogadro"], "methods": ["Interleaving"], "assessment": "Problem set"}
  ],
  "scientific_basis": [{"citation": "Dunlosky (2013)", "description": "Meta-analysis"}]
}
```"#;

    #[test]
    fn test_parse_fenced_reply() {
        let strategy = StrategyResponse::parse(SAMPLE).unwrap();
        assert_eq!(strategy.milestones.len(), 2);
        assert_eq!(strategy.feasibility.risk, Risk::Medium);
        assert_eq!(strategy.feasibility.required_hours, Some(118.0));
        assert_eq!(strategy.total_days(), 20);
        assert!(strategy.scientific_basis[0].uri.is_none());
    }

    #[test]
    fn test_missing_feasibility_is_rejected() {
        let err = StrategyResponse::parse(r#"{"milestones": []}"#).unwrap_err();
        assert!(matches!(err, StrategyError::MissingField("feasibility")));

        let err = StrategyResponse::parse(r#"{"feasibility": {"risk": "low"}}"#).unwrap_err();
        assert!(matches!(err, StrategyError::MissingField("milestones")));
    }

    #[test]
    fn test_prose_is_not_a_strategy() {
        assert!(matches!(
            StrategyResponse::parse("Sure, milestone 2 covers moles.").unwrap_err(),
            StrategyError::Parse(_)
        ));
        assert!(matches!(StrategyResponse::parse("").unwrap_err(), StrategyError::NoJson));
        assert!(matches!(StrategyResponse::parse("[1, 2]").unwrap_err(), StrategyError::NoJson));
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let mut strategy = fixtures::strategy(&[3, 4]);
        strategy.milestones[1].key = "M1".to_string();
        let json = serde_json::to_string(&strategy).unwrap();
        let err = StrategyResponse::parse(&json).unwrap_err();
        assert!(matches!(err, StrategyError::DuplicateKey(k) if k == "M1"));
    }

    #[test]
    fn test_goal_marker_key_is_reserved() {
        let mut strategy = fixtures::strategy(&[3, 4]);
        strategy.milestones[1].key = GOAL_KEY.to_string();
        let json = serde_json::to_string(&strategy).unwrap();
        let err = StrategyResponse::parse(&json).unwrap_err();
        assert!(matches!(err, StrategyError::ReservedKey(k) if k == "GA"));
    }

    #[test]
    fn test_fractional_durations_are_rounded() {
        let json = SAMPLE
            .replace("\"duration_days\": 8", "\"duration_days\": 7.0")
            .replace("\"duration_days\": 12", "\"duration_days\": -2.5");
        let strategy = StrategyResponse::parse(&json).unwrap();
        assert_eq!(strategy.milestones[0].duration_days, 7);
        assert_eq!(strategy.milestones[1].duration_days, 0);

        let json = SAMPLE.replace("\"duration_days\": 12", "\"duration_days\": 11.6");
        assert_eq!(StrategyResponse::parse(&json).unwrap().total_days(), 20);
    }

    #[test]
    fn test_capitalized_risk_is_accepted() {
        let json = fixtures::strategy_json(&[5]).replace("\"medium\"", "\"High\"");
        let strategy = StrategyResponse::parse(&json).unwrap();
        assert_eq!(strategy.feasibility.risk, Risk::High);
    }
}
