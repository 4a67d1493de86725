//! Function declarations offered to the teaching session

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::domain::{RequestedChanges, whole_days};
use crate::llm::{ToolCall, ToolDefinition};

pub const MARK_COMPLETE: &str = "markMilestoneAsComplete";
pub const SCHEDULE_REVIEW: &str = "scheduleSpacedRepetition";
pub const PROPOSE_UPDATE: &str = "proposePlanUpdate";

#[derive(Debug, Error, PartialEq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    Unknown(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

/// A decoded teaching tool call
#[derive(Debug, Clone, PartialEq)]
pub enum TeachingTool {
    MarkComplete {
        milestone_key: String,
    },
    ScheduleReview {
        milestone_key: String,
        delay_days: u32,
    },
    ProposeUpdate {
        milestone_key: String,
        reasoning: String,
        requested: RequestedChanges,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkCompleteArgs {
    milestone_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleReviewArgs {
    milestone_key: String,
    delay_in_days: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposeUpdateArgs {
    milestone_key: String,
    reasoning: String,
    #[serde(default)]
    new_duration_days: Option<f64>,
    #[serde(default)]
    new_focus: Option<Vec<String>>,
    #[serde(default)]
    new_methods: Option<Vec<String>>,
    #[serde(default)]
    new_assessment: Option<String>,
}

impl TeachingTool {
    pub fn from_call(call: &ToolCall) -> Result<Self, ToolError> {
        debug!(name = %call.name, id = %call.id, "TeachingTool::from_call: called");
        let invalid = |e: serde_json::Error| ToolError::InvalidArguments {
            tool: call.name.clone(),
            reason: e.to_string(),
        };
        match call.name.as_str() {
            MARK_COMPLETE => {
                let args: MarkCompleteArgs = serde_json::from_value(call.input.clone()).map_err(invalid)?;
                Ok(Self::MarkComplete {
                    milestone_key: args.milestone_key,
                })
            }
            SCHEDULE_REVIEW => {
                let args: ScheduleReviewArgs = serde_json::from_value(call.input.clone()).map_err(invalid)?;
                Ok(Self::ScheduleReview {
                    milestone_key: args.milestone_key,
                    delay_days: whole_days(args.delay_in_days),
                })
            }
            PROPOSE_UPDATE => {
                let args: ProposeUpdateArgs = serde_json::from_value(call.input.clone()).map_err(invalid)?;
                Ok(Self::ProposeUpdate {
                    milestone_key: args.milestone_key,
                    reasoning: args.reasoning,
                    requested: RequestedChanges {
                        duration_days: args.new_duration_days.map(whole_days),
                        focus: args.new_focus,
                        methods: args.new_methods,
                        assessment: args.new_assessment,
                    },
                })
            }
            other => Err(ToolError::Unknown(other.to_string())),
        }
    }
}

/// The three tools the teaching session may call
pub fn teaching_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            MARK_COMPLETE,
            "Marks a milestone as complete after the student has passed the end-of-chapter test for it.",
            json!({
                "type": "object",
                "properties": {
                    "milestoneKey": {
                        "type": "string",
                        "description": "The key of the milestone that has just been completed (e.g., \"T1\", \"T2\")."
                    }
                },
                "required": ["milestoneKey"]
            }),
        ),
        ToolDefinition::new(
            SCHEDULE_REVIEW,
            "Schedules a future review session for a specific topic to enhance long-term retention.",
            json!({
                "type": "object",
                "properties": {
                    "milestoneKey": {
                        "type": "string",
                        "description": "The key of the milestone to be reviewed in the future (e.g., \"T1\")."
                    },
                    "delayInDays": {
                        "type": "number",
                        "description": "The number of days from now when the review should occur (e.g., 3, 7, 14)."
                    }
                },
                "required": ["milestoneKey", "delayInDays"]
            }),
        ),
        ToolDefinition::new(
            PROPOSE_UPDATE,
            "Proposes a change to the current learning plan based on student performance or new information. Use this if the student is struggling, advancing faster than expected, or if a different teaching method seems more effective.",
            json!({
                "type": "object",
                "properties": {
                    "milestoneKey": {
                        "type": "string",
                        "description": "The key of the milestone to be updated (e.g., \"M1\", \"M2\")."
                    },
                    "reasoning": {
                        "type": "string",
                        "description": "A clear, student-facing explanation for why this change is being recommended. E.g., \"I noticed we are spending more time on this topic, so I recommend extending the deadline to ensure we cover it thoroughly.\""
                    },
                    "newDurationDays": {
                        "type": "number",
                        "description": "Optional. The proposed new duration in days for the milestone."
                    },
                    "newFocus": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Optional. A new list of focus topics for the milestone."
                    },
                    "newMethods": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Optional. A new list of teaching methods for the milestone."
                    },
                    "newAssessment": {
                        "type": "string",
                        "description": "Optional. A new assessment method for the milestone."
                    }
                },
                "required": ["milestoneKey", "reasoning"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, input: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call-1".to_string(),
            name: name.to_string(),
            input,
        }
    }

    #[test]
    fn test_teaching_tools_declare_required_fields() {
        let tools = teaching_tools();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec![MARK_COMPLETE, SCHEDULE_REVIEW, PROPOSE_UPDATE]);
        assert_eq!(tools[2].parameters["required"], json!(["milestoneKey", "reasoning"]));
    }

    #[test]
    fn test_decodes_review_with_fractional_days() {
        let tool = TeachingTool::from_call(&call(
            SCHEDULE_REVIEW,
            json!({"milestoneKey": "M1", "delayInDays": 7.0}),
        ))
        .unwrap();
        assert_eq!(
            tool,
            TeachingTool::ScheduleReview {
                milestone_key: "M1".to_string(),
                delay_days: 7
            }
        );
    }

    #[test]
    fn test_decodes_sparse_proposal() {
        let tool = TeachingTool::from_call(&call(
            PROPOSE_UPDATE,
            json!({"milestoneKey": "M2", "reasoning": "You are flying", "newDurationDays": 3}),
        ))
        .unwrap();
        match tool {
            TeachingTool::ProposeUpdate { requested, .. } => {
                assert_eq!(requested.duration_days, Some(3));
                assert!(requested.focus.is_none());
                assert!(requested.assessment.is_none());
            }
            other => panic!("unexpected tool {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_and_malformed_calls() {
        assert_eq!(
            TeachingTool::from_call(&call("googleSearch", json!({}))),
            Err(ToolError::Unknown("googleSearch".to_string()))
        );
        let err = TeachingTool::from_call(&call(MARK_COMPLETE, json!({"key": "M1"}))).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
