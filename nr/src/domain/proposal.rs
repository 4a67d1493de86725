//! Plan-update proposals raised by the tutor mid-lesson

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::milestone::Milestone;

/// One field-level change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change<T> {
    pub from: T,
    pub to: T,
}

/// Sparse set of changes; absent fields keep their current values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposalChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<Change<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<Change<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Change<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<Change<String>>,
}

impl ProposalChanges {
    pub fn is_empty(&self) -> bool {
        self.duration_days.is_none() && self.focus.is_none() && self.methods.is_none() && self.assessment.is_none()
    }
}

/// Requested new values, as carried by the `proposePlanUpdate` tool call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestedChanges {
    pub duration_days: Option<u32>,
    pub focus: Option<Vec<String>>,
    pub methods: Option<Vec<String>>,
    pub assessment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdateProposal {
    pub milestone_key: String,
    pub reasoning: String,
    pub changes: ProposalChanges,
}

impl PlanUpdateProposal {
    /// Build a proposal against `milestone`, taking each `from` value from its
    /// structured fields
    pub fn against(milestone: &Milestone, reasoning: impl Into<String>, requested: RequestedChanges) -> Self {
        debug!(key = %milestone.key, "PlanUpdateProposal::against: called");
        let changes = ProposalChanges {
            duration_days: requested.duration_days.map(|to| Change {
                from: milestone.duration_days.unwrap_or(0),
                to,
            }),
            focus: requested.focus.map(|to| Change {
                from: milestone.focus.clone(),
                to,
            }),
            methods: requested.methods.map(|to| Change {
                from: milestone.methods.clone(),
                to,
            }),
            assessment: requested.assessment.map(|to| Change {
                from: milestone.assessment.clone(),
                to,
            }),
        };
        Self {
            milestone_key: milestone.key.clone(),
            reasoning: reasoning.into(),
            changes,
        }
    }

    /// Auto-sent turn after the student accepts
    pub fn accepted_message(&self) -> String {
        format!(
            "Great, I've updated the plan for milestone {}. Let's continue with the new approach.",
            self.milestone_key
        )
    }

    /// Auto-sent turn after the student declines
    pub fn declined_message() -> &'static str {
        "Okay, we'll stick to the original plan for now. Let me know if you change your mind."
    }

    /// Human-readable summary lines for the proposal card
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(c) = &self.changes.duration_days {
            lines.push(format!("Duration: {} days -> {} days", c.from, c.to));
        }
        if let Some(c) = &self.changes.focus {
            lines.push(format!("Focus: {} -> {}", c.from.join(", "), c.to.join(", ")));
        }
        if let Some(c) = &self.changes.methods {
            lines.push(format!("Methods: {} -> {}", c.from.join(", "), c.to.join(", ")));
        }
        if let Some(c) = &self.changes.assessment {
            lines.push(format!("Assessment: {} -> {}", c.from, c.to));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::milestone::convert_strategy;
    use crate::domain::strategy::fixtures;
    use chrono::NaiveDate;

    #[test]
    fn test_from_values_come_from_structured_fields() {
        let today = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let plan = convert_strategy(&fixtures::strategy(&[5, 7]), today);
        let proposal = PlanUpdateProposal::against(
            &plan[1],
            "Moles need more time",
            RequestedChanges {
                duration_days: Some(10),
                ..Default::default()
            },
        );

        assert_eq!(proposal.milestone_key, "M2");
        assert_eq!(proposal.changes.duration_days, Some(Change { from: 7, to: 10 }));
        assert!(proposal.changes.focus.is_none());
        assert_eq!(proposal.summary_lines(), vec!["Duration: 7 days -> 10 days"]);
        assert!(proposal.accepted_message().contains("milestone M2"));
    }

    #[test]
    fn test_wire_shape() {
        let today = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let plan = convert_strategy(&fixtures::strategy(&[5]), today);
        let proposal = PlanUpdateProposal::against(
            &plan[0],
            "r",
            RequestedChanges {
                assessment: Some("Oral quiz".to_string()),
                ..Default::default()
            },
        );
        let json = serde_json::to_value(&proposal).unwrap();
        assert_eq!(json["milestoneKey"], "M1");
        assert_eq!(json["changes"]["assessment"]["from"], "M1 quiz");
        assert!(json["changes"].get("duration_days").is_none());
    }
}
