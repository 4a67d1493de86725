//! Display milestones: conversion from a strategy, progress and in-place revision
//!
//! A milestone keeps its focus/methods/assessment as structured fields next to
//! the rendered checklist lines, so revisions are structural merges.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::proposal::PlanUpdateProposal;
use super::simulation::SimulationPhase;
use super::strategy::StrategyResponse;

/// Key of the synthetic terminal milestone
pub const GOAL_KEY: &str = "GA";

const FOCUS_STEP: usize = 0;
const METHODS_STEP: usize = 1;
const ASSESSMENT_STEP: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneState {
    #[default]
    Pending,
    Active,
    Done,
    Goal,
}

impl std::fmt::Display for MilestoneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Done => write!(f, "done"),
            Self::Goal => write!(f, "goal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub text: String,
    pub completed: bool,
}

impl PlanStep {
    fn new(text: String) -> Self {
        Self { text, completed: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    pub state: MilestoneState,
    /// Short display deadline such as "Jul 15"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub assessment: String,
}

impl Milestone {
    fn bare(key: &str, title: &str, state: MilestoneState) -> Self {
        Self {
            key: key.to_string(),
            title: title.to_string(),
            steps: Vec::new(),
            state,
            deadline: None,
            duration_days: None,
            due_date: None,
            focus: Vec::new(),
            methods: Vec::new(),
            assessment: String::new(),
        }
    }

    /// The terminal "Goal Achieved" marker
    pub fn goal_marker() -> Self {
        Self::bare(GOAL_KEY, "Goal Achieved", MilestoneState::Goal)
    }

    pub fn is_goal(&self) -> bool {
        self.state == MilestoneState::Goal
    }

    fn set_due(&mut self, due: NaiveDate) {
        self.due_date = Some(due);
        self.deadline = Some(format_deadline(due));
    }

    fn render_steps(&mut self) {
        self.steps = vec![
            PlanStep::new(focus_line(&self.focus)),
            PlanStep::new(methods_line(&self.methods)),
            PlanStep::new(assessment_line(&self.assessment)),
        ];
    }

    /// Replace one checklist line, clearing its completion flag when the text changes
    fn rewrite_step(&mut self, index: usize, text: String) {
        if self.steps.len() <= ASSESSMENT_STEP {
            self.render_steps();
            return;
        }
        let step = &mut self.steps[index];
        if step.text != text {
            step.text = text;
            step.completed = false;
        }
    }
}

fn focus_line(focus: &[String]) -> String {
    format!("Focus: {}", focus.join(", "))
}

fn methods_line(methods: &[String]) -> String {
    format!("Methods: {}", methods.join(", "))
}

fn assessment_line(assessment: &str) -> String {
    format!("Assessment: {}", assessment)
}

fn format_deadline(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

fn shift(date: NaiveDate, delta: i64) -> NaiveDate {
    let moved = if delta >= 0 {
        date.checked_add_days(Days::new(delta as u64))
    } else {
        date.checked_sub_days(Days::new(delta.unsigned_abs()))
    };
    moved.unwrap_or(date)
}

/// Placeholder slots shown while the simulation runs
pub fn simulation_placeholders() -> Vec<Milestone> {
    SimulationPhase::ALL
        .iter()
        .map(|p| Milestone::bare(p.slot_key(), p.slot_title(), MilestoneState::Pending))
        .collect()
}

/// Convert a confirmed strategy to a display timeline starting `today`
pub fn convert_strategy(strategy: &StrategyResponse, today: NaiveDate) -> Vec<Milestone> {
    debug!(count = strategy.milestones.len(), %today, "convert_strategy: called");
    let mut cumulative = 0u64;
    let mut plan: Vec<Milestone> = strategy
        .milestones
        .iter()
        .enumerate()
        .map(|(index, pm)| {
            cumulative += pm.duration_days as u64;
            let state = if index == 0 {
                MilestoneState::Active
            } else {
                MilestoneState::Pending
            };
            let mut milestone = Milestone::bare(&pm.key, &pm.title, state);
            milestone.duration_days = Some(pm.duration_days);
            milestone.focus = pm.focus.clone();
            milestone.methods = pm.methods.clone();
            milestone.assessment = pm.assessment.clone();
            milestone.set_due(today.checked_add_days(Days::new(cumulative)).unwrap_or(today));
            milestone.render_steps();
            milestone
        })
        .collect();
    plan.push(Milestone::goal_marker());
    plan
}

/// Timeline progress in percent
pub fn progress_percent(plan: &[Milestone]) -> f64 {
    if plan.is_empty() {
        return 0.0;
    }
    let segments = plan.len().saturating_sub(1).max(1);
    let active = plan.iter().position(|m| m.state == MilestoneState::Active);
    let last_done = plan.iter().rposition(|m| m.state == MilestoneState::Done);

    let completed = match (active, last_done) {
        (Some(index), _) => index,
        (None, Some(done)) => {
            let ends_with_goal = plan.last().is_some_and(|m| m.is_goal());
            if ends_with_goal && done == plan.len() - 2 {
                segments
            } else {
                done + 1
            }
        }
        (None, None) => 0,
    };
    completed as f64 / segments as f64 * 100.0
}

/// Outcome of marking a milestone complete
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// No non-goal milestone has that key
    Unknown,
    /// Marked done; `next` is the milestone promoted to active, if any
    Completed { next: Option<String> },
}

/// Mark `key` done with all its steps, then promote the following milestone
///
/// Earlier milestones are closed as well so that everything before the
/// active milestone stays done.
pub fn mark_complete(plan: &mut [Milestone], key: &str) -> Completion {
    debug!(%key, "mark_complete: called");
    let Some(index) = plan.iter().position(|m| m.key == key && !m.is_goal()) else {
        warn!(%key, "mark_complete: unknown milestone");
        return Completion::Unknown;
    };

    for milestone in plan[..=index].iter_mut().filter(|m| !m.is_goal()) {
        milestone.state = MilestoneState::Done;
        if milestone.key == key {
            milestone.steps.iter_mut().for_each(|s| s.completed = true);
        }
    }

    let next = plan[index + 1..]
        .iter_mut()
        .find(|m| m.state == MilestoneState::Pending || m.state == MilestoneState::Active);
    let next = next.map(|m| {
        m.state = MilestoneState::Active;
        m.key.clone()
    });
    Completion::Completed { next }
}

/// Apply an accepted proposal in place
///
/// Only the fields present in the change set are touched. A duration change
/// moves the deadline of the target and of every later milestone by the same
/// number of days. Returns false when the key is not in the plan.
pub fn apply_proposal(plan: &mut [Milestone], proposal: &PlanUpdateProposal) -> bool {
    debug!(key = %proposal.milestone_key, "apply_proposal: called");
    let Some(index) = plan
        .iter()
        .position(|m| m.key == proposal.milestone_key && !m.is_goal())
    else {
        warn!(key = %proposal.milestone_key, "apply_proposal: milestone not in plan");
        return false;
    };
    let changes = &proposal.changes;

    let target = &mut plan[index];
    if let Some(focus) = &changes.focus {
        target.focus = focus.to.clone();
        let line = focus_line(&target.focus);
        target.rewrite_step(FOCUS_STEP, line);
    }
    if let Some(methods) = &changes.methods {
        target.methods = methods.to.clone();
        let line = methods_line(&target.methods);
        target.rewrite_step(METHODS_STEP, line);
    }
    if let Some(assessment) = &changes.assessment {
        target.assessment = assessment.to.clone();
        let line = assessment_line(&target.assessment);
        target.rewrite_step(ASSESSMENT_STEP, line);
    }

    if let Some(duration) = &changes.duration_days {
        let previous = target.duration_days.unwrap_or(duration.from);
        target.duration_days = Some(duration.to);
        let delta = duration.to as i64 - previous as i64;
        if delta != 0 {
            debug!(delta, "apply_proposal: shifting deadlines");
            for milestone in plan[index..].iter_mut().filter(|m| !m.is_goal()) {
                if let Some(due) = milestone.due_date {
                    milestone.set_due(shift(due, delta));
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::proposal::{PlanUpdateProposal, RequestedChanges};
    use crate::domain::strategy::fixtures;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    #[test]
    fn test_convert_strategy() {
        let plan = convert_strategy(&fixtures::strategy(&[8, 12]), today());
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].state, MilestoneState::Active);
        assert_eq!(plan[1].state, MilestoneState::Pending);
        assert_eq!(plan[0].deadline.as_deref(), Some("Jul 9"));
        assert_eq!(plan[1].deadline.as_deref(), Some("Jul 21"));
        assert_eq!(plan[0].steps[0].text, "Focus: M1 topic a, M1 topic b");
        assert_eq!(plan[0].steps[1].text, "Methods: Retrieval practice");
        assert_eq!(plan[0].steps[2].text, "Assessment: M1 quiz");

        let goal = &plan[2];
        assert_eq!(goal.key, GOAL_KEY);
        assert_eq!(goal.state, MilestoneState::Goal);
        assert!(goal.steps.is_empty());
        assert!(goal.deadline.is_none());
    }

    #[test]
    fn test_empty_strategy_yields_goal_only() {
        let plan = convert_strategy(&fixtures::strategy(&[]), today());
        assert_eq!(plan, vec![Milestone::goal_marker()]);
    }

    #[test]
    fn test_placeholders() {
        let slots = simulation_placeholders();
        let titles: Vec<_> = slots.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["Verifying", "Analyzing", "Designing", "Forecasting", "Synthesizing"]);
        assert!(slots.iter().all(|m| m.state == MilestoneState::Pending));
        assert_eq!(slots[4].key, "S5");
    }

    #[test]
    fn test_progress_percent() {
        let mut plan = convert_strategy(&fixtures::strategy(&[1, 1, 1, 1]), today());
        assert_eq!(progress_percent(&plan), 0.0);

        mark_complete(&mut plan, "M1");
        assert_eq!(progress_percent(&plan), 25.0);

        // Done milestones but nothing active: counts through the last done
        plan[1].state = MilestoneState::Done;
        plan[2].state = MilestoneState::Pending;
        assert_eq!(progress_percent(&plan), 50.0);

        for m in plan.iter_mut().filter(|m| !m.is_goal()) {
            m.state = MilestoneState::Done;
        }
        assert_eq!(progress_percent(&plan), 100.0);
        assert_eq!(progress_percent(&[]), 0.0);
    }

    #[test]
    fn test_mark_complete_promotes_next() {
        let mut plan = convert_strategy(&fixtures::strategy(&[3, 4, 5]), today());
        assert_eq!(
            mark_complete(&mut plan, "M1"),
            Completion::Completed {
                next: Some("M2".to_string())
            }
        );
        assert_eq!(plan[0].state, MilestoneState::Done);
        assert!(plan[0].steps.iter().all(|s| s.completed));
        assert_eq!(plan[1].state, MilestoneState::Active);

        assert_eq!(mark_complete(&mut plan, "M3"), Completion::Completed { next: None });
        assert_eq!(plan[1].state, MilestoneState::Done);
        assert_eq!(plan[3].state, MilestoneState::Goal);

        assert_eq!(mark_complete(&mut plan, "GA"), Completion::Unknown);
        assert_eq!(mark_complete(&mut plan, "M9"), Completion::Unknown);
    }

    #[test]
    fn test_duration_only_proposal_keeps_text() {
        let mut plan = convert_strategy(&fixtures::strategy(&[5, 7, 3]), today());
        plan[1].steps[0].completed = true;
        let before = plan[1].steps.clone();

        let proposal = PlanUpdateProposal::against(
            &plan[1],
            "more time",
            RequestedChanges {
                duration_days: Some(10),
                ..Default::default()
            },
        );
        assert!(apply_proposal(&mut plan, &proposal));

        assert_eq!(plan[1].duration_days, Some(10));
        assert_eq!(plan[1].steps, before);
        // Deadlines from the target onward move by +3 days
        assert_eq!(plan[0].deadline.as_deref(), Some("Jul 6"));
        assert_eq!(plan[1].deadline.as_deref(), Some("Jul 16"));
        assert_eq!(plan[2].deadline.as_deref(), Some("Jul 19"));
    }

    #[test]
    fn test_focus_proposal_rewrites_only_its_line() {
        let mut plan = convert_strategy(&fixtures::strategy(&[5]), today());
        plan[0].steps[1].completed = true;

        let proposal = PlanUpdateProposal::against(
            &plan[0],
            "narrow it",
            RequestedChanges {
                focus: Some(vec!["Focus: tricky, values".to_string()]),
                ..Default::default()
            },
        );
        assert!(apply_proposal(&mut plan, &proposal));

        assert_eq!(plan[0].focus, vec!["Focus: tricky, values"]);
        assert_eq!(plan[0].steps[0].text, "Focus: Focus: tricky, values");
        assert_eq!(plan[0].steps[1].text, "Methods: Retrieval practice");
        assert!(plan[0].steps[1].completed);
        assert_eq!(plan[0].deadline.as_deref(), Some("Jul 6"));
    }

    #[test]
    fn test_proposal_for_unknown_key_is_ignored() {
        let mut plan = convert_strategy(&fixtures::strategy(&[5]), today());
        let snapshot = plan.clone();
        let mut proposal = PlanUpdateProposal::against(&plan[0], "r", RequestedChanges::default());
        proposal.milestone_key = "M7".to_string();
        assert!(!apply_proposal(&mut plan, &proposal));
        assert_eq!(plan, snapshot);
    }
}
