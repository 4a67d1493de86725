//! Goals, the subject tree they live in, and the mocked account

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::id::generate_id;
use super::intake::{GoalFormPayload, days_until};
use super::milestone::{Milestone, simulation_placeholders};
use super::simulation::SimulationPhase;
use super::strategy::StrategyResponse;

pub const DEV_USER_EMAIL: &str = "dev-user@neurapro.ai";

/// A resource attached to a goal, by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalResource {
    pub name: String,
    pub mime_type: String,
}

/// A future review recorded by the spaced-repetition tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledReview {
    pub milestone_key: String,
    pub due: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub name: String,
    /// Countdown in days, fixed at creation
    pub days: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<Milestone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<GoalResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_time_commitment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reviews: Vec<ScheduledReview>,
}

impl Goal {
    /// A fresh goal carrying the simulation placeholder timeline
    pub fn from_payload(payload: &GoalFormPayload, today: NaiveDate) -> Self {
        debug!(goal = %payload.goal_text, "Goal::from_payload: called");
        let days = payload.deadline().map(|d| days_until(d, today)).unwrap_or(1);
        Self {
            id: generate_id("goal", &payload.goal_text),
            name: payload.goal_text.clone(),
            days,
            plan: simulation_placeholders(),
            strategy: None,
            measurement: Some(payload.goal_text.clone()),
            resources: payload
                .resources
                .iter()
                .map(|r| GoalResource {
                    name: r.title_detected.clone(),
                    mime_type: "unknown".to_string(),
                })
                .collect(),
            study_time_commitment: Some(payload.study_time_commitment()),
            reviews: Vec::new(),
        }
    }

    /// True while the timeline still holds simulation slots
    pub fn is_simulating(&self) -> bool {
        self.plan.len() == SimulationPhase::ALL.len()
            && self
                .plan
                .iter()
                .zip(SimulationPhase::ALL)
                .all(|(m, p)| m.key == p.slot_key())
    }

    /// A confirmed plan exists for teaching
    pub fn has_plan(&self) -> bool {
        !self.plan.is_empty() && !self.is_simulating()
    }

    pub fn active_milestone(&self) -> Option<&Milestone> {
        self.plan
            .iter()
            .find(|m| m.state == super::milestone::MilestoneState::Active)
    }

    pub fn milestone(&self, key: &str) -> Option<&Milestone> {
        self.plan.iter().find(|m| m.key == key && !m.is_goal())
    }

    /// Record a review `delay_days` after `today`
    pub fn schedule_review(&mut self, milestone_key: &str, delay_days: u32, today: NaiveDate) -> NaiveDate {
        debug!(%milestone_key, delay_days, "Goal::schedule_review: called");
        let due = today.checked_add_days(Days::new(delay_days as u64)).unwrap_or(today);
        self.reviews.push(ScheduledReview {
            milestone_key: milestone_key.to_string(),
            due,
        });
        due
    }
}

/// Goals grouped by subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectData {
    pub subject: String,
    pub goals: Vec<Goal>,
}

/// Append `goal` under `subject`, creating the subject when needed
pub fn insert_goal(subjects: &mut Vec<SubjectData>, subject: &str, goal: Goal) {
    debug!(%subject, goal_id = %goal.id, "insert_goal: called");
    match subjects.iter_mut().find(|s| s.subject == subject) {
        Some(entry) => entry.goals.push(goal),
        None => subjects.push(SubjectData {
            subject: subject.to_string(),
            goals: vec![goal],
        }),
    }
}

pub fn find_goal<'a>(subjects: &'a [SubjectData], id: &str) -> Option<(&'a str, &'a Goal)> {
    subjects
        .iter()
        .find_map(|s| s.goals.iter().find(|g| g.id == id).map(|g| (s.subject.as_str(), g)))
}

pub fn find_goal_mut<'a>(subjects: &'a mut [SubjectData], id: &str) -> Option<&'a mut Goal> {
    subjects
        .iter_mut()
        .find_map(|s| s.goals.iter_mut().find(|g| g.id == id))
}

pub fn total_goals(subjects: &[SubjectData]) -> usize {
    subjects.iter().map(|s| s.goals.len()).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subscription {
    Free,
    #[default]
    Pro,
}

/// The mocked signed-in account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,
    pub subscription_status: Subscription,
}

impl Default for User {
    fn default() -> Self {
        Self {
            email: DEV_USER_EMAIL.to_string(),
            subscription_status: Subscription::Pro,
        }
    }
}

impl User {
    /// Whether one more goal is allowed given `owned` existing goals
    pub fn may_create_goal(&self, owned: usize, free_limit: usize) -> bool {
        match self.subscription_status {
            Subscription::Pro => true,
            Subscription::Free => owned < free_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::milestone::convert_strategy;
    use crate::domain::strategy::fixtures;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn payload() -> GoalFormPayload {
        GoalFormPayload::new(
            "Physics",
            "Master Newtonian Mechanics",
            NaiveDate::from_ymd_opt(2025, 3, 11).unwrap(),
            2.0,
            5,
            vec![],
            today(),
        )
    }

    #[test]
    fn test_goal_from_payload() {
        let goal = Goal::from_payload(&payload(), today());
        assert!(goal.id.contains("-goal-master-newtonian-mechanics"));
        assert_eq!(goal.days, 11);
        assert!(goal.is_simulating());
        assert!(!goal.has_plan());
        assert_eq!(goal.study_time_commitment.as_deref(), Some("2 hours per day, 5 days a week"));
    }

    #[test]
    fn test_confirmed_plan_is_not_simulating() {
        let mut goal = Goal::from_payload(&payload(), today());
        goal.plan = convert_strategy(&fixtures::strategy(&[3]), today());
        assert!(!goal.is_simulating());
        assert!(goal.has_plan());
        assert_eq!(goal.active_milestone().unwrap().key, "M1");
        assert!(goal.milestone("GA").is_none());

        goal.plan.clear();
        assert!(!goal.has_plan());
    }

    #[test]
    fn test_subject_tree() {
        let mut subjects = Vec::new();
        let a = Goal::from_payload(&payload(), today());
        let b = Goal::from_payload(&payload(), today());
        let b_id = b.id.clone();
        insert_goal(&mut subjects, "Physics", a);
        insert_goal(&mut subjects, "Physics", b);
        insert_goal(&mut subjects, "Chemistry", Goal::from_payload(&payload(), today()));

        assert_eq!(subjects.len(), 2);
        assert_eq!(total_goals(&subjects), 3);
        assert_eq!(find_goal(&subjects, &b_id).unwrap().0, "Physics");
        find_goal_mut(&mut subjects, &b_id).unwrap().name = "Renamed".to_string();
        assert_eq!(find_goal(&subjects, &b_id).unwrap().1.name, "Renamed");
        assert!(find_goal(&subjects, "missing").is_none());
    }

    #[test]
    fn test_schedule_review() {
        let mut goal = Goal::from_payload(&payload(), today());
        let due = goal.schedule_review("M1", 7, today());
        assert_eq!(due, NaiveDate::from_ymd_opt(2025, 3, 8).unwrap());
        assert_eq!(goal.reviews.len(), 1);
    }

    #[test]
    fn test_free_tier_quota() {
        let free = User {
            subscription_status: Subscription::Free,
            ..Default::default()
        };
        assert!(free.may_create_goal(0, 1));
        assert!(!free.may_create_goal(1, 1));
        assert!(User::default().may_create_goal(10, 1));

        let json = serde_json::to_value(&free).unwrap();
        assert_eq!(json["subscriptionStatus"], "free");
    }
}
