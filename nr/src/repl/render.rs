//! Plain-text rendering of cards, timelines and goal listings

use colored::Colorize;

use crate::domain::{
    ChatMessageData, Goal, MessageKind, Milestone, MilestoneState, PlanUpdateProposal, StrategyResponse,
    StrategyState, SubjectData, progress_percent,
};
use crate::llm::{Role, WebSource};

/// A whole transcript entry as it appears in the terminal
pub fn message(message: &ChatMessageData) -> String {
    match &message.kind {
        MessageKind::Text => match message.role {
            Role::User => format!("{} {}", "you>".bright_green(), message.content),
            Role::Assistant => message.content.clone(),
        },
        MessageKind::Strategy {
            strategy_state,
            strategy,
            sources,
        } => strategy_card(strategy_state, strategy, sources),
        MessageKind::Image => image(&message.content),
        MessageKind::PlanUpdateProposal { proposal } => proposal_card(proposal),
    }
}

pub fn strategy_card(state: &StrategyState, strategy: &StrategyResponse, sources: &[WebSource]) -> String {
    let mut out = Vec::new();
    out.push(format!("{}", state.current_title.bright_cyan().bold()));
    out.push(format!("{} - {}", strategy.subject, strategy.goal));
    out.push(String::new());

    let feasibility = &strategy.feasibility;
    let hours = match (feasibility.required_hours, feasibility.available_hours) {
        (Some(required), Some(available)) => format!(" ({}h required, {}h available)", required, available),
        _ => String::new(),
    };
    out.push(format!("{} {} risk{}", "Feasibility:".bold(), feasibility.risk, hours));
    if !feasibility.recommendation.is_empty() {
        out.push(format!("  {}", feasibility.recommendation));
    }

    if !strategy.strategy_overview.approach.is_empty() {
        out.push(format!("{} {}", "Approach:".bold(), strategy.strategy_overview.approach));
    }
    if !strategy.strategy_overview.reasoning.is_empty() {
        out.push(format!("  {}", strategy.strategy_overview.reasoning.dimmed()));
    }

    out.push(String::new());
    for m in &strategy.milestones {
        out.push(format!("{} {} ({} days)", m.key.yellow(), m.title, m.duration_days));
        if !m.focus.is_empty() {
            out.push(format!("    Focus: {}", m.focus.join(", ")));
        }
        if !m.methods.is_empty() {
            out.push(format!("    Methods: {}", m.methods.join(", ")));
        }
        if !m.assessment.is_empty() {
            out.push(format!("    Assessment: {}", m.assessment));
        }
    }

    if !strategy.scientific_basis.is_empty() {
        out.push(String::new());
        out.push(format!("{}", "Scientific basis:".bold()));
        for basis in &strategy.scientific_basis {
            let uri = basis.uri.as_deref().map(|u| format!(" <{}>", u)).unwrap_or_default();
            out.push(format!("  - {}: {}{}", basis.citation, basis.description, uri));
        }
    }

    if !sources.is_empty() {
        out.push(String::new());
        out.push(format!("{}", "Sources:".bold()));
        for source in sources {
            out.push(format!("  - {} <{}>", source.title, source.uri));
        }
    }

    if state.show_details && !state.stages.is_empty() {
        out.push(String::new());
        out.push(format!("{}", "Simulation:".bold()));
        for stage in &state.stages {
            out.push(format!("  [{}] {}", stage.phase().slot_title(), stage.narration.dimmed()));
        }
    }

    out.push(String::new());
    out.push(format!(
        "{}",
        "Type 'confirm' to start, or ask for changes to the plan.".dimmed()
    ));
    out.join("\n")
}

pub fn proposal_card(proposal: &PlanUpdateProposal) -> String {
    let mut out = vec![
        format!(
            "{} {}",
            "Proposed update for milestone".bright_magenta().bold(),
            proposal.milestone_key.bright_magenta().bold()
        ),
        format!("  {}", proposal.reasoning),
    ];
    out.extend(proposal.summary_lines().into_iter().map(|line| format!("  {}", line)));
    out.push(format!("{}", "/accept or /decline".dimmed()));
    out.join("\n")
}

fn image(url: &str) -> String {
    // Data URLs are far too long to print
    let bytes = url.split_once(',').map(|(_, data)| data.len() * 3 / 4).unwrap_or(0);
    format!("{} {} KB", "[image]".bright_blue(), bytes / 1024)
}

fn state_marker(state: MilestoneState) -> colored::ColoredString {
    match state {
        MilestoneState::Done => "[x]".green(),
        MilestoneState::Active => "[>]".bright_yellow(),
        MilestoneState::Pending => "[ ]".normal(),
        MilestoneState::Goal => "[*]".bright_cyan(),
    }
}

fn milestone_lines(m: &Milestone, out: &mut Vec<String>) {
    let deadline = m.deadline.as_deref().map(|d| format!(" (by {})", d)).unwrap_or_default();
    out.push(format!("{} {} {}{}", state_marker(m.state), m.key, m.title, deadline.dimmed()));
    for step in &m.steps {
        let tick = if step.completed { "x" } else { " " };
        out.push(format!("      [{}] {}", tick, step.text));
    }
}

/// Timeline with states, deadlines, steps and progress
pub fn timeline(goal: &Goal) -> String {
    let mut out = vec![format!("{} ({} days)", goal.name.bold(), goal.days)];
    if let Some(commitment) = &goal.study_time_commitment {
        out.push(format!("  {}", commitment.dimmed()));
    }
    if goal.plan.is_empty() {
        out.push("  No plan yet.".to_string());
        return out.join("\n");
    }
    out.push(format!("  Progress: {:.0}%", progress_percent(&goal.plan)));
    for m in &goal.plan {
        milestone_lines(m, &mut out);
    }
    if !goal.reviews.is_empty() {
        out.push(format!("{}", "Reviews:".bold()));
        for review in &goal.reviews {
            out.push(format!("  {} on {}", review.milestone_key, review.due));
        }
    }
    out.join("\n")
}

/// Goals grouped by subject; `*` marks the active one
pub fn goal_list(subjects: &[SubjectData], active: Option<&str>) -> String {
    if subjects.iter().all(|s| s.goals.is_empty()) {
        return "No goals yet. Create one with `neura goal new`.".to_string();
    }
    let mut out = Vec::new();
    for subject in subjects {
        out.push(format!("{}", subject.subject.bold()));
        for goal in &subject.goals {
            let marker = if active == Some(goal.id.as_str()) { "*" } else { " " };
            let status = if goal.has_plan() {
                format!("{:.0}%", progress_percent(&goal.plan))
            } else {
                "no plan".to_string()
            };
            out.push(format!("{} {}  {}  [{}]", marker, goal.id, goal.name, status));
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy_fixtures::strategy;
    use crate::domain::{RequestedChanges, convert_strategy};
    use chrono::NaiveDate;

    fn plain() {
        colored::control::set_override(false);
    }

    fn goal() -> Goal {
        let today = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let payload = crate::domain::GoalFormPayload::new(
            "Chemistry",
            "Get an A",
            NaiveDate::from_ymd_opt(2025, 10, 20).unwrap(),
            2.0,
            5,
            vec![],
            today,
        );
        let mut goal = Goal::from_payload(&payload, today);
        goal.plan = convert_strategy(&strategy(&[5, 7]), today);
        goal
    }

    #[test]
    fn test_timeline_shows_progress_and_steps() {
        plain();
        let text = timeline(&goal());
        assert!(text.contains("Progress: 0%"));
        assert!(text.contains("[>] M1"));
        assert!(text.contains("[ ] M2"));
        assert!(text.contains("[*] GA"));
        assert!(text.contains("(by Sep 6)"));
    }

    #[test]
    fn test_proposal_card_lists_changes() {
        plain();
        let goal = goal();
        let proposal = PlanUpdateProposal::against(
            &goal.plan[0],
            "More time on bonding",
            RequestedChanges {
                duration_days: Some(8),
                ..Default::default()
            },
        );
        let text = proposal_card(&proposal);
        assert!(text.contains("milestone M1"));
        assert!(text.contains("Duration: 5 days -> 8 days"));
        assert!(text.contains("/accept"));
    }

    #[test]
    fn test_goal_list_marks_active() {
        plain();
        let goal = goal();
        let id = goal.id.clone();
        let subjects = vec![SubjectData {
            subject: "Chemistry".to_string(),
            goals: vec![goal],
        }];
        let text = goal_list(&subjects, Some(&id));
        assert!(text.contains(&format!("* {}", id)));
        assert!(goal_list(&[], None).starts_with("No goals yet"));
    }
}
