//! Application state and its transition table
//!
//! Every mutation is an `Action` applied by `AppState::apply`. Actions name
//! the goal (and often the message) they target; when that target is no longer
//! the active context the action is ignored, so late completions from an
//! abandoned goal cannot corrupt the current one.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{
    ChatMessageData, Completion, Goal, MilestoneState, PlanUpdateProposal, SimulationPhase,
    SimulationStageData, StrategyResponse, StrategyState, SubjectData, Transcript, User, UserProfile, apply_proposal,
    convert_strategy, find_goal, find_goal_mut, insert_goal, mark_complete,
};
use crate::llm::WebSource;
use crate::simulation::PlanDraft;

/// Where the active goal stands with respect to its plan
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PlanReview {
    /// No plan under review; the teaching chat owns the conversation
    #[default]
    Idle,
    /// Strategy formulation in flight
    Simulating { goal_id: String, state: StrategyState },
    /// A strategy awaits confirmation; the refinement chat owns the conversation
    Pending {
        goal_id: String,
        strategy: StrategyResponse,
        sources: Vec<WebSource>,
    },
}

impl PlanReview {
    pub fn goal_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Simulating { goal_id, .. } | Self::Pending { goal_id, .. } => Some(goal_id),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn simulation(&self) -> Option<&StrategyState> {
        match self {
            Self::Simulating { state, .. } => Some(state),
            _ => None,
        }
    }
}

/// One state transition
#[derive(Debug, Clone)]
pub enum Action {
    GoalCreated {
        subject: String,
        goal: Goal,
    },
    PhaseReceived {
        goal_id: String,
        stage: SimulationStageData,
    },
    PlanReady {
        goal_id: String,
        draft: PlanDraft,
    },
    FormulationFailed {
        goal_id: String,
        message: String,
    },
    /// Reply from the refinement chat, shown verbatim
    RefinementReplied {
        goal_id: String,
        message_id: String,
        text: String,
    },
    PlanConfirmed {
        today: NaiveDate,
    },
    GoalSelected {
        goal_id: String,
    },
    MessageAdded {
        goal_id: Option<String>,
        message: ChatMessageData,
    },
    TextAppended {
        goal_id: Option<String>,
        message_id: String,
        delta: String,
    },
    TextSet {
        goal_id: Option<String>,
        message_id: String,
        text: String,
    },
    MessageReplaced {
        goal_id: Option<String>,
        message_id: String,
        message: ChatMessageData,
    },
    MessageRemoved {
        goal_id: Option<String>,
        message_id: String,
    },
    MessageEdited {
        goal_id: Option<String>,
        message_id: String,
        text: String,
    },
    ProposalRaised {
        goal_id: String,
        message_id: String,
        proposal: PlanUpdateProposal,
    },
    ProposalResolved {
        accepted: bool,
    },
    MilestoneCompleted {
        goal_id: String,
        milestone_key: String,
    },
    ReviewScheduled {
        goal_id: String,
        milestone_key: String,
        delay_days: u32,
        today: NaiveDate,
    },
    ProfileUpdated(UserProfile),
    UserUpdated(User),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GoalCreated { .. } => "GoalCreated",
            Self::PhaseReceived { .. } => "PhaseReceived",
            Self::PlanReady { .. } => "PlanReady",
            Self::FormulationFailed { .. } => "FormulationFailed",
            Self::RefinementReplied { .. } => "RefinementReplied",
            Self::PlanConfirmed { .. } => "PlanConfirmed",
            Self::GoalSelected { .. } => "GoalSelected",
            Self::MessageAdded { .. } => "MessageAdded",
            Self::TextAppended { .. } => "TextAppended",
            Self::TextSet { .. } => "TextSet",
            Self::MessageReplaced { .. } => "MessageReplaced",
            Self::MessageRemoved { .. } => "MessageRemoved",
            Self::MessageEdited { .. } => "MessageEdited",
            Self::ProposalRaised { .. } => "ProposalRaised",
            Self::ProposalResolved { .. } => "ProposalResolved",
            Self::MilestoneCompleted { .. } => "MilestoneCompleted",
            Self::ReviewScheduled { .. } => "ReviewScheduled",
            Self::ProfileUpdated(_) => "ProfileUpdated",
            Self::UserUpdated(_) => "UserUpdated",
        }
    }
}

/// What an applied action produced
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Stale or inapplicable; nothing changed
    Ignored,
    Changed,
    MilestoneClosed(Completion),
    ReviewScheduled(NaiveDate),
    ProposalResolved(PlanUpdateProposal),
}

/// Notification for observers (the REPL renders from these)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StateEvent {
    TranscriptReset,
    MessageAdded { message: ChatMessageData },
    TextAppended { message_id: String, delta: String },
    MessageUpdated { message: ChatMessageData },
    MessageRemoved { message_id: String },
    PhaseReceived { goal_id: String, status: String, subtitle: String, progress: f64 },
    PlanChanged { goal_id: String },
    ReviewChanged { pending: bool },
    ProposalCleared,
}

/// Which persisted records a transition touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dirty {
    pub subjects: bool,
    pub profile: bool,
    pub user: bool,
    pub active_goal: bool,
}

impl Dirty {
    pub fn any(&self) -> bool {
        self.subjects || self.profile || self.user || self.active_goal
    }
}

/// Result of `AppState::apply`
#[derive(Debug, Clone)]
pub struct Transition {
    pub applied: Applied,
    pub events: Vec<StateEvent>,
    pub dirty: Dirty,
}

impl Transition {
    fn ignored() -> Self {
        Self {
            applied: Applied::Ignored,
            events: Vec::new(),
            dirty: Dirty::default(),
        }
    }

    fn changed(events: Vec<StateEvent>) -> Self {
        Self {
            applied: Applied::Changed,
            events,
            dirty: Dirty::default(),
        }
    }

    fn with(mut self, applied: Applied) -> Self {
        self.applied = applied;
        self
    }

    fn subjects(mut self) -> Self {
        self.dirty.subjects = true;
        self
    }

    fn active_goal(mut self) -> Self {
        self.dirty.active_goal = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub subjects: Vec<SubjectData>,
    pub profile: UserProfile,
    pub user: User,
    pub active_goal_id: Option<String>,
    pub transcript: Transcript,
    pub review: PlanReview,
    /// Proposal awaiting the student's decision; input is blocked meanwhile
    pub pending_update: Option<PlanUpdateProposal>,
}

impl AppState {
    pub fn new(subjects: Vec<SubjectData>, profile: UserProfile, user: User, active_goal_id: Option<String>) -> Self {
        let active_goal_id = active_goal_id.filter(|id| find_goal(&subjects, id).is_some());
        Self {
            subjects,
            profile,
            user,
            active_goal_id,
            ..Default::default()
        }
    }

    pub fn active_goal(&self) -> Option<&Goal> {
        let id = self.active_goal_id.as_deref()?;
        find_goal(&self.subjects, id).map(|(_, g)| g)
    }

    /// Subject and goal for the active goal
    pub fn active_entry(&self) -> Option<(&str, &Goal)> {
        let id = self.active_goal_id.as_deref()?;
        find_goal(&self.subjects, id)
    }

    fn is_active(&self, goal_id: &str) -> bool {
        self.active_goal_id.as_deref() == Some(goal_id)
    }

    /// `None` targets the transcript regardless of goal
    fn targets_active(&self, goal_id: &Option<String>) -> bool {
        match goal_id {
            Some(id) => self.is_active(id),
            None => true,
        }
    }

    pub fn apply(&mut self, action: Action) -> Transition {
        debug!(action = action.name(), "AppState::apply: called");
        match action {
            Action::GoalCreated { subject, goal } => {
                let goal_id = goal.id.clone();
                info!(%goal_id, %subject, "Goal created");
                insert_goal(&mut self.subjects, &subject, goal);
                self.active_goal_id = Some(goal_id.clone());
                self.transcript.clear();
                self.pending_update = None;
                self.review = PlanReview::Simulating {
                    goal_id: goal_id.clone(),
                    state: StrategyState::default(),
                };
                Transition::changed(vec![StateEvent::TranscriptReset, StateEvent::PlanChanged { goal_id }])
                    .subjects()
                    .active_goal()
            }

            Action::PhaseReceived { goal_id, stage } => self.phase_received(goal_id, stage),

            Action::PlanReady { goal_id, draft } => {
                let simulating = matches!(&self.review, PlanReview::Simulating { goal_id: g, .. } if *g == goal_id);
                // The placeholders go either way; a stale goal must not stay mid-simulation
                let cleared = self.clear_placeholders(&goal_id);
                if !simulating {
                    debug!(%goal_id, "AppState::apply: stale PlanReady ignored");
                    return Self::placeholder_cleanup(goal_id, cleared);
                }
                let card = ChatMessageData::strategy_card(draft.strategy_state, draft.strategy.clone(), draft.sources.clone());
                self.transcript.clear();
                self.transcript.push(card.clone());
                self.review = PlanReview::Pending {
                    goal_id: goal_id.clone(),
                    strategy: draft.strategy,
                    sources: draft.sources,
                };
                Transition::changed(vec![
                    StateEvent::TranscriptReset,
                    StateEvent::MessageAdded { message: card },
                    StateEvent::PlanChanged { goal_id },
                    StateEvent::ReviewChanged { pending: true },
                ])
                .subjects()
            }

            Action::FormulationFailed { goal_id, message } => {
                let simulating = matches!(&self.review, PlanReview::Simulating { goal_id: g, .. } if *g == goal_id);
                let cleared = self.clear_placeholders(&goal_id);
                if !simulating {
                    return Self::placeholder_cleanup(goal_id, cleared);
                }
                warn!(%goal_id, "Strategy formulation failed");
                self.review = PlanReview::Idle;
                let bubble = ChatMessageData::error(message);
                self.transcript.push(bubble.clone());
                Transition::changed(vec![
                    StateEvent::MessageAdded { message: bubble },
                    StateEvent::PlanChanged { goal_id },
                    StateEvent::ReviewChanged { pending: false },
                ])
                .subjects()
            }

            Action::RefinementReplied {
                goal_id,
                message_id,
                text,
            } => self.refinement_replied(goal_id, message_id, text),

            Action::PlanConfirmed { today } => {
                let PlanReview::Pending { goal_id, strategy, .. } = &self.review else {
                    return Transition::ignored();
                };
                if !self.is_active(goal_id) {
                    return Transition::ignored();
                }
                let goal_id = goal_id.clone();
                let plan = convert_strategy(strategy, today);
                let strategy = strategy.clone();
                let Some(goal) = find_goal_mut(&mut self.subjects, &goal_id) else {
                    return Transition::ignored();
                };
                info!(%goal_id, milestones = plan.len() - 1, "Plan confirmed");
                goal.plan = plan;
                goal.strategy = Some(strategy);
                self.review = PlanReview::Idle;
                self.transcript.retain_proposed_strategy();
                let mut events = vec![StateEvent::TranscriptReset];
                events.extend(
                    self.transcript
                        .messages()
                        .iter()
                        .cloned()
                        .map(|message| StateEvent::MessageAdded { message }),
                );
                events.push(StateEvent::PlanChanged { goal_id });
                events.push(StateEvent::ReviewChanged { pending: false });
                Transition::changed(events).subjects()
            }

            Action::GoalSelected { goal_id } => {
                if find_goal(&self.subjects, &goal_id).is_none() {
                    return Transition::ignored();
                }
                info!(%goal_id, "Goal selected");
                self.active_goal_id = Some(goal_id.clone());
                self.transcript.clear();
                self.review = PlanReview::Idle;
                self.pending_update = None;
                Transition::changed(vec![
                    StateEvent::TranscriptReset,
                    StateEvent::PlanChanged { goal_id },
                    StateEvent::ReviewChanged { pending: false },
                ])
                .active_goal()
            }

            Action::MessageAdded { goal_id, message } => {
                if !self.targets_active(&goal_id) {
                    return Transition::ignored();
                }
                self.transcript.push(message.clone());
                Transition::changed(vec![StateEvent::MessageAdded { message }])
            }

            Action::TextAppended {
                goal_id,
                message_id,
                delta,
            } => {
                if !self.targets_active(&goal_id) || !self.transcript.append_content(&message_id, &delta) {
                    return Transition::ignored();
                }
                Transition::changed(vec![StateEvent::TextAppended { message_id, delta }])
            }

            Action::TextSet {
                goal_id,
                message_id,
                text,
            } => {
                if !self.targets_active(&goal_id) || !self.transcript.set_content(&message_id, text) {
                    return Transition::ignored();
                }
                self.updated(&message_id)
            }

            Action::MessageReplaced {
                goal_id,
                message_id,
                message,
            } => {
                if !self.targets_active(&goal_id) || !self.transcript.replace(&message_id, message.clone()) {
                    return Transition::ignored();
                }
                Transition::changed(vec![
                    StateEvent::MessageRemoved { message_id },
                    StateEvent::MessageAdded { message },
                ])
            }

            Action::MessageRemoved { goal_id, message_id } => {
                if !self.targets_active(&goal_id) || !self.transcript.remove(&message_id) {
                    return Transition::ignored();
                }
                Transition::changed(vec![StateEvent::MessageRemoved { message_id }])
            }

            Action::MessageEdited {
                goal_id,
                message_id,
                text,
            } => {
                if !self.targets_active(&goal_id) || !self.transcript.edit_and_truncate(&message_id, text) {
                    return Transition::ignored();
                }
                self.pending_update = None;
                let mut events = vec![StateEvent::TranscriptReset];
                events.extend(
                    self.transcript
                        .messages()
                        .iter()
                        .cloned()
                        .map(|message| StateEvent::MessageAdded { message }),
                );
                Transition::changed(events)
            }

            Action::ProposalRaised {
                goal_id,
                message_id,
                proposal,
            } => {
                if !self.is_active(&goal_id) {
                    return Transition::ignored();
                }
                let card = ChatMessageData::proposal_card(proposal.clone());
                let streamed = self
                    .transcript
                    .get(&message_id)
                    .is_some_and(|m| !m.content.is_empty());
                let mut events = Vec::new();
                if streamed {
                    self.transcript.push(card.clone());
                } else if self.transcript.replace(&message_id, card.clone()) {
                    events.push(StateEvent::MessageRemoved { message_id });
                } else {
                    self.transcript.push(card.clone());
                }
                events.push(StateEvent::MessageAdded { message: card });
                self.pending_update = Some(proposal);
                Transition::changed(events)
            }

            Action::ProposalResolved { accepted } => {
                let Some(proposal) = self.pending_update.take() else {
                    debug!("AppState::apply: no proposal to resolve");
                    return Transition::ignored();
                };
                self.transcript.remove_proposals();
                let mut transition = Transition::changed(vec![StateEvent::ProposalCleared]);
                if accepted {
                    if let Some(goal_id) = self.active_goal_id.clone()
                        && let Some(goal) = find_goal_mut(&mut self.subjects, &goal_id)
                        && apply_proposal(&mut goal.plan, &proposal)
                    {
                        info!(%goal_id, key = %proposal.milestone_key, "Plan update applied");
                        transition.events.push(StateEvent::PlanChanged { goal_id });
                        transition = transition.subjects();
                    }
                } else {
                    info!(key = %proposal.milestone_key, "Plan update declined");
                }
                transition.with(Applied::ProposalResolved(proposal))
            }

            Action::MilestoneCompleted { goal_id, milestone_key } => {
                if !self.is_active(&goal_id) {
                    return Transition::ignored();
                }
                let Some(goal) = find_goal_mut(&mut self.subjects, &goal_id) else {
                    return Transition::ignored();
                };
                let completion = mark_complete(&mut goal.plan, &milestone_key);
                match completion {
                    Completion::Unknown => Transition::ignored().with(Applied::MilestoneClosed(completion)),
                    Completion::Completed { .. } => {
                        info!(%goal_id, %milestone_key, "Milestone completed");
                        Transition::changed(vec![StateEvent::PlanChanged { goal_id }])
                            .subjects()
                            .with(Applied::MilestoneClosed(completion))
                    }
                }
            }

            Action::ReviewScheduled {
                goal_id,
                milestone_key,
                delay_days,
                today,
            } => {
                if !self.is_active(&goal_id) {
                    return Transition::ignored();
                }
                let Some(goal) = find_goal_mut(&mut self.subjects, &goal_id) else {
                    return Transition::ignored();
                };
                if goal.milestone(&milestone_key).is_none() {
                    warn!(%milestone_key, "Review requested for unknown milestone");
                    return Transition::ignored();
                }
                let due = goal.schedule_review(&milestone_key, delay_days, today);
                Transition::changed(vec![StateEvent::PlanChanged { goal_id }])
                    .subjects()
                    .with(Applied::ReviewScheduled(due))
            }

            Action::ProfileUpdated(profile) => {
                self.profile = profile;
                let mut transition = Transition::changed(Vec::new());
                transition.dirty.profile = true;
                transition
            }

            Action::UserUpdated(user) => {
                self.user = user;
                let mut transition = Transition::changed(Vec::new());
                transition.dirty.user = true;
                transition
            }
        }
    }

    fn updated(&self, message_id: &str) -> Transition {
        match self.transcript.get(message_id) {
            Some(message) => Transition::changed(vec![StateEvent::MessageUpdated {
                message: message.clone(),
            }]),
            None => Transition::ignored(),
        }
    }

    fn phase_received(&mut self, goal_id: String, stage: SimulationStageData) -> Transition {
        let PlanReview::Simulating { goal_id: current, state } = &mut self.review else {
            return Transition::ignored();
        };
        if *current != goal_id {
            debug!(%goal_id, "AppState::phase_received: stale phase ignored");
            return Transition::ignored();
        }

        let phase = stage.phase();
        let seen: Vec<SimulationPhase> = state.stages.iter().map(|s| s.phase()).collect();
        state.push(stage);
        let status = state.current_status.clone();
        let subtitle = state.subtitle();
        let progress = state.progress();

        if let Some(goal) = find_goal_mut(&mut self.subjects, &goal_id) {
            for milestone in goal.plan.iter_mut() {
                if milestone.key == phase.slot_key() {
                    milestone.state = MilestoneState::Active;
                } else if seen.iter().any(|p| p.slot_key() == milestone.key) {
                    milestone.state = MilestoneState::Done;
                }
            }
        }

        Transition::changed(vec![StateEvent::PhaseReceived {
            goal_id,
            status,
            subtitle,
            progress,
        }])
        .subjects()
    }

    fn refinement_replied(&mut self, goal_id: String, message_id: String, text: String) -> Transition {
        let PlanReview::Pending { goal_id: current, .. } = &self.review else {
            return Transition::ignored();
        };
        if *current != goal_id || !self.transcript.set_content(&message_id, text) {
            return Transition::ignored();
        }
        self.updated(&message_id)
    }

    /// Drop simulation slots from a goal; true when there were any
    fn clear_placeholders(&mut self, goal_id: &str) -> bool {
        match find_goal_mut(&mut self.subjects, goal_id) {
            Some(goal) if goal.is_simulating() => {
                goal.plan.clear();
                true
            }
            _ => false,
        }
    }

    fn placeholder_cleanup(goal_id: String, cleared: bool) -> Transition {
        if cleared {
            Transition::changed(vec![StateEvent::PlanChanged { goal_id }]).subjects()
        } else {
            Transition::ignored()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stage_fixtures::stage_json;
    use crate::domain::strategy_fixtures;
    use crate::domain::{GoalFormPayload, RequestedChanges};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
    }

    fn new_goal() -> Goal {
        let payload = GoalFormPayload::new(
            "Chemistry",
            "Get an A",
            NaiveDate::from_ymd_opt(2025, 9, 11).unwrap(),
            2.0,
            5,
            vec![],
            today(),
        );
        Goal::from_payload(&payload, today())
    }

    fn stage(phase: SimulationPhase) -> SimulationStageData {
        SimulationStageData::parse(&stage_json(phase)).unwrap()
    }

    fn draft(days: &[u32]) -> PlanDraft {
        PlanDraft {
            strategy_state: StrategyState::default().into_review(),
            strategy: strategy_fixtures::strategy(days),
            sources: vec![],
        }
    }

    /// State with a goal whose strategy is pending review
    fn pending() -> (AppState, String) {
        let mut state = AppState::default();
        let goal = new_goal();
        let goal_id = goal.id.clone();
        state.apply(Action::GoalCreated {
            subject: "Chemistry".to_string(),
            goal,
        });
        state.apply(Action::PlanReady {
            goal_id: goal_id.clone(),
            draft: draft(&[5, 7]),
        });
        (state, goal_id)
    }

    /// State with a confirmed plan
    fn teaching() -> (AppState, String) {
        let (mut state, goal_id) = pending();
        state.apply(Action::PlanConfirmed { today: today() });
        (state, goal_id)
    }

    #[test]
    fn test_goal_created_starts_simulation() {
        let mut state = AppState::default();
        state.transcript.push(ChatMessageData::user("old chat"));
        let goal = new_goal();
        let goal_id = goal.id.clone();
        let transition = state.apply(Action::GoalCreated {
            subject: "Chemistry".to_string(),
            goal,
        });

        assert_eq!(transition.applied, Applied::Changed);
        assert!(transition.dirty.subjects && transition.dirty.active_goal);
        assert!(state.transcript.is_empty());
        assert_eq!(state.review.goal_id(), Some(goal_id.as_str()));
        assert!(state.review.simulation().is_some());
        assert!(state.active_goal().unwrap().is_simulating());
    }

    #[test]
    fn test_phases_drive_placeholder_slots() {
        let mut state = AppState::default();
        let goal = new_goal();
        let goal_id = goal.id.clone();
        state.apply(Action::GoalCreated {
            subject: "Chemistry".to_string(),
            goal,
        });

        state.apply(Action::PhaseReceived {
            goal_id: goal_id.clone(),
            stage: stage(SimulationPhase::ContextVerification),
        });
        let transition = state.apply(Action::PhaseReceived {
            goal_id: goal_id.clone(),
            stage: stage(SimulationPhase::DiagnosticAnalysis),
        });

        let plan = &state.active_goal().unwrap().plan;
        assert_eq!(plan[0].state, MilestoneState::Done);
        assert_eq!(plan[1].state, MilestoneState::Active);
        assert_eq!(plan[2].state, MilestoneState::Pending);

        let simulation = state.review.simulation().unwrap();
        assert_eq!(simulation.stages.len(), 2);
        assert_eq!(simulation.current_status, "Analyzing status");
        match &transition.events[0] {
            StateEvent::PhaseReceived { progress, subtitle, .. } => {
                assert_eq!(*progress, 40.0);
                assert!(subtitle.contains("short timeline"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_plan_ready_installs_pending_review() {
        let (state, goal_id) = pending();
        assert!(state.review.is_pending());
        assert!(state.active_goal().unwrap().plan.is_empty());
        assert_eq!(state.transcript.len(), 1);
        assert!(state.transcript.messages()[0].is_strategy());
        assert_eq!(state.review.goal_id(), Some(goal_id.as_str()));
        assert!(state.review.simulation().is_none());
    }

    #[test]
    fn test_formulation_failure_posts_one_error() {
        let mut state = AppState::default();
        let goal = new_goal();
        let goal_id = goal.id.clone();
        state.apply(Action::GoalCreated {
            subject: "Chemistry".to_string(),
            goal,
        });
        state.apply(Action::FormulationFailed {
            goal_id,
            message: "I'm sorry, I ran into an issue while creating your plan.".to_string(),
        });

        assert_eq!(state.review, PlanReview::Idle);
        assert_eq!(state.transcript.len(), 1);
        assert!(state.transcript.messages()[0].content.contains("issue while creating your plan"));
        assert!(state.active_goal().unwrap().plan.is_empty());
    }

    #[test]
    fn test_confirm_installs_plan_and_keeps_only_card() {
        let (mut state, goal_id) = pending();
        state.transcript.push(ChatMessageData::user("why is M1 so long?"));
        state.transcript.push(ChatMessageData::assistant("Because..."));

        let transition = state.apply(Action::PlanConfirmed { today: today() });
        assert_eq!(transition.applied, Applied::Changed);
        assert_eq!(state.review, PlanReview::Idle);
        assert!(state.transcript.is_fresh());

        let goal = find_goal(&state.subjects, &goal_id).unwrap().1;
        assert_eq!(goal.plan.len(), 3);
        assert!(goal.strategy.is_some());
        assert!(goal.has_plan());

        // A second confirmation has nothing to confirm
        assert_eq!(state.apply(Action::PlanConfirmed { today: today() }).applied, Applied::Ignored);
    }

    #[test]
    fn test_refinement_json_is_shown_verbatim() {
        let (mut state, goal_id) = pending();
        let original = match &state.review {
            PlanReview::Pending { strategy, .. } => strategy.clone(),
            other => panic!("unexpected review {:?}", other),
        };
        let placeholder = ChatMessageData::placeholder();
        let placeholder_id = placeholder.id.clone();
        state.transcript.push(ChatMessageData::user("make M2 shorter"));
        state.transcript.push(placeholder);

        let reply = strategy_fixtures::strategy_json(&[5, 3]);
        state.apply(Action::RefinementReplied {
            goal_id: goal_id.clone(),
            message_id: placeholder_id.clone(),
            text: reply.clone(),
        });
        assert_eq!(state.transcript.get(&placeholder_id).unwrap().content, reply);
        assert_eq!(state.transcript.messages().iter().filter(|m| m.is_strategy()).count(), 1);
        match &state.review {
            PlanReview::Pending { strategy, .. } => assert_eq!(*strategy, original),
            other => panic!("unexpected review {:?}", other),
        }

        state.apply(Action::PlanConfirmed { today: today() });
        let goal = find_goal(&state.subjects, &goal_id).unwrap().1;
        assert_eq!(goal.strategy.as_ref(), Some(&original));
        assert_eq!(goal.plan.len(), original.milestones.len() + 1);
        assert_eq!(state.transcript.len(), 1);
        assert!(state.transcript.messages()[0].is_strategy());
    }

    #[test]
    fn test_refinement_prose_fills_placeholder() {
        let (mut state, goal_id) = pending();
        let placeholder = ChatMessageData::placeholder();
        let placeholder_id = placeholder.id.clone();
        state.transcript.push(placeholder);

        state.apply(Action::RefinementReplied {
            goal_id,
            message_id: placeholder_id.clone(),
            text: "M1 is long because bonding is foundational.".to_string(),
        });
        assert!(state.transcript.get(&placeholder_id).unwrap().content.contains("foundational"));
        assert!(state.review.is_pending());
    }

    #[test]
    fn test_stale_actions_are_ignored() {
        let (mut state, old_goal) = pending();
        let other = new_goal();
        let other_id = other.id.clone();
        insert_goal(&mut state.subjects, "Physics", other);
        state.apply(Action::GoalSelected { goal_id: other_id });
        assert_eq!(state.review, PlanReview::Idle);

        let late = state.apply(Action::PhaseReceived {
            goal_id: old_goal.clone(),
            stage: stage(SimulationPhase::StrategicDesign),
        });
        assert_eq!(late.applied, Applied::Ignored);

        let late = state.apply(Action::TextAppended {
            goal_id: Some(old_goal.clone()),
            message_id: "assist-gone".to_string(),
            delta: "hello".to_string(),
        });
        assert_eq!(late.applied, Applied::Ignored);
        assert!(state.transcript.is_empty());

        let late = state.apply(Action::MilestoneCompleted {
            goal_id: old_goal,
            milestone_key: "M1".to_string(),
        });
        assert_eq!(late.applied, Applied::Ignored);
    }

    #[test]
    fn test_stale_plan_ready_clears_placeholders_only() {
        let mut state = AppState::default();
        let first = new_goal();
        let first_id = first.id.clone();
        state.apply(Action::GoalCreated {
            subject: "Chemistry".to_string(),
            goal: first,
        });
        let second = new_goal();
        let second_id = second.id.clone();
        insert_goal(&mut state.subjects, "Chemistry", second);
        state.apply(Action::GoalSelected {
            goal_id: second_id.clone(),
        });

        let transition = state.apply(Action::PlanReady {
            goal_id: first_id.clone(),
            draft: draft(&[3]),
        });
        assert!(transition.dirty.subjects);
        assert_eq!(state.review, PlanReview::Idle);
        assert!(state.transcript.is_empty());
        assert!(find_goal(&state.subjects, &first_id).unwrap().1.plan.is_empty());
        assert_eq!(state.active_goal_id.as_deref(), Some(second_id.as_str()));
    }

    #[test]
    fn test_accepting_proposal_changes_only_requested_fields() {
        let (mut state, goal_id) = teaching();
        let milestone = state.active_goal().unwrap().plan[0].clone();
        let proposal = PlanUpdateProposal::against(
            &milestone,
            "Bonding needs more time",
            RequestedChanges {
                duration_days: Some(9),
                ..Default::default()
            },
        );
        let placeholder = ChatMessageData::placeholder();
        let placeholder_id = placeholder.id.clone();
        state.transcript.push(placeholder);
        state.apply(Action::ProposalRaised {
            goal_id: goal_id.clone(),
            message_id: placeholder_id.clone(),
            proposal,
        });
        assert!(state.pending_update.is_some());
        assert!(state.transcript.get(&placeholder_id).is_none());
        assert!(state.transcript.messages().iter().any(|m| m.is_proposal()));

        let transition = state.apply(Action::ProposalResolved { accepted: true });
        assert!(matches!(transition.applied, Applied::ProposalResolved(_)));
        assert!(transition.dirty.subjects);

        let updated = &state.active_goal().unwrap().plan[0];
        assert_eq!(updated.duration_days, Some(9));
        assert_eq!(updated.focus, milestone.focus);
        assert_eq!(updated.methods, milestone.methods);
        assert_eq!(updated.assessment, milestone.assessment);
        assert_eq!(
            updated.steps.iter().map(|s| &s.text).collect::<Vec<_>>(),
            milestone.steps.iter().map(|s| &s.text).collect::<Vec<_>>()
        );
        assert!(state.pending_update.is_none());
        assert!(!state.transcript.messages().iter().any(|m| m.is_proposal()));
    }

    #[test]
    fn test_declining_twice_is_a_no_op() {
        let (mut state, goal_id) = teaching();
        let before = state.active_goal().unwrap().plan.clone();
        let proposal = PlanUpdateProposal::against(
            &before[1],
            "Try a different method",
            RequestedChanges {
                methods: Some(vec!["Peer teaching".to_string()]),
                ..Default::default()
            },
        );
        state.apply(Action::ProposalRaised {
            goal_id,
            message_id: "assist-missing".to_string(),
            proposal,
        });

        let first = state.apply(Action::ProposalResolved { accepted: false });
        assert!(matches!(first.applied, Applied::ProposalResolved(_)));
        let second = state.apply(Action::ProposalResolved { accepted: false });
        assert_eq!(second.applied, Applied::Ignored);
        assert_eq!(state.active_goal().unwrap().plan, before);
    }

    #[test]
    fn test_proposal_after_streamed_text_keeps_the_text() {
        let (mut state, goal_id) = teaching();
        let placeholder = ChatMessageData::assistant("You are moving fast! ");
        let placeholder_id = placeholder.id.clone();
        state.transcript.push(placeholder);
        let milestone = state.active_goal().unwrap().plan[0].clone();
        state.apply(Action::ProposalRaised {
            goal_id,
            message_id: placeholder_id.clone(),
            proposal: PlanUpdateProposal::against(&milestone, "Shorten M1", RequestedChanges::default()),
        });
        assert!(state.transcript.get(&placeholder_id).is_some());
        assert!(state.transcript.messages().last().unwrap().is_proposal());
    }

    #[test]
    fn test_milestone_completion_and_review() {
        let (mut state, goal_id) = teaching();
        let transition = state.apply(Action::MilestoneCompleted {
            goal_id: goal_id.clone(),
            milestone_key: "M1".to_string(),
        });
        assert_eq!(
            transition.applied,
            Applied::MilestoneClosed(Completion::Completed {
                next: Some("M2".to_string())
            })
        );

        let transition = state.apply(Action::MilestoneCompleted {
            goal_id: goal_id.clone(),
            milestone_key: "M9".to_string(),
        });
        assert_eq!(transition.applied, Applied::MilestoneClosed(Completion::Unknown));
        assert!(!transition.dirty.subjects);

        let transition = state.apply(Action::ReviewScheduled {
            goal_id: goal_id.clone(),
            milestone_key: "M1".to_string(),
            delay_days: 3,
            today: today(),
        });
        assert_eq!(
            transition.applied,
            Applied::ReviewScheduled(NaiveDate::from_ymd_opt(2025, 9, 4).unwrap())
        );
        assert_eq!(state.active_goal().unwrap().reviews.len(), 1);
    }

    #[test]
    fn test_edit_clears_pending_proposal() {
        let (mut state, goal_id) = teaching();
        let question = ChatMessageData::user("what is a mole?");
        let question_id = question.id.clone();
        state.transcript.push(question);
        state.transcript.push(ChatMessageData::assistant("A unit"));
        let milestone = state.active_goal().unwrap().plan[0].clone();
        state.apply(Action::ProposalRaised {
            goal_id: goal_id.clone(),
            message_id: "assist-none".to_string(),
            proposal: PlanUpdateProposal::against(&milestone, "r", RequestedChanges::default()),
        });

        let transition = state.apply(Action::MessageEdited {
            goal_id: Some(goal_id),
            message_id: question_id,
            text: "what is molarity?".to_string(),
        });
        assert_eq!(transition.applied, Applied::Changed);
        assert!(state.pending_update.is_none());
        assert_eq!(state.transcript.messages().last().unwrap().content, "what is molarity?");
    }

    #[test]
    fn test_new_drops_unknown_active_goal() {
        let state = AppState::new(vec![], UserProfile::default(), User::default(), Some("gone".to_string()));
        assert!(state.active_goal_id.is_none());
    }
}
