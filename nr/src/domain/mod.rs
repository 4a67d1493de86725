//! Domain types for Neura
//!
//! Intake forms, strategies, simulation phases, milestones, goals and chat
//! messages. Everything here is plain data plus pure transitions; the state
//! owner and the tutor controller sequence them.

mod chat;
mod goal;
mod id;
mod intake;
mod milestone;
mod profile;
mod proposal;
mod simulation;
mod strategy;

pub use chat::{ChatMessageData, MessageKind, Transcript};
pub use goal::{
    DEV_USER_EMAIL, Goal, GoalResource, ScheduledReview, SubjectData, Subscription, User, find_goal, find_goal_mut,
    insert_goal, total_goals,
};
pub use id::{generate_id, message_id};
pub use intake::{
    AiFoundResource, Authority, ClassifiedResource, Feasibility, FeasibilityHint, FileType, GoalFormPayload,
    ResourceMetadata, SourceType, Suggestion, days_until, merge_found_resources,
};
pub use milestone::{
    Completion, GOAL_KEY, Milestone, MilestoneState, PlanStep, apply_proposal, convert_strategy, mark_complete,
    progress_percent, simulation_placeholders,
};
pub use profile::{Stage, UserProfile};
pub use proposal::{Change, PlanUpdateProposal, ProposalChanges, RequestedChanges};
pub use simulation::{
    ContextVerificationArtifacts, DesignArtifacts, DiagnosticArtifacts, ForecastArtifacts, PhaseArtifacts,
    SimulationPhase, SimulationStageData, StageParseError, StrategyState, SynthesisArtifacts,
};
pub use strategy::{
    FeasibilityAssessment, PlanMilestone, Risk, ScientificBasis, StrategyError, StrategyOverview, StrategyResponse,
    whole_days,
};

#[cfg(test)]
pub(crate) use simulation::fixtures as stage_fixtures;
#[cfg(test)]
pub(crate) use strategy::fixtures as strategy_fixtures;
