//! Neura - neuroscience-backed AI tutor
//!
//! A student describes a goal; a simulated five-phase planning process streams
//! its reasoning while a strategy is generated, the student reviews and refines
//! it, and a teaching chat then walks the confirmed milestone plan, adapting it
//! through tool calls.
//!
//! # Modules
//!
//! - [`domain`] - Goals, strategies, milestones, simulation phases, chat messages
//! - [`llm`] - LLM client trait and Gemini implementation
//! - [`prompts`] - Handlebars prompt templates
//! - [`simulation`] - Stage framing and strategy formulation
//! - [`state`] - Single-owner application state and its persistence mirror
//! - [`session`] - Chat sessions, teaching tools and the conversation router
//! - [`tutor`] - The controller sequencing all of the above
//! - [`repl`] - Terminal front end
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod llm;
pub mod prompts;
pub mod repl;
pub mod session;
pub mod simulation;
pub mod state;
pub mod tutor;

// Re-export commonly used types
pub use config::{Config, LlmConfig, TutorConfig};
pub use domain::{
    ChatMessageData, Goal, GoalFormPayload, Milestone, MilestoneState, PlanUpdateProposal, SimulationPhase,
    SimulationStageData, StrategyResponse, StrategyState, convert_strategy,
};
pub use llm::{CompletionRequest, CompletionResponse, GeminiClient, LlmClient, LlmError, StreamChunk, create_client};
pub use prompts::PromptLoader;
pub use session::{ChatSession, ConversationRouter, Route};
pub use simulation::{Orchestrator, PlanDraft, StageFramer};
pub use state::{Action, AppState, StateError, StateEvent, StateManager, Store};
pub use tutor::{GoalOutcome, ResourceFinder, SendMode, SendOutcome, Tutor};
