//! Tutor controller
//!
//! Drives goal creation, plan review and the teaching chat on top of the
//! `StateManager`. Every mutation goes through a state `Action`; the tutor
//! itself only owns the conversation router.

mod resources;

use std::sync::{Arc, LazyLock};

use chrono::{Local, NaiveDate};
use eyre::{Result, eyre};
use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::TutorConfig;
use crate::domain::{ChatMessageData, Completion, Goal, GoalFormPayload, MessageKind, PlanUpdateProposal, total_goals};
use crate::llm::{CompletionResponse, ContentBlock, LlmClient, StreamChunk, ToolCall};
use crate::prompts::PromptLoader;
use crate::session::{ChatSession, ConversationRouter, Route, TeachingTool, teaching_tools};
use crate::simulation::{Orchestrator, failure_message};
use crate::state::{Action, Applied, StateManager};

pub use resources::ResourceFinder;

/// Tool rounds allowed within one student turn
const MAX_TOOL_ROUNDS: usize = 8;

/// Automated opening turn of a teaching session
pub const OPENING_TURN: &str = "Let's begin.";

static CONFIRM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)confirm|let's start|begin|ok start").expect("valid regex"));

/// Whether a message sent during plan review confirms the plan
pub fn is_confirmation(text: &str) -> bool {
    CONFIRM_PATTERN.is_match(text)
}

/// How a turn was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Typed by the student; gets a user bubble
    Typed,
    /// Re-sent after an edit; the edited bubble already exists
    Edited,
    /// Generated by the tutor; no user bubble
    Automated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The model answered (or its error was shown in the reply bubble)
    Replied,
    /// The message confirmed the pending plan
    Confirmed,
    /// Input is blocked by a simulation or an undecided proposal
    Blocked,
    /// No session to route to; the reply bubble was withdrawn
    NoSession,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalOutcome {
    /// Strategy delivered and awaiting review
    Created { goal_id: String },
    /// Free tier quota reached; nothing was created
    UpgradeRequired,
    /// Formulation failed; the error is in the transcript
    Failed { goal_id: String, message: String },
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub struct Tutor {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    state: StateManager,
    orchestrator: Orchestrator,
    router: ConversationRouter,
    free_goal_limit: usize,
    stream_buffer: usize,
    clock: fn() -> NaiveDate,
}

impl Tutor {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, state: StateManager, config: &TutorConfig) -> Self {
        debug!(free_goal_limit = config.free_goal_limit, "Tutor::new: called");
        let stream_buffer = config.stream_buffer.max(1);
        Self {
            orchestrator: Orchestrator::new(llm.clone(), prompts.clone(), stream_buffer),
            llm,
            prompts,
            state,
            router: ConversationRouter::default(),
            free_goal_limit: config.free_goal_limit,
            stream_buffer,
            clock: today,
        }
    }

    /// Override the calendar used for deadlines and reviews
    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn route(&self) -> Route {
        self.router.route()
    }

    /// Open the teaching session for a previously selected goal
    pub async fn resume(&mut self) -> Result<()> {
        debug!("Tutor::resume: called");
        self.ensure_teaching_session().await
    }

    /// Create a goal and formulate its strategy
    pub async fn create_goal(&mut self, payload: &GoalFormPayload) -> Result<GoalOutcome> {
        debug!(subject = %payload.subject, goal = %payload.goal_text, "Tutor::create_goal: called");
        let snapshot = self.state.snapshot().await?;
        let owned = total_goals(&snapshot.subjects);
        if !snapshot.user.may_create_goal(owned, self.free_goal_limit) {
            info!(owned, "Goal quota reached; upgrade required");
            return Ok(GoalOutcome::UpgradeRequired);
        }

        let goal = Goal::from_payload(payload, (self.clock)());
        let goal_id = goal.id.clone();
        self.router.teardown();
        self.state
            .dispatch(Action::GoalCreated {
                subject: payload.subject.clone(),
                goal,
            })
            .await?;

        let (stage_tx, mut stage_rx) = mpsc::channel(self.stream_buffer);
        let state = self.state.clone();
        let forward_goal = goal_id.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(stage) = stage_rx.recv().await {
                let action = Action::PhaseReceived {
                    goal_id: forward_goal.clone(),
                    stage,
                };
                if let Err(e) = state.dispatch(action).await {
                    warn!(error = %e, "Failed to record simulation phase");
                    break;
                }
            }
        });

        let result = self.orchestrator.formulate(payload, &snapshot.profile, stage_tx).await;
        if let Err(e) = forwarder.await {
            warn!(error = %e, "Stage forwarder failed");
        }
        let result = result.and_then(|draft| Ok((self.prompts.refinement(&draft.strategy)?, draft)));

        match result {
            Ok((prompt, draft)) => {
                self.state
                    .dispatch(Action::PlanReady {
                        goal_id: goal_id.clone(),
                        draft,
                    })
                    .await?;
                let state = self.state.snapshot().await?;
                if state.review.is_pending() && state.review.goal_id() == Some(goal_id.as_str()) {
                    self.router.open_refinement(ChatSession::new(goal_id.clone(), prompt, Vec::new()));
                }
                Ok(GoalOutcome::Created { goal_id })
            }
            Err(e) => {
                warn!(%goal_id, error = %format!("{:#}", e), "Strategy formulation failed");
                let message = failure_message(&e);
                self.state
                    .dispatch(Action::FormulationFailed {
                        goal_id: goal_id.clone(),
                        message: message.clone(),
                    })
                    .await?;
                Ok(GoalOutcome::Failed { goal_id, message })
            }
        }
    }

    /// Route one student message
    pub async fn handle_send(&mut self, text: &str, mode: SendMode) -> Result<SendOutcome> {
        debug!(?mode, "Tutor::handle_send: called");
        let text = text.trim();
        if text.is_empty() {
            return Ok(SendOutcome::Empty);
        }

        let snapshot = self.state.snapshot().await?;
        if snapshot.review.simulation().is_some() || snapshot.pending_update.is_some() {
            debug!("Tutor::handle_send: input blocked");
            return Ok(SendOutcome::Blocked);
        }
        if snapshot.review.is_pending() && is_confirmation(text) {
            self.confirm().await?;
            return Ok(SendOutcome::Confirmed);
        }
        self.dispatch_turn(text, mode).await
    }

    /// Show the turn and send it to whichever session is routable
    async fn dispatch_turn(&mut self, text: &str, mode: SendMode) -> Result<SendOutcome> {
        let snapshot = self.state.snapshot().await?;
        let goal_id = snapshot.active_goal_id.clone();

        if mode == SendMode::Typed {
            self.state
                .dispatch(Action::MessageAdded {
                    goal_id: goal_id.clone(),
                    message: ChatMessageData::user(text),
                })
                .await?;
        }

        let placeholder = ChatMessageData::placeholder();
        let placeholder_id = placeholder.id.clone();
        self.state
            .dispatch(Action::MessageAdded {
                goal_id: goal_id.clone(),
                message: placeholder,
            })
            .await?;

        if let Some(prompt) = text.strip_prefix("/image ") {
            self.image_turn(goal_id, &placeholder_id, prompt).await?;
            return Ok(SendOutcome::Replied);
        }

        let route = if snapshot.review.is_pending() {
            Route::Refinement
        } else {
            Route::Teaching
        };
        let Some(goal_id) = goal_id.filter(|id| self.router.session_mut(route, id).is_some()) else {
            debug!(%route, "Tutor::dispatch_turn: no session");
            self.state
                .dispatch(Action::MessageRemoved {
                    goal_id: None,
                    message_id: placeholder_id,
                })
                .await?;
            return Ok(SendOutcome::NoSession);
        };

        match route {
            Route::Refinement => self.refine(&goal_id, &placeholder_id, text).await?,
            _ => self.teach(&goal_id, &placeholder_id, text).await?,
        }
        Ok(SendOutcome::Replied)
    }

    async fn image_turn(&mut self, goal_id: Option<String>, placeholder_id: &str, prompt: &str) -> Result<()> {
        debug!(%prompt, "Tutor::image_turn: called");
        let action = match self.llm.generate_image(prompt).await {
            Ok(image) => Action::MessageReplaced {
                goal_id,
                message_id: placeholder_id.to_string(),
                message: ChatMessageData::image(&image),
            },
            Err(e) => {
                warn!(error = %e, "Image generation failed");
                Action::TextSet {
                    goal_id,
                    message_id: placeholder_id.to_string(),
                    text: format!("Sorry, I was unable to generate an image. {}", e),
                }
            }
        };
        self.state.dispatch(action).await?;
        Ok(())
    }

    /// Non-streaming refinement turn; the reply is shown as it arrives
    async fn refine(&mut self, goal_id: &str, placeholder_id: &str, text: &str) -> Result<()> {
        debug!(%goal_id, "Tutor::refine: called");
        let session = self
            .router
            .session_mut(Route::Refinement, goal_id)
            .ok_or_else(|| eyre!("No refinement session for goal {}", goal_id))?;

        let action = match session.send(self.llm.as_ref(), text).await {
            Ok(response) => Action::RefinementReplied {
                goal_id: goal_id.to_string(),
                message_id: placeholder_id.to_string(),
                text: response.text().to_string(),
            },
            Err(e) => {
                warn!(error = %e, "Refinement turn failed");
                Action::TextSet {
                    goal_id: Some(goal_id.to_string()),
                    message_id: placeholder_id.to_string(),
                    text: format!("Sorry, I encountered an error. {}", e),
                }
            }
        };
        self.state.dispatch(action).await?;
        Ok(())
    }

    /// Streaming teaching turn, including any tool rounds it triggers
    async fn teach(&mut self, goal_id: &str, placeholder_id: &str, text: &str) -> Result<()> {
        debug!(%goal_id, "Tutor::teach: called");
        if let Err(e) = self.teaching_rounds(goal_id, placeholder_id, text).await {
            warn!(error = %format!("{:#}", e), "Teaching turn failed");
            self.state
                .dispatch(Action::TextSet {
                    goal_id: Some(goal_id.to_string()),
                    message_id: placeholder_id.to_string(),
                    text: format!("Sorry, I encountered an error. {}", e),
                })
                .await?;
        }

        // A turn that ended in tool calls alone leaves nothing to show
        let snapshot = self.state.snapshot().await?;
        let empty = snapshot
            .transcript
            .get(placeholder_id)
            .is_some_and(|m| m.content.is_empty() && matches!(m.kind, MessageKind::Text));
        if empty {
            self.state
                .dispatch(Action::MessageRemoved {
                    goal_id: Some(goal_id.to_string()),
                    message_id: placeholder_id.to_string(),
                })
                .await?;
        }
        Ok(())
    }

    async fn teaching_rounds(&mut self, goal_id: &str, placeholder_id: &str, text: &str) -> Result<()> {
        let today = (self.clock)();
        let Self {
            llm,
            prompts,
            state,
            router,
            stream_buffer,
            ..
        } = self;
        let session = router
            .session_mut(Route::Teaching, goal_id)
            .ok_or_else(|| eyre!("No teaching session for goal {}", goal_id))?;
        let checkpoint = session.checkpoint();
        session.push_user(text);

        let rounds = async {
            for round in 0..MAX_TOOL_ROUNDS {
                // The plan may have moved on since the last round
                let goal = state.goal(goal_id).await?;
                session.set_system_prompt(prompts.teaching(&goal.plan)?);

                let response =
                    stream_reply(llm.as_ref(), session, state, goal_id, placeholder_id, *stream_buffer).await?;
                session.record_assistant(&response);
                if response.tool_calls.is_empty() {
                    debug!(round, "Tutor::teaching_rounds: turn complete");
                    return Ok(());
                }

                let mut results = Vec::new();
                let mut proposal_call = None;
                for call in &response.tool_calls {
                    if proposal_call.is_some() && call.name == crate::session::PROPOSE_UPDATE {
                        results.push(ContentBlock::tool_result(
                            &call.id,
                            "Another plan update is already awaiting the student's decision.",
                            true,
                        ));
                        continue;
                    }
                    match run_tool(state, &goal, placeholder_id, call, today).await? {
                        ToolReply::Done(block) => results.push(block),
                        ToolReply::AwaitingDecision => proposal_call = Some(call.id.clone()),
                    }
                }

                if let Some(call_id) = proposal_call {
                    session.defer(results, call_id);
                    return Ok(());
                }
                session.push_tool_results(results);
            }

            warn!(%goal_id, "Tool round limit reached");
            Ok::<(), eyre::Report>(())
        }
        .await;

        // A failed turn is forgotten; the student can simply ask again
        if rounds.is_err() {
            session.rollback(checkpoint);
        }
        rounds
    }

    /// Confirm the pending plan and start teaching
    pub async fn confirm(&mut self) -> Result<bool> {
        debug!("Tutor::confirm: called");
        let applied = self
            .state
            .dispatch(Action::PlanConfirmed { today: (self.clock)() })
            .await?;
        if applied == Applied::Ignored {
            return Ok(false);
        }
        self.router.teardown();
        self.ensure_teaching_session().await?;
        Ok(true)
    }

    pub async fn accept_update(&mut self) -> Result<bool> {
        self.resolve_update(true).await
    }

    pub async fn decline_update(&mut self) -> Result<bool> {
        self.resolve_update(false).await
    }

    /// Apply or discard the pending proposal, then resume teaching
    ///
    /// Resolving with nothing pending is a no-op.
    async fn resolve_update(&mut self, accepted: bool) -> Result<bool> {
        debug!(%accepted, "Tutor::resolve_update: called");
        let Applied::ProposalResolved(proposal) = self.state.dispatch(Action::ProposalResolved { accepted }).await?
        else {
            return Ok(false);
        };

        if let Some(session) = self.router.active_mut() {
            session.settle_proposal(accepted);
        }
        let message = if accepted {
            proposal.accepted_message()
        } else {
            PlanUpdateProposal::declined_message().to_string()
        };
        self.dispatch_turn(&message, SendMode::Automated).await?;
        Ok(true)
    }

    /// Switch the active goal; both sessions are torn down
    pub async fn select_goal(&mut self, goal_id: &str) -> Result<bool> {
        debug!(%goal_id, "Tutor::select_goal: called");
        let applied = self
            .state
            .dispatch(Action::GoalSelected {
                goal_id: goal_id.to_string(),
            })
            .await?;
        if applied == Applied::Ignored {
            return Ok(false);
        }
        self.router.teardown();
        self.ensure_teaching_session().await?;
        Ok(true)
    }

    /// Replace a user message, drop what followed and ask again
    pub async fn edit_message(&mut self, message_id: &str, text: &str) -> Result<SendOutcome> {
        debug!(%message_id, "Tutor::edit_message: called");
        let text = text.trim();
        if text.is_empty() {
            return Ok(SendOutcome::Empty);
        }
        let snapshot = self.state.snapshot().await?;
        let applied = self
            .state
            .dispatch(Action::MessageEdited {
                goal_id: snapshot.active_goal_id.clone(),
                message_id: message_id.to_string(),
                text: text.to_string(),
            })
            .await?;
        if applied == Applied::Ignored {
            return Ok(SendOutcome::Empty);
        }

        let snapshot = self.state.snapshot().await?;
        let mut history = snapshot.transcript.to_history();
        // The edited turn is re-sent below
        history.pop();
        if let Some(session) = self.router.active_mut() {
            session.set_history(history);
        }
        self.handle_send(text, SendMode::Edited).await
    }

    /// Open the teaching session when a confirmed plan is active and none is pending
    async fn ensure_teaching_session(&mut self) -> Result<()> {
        let snapshot = self.state.snapshot().await?;
        let Some(goal) = snapshot.active_goal() else {
            return Ok(());
        };
        if !goal.has_plan() || snapshot.review.goal_id().is_some() {
            return Ok(());
        }
        if self.router.session_mut(Route::Teaching, &goal.id).is_some() {
            return Ok(());
        }

        let prompt = self.prompts.teaching(&goal.plan)?;
        let session =
            ChatSession::new(goal.id.clone(), prompt, snapshot.transcript.to_history()).with_tools(teaching_tools());
        info!(goal_id = %goal.id, "Teaching session opened");
        self.router.open_teaching(session);

        if snapshot.transcript.is_fresh() {
            self.dispatch_turn(OPENING_TURN, SendMode::Automated).await?;
        }
        Ok(())
    }
}

/// Stream one model reply into the placeholder bubble
async fn stream_reply(
    llm: &dyn LlmClient,
    session: &ChatSession,
    state: &StateManager,
    goal_id: &str,
    placeholder_id: &str,
    buffer: usize,
) -> Result<CompletionResponse> {
    let (chunk_tx, mut chunk_rx) = mpsc::channel::<StreamChunk>(buffer);
    let forward_state = state.clone();
    let goal_id = goal_id.to_string();
    let message_id = placeholder_id.to_string();
    let forward_task = tokio::spawn(async move {
        while let Some(chunk) = chunk_rx.recv().await {
            match chunk {
                StreamChunk::TextDelta(delta) => {
                    let action = Action::TextAppended {
                        goal_id: Some(goal_id.clone()),
                        message_id: message_id.clone(),
                        delta,
                    };
                    if let Err(e) = forward_state.dispatch(action).await {
                        warn!(error = %e, "Failed to append streamed text");
                    }
                }
                StreamChunk::ToolCall { name, .. } => debug!(%name, "stream_reply: tool call"),
                StreamChunk::Error(e) => warn!(error = %e, "Teaching stream reported an error"),
                StreamChunk::MessageDone { .. } => {}
            }
        }
    });

    let result = session.stream(llm, chunk_tx).await;
    if let Err(e) = forward_task.await {
        warn!(error = %e, "Stream forwarder failed");
    }
    Ok(result?)
}

enum ToolReply {
    Done(ContentBlock),
    /// A proposal card is up; the result waits for the student
    AwaitingDecision,
}

/// Execute one teaching tool call against the state
async fn run_tool(
    state: &StateManager,
    goal: &Goal,
    placeholder_id: &str,
    call: &ToolCall,
    today: NaiveDate,
) -> Result<ToolReply> {
    debug!(name = %call.name, "run_tool: called");
    let unknown =
        |key: &str| ContentBlock::tool_result(&call.id, format!("No milestone with key {} exists in the plan.", key), true);

    let tool = match TeachingTool::from_call(call) {
        Ok(tool) => tool,
        Err(e) => {
            warn!(error = %e, "Rejected tool call");
            return Ok(ToolReply::Done(ContentBlock::tool_result(&call.id, e.to_string(), true)));
        }
    };

    let reply = match tool {
        TeachingTool::MarkComplete { milestone_key } => {
            let applied = state
                .dispatch(Action::MilestoneCompleted {
                    goal_id: goal.id.clone(),
                    milestone_key: milestone_key.clone(),
                })
                .await?;
            match applied {
                Applied::MilestoneClosed(Completion::Completed { next: Some(next) }) => ContentBlock::tool_result(
                    &call.id,
                    format!(
                        "Milestone {} marked as complete. The next active milestone is {}.",
                        milestone_key, next
                    ),
                    false,
                ),
                Applied::MilestoneClosed(Completion::Completed { next: None }) => ContentBlock::tool_result(
                    &call.id,
                    format!("Milestone {} marked as complete. Every milestone is now done.", milestone_key),
                    false,
                ),
                _ => unknown(&milestone_key),
            }
        }
        TeachingTool::ScheduleReview {
            milestone_key,
            delay_days,
        } => {
            let applied = state
                .dispatch(Action::ReviewScheduled {
                    goal_id: goal.id.clone(),
                    milestone_key: milestone_key.clone(),
                    delay_days,
                    today,
                })
                .await?;
            match applied {
                Applied::ReviewScheduled(due) => ContentBlock::tool_result(
                    &call.id,
                    format!("Review of milestone {} scheduled for {}.", milestone_key, due),
                    false,
                ),
                _ => unknown(&milestone_key),
            }
        }
        TeachingTool::ProposeUpdate {
            milestone_key,
            reasoning,
            requested,
        } => {
            let Some(milestone) = goal.milestone(&milestone_key) else {
                return Ok(ToolReply::Done(unknown(&milestone_key)));
            };
            let proposal = PlanUpdateProposal::against(milestone, reasoning, requested);
            let applied = state
                .dispatch(Action::ProposalRaised {
                    goal_id: goal.id.clone(),
                    message_id: placeholder_id.to_string(),
                    proposal,
                })
                .await?;
            if applied == Applied::Ignored {
                return Ok(ToolReply::Done(ContentBlock::tool_result(
                    &call.id,
                    "The goal is no longer active.",
                    true,
                )));
            }
            info!(key = %milestone_key, "Plan update proposed");
            return Ok(ToolReply::AwaitingDecision);
        }
    };
    Ok(ToolReply::Done(reply))
}
