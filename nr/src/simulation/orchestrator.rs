//! Strategy formulation: narrated simulation alongside plan generation
//!
//! Both calls start together. The simulation stream is cosmetic; the
//! generation call produces the authoritative strategy. Neither is assumed to
//! finish first.

use std::collections::HashSet;
use std::sync::Arc;

use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::framer::StageFramer;
use crate::domain::{GoalFormPayload, SimulationStageData, StrategyResponse, StrategyState, UserProfile};
use crate::llm::{CompletionRequest, LlmClient, StreamChunk, WebSource};
use crate::prompts::{PlanningContext, PromptLoader};

const SIMULATION_FAILED: &str = "Failed to simulate the learning strategy.";
const GENERATION_FAILED: &str =
    "Failed to generate a learning plan. The model may be unable to provide a structured plan for this topic.";

/// A strategy awaiting the student's review
#[derive(Debug, Clone)]
pub struct PlanDraft {
    /// Accumulated narration, titled for review
    pub strategy_state: StrategyState,
    pub strategy: StrategyResponse,
    pub sources: Vec<WebSource>,
}

/// Assistant bubble text for a failed formulation
pub fn failure_message(error: &eyre::Report) -> String {
    format!(
        "I'm sorry, I ran into an issue while creating your plan.\n\n**Error:**\n`{:#}`\n\nPlease try creating the goal again with a clearer objective or check the console for more details.",
        error
    )
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    stream_buffer: usize,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, stream_buffer: usize) -> Self {
        debug!(%stream_buffer, "Orchestrator::new: called");
        Self {
            llm,
            prompts,
            stream_buffer: stream_buffer.max(1),
        }
    }

    /// Run simulation and generation concurrently
    ///
    /// Each phase is forwarded on `stage_tx` as it is framed. A failure of
    /// either call fails the whole run; no partial draft is returned.
    pub async fn formulate(
        &self,
        payload: &GoalFormPayload,
        profile: &UserProfile,
        stage_tx: mpsc::Sender<SimulationStageData>,
    ) -> Result<PlanDraft> {
        debug!(goal = %payload.goal_text, "Orchestrator::formulate: called");
        let context = PlanningContext::new(payload, profile)?;
        let simulation_prompt = self.prompts.simulation(&context)?;
        let strategy_prompt = self.prompts.strategy(&context)?;

        let (state, (strategy, sources)) =
            tokio::try_join!(self.simulate(simulation_prompt, stage_tx), self.generate(strategy_prompt))?;

        info!(
            stages = state.stages.len(),
            milestones = strategy.milestones.len(),
            sources = sources.len(),
            "Strategy formulated"
        );
        Ok(PlanDraft {
            strategy_state: state.into_review(),
            strategy,
            sources,
        })
    }

    async fn simulate(&self, prompt: String, stage_tx: mpsc::Sender<SimulationStageData>) -> Result<StrategyState> {
        debug!("Orchestrator::simulate: called");
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<StreamChunk>(self.stream_buffer);

        let forward_task = tokio::spawn(async move {
            let mut framer = StageFramer::new();
            let mut state = StrategyState::default();
            let mut seen = HashSet::new();
            while let Some(chunk) = chunk_rx.recv().await {
                match chunk {
                    StreamChunk::TextDelta(text) => {
                        for stage in framer.push(&text) {
                            if !seen.insert(stage.phase()) {
                                warn!(phase = %stage.phase(), "Ignoring repeated simulation phase");
                                continue;
                            }
                            state.push(stage.clone());
                            if stage_tx.send(stage).await.is_err() {
                                debug!("Orchestrator::simulate: stage receiver dropped");
                            }
                        }
                    }
                    StreamChunk::Error(e) => warn!(error = %e, "Simulation stream reported an error"),
                    _ => {}
                }
            }
            framer.finish();
            state
        });

        let result = self.llm.stream(CompletionRequest::prompt(prompt), chunk_tx).await;
        let state = forward_task.await.wrap_err(SIMULATION_FAILED)?;
        result.wrap_err(SIMULATION_FAILED)?;
        Ok(state)
    }

    async fn generate(&self, prompt: String) -> Result<(StrategyResponse, Vec<WebSource>)> {
        debug!("Orchestrator::generate: called");
        let response = self
            .llm
            .complete(CompletionRequest::prompt(prompt).with_search())
            .await
            .wrap_err(GENERATION_FAILED)?;
        let strategy = StrategyResponse::parse(response.text()).wrap_err(GENERATION_FAILED)?;
        Ok((strategy, response.sources))
    }
}
