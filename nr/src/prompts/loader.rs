//! Prompt Loader
//!
//! Loads prompt templates from files or falls back to embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

use super::embedded;
use crate::domain::{GoalFormPayload, Milestone, StrategyResponse, UserProfile};

/// The prompt templates Neura renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Simulation,
    Strategy,
    Refinement,
    Teaching,
    Resources,
}

impl Template {
    /// File stem of this template (`{name}.pmt`)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simulation => "simulation",
            Self::Strategy => "strategy",
            Self::Refinement => "refinement",
            Self::Teaching => "teaching",
            Self::Resources => "resources",
        }
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Inputs shared by the simulation and strategy prompts
#[derive(Debug, Clone, Serialize)]
pub struct PlanningContext {
    pub profile_json: String,
    pub payload_json: String,
}

impl PlanningContext {
    pub fn new(payload: &GoalFormPayload, profile: &UserProfile) -> Result<Self> {
        debug!("PlanningContext::new: called");
        Ok(Self {
            profile_json: serde_json::to_string_pretty(profile)?,
            payload_json: serde_json::to_string_pretty(payload)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefinementContext {
    pub strategy_json: String,
}

impl RefinementContext {
    pub fn new(strategy: &StrategyResponse) -> Result<Self> {
        Ok(Self {
            strategy_json: serde_json::to_string_pretty(strategy)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TeachingContext {
    pub plan_json: String,
}

impl TeachingContext {
    pub fn new(plan: &[Milestone]) -> Result<Self> {
        Ok(Self {
            plan_json: serde_json::to_string_pretty(plan)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceContext {
    pub stage: String,
    pub stage_details_json: String,
    pub subject: String,
    pub goal: String,
}

impl ResourceContext {
    pub fn new(subject: &str, goal: &str, profile: &UserProfile) -> Result<Self> {
        Ok(Self {
            stage: profile.general.stage.to_string(),
            stage_details_json: serde_json::to_string(&profile.stage_details())?,
            subject: subject.to_string(),
            goal: goal.to_string(),
        })
    }
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `.neura/prompts/`)
    user_dir: Option<PathBuf>,
    /// Repo default directory (e.g., `prompts/`)
    repo_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a new prompt loader rooted at `root`
    ///
    /// # Arguments
    /// * `root` - Directory searched for `.neura/prompts/` and `prompts/`
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        debug!(?root, "PromptLoader::new: called");
        let user_dir = root.join(".neura/prompts");
        let repo_dir = root.join("prompts");

        let user_dir_exists = user_dir.exists();
        let repo_dir_exists = repo_dir.exists();
        debug!(
            ?user_dir,
            %user_dir_exists,
            ?repo_dir,
            %repo_dir_exists,
            "PromptLoader::new: checking directories"
        );

        Self {
            hbs: Self::engine(),
            user_dir: if user_dir_exists { Some(user_dir) } else { None },
            repo_dir: if repo_dir_exists { Some(repo_dir) } else { None },
        }
    }

    /// Create a loader that only uses embedded prompts (for testing)
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
            repo_dir: None,
        }
    }

    /// Prompts are plain text carrying JSON, so HTML escaping stays off
    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. User override: `.neura/prompts/{name}.pmt`
    /// 2. Repo default: `prompts/{name}.pmt`
    /// 3. Embedded fallback
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        for dir in [&self.user_dir, &self.repo_dir].into_iter().flatten() {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found on disk");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: found in embedded");
            return Ok(content.to_string());
        }

        debug!(%name, "PromptLoader::load_template: not found anywhere");
        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<C: Serialize>(&self, template: Template, context: &C) -> Result<String> {
        debug!(%template, "PromptLoader::render: called");
        let source = self.load_template(template.name())?;
        info!("Rendering template '{}'", template);
        self.hbs
            .render_template(&source, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template, e))
    }

    pub fn simulation(&self, context: &PlanningContext) -> Result<String> {
        self.render(Template::Simulation, context)
    }

    pub fn strategy(&self, context: &PlanningContext) -> Result<String> {
        self.render(Template::Strategy, context)
    }

    pub fn refinement(&self, strategy: &StrategyResponse) -> Result<String> {
        self.render(Template::Refinement, &RefinementContext::new(strategy)?)
    }

    pub fn teaching(&self, plan: &[Milestone]) -> Result<String> {
        self.render(Template::Teaching, &TeachingContext::new(plan)?)
    }

    pub fn resources(&self, context: &ResourceContext) -> Result<String> {
        self.render(Template::Resources, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy_fixtures;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn payload() -> GoalFormPayload {
        let today = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        GoalFormPayload::new(
            "Chemistry",
            "Get an A & a <distinction>",
            NaiveDate::from_ymd_opt(2025, 10, 20).unwrap(),
            1.5,
            5,
            vec![],
            today,
        )
    }

    #[test]
    fn test_planning_prompts_embed_inputs_unescaped() {
        let loader = PromptLoader::embedded_only();
        let ctx = PlanningContext::new(&payload(), &UserProfile::dev_default()).unwrap();

        let simulation = loader.simulation(&ctx).unwrap();
        assert!(simulation.contains("Get an A & a <distinction>"));
        assert!(simulation.contains("\"goal_text\""));
        assert!(!simulation.contains("&amp;"));

        let strategy = loader.strategy(&ctx).unwrap();
        assert!(strategy.contains("scientific_basis"));
        assert!(strategy.contains("Dev User"));
    }

    #[test]
    fn test_refinement_and_teaching_embed_json() {
        let loader = PromptLoader::embedded_only();
        let strategy = strategy_fixtures::strategy(&[4, 6]);
        let prompt = loader.refinement(&strategy).unwrap();
        assert!(prompt.contains("CURRENT PLAN:"));
        assert!(prompt.contains("\"M2\""));

        let plan = crate::domain::convert_strategy(&strategy, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap());
        let prompt = loader.teaching(&plan).unwrap();
        assert!(prompt.contains("\"state\": \"active\""));
    }

    #[test]
    fn test_resource_prompt_uses_stage_details() {
        let loader = PromptLoader::embedded_only();
        let ctx = ResourceContext::new("Chemistry", "Pass the exam", &UserProfile::dev_default()).unwrap();
        let prompt = loader.resources(&ctx).unwrap();
        assert!(prompt.contains("at the 'University' stage"));
        assert!(prompt.contains("AI Engineering"));
        assert!(prompt.contains("Subject: \"Chemistry\""));
    }

    #[test]
    fn test_user_override_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".neura/prompts")).unwrap();
        std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
        std::fs::write(dir.path().join(".neura/prompts/refinement.pmt"), "override {{strategy_json}}").unwrap();
        std::fs::write(dir.path().join("prompts/refinement.pmt"), "repo").unwrap();
        std::fs::write(dir.path().join("prompts/teaching.pmt"), "repo teaching").unwrap();

        let loader = PromptLoader::new(dir.path());
        let strategy = strategy_fixtures::strategy(&[1]);
        assert!(loader.refinement(&strategy).unwrap().starts_with("override {"));
        assert_eq!(loader.teaching(&[]).unwrap(), "repo teaching");
        assert!(loader.simulation(&PlanningContext::new(&payload(), &UserProfile::dev_default()).unwrap()).is_ok());
    }

    #[test]
    fn test_prompt_loader_unknown_template() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.load_template("nonexistent-template").is_err());
    }
}
