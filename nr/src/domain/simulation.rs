//! Simulation phases, their typed artifacts and the accumulated strategy state
//!
//! Each phase arrives as one JSON object framed by sentinels in the model's
//! narration stream. The `artifacts` object has a different shape per phase,
//! so it is decoded into a variant keyed by `phase`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a framed phase body was dropped
#[derive(Debug, Error)]
pub enum StageParseError {
    #[error("Unknown simulation phase '{0}'")]
    UnknownPhase(String),

    #[error("Malformed phase body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The five fixed phases, in the order the model narrates them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationPhase {
    ContextVerification,
    DiagnosticAnalysis,
    StrategicDesign,
    FeasibilityForecasting,
    StrategicSynthesis,
}

impl SimulationPhase {
    pub const ALL: [SimulationPhase; 5] = [
        Self::ContextVerification,
        Self::DiagnosticAnalysis,
        Self::StrategicDesign,
        Self::FeasibilityForecasting,
        Self::StrategicSynthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContextVerification => "context_verification",
            Self::DiagnosticAnalysis => "diagnostic_analysis",
            Self::StrategicDesign => "strategic_design",
            Self::FeasibilityForecasting => "feasibility_forecasting",
            Self::StrategicSynthesis => "strategic_synthesis",
        }
    }

    /// Key of the placeholder timeline slot this phase drives
    pub fn slot_key(&self) -> &'static str {
        match self {
            Self::ContextVerification => "S1",
            Self::DiagnosticAnalysis => "S2",
            Self::StrategicDesign => "S3",
            Self::FeasibilityForecasting => "S4",
            Self::StrategicSynthesis => "S5",
        }
    }

    pub fn slot_title(&self) -> &'static str {
        match self {
            Self::ContextVerification => "Verifying",
            Self::DiagnosticAnalysis => "Analyzing",
            Self::StrategicDesign => "Designing",
            Self::FeasibilityForecasting => "Forecasting",
            Self::StrategicSynthesis => "Synthesizing",
        }
    }
}

impl std::fmt::Display for SimulationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SimulationPhase {
    type Err = StageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| StageParseError::UnknownPhase(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextVerificationArtifacts {
    pub missing_info: Vec<String>,
    pub invalid_entries: Vec<String>,
    pub verified_sources: u32,
    pub risk_flag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticArtifacts {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub opportunities: Vec<String>,
    pub threats: Vec<String>,
    pub risk_level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignArtifacts {
    pub milestones: u32,
    pub methods: Vec<String>,
    pub time_distribution: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastArtifacts {
    pub estimated_total_hours: f64,
    pub available_hours: f64,
    pub risk_level: String,
    pub kpis: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisArtifacts {
    pub plan_ready: bool,
    pub milestone_count: u32,
    pub kpi_set: Vec<String>,
}

/// Phase-specific structured output
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseArtifacts {
    ContextVerification(ContextVerificationArtifacts),
    DiagnosticAnalysis(DiagnosticArtifacts),
    StrategicDesign(DesignArtifacts),
    FeasibilityForecasting(ForecastArtifacts),
    StrategicSynthesis(SynthesisArtifacts),
}

impl PhaseArtifacts {
    pub fn phase(&self) -> SimulationPhase {
        match self {
            Self::ContextVerification(_) => SimulationPhase::ContextVerification,
            Self::DiagnosticAnalysis(_) => SimulationPhase::DiagnosticAnalysis,
            Self::StrategicDesign(_) => SimulationPhase::StrategicDesign,
            Self::FeasibilityForecasting(_) => SimulationPhase::FeasibilityForecasting,
            Self::StrategicSynthesis(_) => SimulationPhase::StrategicSynthesis,
        }
    }

    /// Decode `value` as the artifacts for `phase`
    ///
    /// A missing or malformed object yields the phase's empty artifacts; the
    /// narration is still worth showing.
    fn decode(phase: SimulationPhase, value: Value) -> Self {
        fn typed<T: serde::de::DeserializeOwned + Default>(phase: SimulationPhase, value: Value) -> T {
            if value.is_null() {
                return T::default();
            }
            serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(%phase, error = %e, "Malformed phase artifacts, using defaults");
                T::default()
            })
        }

        match phase {
            SimulationPhase::ContextVerification => Self::ContextVerification(typed(phase, value)),
            SimulationPhase::DiagnosticAnalysis => Self::DiagnosticAnalysis(typed(phase, value)),
            SimulationPhase::StrategicDesign => Self::StrategicDesign(typed(phase, value)),
            SimulationPhase::FeasibilityForecasting => Self::FeasibilityForecasting(typed(phase, value)),
            SimulationPhase::StrategicSynthesis => Self::StrategicSynthesis(typed(phase, value)),
        }
    }

    fn encode(&self) -> Value {
        let encoded = match self {
            Self::ContextVerification(a) => serde_json::to_value(a),
            Self::DiagnosticAnalysis(a) => serde_json::to_value(a),
            Self::StrategicDesign(a) => serde_json::to_value(a),
            Self::FeasibilityForecasting(a) => serde_json::to_value(a),
            Self::StrategicSynthesis(a) => serde_json::to_value(a),
        };
        encoded.unwrap_or(Value::Null)
    }
}

/// Wire form of one phase
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawStage {
    phase: String,
    status: String,
    narration: String,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    artifacts: Value,
}

/// One parsed simulation phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStage", into = "RawStage")]
pub struct SimulationStageData {
    pub status: String,
    pub narration: String,
    pub evidence: Vec<String>,
    pub artifacts: PhaseArtifacts,
}

impl SimulationStageData {
    /// Parse the text found between a pair of sentinels
    pub fn parse(body: &str) -> Result<Self, StageParseError> {
        debug!(len = body.len(), "SimulationStageData::parse: called");
        let raw: RawStage = serde_json::from_str(body.trim())?;
        Self::try_from(raw)
    }

    pub fn phase(&self) -> SimulationPhase {
        self.artifacts.phase()
    }

    /// One-line progress subtitle derived from the artifacts
    pub fn subtitle(&self) -> String {
        match &self.artifacts {
            PhaseArtifacts::ContextVerification(a) => {
                let n = a.verified_sources;
                format!("{} source{} verified...", n, if n == 1 { "" } else { "s" })
            }
            PhaseArtifacts::DiagnosticAnalysis(a) => match a.weaknesses.first() {
                Some(w) => format!("Accounting for constraints like \"{}\"...", w),
                None => "Identifying strengths and weaknesses...".to_string(),
            },
            PhaseArtifacts::StrategicDesign(a) => match a.methods.first() {
                Some(m) => format!("Integrating methods like \"{}\"...", m),
                None => "Structuring milestones...".to_string(),
            },
            PhaseArtifacts::FeasibilityForecasting(a) if !a.risk_level.is_empty() => {
                format!("Forecasting a {} risk level...", a.risk_level)
            }
            PhaseArtifacts::FeasibilityForecasting(_) => "Calculating feasibility...".to_string(),
            PhaseArtifacts::StrategicSynthesis(a) if a.milestone_count > 0 => {
                format!("Finalizing {} milestones...", a.milestone_count)
            }
            PhaseArtifacts::StrategicSynthesis(_) => "Synthesizing plan...".to_string(),
        }
    }
}

impl TryFrom<RawStage> for SimulationStageData {
    type Error = StageParseError;

    fn try_from(raw: RawStage) -> Result<Self, Self::Error> {
        let phase: SimulationPhase = raw.phase.parse()?;
        Ok(Self {
            status: raw.status,
            narration: raw.narration,
            evidence: raw.evidence,
            artifacts: PhaseArtifacts::decode(phase, raw.artifacts),
        })
    }
}

impl From<SimulationStageData> for RawStage {
    fn from(stage: SimulationStageData) -> Self {
        Self {
            phase: stage.phase().as_str().to_string(),
            artifacts: stage.artifacts.encode(),
            status: stage.status,
            narration: stage.narration,
            evidence: stage.evidence,
        }
    }
}

/// Aggregate view of a running (or finished) simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyState {
    pub current_title: String,
    pub current_status: String,
    pub stages: Vec<SimulationStageData>,
    #[serde(default)]
    pub show_details: bool,
}

impl Default for StrategyState {
    fn default() -> Self {
        Self {
            current_title: "Formulating Strategy...".to_string(),
            current_status: "Initiating simulation...".to_string(),
            stages: Vec::new(),
            show_details: false,
        }
    }
}

impl StrategyState {
    pub fn push(&mut self, stage: SimulationStageData) {
        debug!(phase = %stage.phase(), "StrategyState::push: called");
        self.current_status = stage.status.clone();
        self.stages.push(stage);
    }

    pub fn latest(&self) -> Option<&SimulationStageData> {
        self.stages.last()
    }

    pub fn subtitle(&self) -> String {
        self.latest()
            .map(|s| s.subtitle())
            .unwrap_or_else(|| "Initializing...".to_string())
    }

    /// Percent complete, held below 100 until the plan is delivered
    pub fn progress(&self) -> f64 {
        let total = SimulationPhase::ALL.len() as f64;
        (self.stages.len() as f64 / total * 100.0).min(98.0)
    }

    /// Title the state for the delivered strategy card
    pub fn into_review(mut self) -> Self {
        self.current_title = "Your Strategic Pathway".to_string();
        self.current_status = "Ready for review".to_string();
        self
    }
}
