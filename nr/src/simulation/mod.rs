//! Strategy simulation pipeline
//!
//! - `framer`: sentinel-delimited stage framing over a text stream
//! - `orchestrator`: runs the narrated simulation and plan generation together

mod framer;
mod orchestrator;

pub use framer::{END, START, StageFramer};
pub use orchestrator::{Orchestrator, PlanDraft, failure_message};
