//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Five-phase narrated simulation, framed with sentinels
pub const SIMULATION: &str = include_str!("../../prompts/simulation.pmt");

/// Search-grounded strategy generation
pub const STRATEGY: &str = include_str!("../../prompts/strategy.pmt");

/// Review-time conversation over the proposed strategy
pub const REFINEMENT: &str = include_str!("../../prompts/refinement.pmt");

/// Teaching session system instruction
pub const TEACHING: &str = include_str!("../../prompts/teaching.pmt");

/// Official resource finder
pub const RESOURCES: &str = include_str!("../../prompts/resources.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "simulation" => Some(SIMULATION),
        "strategy" => Some(STRATEGY),
        "refinement" => Some(REFINEMENT),
        "teaching" => Some(TEACHING),
        "resources" => Some(RESOURCES),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
