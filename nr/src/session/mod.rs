//! Conversational sessions and the router between them
//!
//! - `chat`: one session's system prompt, tools and history
//! - `router`: teaching vs refinement, one at a time
//! - `tools`: the teaching session's function declarations

mod chat;
mod router;
mod tools;

pub use chat::{ChatSession, Checkpoint};
pub use router::{ConversationRouter, Route};
pub use tools::{MARK_COMPLETE, PROPOSE_UPDATE, SCHEDULE_REVIEW, TeachingTool, ToolError, teaching_tools};
