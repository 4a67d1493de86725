//! Which conversation receives the student's input

use tracing::debug;

use super::chat::ChatSession;

/// Exactly one session, or none, is routable at a time
#[derive(Default)]
pub enum ConversationRouter {
    #[default]
    Idle,
    /// Confirmed plan; tools enabled
    Teaching(ChatSession),
    /// Strategy pending review; no tools
    Refinement(ChatSession),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Idle,
    Teaching,
    Refinement,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Teaching => "teaching",
            Self::Refinement => "refinement",
        };
        write!(f, "{}", name)
    }
}

impl ConversationRouter {
    pub fn route(&self) -> Route {
        match self {
            Self::Idle => Route::Idle,
            Self::Teaching(_) => Route::Teaching,
            Self::Refinement(_) => Route::Refinement,
        }
    }

    pub fn goal_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Teaching(s) | Self::Refinement(s) => Some(s.goal_id()),
        }
    }

    pub fn open_teaching(&mut self, session: ChatSession) {
        debug!(goal_id = %session.goal_id(), "ConversationRouter::open_teaching: called");
        *self = Self::Teaching(session);
    }

    pub fn open_refinement(&mut self, session: ChatSession) {
        debug!(goal_id = %session.goal_id(), "ConversationRouter::open_refinement: called");
        *self = Self::Refinement(session);
    }

    pub fn teardown(&mut self) {
        debug!(route = %self.route(), "ConversationRouter::teardown: called");
        *self = Self::Idle;
    }

    /// The session for `goal_id` when it is in the expected route
    pub fn session_mut(&mut self, expected: Route, goal_id: &str) -> Option<&mut ChatSession> {
        match (self, expected) {
            (Self::Teaching(s), Route::Teaching) | (Self::Refinement(s), Route::Refinement) if s.goal_id() == goal_id => {
                Some(s)
            }
            _ => None,
        }
    }

    pub fn active_mut(&mut self) -> Option<&mut ChatSession> {
        match self {
            Self::Idle => None,
            Self::Teaching(s) | Self::Refinement(s) => Some(s),
        }
    }
}
