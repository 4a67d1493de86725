//! State management with actor pattern
//!
//! `AppState` is a pure transition table; `StateManager` owns it together with
//! the JSON `Store` and processes actions via channels.

mod app;
mod manager;
mod messages;
mod store;

pub use app::{Action, AppState, Applied, Dirty, PlanReview, StateEvent, Transition};
pub use manager::StateManager;
pub use messages::{StateCommand, StateError, StateResponse};
pub use store::{ACTIVE_GOAL_KEY, DATA_KEY, PROFILE_KEY, Snapshot, Store, StoreError, USER_KEY};
