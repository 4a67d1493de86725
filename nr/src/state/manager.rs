//! StateManager - actor that owns the application state
//!
//! Processes commands via channels so the tutor, the stage forwarder and the
//! REPL can share one state without locks. Every applied transition persists
//! the records it touched and broadcasts its events.

use std::path::Path;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::domain::{Goal, find_goal};

use super::app::{Action, AppState, Applied, Dirty, StateEvent};
use super::messages::{StateCommand, StateError, StateResponse};
use super::store::Store;

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
    /// Broadcast sender for state change notifications
    event_tx: broadcast::Sender<StateEvent>,
}

impl StateManager {
    /// Spawn a new StateManager actor over the store at `data_dir`
    pub fn spawn(data_dir: impl AsRef<Path>) -> StateResponse<Self> {
        debug!(data_dir = %data_dir.as_ref().display(), "spawn: called");
        let store = Store::open(data_dir)?;
        let snapshot = store.load()?;
        let state = AppState::new(
            snapshot.subjects,
            snapshot.profile,
            snapshot.user,
            snapshot.active_goal_id,
        );

        let (tx, rx) = mpsc::channel(256);

        // Broadcast channel for state change notifications (REPL subscribes)
        let (event_tx, _) = broadcast::channel(256);

        tokio::spawn(actor_loop(state, store, rx, event_tx.clone()));

        info!("StateManager spawned");

        Ok(Self { tx, event_tx })
    }

    /// Subscribe to state change events
    pub fn subscribe_events(&self) -> broadcast::Receiver<StateEvent> {
        self.event_tx.subscribe()
    }

    /// Apply an action and wait for its outcome
    pub async fn dispatch(&self, action: Action) -> StateResponse<Applied> {
        debug!(action = action.name(), "dispatch: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Dispatch { action, reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> StateResponse<AppState> {
        debug!("snapshot: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)
    }

    /// Look up a goal by id
    pub async fn goal(&self, id: &str) -> StateResponse<Goal> {
        debug!(%id, "goal: called");
        let state = self.snapshot().await?;
        find_goal(&state.subjects, id)
            .map(|(_, g)| g.clone())
            .ok_or_else(|| StateError::NotFound(id.to_string()))
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> Result<(), StateError> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

/// Write the records a transition touched; failures are logged, never fatal
fn persist(store: &Store, state: &AppState, dirty: Dirty) {
    if dirty.subjects
        && let Err(e) = store.save_subjects(&state.subjects)
    {
        warn!(error = %e, "Failed to persist subjects");
    }
    if dirty.profile
        && let Err(e) = store.save_profile(&state.profile)
    {
        warn!(error = %e, "Failed to persist profile");
    }
    if dirty.user
        && let Err(e) = store.save_user(&state.user)
    {
        warn!(error = %e, "Failed to persist user");
    }
    if dirty.active_goal
        && let Err(e) = store.save_active_goal(state.active_goal_id.as_deref())
    {
        warn!(error = %e, "Failed to persist active goal");
    }
}

async fn actor_loop(
    mut state: AppState,
    store: Store,
    mut rx: mpsc::Receiver<StateCommand>,
    event_tx: broadcast::Sender<StateEvent>,
) {
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::Dispatch { action, reply } => {
                let name = action.name();
                let transition = state.apply(action);
                debug!(action = name, applied = ?transition.applied, "actor_loop: Dispatch command");
                if transition.dirty.any() {
                    persist(&store, &state, transition.dirty);
                }
                for event in transition.events {
                    // No subscribers is fine
                    let _ = event_tx.send(event);
                }
                let _ = reply.send(Ok(transition.applied));
            }

            StateCommand::Snapshot { reply } => {
                debug!("actor_loop: Snapshot command");
                let _ = reply.send(state.clone());
            }

            StateCommand::Shutdown => {
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatMessageData, GoalFormPayload};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn goal() -> Goal {
        let today = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let payload = GoalFormPayload::new(
            "Biology",
            "Learn the Krebs cycle",
            NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
            1.0,
            5,
            vec![],
            today,
        );
        Goal::from_payload(&payload, today)
    }

    #[tokio::test]
    async fn test_dispatch_persists_and_broadcasts() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path()).unwrap();
        let mut events = manager.subscribe_events();

        let goal = goal();
        let goal_id = goal.id.clone();
        let applied = manager
            .dispatch(Action::GoalCreated {
                subject: "Biology".to_string(),
                goal,
            })
            .await
            .unwrap();
        assert_eq!(applied, Applied::Changed);
        assert!(matches!(events.recv().await.unwrap(), StateEvent::TranscriptReset));

        let found = manager.goal(&goal_id).await.unwrap();
        assert!(found.is_simulating());
        assert!(matches!(manager.goal("missing").await, Err(StateError::NotFound(_))));

        manager.shutdown().await.unwrap();

        // A fresh actor sees the persisted goal and selection
        let manager = StateManager::spawn(temp.path()).unwrap();
        let state = manager.snapshot().await.unwrap();
        assert_eq!(state.active_goal_id.as_deref(), Some(goal_id.as_str()));
        assert_eq!(state.subjects[0].goals.len(), 1);
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_transcript_is_not_persisted() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path()).unwrap();
        manager
            .dispatch(Action::MessageAdded {
                goal_id: None,
                message: ChatMessageData::user("hello"),
            })
            .await
            .unwrap();
        assert_eq!(manager.snapshot().await.unwrap().transcript.len(), 1);
        manager.shutdown().await.unwrap();

        let manager = StateManager::spawn(temp.path()).unwrap();
        assert!(manager.snapshot().await.unwrap().transcript.is_empty());
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_after_shutdown_fail() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path()).unwrap();
        manager.shutdown().await.unwrap();
        let result = manager.snapshot().await;
        assert!(matches!(result, Err(StateError::ChannelError)));
    }
}
