use crate::error::ServerError;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Lifecycle state of the whole server process (not a single session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppState {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

pub struct StateManager {
    state: Arc<RwLock<AppState>>,
    state_tx: broadcast::Sender<AppState>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, _rx) = broadcast::channel(16);
        Self {
            state: Arc::new(RwLock::new(AppState::Initializing)),
            state_tx,
        }
    }

    pub fn transition(&self, new_state: AppState) -> Result<(), ServerError> {
        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &new_state),
            (AppState::Initializing, AppState::Running)
                | (AppState::Running, AppState::Stopping)
                | (AppState::Stopping, AppState::Stopped)
        );

        if !valid {
            return Err(ServerError::Fatal(format!(
                "Invalid state transition: {:?} -> {:?}",
                *current, new_state
            )));
        }

        tracing::info!("State transition: {:?} -> {:?}", *current, new_state);
        *current = new_state.clone();
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> AppState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppState> {
        self.state_tx.subscribe()
    }
}
