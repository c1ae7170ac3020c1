//! Status engine.
//!
//! The status is a pure function of three inputs ([`derive_status`]) plus a
//! timed error overlay. Raising the overlay forces [`Status::Error`] and arms
//! a single revert timer; raising it again restarts that timer instead of
//! adding a second one.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Coarse status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No keys are stored.
    Empty,
    /// Keys are stored but no session is active.
    Locked,
    /// At least one key is decrypted.
    Unlocked,
    /// Something went wrong recently, or every key failed to decrypt.
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
            Self::Error => "error",
        }
    }
}

/// Inputs to [`derive_status`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusInputs {
    pub stored_count: usize,
    pub session_active: bool,
    pub decrypted_count: usize,
}

/// Map the inputs to a status. Total and side-effect free.
pub fn derive_status(inputs: StatusInputs) -> Status {
    match inputs {
        StatusInputs { stored_count: 0, .. } => Status::Empty,
        StatusInputs {
            session_active: true,
            decrypted_count: 0,
            ..
        } => Status::Error,
        StatusInputs {
            session_active: true,
            ..
        } => Status::Unlocked,
        StatusInputs {
            session_active: false,
            ..
        } => Status::Locked,
    }
}

struct EngineState {
    inputs: StatusInputs,
    overlay: bool,
    generation: u64,
    revert: Option<JoinHandle<()>>,
}

impl EngineState {
    fn current(&self) -> Status {
        if self.overlay {
            Status::Error
        } else {
            derive_status(self.inputs)
        }
    }
}

struct Shared {
    state: Mutex<EngineState>,
    tx: watch::Sender<Status>,
}

impl Shared {
    fn publish(&self, status: Status) {
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Holds the latest status inputs and the error overlay.
#[derive(Clone)]
pub struct StatusEngine {
    shared: Arc<Shared>,
    revert_after: Duration,
}

impl StatusEngine {
    /// Create an engine whose error overlay reverts after `revert_after`.
    pub fn new(revert_after: Duration) -> Self {
        let initial = derive_status(StatusInputs::default());
        let (tx, _rx) = watch::channel(initial);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState {
                    inputs: StatusInputs::default(),
                    overlay: false,
                    generation: 0,
                    revert: None,
                }),
                tx,
            }),
            revert_after,
        }
    }

    /// Current status, overlay included.
    pub fn status(&self) -> Status {
        self.shared.state.lock().current()
    }

    pub fn inputs(&self) -> StatusInputs {
        self.shared.state.lock().inputs
    }

    /// Whether an error overlay is pending revert.
    pub fn has_error_overlay(&self) -> bool {
        self.shared.state.lock().overlay
    }

    /// Replace the inputs and publish the resulting status.
    pub fn update(&self, inputs: StatusInputs) -> Status {
        let status = {
            let mut state = self.shared.state.lock();
            state.inputs = inputs;
            state.current()
        };
        self.shared.publish(status);
        status
    }

    /// Force [`Status::Error`] and (re)arm the revert timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_error_overlay(&self) {
        let generation = {
            let mut state = self.shared.state.lock();
            state.overlay = true;
            state.generation = state.generation.wrapping_add(1);
            if let Some(previous) = state.revert.take() {
                previous.abort();
            }
            state.generation
        };
        self.shared.publish(Status::Error);

        let shared = Arc::clone(&self.shared);
        let delay = self.revert_after;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let status = {
                let mut state = shared.state.lock();
                // A newer overlay owns the timer now.
                if state.generation != generation {
                    return;
                }
                state.overlay = false;
                state.revert = None;
                state.current()
            };
            debug!(status = status.as_str(), "error overlay reverted");
            shared.publish(status);
        });

        let mut state = self.shared.state.lock();
        if state.generation == generation {
            state.revert = Some(handle);
        } else {
            handle.abort();
        }
    }

    /// Drop the overlay immediately and cancel its timer.
    pub fn clear_error_overlay(&self) -> Status {
        let status = {
            let mut state = self.shared.state.lock();
            state.overlay = false;
            state.generation = state.generation.wrapping_add(1);
            if let Some(pending) = state.revert.take() {
                pending.abort();
            }
            state.current()
        };
        self.shared.publish(status);
        status
    }

    /// Receive every status change.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.shared.tx.subscribe()
    }
}

impl std::fmt::Debug for StatusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusEngine")
            .field("status", &self.status())
            .field("revert_after", &self.revert_after)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(stored_count: usize, session_active: bool, decrypted_count: usize) -> StatusInputs {
        StatusInputs {
            stored_count,
            session_active,
            decrypted_count,
        }
    }

    #[test]
    fn test_derive_status_table() {
        assert_eq!(derive_status(inputs(0, false, 0)), Status::Empty);
        assert_eq!(derive_status(inputs(0, true, 0)), Status::Empty);
        assert_eq!(derive_status(inputs(2, false, 0)), Status::Locked);
        assert_eq!(derive_status(inputs(2, true, 1)), Status::Unlocked);
        assert_eq!(derive_status(inputs(2, true, 0)), Status::Error);
    }

    #[test]
    fn test_derive_status_is_pure() {
        for stored in 0..3 {
            for active in [false, true] {
                for decrypted in 0..3 {
                    let i = inputs(stored, active, decrypted);
                    assert_eq!(derive_status(i), derive_status(i));
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_reverts() {
        let engine = StatusEngine::new(Duration::from_secs(30));
        engine.update(inputs(1, false, 0));
        assert_eq!(engine.status(), Status::Locked);

        engine.set_error_overlay();
        assert_eq!(engine.status(), Status::Error);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(engine.status(), Status::Locked);
        assert!(!engine.has_error_overlay());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_error_reschedules_single_timer() {
        let engine = StatusEngine::new(Duration::from_secs(30));
        engine.update(inputs(1, false, 0));

        engine.set_error_overlay();
        tokio::time::sleep(Duration::from_secs(20)).await;
        engine.set_error_overlay();

        // The first timer would have fired at 30s.
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(engine.status(), Status::Error);

        // The rescheduled timer fires at 50s.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(engine.status(), Status::Locked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_reverts_to_current_inputs() {
        let engine = StatusEngine::new(Duration::from_secs(5));
        engine.update(inputs(1, false, 0));
        engine.set_error_overlay();

        engine.update(inputs(1, true, 1));
        assert_eq!(engine.status(), Status::Error);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(engine.status(), Status::Unlocked);
    }

    #[tokio::test]
    async fn test_clear_overlay() {
        let engine = StatusEngine::new(Duration::from_secs(30));
        engine.set_error_overlay();
        assert_eq!(engine.clear_error_overlay(), Status::Empty);
        assert_eq!(engine.status(), Status::Empty);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let engine = StatusEngine::new(Duration::from_secs(30));
        let mut rx = engine.subscribe();
        assert_eq!(*rx.borrow(), Status::Empty);

        engine.update(inputs(1, true, 1));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Status::Unlocked);
    }
}
