use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::model::config::UndoConfig;

use super::manager::{UndoError, UndoStateManager};

/// Where the toast is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastState {
    /// Not shown, no timer running
    Idle,
    /// Countdown running; the user can still undo
    Active,
    /// Undo handler in flight
    Undoing,
    /// Countdown expired, action permanent (transient within finalize)
    Finalized,
}

/// Emitted when the toast leaves its countdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToastEvent {
    /// The user undid the action and the handler completed
    Undone,
    /// The handler failed; the toast hides regardless and the handler
    /// owns its own user-facing reporting
    UndoFailed(String),
    /// The countdown expired without user action
    Finalized,
}

/// Capability invoked when the user hits undo, typically
/// [`UndoStateManager::restore_state`]
#[async_trait]
pub trait UndoHandler: Send + Sync {
    async fn on_undo(&self) -> Result<(), UndoError>;
}

#[async_trait]
impl UndoHandler for UndoStateManager {
    async fn on_undo(&self) -> Result<(), UndoError> {
        self.restore_state().await.map(|_| ())
    }
}

struct ToastInner {
    state: ToastState,
    deadline: Option<Instant>,
    /// Bumped on every transition that invalidates a scheduled callback
    epoch: u64,
    timer: Option<JoinHandle<()>>,
    events: Option<mpsc::UnboundedSender<ToastEvent>>,
}

/// Countdown window during which a pending bulk action can be undone.
///
/// Presentation is the embedding UI's job; this is the state machine:
/// `Idle → Active → (Undoing | Finalized) → Idle`. The countdown is a
/// cancellable timer, so nothing fires after [`UndoToast::hide`].
#[derive(Clone)]
pub struct UndoToast {
    duration: Duration,
    handler: Arc<dyn UndoHandler>,
    inner: Arc<Mutex<ToastInner>>,
}

impl UndoToast {
    pub fn new(duration: Duration, handler: Arc<dyn UndoHandler>) -> Self {
        UndoToast {
            duration,
            handler,
            inner: Arc::new(Mutex::new(ToastInner {
                state: ToastState::Idle,
                deadline: None,
                epoch: 0,
                timer: None,
                events: None,
            })),
        }
    }

    /// Toast with the configured countdown duration
    pub fn from_config(config: &UndoConfig, handler: Arc<dyn UndoHandler>) -> Self {
        Self::new(config.toast_duration(), handler)
    }

    /// Subscribe to lifecycle events. Each call replaces the previous
    /// subscriber.
    pub fn event_stream(&self) -> mpsc::UnboundedReceiver<ToastEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().events = Some(tx);
        rx
    }

    /// Present the toast and start the countdown. Re-showing while
    /// already active restarts the window.
    ///
    /// Must be called from within a tokio runtime.
    pub fn show(&self) {
        let mut inner = self.inner.lock().unwrap();
        cancel_timer(&mut inner);
        inner.state = ToastState::Active;
        let deadline = Instant::now() + self.duration;
        inner.deadline = Some(deadline);
        let epoch = inner.epoch;
        let shared = Arc::clone(&self.inner);
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let mut inner = shared.lock().unwrap();
            if inner.epoch == epoch && inner.state == ToastState::Active {
                finalize_inner(&mut inner);
            }
        }));
        debug!(
            duration_ms = self.duration.as_millis() as u64,
            "undo toast shown"
        );
    }

    /// User hit undo: cancel the countdown, run the handler, hide.
    ///
    /// Only acts while the toast is active; a second invocation while
    /// the handler runs does not re-enter it.
    pub async fn handle_undo(&self) {
        let epoch = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != ToastState::Active {
                return;
            }
            cancel_timer(&mut inner);
            inner.state = ToastState::Undoing;
            inner.deadline = None;
            inner.epoch
        };

        let result = self.handler.on_undo().await;

        let mut inner = self.inner.lock().unwrap();
        if inner.epoch != epoch {
            // hide() landed while the handler ran; it already reset the
            // state and no event may fire now
            return;
        }
        inner.state = ToastState::Idle;
        let event = match result {
            Ok(()) => ToastEvent::Undone,
            Err(e) => ToastEvent::UndoFailed(e.to_string()),
        };
        debug!(?event, "undo toast resolved");
        emit(&inner, event);
    }

    /// Countdown expired: the bulk action becomes permanent.
    ///
    /// Normally invoked by the timer; only meaningful while active.
    pub fn finalize(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != ToastState::Active {
            return;
        }
        cancel_timer(&mut inner);
        finalize_inner(&mut inner);
    }

    /// Force the toast back to idle from any state without invoking the
    /// undo handler. Cancels any pending countdown callback.
    pub fn hide(&self) {
        let mut inner = self.inner.lock().unwrap();
        cancel_timer(&mut inner);
        inner.state = ToastState::Idle;
        inner.deadline = None;
        debug!("undo toast hidden");
    }

    /// True while the countdown runs or the handler is in flight
    pub fn is_toast_active(&self) -> bool {
        matches!(
            self.inner.lock().unwrap().state,
            ToastState::Active | ToastState::Undoing
        )
    }

    /// Time left in the countdown; zero unless active
    pub fn remaining_time(&self) -> Duration {
        let inner = self.inner.lock().unwrap();
        match (inner.state, inner.deadline) {
            (ToastState::Active, Some(deadline)) => {
                deadline.saturating_duration_since(Instant::now())
            }
            _ => Duration::ZERO,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ToastState {
        self.inner.lock().unwrap().state
    }
}

/// Invalidate any scheduled countdown callback
fn cancel_timer(inner: &mut ToastInner) {
    inner.epoch += 1;
    if let Some(timer) = inner.timer.take() {
        timer.abort();
    }
}

fn finalize_inner(inner: &mut ToastInner) {
    inner.state = ToastState::Finalized;
    inner.deadline = None;
    emit(inner, ToastEvent::Finalized);
    debug!("undo toast finalized");
    inner.state = ToastState::Idle;
}

fn emit(inner: &ToastInner, event: ToastEvent) {
    if let Some(tx) = &inner.events {
        let _ = tx.send(event);
    }
}
