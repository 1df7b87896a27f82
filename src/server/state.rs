use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::invoker::Invoke;
use crate::orchestrator::{Orchestrator, OutcomeNotification, Present, TextBuffers};
use crate::translator::Translate;

pub(crate) type ServerOrchestrator =
    Orchestrator<Box<dyn Invoke>, Box<dyn Translate>, Arc<SharedView>>;

pub(crate) struct ServerState {
    pub(crate) orchestrator: ServerOrchestrator,
    pub(crate) view: Arc<SharedView>,
    pub(crate) default_lang: String,
}

/// What a polling GUI host needs to render: the texts, the live notification,
/// and how many times the window was asked to come forward.
#[derive(Debug)]
pub(crate) struct SharedView {
    inner: Mutex<ViewState>,
    notification_ttl: Duration,
}

#[derive(Debug, Default)]
struct ViewState {
    texts: TextBuffers,
    notification: Option<(OutcomeNotification, Instant)>,
    reveal_requests: u64,
    busy: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ViewSnapshot {
    pub(crate) texts: TextBuffers,
    pub(crate) notification: Option<OutcomeNotification>,
    pub(crate) reveal_requests: u64,
    pub(crate) busy: bool,
}

impl SharedView {
    pub(crate) fn new(notification_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(ViewState::default()),
            notification_ttl,
        }
    }

    pub(crate) fn snapshot(&self) -> ViewSnapshot {
        let state = self.lock();
        let notification = state
            .notification
            .as_ref()
            .filter(|(_, shown_at)| shown_at.elapsed() < self.notification_ttl)
            .map(|(notification, _)| notification.clone());
        ViewSnapshot {
            texts: state.texts.clone(),
            notification,
            reveal_requests: state.reveal_requests,
            busy: state.busy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Present for SharedView {
    fn show_texts(&self, texts: &TextBuffers) {
        self.lock().texts = texts.clone();
    }

    fn notify(&self, notification: &OutcomeNotification) {
        debug!("notification: {}", notification.message);
        self.lock().notification = Some((notification.clone(), Instant::now()));
    }

    fn reveal_window(&self) {
        self.lock().reveal_requests += 1;
    }

    fn set_busy(&self, busy: bool) {
        self.lock().busy = busy;
    }
}
