//! Merchant-facing handle over a running checkout session.
//!
//! A [`CheckoutScope`] wraps the orchestrator behind a small surface:
//! observe states as a stream, register at-most-once terminal callbacks,
//! and shut the session down. Dropping the scope cancels the session, so a
//! merchant integration cannot leak a live checkout past its UI.

use std::sync::{Arc, Mutex};

use futures_util::Stream;
use payrail::error::CheckoutError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::orchestrator::{CheckoutOrchestrator, CheckoutState};

type TerminalCallback<T> = Box<dyn FnOnce(T) + Send>;

#[derive(Default)]
struct Callbacks {
    on_success: Option<TerminalCallback<String>>,
    on_failure: Option<TerminalCallback<Arc<CheckoutError>>>,
    on_dismiss: Option<TerminalCallback<()>>,
}

/// A live checkout session scope.
///
/// The scope owns a watcher task that fires each registered terminal
/// callback at most once, on the first terminal state it observes.
pub struct CheckoutScope {
    orchestrator: Arc<CheckoutOrchestrator>,
    callbacks: Arc<Mutex<Callbacks>>,
    watcher: JoinHandle<()>,
}

impl std::fmt::Debug for CheckoutScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutScope")
            .field("state", &self.orchestrator.state())
            .finish_non_exhaustive()
    }
}

impl CheckoutScope {
    /// Opens a scope over an orchestrator and starts its terminal watcher.
    #[must_use]
    pub fn open(orchestrator: Arc<CheckoutOrchestrator>) -> Self {
        let callbacks = Arc::new(Mutex::new(Callbacks::default()));
        let watcher = tokio::spawn(watch_terminal(
            orchestrator.subscribe(),
            Arc::clone(&callbacks),
        ));
        Self {
            orchestrator,
            callbacks,
            watcher,
        }
    }

    /// The orchestrator this scope wraps.
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<CheckoutOrchestrator> {
        &self.orchestrator
    }

    /// The current state snapshot.
    #[must_use]
    pub fn state(&self) -> CheckoutState {
        self.orchestrator.state()
    }

    /// All state transitions from the current state onward, in order.
    pub fn states(&self) -> impl Stream<Item = CheckoutState> + Send + use<> {
        let rx = self.orchestrator.subscribe();
        futures_util::stream::unfold(Some(rx), |rx| async move {
            let mut rx = rx?;
            let state = rx.borrow_and_update().clone();
            let next = if state.is_terminal() || rx.changed().await.is_err() {
                None
            } else {
                Some(rx)
            };
            Some((state, next))
        })
    }

    /// Registers a success callback, fired at most once with the payment id.
    pub fn on_success(&self, callback: impl FnOnce(String) + Send + 'static) {
        self.callbacks
            .lock()
            .expect("callback lock poisoned")
            .on_success = Some(Box::new(callback));
    }

    /// Registers a failure callback, fired at most once with the terminal
    /// error.
    pub fn on_failure(&self, callback: impl FnOnce(Arc<CheckoutError>) + Send + 'static) {
        self.callbacks
            .lock()
            .expect("callback lock poisoned")
            .on_failure = Some(Box::new(callback));
    }

    /// Registers a dismissal callback, fired at most once.
    pub fn on_dismiss(&self, callback: impl FnOnce(()) + Send + 'static) {
        self.callbacks
            .lock()
            .expect("callback lock poisoned")
            .on_dismiss = Some(Box::new(callback));
    }

    /// Ends the session: cancels the orchestrator (dismissing a non-terminal
    /// checkout) and stops the watcher. Idempotent.
    pub fn shutdown(&self) {
        self.orchestrator.cancel();
    }
}

impl Drop for CheckoutScope {
    fn drop(&mut self) {
        self.shutdown();
        self.watcher.abort();
    }
}

async fn watch_terminal(
    mut rx: watch::Receiver<CheckoutState>,
    callbacks: Arc<Mutex<Callbacks>>,
) {
    loop {
        let state = rx.borrow_and_update().clone();
        if state.is_terminal() {
            fire(&state, &callbacks);
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn fire(state: &CheckoutState, callbacks: &Mutex<Callbacks>) {
    // take() guarantees at-most-once even if a terminal state is observed
    // twice before the watcher returns.
    let mut callbacks = callbacks.lock().expect("callback lock poisoned");
    match state {
        CheckoutState::Succeeded { payment_id } => {
            if let Some(callback) = callbacks.on_success.take() {
                callback(payment_id.clone());
            }
        }
        CheckoutState::Failed { error } => {
            if let Some(callback) = callbacks.on_failure.take() {
                callback(Arc::clone(error));
            }
        }
        CheckoutState::Dismissed => {
            if let Some(callback) = callbacks.on_dismiss.take() {
                callback(());
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use payrail::context::SessionContext;
    use payrail::session::{DecodedSessionToken, Expiry, SessionIntent};
    use payrail::tokenizer::MethodRegistry;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn orchestrator() -> Arc<CheckoutOrchestrator> {
        let ctx = Arc::new(SessionContext::new(DecodedSessionToken {
            access_token: "t".into(),
            exp: Expiry::from_secs(u64::MAX),
            intent: SessionIntent::Checkout,
            configuration_url: None,
            core_url: None,
            pci_url: None,
            bindata_url: None,
            three_ds_init_url: None,
            status_url: None,
            redirect_url: None,
            qr_code: None,
            voucher_reference: None,
            voucher_expires_at: None,
            stripe_client_secret: None,
        }));
        Arc::new(CheckoutOrchestrator::new(ctx, MethodRegistry::new()))
    }

    #[tokio::test]
    async fn shutdown_dismisses_and_fires_the_callback_once() {
        let scope = CheckoutScope::open(orchestrator());
        let fired = Arc::new(AtomicU32::new(0));
        {
            let fired = Arc::clone(&fired);
            scope.on_dismiss(move |()| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        scope.shutdown();
        scope.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(scope.state(), CheckoutState::Dismissed));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn states_stream_ends_on_the_terminal_state() {
        let scope = CheckoutScope::open(orchestrator());
        let stream = scope.states();
        scope.shutdown();

        let observed: Vec<CheckoutState> = stream.collect().await;
        assert!(matches!(
            observed.last(),
            Some(CheckoutState::Dismissed)
        ));
    }

    #[tokio::test]
    async fn dropping_the_scope_cancels_the_session() {
        let orchestrator = orchestrator();
        {
            let _scope = CheckoutScope::open(Arc::clone(&orchestrator));
        }
        assert!(matches!(orchestrator.state(), CheckoutState::Dismissed));
        assert!(orchestrator.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn success_callback_does_not_fire_for_dismissal() {
        let scope = CheckoutScope::open(orchestrator());
        let fired = Arc::new(AtomicU32::new(0));
        {
            let fired = Arc::clone(&fired);
            scope.on_success(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        scope.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
