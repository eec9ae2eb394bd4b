//! Debounced card network resolution.
//!
//! While the user types a card number the candidate networks come from the
//! local BIN table; once eight digits are available the authoritative answer
//! comes from the remote BIN service. Remote lookups are debounced so a fast
//! typist produces one request, not one per keystroke, and the lookup input
//! is always exactly the first eight digits. A remote failure or empty
//! answer falls back silently to the local table.
//!
//! At most one lookup is in flight: scheduling a new one atomically cancels
//! the previous task, and a stale task that already fetched its answer is
//! dropped by a generation check before it can publish.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use payrail::cardnet::{CardNetwork, resolve_local};
use payrail::error::CheckoutError;
use payrail::tokenizer::{BoxFuture, EventSink, MethodEvent};
use payrail_http::ApiClient;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Debounce window between a keystroke and its remote lookup.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(350);

/// Digits required before the remote lookup becomes authoritative.
pub const REMOTE_LOOKUP_THRESHOLD: usize = 8;

/// Remote BIN lookup seam.
///
/// The production implementation is [`ApiClient`]; tests substitute a
/// counting mock.
pub trait BinLookup: Send + Sync {
    /// Resolves the candidate networks for a BIN prefix of at most eight
    /// digits.
    fn lookup(&self, prefix: &str) -> BoxFuture<'_, Result<Vec<CardNetwork>, CheckoutError>>;
}

impl BinLookup for ApiClient {
    fn lookup(&self, prefix: &str) -> BoxFuture<'_, Result<Vec<CardNetwork>, CheckoutError>> {
        let prefix = prefix.to_owned();
        Box::pin(async move {
            let response = self.list_card_networks(&prefix).await?;
            Ok(response.card_networks())
        })
    }
}

struct ResolverState {
    /// First eight digits of the last processed input.
    last_prefix: String,
    /// Whether a remote lookup has been scheduled this session.
    looked_up_once: bool,
    /// Invalidates publishes from superseded lookups.
    generation: u64,
    task: Option<JoinHandle<()>>,
    task_cancel: CancellationToken,
}

struct Inner {
    lookup: Arc<dyn BinLookup>,
    tx: watch::Sender<Vec<CardNetwork>>,
    events: Option<EventSink>,
    state: Mutex<ResolverState>,
}

impl Inner {
    /// Publishes a snapshot, suppressing no-op updates so an identical
    /// remote confirmation never flickers the UI.
    fn publish(&self, generation: u64, networks: Vec<CardNetwork>) {
        {
            let state = self.state.lock().expect("resolver state poisoned");
            if state.generation != generation {
                return;
            }
        }
        let changed = self.tx.send_if_modified(|current| {
            if *current == networks {
                false
            } else {
                current.clone_from(&networks);
                true
            }
        });
        if changed
            && let Some(events) = &self.events
        {
            let _ = events.send(MethodEvent::CardNetworksResolved(networks));
        }
    }
}

/// Debounced resolver from raw card-number input to candidate networks.
pub struct CardNetworkResolver {
    inner: Arc<Inner>,
    debounce: Duration,
}

impl std::fmt::Debug for CardNetworkResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardNetworkResolver")
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

impl CardNetworkResolver {
    /// Creates a resolver over a remote lookup seam.
    #[must_use]
    pub fn new(lookup: Arc<dyn BinLookup>) -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                lookup,
                tx,
                events: None,
                state: Mutex::new(ResolverState {
                    last_prefix: String::new(),
                    looked_up_once: false,
                    generation: 0,
                    task: None,
                    task_cancel: CancellationToken::new(),
                }),
            }),
            debounce: DEBOUNCE_WINDOW,
        }
    }

    /// Mirrors snapshot changes onto a method event sink.
    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        let inner = Arc::get_mut(&mut self.inner).expect("resolver not yet shared");
        inner.events = Some(events);
        self
    }

    /// Overrides the debounce window, for tests.
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Subscribes to candidate-network snapshots.
    #[must_use]
    pub fn networks(&self) -> watch::Receiver<Vec<CardNetwork>> {
        self.inner.tx.subscribe()
    }

    /// Processes one card-number keystroke.
    ///
    /// Non-digits are stripped; input whose first-eight prefix is unchanged
    /// is a no-op. Below [`REMOTE_LOOKUP_THRESHOLD`] digits only the local
    /// table runs and any scheduled lookup is cancelled. At or above it, the
    /// local candidates are published immediately and a remote lookup of
    /// exactly the first eight digits is scheduled; the first lookup of a
    /// session skips the debounce.
    pub fn update(&self, raw: &str) {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        let prefix: String = digits.chars().take(REMOTE_LOOKUP_THRESHOLD).collect();

        let (generation, delay) = {
            let mut state = self.inner.state.lock().expect("resolver state poisoned");
            if prefix == state.last_prefix {
                return;
            }
            state.last_prefix.clone_from(&prefix);
            state.generation += 1;
            state.task_cancel.cancel();
            state.task_cancel = CancellationToken::new();
            if let Some(task) = state.task.take() {
                task.abort();
            }
            if digits.len() < REMOTE_LOOKUP_THRESHOLD {
                (state.generation, None)
            } else {
                let delay = if state.looked_up_once {
                    self.debounce
                } else {
                    Duration::ZERO
                };
                state.looked_up_once = true;
                (state.generation, Some(delay))
            }
        };

        self.inner.publish(generation, resolve_local(&digits));

        let Some(delay) = delay else { return };
        let cancel = {
            let state = self.inner.state.lock().expect("resolver state poisoned");
            state.task_cancel.clone()
        };
        let inner = Arc::clone(&self.inner);
        let local = resolve_local(&digits);
        let task = tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            let result = tokio::select! {
                () = cancel.cancelled() => return,
                result = inner.lookup.lookup(&prefix) => result,
            };
            match result {
                Ok(networks) if !networks.is_empty() => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(%prefix, ?networks, "remote bin lookup resolved");
                    inner.publish(generation, networks);
                }
                // Empty or failed lookups keep the local answer.
                Ok(_) => inner.publish(generation, local),
                Err(_error) => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(%prefix, error = %_error, "remote bin lookup failed, keeping local");
                    inner.publish(generation, local);
                }
            }
        });
        self.inner.state.lock().expect("resolver state poisoned").task = Some(task);
    }

    /// Cancels any scheduled or in-flight lookup.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock().expect("resolver state poisoned");
        state.generation += 1;
        state.task_cancel.cancel();
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }
}

impl Drop for CardNetworkResolver {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLookup {
        calls: AtomicUsize,
        prefixes: Mutex<Vec<String>>,
        response: Result<Vec<CardNetwork>, ()>,
    }

    impl CountingLookup {
        fn returning(networks: Vec<CardNetwork>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                prefixes: Mutex::new(Vec::new()),
                response: Ok(networks),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                prefixes: Mutex::new(Vec::new()),
                response: Err(()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl BinLookup for CountingLookup {
        fn lookup(&self, prefix: &str) -> BoxFuture<'_, Result<Vec<CardNetwork>, CheckoutError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prefixes.lock().unwrap().push(prefix.to_owned());
            let response = self.response.clone();
            Box::pin(async move {
                response.map_err(|()| CheckoutError::Network {
                    message: "mock lookup failure".into(),
                    retryable: true,
                })
            })
        }
    }

    async fn settle() {
        // Paused-clock runtimes auto-advance through the debounce sleep.
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn under_eight_digits_never_hits_the_network() {
        let lookup = CountingLookup::returning(vec![CardNetwork::Visa]);
        let resolver = CardNetworkResolver::new(Arc::clone(&lookup) as Arc<dyn BinLookup>);
        resolver.update("4");
        resolver.update("42 424");
        resolver.update("4242 424");
        settle().await;
        assert_eq!(lookup.calls(), 0);
        assert_eq!(*resolver.networks().borrow(), vec![CardNetwork::Visa]);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_lookup_carries_exactly_eight_digits() {
        let lookup = CountingLookup::returning(vec![CardNetwork::Visa]);
        let resolver = CardNetworkResolver::new(Arc::clone(&lookup) as Arc<dyn BinLookup>);
        resolver.update("4242 4242 4242 4242");
        settle().await;
        assert_eq!(lookup.calls(), 1);
        assert_eq!(lookup.prefixes.lock().unwrap().as_slice(), ["42424242"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_prefix_is_idempotent() {
        let lookup = CountingLookup::returning(vec![CardNetwork::Visa]);
        let resolver = CardNetworkResolver::new(Arc::clone(&lookup) as Arc<dyn BinLookup>);
        resolver.update("42424242");
        settle().await;
        resolver.update("42424242 4");
        resolver.update("42424242 42");
        settle().await;
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keystroke_replaces_the_scheduled_lookup() {
        let lookup = CountingLookup::returning(vec![CardNetwork::Mastercard]);
        let resolver = CardNetworkResolver::new(Arc::clone(&lookup) as Arc<dyn BinLookup>);
        resolver.update("51111111");
        settle().await;
        // Two further prefixes inside one debounce window: only the last
        // one may reach the network.
        resolver.update("52222222");
        tokio::time::sleep(Duration::from_millis(100)).await;
        resolver.update("53333333");
        settle().await;
        assert_eq!(lookup.calls(), 2);
        assert_eq!(
            lookup.prefixes.lock().unwrap().as_slice(),
            ["51111111", "53333333"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn matching_remote_answer_does_not_flicker() {
        let lookup = CountingLookup::returning(vec![CardNetwork::Visa]);
        let resolver = CardNetworkResolver::new(Arc::clone(&lookup) as Arc<dyn BinLookup>);
        let mut rx = resolver.networks();

        resolver.update("424242424242");
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), vec![CardNetwork::Visa]);

        settle().await;
        assert_eq!(lookup.calls(), 1);
        // The remote answer equals the local one, so no new snapshot.
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lookup_keeps_the_local_answer() {
        let lookup = CountingLookup::failing();
        let resolver = CardNetworkResolver::new(Arc::clone(&lookup) as Arc<dyn BinLookup>);
        resolver.update("37000000");
        settle().await;
        assert_eq!(lookup.calls(), 1);
        assert_eq!(*resolver.networks().borrow(), vec![CardNetwork::Amex]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_a_scheduled_lookup() {
        let lookup = CountingLookup::returning(vec![CardNetwork::Visa]);
        let resolver = CardNetworkResolver::new(Arc::clone(&lookup) as Arc<dyn BinLookup>);
        resolver.update("42424242");
        settle().await;
        resolver.update("51111111");
        resolver.cancel();
        settle().await;
        assert_eq!(lookup.calls(), 1);
    }
}
