//! The checkout state machine.
//!
//! One [`CheckoutOrchestrator`] drives one checkout session from token
//! decode to a terminal state. Every state mutation funnels through a single
//! apply point that enforces the two structural rules: terminal states never
//! transition again, and results from a superseded attempt (generation
//! mismatch after a cancel) are dropped on the floor. Transitions are
//! published in order on a watch channel; protocol-level UI events flow on a
//! separate broadcast channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use payrail::context::SessionContext;
use payrail::error::{CheckoutError, MerchantAbortedError, PaymentFailedError};
use payrail::hooks::{CheckoutHooks, HookDecision, PaymentCreateContext};
use payrail::session::{DecodedSessionToken, SessionIntent, unix_now};
use payrail::tokenizer::{
    EventSink, MethodEvent, MethodRegistry, PaymentOutcome, PaymentStatus, Tokenizer,
};
use payrail_http::ApiClient;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a checkout session.
#[derive(Debug, Clone)]
pub enum CheckoutState {
    /// Token decoded; configuration not yet fetched.
    Initializing,
    /// Configuration loaded; waiting for a method selection.
    Ready {
        /// Supported method type keys in backend display order.
        methods: Vec<String>,
    },
    /// A method is selected and collecting input or executing.
    InProgress {
        /// The active method type key.
        method_type: String,
    },
    /// The backend demands a resume step before the payment can settle.
    PendingResume {
        /// The active method type key.
        method_type: String,
    },
    /// Terminal: the payment settled or the instrument was vaulted.
    Succeeded {
        /// Backend payment identifier (or vaulted instrument token).
        payment_id: String,
    },
    /// Terminal: the attempt failed.
    Failed {
        /// The failure that ended the session.
        error: Arc<CheckoutError>,
    },
    /// Terminal: the user dismissed the checkout.
    Dismissed,
}

impl CheckoutState {
    /// Returns `true` for states that never transition again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Failed { .. } | Self::Dismissed
        )
    }
}

/// Rebuilds an error so the `Failed` state can carry its own copy.
/// `CheckoutError` is not `Clone` because one variant boxes an opaque
/// source; that variant keeps only its rendered message.
fn mirror(error: &CheckoutError) -> CheckoutError {
    match error {
        CheckoutError::InvalidToken(e) => e.clone().into(),
        CheckoutError::TokenExpired { expired_at } => CheckoutError::TokenExpired {
            expired_at: *expired_at,
        },
        CheckoutError::ConfigurationFetch(e) => {
            CheckoutError::ConfigurationFetch(e.to_string().into())
        }
        CheckoutError::Network { message, retryable } => CheckoutError::Network {
            message: message.clone(),
            retryable: *retryable,
        },
        CheckoutError::Decode { message } => CheckoutError::Decode {
            message: message.clone(),
        },
        CheckoutError::InvalidInput { field, code } => CheckoutError::InvalidInput {
            field: field.clone(),
            code: code.clone(),
        },
        CheckoutError::MerchantAborted(e) => e.clone().into(),
        CheckoutError::UserCancelled => CheckoutError::UserCancelled,
        CheckoutError::MethodUnavailable(e) => e.clone().into(),
        CheckoutError::PaymentFailed(e) => e.clone().into(),
        CheckoutError::PollTimedOut { attempts } => CheckoutError::PollTimedOut {
            attempts: *attempts,
        },
    }
}

struct ActiveMethod {
    method_type: String,
    tokenizer: Arc<dyn Tokenizer>,
}

/// Orchestrates one checkout session.
pub struct CheckoutOrchestrator {
    ctx: Arc<SessionContext>,
    client: ApiClient,
    registry: MethodRegistry,
    hooks: Vec<Arc<dyn CheckoutHooks>>,
    events: EventSink,
    state_tx: watch::Sender<CheckoutState>,
    cancel: CancellationToken,
    generation: AtomicU64,
    active: std::sync::Mutex<Option<ActiveMethod>>,
}

impl std::fmt::Debug for CheckoutOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutOrchestrator")
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl CheckoutOrchestrator {
    /// Creates an orchestrator from a decoded session token and a method
    /// registry.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::InvalidToken`] when `compact_token` does not
    /// decode.
    pub fn from_token(compact_token: &str, registry: MethodRegistry) -> Result<Self, CheckoutError> {
        let token = DecodedSessionToken::decode(compact_token)?;
        Ok(Self::new(Arc::new(SessionContext::new(token)), registry))
    }

    /// Creates an orchestrator over an existing session context.
    #[must_use]
    pub fn new(ctx: Arc<SessionContext>, registry: MethodRegistry) -> Self {
        let client = ApiClient::new(Arc::clone(ctx.token()));
        let (events, _rx) = broadcast::channel(32);
        let (state_tx, _state_rx) = watch::channel(CheckoutState::Initializing);
        Self {
            ctx,
            client,
            registry,
            hooks: Vec::new(),
            events,
            state_tx,
            cancel: CancellationToken::new(),
            generation: AtomicU64::new(0),
            active: std::sync::Mutex::new(None),
        }
    }

    /// Replaces the HTTP client (custom retry policy, tests).
    #[must_use]
    pub fn with_client(mut self, client: ApiClient) -> Self {
        self.client = client;
        self
    }

    /// Registers a merchant hook. The first abort among registered hooks
    /// wins.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn CheckoutHooks>) -> Self {
        self.hooks.push(hooks);
        self
    }

    /// The session context this orchestrator drives.
    #[must_use]
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    /// The current state snapshot.
    #[must_use]
    pub fn state(&self) -> CheckoutState {
        self.state_tx.borrow().clone()
    }

    /// Subscribes to state transitions, in order.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CheckoutState> {
        self.state_tx.subscribe()
    }

    /// Subscribes to protocol-level UI events (redirects, QR codes,
    /// category/bank lists, card networks).
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<MethodEvent> {
        self.events.subscribe()
    }

    /// The cancellation token released when the session ends.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Single mutation point. Drops the transition when the state is
    /// already terminal or the attempt was superseded.
    fn apply(&self, generation: u64, state: CheckoutState) -> bool {
        if self.current_generation() != generation {
            return false;
        }
        let mut applied = false;
        self.state_tx.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            #[cfg(feature = "telemetry")]
            tracing::debug!(from = ?current, to = ?state, "checkout transition");
            *current = state;
            applied = true;
            true
        });
        applied
    }

    fn hook_context(&self, method_type: &str) -> PaymentCreateContext {
        PaymentCreateContext {
            method_type: method_type.to_owned(),
            intent: self.ctx.intent(),
        }
    }

    async fn notify_failure(&self, method_type: &str, error: &CheckoutError) {
        let hook_ctx = self.hook_context(method_type);
        for hooks in &self.hooks {
            hooks.on_failure(&hook_ctx, error).await;
        }
    }

    fn fail(&self, generation: u64, error: CheckoutError) -> CheckoutError {
        self.apply(
            generation,
            CheckoutState::Failed {
                error: Arc::new(mirror(&error)),
            },
        );
        error
    }

    /// Validates the session and fetches the payment method configuration.
    ///
    /// An expired token fails the session before any network call. On
    /// success the state becomes [`CheckoutState::Ready`] with the supported
    /// methods in backend display order.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::TokenExpired`] or
    /// [`CheckoutError::ConfigurationFetch`]; either also drives the state
    /// to [`CheckoutState::Failed`].
    pub async fn initialize(&self) -> Result<Vec<String>, CheckoutError> {
        let generation = self.current_generation();
        if let Err(error) = self.ctx.token().ensure_usable(unix_now()) {
            return Err(self.fail(generation, error));
        }

        let config = match self.client.fetch_configuration().await {
            Ok(config) => config,
            Err(error) => {
                return Err(self.fail(
                    generation,
                    CheckoutError::ConfigurationFetch(Box::new(error)),
                ));
            }
        };
        self.ctx.set_config(config.clone());

        let methods: Vec<String> = config
            .payment_methods
            .iter()
            .filter(|descriptor| self.registry.supports(&descriptor.method_type))
            .map(|descriptor| descriptor.method_type.clone())
            .collect();
        self.apply(
            generation,
            CheckoutState::Ready {
                methods: methods.clone(),
            },
        );
        Ok(methods)
    }

    /// Selects a payment method and starts its tokenizer.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::MethodUnavailable`] for unknown method
    /// types, or the tokenizer's own start failure.
    pub async fn select_method(&self, method_type: &str) -> Result<(), CheckoutError> {
        let generation = self.current_generation();
        let descriptor = self
            .ctx
            .config()
            .as_deref()
            .and_then(|config| config.descriptor(method_type).cloned())
            .ok_or_else(|| {
                CheckoutError::from(payrail::error::MethodUnavailableError::new(method_type))
            })?;

        if let Some(previous) = self.active.lock().expect("active method lock poisoned").take() {
            previous.tokenizer.cancel();
        }

        let tokenizer: Arc<dyn Tokenizer> = Arc::from(self.registry.resolve(
            Arc::clone(&self.ctx),
            &descriptor,
            self.events.clone(),
        )?);
        tokenizer.start().await?;

        *self.active.lock().expect("active method lock poisoned") = Some(ActiveMethod {
            method_type: method_type.to_owned(),
            tokenizer,
        });
        self.apply(
            generation,
            CheckoutState::InProgress {
                method_type: method_type.to_owned(),
            },
        );
        Ok(())
    }

    /// Forwards a field update to the active tokenizer.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::InvalidInput`] with code
    /// `"no-method-selected"` when nothing is selected, or the tokenizer's
    /// rejection.
    pub fn update_field(
        &self,
        field: payrail::tokenizer::InputField,
        value: &str,
    ) -> Result<(), CheckoutError> {
        self.with_active(|active| active.tokenizer.update_field(field, value))
    }

    /// Forwards a selection to the active tokenizer.
    ///
    /// # Errors
    ///
    /// Same classes as [`CheckoutOrchestrator::update_field`].
    pub fn select(&self, selection: payrail::tokenizer::Selection) -> Result<(), CheckoutError> {
        self.with_active(|active| active.tokenizer.select(selection))
    }

    fn with_active<T>(
        &self,
        f: impl FnOnce(&ActiveMethod) -> Result<T, CheckoutError>,
    ) -> Result<T, CheckoutError> {
        let active = self.active.lock().expect("active method lock poisoned");
        let active = active.as_ref().ok_or_else(|| CheckoutError::InvalidInput {
            field: "method".to_owned(),
            code: "no-method-selected".to_owned(),
        })?;
        f(active)
    }

    fn active_handle(&self) -> Result<(String, Arc<dyn Tokenizer>), CheckoutError> {
        self.with_active(|active| {
            Ok((active.method_type.clone(), Arc::clone(&active.tokenizer)))
        })
    }

    /// Submits the active method.
    ///
    /// For checkout-intent sessions every registered hook is consulted
    /// first; an abort fails the attempt with the merchant's message before
    /// any tokenization call. Vault intent skips the hooks. The outcome
    /// drives the state to [`CheckoutState::Succeeded`],
    /// [`CheckoutState::PendingResume`], or [`CheckoutState::Failed`].
    ///
    /// # Errors
    ///
    /// Returns the failure that drove the state, or
    /// [`CheckoutError::UserCancelled`] (which leaves the state to the
    /// cancel path).
    pub async fn submit(&self) -> Result<PaymentOutcome, CheckoutError> {
        let generation = self.current_generation();
        let (method_type, tokenizer) = self.active_handle()?;

        if self.ctx.intent() == SessionIntent::Checkout {
            let hook_ctx = self.hook_context(&method_type);
            for hooks in &self.hooks {
                if let HookDecision::Abort { message } =
                    hooks.before_payment_create(&hook_ctx).await
                {
                    let error = CheckoutError::from(MerchantAbortedError::new(message));
                    self.notify_failure(&method_type, &error).await;
                    return Err(self.fail(generation, error));
                }
            }
        }

        let result = tokio::select! {
            () = self.cancel.cancelled() => Err(CheckoutError::UserCancelled),
            result = tokenizer.submit() => result,
        };
        self.conclude(generation, &method_type, result).await
    }

    /// Resumes a pending payment with a resume token.
    ///
    /// # Errors
    ///
    /// Same classes as [`CheckoutOrchestrator::submit`].
    pub async fn resume(&self, resume_token: &str) -> Result<PaymentOutcome, CheckoutError> {
        let generation = self.current_generation();
        let (method_type, tokenizer) = self.active_handle()?;
        self.apply(
            generation,
            CheckoutState::InProgress {
                method_type: method_type.clone(),
            },
        );

        let result = tokio::select! {
            () = self.cancel.cancelled() => Err(CheckoutError::UserCancelled),
            result = tokenizer.resume(resume_token) => result,
        };
        self.conclude(generation, &method_type, result).await
    }

    async fn conclude(
        &self,
        generation: u64,
        method_type: &str,
        result: Result<PaymentOutcome, CheckoutError>,
    ) -> Result<PaymentOutcome, CheckoutError> {
        match result {
            Ok(outcome) => match outcome.status {
                PaymentStatus::Success => {
                    self.apply(
                        generation,
                        CheckoutState::Succeeded {
                            payment_id: outcome.payment_id.clone(),
                        },
                    );
                    let hook_ctx = self.hook_context(method_type);
                    for hooks in &self.hooks {
                        hooks.on_payment_created(&hook_ctx, &outcome).await;
                    }
                    Ok(outcome)
                }
                PaymentStatus::Pending => {
                    self.apply(
                        generation,
                        CheckoutState::PendingResume {
                            method_type: method_type.to_owned(),
                        },
                    );
                    Ok(outcome)
                }
                PaymentStatus::Failed => {
                    let error = CheckoutError::from(
                        PaymentFailedError::new("payment-declined")
                            .with_payment_id(outcome.payment_id),
                    );
                    self.notify_failure(method_type, &error).await;
                    Err(self.fail(generation, error))
                }
            },
            Err(error) if error.is_cancellation() => Err(error),
            Err(error) => {
                self.notify_failure(method_type, &error).await;
                Err(self.fail(generation, error))
            }
        }
    }

    /// Cancels the session: releases the active tokenizer, invalidates any
    /// in-flight result, and drives the state to
    /// [`CheckoutState::Dismissed`]. Idempotent.
    pub fn cancel(&self) {
        // Bump first so an in-flight conclusion can no longer apply.
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        if let Some(active) = self.active.lock().expect("active method lock poisoned").take() {
            active.tokenizer.cancel();
        }
        self.state_tx.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = CheckoutState::Dismissed;
            true
        });
    }
}
