//! Redirect-based payments (iDEAL-style and generic web redirects).
//!
//! The whole chain runs inside `submit`: tokenize an off-session instrument,
//! create the payment, hand the user off to the continuation URL, poll the
//! status URL until the out-of-band step completes, and resume with the
//! returned token. Whether the hand-off deep-links into a native app or
//! opens a browser is probed fresh on every attempt.

use std::sync::{Arc, Mutex};

use payrail::config::PaymentMethodDescriptor;
use payrail::context::SessionContext;
use payrail::error::CheckoutError;
use payrail::session::SessionIntent;
use payrail::tokenizer::{
    BoxFuture, EventSink, InputField, MethodEvent, PaymentOutcome, Selection, Tokenizer,
};
use payrail_http::ApiClient;
use payrail_http::types::TokenizationRequest;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::external::{AppAvailability, AuthChannel, WebAuthenticator};
use crate::support::{decode_continuation, ensure_active, poll_and_resume, settle_or_park};

/// Tokenizer for redirect-based payment methods.
pub struct RedirectTokenizer {
    ctx: Arc<SessionContext>,
    client: ApiClient,
    events: EventSink,
    cancel: CancellationToken,
    method_type: String,
    config_id: String,
    web: Arc<dyn WebAuthenticator>,
    apps: Arc<dyn AppAvailability>,
    /// Native URL scheme to probe for a deep-link hand-off.
    deep_link_scheme: Option<String>,
    pending_payment: Mutex<Option<String>>,
}

impl std::fmt::Debug for RedirectTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectTokenizer")
            .field("method_type", &self.method_type)
            .finish_non_exhaustive()
    }
}

impl RedirectTokenizer {
    /// Creates a redirect tokenizer for one attempt.
    #[must_use]
    pub fn new(
        ctx: Arc<SessionContext>,
        client: ApiClient,
        descriptor: &PaymentMethodDescriptor,
        events: EventSink,
        web: Arc<dyn WebAuthenticator>,
        apps: Arc<dyn AppAvailability>,
    ) -> Self {
        Self {
            ctx,
            client,
            events,
            cancel: CancellationToken::new(),
            method_type: descriptor.method_type.clone(),
            config_id: descriptor.id.clone(),
            web,
            apps,
            deep_link_scheme: None,
            pending_payment: Mutex::new(None),
        }
    }

    /// Sets the native URL scheme probed before each hand-off.
    #[must_use]
    pub fn with_deep_link_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.deep_link_scheme = Some(scheme.into());
        self
    }

    fn instrument_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "OFF_SESSION_PAYMENT",
            "paymentMethodType": self.method_type,
            "paymentMethodConfigId": self.config_id,
            "sessionInfo": {
                "platform": "MOBILE",
                "redirectionUrl": self.ctx.token().redirect_url,
            },
        })
    }

    async fn hand_off(&self, url: &Url) -> Result<(), CheckoutError> {
        // Probed fresh per attempt so a newly installed app is honored.
        let mut channel = AuthChannel::Browser;
        if let Some(scheme) = &self.deep_link_scheme
            && self.apps.can_open(scheme).await
        {
            channel = AuthChannel::NativeApp;
        }
        let _ = self.events.send(MethodEvent::RedirectRequested { url: url.clone() });
        tokio::select! {
            () = self.cancel.cancelled() => Err(CheckoutError::UserCancelled),
            result = self.web.authenticate(url, channel) => result,
        }
    }
}

impl Tokenizer for RedirectTokenizer {
    fn method_type(&self) -> &str {
        &self.method_type
    }

    fn start(&self) -> BoxFuture<'_, Result<(), CheckoutError>> {
        Box::pin(async { Ok(()) })
    }

    fn update_field(&self, field: InputField, _value: &str) -> Result<(), CheckoutError> {
        Err(CheckoutError::InvalidInput {
            field: format!("{field:?}"),
            code: "unsupported-field".to_owned(),
        })
    }

    fn select(&self, selection: Selection) -> Result<(), CheckoutError> {
        Err(CheckoutError::InvalidInput {
            field: format!("{selection:?}"),
            code: "unsupported-selection".to_owned(),
        })
    }

    fn submit(&self) -> BoxFuture<'_, Result<PaymentOutcome, CheckoutError>> {
        Box::pin(async move {
            ensure_active(&self.cancel)?;
            let request = match self.ctx.intent() {
                SessionIntent::Vault => TokenizationRequest::vault(self.instrument_payload()),
                SessionIntent::Checkout => {
                    TokenizationRequest::checkout(self.instrument_payload())
                }
            };
            let token = self.client.tokenize(&request).await?;
            ensure_active(&self.cancel)?;

            let response = self.client.create_payment(&token.token).await?;
            ensure_active(&self.cancel)?;
            let outcome = settle_or_park(&response, &self.pending_payment)?;
            if outcome.status != payrail::tokenizer::PaymentStatus::Pending {
                return Ok(outcome);
            }

            let continuation = decode_continuation(response.required_action.as_ref())?;
            let redirect_url = continuation.redirect_url.ok_or_else(|| {
                CheckoutError::Decode {
                    message: "continuation token carries no redirect URL".into(),
                }
            })?;
            let status_url = continuation.status_url.ok_or_else(|| CheckoutError::Decode {
                message: "continuation token carries no status URL".into(),
            })?;

            self.hand_off(&redirect_url).await?;
            ensure_active(&self.cancel)?;
            poll_and_resume(&self.client, &status_url, &response.id, &self.cancel).await
        })
    }

    fn resume(&self, resume_token: &str) -> BoxFuture<'_, Result<PaymentOutcome, CheckoutError>> {
        let resume_token = resume_token.to_owned();
        Box::pin(async move {
            ensure_active(&self.cancel)?;
            let payment_id = self
                .pending_payment
                .lock()
                .expect("pending payment lock poisoned")
                .clone()
                .ok_or_else(|| CheckoutError::InvalidInput {
                    field: "resumeToken".to_owned(),
                    code: "no-pending-payment".to_owned(),
                })?;
            let response = self.client.resume_payment(&payment_id, &resume_token).await?;
            settle_or_park(&response, &self.pending_payment)
        })
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::NoInstalledApps;
    use crate::testutil::{continuation_token, descriptor, session_context, test_client};
    use async_trait::async_trait;
    use payrail::config::method_types;
    use payrail::tokenizer::PaymentStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct InstantReturn;

    #[async_trait]
    impl WebAuthenticator for InstantReturn {
        async fn authenticate(&self, _url: &Url, _channel: AuthChannel) -> Result<(), CheckoutError> {
            Ok(())
        }
    }

    struct CountingApps {
        probes: AtomicUsize,
        installed: bool,
    }

    #[async_trait]
    impl AppAvailability for CountingApps {
        async fn can_open(&self, _scheme: &str) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.installed
        }
    }

    async fn mount_happy_path(server: &MockServer) {
        let continuation = continuation_token(&serde_json::json!({
            "accessToken": "cont-1",
            "exp": u64::MAX,
            "redirectUrl": format!("{}/redirect", server.uri()),
            "statusUrl": format!("{}/resume-tokens/check-1", server.uri()),
        }));
        Mock::given(method("POST"))
            .and(path("/payment-instruments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "instr-1"
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pay-7",
                "status": "PENDING",
                "requiredAction": {
                    "name": "CHECKOUT",
                    "clientToken": continuation
                }
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/resume-tokens/check-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "resume-1",
                "status": "COMPLETE"
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payments/pay-7/resume"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pay-7",
                "status": "SETTLED"
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn full_redirect_chain_settles() {
        let server = MockServer::start().await;
        mount_happy_path(&server).await;

        let ctx = session_context(&server, SessionIntent::Checkout);
        let client = test_client(&ctx);
        let (events, mut rx) = tokio::sync::broadcast::channel(8);
        let tok = RedirectTokenizer::new(
            ctx,
            client,
            &descriptor(method_types::ADYEN_IDEAL),
            events,
            Arc::new(InstantReturn),
            Arc::new(NoInstalledApps),
        );

        let outcome = tok.submit().await.unwrap();
        assert_eq!(outcome.payment_id, "pay-7");
        assert_eq!(outcome.status, PaymentStatus::Success);
        assert!(matches!(
            rx.try_recv().unwrap(),
            MethodEvent::RedirectRequested { .. }
        ));
    }

    #[tokio::test]
    async fn app_availability_is_probed_on_every_attempt() {
        let server = MockServer::start().await;
        mount_happy_path(&server).await;

        let apps = Arc::new(CountingApps {
            probes: AtomicUsize::new(0),
            installed: false,
        });
        let ctx = session_context(&server, SessionIntent::Checkout);
        let client = test_client(&ctx);
        let (events, _rx) = tokio::sync::broadcast::channel(8);
        let tok = RedirectTokenizer::new(
            ctx,
            client,
            &descriptor(method_types::WEB_REDIRECT),
            events,
            Arc::new(InstantReturn),
            Arc::clone(&apps) as Arc<dyn AppAvailability>,
        )
        .with_deep_link_scheme("bankapp");

        tok.submit().await.unwrap();
        tok.submit().await.unwrap();
        assert_eq!(apps.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancel_mid_hand_off_drops_the_attempt() {
        let server = MockServer::start().await;
        mount_happy_path(&server).await;

        struct NeverReturns;

        #[async_trait]
        impl WebAuthenticator for NeverReturns {
            async fn authenticate(
                &self,
                _url: &Url,
                _channel: AuthChannel,
            ) -> Result<(), CheckoutError> {
                std::future::pending().await
            }
        }

        let ctx = session_context(&server, SessionIntent::Checkout);
        let client = test_client(&ctx);
        let (events, _rx) = tokio::sync::broadcast::channel(8);
        let tok = Arc::new(RedirectTokenizer::new(
            ctx,
            client,
            &descriptor(method_types::WEB_REDIRECT),
            events,
            Arc::new(NeverReturns),
            Arc::new(NoInstalledApps),
        ));

        let submitting = {
            let tok = Arc::clone(&tok);
            tokio::spawn(async move { tok.submit().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tok.cancel();
        let err = submitting.await.unwrap().unwrap_err();
        assert!(err.is_cancellation());
    }
}
