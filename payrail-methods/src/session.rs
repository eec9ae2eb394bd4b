//! Session-based payments (Klarna-style).
//!
//! `start` creates a processor payment session and surfaces its categories;
//! the user picks one; `submit` authorizes through the processor SDK seam,
//! finalizes into a customer token when the processor demands it, tokenizes,
//! and (for checkout sessions) creates the payment.

use std::sync::{Arc, Mutex};

use payrail::config::PaymentMethodDescriptor;
use payrail::context::SessionContext;
use payrail::error::CheckoutError;
use payrail::session::SessionIntent;
use payrail::tokenizer::{
    BoxFuture, EventSink, InputField, MethodEvent, PaymentOutcome, Selection, Tokenizer,
};
use payrail_http::ApiClient;
use payrail_http::types::{
    CreateKlarnaSessionRequest, FinalizeKlarnaSessionRequest, KlarnaSessionResponse,
    TokenizationRequest,
};
use tokio_util::sync::CancellationToken;

use crate::external::SessionAuthorizer;
use crate::support::{ensure_active, settle_or_park};

/// Tokenizer for session-based payment methods.
pub struct SessionTokenizer {
    ctx: Arc<SessionContext>,
    client: ApiClient,
    events: EventSink,
    cancel: CancellationToken,
    method_type: String,
    config_id: String,
    authorizer: Arc<dyn SessionAuthorizer>,
    session: Mutex<Option<KlarnaSessionResponse>>,
    selected_category: Mutex<Option<String>>,
    pending_payment: Mutex<Option<String>>,
}

impl std::fmt::Debug for SessionTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenizer")
            .field("method_type", &self.method_type)
            .finish_non_exhaustive()
    }
}

impl SessionTokenizer {
    /// Creates a session tokenizer for one attempt.
    #[must_use]
    pub fn new(
        ctx: Arc<SessionContext>,
        client: ApiClient,
        descriptor: &PaymentMethodDescriptor,
        events: EventSink,
        authorizer: Arc<dyn SessionAuthorizer>,
    ) -> Self {
        Self {
            ctx,
            client,
            events,
            cancel: CancellationToken::new(),
            method_type: descriptor.method_type.clone(),
            config_id: descriptor
                .processor_config_id
                .clone()
                .unwrap_or_else(|| descriptor.id.clone()),
            authorizer,
            session: Mutex::new(None),
            selected_category: Mutex::new(None),
            pending_payment: Mutex::new(None),
        }
    }

    fn session_type(&self) -> &'static str {
        match self.ctx.intent() {
            SessionIntent::Checkout => "HOSTED_PAYMENT_PAGE",
            SessionIntent::Vault => "RECURRING_PAYMENT",
        }
    }
}

impl Tokenizer for SessionTokenizer {
    fn method_type(&self) -> &str {
        &self.method_type
    }

    fn start(&self) -> BoxFuture<'_, Result<(), CheckoutError>> {
        Box::pin(async move {
            ensure_active(&self.cancel)?;
            let session = self
                .client
                .create_klarna_session(&CreateKlarnaSessionRequest {
                    payment_method_config_id: self.config_id.clone(),
                    session_type: self.session_type().to_owned(),
                })
                .await?;
            ensure_active(&self.cancel)?;
            let categories = session.payment_categories();
            *self.session.lock().expect("session lock poisoned") = Some(session);
            let _ = self.events.send(MethodEvent::CategoriesLoaded(categories));
            Ok(())
        })
    }

    fn update_field(&self, field: InputField, _value: &str) -> Result<(), CheckoutError> {
        Err(CheckoutError::InvalidInput {
            field: format!("{field:?}"),
            code: "unsupported-field".to_owned(),
        })
    }

    fn select(&self, selection: Selection) -> Result<(), CheckoutError> {
        let Selection::Category(identifier) = selection else {
            return Err(CheckoutError::InvalidInput {
                field: format!("{selection:?}"),
                code: "unsupported-selection".to_owned(),
            });
        };
        let known = self
            .session
            .lock()
            .expect("session lock poisoned")
            .as_ref()
            .is_some_and(|s| s.categories.iter().any(|c| c.identifier == identifier));
        if !known {
            return Err(CheckoutError::InvalidInput {
                field: "category".to_owned(),
                code: "unknown-category".to_owned(),
            });
        }
        *self
            .selected_category
            .lock()
            .expect("category selection lock poisoned") = Some(identifier);
        Ok(())
    }

    fn submit(&self) -> BoxFuture<'_, Result<PaymentOutcome, CheckoutError>> {
        Box::pin(async move {
            ensure_active(&self.cancel)?;
            let (session_id, processor_token) = {
                let session = self.session.lock().expect("session lock poisoned");
                let session = session.as_ref().ok_or_else(|| CheckoutError::InvalidInput {
                    field: "session".to_owned(),
                    code: "session-not-started".to_owned(),
                })?;
                (session.session_id.clone(), session.client_token.clone())
            };
            let category = self
                .selected_category
                .lock()
                .expect("category selection lock poisoned")
                .clone()
                .ok_or_else(|| CheckoutError::InvalidInput {
                    field: "category".to_owned(),
                    code: "no-category-selected".to_owned(),
                })?;

            let authorized = tokio::select! {
                () = self.cancel.cancelled() => return Err(CheckoutError::UserCancelled),
                result = self.authorizer.authorize(&processor_token, &category) => result?,
            };
            ensure_active(&self.cancel)?;

            let customer_token = if authorized.finalize_required {
                self.client
                    .finalize_klarna_session(&FinalizeKlarnaSessionRequest {
                        session_id: session_id.clone(),
                    })
                    .await?
                    .customer_token_id
            } else {
                authorized.auth_token
            };
            ensure_active(&self.cancel)?;

            let payload = serde_json::json!({
                "type": "KLARNA_CUSTOMER_TOKEN",
                "paymentMethodConfigId": self.config_id,
                "klarnaCustomerToken": customer_token,
                "sessionData": { "sessionId": session_id },
            });
            match self.ctx.intent() {
                SessionIntent::Vault => {
                    let token = self.client.tokenize(&TokenizationRequest::vault(payload)).await?;
                    Ok(PaymentOutcome::success(token.token))
                }
                SessionIntent::Checkout => {
                    let token = self
                        .client
                        .tokenize(&TokenizationRequest::checkout(payload))
                        .await?;
                    ensure_active(&self.cancel)?;
                    let response = self.client.create_payment(&token.token).await?;
                    settle_or_park(&response, &self.pending_payment)
                }
            }
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
    use crate::external::AuthorizationResult;
    use crate::testutil::{descriptor, session_context, test_client};
    use async_trait::async_trait;
    use payrail::config::method_types;
    use payrail::tokenizer::PaymentStatus;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Approving {
        finalize_required: bool,
    }

    #[async_trait]
    impl SessionAuthorizer for Approving {
        async fn authorize(
            &self,
            _processor_client_token: &str,
            _category_identifier: &str,
        ) -> Result<AuthorizationResult, CheckoutError> {
            Ok(AuthorizationResult {
                auth_token: "auth-1".into(),
                finalize_required: self.finalize_required,
            })
        }
    }

    fn tokenizer(
        server: &MockServer,
        intent: SessionIntent,
        finalize_required: bool,
    ) -> SessionTokenizer {
        let ctx = session_context(server, intent);
        let client = test_client(&ctx);
        let (events, _rx) = tokio::sync::broadcast::channel(8);
        SessionTokenizer::new(
            ctx,
            client,
            &descriptor(method_types::KLARNA),
            events,
            Arc::new(Approving { finalize_required }),
        )
    }

    async fn mount_session(server: &MockServer, session_type: &str) {
        Mock::given(method("POST"))
            .and(path("/klarna/payment-sessions"))
            .and(body_partial_json(serde_json::json!({ "sessionType": session_type })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sessionId": "sess-1",
                "clientToken": "processor-token",
                "categories": [
                    { "identifier": "pay_later", "name": "Pay later" },
                    { "identifier": "pay_now", "name": "Pay now" }
                ]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn start_surfaces_categories_and_select_validates() {
        let server = MockServer::start().await;
        mount_session(&server, "HOSTED_PAYMENT_PAGE").await;

        let tok = tokenizer(&server, SessionIntent::Checkout, false);
        tok.start().await.unwrap();
        assert!(tok.select(Selection::Category("pay_later".into())).is_ok());
        assert!(tok.select(Selection::Category("unheard_of".into())).is_err());
    }

    #[tokio::test]
    async fn checkout_with_finalize_round_trips_the_customer_token() {
        let server = MockServer::start().await;
        mount_session(&server, "HOSTED_PAYMENT_PAGE").await;
        Mock::given(method("POST"))
            .and(path("/klarna/customer-tokens"))
            .and(body_partial_json(serde_json::json!({ "sessionId": "sess-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "customerTokenId": "cust-tok-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payment-instruments"))
            .and(body_partial_json(serde_json::json!({
                "paymentInstrument": { "klarnaCustomerToken": "cust-tok-1" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "instr-2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pay-2",
                "status": "SETTLED"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tok = tokenizer(&server, SessionIntent::Checkout, true);
        tok.start().await.unwrap();
        tok.select(Selection::Category("pay_now".into())).unwrap();
        let outcome = tok.submit().await.unwrap();
        assert_eq!(outcome.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn vault_session_uses_the_recurring_session_type() {
        let server = MockServer::start().await;
        mount_session(&server, "RECURRING_PAYMENT").await;
        Mock::given(method("POST"))
            .and(path("/payment-instruments"))
            .and(body_partial_json(serde_json::json!({ "paymentFlow": "VAULT" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "vault-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tok = tokenizer(&server, SessionIntent::Vault, false);
        tok.start().await.unwrap();
        tok.select(Selection::Category("pay_later".into())).unwrap();
        let outcome = tok.submit().await.unwrap();
        assert_eq!(outcome.payment_id, "vault-2");
    }

    #[tokio::test]
    async fn submit_before_start_is_rejected() {
        let server = MockServer::start().await;
        let tok = tokenizer(&server, SessionIntent::Checkout, false);
        let err = tok.submit().await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidInput { ref code, .. } if code == "session-not-started"
        ));
    }
}
