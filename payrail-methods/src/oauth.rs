//! OAuth-approval payments (PayPal-style).
//!
//! Checkout sessions create a processor order, send the user to the approval
//! URL, and tokenize with the approved order id. Vault sessions start a
//! billing agreement instead, confirm it after approval, and tokenize the
//! confirmed agreement together with the payer identity the processor
//! returns.

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
    ConfirmBillingAgreementRequest, CreateBillingAgreementRequest, CreatePayPalOrderRequest,
    TokenizationRequest,
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::external::{AppAvailability, AuthChannel, WebAuthenticator};
use crate::support::{ensure_active, settle_or_park};

/// URL scheme probed to decide whether the provider app can take the
/// approval hand-off.
const PROVIDER_SCHEME: &str = "paypal";

/// Tokenizer for OAuth-approval payment methods.
pub struct OAuthTokenizer {
    ctx: Arc<SessionContext>,
    client: ApiClient,
    events: EventSink,
    cancel: CancellationToken,
    method_type: String,
    config_id: String,
    web: Arc<dyn WebAuthenticator>,
    apps: Arc<dyn AppAvailability>,
    pending_payment: Mutex<Option<String>>,
}

impl std::fmt::Debug for OAuthTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenizer")
            .field("method_type", &self.method_type)
            .finish_non_exhaustive()
    }
}

impl OAuthTokenizer {
    /// Creates an OAuth tokenizer for one attempt.
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
            config_id: descriptor
                .processor_config_id
                .clone()
                .unwrap_or_else(|| descriptor.id.clone()),
            web,
            apps,
            pending_payment: Mutex::new(None),
        }
    }

    fn return_urls(&self) -> Result<(Url, Url), CheckoutError> {
        let return_url = self.ctx.token().redirect_url.clone().ok_or_else(|| {
            CheckoutError::InvalidInput {
                field: "redirectUrl".to_owned(),
                code: "missing-redirect-url".to_owned(),
            }
        })?;
        let cancel_url = return_url
            .join("cancel")
            .map_err(|e| CheckoutError::Decode {
                message: format!("cannot derive cancel URL: {e}"),
            })?;
        Ok((return_url, cancel_url))
    }

    async fn approve(&self, approval_url: &Url) -> Result<(), CheckoutError> {
        let channel = if self.apps.can_open(PROVIDER_SCHEME).await {
            AuthChannel::NativeApp
        } else {
            AuthChannel::Browser
        };
        let _ = self
            .events
            .send(MethodEvent::RedirectRequested { url: approval_url.clone() });
        tokio::select! {
            () = self.cancel.cancelled() => Err(CheckoutError::UserCancelled),
            result = self.web.authenticate(approval_url, channel) => result,
        }
    }

    async fn submit_checkout(&self) -> Result<PaymentOutcome, CheckoutError> {
        let order = self
            .ctx
            .config()
            .and_then(|config| config.order.clone())
            .ok_or_else(|| CheckoutError::InvalidInput {
                field: "order".to_owned(),
                code: "missing-order-details".to_owned(),
            })?;
        let (return_url, cancel_url) = self.return_urls()?;

        let created = self
            .client
            .create_paypal_order(&CreatePayPalOrderRequest {
                payment_method_config_id: self.config_id.clone(),
                amount: order.amount,
                currency_code: order.currency_code,
                return_url,
                cancel_url,
            })
            .await?;
        ensure_active(&self.cancel)?;

        self.approve(&created.approval_url).await?;
        ensure_active(&self.cancel)?;

        let payload = serde_json::json!({
            "type": "PAYPAL_ORDER",
            "paymentMethodConfigId": self.config_id,
            "paypalOrderId": created.order_id,
        });
        let token = self.client.tokenize(&TokenizationRequest::checkout(payload)).await?;
        ensure_active(&self.cancel)?;

        let response = self.client.create_payment(&token.token).await?;
        settle_or_park(&response, &self.pending_payment)
    }

    async fn submit_vault(&self) -> Result<PaymentOutcome, CheckoutError> {
        let (return_url, cancel_url) = self.return_urls()?;
        let agreement = self
            .client
            .create_billing_agreement(&CreateBillingAgreementRequest {
                payment_method_config_id: self.config_id.clone(),
                return_url,
                cancel_url,
            })
            .await?;
        ensure_active(&self.cancel)?;

        self.approve(&agreement.approval_url).await?;
        ensure_active(&self.cancel)?;

        let confirmed = self
            .client
            .confirm_billing_agreement(&ConfirmBillingAgreementRequest {
                payment_method_config_id: self.config_id.clone(),
                token_id: agreement.token_id,
            })
            .await?;
        ensure_active(&self.cancel)?;

        let payload = serde_json::json!({
            "type": "PAYPAL_BILLING_AGREEMENT",
            "paymentMethodConfigId": self.config_id,
            "paypalBillingAgreementId": confirmed.billing_agreement_id,
            "externalPayerInfo": confirmed.external_payer_info,
        });
        let token = self.client.tokenize(&TokenizationRequest::vault(payload)).await?;
        Ok(PaymentOutcome::success(token.token))
    }
}

impl Tokenizer for OAuthTokenizer {
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
            match self.ctx.intent() {
                SessionIntent::Checkout => self.submit_checkout().await,
                SessionIntent::Vault => self.submit_vault().await,
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
    use crate::external::NoInstalledApps;
    use crate::testutil::{descriptor, session_context, test_client};
    use async_trait::async_trait;
    use payrail::config::{OrderSummary, PaymentMethodConfig, method_types};
    use payrail::tokenizer::PaymentStatus;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct InstantReturn;

    #[async_trait]
    impl WebAuthenticator for InstantReturn {
        async fn authenticate(&self, _url: &Url, _channel: AuthChannel) -> Result<(), CheckoutError> {
            Ok(())
        }
    }

    fn tokenizer(server: &MockServer, intent: SessionIntent) -> OAuthTokenizer {
        let ctx = session_context(server, intent);
        ctx.set_config(PaymentMethodConfig::new(vec![]).with_order(OrderSummary {
            amount: 4_999,
            currency_code: "EUR".into(),
        }));
        let client = test_client(&ctx);
        let (events, _rx) = tokio::sync::broadcast::channel(8);
        OAuthTokenizer::new(
            ctx,
            client,
            &descriptor(method_types::PAYPAL),
            events,
            Arc::new(InstantReturn),
            Arc::new(NoInstalledApps),
        )
    }

    #[tokio::test]
    async fn checkout_creates_an_order_and_pays_with_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/paypal/orders"))
            .and(body_partial_json(serde_json::json!({
                "amount": 4999,
                "currencyCode": "EUR"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "orderId": "order-1",
                "approvalUrl": "https://provider.example.com/approve/order-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payment-instruments"))
            .and(body_partial_json(serde_json::json!({
                "paymentInstrument": { "paypalOrderId": "order-1" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "instr-5"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pay-5",
                "status": "AUTHORIZED"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tok = tokenizer(&server, SessionIntent::Checkout);
        let outcome = tok.submit().await.unwrap();
        assert_eq!(outcome.payment_id, "pay-5");
        assert_eq!(outcome.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn vault_confirms_the_agreement_and_skips_payment_creation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/paypal/billing-agreements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tokenId": "ba-token-1",
                "approvalUrl": "https://provider.example.com/approve/ba-token-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/paypal/billing-agreements/confirm"))
            .and(body_partial_json(serde_json::json!({ "tokenId": "ba-token-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "billingAgreementId": "ba-1",
                "externalPayerInfo": { "externalPayerId": "payer-9" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payment-instruments"))
            .and(body_partial_json(serde_json::json!({ "paymentFlow": "VAULT" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "vault-9"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tok = tokenizer(&server, SessionIntent::Vault);
        let outcome = tok.submit().await.unwrap();
        assert_eq!(outcome.payment_id, "vault-9");
    }

    #[tokio::test]
    async fn checkout_without_order_details_fails_locally() {
        let server = MockServer::start().await;
        let ctx = session_context(&server, SessionIntent::Checkout);
        let client = test_client(&ctx);
        let (events, _rx) = tokio::sync::broadcast::channel(8);
        let tok = OAuthTokenizer::new(
            ctx,
            client,
            &descriptor(method_types::PAYPAL),
            events,
            Arc::new(InstantReturn),
            Arc::new(NoInstalledApps),
        );
        let err = tok.submit().await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidInput { ref code, .. } if code == "missing-order-details"
        ));
    }
}
