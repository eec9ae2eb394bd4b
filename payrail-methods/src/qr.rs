//! Scan-to-pay QR methods (PayNow-style).
//!
//! Submit tokenizes an off-session instrument and creates the payment; the
//! backend answers pending with a continuation token whose payload carries
//! the QR code and the status URL. The QR is pushed to the UI and the status
//! URL is polled until the user's banking app confirms, then the payment is
//! resumed.

use std::sync::{Arc, Mutex};

use payrail::config::PaymentMethodDescriptor;
use payrail::context::SessionContext;
use payrail::error::CheckoutError;
use payrail::tokenizer::{
    BoxFuture, EventSink, InputField, MethodEvent, PaymentOutcome, Selection, Tokenizer,
};
use payrail_http::ApiClient;
use payrail_http::types::TokenizationRequest;
use tokio_util::sync::CancellationToken;

use crate::support::{decode_continuation, ensure_active, poll_and_resume, settle_or_park};

/// Tokenizer for scan-to-pay QR methods.
pub struct QrTokenizer {
    ctx: Arc<SessionContext>,
    client: ApiClient,
    events: EventSink,
    cancel: CancellationToken,
    method_type: String,
    config_id: String,
    pending_payment: Mutex<Option<String>>,
}

impl std::fmt::Debug for QrTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrTokenizer")
            .field("method_type", &self.method_type)
            .finish_non_exhaustive()
    }
}

impl QrTokenizer {
    /// Creates a QR tokenizer for one attempt.
    #[must_use]
    pub fn new(
        ctx: Arc<SessionContext>,
        client: ApiClient,
        descriptor: &PaymentMethodDescriptor,
        events: EventSink,
    ) -> Self {
        Self {
            ctx,
            client,
            events,
            cancel: CancellationToken::new(),
            method_type: descriptor.method_type.clone(),
            config_id: descriptor.id.clone(),
            pending_payment: Mutex::new(None),
        }
    }
}

impl Tokenizer for QrTokenizer {
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
            let payload = serde_json::json!({
                "type": "OFF_SESSION_PAYMENT",
                "paymentMethodType": self.method_type,
                "paymentMethodConfigId": self.config_id,
                "sessionInfo": { "platform": "MOBILE" },
            });
            let token = self.client.tokenize(&TokenizationRequest::checkout(payload)).await?;
            ensure_active(&self.cancel)?;

            let response = self.client.create_payment(&token.token).await?;
            ensure_active(&self.cancel)?;
            let outcome = settle_or_park(&response, &self.pending_payment)?;
            if outcome.status != payrail::tokenizer::PaymentStatus::Pending {
                return Ok(outcome);
            }

            let continuation = decode_continuation(response.required_action.as_ref())?;
            let qr = continuation
                .qr_code
                .or_else(|| self.ctx.token().qr_code.clone())
                .ok_or_else(|| CheckoutError::Decode {
                    message: "continuation token carries no QR payload".into(),
                })?;
            let status_url = continuation.status_url.ok_or_else(|| CheckoutError::Decode {
                message: "continuation token carries no status URL".into(),
            })?;
            let _ = self.events.send(MethodEvent::QrCodeReady { payload: qr });

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
    use crate::testutil::{continuation_token, descriptor, session_context, test_client};
    use payrail::config::method_types;
    use payrail::session::SessionIntent;
    use payrail::tokenizer::PaymentStatus;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn qr_payload_is_emitted_then_payment_resumes() {
        let server = MockServer::start().await;
        let continuation = continuation_token(&serde_json::json!({
            "accessToken": "cont-1",
            "exp": u64::MAX,
            "qrCode": "PAYNOW-QR-DATA",
            "statusUrl": format!("{}/resume-tokens/check-9", server.uri()),
        }));
        Mock::given(method("POST"))
            .and(path("/payment-instruments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "instr-1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pay-3",
                "status": "PENDING",
                "requiredAction": { "name": "PAYMENT_METHOD_VOUCHER", "clientToken": continuation }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/resume-tokens/check-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "resume-3",
                "status": "COMPLETE"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payments/pay-3/resume"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pay-3",
                "status": "SETTLED"
            })))
            .mount(&server)
            .await;

        let ctx = session_context(&server, SessionIntent::Checkout);
        let client = test_client(&ctx);
        let (events, mut rx) = tokio::sync::broadcast::channel(8);
        let tok = QrTokenizer::new(ctx, client, &descriptor(method_types::XFERS_PAYNOW), events);

        let outcome = tok.submit().await.unwrap();
        assert_eq!(outcome.status, PaymentStatus::Success);
        assert!(matches!(
            rx.try_recv().unwrap(),
            MethodEvent::QrCodeReady { ref payload } if payload == "PAYNOW-QR-DATA"
        ));
    }
}
