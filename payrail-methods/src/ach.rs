//! ACH bank-debit collection.
//!
//! Collects the account holder's name and email, tokenizes, and creates the
//! payment. The backend answers pending with a continuation whose client
//! secret drives the mandate confirmation in the host app; the secret is
//! pushed to the UI and the status URL is polled until the mandate is
//! accepted.

use std::sync::{Arc, Mutex};

use payrail::config::PaymentMethodDescriptor;
use payrail::context::SessionContext;
use payrail::error::CheckoutError;
use payrail::tokenizer::{
    BoxFuture, EventSink, InputField, MethodEvent, PaymentOutcome, Selection, Tokenizer,
};
use payrail::validate::{InputPhase, RequiredFieldRule, Validator};
use payrail_http::ApiClient;
use payrail_http::types::TokenizationRequest;
use tokio_util::sync::CancellationToken;

use crate::support::{decode_continuation, ensure_active, poll_and_resume, settle_or_park};

#[derive(Default)]
struct UserDetails {
    first_name: String,
    last_name: String,
    email_address: String,
}

/// Tokenizer for ACH bank-debit methods.
pub struct AchTokenizer {
    ctx: Arc<SessionContext>,
    client: ApiClient,
    events: EventSink,
    cancel: CancellationToken,
    method_type: String,
    config_id: String,
    details: Mutex<UserDetails>,
    pending_payment: Mutex<Option<String>>,
}

impl std::fmt::Debug for AchTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AchTokenizer")
            .field("method_type", &self.method_type)
            .finish_non_exhaustive()
    }
}

impl AchTokenizer {
    /// Creates an ACH tokenizer for one attempt.
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
            details: Mutex::new(UserDetails::default()),
            pending_payment: Mutex::new(None),
        }
    }

    fn validate_details(&self) -> Result<(), CheckoutError> {
        let details = self.details.lock().expect("user details lock poisoned");
        let checks = [
            ("firstName", details.first_name.as_str()),
            ("lastName", details.last_name.as_str()),
            ("emailAddress", details.email_address.as_str()),
        ];
        for (field, value) in checks {
            let rule = RequiredFieldRule::new("required", "This field is required");
            let result = Validator::check(value, &rule, InputPhase::Blur);
            if !result.is_valid {
                return Err(CheckoutError::InvalidInput {
                    field: field.to_owned(),
                    code: "required".to_owned(),
                });
            }
        }
        if !details.email_address.contains('@') {
            return Err(CheckoutError::InvalidInput {
                field: "emailAddress".to_owned(),
                code: "invalid-email".to_owned(),
            });
        }
        Ok(())
    }
}

impl Tokenizer for AchTokenizer {
    fn method_type(&self) -> &str {
        &self.method_type
    }

    fn start(&self) -> BoxFuture<'_, Result<(), CheckoutError>> {
        Box::pin(async { Ok(()) })
    }

    fn update_field(&self, field: InputField, value: &str) -> Result<(), CheckoutError> {
        let mut details = self.details.lock().expect("user details lock poisoned");
        match field {
            InputField::FirstName => details.first_name = value.to_owned(),
            InputField::LastName => details.last_name = value.to_owned(),
            InputField::EmailAddress => details.email_address = value.to_owned(),
            other => {
                return Err(CheckoutError::InvalidInput {
                    field: format!("{other:?}"),
                    code: "unsupported-field".to_owned(),
                });
            }
        }
        Ok(())
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
            self.validate_details()?;
            let payload = {
                let details = self.details.lock().expect("user details lock poisoned");
                serde_json::json!({
                    "type": "AUTOMATED_CLEARING_HOUSE",
                    "paymentMethodConfigId": self.config_id,
                    "authenticationProvider": "STRIPE",
                    "userDetails": {
                        "firstName": details.first_name.trim(),
                        "lastName": details.last_name.trim(),
                        "emailAddress": details.email_address.trim(),
                    },
                })
            };
            let token = self.client.tokenize(&TokenizationRequest::checkout(payload)).await?;
            ensure_active(&self.cancel)?;

            let response = self.client.create_payment(&token.token).await?;
            ensure_active(&self.cancel)?;
            let outcome = settle_or_park(&response, &self.pending_payment)?;
            if outcome.status != payrail::tokenizer::PaymentStatus::Pending {
                return Ok(outcome);
            }

            let continuation = decode_continuation(response.required_action.as_ref())?;
            let client_secret = continuation
                .stripe_client_secret
                .or_else(|| self.ctx.token().stripe_client_secret.clone())
                .ok_or_else(|| CheckoutError::Decode {
                    message: "continuation token carries no mandate client secret".into(),
                })?;
            let status_url = continuation.status_url.ok_or_else(|| CheckoutError::Decode {
                message: "continuation token carries no status URL".into(),
            })?;
            let _ = self.events.send(MethodEvent::MandateReady { client_secret });

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

    fn tokenizer(server: &MockServer) -> AchTokenizer {
        let ctx = session_context(server, SessionIntent::Checkout);
        let client = test_client(&ctx);
        let (events, _rx) = tokio::sync::broadcast::channel(8);
        AchTokenizer::new(ctx, client, &descriptor(method_types::STRIPE_ACH), events)
    }

    #[tokio::test]
    async fn missing_details_fail_before_any_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tok = tokenizer(&server);
        tok.update_field(InputField::FirstName, "Sam").unwrap();
        let err = tok.submit().await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidInput { ref field, .. } if field == "lastName"
        ));
    }

    #[tokio::test]
    async fn invalid_email_is_rejected() {
        let server = MockServer::start().await;
        let tok = tokenizer(&server);
        tok.update_field(InputField::FirstName, "Sam").unwrap();
        tok.update_field(InputField::LastName, "Lee").unwrap();
        tok.update_field(InputField::EmailAddress, "not-an-email").unwrap();
        let err = tok.submit().await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidInput { ref code, .. } if code == "invalid-email"
        ));
    }

    #[tokio::test]
    async fn mandate_secret_is_emitted_then_payment_resumes() {
        let server = MockServer::start().await;
        let continuation = continuation_token(&serde_json::json!({
            "accessToken": "cont-1",
            "exp": u64::MAX,
            "stripeClientSecret": "seti_123_secret",
            "statusUrl": format!("{}/resume-tokens/check-4", server.uri()),
        }));
        Mock::given(method("POST"))
            .and(path("/payment-instruments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "instr-4"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pay-4",
                "status": "PENDING",
                "requiredAction": { "name": "PAYMENT_METHOD_MANDATE", "clientToken": continuation }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/resume-tokens/check-4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "resume-4",
                "status": "COMPLETE"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payments/pay-4/resume"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pay-4",
                "status": "SETTLED"
            })))
            .mount(&server)
            .await;

        let tok = tokenizer(&server);
        tok.update_field(InputField::FirstName, "Sam").unwrap();
        tok.update_field(InputField::LastName, "Lee").unwrap();
        tok.update_field(InputField::EmailAddress, "sam@example.com").unwrap();

        let mut rx = tok.events.subscribe();
        let outcome = tok.submit().await.unwrap();
        assert_eq!(outcome.status, PaymentStatus::Success);
        assert!(matches!(
            rx.try_recv().unwrap(),
            MethodEvent::MandateReady { ref client_secret } if client_secret == "seti_123_secret"
        ));
    }
}
