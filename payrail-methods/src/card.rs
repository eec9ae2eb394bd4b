//! Raw card entry.
//!
//! Buffers the card fields as the user types, keeps the candidate networks
//! current through the debounced [`CardNetworkResolver`], and on submit runs
//! the full blur-phase validation before anything touches the network. A
//! card payment either settles directly or parks in a pending state when the
//! backend demands 3DS, in which case `resume` completes it.

use std::sync::{Arc, Mutex};

use payrail::cardnet::CardNetwork;
use payrail::config::PaymentMethodDescriptor;
use payrail::context::SessionContext;
use payrail::error::CheckoutError;
use payrail::session::SessionIntent;
use payrail::tokenizer::{
    BoxFuture, EventSink, InputField, PaymentOutcome, Selection, Tokenizer,
};
use payrail::validate::{
    CardNumberRule, CardholderNameRule, CvvRule, ExpiryRule, InputPhase, ValidationRule, Validator,
    parse_expiry,
};
use payrail_http::ApiClient;
use payrail_http::types::TokenizationRequest;
use tokio_util::sync::CancellationToken;

use crate::resolver::{BinLookup, CardNetworkResolver};
use crate::support::{ensure_active, settle_or_park};

#[derive(Default)]
struct CardInput {
    number: String,
    expiry: String,
    cvv: String,
    cardholder_name: String,
    postal_code: String,
}

/// Tokenizer for directly entered card details.
pub struct RawCardTokenizer {
    ctx: Arc<SessionContext>,
    client: ApiClient,
    cancel: CancellationToken,
    resolver: CardNetworkResolver,
    input: Mutex<CardInput>,
    selected_network: Mutex<Option<CardNetwork>>,
    pending_payment: Mutex<Option<String>>,
}

impl std::fmt::Debug for RawCardTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawCardTokenizer").finish_non_exhaustive()
    }
}

impl RawCardTokenizer {
    /// Creates a card tokenizer for one attempt.
    #[must_use]
    pub fn new(
        ctx: Arc<SessionContext>,
        client: ApiClient,
        _descriptor: &PaymentMethodDescriptor,
        events: EventSink,
    ) -> Self {
        let lookup: Arc<dyn BinLookup> = Arc::new(client.clone());
        Self {
            ctx,
            client,
            cancel: CancellationToken::new(),
            resolver: CardNetworkResolver::new(lookup).with_events(events),
            input: Mutex::new(CardInput::default()),
            selected_network: Mutex::new(None),
            pending_payment: Mutex::new(None),
        }
    }

    /// The resolver driving candidate-network updates, for UI subscription.
    #[must_use]
    pub const fn resolver(&self) -> &CardNetworkResolver {
        &self.resolver
    }

    /// Checks one field under the interaction-phase policy, for live UI
    /// feedback.
    #[must_use]
    pub fn check_field(
        &self,
        field: InputField,
        value: &str,
        phase: InputPhase,
    ) -> payrail::validate::ValidationResult {
        let network = self.effective_network();
        let rule: Box<dyn ValidationRule> = match field {
            InputField::CardNumber => Box::new(CardNumberRule { network }),
            InputField::ExpiryDate => Box::new(ExpiryRule::new()),
            InputField::Cvv => Box::new(CvvRule { network }),
            _ => Box::new(CardholderNameRule),
        };
        Validator::check(value, rule.as_ref(), phase)
    }

    fn effective_network(&self) -> Option<CardNetwork> {
        let selected = *self
            .selected_network
            .lock()
            .expect("selected network lock poisoned");
        selected.or_else(|| self.resolver.networks().borrow().first().copied())
    }

    fn validate_for_submit(&self) -> Result<(), CheckoutError> {
        let input = self.input.lock().expect("card input lock poisoned");
        let network = self.effective_network();
        let checks: [(&str, &str, Box<dyn ValidationRule>); 4] = [
            ("cardNumber", &input.number, Box::new(CardNumberRule { network })),
            ("expiryDate", &input.expiry, Box::new(ExpiryRule::new())),
            ("cvv", &input.cvv, Box::new(CvvRule { network })),
            (
                "cardholderName",
                &input.cardholder_name,
                Box::new(CardholderNameRule),
            ),
        ];
        for (field, value, rule) in checks {
            let result = Validator::check(value, rule.as_ref(), InputPhase::Blur);
            if !result.is_valid {
                return Err(CheckoutError::InvalidInput {
                    field: field.to_owned(),
                    code: result.error_code.unwrap_or("required").to_owned(),
                });
            }
        }
        Ok(())
    }

    fn instrument_payload(&self) -> Result<serde_json::Value, CheckoutError> {
        let input = self.input.lock().expect("card input lock poisoned");
        let number: String = input.number.chars().filter(char::is_ascii_digit).collect();
        let (month, year) = split_expiry(&input.expiry)?;
        let mut payload = serde_json::json!({
            "number": number,
            "cvv": input.cvv.trim(),
            "expirationMonth": month,
            "expirationYear": year,
            "cardholderName": input.cardholder_name.trim(),
        });
        if !input.postal_code.trim().is_empty() {
            payload["postalCode"] = input.postal_code.trim().into();
        }
        let selected = *self
            .selected_network
            .lock()
            .expect("selected network lock poisoned");
        if let Some(network) = selected {
            payload["preferredNetwork"] = serde_json::to_value(network).map_err(|e| {
                CheckoutError::Decode {
                    message: e.to_string(),
                }
            })?;
        }
        Ok(payload)
    }
}

/// Splits an expiry into zero-padded month and four-digit year, accepting
/// exactly the formats [`ExpiryRule`] accepts.
fn split_expiry(value: &str) -> Result<(String, String), CheckoutError> {
    let (month, year) = parse_expiry(value).ok_or_else(|| CheckoutError::InvalidInput {
        field: "expiryDate".to_owned(),
        code: "invalid-expiry-date".to_owned(),
    })?;
    Ok((format!("{month:02}"), year.to_string()))
}

impl Tokenizer for RawCardTokenizer {
    fn method_type(&self) -> &str {
        payrail::config::method_types::PAYMENT_CARD
    }

    fn start(&self) -> BoxFuture<'_, Result<(), CheckoutError>> {
        Box::pin(async { Ok(()) })
    }

    fn update_field(&self, field: InputField, value: &str) -> Result<(), CheckoutError> {
        let mut input = self.input.lock().expect("card input lock poisoned");
        match field {
            InputField::CardNumber => {
                input.number = value.to_owned();
                drop(input);
                self.resolver.update(value);
            }
            InputField::ExpiryDate => input.expiry = value.to_owned(),
            InputField::Cvv => input.cvv = value.to_owned(),
            InputField::CardholderName => input.cardholder_name = value.to_owned(),
            InputField::PostalCode => input.postal_code = value.to_owned(),
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
        match selection {
            Selection::Network(network) => {
                *self
                    .selected_network
                    .lock()
                    .expect("selected network lock poisoned") = Some(network);
                Ok(())
            }
            other => Err(CheckoutError::InvalidInput {
                field: format!("{other:?}"),
                code: "unsupported-selection".to_owned(),
            }),
        }
    }

    fn submit(&self) -> BoxFuture<'_, Result<PaymentOutcome, CheckoutError>> {
        Box::pin(async move {
            ensure_active(&self.cancel)?;
            self.validate_for_submit()?;
            let payload = self.instrument_payload()?;

            let request = match self.ctx.intent() {
                SessionIntent::Vault => TokenizationRequest::vault(payload),
                SessionIntent::Checkout => TokenizationRequest::checkout(payload),
            };
            let token = self.client.tokenize(&request).await?;
            ensure_active(&self.cancel)?;

            if self.ctx.intent() == SessionIntent::Vault {
                // Vaulting ends at the stored instrument; no payment exists.
                return Ok(PaymentOutcome::success(token.token));
            }

            let response = self.client.create_payment(&token.token).await?;
            ensure_active(&self.cancel)?;
            settle_or_park(&response, &self.pending_payment)
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
            ensure_active(&self.cancel)?;
            settle_or_park(&response, &self.pending_payment)
        })
    }

    fn cancel(&self) {
        self.cancel.cancel();
        self.resolver.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{card_descriptor, session_context, test_client};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tokenizer(server: &MockServer, intent: SessionIntent) -> RawCardTokenizer {
        let ctx = session_context(server, intent);
        let client = test_client(&ctx);
        let (events, _rx) = tokio::sync::broadcast::channel(8);
        RawCardTokenizer::new(ctx, client, &card_descriptor(), events)
    }

    fn fill_valid(tok: &RawCardTokenizer) {
        tok.update_field(InputField::CardNumber, "4242 4242 4242 4242").unwrap();
        tok.update_field(InputField::ExpiryDate, "12/2031").unwrap();
        tok.update_field(InputField::Cvv, "123").unwrap();
        tok.update_field(InputField::CardholderName, "Jo Smith").unwrap();
    }

    #[tokio::test]
    async fn submit_rejects_invalid_number_before_any_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tok = tokenizer(&server, SessionIntent::Checkout);
        tok.update_field(InputField::CardNumber, "4242 4242 4242 4243").unwrap();
        tok.update_field(InputField::ExpiryDate, "12/2031").unwrap();
        tok.update_field(InputField::Cvv, "123").unwrap();
        tok.update_field(InputField::CardholderName, "Jo Smith").unwrap();

        let err = tok.submit().await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidInput { ref field, .. } if field == "cardNumber"
        ));
    }

    #[tokio::test]
    async fn checkout_submit_tokenizes_then_creates_a_payment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment-instruments"))
            .and(body_partial_json(serde_json::json!({
                "paymentInstrument": {
                    "number": "4242424242424242",
                    "expirationMonth": "12",
                    "expirationYear": "2031"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "instr-1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .and(body_partial_json(serde_json::json!({ "paymentMethodToken": "instr-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pay-1",
                "status": "SETTLED"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tok = tokenizer(&server, SessionIntent::Checkout);
        fill_valid(&tok);
        let outcome = tok.submit().await.unwrap();
        assert_eq!(outcome.payment_id, "pay-1");
        assert!(matches!(
            outcome.status,
            payrail::tokenizer::PaymentStatus::Success
        ));
    }

    #[tokio::test]
    async fn vault_submit_stops_after_tokenization() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment-instruments"))
            .and(body_partial_json(serde_json::json!({ "paymentFlow": "VAULT" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "vault-token-1"
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
        fill_valid(&tok);
        let outcome = tok.submit().await.unwrap();
        assert_eq!(outcome.payment_id, "vault-token-1");
    }

    #[tokio::test]
    async fn cancelled_attempt_never_submits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tok = tokenizer(&server, SessionIntent::Checkout);
        fill_valid(&tok);
        tok.cancel();
        let err = tok.submit().await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[test]
    fn expiry_splitting_pads_and_expands() {
        assert_eq!(
            split_expiry("3/27").unwrap(),
            ("03".to_owned(), "2027".to_owned())
        );
        assert_eq!(
            split_expiry("12/2031").unwrap(),
            ("12".to_owned(), "2031".to_owned())
        );
        assert!(split_expiry("13/27").is_err());
        assert!(split_expiry("1227").is_err());
    }

    #[test]
    fn expiry_splitting_matches_the_validation_rule() {
        // Epoch clock: nothing is in the past, so only the shape matters.
        let rule = ExpiryRule::at(0);
        for raw in ["3/27", "12/2031", " 06 / 29 ", "13/27", "12/031", "1227"] {
            assert_eq!(
                rule.validate(raw).is_valid,
                split_expiry(raw).is_ok(),
                "format disagreement on {raw:?}"
            );
        }
    }
}
