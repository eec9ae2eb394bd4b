//! Bank-selector redirect methods.
//!
//! `start` fetches the issuer list and pushes it to the UI; the user picks a
//! bank; `submit` tokenizes with that issuer and then runs the same
//! hand-off/poll/resume chain as any other redirect method.

use std::sync::{Arc, Mutex};

use payrail::config::PaymentMethodDescriptor;
use payrail::context::SessionContext;
use payrail::error::CheckoutError;
use payrail::tokenizer::{
    BankItem, BoxFuture, EventSink, InputField, MethodEvent, PaymentOutcome, Selection, Tokenizer,
};
use payrail_http::ApiClient;
use payrail_http::types::{BankListRequest, TokenizationRequest};
use tokio_util::sync::CancellationToken;

use crate::external::{AppAvailability, AuthChannel, WebAuthenticator};
use crate::support::{decode_continuation, ensure_active, poll_and_resume, settle_or_park};

/// Tokenizer for bank-selector redirect methods.
pub struct BankSelectorTokenizer {
    client: ApiClient,
    events: EventSink,
    cancel: CancellationToken,
    method_type: String,
    config_id: String,
    /// Issuer-list key derived from the method type (e.g. `"ideal"`).
    issuer_kind: String,
    web: Arc<dyn WebAuthenticator>,
    apps: Arc<dyn AppAvailability>,
    banks: Mutex<Vec<BankItem>>,
    selected_bank: Mutex<Option<String>>,
    pending_payment: Mutex<Option<String>>,
}

impl std::fmt::Debug for BankSelectorTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankSelectorTokenizer")
            .field("method_type", &self.method_type)
            .finish_non_exhaustive()
    }
}

fn issuer_kind_for(method_type: &str) -> String {
    // ADYEN_IDEAL -> "ideal"; unknown types fall back to the raw key.
    method_type
        .rsplit_once('_')
        .map_or_else(|| method_type.to_ascii_lowercase(), |(_, kind)| kind.to_ascii_lowercase())
}

impl BankSelectorTokenizer {
    /// Creates a bank-selector tokenizer for one attempt.
    #[must_use]
    pub fn new(
        _ctx: Arc<SessionContext>,
        client: ApiClient,
        descriptor: &PaymentMethodDescriptor,
        events: EventSink,
        web: Arc<dyn WebAuthenticator>,
        apps: Arc<dyn AppAvailability>,
    ) -> Self {
        Self {
            client,
            events,
            cancel: CancellationToken::new(),
            method_type: descriptor.method_type.clone(),
            config_id: descriptor.id.clone(),
            issuer_kind: issuer_kind_for(&descriptor.method_type),
            web,
            apps,
            banks: Mutex::new(Vec::new()),
            selected_bank: Mutex::new(None),
            pending_payment: Mutex::new(None),
        }
    }

    /// The fetched issuer list, for direct UI access.
    #[must_use]
    pub fn banks(&self) -> Vec<BankItem> {
        self.banks.lock().expect("bank list lock poisoned").clone()
    }
}

impl Tokenizer for BankSelectorTokenizer {
    fn method_type(&self) -> &str {
        &self.method_type
    }

    fn start(&self) -> BoxFuture<'_, Result<(), CheckoutError>> {
        Box::pin(async move {
            ensure_active(&self.cancel)?;
            let response = self
                .client
                .list_banks(&BankListRequest {
                    payment_method_config_id: self.config_id.clone(),
                    payment_method: self.issuer_kind.clone(),
                })
                .await?;
            ensure_active(&self.cancel)?;
            let banks = response.bank_items();
            *self.banks.lock().expect("bank list lock poisoned") = banks.clone();
            let _ = self.events.send(MethodEvent::BanksLoaded(banks));
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
        let Selection::Bank(id) = selection else {
            return Err(CheckoutError::InvalidInput {
                field: format!("{selection:?}"),
                code: "unsupported-selection".to_owned(),
            });
        };
        let known = self
            .banks
            .lock()
            .expect("bank list lock poisoned")
            .iter()
            .any(|bank| bank.id == id);
        if !known {
            return Err(CheckoutError::InvalidInput {
                field: "bank".to_owned(),
                code: "unknown-bank".to_owned(),
            });
        }
        *self.selected_bank.lock().expect("bank selection lock poisoned") = Some(id);
        Ok(())
    }

    fn submit(&self) -> BoxFuture<'_, Result<PaymentOutcome, CheckoutError>> {
        Box::pin(async move {
            ensure_active(&self.cancel)?;
            let issuer = self
                .selected_bank
                .lock()
                .expect("bank selection lock poisoned")
                .clone()
                .ok_or_else(|| CheckoutError::InvalidInput {
                    field: "bank".to_owned(),
                    code: "no-bank-selected".to_owned(),
                })?;

            let payload = serde_json::json!({
                "type": "OFF_SESSION_PAYMENT",
                "paymentMethodType": self.method_type,
                "paymentMethodConfigId": self.config_id,
                "sessionInfo": { "platform": "MOBILE", "issuer": issuer },
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
            let redirect_url = continuation.redirect_url.ok_or_else(|| {
                CheckoutError::Decode {
                    message: "continuation token carries no redirect URL".into(),
                }
            })?;
            let status_url = continuation.status_url.ok_or_else(|| CheckoutError::Decode {
                message: "continuation token carries no status URL".into(),
            })?;

            let channel = if self.apps.can_open(&self.issuer_kind).await {
                AuthChannel::NativeApp
            } else {
                AuthChannel::Browser
            };
            let _ = self
                .events
                .send(MethodEvent::RedirectRequested { url: redirect_url.clone() });
            tokio::select! {
                () = self.cancel.cancelled() => return Err(CheckoutError::UserCancelled),
                result = self.web.authenticate(&redirect_url, channel) => result?,
            }

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
    use crate::testutil::{descriptor, session_context, test_client};
    use async_trait::async_trait;
    use payrail::config::method_types;
    use payrail::session::SessionIntent;
    use url::Url;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct InstantReturn;

    #[async_trait]
    impl WebAuthenticator for InstantReturn {
        async fn authenticate(&self, _url: &Url, _channel: AuthChannel) -> Result<(), CheckoutError> {
            Ok(())
        }
    }

    fn tokenizer(server: &MockServer) -> BankSelectorTokenizer {
        let ctx = session_context(server, SessionIntent::Checkout);
        let client = test_client(&ctx);
        let (events, _rx) = tokio::sync::broadcast::channel(8);
        BankSelectorTokenizer::new(
            ctx,
            client,
            &descriptor(method_types::ADYEN_IDEAL),
            events,
            Arc::new(InstantReturn),
            Arc::new(NoInstalledApps),
        )
    }

    async fn mount_bank_list(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/adyen/checkout"))
            .and(body_partial_json(serde_json::json!({ "paymentMethod": "ideal" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [
                    { "id": "ing", "name": "ING" },
                    { "id": "rabo", "name": "Rabobank" }
                ]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn start_loads_banks_and_select_validates_membership() {
        let server = MockServer::start().await;
        mount_bank_list(&server).await;

        let tok = tokenizer(&server);
        tok.start().await.unwrap();
        assert_eq!(tok.banks().len(), 2);

        assert!(tok.select(Selection::Bank("ing".into())).is_ok());
        let err = tok.select(Selection::Bank("nonexistent".into())).unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidInput { ref code, .. } if code == "unknown-bank"
        ));
    }

    #[tokio::test]
    async fn submit_without_a_selection_is_rejected() {
        let server = MockServer::start().await;
        mount_bank_list(&server).await;

        let tok = tokenizer(&server);
        tok.start().await.unwrap();
        let err = tok.submit().await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidInput { ref code, .. } if code == "no-bank-selected"
        ));
    }
}
