//! Wire request/response shapes.
//!
//! All backend payloads are camelCase JSON. Response types stay close to the
//! wire and expose small conversion helpers into the core domain types
//! instead of leaking wire details upward.

use payrail::cardnet::CardNetwork;
use payrail::tokenizer::{BankItem, PaymentCategory, PaymentOutcome, PaymentStatus};
use serde::{Deserialize, Serialize};
use url::Url;

/// One network entry from the BIN data service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinNetworkEntry {
    /// Wire network identifier (e.g. `"VISA"`, `"CARTES_BANCAIRES"`).
    pub value: String,
    /// Display name, when the service provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Response of the BIN network lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinNetworksResponse {
    /// Candidate networks for the queried prefix, most likely first.
    #[serde(default)]
    pub networks: Vec<BinNetworkEntry>,
}

impl BinNetworksResponse {
    /// Maps the wire entries into typed networks.
    #[must_use]
    pub fn card_networks(&self) -> Vec<CardNetwork> {
        self.networks
            .iter()
            .map(|entry| CardNetwork::from_wire(&entry.value))
            .collect()
    }
}

/// Request body for tokenizing a payment instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenizationRequest {
    /// Method-specific instrument payload.
    pub payment_instrument: serde_json::Value,
    /// `"VAULT"` when the instrument should be stored for later use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_flow: Option<String>,
}

impl TokenizationRequest {
    /// A one-off checkout tokenization.
    #[must_use]
    pub const fn checkout(payment_instrument: serde_json::Value) -> Self {
        Self {
            payment_instrument,
            payment_flow: None,
        }
    }

    /// A vaulting tokenization.
    #[must_use]
    pub fn vault(payment_instrument: serde_json::Value) -> Self {
        Self {
            payment_instrument,
            payment_flow: Some("VAULT".to_owned()),
        }
    }
}

/// A tokenized payment instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstrumentToken {
    /// The single-use (or vaulted) instrument token.
    pub token: String,
    /// Instrument type reported by the tokenization service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_instrument_type: Option<String>,
    /// Token lifetime class (`SINGLE_USE` / `MULTI_USE`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Correlation id for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics_id: Option<String>,
}

/// Request body for creating a payment from an instrument token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// The tokenized instrument to pay with.
    pub payment_method_token: String,
}

/// Request body for resuming a pending payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePaymentRequest {
    /// The resume token obtained from polling or a redirect return.
    pub resume_token: String,
}

/// Follow-up action demanded by the backend before a payment can settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredAction {
    /// Action name (e.g. `"3DS_AUTHENTICATION"`, `"PROCESSOR_3DS"`).
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fresh client token carrying the continuation URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
}

/// Backend payment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentWireStatus {
    /// Needs a resume step.
    Pending,
    /// Authorized but not yet captured.
    Authorized,
    /// Captured.
    Settled,
    /// Successful (aggregate status used by some processors).
    Success,
    /// Declined by the processor.
    Declined,
    /// Failed terminally.
    Failed,
    /// Cancelled upstream.
    Cancelled,
    /// Any status this SDK version does not know.
    #[serde(other)]
    Unknown,
}

impl PaymentWireStatus {
    /// Collapses the wire status into the three-way attempt status.
    #[must_use]
    pub const fn attempt_status(self) -> PaymentStatus {
        match self {
            Self::Authorized | Self::Settled | Self::Success => PaymentStatus::Success,
            Self::Pending => PaymentStatus::Pending,
            Self::Declined | Self::Failed | Self::Cancelled | Self::Unknown => {
                PaymentStatus::Failed
            }
        }
    }
}

/// Response of payment create/resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    /// Backend payment identifier.
    pub id: String,
    /// Lifecycle status.
    pub status: PaymentWireStatus,
    /// Present when the backend demands a continuation before settling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_action: Option<RequiredAction>,
}

impl PaymentResponse {
    /// Converts the response into a protocol-level outcome.
    #[must_use]
    pub fn outcome(&self, resume_url: Option<Url>) -> PaymentOutcome {
        PaymentOutcome {
            payment_id: self.id.clone(),
            status: self.status.attempt_status(),
            resume_url,
        }
    }
}

/// Status reported by the asynchronous-payment poll endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollState {
    /// Keep polling.
    Pending,
    /// Done; the response `id` is the resume token.
    Complete,
    /// Any state this SDK version does not know; treated as pending.
    #[serde(other)]
    Unknown,
}

/// Response of one poll round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollStatusResponse {
    /// The resume token once `status` is `COMPLETE`.
    pub id: String,
    /// Poll state.
    pub status: PollState,
}

/// Request body for creating a Klarna payment session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKlarnaSessionRequest {
    /// Processor configuration to create the session under.
    pub payment_method_config_id: String,
    /// `"HOSTED_PAYMENT_PAGE"` for checkout, `"RECURRING_PAYMENT"` for vault.
    pub session_type: String,
}

/// A Klarna payment session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KlarnaSessionResponse {
    /// Session identifier used on finalize.
    pub session_id: String,
    /// Processor client token handed to the authorization step.
    pub client_token: String,
    /// Selectable payment categories.
    #[serde(default)]
    pub categories: Vec<KlarnaCategoryEntry>,
}

/// One Klarna payment category on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KlarnaCategoryEntry {
    /// Category identifier submitted on authorize.
    pub identifier: String,
    /// Display name.
    pub name: String,
}

impl KlarnaSessionResponse {
    /// Maps the wire categories into the selection type.
    #[must_use]
    pub fn payment_categories(&self) -> Vec<PaymentCategory> {
        self.categories
            .iter()
            .map(|c| PaymentCategory {
                identifier: c.identifier.clone(),
                name: c.name.clone(),
            })
            .collect()
    }
}

/// Request body for finalizing a Klarna session into a customer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeKlarnaSessionRequest {
    /// The session being finalized.
    pub session_id: String,
}

/// A finalized Klarna customer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KlarnaCustomerTokenResponse {
    /// Token referenced when tokenizing the instrument.
    pub customer_token_id: String,
}

/// Request body for creating a PayPal order (one-off checkout).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayPalOrderRequest {
    /// Processor configuration to create the order under.
    pub payment_method_config_id: String,
    /// Amount in minor units.
    pub amount: i64,
    /// ISO 4217 currency code.
    pub currency_code: String,
    /// Where the processor redirects after approval.
    pub return_url: Url,
    /// Where the processor redirects after the user backs out.
    pub cancel_url: Url,
}

/// A created PayPal order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayPalOrderResponse {
    /// Order identifier referenced when tokenizing.
    pub order_id: String,
    /// URL the user must approve the order at.
    pub approval_url: Url,
}

/// Request body for starting a PayPal billing agreement (vault).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBillingAgreementRequest {
    /// Processor configuration to create the agreement under.
    pub payment_method_config_id: String,
    /// Where the processor redirects after approval.
    pub return_url: Url,
    /// Where the processor redirects after the user backs out.
    pub cancel_url: Url,
}

/// A started billing agreement awaiting approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAgreementResponse {
    /// Agreement token confirmed after approval.
    pub token_id: String,
    /// URL the user must approve the agreement at.
    pub approval_url: Url,
}

/// Request body for confirming an approved billing agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmBillingAgreementRequest {
    /// Processor configuration the agreement was created under.
    pub payment_method_config_id: String,
    /// The approved agreement token.
    pub token_id: String,
}

/// Payer identity returned with a confirmed agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayPalPayerInfo {
    /// Processor-side payer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_payer_id: Option<String>,
    /// Payer email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A confirmed billing agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedBillingAgreement {
    /// Agreement identifier referenced when tokenizing.
    pub billing_agreement_id: String,
    /// Payer identity, when the processor shares it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_payer_info: Option<PayPalPayerInfo>,
}

/// Request body for listing bank issuers of a redirect method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankListRequest {
    /// Processor configuration to query.
    pub payment_method_config_id: String,
    /// Scheme-specific bank list key (e.g. `"ideal"`).
    pub payment_method: String,
}

/// One bank issuer on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankEntry {
    /// Issuer identifier submitted on tokenize.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Logo URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url_str: Option<Url>,
}

/// Response of the bank issuer listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankListResponse {
    /// Issuers in backend-provided order.
    #[serde(default)]
    pub result: Vec<BankEntry>,
}

impl BankListResponse {
    /// Maps the wire issuers into the selection type.
    #[must_use]
    pub fn bank_items(&self) -> Vec<BankItem> {
        self.result
            .iter()
            .map(|b| BankItem {
                id: b.id.clone(),
                name: b.name.clone(),
                icon_url: b.icon_url_str.clone(),
            })
            .collect()
    }
}

/// A payment method stored in the customer vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultedPaymentMethod {
    /// Vault record identifier.
    pub id: String,
    /// Instrument type (e.g. `"PAYMENT_CARD"`).
    pub payment_instrument_type: String,
    /// Correlation id for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics_id: Option<String>,
}

/// Response of the vaulted-methods listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultedMethodsResponse {
    /// Stored methods, newest first.
    #[serde(default)]
    pub data: Vec<VaultedPaymentMethod>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_status_collapses_to_attempt_status() {
        assert_eq!(
            PaymentWireStatus::Settled.attempt_status(),
            PaymentStatus::Success
        );
        assert_eq!(
            PaymentWireStatus::Authorized.attempt_status(),
            PaymentStatus::Success
        );
        assert_eq!(
            PaymentWireStatus::Pending.attempt_status(),
            PaymentStatus::Pending
        );
        assert_eq!(
            PaymentWireStatus::Declined.attempt_status(),
            PaymentStatus::Failed
        );
    }

    #[test]
    fn unknown_wire_status_is_failed_not_a_decode_error() {
        let response: PaymentResponse = serde_json::from_value(serde_json::json!({
            "id": "pay-1",
            "status": "PARTIALLY_REFUNDED"
        }))
        .unwrap();
        assert_eq!(response.status, PaymentWireStatus::Unknown);
        assert_eq!(response.outcome(None).status, PaymentStatus::Failed);
    }

    #[test]
    fn bin_networks_map_through_wire_aliases() {
        let response: BinNetworksResponse = serde_json::from_value(serde_json::json!({
            "networks": [
                { "value": "VISA" },
                { "value": "CARTES_BANCAIRES", "displayName": "Cartes Bancaires" }
            ]
        }))
        .unwrap();
        assert_eq!(
            response.card_networks(),
            vec![CardNetwork::Visa, CardNetwork::CartesBancaires]
        );
    }

    #[test]
    fn bank_list_maps_icon_urls() {
        let response: BankListResponse = serde_json::from_value(serde_json::json!({
            "result": [
                { "id": "ing", "name": "ING", "iconUrlStr": "https://cdn.example.com/ing.png" },
                { "id": "rabo", "name": "Rabobank" }
            ]
        }))
        .unwrap();
        let banks = response.bank_items();
        assert_eq!(banks.len(), 2);
        assert!(banks[0].icon_url.is_some());
        assert!(banks[1].icon_url.is_none());
    }

    #[test]
    fn vault_flow_marks_payment_flow() {
        let request = TokenizationRequest::vault(serde_json::json!({ "type": "KLARNA" }));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["paymentFlow"], "VAULT");
        let one_off = TokenizationRequest::checkout(serde_json::json!({}));
        assert!(serde_json::to_value(&one_off).unwrap().get("paymentFlow").is_none());
    }
}
