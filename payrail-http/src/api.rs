//! Concrete backend endpoints.
//!
//! Thin wrappers over [`ApiClient::request`] that build the right URL from
//! the session token's service URLs and hand back typed responses. URL
//! resolution failures surface as [`ApiError::MissingUrl`] /
//! [`ApiError::UrlParse`] before any request is issued.

use payrail::config::PaymentMethodConfig;
use url::Url;

use crate::client::{ApiClient, Endpoint};
use crate::error::ApiError;
use crate::types::{
    BankListRequest, BankListResponse, BillingAgreementResponse, BinNetworksResponse,
    ConfirmBillingAgreementRequest, ConfirmedBillingAgreement, CreateBillingAgreementRequest,
    CreateKlarnaSessionRequest, CreatePayPalOrderRequest, CreatePaymentRequest,
    FinalizeKlarnaSessionRequest, KlarnaCustomerTokenResponse, KlarnaSessionResponse,
    PayPalOrderResponse, PaymentInstrumentToken, PaymentResponse, PollStatusResponse,
    ResumePaymentRequest, TokenizationRequest, VaultedMethodsResponse,
};

/// Longest BIN prefix the lookup service accepts.
pub const MAX_BIN_PREFIX_LEN: usize = 8;

fn require_url(url: Option<&Url>, context: &'static str) -> Result<Url, ApiError> {
    url.cloned().ok_or(ApiError::MissingUrl { context })
}

fn join(base: &Url, path: &str, context: &'static str) -> Result<Url, ApiError> {
    base.join(path)
        .map_err(|source| ApiError::UrlParse { context, source })
}

fn json_body<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|source| ApiError::Decode {
        context: "serialize request body",
        source,
    })
}

impl ApiClient {
    /// Fetches the session's payment method configuration.
    ///
    /// # Errors
    ///
    /// Fails before any network call when the token has expired or carries no
    /// configuration URL.
    pub async fn fetch_configuration(&self) -> Result<PaymentMethodConfig, ApiError> {
        let url = require_url(self.token().configuration_url.as_ref(), "configuration")?;
        self.request(Endpoint::get(url)).await
    }

    /// Looks up the card networks for a BIN prefix.
    ///
    /// The prefix is truncated to [`MAX_BIN_PREFIX_LEN`] digits at this call
    /// boundary; no longer prefix ever reaches the wire.
    ///
    /// # Errors
    ///
    /// Fails when the token carries no BIN data URL or the request fails.
    pub async fn list_card_networks(&self, prefix: &str) -> Result<BinNetworksResponse, ApiError> {
        let prefix: String = prefix
            .chars()
            .filter(char::is_ascii_digit)
            .take(MAX_BIN_PREFIX_LEN)
            .collect();
        let base = require_url(self.token().bindata_url.as_ref(), "bindata")?;
        let url = join(
            &base,
            &format!("v1/bin-data/{prefix}/networks"),
            "bin networks path",
        )?;
        self.request(Endpoint::get(url)).await
    }

    /// Tokenizes a payment instrument.
    ///
    /// # Errors
    ///
    /// Fails when the token carries no PCI URL or the request fails.
    pub async fn tokenize(
        &self,
        request: &TokenizationRequest,
    ) -> Result<PaymentInstrumentToken, ApiError> {
        let base = require_url(self.token().pci_url.as_ref(), "pci")?;
        let url = join(&base, "payment-instruments", "tokenize path")?;
        self.request(Endpoint::post(url, json_body(request)?)).await
    }

    /// Creates a payment from an instrument token.
    ///
    /// # Errors
    ///
    /// Fails when the token carries no core URL or the request fails.
    pub async fn create_payment(
        &self,
        payment_method_token: &str,
    ) -> Result<PaymentResponse, ApiError> {
        let base = require_url(self.token().core_url.as_ref(), "core")?;
        let url = join(&base, "payments", "create payment path")?;
        let body = json_body(&CreatePaymentRequest {
            payment_method_token: payment_method_token.to_owned(),
        })?;
        self.request(Endpoint::post(url, body)).await
    }

    /// Resumes a pending payment with a resume token.
    ///
    /// # Errors
    ///
    /// Fails when the token carries no core URL or the request fails.
    pub async fn resume_payment(
        &self,
        payment_id: &str,
        resume_token: &str,
    ) -> Result<PaymentResponse, ApiError> {
        let base = require_url(self.token().core_url.as_ref(), "core")?;
        let url = join(
            &base,
            &format!("payments/{payment_id}/resume"),
            "resume payment path",
        )?;
        let body = json_body(&ResumePaymentRequest {
            resume_token: resume_token.to_owned(),
        })?;
        self.request(Endpoint::post(url, body)).await
    }

    /// One round trip against an asynchronous-payment status URL.
    ///
    /// # Errors
    ///
    /// Fails when the request fails or the body does not decode.
    pub async fn poll_status(&self, status_url: &Url) -> Result<PollStatusResponse, ApiError> {
        self.request(Endpoint::get(status_url.clone())).await
    }

    /// Creates a Klarna payment session.
    ///
    /// # Errors
    ///
    /// Fails when the token carries no core URL or the request fails.
    pub async fn create_klarna_session(
        &self,
        request: &CreateKlarnaSessionRequest,
    ) -> Result<KlarnaSessionResponse, ApiError> {
        let base = require_url(self.token().core_url.as_ref(), "core")?;
        let url = join(&base, "klarna/payment-sessions", "klarna session path")?;
        self.request(Endpoint::post(url, json_body(request)?)).await
    }

    /// Finalizes an authorized Klarna session into a customer token.
    ///
    /// # Errors
    ///
    /// Fails when the token carries no core URL or the request fails.
    pub async fn finalize_klarna_session(
        &self,
        request: &FinalizeKlarnaSessionRequest,
    ) -> Result<KlarnaCustomerTokenResponse, ApiError> {
        let base = require_url(self.token().core_url.as_ref(), "core")?;
        let url = join(&base, "klarna/customer-tokens", "klarna finalize path")?;
        self.request(Endpoint::post(url, json_body(request)?)).await
    }

    /// Creates a PayPal order for a one-off checkout.
    ///
    /// # Errors
    ///
    /// Fails when the token carries no core URL or the request fails.
    pub async fn create_paypal_order(
        &self,
        request: &CreatePayPalOrderRequest,
    ) -> Result<PayPalOrderResponse, ApiError> {
        let base = require_url(self.token().core_url.as_ref(), "core")?;
        let url = join(&base, "paypal/orders", "paypal order path")?;
        self.request(Endpoint::post(url, json_body(request)?)).await
    }

    /// Starts a PayPal billing agreement for vaulting.
    ///
    /// # Errors
    ///
    /// Fails when the token carries no core URL or the request fails.
    pub async fn create_billing_agreement(
        &self,
        request: &CreateBillingAgreementRequest,
    ) -> Result<BillingAgreementResponse, ApiError> {
        let base = require_url(self.token().core_url.as_ref(), "core")?;
        let url = join(
            &base,
            "paypal/billing-agreements",
            "billing agreement path",
        )?;
        self.request(Endpoint::post(url, json_body(request)?)).await
    }

    /// Confirms an approved billing agreement.
    ///
    /// # Errors
    ///
    /// Fails when the token carries no core URL or the request fails.
    pub async fn confirm_billing_agreement(
        &self,
        request: &ConfirmBillingAgreementRequest,
    ) -> Result<ConfirmedBillingAgreement, ApiError> {
        let base = require_url(self.token().core_url.as_ref(), "core")?;
        let url = join(
            &base,
            "paypal/billing-agreements/confirm",
            "billing agreement confirm path",
        )?;
        self.request(Endpoint::post(url, json_body(request)?)).await
    }

    /// Lists the bank issuers of a redirect method.
    ///
    /// # Errors
    ///
    /// Fails when the token carries no core URL or the request fails.
    pub async fn list_banks(&self, request: &BankListRequest) -> Result<BankListResponse, ApiError> {
        let base = require_url(self.token().core_url.as_ref(), "core")?;
        let url = join(&base, "adyen/checkout", "bank list path")?;
        self.request(Endpoint::post(url, json_body(request)?)).await
    }

    /// Lists the payment methods stored in the customer vault.
    ///
    /// # Errors
    ///
    /// Fails when the token carries no PCI URL or the request fails.
    pub async fn fetch_vaulted_methods(&self) -> Result<VaultedMethodsResponse, ApiError> {
        let base = require_url(self.token().pci_url.as_ref(), "pci")?;
        let url = join(&base, "payment-instruments", "vault list path")?;
        self.request(Endpoint::get(url)).await
    }

    /// Deletes one vaulted payment method.
    ///
    /// # Errors
    ///
    /// Fails when the token carries no PCI URL or the request fails.
    pub async fn delete_vaulted_method(&self, vault_id: &str) -> Result<(), ApiError> {
        let base = require_url(self.token().pci_url.as_ref(), "pci")?;
        let url = join(
            &base,
            &format!("payment-instruments/{vault_id}/vault"),
            "vault delete path",
        )?;
        self.request_unit(Endpoint::delete(url)).await
    }
}
