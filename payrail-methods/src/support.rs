//! Shared plumbing for protocol implementations.

use std::sync::Mutex;

use payrail::error::CheckoutError;
use payrail::session::DecodedSessionToken;
use payrail::tokenizer::{PaymentOutcome, PaymentStatus};
use payrail_http::types::{PaymentResponse, RequiredAction};
use payrail_http::{ApiClient, StatusPoller};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Fails fast when the attempt has been cancelled.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<(), CheckoutError> {
    if cancel.is_cancelled() {
        return Err(CheckoutError::UserCancelled);
    }
    Ok(())
}

/// Decodes the continuation token attached to a pending payment.
///
/// A pending payment must carry a required action with a fresh client token;
/// that token's payload holds the URLs for the continuation (redirect target,
/// status poll, QR payload).
pub(crate) fn decode_continuation(
    action: Option<&RequiredAction>,
) -> Result<DecodedSessionToken, CheckoutError> {
    let Some(action) = action else {
        return Err(CheckoutError::Decode {
            message: "pending payment carries no required action".into(),
        });
    };
    let Some(client_token) = action.client_token.as_deref() else {
        return Err(CheckoutError::Decode {
            message: format!(
                "required action '{}' carries no continuation token",
                action.name
            ),
        });
    };
    DecodedSessionToken::decode(client_token)
}

/// Maps a payment response into an outcome, parking the payment id when the
/// backend demands a resume.
pub(crate) fn settle_or_park(
    response: &PaymentResponse,
    pending: &Mutex<Option<String>>,
) -> Result<PaymentOutcome, CheckoutError> {
    match response.status.attempt_status() {
        PaymentStatus::Pending => {
            let continuation = decode_continuation(response.required_action.as_ref())?;
            *pending.lock().expect("pending payment lock poisoned") = Some(response.id.clone());
            Ok(PaymentOutcome {
                payment_id: response.id.clone(),
                status: PaymentStatus::Pending,
                resume_url: continuation.status_url,
            })
        }
        status => {
            *pending.lock().expect("pending payment lock poisoned") = None;
            Ok(PaymentOutcome {
                payment_id: response.id.clone(),
                status,
                resume_url: None,
            })
        }
    }
}

/// Polls a status URL to completion and resumes the payment with the
/// returned token.
pub(crate) async fn poll_and_resume(
    client: &ApiClient,
    status_url: &Url,
    payment_id: &str,
    cancel: &CancellationToken,
) -> Result<PaymentOutcome, CheckoutError> {
    let resume_token = StatusPoller::new(client.clone()).poll(status_url, cancel).await?;
    ensure_active(cancel)?;
    let response = client.resume_payment(payment_id, &resume_token).await?;
    Ok(response.outcome(None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::continuation_token;
    use payrail_http::types::PaymentWireStatus;

    #[test]
    fn pending_without_action_is_a_decode_failure() {
        let response = PaymentResponse {
            id: "pay-1".into(),
            status: PaymentWireStatus::Pending,
            required_action: None,
        };
        let err = settle_or_park(&response, &Mutex::new(None)).unwrap_err();
        assert!(matches!(err, CheckoutError::Decode { .. }));
    }

    #[test]
    fn pending_parks_the_payment_id_and_surfaces_the_status_url() {
        let token = continuation_token(&serde_json::json!({
            "accessToken": "cont-1",
            "exp": u64::MAX,
            "statusUrl": "https://api.example.com/resume-tokens/check-1"
        }));
        let response = PaymentResponse {
            id: "pay-1".into(),
            status: PaymentWireStatus::Pending,
            required_action: Some(RequiredAction {
                name: "3DS_AUTHENTICATION".into(),
                description: None,
                client_token: Some(token),
            }),
        };
        let pending = Mutex::new(None);
        let outcome = settle_or_park(&response, &pending).unwrap();
        assert_eq!(outcome.status, PaymentStatus::Pending);
        assert!(outcome.resume_url.is_some());
        assert_eq!(pending.lock().unwrap().as_deref(), Some("pay-1"));
    }

    #[test]
    fn settled_clears_the_parked_id() {
        let response = PaymentResponse {
            id: "pay-2".into(),
            status: PaymentWireStatus::Settled,
            required_action: None,
        };
        let pending = Mutex::new(Some("pay-1".to_owned()));
        let outcome = settle_or_park(&response, &pending).unwrap();
        assert_eq!(outcome.status, PaymentStatus::Success);
        assert!(pending.lock().unwrap().is_none());
    }
}
