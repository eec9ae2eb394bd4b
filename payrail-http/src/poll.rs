//! Cancellable status poller for asynchronous payment flows.
//!
//! After a redirect or QR hand-off the backend exposes a status URL that
//! reports `PENDING` until the out-of-band step completes, then `COMPLETE`
//! with a resume token in the `id` field. [`StatusPoller`] drives that loop:
//! fixed interval, bounded attempts, and a [`CancellationToken`] that stops
//! the loop mid-sleep so no request is issued and no result is delivered
//! after cancel.

use std::time::Duration;

use payrail::error::CheckoutError;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::ApiClient;
use crate::types::PollState;

/// Default pause between poll rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default attempt bound (roughly five minutes at the default interval).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 300;

/// Bounded polling loop over a payment status URL.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    client: ApiClient,
    interval: Duration,
    max_attempts: u32,
}

impl StatusPoller {
    /// Creates a poller with the default interval and attempt bound.
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self {
            client,
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the pause between poll rounds.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the attempt bound.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Polls `status_url` until it reports `COMPLETE`, yielding the resume
    /// token.
    ///
    /// `PENDING` (and any unknown state) sleeps one interval and repeats.
    /// Transport failures count as attempts and repeat as well; only decode
    /// failures and non-success statuses other than 5xx are terminal.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::UserCancelled`] when `cancel` fires, and
    /// [`CheckoutError::PollTimedOut`] after the attempt bound.
    pub async fn poll(
        &self,
        status_url: &Url,
        cancel: &CancellationToken,
    ) -> Result<String, CheckoutError> {
        for attempt in 0..self.max_attempts {
            if cancel.is_cancelled() {
                return Err(CheckoutError::UserCancelled);
            }

            let round = tokio::select! {
                () = cancel.cancelled() => return Err(CheckoutError::UserCancelled),
                response = self.client.poll_status(status_url) => response,
            };

            match round {
                Ok(status) if status.status == PollState::Complete => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(attempt, resume_token = %status.id, "poll complete");
                    return Ok(status.id);
                }
                Ok(_) => {}
                Err(error) if error.is_transport() || error.is_server_error() => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(attempt, %error, "poll round failed, retrying");
                }
                Err(error) => return Err(error.into()),
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(CheckoutError::UserCancelled),
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        Err(CheckoutError::PollTimedOut {
            attempts: self.max_attempts,
        })
    }
}
