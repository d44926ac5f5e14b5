use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::protocol::canonical::Vendor;

use super::retry_policy::next_attempt_delay;
use super::{extract_error_message, PendingRequest, StreamHandle, Transport};

/// HTTP transport over a pooled reqwest client.
///
/// Retries up to the configured maximum with a fixed delay on network-level
/// failure or non-success status; never retries a success. The whole send,
/// including retry sleeps, aborts promptly when the cancellation token fires.
pub struct HttpTransport {
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpTransport {
    /// Build a transport from the engine config's timeout and retry surface.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the underlying client cannot be
    /// constructed.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| EngineError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    async fn execute_once(&self, request: &PendingRequest) -> Result<reqwest::Response, EngineError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }
        builder
            .send()
            .await
            .map_err(|err| EngineError::Network(err.to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: PendingRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamHandle, EngineError> {
        let vendor = request.vendor;
        let response = retry_loop(vendor, self.max_retries, self.retry_delay, cancel, || {
            self.execute_once(&request).boxed()
        })
        .await?;

        let status = response.status().as_u16();
        let chunks = response
            .bytes_stream()
            .map_err(|err| EngineError::Network(err.to_string()))
            .boxed();
        Ok(StreamHandle::new(status, chunks))
    }
}

/// Drive attempts until one succeeds or the budget runs out: at most
/// `max_retries + 1` attempts in total. Network failures and non-success
/// statuses are retried after the delay (`Retry-After` wins when the
/// response carries one); the final failure is converted to the terminal
/// error. Cancellation aborts both in-flight attempts and sleeps.
async fn retry_loop<'a, F>(
    vendor: Vendor,
    max_retries: u32,
    retry_delay: Duration,
    cancel: &CancellationToken,
    mut attempt_fn: F,
) -> Result<reqwest::Response, EngineError>
where
    F: FnMut() -> BoxFuture<'a, Result<reqwest::Response, EngineError>>,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let outcome = tokio::select! {
            () = cancel.cancelled() => return Err(EngineError::Cancelled),
            outcome = attempt_fn() => outcome,
        };

        let delay = match outcome {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status().as_u16();
                if attempt >= max_retries {
                    let body = response.text().await.unwrap_or_default();
                    return Err(EngineError::Protocol {
                        status,
                        message: extract_error_message(status, &body),
                    });
                }
                let delay = next_attempt_delay(retry_delay, Some(response.headers()));
                tracing::debug!(
                    vendor = %vendor,
                    status,
                    retry_attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "retrying after non-success status"
                );
                delay
            }
            Err(err @ EngineError::Cancelled) => return Err(err),
            Err(err) => {
                if attempt >= max_retries {
                    return Err(err);
                }
                let delay = next_attempt_delay(retry_delay, None);
                tracing::debug!(
                    vendor = %vendor,
                    retry_attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "retrying after transport error"
                );
                delay
            }
        };

        tokio::select! {
            () = cancel.cancelled() => return Err(EngineError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
