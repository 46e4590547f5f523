use std::future::Future;
use std::time::Duration;

use hand_relay_common::state::HandState;
use reqwest::StatusCode;
use tracing::debug;

/// Delivers one state value to the remote actuator.
///
/// `Ok` means the actuator explicitly acknowledged the value; every other
/// outcome is an error and the value counts as undelivered.
pub trait StateTransport: Send {
    fn send(&mut self, state: HandState) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to actuator failed: {0}")]
    Request(reqwest::Error),
    #[error("actuator did not answer within {0:?}")]
    Timeout(Duration),
    #[error("actuator answered with HTTP status {0}")]
    Status(u16),
}

/// POSTs the state label as a raw UTF-8 body, e.g. `Left Hand`.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Request)?;
        Ok(Self {
            client,
            url: url.to_string(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl StateTransport for HttpTransport {
    async fn send(&mut self, state: HandState) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(state.as_payload())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else {
                    TransportError::Request(e)
                }
            })?;

        let status = response.status();
        debug!(%status, state = %state, "actuator responded");

        // Only 200 counts as an acknowledgement; 201/204 and friends do not.
        if status == StatusCode::OK {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}
