use std::future::Future;
use std::time::Duration;

use hand_relay_common::config::ClassifierConfig;
use hand_relay_common::frame::Frame;
use hand_relay_common::state::HandDetection;
use serde::Deserialize;
use tracing::debug;

/// Finds hands in a frame.
///
/// An empty detection list is a normal answer ("no hand"), not an error.
/// Errors are reserved for failing to get an answer at all.
pub trait HandClassifier: Send {
    fn classify(
        &mut self,
        frame: &Frame,
    ) -> impl Future<Output = Result<Vec<HandDetection>, ClassifierError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(reqwest::Error),
    #[error("classifier returned HTTP status {0}")]
    Status(u16),
    #[error("failed to decode classifier response: {0}")]
    Decode(reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    hands: Vec<HandDetection>,
}

/// Client for an external hand-landmark service.
///
/// Posts the JPEG as `image/jpeg` and expects
/// `{"hands":[{"handedness":"Left","score":0.97}]}`.
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
    min_confidence: f32,
    max_hands: usize,
}

impl HttpClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(ClassifierError::Request)?;
        Ok(Self {
            client,
            url: config.url.clone(),
            min_confidence: config.min_detection_confidence,
            max_hands: config.max_hands,
        })
    }
}

impl HandClassifier for HttpClassifier {
    async fn classify(&mut self, frame: &Frame) -> Result<Vec<HandDetection>, ClassifierError> {
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(frame.jpeg_data().to_vec())
            .send()
            .await
            .map_err(ClassifierError::Request)?;

        if !resp.status().is_success() {
            return Err(ClassifierError::Status(resp.status().as_u16()));
        }

        let body: ClassifyResponse = resp.json().await.map_err(ClassifierError::Decode)?;
        let raw = body.hands.len();
        let hands = select_hands(body.hands, self.min_confidence, self.max_hands);
        debug!(seq = frame.seq, raw, kept = hands.len(), "classified frame");
        Ok(hands)
    }
}

/// Drop detections under `min_confidence`, then keep the `max_hands` most
/// confident ones.
pub fn select_hands(
    mut hands: Vec<HandDetection>,
    min_confidence: f32,
    max_hands: usize,
) -> Vec<HandDetection> {
    hands.retain(|h| h.score >= min_confidence);
    hands.sort_by(|a, b| b.score.total_cmp(&a.score));
    hands.truncate(max_hands);
    hands
}
