//! Frame capture: video sources and the task that feeds the frame channel.

pub mod mjpeg;
pub mod rtsp;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hand_relay_common::channel::FrameChannel;
use hand_relay_common::config::StreamConfig;
use hand_relay_common::frame::Frame;
use hand_relay_common::shutdown::ShutdownListener;
use tracing::{debug, error, info};

use mjpeg::{MjpegSource, PollingSource};
use rtsp::RtspSource;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    HttpStream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),
    #[error("read error: {0}")]
    Io(String),
    #[error("video stream ended")]
    Ended,
    #[error("unknown stream mode '{0}'")]
    UnknownMode(String),
    #[error("invalid polling interval: {0}")]
    InvalidInterval(String),
}

/// A pull-based source of frames.
///
/// An `Err` from `next_frame` is terminal: the capture task stops and does
/// not call `next_frame` again.
pub trait VideoSource: Send {
    fn next_frame(&mut self) -> impl Future<Output = Result<Frame, SourceError>> + Send;

    /// Release whatever the source holds (connections, child processes).
    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// The source selected by `stream.mode`.
pub enum StreamSource {
    Mjpeg(MjpegSource),
    Polling(PollingSource),
    Rtsp(RtspSource),
}

impl StreamSource {
    pub async fn open(config: &StreamConfig) -> Result<Self, SourceError> {
        match config.mode.as_str() {
            "mjpeg" => {
                let url = format!("{}?quality={}", config.url, config.quality);
                Ok(Self::Mjpeg(MjpegSource::connect(&url).await?))
            }
            "polling" => {
                let url = format!(
                    "{}?quality={}",
                    config.url.replace("/stream", "/frame"),
                    config.quality
                );
                let interval = Duration::try_from_secs_f64(1.0 / config.fps).map_err(|e| {
                    SourceError::InvalidInterval(format!("fps {}: {e}", config.fps))
                })?;
                Ok(Self::Polling(PollingSource::new(&url, interval)?))
            }
            "rtsp" => {
                rtsp::check_ffmpeg_available().await;
                Ok(Self::Rtsp(RtspSource::spawn(&config.url)?))
            }
            other => Err(SourceError::UnknownMode(other.to_string())),
        }
    }
}

impl VideoSource for StreamSource {
    async fn next_frame(&mut self) -> Result<Frame, SourceError> {
        match self {
            Self::Mjpeg(s) => s.next_frame().await,
            Self::Polling(s) => s.next_frame().await,
            Self::Rtsp(s) => s.next_frame().await,
        }
    }

    async fn close(&mut self) {
        match self {
            Self::Mjpeg(s) => s.close().await,
            Self::Polling(s) => s.close().await,
            Self::Rtsp(s) => s.close().await,
        }
    }
}

/// Why the capture task returned.
#[derive(Debug)]
pub enum ProducerExit {
    Shutdown,
    SourceFailed(SourceError),
}

/// Pull frames from `source` into `channel` until the source fails or
/// shutdown is requested. The source is closed on both paths.
pub async fn run_producer<S: VideoSource>(
    mut source: S,
    channel: Arc<FrameChannel>,
    mut shutdown: ShutdownListener,
) -> ProducerExit {
    info!("capture started");

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.wait() => None,
            next = source.next_frame() => Some(next),
        };

        match next {
            None => {
                info!("shutdown requested, stopping capture");
                source.close().await;
                return ProducerExit::Shutdown;
            }
            Some(Ok(frame)) => {
                debug!(seq = frame.seq, bytes = frame.payload_size(), "captured frame");
                channel.put(frame);
            }
            Some(Err(e)) => {
                error!(error = %e, "video source failed, capture stopped");
                source.close().await;
                return ProducerExit::SourceFailed(e);
            }
        }
    }
}
