use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use hand_relay_common::frame::{Frame, FrameSequencer};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{SourceError, VideoSource};

const DEFAULT_BOUNDARY: &str = "frame";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Parse state for the MJPEG multipart stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Looking for the boundary marker `--<boundary>\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of part headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental splitter for a `multipart/x-mixed-replace` body.
///
/// Feed it arbitrary chunks with [`push`](Self::push); it returns every JPEG
/// part completed by that chunk. A part is complete once the following
/// boundary has been seen.
pub struct MultipartParser {
    boundary: Vec<u8>,
    buffer: BytesMut,
    state: ParseState,
    /// Offset into `buffer` already scanned for the boundary while collecting.
    jpeg_start: usize,
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        Self {
            boundary: format!("--{boundary}\r\n").into_bytes(),
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut parts = Vec::new();
        let marker_len = self.boundary.len();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, &self.boundary) {
                        let _ = self.buffer.split_to(pos + marker_len);
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep a tail in case the boundary spans chunks
                        if self.buffer.len() > marker_len {
                            let _ = self.buffer.split_to(self.buffer.len() - marker_len);
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.jpeg_start = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        break;
                    }
                }
                ParseState::CollectingJpeg => {
                    let Some(pos) =
                        find_subsequence(&self.buffer[self.jpeg_start..], &self.boundary)
                    else {
                        self.jpeg_start = self.buffer.len().saturating_sub(marker_len);
                        break;
                    };

                    let jpeg_end = self.jpeg_start + pos;
                    // Strip the CRLF that precedes the boundary
                    let end = if self.buffer[..jpeg_end].ends_with(b"\r\n") {
                        jpeg_end - 2
                    } else {
                        jpeg_end
                    };
                    let jpeg = self.buffer[..end].to_vec();
                    let _ = self.buffer.split_to(jpeg_end + marker_len);

                    if !jpeg.is_empty() {
                        parts.push(jpeg);
                    }
                    self.state = ParseState::SeekingHeaderEnd;
                }
            }
        }

        parts
    }
}

/// Pull the boundary name out of a `multipart/x-mixed-replace;boundary=...`
/// content type. Servers disagree on whether to include the leading `--`.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').trim_start_matches("--").to_string())
        .filter(|b| !b.is_empty())
}

/// Continuous MJPEG stream over one HTTP response.
pub struct MjpegSource {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    parser: MultipartParser,
    pending: VecDeque<Vec<u8>>,
    sequencer: FrameSequencer,
}

impl MjpegSource {
    pub async fn connect(url: &str) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(SourceError::HttpConnect)?;

        info!(url, "connecting to MJPEG stream");
        let response = client
            .get(url)
            .send()
            .await
            .map_err(SourceError::HttpConnect)?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(SourceError::HttpStatus(response.status().as_u16()));
        }

        let boundary = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(boundary_from_content_type)
            .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string());

        info!(status = %response.status(), boundary, "connected to MJPEG stream");

        Ok(Self {
            body: response.bytes_stream().boxed(),
            parser: MultipartParser::new(&boundary),
            pending: VecDeque::new(),
            sequencer: FrameSequencer::new(),
        })
    }
}

impl VideoSource for MjpegSource {
    async fn next_frame(&mut self) -> Result<Frame, SourceError> {
        loop {
            // Only the newest part of a burst matters downstream, but the
            // channel already drops stale frames, so hand them all over.
            if let Some(jpeg) = self.pending.pop_front() {
                return Ok(self.sequencer.stamp(jpeg));
            }

            let chunk = match self.body.next().await {
                Some(chunk) => chunk.map_err(SourceError::HttpStream)?,
                None => return Err(SourceError::Ended),
            };
            self.pending.extend(self.parser.push(&chunk));
        }
    }

    async fn close(&mut self) {
        // Replacing the body drops the response and its connection.
        self.body = futures_util::stream::empty().boxed();
        debug!("MJPEG stream closed");
    }
}

/// Fallback: fetch a single JPEG from the camera at a fixed interval.
pub struct PollingSource {
    client: reqwest::Client,
    url: String,
    ticker: tokio::time::Interval,
    sequencer: FrameSequencer,
}

impl PollingSource {
    pub fn new(frame_url: &str, interval: Duration) -> Result<Self, SourceError> {
        if interval.is_zero() {
            return Err(SourceError::InvalidInterval("zero period".into()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(SourceError::HttpConnect)?;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(url = frame_url, ?interval, "polling camera for frames");

        Ok(Self {
            client,
            url: frame_url.to_string(),
            ticker,
            sequencer: FrameSequencer::new(),
        })
    }
}

impl VideoSource for PollingSource {
    async fn next_frame(&mut self) -> Result<Frame, SourceError> {
        self.ticker.tick().await;

        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(SourceError::HttpConnect)?;

        if resp.status() != reqwest::StatusCode::OK {
            warn!(status = %resp.status(), "unexpected response from camera");
            return Err(SourceError::HttpStatus(resp.status().as_u16()));
        }

        let jpeg = resp.bytes().await.map_err(SourceError::HttpStream)?.to_vec();
        Ok(self.sequencer.stamp(jpeg))
    }
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
