use hand_relay_common::frame::{Frame, FrameSequencer};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::{SourceError, VideoSource};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// RTSP (or any ffmpeg-readable URL) decoded by an ffmpeg child process
/// that re-encodes each picture as JPEG on stdout.
pub struct RtspSource {
    child: Child,
    stdout: ChildStdout,
    read_buf: Vec<u8>,
    splitter: JpegSplitter,
    sequencer: FrameSequencer,
}

impl RtspSource {
    pub fn spawn(url: &str) -> Result<Self, SourceError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-loglevel", "error",
            "-rtsp_transport", "tcp",
            "-i", url,
            "-f", "image2pipe",
            "-c:v", "mjpeg",
            "-q:v", "5",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| SourceError::Spawn(e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Spawn("could not get stdout handle".into()))?;

        info!(url, pid = child.id(), "ffmpeg decoder started");

        Ok(Self {
            child,
            stdout,
            read_buf: vec![0u8; 64 * 1024],
            splitter: JpegSplitter::new(),
            sequencer: FrameSequencer::new(),
        })
    }
}

impl VideoSource for RtspSource {
    async fn next_frame(&mut self) -> Result<Frame, SourceError> {
        loop {
            if let Some(jpeg) = self.splitter.next_image() {
                return Ok(self.sequencer.stamp(jpeg));
            }

            let n = self
                .stdout
                .read(&mut self.read_buf)
                .await
                .map_err(|e| SourceError::Io(e.to_string()))?;
            if n == 0 {
                match self.child.try_wait() {
                    Ok(Some(status)) => debug!(%status, "ffmpeg exited"),
                    Ok(None) => debug!("ffmpeg closed stdout"),
                    Err(e) => warn!(error = %e, "failed to query ffmpeg status"),
                }
                return Err(SourceError::Ended);
            }
            self.splitter.push(&self.read_buf[..n]);
        }
    }

    async fn close(&mut self) {
        match self.child.kill().await {
            Ok(()) => info!("ffmpeg decoder stopped"),
            // Already exited on its own.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => warn!(error = %e, "failed to stop ffmpeg decoder"),
        }
    }
}

/// Splits a concatenated JPEG byte stream on SOI/EOI markers.
///
/// ffmpeg's mjpeg encoder never emits embedded thumbnails, so the first EOI
/// after an SOI ends the image.
#[derive(Debug, Default)]
pub struct JpegSplitter {
    buffer: Vec<u8>,
}

impl JpegSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Remove and return the next complete image, if one is buffered.
    pub fn next_image(&mut self) -> Option<Vec<u8>> {
        let Some(start) = find_marker(&self.buffer, 0, SOI) else {
            // Nothing that can start an image; keep a trailing 0xFF that may
            // be the first half of an SOI.
            let keep = usize::from(self.buffer.last() == Some(&0xFF));
            self.buffer.drain(..self.buffer.len() - keep);
            return None;
        };
        if start > 0 {
            self.buffer.drain(..start);
        }

        let end = find_marker(&self.buffer, SOI.len(), EOI)? + EOI.len();
        Some(self.buffer.drain(..end).collect())
    }
}

fn find_marker(data: &[u8], from: usize, marker: [u8; 2]) -> Option<usize> {
    data.get(from..)?
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}

/// Check whether ffmpeg is available on PATH. Logs a warning if not found.
pub async fn check_ffmpeg_available() {
    match Command::new("ffmpeg").arg("-version").output().await {
        Ok(out) if out.status.success() => {
            debug!("ffmpeg is available");
        }
        Ok(_) => {
            warn!("ffmpeg returned non-zero for -version; RTSP capture may fail");
        }
        Err(e) => {
            warn!(
                error = %e,
                "ffmpeg not found on PATH; RTSP capture will fail. Install ffmpeg."
            );
        }
    }
}
