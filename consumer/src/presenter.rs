use bytes::Bytes;
use hand_relay_common::frame::Frame;
use hand_relay_common::state::HandState;
use hand_relay_preview::{PreviewPublisher, PreviewSnapshot};

use crate::notifier::NotifyOutcome;

/// Everything known about one processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub observed: HandState,
    pub outcome: NotifyOutcome,
    pub confirmed: Option<HandState>,
    pub frames_processed: u64,
    pub frames_dropped: u64,
}

/// Shows processed frames to a human.
pub trait Presenter: Send {
    fn present(&mut self, frame: &Frame, report: &FrameReport);
}

impl Presenter for PreviewPublisher {
    fn present(&mut self, frame: &Frame, report: &FrameReport) {
        self.publish(PreviewSnapshot {
            jpeg: Some(Bytes::copy_from_slice(frame.jpeg_data())),
            observed: Some(report.observed),
            confirmed: report.confirmed,
            delivery: Some(report.outcome.as_str()),
            seq: Some(frame.seq),
            captured_at_ms: Some(frame.captured_at_ms),
            frames_processed: report.frames_processed,
            frames_dropped: report.frames_dropped,
        });
    }
}

/// Headless runs.
impl<P: Presenter> Presenter for Option<P> {
    fn present(&mut self, frame: &Frame, report: &FrameReport) {
        if let Some(inner) = self {
            inner.present(frame, report);
        }
    }
}
