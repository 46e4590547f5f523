use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hand_relay_common::channel::FrameChannel;
use hand_relay_common::frame::Frame;
use hand_relay_common::shutdown::ShutdownListener;
use hand_relay_common::state::HandState;
use tracing::{debug, info, warn};

use crate::classifier::HandClassifier;
use crate::mirror::mirror_frame;
use crate::notifier::StateNotifier;
use crate::presenter::{FrameReport, Presenter};
use crate::transport::StateTransport;

/// The processing side: takes the newest frame, classifies it, forwards
/// state changes to the actuator and hands the result to the presenter.
pub struct ConsumerLoop<C, T, P> {
    channel: Arc<FrameChannel>,
    classifier: C,
    notifier: StateNotifier<T>,
    presenter: P,
    mirror: bool,
    idle_wait: Duration,
    processed: u64,
}

impl<C, T, P> ConsumerLoop<C, T, P>
where
    C: HandClassifier,
    T: StateTransport,
    P: Presenter,
{
    pub fn new(
        channel: Arc<FrameChannel>,
        classifier: C,
        notifier: StateNotifier<T>,
        presenter: P,
        mirror: bool,
        idle_wait: Duration,
    ) -> Self {
        Self {
            channel,
            classifier,
            notifier,
            presenter,
            mirror,
            idle_wait,
            processed: 0,
        }
    }

    /// Poll the channel until shutdown is requested.
    ///
    /// If capture has stopped the channel stays empty and this keeps polling;
    /// only the shutdown signal ends the loop.
    pub async fn run(mut self, mut shutdown: ShutdownListener) -> Option<HandState> {
        info!(idle_wait_ms = self.idle_wait.as_millis() as u64, "waiting for frames");

        while !shutdown.is_triggered() {
            let Some(frame) = self.channel.try_take() else {
                tokio::select! {
                    _ = shutdown.wait() => {}
                    _ = tokio::time::sleep(self.idle_wait) => {}
                }
                continue;
            };
            self.process(frame).await;
        }

        let stats = self.channel.stats();
        info!(
            processed = self.processed,
            produced = stats.produced,
            dropped = stats.dropped,
            confirmed = self.notifier.last_confirmed().map(|s| s.label()),
            "processing loop stopped"
        );
        self.notifier.last_confirmed()
    }

    /// Handle one frame. Returns `None` when the frame had to be skipped.
    pub async fn process(&mut self, frame: Frame) -> Option<FrameReport> {
        let frame = if self.mirror {
            match mirror_frame(frame) {
                Ok(f) => f,
                Err(e) => {
                    warn!(error = %e, "failed to mirror frame, skipping");
                    return None;
                }
            }
        } else {
            frame
        };

        let detections = match self.classifier.classify(&frame).await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, seq = frame.seq, "classification failed, skipping frame");
                return None;
            }
        };
        let Some(observed) = HandState::from_detections(&detections) else {
            debug!(seq = frame.seq, "single hand without handedness, skipping frame");
            return None;
        };
        let outcome = self.notifier.consider(observed).await;

        self.processed += 1;
        let dropped = self.channel.stats().dropped;
        debug!(
            seq = frame.seq,
            age_ms = frame.age_ms(Utc::now().timestamp_millis()),
            state = observed.label(),
            outcome = outcome.as_str(),
            "processed frame"
        );
        if self.processed % 100 == 0 {
            debug!(processed = self.processed, dropped, "frames processed");
        }

        let report = FrameReport {
            observed,
            outcome,
            confirmed: self.notifier.last_confirmed(),
            frames_processed: self.processed,
            frames_dropped: dropped,
        };
        self.presenter.present(&frame, &report);
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierError;
    use crate::notifier::tests::ScriptedTransport;
    use crate::notifier::NotifyOutcome;
    use hand_relay_common::shutdown::Shutdown;
    use hand_relay_common::state::{HandDetection, Handedness};
    use std::collections::VecDeque;

    /// Answers from a script keyed by call order; `None` entries fail.
    struct ScriptedClassifier {
        script: VecDeque<Option<Vec<HandDetection>>>,
    }

    impl ScriptedClassifier {
        fn new(script: Vec<Option<Vec<HandDetection>>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl HandClassifier for ScriptedClassifier {
        async fn classify(&mut self, _frame: &Frame) -> Result<Vec<HandDetection>, ClassifierError> {
            match self.script.pop_front().flatten() {
                Some(hands) => Ok(hands),
                None => Err(ClassifierError::Status(503)),
            }
        }
    }

    #[derive(Default)]
    struct RecordingPresenter {
        shown: Vec<(u64, HandState)>,
    }

    impl Presenter for RecordingPresenter {
        fn present(&mut self, frame: &Frame, report: &FrameReport) {
            self.shown.push((frame.seq, report.observed));
        }
    }

    fn left() -> Vec<HandDetection> {
        vec![HandDetection::new(Some(Handedness::Left), 0.9)]
    }

    fn both() -> Vec<HandDetection> {
        vec![
            HandDetection::new(Some(Handedness::Left), 0.9),
            HandDetection::new(Some(Handedness::Left), 0.8),
        ]
    }

    fn frame(seq: u64) -> Frame {
        Frame::new(vec![0xFF, 0xD8, 0xFF, 0xD9], 1708300000000, seq)
    }

    fn consumer(
        script: Vec<Option<Vec<HandDetection>>>,
        replies: &[bool],
    ) -> ConsumerLoop<ScriptedClassifier, ScriptedTransport, RecordingPresenter> {
        ConsumerLoop::new(
            Arc::new(FrameChannel::new()),
            ScriptedClassifier::new(script),
            StateNotifier::new(
                ScriptedTransport::with_replies(replies),
                Duration::from_secs(1),
            ),
            RecordingPresenter::default(),
            false,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn classified_states_drive_notifier() {
        let mut c = consumer(
            vec![Some(vec![]), Some(left()), Some(left()), Some(both())],
            &[],
        );

        let mut outcomes = Vec::new();
        for seq in 0..4 {
            outcomes.push(c.process(frame(seq)).await.unwrap().outcome);
        }

        assert_eq!(
            outcomes,
            vec![
                NotifyOutcome::Sent,
                NotifyOutcome::Sent,
                NotifyOutcome::Unchanged,
                NotifyOutcome::Sent
            ]
        );
        assert_eq!(
            c.notifier.transport().sent,
            vec![HandState::NoHand, HandState::LeftHand, HandState::BothHands]
        );
        assert_eq!(c.presenter.shown.len(), 4);
        assert_eq!(c.presenter.shown[3], (3, HandState::BothHands));
    }

    #[tokio::test]
    async fn classifier_failure_skips_frame_without_notifying() {
        let mut c = consumer(vec![None, Some(left())], &[]);

        assert!(c.process(frame(0)).await.is_none());
        assert!(c.notifier.transport().sent.is_empty());
        assert!(c.presenter.shown.is_empty());

        let report = c.process(frame(1)).await.unwrap();
        assert_eq!(report.observed, HandState::LeftHand);
        assert_eq!(report.confirmed, Some(HandState::LeftHand));
        assert_eq!(report.frames_processed, 1);
    }

    #[tokio::test]
    async fn unlabelled_hand_skips_frame_without_notifying() {
        let unlabelled = vec![HandDetection::new(None, 0.9)];
        let mut c = consumer(vec![Some(left()), Some(unlabelled)], &[]);

        c.process(frame(0)).await.unwrap();
        assert!(c.process(frame(1)).await.is_none());

        assert_eq!(c.notifier.transport().sent, vec![HandState::LeftHand]);
        assert_eq!(c.notifier.last_confirmed(), Some(HandState::LeftHand));
        assert_eq!(c.presenter.shown, vec![(0, HandState::LeftHand)]);
    }

    #[tokio::test]
    async fn failed_delivery_still_presents_observed_state() {
        let mut c = consumer(vec![Some(left())], &[false]);
        let report = c.process(frame(0)).await.unwrap();
        assert_eq!(report.outcome, NotifyOutcome::Failed);
        assert_eq!(report.observed, HandState::LeftHand);
        assert_eq!(report.confirmed, None);
        assert_eq!(c.presenter.shown, vec![(0, HandState::LeftHand)]);
    }

    #[tokio::test]
    async fn run_processes_latest_frame_and_stops_on_shutdown() {
        let c = consumer(vec![Some(both())], &[]);
        let channel = Arc::clone(&c.channel);
        for seq in 0..5 {
            channel.put(frame(seq));
        }

        let shutdown = Shutdown::new();
        let task = tokio::spawn(c.run(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(channel.try_take().is_none(), "frame should have been consumed");
        shutdown.trigger();

        let confirmed = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop should stop on shutdown")
            .unwrap();
        assert_eq!(confirmed, Some(HandState::BothHands));
        assert_eq!(channel.stats().dropped, 4);
    }

    #[tokio::test]
    async fn idle_loop_keeps_polling_after_capture_stops() {
        let c = consumer(vec![], &[]);
        let shutdown = Shutdown::new();
        let task = tokio::spawn(c.run(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!task.is_finished());

        shutdown.trigger();
        let confirmed = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop should stop on shutdown")
            .unwrap();
        assert_eq!(confirmed, None);
    }
}
