use std::time::Duration;

use hand_relay_common::state::HandState;
use tracing::{info, warn};

use crate::transport::StateTransport;

/// Result of offering one observed state to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Same as the last confirmed state; nothing was sent.
    Unchanged,
    /// Sent and acknowledged; now the confirmed state.
    Sent,
    /// Sent but not acknowledged; the confirmed state is untouched.
    Failed,
}

impl NotifyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyOutcome::Unchanged => "unchanged",
            NotifyOutcome::Sent => "sent",
            NotifyOutcome::Failed => "failed",
        }
    }
}

/// Edge-triggered forwarding of hand states to the actuator.
///
/// Only an acknowledged send moves `last_confirmed`. A failed send leaves it
/// where it was, so the next frame showing the same new state tries again;
/// there is no separate retry path.
pub struct StateNotifier<T> {
    transport: T,
    timeout: Duration,
    last_confirmed: Option<HandState>,
}

impl<T: StateTransport> StateNotifier<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            last_confirmed: None,
        }
    }

    pub fn last_confirmed(&self) -> Option<HandState> {
        self.last_confirmed
    }

    pub async fn consider(&mut self, candidate: HandState) -> NotifyOutcome {
        if self.last_confirmed == Some(candidate) {
            return NotifyOutcome::Unchanged;
        }

        info!(
            from = self.last_confirmed.map(|s| s.label()),
            to = candidate.label(),
            "state change detected, notifying actuator"
        );

        match tokio::time::timeout(self.timeout, self.transport.send(candidate)).await {
            Ok(Ok(())) => {
                self.last_confirmed = Some(candidate);
                info!(state = candidate.label(), "actuator acknowledged state");
                NotifyOutcome::Sent
            }
            Ok(Err(e)) => {
                warn!(error = %e, state = candidate.label(), "failed to notify actuator");
                NotifyOutcome::Failed
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    state = candidate.label(),
                    "actuator notification timed out"
                );
                NotifyOutcome::Failed
            }
        }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::TransportError;
    use std::collections::VecDeque;

    /// Records every send; replies from a script, acknowledging once the
    /// script runs out.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub replies: VecDeque<bool>,
        pub sent: Vec<HandState>,
    }

    impl ScriptedTransport {
        pub fn with_replies(replies: &[bool]) -> Self {
            Self {
                replies: replies.iter().copied().collect(),
                sent: Vec::new(),
            }
        }
    }

    impl StateTransport for ScriptedTransport {
        async fn send(&mut self, state: HandState) -> Result<(), TransportError> {
            self.sent.push(state);
            if self.replies.pop_front().unwrap_or(true) {
                Ok(())
            } else {
                Err(TransportError::Status(500))
            }
        }
    }

    struct StalledTransport {
        attempts: u32,
    }

    impl StateTransport for StalledTransport {
        async fn send(&mut self, _state: HandState) -> Result<(), TransportError> {
            self.attempts += 1;
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    fn notifier(replies: &[bool]) -> StateNotifier<ScriptedTransport> {
        StateNotifier::new(
            ScriptedTransport::with_replies(replies),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn starts_unconfirmed() {
        let n = notifier(&[]);
        assert_eq!(n.last_confirmed(), None);
        assert!(n.transport().sent.is_empty());
    }

    #[tokio::test]
    async fn change_sequence_sends_once_per_distinct_state() {
        let mut n = notifier(&[]);
        let mut outcomes = Vec::new();
        for s in [
            HandState::NoHand,
            HandState::LeftHand,
            HandState::LeftHand,
            HandState::BothHands,
        ] {
            outcomes.push(n.consider(s).await);
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
            n.transport().sent,
            vec![HandState::NoHand, HandState::LeftHand, HandState::BothHands]
        );
        assert_eq!(n.last_confirmed(), Some(HandState::BothHands));
    }

    #[tokio::test]
    async fn failed_send_is_retried_on_next_observation() {
        let mut n = notifier(&[true, false, false, true]);
        assert_eq!(n.consider(HandState::NoHand).await, NotifyOutcome::Sent);

        let outcomes = [
            n.consider(HandState::LeftHand).await,
            n.consider(HandState::LeftHand).await,
            n.consider(HandState::LeftHand).await,
        ];
        assert_eq!(
            outcomes,
            [
                NotifyOutcome::Failed,
                NotifyOutcome::Failed,
                NotifyOutcome::Sent
            ]
        );
        assert_eq!(
            &n.transport().sent[1..],
            &[HandState::LeftHand, HandState::LeftHand, HandState::LeftHand]
        );
        assert_eq!(n.last_confirmed(), Some(HandState::LeftHand));
    }

    #[tokio::test]
    async fn failure_keeps_previous_confirmation() {
        let mut n = notifier(&[true, false]);
        n.consider(HandState::RightHand).await;
        assert_eq!(n.consider(HandState::BothHands).await, NotifyOutcome::Failed);
        assert_eq!(n.last_confirmed(), Some(HandState::RightHand));

        // Going back to the confirmed state needs no send at all.
        assert_eq!(n.consider(HandState::RightHand).await, NotifyOutcome::Unchanged);
        assert_eq!(n.transport().sent.len(), 2);
    }

    #[tokio::test]
    async fn confirmed_state_is_not_resent() {
        let mut n = notifier(&[]);
        n.consider(HandState::LeftHand).await;
        for _ in 0..10 {
            assert_eq!(n.consider(HandState::LeftHand).await, NotifyOutcome::Unchanged);
        }
        assert_eq!(n.transport().sent, vec![HandState::LeftHand]);
    }

    #[tokio::test]
    async fn first_failure_leaves_unconfirmed() {
        let mut n = notifier(&[false]);
        assert_eq!(n.consider(HandState::NoHand).await, NotifyOutcome::Failed);
        assert_eq!(n.last_confirmed(), None);
        assert_eq!(n.consider(HandState::NoHand).await, NotifyOutcome::Sent);
        assert_eq!(n.last_confirmed(), Some(HandState::NoHand));
    }

    #[tokio::test]
    async fn stalled_actuator_is_bounded_by_timeout() {
        let mut n = StateNotifier::new(
            StalledTransport { attempts: 0 },
            Duration::from_millis(50),
        );
        let started = std::time::Instant::now();
        assert_eq!(n.consider(HandState::LeftHand).await, NotifyOutcome::Failed);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(n.last_confirmed(), None);

        assert_eq!(n.consider(HandState::LeftHand).await, NotifyOutcome::Failed);
        assert_eq!(n.transport().attempts, 2);
    }
}
