use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::events::{FailoverEvent, FailureReason, PlaybackStatus};
use crate::PLAYBACK_TIMEOUT;

/// Lifecycle of one playback session.
///
/// Switching to a backup has no phase of its own: the advance transition
/// lands back in `Loading` within one locked section, so the getter can
/// never observe the in-between. It surfaces as
/// `FailoverEvent::SwitchingBackup` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No stream selected
    Idle,
    /// A stream is active, waiting for playback to start
    Loading,
    /// The active stream is confirmed playing
    Playing,
    /// Terminal: the queue is exhausted
    Failed,
}

struct Session {
    queue: Vec<String>,
    cursor: usize,
    phase: Phase,
    failure_reported: bool,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every session change so a stale timer wake-up can never
    /// act on a newer session
    epoch: u64,
}

impl Session {
    /// Cancels the pending timer and invalidates any wake-up already past
    /// its sleep and waiting on the session lock
    fn clear_timer(&mut self) {
        self.epoch += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Failover state machine around one active stream plus ordered backups.
///
/// The playback collaborator feeds `on_playback_status` / `on_playback_error`
/// in; the controller answers with events over `recv()` and bounds the wait
/// on any single stream to `PLAYBACK_TIMEOUT`. Clone-cheap, all state is
/// shared behind one mutex.
#[derive(Clone)]
pub struct FailoverController {
    session: Arc<Mutex<Session>>,
    event_tx: mpsc::UnboundedSender<FailoverEvent>,
    event_rx: Arc<Mutex<mpsc::UnboundedReceiver<FailoverEvent>>>,
}

impl FailoverController {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            session: Arc::new(Mutex::new(Session {
                queue: Vec::new(),
                cursor: 0,
                phase: Phase::Idle,
                failure_reported: false,
                timer: None,
                epoch: 0,
            })),
            event_tx: tx,
            event_rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Starts a new session on `primary` plus `backups`, replacing any
    /// session in progress. Blank entries and duplicates are dropped while
    /// preserving order; an entirely empty input returns to `Idle`.
    pub async fn set_streams(&self, primary: &str, backups: &[String]) {
        let mut queue = Vec::new();
        let mut seen = HashSet::new();
        for url in std::iter::once(primary).chain(backups.iter().map(String::as_str)) {
            let url = url.trim();
            if url.is_empty() || !seen.insert(url.to_string()) {
                continue;
            }
            queue.push(url.to_string());
        }

        let mut session = self.session.lock().await;
        session.clear_timer();
        session.cursor = 0;
        session.failure_reported = false;

        if queue.is_empty() {
            session.queue.clear();
            session.phase = Phase::Idle;
            return;
        }

        log::debug!("Starting failover session with {} stream(s)", queue.len());
        let url = queue[0].clone();
        session.queue = queue;
        session.phase = Phase::Loading;
        self.arm_timer(&mut session);

        let _ = self.event_tx.send(FailoverEvent::StreamSelected {
            url,
            backup_index: 0,
        });
    }

    /// Player status callback. `Playing` confirms the active stream and
    /// cancels its timer; `Buffering` only surfaces a loading indicator.
    pub async fn on_playback_status(&self, status: PlaybackStatus) {
        match status {
            PlaybackStatus::Playing => {
                let mut session = self.session.lock().await;
                if !matches!(session.phase, Phase::Loading | Phase::Playing) {
                    return;
                }
                session.clear_timer();
                session.phase = Phase::Playing;
                let on_backup = session.cursor > 0;

                let _ = self.event_tx.send(FailoverEvent::Playing { on_backup });
            }
            PlaybackStatus::Buffering => {
                let session = self.session.lock().await;
                if matches!(session.phase, Phase::Idle | Phase::Failed) {
                    return;
                }
                let _ = self.event_tx.send(FailoverEvent::Buffering);
            }
        }
    }

    /// Player error callback: the active stream is dead, advance
    pub async fn on_playback_error(&self) {
        let mut session = self.session.lock().await;
        self.advance_locked(&mut session, FailureReason::Error);
    }

    fn advance_locked(&self, session: &mut Session, reason: FailureReason) {
        if !matches!(session.phase, Phase::Loading | Phase::Playing) {
            return;
        }
        session.clear_timer();

        if session.cursor + 1 < session.queue.len() {
            session.cursor += 1;
            let url = session.queue[session.cursor].clone();
            let backup_index = session.cursor;
            log::info!("Stream failed ({:?}), switching to backup {}", reason, backup_index);
            session.phase = Phase::Loading;
            self.arm_timer(session);

            let _ = self
                .event_tx
                .send(FailoverEvent::SwitchingBackup { url, backup_index });
        } else {
            session.phase = Phase::Failed;
            if session.failure_reported {
                return;
            }
            session.failure_reported = true;

            log::warn!("All streams exhausted ({:?})", reason);
            let _ = self.event_tx.send(FailoverEvent::Failed { reason });
        }
    }

    /// Arms the acquisition timer at the current epoch. The deadline is
    /// anchored here, at the transition, not at the spawned task's first
    /// poll. The caller cleared the previous timer just before, so two
    /// timers never overlap and a wake-up from an aborted-but-in-flight
    /// timer fails its epoch check.
    fn arm_timer(&self, session: &mut Session) {
        let epoch = session.epoch;
        let deadline = tokio::time::Instant::now() + PLAYBACK_TIMEOUT;
        let controller = self.clone();
        session.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let mut session = controller.session.lock().await;
            if session.epoch != epoch {
                return;
            }
            controller.advance_locked(&mut session, FailureReason::Timeout);
        }));
    }

    /// Receive controller events
    pub async fn recv(&self) -> Option<FailoverEvent> {
        self.event_rx.lock().await.recv().await
    }

    pub async fn active_stream_url(&self) -> Option<String> {
        let session = self.session.lock().await;
        match session.phase {
            Phase::Idle | Phase::Failed => None,
            _ => session.queue.get(session.cursor).cloned(),
        }
    }

    pub async fn is_loading(&self) -> bool {
        self.session.lock().await.phase == Phase::Loading
    }

    pub async fn phase(&self) -> Phase {
        self.session.lock().await.phase
    }

    /// User-facing line describing the session, when there is one
    pub async fn status_message(&self) -> Option<String> {
        let session = self.session.lock().await;
        match session.phase {
            Phase::Loading => Some("Connecting to stream...".to_string()),
            Phase::Playing if session.cursor > 0 => {
                Some(format!("Using backup line {}", session.cursor))
            }
            Phase::Failed => Some("All stream sources failed".to_string()),
            _ => None,
        }
    }
}

impl Default for FailoverController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::advance;

    fn streams() -> (String, Vec<String>) {
        (
            "https://a.example.com/live.m3u8".to_string(),
            vec![
                "https://b.example.com/live.m3u8".to_string(),
                "https://c.example.com/live.m3u8".to_string(),
            ],
        )
    }

    async fn drain(controller: &FailoverController) -> Vec<FailoverEvent> {
        let mut events = Vec::new();
        let mut rx = controller.event_rx.lock().await;
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Lets spawned timer tasks run after a paused-time advance
    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_advances_to_next_backup() {
        let controller = FailoverController::new();
        let (primary, backups) = streams();
        controller.set_streams(&primary, &backups).await;
        assert_eq!(controller.active_stream_url().await.as_deref(), Some(primary.as_str()));

        controller.on_playback_error().await;
        assert_eq!(controller.active_stream_url().await.as_deref(), Some(backups[0].as_str()));
        assert!(controller.is_loading().await);

        let events = drain(&controller).await;
        assert!(matches!(
            events.last(),
            Some(FailoverEvent::SwitchingBackup { backup_index: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_advances_to_next_backup() {
        let controller = FailoverController::new();
        let (primary, backups) = streams();
        controller.set_streams(&primary, &backups).await;

        advance(PLAYBACK_TIMEOUT + Duration::from_millis(1)).await;
        settle().await;

        assert_eq!(controller.active_stream_url().await.as_deref(), Some(backups[0].as_str()));
        assert_eq!(controller.phase().await, Phase::Loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_deadline_anchored_at_selection() {
        let controller = FailoverController::new();
        let (primary, backups) = streams();
        controller.set_streams(&primary, &backups).await;

        // counts from set_streams even though the timer task has not been
        // polled yet; just short of the window nothing moves
        advance(PLAYBACK_TIMEOUT - Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(controller.active_stream_url().await.as_deref(), Some(primary.as_str()));

        advance(Duration::from_millis(2)).await;
        settle().await;
        assert_eq!(controller.active_stream_url().await.as_deref(), Some(backups[0].as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_failure_exactly_once() {
        let controller = FailoverController::new();
        let (primary, backups) = streams();
        controller.set_streams(&primary, &backups).await;

        controller.on_playback_error().await;
        controller.on_playback_error().await;
        controller.on_playback_error().await;
        // the session is terminal, further errors are ignored
        controller.on_playback_error().await;
        controller.on_playback_error().await;

        assert_eq!(controller.phase().await, Phase::Failed);
        assert_eq!(controller.active_stream_url().await, None);

        let failures = drain(&controller)
            .await
            .into_iter()
            .filter(|e| matches!(e, FailoverEvent::Failed { .. }))
            .count();
        assert_eq!(failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playing_cancels_the_timer() {
        let controller = FailoverController::new();
        let (primary, backups) = streams();
        controller.set_streams(&primary, &backups).await;

        controller.on_playback_status(PlaybackStatus::Playing).await;
        assert_eq!(controller.phase().await, Phase::Playing);

        // well past the acquisition window; no advance happens
        advance(PLAYBACK_TIMEOUT * 3).await;
        settle().await;
        assert_eq!(controller.active_stream_url().await.as_deref(), Some(primary.as_str()));
        assert_eq!(controller.phase().await, Phase::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffering_leaves_the_timer_armed() {
        let controller = FailoverController::new();
        let (primary, backups) = streams();
        controller.set_streams(&primary, &backups).await;

        advance(Duration::from_secs(10)).await;
        controller.on_playback_status(PlaybackStatus::Buffering).await;
        assert!(controller.is_loading().await);

        // the original deadline still applies
        advance(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(controller.active_stream_url().await.as_deref(), Some(backups[0].as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_playing_on_backup_surfaces_status() {
        let controller = FailoverController::new();
        let (primary, backups) = streams();
        controller.set_streams(&primary, &backups).await;

        controller.on_playback_error().await;
        controller.on_playback_status(PlaybackStatus::Playing).await;

        assert_eq!(
            controller.status_message().await.as_deref(),
            Some("Using backup line 1")
        );
        let events = drain(&controller).await;
        assert!(matches!(
            events.last(),
            Some(FailoverEvent::Playing { on_backup: true })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_streams_resets_the_session() {
        let controller = FailoverController::new();
        let (primary, backups) = streams();
        controller.set_streams(&primary, &backups).await;
        controller.on_playback_error().await;
        controller.on_playback_error().await;

        // new session starts over on its own primary
        controller
            .set_streams("https://d.example.com/live.m3u8", &[])
            .await;
        assert_eq!(
            controller.active_stream_url().await.as_deref(),
            Some("https://d.example.com/live.m3u8")
        );
        assert_eq!(controller.phase().await, Phase::Loading);

        // the old session's pending timer must not touch the new one
        settle().await;
        assert_eq!(controller.phase().await, Phase::Loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input_goes_idle() {
        let controller = FailoverController::new();
        let (primary, backups) = streams();
        controller.set_streams(&primary, &backups).await;

        controller.set_streams("", &["  ".to_string()]).await;
        assert_eq!(controller.phase().await, Phase::Idle);
        assert_eq!(controller.active_stream_url().await, None);
        assert!(!controller.is_loading().await);

        advance(PLAYBACK_TIMEOUT * 2).await;
        settle().await;
        assert_eq!(controller.phase().await, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_deduplicates_preserving_order() {
        let controller = FailoverController::new();
        let backups = vec![
            "https://a.example.com/live.m3u8".to_string(),
            "https://b.example.com/live.m3u8".to_string(),
        ];
        controller
            .set_streams("https://a.example.com/live.m3u8", &backups)
            .await;

        // the duplicated primary appears once, so one error reaches b
        controller.on_playback_error().await;
        assert_eq!(
            controller.active_stream_url().await.as_deref(),
            Some("https://b.example.com/live.m3u8")
        );
        // and the next error exhausts the queue
        controller.on_playback_error().await;
        assert_eq!(controller.phase().await, Phase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_error_then_timeout_walks_the_queue() {
        let controller = FailoverController::new();
        let (primary, backups) = streams();
        controller.set_streams(&primary, &backups).await;

        controller.on_playback_error().await;
        assert_eq!(controller.active_stream_url().await.as_deref(), Some(backups[0].as_str()));

        advance(PLAYBACK_TIMEOUT + Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(controller.active_stream_url().await.as_deref(), Some(backups[1].as_str()));

        controller.on_playback_error().await;
        assert_eq!(controller.phase().await, Phase::Failed);

        let reasons: Vec<_> = drain(&controller)
            .await
            .into_iter()
            .filter_map(|e| match e {
                FailoverEvent::Failed { reason } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(reasons, vec![FailureReason::Error]);
    }
}
