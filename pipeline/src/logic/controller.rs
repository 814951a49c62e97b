//! The session controller: one queue, two registries, intents after
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::context::{SessionContext, SessionId};
use crate::logic::events::SessionEvent;
use crate::logic::fsm::FsmRegistry;
use crate::logic::intent::IntentBus;
use crate::logic::link_states::{LinkState, OfflineState, OnlineState};
use crate::logic::replay::ReplaySession;
use crate::logic::session_states::{
    ActiveState, CompletedState, EndingViaGestureState, NotStartedState, SessionPhase,
};
use crate::logic::telemetry::{now_millis, TelemetryPacket, TelemetryRun};
use crate::pose::landmarks::RawLandmark;
use crate::recording::{RecordingCoordinator, UploadOutcome};
use crate::traits::{ClassifierLink, Recorder, VideoUploader};
use log::{debug, info};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Instant;

/// Host-tunable knobs for one controller instance.
pub struct SessionSettings {
    /// Exercise selector sent with every outbound payload
    pub exercise: String,
    /// Account the finished video is filed under; may be empty, in which
    /// case the upload fails locally without a network call
    pub user_id: String,
    /// Base directory for telemetry and replay output
    pub output_dir: PathBuf,
    /// Turns the telemetry sink on or off
    pub telemetry: bool,
}

/// Everything the intent bus may touch when executing side effects. Split
/// out of the controller so the bus can borrow it mutably while the
/// registries and replay stay with the controller.
pub(crate) struct SessionHostData {
    pub(crate) ctx: SessionContext,
    pub(crate) recording: RecordingCoordinator,
    pub(crate) link: Box<dyn ClassifierLink>,
    pub(crate) recorder: Box<dyn Recorder>,
    pub(crate) uploader: Box<dyn VideoUploader>,
    /// Events waiting to be processed, in arrival order. The bus pushes
    /// continuation events (upload failures) onto the back.
    pub(crate) event_queue: VecDeque<SessionEvent>,
    pub(crate) telemetry: TelemetryRun,
    pub(crate) user_id: String,
}

/// Single-threaded event loop around one exercise session. Sources feed the
/// inbox channel from their own threads; each tick drains the inbox into the
/// queue and routes every event through both registries, executing the
/// resulting intents before the next event is looked at.
pub struct SessionController {
    host_data: SessionHostData,
    phase_registry: FsmRegistry<SessionPhase>,
    link_registry: FsmRegistry<LinkState>,
    bus: IntentBus,
    inbox: Receiver<SessionEvent>,
    replay: ReplaySession,
    last_phase_change: Instant,
    last_link_change: Instant,
    max_event_queue_len: usize,
    finished: bool,
}

impl SessionController {
    pub fn new(
        settings: SessionSettings,
        link: Box<dyn ClassifierLink>,
        recorder: Box<dyn Recorder>,
        uploader: Box<dyn VideoUploader>,
        inbox: Receiver<SessionEvent>,
    ) -> Result<Self, anyhow::Error> {
        let telemetry = TelemetryRun::new(settings.telemetry, &settings.output_dir)?;
        info!("session run {}", telemetry.run_id);

        let mut phase_registry = FsmRegistry::new();
        phase_registry.register(SessionPhase::NotStarted, Box::new(NotStartedState));
        phase_registry.register(SessionPhase::Active, Box::new(ActiveState));
        phase_registry.register(SessionPhase::EndingViaGesture, Box::new(EndingViaGestureState));
        phase_registry.register(SessionPhase::Completed, Box::new(CompletedState));

        let mut link_registry = FsmRegistry::new();
        link_registry.register(LinkState::Offline, Box::new(OfflineState));
        link_registry.register(LinkState::Online, Box::new(OnlineState));

        Ok(Self {
            host_data: SessionHostData {
                ctx: SessionContext::new(settings.exercise),
                recording: RecordingCoordinator::new(),
                link,
                recorder,
                uploader,
                event_queue: VecDeque::new(),
                telemetry,
                user_id: settings.user_id,
            },
            phase_registry,
            link_registry,
            bus: IntentBus,
            inbox,
            replay: ReplaySession::default(),
            last_phase_change: Instant::now(),
            last_link_change: Instant::now(),
            max_event_queue_len: 0,
            finished: false,
        })
    }

    pub fn context(&self) -> &SessionContext {
        &self.host_data.ctx
    }

    /// Queue an event directly, bypassing the inbox. Same-thread sources and
    /// tests use this; everything still goes through the one queue.
    pub fn push_event(&mut self, event: SessionEvent) {
        self.host_data.event_queue.push_back(event);
    }

    pub fn push_frame(&mut self, landmarks: Option<Vec<RawLandmark>>) {
        self.push_event(SessionEvent::Frame { landmarks });
    }

    pub fn push_chunk(&mut self, data: Vec<u8>) {
        self.push_event(SessionEvent::Chunk { data });
    }

    pub fn press_start(&mut self) {
        self.push_event(SessionEvent::StartPressed);
    }

    /// True once the session has completed and the recording has reached a
    /// terminal status, so the host loop knows nothing more will happen.
    pub fn session_settled(&self) -> bool {
        self.host_data.ctx.phase == SessionPhase::Completed
            && self.host_data.recording.is_settled()
    }

    /// One pass of the loop: drain the inbox, then process the queue to
    /// empty. Returns false once the session has settled or was shut down.
    pub fn tick(&mut self) -> Result<bool, anyhow::Error> {
        if self.finished {
            return Ok(false);
        }

        loop {
            match self.inbox.try_recv() {
                Ok(event) => self.host_data.event_queue.push_back(event),
                Err(TryRecvError::Empty) => break,
                // Sources gone; whatever is queued still gets processed.
                Err(TryRecvError::Disconnected) => break,
            }
        }

        let queue_len = self.host_data.event_queue.len();
        self.max_event_queue_len = self.max_event_queue_len.max(queue_len);
        self.host_data.telemetry.write(&TelemetryPacket::TickStats {
            ts: now_millis(),
            session: self.host_data.ctx.session_id.clone(),
            phase: self.host_data.ctx.phase.as_str(),
            link: self.host_data.ctx.link.as_str(),
            connected: self.host_data.ctx.is_connected(),
            event_queue_len: queue_len,
            max_event_queue_len: self.max_event_queue_len,
        })?;

        while let Some(event) = self.host_data.event_queue.pop_front() {
            self.replay.record_event(&event);
            self.absorb(&event)?;

            let (next_phase, phase_intents) =
                self.phase_registry
                    .handle(&mut self.host_data.ctx, &event, |c| c.phase);
            let (next_link, link_intents) =
                self.link_registry
                    .handle(&mut self.host_data.ctx, &event, |c| c.link);

            if next_phase != self.host_data.ctx.phase {
                note_duration(
                    &mut self.host_data.telemetry,
                    &self.host_data.ctx.session_id,
                    "phase",
                    self.host_data.ctx.phase.as_str(),
                    &mut self.last_phase_change,
                )?;
            }
            if next_link != self.host_data.ctx.link {
                note_duration(
                    &mut self.host_data.telemetry,
                    &self.host_data.ctx.session_id,
                    "link",
                    self.host_data.ctx.link.as_str(),
                    &mut self.last_link_change,
                )?;
            }

            for intent in link_intents.iter().chain(phase_intents.iter()) {
                self.replay.record_intent(intent);
                self.bus.execute(&mut self.host_data, intent)?;
            }

            // States commit only after the intents they requested have run.
            self.host_data.ctx.phase = next_phase;
            self.host_data.ctx.link = next_link;
        }

        Ok(!self.session_settled())
    }

    /// Host-side bookkeeping that must happen whatever state the session is
    /// in: chunk capture, snapshot telemetry and upload settlement.
    fn absorb(&mut self, event: &SessionEvent) -> Result<(), anyhow::Error> {
        match event {
            SessionEvent::Chunk { data } => {
                self.host_data.recording.absorb_chunk(data.clone());
            }
            SessionEvent::Stats(update) => {
                self.host_data.telemetry.write(&TelemetryPacket::StatsSnapshot {
                    session: self.host_data.ctx.session_id.clone(),
                    ts: now_millis(),
                    reps: update.reps,
                    completed: update.completed,
                    gesture_progress: update.gesture_progress,
                })?;
            }
            SessionEvent::UploadResolved { outcome } => {
                self.host_data.recording.settle(outcome);
                let status = match outcome {
                    UploadOutcome::Uploaded => "uploaded",
                    UploadOutcome::Failed(_) => "failed",
                };
                self.host_data.telemetry.write(&TelemetryPacket::Upload {
                    session: self.host_data.ctx.session_id.clone(),
                    ts: now_millis(),
                    status,
                    bytes: self.host_data.recording.blob_bytes(),
                })?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Tear the session down. Idempotent; safe to call from every exit path.
    /// A still-armed recording is stopped and discarded, never uploaded.
    pub fn shutdown(&mut self, reason: &str) -> Result<(), anyhow::Error> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        if self.host_data.recording.is_armed() {
            if let Err(e) = self.host_data.recorder.stop() {
                debug!("recorder stop during shutdown: {}", e);
            }
            self.host_data.recording.abort();
        }

        self.host_data.telemetry.write(&TelemetryPacket::SessionSummary {
            session: self.host_data.ctx.session_id.clone(),
            ts: now_millis(),
            phase: self.host_data.ctx.phase.as_str(),
            reps: self.host_data.ctx.rep_count,
            frames_seen: self.host_data.ctx.frames.seen,
            frames_forwarded: self.host_data.ctx.frames.forwarded,
            dropped_chunks: self.host_data.recording.dropped_chunks(),
            reason,
        })?;

        if let Some(dir) = self.host_data.telemetry.run_dir() {
            self.replay.save_to(dir.join("replay.json"))?;
        }
        info!("session shut down: {}", reason);
        Ok(())
    }
}

/// Emit how long the FSM spent in the state it is about to leave.
fn note_duration(
    telemetry: &mut TelemetryRun,
    session: &SessionId,
    fsm: &str,
    state: &str,
    since: &mut Instant,
) -> Result<(), anyhow::Error> {
    let duration_ms = since.elapsed().as_millis();
    *since = Instant::now();
    telemetry.write(&TelemetryPacket::StateDuration {
        session: session.clone(),
        ts: now_millis(),
        fsm,
        state,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NO_PERSON_MESSAGE, PARTIAL_BODY_MESSAGE};
    use crate::logic::context::{CameraStatus, UploadIndicator};
    use crate::logic::events::{FramePayload, StatsUpdate};
    use crate::pose::landmarks::RIGHT_ANKLE;
    use crate::recording::UploadRequest;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc;

    #[derive(Default)]
    struct LinkLog {
        frames: Vec<FramePayload>,
        starts: u32,
    }

    struct TestLink(Rc<RefCell<LinkLog>>);

    impl ClassifierLink for TestLink {
        fn send_frame(&mut self, frame: &FramePayload) -> std::io::Result<()> {
            self.0.borrow_mut().frames.push(frame.clone());
            Ok(())
        }

        fn send_start(&mut self) -> std::io::Result<()> {
            self.0.borrow_mut().starts += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecorderLog {
        starts: u32,
        stops: u32,
    }

    /// Confirms each stop through the inbox, like the real device does.
    struct TestRecorder {
        log: Rc<RefCell<RecorderLog>>,
        tx: mpsc::Sender<SessionEvent>,
    }

    impl Recorder for TestRecorder {
        fn start(&mut self) -> Result<(), anyhow::Error> {
            self.log.borrow_mut().starts += 1;
            Ok(())
        }

        fn stop(&mut self) -> Result<(), anyhow::Error> {
            self.log.borrow_mut().stops += 1;
            let _ = self.tx.send(SessionEvent::RecorderStopped);
            Ok(())
        }
    }

    #[derive(Default)]
    struct UploadLog {
        calls: u32,
        last_bytes: usize,
        last_user: String,
        last_reps: u32,
    }

    /// Accepts every request and reports success through the inbox.
    struct TestUploader {
        log: Rc<RefCell<UploadLog>>,
        tx: mpsc::Sender<SessionEvent>,
    }

    impl VideoUploader for TestUploader {
        fn upload(&mut self, request: UploadRequest) -> Result<(), anyhow::Error> {
            let mut log = self.log.borrow_mut();
            log.calls += 1;
            log.last_bytes = request.video.len();
            log.last_user = request.user_id.clone();
            log.last_reps = request.reps;
            let _ = self.tx.send(SessionEvent::UploadResolved {
                outcome: UploadOutcome::Uploaded,
            });
            Ok(())
        }
    }

    struct Rig {
        controller: SessionController,
        link: Rc<RefCell<LinkLog>>,
        recorder: Rc<RefCell<RecorderLog>>,
        uploads: Rc<RefCell<UploadLog>>,
    }

    fn rig_with_user(user_id: &str) -> Rig {
        let (tx, rx) = mpsc::channel();
        let link = Rc::new(RefCell::new(LinkLog::default()));
        let recorder = Rc::new(RefCell::new(RecorderLog::default()));
        let uploads = Rc::new(RefCell::new(UploadLog::default()));
        let controller = SessionController::new(
            SessionSettings {
                exercise: "Push-ups".to_string(),
                user_id: user_id.to_string(),
                output_dir: std::env::temp_dir(),
                telemetry: false,
            },
            Box::new(TestLink(link.clone())),
            Box::new(TestRecorder {
                log: recorder.clone(),
                tx: tx.clone(),
            }),
            Box::new(TestUploader {
                log: uploads.clone(),
                tx,
            }),
            rx,
        )
        .unwrap();
        Rig {
            controller,
            link,
            recorder,
            uploads,
        }
    }

    fn rig() -> Rig {
        rig_with_user("user-1")
    }

    /// The mock continuations arrive through the inbox, so a few ticks are
    /// needed before a session settles.
    fn drain(rig: &mut Rig) {
        for _ in 0..8 {
            if !rig.controller.tick().unwrap() {
                break;
            }
        }
    }

    fn snapshot(reps: u32, completed: bool, gesture: f64) -> SessionEvent {
        SessionEvent::Stats(StatsUpdate {
            reps,
            feedback: "Go!".to_string(),
            stage: Some("down".to_string()),
            completed,
            is_active: !completed,
            gesture_progress: gesture,
            report: None,
        })
    }

    fn body() -> Vec<RawLandmark> {
        (0..33)
            .map(|i| RawLandmark {
                x: i as f64 * 0.01,
                y: 0.5,
                z: 0.0,
                visibility: 0.9,
            })
            .collect()
    }

    #[test]
    fn full_session_reaches_uploaded() {
        let mut rig = rig();
        rig.controller.push_event(SessionEvent::LinkUp);
        rig.controller.push_frame(Some(body()));
        rig.controller.press_start();
        drain(&mut rig);
        assert_eq!(rig.controller.context().phase(), SessionPhase::Active);

        rig.controller.push_chunk(vec![1, 2, 3]);
        rig.controller.push_chunk(vec![4]);
        rig.controller.push_event(snapshot(3, false, 0.0));
        rig.controller.push_event(snapshot(5, true, 0.0));
        drain(&mut rig);

        assert_eq!(rig.controller.context().phase(), SessionPhase::Completed);
        assert_eq!(rig.controller.context().rep_count, 5);
        assert_eq!(rig.controller.context().upload, UploadIndicator::Uploaded);
        assert!(rig.controller.session_settled());

        let uploads = rig.uploads.borrow();
        assert_eq!(uploads.calls, 1);
        assert_eq!(uploads.last_bytes, 4);
        assert_eq!(uploads.last_user, "user-1");
        assert_eq!(uploads.last_reps, 5);
        assert_eq!(rig.recorder.borrow().starts, 1);
        assert_eq!(rig.recorder.borrow().stops, 1);

        let link = rig.link.borrow();
        assert_eq!(link.starts, 1);
        assert_eq!(link.frames.len(), 1);
    }

    #[test]
    fn missing_user_id_fails_without_a_network_call() {
        let mut rig = rig_with_user("");
        rig.controller.press_start();
        rig.controller.push_chunk(vec![9; 16]);
        rig.controller.push_event(snapshot(2, true, 0.0));
        drain(&mut rig);

        assert_eq!(rig.uploads.borrow().calls, 0);
        assert_eq!(rig.controller.context().upload, UploadIndicator::Failed);
        assert!(rig.controller.session_settled());
    }

    #[test]
    fn chunks_outside_the_recording_window_are_dropped() {
        let mut rig = rig();
        rig.controller.push_chunk(vec![1, 2]);
        drain(&mut rig);

        rig.controller.press_start();
        rig.controller.push_chunk(vec![3]);
        rig.controller.push_event(snapshot(1, true, 0.0));
        drain(&mut rig);

        assert_eq!(rig.controller.host_data.recording.dropped_chunks(), 1);
        assert_eq!(rig.uploads.borrow().last_bytes, 1);
    }

    #[test]
    fn disconnect_mid_session_only_flips_the_indicator() {
        let mut rig = rig();
        rig.controller.push_event(SessionEvent::LinkUp);
        rig.controller.press_start();
        rig.controller.push_event(snapshot(2, false, 0.0));
        rig.controller.push_event(SessionEvent::LinkDown);
        rig.controller.push_event(snapshot(4, false, 0.0));
        drain(&mut rig);

        assert!(!rig.controller.context().is_connected());
        assert_eq!(rig.controller.context().phase(), SessionPhase::Active);
        assert_eq!(rig.controller.context().rep_count, 4);

        rig.controller.push_event(SessionEvent::LinkUp);
        drain(&mut rig);
        assert!(rig.controller.context().is_connected());
    }

    #[test]
    fn completion_fires_exactly_once() {
        let mut rig = rig();
        rig.controller.press_start();
        rig.controller.push_event(snapshot(5, true, 0.0));
        rig.controller.push_event(snapshot(6, true, 0.0));
        rig.controller.push_event(snapshot(7, true, 0.0));
        drain(&mut rig);

        assert_eq!(rig.recorder.borrow().stops, 1);
        assert_eq!(rig.uploads.borrow().calls, 1);
        // The duplicates landed after the terminal transition and were
        // ignored, reps included.
        assert_eq!(rig.controller.context().rep_count, 5);
        assert_eq!(rig.uploads.borrow().last_reps, 5);
    }

    #[test]
    fn gesture_hold_completes_the_session() {
        let mut rig = rig();
        rig.controller.press_start();
        rig.controller.push_event(snapshot(1, false, 30.0));
        drain(&mut rig);
        assert_eq!(
            rig.controller.context().phase(),
            SessionPhase::EndingViaGesture
        );
        assert_eq!(rig.controller.context().gesture_progress, 30.0);

        rig.controller.push_event(snapshot(2, false, 100.0));
        drain(&mut rig);
        assert_eq!(rig.controller.context().phase(), SessionPhase::Completed);
        assert_eq!(rig.uploads.borrow().calls, 1);
        assert_eq!(rig.uploads.borrow().last_reps, 2);
    }

    #[test]
    fn camera_failure_degrades_but_the_session_lives() {
        let mut rig = rig();
        rig.controller.press_start();
        rig.controller.push_event(SessionEvent::CameraFailed {
            reason: "no device".to_string(),
        });
        rig.controller.push_event(snapshot(1, false, 0.0));
        drain(&mut rig);

        assert_eq!(
            rig.controller.context().camera,
            CameraStatus::Failed("no device".to_string())
        );
        assert_eq!(rig.controller.context().phase(), SessionPhase::Active);
        assert_eq!(rig.controller.context().rep_count, 1);
    }

    #[test]
    fn frames_after_completion_stay_local() {
        let mut rig = rig();
        rig.controller.push_event(SessionEvent::LinkUp);
        rig.controller.press_start();
        rig.controller.push_event(snapshot(1, true, 0.0));
        drain(&mut rig);
        assert_eq!(rig.controller.context().phase(), SessionPhase::Completed);

        rig.controller.push_frame(Some(body()));
        drain(&mut rig);

        assert_eq!(rig.link.borrow().frames.len(), 0);
        assert_eq!(rig.controller.context().frames.seen, 1);
        assert_eq!(rig.controller.context().frames.forwarded, 0);
        assert!(rig.controller.context().body_visible);
    }

    #[test]
    fn partial_body_prompts_but_still_forwards() {
        let mut rig = rig();
        rig.controller.push_event(SessionEvent::LinkUp);
        rig.controller.press_start();

        let mut points = body();
        points[RIGHT_ANKLE].visibility = 0.2;
        rig.controller.push_frame(Some(points));
        rig.controller.push_frame(None);
        drain(&mut rig);

        let ctx = rig.controller.context();
        assert_eq!(ctx.user_message, Some(NO_PERSON_MESSAGE));
        assert_eq!(ctx.frames.seen, 2);
        assert_eq!(ctx.frames.without_body, 2);
        // The low-visibility frame was still normalized and sent.
        assert_eq!(ctx.frames.forwarded, 1);
        assert_eq!(rig.link.borrow().frames.len(), 1);

        rig.controller.push_frame({
            let mut points = body();
            points[RIGHT_ANKLE].visibility = 0.2;
            Some(points)
        });
        drain(&mut rig);
        assert_eq!(
            rig.controller.context().user_message,
            Some(PARTIAL_BODY_MESSAGE)
        );
    }

    #[test]
    fn shutdown_aborts_an_unfinished_recording() {
        let mut rig = rig();
        rig.controller.press_start();
        rig.controller.push_chunk(vec![1, 2, 3]);
        drain(&mut rig);

        rig.controller.shutdown("host teardown").unwrap();
        assert_eq!(rig.recorder.borrow().stops, 1);
        assert_eq!(rig.uploads.borrow().calls, 0);
        assert!(!rig.controller.tick().unwrap());

        // A second shutdown is a no-op.
        rig.controller.shutdown("again").unwrap();
        assert_eq!(rig.recorder.borrow().stops, 1);
    }
}
