//! Side effects requested by state handlers and the bus that executes them
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::controller::SessionHostData;
use crate::logic::events::{FramePayload, SessionEvent};
use crate::logic::telemetry::{now_millis, TelemetryPacket};
use crate::recording::UploadOutcome;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

/// Actions a state handler can request. Handlers stay pure; all transport and
/// recording side effects go through the bus so they can be replayed and
/// tested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Intent {
    /// Send the per-frame payload to the classifier
    ForwardFrame(FramePayload),
    /// Tell the classifier to reset its counters and go active
    AnnounceStart,
    /// Arm the artifact and start the capture device
    StartRecording,
    /// Ask the capture device to stop; RecorderStopped follows on the queue
    StopRecording,
    /// Finalize the artifact and hand it to the uploader
    BeginUpload { reps: u32 },
    /// Structured record of an FSM transition
    LogTransition {
        from: String,
        to: String,
        triggered_by: Option<SessionEvent>,
        reason: String,
    },
    /// Does nothing (placeholder)
    NoOp,
}

/// Dispatches intents against the host seams, emitting telemetry per intent.
pub(crate) struct IntentBus;

impl IntentBus {
    /// Applies an intent, possibly mutating the recording coordinator,
    /// writing to transports, or queuing follow-up events.
    pub(crate) fn execute(
        &self,
        host_data: &mut SessionHostData,
        intent: &Intent,
    ) -> Result<(), anyhow::Error> {
        // NoOp is ambient filler from Stay decisions; not worth a log line.
        if matches!(intent, Intent::NoOp) {
            return Ok(());
        }

        host_data
            .telemetry
            .write(&TelemetryPacket::IntentTriggered {
                session: host_data.ctx.session_id.clone(),
                intent,
                ts: now_millis(),
            })?;

        match intent {
            Intent::ForwardFrame(payload) => match host_data.link.send_frame(payload) {
                Ok(()) => host_data.ctx.frames.forwarded += 1,
                // The link owns delivery; a dropped frame is routine.
                Err(e) => debug!("frame not delivered: {}", e),
            },

            Intent::AnnounceStart => {
                if let Err(e) = host_data.link.send_start() {
                    error!("could not announce session start to the classifier: {}", e);
                }
            }

            Intent::StartRecording => {
                host_data.recording.begin();
                if let Err(e) = host_data.recorder.start() {
                    error!("recorder failed to start: {}", e);
                    host_data.recording.abort();
                }
            }

            Intent::StopRecording => {
                if let Err(e) = host_data.recorder.stop() {
                    // The stop confirmation will never arrive; fail the
                    // artifact now so the session can still settle.
                    let reason = format!("recorder failed to stop: {e}");
                    host_data.recording.mark_failed(&reason);
                    host_data.event_queue.push_back(SessionEvent::UploadResolved {
                        outcome: UploadOutcome::Failed(reason),
                    });
                }
            }

            Intent::BeginUpload { reps } => self.begin_upload(host_data, *reps)?,

            Intent::LogTransition {
                from,
                to,
                triggered_by: _triggered_by,
                reason,
            } => {
                info!("{} -> {} ({})", from, to, reason);
                host_data.telemetry.write(&TelemetryPacket::FsmTransition {
                    session: host_data.ctx.session_id.clone(),
                    from: from.as_str(),
                    to: to.as_str(),
                    reason: reason.as_str(),
                })?;
            }

            Intent::NoOp => {}
        }

        Ok(())
    }

    /// The second half of the stop-and-upload chain, entered once the
    /// recorder has confirmed its stop. Precondition failures are terminal
    /// locally and never reach the uploader.
    fn begin_upload(
        &self,
        host_data: &mut SessionHostData,
        reps: u32,
    ) -> Result<(), anyhow::Error> {
        let Some(blob) = host_data.recording.finalize() else {
            // Duplicate continuation, or capture never armed. Only the latter
            // needs a resolution pushed; a finalized artifact already has one
            // in flight.
            if host_data.recording.status().is_none() {
                warn!("no recording artifact to upload");
                host_data.event_queue.push_back(SessionEvent::UploadResolved {
                    outcome: UploadOutcome::Failed("no recording artifact".to_string()),
                });
            }
            return Ok(());
        };

        let bytes = blob.len();
        let request = host_data.recording.upload_request(
            blob,
            &host_data.user_id,
            &host_data.ctx.exercise,
            reps,
        );

        match request {
            Ok(request) => {
                host_data.telemetry.write(&TelemetryPacket::Upload {
                    session: host_data.ctx.session_id.clone(),
                    ts: now_millis(),
                    status: "uploading",
                    bytes,
                })?;
                info!("uploading {} bytes for {} reps", bytes, reps);
                if let Err(e) = host_data.uploader.upload(request) {
                    let reason = format!("uploader refused the request: {e}");
                    host_data.recording.mark_failed(&reason);
                    host_data.event_queue.push_back(SessionEvent::UploadResolved {
                        outcome: UploadOutcome::Failed(reason),
                    });
                }
            }
            Err(e) => {
                host_data.telemetry.write(&TelemetryPacket::Upload {
                    session: host_data.ctx.session_id.clone(),
                    ts: now_millis(),
                    status: "failed",
                    bytes,
                })?;
                host_data.event_queue.push_back(SessionEvent::UploadResolved {
                    outcome: UploadOutcome::Failed(e.to_string()),
                });
            }
        }

        Ok(())
    }
}
