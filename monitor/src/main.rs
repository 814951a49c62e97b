//! Repwatch monitor: drives one exercise session end to end
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate log;

use docopt::Docopt;
use repwatch_pipeline::logic::context::SessionContext;
use repwatch_pipeline::logic::controller::{SessionController, SessionSettings};
use repwatch_pipeline::logic::events::SessionEvent;
use repwatch_pipeline::logic::session_states::SessionPhase;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

mod classifier_stream;
use crate::classifier_stream::ClassifierStream;
mod config;
use crate::config::MonitorConfig;
mod recorder;
use crate::recorder::ScriptRecorder;
mod script;
use crate::script::{ScriptPlayer, SessionScript};
mod upload;
use crate::upload::HttpUploader;

/// Idle pacing of the settle loop after the script has run out.
const TICK_INTERVAL: Duration = Duration::from_millis(20);
/// How long to wait for the stop-and-upload chain after completion.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

const USAGE: &str = "
Repwatch monitor: plays a scripted pose session against the exercise classifier, tracks the session lifecycle and uploads the finished recording.

Usage:
  repwatch-monitor [--config FILE] [--script FILE] [--user-id ID] [--output-dir DIR] [--no-telemetry]
  repwatch-monitor (--version | -v)
  repwatch-monitor (--help | -h)

Options:
    --config FILE       Path of the monitor configuration [default: monitor.yaml]
    --script FILE       Session script to play [default: session.json]
    --user-id ID        Override the configured user id
    --output-dir DIR    Override the configured output directory
    --no-telemetry      Disable the telemetry and replay sink
    --version, -v       Show version
    --help, -h          Show help
";

#[derive(Debug, Deserialize)]
struct Args {
    flag_config: String,
    flag_script: String,
    flag_user_id: Option<String>,
    flag_output_dir: Option<String>,
    flag_no_telemetry: bool,
}

fn main() {
    let version = env!("CARGO_PKG_NAME").to_string() + ", version: " + env!("CARGO_PKG_VERSION");
    env_logger::init();

    let args: Args = Docopt::new(USAGE)
        .map(|d| d.help(true))
        .map(|d| d.version(Some(version)))
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    if let Err(e) = run(&args) {
        error!("{:#}", e);
        exit(1);
    }
}

fn run(args: &Args) -> Result<(), anyhow::Error> {
    let config = MonitorConfig::load(Path::new(&args.flag_config))?;
    let script = SessionScript::load(Path::new(&args.flag_script))?;
    let user_id = args
        .flag_user_id
        .clone()
        .unwrap_or_else(|| config.user_id.clone());
    let output_dir = args
        .flag_output_dir
        .clone()
        .unwrap_or_else(|| config.output_dir.clone());

    let (tx, rx) = mpsc::channel();

    let link = ClassifierStream::connect(config.classifier_url.clone(), tx.clone())?;
    let recorder = ScriptRecorder::new(tx.clone());
    let armed = recorder.armed_flag();
    let uploader = HttpUploader::new(config.upload_url.clone(), tx)?;

    let mut controller = SessionController::new(
        SessionSettings {
            exercise: config.exercise.clone(),
            user_id,
            output_dir: PathBuf::from(&output_dir),
            telemetry: !args.flag_no_telemetry,
        },
        Box::new(link),
        Box::new(recorder),
        Box::new(uploader),
        rx,
    )?;

    let mut player = ScriptPlayer::new(
        script,
        armed,
        Duration::from_millis(config.frame_interval_ms),
    );
    let outcome = drive(&mut controller, &mut player);
    match &outcome {
        Ok(()) => controller.shutdown("script complete")?,
        Err(e) => controller.shutdown(&format!("monitor error: {e:#}"))?,
    }
    report(controller.context());
    outcome
}

/// Interleaves script playback with controller ticks, then waits for the
/// upload chain if a session completed.
fn drive(
    controller: &mut SessionController,
    player: &mut ScriptPlayer,
) -> Result<(), anyhow::Error> {
    controller.push_event(SessionEvent::CameraReady);

    loop {
        let more = player.advance(controller);
        let live = controller.tick()?;
        if !live {
            // Settled with script to spare; the remaining steps are moot.
            break;
        }
        if !more {
            break;
        }
    }

    if controller.context().phase() == SessionPhase::Completed {
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        while controller.tick()? {
            if Instant::now() >= deadline {
                warn!("session did not settle within {:?}", SETTLE_TIMEOUT);
                break;
            }
            thread::sleep(TICK_INTERVAL);
        }
    }
    Ok(())
}

fn report(ctx: &SessionContext) {
    info!(
        "Session finished in phase {} with {} reps. Frames: {} seen, {} forwarded. Upload: {:?}.",
        ctx.phase(),
        ctx.rep_count,
        ctx.frames.seen,
        ctx.frames.forwarded,
        ctx.upload
    );
    if let Some(report) = &ctx.report {
        info!("Form score {}: {}", report.score, report.summary);
        for mistake in &report.mistakes {
            info!("  - {}", mistake);
        }
    }
}
