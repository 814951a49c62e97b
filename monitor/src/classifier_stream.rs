//! WebSocket link to the exercise classifier
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use repwatch_pipeline::logic::events::{FramePayload, SessionEvent, StatsUpdate};
use repwatch_pipeline::traits::ClassifierLink;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

/// How long one blocking read may hold the socket before the worker checks
/// the outbound queue and the shutdown flag again.
const READ_SLICE_MS: u64 = 50;
/// Pause between redial attempts, counted in read slices.
const RECONNECT_SLICES: u32 = 20;

/// Outbound messages, tagged the way the classifier's protocol expects. The
/// start command is tag-only; the classifier keys the exercise off the frames.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Outbound<'a> {
    ProcessData(&'a FramePayload),
    StartSession,
}

/// Inbound messages. Anything that does not parse is dropped with a log
/// line; the classifier may grow message kinds we do not know about.
#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Inbound {
    StatsUpdate(StatsUpdate),
}

/// Client side of the classifier socket. The handle only serializes and
/// queues; a worker thread owns the connection, redials when it drops and
/// turns inbound snapshots into session events. Messages queued while the
/// link is down are discarded, not replayed on reconnect.
pub struct ClassifierStream {
    outbound: Sender<String>,
    shutdown: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ClassifierStream {
    pub fn connect(url: String, events: Sender<SessionEvent>) -> Result<Self, anyhow::Error> {
        let (outbound_tx, outbound_rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let worker = thread::Builder::new()
            .name("classifier-link".to_string())
            .spawn(move || worker_loop(&url, &events, &outbound_rx, &flag))?;
        Ok(Self {
            outbound: outbound_tx,
            shutdown,
            worker: Some(worker),
        })
    }

    fn enqueue<T: Serialize>(&self, message: &T) -> io::Result<()> {
        let text = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.outbound
            .send(text)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "classifier worker is gone"))
    }
}

impl ClassifierLink for ClassifierStream {
    fn send_frame(&mut self, frame: &FramePayload) -> io::Result<()> {
        self.enqueue(&Outbound::ProcessData(frame))
    }

    fn send_start(&mut self) -> io::Result<()> {
        self.enqueue(&Outbound::StartSession)
    }
}

impl Drop for ClassifierStream {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    url: &str,
    events: &Sender<SessionEvent>,
    outbound: &Receiver<String>,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match tungstenite::connect(url) {
            Ok((mut socket, _response)) => {
                info!("classifier link established at {}", url);
                set_read_slice(&socket);
                let _ = events.send(SessionEvent::LinkUp);
                serve_connection(&mut socket, events, outbound, shutdown);
                let _ = socket.close(None);
                if shutdown.load(Ordering::Relaxed) {
                    return;
                }
                let _ = events.send(SessionEvent::LinkDown);
            }
            Err(e) => {
                debug!("classifier connect failed: {}", e);
            }
        }

        // Silently drop whatever queued up while the link is down, then
        // pause before redialing.
        for _ in 0..RECONNECT_SLICES {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            while outbound.try_recv().is_ok() {}
            thread::sleep(Duration::from_millis(READ_SLICE_MS));
        }
    }
}

/// Runs one established connection until it drops, the peer closes, or a
/// shutdown is requested. Reads are sliced by the socket timeout so the
/// outbound queue never starves.
fn serve_connection(
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
    events: &Sender<SessionEvent>,
    outbound: &Receiver<String>,
    shutdown: &AtomicBool,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }

        loop {
            match outbound.try_recv() {
                Ok(text) => {
                    if let Err(e) = socket.send(Message::Text(text)) {
                        warn!("classifier send failed: {}", e);
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                Ok(Inbound::StatsUpdate(update)) => {
                    let _ = events.send(SessionEvent::Stats(update));
                }
                Err(e) => debug!("unparseable classifier message: {}", e),
            },
            Ok(Message::Close(_)) => {
                info!("classifier closed the connection");
                return;
            }
            // Pings are answered by the library; binary frames are not part
            // of the protocol.
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => {
                warn!("classifier read failed: {}", e);
                return;
            }
        }
    }
}

fn set_read_slice(socket: &WebSocket<MaybeTlsStream<TcpStream>>) {
    if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
        if let Err(e) = stream.set_read_timeout(Some(Duration::from_millis(READ_SLICE_MS))) {
            warn!("could not set the socket read timeout: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repwatch_pipeline::pose::landmarks::RawLandmark;
    use repwatch_pipeline::pose::normalize::NormalizedPose;
    use std::collections::BTreeMap;
    use std::net::TcpListener;

    #[test]
    fn outbound_wire_format_is_tagged() {
        let mut landmarks = NormalizedPose::new();
        landmarks.insert(
            "left_hip".to_string(),
            RawLandmark {
                x: -0.1,
                y: 0.0,
                z: 0.0,
                visibility: 0.9,
            },
        );
        let mut angles = BTreeMap::new();
        angles.insert("left_elbow".to_string(), 90.0);
        let payload = FramePayload {
            exercise: "Push-ups".to_string(),
            landmarks,
            angles,
        };

        let json = serde_json::to_value(Outbound::ProcessData(&payload)).unwrap();
        assert_eq!(json["kind"], "process_data");
        assert_eq!(json["type"], "Push-ups");
        assert_eq!(json["landmarks"]["left_hip"]["x"], -0.1);
        assert_eq!(json["angles"]["left_elbow"], 90.0);

        let json = serde_json::to_value(Outbound::StartSession).unwrap();
        assert_eq!(json["kind"], "start_session");
        // The start command is the tag and nothing else.
        assert_eq!(json.as_object().unwrap().len(), 1);
    }

    #[test]
    fn inbound_snapshot_parses_camel_case() {
        let text = r#"{"kind":"stats_update","reps":4,"feedback":"Go!","stage":"up","completed":false,"isActive":true,"gestureProgress":12.5}"#;
        let Inbound::StatsUpdate(update) = serde_json::from_str(text).unwrap();
        assert_eq!(update.reps, 4);
        assert_eq!(update.feedback, "Go!");
        assert_eq!(update.stage.as_deref(), Some("up"));
        assert!(!update.completed);
        assert!(update.is_active);
        assert_eq!(update.gesture_progress, 12.5);
    }

    #[test]
    fn stream_round_trips_with_a_live_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || -> String {
            let (stream, _) = listener.accept().unwrap();
            let mut socket = tungstenite::accept(stream).unwrap();
            let received = loop {
                if let Message::Text(text) = socket.read().unwrap() {
                    break text;
                }
            };
            socket
                .send(Message::Text(
                    r#"{"kind":"stats_update","reps":2,"feedback":"Go!","completed":false,"isActive":true,"gestureProgress":0.0}"#
                        .to_string(),
                ))
                .unwrap();
            // Hold the socket open until the client hangs up.
            loop {
                match socket.read() {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            received
        });

        let (events_tx, events_rx) = mpsc::channel();
        let mut link = ClassifierStream::connect(format!("ws://{addr}"), events_tx).unwrap();

        assert!(matches!(
            events_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            SessionEvent::LinkUp
        ));

        link.send_start().unwrap();

        let event = events_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let SessionEvent::Stats(update) = &event else {
            panic!("expected a snapshot, got {:?}", event);
        };
        assert_eq!(update.reps, 2);

        drop(link);
        let received = server.join().unwrap();
        assert_eq!(received, r#"{"kind":"start_session"}"#);
    }
}
