//! Seams between the pipeline and the host's transports
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::events::FramePayload;
use crate::recording::UploadRequest;
use std::io;

/// Outbound side of the classifier connection. Implementations own delivery;
/// a send while the socket is down may be silently dropped. The start command
/// is bare; the exercise selector rides on every frame instead.
pub trait ClassifierLink {
    fn send_frame(&mut self, frame: &FramePayload) -> io::Result<()>;
    fn send_start(&mut self) -> io::Result<()>;
}

/// Control surface of the capture device. `stop` is asynchronous by contract:
/// the final chunk set is only complete once a RecorderStopped event arrives
/// on the session queue.
pub trait Recorder {
    fn start(&mut self) -> Result<(), anyhow::Error>;
    fn stop(&mut self) -> Result<(), anyhow::Error>;
}

/// Fire-and-forget video upload. Implementations must not block the caller;
/// the outcome comes back as an UploadResolved event.
pub trait VideoUploader {
    fn upload(&mut self, request: UploadRequest) -> Result<(), anyhow::Error>;
}
