//! One-shot multipart upload of the finished session video
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use repwatch_pipeline::logic::events::SessionEvent;
use repwatch_pipeline::recording::{UploadError, UploadOutcome, UploadRequest};
use repwatch_pipeline::traits::VideoUploader;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Posts finished recordings to the backend. Each upload runs on its own
/// thread and reports back through the event queue; there is no retry, a
/// failed upload stays failed.
pub struct HttpUploader {
    client: Client,
    url: String,
    events: mpsc::Sender<SessionEvent>,
}

impl HttpUploader {
    pub fn new(url: String, events: mpsc::Sender<SessionEvent>) -> Result<Self, anyhow::Error> {
        let client = Client::builder().timeout(UPLOAD_TIMEOUT).build()?;
        Ok(Self {
            client,
            url,
            events,
        })
    }
}

impl VideoUploader for HttpUploader {
    fn upload(&mut self, request: UploadRequest) -> Result<(), anyhow::Error> {
        let client = self.client.clone();
        let url = self.url.clone();
        let events = self.events.clone();
        thread::Builder::new()
            .name("video-upload".to_string())
            .spawn(move || {
                let outcome = post_video(&client, &url, request);
                match &outcome {
                    UploadOutcome::Uploaded => {
                        info!("Video successfully uploaded to the server.")
                    }
                    UploadOutcome::Failed(reason) => error!("Video upload failed: {}", reason),
                }
                let _ = events.send(SessionEvent::UploadResolved { outcome });
            })?;
        Ok(())
    }
}

fn post_video(client: &Client, url: &str, request: UploadRequest) -> UploadOutcome {
    let part = match Part::bytes(request.video)
        .file_name(request.file_name)
        .mime_str(request.mime)
    {
        Ok(part) => part,
        Err(e) => return UploadOutcome::Failed(UploadError::Transport(e.to_string()).to_string()),
    };
    let form = Form::new()
        .part("video", part)
        .text("userId", request.user_id)
        .text("exerciseType", request.exercise)
        .text("reps", request.reps.to_string());

    match client.post(url).multipart(form).send() {
        Ok(response) if response.status().is_success() => UploadOutcome::Uploaded,
        Ok(response) => UploadOutcome::Failed(
            UploadError::Rejected {
                status: response.status().as_u16(),
            }
            .to_string(),
        ),
        Err(e) => UploadOutcome::Failed(UploadError::Transport(e.to_string()).to_string()),
    }
}
