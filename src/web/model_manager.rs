// Model pull/delete orchestration over the progress store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::web::error::OllamaError;
use crate::web::models::PullFrame;
use crate::web::ndjson::NdjsonDecoder;
use crate::web::ollama::OllamaClient;
use crate::web::progress::{ProgressRecord, ProgressStore};
use crate::{sys_debug, sys_info, sys_warn};

lazy_static! {
    static ref MODEL_NAME: Regex = Regex::new(r"^[a-zA-Z0-9._:-]+$").unwrap();
}

/// Reject empty or suspicious model names before any network call.
pub fn validate_model_name(name: &str) -> Result<(), OllamaError> {
    if name.is_empty() || !MODEL_NAME.is_match(name) {
        return Err(OllamaError::InvalidModelName(name.to_string()));
    }
    Ok(())
}

pub struct ModelManager {
    client: OllamaClient,
    progress: Arc<ProgressStore>,
    clear_delay: Duration,
    /// Abort handle per in-flight pull, keyed by model name.
    pulls: Mutex<HashMap<String, CancellationToken>>,
}

impl ModelManager {
    pub fn new(client: OllamaClient, progress: Arc<ProgressStore>, clear_delay: Duration) -> Self {
        Self {
            client,
            progress,
            clear_delay,
            pulls: Mutex::new(HashMap::new()),
        }
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    /// Pull a model, publishing normalized progress under its name.
    ///
    /// Success leaves a final `{verifying, 100}` record, refreshes the model
    /// list, then clears the key after a short delay so late readers still
    /// see the completed state. Failures leave the last record in place,
    /// annotated with the failure message.
    pub async fn pull(&self, name: &str) -> Result<(), OllamaError> {
        validate_model_name(name)?;

        let cancel = CancellationToken::new();
        {
            let mut pulls = self.pulls.lock().unwrap_or_else(|e| e.into_inner());
            pulls.insert(name.to_string(), cancel.clone());
        }

        let result = self.pull_inner(name, &cancel).await;

        {
            let mut pulls = self.pulls.lock().unwrap_or_else(|e| e.into_inner());
            pulls.remove(name);
        }

        if let Err(e) = &result {
            if !e.is_cancelled() {
                self.annotate_failure(name, &e.user_message());
            }
        }
        result
    }

    /// Abort an in-flight pull. Returns false when nothing is pulling the
    /// given name.
    pub fn abort_pull(&self, name: &str) -> bool {
        let pulls = self.pulls.lock().unwrap_or_else(|e| e.into_inner());
        match pulls.get(name) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn pull_inner(&self, name: &str, cancel: &CancellationToken) -> Result<(), OllamaError> {
        sys_info!("[MODELS] Pulling {}", name);
        self.progress.set_record(
            name,
            ProgressRecord::new("downloading", 0, 0).with_message("Starting pull"),
        );

        let mut body = tokio::select! {
            _ = cancel.cancelled() => return self.finish_cancelled(name),
            result = self.client.pull_stream(name) => result?,
        };

        let mut decoder = NdjsonDecoder::new();
        let mut frames: Vec<PullFrame> = Vec::new();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return self.finish_cancelled(name),
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    decoder.feed(&bytes, |value| collect_frame(value, &mut frames));
                    self.apply_frames(name, &mut frames)?;
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    decoder.finish(|value| collect_frame(value, &mut frames));
                    self.apply_frames(name, &mut frames)?;
                    break;
                }
            }
        }

        self.finish_success(name).await;
        Ok(())
    }

    fn apply_frames(&self, name: &str, frames: &mut Vec<PullFrame>) -> Result<(), OllamaError> {
        for frame in frames.drain(..) {
            if let Some(message) = frame.error {
                return Err(OllamaError::Server(message));
            }
            let raw = frame.status.unwrap_or_default();
            let lower = raw.to_lowercase();
            if lower == "success" {
                self.progress.set_record(name, self.completed_record(name));
                continue;
            }
            let phase = if lower.contains("verifying") {
                "verifying"
            } else {
                "downloading"
            };
            // The daemon's raw status line rides along in `message`
            let mut record = ProgressRecord::new(
                phase,
                frame.completed.unwrap_or(0),
                frame.total.unwrap_or(0),
            );
            if !raw.is_empty() {
                record = record.with_message(raw);
            }
            self.progress.set_record(name, record);
        }
        Ok(())
    }

    /// Terminal success record: verifying at 100%, byte counts carried over
    /// from the last reported total.
    fn completed_record(&self, name: &str) -> ProgressRecord {
        let total = self.progress.get(name).map(|r| r.total).unwrap_or(0);
        let mut record = ProgressRecord::new("verifying", total, total);
        record.percentage = 100;
        record
    }

    async fn finish_success(&self, name: &str) {
        self.progress.set_record(name, self.completed_record(name));
        self.refresh_models().await;
        sys_info!("[MODELS] Pull of {} complete", name);

        // Leave the completed record visible briefly, then clear it
        let progress = self.progress.clone();
        let key = name.to_string();
        let delay = self.clear_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            progress.clear(&key);
        });
    }

    fn finish_cancelled(&self, name: &str) -> Result<(), OllamaError> {
        sys_info!("[MODELS] Pull of {} aborted", name);
        self.progress.clear(name);
        Err(OllamaError::Cancelled)
    }

    /// Failures stay in the downloading phase; the message carries the
    /// failure text and the last counts stay in place.
    fn annotate_failure(&self, name: &str, message: &str) {
        let mut record = self
            .progress
            .get(name)
            .unwrap_or_else(|| ProgressRecord::new("downloading", 0, 0));
        record.status = "downloading".to_string();
        record.message = Some(message.to_string());
        self.progress.set_record(name, record);
        sys_warn!("[MODELS] Pull of {} failed: {}", name, message);
    }

    /// Delete an installed model. The store key is cleared and the list
    /// refreshed only on success; failure leaves the store untouched.
    pub async fn remove(&self, name: &str) -> Result<(), OllamaError> {
        validate_model_name(name)?;
        self.client.delete_model(name).await?;
        self.progress.clear(name);
        self.refresh_models().await;
        sys_info!("[MODELS] Deleted {}", name);
        Ok(())
    }

    async fn refresh_models(&self) {
        match self.client.list_tags().await {
            Ok(tags) => sys_debug!("[MODELS] Refreshed list: {} installed", tags.models.len()),
            Err(e) => sys_warn!("[MODELS] List refresh failed: {}", e),
        }
    }
}

fn collect_frame(value: serde_json::Value, frames: &mut Vec<PullFrame>) {
    match serde_json::from_value::<PullFrame>(value) {
        Ok(frame) => frames.push(frame),
        Err(e) => sys_debug!("[MODELS] Skipping unrecognized pull frame: {}", e),
    }
}
