// One chat turn from request to terminal state.
//
// A `ChatTurn` carries the explicit state machine, the append-only
// accumulated response, and the cancellation token for exactly one send.
// `run_turn` drives the network side and reports each content delta together
// with the thinking/response split of the full accumulated text.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::web::error::OllamaError;
use crate::web::models::{is_vision_model, ChatMessage, Role, StreamFrame, WireFormat};
use crate::web::ndjson::NdjsonDecoder;
use crate::web::ollama::OllamaClient;
use crate::web::thinking::{split_thinking, ThinkingSplit};
use crate::{sys_debug, sys_error, sys_warn};

/// Written into an empty assistant response when the turn fails before any
/// content arrived.
pub const RESPONSE_ERROR_MESSAGE: &str = "Error: Failed to get response from Ollama server.";

/// Lifecycle of one turn. `Done` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    Idle,
    Sending,
    Streaming,
    Cancelling,
    Errored,
    Done,
}

/// How a turn ended when it did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Cancelled,
}

/// Parameters for one send.
#[derive(Debug, Clone)]
pub struct ChatRequestSpec {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Base64 image attached to the latest user message, vision models only.
    pub image: Option<String>,
    pub format: WireFormat,
    pub stream: bool,
}

pub struct ChatTurn {
    id: String,
    state: Mutex<TurnState>,
    accumulated: Mutex<String>,
    cancel: CancellationToken,
}

impl ChatTurn {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            state: Mutex::new(TurnState::Idle),
            accumulated: Mutex::new(String::new()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TurnState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Request cancellation. Partial content already accumulated stays.
    pub fn cancel(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(*state, TurnState::Sending | TurnState::Streaming) {
                *state = TurnState::Cancelling;
            }
        }
        self.cancel.cancel();
    }

    /// The accumulated assistant response so far.
    pub fn response(&self) -> String {
        self.accumulated.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, next: TurnState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    fn append(&self, delta: &str) -> String {
        let mut acc = self.accumulated.lock().unwrap_or_else(|e| e.into_inner());
        acc.push_str(delta);
        acc.clone()
    }

    fn is_empty(&self) -> bool {
        self.accumulated.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

/// Drive one turn to a terminal state. `on_update` fires once per non-empty
/// content delta with the split of the full accumulated text.
pub async fn run_turn(
    turn: &ChatTurn,
    client: &OllamaClient,
    mut spec: ChatRequestSpec,
    mut on_update: impl FnMut(&str, &ThinkingSplit),
) -> Result<TurnOutcome, OllamaError> {
    turn.set_state(TurnState::Sending);
    attach_image(&mut spec);

    let result = drive(turn, client, &spec, &mut on_update).await;
    match result {
        Ok(outcome) => {
            turn.set_state(TurnState::Done);
            Ok(outcome)
        }
        Err(e) if e.is_cancelled() => {
            turn.set_state(TurnState::Done);
            Ok(TurnOutcome::Cancelled)
        }
        Err(e) => {
            sys_error!("[CHAT] Turn {} failed: {}", turn.id(), e);
            // The fixed diagnostic replaces an empty response only; partial
            // content is never overwritten.
            if turn.is_empty() {
                turn.append(RESPONSE_ERROR_MESSAGE);
            }
            turn.set_state(TurnState::Errored);
            Err(e)
        }
    }
}

/// Move the pending image onto the latest user message when the model can
/// take it; otherwise drop it.
fn attach_image(spec: &mut ChatRequestSpec) {
    use base64::Engine;

    let Some(image) = spec.image.take() else {
        return;
    };
    if !is_vision_model(&spec.model) {
        sys_warn!(
            "[CHAT] Dropping image attachment: {} is not a vision model",
            spec.model
        );
        return;
    }
    if base64::engine::general_purpose::STANDARD
        .decode(&image)
        .is_err()
    {
        sys_warn!("[CHAT] Dropping image attachment: not valid base64");
        return;
    }
    if let Some(user) = spec.messages.iter_mut().rev().find(|m| m.role == Role::User) {
        user.images.get_or_insert_with(Vec::new).push(image);
    }
}

async fn drive(
    turn: &ChatTurn,
    client: &OllamaClient,
    spec: &ChatRequestSpec,
    on_update: &mut impl FnMut(&str, &ThinkingSplit),
) -> Result<TurnOutcome, OllamaError> {
    let payload = spec.format.build_payload(&spec.model, &spec.messages, spec.stream);
    let endpoint = spec.format.endpoint();
    sys_debug!("[CHAT] Turn {} -> {} ({:?})", turn.id(), endpoint, spec.format);

    let mut body = tokio::select! {
        _ = turn.cancel.cancelled() => return Err(OllamaError::Cancelled),
        result = client.completion_stream(endpoint, &payload) => result?,
    };

    if !spec.stream {
        // Set-once mode: one JSON body, one update
        let bytes = hyper::body::to_bytes(body).await?;
        let frame: StreamFrame = serde_json::from_slice(&bytes)?;
        let normalized = spec.format.normalize_frame(frame);
        if let Some(message) = normalized.error {
            return Err(OllamaError::Server(message));
        }
        let accumulated = turn.append(&normalized.delta);
        on_update(&normalized.delta, &split_thinking(&accumulated));
        return Ok(TurnOutcome::Completed);
    }

    turn.set_state(TurnState::Streaming);
    let mut decoder = NdjsonDecoder::new();
    let mut frames: Vec<StreamFrame> = Vec::new();

    loop {
        let chunk = tokio::select! {
            _ = turn.cancel.cancelled() => return Err(OllamaError::Cancelled),
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                decoder.feed(&bytes, |value| collect_frame(value, &mut frames));
                if let Some(outcome) = process_frames(turn, spec, &mut frames, on_update)? {
                    return Ok(outcome);
                }
            }
            Some(Err(e)) => return Err(e.into()),
            None => {
                // Stream closed; a final frame may still sit in the buffer
                decoder.finish(|value| collect_frame(value, &mut frames));
                if let Some(outcome) = process_frames(turn, spec, &mut frames, on_update)? {
                    return Ok(outcome);
                }
                return Ok(TurnOutcome::Completed);
            }
        }
    }
}

fn collect_frame(value: serde_json::Value, frames: &mut Vec<StreamFrame>) {
    match serde_json::from_value::<StreamFrame>(value) {
        Ok(frame) => frames.push(frame),
        Err(e) => sys_debug!("[CHAT] Skipping unrecognized frame: {}", e),
    }
}

fn process_frames(
    turn: &ChatTurn,
    spec: &ChatRequestSpec,
    frames: &mut Vec<StreamFrame>,
    on_update: &mut impl FnMut(&str, &ThinkingSplit),
) -> Result<Option<TurnOutcome>, OllamaError> {
    for frame in frames.drain(..) {
        let normalized = spec.format.normalize_frame(frame);
        if let Some(message) = normalized.error {
            return Err(OllamaError::Server(message));
        }
        if !normalized.delta.is_empty() {
            let accumulated = turn.append(&normalized.delta);
            on_update(&normalized.delta, &split_thinking(&accumulated));
        }
        if normalized.done {
            return Ok(Some(TurnOutcome::Completed));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::{ndjson_body, spawn_stub};
    use hyper::{Body, Response};
    use tokio::sync::mpsc;

    fn spec(model: &str, format: WireFormat, stream: bool) -> ChatRequestSpec {
        ChatRequestSpec {
            model: model.to_string(),
            messages: vec![ChatMessage::new(Role::User, "Hi")],
            image: None,
            format,
            stream,
        }
    }

    #[tokio::test]
    async fn test_streaming_chat_accumulates_across_chunk_splits() {
        // Second frame's JSON is split across two network chunks
        let base = spawn_stub(|_req| async {
            Response::new(ndjson_body(vec![
                "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n{\"message\":{\"con",
                "tent\":\"lo\"},\"done\":false}\n{\"message\":{\"content\":\"\"},\"done\":true}\n",
            ]))
        })
        .await;

        let client = OllamaClient::new(&base);
        let turn = ChatTurn::new();
        let mut deltas = Vec::new();
        let outcome = run_turn(&turn, &client, spec("llama3", WireFormat::Chat, true), |d, _| {
            deltas.push(d.to_string());
        })
        .await
        .unwrap();

        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert_eq!(turn.response(), "Hello");
        assert_eq!(turn.state(), TurnState::Done);
    }

    #[tokio::test]
    async fn test_non_streaming_sets_once() {
        let base = spawn_stub(|_req| async {
            Response::new(Body::from(r#"{"response":"All at once.","done":true}"#))
        })
        .await;

        let client = OllamaClient::new(&base);
        let turn = ChatTurn::new();
        let mut updates = 0;
        run_turn(&turn, &client, spec("llama3", WireFormat::Generate, false), |_, _| {
            updates += 1;
        })
        .await
        .unwrap();

        assert_eq!(updates, 1);
        assert_eq!(turn.response(), "All at once.");
    }

    #[tokio::test]
    async fn test_error_frame_keeps_partial_content() {
        let base = spawn_stub(|_req| async {
            Response::new(ndjson_body(vec![
                "{\"message\":{\"content\":\"partial\"},\"done\":false}\n",
                "{\"error\":\"model crashed\"}\n",
            ]))
        })
        .await;

        let client = OllamaClient::new(&base);
        let turn = ChatTurn::new();
        let err = run_turn(&turn, &client, spec("llama3", WireFormat::Chat, true), |_, _| {})
            .await
            .unwrap_err();

        assert!(matches!(err, OllamaError::Server(ref m) if m == "model crashed"));
        assert_eq!(turn.response(), "partial");
        assert_eq!(turn.state(), TurnState::Errored);
    }

    #[tokio::test]
    async fn test_failure_before_content_writes_fixed_message() {
        let client = OllamaClient::new("http://127.0.0.1:1");
        let turn = ChatTurn::new();
        let err = run_turn(&turn, &client, spec("llama3", WireFormat::Chat, true), |_, _| {})
            .await
            .unwrap_err();

        assert!(matches!(err, OllamaError::Unreachable));
        assert_eq!(turn.response(), RESPONSE_ERROR_MESSAGE);
        assert_eq!(turn.state(), TurnState::Errored);
    }

    #[tokio::test]
    async fn test_cancellation_leaves_partial_content() {
        // Two frames, then the stream hangs until cancelled
        let base = spawn_stub(|_req| async {
            let chunks = futures_util::stream::iter(vec![
                Ok::<_, std::io::Error>(hyper::body::Bytes::from(
                    "{\"message\":{\"content\":\"A\"},\"done\":false}\n",
                )),
                Ok(hyper::body::Bytes::from(
                    "{\"message\":{\"content\":\"B\"},\"done\":false}\n",
                )),
            ])
            .chain(futures_util::stream::pending());
            Response::new(Body::wrap_stream(chunks))
        })
        .await;

        let client = OllamaClient::new(&base);
        let turn = ChatTurn::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = {
            let turn = turn.clone();
            tokio::spawn(async move {
                run_turn(&turn, &client, spec("llama3", WireFormat::Chat, true), |d, _| {
                    let _ = tx.send(d.to_string());
                })
                .await
            })
        };

        assert_eq!(rx.recv().await.unwrap(), "A");
        assert_eq!(rx.recv().await.unwrap(), "B");
        turn.cancel();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert_eq!(turn.response(), "AB");
        assert_eq!(turn.state(), TurnState::Done);
    }

    #[tokio::test]
    async fn test_thinking_split_reported_per_update() {
        let base = spawn_stub(|_req| async {
            Response::new(ndjson_body(vec![
                "{\"message\":{\"content\":\"<think>hm\"},\"done\":false}\n",
                "{\"message\":{\"content\":\"</think>Four.\"},\"done\":true}\n",
            ]))
        })
        .await;

        let client = OllamaClient::new(&base);
        let turn = ChatTurn::new();
        let mut splits = Vec::new();
        run_turn(&turn, &client, spec("llama3", WireFormat::Chat, true), |_, s| {
            splits.push(s.clone());
        })
        .await
        .unwrap();

        assert!(splits[0].thinking_in_progress);
        assert_eq!(splits[0].response, "");
        let last = splits.last().unwrap();
        assert!(!last.thinking_in_progress);
        assert_eq!(last.thinking, "hm");
        assert_eq!(last.response, "Four.");
    }

    #[test]
    fn test_attach_image_vision_model() {
        let mut s = spec("llava:13b", WireFormat::Chat, true);
        s.image = Some("aW1n".to_string());
        attach_image(&mut s);
        assert_eq!(s.messages[0].images.as_ref().unwrap()[0], "aW1n");
    }

    #[test]
    fn test_attach_image_rejects_bad_base64() {
        let mut s = spec("llava:13b", WireFormat::Chat, true);
        s.image = Some("not base64!!".to_string());
        attach_image(&mut s);
        assert!(s.messages[0].images.is_none());
    }

    #[test]
    fn test_attach_image_dropped_for_text_model() {
        let mut s = spec("mistral", WireFormat::Chat, true);
        s.image = Some("aW1n".to_string());
        attach_image(&mut s);
        assert!(s.messages[0].images.is_none());
    }
}
