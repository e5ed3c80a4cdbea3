// Chat turn routes.
//
// POST /api/chat       — one turn; SSE stream of deltas or a single JSON body
// POST /api/chat/stop  — cancel the in-flight turn with the given id

use std::convert::Infallible;
use std::sync::Arc;

use hyper::{Body, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::web::chat::{run_turn, ChatRequestSpec, ChatTurn};
use crate::web::models::{ChatMessage, WireFormat};
use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{json_error, json_response, sse_event, sse_response};
use crate::web::routes::ollama_error_response;
use crate::web::thinking::split_thinking;
use crate::web::AppState;

fn default_stream() -> bool {
    true
}

#[derive(Deserialize)]
struct ChatApiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default = "default_stream")]
    stream: bool,
    #[serde(default)]
    format: WireFormat,
}

#[derive(Deserialize)]
struct StopRequest {
    #[serde(rename = "turnId")]
    turn_id: String,
}

/// POST /api/chat
pub async fn send(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let request: ChatApiRequest = match parse_json_body(req.into_body()).await {
        Ok(parsed) => parsed,
        Err(error_response) => return Ok(error_response),
    };
    if request.model.is_empty() {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Missing model"));
    }

    let spec = ChatRequestSpec {
        model: request.model,
        messages: request.messages,
        image: request.image,
        format: request.format,
        stream: request.stream,
    };

    if spec.stream {
        Ok(send_streaming(state, spec))
    } else {
        Ok(send_blocking(state, spec).await)
    }
}

fn send_streaming(state: Arc<AppState>, spec: ChatRequestSpec) -> Response<Body> {
    let turn = ChatTurn::new();
    state.turns.register(turn.clone());

    let (mut sender, body) = Body::channel();
    // Unbounded so the synchronous update callback never drops a delta
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<String>();

    // Turn task: first event carries the id so the client can stop the turn
    {
        let state = state.clone();
        let turn = turn.clone();
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            let _ = event_tx.send(sse_event(&json!({ "turnId": turn.id() })));

            let update_tx = event_tx.clone();
            let result = run_turn(&turn, &state.client, spec, |delta, split| {
                let event = sse_event(&json!({
                    "delta": delta,
                    "thinking": split.thinking,
                    "response": split.response,
                    "thinking_in_progress": split.thinking_in_progress,
                }));
                let _ = update_tx.send(event);
            })
            .await;

            let split = split_thinking(&turn.response());
            let terminal = match result {
                Ok(_) => json!({
                    "done": true,
                    "state": turn.state(),
                    "thinking": split.thinking,
                    "response": split.response,
                }),
                Err(e) => json!({
                    "done": true,
                    "state": turn.state(),
                    "error": e.user_message(),
                    "response": split.response,
                }),
            };
            let _ = event_tx.send(sse_event(&terminal));
            state.turns.remove(turn.id());
        });
    }

    // Forward events to SSE
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if sender
                .send_data(hyper::body::Bytes::from(event))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    sse_response(body)
}

async fn send_blocking(state: Arc<AppState>, spec: ChatRequestSpec) -> Response<Body> {
    let turn = ChatTurn::new();
    state.turns.register(turn.clone());
    let result = run_turn(&turn, &state.client, spec, |_, _| {}).await;
    state.turns.remove(turn.id());

    let split = split_thinking(&turn.response());
    match result {
        Ok(_) => json_response(
            StatusCode::OK,
            &json!({
                "state": turn.state(),
                "thinking": split.thinking,
                "response": split.response,
            }),
        ),
        Err(e) => ollama_error_response(&e),
    }
}

/// POST /api/chat/stop
pub async fn stop(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let request: StopRequest = match parse_json_body(req.into_body()).await {
        Ok(parsed) => parsed,
        Err(error_response) => return Ok(error_response),
    };
    if state.turns.cancel(&request.turn_id) {
        Ok(json_response(
            StatusCode::OK,
            &json!({ "success": true, "turnId": request.turn_id }),
        ))
    } else {
        Ok(json_error(StatusCode::NOT_FOUND, "Unknown turn id"))
    }
}
