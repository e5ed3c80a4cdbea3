// Model pull with SSE progress reporting.
//
// POST /api/models/pull  { model }
// Returns text/event-stream with one progress event per store update and a
// final done or error event.
//
// GET /api/downloads — current progress-store snapshot (active downloads)

use std::convert::Infallible;
use std::sync::Arc;

use hyper::{Body, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::web::model_manager::validate_model_name;
use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{json_error, json_response, sse_event, sse_response};
use crate::web::AppState;

#[derive(Deserialize)]
struct PullRequest {
    model: String,
}

/// POST /api/models/pull
pub async fn pull(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let request: PullRequest = match parse_json_body(req.into_body()).await {
        Ok(parsed) => parsed,
        Err(error_response) => return Ok(error_response),
    };
    if validate_model_name(&request.model).is_err() {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Invalid model name"));
    }

    let (mut sender, body) = Body::channel();
    let (event_tx, mut event_rx) = mpsc::channel::<String>(64);

    // Pull task: forwards store updates for this key, then the terminal event
    let model = request.model.clone();
    tokio::spawn(async move {
        let (sub_id, mut store_rx) = state.progress.subscribe();
        let pull = state.manager.pull(&model);
        tokio::pin!(pull);
        loop {
            tokio::select! {
                result = &mut pull => {
                    let terminal = match result {
                        Ok(()) => json!({ "done": true }),
                        Err(e) => json!({ "error": e.user_message() }),
                    };
                    let _ = event_tx.send(sse_event(&terminal)).await;
                    break;
                }
                snapshot = store_rx.recv() => {
                    if let Some(snapshot) = snapshot {
                        if let Some(record) = snapshot.get(&model) {
                            let _ = event_tx.send(sse_event(record)).await;
                        }
                    }
                }
            }
        }
        state.progress.unsubscribe(sub_id);
    });

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

    Ok(sse_response(body))
}

/// GET /api/downloads
pub async fn downloads(state: Arc<AppState>) -> Result<Response<Body>, Infallible> {
    let snapshot = state.progress.snapshot();
    Ok(json_response(
        StatusCode::OK,
        &json!({ "downloads": &*snapshot }),
    ))
}
