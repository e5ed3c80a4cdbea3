// Route handler modules

pub mod chat;
pub mod health;
pub mod models;
pub mod operations;
pub mod pull;

use std::convert::Infallible;
use std::sync::Arc;

use hyper::{Body, Method, Request, Response, StatusCode};

use crate::web::error::OllamaError;
use crate::web::response_helpers::{cors_preflight, json_error};
use crate::web::AppState;

/// Top-level dispatcher: one match over method and path.
pub async fn route(
    state: Arc<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::OPTIONS, _) => Ok(cors_preflight()),

        (&Method::GET, "/health") => health::handle().await,

        (&Method::GET, "/api/models") => models::list(state).await,
        (&Method::GET, "/api/models/remote") => models::remote().await,
        (&Method::POST, "/api/models/show") => models::show(state, req).await,
        (&Method::POST, "/api/models/delete") => models::delete(state, req).await,

        (&Method::POST, "/api/models/pull") => pull::pull(state, req).await,
        (&Method::GET, "/api/downloads") => pull::downloads(state).await,

        (&Method::POST, "/api/models/install") => operations::install(state, req).await,
        (&Method::POST, "/api/models/remove") => operations::remove(state, req).await,
        (&Method::GET, "/api/operations") => operations::status(state, req).await,

        (&Method::POST, "/api/chat") => chat::send(state, req).await,
        (&Method::POST, "/api/chat/stop") => chat::stop(state, req).await,

        _ => Ok(json_error(StatusCode::NOT_FOUND, "Not found")),
    }
}

/// Translate an engine error into a JSON response.
pub(crate) fn ollama_error_response(e: &OllamaError) -> Response<Body> {
    match e {
        OllamaError::InvalidModelName(_) => json_error(StatusCode::BAD_REQUEST, &e.to_string()),
        OllamaError::Unreachable => json_error(StatusCode::BAD_GATEWAY, &e.to_string()),
        OllamaError::Status { .. } | OllamaError::Server(_) => {
            json_error(StatusCode::BAD_GATEWAY, &e.user_message())
        }
        _ => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.user_message()),
    }
}
