// Server-tracked operation routes.
//
// POST /api/models/install  { model }  -> { opId }
// POST /api/models/remove   { model }  -> { opId }
// GET  /api/operations?opId=…          -> operation record
//
// All three are gated on ENABLE_MODEL_MANAGER and reject with 403 when the
// model manager is disabled.

use std::convert::Infallible;
use std::sync::Arc;

use hyper::{Body, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::web::model_manager::validate_model_name;
use crate::web::operations::{start_delete, start_install};
use crate::web::request_parsing::{get_query_param, parse_json_body};
use crate::web::response_helpers::{json_error, json_response};
use crate::web::AppState;

#[derive(Deserialize)]
struct OperationRequest {
    model: String,
}

fn disabled_response() -> Response<Body> {
    json_error(StatusCode::FORBIDDEN, "Model manager is disabled")
}

/// POST /api/models/install
pub async fn install(
    state: Arc<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if !state.config.enable_model_manager {
        return Ok(disabled_response());
    }
    let request: OperationRequest = match parse_json_body(req.into_body()).await {
        Ok(parsed) => parsed,
        Err(error_response) => return Ok(error_response),
    };
    if validate_model_name(&request.model).is_err() {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Invalid model name"));
    }

    let op_id = start_install(
        state.operations.clone(),
        state.manager.clone(),
        state.progress.clone(),
        request.model,
    );
    Ok(json_response(StatusCode::OK, &json!({ "opId": op_id })))
}

/// POST /api/models/remove
pub async fn remove(
    state: Arc<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if !state.config.enable_model_manager {
        return Ok(disabled_response());
    }
    let request: OperationRequest = match parse_json_body(req.into_body()).await {
        Ok(parsed) => parsed,
        Err(error_response) => return Ok(error_response),
    };
    if validate_model_name(&request.model).is_err() {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Invalid model name"));
    }

    let op_id = start_delete(state.operations.clone(), state.manager.clone(), request.model);
    Ok(json_response(StatusCode::OK, &json!({ "opId": op_id })))
}

/// GET /api/operations?opId=…
pub async fn status(
    state: Arc<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if !state.config.enable_model_manager {
        return Ok(disabled_response());
    }
    let Some(op_id) = get_query_param(req.uri(), "opId") else {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Missing opId"));
    };
    match state.operations.get(&op_id) {
        Some(operation) => Ok(json_response(StatusCode::OK, &operation)),
        None => Ok(json_error(StatusCode::NOT_FOUND, "Unknown operation")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::config::ServerConfig;
    use crate::web::routes;
    use hyper::{Method, Request};

    fn state(enabled: bool) -> Arc<AppState> {
        AppState::new(ServerConfig {
            enable_model_manager: enabled,
            ..ServerConfig::default()
        })
    }

    fn post(path: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_disabled_manager_returns_403_before_validation() {
        // The gate fires even for bodies that would fail parsing or
        // validation, so no request detail leaks past it
        let resp = install(state(false), post("/api/models/install", "not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = remove(state(false), post("/api/models/remove", r#"{"model":"bad name"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/operations?opId=x")
            .body(Body::empty())
            .unwrap();
        let resp = status(state(false), req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_disabled_manager_403_through_dispatcher() {
        let resp = routes::route(state(false), post("/api/models/install", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_malformed_body_returns_400_with_cors() {
        let resp = install(state(true), post("/api/models/install", "{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_invalid_model_name_returns_400() {
        let resp = install(state(true), post("/api/models/install", r#"{"model":"bad name"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
