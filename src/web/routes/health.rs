// Health check route handler

use std::convert::Infallible;

use hyper::{Body, Response, StatusCode};

use crate::web::response_helpers::json_raw;

pub async fn handle() -> Result<Response<Body>, Infallible> {
    Ok(json_raw(
        StatusCode::OK,
        r#"{"status":"ok","service":"ollama-chat-web"}"#.to_string(),
    ))
}
