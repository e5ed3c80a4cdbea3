// Request parsing utilities for HTTP handlers

use hyper::{Body, Response, StatusCode, Uri};
use serde::de::DeserializeOwned;

use crate::{sys_debug, sys_error};

/// Parse JSON request body into a typed structure.
///
/// Returns the deserialized value on success, or an error Response on failure.
/// The error Response includes proper CORS headers and error message in JSON format.
///
/// # Example
/// ```ignore
/// let chat_request: ChatRequest = match parse_json_body(req.into_body()).await {
///     Ok(req) => req,
///     Err(error_response) => return Ok(error_response),
/// };
/// ```
pub async fn parse_json_body<T: DeserializeOwned>(body: Body) -> Result<T, Response<Body>> {
    let body_bytes = match hyper::body::to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return Err(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header("content-type", "application/json")
                .header("access-control-allow-origin", "*")
                .body(Body::from(r#"{"error":"Failed to read request body"}"#))
                .unwrap());
        }
    };

    // Debug: log the received JSON for troubleshooting
    if let Ok(body_str) = std::str::from_utf8(&body_bytes) {
        if !body_str.is_empty() {
            sys_debug!("[REQUEST] Body: {}", body_str);
        }
    }

    match serde_json::from_slice::<T>(&body_bytes) {
        Ok(parsed) => Ok(parsed),
        Err(e) => {
            sys_error!("[REQUEST] JSON parsing error: {}", e);
            Err(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header("content-type", "application/json")
                .header("access-control-allow-origin", "*")
                .body(Body::from(r#"{"error":"Invalid JSON format"}"#))
                .unwrap())
        }
    }
}

/// Extract a query parameter from a URI.
///
/// Returns `Some(value)` if the parameter exists, `None` otherwise.
/// The value is URL-decoded automatically.
///
/// # Example
/// ```ignore
/// // For URI: /api/operations?opId=abc-123
/// let op_id = get_query_param(req.uri(), "opId");
/// ```
pub fn get_query_param(uri: &Uri, key: &str) -> Option<String> {
    let query = uri.query()?;

    for param in query.split('&') {
        if let Some((param_key, param_value)) = param.split_once('=') {
            if param_key == key {
                return urlencoding::decode(param_value)
                    .ok()
                    .map(|s| s.to_string());
            }
        }
    }

    None
}
