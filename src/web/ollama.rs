// Typed HTTP client for the Ollama-compatible inference daemon.

use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request};
use serde_json::{json, Value};

use crate::sys_debug;
use crate::web::config::normalize_base_url;
use crate::web::error::OllamaError;
use crate::web::models::{InstalledModel, ShowResponse, TagsResponse};

#[derive(Clone)]
pub struct OllamaClient {
    http: Client<HttpConnector>,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: normalize_base_url(base_url),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Liveness probe against the daemon root.
    pub async fn health(&self) -> Result<(), OllamaError> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(format!("{}/", self.base_url))
            .body(Body::empty())?;
        let resp = self.http.request(req).await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(status_error(resp).await)
        }
    }

    /// Installed models, sorted by name, each enriched with `/api/show`
    /// details. A failing show call leaves the bare tag entry in place.
    pub async fn list_models(&self) -> Result<Vec<InstalledModel>, OllamaError> {
        let mut tags = self.list_tags().await?.models;
        tags.sort_by(|a, b| a.name.cmp(&b.name));

        let mut models = Vec::with_capacity(tags.len());
        for tag in tags {
            let mut model = InstalledModel::from(tag);
            match self.show_model(&model.name).await {
                Ok(show) => {
                    model.parameter_size = show.details.parameter_size;
                    model.quantization_level = show.details.quantization_level;
                }
                Err(e) => {
                    sys_debug!("[OLLAMA] show failed for {}: {}", model.name, e);
                }
            }
            models.push(model);
        }
        Ok(models)
    }

    /// Raw `GET /api/tags` response.
    pub async fn list_tags(&self) -> Result<TagsResponse, OllamaError> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(format!("{}/api/tags", self.base_url))
            .body(Body::empty())?;
        let body = self.send_checked(req).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn show_model(&self, name: &str) -> Result<ShowResponse, OllamaError> {
        Ok(serde_json::from_value(self.show_model_raw(name).await?)?)
    }

    /// `POST /api/show` passthrough, for the detail endpoint.
    pub async fn show_model_raw(&self, name: &str) -> Result<Value, OllamaError> {
        let req = self.json_request(Method::POST, "/api/show", &json!({ "model": name }))?;
        let body = self.send_checked(req).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn delete_model(&self, name: &str) -> Result<(), OllamaError> {
        let req = self.json_request(Method::DELETE, "/api/delete", &json!({ "model": name }))?;
        self.send_checked(req).await?;
        Ok(())
    }

    /// `POST /api/pull` returning the raw NDJSON stream.
    pub async fn pull_stream(&self, name: &str) -> Result<Body, OllamaError> {
        let payload = json!({ "model": name, "stream": true });
        let req = self.json_request(Method::POST, "/api/pull", &payload)?;
        self.send_streaming(req).await
    }

    /// `POST /api/chat` or `/api/generate` returning the raw NDJSON stream.
    pub async fn completion_stream(&self, path: &str, payload: &Value) -> Result<Body, OllamaError> {
        let req = self.json_request(Method::POST, path, payload)?;
        self.send_streaming(req).await
    }

    fn json_request(
        &self,
        method: Method,
        path: &str,
        payload: &Value,
    ) -> Result<Request<Body>, OllamaError> {
        Ok(Request::builder()
            .method(method)
            .uri(format!("{}{}", self.base_url, path))
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))?)
    }

    /// Send, check status, return the buffered body.
    async fn send_checked(&self, req: Request<Body>) -> Result<hyper::body::Bytes, OllamaError> {
        let resp = self.http.request(req).await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(hyper::body::to_bytes(resp.into_body()).await?)
    }

    /// Send, check status, hand back the body unconsumed for line decoding.
    async fn send_streaming(&self, req: Request<Body>) -> Result<Body, OllamaError> {
        let resp = self.http.request(req).await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(resp.into_body())
    }
}

/// Read the body of a failed response and fold it into the error message.
async fn status_error(resp: hyper::Response<Body>) -> OllamaError {
    let status = resp.status();
    let body = match hyper::body::to_bytes(resp.into_body()).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(_) => String::new(),
    };
    // Ollama error payloads are {"error": "..."}; unwrap when present
    let body = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    OllamaError::Status { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::spawn_stub;
    use hyper::{Response, StatusCode};

    #[test]
    fn test_base_url_normalized() {
        let client = OllamaClient::new("http://localhost:11434/");
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_list_models_sorted_and_enriched() {
        let base = spawn_stub(|req| async move {
            match req.uri().path() {
                "/api/tags" => Response::new(Body::from(
                    r#"{"models":[{"name":"zephyr:7b","size":100},{"name":"llama3:8b","size":200}]}"#,
                )),
                "/api/show" => {
                    let bytes = hyper::body::to_bytes(req.into_body()).await.unwrap();
                    let v: Value = serde_json::from_slice(&bytes).unwrap();
                    if v["model"] == "llama3:8b" {
                        Response::new(Body::from(
                            r#"{"details":{"parameter_size":"8B","quantization_level":"Q4_0"}}"#,
                        ))
                    } else {
                        // Enrichment failure keeps the bare entry
                        Response::builder()
                            .status(500)
                            .body(Body::from("boom"))
                            .unwrap()
                    }
                }
                _ => Response::builder().status(404).body(Body::empty()).unwrap(),
            }
        })
        .await;

        let client = OllamaClient::new(&base);
        let models = client.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "llama3:8b");
        assert_eq!(models[0].parameter_size.as_deref(), Some("8B"));
        assert_eq!(models[1].name, "zephyr:7b");
        assert_eq!(models[1].parameter_size, None);
    }

    #[tokio::test]
    async fn test_status_error_unwraps_error_field() {
        let base = spawn_stub(|_req| async move {
            Response::builder()
                .status(404)
                .body(Body::from(r#"{"error":"model not found"}"#))
                .unwrap()
        })
        .await;

        let client = OllamaClient::new(&base);
        let err = client.delete_model("ghost").await.unwrap_err();
        match err {
            OllamaError::Status { status, body } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body, "model not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_unreachable() {
        // Port 1 is essentially never listening
        let client = OllamaClient::new("http://127.0.0.1:1");
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, OllamaError::Unreachable));
    }
}
