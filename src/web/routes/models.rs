// Installed-model listing, detail, delete, and the remote catalog.

use std::convert::Infallible;
use std::sync::Arc;

use hyper::{Body, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{json_response, json_success};
use crate::web::routes::ollama_error_response;
use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    pub model: String,
}

/// GET /api/models
pub async fn list(state: Arc<AppState>) -> Result<Response<Body>, Infallible> {
    match state.client.list_models().await {
        Ok(models) => Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "models": models }),
        )),
        Err(e) => Ok(ollama_error_response(&e)),
    }
}

/// POST /api/models/show
pub async fn show(
    state: Arc<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let request: ModelRequest = match parse_json_body(req.into_body()).await {
        Ok(parsed) => parsed,
        Err(error_response) => return Ok(error_response),
    };
    match state.client.show_model_raw(&request.model).await {
        Ok(detail) => Ok(json_response(StatusCode::OK, &detail)),
        Err(e) => Ok(ollama_error_response(&e)),
    }
}

/// POST /api/models/delete
pub async fn delete(
    state: Arc<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let request: ModelRequest = match parse_json_body(req.into_body()).await {
        Ok(parsed) => parsed,
        Err(error_response) => return Ok(error_response),
    };
    match state.manager.remove(&request.model).await {
        Ok(()) => Ok(json_success(&format!("Deleted {}", request.model))),
        Err(e) => Ok(ollama_error_response(&e)),
    }
}

/// Curated catalog entry for the model browser.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogModel {
    pub name: &'static str,
    pub description: &'static str,
    pub size: &'static str,
    pub recommended: bool,
}

/// Popular pullable models shown before anything is installed.
pub const CATALOG: &[CatalogModel] = &[
    CatalogModel {
        name: "llama3.2:3b",
        description: "Meta Llama 3.2, small general-purpose model",
        size: "2.0GB",
        recommended: true,
    },
    CatalogModel {
        name: "llama3.1:8b",
        description: "Meta Llama 3.1, strong general-purpose model",
        size: "4.7GB",
        recommended: true,
    },
    CatalogModel {
        name: "mistral:7b",
        description: "Mistral 7B, fast and capable",
        size: "4.1GB",
        recommended: true,
    },
    CatalogModel {
        name: "qwen2.5:7b",
        description: "Qwen 2.5, multilingual general-purpose model",
        size: "4.7GB",
        recommended: false,
    },
    CatalogModel {
        name: "gemma2:9b",
        description: "Google Gemma 2",
        size: "5.4GB",
        recommended: false,
    },
    CatalogModel {
        name: "phi3:mini",
        description: "Microsoft Phi-3 Mini, small and efficient",
        size: "2.3GB",
        recommended: false,
    },
    CatalogModel {
        name: "deepseek-r1:8b",
        description: "DeepSeek R1, reasoning model with thinking output",
        size: "4.9GB",
        recommended: true,
    },
    CatalogModel {
        name: "llava:7b",
        description: "LLaVA, vision-capable model for image input",
        size: "4.7GB",
        recommended: false,
    },
    CatalogModel {
        name: "codellama:7b",
        description: "Code Llama, code generation",
        size: "3.8GB",
        recommended: false,
    },
    CatalogModel {
        name: "nomic-embed-text",
        description: "Nomic text embedding model",
        size: "274MB",
        recommended: false,
    },
];

/// GET /api/models/remote
pub async fn remote() -> Result<Response<Body>, Infallible> {
    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "models": CATALOG }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_valid() {
        for model in CATALOG {
            assert!(
                crate::web::model_manager::validate_model_name(model.name).is_ok(),
                "bad catalog name: {}",
                model.name
            );
        }
    }

    #[test]
    fn test_catalog_has_recommendations() {
        assert!(CATALOG.iter().any(|m| m.recommended));
    }
}
