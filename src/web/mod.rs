// Web server modules

pub mod chat;
pub mod config;
pub mod error;
pub mod logger;
pub mod model_manager;
pub mod models;
pub mod ndjson;
pub mod ollama;
pub mod operations;
pub mod progress;
pub mod request_parsing;
pub mod response_helpers;
pub mod routes;
pub mod thinking;

use std::sync::Arc;

use crate::web::chat::TurnRegistry;
use crate::web::config::ServerConfig;
use crate::web::model_manager::ModelManager;
use crate::web::ollama::OllamaClient;
use crate::web::operations::OperationRegistry;
use crate::web::progress::ProgressStore;

/// Shared state handed to every route handler.
pub struct AppState {
    pub config: ServerConfig,
    pub client: OllamaClient,
    pub progress: Arc<ProgressStore>,
    pub manager: Arc<ModelManager>,
    pub operations: Arc<OperationRegistry>,
    pub turns: TurnRegistry,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let client = OllamaClient::new(&config.ollama_host);
        let progress = Arc::new(ProgressStore::new());
        let manager = Arc::new(ModelManager::new(
            client.clone(),
            progress.clone(),
            config.pull_clear_delay,
        ));
        let operations = Arc::new(OperationRegistry::new(config.operation_retention));
        Arc::new(Self {
            config,
            client,
            progress,
            manager,
            operations,
            turns: TurnRegistry::new(),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::convert::Infallible;
    use std::future::Future;
    use std::net::SocketAddr;

    use futures_util::StreamExt;
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server};

    /// Spawn a loopback stub daemon; returns its base URL.
    pub async fn spawn_stub<F, Fut>(handler: F) -> String
    where
        F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Response<Body>> + Send + 'static,
    {
        let make = make_service_fn(move |_conn| {
            let handler = handler.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, Infallible>(handler(req).await) }
                }))
            }
        });
        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make);
        let addr = server.local_addr();
        tokio::spawn(server);
        format!("http://{addr}")
    }

    /// Body that delivers each string as its own network chunk.
    pub fn ndjson_body(chunks: Vec<&'static str>) -> Body {
        let stream = futures_util::stream::iter(chunks)
            .map(|c| Ok::<_, std::io::Error>(hyper::body::Bytes::from(c)));
        Body::wrap_stream(stream)
    }
}
