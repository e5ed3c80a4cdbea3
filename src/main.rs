// Web server entry point.

use std::convert::Infallible;
use std::net::SocketAddr;

use anyhow::Context;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;

use ollama_chat_web::web::config::ServerConfig;
use ollama_chat_web::web::routes;
use ollama_chat_web::web::AppState;
use ollama_chat_web::{sys_info, sys_warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    let port = config.port;
    let sweep_interval = config.operation_sweep_interval;
    let state = AppState::new(config);

    sys_info!(
        "[STARTUP] Ollama host: {}, model manager enabled: {}",
        state.client.base_url(),
        state.config.enable_model_manager
    );

    // Periodic garbage collection of finished operations
    {
        let operations = state.operations.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                operations.sweep();
            }
        });
    }

    // Warn early when the daemon is down; the server still starts
    if let Err(e) = state.client.health().await {
        sys_warn!("[STARTUP] Ollama not reachable yet: {}", e);
        eprintln!("Warning: {e}");
    }

    let make_svc = make_service_fn({
        let state = state.clone();
        move |_conn| {
            let state = state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| routes::route(state.clone(), req)))
            }
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server = Server::bind(&addr).serve(make_svc);

    println!("Ollama Chat Web Server starting on http://{addr}");
    println!("Available endpoints:");
    println!("  GET  /health               - Health check");
    println!("  POST /api/chat             - Chat (SSE or single JSON)");
    println!("  POST /api/chat/stop        - Cancel an in-flight chat turn");
    println!("  GET  /api/models           - Installed models");
    println!("  GET  /api/models/remote    - Curated model catalog");
    println!("  POST /api/models/show      - Model details");
    println!("  POST /api/models/pull      - Pull a model (SSE progress)");
    println!("  POST /api/models/delete    - Delete a model");
    println!("  GET  /api/downloads        - Active download progress");
    println!("  POST /api/models/install   - Tracked install operation");
    println!("  POST /api/models/remove    - Tracked delete operation");
    println!("  GET  /api/operations       - Operation status by opId");

    server.await.context("server error")?;

    Ok(())
}
