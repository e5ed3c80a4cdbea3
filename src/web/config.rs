// Server configuration, resolved from the environment at startup.

use std::time::Duration;

/// Default inference daemon endpoint.
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Runtime configuration for the web server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Base URL of the Ollama-compatible inference daemon.
    pub ollama_host: String,
    /// Whether the model-manager operation endpoints are enabled.
    pub enable_model_manager: bool,
    /// How long a completed pull stays visible in the progress store
    /// before it is cleared.
    pub pull_clear_delay: Duration,
    /// Retention window for terminal operations before garbage collection.
    pub operation_retention: Duration,
    /// Interval between operation garbage-collection sweeps.
    pub operation_sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            enable_model_manager: false,
            pull_clear_delay: Duration::from_millis(1500),
            operation_retention: Duration::from_secs(60 * 60),
            operation_sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl ServerConfig {
    /// Resolve configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = std::env::var("PORT").ok().and_then(|v| v.parse().ok()) {
            config.port = port;
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            config.ollama_host = normalize_base_url(&host);
        }
        config.enable_model_manager =
            std::env::var("ENABLE_MODEL_MANAGER").unwrap_or_default() == "true";
        if let Some(ms) = std::env::var("PULL_CLEAR_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.pull_clear_delay = Duration::from_millis(ms);
        }

        config
    }
}

/// Normalize a base URL: trim whitespace and any trailing slash, fall back
/// to the default endpoint when empty.
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_OLLAMA_HOST.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_trailing_slash() {
        assert_eq!(
            normalize_base_url("http://127.0.0.1:11434/"),
            "http://127.0.0.1:11434"
        );
    }

    #[test]
    fn test_normalize_trims_whitespace() {
        assert_eq!(
            normalize_base_url("  http://ollama.local:11434  "),
            "http://ollama.local:11434"
        );
    }

    #[test]
    fn test_normalize_empty_falls_back_to_default() {
        assert_eq!(normalize_base_url(""), DEFAULT_OLLAMA_HOST);
        assert_eq!(normalize_base_url("   "), DEFAULT_OLLAMA_HOST);
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.ollama_host, DEFAULT_OLLAMA_HOST);
        assert!(!config.enable_model_manager);
        assert_eq!(config.pull_clear_delay, Duration::from_millis(1500));
    }
}
