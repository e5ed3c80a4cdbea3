// Wire-format strategy: payload shape and frame field differ between
// /api/chat and /api/generate, everything downstream sees one normalized
// frame.

use serde_json::{json, Value};

use crate::web::models::{ChatMessage, Role, StreamFrame, WireFormat};

/// One decoded stream frame, independent of wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedFrame {
    pub delta: String,
    pub done: bool,
    pub error: Option<String>,
}

impl WireFormat {
    /// Daemon path this format posts to.
    pub fn endpoint(self) -> &'static str {
        match self {
            WireFormat::Chat => "/api/chat",
            WireFormat::Generate => "/api/generate",
        }
    }

    /// Build the request payload for one turn.
    pub fn build_payload(self, model: &str, messages: &[ChatMessage], stream: bool) -> Value {
        match self {
            WireFormat::Chat => json!({
                "model": model,
                "messages": messages,
                "stream": stream,
            }),
            WireFormat::Generate => {
                let mut payload = json!({
                    "model": model,
                    "prompt": flatten_prompt(messages),
                    "stream": stream,
                });
                let system: Vec<&str> = messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.content.as_str())
                    .collect();
                if !system.is_empty() {
                    payload["system"] = Value::from(system.join("\n"));
                }
                // Generate carries images at the top level, from the latest
                // user message
                if let Some(images) = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .and_then(|m| m.images.clone())
                {
                    payload["images"] = json!(images);
                }
                payload
            }
        }
    }

    /// Pull the content delta out of whichever field this format uses.
    pub fn normalize_frame(self, frame: StreamFrame) -> NormalizedFrame {
        let delta = match self {
            WireFormat::Chat => frame.message.map(|m| m.content).unwrap_or_default(),
            WireFormat::Generate => frame.response.unwrap_or_default(),
        };
        NormalizedFrame {
            delta,
            done: frame.done,
            error: frame.error,
        }
    }
}

/// Flatten a message history into a single prompt for /api/generate.
fn flatten_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        let label = match message.role {
            Role::System => continue, // carried in the "system" field
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt.push_str("Assistant:");
    prompt
}
