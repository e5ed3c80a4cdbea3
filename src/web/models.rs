// Shared data types for the chat engine and the Ollama wire contract.

use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Base64-encoded image attachments (vision-capable models only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: None,
        }
    }
}

/// Which daemon endpoint a chat turn speaks to.
///
/// `Chat` posts the full message history to `/api/chat`; `Generate` flattens
/// it into a single prompt for `/api/generate`. The payload shape and the
/// frame field carrying content differ, everything downstream sees one
/// normalized frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Chat,
    Generate,
}

/// Raw streaming frame from `/api/chat` or `/api/generate`.
///
/// Both shapes deserialize into this one struct: chat frames populate
/// `message`, generate frames populate `response`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub message: Option<FrameMessage>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameMessage {
    #[serde(default)]
    pub content: String,
}

/// Raw streaming frame from `/api/pull`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullFrame {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `GET /api/tags` response.
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTag {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

/// `POST /api/show` response, reduced to the details the UI displays.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowResponse {
    #[serde(default)]
    pub details: ShowDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowDetails {
    #[serde(default)]
    pub parameter_size: Option<String>,
    #[serde(default)]
    pub quantization_level: Option<String>,
}

/// Installed model entry: the tag record enriched with `/api/show` details.
#[derive(Debug, Clone, Serialize)]
pub struct InstalledModel {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantization_level: Option<String>,
}

impl From<ModelTag> for InstalledModel {
    fn from(tag: ModelTag) -> Self {
        Self {
            name: tag.name,
            size: tag.size,
            modified_at: tag.modified_at,
            parameter_size: None,
            quantization_level: None,
        }
    }
}

/// Whether a model name indicates vision (image input) capability.
///
/// Matches the model families the original UI allowed attachments for.
pub fn is_vision_model(name: &str) -> bool {
    let name = name.to_lowercase();
    let base = name.split(':').next().unwrap_or(&name);
    base.contains("llava")
        || base.contains("moondream")
        || base.contains("minicpm-v")
        || base.ends_with("-vision")
}
