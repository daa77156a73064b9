mod client;
mod model;
mod types;

pub use client::ChatClient;
pub use model::{parse_json_content, LanguageModel, LlmError, LlmResult};
pub use types::{ChatRequest, ChatResponse, Message, MessageRole, ResponseFormat};
