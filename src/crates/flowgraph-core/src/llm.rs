//! LLM provider contract
//!
//! The graph runtime never talks to a model provider directly; node bodies
//! that need completions receive an implementation of [`ChatModel`]. Concrete
//! providers (and their HTTP plumbing, token accounting, and prompt caching)
//! live outside this workspace - this module only fixes the boundary:
//! messages in, a stream of chunks out.

use crate::error::{GraphError, Result};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Declaration of a tool the model may call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool arguments
    pub parameters: serde_json::Value,
}

/// A chat completion request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }
}

/// A requested tool invocation surfaced by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One streamed chunk of a chat completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Text delta appended to the completion
    #[serde(default)]
    pub content: String,

    /// Tool call requested by the model, when any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,

    /// Set on the final chunk of the stream
    #[serde(default)]
    pub done: bool,
}

/// Boxed stream of completion chunks
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// Provider contract: messages (and optional tools) in, chunk stream out
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start a streaming chat completion
    async fn chat(&self, request: ChatRequest) -> Result<ChatStream>;

    /// Provider/model identifier for logging
    fn model_name(&self) -> &str {
        "unknown"
    }

    /// Convenience: collect the full completion text
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        use futures::StreamExt;

        let mut stream = self.chat(request).await?;
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            output.push_str(&chunk?.content);
        }
        Ok(output)
    }
}

/// Map a provider failure into a graph error
pub fn provider_error(model: &str, message: impl std::fmt::Display) -> GraphError {
    GraphError::Custom(format!("LLM provider '{model}' failed: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn chat(&self, request: ChatRequest) -> Result<ChatStream> {
            let text = request
                .messages
                .last()
                .map(|message| message.content.clone())
                .unwrap_or_default();
            let chunks = vec![
                Ok(ChatChunk {
                    content: text,
                    ..Default::default()
                }),
                Ok(ChatChunk {
                    done: true,
                    ..Default::default()
                }),
            ];
            Ok(Box::pin(stream::iter(chunks)))
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_complete_collects_chunks() {
        let model = EchoModel;
        let request = ChatRequest::new(vec![Message::user("hello")]);
        assert_eq!(model.complete(request).await.unwrap(), "hello");
    }
}
