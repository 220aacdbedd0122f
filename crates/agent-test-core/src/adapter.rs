//! Provider-shaped wrappers around [`MockMatcher`].
//!
//! Code written against an OpenAI chat-completions, Anthropic messages or
//! LiteLLM client can be pointed at these instead. The last user message is
//! resolved as-is.

use crate::mock::{BoxError, Kwargs, MockMatcher, MockResponse, ResolveError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("no mock response for prompt '{prompt}'")]
    NoResponse { prompt: String },
    #[error("mock matcher failed: {0}")]
    Matcher(#[source] BoxError),
}

impl From<ResolveError> for AdapterError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NoMatch { prompt } => Self::NoResponse { prompt },
            ResolveError::Matcher { source, .. } => Self::Matcher(source),
        }
    }
}

/// One block of a multi-part message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl ContentBlock {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Plain text; text blocks are joined by a space.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter(|b| b.kind == "text")
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }
}

/// Text of the last `user` message, or an empty string.
#[must_use]
pub fn last_user_message(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_text())
        .unwrap_or_default()
}

/// Split a total token count into (prompt, completion) halves.
const fn split_tokens(total: u64) -> (u64, u64) {
    let prompt = total / 2;
    (prompt, total - prompt)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

/// OpenAI chat-completions response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: CompletionUsage,
}

impl ChatCompletion {
    fn from_response(response: MockResponse) -> Self {
        let (prompt_tokens, completion_tokens) = split_tokens(response.tokens_used);
        Self {
            model: response.model,
            choices: vec![ChatChoice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content: response.content,
                },
                finish_reason: "stop".to_string(),
            }],
            usage: CompletionUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: response.tokens_used,
            },
        }
    }

    /// Content of the first choice.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Mock of `client.chat.completions.create`.
#[derive(Debug)]
pub struct OpenAiChatMock<'m> {
    matcher: &'m mut MockMatcher,
}

impl<'m> OpenAiChatMock<'m> {
    pub const fn new(matcher: &'m mut MockMatcher) -> Self {
        Self { matcher }
    }

    /// Resolve the last user message into a chat completion.
    ///
    /// # Errors
    /// Returns `AdapterError` if the matcher has no response or a predicate fails.
    pub fn create(
        &mut self,
        messages: &[ChatMessage],
        kwargs: &Kwargs,
    ) -> Result<ChatCompletion, AdapterError> {
        let prompt = last_user_message(messages);
        let response = self.matcher.resolve_with(&prompt, kwargs)?;
        Ok(ChatCompletion::from_response(response))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Anthropic messages response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: String,
    pub usage: MessageUsage,
}

impl AnthropicMessage {
    fn from_response(response: MockResponse) -> Self {
        let (input_tokens, output_tokens) = split_tokens(response.tokens_used);
        Self {
            role: "assistant".to_string(),
            model: response.model,
            content: vec![ContentBlock::text(response.content)],
            stop_reason: "end_turn".to_string(),
            usage: MessageUsage {
                input_tokens,
                output_tokens,
            },
        }
    }

    /// Text of the first content block.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.first().map(|b| b.text.as_str())
    }
}

/// Mock of `client.messages.create`.
#[derive(Debug)]
pub struct AnthropicMessagesMock<'m> {
    matcher: &'m mut MockMatcher,
}

impl<'m> AnthropicMessagesMock<'m> {
    pub const fn new(matcher: &'m mut MockMatcher) -> Self {
        Self { matcher }
    }

    /// Resolve the last user message into a messages response.
    ///
    /// # Errors
    /// Returns `AdapterError` if the matcher has no response or a predicate fails.
    pub fn create(
        &mut self,
        messages: &[ChatMessage],
        kwargs: &Kwargs,
    ) -> Result<AnthropicMessage, AdapterError> {
        let prompt = last_user_message(messages);
        let response = self.matcher.resolve_with(&prompt, kwargs)?;
        Ok(AnthropicMessage::from_response(response))
    }
}

/// Mock of `litellm.completion`.
///
/// LiteLLM answers in the OpenAI shape, so this returns a [`ChatCompletion`].
#[derive(Debug)]
pub struct LiteLlmMock<'m> {
    matcher: &'m mut MockMatcher,
}

impl<'m> LiteLlmMock<'m> {
    pub const fn new(matcher: &'m mut MockMatcher) -> Self {
        Self { matcher }
    }

    /// # Errors
    /// Returns `AdapterError` if the matcher has no response or a predicate fails.
    pub fn completion(
        &mut self,
        messages: &[ChatMessage],
        kwargs: &Kwargs,
    ) -> Result<ChatCompletion, AdapterError> {
        let prompt = last_user_message(messages);
        let response = self.matcher.resolve_with(&prompt, kwargs)?;
        Ok(ChatCompletion::from_response(response))
    }
}
