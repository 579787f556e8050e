use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionTool, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;

/// Represents a tool call requested by the LLM.
pub type ToolCall = async_openai::types::ChatCompletionMessageToolCall;

/// One assistant turn: optional text plus any tool calls the model asked for.
#[derive(Debug, Clone, Default)]
pub struct AssistantTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantTurn {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Converts the turn back into a history message for the next request.
    pub fn to_request_message(&self) -> Result<ChatCompletionRequestMessage> {
        let mut args = ChatCompletionRequestAssistantMessageArgs::default();
        if let Some(content) = &self.content {
            args.content(content.clone());
        }
        if !self.tool_calls.is_empty() {
            args.tool_calls(self.tool_calls.clone());
        }
        Ok(args.build()?.into())
    }
}

/// A generic client for interacting with an LLM.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Makes a single, non-streaming chat completion call.
    ///
    /// `tools` may be empty, in which case the model can only answer with text.
    async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<AssistantTurn>;
}

/// An implementation of `LLMClient` for any OpenAI-compatible API (OpenRouter included).
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use (e.g., "openai/gpt-4o-mini").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<AssistantTurn> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(messages);
        if !tools.is_empty() {
            args.tools(tools).tool_choice("auto");
        }
        let request = args.build()?;

        let response: CreateChatCompletionResponse = self.client.chat().create(request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .context("LLM response contained no choices")?;

        Ok(AssistantTurn {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::types::{ChatCompletionToolType, FunctionCall};

    #[test]
    fn test_text_turn_to_request_message() {
        let message = AssistantTurn::text("hello").to_request_message().unwrap();
        assert!(matches!(message, ChatCompletionRequestMessage::Assistant(_)));
    }

    #[test]
    fn test_tool_call_turn_to_request_message() {
        let turn = AssistantTurn {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                r#type: ChatCompletionToolType::Function,
                function: FunctionCall {
                    name: "get_agents_list".to_string(),
                    arguments: "{}".to_string(),
                },
            }],
        };
        match turn.to_request_message().unwrap() {
            ChatCompletionRequestMessage::Assistant(msg) => {
                assert_eq!(msg.tool_calls.unwrap().len(), 1);
                assert!(msg.content.is_none());
            }
            other => panic!("Expected assistant message, got {:?}", other),
        }
    }
}
