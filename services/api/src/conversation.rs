//! Conversation Store
//!
//! Backs the REST chat endpoints: one in-memory history per client `sessionId`,
//! replayed to the model on every turn. Unlike realtime sessions these
//! conversations never call tools.

use anyhow::Result;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs,
};
use pluto_core::{llm_client::LLMClient, memory::ThreadMemory};
use std::sync::Arc;
use tracing::debug;

pub const CHAT_SYSTEM_PROMPT: &str =
    "You are an AI assistant that provides insights about agents using data from the Cookie API.";

pub struct ConversationStore {
    llm: Arc<dyn LLMClient>,
    memory: ThreadMemory,
    system_prompt: String,
}

impl ConversationStore {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self {
            llm,
            memory: ThreadMemory::new(),
            system_prompt: CHAT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Sends `input` within the session's conversation and returns the model's reply.
    ///
    /// The session is created on first use. The exchange is only remembered when
    /// the model call succeeds.
    pub async fn invoke(&self, session_id: &str, input: &str) -> Result<String> {
        let system: ChatCompletionRequestMessage = ChatCompletionRequestSystemMessageArgs::default()
            .content(self.system_prompt.as_str())
            .build()?
            .into();
        let user: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(input)
            .build()?
            .into();

        let history = self.memory.history(session_id).await;
        debug!(session_id, history = history.len(), "Invoking chat model");

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(system);
        messages.extend(history);
        messages.push(user.clone());

        let turn = self.llm.complete(messages, Vec::new()).await?;
        let reply = turn.content.clone().unwrap_or_default();

        self.memory.append(session_id, user).await;
        self.memory
            .append(session_id, turn.to_request_message()?)
            .await;
        Ok(reply)
    }

    pub async fn session_count(&self) -> usize {
        self.memory.thread_count().await
    }
}
