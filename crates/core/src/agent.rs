//! Agent Execution Adapter
//!
//! Runs one exchange with the agent: the model and its tools alternate (ReAct)
//! until the model answers without requesting a tool. Each model turn and each
//! tool result is yielded as a [`StepEvent`] as soon as it is available.
//!
//! The utterance and every message the exchange produces reach the shared
//! conversation memory together, once the exchange completes. An exchange that
//! fails or whose stream is dropped leaves the memory untouched.

use crate::llm_client::{AssistantTurn, LLMClient};
use crate::memory::ThreadMemory;
use anyhow::Result;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool,
};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fixed instruction prepended to every model call.
pub const SYSTEM_INSTRUCTION: &str = r#"You are a helpful agent that can interact with the Twitter (X) API.
You are empowered to interact with Twitter (X) using your tools.

If someone asks you to do something you can't do with your currently available tools, you must say so, and encourage them to implement it themselves using the Twitter (X) API.
Recommend they go to https://developer.x.com/en/docs for more information.

You also have access to Cookie API tools, which can be used to get the list of agents and their metrics. Available operations:
  - get_agent_by_twitter: Get agent details using Twitter username
  - get_agent_by_contract: Get agent details using contract address
  - get_agents_list: Get paginated list of agents
  - search_tweets: Search for tweets within a date range
  - post_tweet: Post a tweet

Be concise and helpful with your responses.
Refrain from restating your tools' descriptions unless it is explicitly requested."#;

pub const DEFAULT_THREAD_ID: &str = "Pluto Chatbot ";
pub const DEFAULT_MAX_STEPS: usize = 25;

/// One unit of agent output within an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    /// Text produced by the model (empty when the turn only requested tools).
    AgentMessage(String),
    /// Output of a single tool invocation, usually JSON.
    ToolResult(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("{0:#}")]
    Model(anyhow::Error),
    #[error("Failed to load tools: {0:#}")]
    Tool(anyhow::Error),
    #[error("Agent stopped after reaching the limit of {0} steps")]
    StepLimit(usize),
}

/// Lazy, finite sequence of steps for one exchange. An `Err` item is always the last one.
pub type StepStream = Pin<Box<dyn Stream<Item = Result<StepEvent, AdapterError>> + Send>>;

/// Anything that can run an exchange for a user utterance.
pub trait AgentEngine: Send + Sync {
    fn submit(&self, utterance: &str) -> StepStream;
}

/// Discovers and invokes the tools available to the agent.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn definitions(&self) -> Result<Vec<ChatCompletionTool>>;

    /// Invokes `name` with JSON-encoded `arguments`. An `Err` is a tool failure the
    /// model gets to see, not a failure of the exchange.
    async fn call(&self, name: &str, arguments: &str) -> Result<String>;
}

/// The production [`AgentEngine`]: a ReAct loop over an LLM and a tool executor.
///
/// All exchanges, from every connection, read and write the single memory thread
/// named by `thread_id`.
#[derive(Clone)]
pub struct AgentExecutor {
    llm: Arc<dyn LLMClient>,
    tools: Arc<dyn ToolExecutor>,
    memory: Arc<ThreadMemory>,
    thread_id: Arc<str>,
    max_steps: usize,
}

impl AgentExecutor {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        tools: Arc<dyn ToolExecutor>,
        memory: Arc<ThreadMemory>,
        thread_id: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            llm,
            tools,
            memory,
            thread_id: thread_id.into(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn memory(&self) -> &Arc<ThreadMemory> {
        &self.memory
    }
}

impl AgentEngine for AgentExecutor {
    fn submit(&self, utterance: &str) -> StepStream {
        let this = self.clone();
        let utterance = utterance.to_string();

        Box::pin(async_stream::try_stream! {
            info!(thread_id = %this.thread_id, "Starting agent exchange");
            let user_message = ChatCompletionRequestUserMessageArgs::default()
                .content(utterance)
                .build()
                .map_err(|e| AdapterError::Model(e.into()))?;
            // Messages of this exchange, committed to the shared thread only once it completes.
            let mut exchange: Vec<ChatCompletionRequestMessage> = vec![user_message.into()];

            let tools = this.tools.definitions().await.map_err(AdapterError::Tool)?;
            let mut steps = 0;

            loop {
                check_step_limit(steps, this.max_steps)?;
                steps += 1;

                let messages = this.prompt(&exchange).await.map_err(AdapterError::Model)?;
                let turn: AssistantTurn = this
                    .llm
                    .complete(messages, tools.clone())
                    .await
                    .map_err(AdapterError::Model)?;
                exchange.push(turn.to_request_message().map_err(AdapterError::Model)?);

                debug!(step = steps, tool_calls = turn.tool_calls.len(), "Model turn complete");
                yield StepEvent::AgentMessage(turn.content.clone().unwrap_or_default());

                if turn.tool_calls.is_empty() {
                    break;
                }

                for call in &turn.tool_calls {
                    let output = match this.tools.call(&call.function.name, &call.function.arguments).await {
                        Ok(output) => output,
                        Err(e) => {
                            warn!(tool = %call.function.name, error = %e, "Tool call failed");
                            format!("Error: {e:#}")
                        }
                    };
                    let tool_message = ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(call.id.clone())
                        .content(output.clone())
                        .build()
                        .map_err(|e| AdapterError::Model(e.into()))?;
                    exchange.push(tool_message.into());

                    yield StepEvent::ToolResult(output);
                }
            }

            let committed = exchange.len();
            this.memory.extend(&this.thread_id, exchange).await;
            info!(thread_id = %this.thread_id, steps, committed, "Agent exchange finished");
        })
    }
}

impl AgentExecutor {
    /// System instruction, the shared thread, then the uncommitted messages of the
    /// exchange in progress.
    async fn prompt(
        &self,
        exchange: &[ChatCompletionRequestMessage],
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTION)
                .build()?
                .into(),
        ];
        messages.extend(self.memory.history(&self.thread_id).await);
        messages.extend_from_slice(exchange);
        Ok(messages)
    }
}

fn check_step_limit(steps: usize, max_steps: usize) -> Result<(), AdapterError> {
    if steps >= max_steps {
        return Err(AdapterError::StepLimit(max_steps));
    }
    Ok(())
}
