//! Agent Toolbox
//!
//! The tools the agent can call, served over the Model Context Protocol (MCP).
//! The server runs in-process and the agent talks to it through an in-memory
//! duplex transport, so tool discovery and invocation go through the same code
//! path a remote MCP server would use.

use crate::{
    agent::ToolExecutor,
    metrics::{self, GatewayError, MetricsGateway},
    twitter::TwitterClient,
};
use anyhow::{Context, Result, bail};
use async_openai::types::{ChatCompletionTool, ChatCompletionToolArgs, FunctionObjectArgs};
use async_trait::async_trait;
use rmcp::{
    ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{CallToolRequestParam, RawContent, ServerCapabilities, ServerInfo},
    service::{RoleClient, RunningService},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

// --- Tool Arguments ---

#[derive(Deserialize, JsonSchema, Debug)]
pub struct AgentByTwitterArgs {
    /// Twitter username of the agent, without the leading '@'.
    pub username: String,
    #[schemars(description = "Time interval for metrics: '_3Days' or '_7Days'. Defaults to '_7Days'.")]
    pub interval: Option<String>,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct AgentByContractArgs {
    /// Contract address of the agent's token.
    pub address: String,
    #[schemars(description = "Time interval for metrics: '_3Days' or '_7Days'. Defaults to '_7Days'.")]
    pub interval: Option<String>,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct AgentsListArgs {
    #[schemars(description = "Time interval for metrics: '_3Days' or '_7Days'. Defaults to '_7Days'.")]
    pub interval: Option<String>,
    /// Page number, starting at 1.
    pub page: Option<u32>,
    /// Number of agents per page (max 25).
    pub page_size: Option<u32>,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SearchTweetsArgs {
    /// Free-text search query.
    pub query: String,
    #[schemars(description = "Start date, formatted YYYY-MM-DD")]
    pub from: String,
    #[schemars(description = "End date, formatted YYYY-MM-DD")]
    pub to: String,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct PostTweetArgs {
    /// Tweet text, at most 280 characters.
    pub text: String,
}

// --- Service ---

/// MCP server exposing the Cookie DAO API and tweet posting to the agent.
pub struct CookieToolbox {
    gateway: Arc<MetricsGateway>,
    twitter: Option<TwitterClient>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for CookieToolbox {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Tools for the Cookie DAO agent metrics API and for posting tweets.".to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl CookieToolbox {
    pub fn new(gateway: Arc<MetricsGateway>, twitter: Option<TwitterClient>) -> Self {
        Self {
            gateway,
            twitter,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Get agent details (mindshare, market cap, price, holders) by Twitter username.")]
    pub async fn get_agent_by_twitter(
        &self,
        args: Parameters<AgentByTwitterArgs>,
    ) -> Result<String, String> {
        let args = args.0;
        info!(username = %args.username, "Executing tool 'get_agent_by_twitter'");
        let interval = args.interval.as_deref().unwrap_or(metrics::DEFAULT_INTERVAL);
        render(self.gateway.agent_by_twitter(&args.username, interval).await)
    }

    #[tool(description = "Get agent details (mindshare, market cap, price, holders) by token contract address.")]
    pub async fn get_agent_by_contract(
        &self,
        args: Parameters<AgentByContractArgs>,
    ) -> Result<String, String> {
        let args = args.0;
        info!(address = %args.address, "Executing tool 'get_agent_by_contract'");
        let interval = args.interval.as_deref().unwrap_or(metrics::DEFAULT_INTERVAL);
        render(self.gateway.agent_by_contract(&args.address, interval).await)
    }

    #[tool(description = "Get a paginated list of agents ranked by mindshare.")]
    pub async fn get_agents_list(&self, args: Parameters<AgentsListArgs>) -> Result<String, String> {
        let args = args.0;
        info!(?args, "Executing tool 'get_agents_list'");
        render(
            self.gateway
                .agents_paged(
                    args.interval.as_deref().unwrap_or(metrics::DEFAULT_INTERVAL),
                    args.page.unwrap_or(metrics::DEFAULT_PAGE),
                    args.page_size.unwrap_or(metrics::DEFAULT_PAGE_SIZE),
                )
                .await,
        )
    }

    #[tool(description = "Search tweets matching a query within a date range.")]
    pub async fn search_tweets(&self, args: Parameters<SearchTweetsArgs>) -> Result<String, String> {
        let args = args.0;
        info!(query = %args.query, "Executing tool 'search_tweets'");
        render(
            self.gateway
                .search_tweets(&args.query, &args.from, &args.to)
                .await,
        )
    }

    #[tool(description = "Post a tweet from the bot's account. Tag agents with '@username'.")]
    pub async fn post_tweet(&self, args: Parameters<PostTweetArgs>) -> Result<String, String> {
        let args = args.0;
        info!(chars = args.text.chars().count(), "Executing tool 'post_tweet'");
        let twitter = self
            .twitter
            .as_ref()
            .ok_or_else(|| "Tweet posting is not configured".to_string())?;
        let tweet = twitter
            .post_tweet(&args.text)
            .await
            .map_err(|e| format!("Failed to post tweet: {e:#}"))?;
        serde_json::to_string(&tweet).map_err(|e| e.to_string())
    }
}

/// Turns a gateway result into tool output: the `ok` payload as JSON, or the error text.
fn render(result: Result<Value, GatewayError>) -> Result<String, String> {
    match result {
        Ok(body) => Ok(metrics::ok_payload(body).to_string()),
        Err(e) => Err(e.to_string()),
    }
}

// --- Client side ---

/// [`ToolExecutor`] backed by an in-process MCP connection to a [`CookieToolbox`].
pub struct McpToolExecutor {
    client: RunningService<RoleClient, ()>,
    server_handle: JoinHandle<()>,
}

impl McpToolExecutor {
    /// Spawns the toolbox server and connects a client to it.
    pub async fn start(toolbox: CookieToolbox) -> Result<Self> {
        let (server_transport, client_transport) = tokio::io::duplex(4096);

        let server_handle = tokio::spawn(async move {
            match toolbox.serve(server_transport).await {
                Ok(service) => {
                    let _ = service.waiting().await;
                }
                Err(e) => error!(error = ?e, "Toolbox server failed to start"),
            }
        });
        let client = ()
            .serve(client_transport)
            .await
            .context("Failed to connect to the toolbox server")?;

        Ok(Self {
            client,
            server_handle,
        })
    }
}

impl Drop for McpToolExecutor {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

#[async_trait]
impl ToolExecutor for McpToolExecutor {
    async fn definitions(&self) -> Result<Vec<ChatCompletionTool>> {
        self.client
            .list_all_tools()
            .await?
            .into_iter()
            .map(|t| {
                Ok(ChatCompletionToolArgs::default()
                    .function(
                        FunctionObjectArgs::default()
                            .name(t.name)
                            .description(t.description.unwrap_or_default())
                            .parameters(serde_json::to_value(&*t.input_schema)?)
                            .build()?,
                    )
                    .build()?)
            })
            .collect()
    }

    async fn call(&self, name: &str, arguments: &str) -> Result<String> {
        let arguments = if arguments.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(arguments).context("Tool arguments are not a JSON object")?)
        };

        let result = self
            .client
            .peer()
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
            })
            .await?;

        let text = result
            .content
            .context("Tool call returned no content")?
            .into_iter()
            .filter_map(|content| match content.raw {
                RawContent::Text(text_content) => Some(text_content.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error == Some(true) {
            bail!(text);
        }
        Ok(text)
    }
}
