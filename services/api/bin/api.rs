//! Main Entrypoint for the Pluto API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the agent: metrics gateway, tool server, model client and shared memory.
//! 3. Constructing the REST and realtime routers and applying middleware.
//! 4. Serving both listeners until a shutdown signal arrives.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use pluto_api::{
    config::Config,
    conversation::ConversationStore,
    registry::SessionRegistry,
    router::{create_realtime_router, create_router},
    state::AppState,
};
use pluto_core::{
    agent::{AgentExecutor, ToolExecutor},
    llm_client::{LLMClient, OpenAICompatibleClient},
    memory::ThreadMemory,
    metrics::MetricsGateway,
    toolbox::{CookieToolbox, McpToolExecutor},
    twitter::TwitterClient,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Resolves once `Ctrl+C` is received, or never if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn serve(
    name: &'static str,
    address: SocketAddr,
    app: axum::Router,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {} listener on {}", name, address))?;
    info!(%address, "{} server listening", name);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown(shutdown))
    .await
    .with_context(|| format!("{} server failed", name))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing agent...");

    // --- 2. Build the Agent ---
    let gateway = Arc::new(MetricsGateway::new(
        config.cookie_api_base.clone(),
        config.cookie_api_key.clone(),
    ));

    let twitter = match &config.twitter_access_token {
        Some(token) => Some(TwitterClient::new(config.twitter_api_base.clone(), token.clone())),
        None => {
            warn!("TWITTER_ACCESS_TOKEN is not set; the post_tweet tool will report an error");
            None
        }
    };

    let tools = McpToolExecutor::start(CookieToolbox::new(gateway.clone(), twitter))
        .await
        .context("Failed to start the agent toolbox")?;
    let tool_names: Vec<String> = tools
        .definitions()
        .await
        .context("Failed to load agent tools")?
        .into_iter()
        .map(|tool| tool.function.name)
        .collect();
    info!(tools = ?tool_names, "Agent toolbox ready");

    let openai_config = OpenAIConfig::new()
        .with_api_key(config.model_api_key.clone())
        .with_api_base(config.model_api_base.clone());
    let llm: Arc<dyn LLMClient> = Arc::new(OpenAICompatibleClient::new(
        openai_config,
        config.chat_model.clone(),
    ));

    let engine = AgentExecutor::new(
        llm.clone(),
        Arc::new(tools),
        Arc::new(ThreadMemory::with_max_messages(config.agent_history_limit)),
        config.agent_thread_id.clone(),
    )
    .with_max_steps(config.max_agent_steps);

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        gateway,
        engine: Arc::new(engine),
        conversations: Arc::new(ConversationStore::new(llm)),
        registry: SessionRegistry::new(),
    });

    // --- 3. Create Routers and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let rest_app = create_router(app_state.clone()).layer(cors);
    let realtime_app = create_realtime_router(app_state);

    // --- 4. Start Servers ---
    info!(
        model = %config.chat_model,
        thread_id = %config.agent_thread_id,
        history_limit = config.agent_history_limit,
        auto_interval = ?config.auto_interval,
        "Service configured. Starting servers..."
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    tokio::try_join!(
        serve("REST", config.bind_address, rest_app, shutdown_rx.clone()),
        serve(
            "Realtime",
            config.realtime_bind_address,
            realtime_app,
            shutdown_rx
        ),
    )?;

    info!("Servers have shut down.");
    Ok(())
}
