//! Manages the realtime connection lifecycle.
//!
//! Each socket gets three pieces: a reader task that forwards inbound text frames
//! into a channel, a writer task that serializes outbound envelopes onto the socket,
//! and the [`Session`] actor that owns the protocol state between them.

use super::{
    exchange::{ExchangeError, stream_exchange},
    protocol::{self, Action, Mode, ProtocolError, SessionState, transition},
};
use crate::{
    registry::{ConnectionId, SessionRegistry},
    state::AppState,
};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use pluto_core::{agent::AgentEngine, envelope::Envelope};
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::Instant};
use tracing::{Instrument, debug, error, info, info_span, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Wires a freshly upgraded socket to a new [`Session`] and runs it to completion.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = state.registry.register().await;
    let span = info_span!("ws_session", %connection_id);

    async move {
        info!("Client connected");
        let (socket_tx, socket_rx) = socket.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let reader = tokio::spawn(read_frames(socket_rx, inbound_tx).in_current_span());
        let writer = tokio::spawn(write_envelopes(socket_tx, outbound_rx).in_current_span());

        Session::new(
            connection_id,
            state.engine.clone(),
            state.registry.clone(),
            state.config.auto_interval,
            inbound_rx,
            outbound_tx,
        )
        .run()
        .await;

        reader.abort();
        if let Err(e) = writer.await {
            error!(error = ?e, "Writer task panicked");
        }
        info!("Client disconnected");
    }
    .instrument(span)
    .await
}

/// Forwards text frames until the client closes the socket or the session stops listening.
async fn read_frames(mut socket_rx: SplitStream<WebSocket>, inbound_tx: mpsc::Sender<String>) {
    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if inbound_tx.send(text.to_string()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                // Every inbound frame must be JSON text; let the state machine reject it.
                if inbound_tx.send(String::new()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close frame");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        }
    }
}

/// Sends envelopes in order; closes the socket once the session drops its sender.
async fn write_envelopes(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Envelope>,
) {
    while let Some(envelope) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, &envelope).await {
            warn!(error = %e, "Failed to deliver envelope; dropping connection");
            return;
        }
    }
    let _ = socket_tx.send(Message::Close(None)).await;
}

/// A helper function to serialize and send an [`Envelope`] to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    envelope: &Envelope,
) -> anyhow::Result<()> {
    let serialized = serde_json::to_string(envelope)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

/// Whether the session should keep reading frames.
enum Flow {
    Continue,
    StartAuto,
    Stop,
}

/// Per-connection actor: consumes inbound frames, drives the protocol state machine
/// and emits envelopes. Dropping it (returning from [`Session::run`]) closes the socket.
pub struct Session {
    id: ConnectionId,
    state: SessionState,
    engine: Arc<dyn AgentEngine>,
    registry: SessionRegistry,
    auto_interval: Duration,
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<Envelope>,
}

impl Session {
    pub fn new(
        id: ConnectionId,
        engine: Arc<dyn AgentEngine>,
        registry: SessionRegistry,
        auto_interval: Duration,
        inbound: mpsc::Receiver<String>,
        outbound: mpsc::Sender<Envelope>,
    ) -> Self {
        Self {
            id,
            state: SessionState::AwaitingMode,
            engine,
            registry,
            auto_interval,
            inbound,
            outbound,
        }
    }

    pub async fn run(mut self) {
        self.send(Envelope::connection(protocol::GREETING)).await;

        while self.state != SessionState::Closed {
            let Some(raw) = self.inbound.recv().await else {
                debug!("Inbound channel closed");
                break;
            };
            match self.handle_frame(&raw).await {
                Flow::Continue => {}
                Flow::StartAuto => self.run_auto_loop().await,
                Flow::Stop => break,
            }
        }

        self.state = SessionState::Closed;
        self.registry.remove(self.id).await;
    }

    async fn handle_frame(&mut self, raw: &str) -> Flow {
        let (next, action) = transition(self.state, raw);
        self.state = next;

        match action {
            Action::SelectMode(mode) => {
                self.registry.set_mode(self.id, mode).await;
                info!(?mode, "Mode selected");
                match mode {
                    Mode::Chat => {
                        self.send(Envelope::message(protocol::CHAT_SELECTED)).await;
                        self.send(Envelope::message(protocol::CHAT_ACTIVATED)).await;
                        Flow::Continue
                    }
                    Mode::Auto => {
                        self.send(Envelope::message(protocol::AUTO_SELECTED)).await;
                        self.send(Envelope::message(protocol::AUTO_ACTIVATED)).await;
                        Flow::StartAuto
                    }
                }
            }
            Action::Exchange(text) => {
                match stream_exchange(self.engine.as_ref(), &text, &self.outbound).await {
                    Ok(steps) => debug!(steps, "Chat exchange complete"),
                    Err(ExchangeError::Closed) => self.state = SessionState::Closed,
                    // The chat loop survives agent failures and waits for the next message.
                    Err(ExchangeError::Adapter(e)) => {
                        error!(error = %e, "Chat exchange failed");
                        self.send(Envelope::error(format!("Error: {}", e))).await;
                    }
                }
                Flow::Continue
            }
            Action::Farewell => {
                info!("Client ended chat");
                self.send(Envelope::message(protocol::FAREWELL)).await;
                Flow::Stop
            }
            Action::Reject(err) => {
                if let ProtocolError::Malformed(reason) = &err {
                    warn!(%reason, "Malformed frame");
                } else {
                    warn!(error = %err, "Rejected frame");
                }
                self.send(Envelope::error(err.to_string())).await;
                Flow::Continue
            }
            Action::Ignore => {
                debug!(state = ?self.state, "Ignoring frame");
                Flow::Continue
            }
        }
    }

    /// Runs self-driven exchanges until the connection closes or the agent fails.
    async fn run_auto_loop(&mut self) {
        while self.is_open() {
            match stream_exchange(self.engine.as_ref(), protocol::AUTO_PROMPT, &self.outbound).await {
                Ok(steps) => debug!(steps, "Autonomous exchange complete"),
                Err(ExchangeError::Closed) => {
                    self.state = SessionState::Closed;
                    return;
                }
                // Unlike chat mode, an agent failure ends the autonomous loop for good.
                Err(ExchangeError::Adapter(e)) => {
                    error!(error = %e, "Autonomous exchange failed; stopping loop");
                    self.send(Envelope::error(format!("Error: {}", e))).await;
                    if self.state != SessionState::Closed {
                        self.state = SessionState::Halted;
                    }
                    return;
                }
            }

            self.idle_until(Instant::now() + self.auto_interval).await;
        }
    }

    /// Sleeps until `deadline` while still answering frames that arrive meanwhile.
    async fn idle_until(&mut self, deadline: Instant) {
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        while self.is_open() {
            tokio::select! {
                _ = &mut sleep => return,
                frame = self.inbound.recv() => match frame {
                    Some(raw) => {
                        self.handle_frame(&raw).await;
                    }
                    None => self.state = SessionState::Closed,
                },
            }
        }
    }

    fn is_open(&self) -> bool {
        self.state != SessionState::Closed && !self.outbound.is_closed()
    }

    async fn send(&mut self, envelope: Envelope) {
        if self.outbound.send(envelope).await.is_err() {
            self.state = SessionState::Closed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestMessage, ChatCompletionTool,
        ChatCompletionToolType, FunctionCall,
    };
    use async_trait::async_trait;
    use futures_util::stream;
    use pluto_core::{
        agent::{AdapterError, AgentExecutor, StepEvent, StepStream, ToolExecutor},
        envelope::{EnvelopeKind, InboundFrame, SEPARATOR},
        llm_client::{AssistantTurn, LLMClient},
        memory::ThreadMemory,
    };
    use std::sync::Mutex;

    /// Replays a fixed script of exchanges and records every utterance it receives.
    struct ScriptedEngine {
        script: Mutex<Vec<Vec<Result<StepEvent, AdapterError>>>>,
        utterances: Mutex<Vec<String>>,
    }

    impl ScriptedEngine {
        fn new(script: Vec<Vec<Result<StepEvent, AdapterError>>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                utterances: Mutex::new(Vec::new()),
            })
        }

        fn submissions(&self) -> Vec<String> {
            self.utterances.lock().unwrap().clone()
        }
    }

    impl AgentEngine for ScriptedEngine {
        fn submit(&self, utterance: &str) -> StepStream {
            self.utterances.lock().unwrap().push(utterance.to_string());
            let mut script = self.script.lock().unwrap();
            let steps = if script.is_empty() {
                vec![Ok(StepEvent::AgentMessage("done".to_string()))]
            } else {
                script.remove(0)
            };
            Box::pin(stream::iter(steps))
        }
    }

    struct Harness {
        inbound: mpsc::Sender<String>,
        outbound: mpsc::Receiver<Envelope>,
        registry: SessionRegistry,
        id: ConnectionId,
        task: tokio::task::JoinHandle<()>,
    }

    impl Harness {
        async fn start(engine: Arc<dyn AgentEngine>) -> Self {
            let registry = SessionRegistry::new();
            let id = registry.register().await;
            let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
            let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
            let session = Session::new(
                id,
                engine,
                registry.clone(),
                Duration::from_secs(10),
                inbound_rx,
                outbound_tx,
            );
            Self {
                inbound: inbound_tx,
                outbound: outbound_rx,
                registry,
                id,
                task: tokio::spawn(session.run()),
            }
        }

        async fn say(&self, content: &str) {
            let raw = serde_json::to_string(&InboundFrame::new(content)).unwrap();
            self.inbound.send(raw).await.unwrap();
        }

        async fn send_raw(&self, raw: &str) {
            self.inbound.send(raw.to_string()).await.unwrap();
        }

        async fn next(&mut self) -> Envelope {
            self.outbound.recv().await.expect("session closed unexpectedly")
        }

        async fn expect(&mut self, kind: EnvelopeKind, content: &str) {
            let envelope = self.next().await;
            assert_eq!((envelope.kind, envelope.content.as_str()), (kind, content));
        }

        async fn select_chat(&mut self) {
            self.next().await;
            self.say("chat").await;
            self.expect(EnvelopeKind::Message, protocol::CHAT_SELECTED).await;
            self.expect(EnvelopeKind::Message, protocol::CHAT_ACTIVATED).await;
        }

        /// Stops reading envelopes, as the writer task does when the socket goes away.
        fn close_output(&mut self) {
            let (_, closed) = mpsc::channel(1);
            self.outbound = closed;
        }
    }

    /// Asks for `get_agents_list` on the first call and answers with text afterwards.
    #[derive(Default)]
    struct ListThenAnswer {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl LLMClient for ListThenAnswer {
        async fn complete(
            &self,
            messages: Vec<ChatCompletionRequestMessage>,
            _tools: Vec<ChatCompletionTool>,
        ) -> anyhow::Result<AssistantTurn> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(messages.len());
            if calls.len() == 1 {
                return Ok(AssistantTurn {
                    content: None,
                    tool_calls: vec![ChatCompletionMessageToolCall {
                        id: "call_1".to_string(),
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionCall {
                            name: "get_agents_list".to_string(),
                            arguments: "{}".to_string(),
                        },
                    }],
                });
            }
            Ok(AssistantTurn::text("aixbt leads mindshare."))
        }
    }

    #[derive(Default)]
    struct AgentsListTool {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolExecutor for AgentsListTool {
        async fn definitions(&self) -> anyhow::Result<Vec<ChatCompletionTool>> {
            Ok(vec![])
        }

        async fn call(&self, name: &str, _arguments: &str) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(name.to_string());
            Ok(r#"{"currentPage":1,"data":[]}"#.to_string())
        }
    }

    fn agent_executor(llm: Arc<ListThenAnswer>, tools: Arc<AgentsListTool>) -> AgentExecutor {
        AgentExecutor::new(llm, tools, Arc::new(ThreadMemory::new()), "shared")
    }

    fn agent(text: &str) -> Result<StepEvent, AdapterError> {
        Ok(StepEvent::AgentMessage(text.to_string()))
    }

    fn tool(payload: &str) -> Result<StepEvent, AdapterError> {
        Ok(StepEvent::ToolResult(payload.to_string()))
    }

    #[tokio::test]
    async fn test_first_envelope_is_connection_greeting() {
        let mut h = Harness::start(ScriptedEngine::new(vec![])).await;
        h.expect(EnvelopeKind::Connection, protocol::GREETING).await;
    }

    #[tokio::test]
    async fn test_invalid_mode_can_be_retried() {
        let mut h = Harness::start(ScriptedEngine::new(vec![])).await;
        h.next().await;

        h.say("hello").await;
        h.expect(EnvelopeKind::Error, &ProtocolError::InvalidMode.to_string())
            .await;
        h.send_raw("{not json").await;
        h.expect(
            EnvelopeKind::Error,
            "An error occurred while processing your request.",
        )
        .await;

        h.say("1").await;
        h.expect(EnvelopeKind::Message, protocol::CHAT_SELECTED).await;
        h.expect(EnvelopeKind::Message, protocol::CHAT_ACTIVATED).await;
        assert_eq!(h.registry.get(h.id).await.unwrap().mode, Some(Mode::Chat));
    }

    #[tokio::test]
    async fn test_chat_exchange_streams_steps_with_separators() {
        let engine = ScriptedEngine::new(vec![vec![
            agent(""),
            tool(r#"{"agentName":"aixbt"}"#),
            agent("aixbt leads mindshare."),
        ]]);
        let mut h = Harness::start(engine.clone()).await;
        h.next().await;
        h.say("chat").await;
        h.next().await;
        h.next().await;

        h.say("  who leads?  ").await;
        h.expect(EnvelopeKind::Message, "").await;
        h.expect(EnvelopeKind::Message, SEPARATOR).await;
        h.expect(EnvelopeKind::Tools, r#"{"agentName":"aixbt"}"#).await;
        h.expect(EnvelopeKind::Message, SEPARATOR).await;
        h.expect(EnvelopeKind::Message, "aixbt leads mindshare.").await;
        h.expect(EnvelopeKind::Message, SEPARATOR).await;

        assert_eq!(engine.submissions(), vec!["who leads?".to_string()]);
    }

    #[tokio::test]
    async fn test_mode_selection_happens_once() {
        let engine = ScriptedEngine::new(vec![]);
        let mut h = Harness::start(engine.clone()).await;
        h.next().await;
        h.say("chat").await;
        h.next().await;
        h.next().await;

        h.say("auto").await;
        h.expect(EnvelopeKind::Message, "done").await;
        h.expect(EnvelopeKind::Message, SEPARATOR).await;
        assert_eq!(engine.submissions(), vec!["auto".to_string()]);
        assert_eq!(h.registry.get(h.id).await.unwrap().mode, Some(Mode::Chat));
    }

    #[tokio::test]
    async fn test_chat_survives_adapter_errors() {
        let engine = ScriptedEngine::new(vec![
            vec![agent("thinking"), Err(AdapterError::StepLimit(25))],
            vec![agent("recovered")],
        ]);
        let mut h = Harness::start(engine).await;
        h.next().await;
        h.say("chat").await;
        h.next().await;
        h.next().await;

        h.say("first").await;
        h.expect(EnvelopeKind::Message, "thinking").await;
        h.expect(EnvelopeKind::Message, SEPARATOR).await;
        h.expect(
            EnvelopeKind::Error,
            "Error: Agent stopped after reaching the limit of 25 steps",
        )
        .await;

        h.say("second").await;
        h.expect(EnvelopeKind::Message, "recovered").await;
        h.expect(EnvelopeKind::Message, SEPARATOR).await;
    }

    #[tokio::test]
    async fn test_exit_sends_farewell_and_closes() {
        let mut h = Harness::start(ScriptedEngine::new(vec![])).await;
        h.next().await;
        h.say("chat").await;
        h.next().await;
        h.next().await;

        h.say("ExIt").await;
        h.expect(EnvelopeKind::Message, protocol::FAREWELL).await;
        assert!(h.outbound.recv().await.is_none());
        h.task.await.unwrap();
        assert_eq!(h.registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_exit_after_completed_exchange() {
        let engine = ScriptedEngine::new(vec![vec![agent("aixbt leads mindshare.")]]);
        let mut h = Harness::start(engine.clone()).await;
        h.select_chat().await;

        h.say("who leads?").await;
        h.expect(EnvelopeKind::Message, "aixbt leads mindshare.").await;
        h.expect(EnvelopeKind::Message, SEPARATOR).await;

        h.say("exit").await;
        h.expect(EnvelopeKind::Message, protocol::FAREWELL).await;
        assert!(h.outbound.recv().await.is_none());
        h.task.await.unwrap();
        assert_eq!(engine.submissions(), vec!["who leads?".to_string()]);
        assert_eq!(h.registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_mid_exchange_still_completes_it() {
        let engine = ScriptedEngine::new(vec![vec![
            agent(""),
            tool(r#"{"agentName":"aixbt"}"#),
            agent("aixbt leads mindshare."),
        ]]);
        let mut h = Harness::start(engine.clone()).await;
        h.select_chat().await;
        h.close_output();

        h.say("who leads?").await;
        (&mut h.task).await.unwrap();
        assert_eq!(engine.submissions(), vec!["who leads?".to_string()]);
        assert_eq!(h.registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_mid_exchange_keeps_agent_memory_consistent() {
        let llm = Arc::new(ListThenAnswer::default());
        let tools = Arc::new(AgentsListTool::default());
        let executor = agent_executor(llm.clone(), tools.clone());
        let memory = executor.memory().clone();

        let mut h = Harness::start(Arc::new(executor.clone())).await;
        h.select_chat().await;
        h.close_output();
        h.say("list the agents").await;
        (&mut h.task).await.unwrap();

        // user, assistant with the tool call, tool result, final answer
        let history = memory.history("shared").await;
        assert_eq!(history.len(), 4);
        assert!(matches!(history[0], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(history[2], ChatCompletionRequestMessage::Tool(_)));
        assert!(matches!(history[3], ChatCompletionRequestMessage::Assistant(_)));
        assert_eq!(tools.calls.lock().unwrap().as_slice(), ["get_agents_list"]);

        // The next connection on the shared thread starts from a valid history.
        let mut next = Harness::start(Arc::new(executor)).await;
        next.select_chat().await;
        next.say("and now?").await;
        next.expect(EnvelopeKind::Message, "aixbt leads mindshare.").await;
        next.expect(EnvelopeKind::Message, SEPARATOR).await;
        // system + 4 remembered + new utterance
        assert_eq!(llm.calls.lock().unwrap().last(), Some(&6));
        assert_eq!(memory.len("shared").await, 6);
    }

    #[tokio::test]
    async fn test_client_disconnect_ends_session() {
        let h = Harness::start(ScriptedEngine::new(vec![])).await;
        let Harness {
            inbound,
            registry,
            task,
            ..
        } = h;
        drop(inbound);
        task.await.unwrap();
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_loop_repeats_after_interval() {
        let engine = ScriptedEngine::new(vec![vec![agent("tweet 1")], vec![agent("tweet 2")]]);
        let mut h = Harness::start(engine.clone()).await;
        h.next().await;
        h.say("auto").await;
        h.expect(EnvelopeKind::Message, protocol::AUTO_SELECTED).await;
        h.expect(EnvelopeKind::Message, protocol::AUTO_ACTIVATED).await;

        h.expect(EnvelopeKind::Message, "tweet 1").await;
        h.expect(EnvelopeKind::Message, SEPARATOR).await;

        // Frames during auto mode never stop the loop.
        h.say("exit").await;

        h.expect(EnvelopeKind::Message, "tweet 2").await;
        h.expect(EnvelopeKind::Message, SEPARATOR).await;

        let submissions = engine.submissions();
        assert_eq!(submissions.len(), 2);
        assert!(submissions.iter().all(|s| s == protocol::AUTO_PROMPT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_loop_stops_for_good_after_adapter_error() {
        let engine = ScriptedEngine::new(vec![vec![Err(AdapterError::StepLimit(3))]]);
        let mut h = Harness::start(engine.clone()).await;
        h.next().await;
        h.say("2").await;
        h.next().await;
        h.next().await;

        h.expect(
            EnvelopeKind::Error,
            "Error: Agent stopped after reaching the limit of 3 steps",
        )
        .await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(engine.submissions().len(), 1);

        // The connection stays open; malformed frames still get an answer.
        h.send_raw("oops").await;
        h.expect(
            EnvelopeKind::Error,
            "An error occurred while processing your request.",
        )
        .await;
        assert_eq!(engine.submissions().len(), 1);
        assert!(!h.task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_loop_ends_when_client_disconnects() {
        let engine = ScriptedEngine::new(vec![]);
        let mut h = Harness::start(engine.clone()).await;
        h.next().await;
        h.say("auto").await;
        h.next().await;
        h.next().await;
        h.next().await;
        h.next().await;

        drop(h.inbound);
        h.task.await.unwrap();
        assert_eq!(engine.submissions().len(), 1);
        assert_eq!(h.registry.len().await, 0);
    }
}
