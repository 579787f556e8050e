//! Defines the realtime session protocol: the fixed texts sent to the client and the
//! state machine that decides what each inbound frame means.

use pluto_core::envelope::InboundFrame;
use serde::{Deserialize, Serialize};

pub const GREETING: &str = "Welcome to Twitter Agentkit Chatbot.\n\
Please select a mode:\n\
Type 'chat' (or '1') for interactive chat mode, or 'auto' (or '2') for autonomous mode.";
pub const CHAT_SELECTED: &str = "Chat mode selected.";
pub const CHAT_ACTIVATED: &str = "Chat mode activated. Type your message (type 'exit' to quit).";
pub const AUTO_SELECTED: &str = "Autonomous mode selected.";
pub const AUTO_ACTIVATED: &str = "Autonomous mode activated. The agent will now run periodically.";
pub const FAREWELL: &str = "Exiting chat mode. Goodbye!";
pub const EXIT_KEYWORD: &str = "exit";

/// The prompt the autonomous loop submits on every iteration.
pub const AUTO_PROMPT: &str = "Be creative and use the cookie tool to get the twitter agent list and compare and find good agent \
Choose an action to post a tweet about the agent you found and tag the agent in the tweet";

/// How a connection operates once the client has chosen.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One exchange per client message.
    Chat,
    /// Self-driven exchanges on a fixed interval.
    Auto,
}

impl Mode {
    /// Parses a mode selection. Matching is exact and case-sensitive.
    pub fn from_selection(input: &str) -> Option<Self> {
        match input {
            "chat" | "1" => Some(Self::Chat),
            "auto" | "2" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Non-fatal protocol violations. The `Display` text is what the client receives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The frame was not a JSON object with a string `content`. Holds the parser's reason.
    #[error("An error occurred while processing your request.")]
    Malformed(String),
    #[error("Invalid mode. Please type 'chat' or 'auto' to select a mode.")]
    InvalidMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingMode,
    ChatLoop,
    AutoLoop,
    /// The autonomous loop stopped after an agent failure; the socket stays open but idle.
    Halted,
    Closed,
}

/// What the session must do in response to a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SelectMode(Mode),
    /// Run one agent exchange with this (trimmed) user text.
    Exchange(String),
    /// Say goodbye and close the connection.
    Farewell,
    Reject(ProtocolError),
    Ignore,
}

/// Computes the next state and the action for one raw inbound text frame.
pub fn transition(state: SessionState, raw: &str) -> (SessionState, Action) {
    let frame = match serde_json::from_str::<InboundFrame>(raw) {
        Ok(frame) => frame,
        Err(e) => return (state, Action::Reject(ProtocolError::Malformed(e.to_string()))),
    };

    match state {
        SessionState::AwaitingMode => match Mode::from_selection(&frame.content) {
            Some(Mode::Chat) => (SessionState::ChatLoop, Action::SelectMode(Mode::Chat)),
            Some(Mode::Auto) => (SessionState::AutoLoop, Action::SelectMode(Mode::Auto)),
            None => (state, Action::Reject(ProtocolError::InvalidMode)),
        },
        SessionState::ChatLoop => {
            let input = frame.content.trim();
            if input.to_lowercase() == EXIT_KEYWORD {
                (SessionState::Closed, Action::Farewell)
            } else {
                (SessionState::ChatLoop, Action::Exchange(input.to_string()))
            }
        }
        SessionState::AutoLoop | SessionState::Halted | SessionState::Closed => {
            (state, Action::Ignore)
        }
    }
}
