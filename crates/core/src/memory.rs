//! Conversation Memory
//!
//! An in-process store of chat histories keyed by thread id. Nothing here is
//! persisted; a restart forgets every conversation.

use async_openai::types::ChatCompletionRequestMessage;
use std::collections::HashMap;
use tokio::sync::Mutex;

pub const DEFAULT_MAX_MESSAGES: usize = 200;

/// Thread-keyed message histories.
///
/// Writes from concurrent callers that share a thread id interleave in arrival order.
/// With a message limit set, the oldest messages are evicted so that a thread always
/// starts at a user message; an assistant turn is never kept without the user
/// message that opened its exchange, and tool results never outlive their call.
#[derive(Debug, Default)]
pub struct ThreadMemory {
    threads: Mutex<HashMap<String, Vec<ChatCompletionRequestMessage>>>,
    max_messages: Option<usize>,
}

impl ThreadMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps every thread at roughly `max_messages`, evicting whole exchanges from the front.
    pub fn with_max_messages(max_messages: usize) -> Self {
        Self {
            threads: Mutex::default(),
            max_messages: Some(max_messages),
        }
    }

    /// Returns a copy of the thread's history, empty if the thread is unknown.
    pub async fn history(&self, thread_id: &str) -> Vec<ChatCompletionRequestMessage> {
        self.threads
            .lock()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn append(&self, thread_id: &str, message: ChatCompletionRequestMessage) {
        self.extend(thread_id, vec![message]).await;
    }

    /// Appends `messages` in one step; no other writer can interleave with them.
    pub async fn extend(&self, thread_id: &str, messages: Vec<ChatCompletionRequestMessage>) {
        let mut threads = self.threads.lock().await;
        let thread = threads.entry(thread_id.to_string()).or_default();
        thread.extend(messages);
        if let Some(max) = self.max_messages {
            evict_oldest(thread, max);
        }
    }

    pub async fn len(&self, thread_id: &str) -> usize {
        self.threads
            .lock()
            .await
            .get(thread_id)
            .map_or(0, Vec::len)
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.lock().await.len()
    }
}

/// Drops messages from the front until at most `max` remain and the thread starts
/// with a user message. The newest exchange is kept whole even when it alone exceeds `max`.
fn evict_oldest(thread: &mut Vec<ChatCompletionRequestMessage>, max: usize) {
    if thread.len() <= max {
        return;
    }
    let overflow = thread.len() - max;
    let cut = thread
        .iter()
        .enumerate()
        .skip(overflow)
        .find(|(_, message)| matches!(message, ChatCompletionRequestMessage::User(_)))
        .map(|(i, _)| i)
        .or_else(|| {
            thread
                .iter()
                .rposition(|message| matches!(message, ChatCompletionRequestMessage::User(_)))
        })
        .unwrap_or(0);
    thread.drain(..cut);
}
