//! Streams one agent exchange to the client as envelopes.

use futures_util::StreamExt;
use pluto_core::{
    agent::{AdapterError, AgentEngine, StepEvent, StepStream},
    envelope::Envelope,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("connection closed")]
    Closed,
}

/// Maps a step to its envelope: agent text is a `message`, tool output is `tools`.
pub fn step_envelope(step: StepEvent) -> Envelope {
    match step {
        StepEvent::AgentMessage(text) => Envelope::message(text),
        StepEvent::ToolResult(payload) => Envelope::tools(payload),
    }
}

/// Submits `utterance` and forwards every step as it arrives, each followed by a separator.
///
/// Returns the number of steps delivered. Steps produced before an adapter failure
/// have already been sent when the error is returned. If the client goes away
/// mid-exchange the remaining steps are still driven to completion, undelivered,
/// before [`ExchangeError::Closed`] is returned.
pub async fn stream_exchange(
    engine: &dyn AgentEngine,
    utterance: &str,
    outbound: &mpsc::Sender<Envelope>,
) -> Result<usize, ExchangeError> {
    let mut steps = engine.submit(utterance);
    let mut delivered = 0;

    while let Some(step) = steps.next().await {
        let step = step?;
        debug!(?step, "Forwarding agent step");
        if outbound.send(step_envelope(step)).await.is_err()
            || outbound.send(Envelope::separator()).await.is_err()
        {
            finish_undelivered(&mut steps).await;
            return Err(ExchangeError::Closed);
        }
        delivered += 1;
    }

    Ok(delivered)
}

/// Runs an exchange to its end without a listener.
async fn finish_undelivered(steps: &mut StepStream) {
    info!("Client gone mid-exchange; finishing it without delivery");
    let mut dropped = 0;
    while let Some(step) = steps.next().await {
        match step {
            Ok(_) => dropped += 1,
            Err(e) => {
                warn!(error = %e, "Undelivered exchange failed");
                return;
            }
        }
    }
    debug!(dropped, "Undelivered exchange finished");
}
