//! Client-side view state derived from received envelopes.

use crate::cards::{self, DisplayCard};
use crate::envelope::{Envelope, EnvelopeKind};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: String,
}

/// What changed after applying an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardUpdate<'a> {
    Transcript(&'a TranscriptEntry),
    Card(&'a DisplayCard),
    Unchanged,
}

/// Append-only transcript plus the single current side-panel card.
#[derive(Debug, Default, Clone)]
pub struct Dashboard {
    transcript: Vec<TranscriptEntry>,
    card: Option<DisplayCard>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn card(&self) -> Option<&DisplayCard> {
        self.card.as_ref()
    }

    /// Records a line typed by the user.
    pub fn push_user(&mut self, text: impl Into<String>) -> &TranscriptEntry {
        self.push(TranscriptEntry {
            speaker: Speaker::User,
            text: text.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    /// Folds a server envelope into the view. Separators and empty agent turns leave it unchanged.
    pub fn apply(&mut self, envelope: &Envelope) -> DashboardUpdate<'_> {
        match envelope.kind {
            EnvelopeKind::Tools => {
                let card = self.card.insert(cards::classify(&envelope.content));
                DashboardUpdate::Card(&*card)
            }
            _ if envelope.is_separator() || envelope.content.is_empty() => {
                DashboardUpdate::Unchanged
            }
            EnvelopeKind::Connection | EnvelopeKind::Message | EnvelopeKind::Error => {
                DashboardUpdate::Transcript(self.push(TranscriptEntry {
                    speaker: Speaker::Agent,
                    text: envelope.content.clone(),
                    timestamp: envelope.timestamp.clone(),
                }))
            }
        }
    }

    fn push(&mut self, entry: TranscriptEntry) -> &TranscriptEntry {
        self.transcript.push(entry);
        &self.transcript[self.transcript.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_build_transcript_and_skip_separators() {
        let mut dashboard = Dashboard::new();
        dashboard.apply(&Envelope::connection("Welcome"));
        dashboard.push_user("chat");
        dashboard.apply(&Envelope::message("Chat mode selected."));
        assert_eq!(dashboard.apply(&Envelope::separator()), DashboardUpdate::Unchanged);
        assert_eq!(dashboard.apply(&Envelope::message("")), DashboardUpdate::Unchanged);

        let speakers: Vec<Speaker> = dashboard.transcript().iter().map(|e| e.speaker).collect();
        assert_eq!(speakers, vec![Speaker::Agent, Speaker::User, Speaker::Agent]);
        assert!(dashboard.card().is_none());
    }

    #[test]
    fn test_tool_results_replace_current_card() {
        let mut dashboard = Dashboard::new();
        dashboard.apply(&Envelope::tools(r#"{"agentName":"aixbt","mindshare":1}"#));
        assert!(matches!(dashboard.card(), Some(DisplayCard::AgentDetails(_))));

        dashboard.apply(&Envelope::tools("not json"));
        assert!(dashboard.card().unwrap().is_error());
        assert!(dashboard.transcript().is_empty());
    }

    #[test]
    fn test_error_envelopes_are_shown_in_transcript() {
        let mut dashboard = Dashboard::new();
        match dashboard.apply(&Envelope::error("Error: boom")) {
            DashboardUpdate::Transcript(entry) => {
                assert_eq!(entry.speaker, Speaker::Agent);
                assert_eq!(entry.text, "Error: boom");
            }
            other => panic!("Expected transcript update, got {:?}", other),
        }
    }
}
