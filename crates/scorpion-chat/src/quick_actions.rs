//! Canned prompts offered as one-click actions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::controller::{ConversationController, Rejection};

/// Files credited to the knowledge vault per indexing run.
pub const FILES_PER_INDEX: u64 = 5;

/// Prompt submitted after an indexing run.
pub const INDEX_COMPLETE_PROMPT: &str =
    "Indexing complete. Knowledge Vault updated with project local context.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuickAction {
    ConfigureLlmNodes,
    AiStudioRoadmap,
    PlatformSync,
    StartWizard,
}

impl QuickAction {
    pub const ALL: [QuickAction; 4] = [
        QuickAction::ConfigureLlmNodes,
        QuickAction::AiStudioRoadmap,
        QuickAction::PlatformSync,
        QuickAction::StartWizard,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            QuickAction::ConfigureLlmNodes => "configure-llm-nodes",
            QuickAction::AiStudioRoadmap => "ai-studio-roadmap",
            QuickAction::PlatformSync => "platform-sync",
            QuickAction::StartWizard => "start-wizard",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QuickAction::ConfigureLlmNodes => "Configure LLM Nodes",
            QuickAction::AiStudioRoadmap => "AI Studio Roadmap",
            QuickAction::PlatformSync => "Platform Sync",
            QuickAction::StartWizard => "Start Wizard",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            QuickAction::ConfigureLlmNodes => "Initiate Qwen & Ollama Configuration Wizard.",
            QuickAction::AiStudioRoadmap => {
                "Show me the roadmap to build an AI agent in Google AI Studio."
            }
            QuickAction::PlatformSync => {
                "Compare AI platforms: Gemini vs Claude vs Azure for IT issues."
            }
            QuickAction::StartWizard => "Guide me through the Qwen & Ollama configuration protocol.",
        }
    }

    /// Submit this action's prompt. Subject to the usual busy guard.
    pub fn trigger(&self, controller: &ConversationController) -> Result<Uuid, Rejection> {
        tracing::debug!(action = self.slug(), "Quick action triggered");
        controller.submit_detached(Some(self.prompt().to_string()))
    }
}

impl fmt::Display for QuickAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for QuickAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuickAction::ALL
            .into_iter()
            .find(|action| action.slug().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown quick action '{}'", s))
    }
}

/// Credit an indexing run and announce it.
///
/// The counter grows even when the announcement is rejected as busy.
pub fn index_files(controller: &ConversationController) -> (u64, Result<Uuid, Rejection>) {
    let total = controller.record_indexed_files(FILES_PER_INDEX);
    tracing::info!(indexed_files = total, "Knowledge vault indexed");
    (
        total,
        controller.submit_detached(Some(INDEX_COMPLETE_PROMPT.to_string())),
    )
}
