mod builder;
mod state;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use turnstile_model::{ModelMessage, ModelTool};

use crate::augment::Augmenter;
use crate::conversation::Conversation;
use crate::model_client::ModelClient;
use crate::tool::Registry;
pub use builder::{AgentBuilder, DEFAULT_MAX_ITERATIONS};
pub use state::{LoopStage, TurnOutcome};

/// The origin of a piece of transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranscriptSource {
    /// The raw user input.
    User,
    /// A streamed piece of assistant text.
    Assistant,
    /// A tool call or its result.
    Tool,
}

pub(crate) type TranscriptFn =
    Arc<dyn Fn(&str, TranscriptSource) + Send + Sync>;

/// An agent session, which owns the conversation, the model client and
/// the tool registry.
///
/// One call to [`Agent::run`] drives the tool-calling loop for a single
/// user input until the model answers or the iteration budget runs out.
/// The agent is then ready for the next input, continuing the same
/// conversation.
pub struct Agent {
    model_client: ModelClient,
    registry: Registry,
    augmenter: Augmenter,
    conversation: Conversation,
    max_iterations: usize,
    on_transcript: Option<TranscriptFn>,
}

impl Agent {
    /// Runs the loop for one user input and returns the final answer.
    ///
    /// Running out of iterations is not an error, the best text produced
    /// so far is returned, which may be empty.
    pub async fn send_message(
        &mut self,
        text: &str,
    ) -> Result<String, crate::Error> {
        self.run(text).await.map(|outcome| outcome.answer)
    }

    /// Returns every turn of the conversation, oldest first.
    #[inline]
    pub fn transcript(&self) -> &[ModelMessage] {
        self.conversation.items()
    }

    /// Drops every turn except the system prompt. Tool providers are kept
    /// connected and their tools stay registered.
    #[inline]
    pub fn reset_transcript(&mut self) {
        self.conversation.reset();
    }

    /// Disconnects all tool providers. Calling it again does nothing.
    pub async fn end_session(&mut self) {
        self.registry.disconnect_all().await;
    }

    /// Returns the definitions of the tools offered to the model.
    #[inline]
    pub fn tool_definitions(&self) -> &[ModelTool] {
        self.registry.definitions()
    }

    /// Returns the tool registry.
    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Turns retrieval of reference material on or off.
    #[inline]
    pub fn set_retrieval_enabled(&mut self, enabled: bool) {
        self.augmenter.set_retrieval_enabled(enabled);
    }

    #[inline]
    fn emit_transcript(&self, text: &str, source: TranscriptSource) {
        if let Some(on_transcript) = &self.on_transcript {
            on_transcript(text, source);
        }
    }
}
