use std::sync::Arc;

use turnstile_model::ModelProvider;

use super::{Agent, TranscriptFn, TranscriptSource};
use crate::augment::Augmenter;
use crate::conversation::Conversation;
use crate::model_client::ModelClient;
use crate::tool::Registry;

/// The iteration budget used when none is configured.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    system_prompt: Option<String>,
    registry: Registry,
    augmenter: Augmenter,
    max_iterations: usize,
    on_transcript: Option<TranscriptFn>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            system_prompt: None,
            registry: Registry::default(),
            augmenter: Augmenter::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            on_transcript: None,
        }
    }

    /// Sets the system prompt.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Uses a connected tool registry.
    #[inline]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets how user input is rewritten before the first model call.
    #[inline]
    pub fn with_augmenter(mut self, augmenter: Augmenter) -> Self {
        self.augmenter = augmenter;
        self
    }

    /// Sets how many model calls one user input may take. Values below
    /// one are raised to one.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Attaches a callback receiving the transcript as it is produced.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Arc::new(on_transcript));
        self
    }

    /// Builds the agent.
    ///
    /// The skills summary of the registry, if any, is appended to the
    /// system prompt.
    pub fn build(self) -> Agent {
        let AgentBuilder {
            model_client,
            system_prompt,
            registry,
            augmenter,
            max_iterations,
            on_transcript,
        } = self;

        let summary = registry
            .skills()
            .map(|skills| skills.summary())
            .filter(|summary| !summary.is_empty());
        let system_prompt = match (system_prompt, summary) {
            (Some(prompt), Some(summary)) => {
                Some(format!("{prompt}\n\n{summary}"))
            }
            (prompt, summary) => prompt.or(summary),
        };
        let conversation = match system_prompt {
            Some(prompt) => Conversation::with_system_prompt(prompt),
            None => Conversation::new(),
        };

        Agent {
            model_client,
            registry,
            augmenter,
            conversation,
            max_iterations,
            on_transcript,
        }
    }
}
