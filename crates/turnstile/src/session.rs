use std::sync::Arc;

use turnstile_core::augment::{Augmenter, DEFAULT_TOP_K, Retriever};
use turnstile_core::tool::{Registry, SkillSource, ToolProvider};
use turnstile_core::{Agent, AgentBuilder, Error, TranscriptSource};
use turnstile_model::{ModelMessage, ModelProvider, ModelTool};

use crate::config::Config;
use crate::mcp::provider_from_config;
use crate::rag::{Embedder, RagRetriever};
use crate::skills::SkillLibrary;
use crate::tools::workspace_provider;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
    providers: Vec<Box<dyn ToolProvider>>,
    skills: Option<Arc<SkillLibrary>>,
    inject_matched_skills: bool,
    retriever: Option<Arc<dyn Retriever>>,
    top_k: usize,
    retrieval_enabled: bool,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        Self {
            agent_builder: AgentBuilder::with_model_provider(provider),
            providers: vec![],
            skills: None,
            inject_matched_skills: false,
            retriever: None,
            top_k: DEFAULT_TOP_K,
            retrieval_enabled: false,
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Sets how many model calls one message may take.
    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.agent_builder =
            self.agent_builder.with_max_iterations(max_iterations);
        self
    }

    /// Adds a tool provider. It is connected when the session is built.
    #[inline]
    pub fn with_provider(mut self, provider: Box<dyn ToolProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Adds the built-in `workspace` tools.
    #[inline]
    pub fn with_builtin_tools(self) -> Self {
        self.with_provider(Box::new(workspace_provider()))
    }

    /// Offers the skills to the model through the `read_skill` tool.
    #[inline]
    pub fn with_skills(mut self, skills: SkillLibrary) -> Self {
        self.skills = Some(Arc::new(skills));
        self
    }

    /// Sets whether the guidance of skills matching a message is added to
    /// the message.
    #[inline]
    pub fn inject_matched_skills(mut self, inject: bool) -> Self {
        self.inject_matched_skills = inject;
        self
    }

    /// Prepends reference material from `retriever` to each message.
    #[inline]
    pub fn with_retriever(
        mut self,
        retriever: Arc<dyn Retriever>,
        top_k: usize,
        enabled: bool,
    ) -> Self {
        self.retriever = Some(retriever);
        self.top_k = top_k;
        self.retrieval_enabled = enabled;
        self
    }

    /// Attaches a callback to be invoked when a transcript is generated.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_transcript(on_transcript);
        self
    }

    /// Applies the settings of a configuration file.
    ///
    /// Skills are loaded and the retrieval index is built or loaded here.
    /// `embedder` is only used when retrieval is configured and enabled.
    pub async fn with_config(
        mut self,
        config: &Config,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> anyhow::Result<Self> {
        if let Some(prompt) = &config.system_prompt {
            self = self.with_system_prompt(prompt.clone());
        }
        self = self.with_max_iterations(config.max_iterations);
        if config.builtin_tools {
            self = self.with_builtin_tools();
        }
        for server in &config.mcp_servers {
            self = self.with_provider(provider_from_config(server));
        }

        if let Some(dir) = config.skills_directory() {
            let skills = SkillLibrary::load(dir).await;
            self = self
                .with_skills(skills)
                .inject_matched_skills(config.inject_matched_skills);
        }

        match &config.rag {
            Some(rag) if rag.enabled => {
                let Some(embedder) = embedder else {
                    anyhow::bail!("retrieval is enabled without an embedder");
                };
                let retriever =
                    Arc::new(RagRetriever::from_config(rag, embedder).await?);
                self = self.with_retriever(retriever, rag.top_k, true);
            }
            Some(_) => debug!("retrieval is disabled"),
            None => {}
        }
        Ok(self)
    }

    /// Connects the tool providers and builds a new session.
    ///
    /// Providers that fail to connect are left out, see
    /// [`Session::unavailable_providers`].
    pub async fn build(self) -> Session {
        let SessionBuilder {
            agent_builder,
            providers,
            skills,
            inject_matched_skills,
            retriever,
            top_k,
            retrieval_enabled,
        } = self;

        let skills = skills.map(|skills| skills as Arc<dyn SkillSource>);
        let registry = Registry::connect(providers, skills.clone()).await;

        let mut augmenter = Augmenter::new().with_top_k(top_k);
        if let Some(skills) = skills.filter(|_| inject_matched_skills) {
            augmenter = augmenter.with_matched_skills(skills);
        }
        if let Some(retriever) = retriever {
            augmenter = augmenter.with_retriever(retriever);
            augmenter.set_retrieval_enabled(retrieval_enabled);
        }

        let agent = agent_builder
            .with_registry(registry)
            .with_augmenter(augmenter)
            .build();
        Session { agent }
    }
}

/// A chat session, like a window that displays messages and has a input
/// box.
///
/// The session holds a fully configured agent, and it is basically a
/// wrapper around [`Agent`].
pub struct Session {
    agent: Agent,
}

impl Session {
    /// Sends a message and returns the final answer once the agent is
    /// done with it.
    #[inline]
    pub async fn send_message(
        &mut self,
        message: &str,
    ) -> Result<String, Error> {
        self.agent.send_message(message).await
    }

    /// Returns every turn of the conversation, oldest first.
    #[inline]
    pub fn transcript(&self) -> &[ModelMessage] {
        self.agent.transcript()
    }

    /// Starts over with only the system prompt, keeping the tools.
    #[inline]
    pub fn reset_transcript(&mut self) {
        self.agent.reset_transcript();
    }

    /// Disconnects all tool providers.
    #[inline]
    pub async fn end_session(&mut self) {
        self.agent.end_session().await;
    }

    /// Returns the names of the connected tool providers.
    pub fn connected_providers(&self) -> Vec<String> {
        self.agent
            .registry()
            .provider_names()
            .map(ToOwned::to_owned)
            .collect()
    }

    /// Returns the names of the providers that could not be connected.
    #[inline]
    pub fn unavailable_providers(&self) -> &[String] {
        self.agent.registry().unavailable_providers()
    }

    /// Returns the tools offered to the model.
    #[inline]
    pub fn tool_definitions(&self) -> &[ModelTool] {
        self.agent.tool_definitions()
    }

    /// Turns retrieval on or off. It stays off without a retriever.
    #[inline]
    pub fn set_retrieval_enabled(&mut self, enabled: bool) {
        self.agent.set_retrieval_enabled(enabled);
    }
}
