//! Rewriting of user input with retrieved reference material.

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;

use crate::tool::SkillSource;

/// A boxed error returned by collaborators outside of this crate.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The default number of retrieved chunks.
pub const DEFAULT_TOP_K: usize = 3;

/// A source of reference material for user questions.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns the reference text relevant to `query`, built from at most
    /// `top_k` pieces. An empty string means nothing relevant was found.
    async fn retrieve_context(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<String, BoxError>;
}

/// Rewrites the raw user text before the first model call of a turn.
///
/// Skill guidance matched from the input, if enabled, is applied first.
/// Retrieved material then either wraps the raw text in the reference
/// template, or is appended when the text was already rewritten.
#[derive(Clone)]
pub struct Augmenter {
    retriever: Option<Arc<dyn Retriever>>,
    retrieval_enabled: bool,
    top_k: usize,
    skills: Option<Arc<dyn SkillSource>>,
}

impl Default for Augmenter {
    fn default() -> Self {
        Self {
            retriever: None,
            retrieval_enabled: false,
            top_k: DEFAULT_TOP_K,
            skills: None,
        }
    }
}

impl Augmenter {
    /// Creates an augmenter that leaves every input untouched.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables retrieval with the given retriever.
    #[inline]
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self.retrieval_enabled = true;
        self
    }

    /// Sets how many pieces of material are requested.
    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Injects guidance of the skills matching the input.
    #[inline]
    pub fn with_matched_skills(
        mut self,
        skills: Arc<dyn SkillSource>,
    ) -> Self {
        self.skills = Some(skills);
        self
    }

    /// Turns retrieval on or off. Without a retriever it stays off.
    #[inline]
    pub fn set_retrieval_enabled(&mut self, enabled: bool) {
        self.retrieval_enabled = enabled && self.retriever.is_some();
    }

    /// Returns whether retrieval is in effect.
    #[inline]
    pub fn retrieval_enabled(&self) -> bool {
        self.retrieval_enabled
    }

    /// Returns the text to send in place of `raw`.
    pub async fn augment(&self, raw: &str) -> String {
        let mut text = raw.to_owned();

        if let Some(guidance) = self
            .skills
            .as_ref()
            .and_then(|skills| skills.matched_context(raw))
            .filter(|guidance| !guidance.is_empty())
        {
            debug!("injecting matched skill guidance");
            text = format!("{guidance}\n\n{raw}");
        }

        let context = self.retrieve(raw).await;
        if context.is_empty() {
            return text;
        }
        if text != raw {
            format!("{text}\n\nReference material:\n\n{context}")
        } else {
            format!(
                "Reference material:\n\n{context}\n\n---\n\nUser question: {raw}"
            )
        }
    }

    async fn retrieve(&self, query: &str) -> String {
        let Some(retriever) = self.retriever.as_ref() else {
            return String::new();
        };
        if !self.retrieval_enabled {
            return String::new();
        }
        match retriever.retrieve_context(query, self.top_k).await {
            Ok(context) => context,
            Err(err) => {
                warn!("failed to retrieve reference material: {err}");
                String::new()
            }
        }
    }
}
