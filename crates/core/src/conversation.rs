//! Conversation-related types.

use turnstile_model::{ModelMessage, ModelRequest, ModelTool};

/// The ordered log of turns that forms the model context.
///
/// Turns are only ever appended. The only other mutation is
/// [`Conversation::reset`], which returns the log to its seed.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    items: Vec<ModelMessage>,
    seeded: bool,
}

impl Conversation {
    /// Creates an empty conversation.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a conversation seeded with a system turn.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(prompt: S) -> Self {
        Self {
            items: vec![ModelMessage::system(prompt)],
            seeded: true,
        }
    }

    /// Appends a turn.
    #[inline]
    pub fn push(&mut self, msg: ModelMessage) {
        self.items.push(msg);
    }

    /// Returns all turns, oldest first.
    #[inline]
    pub fn items(&self) -> &[ModelMessage] {
        &self.items
    }

    /// Returns the number of turns.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if there are no turns at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes every turn except the system seed.
    pub fn reset(&mut self) {
        let keep = usize::from(self.seeded);
        self.items.truncate(keep);
    }

    /// Builds a model request out of the whole conversation.
    #[inline]
    pub fn to_request(&self, tools: &[ModelTool]) -> ModelRequest {
        ModelRequest {
            messages: self.items.clone(),
            tools: tools.to_vec(),
        }
    }
}
