use chatstream_core::{ChatMessage, Role};

/// System prompt used when the config does not set one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant that helps answer questions. \
You are knowledgeable and helpful, but you should:\n\n\
- Never create false information\n\
- If a prompt is too long, break it down into smaller parts\n\
- Always be clear and concise in your responses\n\
- Use markdown formatting when appropriate\n\
- Refer to previous messages for context and use them to accurately answer questions\n\n\
Remember to be helpful, accurate, and engaging in your responses.";

/// Manages the history window sent to the model.
///
/// `max_messages` counts the system prompt when one is set, so the history
/// keeps one entry fewer. At least the newest message always survives, and
/// the window never starts on an assistant message. The system prompt itself
/// is never trimmed.
pub struct ContextWindow {
    messages: Vec<ChatMessage>,
    system_prompt: Option<String>,
    max_messages: usize,
}

impl ContextWindow {
    /// Empty window holding at most `max_messages` entries, system prompt included.
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            system_prompt: None,
            max_messages,
        }
    }

    /// Set the system prompt and re-apply the window.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
        self.truncate();
    }

    /// The system prompt, if set.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Append one message and trim.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.truncate();
    }

    /// Append messages in order and trim once.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
        self.truncate();
    }

    /// History currently inside the window, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// History entries that fit next to the system prompt.
    fn history_budget(&self) -> usize {
        let reserved = usize::from(self.system_prompt.is_some());
        self.max_messages.saturating_sub(reserved).max(1)
    }

    fn truncate(&mut self) {
        let budget = self.history_budget();
        if self.messages.len() > budget {
            let excess = self.messages.len() - budget;
            self.messages.drain(..excess);
        }
        let leading = self
            .messages
            .iter()
            .take_while(|m| m.role != Role::User)
            .count();
        self.messages.drain(..leading);
    }
}
