use crate::protocol::canonical::ChatMessage;

/// Ordered chat history seeded with one system message.
///
/// Append-only apart from [`Conversation::reset`] and
/// [`Conversation::truncate`].
#[derive(Debug, Clone)]
pub struct Conversation {
    system: ChatMessage,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    #[must_use]
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let system = ChatMessage::system(system_prompt);
        Self {
            messages: vec![system.clone()],
            system,
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Never true: the system message is always present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
    }

    /// Position to roll back to if the next turn does not complete.
    #[must_use]
    pub fn mark(&self) -> usize {
        self.messages.len()
    }

    /// Drop everything appended after `mark`. The system message survives.
    pub fn truncate(&mut self, mark: usize) {
        self.messages.truncate(mark.max(1));
    }

    /// Restore exactly the initial system message.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.messages.push(self.system.clone());
    }

    /// Number of user/assistant messages after the system prompt.
    #[must_use]
    pub fn turn_messages(&self) -> usize {
        self.messages.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::ChatRole;

    #[test]
    fn test_reset_restores_only_system_message() {
        let mut conversation = Conversation::new("Be concise.");
        conversation.push(ChatMessage::user("hi"));
        conversation.push(ChatMessage::assistant("hello"));
        conversation.push(ChatMessage::user("again"));
        conversation.push(ChatMessage::assistant("yes"));
        conversation.reset();
        assert_eq!(conversation.messages(), &[ChatMessage::system("Be concise.")]);
        assert_eq!(conversation.turn_messages(), 0);
    }

    #[test]
    fn test_truncate_rolls_back_partial_turn() {
        let mut conversation = Conversation::new("sys");
        conversation.push(ChatMessage::user("first"));
        conversation.push(ChatMessage::assistant("reply"));
        let mark = conversation.mark();
        conversation.push(ChatMessage::user("interrupted"));
        conversation.truncate(mark);
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation.messages()[2].role, ChatRole::Assistant);
    }

    #[test]
    fn test_truncate_never_drops_system_message() {
        let mut conversation = Conversation::new("sys");
        conversation.push(ChatMessage::user("x"));
        conversation.truncate(0);
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].role, ChatRole::System);
    }
}
