#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub role: Role,
    pub text: String,
    /// PNG bytes. Only ever set on the transient state entry of the current request.
    pub image: Option<Vec<u8>>,
}

impl ConversationEntry {
    fn new(role: Role, text: impl Into<String>, image: Option<Vec<u8>>) -> Self {
        Self {
            role,
            text: text.into(),
            image,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text, None)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text, None)
    }

    pub fn user_with_image(text: impl Into<String>, png: Vec<u8>) -> Self {
        Self::new(Role::User, text, Some(png))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text, None)
    }

    /// Same entry with the image dropped.
    pub fn text_only(&self) -> Self {
        Self {
            image: None,
            ..self.clone()
        }
    }
}

/// Conversation state of one task run. Owned exclusively by the engine.
#[derive(Debug)]
pub struct AgentSession {
    pub session_id: String,
    history: Vec<ConversationEntry>,
    pub step: u32,
    pub max_steps: u32,
    pub terminated: bool,
}

impl AgentSession {
    pub fn new(system_prompt: impl Into<String>, max_steps: u32) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            history: vec![ConversationEntry::system(system_prompt)],
            step: 0,
            max_steps,
            terminated: false,
        }
    }

    pub fn history(&self) -> &[ConversationEntry] {
        &self.history
    }

    pub fn push(&mut self, entry: ConversationEntry) {
        debug_assert!(entry.image.is_none(), "retained history must stay text-only");
        self.history.push(entry.text_only());
    }

    /// Retained history plus the transient state entry, which keeps its image.
    pub fn request(&self, state: &ConversationEntry) -> Vec<ConversationEntry> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.extend(self.history.iter().cloned());
        messages.push(state.clone());
        messages
    }

    /// Records a completed exchange: the state entry without its image, then the reply.
    pub fn record_exchange(&mut self, state: &ConversationEntry, reply: impl Into<String>) {
        self.history.push(state.text_only());
        self.history.push(ConversationEntry::assistant(reply));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_single_system_entry() {
        let session = AgentSession::new("rules", 5);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].role, Role::System);
        assert_eq!(session.step, 0);
        assert!(!session.terminated);
        assert!(!session.session_id.is_empty());
    }

    #[test]
    fn request_carries_image_but_history_does_not() {
        let mut session = AgentSession::new("rules", 5);
        session.push(ConversationEntry::user("Task: open Chrome"));
        let state = ConversationEntry::user_with_image("state", vec![0x89, b'P']);

        let request = session.request(&state);
        assert_eq!(request.len(), 3);
        assert_eq!(request[2].image.as_deref(), Some(&[0x89, b'P'][..]));

        session.record_exchange(&state, "do(action=\"Back\")");
        let roles: Vec<Role> = session.history().iter().map(|e| e.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::User, Role::Assistant]);
        assert!(session.history().iter().all(|e| e.image.is_none()));
        assert_eq!(session.history()[3].text, "do(action=\"Back\")");
    }
}
