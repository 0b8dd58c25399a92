//! Bounded per-conversation history
//!
//! Messages are pruned as the conversation grows, but system messages are
//! never dropped and tool results survive eviction of the messages that
//! produced them.

use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use mini_moka::sync::Cache;
use serde::Serialize;
use toolgate_config::ConversationStoreConfig;

use crate::types::{Message, Role};

/// Hard cap on retained messages
pub const MAX_MESSAGES: usize = 50;

/// Message count that triggers a retention pass
pub const CLEANUP_THRESHOLD: usize = 40;

/// Non-system messages kept by a normal retention pass
const RETAINED_RECENT: usize = 30;

/// Non-system messages kept when the hard cap is still exceeded
const EMERGENCY_RECENT: usize = 10;

/// Tool results kept, oldest evicted first
pub const MAX_TOOL_RESULTS: usize = 200;

/// History of one logical conversation
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    tool_results: IndexMap<String, String>,
    appended: u64,
}

/// Counters describing a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub messages: usize,
    pub system_messages: usize,
    pub tool_results: usize,
    pub appended: u64,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, pruning when the retention threshold is reached
    ///
    /// Tool messages also record their content in the result map.
    pub fn push(&mut self, message: Message) {
        if message.role == Role::Tool
            && let Some(id) = &message.tool_call_id
        {
            self.record_result(id.clone(), message.content.as_text());
        }

        self.messages.push(message);
        self.appended += 1;

        if self.messages.len() >= CLEANUP_THRESHOLD {
            self.cleanup();
        }
    }

    /// Replace the message list, keeping recorded tool results
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages.clear();
        for message in messages {
            self.push(message);
        }
    }

    /// Record the output of a tool call
    pub fn record_result(&mut self, tool_call_id: String, result: String) {
        self.tool_results.shift_remove(&tool_call_id);
        self.tool_results.insert(tool_call_id, result);

        while self.tool_results.len() > MAX_TOOL_RESULTS {
            self.tool_results.shift_remove_index(0);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn tool_result(&self, tool_call_id: &str) -> Option<&str> {
        self.tool_results.get(tool_call_id).map(String::as_str)
    }

    /// Recorded tool results, oldest first
    pub fn tool_results(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tool_results.iter().map(|(id, result)| (id.as_str(), result.as_str()))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Text of the most recent user message
    pub fn latest_user_message(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_text())
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            messages: self.messages.len(),
            system_messages: self.messages.iter().filter(|m| m.role == Role::System).count(),
            tool_results: self.tool_results.len(),
            appended: self.appended,
        }
    }

    fn cleanup(&mut self) {
        let before = self.messages.len();

        self.retain_recent(RETAINED_RECENT);
        if self.messages.len() > MAX_MESSAGES {
            self.retain_recent(EMERGENCY_RECENT);
        }

        tracing::trace!(before, after = self.messages.len(), "pruned conversation");
    }

    /// Keep every system message plus the last `recent` others
    ///
    /// System messages that would not fit under the cap are merged into one.
    fn retain_recent(&mut self, recent: usize) {
        let others = self.messages.iter().filter(|m| m.role != Role::System).count();
        let mut skip = others.saturating_sub(recent);
        let kept_others = others - skip;

        let messages = std::mem::take(&mut self.messages);
        let system_count = messages.iter().filter(|m| m.role == Role::System).count();
        let coalesce = system_count > MAX_MESSAGES - kept_others;

        let mut system_text = Vec::new();
        for message in messages {
            match message.role {
                Role::System if coalesce => system_text.push(message.content.as_text()),
                Role::System => self.messages.push(message),
                _ if skip > 0 => skip -= 1,
                _ => self.messages.push(message),
            }
        }

        if coalesce {
            self.messages.insert(0, Message::text(Role::System, system_text.join("\n\n")));
        }
    }
}

/// Shared conversation state, locked per conversation
pub type SharedConversation = Arc<Mutex<ConversationState>>;

/// In-memory conversations keyed by `x-conversation-id`
///
/// Idle conversations are evicted after the configured timeout.
pub struct ConversationStore {
    cache: Cache<String, SharedConversation>,
    // Serializes first-time creation so concurrent requests share one state
    creating: Mutex<()>,
}

impl ConversationStore {
    pub fn new(config: &ConversationStoreConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_conversations)
            .time_to_idle(config.idle_timeout())
            .build();

        Self {
            cache,
            creating: Mutex::new(()),
        }
    }

    /// Stored conversation, if any
    pub fn get(&self, id: &str) -> Option<SharedConversation> {
        self.cache.get(&id.to_owned())
    }

    /// Existing conversation or a fresh one
    pub fn get_or_create(&self, id: &str) -> SharedConversation {
        let key = id.to_owned();

        if let Some(state) = self.cache.get(&key) {
            return state;
        }

        let _creating = self.creating.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = self.cache.get(&key) {
            return state;
        }

        tracing::debug!(conversation_id = %id, "created conversation");
        let state = Arc::new(Mutex::new(ConversationState::new()));
        self.cache.insert(key, Arc::clone(&state));
        state
    }

    /// Drop a conversation, returning whether it existed
    pub fn remove(&self, id: &str) -> bool {
        let key = id.to_owned();
        let existed = self.cache.contains_key(&key);
        self.cache.invalidate(&key);
        existed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_after_many_appends() {
        let mut state = ConversationState::new();
        state.push(Message::text(Role::System, "You are helpful."));

        for i in 0..1000 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            state.push(Message::text(role, format!("message {i}")));
            assert!(state.len() <= MAX_MESSAGES);
        }

        assert_eq!(state.messages()[0].role, Role::System);
        assert_eq!(state.messages()[0].content.as_text(), "You are helpful.");
        assert_eq!(state.messages().last().unwrap().content.as_text(), "message 999");
        assert_eq!(state.summary().appended, 1001);
    }

    #[test]
    fn retention_keeps_recent_messages_in_order() {
        let mut state = ConversationState::new();
        for i in 0..CLEANUP_THRESHOLD {
            state.push(Message::text(Role::User, format!("m{i}")));
        }

        assert_eq!(state.len(), RETAINED_RECENT);
        assert_eq!(state.messages()[0].content.as_text(), "m10");
        assert_eq!(state.messages()[RETAINED_RECENT - 1].content.as_text(), "m39");
    }

    #[test]
    fn system_messages_coalesce_when_they_exceed_the_cap() {
        let mut state = ConversationState::new();
        for i in 0..60 {
            state.push(Message::text(Role::System, format!("rule {i}")));
            state.push(Message::text(Role::User, format!("question {i}")));
            assert!(state.len() <= MAX_MESSAGES);
        }

        let system: Vec<_> = state.messages().iter().filter(|m| m.role == Role::System).collect();
        let text: String = system.iter().map(|m| m.content.as_text()).collect::<Vec<_>>().join("\n\n");

        for i in 0..60 {
            assert!(text.contains(&format!("rule {i}")), "lost rule {i}");
        }
    }

    #[test]
    fn tool_results_outlive_messages() {
        let mut state = ConversationState::new();
        state.push(Message::tool_result("call_1", "42"));

        for i in 0..100 {
            state.push(Message::text(Role::User, format!("m{i}")));
        }

        assert!(state.messages().iter().all(|m| m.role != Role::Tool));
        assert_eq!(state.tool_result("call_1"), Some("42"));
    }

    #[test]
    fn tool_results_bounded_oldest_first() {
        let mut state = ConversationState::new();
        for i in 0..=MAX_TOOL_RESULTS {
            state.record_result(format!("call_{i}"), i.to_string());
        }

        assert_eq!(state.summary().tool_results, MAX_TOOL_RESULTS);
        assert_eq!(state.tool_result("call_0"), None);
        assert_eq!(state.tool_result(&format!("call_{MAX_TOOL_RESULTS}")), Some("200"));
    }

    #[test]
    fn store_get_or_create_and_remove() {
        let store = ConversationStore::new(&ConversationStoreConfig::default());

        let first = store.get_or_create("thread");
        first.lock().unwrap().push(Message::text(Role::User, "hi"));

        let again = store.get_or_create("thread");
        assert_eq!(again.lock().unwrap().len(), 1);

        assert!(store.remove("thread"));
        assert!(store.get("thread").is_none());
        assert!(!store.remove("thread"));
    }

    #[test]
    fn concurrent_first_requests_share_one_conversation() {
        let store = ConversationStore::new(&ConversationStoreConfig::default());
        let barrier = std::sync::Barrier::new(8);

        let states: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        store.get_or_create("race")
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(states.iter().all(|state| Arc::ptr_eq(state, &states[0])));
    }
}
