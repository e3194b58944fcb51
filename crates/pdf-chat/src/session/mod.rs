//! Conversation sessions
//!
//! A `ChatSession` owns one conversation's history. Readers take a snapshot;
//! the only mutation is appending whole human/ai pairs under a single write
//! lock so concurrent turns can never interleave halves.
//!
//! The `SessionStore` only holds sessions that completed at least one turn.
//! A turn on an unknown id runs against a detached session which is stored
//! by `keep` once the turn succeeds.

use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::types::ChatMessage;

/// Session used when a request names none
pub const DEFAULT_SESSION: &str = "default";

/// Longest accepted session id, in characters
pub const MAX_SESSION_ID_CHARS: usize = 128;

/// History of a single conversation
#[derive(Debug, Default)]
pub struct ChatSession {
    messages: RwLock<Vec<ChatMessage>>,
}

impl ChatSession {
    /// Create an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the history at call time
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.read().clone()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Append a completed exchange; both messages land or neither does
    pub fn append_exchange(&self, human: ChatMessage, ai: ChatMessage) {
        let mut messages = self.messages.write();
        messages.reserve(2);
        messages.push(human);
        messages.push(ai);
    }

    /// Append every exchange recorded in `other`
    fn absorb(&self, other: &ChatSession) {
        let incoming = other.snapshot();
        self.messages.write().extend(incoming);
    }
}

/// Sessions keyed by id
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<ChatSession>>,
}

impl SessionStore {
    /// Create a store
    pub fn new() -> Self {
        Self::default()
    }

    /// Id a request resolves to; blank or absent ids mean the default session
    pub fn resolve(id: Option<&str>) -> &str {
        match id.map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => DEFAULT_SESSION,
        }
    }

    /// Existing session for `id`, if any
    pub fn get(&self, id: Option<&str>) -> Option<Arc<ChatSession>> {
        self.sessions.get(Self::resolve(id)).map(|s| Arc::clone(s.value()))
    }

    /// Existing session for `id`, or a detached empty one that is not stored
    pub fn lookup(&self, id: Option<&str>) -> Arc<ChatSession> {
        self.get(id).unwrap_or_default()
    }

    /// Store a session after a successful turn
    ///
    /// If another session was stored under `id` in the meantime, the turns
    /// recorded in `session` are appended to it.
    pub fn keep(&self, id: Option<&str>, session: Arc<ChatSession>) {
        match self.sessions.entry(Self::resolve(id).to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(session);
            }
            Entry::Occupied(entry) => {
                if !Arc::ptr_eq(entry.get(), &session) {
                    entry.get().absorb(&session);
                }
            }
        }
    }

    /// Drop the session for `id`; returns whether one existed
    pub fn remove(&self, id: Option<&str>) -> bool {
        self.sessions.remove(Self::resolve(id)).is_some()
    }

    /// Number of sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
