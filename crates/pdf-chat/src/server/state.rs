//! Application state for the chat server

use std::sync::Arc;

use crate::config::ChatConfig;
use crate::generation::ConversationChain;
use crate::session::SessionStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: ChatConfig,
    /// Rewrite/retrieve/answer chain over the startup index
    chain: ConversationChain,
    /// Conversation histories
    sessions: SessionStore,
}

impl AppState {
    /// Create state around a ready chain; the index must already be built
    pub fn new(config: ChatConfig, chain: ConversationChain) -> Self {
        tracing::info!(
            "Application state ready ({} indexed chunks)",
            chain.index().len()
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                chain,
                sessions: SessionStore::new(),
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &ChatConfig {
        &self.inner.config
    }

    /// Get the conversation chain
    pub fn chain(&self) -> &ConversationChain {
        &self.inner.chain
    }

    /// Get the session store
    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }
}
