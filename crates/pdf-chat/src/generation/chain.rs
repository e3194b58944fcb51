//! History-aware retrieval chain
//!
//! A turn moves through `RECEIVED -> QUERY_REWRITTEN -> RETRIEVED -> ANSWERED
//! -> HISTORY_UPDATED`. Any failure before the last stage leaves the session
//! untouched and is reported as an orchestration error naming the last stage
//! that completed.

use std::sync::Arc;

use crate::config::{PromptConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::generation::prompt::{PromptTemplate, ANSWER_SLOTS, REWRITE_SLOTS};
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::retrieval::{SearchHit, VectorIndex};
use crate::session::ChatSession;
use crate::types::{ChatMessage, TurnStage};

/// Retrieval knobs for the chain
#[derive(Debug, Clone, Copy)]
pub struct ChainSettings {
    /// Chunks retrieved per question
    pub top_k: usize,
    /// Recent turns (human + ai pairs) shown to the rewrite prompt
    pub rewrite_history_turns: usize,
}

impl From<&RetrievalConfig> for ChainSettings {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            rewrite_history_turns: config.rewrite_history_turns,
        }
    }
}

/// Result of a completed turn
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// The model's answer
    pub answer: String,
    /// Query used for retrieval (the raw input when there was no history)
    pub standalone_query: String,
    /// Chunks given to the model as context, nearest first
    pub sources: Vec<SearchHit>,
}

/// Rewrites, retrieves and answers one message at a time
pub struct ConversationChain {
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    index: Arc<VectorIndex>,
    answer_prompt: PromptTemplate,
    rewrite_prompt: PromptTemplate,
    settings: ChainSettings,
}

impl ConversationChain {
    /// Create a chain; prompt templates are validated here
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        index: Arc<VectorIndex>,
        prompts: &PromptConfig,
        settings: ChainSettings,
    ) -> Result<Self> {
        prompts.answer.validate(&ANSWER_SLOTS)?;
        prompts.rewrite.validate(&REWRITE_SLOTS)?;
        if settings.top_k == 0 {
            return Err(Error::Config("top_k must be at least 1".to_string()));
        }

        Ok(Self {
            embedder,
            llm,
            index,
            answer_prompt: prompts.answer.clone(),
            rewrite_prompt: prompts.rewrite.clone(),
            settings,
        })
    }

    /// The index this chain retrieves from
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Run one turn against `session`
    pub async fn respond(&self, session: &ChatSession, input: &str) -> Result<ChatTurn> {
        let mut stage = TurnStage::Received;
        let history = session.snapshot();
        tracing::debug!("{}: {} history messages", stage, history.len());

        let standalone_query = self
            .rewrite_query(&history, input)
            .await
            .map_err(|e| Error::orchestration(stage, e))?;
        stage = TurnStage::QueryRewritten;
        tracing::debug!("{}: \"{}\"", stage, standalone_query);

        let sources = self
            .retrieve(&standalone_query)
            .await
            .map_err(|e| Error::orchestration(stage, e))?;
        stage = TurnStage::Retrieved;
        tracing::debug!("{}: {} chunks", stage, sources.len());

        let answer = self
            .answer(&history, input, &sources)
            .await
            .map_err(|e| Error::orchestration(stage, e))?;
        stage = TurnStage::Answered;
        tracing::debug!("{}: {} chars", stage, answer.len());

        session.append_exchange(ChatMessage::human(input), ChatMessage::ai(answer.clone()));
        stage = TurnStage::HistoryUpdated;
        tracing::debug!("{}: session now holds {} messages", stage, session.len());

        Ok(ChatTurn {
            answer,
            standalone_query,
            sources,
        })
    }

    /// Recent history shown to the rewrite prompt
    fn rewrite_window<'a>(&self, history: &'a [ChatMessage]) -> &'a [ChatMessage] {
        let keep = self.settings.rewrite_history_turns.saturating_mul(2);
        &history[history.len().saturating_sub(keep)..]
    }

    /// Turn a follow-up into a standalone search query
    ///
    /// With no history the input already stands alone and the model is not called.
    pub async fn rewrite_query(&self, history: &[ChatMessage], input: &str) -> Result<String> {
        if history.is_empty() {
            return Ok(input.to_string());
        }

        let messages = self
            .rewrite_prompt
            .render(&[("input", input)], self.rewrite_window(history))?;
        let rewritten = self.llm.complete(&messages).await?;
        let rewritten = rewritten.trim();

        if rewritten.is_empty() {
            tracing::warn!("Query rewrite returned nothing, searching with the raw input");
            return Ok(input.to_string());
        }

        Ok(rewritten.to_string())
    }

    /// Embed the query and fetch the nearest chunks
    ///
    /// An empty index means no relevant context, not a failed turn.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>> {
        let embedding = self.embedder.embed(query).await?;
        match self.index.query(&embedding, self.settings.top_k) {
            Err(Error::EmptyIndex) => {
                tracing::warn!("Vector index is empty, answering without context");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Ask the model for an answer grounded in `sources`
    pub async fn answer(
        &self,
        history: &[ChatMessage],
        input: &str,
        sources: &[SearchHit],
    ) -> Result<String> {
        let context = sources
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages = self
            .answer_prompt
            .render(&[("context", &context), ("input", input)], history)?;

        tracing::info!(
            "Generating answer with {} ({} context chunks)",
            self.llm.model(),
            sources.len()
        );

        self.llm.complete(&messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::prompt::{PromptMessage, PromptRole};
    use crate::retrieval::IndexEntry;
    use crate::types::{ChatRole, Chunk};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Embeds text as counts of the tokens A1, A2, A3
    #[derive(Default)]
    struct KeywordEmbedder {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.lock().extend(texts.iter().cloned());
            if self.fail {
                return Err(Error::embedding("connection refused"));
            }
            Ok(texts
                .iter()
                .map(|t| ["A1", "A2", "A3"].iter().map(|k| t.matches(k).count() as f32).collect())
                .collect())
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(!self.fail)
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    /// Replays scripted replies and records every prompt
    #[derive(Default)]
    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<Vec<PromptMessage>>>,
    }

    impl ScriptedLlm {
        fn with_replies(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
            self.prompts.lock().push(messages.to_vec());
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(Error::llm("no scripted reply")))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }
    }

    fn chunk(text: &str, index: u32) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_offset: index as usize * 3,
            page_number: 1,
            index,
        }
    }

    fn a_index() -> Arc<VectorIndex> {
        Arc::new(
            VectorIndex::build(vec![
                IndexEntry::new(vec![1.0, 1.0, 0.0], chunk("A1 A2", 0)),
                IndexEntry::new(vec![0.0, 1.0, 1.0], chunk("A2 A3", 1)),
            ])
            .unwrap(),
        )
    }

    fn chain(
        embedder: Arc<KeywordEmbedder>,
        llm: Arc<ScriptedLlm>,
        index: Arc<VectorIndex>,
        settings: ChainSettings,
    ) -> ConversationChain {
        ConversationChain::new(embedder, llm, index, &PromptConfig::default(), settings).unwrap()
    }

    fn settings(top_k: usize) -> ChainSettings {
        ChainSettings {
            top_k,
            rewrite_history_turns: 2,
        }
    }

    #[tokio::test]
    async fn test_first_turn_skips_rewrite() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let llm = Arc::new(ScriptedLlm::with_replies(vec![Ok("A3 follows A2.".into())]));
        let chain = chain(embedder.clone(), llm.clone(), a_index(), settings(1));
        let session = ChatSession::new();

        let turn = chain.respond(&session, "What is A3?").await.unwrap();

        assert_eq!(turn.standalone_query, "What is A3?");
        assert_eq!(turn.answer, "A3 follows A2.");
        assert_eq!(turn.sources.len(), 1);
        assert_eq!(turn.sources[0].chunk.text, "A2 A3");
        assert_eq!(embedder.calls.lock().as_slice(), ["What is A3?".to_string()]);

        let prompts = llm.prompts.lock();
        assert_eq!(prompts.len(), 1, "only the answer call is made");
        assert_eq!(
            prompts[0][0].content,
            "Answer the user's question based on the following context: A2 A3."
        );

        let history = session.snapshot();
        assert_eq!(history, vec![ChatMessage::human("What is A3?"), ChatMessage::ai("A3 follows A2.")]);
    }

    #[tokio::test]
    async fn test_follow_up_is_rewritten_with_history() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let llm = Arc::new(ScriptedLlm::with_replies(vec![
            Ok("  A3 definition  ".into()),
            Ok("It is the last item.".into()),
        ]));
        let chain = chain(embedder.clone(), llm.clone(), a_index(), settings(2));
        let session = ChatSession::new();
        session.append_exchange(ChatMessage::human("What is A3?"), ChatMessage::ai("A3 follows A2."));

        let turn = chain.respond(&session, "Where is it?").await.unwrap();

        assert_eq!(turn.standalone_query, "A3 definition");
        assert_eq!(embedder.calls.lock().as_slice(), ["A3 definition".to_string()]);
        assert_eq!(turn.sources[0].chunk.text, "A2 A3");

        let prompts = llm.prompts.lock();
        let rewrite = &prompts[0];
        assert_eq!(rewrite[0].content, "What is A3?");
        assert_eq!(rewrite[1].role, PromptRole::Assistant);
        assert_eq!(rewrite[2].content, "Where is it?");
        assert!(rewrite[3].content.starts_with("Given the above conversation"));

        let answer = &prompts[1];
        assert!(answer[0].content.contains("A2 A3\n\nA1 A2"));
        assert_eq!(answer.last().unwrap().content, "Where is it?");

        assert_eq!(session.len(), 4);
    }

    #[tokio::test]
    async fn test_rewrite_window_is_bounded() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let llm = Arc::new(ScriptedLlm::with_replies(vec![Ok("A1".into()), Ok("ok".into())]));
        let chain = chain(
            embedder,
            llm.clone(),
            a_index(),
            ChainSettings {
                top_k: 1,
                rewrite_history_turns: 1,
            },
        );
        let session = ChatSession::new();
        for i in 0..3 {
            session.append_exchange(ChatMessage::human(format!("q{}", i)), ChatMessage::ai(format!("a{}", i)));
        }

        chain.respond(&session, "next").await.unwrap();

        let prompts = llm.prompts.lock();
        // last turn only, then the input and the instruction
        assert_eq!(prompts[0].len(), 4);
        assert_eq!(prompts[0][0].content, "q2");
        // the answer sees the whole history: system + 6 history + input
        assert_eq!(prompts[1].len(), 8);
    }

    #[tokio::test]
    async fn test_answer_failure_leaves_history_unchanged() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let llm = Arc::new(ScriptedLlm::with_replies(vec![Err(Error::Timeout("chat".into()))]));
        let chain = chain(embedder, llm, a_index(), settings(2));
        let session = ChatSession::new();

        let err = chain.respond(&session, "What is A3?").await.unwrap_err();

        assert!(matches!(
            err,
            Error::Orchestration { stage: TurnStage::Retrieved, ref source } if matches!(**source, Error::Timeout(_))
        ));
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_history_unchanged() {
        let embedder = Arc::new(KeywordEmbedder {
            fail: true,
            ..Default::default()
        });
        let llm = Arc::new(ScriptedLlm::with_replies(vec![Ok("unused".into())]));
        let chain = chain(embedder, llm.clone(), a_index(), settings(2));
        let session = ChatSession::new();
        session.append_exchange(ChatMessage::human("q"), ChatMessage::ai("a"));
        llm.replies.lock().push_front(Ok("rewritten".into()));

        let err = chain.respond(&session, "follow up").await.unwrap_err();

        assert!(matches!(err, Error::Orchestration { stage: TurnStage::QueryRewritten, .. }));
        assert_eq!(session.len(), 2);
        assert_eq!(llm.prompts.lock().len(), 1, "answer is never requested");
    }

    #[tokio::test]
    async fn test_empty_index_answers_without_context() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let llm = Arc::new(ScriptedLlm::with_replies(vec![Ok("I don't know.".into())]));
        let index = Arc::new(VectorIndex::build(Vec::new()).unwrap());
        let chain = chain(embedder.clone(), llm.clone(), index, settings(2));
        let session = ChatSession::new();

        let turn = chain.respond(&session, "anything?").await.unwrap();

        assert!(turn.sources.is_empty());
        assert_eq!(embedder.calls.lock().len(), 1);
        assert_eq!(
            llm.prompts.lock()[0][0].content,
            "Answer the user's question based on the following context: ."
        );
        assert_eq!(session.snapshot()[1].role, ChatRole::Ai);
    }

    #[tokio::test]
    async fn test_blank_rewrite_falls_back_to_input() {
        let embedder = Arc::new(KeywordEmbedder::default());
        let llm = Arc::new(ScriptedLlm::with_replies(vec![Ok("   ".into()), Ok("fine".into())]));
        let chain = chain(embedder.clone(), llm, a_index(), settings(1));
        let session = ChatSession::new();
        session.append_exchange(ChatMessage::human("q"), ChatMessage::ai("a"));

        let turn = chain.respond(&session, "A1?").await.unwrap();
        assert_eq!(turn.standalone_query, "A1?");
    }

    #[test]
    fn test_invalid_prompts_rejected() {
        let mut prompts = PromptConfig::default();
        prompts.answer.messages.retain(|m| !m.content.contains("{context}"));

        let result = ConversationChain::new(
            Arc::new(KeywordEmbedder::default()),
            Arc::new(ScriptedLlm::default()),
            a_index(),
            &prompts,
            settings(2),
        );
        assert!(matches!(result, Err(Error::Prompt(_))));
    }
}
