//! Question answering: retrieve, prompt, complete, split.

pub mod llm;
pub mod prompt;

pub use llm::{LanguageModel, LlmConfig, LlmError, OpenAiCompatibleModel};
pub use prompt::{
    ANSWER_MARKER, CONTEXT_MARKER, DEFAULT_SYSTEM_PROMPT, NOT_FOUND_ANSWER, ParsedResponse,
    Prompt, QUESTION_MARKER, SYSTEM_MARKER, build_prompt, parse_response,
};

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::documents::DocumentIndex;
use crate::retrieve::{
    RetrievalConfig, RetrievalEngine, RetrievalMode, RetrievalResult, check_query_dimension,
};
use crate::semantic::{EmbeddingGenerator, SemanticSearchError};

#[derive(Error, Debug)]
pub enum AskError {
    #[error("Failed to embed question: {0}")]
    Embedding(#[from] SemanticSearchError),

    #[error("Language model failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Embedding task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Result of one `ask`.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub cited_context: String,
    /// What retrieval produced, for display and citations.
    pub retrieval: RetrievalResult,
    /// False when the fallback answer was given without calling the model.
    pub model_called: bool,
}

/// Ties retrieval to a language model.
pub struct QuestionAnswerer {
    generator: Arc<dyn EmbeddingGenerator>,
    model: Arc<dyn LanguageModel>,
    retrieval: RetrievalConfig,
    system_prompt: String,
}

impl QuestionAnswerer {
    pub fn new(
        generator: Arc<dyn EmbeddingGenerator>,
        model: Arc<dyn LanguageModel>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            generator,
            model,
            retrieval,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replace the system instruction. Blank input keeps the default.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        if !system_prompt.trim().is_empty() {
            self.system_prompt = system_prompt;
        }
        self
    }

    /// Answer `question` from `index`.
    ///
    /// Nothing retrieved yields `NOT_FOUND_ANSWER` without a model call. A
    /// model failure is an error for this query only. The question is
    /// embedded on the blocking pool so async workers stay free.
    pub async fn ask(
        &self,
        question: &str,
        index: &DocumentIndex,
        use_coarse_stage: bool,
    ) -> Result<Answer, AskError> {
        let mode = RetrievalMode::from_coarse_flag(use_coarse_stage);
        let retrieval = if index.is_empty() {
            RetrievalResult::empty(mode)
        } else {
            let generator = Arc::clone(&self.generator);
            let text = question.to_string();
            let query = tokio::task::spawn_blocking(move || generator.embed(&text)).await??;
            check_query_dimension(&query, index)?;
            RetrievalEngine::new(self.generator.as_ref(), self.retrieval.clone())
                .retrieve_with_vector(&query, index, mode)
        };

        if retrieval.is_empty() {
            tracing::info!(target: "answer", "no context retrieved, returning fallback answer");
            return Ok(Answer {
                answer: NOT_FOUND_ANSWER.to_string(),
                cited_context: String::new(),
                retrieval,
                model_called: false,
            });
        }

        let prompt = build_prompt(&self.system_prompt, &retrieval.context(), question);
        tracing::debug!(
            target: "answer",
            "sending {} passages to {}",
            retrieval.passages.len(),
            self.model.name()
        );

        let raw = self.model.complete(&prompt.text).await?;
        let parsed = parse_response(&raw, &prompt.context);

        let answer = if parsed.answer.is_empty() {
            NOT_FOUND_ANSWER.to_string()
        } else {
            parsed.answer
        };

        Ok(Answer {
            answer,
            cited_context: parsed.cited_context,
            retrieval,
            model_called: true,
        })
    }
}
