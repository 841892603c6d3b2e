//! Question answering against a stub language model.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use async_trait::async_trait;
use common::{LETTER_DIM, LetterEmbedder};
use parking_lot::Mutex;
use querydoc::answer::{
    ANSWER_MARKER, AskError, CONTEXT_MARKER, LanguageModel, LlmError, NOT_FOUND_ANSWER,
    QuestionAnswerer,
};
use querydoc::documents::{ChunkingConfig, DocumentIndex, Segmenter};
use querydoc::indexing::{BuildOptions, IndexBuilder};
use querydoc::retrieve::RetrievalConfig;
use querydoc::semantic::{EmbeddingGenerator, SemanticSearchError};

enum Reply {
    /// Repeat the prompt and append an answer.
    Echo(&'static str),
    /// Answer without repeating the prompt.
    AnswerOnly(&'static str),
    Fail,
}

struct StubModel {
    reply: Reply,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl StubModel {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(prompt.to_string());
        match self.reply {
            Reply::Echo(answer) => Ok(format!("{prompt}{answer}")),
            Reply::AnswerOnly(answer) => Ok(answer.to_string()),
            Reply::Fail => Err(LlmError::Status {
                status: 503,
                body: "overloaded".into(),
            }),
        }
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Records which thread each embedding ran on.
struct ThreadRecordingEmbedder {
    inner: LetterEmbedder,
    threads: Mutex<Vec<ThreadId>>,
}

impl EmbeddingGenerator for ThreadRecordingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticSearchError> {
        self.threads.lock().push(thread::current().id());
        self.inner.embed(text)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        "thread-recording"
    }
}

fn study_index() -> DocumentIndex {
    let builder = IndexBuilder::new(
        Segmenter::new(ChunkingConfig::with_max_chars(500)).unwrap(),
        Arc::new(LetterEmbedder::new()),
        BuildOptions {
            threads: 1,
            ..Default::default()
        },
    )
    .unwrap();
    builder
        .build(&common::intro_methods_document())
        .unwrap()
        .index
}

fn answerer(model: Arc<StubModel>) -> QuestionAnswerer {
    QuestionAnswerer::new(
        Arc::new(LetterEmbedder::new()),
        model,
        RetrievalConfig {
            k_sections: 1,
            k_chunks: 1,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_echoed_prompt_splits_into_answer_and_context() {
    let model = StubModel::new(Reply::Echo("Methods used 300 b's (Methods, page 2)."));
    let answer = answerer(model.clone())
        .ask("bbb?", &study_index(), true)
        .await
        .unwrap();

    assert!(answer.model_called);
    assert_eq!(model.calls(), 1);
    assert_eq!(answer.answer, "Methods used 300 b's (Methods, page 2).");
    assert_eq!(answer.cited_context, answer.retrieval.context());
    assert!(answer.cited_context.starts_with("[1] Methods (page 2)"));

    let prompt = model.last_prompt.lock().clone().unwrap();
    assert!(prompt.contains(CONTEXT_MARKER));
    assert!(prompt.trim_end().ends_with(ANSWER_MARKER));
}

#[tokio::test]
async fn test_answer_only_reply_cites_sent_context() {
    let model = StubModel::new(Reply::AnswerOnly("  Short answer.  "));
    let answer = answerer(model)
        .ask("bbb?", &study_index(), false)
        .await
        .unwrap();

    assert_eq!(answer.answer, "Short answer.");
    assert_eq!(answer.cited_context, answer.retrieval.context());
    assert!(answer.retrieval.sections.is_empty());
}

#[tokio::test]
async fn test_empty_retrieval_answers_without_model() {
    let model = StubModel::new(Reply::Fail);
    let answer = answerer(model.clone())
        .ask("anything", &DocumentIndex::empty(LETTER_DIM), true)
        .await
        .unwrap();

    assert_eq!(answer.answer, NOT_FOUND_ANSWER);
    assert!(answer.cited_context.is_empty());
    assert!(!answer.model_called);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_model_failure_is_reported() {
    let model = StubModel::new(Reply::Fail);
    let result = answerer(model).ask("bbb?", &study_index(), true).await;

    match result {
        Err(AskError::Llm(LlmError::Status { status, .. })) => assert_eq!(status, 503),
        other => panic!("expected model failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_custom_system_prompt_reaches_model() {
    let model = StubModel::new(Reply::AnswerOnly("ok"));
    answerer(model.clone())
        .with_system_prompt("Answer in one word.")
        .ask("bbb?", &study_index(), true)
        .await
        .unwrap();

    let prompt = model.last_prompt.lock().clone().unwrap();
    assert!(prompt.contains("Answer in one word."));
}

#[tokio::test(flavor = "current_thread")]
async fn test_question_is_embedded_off_the_async_thread() {
    let embedder = Arc::new(ThreadRecordingEmbedder {
        inner: LetterEmbedder::new(),
        threads: Mutex::new(Vec::new()),
    });
    let answerer = QuestionAnswerer::new(
        embedder.clone(),
        StubModel::new(Reply::AnswerOnly("ok")),
        RetrievalConfig::default(),
    );

    let answer = answerer.ask("bbb?", &study_index(), true).await.unwrap();
    assert!(answer.model_called);

    let threads = embedder.threads.lock().clone();
    assert_eq!(threads.len(), 1);
    assert_ne!(threads[0], thread::current().id());
}

#[tokio::test]
async fn test_dimension_mismatch_is_an_embedding_error() {
    let model = StubModel::new(Reply::AnswerOnly("ok"));
    let mut index = study_index();
    index.dimension += 1;

    let result = answerer(model.clone()).ask("bbb?", &index, true).await;
    assert!(matches!(
        result,
        Err(AskError::Embedding(SemanticSearchError::DimensionMismatch { .. }))
    ));
    assert_eq!(model.calls(), 0);
}
