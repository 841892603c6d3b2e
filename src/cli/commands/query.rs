//! Search and Ask commands.

use std::sync::Arc;

use super::{embedding_generator, open_library};
use crate::answer::{Answer, OpenAiCompatibleModel, QuestionAnswerer};
use crate::cli::{QueryArgs, QueryTarget, RetrievalArgs};
use crate::config::Settings;
use crate::documents::DocumentIndex;
use crate::library::{DocumentLibrary, LibraryError};
use crate::retrieve::{RetrievalConfig, RetrievalEngine, RetrievalMode, RetrievalResult};
use crate::semantic::EmbeddingGenerator;

/// Embedding model, target index and effective retrieval settings.
pub(crate) struct Prepared {
    pub generator: Arc<dyn EmbeddingGenerator>,
    pub index: DocumentIndex,
    pub retrieval: RetrievalConfig,
    pub use_coarse_stage: bool,
}

impl Prepared {
    /// Answerer over the configured language model.
    pub fn answerer(&self, settings: &Settings) -> anyhow::Result<QuestionAnswerer> {
        let model = OpenAiCompatibleModel::from_env(settings.llm.clone())?;
        Ok(QuestionAnswerer::new(
            Arc::clone(&self.generator),
            Arc::new(model),
            self.retrieval.clone(),
        )
        .with_system_prompt(settings.prompt.system_prompt.clone()))
    }
}

pub(crate) fn prepare(
    settings: &Settings,
    target: &QueryTarget,
    overrides: &RetrievalArgs,
) -> anyhow::Result<Prepared> {
    let mut retrieval = settings.retrieval.clone();
    if let Some(k) = overrides.k_sections {
        retrieval.k_sections = k;
    }
    if let Some(k) = overrides.k_chunks {
        retrieval.k_chunks = k;
    }
    retrieval.validate().map_err(anyhow::Error::msg)?;
    let use_coarse_stage = retrieval.use_coarse_stage && !overrides.no_coarse;

    let generator = embedding_generator(settings)?;
    let library = open_library(settings, Arc::clone(&generator))?;

    let index = match &target.doc {
        Some(name) if !target.all => {
            let document_id = DocumentLibrary::resolve_id(name);
            match library.load(&document_id) {
                Ok(stored) => stored.index,
                Err(LibraryError::NotIndexed(_)) => anyhow::bail!(
                    "No usable index for '{document_id}'. Run 'querydoc index <extracted.json>' first."
                ),
                Err(e) => return Err(e.into()),
            }
        }
        _ => library.load_all()?,
    };

    Ok(Prepared {
        generator,
        index,
        retrieval,
        use_coarse_stage,
    })
}

/// Run search command - ranked passages without the language model.
pub fn run_search(settings: &Settings, args: &QueryArgs) -> anyhow::Result<()> {
    let prepared = prepare(settings, &args.target, &args.retrieval)?;
    let engine = RetrievalEngine::new(prepared.generator.as_ref(), prepared.retrieval);
    let result = engine.retrieve(
        &args.question,
        &prepared.index,
        RetrievalMode::from_coarse_flag(prepared.use_coarse_stage),
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_passages(&result);
    }
    Ok(())
}

/// Run ask command - answer with citations.
pub async fn run_ask(settings: &Settings, args: &QueryArgs) -> anyhow::Result<()> {
    let prepared = prepare(settings, &args.target, &args.retrieval)?;
    let answerer = prepared.answerer(settings)?;

    let answer = answerer
        .ask(&args.question, &prepared.index, prepared.use_coarse_stage)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }
    Ok(())
}

fn print_passages(result: &RetrievalResult) {
    if result.is_empty() {
        eprintln!("No passages found.");
        return;
    }

    if !result.sections.is_empty() {
        let titles: Vec<String> = result
            .sections
            .iter()
            .map(|s| format!("{} ({:.3})", s.title, s.score))
            .collect();
        println!("Sections: {}", titles.join(", "));
    }

    for (i, passage) in result.passages.iter().enumerate() {
        println!("\n{}. {} (score: {:.3})", i + 1, passage.citation, passage.score);
        println!("   {}", passage.content);
    }
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer);
    if answer.retrieval.is_empty() {
        return;
    }
    println!("\nSources:");
    for (i, passage) in answer.retrieval.passages.iter().enumerate() {
        println!("  [{}] {}", i + 1, passage.citation);
    }
}
