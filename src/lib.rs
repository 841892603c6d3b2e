pub mod answer;
pub mod cli;
pub mod config;
pub mod documents;
pub mod indexing;
pub mod library;
pub mod logging;
pub mod retrieve;
pub mod semantic;
pub mod server;
pub mod storage;

pub use answer::{Answer, AskError, LanguageModel, QuestionAnswerer};
pub use config::Settings;
pub use documents::{DocumentChunk, DocumentIndex, ExtractedDocument, Section, Segmenter};
pub use indexing::{IndexBuilder, IndexingError};
pub use library::{DocumentLibrary, LibraryError};
pub use retrieve::{Citation, RetrievalConfig, RetrievalEngine, RetrievalMode, RetrievalResult};
pub use semantic::{EmbeddingGenerator, SemanticSearchError};
pub use storage::{FileIndexStore, IndexStore, MemoryIndexStore, StorageError};
