pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod models;
pub mod pool;
pub mod resolver;
pub mod retrieval;
pub mod search;
pub mod splitter;
pub mod stores;
pub mod traits;
pub mod vectorizer;

pub use chunking::Chunker;
pub use config::{ChunkingConfig, EmbeddingConfig, RagConfig, SearchConfig, VectorizerConfig};
pub use embeddings::{
    embed_in_batches, CharacterNgramEmbedder, Embedder, HttpEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{EmbedError, IngestError, SearchError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use models::{
    Announcement, Category, CategoryProgress, Chunk, ChunkMetadata, FileRecord, NewChunkRecord,
    QueryFilters, ScoredChunk, SearchMode, SearchResult,
};
pub use pool::WorkerPool;
pub use resolver::{discover_pdf_files, SourceResolver};
pub use retrieval::{build_context, format_hits, RetrievalSummary};
pub use search::{extract_filters, extract_keywords, SearchEngine, SearchPlan};
pub use splitter::RecursiveSplitter;
pub use stores::{MemoryStore, PgVectorStore};
pub use traits::{ChunkIndex, DocumentStore, WorkQueue};
pub use vectorizer::{
    AnnouncementOutcome, AnnouncementStatus, FileOutcome, FileStatus, VectorizeReport, Vectorizer,
};
