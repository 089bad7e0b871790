use crate::{
    Announcement, CategoryProgress, FileRecord, NewChunkRecord, QueryFilters, ScoredChunk,
    SearchError,
};
use async_trait::async_trait;

/// Chunk persistence and retrieval.
#[async_trait]
pub trait ChunkIndex: Send + Sync {
    async fn insert_chunk(&self, record: NewChunkRecord) -> Result<(), SearchError>;

    /// Ranked by vector similarity, restricted by `filters`.
    async fn search_chunks(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<ScoredChunk>, SearchError>;

    /// Ranked by `vector_weight * similarity + (1 - vector_weight) * keyword_score`.
    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        keywords: &str,
        top_k: usize,
        vector_weight: f64,
    ) -> Result<Vec<ScoredChunk>, SearchError>;
}

/// Vectorization state of announcements and their files.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn get_unvectorized_announcements(
        &self,
        limit: usize,
    ) -> Result<Vec<Announcement>, SearchError>;

    async fn get_announcement_files(
        &self,
        announcement_id: &str,
    ) -> Result<Vec<FileRecord>, SearchError>;

    async fn mark_file_vectorized(&self, file_id: i64) -> Result<(), SearchError>;

    async fn mark_announcement_vectorized(&self, announcement_id: &str)
        -> Result<(), SearchError>;

    async fn get_vectorization_progress(&self) -> Result<Vec<CategoryProgress>, SearchError>;
}

pub trait DocumentStore: ChunkIndex + WorkQueue {}

impl<T> DocumentStore for T where T: ChunkIndex + WorkQueue + ?Sized {}
