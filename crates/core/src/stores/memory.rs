use crate::embeddings::cosine_similarity;
use crate::traits::{ChunkIndex, WorkQueue};
use crate::{
    Announcement, Category, CategoryProgress, FileRecord, NewChunkRecord, QueryFilters,
    ScoredChunk, SearchError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: i64,
    pub record: NewChunkRecord,
}

#[derive(Debug, Default)]
struct MemoryState {
    announcements: Vec<Announcement>,
    files: Vec<FileRecord>,
    chunks: Vec<StoredChunk>,
    vectorized_files: HashMap<i64, usize>,
    vectorized_announcements: HashMap<String, usize>,
    next_file_id: i64,
}

/// In-process document store with the same ranking contract as the
/// PostgreSQL store. Vectorization marks are counted, not just flagged.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, SearchError> {
        self.state
            .lock()
            .map_err(|_| SearchError::BackendResponse {
                backend: "memory".to_string(),
                details: "store lock poisoned".to_string(),
            })
    }

    pub fn add_announcement(&self, announcement: Announcement) -> Result<(), SearchError> {
        self.lock()?.announcements.push(announcement);
        Ok(())
    }

    pub fn add_file(
        &self,
        announcement_id: &str,
        file_name: &str,
    ) -> Result<FileRecord, SearchError> {
        let mut state = self.lock()?;
        state.next_file_id += 1;
        let record = FileRecord {
            id: state.next_file_id,
            announcement_id: announcement_id.to_string(),
            file_name: file_name.to_string(),
        };
        state.files.push(record.clone());
        Ok(record)
    }

    pub fn chunks(&self) -> Result<Vec<StoredChunk>, SearchError> {
        Ok(self.lock()?.chunks.clone())
    }

    pub fn file_mark_count(&self, file_id: i64) -> Result<usize, SearchError> {
        Ok(self
            .lock()?
            .vectorized_files
            .get(&file_id)
            .copied()
            .unwrap_or(0))
    }

    pub fn announcement_mark_count(&self, announcement_id: &str) -> Result<usize, SearchError> {
        Ok(self
            .lock()?
            .vectorized_announcements
            .get(announcement_id)
            .copied()
            .unwrap_or(0))
    }
}

impl MemoryState {
    fn announcement(&self, id: &str) -> Option<&Announcement> {
        self.announcements.iter().find(|item| item.id == id)
    }

    fn scored(&self, stored: &StoredChunk, similarity: f64, score: f64) -> Option<ScoredChunk> {
        let announcement = self.announcement(&stored.record.announcement_id)?;
        Some(ScoredChunk {
            chunk_id: stored.id,
            announcement_id: announcement.id.clone(),
            file_id: stored.record.file_id,
            chunk_index: stored.record.chunk_index,
            chunk_text: stored.record.chunk_text.clone(),
            metadata: stored.record.metadata.clone(),
            title: announcement.title.clone(),
            region: announcement.region.clone(),
            category: announcement.category,
            similarity,
            score,
        })
    }

    fn matches(&self, stored: &StoredChunk, filters: &QueryFilters) -> bool {
        let Some(announcement) = self.announcement(&stored.record.announcement_id) else {
            return false;
        };
        let region_ok = filters.region.as_ref().map_or(true, |region| {
            announcement
                .region
                .as_ref()
                .is_some_and(|value| value.contains(region.as_str()))
        });
        let category_ok = filters
            .category
            .map_or(true, |category| announcement.category == category);
        region_ok && category_ok
    }
}

/// Fraction of keywords that occur in `text`, case-insensitively.
pub fn keyword_score(text: &str, keywords: &str) -> f64 {
    let terms: Vec<String> = keywords
        .split_whitespace()
        .map(|term| term.to_lowercase())
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    let lowered = text.to_lowercase();
    let hits = terms.iter().filter(|term| lowered.contains(term.as_str())).count();
    hits as f64 / terms.len() as f64
}

fn rank(mut hits: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    hits.sort_by(|left, right| {
        right
            .score
            .total_cmp(&left.score)
            .then_with(|| left.chunk_id.cmp(&right.chunk_id))
    });
    hits.truncate(top_k);
    hits
}

#[async_trait]
impl ChunkIndex for MemoryStore {
    async fn insert_chunk(&self, record: NewChunkRecord) -> Result<(), SearchError> {
        let mut state = self.lock()?;
        let id = state.chunks.len() as i64 + 1;
        state.chunks.push(StoredChunk { id, record });
        Ok(())
    }

    async fn search_chunks(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        let state = self.lock()?;
        let hits = state
            .chunks
            .iter()
            .filter(|stored| state.matches(stored, filters))
            .filter_map(|stored| {
                let similarity = cosine_similarity(query_embedding, &stored.record.embedding);
                state.scored(stored, similarity, similarity)
            })
            .collect();
        Ok(rank(hits, top_k))
    }

    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        keywords: &str,
        top_k: usize,
        vector_weight: f64,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        let state = self.lock()?;
        let hits = state
            .chunks
            .iter()
            .filter_map(|stored| {
                let similarity = cosine_similarity(query_embedding, &stored.record.embedding);
                let lexical = keyword_score(&stored.record.chunk_text, keywords);
                let score = vector_weight * similarity + (1.0 - vector_weight) * lexical;
                state.scored(stored, similarity, score)
            })
            .collect();
        Ok(rank(hits, top_k))
    }
}

#[async_trait]
impl WorkQueue for MemoryStore {
    async fn get_unvectorized_announcements(
        &self,
        limit: usize,
    ) -> Result<Vec<Announcement>, SearchError> {
        let state = self.lock()?;
        Ok(state
            .announcements
            .iter()
            .filter(|item| !state.vectorized_announcements.contains_key(&item.id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_announcement_files(
        &self,
        announcement_id: &str,
    ) -> Result<Vec<FileRecord>, SearchError> {
        Ok(self
            .lock()?
            .files
            .iter()
            .filter(|file| file.announcement_id == announcement_id)
            .cloned()
            .collect())
    }

    async fn mark_file_vectorized(&self, file_id: i64) -> Result<(), SearchError> {
        *self.lock()?.vectorized_files.entry(file_id).or_insert(0) += 1;
        Ok(())
    }

    async fn mark_announcement_vectorized(
        &self,
        announcement_id: &str,
    ) -> Result<(), SearchError> {
        *self
            .lock()?
            .vectorized_announcements
            .entry(announcement_id.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn get_vectorization_progress(&self) -> Result<Vec<CategoryProgress>, SearchError> {
        let state = self.lock()?;
        let progress = [Category::Sale, Category::Lease]
            .into_iter()
            .filter_map(|category| {
                let in_category: Vec<_> = state
                    .announcements
                    .iter()
                    .filter(|item| item.category == category)
                    .collect();
                if in_category.is_empty() {
                    return None;
                }
                let vectorized = in_category
                    .iter()
                    .filter(|item| state.vectorized_announcements.contains_key(&item.id))
                    .count();
                Some(CategoryProgress::new(
                    category,
                    in_category.len() as u64,
                    vectorized as u64,
                ))
            })
            .collect();
        Ok(progress)
    }
}
