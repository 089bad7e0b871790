use crate::config::SearchConfig;
use crate::embeddings::Embedder;
use crate::traits::ChunkIndex;
use crate::{Category, QueryFilters, ScoredChunk, SearchError, SearchMode, SearchResult};
use std::sync::Arc;
use tracing::debug;

const KNOWN_REGIONS: [&str; 17] = [
    "서울", "경기", "인천", "남양주", "수원", "화성", "용인", "고양", "성남", "부천", "안산",
    "안양", "평택", "시흥", "파주", "의정부", "김포",
];
const SALE_TERMS: [&str; 3] = ["분양", "공공분양", "신혼희망타운"];
const LEASE_TERMS: [&str; 4] = ["임대", "국민임대", "영구임대", "행복주택"];
const STOP_WORDS: [&str; 11] = ["은", "는", "이", "가", "을", "를", "의", "에", "에서", "과", "와"];

/// First known region and first category whose terms occur in the query.
/// Sale terms are checked before lease terms.
pub fn extract_filters(query: &str) -> QueryFilters {
    let region = KNOWN_REGIONS
        .iter()
        .find(|region| query.contains(*region))
        .map(|region| region.to_string());

    let category = if SALE_TERMS.iter().any(|term| query.contains(term)) {
        Some(Category::Sale)
    } else if LEASE_TERMS.iter().any(|term| query.contains(term)) {
        Some(Category::Lease)
    } else {
        None
    };

    QueryFilters { region, category }
}

pub fn extract_keywords(query: &str) -> String {
    query
        .split_whitespace()
        .filter(|word| !STOP_WORDS.contains(word) && word.chars().count() > 1)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Which query `smart_search` will run for a given input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPlan {
    FilteredVector(QueryFilters),
    Hybrid,
    Vector,
}

impl SearchPlan {
    pub fn mode(&self) -> SearchMode {
        match self {
            SearchPlan::FilteredVector(_) => SearchMode::FilteredVector,
            SearchPlan::Hybrid => SearchMode::Hybrid,
            SearchPlan::Vector => SearchMode::Vector,
        }
    }
}

pub struct SearchEngine<S: ?Sized, M: ?Sized> {
    store: Arc<S>,
    embedder: Arc<M>,
    config: SearchConfig,
    normalize: bool,
}

impl<S, M> SearchEngine<S, M>
where
    S: ChunkIndex + ?Sized,
    M: Embedder + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, embedder: Arc<M>, config: SearchConfig, normalize: bool) -> Self {
        Self {
            store,
            embedder,
            config,
            normalize,
        }
    }

    pub fn default_top_k(&self) -> usize {
        self.config.default_top_k
    }

    /// Filters win over hybrid ranking; hybrid wins over plain vector search.
    pub fn plan(&self, query: &str, use_hybrid: bool) -> SearchPlan {
        let filters = extract_filters(query);
        if !filters.is_empty() {
            SearchPlan::FilteredVector(filters)
        } else if use_hybrid {
            SearchPlan::Hybrid
        } else {
            SearchPlan::Vector
        }
    }

    /// Similarity search narrowed by `filters`; hits below the configured
    /// threshold are dropped before truncating to `top_k`.
    pub async fn vector_search(
        &self,
        query: &str,
        top_k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        validate_request(query, top_k)?;
        let embedding = self.embed_query(query).await?;

        let mut hits = self.store.search_chunks(&embedding, top_k, filters).await?;
        let threshold = self.config.similarity_threshold;
        hits.retain(|hit| hit.similarity >= threshold);
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Blended vector and keyword ranking. Nothing is thresholded here, so a
    /// keyword match can keep a weak vector match in the results.
    pub async fn hybrid_search(
        &self,
        query: &str,
        top_k: usize,
        vector_weight: f64,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        validate_request(query, top_k)?;
        if !(0.0..=1.0).contains(&vector_weight) {
            return Err(SearchError::Request(format!(
                "vector weight {vector_weight} is outside [0, 1]"
            )));
        }

        let embedding = self.embed_query(query).await?;
        let keywords = extract_keywords(query);
        self.store
            .hybrid_search(&embedding, &keywords, top_k, vector_weight)
            .await
    }

    pub async fn smart_search(
        &self,
        query: &str,
        top_k: usize,
        use_hybrid: bool,
    ) -> Result<SearchResult, SearchError> {
        let plan = self.plan(query, use_hybrid);
        let mode = plan.mode();
        debug!(query, mode = mode.as_str(), "smart search");

        let (filters, hits) = match plan {
            SearchPlan::FilteredVector(filters) => {
                let hits = self.vector_search(query, top_k, &filters).await?;
                (filters, hits)
            }
            SearchPlan::Hybrid => {
                let hits = self
                    .hybrid_search(query, top_k, self.config.hybrid_vector_weight)
                    .await?;
                (QueryFilters::default(), hits)
            }
            SearchPlan::Vector => {
                let filters = QueryFilters::default();
                let hits = self.vector_search(query, top_k, &filters).await?;
                (filters, hits)
            }
        };

        Ok(SearchResult {
            query: query.to_string(),
            mode,
            filters,
            hits,
        })
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, SearchError> {
        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let normalize = self.normalize;

        let embedding = tokio::task::spawn_blocking(move || embedder.embed(&text, normalize))
            .await
            .map_err(|error| SearchError::Request(format!("query embedding task failed: {error}")))??;
        Ok(embedding)
    }
}

fn validate_request(query: &str, top_k: usize) -> Result<(), SearchError> {
    if query.trim().is_empty() {
        return Err(SearchError::Request("query is empty".to_string()));
    }
    if top_k == 0 {
        return Err(SearchError::Request("top_k must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::{ChunkMetadata, NewChunkRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Vector { top_k: usize, filters: QueryFilters },
        Hybrid { keywords: String, top_k: usize, vector_weight: f64 },
    }

    #[derive(Default)]
    struct RecordingIndex {
        hits: Vec<ScoredChunk>,
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingIndex {
        fn with_similarities(similarities: &[f64]) -> Self {
            Self {
                hits: similarities
                    .iter()
                    .enumerate()
                    .map(|(index, similarity)| hit(index as i64 + 1, *similarity))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChunkIndex for RecordingIndex {
        async fn insert_chunk(&self, _record: NewChunkRecord) -> Result<(), SearchError> {
            Ok(())
        }

        async fn search_chunks(
            &self,
            _query_embedding: &[f32],
            top_k: usize,
            filters: &QueryFilters,
        ) -> Result<Vec<ScoredChunk>, SearchError> {
            self.calls.lock().unwrap().push(Call::Vector {
                top_k,
                filters: filters.clone(),
            });
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }

        async fn hybrid_search(
            &self,
            _query_embedding: &[f32],
            keywords: &str,
            top_k: usize,
            vector_weight: f64,
        ) -> Result<Vec<ScoredChunk>, SearchError> {
            self.calls.lock().unwrap().push(Call::Hybrid {
                keywords: keywords.to_string(),
                top_k,
                vector_weight,
            });
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }
    }

    fn hit(chunk_id: i64, similarity: f64) -> ScoredChunk {
        ScoredChunk {
            chunk_id,
            announcement_id: format!("A{chunk_id}"),
            file_id: chunk_id,
            chunk_index: 0,
            chunk_text: "임대보증금 및 월임대료 안내".to_string(),
            metadata: ChunkMetadata::default(),
            title: "행복주택 입주자 모집".to_string(),
            region: Some("경기도 수원시".to_string()),
            category: Category::Lease,
            similarity,
            score: similarity,
        }
    }

    fn engine(index: RecordingIndex) -> (Arc<RecordingIndex>, SearchEngine<RecordingIndex, CharacterNgramEmbedder>) {
        let index = Arc::new(index);
        let engine = SearchEngine::new(
            Arc::clone(&index),
            Arc::new(CharacterNgramEmbedder { dimensions: 8 }),
            SearchConfig::default(),
            true,
        );
        (index, engine)
    }

    #[test]
    fn filters_take_first_region_and_category() {
        let filters = extract_filters("수원시 행복주택은?");
        assert_eq!(filters.region.as_deref(), Some("수원"));
        assert_eq!(filters.category, Some(Category::Lease));

        let sale_first = extract_filters("서울 신혼희망타운 임대 전환");
        assert_eq!(sale_first.region.as_deref(), Some("서울"));
        assert_eq!(sale_first.category, Some(Category::Sale));

        assert!(extract_filters("청약 자격이 궁금합니다").is_empty());
    }

    #[test]
    fn keywords_drop_particles_and_single_characters() {
        assert_eq!(extract_keywords("청년 의 임대 조건 은 뭐 야"), "청년 임대 조건");
        assert_eq!(extract_keywords("에서 와 과"), "");
    }

    #[tokio::test]
    async fn region_in_query_overrides_hybrid() {
        let (index, engine) = engine(RecordingIndex::with_similarities(&[0.9]));

        let result = engine.smart_search("수원 청약 일정", 3, true).await.unwrap();
        assert_eq!(result.mode, SearchMode::FilteredVector);
        assert_eq!(
            index.calls(),
            vec![Call::Vector {
                top_k: 3,
                filters: QueryFilters {
                    region: Some("수원".to_string()),
                    category: None,
                },
            }]
        );
    }

    #[tokio::test]
    async fn unfiltered_query_runs_hybrid_with_configured_weight() {
        let (index, engine) = engine(RecordingIndex::with_similarities(&[0.3]));

        let result = engine.smart_search("청약 자격 조건", 5, true).await.unwrap();
        assert_eq!(result.mode, SearchMode::Hybrid);
        assert_eq!(result.hits.len(), 1);
        assert_eq!(
            index.calls(),
            vec![Call::Hybrid {
                keywords: "청약 자격 조건".to_string(),
                top_k: 5,
                vector_weight: 0.7,
            }]
        );
    }

    #[tokio::test]
    async fn plain_vector_search_when_hybrid_is_off() {
        let (index, engine) = engine(RecordingIndex::with_similarities(&[0.8]));

        let result = engine.smart_search("청약 자격 조건", 5, false).await.unwrap();
        assert_eq!(result.mode, SearchMode::Vector);
        assert!(matches!(index.calls()[0], Call::Vector { .. }));
        assert_eq!(engine.plan("청약 자격 조건", false), SearchPlan::Vector);
    }

    #[tokio::test]
    async fn vector_search_applies_threshold_then_top_k() {
        let (_, engine) = engine(RecordingIndex::with_similarities(&[0.95, 0.7, 0.59, 0.2]));

        let hits = engine
            .vector_search("청약 자격", 4, &QueryFilters::default())
            .await
            .unwrap();
        assert_eq!(
            hits.iter().map(|hit| hit.chunk_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_any_store_call() {
        let (index, engine) = engine(RecordingIndex::default());

        let result = engine.smart_search("   ", 5, true).await;
        assert!(matches!(result, Err(SearchError::Request(_))));
        assert!(index.calls().is_empty());
    }
}
