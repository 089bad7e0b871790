use crate::error::IngestError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub min_chunk_chars: usize,
    pub optimal_chunk_chars: usize,
    pub max_chunk_chars: usize,
    pub max_table_chars: usize,
    pub chunk_overlap_chars: usize,
    pub table_delimiter: char,
    /// Pattern a token must match to count towards `min_word_count`.
    pub word_pattern: String,
    pub min_word_count: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chunk_chars: 100,
            optimal_chunk_chars: 600,
            max_chunk_chars: 1_200,
            max_table_chars: 3_000,
            chunk_overlap_chars: 150,
            table_delimiter: '|',
            word_pattern: "[가-힣a-zA-Z]{2,}".to_string(),
            min_word_count: 5,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.min_chunk_chars > self.optimal_chunk_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "min_chunk_chars {} exceeds optimal_chunk_chars {}",
                self.min_chunk_chars, self.optimal_chunk_chars
            )));
        }
        if self.optimal_chunk_chars == 0 || self.optimal_chunk_chars >= self.max_chunk_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "optimal_chunk_chars {} must be positive and below max_chunk_chars {}",
                self.optimal_chunk_chars, self.max_chunk_chars
            )));
        }
        if self.chunk_overlap_chars >= self.optimal_chunk_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap_chars {} must be below optimal_chunk_chars {}",
                self.chunk_overlap_chars, self.optimal_chunk_chars
            )));
        }
        if self.max_table_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_table_chars must be positive".to_string(),
            ));
        }
        Regex::new(&self.word_pattern)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: usize,
    /// Base URL of an OpenAI-compatible embeddings API. `None` selects the
    /// offline n-gram embedder.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub normalize: bool,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "BAAI/bge-m3".to_string(),
            dimensions: 1_024,
            endpoint: None,
            api_key: None,
            normalize: true,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_top_k: usize,
    pub similarity_threshold: f64,
    pub hybrid_vector_weight: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            similarity_threshold: 0.6,
            hybrid_vector_weight: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizerConfig {
    pub embedding_batch_size: usize,
    pub announcement_batch_size: usize,
    pub max_workers: usize,
    pub pdf_base_path: PathBuf,
    pub sale_folder: String,
    pub lease_folder: String,
    pub excluded_markers: Vec<String>,
    pub required_markers: Vec<String>,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            embedding_batch_size: 10,
            announcement_batch_size: 10,
            max_workers: 4,
            pdf_base_path: PathBuf::from("."),
            sale_folder: "LH_sale_서울.경기".to_string(),
            lease_folder: "LH_lease_서울.경기".to_string(),
            excluded_markers: vec!["팸플릿".to_string(), "팜플렛".to_string()],
            required_markers: vec!["공고문".to_string(), "공고".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub vectorizer: VectorizerConfig,
}

impl RagConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, IngestError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        self.chunking.validate()?;

        if self.embedding.dimensions == 0 {
            return Err(IngestError::InvalidArgument(
                "embedding dimensions must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.search.hybrid_vector_weight) {
            return Err(IngestError::InvalidArgument(format!(
                "hybrid_vector_weight {} is outside [0, 1]",
                self.search.hybrid_vector_weight
            )));
        }
        if !(-1.0..=1.0).contains(&self.search.similarity_threshold) {
            return Err(IngestError::InvalidArgument(format!(
                "similarity_threshold {} is outside [-1, 1]",
                self.search.similarity_threshold
            )));
        }
        if self.vectorizer.max_workers == 0
            || self.vectorizer.embedding_batch_size == 0
            || self.vectorizer.announcement_batch_size == 0
        {
            return Err(IngestError::InvalidArgument(
                "worker count and batch sizes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RagConfig::default().validate().expect("defaults should validate");
    }

    #[test]
    fn overlap_above_optimal_is_rejected() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap_chars = 700;
        assert!(matches!(
            config.validate(),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }

    #[test]
    fn broken_word_pattern_is_rejected() {
        let config = ChunkingConfig {
            word_pattern: "[a-z".to_string(),
            ..ChunkingConfig::default()
        };
        assert!(matches!(config.validate(), Err(IngestError::RegexError(_))));
    }

    #[test]
    fn partial_json_keeps_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("rag.json");
        std::fs::write(
            &path,
            r#"{"search": {"default_top_k": 3}, "vectorizer": {"max_workers": 2}}"#,
        )?;

        let config = RagConfig::from_json_file(&path)?;
        assert_eq!(config.search.default_top_k, 3);
        assert_eq!(config.search.similarity_threshold, 0.6);
        assert_eq!(config.vectorizer.max_workers, 2);
        assert_eq!(config.chunking.max_table_chars, 3_000);
        Ok(())
    }
}
