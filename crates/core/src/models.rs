use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sale,
    Lease,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sale => "sale",
            Category::Lease => "lease",
        }
    }

    /// Korean label used when rendering retrieval context.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Sale => "분양",
            Category::Lease => "임대",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sale" => Ok(Category::Sale),
            "lease" => Ok(Category::Lease),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Announcement {
    pub id: String,
    pub category: Category,
    pub title: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub id: i64,
    pub announcement_id: String,
    pub file_name: String,
}

/// A segment of source text prepared for embedding. `length` counts the
/// characters of `text`, never of `enriched_text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub enriched_text: String,
    pub section: Option<String>,
    pub has_table: bool,
    pub length: usize,
}

impl Chunk {
    pub fn new(text: String, section: Option<String>, has_table: bool) -> Self {
        let enriched_text = match &section {
            Some(label) => format!("[{label}]\n{text}"),
            None => text.clone(),
        };
        let length = text.chars().count();
        Self {
            text,
            enriched_text,
            section,
            has_table,
            length,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChunkMetadata {
    pub file_name: String,
    pub section: Option<String>,
    pub has_table: bool,
    pub chunk_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewChunkRecord {
    pub announcement_id: String,
    pub file_id: i64,
    pub chunk_text: String,
    pub chunk_index: u32,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A stored chunk returned from a similarity or hybrid query. `similarity`
/// is the raw vector similarity; `score` is what the ranking used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk_id: i64,
    pub announcement_id: String,
    pub file_id: i64,
    pub chunk_index: u32,
    pub chunk_text: String,
    pub metadata: ChunkMetadata,
    pub title: String,
    pub region: Option<String>,
    pub category: Category,
    pub similarity: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct QueryFilters {
    pub region: Option<String>,
    pub category: Option<Category>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.region.is_none() && self.category.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SearchMode {
    Vector,
    FilteredVector,
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Vector => "vector",
            SearchMode::FilteredVector => "filtered-vector",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub mode: SearchMode,
    pub filters: QueryFilters,
    pub hits: Vec<ScoredChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryProgress {
    pub category: Category,
    pub total: u64,
    pub vectorized: u64,
    pub percentage: f64,
}

impl CategoryProgress {
    pub fn new(category: Category, total: u64, vectorized: u64) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            vectorized as f64 * 100.0 / total as f64
        };
        Self {
            category,
            total,
            vectorized,
            percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enriched_text_carries_section_but_length_does_not() {
        let chunk = Chunk::new("본문 내용".to_string(), Some("신청자격".to_string()), false);
        assert_eq!(chunk.enriched_text, "[신청자격]\n본문 내용");
        assert_eq!(chunk.length, 5);
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("Lease".parse::<Category>(), Ok(Category::Lease));
        assert!("rent".parse::<Category>().is_err());
    }

    #[test]
    fn progress_percentage_handles_empty_category() {
        assert_eq!(CategoryProgress::new(Category::Sale, 0, 0).percentage, 0.0);
        assert_eq!(CategoryProgress::new(Category::Sale, 4, 1).percentage, 25.0);
    }
}
