use crate::{ScoredChunk, SearchMode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

const SEPARATOR_WIDTH: usize = 80;
const PREVIEW_CHARS: usize = 200;
const MISSING: &str = "N/A";

/// Renders hits as numbered document blocks, ready to hand to a generator
/// as grounding context. Empty input renders as an empty string.
pub fn build_context(hits: &[ScoredChunk]) -> String {
    if hits.is_empty() {
        return String::new();
    }

    let separator = "=".repeat(SEPARATOR_WIDTH);
    let mut context = String::new();
    for (index, hit) in hits.iter().enumerate() {
        context.push_str(&separator);
        context.push('\n');
        context.push_str(&format!(
            "[문서 {}]\n제목: {}\n지역: {}\n카테고리: {}\n출처: {}\n유사도: {}\n\n{}\n",
            index + 1,
            hit.title,
            hit.region.as_deref().unwrap_or(MISSING),
            hit.category.label(),
            non_empty(&hit.metadata.file_name),
            percent(hit.similarity),
            hit.chunk_text
        ));
    }
    context
}

/// Listing for terminal output with a short preview of each chunk.
pub fn format_hits(hits: &[ScoredChunk]) -> String {
    if hits.is_empty() {
        return "검색 결과 없음".to_string();
    }

    hits.iter()
        .enumerate()
        .map(|(index, hit)| {
            let preview: String = hit.chunk_text.chars().take(PREVIEW_CHARS).collect();
            format!(
                "[{}] {}\n    지역: {} | 카테고리: {} | 유사도: {}\n    파일: {}\n    섹션: {}\n    미리보기: {}...\n",
                index + 1,
                hit.title,
                hit.region.as_deref().unwrap_or(MISSING),
                hit.category,
                percent(hit.similarity),
                non_empty(&hit.metadata.file_name),
                hit.metadata.section.as_deref().unwrap_or(MISSING),
                preview
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSummary {
    pub documents: usize,
    pub announcements: usize,
    pub average_similarity: f64,
    pub top_similarity: f64,
    pub search_type: SearchMode,
}

impl RetrievalSummary {
    /// `top_similarity` is taken from the first hit, i.e. the best ranked one.
    pub fn from_hits(hits: &[ScoredChunk], mode: SearchMode) -> Self {
        let announcements = hits
            .iter()
            .map(|hit| hit.announcement_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        let average_similarity = if hits.is_empty() {
            0.0
        } else {
            hits.iter().map(|hit| hit.similarity).sum::<f64>() / hits.len() as f64
        };

        Self {
            documents: hits.len(),
            announcements,
            average_similarity,
            top_similarity: hits.first().map_or(0.0, |hit| hit.similarity),
            search_type: mode,
        }
    }
}

impl fmt::Display for RetrievalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "문서 수: {}", self.documents)?;
        writeln!(f, "공고 수: {}", self.announcements)?;
        writeln!(f, "평균 유사도: {}", percent(self.average_similarity))?;
        writeln!(f, "최고 유사도: {}", percent(self.top_similarity))?;
        write!(f, "검색 방식: {}", self.search_type.as_str())
    }
}

fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn non_empty(value: &str) -> &str {
    if value.is_empty() {
        MISSING
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Category, ChunkMetadata};

    fn hit(announcement_id: &str, similarity: f64, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk_id: 1,
            announcement_id: announcement_id.to_string(),
            file_id: 1,
            chunk_index: 0,
            chunk_text: text.to_string(),
            metadata: ChunkMetadata {
                file_name: "수원 행복주택 공고문.pdf".to_string(),
                section: Some("신청자격".to_string()),
                has_table: false,
                chunk_length: text.chars().count(),
            },
            title: "수원 행복주택 입주자 모집".to_string(),
            region: Some("경기도 수원시".to_string()),
            category: Category::Lease,
            similarity,
            score: similarity,
        }
    }

    #[test]
    fn summary_counts_distinct_announcements() {
        let hits = vec![
            hit("A1", 0.9, "본문"),
            hit("A1", 0.7, "본문"),
            hit("A2", 0.5, "본문"),
        ];

        let summary = RetrievalSummary::from_hits(&hits, SearchMode::Hybrid);
        assert_eq!(summary.documents, 3);
        assert_eq!(summary.announcements, 2);
        assert!((summary.average_similarity - 0.7).abs() < 1e-9);
        assert_eq!(summary.top_similarity, 0.9);
        assert!(summary.to_string().ends_with("검색 방식: hybrid"));
    }

    #[test]
    fn empty_hits_summarise_to_zero() {
        let summary = RetrievalSummary::from_hits(&[], SearchMode::Vector);
        assert_eq!(summary.documents, 0);
        assert_eq!(summary.average_similarity, 0.0);
        assert_eq!(build_context(&[]), "");
        assert_eq!(format_hits(&[]), "검색 결과 없음");
    }

    #[test]
    fn context_numbers_documents_and_labels_category() {
        let context = build_context(&[hit("A1", 0.8312, "임대보증금은 21,000천원입니다.")]);

        assert!(context.starts_with(&"=".repeat(80)));
        assert!(context.contains("[문서 1]\n제목: 수원 행복주택 입주자 모집\n"));
        assert!(context.contains("카테고리: 임대\n"));
        assert!(context.contains("출처: 수원 행복주택 공고문.pdf\n"));
        assert!(context.contains("유사도: 83.12%\n\n임대보증금은 21,000천원입니다.\n"));
    }

    #[test]
    fn listing_preview_is_capped() {
        let long_text = "가".repeat(500);
        let listing = format_hits(&[hit("A1", 0.75, &long_text)]);

        assert!(listing.starts_with("[1] 수원 행복주택 입주자 모집\n"));
        assert!(listing.contains("카테고리: lease | 유사도: 75.00%"));
        assert!(listing.contains(&format!("미리보기: {}...", "가".repeat(200))));
        assert!(!listing.contains(&"가".repeat(201)));
    }
}
