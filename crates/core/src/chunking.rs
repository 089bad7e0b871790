use crate::config::ChunkingConfig;
use crate::error::IngestError;
use crate::models::Chunk;
use crate::splitter::RecursiveSplitter;
use regex::Regex;

const SECTION_PATTERNS: [&str; 5] = [
    r"^\s*#+\s*(.+)",
    r"^\s*【(.+?)】",
    r"^\s*\*\*(.+?)\*\*",
    r"^\s*■\s*(.+)",
    r"^\s*[0-9]+\.\s*(.+)",
];

const SECTION_SCAN_LINES: usize = 3;
const MIN_SECTION_TITLE_CHARS: usize = 6;
const TABLE_HEADER_LINES: usize = 3;
const TABLE_RULE: &str = "---";

/// Splits extracted markdown-like text into chunks, keeping tables whole
/// where possible and dropping fragments without real content.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
    splitter: RecursiveSplitter,
    block_break: Regex,
    section_patterns: Vec<Regex>,
    border_only: Regex,
    word: Regex,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;

        let section_patterns = SECTION_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        let delimiter = regex::escape(&config.table_delimiter.to_string());
        let border_only = Regex::new(&format!(r"^[-\s{delimiter}\d.]+$"))?;
        let word = Regex::new(&config.word_pattern)?;

        Ok(Self {
            splitter: RecursiveSplitter::new(config.optimal_chunk_chars, config.chunk_overlap_chars),
            block_break: Regex::new(r"\n\n+")?,
            section_patterns,
            border_only,
            word,
            config,
        })
    }

    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let normalized = text.replace("\r\n", "\n");
        let mut chunks = Vec::new();
        let mut buffer = ProseBuffer::default();
        let mut current_section: Option<String> = None;

        for raw_block in self.block_break.split(&normalized) {
            let block = raw_block.trim();
            if block.is_empty() {
                continue;
            }

            if let Some(section) = self.section_name(block) {
                current_section = Some(section);
            }

            if self.is_table(block) {
                self.flush(&mut buffer, &mut chunks);
                if char_len(block) > self.config.max_table_chars {
                    for piece in self.split_table(block) {
                        self.emit(piece, current_section.clone(), true, &mut chunks);
                    }
                } else {
                    self.emit(block.to_string(), current_section.clone(), true, &mut chunks);
                }
                continue;
            }

            let block_len = char_len(block);
            if buffer.len + block_len > self.config.max_chunk_chars {
                self.flush(&mut buffer, &mut chunks);
                if block_len > self.config.max_chunk_chars {
                    for piece in self.splitter.split(block) {
                        self.emit(piece, current_section.clone(), false, &mut chunks);
                    }
                } else {
                    buffer.push(block, current_section.clone());
                }
            } else if !buffer.is_empty() && buffer.len + block_len > self.config.optimal_chunk_chars
            {
                self.flush(&mut buffer, &mut chunks);
                buffer.push(block, current_section.clone());
            } else {
                buffer.push(block, current_section.clone());
            }
        }

        self.flush(&mut buffer, &mut chunks);
        chunks
    }

    /// A block is a table when at least three of its lines carry the
    /// delimiter and those lines are the majority.
    pub fn is_table(&self, block: &str) -> bool {
        let lines: Vec<&str> = block.split('\n').collect();
        let delimited = lines
            .iter()
            .filter(|line| line.contains(self.config.table_delimiter))
            .count();
        delimited >= 3 && delimited * 2 > lines.len()
    }

    pub fn section_name(&self, block: &str) -> Option<String> {
        for line in block.split('\n').take(SECTION_SCAN_LINES) {
            for pattern in &self.section_patterns {
                let Some(title) = pattern.captures(line).and_then(|captures| captures.get(1))
                else {
                    continue;
                };
                let title = title.as_str().trim();
                if char_len(title) >= MIN_SECTION_TITLE_CHARS {
                    return Some(title.to_string());
                }
            }
        }
        None
    }

    pub fn is_meaningful(&self, text: &str) -> bool {
        let content = text.trim();

        if char_len(content) < self.config.min_chunk_chars {
            return false;
        }
        if self.border_only.is_match(content) {
            return false;
        }
        if self.is_table(content) {
            let filled = content.lines().filter(|line| !line.trim().is_empty()).count();
            if filled <= TABLE_HEADER_LINES {
                return false;
            }
        }
        self.word.find_iter(content).count() >= self.config.min_word_count
    }

    /// Splits a table on row boundaries, repeating the header lines at the
    /// top of every piece.
    pub fn split_table(&self, table: &str) -> Vec<String> {
        let max_size = self.config.max_table_chars;
        let mut header_lines = Vec::new();
        let mut data_lines = Vec::new();

        for (index, line) in table.split('\n').enumerate() {
            if !line.contains(self.config.table_delimiter) {
                continue;
            }
            if index < TABLE_HEADER_LINES || line.contains(TABLE_RULE) {
                header_lines.push(line);
            } else {
                data_lines.push(line);
            }
        }

        if data_lines.is_empty() {
            return if char_len(table) < max_size {
                vec![table.to_string()]
            } else {
                Vec::new()
            };
        }

        let header = header_lines.join("\n");
        let header_size = char_len(&header);
        let mut pieces = Vec::new();
        let mut rows: Vec<&str> = Vec::new();
        let mut size = header_size;

        for row in data_lines {
            let row_size = char_len(row) + 1;
            if size + row_size > max_size && !rows.is_empty() {
                pieces.push(format!("{header}\n{}", rows.join("\n")));
                rows.clear();
                size = header_size;
            }
            rows.push(row);
            size += row_size;
        }

        if !rows.is_empty() {
            pieces.push(format!("{header}\n{}", rows.join("\n")));
        }
        pieces
    }

    fn flush(&self, buffer: &mut ProseBuffer, chunks: &mut Vec<Chunk>) {
        if buffer.is_empty() {
            return;
        }
        let text = buffer.blocks.join("\n\n");
        let section = buffer.section.take();
        buffer.clear();
        self.emit(text, section, false, chunks);
    }

    fn emit(&self, text: String, section: Option<String>, has_table: bool, chunks: &mut Vec<Chunk>) {
        if self.is_meaningful(&text) {
            chunks.push(Chunk::new(text, section, has_table));
        }
    }
}

#[derive(Debug, Default)]
struct ProseBuffer {
    blocks: Vec<String>,
    len: usize,
    section: Option<String>,
}

impl ProseBuffer {
    fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn push(&mut self, block: &str, section: Option<String>) {
        self.len += char_len(block);
        self.blocks.push(block.to_string());
        self.section = section;
    }

    fn clear(&mut self) {
        self.blocks.clear();
        self.len = 0;
        self.section = None;
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTENCE: &str = "입주자 선정 기준은 소득과 자산 요건을 충족하는 무주택 세대구성원으로 한다. ";

    fn chunker() -> Chunker {
        Chunker::new(ChunkingConfig::default()).expect("default config is valid")
    }

    fn prose(sentences: usize) -> String {
        SENTENCE.repeat(sentences).trim().to_string()
    }

    fn housing_table(rows: usize) -> String {
        let mut lines = vec![
            "| 구분 | 주택형 | 공급호수 | 임대보증금 | 월임대료 |".to_string(),
            "|---|---|---|---|---|".to_string(),
            "| 단위 | 전용면적 | 호 | 천원 | 천원 |".to_string(),
            "|---|---|---|---|---|".to_string(),
        ];
        for n in 0..rows {
            lines.push(format!(
                "| 행복주택 청년계층 {n:02} | 전용 {}㎡ 주택형 | {}호 공급 | 보증금 {}천원 | 월 {}천원 |",
                16 + n % 20,
                10 + n,
                21_000 + n * 100,
                90 + n
            ));
        }
        lines.join("\n")
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunker().chunk("").is_empty());
        assert!(chunker().chunk("\n\n \n\n").is_empty());
    }

    #[test]
    fn table_detection_needs_majority_of_delimited_lines() {
        let chunker = chunker();
        assert!(chunker.is_table("| a | b |\n|---|---|\n| 1 | 2 |"));
        assert!(!chunker.is_table("| a | b |\n| 1 | 2 |"));
        assert!(!chunker.is_table("| a |\n| b |\n| c |\none\ntwo\nthree"));
    }

    #[test]
    fn section_titles_need_more_than_five_characters() {
        let chunker = chunker();
        assert_eq!(
            chunker.section_name("## 신청자격 및 선정기준\n본문"),
            Some("신청자격 및 선정기준".to_string())
        );
        assert_eq!(
            chunker.section_name("【 공급대상 및 공급규모 】"),
            Some("공급대상 및 공급규모".to_string())
        );
        assert_eq!(chunker.section_name("## 개요"), None);
        assert_eq!(chunker.section_name("첫줄\n둘째줄\n셋째줄\n■ 넷째줄은 검사하지 않음"), None);
    }

    #[test]
    fn chunks_carry_detected_section() {
        let text = format!("## 신청자격 및 선정기준\n\n{}", prose(4));

        let chunks = chunker().chunk(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section.as_deref(), Some("신청자격 및 선정기준"));
        assert!(chunks[0].enriched_text.starts_with("[신청자격 및 선정기준]\n"));
        assert_eq!(chunks[0].length, chunks[0].text.chars().count());
    }

    #[test]
    fn prose_is_flushed_at_optimal_size() {
        let block = prose(5);
        let block_len = block.chars().count();
        assert!(block_len * 2 <= 600 && block_len * 3 > 600);
        let text = vec![block.clone(); 5].join("\n\n");

        let chunks = chunker().chunk(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, format!("{block}\n\n{block}"));
        assert_eq!(chunks[2].text, block);
        assert!(chunks.iter().all(|chunk| !chunk.has_table));
    }

    #[test]
    fn oversized_prose_block_is_resplit() {
        let block = SENTENCE.repeat(40);
        assert!(block.chars().count() > 1_200);

        let chunks = chunker().chunk(&block);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.length <= 600, "chunk of {} chars", chunk.length);
        }
    }

    #[test]
    fn tables_are_never_merged_with_prose() {
        let table = housing_table(5);
        let text = format!("{}\n\n{}\n\n{}", prose(3), table, prose(3));

        let chunks = chunker().chunk(&text);
        assert_eq!(chunks.len(), 3);
        assert!(!chunks[0].has_table);
        assert!(chunks[1].has_table);
        assert_eq!(chunks[1].text, table);
        assert!(!chunks[1].text.contains(SENTENCE.trim()));
        assert!(!chunks[2].has_table);
    }

    #[test]
    fn oversized_table_is_split_with_header_on_every_piece() {
        let table = housing_table(50);
        assert!(table.chars().count() > 3_000);

        let chunks = chunker().chunk(&table);
        assert!(chunks.len() > 1);
        let header = table.lines().take(4).collect::<Vec<_>>().join("\n");
        for chunk in &chunks {
            assert!(chunk.has_table);
            assert!(chunk.text.starts_with(&header));
            assert!(chunk.length <= 3_000, "table piece of {} chars", chunk.length);
        }

        let rows: usize = chunks.iter().map(|chunk| chunk.text.lines().count() - 4).sum();
        assert_eq!(rows, 50);
    }

    #[test]
    fn digits_and_punctuation_are_not_meaningful() {
        let chunker = chunker();
        let numbers = "1.2.3 - 4.5.6 | 7.8.9 ".repeat(6);
        assert!(numbers.chars().count() >= 100);
        assert!(!chunker.is_meaningful(&numbers));

        let bracketed = "(1) 2024. (2) 2025. (3) 100% ".repeat(4);
        assert!(bracketed.chars().count() >= 100);
        assert!(!chunker.is_meaningful(&bracketed));
        assert!(chunker.chunk(&bracketed).is_empty());
    }

    #[test]
    fn short_text_is_not_meaningful() {
        assert!(!chunker().is_meaningful("행복주택 입주자 모집 공고 안내 사항"));
    }

    #[test]
    fn header_only_table_is_not_meaningful() {
        let table = "| 구분 | 주택형 | 공급호수 | 임대보증금 | 월임대료 | 비고 사항 안내 |\n|---|---|---|---|---|---|\n| 단위 | 전용면적 | 호 | 천원 | 천원 | 기타 참고 사항 |";
        assert!(table.chars().count() >= 100);
        assert!(!chunker().is_meaningful(table));
    }

    #[test]
    fn every_emitted_chunk_passes_the_filter_and_keeps_order() {
        let text = format!(
            "# 행복주택 입주자 모집공고 안내\n\n{}\n\n----\n\n{}\n\n{}\n\n12 34\n\n{}",
            prose(6),
            housing_table(8),
            prose(20),
            prose(2)
        );

        let chunker = chunker();
        let chunks = chunker.chunk(&text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunker.is_meaningful(&chunk.text));
            assert_eq!(chunk.section.as_deref(), Some("행복주택 입주자 모집공고 안내"));
        }

        let mut cursor = 0;
        for chunk in &chunks {
            let probe: String = chunk.text.chars().take(20).collect();
            let found = text[cursor..].find(&probe).expect("chunk text comes from input");
            cursor += found;
        }
    }
}
