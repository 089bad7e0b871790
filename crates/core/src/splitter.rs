//! Recursive separator splitting for prose blocks that exceed the hard
//! chunk limit.
//!
//! The text is cut on the coarsest separator present (blank line, newline,
//! space, then single characters). Pieces still larger than the target are
//! split again with the next separator; small pieces are merged back up to
//! the target size, carrying a tail of up to `overlap` characters into the
//! next piece.

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap: overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator.as_str())
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut output = Vec::new();
        let mut pending = Vec::new();

        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                output.extend(self.merge(&pending, &separator));
                pending.clear();
            }

            if remaining.is_empty() {
                output.push(piece);
            } else {
                output.extend(self.split_with(&piece, remaining));
            }
        }

        if !pending.is_empty() {
            output.extend(self.merge(&pending, &separator));
        }

        output
    }

    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut documents = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let piece_len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { separator_len };

            if total + piece_len + joiner > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut documents, &window.join(separator));

                while total > self.overlap
                    || (total > 0
                        && total + piece_len + if window.is_empty() { 0 } else { separator_len }
                            > self.chunk_size)
                {
                    let Some(first) = window.first() else {
                        break;
                    };
                    let removed = char_len(first) + if window.len() > 1 { separator_len } else { 0 };
                    total = total.saturating_sub(removed);
                    window.remove(0);
                }
            }

            let joiner = if window.is_empty() { 0 } else { separator_len };
            window.push(piece);
            total += piece_len + joiner;
        }

        push_trimmed(&mut documents, &window.join(separator));
        documents
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (String, &'a [String]) {
    for (index, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (String::new(), &[]);
        }
        if text.contains(separator.as_str()) {
            return (separator.clone(), &separators[index + 1..]);
        }
    }
    (String::new(), &[])
}

fn push_trimmed(documents: &mut Vec<String>, joined: &str) {
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        documents.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
