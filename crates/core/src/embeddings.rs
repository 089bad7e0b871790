use crate::config::EmbeddingConfig;
use crate::error::EmbedError;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Maps text to fixed-size vectors. Implementations may block; async
/// callers run them on the worker pool or `spawn_blocking`.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed_batch(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>, EmbedError>;

    fn embed(&self, text: &str, normalize: bool) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[text.to_string()], normalize)?;
        vectors.pop().ok_or_else(|| EmbedError::BackendResponse {
            backend: self.model_id().to_string(),
            details: "no embedding returned for single input".to_string(),
        })
    }
}

/// Embeds `texts` in slices of at most `batch_size`, preserving order.
pub fn embed_in_batches<M>(
    embedder: &M,
    texts: &[String],
    batch_size: usize,
    normalize: bool,
) -> Result<Vec<Vec<f32>>, EmbedError>
where
    M: Embedder + ?Sized,
{
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let embedded = embedder.embed_batch(batch, normalize)?;
        if embedded.len() != batch.len() {
            return Err(EmbedError::BackendResponse {
                backend: embedder.model_id().to_string(),
                details: format!(
                    "returned {} embeddings for {} inputs",
                    embedded.len(),
                    batch.len()
                ),
            });
        }
        vectors.extend(embedded);
    }
    Ok(vectors)
}

pub fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right.iter()) {
        dot += f64::from(*a) * f64::from(*b);
        left_norm += f64::from(*a) * f64::from(*a);
        right_norm += f64::from(*b) * f64::from(*b);
    }
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

/// Hashed character trigram embedder. Deterministic and offline.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    fn embed_one(&self, text: &str, normalize: bool) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        if normalize {
            l2_normalize(&mut vector);
        }
        vector
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        "char-trigram"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts
            .iter()
            .map(|text| self.embed_one(text, normalize))
            .collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Blocking client for an OpenAI-compatible `/embeddings` endpoint.
///
/// Construct and call it outside of async contexts: from `main` before the
/// runtime starts, and from the worker pool afterwards.
pub struct HttpEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    dimensions: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let base = config.endpoint.as_deref().unwrap_or_default();
        let endpoint = embeddings_url(base)?;

        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if let Some(api_key) = config.api_key.as_deref().map(str::trim) {
            if !api_key.is_empty() {
                let mut headers = reqwest::header::HeaderMap::new();
                let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
                    .map_err(|error| EmbedError::BackendResponse {
                        backend: endpoint.to_string(),
                        details: format!("invalid api key header: {error}"),
                    })?;
                headers.insert(reqwest::header::AUTHORIZATION, value);
                builder = builder.default_headers(headers);
            }
        }

        Ok(Self {
            client: builder.build()?,
            endpoint,
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }
}

impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()?;

        if !response.status().is_success() {
            return Err(EmbedError::BackendResponse {
                backend: self.endpoint.to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: EmbeddingResponse = response.json()?;
        let mut vectors = order_embeddings(parsed, texts.len(), self.dimensions)?;
        if normalize {
            for vector in &mut vectors {
                l2_normalize(vector);
            }
        }
        Ok(vectors)
    }
}

fn embeddings_url(base: &str) -> Result<Url, EmbedError> {
    let trimmed = base.trim().trim_end_matches('/');
    let root = Url::parse(&format!("{trimmed}/"))?;
    Ok(root.join("embeddings")?)
}

fn order_embeddings(
    mut response: EmbeddingResponse,
    expected_count: usize,
    expected_dimensions: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    response.data.sort_by_key(|entry| entry.index);
    if response.data.len() != expected_count {
        return Err(EmbedError::BackendResponse {
            backend: "embeddings".to_string(),
            details: format!(
                "returned {} embeddings for {} inputs",
                response.data.len(),
                expected_count
            ),
        });
    }

    response
        .data
        .into_iter()
        .map(|entry| {
            if entry.embedding.len() == expected_dimensions {
                Ok(entry.embedding)
            } else {
                Err(EmbedError::DimensionMismatch {
                    expected: expected_dimensions,
                    actual: entry.embedding.len(),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("행복주택 입주자격", true).unwrap();
        let second = embedder.embed("행복주택 입주자격", true).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc", true).unwrap();
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn normalized_vectors_have_unit_length() {
        let embedder = CharacterNgramEmbedder::default();
        let vector = embedder.embed("국민임대주택 모집공고", true).unwrap();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn batches_preserve_input_order() {
        let embedder = CharacterNgramEmbedder { dimensions: 16 };
        let texts: Vec<String> = ["첫번째 문장", "두번째 문장", "세번째 문장"]
            .iter()
            .map(|text| text.to_string())
            .collect();

        let batched = embed_in_batches(&embedder, &texts, 2, true).unwrap();
        assert_eq!(batched.len(), 3);
        assert_eq!(batched[2], embedder.embed("세번째 문장", true).unwrap());
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let vector = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&vector, &vector) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&vector, &[1.0]), 0.0);
    }

    #[test]
    fn endpoint_keeps_path_prefix() {
        let url = embeddings_url("http://localhost:8080/v1/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v1/embeddings");
        assert!(embeddings_url("").is_err());
    }

    #[test]
    fn response_entries_are_reordered_by_index() {
        let response = EmbeddingResponse {
            data: vec![
                EmbeddingData {
                    embedding: vec![2.0, 2.0],
                    index: 1,
                },
                EmbeddingData {
                    embedding: vec![1.0, 1.0],
                    index: 0,
                },
            ],
        };

        let ordered = order_embeddings(response, 2, 2).unwrap();
        assert_eq!(ordered[0], vec![1.0, 1.0]);
        assert_eq!(ordered[1], vec![2.0, 2.0]);
    }

    #[test]
    fn response_with_wrong_dimension_is_rejected() {
        let response = EmbeddingResponse {
            data: vec![EmbeddingData {
                embedding: vec![1.0],
                index: 0,
            }],
        };

        assert!(matches!(
            order_embeddings(response, 1, 4),
            Err(EmbedError::DimensionMismatch {
                expected: 4,
                actual: 1
            })
        ));
    }
}
