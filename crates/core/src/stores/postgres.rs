use crate::traits::{ChunkIndex, WorkQueue};
use crate::{
    Announcement, Category, CategoryProgress, ChunkMetadata, FileRecord, NewChunkRecord,
    QueryFilters, ScoredChunk, SearchError,
};
use async_trait::async_trait;
use pgvector::Vector;
use tokio_postgres::types::Json;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};

const BACKEND: &str = "postgres";

/// PostgreSQL + pgvector document store. Similarity is cosine
/// (`1 - (embedding <=> query)`); the keyword side of hybrid ranking is
/// `ts_rank_cd` normalized into `[0, 1)`.
pub struct PgVectorStore {
    client: Client,
    dimensions: usize,
}

impl PgVectorStore {
    pub async fn connect(database_url: &str, dimensions: usize) -> Result<Self, SearchError> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "postgres connection error");
            }
        });
        Ok(Self { client, dimensions })
    }

    pub async fn ensure_schema(&self) -> Result<(), SearchError> {
        if self.dimensions == 0 {
            return Err(SearchError::Request(
                "embedding dimension must be positive".to_string(),
            ));
        }

        let ddl = format!(
            "CREATE EXTENSION IF NOT EXISTS vector;
            CREATE TABLE IF NOT EXISTS announcements (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL CHECK (category IN ('sale', 'lease')),
                title TEXT NOT NULL,
                region TEXT,
                is_vectorized BOOLEAN NOT NULL DEFAULT FALSE,
                vectorized_at TIMESTAMPTZ
            );
            CREATE TABLE IF NOT EXISTS announcement_files (
                id BIGSERIAL PRIMARY KEY,
                announcement_id TEXT NOT NULL REFERENCES announcements(id) ON DELETE CASCADE,
                file_name TEXT NOT NULL,
                is_vectorized BOOLEAN NOT NULL DEFAULT FALSE,
                vectorized_at TIMESTAMPTZ,
                UNIQUE (announcement_id, file_name)
            );
            CREATE TABLE IF NOT EXISTS document_chunks (
                id BIGSERIAL PRIMARY KEY,
                announcement_id TEXT NOT NULL REFERENCES announcements(id) ON DELETE CASCADE,
                file_id BIGINT NOT NULL REFERENCES announcement_files(id) ON DELETE CASCADE,
                chunk_text TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                embedding VECTOR({dims}) NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                text_tsv TSVECTOR GENERATED ALWAYS AS (to_tsvector('simple', chunk_text)) STORED,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS document_chunks_tsv_idx ON document_chunks USING GIN (text_tsv);
            CREATE INDEX IF NOT EXISTS document_chunks_announcement_idx ON document_chunks (announcement_id);",
            dims = self.dimensions
        );
        self.client.batch_execute(&ddl).await?;
        info!(dimensions = self.dimensions, "document store schema ready");
        Ok(())
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<(), SearchError> {
        if embedding.len() != self.dimensions {
            return Err(SearchError::Request(format!(
                "embedding dimension {} != {}",
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(())
    }
}

fn search_sql() -> &'static str {
    "SELECT c.id, c.announcement_id, c.file_id, c.chunk_index, c.chunk_text, c.metadata,
            a.title, a.region, a.category,
            1 - (c.embedding <=> $1) AS similarity
     FROM document_chunks c
     JOIN announcements a ON a.id = c.announcement_id
     WHERE ($3::text IS NULL OR a.region LIKE '%' || $3 || '%')
       AND ($4::text IS NULL OR a.category = $4)
     ORDER BY c.embedding <=> $1 ASC
     LIMIT $2"
}

fn hybrid_sql() -> &'static str {
    "WITH query AS (SELECT plainto_tsquery('simple', $2) AS q),
     scored AS (
        SELECT c.id, c.announcement_id, c.file_id, c.chunk_index, c.chunk_text, c.metadata,
               a.title, a.region, a.category,
               1 - (c.embedding <=> $1) AS similarity,
               CASE WHEN query.q = ''::tsquery THEN 0
                    ELSE ts_rank_cd(c.text_tsv, query.q, 32) END AS keyword_score
        FROM document_chunks c
        JOIN announcements a ON a.id = c.announcement_id
        CROSS JOIN query
     )
     SELECT id, announcement_id, file_id, chunk_index, chunk_text, metadata,
            title, region, category, similarity,
            $3 * similarity + (1 - $3) * keyword_score AS score
     FROM scored
     ORDER BY score DESC
     LIMIT $4"
}

fn as_i64(value: usize, field: &str) -> Result<i64, SearchError> {
    i64::try_from(value)
        .map_err(|_| SearchError::Request(format!("{field} value {value} exceeds i64 range")))
}

/// Counts and indexes are stored signed; a negative value means a corrupt row.
fn unsigned<T, U>(value: T, field: &str) -> Result<U, SearchError>
where
    T: Copy + std::fmt::Display,
    U: TryFrom<T>,
{
    U::try_from(value).map_err(|_| SearchError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("{field} has out-of-range value {value}"),
    })
}

fn parse_category(raw: &str) -> Result<Category, SearchError> {
    raw.parse().map_err(|details| SearchError::BackendResponse {
        backend: BACKEND.to_string(),
        details,
    })
}

fn row_to_scored(row: &Row, hybrid: bool) -> Result<ScoredChunk, SearchError> {
    let chunk_index: i32 = row.try_get("chunk_index")?;
    let Json(metadata): Json<ChunkMetadata> = row.try_get("metadata")?;
    let category: String = row.try_get("category")?;
    let similarity: f64 = row.try_get("similarity")?;
    let score = if hybrid {
        row.try_get("score")?
    } else {
        similarity
    };

    Ok(ScoredChunk {
        chunk_id: row.try_get("id")?,
        announcement_id: row.try_get("announcement_id")?,
        file_id: row.try_get("file_id")?,
        chunk_index: unsigned(chunk_index, "chunk_index")?,
        chunk_text: row.try_get("chunk_text")?,
        metadata,
        title: row.try_get("title")?,
        region: row.try_get("region")?,
        category: parse_category(&category)?,
        similarity,
        score,
    })
}

#[async_trait]
impl ChunkIndex for PgVectorStore {
    async fn insert_chunk(&self, record: NewChunkRecord) -> Result<(), SearchError> {
        self.check_dimensions(&record.embedding)?;
        let chunk_index = i32::try_from(record.chunk_index).map_err(|_| {
            SearchError::Request(format!("chunk_index {} exceeds i32", record.chunk_index))
        })?;
        let embedding = Vector::from(record.embedding);

        self.client
            .execute(
                "INSERT INTO document_chunks
                    (announcement_id, file_id, chunk_text, chunk_index, embedding, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &record.announcement_id,
                    &record.file_id,
                    &record.chunk_text,
                    &chunk_index,
                    &embedding,
                    &Json(&record.metadata),
                ],
            )
            .await?;
        Ok(())
    }

    async fn search_chunks(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        self.check_dimensions(query_embedding)?;
        let embedding = Vector::from(query_embedding.to_vec());
        let limit = as_i64(top_k, "top_k")?;
        let category = filters.category.map(|category| category.as_str());

        let rows = self
            .client
            .query(
                search_sql(),
                &[&embedding, &limit, &filters.region, &category],
            )
            .await?;
        rows.iter().map(|row| row_to_scored(row, false)).collect()
    }

    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        keywords: &str,
        top_k: usize,
        vector_weight: f64,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        self.check_dimensions(query_embedding)?;
        let embedding = Vector::from(query_embedding.to_vec());
        let limit = as_i64(top_k, "top_k")?;

        let rows = self
            .client
            .query(hybrid_sql(), &[&embedding, &keywords, &vector_weight, &limit])
            .await?;
        rows.iter().map(|row| row_to_scored(row, true)).collect()
    }
}

#[async_trait]
impl WorkQueue for PgVectorStore {
    async fn get_unvectorized_announcements(
        &self,
        limit: usize,
    ) -> Result<Vec<Announcement>, SearchError> {
        let limit = as_i64(limit, "limit")?;
        let rows = self
            .client
            .query(
                "SELECT id, category, title, region FROM announcements
                 WHERE NOT is_vectorized
                 ORDER BY id
                 LIMIT $1",
                &[&limit],
            )
            .await?;

        rows.iter()
            .map(|row| {
                let category: String = row.try_get("category")?;
                Ok(Announcement {
                    id: row.try_get("id")?,
                    category: parse_category(&category)?,
                    title: row.try_get("title")?,
                    region: row.try_get("region")?,
                })
            })
            .collect()
    }

    async fn get_announcement_files(
        &self,
        announcement_id: &str,
    ) -> Result<Vec<FileRecord>, SearchError> {
        let rows = self
            .client
            .query(
                "SELECT id, announcement_id, file_name FROM announcement_files
                 WHERE announcement_id = $1
                 ORDER BY id",
                &[&announcement_id],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(FileRecord {
                    id: row.try_get("id")?,
                    announcement_id: row.try_get("announcement_id")?,
                    file_name: row.try_get("file_name")?,
                })
            })
            .collect()
    }

    async fn mark_file_vectorized(&self, file_id: i64) -> Result<(), SearchError> {
        self.client
            .execute(
                "UPDATE announcement_files SET is_vectorized = TRUE, vectorized_at = NOW()
                 WHERE id = $1",
                &[&file_id],
            )
            .await?;
        Ok(())
    }

    async fn mark_announcement_vectorized(
        &self,
        announcement_id: &str,
    ) -> Result<(), SearchError> {
        self.client
            .execute(
                "UPDATE announcements SET is_vectorized = TRUE, vectorized_at = NOW()
                 WHERE id = $1",
                &[&announcement_id],
            )
            .await?;
        Ok(())
    }

    async fn get_vectorization_progress(&self) -> Result<Vec<CategoryProgress>, SearchError> {
        let rows = self
            .client
            .query(
                "SELECT category,
                        COUNT(*) AS total,
                        COUNT(*) FILTER (WHERE is_vectorized) AS vectorized
                 FROM announcements
                 GROUP BY category
                 ORDER BY category DESC",
                &[],
            )
            .await?;

        rows.iter()
            .map(|row| {
                let category: String = row.try_get("category")?;
                let total: i64 = row.try_get("total")?;
                let vectorized: i64 = row.try_get("vectorized")?;
                Ok(CategoryProgress::new(
                    parse_category(&category)?,
                    unsigned(total, "total")?,
                    unsigned(vectorized, "vectorized")?,
                ))
            })
            .collect()
    }
}
