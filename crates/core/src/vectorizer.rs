use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::embeddings::{embed_in_batches, Embedder};
use crate::error::IngestError;
use crate::extractor::PdfExtractor;
use crate::pool::WorkerPool;
use crate::resolver::SourceResolver;
use crate::traits::DocumentStore;
use crate::{
    Announcement, Category, CategoryProgress, ChunkMetadata, FileRecord, NewChunkRecord,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    Vectorized { chunks: usize },
    NotFound,
    NoMeaningfulContent,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub file_id: i64,
    pub file_name: String,
    pub status: FileStatus,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, FileStatus::Vectorized { .. })
    }

    pub fn chunk_count(&self) -> usize {
        match self.status {
            FileStatus::Vectorized { chunks } => chunks,
            _ => 0,
        }
    }

    pub fn error(&self) -> Option<String> {
        match &self.status {
            FileStatus::Vectorized { .. } => None,
            FileStatus::NotFound => Some("PDF not found".to_string()),
            FileStatus::NoMeaningfulContent => Some("No meaningful chunks".to_string()),
            FileStatus::Failed(message) => Some(message.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncementStatus {
    Complete,
    Partial,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncementOutcome {
    pub announcement_id: String,
    pub title: String,
    pub files: Vec<FileOutcome>,
}

impl AnnouncementOutcome {
    pub fn status(&self) -> AnnouncementStatus {
        if self.files.iter().all(FileOutcome::is_success) {
            AnnouncementStatus::Complete
        } else {
            AnnouncementStatus::Partial
        }
    }

    pub fn files_processed(&self) -> usize {
        self.files.iter().filter(|file| file.is_success()).count()
    }

    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn total_chunks(&self) -> usize {
        self.files.iter().map(FileOutcome::chunk_count).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|file| !file.is_success())
    }
}

#[derive(Debug, Clone)]
pub struct VectorizeReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub batches: usize,
    pub announcements: usize,
    pub complete: usize,
    pub partial: usize,
    pub chunks: usize,
    pub interrupted: bool,
    pub progress: Vec<CategoryProgress>,
}

#[derive(Debug, Default)]
struct RunTally {
    batches: usize,
    announcements: usize,
    complete: usize,
    partial: usize,
    chunks: usize,
    interrupted: bool,
}

impl RunTally {
    fn record(&mut self, outcome: &AnnouncementOutcome) {
        self.announcements += 1;
        self.chunks += outcome.total_chunks();
        match outcome.status() {
            AnnouncementStatus::Complete => self.complete += 1,
            AnnouncementStatus::Partial => self.partial += 1,
        }
    }
}

/// Drives extraction, chunking, embedding and storage for announcements
/// that have not been vectorized yet. Orchestration is sequential; only
/// extraction and embedding run on the owned worker pool.
pub struct Vectorizer<S: ?Sized, M: ?Sized, X: ?Sized> {
    store: Arc<S>,
    embedder: Arc<M>,
    extractor: Arc<X>,
    chunker: Chunker,
    resolver: SourceResolver,
    pool: WorkerPool,
    embedding_batch_size: usize,
    normalize: bool,
}

impl<S, M, X> Vectorizer<S, M, X>
where
    S: DocumentStore + ?Sized,
    M: Embedder + ?Sized + 'static,
    X: PdfExtractor + ?Sized + 'static,
{
    pub fn new(
        store: Arc<S>,
        embedder: Arc<M>,
        extractor: Arc<X>,
        config: &RagConfig,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            store,
            embedder,
            extractor,
            chunker: Chunker::new(config.chunking.clone())?,
            resolver: SourceResolver::new(&config.vectorizer),
            pool: WorkerPool::new(config.vectorizer.max_workers),
            embedding_batch_size: config.vectorizer.embedding_batch_size,
            normalize: config.embedding.normalize,
        })
    }

    /// Never fails: every problem with a single file becomes its status.
    pub async fn process_file(&self, file: &FileRecord, category: Category) -> FileOutcome {
        let status = match self.resolver.resolve(&file.file_name, category) {
            Some(path) if path.exists() => match self.vectorize_file(file, &path).await {
                Ok(status) => status,
                Err(error) => FileStatus::Failed(error.to_string()),
            },
            _ => FileStatus::NotFound,
        };

        match &status {
            FileStatus::Vectorized { chunks } => {
                debug!(file_id = file.id, file_name = %file.file_name, chunks, "file vectorized");
            }
            other => {
                warn!(file_id = file.id, file_name = %file.file_name, status = ?other, "file not vectorized");
            }
        }

        FileOutcome {
            file_id: file.id,
            file_name: file.file_name.clone(),
            status,
        }
    }

    async fn vectorize_file(&self, file: &FileRecord, path: &Path) -> Result<FileStatus, IngestError> {
        let extractor = Arc::clone(&self.extractor);
        let source: PathBuf = path.to_path_buf();
        let text = self
            .pool
            .run(move || extractor.extract_text(&source))
            .await??;

        let chunks = self.chunker.chunk(&text);
        if chunks.is_empty() {
            return Ok(FileStatus::NoMeaningfulContent);
        }

        let embedder = Arc::clone(&self.embedder);
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.enriched_text.clone()).collect();
        let batch_size = self.embedding_batch_size;
        let normalize = self.normalize;
        let embeddings = self
            .pool
            .run(move || embed_in_batches(embedder.as_ref(), &texts, batch_size, normalize))
            .await??;

        for (index, (chunk, embedding)) in chunks.iter().zip(embeddings).enumerate() {
            let chunk_index = u32::try_from(index).map_err(|_| {
                IngestError::InvalidArgument(format!("chunk index {index} exceeds u32"))
            })?;
            self.store
                .insert_chunk(NewChunkRecord {
                    announcement_id: file.announcement_id.clone(),
                    file_id: file.id,
                    chunk_text: chunk.text.clone(),
                    chunk_index,
                    embedding,
                    metadata: ChunkMetadata {
                        file_name: file.file_name.clone(),
                        section: chunk.section.clone(),
                        has_table: chunk.has_table,
                        chunk_length: chunk.length,
                    },
                })
                .await?;
        }

        self.store.mark_file_vectorized(file.id).await?;
        Ok(FileStatus::Vectorized {
            chunks: chunks.len(),
        })
    }

    /// Processes every file, then marks the announcement vectorized no
    /// matter how the files fared, so unprocessable notices leave the queue.
    pub async fn process_announcement(
        &self,
        announcement: &Announcement,
    ) -> Result<AnnouncementOutcome, IngestError> {
        let files = self.store.get_announcement_files(&announcement.id).await?;

        let mut outcomes = Vec::with_capacity(files.len());
        for file in &files {
            outcomes.push(self.process_file(file, announcement.category).await);
        }

        self.store
            .mark_announcement_vectorized(&announcement.id)
            .await?;

        Ok(AnnouncementOutcome {
            announcement_id: announcement.id.clone(),
            title: announcement.title.clone(),
            files: outcomes,
        })
    }

    /// An empty result means no unvectorized announcements remain.
    pub async fn vectorize_batch(
        &self,
        limit: usize,
    ) -> Result<Vec<AnnouncementOutcome>, IngestError> {
        let never = std::future::pending::<()>();
        tokio::pin!(never);
        let (outcomes, _) = self.run_batch(limit, &mut never).await?;
        Ok(outcomes)
    }

    pub async fn vectorize_all(self, batch_size: usize) -> Result<VectorizeReport, IngestError> {
        self.vectorize_all_until(batch_size, std::future::pending::<()>())
            .await
    }

    /// Runs batches until the queue is empty or `shutdown` completes.
    /// Shutdown is honoured between announcements, so an announcement is
    /// either fully attempted and marked or left untouched. The worker
    /// pool is shut down on every path.
    pub async fn vectorize_all_until<F>(
        self,
        batch_size: usize,
        shutdown: F,
    ) -> Result<VectorizeReport, IngestError>
    where
        F: Future<Output = ()>,
    {
        let started_at = Utc::now();
        let result = async {
            let tally = self.drain(batch_size, shutdown).await?;
            let progress = self.store.get_vectorization_progress().await?;
            Ok::<_, IngestError>((tally, progress))
        }
        .await;
        self.close().await;

        let (tally, progress) = result?;
        Ok(VectorizeReport {
            started_at,
            finished_at: Utc::now(),
            batches: tally.batches,
            announcements: tally.announcements,
            complete: tally.complete,
            partial: tally.partial,
            chunks: tally.chunks,
            interrupted: tally.interrupted,
            progress,
        })
    }

    /// Waits for in-flight pool jobs and releases the pool.
    pub async fn close(self) {
        self.pool.shutdown().await;
    }

    async fn drain<F>(&self, batch_size: usize, shutdown: F) -> Result<RunTally, IngestError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut tally = RunTally::default();

        loop {
            let (outcomes, interrupted) = self.run_batch(batch_size, &mut shutdown).await?;
            if interrupted {
                tally.interrupted = true;
            }
            if !outcomes.is_empty() {
                tally.batches += 1;
            }
            for outcome in &outcomes {
                log_outcome(outcome);
                tally.record(outcome);
            }
            if interrupted || outcomes.is_empty() {
                break;
            }
        }

        if tally.interrupted {
            warn!(announcements = tally.announcements, "vectorization interrupted");
        }
        Ok(tally)
    }

    async fn run_batch<F>(
        &self,
        limit: usize,
        shutdown: &mut Pin<&mut F>,
    ) -> Result<(Vec<AnnouncementOutcome>, bool), IngestError>
    where
        F: Future<Output = ()>,
    {
        if limit == 0 {
            return Err(IngestError::InvalidArgument(
                "announcement batch size must be positive".to_string(),
            ));
        }
        if stop_requested(shutdown).await {
            return Ok((Vec::new(), true));
        }

        let announcements = self.store.get_unvectorized_announcements(limit).await?;
        let mut outcomes = Vec::with_capacity(announcements.len());
        for announcement in &announcements {
            if stop_requested(shutdown).await {
                return Ok((outcomes, true));
            }
            outcomes.push(self.process_announcement(announcement).await?);
        }
        Ok((outcomes, false))
    }
}

async fn stop_requested<F>(shutdown: &mut Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = shutdown.as_mut() => true,
        _ = std::future::ready(()) => false,
    }
}

fn log_outcome(outcome: &AnnouncementOutcome) {
    match outcome.status() {
        AnnouncementStatus::Complete => info!(
            announcement_id = %outcome.announcement_id,
            files = outcome.files_processed(),
            total_files = outcome.total_files(),
            chunks = outcome.total_chunks(),
            "announcement vectorized"
        ),
        AnnouncementStatus::Partial => {
            warn!(
                announcement_id = %outcome.announcement_id,
                files = outcome.files_processed(),
                total_files = outcome.total_files(),
                "announcement partially vectorized"
            );
            for failure in outcome.failures() {
                warn!(
                    file_name = %failure.file_name,
                    error = failure.error().unwrap_or_default(),
                    "file failed"
                );
            }
        }
    }
}
