use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("document store error: {0}")]
    Store(#[from] SearchError),

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("config file error: {0}")]
    ConfigFile(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbedError),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("embedding dimension {actual} != {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding worker failed: {0}")]
    Worker(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
