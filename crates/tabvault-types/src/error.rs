use thiserror::Error;

pub type Result<T> = std::result::Result<T, VaultError>;

/// Marker carried by backend errors when the total or per-item byte budget is exhausted.
pub const QUOTA_MARKER: &str = "QUOTA_BYTES";

/// Marker carried by backend errors when the write rate is throttled.
pub const RATE_LIMIT_MARKER: &str = "MAX_WRITE_OPERATIONS";

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("payload of {size} bytes does not fit the available budget of {budget} bytes")]
    PayloadTooLarge { size: u64, budget: u64 },

    #[error("chunk '{key}' cannot hold a single character within a budget of {budget} bytes")]
    ChunkBudgetExceeded { key: String, budget: u64 },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("chunk missing from store: '{0}'")]
    MissingChunk(String),

    #[error("decompression error: {0}")]
    Decompression(String),

    #[error("unknown compression tag: {0}")]
    UnknownCompressionTag(u8),

    #[error("unsupported storage format version: {0}")]
    UnsupportedVersion(u32),

    #[error("invalid vault format: {0}")]
    InvalidFormat(String),

    #[error("duplicate item id in vault: '{0}'")]
    DuplicateItemId(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl VaultError {
    /// Whether the backend (or the tier negotiation) ran out of byte budget.
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            VaultError::QuotaExceeded(_) | VaultError::PayloadTooLarge { .. } => true,
            VaultError::Storage(msg) => msg.contains(QUOTA_MARKER),
            _ => false,
        }
    }

    /// Whether the backend throttled the write.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, VaultError::Storage(msg) if msg.contains(RATE_LIMIT_MARKER))
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        if self.is_rate_limited() {
            return true;
        }
        match self {
            VaultError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Whether the error means stored data could not be read back intact.
    pub fn is_read_corruption(&self) -> bool {
        matches!(
            self,
            VaultError::ChecksumMismatch { .. }
                | VaultError::MissingChunk(_)
                | VaultError::Decompression(_)
                | VaultError::UnknownCompressionTag(_)
                | VaultError::UnsupportedVersion(_)
                | VaultError::InvalidFormat(_)
                | VaultError::Json(_)
        )
    }
}
