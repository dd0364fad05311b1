/// Error type for tiered store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Neither tier holds the requested id.
    ///
    /// Under write-behind a fast-cache miss alone produces this, since the
    /// backing store may not hold the latest write yet.
    #[error("'{id}' not found in collection '{collection}'")]
    NotFound { collection: String, id: String },

    /// The durable backing store failed.
    #[error("[backing] collection '{collection}', id '{id}': {message}")]
    Backing {
        collection: String,
        id: String,
        message: String,
    },

    /// A fast-cache operation failed.
    #[error("[{tier}] cache error for key '{key}': {message}")]
    Operation {
        tier: String,
        key: String,
        message: String,
    },

    /// The store was constructed with invalid options.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Create a new fast-cache operation error.
    pub fn operation(
        tier: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Operation {
            tier: tier.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new backing store error.
    pub fn backing(
        collection: impl Into<String>,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Backing {
            collection: collection.into(),
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create a new not-found error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        CacheError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }
}
