use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorralError {
    #[error("pool capacity must be greater than zero")]
    InvalidCapacity,
    #[error("worker expiration must be greater than zero")]
    InvalidExpiration,
    #[error("pool has been released")]
    PoolClosed,
    #[error("worker {0} hand-off slot is disconnected")]
    WorkerUnavailable(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CorralError>,
    },
}

impl CorralError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns true when the error, or the error it wraps, is [`CorralError::PoolClosed`].
    pub fn is_pool_closed(&self) -> bool {
        match self {
            Self::PoolClosed => true,
            Self::Context { source, .. } => source.is_pool_closed(),
            _ => false,
        }
    }
}
