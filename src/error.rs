/// Error type for this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RequotaError {
    /// A rule was built with a non-positive window, limit or an out-of-range precision.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// A rule set was empty.
    #[error("invalid rule set: {0}")]
    InvalidRuleSet(String),

    /// The caller key cannot be used to address counters.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Increments must carry a weight of at least 1.
    #[error("increment weight must be greater than 0")]
    InvalidWeight,

    /// The factory that produced the limiter has been closed.
    #[error("rate limiter factory is closed")]
    ClosedFactory,

    /// The shared store could not be reached or did not answer in time.
    #[error("counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// The shared store was reachable but failed to evaluate the window.
    #[error("window evaluation failed: {0}")]
    EvaluationFailed(String),

    /// A blocking call was made from a current-thread async runtime.
    #[error("blocking rate limiter calls are not supported on a current-thread runtime")]
    BlockingUnsupported,
}

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, RequotaError>;

#[cfg(feature = "redis-tokio")]
impl From<redis::RedisError> for RequotaError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
        {
            Self::StoreUnavailable(err.to_string())
        } else {
            Self::EvaluationFailed(err.to_string())
        }
    }
}
