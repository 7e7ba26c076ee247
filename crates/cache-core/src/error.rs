use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid capacity: {0} (must be greater than zero)")]
    InvalidCapacity(usize),

    #[error("Invalid TTL for '{0}': must be greater than zero")]
    InvalidTtl(String),

    #[error("Missing TTL for '{0}': no TTL given and no default configured")]
    MissingTtl(String),

    #[error("Invalid shrink fraction: {0} (must be within 0.0..=1.0)")]
    InvalidShrinkFraction(f64),

    #[error("Invalid page size: {0} (must be greater than zero)")]
    InvalidPageSize(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Cleanup action '{name}' failed: {reason}")]
    CleanupFailed { name: String, reason: String },

    #[error("Memory probe error: {0}")]
    MemoryProbe(String),

    #[error("Failed to load page {page}: {reason}")]
    PageLoad { page: usize, reason: String },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Build a cleanup failure from any displayable reason
    pub fn cleanup_failed(name: impl Into<String>, reason: impl ToString) -> Self {
        CacheError::CleanupFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error is raised at setup time rather than by a collaborator
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CacheError::InvalidCapacity(_)
                | CacheError::InvalidTtl(_)
                | CacheError::MissingTtl(_)
                | CacheError::InvalidShrinkFraction(_)
                | CacheError::InvalidPageSize(_)
                | CacheError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CacheError::InvalidCapacity(0);
        assert_eq!(
            err.to_string(),
            "Invalid capacity: 0 (must be greater than zero)"
        );

        let err = CacheError::cleanup_failed("cache_search", "boom");
        assert_eq!(err.to_string(), "Cleanup action 'cache_search' failed: boom");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(CacheError::InvalidCapacity(0).is_configuration());
        assert!(CacheError::MissingTtl("k".into()).is_configuration());
        assert!(!CacheError::MemoryProbe("unavailable".into()).is_configuration());
        assert!(!CacheError::PageLoad {
            page: 3,
            reason: "timeout".into()
        }
        .is_configuration());
    }
}
