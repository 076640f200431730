//! Error types for notebook tagging
//!
//! Validation failures are raised before any tag write happens, so a caller
//! that receives one can assume the notebook is unchanged.

/// Main notebook error type
#[derive(Debug, thiserror::Error)]
pub enum NotebookError {
    /// Step name does not match the allowed pattern
    #[error(
        "invalid step name '{0}': must consist of lower case alphanumeric characters or '_', \
         and can not start with a digit"
    )]
    InvalidStepName(String),

    /// Step name is already declared by another cell
    #[error("this name already exists: {0}")]
    NameAlreadyExists(String),

    /// A reserved role was given dependencies
    #[error("reserved cell '{0}' cannot declare dependencies")]
    ReservedWithDependencies(String),

    /// Dependency refers to a step that is not declared
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    /// No cell declares the step
    #[error("no cell declares step '{0}'")]
    UnknownStep(String),

    /// Step lists itself as a dependency
    #[error("step '{0}' cannot depend on itself")]
    SelfDependency(String),

    /// Dependencies can only be attached to a named step
    #[error("cell {0} has no step name; dependencies require a named step")]
    UnnamedStep(usize),

    /// Only code cells carry step tags
    #[error("cell {0} is not a code cell")]
    NotCodeCell(usize),

    /// Index past the end of the notebook
    #[error("cell index {index} out of range ({len} cells)")]
    CellOutOfRange {
        /// Requested index
        index: usize,
        /// Number of cells in the notebook
        len: usize,
    },

    /// The dependency edges form a cycle
    #[error("dependency cycle through step '{0}'")]
    DependencyCycle(String),

    /// Pipeline name does not match the allowed pattern
    #[error(
        "invalid pipeline name '{0}': must consist of lower case alphanumeric characters or '-', \
         and must start and end with an alphanumeric character"
    )]
    InvalidPipelineName(String),

    /// Notebook metadata could not be read
    #[error("invalid notebook metadata: {0}")]
    InvalidMetadata(String),

    /// Persisting the document failed
    #[error("failed to persist notebook: {0}")]
    Persist(String),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Notebook JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NotebookError {
    /// Check if this is a local validation failure
    ///
    /// Validation failures are surfaced inline to the editing surface and are
    /// never persisted.
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidStepName(_)
                | Self::NameAlreadyExists(_)
                | Self::ReservedWithDependencies(_)
                | Self::UnknownDependency(_)
                | Self::UnknownStep(_)
                | Self::SelfDependency(_)
                | Self::UnnamedStep(_)
                | Self::InvalidPipelineName(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_already_exists_display() {
        let err = NotebookError::NameAlreadyExists("load".to_string());
        assert_eq!(err.to_string(), "this name already exists: load");
    }

    #[test]
    fn validation_classification() {
        assert!(NotebookError::InvalidStepName("1x".into()).is_validation());
        assert!(NotebookError::InvalidPipelineName("-p".into()).is_validation());
        assert!(!NotebookError::Persist("disk full".into()).is_validation());
        assert!(!NotebookError::NotCodeCell(3).is_validation());
    }

    #[test]
    fn out_of_range_display() {
        let err = NotebookError::CellOutOfRange { index: 4, len: 2 };
        assert_eq!(err.to_string(), "cell index 4 out of range (2 cells)");
    }
}
