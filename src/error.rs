use thiserror::Error;

/// Errors surfaced when a GEMV launch is rejected or faults.
///
/// There is no partial-result contract: after any of these, the output
/// vectors may be left in an unspecified state.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid launch config: {0}")]
    InvalidConfig(String),
    #[error("execution group needs {required} lanes, backend limit is {limit}")]
    TooManyLanes { required: usize, limit: usize },
    #[error("group scratch needs {required} bytes, limit is {limit}")]
    ScratchOverflow { required: usize, limit: usize },
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("wgpu error: {0}")]
    Wgpu(String),
}

pub type LaunchResult<T> = Result<T, LaunchError>;
