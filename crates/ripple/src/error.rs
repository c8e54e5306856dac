use thiserror::Error;

use crate::source::SourceError;

/// Fatal initialisation failures.
///
/// Any of these leaves the simulation in its terminal failed state: no
/// `GpuState` exists and no tick ever runs. Transient conditions (a frame that
/// is not ready yet, an out-of-range pointer) never surface as errors.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to create window: {0}")]
    Window(String),
    #[error("failed to open frame source: {0}")]
    Source(#[from] SourceError),
    #[error("failed to create rendering surface: {0}")]
    Surface(String),
    #[error("no suitable GPU adapter: {0}")]
    Adapter(String),
    #[error("failed to create GPU device: {0}")]
    Device(String),
    #[error("GPU does not support the ripple simulation: {0}")]
    Unsupported(String),
    #[error("{stage} shader failed to compile or link: {message}")]
    Shader { stage: &'static str, message: String },
    #[error("failed to allocate {resource}: {message}")]
    Allocation {
        resource: &'static str,
        message: String,
    },
}
