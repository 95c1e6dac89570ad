use thiserror::Error;

/// Errors that abort a render pass.
///
/// Anything recoverable (an unresolved reference, degenerate geometry, a
/// malformed filter graph) is tolerated inside the traversal and never
/// surfaces here. What remains is resource exhaustion and misuse.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to allocate a {width}x{height} layer")]
    LayerAllocation { width: u32, height: u32 },
    #[error("Recursion depth limit exceeded ({0})")]
    RecursionLimit(usize),
    #[error("Invalid render target: {0}")]
    InvalidTarget(String),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("Asset not found: {0}")]
    AssetNotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Errors raised while turning element events into a document.
///
/// Bad attribute values never surface here: they are logged and the
/// attribute or element is skipped.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Unbalanced end element </{0}>")]
    UnbalancedEnd(String),
    #[error("Document has no root <svg> element")]
    NoRoot,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FilterError {
    #[error("Filter region is empty or not finite")]
    InvalidRegion,
    #[error("Failed to allocate a {width}x{height} filter surface")]
    Allocation { width: u32, height: u32 },
}
