use std::path::PathBuf;

/// Run-level failures. Only `InputUnavailable` and a `CodecInit` on the shared
/// handle stop a run; everything else degrades to a per-row failure marker.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("input unavailable: {}", path.display())]
    InputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to initialise {codec}: {reason}")]
    CodecInit { codec: String, reason: String },

    #[error("invalid file name: {0} (expected <index>_<width>_<height>.<ext>)")]
    MalformedInputName(String),

    #[error(transparent)]
    Stage(#[from] StageFailure),
}

/// A single encode/compress call that reported an error. Kept in the row it
/// belongs to; never propagated past the sweep or batch item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{capability} failed: {reason}")]
pub struct StageFailure {
    pub capability: String,
    pub reason: String,
}

impl StageFailure {
    pub fn new(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            reason: reason.into(),
        }
    }
}
