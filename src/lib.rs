pub mod batch;
pub mod bench;
pub mod core;
pub mod error;
#[cfg(feature = "turbojpeg")]
pub mod turbojpeg_optimized;

// Re-exports for easy access
pub use crate::core::codec::{Compressor, CompressorKind, Encoder, EncoderKind};
pub use crate::core::work_item::{ratio, FileWorkItem, WorkItem, STAGE_FAILED_MS};
pub use error::{BenchError, StageFailure};
