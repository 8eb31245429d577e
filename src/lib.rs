pub mod error;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod segmentation;

pub use error::{Error, Result};
pub use pipeline::{run_pipeline, PipelineConfig, RunSummary};
