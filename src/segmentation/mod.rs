mod preprocess;
mod sam;
pub mod types;

pub use preprocess::{binarize_mask, stability_score, Preprocessor};
pub use sam::{SegmentAnything, DECODER_FILE, ENCODER_FILE};
pub use types::{MaskCandidate, PointPrompt, SegmentationModel};

use crate::error::Result;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound for the default worker count
const MAX_DEFAULT_THREADS: usize = 4;

/// Model session configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Worker threads; `<= 0` selects the default
    pub n_threads: i32,
    /// RNG seed; negative derives one from the clock
    pub seed: i64,
    /// Minimum predicted IoU for a candidate to be kept
    pub iou_threshold: f32,
    /// Minimum stability score for a candidate to be kept
    pub stability_score_threshold: f32,
    /// Logit threshold separating mask from background
    pub mask_threshold: f32,
    pub stability_score_offset: f32,
    /// Drop the single-mask output when the decoder emits several
    pub multimask_output: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_threads: default_threads() as i32,
            seed: -1,
            iou_threshold: 0.88,
            stability_score_threshold: 0.95,
            mask_threshold: 0.0,
            stability_score_offset: 1.0,
            multimask_output: true,
        }
    }
}

/// Load the default segmentation model (SAM on ONNX Runtime)
pub fn load_model<P: AsRef<Path>>(
    model_dir: P,
    config: &ModelConfig,
) -> Result<Box<dyn SegmentationModel>> {
    let model = SegmentAnything::new(model_dir, config.clone())?;
    Ok(Box::new(model))
}

/// Default worker count: available cores, capped at 4
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_THREADS)
}

/// Map a requested thread count to a usable one
pub fn resolve_threads(n_threads: i32) -> usize {
    if n_threads > 0 {
        n_threads as usize
    } else {
        default_threads()
    }
}

/// Map a requested seed to a concrete one; negative seeds come from the clock
pub fn resolve_seed(seed: i64) -> u64 {
    if seed >= 0 {
        return seed as u64;
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Bounded pool for the CPU side of a model call
pub(crate) fn worker_pool(n_threads: i32) -> std::result::Result<ThreadPool, ThreadPoolBuildError> {
    ThreadPoolBuilder::new()
        .num_threads(resolve_threads(n_threads))
        .build()
}
