use super::preprocess::{binarize_mask, stability_score, Preprocessor};
use super::types::{MaskCandidate, PointPrompt, SegmentationModel};
use super::{resolve_seed, resolve_threads, worker_pool, ModelConfig};
use crate::error::{Error, Result};
use image::RgbImage;
use ndarray::{s, Array, Array1, Array2, Array3, Array4, ArrayD, Dimension, Ix2, Ix4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use rayon::prelude::*;
use std::fmt::Display;
use std::path::Path;

/// File name of the image encoder inside the model directory
pub const ENCODER_FILE: &str = "encoder.onnx";
/// File name of the prompt decoder inside the model directory
pub const DECODER_FILE: &str = "decoder.onnx";

/// Side length of the square encoder input
const IMAGE_SIZE: u32 = 1024;
/// Side length of the decoder's low resolution mask input
const LOW_RES_MASK_SIZE: usize = 256;

/// Encoder output for one image, kept with the size it was computed for
struct CachedEmbedding {
    embedding: ArrayD<f32>,
    width: u32,
    height: u32,
}

/// Segment Anything running on ONNX Runtime
///
/// The model is split in two graphs: a heavy image encoder, run once per
/// image, and a light prompt decoder, run once per prompt against the
/// cached embedding.
pub struct SegmentAnything {
    encoder: Session,
    decoder: Session,
    encoder_input: String,
    encoder_output: String,
    preprocessor: Preprocessor,
    config: ModelConfig,

    // Populated by compute_embedding, read by compute_masks
    embedding: Option<CachedEmbedding>,
}

impl SegmentAnything {
    /// Load the encoder and decoder graphs from `model_dir`
    ///
    /// # Arguments
    /// * `model_dir` - Directory holding `encoder.onnx` and `decoder.onnx`
    /// * `config` - Thread count, seed and candidate filter thresholds
    pub fn new<P: AsRef<Path>>(model_dir: P, config: ModelConfig) -> Result<Self> {
        let dir = model_dir.as_ref();
        let n_threads = resolve_threads(config.n_threads);
        let seed = resolve_seed(config.seed);

        tracing::info!("Loading SAM model from {}", dir.display());
        tracing::info!("seed = {}, n_threads = {}", seed, n_threads);

        let encoder_path = dir.join(ENCODER_FILE);
        let encoder = build_session(&encoder_path, n_threads)?;
        let decoder = build_session(&dir.join(DECODER_FILE), n_threads)?;

        let encoder_input = encoder
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| load_error(&encoder_path)("encoder declares no inputs"))?;
        let encoder_output = encoder
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| load_error(&encoder_path)("encoder declares no outputs"))?;

        tracing::info!("SAM model loaded successfully");
        tracing::debug!(
            "Encoder io: {} -> {}, decoder inputs: {:?}",
            encoder_input,
            encoder_output,
            decoder.inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            encoder,
            decoder,
            encoder_input,
            encoder_output,
            preprocessor: Preprocessor::new(IMAGE_SIZE),
            config,
            embedding: None,
        })
    }
}

impl SegmentationModel for SegmentAnything {
    fn compute_embedding(&mut self, image: &RgbImage, n_threads: i32) -> Result<()> {
        let _span = tracing::debug_span!("sam_embedding").entered();

        self.embedding = None;

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::Embedding(format!(
                "invalid image dimensions {width}x{height}"
            )));
        }

        let pool = worker_pool(n_threads).map_err(embedding_error)?;
        let preprocessor = &self.preprocessor;
        let input = pool.install(|| preprocessor.preprocess(image))?;
        let input = Tensor::from_array(input).map_err(embedding_error)?;

        let _infer_span = tracing::debug_span!("encoder").entered();
        let outputs = self
            .encoder
            .run(ort::inputs![self.encoder_input.as_str() => input])
            .map_err(embedding_error)?;
        drop(_infer_span);

        let embedding = outputs[self.encoder_output.as_str()]
            .try_extract_array::<f32>()
            .map_err(embedding_error)?
            .to_owned();

        tracing::debug!("Image embedding shape: {:?}", embedding.shape());

        self.embedding = Some(CachedEmbedding {
            embedding,
            width,
            height,
        });

        Ok(())
    }

    fn compute_masks(
        &mut self,
        image: &RgbImage,
        n_threads: i32,
        point: PointPrompt,
    ) -> Result<Vec<MaskCandidate>> {
        let _span = tracing::debug_span!("sam_masks").entered();

        let (width, height) = image.dimensions();
        let cached = self
            .embedding
            .as_ref()
            .filter(|cached| (cached.width, cached.height) == (width, height))
            .ok_or(Error::MissingEmbedding { width, height })?;

        if !point.is_within(width, height) {
            tracing::warn!(
                "Point ({}, {}) lies outside the {}x{} image",
                point.x,
                point.y,
                width,
                height
            );
        }

        let (x, y) = self.preprocessor.transform_point(point.x, point.y, width, height);

        // Positive point followed by the padding point (label -1)
        let image_embeddings = decoder_tensor(cached.embedding.clone())?;
        let point_coords = decoder_tensor(
            Array3::from_shape_vec((1, 2, 2), vec![x, y, 0.0, 0.0]).map_err(mask_error)?,
        )?;
        let point_labels =
            decoder_tensor(Array2::from_shape_vec((1, 2), vec![1.0f32, -1.0]).map_err(mask_error)?)?;
        let mask_input = decoder_tensor(Array4::<f32>::zeros((
            1,
            1,
            LOW_RES_MASK_SIZE,
            LOW_RES_MASK_SIZE,
        )))?;
        let has_mask_input = decoder_tensor(Array1::from_vec(vec![0.0f32]))?;
        let orig_im_size = decoder_tensor(Array1::from_vec(vec![height as f32, width as f32]))?;

        let _infer_span = tracing::debug_span!("decoder").entered();
        let outputs = self
            .decoder
            .run(ort::inputs![
                "image_embeddings" => image_embeddings,
                "point_coords" => point_coords,
                "point_labels" => point_labels,
                "mask_input" => mask_input,
                "has_mask_input" => has_mask_input,
                "orig_im_size" => orig_im_size
            ])
            .map_err(mask_error)?;
        drop(_infer_span);

        let masks = extract::<Ix4>(&outputs["masks"])?;
        let iou_predictions = extract::<Ix2>(&outputs["iou_predictions"])?;
        let low_res_masks = extract::<Ix4>(&outputs["low_res_masks"])?;
        drop(outputs);

        let (mask_height, mask_width) = (masks.shape()[2] as u32, masks.shape()[3] as u32);
        if (mask_width, mask_height) != (width, height) {
            return Err(Error::MaskDecoding(format!(
                "decoder returned {mask_width}x{mask_height} masks for a {width}x{height} image"
            )));
        }
        if iou_predictions.shape()[1] != masks.shape()[1]
            || low_res_masks.shape()[1] != masks.shape()[1]
        {
            return Err(Error::MaskDecoding(format!(
                "decoder returned {} masks but {} scores",
                masks.shape()[1],
                iou_predictions.shape()[1]
            )));
        }

        let pool = worker_pool(n_threads).map_err(mask_error)?;
        let config = &self.config;
        let candidates =
            pool.install(|| decode_candidates(config, &masks, &iou_predictions, &low_res_masks));

        tracing::debug!(
            "{} of {} masks passed the quality filters",
            candidates.len(),
            masks.shape()[1]
        );

        Ok(candidates)
    }

    fn clear_embedding(&mut self) {
        tracing::debug!("Clearing cached image embedding");
        self.embedding = None;
    }

    fn input_size(&self) -> (u32, u32) {
        let side = self.preprocessor.target_length();
        (side, side)
    }
}

impl Drop for SegmentAnything {
    fn drop(&mut self) {
        tracing::debug!("Releasing SAM session");
    }
}

/// Filter, binarise and rank the decoder outputs
///
/// Runs on the current rayon pool, one candidate per task.
fn decode_candidates(
    config: &ModelConfig,
    masks: &Array4<f32>,
    iou_predictions: &Array2<f32>,
    low_res_masks: &Array4<f32>,
) -> Vec<MaskCandidate> {
    let count = masks.shape()[1];
    let (height, width) = (masks.shape()[2] as u32, masks.shape()[3] as u32);

    // The first output comes from the single-mask token
    let first = if config.multimask_output && count > 1 { 1 } else { 0 };

    let mut candidates: Vec<MaskCandidate> = (first..count)
        .into_par_iter()
        .filter_map(|i| {
            let iou = iou_predictions[[0, i]];
            if iou.is_nan() || iou < config.iou_threshold {
                tracing::debug!("Mask {} rejected: iou {:.3}", i, iou);
                return None;
            }

            let low_res: Vec<f32> = low_res_masks.slice(s![0, i, .., ..]).iter().copied().collect();
            let stability =
                stability_score(&low_res, config.mask_threshold, config.stability_score_offset);
            if stability < config.stability_score_threshold {
                tracing::debug!("Mask {} rejected: stability {:.3}", i, stability);
                return None;
            }

            let logits: Vec<f32> = masks.slice(s![0, i, .., ..]).iter().copied().collect();
            let mask = binarize_mask(&logits, width, height, config.mask_threshold)?;

            Some(MaskCandidate {
                mask,
                iou,
                stability_score: stability,
            })
        })
        .collect();

    // Stable, so equal scores keep decoder order
    candidates.sort_by(|a, b| b.iou.total_cmp(&a.iou));
    candidates
}

fn build_session(path: &Path, n_threads: usize) -> Result<Session> {
    Session::builder()
        .map_err(load_error(path))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(load_error(path))?
        .with_intra_threads(n_threads)
        .map_err(load_error(path))?
        .commit_from_file(path)
        .map_err(load_error(path))
}

fn load_error<E: Display>(path: &Path) -> impl Fn(E) -> Error + '_ {
    move |e| Error::ModelLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn embedding_error<E: Display>(e: E) -> Error {
    Error::Embedding(e.to_string())
}

fn mask_error<E: Display>(e: E) -> Error {
    Error::MaskDecoding(e.to_string())
}

fn decoder_tensor<D: Dimension + 'static>(array: Array<f32, D>) -> Result<Tensor<f32>> {
    Tensor::from_array(array).map_err(mask_error)
}

fn extract<D: Dimension>(value: &ort::value::DynValue) -> Result<Array<f32, D>> {
    value
        .try_extract_array::<f32>()
        .map_err(mask_error)?
        .into_dimensionality::<D>()
        .map_err(mask_error)
        .map(|view| view.to_owned())
}
