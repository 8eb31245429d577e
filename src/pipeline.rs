use crate::error::Result;
use crate::input::load_image;
use crate::output::{composite, MaskSink};
use crate::segmentation::{MaskCandidate, PointPrompt, SegmentationModel};
use image::RgbImage;
use std::path::Path;
use std::time::{Duration, Instant};

/// Settings for one segmentation run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Worker threads handed to the model calls; `<= 0` selects the default
    pub n_threads: i32,
}

/// Wall time spent in each stage of a run
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub decode: Duration,
    pub load: Duration,
    pub embedding: Duration,
    pub masks: Duration,
    pub output: Duration,
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Prompt sent to the mask decoder
    pub point: PointPrompt,
    /// Number of candidates composited and written
    pub candidates: usize,
    pub timings: StageTimings,
}

/// Segment the object at the centre of `input`
///
/// Stages run strictly in order: decode the image, load the model, compute
/// the embedding, decode masks for the centre point, then composite and
/// write every candidate. The image is decoded before `load_model` is
/// called, so an unreadable input never touches the model. The first
/// failing stage aborts the run.
pub fn run_pipeline<M, F, O>(
    input: &Path,
    load_model: F,
    sink: &mut O,
    config: &PipelineConfig,
) -> Result<RunSummary>
where
    M: SegmentationModel,
    F: FnOnce() -> Result<M>,
    O: MaskSink,
{
    let mut timings = StageTimings::default();

    let decode_start = Instant::now();
    let image = load_image(input)?;
    timings.decode = decode_start.elapsed();
    tracing::info!(
        "Loaded {} ({}x{})",
        input.display(),
        image.width(),
        image.height()
    );

    let load_start = Instant::now();
    let mut model = load_model()?;
    timings.load = load_start.elapsed();
    tracing::debug!("Model input size: {:?}", model.input_size());

    let embedding_start = Instant::now();
    if let Err(e) = model.compute_embedding(&image, config.n_threads) {
        model.clear_embedding();
        return Err(e);
    }
    timings.embedding = embedding_start.elapsed();

    let point = PointPrompt::center_of(image.width(), image.height());
    tracing::debug!("Prompt point: ({:.2}, {:.2})", point.x, point.y);

    let masks_start = Instant::now();
    let candidates = model.compute_masks(&image, config.n_threads, point)?;
    timings.masks = masks_start.elapsed();
    tracing::info!("Decoded {} mask candidates", candidates.len());

    let output_start = Instant::now();
    let written = write_candidates(&image, &candidates, sink)?;
    timings.output = output_start.elapsed();

    tracing::debug!("Releasing model session");
    drop(model);

    tracing::info!(
        "decode={:.1}ms, load={:.1}ms, embedding={:.1}ms, masks={:.1}ms, output={:.1}ms",
        ms(timings.decode),
        ms(timings.load),
        ms(timings.embedding),
        ms(timings.masks),
        ms(timings.output)
    );

    Ok(RunSummary {
        point,
        candidates: written,
        timings,
    })
}

/// Composite each candidate against `source` and hand it to `sink`, in order
pub fn write_candidates<O: MaskSink>(
    source: &RgbImage,
    candidates: &[MaskCandidate],
    sink: &mut O,
) -> Result<usize> {
    for (index, candidate) in candidates.iter().enumerate() {
        tracing::info!(
            "mask{} (iou={:.3}, stability={:.3})",
            index,
            candidate.iou,
            candidate.stability_score
        );
        let (mask, overlay) = composite(source, &candidate.mask);
        sink.write_candidate(index, &mask, &overlay)?;
    }

    Ok(candidates.len())
}

fn ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ACCENT;
    use image::{GrayImage, Luma, Rgb};

    #[derive(Default)]
    struct RecordingSink {
        written: Vec<(usize, GrayImage, RgbImage)>,
    }

    impl MaskSink for RecordingSink {
        fn write_candidate(
            &mut self,
            index: usize,
            mask: &GrayImage,
            overlay: &RgbImage,
        ) -> Result<()> {
            self.written.push((index, mask.clone(), overlay.clone()));
            Ok(())
        }
    }

    fn candidate(mask: GrayImage, iou: f32) -> MaskCandidate {
        MaskCandidate {
            mask,
            iou,
            stability_score: 1.0,
        }
    }

    #[test]
    fn test_write_candidates_in_order() {
        let source = RgbImage::from_pixel(3, 2, Rgb([9, 8, 7]));
        let candidates = vec![
            candidate(GrayImage::from_pixel(3, 2, Luma([255])), 0.99),
            candidate(GrayImage::new(3, 2), 0.95),
        ];
        let mut sink = RecordingSink::default();

        let count = write_candidates(&source, &candidates, &mut sink).unwrap();
        assert_eq!(count, 2);

        let indices: Vec<usize> = sink.written.iter().map(|(i, _, _)| *i).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(sink.written[0].2, source);
        assert!(sink.written[1].2.pixels().all(|p| *p == ACCENT));
        assert_eq!(sink.written[1].1, candidates[1].mask);
    }

    #[test]
    fn test_no_candidates_writes_nothing() {
        let source = RgbImage::new(2, 2);
        let mut sink = RecordingSink::default();
        assert_eq!(write_candidates(&source, &[], &mut sink).unwrap(), 0);
        assert!(sink.written.is_empty());
    }
}
