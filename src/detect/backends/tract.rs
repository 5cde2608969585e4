#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::{decode_yolo_output, non_max_suppression, DEFAULT_IOU_THRESHOLD};
use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// The model is loaded once from a local file. Each frame is resized to the
/// square model input, normalized to 0..1 in NCHW order, and the raw output
/// is decoded and de-duplicated with class-wise NMS.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let edge = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, edge, edge)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, input_size })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let resized = image::imageops::resize(
            &frame.to_rgb_image()?,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );
        let edge = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, edge, edge), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<DetectionResult> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let data: Vec<f32> = view.iter().copied().collect();

        let candidates =
            decode_yolo_output(&data, &shape, self.input_size, confidence_threshold)?;
        let detections = non_max_suppression(candidates, DEFAULT_IOU_THRESHOLD);
        log::trace!(
            "tract: {} detections on frame {}",
            detections.len(),
            frame.index
        );
        Ok(DetectionResult::new(detections))
    }

    fn warm_up(&mut self) -> Result<()> {
        let frame = Frame::filled(self.input_size, self.input_size, 0, 0)?;
        self.detect(&frame, 1.0).map(|_| ())
    }
}
