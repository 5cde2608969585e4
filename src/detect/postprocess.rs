//! Post-processing for YOLO-style detector outputs.
//!
//! Exported YOLO detection heads produce one tensor holding, per anchor, a
//! centre-form box in input pixels followed by one score per class. Exports
//! differ in axis order, so both `[1, 4 + C, N]` and `[1, N, 4 + C]` are
//! accepted. The smaller of the two trailing axes is taken as the channel axis.

use anyhow::{anyhow, Result};

use super::result::Detection;

/// Default IoU above which two same-class boxes are considered duplicates.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    ChannelMajor,
    AnchorMajor,
}

/// Decode a raw output tensor into normalized detections.
///
/// `shape` is the tensor shape, `input_size` the square model input edge in
/// pixels. Candidates whose best class score is below `threshold` are dropped.
pub fn decode_yolo_output(
    data: &[f32],
    shape: &[usize],
    input_size: u32,
    threshold: f32,
) -> Result<Vec<Detection>> {
    let (a, b) = match shape {
        [1, a, b] | [a, b] => (*a, *b),
        _ => return Err(anyhow!("unexpected detector output shape {:?}", shape)),
    };
    let (layout, channels, anchors) = if a <= b {
        (Layout::ChannelMajor, a, b)
    } else {
        (Layout::AnchorMajor, b, a)
    };
    if channels < 5 {
        return Err(anyhow!(
            "detector output has {} channels; expected 4 box values plus class scores",
            channels
        ));
    }
    let expected = channels
        .checked_mul(anchors)
        .ok_or_else(|| anyhow!("detector output shape overflows"))?;
    if data.len() != expected {
        return Err(anyhow!(
            "detector output length mismatch: expected {}, got {}",
            expected,
            data.len()
        ));
    }
    if input_size == 0 {
        return Err(anyhow!("model input size must be greater than zero"));
    }

    let at = |channel: usize, anchor: usize| -> f32 {
        match layout {
            Layout::ChannelMajor => data[channel * anchors + anchor],
            Layout::AnchorMajor => data[anchor * channels + channel],
        }
    };

    let scale = input_size as f32;
    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..channels - 4 {
            let score = at(4 + class, anchor);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if !best_score.is_finite() || best_score < threshold {
            continue;
        }
        detections.push(Detection {
            x: at(0, anchor) / scale,
            y: at(1, anchor) / scale,
            w: at(2, anchor) / scale,
            h: at(3, anchor) / scale,
            confidence: best_score,
            class_id: best_class as u32,
        });
    }
    Ok(detections)
}

/// Class-wise greedy non-maximum suppression. Output is sorted by confidence.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
