/// Result of running detection on a frame.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Detections that passed the confidence threshold.
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    /// Number of detections carrying `class_id`.
    pub fn count_class(&self, class_id: u32) -> usize {
        self.detections
            .iter()
            .filter(|d| d.class_id == class_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// One detected object. Box is centre-form, normalized to 0..1.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    /// Detection with a unit box, for scripted backends.
    pub fn of_class(class_id: u32, confidence: f32) -> Self {
        Self {
            x: 0.5,
            y: 0.5,
            w: 1.0,
            h: 1.0,
            confidence,
            class_id,
        }
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    /// Intersection over union of two centre-form boxes.
    pub fn iou(&self, other: &Detection) -> f32 {
        let (ax0, ay0, ax1, ay1) = self.corners();
        let (bx0, by0, bx1, by1) = other.corners();
        let iw = (ax1.min(bx1) - ax0.max(bx0)).max(0.0);
        let ih = (ay1.min(by1) - ay0.max(by0)).max(0.0);
        let inter = iw * ih;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    fn corners(&self) -> (f32, f32, f32, f32) {
        let hw = self.w / 2.0;
        let hh = self.h / 2.0;
        (self.x - hw, self.y - hh, self.x + hw, self.y + hh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection {
            x,
            y,
            w,
            h,
            confidence: 0.9,
            class_id: 1,
        }
    }

    #[test]
    fn counts_only_matching_class() {
        let result = DetectionResult::new(vec![
            Detection::of_class(1, 0.9),
            Detection::of_class(0, 0.8),
            Detection::of_class(1, 0.6),
        ]);
        assert_eq!(result.count_class(1), 2);
        assert_eq!(result.count_class(0), 1);
        assert_eq!(result.count_class(7), 0);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = boxed(0.25, 0.25, 0.2, 0.2);
        let b = boxed(0.75, 0.75, 0.2, 0.2);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = boxed(0.5, 0.5, 0.2, 0.2);
        let b = boxed(0.6, 0.5, 0.2, 0.2);
        // intersection 0.1*0.2, union 2*0.04 - 0.02
        assert!((a.iou(&b) - (0.02 / 0.06)).abs() < 1e-5);
    }
}
