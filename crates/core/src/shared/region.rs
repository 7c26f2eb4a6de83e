/// A detected region: integer pixel bounds plus label and confidence.
///
/// Bounds are inclusive of `(x1, y1)` and exclusive of `(x2, y2)`, so
/// `width() * height()` is the box area in pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub label: String,
    pub confidence: f32,
}

impl Region {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Clamps the box to a `frame_w × frame_h` canvas.
    pub fn clamped(&self, frame_w: u32, frame_h: u32) -> Region {
        let fw = frame_w as i32;
        let fh = frame_h as i32;
        Region {
            x1: self.x1.clamp(0, fw),
            y1: self.y1.clamp(0, fh),
            x2: self.x2.clamp(0, fw),
            y2: self.y2.clamp(0, fh),
            label: self.label.clone(),
            confidence: self.confidence,
        }
    }

    /// Overlay caption: class name and confidence with two decimals.
    pub fn caption(&self) -> String {
        format!("{} {:.2}", self.label, self.confidence)
    }

    pub fn iou(&self, other: &Region) -> f64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let area_a = self.area() as f64;
        let area_b = other.area() as f64;
        inter / (area_a + area_b - inter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn region(x1: i32, y1: i32, x2: i32, y2: i32) -> Region {
        Region::new(x1, y1, x2, y2, "person", 0.9)
    }

    #[test]
    fn test_dimensions_and_area() {
        let r = region(10, 20, 60, 70);
        assert_eq!(r.width(), 50);
        assert_eq!(r.height(), 50);
        assert_eq!(r.area(), 2500);
    }

    #[test]
    fn test_inverted_box_has_zero_area() {
        let r = region(50, 50, 10, 10);
        assert_eq!(r.area(), 0);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_relative_eq!(Region::new(0, 0, 1, 1, "x", 1.7).confidence, 1.0);
        assert_relative_eq!(Region::new(0, 0, 1, 1, "x", -0.2).confidence, 0.0);
    }

    #[rstest]
    #[case(0.5, "person 0.50")]
    #[case(0.876, "person 0.88")]
    #[case(1.0, "person 1.00")]
    fn test_caption_has_two_decimals(#[case] confidence: f32, #[case] expected: &str) {
        let r = Region::new(0, 0, 10, 10, "person", confidence);
        assert_eq!(r.caption(), expected);
    }

    #[test]
    fn test_clamped_to_frame() {
        let r = region(-10, -5, 700, 500).clamped(640, 480);
        assert_eq!((r.x1, r.y1, r.x2, r.y2), (0, 0, 640, 480));
    }

    #[test]
    fn test_iou_identical_regions() {
        let a = region(10, 10, 110, 110);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = region(0, 0, 50, 50);
        let b = region(100, 100, 150, 150);
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50*100 = 5000, union 15000
        let a = region(0, 0, 100, 100);
        let b = region(50, 0, 150, 100);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[test]
    fn test_iou_touching_edges() {
        let a = region(0, 0, 50, 50);
        let b = region(50, 0, 100, 50);
        assert_relative_eq!(a.iou(&b), 0.0);
    }
}
