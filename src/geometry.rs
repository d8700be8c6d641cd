use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

const COORDINATE_SLACK: f64 = 1e-6;

/// Axis-aligned box in image-relative coordinates (`[0, 1]`, top-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl NormalizedBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Converts a pixel-space box, clamping it to the image bounds.
    pub fn from_pixels(x: f64, y: f64, w: f64, h: f64, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("cannot normalize box against empty image ({width}x{height})");
        }
        let width = f64::from(width);
        let height = f64::from(height);
        Ok(Self::new(x / width, y / height, w / width, h / height).clamped())
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn area(&self) -> f64 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn has_area(&self) -> bool {
        self.w > 0.0 && self.h > 0.0
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w * 0.5, self.y + self.h * 0.5)
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    pub fn iou(&self, other: &Self) -> f64 {
        let inter_w = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let inter_h = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        let inter_area = inter_w * inter_h;
        let union = self.area() + other.area() - inter_area;
        if union <= 0.0 {
            0.0
        } else {
            (inter_area / union).clamp(0.0, 1.0)
        }
    }

    pub fn center_distance(&self, other: &Self) -> f64 {
        let (cx1, cy1) = self.center();
        let (cx2, cy2) = other.center();
        ((cx1 - cx2).powi(2) + (cy1 - cy2).powi(2)).sqrt()
    }

    /// Clips the box to the unit square; a box fully outside collapses to zero area.
    pub fn clamped(&self) -> Self {
        if self.x >= 0.0 && self.y >= 0.0 && self.right() <= 1.0 && self.bottom() <= 1.0 {
            return *self;
        }
        let x0 = self.x.clamp(0.0, 1.0);
        let y0 = self.y.clamp(0.0, 1.0);
        let x1 = self.right().clamp(0.0, 1.0);
        let y1 = self.bottom().clamp(0.0, 1.0);
        Self::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite()
    }

    /// Rejects geometry that must never reach matching. Zero-area boxes are not
    /// rejected here; callers decide whether they are placeholders.
    pub fn validate(&self) -> Result<()> {
        if !self.is_finite() {
            bail!("box has non-finite coordinates: {self:?}");
        }
        if self.w < 0.0 || self.h < 0.0 {
            bail!("box has negative extent: {self:?}");
        }
        if self.x < -COORDINATE_SLACK
            || self.y < -COORDINATE_SLACK
            || self.right() > 1.0 + COORDINATE_SLACK
            || self.bottom() > 1.0 + COORDINATE_SLACK
        {
            bail!("box lies outside the unit square: {self:?}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn identical_boxes_have_unit_iou() {
        let a = NormalizedBox::new(0.1, 0.1, 0.1, 0.05);
        assert_abs_diff_eq!(a.iou(&a), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn partial_overlap_matches_hand_computed_iou() {
        let a = NormalizedBox::new(0.0, 0.0, 0.2, 0.2);
        let b = NormalizedBox::new(0.1, 0.1, 0.2, 0.2);
        assert_abs_diff_eq!(a.iou(&b), 0.01 / 0.07, epsilon = 1e-12);
    }

    #[test]
    fn disjoint_and_degenerate_boxes_have_zero_iou() {
        let a = NormalizedBox::new(0.0, 0.0, 0.1, 0.1);
        let b = NormalizedBox::new(0.5, 0.5, 0.1, 0.1);
        let empty = NormalizedBox::new(0.3, 0.3, 0.0, 0.0);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(empty.iou(&empty), 0.0);
        assert_eq!(a.iou(&empty), 0.0);
    }

    #[test]
    fn touching_edges_do_not_overlap() {
        let a = NormalizedBox::new(0.0, 0.0, 0.5, 0.5);
        let b = NormalizedBox::new(0.5, 0.0, 0.5, 0.5);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn from_pixels_normalizes_and_clamps() {
        let normalized = NormalizedBox::from_pixels(100.0, 50.0, 200.0, 100.0, 1000, 500)
            .expect("pixel box should normalize");
        assert_abs_diff_eq!(normalized.x, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(normalized.y, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(normalized.w, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(normalized.h, 0.2, epsilon = 1e-12);

        let overflowing = NormalizedBox::from_pixels(900.0, 0.0, 300.0, 100.0, 1000, 500)
            .expect("overflowing box should clamp");
        assert_abs_diff_eq!(overflowing.right(), 1.0, epsilon = 1e-12);

        assert!(NormalizedBox::from_pixels(0.0, 0.0, 1.0, 1.0, 0, 10).is_err());
    }

    #[test]
    fn validate_rejects_invalid_geometry() {
        assert!(NormalizedBox::new(0.1, 0.1, 0.2, 0.2).validate().is_ok());
        assert!(NormalizedBox::new(0.1, 0.1, 0.0, 0.0).validate().is_ok());
        assert!(NormalizedBox::new(0.1, 0.1, -0.2, 0.2).validate().is_err());
        assert!(NormalizedBox::new(f64::NAN, 0.1, 0.2, 0.2).validate().is_err());
        assert!(NormalizedBox::new(0.9, 0.1, 0.2, 0.2).validate().is_err());
    }
}
