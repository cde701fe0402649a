//! Heatmap type and upsampling.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use saliency_core::{Result, SaliencyError};

use crate::cam::CamMethod;

/// A normalized saliency heatmap for one explained class.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    values: Array2<f32>,
    method: CamMethod,
    layer: String,
    class_index: usize,
    score: f32,
    channel_weights: Vec<f32>,
}

impl Heatmap {
    /// Create a heatmap.
    pub fn new(
        values: Array2<f32>,
        method: CamMethod,
        layer: impl Into<String>,
        class_index: usize,
        score: f32,
        channel_weights: Vec<f32>,
    ) -> Self {
        Self {
            values,
            method,
            layer: layer.into(),
            class_index,
            score,
            channel_weights,
        }
    }

    /// Map values, shape `(h, w)`, each in [0, 1].
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Consume the heatmap and return its values.
    pub fn into_values(self) -> Array2<f32> {
        self.values
    }

    /// `(height, width)` of the map.
    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Method that produced the map.
    pub fn method(&self) -> CamMethod {
        self.method
    }

    /// Layer the map was computed at.
    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Explained class.
    pub fn class_index(&self) -> usize {
        self.class_index
    }

    /// Prediction-vector entry of the explained class.
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Weight given to each channel of the tapped feature map.
    pub fn channel_weights(&self) -> &[f32] {
        &self.channel_weights
    }

    /// Largest value in the map (0 for an all-zero map).
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// Whether no location received positive evidence.
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    /// Bilinearly rescale the map, e.g. to the input image's resolution.
    ///
    /// Metadata is carried over unchanged.
    pub fn resize(&self, height: usize, width: usize) -> Result<Self> {
        Ok(Self {
            values: resize_bilinear(&self.values, height, width)?,
            ..self.clone()
        })
    }

    /// Serializable summary with row-major values.
    pub fn to_report(&self) -> HeatmapReport {
        let (height, width) = self.dim();
        HeatmapReport {
            method: self.method,
            layer: self.layer.clone(),
            class_index: self.class_index,
            score: self.score,
            height,
            width,
            channel_weights: self.channel_weights.clone(),
            values: self.values.rows().into_iter().map(|r| r.to_vec()).collect(),
        }
    }
}

/// Serializable form of a [`Heatmap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapReport {
    /// Method that produced the map.
    pub method: CamMethod,
    /// Layer the map was computed at.
    pub layer: String,
    /// Explained class.
    pub class_index: usize,
    /// Prediction-vector entry of the explained class.
    pub score: f32,
    /// Map height.
    pub height: usize,
    /// Map width.
    pub width: usize,
    /// Weight given to each channel.
    pub channel_weights: Vec<f32>,
    /// Rows of the map.
    pub values: Vec<Vec<f32>>,
}

impl HeatmapReport {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SaliencyError::SerializationError(e.to_string()))
    }
}

/// Bilinear resize with half-pixel centres and edge clamping.
///
/// Every output value is a convex combination of input values, so a map in
/// [0, 1] stays in [0, 1].
pub fn resize_bilinear(map: &Array2<f32>, height: usize, width: usize) -> Result<Array2<f32>> {
    let (in_height, in_width) = map.dim();
    if height == 0 || width == 0 || in_height == 0 || in_width == 0 {
        return Err(SaliencyError::ShapeMismatch(format!(
            "cannot resize a {in_height}x{in_width} map to {height}x{width}"
        )));
    }
    if (height, width) == (in_height, in_width) {
        return Ok(map.clone());
    }

    let scale_y = in_height as f32 / height as f32;
    let scale_x = in_width as f32 / width as f32;

    Ok(Array2::from_shape_fn((height, width), |(y, x)| {
        let (y0, y1, fy) = source_coord(y, scale_y, in_height);
        let (x0, x1, fx) = source_coord(x, scale_x, in_width);
        let top = map[[y0, x0]] * (1.0 - fx) + map[[y0, x1]] * fx;
        let bottom = map[[y1, x0]] * (1.0 - fx) + map[[y1, x1]] * fx;
        top * (1.0 - fy) + bottom * fy
    }))
}

/// Neighbouring source indices and interpolation fraction for one output index.
fn source_coord(dst: usize, scale: f32, len: usize) -> (usize, usize, f32) {
    let src = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
    let lo = (src.floor() as usize).min(len - 1);
    let hi = (lo + 1).min(len - 1);
    let frac = if hi == lo { 0.0 } else { src - lo as f32 };
    (lo, hi, frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> Heatmap {
        Heatmap::new(
            array![[0.0, 0.5], [0.25, 1.0]],
            CamMethod::GradCamPlusPlus,
            "block5_conv3",
            3,
            0.8,
            vec![0.1, -0.2],
        )
    }

    #[test]
    fn test_heatmap_accessors() {
        let heatmap = sample();
        assert_eq!(heatmap.dim(), (2, 2));
        assert_eq!(heatmap.layer(), "block5_conv3");
        assert_eq!(heatmap.class_index(), 3);
        assert_eq!(heatmap.max(), 1.0);
        assert!(!heatmap.is_zero());
        assert_eq!(heatmap.channel_weights(), &[0.1, -0.2]);
    }

    #[test]
    fn test_resize_bilinear_row() {
        let map = array![[0.0, 1.0], [0.0, 1.0]];
        let resized = resize_bilinear(&map, 2, 4).unwrap();
        for row in resized.rows() {
            let row = row.to_vec();
            for (a, e) in row.iter().zip([0.0, 0.25, 0.75, 1.0]) {
                assert!((a - e).abs() < 1e-6, "{row:?}");
            }
        }
    }

    #[test]
    fn test_resize_bilinear_constant_and_identity() {
        let constant = Array2::from_elem((3, 5), 0.4f32);
        let resized = resize_bilinear(&constant, 7, 2).unwrap();
        assert_eq!(resized.dim(), (7, 2));
        assert!(resized.iter().all(|&v| (v - 0.4).abs() < 1e-6));

        let map = sample().into_values();
        assert_eq!(resize_bilinear(&map, 2, 2).unwrap(), map);
    }

    #[test]
    fn test_resize_stays_in_unit_interval() {
        let heatmap = sample().resize(224, 224).unwrap();
        assert_eq!(heatmap.dim(), (224, 224));
        assert!(heatmap.values().iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(heatmap.class_index(), 3);
    }

    #[test]
    fn test_resize_downsample() {
        let map = Array2::from_shape_fn((4, 4), |(y, x)| (y * 4 + x) as f32 / 15.0);
        let resized = resize_bilinear(&map, 2, 2).unwrap();
        // half-pixel centres land midway between source pixels
        let expected = (map[[0, 0]] + map[[0, 1]] + map[[1, 0]] + map[[1, 1]]) / 4.0;
        assert!((resized[[0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_resize_rejects_empty_target() {
        assert!(matches!(
            sample().resize(0, 10),
            Err(SaliencyError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_report_json() {
        let report = sample().to_report();
        assert_eq!(report.values, vec![vec![0.0, 0.5], vec![0.25, 1.0]]);

        let json = report.to_json().unwrap();
        let decoded: HeatmapReport = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, report);
    }
}
