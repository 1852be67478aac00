//! Activation of raw splat attributes into separate vertex streams.

use starlight_core::SplatFilter;
use tracing::debug;

use crate::ply::SplatPoint;

/// Logistic sigmoid used to activate opacity.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn normalize_quaternion(q: [f32; 4]) -> [f32; 4] {
    let length = q.iter().map(|c| c * c).sum::<f32>().sqrt();
    if length <= f32::EPSILON {
        return [1.0, 0.0, 0.0, 0.0];
    }
    q.map(|c| c / length)
}

/// Per-splat attributes ready for upload, one `Vec` per vertex binding.
///
/// All streams have the same length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SplatStreams {
    /// `(x, y, z, 1)`.
    pub positions: Vec<[f32; 4]>,
    /// `(exp(sx), exp(sy), exp(sz), 1)`.
    pub scales: Vec<[f32; 4]>,
    /// SH DC coefficients `(r, g, b, 1)`.
    pub colors: Vec<[f32; 4]>,
    /// Unit quaternions, `w` first.
    pub rotations: Vec<[f32; 4]>,
    /// `sigmoid(opacity)`.
    pub alphas: Vec<f32>,
}

impl SplatStreams {
    /// Activates every splat that passes `filter`.
    pub fn extract(points: &[SplatPoint], filter: &SplatFilter) -> Self {
        let mut streams = Self::with_capacity(points.len());

        for point in points {
            let alpha = sigmoid(point.opacity);
            let scale = point.scale.map(f32::exp);
            if !filter.keeps(alpha, scale) {
                continue;
            }

            let [x, y, z] = point.position;
            streams.positions.push([x, y, z, 1.0]);
            streams.scales.push([scale[0], scale[1], scale[2], 1.0]);
            streams
                .colors
                .push([point.sh[0], point.sh[1], point.sh[2], 1.0]);
            streams.rotations.push(normalize_quaternion(point.rotation));
            streams.alphas.push(alpha);
        }

        debug!(
            "Splat filter kept {} of {} points ({} dropped)",
            streams.len(),
            points.len(),
            points.len() - streams.len()
        );

        streams
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            scales: Vec::with_capacity(capacity),
            colors: Vec::with_capacity(capacity),
            rotations: Vec::with_capacity(capacity),
            alphas: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Splats that pass `filter`, unchanged, for the packed single-stream path.
pub fn filter_points(points: &[SplatPoint], filter: &SplatFilter) -> Vec<SplatPoint> {
    points
        .iter()
        .filter(|point| filter.keeps(sigmoid(point.opacity), point.scale.map(f32::exp)))
        .copied()
        .collect()
}
