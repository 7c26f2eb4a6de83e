use crate::shared::frame::Frame;

/// Maps a face crop to a fixed-length, L2-normalised feature vector.
///
/// Vectors from the same encoder are comparable by Euclidean distance;
/// vectors from different encoders are not.
pub trait FaceEncoder: Send + Sync {
    fn encode(&self, face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>>;

    /// Length of every vector this encoder returns.
    fn dimension(&self) -> usize;
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
