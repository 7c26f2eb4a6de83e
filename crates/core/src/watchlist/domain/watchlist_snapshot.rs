use crate::watchlist::domain::face_encoder::euclidean_distance;

/// One reference identity.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchlistEncoding {
    pub vector: Vec<f32>,
    /// Reference image file name, for diagnostics.
    pub source: String,
}

/// Immutable set of reference encodings. A refresh publishes a new
/// snapshot rather than editing this one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WatchlistSnapshot {
    pub generation: u64,
    pub entries: Vec<WatchlistEncoding>,
}

impl WatchlistSnapshot {
    pub fn new(generation: u64, entries: Vec<WatchlistEncoding>) -> Self {
        Self {
            generation,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Closest reference within `tolerance` of `encoding`.
    pub fn nearest_within(&self, encoding: &[f32], tolerance: f64) -> Option<(&WatchlistEncoding, f32)> {
        self.entries
            .iter()
            .filter(|e| e.vector.len() == encoding.len())
            .map(|e| (e, euclidean_distance(&e.vector, encoding)))
            .filter(|(_, d)| (*d as f64) <= tolerance)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(vector: Vec<f32>, source: &str) -> WatchlistEncoding {
        WatchlistEncoding {
            vector,
            source: source.to_string(),
        }
    }

    #[test]
    fn test_nearest_within_picks_closest() {
        let snapshot = WatchlistSnapshot::new(
            1,
            vec![entry(vec![1.0, 0.0], "far.jpg"), entry(vec![0.6, 0.8], "near.jpg")],
        );
        let (hit, distance) = snapshot.nearest_within(&[0.6, 0.8], 0.6).unwrap();
        assert_eq!(hit.source, "near.jpg");
        assert_eq!(distance, 0.0);
    }

    #[test]
    fn test_nothing_within_tolerance() {
        let snapshot = WatchlistSnapshot::new(1, vec![entry(vec![1.0, 0.0], "a.jpg")]);
        assert!(snapshot.nearest_within(&[0.0, 1.0], 0.6).is_none());
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let snapshot = WatchlistSnapshot::new(1, vec![entry(vec![0.0, 0.0], "a.jpg")]);
        assert!(snapshot.nearest_within(&[0.5, 0.0], 0.5).is_some());
    }

    #[test]
    fn test_mismatched_dimensions_never_match() {
        let snapshot = WatchlistSnapshot::new(1, vec![entry(vec![0.0, 0.0, 0.0], "a.jpg")]);
        assert!(snapshot.nearest_within(&[0.0, 0.0], 10.0).is_none());
    }

    #[test]
    fn test_default_is_empty_generation_zero() {
        let snapshot = WatchlistSnapshot::default();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.generation, 0);
    }
}
