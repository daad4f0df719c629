//! Vector math shared by the embedding pipeline, the index and ranking

/// Calculate cosine similarity between two vectors
///
/// Returns 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Euclidean distance, used for graph routing inside the index
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Scale `v` to unit length in place. Returns false for a zero vector.
pub fn l2_normalize(v: &mut [f32]) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

/// Force a backend vector to exactly `dimension` components.
///
/// Longer vectors are truncated and shorter ones zero-padded before
/// normalizing. `None` when the input is empty, non-finite or all zeros.
pub fn conform_dimension(mut v: Vec<f32>, dimension: usize) -> Option<Vec<f32>> {
    if v.is_empty() || v.iter().any(|x| !x.is_finite()) {
        return None;
    }
    v.resize(dimension, 0.0);
    if l2_normalize(&mut v) {
        Some(v)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_mismatched() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_euclidean_distance() {
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(euclidean_distance(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_conform_pads_and_truncates() {
        let padded = conform_dimension(vec![3.0, 4.0], 4).unwrap();
        assert_eq!(padded.len(), 4);
        assert!((padded[0] - 0.6).abs() < 1e-6);
        assert_eq!(padded[3], 0.0);

        let truncated = conform_dimension(vec![1.0, 0.0, 5.0], 2).unwrap();
        assert_eq!(truncated, vec![1.0, 0.0]);
    }

    #[test]
    fn test_conform_rejects_degenerate() {
        assert!(conform_dimension(vec![], 4).is_none());
        assert!(conform_dimension(vec![0.0, 0.0], 2).is_none());
        assert!(conform_dimension(vec![f32::NAN, 1.0], 2).is_none());
        // Only the kept prefix matters
        assert!(conform_dimension(vec![0.0, 7.0], 1).is_none());
    }
}
