use crate::provider::Embedding;

/// Mean of the given vectors, re-normalised to unit length.
/// Returns `None` when inputs are empty or when any vector's dimension
/// disagrees with the first — a dimension mismatch means the vectors came
/// from different providers and cannot be meaningfully averaged.
pub fn combine(vectors: &[Embedding]) -> Option<Embedding> {
    let dim = vectors.first()?.len();
    if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
        return None;
    }

    let mut mean = vec![0.0f32; dim];
    for v in vectors {
        for (m, x) in mean.iter_mut().zip(v.iter()) {
            *m += x;
        }
    }
    let n = vectors.len() as f32;
    for m in mean.iter_mut() {
        *m /= n;
    }

    let norm = mean.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return Some(mean);
    }
    for m in mean.iter_mut() {
        *m /= norm;
    }
    Some(mean)
}

/// Cosine similarity between two vectors of equal length; `0.0` if either is
/// zero-length or they disagree in dimension (used by the pedagogy engine's
/// continuation detection).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_empty_is_none() {
        assert!(combine(&[]).is_none());
    }

    #[test]
    fn combine_mismatched_dims_is_none() {
        assert!(combine(&[vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]).is_none());
    }

    #[test]
    fn combine_is_unit_length() {
        let combined = combine(&[vec![3.0, 0.0], vec![0.0, 4.0]]).unwrap();
        let norm = combined.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }
}
