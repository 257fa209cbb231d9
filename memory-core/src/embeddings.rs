//! The embedding function boundary (out of scope: the model runtime
//! itself). The core treats embedding as a pure function `text -> vector`.

use async_trait::async_trait;

use crate::error::Result;

/// External embedding provider. The model that backs this is out of scope
/// for the core; implementations typically call out to a local or remote
/// model server.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single piece of text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::ExternalTimeout`] or
    /// [`crate::error::Error::ExternalFailure`] if the underlying model
    /// call fails or exceeds its deadline.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts. The default implementation calls
    /// [`Embedder::embed`] sequentially; implementations backed by a model
    /// that supports native batching should override this.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered, matching [`Embedder::embed`].
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Dimension of vectors this provider produces.
    fn dimension(&self) -> usize;
}

/// Raw cosine similarity between two equal-length vectors, in `[-1, 1]`.
///
/// Unlike a similarity score normalized for display, this is the textbook
/// cosine: `dot(a, b) / (|a| * |b|)`. Callers that need a `[0, 1]` weight
/// (the authority model in C8) clip and scale this value themselves rather
/// than receiving an already-normalized score, so that raw semantic search
/// ranking (C6) is not distorted by a transform meant for a different
/// consumer.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Clip a raw cosine similarity into `[0, 1]` for use as an authority
/// weight input (C8). Values below 0 (more dissimilar than orthogonal) are
/// floored to 0 rather than mapped onto the lower half of the range.
#[must_use]
pub fn clip_similarity_unit_interval(similarity: f32) -> f32 {
    similarity.clamp(0.0, 1.0)
}

/// Deterministic fake embedder for tests: hashes the text into a
/// fixed-dimension unit vector so that equal inputs produce equal vectors
/// and the dimension invariant always holds.
#[derive(Debug, Clone, Copy)]
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    /// Build a mock embedder producing vectors of the given `dimension`.
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(text.as_bytes());
        let mut v = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            let byte = digest[i % digest.len()];
            v.push(f32::from(byte) / 255.0);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_of_opposite_vectors_is_negative_one() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - (-1.0)).abs() < 1e-5);
    }

    #[test]
    fn mismatched_dimensions_yield_zero_rather_than_panicking() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn clip_floors_negative_similarity_to_zero() {
        assert!((clip_similarity_unit_interval(-0.8) - 0.0).abs() < f32::EPSILON);
        assert!((clip_similarity_unit_interval(0.5) - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn mock_embedder_is_deterministic_and_matches_dimension() {
        let embedder = MockEmbedder::new(384);
        let a = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }
}
