//! The embedding contract consumed by the facade (spec §6 "External
//! Interfaces"). Brainy never loads or runs an embedding model itself — an
//! `Embedder` is a caller-supplied collaborator, called at most once per
//! ingest and once per text query.

use crate::error::BrainyResult;
use async_trait::async_trait;

/// Any `string | string[] -> float[D] | float[D][]` collaborator that returns
/// vectors of the store's configured dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single piece of text.
    async fn embed_one(&self, text: &str) -> BrainyResult<Vec<f32>>;

    /// Embed a batch of texts. The default implementation calls
    /// [`Self::embed_one`] sequentially; implementations backed by a batching
    /// API should override this for one round trip instead of N.
    async fn embed_many(&self, texts: &[String]) -> BrainyResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    /// A deterministic stub embedder for facade tests: hashes each character
    /// into a fixed-dimension vector so identical text always embeds the same.
    pub struct StubEmbedder {
        pub dimensions: usize,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed_one(&self, text: &str) -> BrainyResult<Vec<f32>> {
            let mut vector = vec![0.0f32; self.dimensions];
            for (i, byte) in text.bytes().enumerate() {
                vector[i % self.dimensions] += byte as f32;
            }
            Ok(vector)
        }
    }
}
