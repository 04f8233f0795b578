use anyhow::{Result, bail};

/// Knobs handed to the image preparation step before an image goes on the
/// wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    /// Longest-edge ceiling in pixels.
    pub max_dimension: u32,
    /// Hard ceiling on the encoded payload.
    pub max_bytes: u64,
    /// Initial PNG compression level for re-encodes.
    pub png_start_level: u8,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_dimension: 2000,
            max_bytes: 5_242_880,
            png_start_level: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Boundary for the decode/resize/re-encode step. The pipeline treats this
/// as a pure `prepare(bytes, limits) -> (bytes, name)` collaborator; a
/// failure marks the single item failed without touching the rest of its
/// batch.
pub trait ImagePreparer: Send + Sync {
    fn prepare(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        limits: &ImageLimits,
    ) -> Result<PreparedImage>;
}

/// Ships bytes unchanged and only enforces the payload ceiling. Stands in
/// wherever a real re-encoder is not wired up.
pub struct PassthroughPreparer;

impl ImagePreparer for PassthroughPreparer {
    fn prepare(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        limits: &ImageLimits,
    ) -> Result<PreparedImage> {
        if bytes.len() as u64 > limits.max_bytes {
            bail!(
                "image {filename} is {} bytes, over the {}-byte limit",
                bytes.len(),
                limits.max_bytes
            );
        }
        Ok(PreparedImage {
            filename: filename.to_string(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_keeps_bytes_and_name() {
        let prepared = PassthroughPreparer
            .prepare("a.jpg", vec![1, 2, 3], &ImageLimits::default())
            .expect("prepare small image");
        assert_eq!(prepared.filename, "a.jpg");
        assert_eq!(prepared.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn passthrough_rejects_oversized_payloads() {
        let limits = ImageLimits {
            max_bytes: 2,
            ..ImageLimits::default()
        };
        let err = PassthroughPreparer
            .prepare("big.jpg", vec![0; 3], &limits)
            .expect_err("over the ceiling");
        assert!(err.to_string().contains("big.jpg"));
    }
}
