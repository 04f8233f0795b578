use anyhow::Result;

/// One file ready for the wire.
#[derive(Debug, Clone)]
pub struct OutboundFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl OutboundFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// Capability the dispatcher sends through. Implementations own endpoint
/// selection, intra-call retries and cool-off handling; a returned error
/// means the retry budget for this call is exhausted. Tests substitute an
/// in-memory fake that records calls.
pub trait RemoteClient: Send + Sync {
    fn send_text(&self, text: &str) -> Result<()>;
    /// Every file in the batch is classified as a photo on the wire.
    fn send_media_batch(&self, files: &[OutboundFile]) -> Result<()>;
    fn send_document(&self, file: &OutboundFile) -> Result<()>;
    fn send_video(&self, file: &OutboundFile) -> Result<()>;
    fn send_audio(&self, file: &OutboundFile) -> Result<()>;
}
