use thiserror::Error;

/// Errors surfaced by the connection supervisor and offline queue.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    #[error("offline spill file I/O failed: {0}")]
    SpillIo(#[from] std::io::Error),

    #[error("offline spill record could not be decoded: {0}")]
    SpillDecode(String),

    #[error("downstream event channel closed")]
    ChannelClosed,
}
