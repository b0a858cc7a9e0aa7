use thiserror::Error;

#[derive(Debug, Error)]
pub enum P2pError {
    #[error("invalid listen address: {0}")]
    InvalidMultiaddr(String),
    #[error("failed to start listener: {0}")]
    Listen(String),
    #[error("failed to dial {addr}: {reason}")]
    Dial { addr: String, reason: String },
    #[error("transport construction failed: {0}")]
    Transport(String),
    #[error("gossipsub configuration failed: {0}")]
    Gossipsub(String),
    #[error("gossipsub subscription failed: {0}")]
    Subscribe(String),
    #[error("message serialization failed: {0}")]
    Codec(String),
}
