use thiserror::Error;

/// The error kinds a conformant node can raise, with the propagation policy
/// from the design's error handling section encoded in where each variant
/// is produced and caught: admission-local errors never leave
/// `Mempool::add_transaction`, `BalanceBounds` unwinds only the transaction
/// that raised it, and `PersistenceError` is surfaced to the operator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid nonce for {address}: expected {expected}, got {got}")]
    InvalidNonce {
        address: String,
        expected: u64,
        got: u64,
    },

    #[error("duplicate transaction hash: {0}")]
    DuplicateHash(String),

    #[error("duplicate (from, nonce) already pending for {address} nonce {nonce}")]
    DuplicateNonceInMempool { address: String, nonce: u64 },

    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: f64, need: f64 },

    #[error("invalid gas parameters: limit={limit}, price={price}")]
    InvalidGas { limit: i64, price: f64 },

    #[error("negative amount: {0}")]
    NegativeAmount(f64),

    #[error("kind-specific validation failed: {0}")]
    KindSpecific(String),

    #[error("mempool is full")]
    MempoolFull,

    #[error("balance out of bounds: {balance} not in [0, {max}]")]
    BalanceBounds { balance: f64, max: f64 },

    #[error("contract validation failed: {0}")]
    ContractValidationFailed(String),

    #[error("forbidden construct: {0}")]
    ForbiddenConstruct(String),

    #[error("gas exhausted after {used} of {limit}")]
    GasExhausted { used: u64, limit: u64 },

    #[error("block validation failed: {0}")]
    BlockValidationFailed(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;
