use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("unknown action '{0}'")]
    InvalidAction(String),

    #[error("not enough markers: have {balance}, need {cost}")]
    InsufficientFunds { balance: u32, cost: u32 },

    /// The provider or server rejected the purchase claim. Terminal; the
    /// wallet was not credited.
    #[error("purchase verification failed: {0}")]
    VerificationFailed(String),

    /// Transient transport failure. Safe to retry for reads only.
    #[error("network error: {0}")]
    Network(String),

    #[error("server error: {0}")]
    Server(String),

    /// The credit has not landed yet. Not a failure: the pending record
    /// stays in place and a later resync resolves it.
    #[error("purchase confirmation still pending")]
    PendingConfirmation,

    #[error("local storage error: {0}")]
    Storage(String),
}
