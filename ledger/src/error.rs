use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("unknown action type '{0}'")]
    InvalidAction(String),

    #[error("insufficient balance: have {balance}, need {cost}")]
    InsufficientFunds { balance: u32, cost: u32 },

    #[error("no wallet for user '{0}'")]
    WalletNotFound(String),
}

impl LedgerError {
    /// Stable error code surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAction(_) => "invalid_action",
            LedgerError::InsufficientFunds { .. } => "insufficient_balance",
            LedgerError::WalletNotFound(_) => "server_error",
        }
    }
}
