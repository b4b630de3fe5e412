//! Error types for wallet, contract and transaction operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::TxHash;

/// Wallet error code for a prompt the user declined.
pub const USER_REJECTED_CODE: i64 = 4001;
/// JSON-RPC internal error code.
pub const RPC_INTERNAL_CODE: i64 = -32603;

/// Which remote contract an operation needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Token,
    Faucet,
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ContractKind::Token => "token",
            ContractKind::Faucet => "faucet",
        })
    }
}

/// Raw failure reported by a provider or contract call, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CallError {
    pub code: Option<i64>,
    pub message: String,
    /// Set when the failure happened after the network assigned a hash.
    pub tx_hash: Option<TxHash>,
}

impl CallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            tx_hash: None,
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            ..Self::new(message)
        }
    }

    pub fn user_rejected() -> Self {
        Self::with_code(USER_REJECTED_CODE, "user rejected the request")
    }

    pub fn for_tx(mut self, hash: TxHash) -> Self {
        self.tx_hash = Some(hash);
        self
    }
}

/// Top-level error returned by dashboard operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("No wallet provider is installed")]
    NoProvider,

    #[error("Wallet not connected")]
    NotConnected,

    #[error("The {0} contract is not available")]
    ContractUnavailable(ContractKind),

    #[error("Transaction rejected by user")]
    UserRejected,

    #[error("Please switch to {expected} (connected to chain {actual:#x})")]
    WrongNetwork { expected: String, actual: u64 },

    #[error("Faucet cooldown active. Next request available at: {next_eligible}")]
    CooldownActive { next_eligible: DateTime<Utc> },

    #[error("Insufficient funds for transaction")]
    InsufficientFunds,

    #[error("Transaction failed. Please check your input and try again.")]
    ExecutionReverted(String),

    #[error("Internal JSON-RPC error. Please try again.")]
    Rpc(String),

    #[error("{0}")]
    Unknown(String),
}

impl Error {
    /// Map a raw call failure onto the taxonomy by well-known codes, then message text.
    pub fn classify(err: &CallError) -> Self {
        match err.code {
            Some(USER_REJECTED_CODE) => return Error::UserRejected,
            Some(RPC_INTERNAL_CODE) => return Error::Rpc(err.message.clone()),
            _ => {}
        }

        let message = err.message.to_ascii_lowercase();
        if message.contains("insufficient funds") {
            Error::InsufficientFunds
        } else if message.contains("execution reverted") {
            Error::ExecutionReverted(err.message.clone())
        } else if err.message.is_empty() {
            Error::Unknown("An unknown error occurred".to_string())
        } else {
            Error::Unknown(err.message.clone())
        }
    }

    /// Failures detected before anything reaches the network. These are raised
    /// to the caller rather than folded into a `TransactionResult`.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::NoProvider
                | Error::NotConnected
                | Error::ContractUnavailable(_)
                | Error::WrongNetwork { .. }
                | Error::CooldownActive { .. }
        )
    }
}

impl From<CallError> for Error {
    fn from(err: CallError) -> Self {
        Error::classify(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_code() {
        assert_eq!(Error::classify(&CallError::user_rejected()), Error::UserRejected);
        assert!(matches!(
            Error::classify(&CallError::with_code(RPC_INTERNAL_CODE, "boom")),
            Error::Rpc(_)
        ));
    }

    #[test]
    fn code_wins_over_message() {
        let err = CallError::with_code(USER_REJECTED_CODE, "insufficient funds");
        assert_eq!(Error::classify(&err), Error::UserRejected);
    }

    #[test]
    fn classify_by_message() {
        assert_eq!(
            Error::classify(&CallError::new("insufficient funds for gas * price + value")),
            Error::InsufficientFunds
        );
        assert!(matches!(
            Error::classify(&CallError::new("execution reverted: paused")),
            Error::ExecutionReverted(msg) if msg == "execution reverted: paused"
        ));
    }

    #[test]
    fn unknown_preserves_message() {
        let err = Error::classify(&CallError::with_code(-32000, "nonce too low"));
        assert_eq!(err, Error::Unknown("nonce too low".to_string()));
        assert_eq!(err.to_string(), "nonce too low");
    }

    #[test]
    fn unknown_without_message_has_fallback_text() {
        let err = Error::classify(&CallError::new(""));
        assert_eq!(err.to_string(), "An unknown error occurred");
    }

    #[test]
    fn precondition_split() {
        assert!(Error::NotConnected.is_precondition());
        assert!(Error::ContractUnavailable(ContractKind::Faucet).is_precondition());
        assert!(
            Error::CooldownActive {
                next_eligible: Utc::now()
            }
            .is_precondition()
        );
        assert!(!Error::UserRejected.is_precondition());
        assert!(!Error::InsufficientFunds.is_precondition());
    }

    #[test]
    fn display_messages() {
        assert_eq!(Error::UserRejected.to_string(), "Transaction rejected by user");
        assert_eq!(
            Error::WrongNetwork {
                expected: "Avalanche Fuji Testnet".to_string(),
                actual: 1
            }
            .to_string(),
            "Please switch to Avalanche Fuji Testnet (connected to chain 0x1)"
        );
    }
}
