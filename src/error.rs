//! Error taxonomy of the token network proxy.

use core::fmt::Display;

use crate::{
    channel::{BlockNumber, BlockTimeout, ChannelId, TokenAmount},
    ledger::{LedgerError, Receipt},
    packed::{self, types::Address, types::U256},
};

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

/// How the caller should react to a [ProxyError].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was rejected locally, nothing was sent to the ledger.
    InvalidInput,
    /// A concurrent actor already satisfied (or invalidated) the
    /// precondition. Re-query state, the operation may be moot.
    Recoverable,
    /// A precondition is permanently violated. Do not retry with the same
    /// arguments.
    Unrecoverable,
    /// The transaction reverted for a reason that could not be attributed.
    TransactionFailed,
    /// The ledger could not be reached or answered nonsense.
    Ledger,
}

/// Mutating entry points, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Deposit,
    Close,
    UpdateTransfer,
    Withdraw,
    Unlock,
    Settle,
}

impl Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Operation::Deposit => "deposit",
            Operation::Close => "close",
            Operation::UpdateTransfer => "update non-closing balance proof",
            Operation::Withdraw => "withdraw",
            Operation::Unlock => "unlock",
            Operation::Settle => "settle",
        };
        f.write_str(name)
    }
}

/// Why a `setTotalDeposit` transaction reverted, judged from the token
/// state read right after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositRevertCause {
    /// The allowance was consumed, most likely by a concurrent deposit from
    /// another proxy on the same account.
    AllowanceConsumed,
    /// The account no longer holds enough tokens.
    InsufficientFunds,
    Unknown,
}

impl Display for DepositRevertCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let reason = match self {
            DepositRevertCause::AllowanceConsumed => {
                "allowance is insufficient, check concurrent deposits for the same token network"
            }
            DepositRevertCause::InsufficientFunds => "the address doesn't have enough funds",
            DepositRevertCause::Unknown => "unknown cause",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyError {
    // Invalid input
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("settle_timeout must be in range [{min}, {max}], is {given}")]
    InvalidSettleTimeout {
        min: BlockTimeout,
        max: BlockTimeout,
        given: BlockTimeout,
    },

    #[error("the other peer must not have the same address as the client")]
    SamePeerAddress,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("amount {required} can not be larger than the available balance {available}")]
    InsufficientBalance {
        required: TokenAmount,
        available: TokenAmount,
    },

    #[error("current deposit ({current}) is already larger than the requested total deposit ({requested})")]
    DepositMismatch {
        current: TokenAmount,
        requested: TokenAmount,
    },

    #[error("current withdraw ({current}) is already larger than the requested total withdraw ({requested})")]
    WithdrawMismatch {
        current: TokenAmount,
        requested: TokenAmount,
    },

    #[error("one participant must be the node address {0}")]
    NotAParticipant(Address),

    #[error("encoding error: {0}")]
    Encoding(#[from] packed::Error),

    #[error("configuration error: {0}")]
    Config(String),

    // Recoverable
    #[error("no channel currently exists between {participant1} and {participant2}")]
    ChannelNotFound {
        participant1: Address,
        participant2: Address,
    },

    #[error("channel identifier {given} is outdated, the current one is {on_chain}")]
    ChannelOutdated { given: ChannelId, on_chain: ChannelId },

    #[error("channel with {0} already exists")]
    DuplicatedChannel(Address),

    #[error("channel is already closed")]
    ChannelAlreadyClosed,

    #[error("channel is already unlocked, it cannot be settled")]
    ChannelAlreadyUnlocked,

    #[error("local state can not be used to call settle")]
    SettleStateMismatch,

    #[error("settle reverted after the settlement window was over")]
    SettleRevertedAfterWindow,

    // Unrecoverable
    #[error("channel between {participant1} and {participant2} does not exist")]
    ChannelNonexistent {
        participant1: Address,
        participant2: Address,
    },

    #[error("{0} is not possible, the channel is settled")]
    ChannelSettled(Operation),

    #[error("channel is not in a closed state")]
    ChannelNotClosed,

    #[error("channel is not in a settled state, an unlock cannot be made")]
    ChannelNotSettled,

    #[error("channel is still open, it cannot be settled")]
    ChannelStillOpen,

    #[error("channel cannot be settled before the settlement window is over (block {current_block}, settle block {settle_block})")]
    SettleTooEarly {
        current_block: BlockNumber,
        settle_block: BlockNumber,
    },

    #[error("deposit amount decreased: on-chain deposit {on_chain} is above the requested total {requested}")]
    DepositDecreased {
        on_chain: TokenAmount,
        requested: TokenAmount,
    },

    #[error("creating new channel with {0} failed")]
    ChannelCreationFailed(Address),

    #[error("incompatible token network contract: deployed {deployed}, expected {expected}")]
    ContractVersionMismatch { deployed: String, expected: String },

    #[error("contract returned unknown channel state {0}")]
    InvalidChannelState(U256),

    // Transaction failures
    #[error("{operation} transaction {} reverted", receipt.transaction_hash)]
    TransactionFailed {
        operation: Operation,
        receipt: Receipt,
    },

    #[error("deposit transaction {} reverted: {cause}", receipt.transaction_hash)]
    DepositReverted {
        cause: DepositRevertCause,
        receipt: Receipt,
    },

    // Ledger
    #[error("call to '{0}' returned nothing")]
    EmptyCallResult(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ProxyError {
    pub fn kind(&self) -> ErrorKind {
        use ProxyError::*;

        match self {
            InvalidAddress(_)
            | InvalidSettleTimeout { .. }
            | SamePeerAddress
            | InvalidAmount(_)
            | InsufficientBalance { .. }
            | DepositMismatch { .. }
            | WithdrawMismatch { .. }
            | NotAParticipant(_)
            | Encoding(_)
            | Config(_) => ErrorKind::InvalidInput,

            ChannelNotFound { .. }
            | ChannelOutdated { .. }
            | DuplicatedChannel(_)
            | ChannelAlreadyClosed
            | ChannelAlreadyUnlocked
            | SettleStateMismatch
            | SettleRevertedAfterWindow => ErrorKind::Recoverable,

            ChannelNonexistent { .. }
            | ChannelSettled(_)
            | ChannelNotClosed
            | ChannelNotSettled
            | ChannelStillOpen
            | SettleTooEarly { .. }
            | DepositDecreased { .. }
            | ChannelCreationFailed(_)
            | ContractVersionMismatch { .. }
            | InvalidChannelState(_) => ErrorKind::Unrecoverable,

            TransactionFailed { .. } | DepositReverted { .. } => ErrorKind::TransactionFailed,

            EmptyCallResult(_) | Ledger(_) => ErrorKind::Ledger,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Recoverable
    }

    /// The receipt of the reverted transaction, if this error carries one.
    pub fn receipt(&self) -> Option<&Receipt> {
        match self {
            ProxyError::TransactionFailed { receipt, .. }
            | ProxyError::DepositReverted { receipt, .. } => Some(receipt),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packed::types::Hash;

    #[test]
    fn kinds() {
        assert_eq!(ProxyError::SamePeerAddress.kind(), ErrorKind::InvalidInput);
        assert!(ProxyError::ChannelAlreadyClosed.is_recoverable());
        assert!(ProxyError::ChannelOutdated {
            given: U256::from(1),
            on_chain: U256::from(2)
        }
        .is_recoverable());
        assert_eq!(
            ProxyError::ChannelSettled(Operation::Close).kind(),
            ErrorKind::Unrecoverable
        );
        assert_eq!(
            ProxyError::Ledger(LedgerError::Rpc("timeout".into())).kind(),
            ErrorKind::Ledger
        );
    }

    #[test]
    fn reverted_errors_carry_the_receipt() {
        let receipt = Receipt {
            transaction_hash: Hash([1; 32]),
            block_number: 10,
            gas_used: 21_000,
        };
        let err = ProxyError::TransactionFailed {
            operation: Operation::Close,
            receipt: receipt.clone(),
        };
        assert_eq!(err.kind(), ErrorKind::TransactionFailed);
        assert_eq!(err.receipt(), Some(&receipt));
        assert!(err.to_string().starts_with("close transaction 0x0101"));
        assert_eq!(ProxyError::ChannelStillOpen.receipt(), None);
    }

    #[test]
    fn operations_label_the_transaction() {
        let labels = [
            (Operation::Deposit, "deposit"),
            (Operation::Close, "close"),
            (Operation::UpdateTransfer, "update non-closing balance proof"),
            (Operation::Withdraw, "withdraw"),
            (Operation::Unlock, "unlock"),
            (Operation::Settle, "settle"),
        ];
        for (operation, label) in labels {
            assert_eq!(operation.to_string(), label);
        }
    }
}
