//! Boundary to the remote ledger.
//!
//! The proxy talks to the chain exclusively through [LedgerClient] (contract
//! calls and transactions of the node's account) and [TokenProxy] (the token
//! the channels are denominated in). ABI encoding of arguments and return
//! values is the client's business, the proxy deals in [Value]s.

use core::fmt::Display;
use std::sync::Arc;

use crate::{
    channel::{BlockNumber, TokenAmount, TransactionHash},
    packed::types::{Address, Hash, Signature, U256},
};

/// Argument or return value of a contract function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Uint(U256),
    Bool(bool),
    Address(Address),
    Bytes32(Hash),
    Bytes(Vec<u8>),
    String(String),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Uint(_) => "uint256",
            Value::Bool(_) => "bool",
            Value::Address(_) => "address",
            Value::Bytes32(_) => "bytes32",
            Value::Bytes(_) => "bytes",
            Value::String(_) => "string",
        }
    }

    fn unexpected(&self, expected: &'static str) -> LedgerError {
        LedgerError::UnexpectedValue {
            expected,
            found: self.kind(),
        }
    }

    pub fn as_uint(&self) -> Result<U256, LedgerError> {
        match self {
            Value::Uint(v) => Ok(*v),
            other => Err(other.unexpected("uint256")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, LedgerError> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Err(other.unexpected("bool")),
        }
    }

    pub fn as_address(&self) -> Result<Address, LedgerError> {
        match self {
            Value::Address(v) => Ok(*v),
            // Some clients hand back addresses as raw bytes.
            Value::Bytes(bytes) => Address::from_slice(bytes)
                .map_err(|e| LedgerError::Rpc(format!("malformed address: {}", e))),
            other => Err(other.unexpected("address")),
        }
    }

    pub fn as_hash(&self) -> Result<Hash, LedgerError> {
        match self {
            Value::Bytes32(v) => Ok(*v),
            other => Err(other.unexpected("bytes32")),
        }
    }

    pub fn as_str(&self) -> Result<&str, LedgerError> {
        match self {
            Value::String(v) => Ok(v),
            other => Err(other.unexpected("string")),
        }
    }
}

impl From<U256> for Value {
    fn from(v: U256) -> Self {
        Value::Uint(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(U256::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Address> for Value {
    fn from(v: Address) -> Self {
        Value::Address(v)
    }
}

impl From<Hash> for Value {
    fn from(v: Hash) -> Self {
        Value::Bytes32(v)
    }
}

impl From<Signature> for Value {
    fn from(v: Signature) -> Self {
        Value::Bytes(v.0.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// Receipt of a mined transaction, kept for diagnostics when it reverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: TransactionHash,
    pub block_number: BlockNumber,
    pub gas_used: u64,
}

/// Block bound of an event filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSpec {
    Number(BlockNumber),
    Earliest,
    Latest,
    Pending,
}

impl Display for BlockSpec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BlockSpec::Number(n) => write!(f, "{}", n),
            BlockSpec::Earliest => f.write_str("earliest"),
            BlockSpec::Latest => f.write_str("latest"),
            BlockSpec::Pending => f.write_str("pending"),
        }
    }
}

/// Handle of an installed event filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(pub U256);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("expected {expected} value, got {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },

    #[error("missing return value #{index} of {function}")]
    MissingValue { function: String, index: usize },

    #[error("unknown transaction {0}")]
    UnknownTransaction(TransactionHash),
}

/// Remote ledger client bound to the node's account.
pub trait LedgerClient: Send + Sync {
    /// Evaluate a read-only contract function at the latest block.
    fn call(
        &self,
        contract: Address,
        function: &str,
        args: &[Value],
    ) -> Result<Vec<Value>, LedgerError>;

    /// Sign and broadcast a transaction calling `function`.
    fn submit(
        &self,
        contract: Address,
        function: &str,
        args: &[Value],
    ) -> Result<TransactionHash, LedgerError>;

    /// Block until the transaction is mined.
    fn poll(&self, transaction: TransactionHash) -> Result<(), LedgerError>;

    /// `Some(receipt)` if the mined transaction reverted.
    fn transaction_reverted(
        &self,
        transaction: TransactionHash,
    ) -> Result<Option<Receipt>, LedgerError>;

    fn block_number(&self) -> Result<BlockNumber, LedgerError>;

    /// Install a log filter on `contract`. `None` topics match all events.
    fn new_filter(
        &self,
        contract: Address,
        topics: Option<&[Hash]>,
        from_block: BlockSpec,
        to_block: BlockSpec,
    ) -> Result<FilterId, LedgerError>;
}

/// The fungible token contract backing the channels.
pub trait TokenProxy: Send + Sync {
    fn address(&self) -> Address;
    fn balance_of(&self, owner: Address) -> Result<TokenAmount, LedgerError>;
    fn allowance(&self, owner: Address, spender: Address) -> Result<TokenAmount, LedgerError>;
    /// Set the allowance of `spender` over the node's tokens.
    fn approve(&self, spender: Address, amount: TokenAmount) -> Result<(), LedgerError>;
}

impl<L: LedgerClient + ?Sized> LedgerClient for Arc<L> {
    fn call(
        &self,
        contract: Address,
        function: &str,
        args: &[Value],
    ) -> Result<Vec<Value>, LedgerError> {
        (**self).call(contract, function, args)
    }

    fn submit(
        &self,
        contract: Address,
        function: &str,
        args: &[Value],
    ) -> Result<TransactionHash, LedgerError> {
        (**self).submit(contract, function, args)
    }

    fn poll(&self, transaction: TransactionHash) -> Result<(), LedgerError> {
        (**self).poll(transaction)
    }

    fn transaction_reverted(
        &self,
        transaction: TransactionHash,
    ) -> Result<Option<Receipt>, LedgerError> {
        (**self).transaction_reverted(transaction)
    }

    fn block_number(&self) -> Result<BlockNumber, LedgerError> {
        (**self).block_number()
    }

    fn new_filter(
        &self,
        contract: Address,
        topics: Option<&[Hash]>,
        from_block: BlockSpec,
        to_block: BlockSpec,
    ) -> Result<FilterId, LedgerError> {
        (**self).new_filter(contract, topics, from_block, to_block)
    }
}

impl<T: TokenProxy + ?Sized> TokenProxy for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    fn balance_of(&self, owner: Address) -> Result<TokenAmount, LedgerError> {
        (**self).balance_of(owner)
    }

    fn allowance(&self, owner: Address, spender: Address) -> Result<TokenAmount, LedgerError> {
        (**self).allowance(owner, spender)
    }

    fn approve(&self, spender: Address, amount: TokenAmount) -> Result<(), LedgerError> {
        (**self).approve(spender, amount)
    }
}
