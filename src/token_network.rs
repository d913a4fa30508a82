//! Proxy for a deployed token network contract.
//!
//! A [TokenNetwork] holds no channel state of its own, every answer comes
//! from a fresh read through the [LedgerClient]. What it does hold are the
//! locks that keep concurrent operations of this node from racing each
//! other on-chain.

use tracing::info;

use crate::{
    channel::TransactionHash,
    config::{compatible_version, Config},
    error::{ProxyError, Result},
    ledger::{LedgerClient, LedgerError, Receipt, TokenProxy, Value},
    lock::{ChannelLocks, PendingOpens},
    packed::types::Address,
    sig::Signer,
};

mod checks;
mod filters;
mod lifecycle;
mod query;

pub use filters::CHANNEL_OPENED_EVENT;

#[cfg(test)]
mod tests;

/// Result of a mined transaction.
#[derive(Debug)]
enum Transaction {
    Mined(TransactionHash),
    Reverted(Receipt),
}

#[derive(Debug)]
pub struct TokenNetwork<L: LedgerClient, T: TokenProxy> {
    address: Address,
    node_address: Address,
    ledger: L,
    token: T,
    locks: ChannelLocks,
    opens: PendingOpens,
}

impl<L: LedgerClient, T: TokenProxy> TokenNetwork<L, T> {
    /// Bind to the contract at `config.token_network_address`, acting as the
    /// account of `signer`.
    ///
    /// Fails if the contract speaks another version than the configured one
    /// (unless the check is disabled) or if `token` is not the token the
    /// contract was deployed for.
    pub fn new(ledger: L, token: T, signer: &Signer, config: &Config) -> Result<Self> {
        let address = config.token_network_address;
        if address.is_zero() {
            return Err(ProxyError::InvalidAddress(
                "token network address must not be zero".to_string(),
            ));
        }

        let proxy = TokenNetwork {
            address,
            node_address: signer.address(),
            ledger,
            token,
            locks: ChannelLocks::new(),
            opens: PendingOpens::new(),
        };

        if config.check_contract_version {
            let deployed = proxy.contract_version()?;
            if !compatible_version(&deployed, &config.expected_contract_version) {
                return Err(ProxyError::ContractVersionMismatch {
                    deployed,
                    expected: config.expected_contract_version.clone(),
                });
            }
        }

        let token_address = proxy.token_address()?;
        if token_address != proxy.token.address() {
            return Err(ProxyError::InvalidAddress(format!(
                "token proxy is bound to {}, the token network uses {}",
                proxy.token.address(),
                token_address
            )));
        }

        info!(
            token_network = %proxy.address,
            node = %proxy.node_address,
            token = %token_address,
            "Token network proxy created"
        );
        Ok(proxy)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Address of the account this proxy acts for.
    pub fn node_address(&self) -> Address {
        self.node_address
    }

    /// Call a view function, treating an empty answer as an error.
    fn call_and_check(&self, function: &str, args: &[Value]) -> Result<Vec<Value>> {
        let values = self.ledger.call(self.address, function, args)?;
        if values.is_empty() {
            return Err(ProxyError::EmptyCallResult(function.to_string()));
        }
        Ok(values)
    }

    /// Submit a transaction and block until it is mined.
    fn transact(&self, function: &str, args: &[Value]) -> Result<Transaction> {
        let transaction_hash = self.ledger.submit(self.address, function, args)?;
        self.ledger.poll(transaction_hash)?;
        Ok(match self.ledger.transaction_reverted(transaction_hash)? {
            Some(receipt) => Transaction::Reverted(receipt),
            None => Transaction::Mined(transaction_hash),
        })
    }
}

/// The `index`th return value of `function`.
fn nth<'a>(values: &'a [Value], function: &str, index: usize) -> Result<&'a Value> {
    values.get(index).ok_or_else(|| {
        ProxyError::Ledger(LedgerError::MissingValue {
            function: function.to_string(),
            index,
        })
    })
}
