//! Proxy between a node and an on-chain token network contract of
//! two-party payment channels.
//!
//! [TokenNetwork] opens, funds, closes, settles and unlocks channels and
//! answers read-only questions about them. It never caches channel state,
//! serializes the operations of this node that would race on-chain, and
//! sorts every failure into a [ProxyError] the caller can act on.

pub mod packed {
    mod error;
    mod hashing;
    mod ser;

    pub mod types;

    pub use error::{Error, Result};
    pub use hashing::{keccak256, to_hash, Keccak256Writer};
    pub use ser::{to_bytes, to_writer, Serializer, Writer};

    #[cfg(test)]
    mod tests;
}
pub mod sig;

pub mod balance_proof;
pub mod channel;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lock;
mod token_network;

pub use config::Config;
pub use error::{ErrorKind, ProxyError, Result};
pub use packed::types::{Address, Hash, Signature, U256};
pub use token_network::{TokenNetwork, CHANNEL_OPENED_EVENT};
