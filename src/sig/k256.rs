//! Signer using the k256 Rust crate (implementation of ecdsa in Rust).

use crate::packed::{
    keccak256,
    types::{Address, Hash, Signature},
};
use k256::{
    ecdsa::{
        recoverable,
        signature::{hazmat::PrehashSigner, Signature as k256Signature},
        SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
};
use super::eth_signed_message_hash;

pub use k256::ecdsa::Error;

/// Signing capability of the local node. Its address is the node's on-chain
/// identity.
pub struct Signer {
    key: SigningKey,
    addr: Address,
}

impl core::fmt::Debug for Signer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signer").field("addr", &self.addr).finish()
    }
}

impl From<&VerifyingKey> for Address {
    fn from(key: &VerifyingKey) -> Self {
        // Uncompressed SEC1 encoding: 0x04 ‖ x ‖ y. The address is the last
        // 20 bytes of the Keccak-256 of x ‖ y.
        let point = key.to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);

        let mut addr = Address::default();
        addr.0.copy_from_slice(&hash.0[12..]);
        addr
    }
}

impl Signer {
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        Self::from_key(SigningKey::random(rng))
    }

    /// Load a signer from a 32 byte secp256k1 secret key.
    pub fn from_bytes(secret: &[u8]) -> Result<Self, Error> {
        Ok(Self::from_key(SigningKey::from_bytes(secret)?))
    }

    fn from_key(key: SigningKey) -> Self {
        let addr = Address::from(&key.verifying_key());
        Self { key, addr }
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn sign_eth(&self, msg: Hash) -> Result<Signature, Error> {
        let hash = eth_signed_message_hash(msg);

        let sig: recoverable::Signature = self.key.sign_prehash(&hash.0)?;

        // r ‖ s ‖ v is already the layout we need, but the EVM expects v to
        // be offset by 27.
        let mut sig_bytes: [u8; 65] = sig.as_bytes().try_into().map_err(|_| Error::new())?;
        sig_bytes[64] += 27;

        Ok(Signature(sig_bytes))
    }

    pub fn recover_signer(&self, msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
        let hash = eth_signed_message_hash(msg);

        // Undo adding the 27, to go back to the format expected below
        let mut sig_bytes: [u8; 65] = eth_sig.0;
        sig_bytes[64] = sig_bytes[64].checked_sub(27).ok_or_else(Error::new)?;

        let sig = recoverable::Signature::from_bytes(&sig_bytes)?;

        let verifying_key = sig.recover_verifying_key_from_digest_bytes(&hash.0.into())?;
        Ok(Address::from(&verifying_key))
    }
}
