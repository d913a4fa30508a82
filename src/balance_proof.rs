//! Balance proofs as the token network contract sees them: the balance hash
//! commitment, the canonical settle argument order, lock packing for
//! `unlock`, and the signed messages the contract verifies.

use serde::{ser::SerializeTuple, Serialize, Serializer};

use crate::{
    channel::{
        AdditionalHash, BalanceHash, BlockNumber, ChainId, ChannelId, Locksroot, Nonce,
        ParticipantsDetails, TokenAmount,
    },
    packed::{
        self,
        types::{Address, Hash, Signature, U256},
        Keccak256Writer, Writer,
    },
    sig::{self, Signer},
};

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("encoding failed: {0}")]
    Encoding(#[from] packed::Error),
    #[error("signing failed: {0}")]
    Signature(#[from] sig::Error),
}

/// The three values a balance hash commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BalanceData {
    pub transferred_amount: TokenAmount,
    pub locked_amount: TokenAmount,
    pub locksroot: Locksroot,
}

impl BalanceData {
    pub fn new(transferred_amount: TokenAmount, locked_amount: TokenAmount, locksroot: Locksroot) -> Self {
        BalanceData {
            transferred_amount,
            locked_amount,
            locksroot,
        }
    }

    pub fn balance_hash(&self) -> BalanceHash {
        hash_balance_data(self.transferred_amount, self.locked_amount, self.locksroot)
    }

    /// `transferred_amount + locked_amount`, the value settle orders the
    /// participants by, as `(carry, low 256 bits)`. Tuples compare like the
    /// full 257 bit sum.
    pub fn total(&self) -> (bool, TokenAmount) {
        let (sum, carry) = self.transferred_amount.overflowing_add(self.locked_amount);
        (carry, sum)
    }
}

/// `keccak256(uint256 transferred ‖ uint256 locked ‖ bytes32 locksroot)`.
///
/// A participant that never sent a balance proof has the all-zero hash
/// on-chain, so the all-zero triple maps to it as well.
pub fn hash_balance_data(
    transferred_amount: TokenAmount,
    locked_amount: TokenAmount,
    locksroot: Locksroot,
) -> BalanceHash {
    if transferred_amount.is_zero() && locked_amount.is_zero() && locksroot.is_zero() {
        return Hash::default();
    }

    let mut writer = Keccak256Writer::default();
    for amount in [transferred_amount, locked_amount] {
        let mut slot = [0u8; 32];
        amount.to_big_endian(&mut slot);
        writer.write(&slot);
    }
    writer.write(&locksroot.0);
    writer.finalize()
}

/// Check that the claimed balance data of both sides reproduces the balance
/// hashes recorded on-chain. A single mismatch fails the whole check.
pub fn verify_settle_state(
    ours: &BalanceData,
    partner: &BalanceData,
    on_chain: &ParticipantsDetails,
) -> bool {
    let our_balance_hash_ok = ours.balance_hash() == on_chain.our_details.balance_hash;
    let partner_balance_hash_ok = partner.balance_hash() == on_chain.partner_details.balance_hash;
    our_balance_hash_ok && partner_balance_hash_ok
}

/// A participant together with the balance data it is settled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleParticipant {
    pub address: Address,
    pub balance: BalanceData,
}

/// Order the two participants the way `settleChannel` expects them.
///
/// The participant whose `transferred + locked` is strictly larger goes in
/// the second slot. On a tie our side stays first.
pub fn settle_order(
    ours: SettleParticipant,
    partner: SettleParticipant,
) -> (SettleParticipant, SettleParticipant) {
    if ours.balance.total() > partner.balance.total() {
        (partner, ours)
    } else {
        (ours, partner)
    }
}

/// A pending conditional transfer, unlocked after settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lock {
    pub amount: TokenAmount,
    pub expiration: BlockNumber,
    pub secrethash: Hash,
}

/// Packed as `uint256 expiration ‖ uint256 amount ‖ bytes32 secrethash`.
impl Serialize for Lock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_tuple(3)?;
        s.serialize_element(&U256::from(self.expiration))?;
        s.serialize_element(&self.amount)?;
        s.serialize_element(&self.secrethash)?;
        s.end()
    }
}

impl Lock {
    pub fn encoded(&self) -> Result<Vec<u8>, packed::Error> {
        packed::to_bytes(self)
    }

    /// Leaf of the locksroot merkle tree.
    pub fn lockhash(&self) -> Result<Hash, packed::Error> {
        packed::to_hash(self)
    }
}

/// Concatenate the encoded locks in the given order.
///
/// The contract recomputes the locksroot from this payload, so the order has
/// to match the one the locksroot was built from.
pub fn pack_locks(locks: &[Lock]) -> Result<Vec<u8>, packed::Error> {
    packed::to_bytes(locks)
}

/// Message type ids, part of every signed message so signatures cannot be
/// replayed across message kinds.
#[derive(Debug, Clone, Copy)]
enum MessageType {
    BalanceProof = 1,
    BalanceProofUpdate = 2,
    Withdraw = 3,
}

impl From<MessageType> for U256 {
    fn from(value: MessageType) -> Self {
        U256::from(value as u8)
    }
}

#[derive(Serialize)]
struct BalanceProofMessage {
    token_network: Address,
    chain_id: U256,
    msg_type: U256,
    channel_identifier: U256,
    balance_hash: Hash,
    nonce: U256,
    additional_hash: Hash,
}

#[derive(Serialize)]
struct BalanceProofUpdateMessage {
    balance_proof: BalanceProofMessage,
    closing_signature: Signature,
}

#[derive(Serialize)]
struct WithdrawMessage {
    token_network: Address,
    chain_id: U256,
    msg_type: U256,
    channel_identifier: U256,
    participant: Address,
    total_withdraw: U256,
}

/// The tuple `closeChannel` and `updateNonClosingBalanceProof` submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnChainBalanceProof {
    pub balance_hash: BalanceHash,
    pub nonce: Nonce,
    pub additional_hash: AdditionalHash,
    pub signature: Signature,
}

/// The signed part of a balance proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceProof {
    pub token_network: Address,
    pub chain_id: ChainId,
    pub channel_identifier: ChannelId,
    pub balance_hash: BalanceHash,
    pub nonce: Nonce,
    pub additional_hash: AdditionalHash,
}

impl BalanceProof {
    fn message(&self, msg_type: MessageType) -> BalanceProofMessage {
        BalanceProofMessage {
            token_network: self.token_network,
            chain_id: self.chain_id,
            msg_type: msg_type.into(),
            channel_identifier: self.channel_identifier,
            balance_hash: self.balance_hash,
            nonce: self.nonce,
            additional_hash: self.additional_hash,
        }
    }

    pub fn message_hash(&self) -> Result<Hash, packed::Error> {
        packed::to_hash(&self.message(MessageType::BalanceProof))
    }

    /// Hash the non-closing participant signs to countersign the closer's
    /// balance proof.
    pub fn update_message_hash(&self, closing_signature: &Signature) -> Result<Hash, packed::Error> {
        packed::to_hash(&BalanceProofUpdateMessage {
            balance_proof: self.message(MessageType::BalanceProofUpdate),
            closing_signature: *closing_signature,
        })
    }

    pub fn sign(&self, signer: &Signer) -> Result<OnChainBalanceProof, SignError> {
        let signature = signer.sign_eth(self.message_hash()?)?;
        Ok(OnChainBalanceProof {
            balance_hash: self.balance_hash,
            nonce: self.nonce,
            additional_hash: self.additional_hash,
            signature,
        })
    }

    pub fn sign_update(
        &self,
        signer: &Signer,
        closing_signature: &Signature,
    ) -> Result<Signature, SignError> {
        Ok(signer.sign_eth(self.update_message_hash(closing_signature)?)?)
    }

    pub fn recover_signer(&self, verifier: &Signer, signature: Signature) -> Result<Address, SignError> {
        Ok(verifier.recover_signer(self.message_hash()?, signature)?)
    }
}

/// Authorization of a participant to raise its total withdrawn amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawRequest {
    pub token_network: Address,
    pub chain_id: ChainId,
    pub channel_identifier: ChannelId,
    pub participant: Address,
    pub total_withdraw: TokenAmount,
}

impl WithdrawRequest {
    pub fn message_hash(&self) -> Result<Hash, packed::Error> {
        packed::to_hash(&WithdrawMessage {
            token_network: self.token_network,
            chain_id: self.chain_id,
            msg_type: MessageType::Withdraw.into(),
            channel_identifier: self.channel_identifier,
            participant: self.participant,
            total_withdraw: self.total_withdraw,
        })
    }

    pub fn sign(&self, signer: &Signer) -> Result<Signature, SignError> {
        Ok(signer.sign_eth(self.message_hash()?)?)
    }
}
