//! Snapshots of on-chain channel state.
//!
//! Every value here is built fresh from a read against the token network
//! contract and never cached: the ledger is the single source of truth.

use core::fmt::Display;

use crate::packed::types::{Address, Hash, U256};

/// Identifier assigned to a channel by the token network contract. Zero
/// means "no channel".
pub type ChannelId = U256;

pub type TokenAmount = U256;
pub type Nonce = U256;
pub type ChainId = U256;
pub type BlockNumber = u64;
pub type BlockTimeout = u64;

/// Commitment to `(transferred_amount, locked_amount, locksroot)`.
pub type BalanceHash = Hash;
pub type Locksroot = Hash;
pub type AdditionalHash = Hash;
pub type TransactionHash = Hash;

/// Lifecycle of a channel as recorded by the contract.
///
/// The order of the variants is the order in which the contract moves a
/// channel through them, comparisons rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelState {
    NonExistent = 0,
    Opened = 1,
    Closed = 2,
    Settled = 3,
    Removed = 4,
}

impl ChannelState {
    /// Decode the contract's numeric state.
    pub fn from_u256(value: U256) -> Option<Self> {
        if value > U256::from(u8::MAX) {
            return None;
        }
        match value.low_u64() {
            0 => Some(ChannelState::NonExistent),
            1 => Some(ChannelState::Opened),
            2 => Some(ChannelState::Closed),
            3 => Some(ChannelState::Settled),
            4 => Some(ChannelState::Removed),
            _ => None,
        }
    }
}

impl Display for ChannelState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ChannelState::NonExistent => "nonexistent",
            ChannelState::Opened => "opened",
            ChannelState::Closed => "closed",
            ChannelState::Settled => "settled",
            ChannelState::Removed => "removed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelData {
    pub channel_identifier: ChannelId,
    /// Block after which a closed channel can be settled. Only meaningful
    /// while the channel is [ChannelState::Closed].
    pub settle_block_number: BlockNumber,
    pub state: ChannelState,
}

/// One side of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantDetails {
    pub address: Address,
    pub deposit: TokenAmount,
    pub withdrawn: TokenAmount,
    pub is_closer: bool,
    pub balance_hash: BalanceHash,
    pub nonce: Nonce,
}

/// Both sides of a channel, oriented so that the local node is always in
/// `our_details`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantsDetails {
    pub our_details: ParticipantDetails,
    pub partner_details: ParticipantDetails,
}

impl ParticipantsDetails {
    /// Address of the participant that closed the channel, if any.
    pub fn closer(&self) -> Option<Address> {
        if self.our_details.is_closer {
            Some(self.our_details.address)
        } else if self.partner_details.is_closer {
            Some(self.partner_details.address)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDetails {
    pub chain_id: ChainId,
    pub channel_data: ChannelData,
    pub participants_data: ParticipantsDetails,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered_by_lifecycle() {
        assert!(ChannelState::NonExistent < ChannelState::Opened);
        assert!(ChannelState::Opened < ChannelState::Closed);
        assert!(ChannelState::Closed < ChannelState::Settled);
        assert!(ChannelState::Settled < ChannelState::Removed);
    }

    #[test]
    fn state_decoding() {
        for state in [
            ChannelState::NonExistent,
            ChannelState::Opened,
            ChannelState::Closed,
            ChannelState::Settled,
            ChannelState::Removed,
        ] {
            assert_eq!(
                ChannelState::from_u256(U256::from(state as u8)),
                Some(state)
            );
        }
        assert_eq!(ChannelState::from_u256(U256::from(5)), None);
        assert_eq!(ChannelState::from_u256(U256::MAX), None);
    }

    #[test]
    fn closer_prefers_the_flagged_side() {
        let side = |address: u8, is_closer| ParticipantDetails {
            address: Address([address; 20]),
            deposit: U256::zero(),
            withdrawn: U256::zero(),
            is_closer,
            balance_hash: Hash::default(),
            nonce: U256::zero(),
        };

        let details = ParticipantsDetails {
            our_details: side(1, false),
            partner_details: side(2, true),
        };
        assert_eq!(details.closer(), Some(Address([2; 20])));

        let details = ParticipantsDetails {
            our_details: side(1, false),
            partner_details: side(2, false),
        };
        assert_eq!(details.closer(), None);
    }
}
