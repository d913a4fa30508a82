//! Read-only views of the token network contract. Nothing is cached.

use super::{nth, TokenNetwork};
use crate::{
    channel::{
        BlockNumber, BlockTimeout, ChainId, ChannelData, ChannelDetails, ChannelId, ChannelState,
        ParticipantDetails, ParticipantsDetails,
    },
    error::{ProxyError, Result},
    ledger::{LedgerClient, LedgerError, TokenProxy, Value},
    packed::types::{Address, U256},
};

/// Map "no channel between the two" to `default`, keep every other error.
fn or_if_not_found<V>(result: Result<V>, default: V) -> Result<V> {
    match result {
        Err(ProxyError::ChannelNotFound { .. }) => Ok(default),
        other => other,
    }
}

fn to_block(value: U256) -> Result<u64> {
    if value.bits() > 64 {
        return Err(ProxyError::Ledger(LedgerError::UnexpectedValue {
            expected: "uint64",
            found: "uint256",
        }));
    }
    Ok(value.low_u64())
}

impl<L: LedgerClient, T: TokenProxy> TokenNetwork<L, T> {
    fn call_single(&self, function: &str, args: &[Value]) -> Result<Value> {
        let values = self.call_and_check(function, args)?;
        Ok(nth(&values, function, 0)?.clone())
    }

    /// The token the channels of this network hold.
    pub fn token_address(&self) -> Result<Address> {
        Ok(self.call_single("token", &[])?.as_address()?)
    }

    pub fn chain_id(&self) -> Result<ChainId> {
        Ok(self.call_single("chain_id", &[])?.as_uint()?)
    }

    pub fn settlement_timeout_min(&self) -> Result<BlockTimeout> {
        to_block(self.call_single("settlement_timeout_min", &[])?.as_uint()?)
    }

    pub fn settlement_timeout_max(&self) -> Result<BlockTimeout> {
        to_block(self.call_single("settlement_timeout_max", &[])?.as_uint()?)
    }

    pub fn contract_version(&self) -> Result<String> {
        Ok(self
            .call_single("contract_version", &[])?
            .as_str()?
            .to_string())
    }

    /// Identifier of the channel between `participant1` and `participant2`.
    ///
    /// A non-zero `hint` is taken as is, otherwise the contract is asked for
    /// the currently live channel of the pair.
    pub fn resolve_channel_identifier(
        &self,
        participant1: Address,
        participant2: Address,
        hint: Option<ChannelId>,
    ) -> Result<ChannelId> {
        let channel_identifier = match hint {
            Some(id) if !id.is_zero() => id,
            _ => self
                .call_single(
                    "getChannelIdentifier",
                    &[Value::from(participant1), participant2.into()],
                )?
                .as_uint()?,
        };

        if channel_identifier.is_zero() {
            return Err(ProxyError::ChannelNotFound {
                participant1,
                participant2,
            });
        }
        Ok(channel_identifier)
    }

    pub fn channel_data(
        &self,
        participant1: Address,
        participant2: Address,
        channel_identifier: Option<ChannelId>,
    ) -> Result<ChannelData> {
        let channel_identifier =
            self.resolve_channel_identifier(participant1, participant2, channel_identifier)?;

        const FUNCTION: &str = "getChannelInfo";
        let values = self.call_and_check(
            FUNCTION,
            &[
                Value::from(channel_identifier),
                participant1.into(),
                participant2.into(),
            ],
        )?;
        let settle_block_number = to_block(nth(&values, FUNCTION, 0)?.as_uint()?)?;
        let raw_state = nth(&values, FUNCTION, 1)?.as_uint()?;
        let state =
            ChannelState::from_u256(raw_state).ok_or(ProxyError::InvalidChannelState(raw_state))?;

        Ok(ChannelData {
            channel_identifier,
            settle_block_number,
            state,
        })
    }

    /// What the contract records about `participant` in the channel with
    /// `partner`.
    pub fn participant_data(
        &self,
        channel_identifier: ChannelId,
        participant: Address,
        partner: Address,
    ) -> Result<ParticipantDetails> {
        const FUNCTION: &str = "getChannelParticipantInfo";
        let values = self.call_and_check(
            FUNCTION,
            &[
                Value::from(channel_identifier),
                participant.into(),
                partner.into(),
            ],
        )?;

        Ok(ParticipantDetails {
            address: participant,
            deposit: nth(&values, FUNCTION, 0)?.as_uint()?,
            withdrawn: nth(&values, FUNCTION, 1)?.as_uint()?,
            is_closer: nth(&values, FUNCTION, 2)?.as_bool()?,
            balance_hash: nth(&values, FUNCTION, 3)?.as_hash()?,
            nonce: nth(&values, FUNCTION, 4)?.as_uint()?,
        })
    }

    /// The partner of this node among the two participants.
    fn partner_of(&self, participant1: Address, participant2: Address) -> Result<Address> {
        if participant1 == self.node_address {
            Ok(participant2)
        } else if participant2 == self.node_address {
            Ok(participant1)
        } else {
            Err(ProxyError::NotAParticipant(self.node_address))
        }
    }

    /// Both sides of the channel, with this node in `our_details` whatever
    /// the argument order.
    pub fn participants_data(
        &self,
        participant1: Address,
        participant2: Address,
        channel_identifier: Option<ChannelId>,
    ) -> Result<ParticipantsDetails> {
        let partner = self.partner_of(participant1, participant2)?;
        let channel_identifier =
            self.resolve_channel_identifier(participant1, participant2, channel_identifier)?;

        Ok(ParticipantsDetails {
            our_details: self.participant_data(channel_identifier, self.node_address, partner)?,
            partner_details: self.participant_data(channel_identifier, partner, self.node_address)?,
        })
    }

    pub fn full_detail(
        &self,
        participant1: Address,
        participant2: Address,
        channel_identifier: Option<ChannelId>,
    ) -> Result<ChannelDetails> {
        let partner = self.partner_of(participant1, participant2)?;
        let channel_data = self.channel_data(self.node_address, partner, channel_identifier)?;
        let participants_data = self.participants_data(
            self.node_address,
            partner,
            Some(channel_data.channel_identifier),
        )?;

        Ok(ChannelDetails {
            chain_id: self.chain_id()?,
            channel_data,
            participants_data,
        })
    }

    pub fn settle_block_number(
        &self,
        participant1: Address,
        participant2: Address,
        channel_identifier: Option<ChannelId>,
    ) -> Result<BlockNumber> {
        Ok(self
            .channel_data(participant1, participant2, channel_identifier)?
            .settle_block_number)
    }

    fn channel_state(
        &self,
        participant1: Address,
        participant2: Address,
        channel_identifier: Option<ChannelId>,
    ) -> Result<ChannelState> {
        Ok(self
            .channel_data(participant1, participant2, channel_identifier)?
            .state)
    }

    /// Whether a channel exists that is not settled yet (opened or closed).
    pub fn channel_exists_and_not_settled(
        &self,
        participant1: Address,
        participant2: Address,
        channel_identifier: Option<ChannelId>,
    ) -> Result<bool> {
        let state = self.channel_state(participant1, participant2, channel_identifier);
        or_if_not_found(
            state.map(|s| s > ChannelState::NonExistent && s < ChannelState::Settled),
            false,
        )
    }

    pub fn is_opened(
        &self,
        participant1: Address,
        participant2: Address,
        channel_identifier: Option<ChannelId>,
    ) -> Result<bool> {
        let state = self.channel_state(participant1, participant2, channel_identifier);
        or_if_not_found(state.map(|s| s == ChannelState::Opened), false)
    }

    pub fn is_closed(
        &self,
        participant1: Address,
        participant2: Address,
        channel_identifier: Option<ChannelId>,
    ) -> Result<bool> {
        let state = self.channel_state(participant1, participant2, channel_identifier);
        or_if_not_found(state.map(|s| s == ChannelState::Closed), false)
    }

    /// Settled or already removed after settlement.
    pub fn is_settled(
        &self,
        participant1: Address,
        participant2: Address,
        channel_identifier: Option<ChannelId>,
    ) -> Result<bool> {
        let state = self.channel_state(participant1, participant2, channel_identifier);
        or_if_not_found(state.map(|s| s >= ChannelState::Settled), false)
    }

    /// The participant that closed the channel. `None` while it is open and
    /// once it is settled.
    pub fn closing_address(
        &self,
        participant1: Address,
        participant2: Address,
        channel_identifier: Option<ChannelId>,
    ) -> Result<Option<Address>> {
        let channel_data =
            match self.channel_data(participant1, participant2, channel_identifier) {
                Ok(data) => data,
                Err(ProxyError::ChannelNotFound { .. }) => return Ok(None),
                Err(e) => return Err(e),
            };

        if channel_data.state >= ChannelState::Settled {
            return Ok(None);
        }

        let participants = self.participants_data(
            participant1,
            participant2,
            Some(channel_data.channel_identifier),
        )?;
        Ok(participants.closer())
    }

    /// Whether `participant1` can send to `participant2`: the channel is
    /// open and `participant1` has deposited something.
    pub fn can_transfer(
        &self,
        participant1: Address,
        participant2: Address,
        channel_identifier: Option<ChannelId>,
    ) -> Result<bool> {
        let channel_identifier =
            match self.resolve_channel_identifier(participant1, participant2, channel_identifier) {
                Ok(id) => id,
                Err(ProxyError::ChannelNotFound { .. }) => return Ok(false),
                Err(e) => return Err(e),
            };

        if !self.is_opened(participant1, participant2, Some(channel_identifier))? {
            return Ok(false);
        }

        let deposit = self
            .participant_data(channel_identifier, participant1, participant2)?
            .deposit;
        Ok(!deposit.is_zero())
    }
}
