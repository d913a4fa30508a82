//! State checks run before a transaction is sent and, after a revert, to
//! find out what the contract objected to.

use super::TokenNetwork;
use crate::{
    channel::{ChannelId, ChannelState, TokenAmount},
    error::{Operation, ProxyError, Result},
    ledger::{LedgerClient, Receipt, TokenProxy},
    packed::types::Address,
};

impl<L: LedgerClient, T: TokenProxy> TokenNetwork<L, T> {
    /// Fail if the pair currently has a live channel other than
    /// `channel_identifier`. No live channel at all passes.
    pub(super) fn check_for_outdated_channel(
        &self,
        partner: Address,
        channel_identifier: ChannelId,
    ) -> Result<()> {
        let on_chain = match self.channel_data(self.node_address, partner, None) {
            Ok(data) => data.channel_identifier,
            Err(ProxyError::ChannelNotFound { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        if on_chain != channel_identifier {
            return Err(ProxyError::ChannelOutdated {
                given: channel_identifier,
                on_chain,
            });
        }
        Ok(())
    }

    /// Shared by close, deposit and withdraw: only an opened channel passes.
    pub(super) fn check_channel_state_for_close(
        &self,
        partner: Address,
        channel_identifier: ChannelId,
        operation: Operation,
    ) -> Result<()> {
        let data = self.channel_data(self.node_address, partner, Some(channel_identifier))?;
        match data.state {
            ChannelState::NonExistent | ChannelState::Removed => {
                Err(ProxyError::ChannelNonexistent {
                    participant1: self.node_address,
                    participant2: partner,
                })
            }
            ChannelState::Settled => Err(ProxyError::ChannelSettled(operation)),
            ChannelState::Closed => Err(ProxyError::ChannelAlreadyClosed),
            ChannelState::Opened => Ok(()),
        }
    }

    /// After the close checks, an on-chain deposit above `total_deposit`
    /// means another deposit of this account overtook ours and is reported
    /// as [ProxyError::DepositDecreased]. Only this direction counts: a
    /// reverted deposit leaves the on-chain total below the requested one,
    /// which is not a decrease.
    pub(super) fn check_channel_state_for_deposit(
        &self,
        partner: Address,
        channel_identifier: ChannelId,
        total_deposit: TokenAmount,
    ) -> Result<()> {
        self.check_channel_state_for_close(partner, channel_identifier, Operation::Deposit)?;

        let on_chain = self
            .participant_data(channel_identifier, self.node_address, partner)?
            .deposit;
        if on_chain > total_deposit {
            return Err(ProxyError::DepositDecreased {
                on_chain,
                requested: total_deposit,
            });
        }
        Ok(())
    }

    pub(super) fn check_channel_state_for_withdraw(
        &self,
        partner: Address,
        channel_identifier: ChannelId,
        total_withdraw: TokenAmount,
    ) -> Result<()> {
        let withdrawn = self
            .participant_data(channel_identifier, self.node_address, partner)?
            .withdrawn;
        if withdrawn > total_withdraw {
            return Err(ProxyError::WithdrawMismatch {
                current: withdrawn,
                requested: total_withdraw,
            });
        }

        self.check_channel_state_for_close(partner, channel_identifier, Operation::Withdraw)
    }

    /// Why a `settleChannel` transaction reverted. A channel that reads back
    /// as nonexistent gives no cause, the revert is reported as is.
    pub(super) fn settle_revert_cause(
        &self,
        partner: Address,
        channel_identifier: ChannelId,
        receipt: Receipt,
    ) -> ProxyError {
        let data = match self.channel_data(self.node_address, partner, Some(channel_identifier)) {
            Ok(data) => data,
            Err(e) => return e,
        };

        match data.state {
            ChannelState::Settled => ProxyError::ChannelSettled(Operation::Settle),
            ChannelState::Removed => ProxyError::ChannelAlreadyUnlocked,
            ChannelState::Opened => ProxyError::ChannelStillOpen,
            ChannelState::Closed => match self.ledger.block_number() {
                Ok(current_block) if current_block < data.settle_block_number => {
                    ProxyError::SettleTooEarly {
                        current_block,
                        settle_block: data.settle_block_number,
                    }
                }
                Ok(_) => ProxyError::SettleRevertedAfterWindow,
                Err(e) => e.into(),
            },
            ChannelState::NonExistent => ProxyError::TransactionFailed {
                operation: Operation::Settle,
                receipt,
            },
        }
    }
}
