//! Operations that change channel state on-chain.
//!
//! Each one follows the same shape: validate the arguments, make sure the
//! caller is not working with a stale channel identifier, take the partner
//! lock, submit, and on a revert re-read the channel to tell the caller why.

use tracing::{debug, error, info};

use super::{TokenNetwork, Transaction};
use crate::{
    balance_proof::{
        pack_locks, settle_order, verify_settle_state, BalanceData, Lock, OnChainBalanceProof,
        SettleParticipant,
    },
    channel::{BlockTimeout, ChannelId, TokenAmount, TransactionHash},
    error::{DepositRevertCause, Operation, ProxyError, Result},
    ledger::{LedgerClient, TokenProxy, Value},
    lock::OpenTicket,
    packed::types::{Address, Signature},
};

impl<L: LedgerClient, T: TokenProxy> TokenNetwork<L, T> {
    /// Open a channel with `partner` and return its identifier.
    ///
    /// Concurrent calls for the same partner share a single `openChannel`
    /// transaction and all return the same identifier (or error).
    pub fn open(&self, partner: Address, settle_timeout: BlockTimeout) -> Result<ChannelId> {
        if partner.is_zero() {
            return Err(ProxyError::InvalidAddress(
                "channel partner must not be the zero address".to_string(),
            ));
        }

        let min = self.settlement_timeout_min()?;
        let max = self.settlement_timeout_max()?;
        if settle_timeout < min || settle_timeout > max {
            return Err(ProxyError::InvalidSettleTimeout {
                min,
                max,
                given: settle_timeout,
            });
        }

        if partner == self.node_address {
            return Err(ProxyError::SamePeerAddress);
        }

        info!(
            token_network = %self.address,
            node = %self.node_address,
            %partner,
            settle_timeout,
            "Open channel called"
        );

        let transaction_hash = match self.opens.begin(partner) {
            OpenTicket::Leader(leader) => {
                leader.publish(self.open_channel_transaction(partner, settle_timeout))?
            }
            OpenTicket::Follower(follower) => {
                debug!(%partner, "Joining pending channel open");
                follower.wait()?
            }
        };

        if !self.channel_exists_and_not_settled(self.node_address, partner, None)? {
            error!(
                node = %self.node_address,
                %partner,
                "Creating new channel failed"
            );
            return Err(ProxyError::ChannelCreationFailed(partner));
        }

        let channel_identifier = self
            .channel_data(self.node_address, partner, None)?
            .channel_identifier;

        info!(
            token_network = %self.address,
            node = %self.node_address,
            %partner,
            %channel_identifier,
            %transaction_hash,
            "Open channel successful"
        );
        Ok(channel_identifier)
    }

    fn open_channel_transaction(
        &self,
        partner: Address,
        settle_timeout: BlockTimeout,
    ) -> Result<TransactionHash> {
        if self.channel_exists_and_not_settled(self.node_address, partner, None)? {
            return Err(ProxyError::DuplicatedChannel(partner));
        }

        let args = [
            Value::from(self.node_address),
            partner.into(),
            settle_timeout.into(),
        ];
        match self.transact("openChannel", &args)? {
            Transaction::Mined(transaction_hash) => Ok(transaction_hash),
            Transaction::Reverted(receipt) => {
                error!(
                    %partner,
                    transaction = %receipt.transaction_hash,
                    "Open channel failed"
                );
                Err(ProxyError::DuplicatedChannel(partner))
            }
        }
    }

    /// Raise this node's deposit in the channel to `total_deposit`.
    ///
    /// The contract only accepts increasing totals, a repeated or racing
    /// call therefore never deposits twice.
    pub fn set_total_deposit(
        &self,
        channel_identifier: ChannelId,
        total_deposit: TokenAmount,
        partner: Address,
    ) -> Result<()> {
        self.check_for_outdated_channel(partner, channel_identifier)?;

        let _channel = self.locks.acquire(partner);
        // Balance check, approve and deposit must not interleave with a
        // deposit into another channel of the same token.
        let _deposit = self.locks.acquire_deposit();

        let current_deposit = self
            .participant_data(channel_identifier, self.node_address, partner)?
            .deposit;
        if total_deposit < current_deposit {
            return Err(ProxyError::DepositMismatch {
                current: current_deposit,
                requested: total_deposit,
            });
        }

        let amount_to_deposit = total_deposit - current_deposit;
        if amount_to_deposit.is_zero() {
            return Err(ProxyError::InvalidAmount(format!(
                "deposit {} must be greater than 0",
                amount_to_deposit
            )));
        }

        let balance = self.token.balance_of(self.node_address)?;
        if balance < amount_to_deposit {
            return Err(ProxyError::InsufficientBalance {
                required: amount_to_deposit,
                available: balance,
            });
        }

        self.token.approve(self.address, amount_to_deposit)?;

        info!(
            token_network = %self.address,
            node = %self.node_address,
            %partner,
            %total_deposit,
            %amount_to_deposit,
            "Deposit called"
        );

        let args = [
            Value::from(channel_identifier),
            self.node_address.into(),
            total_deposit.into(),
            partner.into(),
        ];
        match self.transact("setTotalDeposit", &args)? {
            Transaction::Mined(_) => {
                info!(
                    token_network = %self.address,
                    %partner,
                    %total_deposit,
                    "Deposit successful"
                );
                Ok(())
            }
            Transaction::Reverted(receipt) => {
                let cause = self.deposit_revert_cause(amount_to_deposit)?;
                error!(
                    token_network = %self.address,
                    %partner,
                    %total_deposit,
                    %amount_to_deposit,
                    %cause,
                    "Deposit failed"
                );

                self.check_channel_state_for_deposit(partner, channel_identifier, total_deposit)?;
                Err(ProxyError::DepositReverted { cause, receipt })
            }
        }
    }

    fn deposit_revert_cause(&self, amount_to_deposit: TokenAmount) -> Result<DepositRevertCause> {
        if self.token.allowance(self.node_address, self.address)? < amount_to_deposit {
            Ok(DepositRevertCause::AllowanceConsumed)
        } else if self.token.balance_of(self.node_address)? < amount_to_deposit {
            Ok(DepositRevertCause::InsufficientFunds)
        } else {
            Ok(DepositRevertCause::Unknown)
        }
    }

    /// Close the channel with the partner's latest balance proof.
    pub fn close(
        &self,
        channel_identifier: ChannelId,
        partner: Address,
        balance_proof: &OnChainBalanceProof,
    ) -> Result<()> {
        info!(
            token_network = %self.address,
            node = %self.node_address,
            %partner,
            nonce = %balance_proof.nonce,
            balance_hash = %balance_proof.balance_hash,
            additional_hash = %balance_proof.additional_hash,
            "Close called"
        );

        self.check_for_outdated_channel(partner, channel_identifier)?;

        let _channel = self.locks.acquire(partner);
        self.check_channel_state_for_close(partner, channel_identifier, Operation::Close)?;

        let args = [
            Value::from(channel_identifier),
            partner.into(),
            balance_proof.balance_hash.into(),
            balance_proof.nonce.into(),
            balance_proof.additional_hash.into(),
            balance_proof.signature.into(),
        ];
        match self.transact("closeChannel", &args)? {
            Transaction::Mined(_) => {
                info!(token_network = %self.address, %partner, "Close successful");
                Ok(())
            }
            Transaction::Reverted(receipt) => {
                error!(token_network = %self.address, %partner, "Close failed");
                self.check_channel_state_for_close(partner, channel_identifier, Operation::Close)?;
                Err(ProxyError::TransactionFailed {
                    operation: Operation::Close,
                    receipt,
                })
            }
        }
    }

    /// Submit the partner's balance proof, countersigned by this node, to a
    /// channel the partner closed.
    pub fn update_transfer(
        &self,
        channel_identifier: ChannelId,
        partner: Address,
        balance_proof: &OnChainBalanceProof,
        non_closing_signature: Signature,
    ) -> Result<()> {
        info!(
            token_network = %self.address,
            node = %self.node_address,
            %partner,
            nonce = %balance_proof.nonce,
            balance_hash = %balance_proof.balance_hash,
            "Update non-closing balance proof called"
        );

        self.check_for_outdated_channel(partner, channel_identifier)?;

        let _channel = self.locks.acquire(partner);
        let args = [
            Value::from(channel_identifier),
            partner.into(),
            self.node_address.into(),
            balance_proof.balance_hash.into(),
            balance_proof.nonce.into(),
            balance_proof.additional_hash.into(),
            balance_proof.signature.into(),
            non_closing_signature.into(),
        ];
        match self.transact("updateNonClosingBalanceProof", &args)? {
            Transaction::Mined(_) => {
                info!(
                    token_network = %self.address,
                    %partner,
                    "Update non-closing balance proof successful"
                );
                Ok(())
            }
            Transaction::Reverted(receipt) => {
                error!(
                    token_network = %self.address,
                    %partner,
                    "Update non-closing balance proof failed"
                );
                if !self.is_closed(self.node_address, partner, Some(channel_identifier))? {
                    return Err(ProxyError::ChannelNotClosed);
                }
                Err(ProxyError::TransactionFailed {
                    operation: Operation::UpdateTransfer,
                    receipt,
                })
            }
        }
    }

    /// Raise this node's withdrawn total to `total_withdraw`.
    pub fn withdraw(
        &self,
        channel_identifier: ChannelId,
        partner: Address,
        total_withdraw: TokenAmount,
        partner_signature: Signature,
        signature: Signature,
    ) -> Result<()> {
        info!(
            token_network = %self.address,
            node = %self.node_address,
            %partner,
            %total_withdraw,
            "Withdraw called"
        );

        self.check_for_outdated_channel(partner, channel_identifier)?;

        let _channel = self.locks.acquire(partner);

        let current_withdraw = self
            .participant_data(channel_identifier, self.node_address, partner)?
            .withdrawn;
        if total_withdraw < current_withdraw {
            return Err(ProxyError::WithdrawMismatch {
                current: current_withdraw,
                requested: total_withdraw,
            });
        }

        let amount_to_withdraw = total_withdraw - current_withdraw;
        if amount_to_withdraw.is_zero() {
            return Err(ProxyError::InvalidAmount(format!(
                "withdraw {} must be greater than 0",
                amount_to_withdraw
            )));
        }

        let args = [
            Value::from(channel_identifier),
            self.node_address.into(),
            total_withdraw.into(),
            partner_signature.into(),
            signature.into(),
        ];
        match self.transact("setTotalWithdraw", &args)? {
            Transaction::Mined(_) => {
                info!(
                    token_network = %self.address,
                    %partner,
                    %total_withdraw,
                    "Withdraw successful"
                );
                Ok(())
            }
            Transaction::Reverted(receipt) => {
                error!(
                    token_network = %self.address,
                    %partner,
                    %total_withdraw,
                    "Withdraw failed"
                );
                self.check_channel_state_for_withdraw(partner, channel_identifier, total_withdraw)?;
                Err(ProxyError::TransactionFailed {
                    operation: Operation::Withdraw,
                    receipt,
                })
            }
        }
    }

    /// Claim the pending locks of a settled channel. The locks must be in
    /// the order their locksroot was computed from.
    pub fn unlock(
        &self,
        channel_identifier: ChannelId,
        partner: Address,
        locks: &[Lock],
    ) -> Result<()> {
        if locks.is_empty() {
            debug!(
                token_network = %self.address,
                %partner,
                "Skipping unlock, no pending locks"
            );
            return Ok(());
        }

        info!(
            token_network = %self.address,
            node = %self.node_address,
            %partner,
            locks = locks.len(),
            "Unlock called"
        );

        let packed_locks = pack_locks(locks)?;

        let _channel = self.locks.acquire(partner);
        let args = [
            Value::from(channel_identifier),
            self.node_address.into(),
            partner.into(),
            packed_locks.into(),
        ];
        match self.transact("unlock", &args)? {
            Transaction::Mined(_) => {
                info!(token_network = %self.address, %partner, "Unlock successful");
                Ok(())
            }
            Transaction::Reverted(receipt) => {
                if !self.is_settled(self.node_address, partner, Some(channel_identifier))? {
                    error!(
                        token_network = %self.address,
                        %partner,
                        "Unlock failed, channel is not settled"
                    );
                    return Err(ProxyError::ChannelNotSettled);
                }
                error!(token_network = %self.address, %partner, "Unlock failed");
                Err(ProxyError::TransactionFailed {
                    operation: Operation::Unlock,
                    receipt,
                })
            }
        }
    }

    /// Settle a closed channel whose settlement window is over.
    ///
    /// `ours` and `theirs` must reproduce the balance hashes the contract
    /// recorded for each side, otherwise nothing is submitted.
    pub fn settle(
        &self,
        channel_identifier: ChannelId,
        ours: &BalanceData,
        partner: Address,
        theirs: &BalanceData,
    ) -> Result<()> {
        info!(
            token_network = %self.address,
            node = %self.node_address,
            %partner,
            transferred_amount = %ours.transferred_amount,
            locked_amount = %ours.locked_amount,
            locksroot = %ours.locksroot,
            partner_transferred_amount = %theirs.transferred_amount,
            partner_locked_amount = %theirs.locked_amount,
            partner_locksroot = %theirs.locksroot,
            "Settle called"
        );

        self.check_for_outdated_channel(partner, channel_identifier)?;

        let _channel = self.locks.acquire(partner);

        let on_chain =
            self.participants_data(self.node_address, partner, Some(channel_identifier))?;
        if !verify_settle_state(ours, theirs, &on_chain) {
            return Err(ProxyError::SettleStateMismatch);
        }

        let (first, second) = settle_order(
            SettleParticipant {
                address: self.node_address,
                balance: *ours,
            },
            SettleParticipant {
                address: partner,
                balance: *theirs,
            },
        );

        let args = [
            Value::from(channel_identifier),
            first.address.into(),
            first.balance.transferred_amount.into(),
            first.balance.locked_amount.into(),
            first.balance.locksroot.into(),
            second.address.into(),
            second.balance.transferred_amount.into(),
            second.balance.locked_amount.into(),
            second.balance.locksroot.into(),
        ];
        match self.transact("settleChannel", &args)? {
            Transaction::Mined(_) => {
                info!(token_network = %self.address, %partner, "Settle successful");
                Ok(())
            }
            Transaction::Reverted(receipt) => {
                let cause = self.settle_revert_cause(partner, channel_identifier, receipt);
                error!(
                    token_network = %self.address,
                    %partner,
                    error = %cause,
                    "Settle failed"
                );
                Err(cause)
            }
        }
    }
}
