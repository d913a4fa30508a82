use super::TokenNetwork;
use crate::{
    error::Result,
    ledger::{BlockSpec, FilterId, LedgerClient, TokenProxy},
    packed::{keccak256, types::Hash},
};

/// Signature of the event emitted by `openChannel`.
pub const CHANNEL_OPENED_EVENT: &str = "ChannelOpened(uint256,address,address,uint256)";

impl<L: LedgerClient, T: TokenProxy> TokenNetwork<L, T> {
    /// Install a filter for events of this contract. `None` selects all
    /// events.
    pub fn events_filter(
        &self,
        topics: Option<&[Hash]>,
        from_block: BlockSpec,
        to_block: BlockSpec,
    ) -> Result<FilterId> {
        Ok(self
            .ledger
            .new_filter(self.address, topics, from_block, to_block)?)
    }

    /// Filter for new channels, by default over the whole chain.
    pub fn channel_opened_filter(
        &self,
        from_block: Option<BlockSpec>,
        to_block: Option<BlockSpec>,
    ) -> Result<FilterId> {
        let topic = keccak256(CHANNEL_OPENED_EVENT.as_bytes());
        self.events_filter(
            Some(&[topic]),
            from_block.unwrap_or(BlockSpec::Number(0)),
            to_block.unwrap_or(BlockSpec::Latest),
        )
    }

    pub fn all_events_filter(
        &self,
        from_block: Option<BlockSpec>,
        to_block: Option<BlockSpec>,
    ) -> Result<FilterId> {
        self.events_filter(
            None,
            from_block.unwrap_or(BlockSpec::Number(0)),
            to_block.unwrap_or(BlockSpec::Latest),
        )
    }
}
