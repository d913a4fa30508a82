
mod close;
mod deposit;

use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng};

use self::mock::{MockChain, MockLedger, MockToken, TOKEN_NETWORK};
use super::TokenNetwork;
use crate::{
    balance_proof::{BalanceData, BalanceProof, OnChainBalanceProof},
    channel::ChannelId,
    config::Config,
    packed::types::{Address, Hash, U256},
    sig::Signer,
};

type Proxy = TokenNetwork<MockLedger, MockToken>;

const SETTLE_TIMEOUT: u64 = 40;

/// One token network contract with two nodes, each with its own proxy.
struct Setup {
    chain: Arc<MockChain>,
    node: Signer,
    partner: Signer,
    proxy: Proxy,
    partner_proxy: Proxy,
}

impl Setup {
    fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let node = Signer::new(&mut rng);
        let partner = Signer::new(&mut rng);
        let chain = MockChain::new();

        let proxy = proxy_for(&chain, &node);
        let partner_proxy = proxy_for(&chain, &partner);

        Setup {
            chain,
            node,
            partner,
            proxy,
            partner_proxy,
        }
    }

    fn node_address(&self) -> Address {
        self.node.address()
    }

    fn partner_address(&self) -> Address {
        self.partner.address()
    }

    fn open(&self) -> ChannelId {
        self.proxy
            .open(self.partner_address(), SETTLE_TIMEOUT)
            .unwrap()
    }

    /// Open a channel and deposit the given (non-zero) amounts on each side.
    fn open_and_fund(&self, ours: u64, theirs: u64) -> ChannelId {
        let id = self.open();
        if ours > 0 {
            self.chain.mint(self.node_address(), ours);
            self.proxy
                .set_total_deposit(id, U256::from(ours), self.partner_address())
                .unwrap();
        }
        if theirs > 0 {
            self.chain.mint(self.partner_address(), theirs);
            self.partner_proxy
                .set_total_deposit(id, U256::from(theirs), self.node_address())
                .unwrap();
        }
        id
    }

    /// Balance proof of `signer` over `balance` in channel `id`.
    fn balance_proof(
        &self,
        signer: &Signer,
        id: ChannelId,
        balance: &BalanceData,
        nonce: u64,
    ) -> OnChainBalanceProof {
        BalanceProof {
            token_network: TOKEN_NETWORK,
            chain_id: U256::from(mock::CHAIN_ID),
            channel_identifier: id,
            balance_hash: balance.balance_hash(),
            nonce: U256::from(nonce),
            additional_hash: Hash([0xad; 32]),
        }
        .sign(signer)
        .unwrap()
    }
}

fn proxy_for(chain: &Arc<MockChain>, signer: &Signer) -> Proxy {
    TokenNetwork::new(
        chain.ledger(signer.address()),
        chain.token(signer.address()),
        signer,
        &Config::new(TOKEN_NETWORK),
    )
    .unwrap()
}

fn balance(transferred: u64, locked: u64, locksroot: u8) -> BalanceData {
    BalanceData::new(
        U256::from(transferred),
        U256::from(locked),
        Hash([locksroot; 32]),
    )
}

/// The balance data of a participant that never received a balance proof.
fn empty_balance() -> BalanceData {
    BalanceData::default()
}
