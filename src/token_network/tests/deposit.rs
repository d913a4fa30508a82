use std::{thread, time::Duration};

use proptest::prelude::*;

use super::{mock::TOKEN_NETWORK, Setup, SETTLE_TIMEOUT};
use crate::{
    channel::ChannelState,
    error::{DepositRevertCause, ErrorKind, Operation, ProxyError},
    packed::types::{Address, U256},
};

#[test]
fn deposit_approves_exactly_the_difference() {
    let s = Setup::new(30);
    let (node, partner) = (s.node_address(), s.partner_address());
    let id = s.open();
    s.chain.mint(node, 100);

    s.proxy.set_total_deposit(id, U256::from(40), partner).unwrap();
    s.proxy.set_total_deposit(id, U256::from(70), partner).unwrap();

    assert_eq!(
        s.chain.approvals(),
        vec![
            (node, TOKEN_NETWORK, U256::from(40)),
            (node, TOKEN_NETWORK, U256::from(30)),
        ]
    );
    assert_eq!(s.chain.balance(node), U256::from(30));
    let details = s.proxy.participants_data(node, partner, Some(id)).unwrap();
    assert_eq!(details.our_details.deposit, U256::from(70));
    assert_eq!(details.partner_details.deposit, U256::zero());
}

#[test]
fn repeating_the_total_is_rejected_locally() {
    let s = Setup::new(31);
    let id = s.open_and_fund(30, 0);

    let err = s
        .proxy
        .set_total_deposit(id, U256::from(30), s.partner_address())
        .unwrap_err();
    assert!(matches!(err, ProxyError::InvalidAmount(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(s.chain.transaction_count("setTotalDeposit"), 1);
}

#[test]
fn deposit_beyond_balance_sends_nothing() {
    let s = Setup::new(32);
    let (node, partner) = (s.node_address(), s.partner_address());
    let id = s.open();
    s.chain.mint(node, 90);
    s.proxy.set_total_deposit(id, U256::from(40), partner).unwrap();

    assert_eq!(s.chain.balance(node), U256::from(50));
    assert_eq!(
        s.proxy.set_total_deposit(id, U256::from(100), partner),
        Err(ProxyError::InsufficientBalance {
            required: U256::from(60),
            available: U256::from(50),
        })
    );
    assert_eq!(s.chain.transaction_count("setTotalDeposit"), 1);
    assert_eq!(s.chain.approvals().len(), 1);
}

#[test]
fn stale_identifier_is_outdated() {
    let s = Setup::new(33);
    let id = s.open();
    let stale = U256::from(7);

    let err = s
        .proxy
        .set_total_deposit(stale, U256::from(1), s.partner_address())
        .unwrap_err();
    assert_eq!(
        err,
        ProxyError::ChannelOutdated {
            given: stale,
            on_chain: id
        }
    );
    assert!(err.is_recoverable());
    assert!(s.chain.transactions().iter().all(|f| f != "setTotalDeposit"));
}

#[test]
fn consumed_allowance_is_reported() {
    let s = Setup::new(34);
    let (node, partner) = (s.node_address(), s.partner_address());
    let id = s.open();
    s.chain.mint(node, 100);

    s.chain.before_next("setTotalDeposit", move |state| {
        state.allowances.insert((node, TOKEN_NETWORK), U256::zero());
    });
    let err = s
        .proxy
        .set_total_deposit(id, U256::from(10), partner)
        .unwrap_err();

    match &err {
        ProxyError::DepositReverted { cause, receipt } => {
            assert_eq!(*cause, DepositRevertCause::AllowanceConsumed);
            assert_eq!(receipt.block_number, s.chain.block());
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::TransactionFailed);
    assert!(err.receipt().is_some());
}

#[test]
fn vanished_funds_are_reported() {
    let s = Setup::new(35);
    let (node, partner) = (s.node_address(), s.partner_address());
    let id = s.open();
    s.chain.mint(node, 100);

    s.chain.before_next("setTotalDeposit", move |state| {
        state.balances.insert(node, U256::from(5));
    });
    assert!(matches!(
        s.proxy.set_total_deposit(id, U256::from(10), partner),
        Err(ProxyError::DepositReverted {
            cause: DepositRevertCause::InsufficientFunds,
            ..
        })
    ));
}

#[test]
fn unexplained_revert_is_unknown() {
    let s = Setup::new(36);
    let (node, partner) = (s.node_address(), s.partner_address());
    let id = s.open();
    s.chain.mint(node, 100);

    s.chain.fail_next("setTotalDeposit");
    assert!(matches!(
        s.proxy.set_total_deposit(id, U256::from(10), partner),
        Err(ProxyError::DepositReverted {
            cause: DepositRevertCause::Unknown,
            ..
        })
    ));
}

#[test]
fn revert_is_classified_by_channel_state() {
    let cases = [
        (ChannelState::Closed, ProxyError::ChannelAlreadyClosed),
        (
            ChannelState::Settled,
            ProxyError::ChannelSettled(Operation::Deposit),
        ),
    ];

    for (seed, (state, expected)) in cases.into_iter().enumerate() {
        let s = Setup::new(37 + seed as u64);
        let (node, partner) = (s.node_address(), s.partner_address());
        let id = s.open();
        s.chain.mint(node, 100);

        s.chain.before_next("setTotalDeposit", move |chain| {
            chain.channel_mut(id).state = state;
        });
        assert_eq!(
            s.proxy.set_total_deposit(id, U256::from(10), partner),
            Err(expected)
        );
    }
}

#[test]
fn removed_channel_is_nonexistent() {
    let s = Setup::new(39);
    let (node, partner) = (s.node_address(), s.partner_address());
    let id = s.open();
    s.chain.mint(node, 100);

    s.chain.before_next("setTotalDeposit", move |chain| {
        chain.channel_mut(id).state = ChannelState::Removed;
    });
    let err = s
        .proxy
        .set_total_deposit(id, U256::from(10), partner)
        .unwrap_err();
    assert_eq!(
        err,
        ProxyError::ChannelNonexistent {
            participant1: node,
            participant2: partner
        }
    );
    assert_eq!(err.kind(), ErrorKind::Unrecoverable);
}

#[test]
fn racing_larger_deposit_is_a_decrease() {
    let s = Setup::new(40);
    let (node, partner) = (s.node_address(), s.partner_address());
    let id = s.open();
    s.chain.mint(node, 100);

    s.chain.before_next("setTotalDeposit", move |chain| {
        chain.channel_mut(id).participant(node).deposit = U256::from(25);
    });
    assert_eq!(
        s.proxy.set_total_deposit(id, U256::from(10), partner),
        Err(ProxyError::DepositDecreased {
            on_chain: U256::from(25),
            requested: U256::from(10),
        })
    );
}

#[test]
fn deposits_into_different_channels_do_not_interleave() {
    let s = Setup::new(41);
    let node = s.node_address();
    let partners = [s.partner_address(), Address([0x43; 20])];
    let ids: Vec<_> = partners
        .iter()
        .map(|partner| s.proxy.open(*partner, SETTLE_TIMEOUT).unwrap())
        .collect();
    s.chain.mint(node, 100);
    s.chain.gate.arm("setTotalDeposit");

    let (approved_while_held, sent_while_held) = thread::scope(|scope| {
        let proxy = &s.proxy;
        let (first_id, second_id) = (ids[0], ids[1]);
        let first =
            scope.spawn(move || proxy.set_total_deposit(first_id, U256::from(50), partners[0]));
        s.chain.gate.wait_entered();

        // The first deposit is approved and held inside its transaction.
        let second =
            scope.spawn(move || proxy.set_total_deposit(second_id, U256::from(50), partners[1]));
        thread::sleep(Duration::from_millis(50));
        let observed = (
            s.chain.approvals().len(),
            s.chain.transaction_count("setTotalDeposit"),
        );

        s.chain.gate.release();
        first.join().unwrap().unwrap();
        second.join().unwrap().unwrap();
        observed
    });

    assert_eq!(approved_while_held, 1);
    assert_eq!(sent_while_held, 0);
    assert_eq!(s.chain.approvals().len(), 2);
    assert_eq!(s.chain.balance(node), U256::zero());
    assert_eq!(s.chain.transaction_count("setTotalDeposit"), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn lower_total_is_a_mismatch(current in 1u64..1_000, below in 1u64..1_000) {
        let target = current.saturating_sub(below);
        let s = Setup::new(current);
        let id = s.open_and_fund(current, 0);

        prop_assert_eq!(
            s.proxy.set_total_deposit(id, U256::from(target), s.partner_address()),
            Err(ProxyError::DepositMismatch {
                current: U256::from(current),
                requested: U256::from(target),
            })
        );
        prop_assert_eq!(s.chain.transaction_count("setTotalDeposit"), 1);
    }
}
