use std::{thread, time::Duration};

use super::{balance, empty_balance, mock::TOKEN_NETWORK, Setup};
use crate::{
    balance_proof::{BalanceProof, WithdrawRequest},
    channel::{ChannelId, ChannelState},
    error::{ErrorKind, Operation, ProxyError},
    ledger::Value,
    packed::types::{Hash, Signature, U256},
};

#[test]
fn close_submits_the_partner_balance_proof() {
    let s = Setup::new(50);
    let partner = s.partner_address();
    let id = s.open_and_fund(10, 10);
    let proof = s.balance_proof(&s.partner, id, &balance(3, 0, 0), 4);

    s.proxy.close(id, partner, &proof).unwrap();

    assert_eq!(
        s.chain.last_arguments("closeChannel").unwrap(),
        vec![
            Value::Uint(id),
            Value::Address(partner),
            Value::Bytes32(proof.balance_hash),
            Value::Uint(U256::from(4)),
            Value::Bytes32(proof.additional_hash),
            Value::Bytes(proof.signature.0.to_vec()),
        ]
    );
    let details = s
        .proxy
        .participants_data(s.node_address(), partner, Some(id))
        .unwrap();
    assert_eq!(details.partner_details.balance_hash, proof.balance_hash);
    assert!(details.our_details.is_closer);
}

#[test]
fn second_close_is_recoverable() {
    let s = Setup::new(51);
    let partner = s.partner_address();
    let id = s.open();
    let proof = s.balance_proof(&s.partner, id, &empty_balance(), 0);

    s.proxy.close(id, partner, &proof).unwrap();
    let err = s.proxy.close(id, partner, &proof).unwrap_err();

    assert_eq!(err, ProxyError::ChannelAlreadyClosed);
    assert!(err.is_recoverable());
    assert_eq!(s.chain.transaction_count("closeChannel"), 1);
}

#[test]
fn closing_a_settled_channel_is_unrecoverable() {
    let s = Setup::new(52);
    let id = s.open();
    s.chain
        .with_state(|chain| chain.channel_mut(id).state = ChannelState::Settled);

    let proof = s.balance_proof(&s.partner, id, &empty_balance(), 0);
    let err = s.proxy.close(id, s.partner_address(), &proof).unwrap_err();
    assert_eq!(err, ProxyError::ChannelSettled(Operation::Close));
    assert_eq!(err.kind(), ErrorKind::Unrecoverable);
    assert_eq!(s.chain.transaction_count("closeChannel"), 0);
}

#[test]
fn close_racing_the_partner_is_recoverable() {
    let s = Setup::new(53);
    let id = s.open();
    s.chain.before_next("closeChannel", move |chain| {
        chain.channel_mut(id).state = ChannelState::Closed;
    });

    let proof = s.balance_proof(&s.partner, id, &empty_balance(), 0);
    assert_eq!(
        s.proxy.close(id, s.partner_address(), &proof),
        Err(ProxyError::ChannelAlreadyClosed)
    );
    assert_eq!(s.chain.transaction_count("closeChannel"), 1);
}

#[test]
fn unexplained_close_revert_is_a_transaction_failure() {
    let s = Setup::new(54);
    let id = s.open();
    s.chain.fail_next("closeChannel");

    let proof = s.balance_proof(&s.partner, id, &empty_balance(), 0);
    let err = s.proxy.close(id, s.partner_address(), &proof).unwrap_err();
    assert!(matches!(
        err,
        ProxyError::TransactionFailed {
            operation: Operation::Close,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::TransactionFailed);
}

/// Partner closes with our balance proof, leaving the update to us.
fn closed_by_partner(s: &Setup) -> ChannelId {
    let id = s.open_and_fund(10, 10);
    let ours = s.balance_proof(&s.node, id, &balance(2, 0, 0), 1);
    s.partner_proxy.close(id, s.node_address(), &ours).unwrap();
    id
}

fn partner_proof(id: ChannelId, nonce: u64) -> BalanceProof {
    BalanceProof {
        token_network: TOKEN_NETWORK,
        chain_id: U256::from(super::mock::CHAIN_ID),
        channel_identifier: id,
        balance_hash: balance(5, 1, 0xaa).balance_hash(),
        nonce: U256::from(nonce),
        additional_hash: Hash([0xad; 32]),
    }
}

#[test]
fn update_transfer_records_the_newer_proof() {
    let s = Setup::new(55);
    let partner = s.partner_address();
    let id = closed_by_partner(&s);

    let proof = partner_proof(id, 3);
    let signed = proof.sign(&s.partner).unwrap();
    let non_closing = proof.sign_update(&s.node, &signed.signature).unwrap();

    s.proxy
        .update_transfer(id, partner, &signed, non_closing)
        .unwrap();

    let details = s
        .proxy
        .participants_data(s.node_address(), partner, Some(id))
        .unwrap();
    assert_eq!(details.partner_details.balance_hash, proof.balance_hash);
    assert_eq!(details.partner_details.nonce, U256::from(3));
    assert_eq!(
        s.chain.last_arguments("updateNonClosingBalanceProof").unwrap()[7],
        Value::Bytes(non_closing.0.to_vec())
    );
}

#[test]
fn update_transfer_needs_a_closed_channel() {
    let s = Setup::new(56);
    let id = s.open();

    let signed = partner_proof(id, 3).sign(&s.partner).unwrap();
    let err = s
        .proxy
        .update_transfer(id, s.partner_address(), &signed, Signature::default())
        .unwrap_err();
    assert_eq!(err, ProxyError::ChannelNotClosed);
    assert_eq!(err.kind(), ErrorKind::Unrecoverable);
}

#[test]
fn stale_update_is_a_transaction_failure() {
    let s = Setup::new(57);
    let partner = s.partner_address();
    let id = closed_by_partner(&s);

    let newer = partner_proof(id, 3).sign(&s.partner).unwrap();
    s.proxy
        .update_transfer(id, partner, &newer, Signature::default())
        .unwrap();

    let older = partner_proof(id, 2).sign(&s.partner).unwrap();
    assert!(matches!(
        s.proxy.update_transfer(id, partner, &older, Signature::default()),
        Err(ProxyError::TransactionFailed {
            operation: Operation::UpdateTransfer,
            ..
        })
    ));
}

fn withdraw_signatures(s: &Setup, id: ChannelId, total: u64) -> (Signature, Signature) {
    let request = WithdrawRequest {
        token_network: TOKEN_NETWORK,
        chain_id: U256::from(super::mock::CHAIN_ID),
        channel_identifier: id,
        participant: s.node_address(),
        total_withdraw: U256::from(total),
    };
    (
        request.sign(&s.partner).unwrap(),
        request.sign(&s.node).unwrap(),
    )
}

#[test]
fn withdraw_raises_the_total() {
    let s = Setup::new(58);
    let (node, partner) = (s.node_address(), s.partner_address());
    let id = s.open_and_fund(50, 0);

    let (theirs, ours) = withdraw_signatures(&s, id, 30);
    s.proxy
        .withdraw(id, partner, U256::from(30), theirs, ours)
        .unwrap();

    assert_eq!(s.chain.balance(node), U256::from(30));
    let details = s.proxy.participants_data(node, partner, Some(id)).unwrap();
    assert_eq!(details.our_details.withdrawn, U256::from(30));

    // Same total again: nothing to withdraw.
    let err = s
        .proxy
        .withdraw(id, partner, U256::from(30), theirs, ours)
        .unwrap_err();
    assert!(matches!(err, ProxyError::InvalidAmount(_)));

    let (theirs, ours) = withdraw_signatures(&s, id, 20);
    assert_eq!(
        s.proxy.withdraw(id, partner, U256::from(20), theirs, ours),
        Err(ProxyError::WithdrawMismatch {
            current: U256::from(30),
            requested: U256::from(20),
        })
    );
    assert_eq!(s.chain.transaction_count("setTotalWithdraw"), 1);
}

#[test]
fn withdraw_revert_classification() {
    let s = Setup::new(59);
    let (node, partner) = (s.node_address(), s.partner_address());
    let id = s.open_and_fund(50, 0);
    let (theirs, ours) = withdraw_signatures(&s, id, 35);

    s.chain.before_next("setTotalWithdraw", move |chain| {
        chain.channel_mut(id).participant(node).withdrawn = U256::from(40);
    });
    assert_eq!(
        s.proxy.withdraw(id, partner, U256::from(35), theirs, ours),
        Err(ProxyError::WithdrawMismatch {
            current: U256::from(40),
            requested: U256::from(35),
        })
    );

    s.chain.before_next("setTotalWithdraw", move |chain| {
        chain.channel_mut(id).state = ChannelState::Closed;
    });
    let (theirs, ours) = withdraw_signatures(&s, id, 45);
    assert_eq!(
        s.proxy.withdraw(id, partner, U256::from(45), theirs, ours),
        Err(ProxyError::ChannelAlreadyClosed)
    );
}

#[test]
fn unexplained_withdraw_revert_is_a_transaction_failure() {
    let s = Setup::new(60);
    let id = s.open_and_fund(50, 0);
    let (theirs, ours) = withdraw_signatures(&s, id, 10);
    s.chain.fail_next("setTotalWithdraw");

    assert!(matches!(
        s.proxy
            .withdraw(id, s.partner_address(), U256::from(10), theirs, ours),
        Err(ProxyError::TransactionFailed {
            operation: Operation::Withdraw,
            ..
        })
    ));
}

#[test]
fn close_waits_for_a_pending_withdraw() {
    let s = Setup::new(61);
    let (node, partner) = (s.node_address(), s.partner_address());
    let id = s.open_and_fund(50, 0);
    let (theirs, ours) = withdraw_signatures(&s, id, 30);
    let proof = s.balance_proof(&s.partner, id, &empty_balance(), 0);
    s.chain.gate.arm("setTotalWithdraw");

    let closes_while_held = thread::scope(|scope| {
        let proxy = &s.proxy;
        let withdraw =
            scope.spawn(move || proxy.withdraw(id, partner, U256::from(30), theirs, ours));
        s.chain.gate.wait_entered();

        let proof = &proof;
        let close = scope.spawn(move || proxy.close(id, partner, proof));
        thread::sleep(Duration::from_millis(50));
        let observed = s.chain.transaction_count("closeChannel");

        s.chain.gate.release();
        withdraw.join().unwrap().unwrap();
        close.join().unwrap().unwrap();
        observed
    });

    assert_eq!(closes_while_held, 0);
    let transactions = s.chain.transactions();
    assert_eq!(
        transactions[transactions.len() - 2..].to_vec(),
        vec!["setTotalWithdraw", "closeChannel"]
    );
    let details = s.proxy.participants_data(node, partner, Some(id)).unwrap();
    assert_eq!(details.our_details.withdrawn, U256::from(30));
}
