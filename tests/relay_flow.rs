//! End-to-end relay scenarios over in-memory chains

mod common;

use alloy::primitives::{address, Address, Bytes, U256};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use bridge_relay::codec::{encode_deposit_payload, DEPOSIT_SELECTOR, WITHDRAW_SELECTOR};
use bridge_relay::poller::{ChainPoller, PollerState};
use bridge_relay::rpc::{ChainRpc, ChainTransaction};
use bridge_relay::watermark::{MemoryWatermarkStore, WatermarkStore};
use bridge_relay::{ChainConfig, ChainId, ChainRegistry, Credential, RelayError, Relayer};
use common::*;

const RECIPIENT: Address = address!("1111111111111111111111111111111111111111");

async fn ready_poller(h: &Harness, chain_id: u64) -> (ChainPoller, Arc<dyn ChainRpc>) {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut poller = ChainPoller::new(h.ctx.clone(), h.chain(chain_id), shutdown_rx);
    let client = poller.connect().await.unwrap();
    poller.baseline(client.as_ref()).await.unwrap();
    assert_eq!(poller.state(), PollerState::Polling);
    (poller, client)
}

fn expected_withdraw_calldata(recipient: Address, value: u64, source_chain: u64) -> String {
    format!(
        "b5c5f672{}{}{:0>64}{:0>64}",
        "0".repeat(24),
        hex::encode(recipient),
        format!("{:x}", value),
        format!("{:x}", source_chain)
    )
}

#[tokio::test]
async fn test_deposit_relayed_to_destination_chain() {
    let h = harness(&[4, 1], fast_settings());
    let source = h.mock(4);
    source.set_latest(10);
    source.add_deposit_tx(tx_hash(0x44), RECIPIENT, 1, 7777);
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x44), 5));

    let (mut poller, client) = ready_poller(&h, 4).await;
    let summary = poller.tick(&client).await.unwrap();

    assert_eq!(summary.events, 1);
    assert_eq!(summary.withdrawals.len(), 1);
    assert_eq!(summary.processed_to, Some(10));

    let submitted = h.mock(1).submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(
        hex::encode(&submitted[0]),
        expected_withdraw_calldata(RECIPIENT, 7777, 4)
    );
    assert!(h.mock(4).submitted().is_empty());

    let signed = h.signer.signed();
    assert_eq!(signed.len(), 1);
    let (from, tx) = &signed[0];
    assert_eq!(*from, sender());
    assert_eq!(tx.to, bridge_of(1));
    assert_eq!(tx.value, U256::ZERO);
    assert_eq!(tx.chain_id, 1);
    assert_eq!(tx.gas_limit, 4_600_000);
    assert_eq!(tx.gas_price, 1_000_000_001);
    assert_eq!(tx.nonce, 0);
    assert_eq!(tx.input[..4], WITHDRAW_SELECTOR);

    assert_eq!(h.chain(1).current_nonce().await, Some(1));
}

#[tokio::test]
async fn test_unknown_topic_not_dispatched() {
    let h = harness(&[4, 1], fast_settings());
    let source = h.mock(4);
    source.set_latest(10);
    source.add_deposit_tx(tx_hash(0x45), RECIPIENT, 1, 100);
    source.add_log(log(bridge_of(4), alloy::primitives::B256::repeat_byte(0xee), tx_hash(0x45), 3));

    let (mut poller, client) = ready_poller(&h, 4).await;
    let summary = poller.tick(&client).await.unwrap();

    assert_eq!(summary.events, 0);
    assert!(h.mock(1).submitted().is_empty());
    assert!(h.signer.signed().is_empty());
}

#[tokio::test]
async fn test_pending_deposit_waits_until_mined() {
    let h = harness(&[4, 1], fast_settings());
    let source = h.mock(4);
    source.set_latest(10);
    source.set_transaction(
        tx_hash(0x46),
        ChainTransaction {
            input: encode_deposit_payload(RECIPIENT, &ChainId::from_u64(1)),
            value: U256::from(5u64),
            is_pending: true,
        },
    );
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x46), 7));

    let miner = source.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        miner.add_deposit_tx(tx_hash(0x46), RECIPIENT, 1, 5);
    });

    let (mut poller, client) = ready_poller(&h, 4).await;
    let summary = poller.tick(&client).await.unwrap();

    assert_eq!(summary.withdrawals.len(), 1);
    assert_eq!(h.mock(1).submitted().len(), 1);
}

#[tokio::test]
async fn test_pending_deposit_times_out() {
    let mut settings = fast_settings();
    settings.tx_confirm_timeout = Duration::from_millis(50);
    let h = harness(&[4, 1], settings);
    let source = h.mock(4);
    source.set_latest(10);
    source.set_transaction(
        tx_hash(0x47),
        ChainTransaction {
            input: encode_deposit_payload(RECIPIENT, &ChainId::from_u64(1)),
            value: U256::from(5u64),
            is_pending: true,
        },
    );
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x47), 7));

    let (mut poller, client) = ready_poller(&h, 4).await;
    let summary = poller.tick(&client).await.unwrap();

    assert_eq!(summary.events, 1);
    assert!(summary.withdrawals.is_empty());
    assert!(h.mock(1).submitted().is_empty());
    // The cycle still completes
    assert_eq!(poller.from_block(), 11);
}

#[tokio::test]
async fn test_unknown_destination_dropped() {
    let h = harness(&[4, 1], fast_settings());
    let source = h.mock(4);
    source.set_latest(10);
    source.add_deposit_tx(tx_hash(0x48), RECIPIENT, 999, 1);
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x48), 2));

    let (mut poller, client) = ready_poller(&h, 4).await;
    let summary = poller.tick(&client).await.unwrap();

    assert_eq!(summary.events, 1);
    assert!(summary.withdrawals.is_empty());
    assert!(h.mock(1).submitted().is_empty());
    assert!(h.mock(4).submitted().is_empty());
    assert!(h.signer.signed().is_empty());
}

#[tokio::test]
async fn test_malformed_and_foreign_calls_dropped() {
    let h = harness(&[4, 1], fast_settings());
    let source = h.mock(4);
    source.set_latest(10);

    let mut truncated = DEPOSIT_SELECTOR.to_vec();
    truncated.extend_from_slice(&[0u8; 20]);
    source.set_transaction(
        tx_hash(0x49),
        ChainTransaction {
            input: Bytes::from(truncated),
            value: U256::from(1u64),
            is_pending: false,
        },
    );
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x49), 2));

    // ERC20 transfer(address,uint256)
    source.set_transaction(
        tx_hash(0x4a),
        ChainTransaction {
            input: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb, 0, 0, 0, 0]),
            value: U256::ZERO,
            is_pending: false,
        },
    );
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x4a), 3));

    let (mut poller, client) = ready_poller(&h, 4).await;
    let summary = poller.tick(&client).await.unwrap();

    assert_eq!(summary.events, 2);
    assert!(summary.withdrawals.is_empty());
    assert!(h.mock(1).submitted().is_empty());
}

#[tokio::test]
async fn test_same_tx_classified_once_per_cycle() {
    let h = harness(&[4, 1], fast_settings());
    let source = h.mock(4);
    source.set_latest(10);

    // Deposit first, then a second bridge event from the same tx
    source.add_deposit_tx(tx_hash(0x50), RECIPIENT, 1, 10);
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x50), 4));
    source.add_log(log(bridge_of(4), withdraw_topic(), tx_hash(0x50), 4));

    // BridgeSet first: the later Deposit log of the same tx is not acted on
    source.add_deposit_tx(tx_hash(0x51), RECIPIENT, 1, 20);
    source.add_log(log(bridge_of(4), bridge_set_topic(), tx_hash(0x51), 6));
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x51), 6));

    let (mut poller, client) = ready_poller(&h, 4).await;
    let summary = poller.tick(&client).await.unwrap();

    assert_eq!(summary.events, 2);
    assert_eq!(summary.withdrawals.len(), 1);
    assert_eq!(h.mock(1).submitted().len(), 1);
}

#[tokio::test]
async fn test_unknown_topic_does_not_hide_deposit_in_same_tx() {
    let h = harness(&[4, 1], fast_settings());
    let source = h.mock(4);
    source.set_latest(10);
    source.add_deposit_tx(tx_hash(0x52), RECIPIENT, 1, 10);
    source.add_log(log(bridge_of(4), alloy::primitives::B256::repeat_byte(0x99), tx_hash(0x52), 4));
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x52), 4));

    let (mut poller, client) = ready_poller(&h, 4).await;
    let summary = poller.tick(&client).await.unwrap();

    assert_eq!(summary.withdrawals.len(), 1);
}

#[tokio::test]
async fn test_relayed_deposit_not_replayed_in_later_cycle() {
    let h = harness(&[4, 1], fast_settings());
    let source = h.mock(4);
    source.set_latest(10);
    source.add_deposit_tx(tx_hash(0x53), RECIPIENT, 1, 10);
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x53), 5));

    let (mut poller, client) = ready_poller(&h, 4).await;
    assert_eq!(poller.tick(&client).await.unwrap().withdrawals.len(), 1);

    source.clear_logs();
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x53), 15));
    source.set_latest(20);

    let summary = poller.tick(&client).await.unwrap();
    assert_eq!(summary.events, 1);
    assert!(summary.withdrawals.is_empty());
    assert_eq!(h.mock(1).submitted().len(), 1);
}

#[tokio::test]
async fn test_log_queries_are_chunked_and_filtered_to_bridge() {
    let mut settings = fast_settings();
    settings.max_block_range = 3;
    let h = harness(&[4], settings);
    h.mock(4).set_latest(10);

    let (mut poller, client) = ready_poller(&h, 4).await;
    let summary = poller.tick(&client).await.unwrap();
    assert_eq!(summary.processed_to, Some(10));

    let ranges: Vec<_> = h
        .mock(4)
        .filters()
        .iter()
        .map(|f| (f.from_block, f.to_block))
        .collect();
    assert_eq!(ranges, vec![(1, 3), (4, 6), (7, 9), (10, 10)]);
    assert!(h
        .mock(4)
        .filters()
        .iter()
        .all(|f| f.addresses == vec![bridge_of(4)]));

    // Nothing new: no further queries
    poller.tick(&client).await.unwrap();
    assert_eq!(h.mock(4).filters().len(), 4);
}

#[tokio::test]
async fn test_all_addresses_scans_every_contract() {
    let mut settings = fast_settings();
    settings.all_addresses = true;
    let h = harness(&[4, 1], settings);
    let source = h.mock(4);
    source.set_latest(10);
    source.add_deposit_tx(tx_hash(0x54), RECIPIENT, 1, 10);
    source.add_log(log(Address::repeat_byte(0x77), deposit_topic(), tx_hash(0x54), 5));

    let (mut poller, client) = ready_poller(&h, 4).await;
    let summary = poller.tick(&client).await.unwrap();

    assert!(source.filters().iter().all(|f| f.addresses.is_empty()));
    assert_eq!(summary.withdrawals.len(), 1);
}

#[tokio::test]
async fn test_failed_log_fetch_keeps_watermark() {
    let h = harness(&[4], fast_settings());
    let source = h.mock(4);
    source.set_latest(10);
    source.fail_logs.store(true, Ordering::SeqCst);

    let (mut poller, client) = ready_poller(&h, 4).await;
    let err = poller.tick(&client).await.unwrap_err();
    assert!(matches!(err, RelayError::RpcQuery { .. }));
    assert!(!err.is_fatal_for_chain());
    assert_eq!(poller.from_block(), 1);
    assert_eq!(h.watermarks.load(ChainId::from_u64(4)).await.unwrap(), None);

    source.fail_logs.store(false, Ordering::SeqCst);
    let summary = poller.tick(&client).await.unwrap();
    assert_eq!(summary.processed_to, Some(10));
    assert_eq!(poller.from_block(), 11);
    assert_eq!(h.watermarks.load(ChainId::from_u64(4)).await.unwrap(), Some(10));
}

#[tokio::test]
async fn test_baseline_resumes_after_stored_watermark() {
    let store = Arc::new(MemoryWatermarkStore::new());
    store.store(ChainId::from_u64(4), 7).await.unwrap();
    let h = harness_with(&[4], fast_settings(), store);
    h.mock(4).set_latest(12);
    h.mock(4).nonce.store(9, Ordering::SeqCst);

    let (mut poller, client) = ready_poller(&h, 4).await;
    assert_eq!(poller.from_block(), 8);
    assert_eq!(h.chain(4).current_nonce().await, Some(9));

    poller.tick(&client).await.unwrap();
    assert_eq!(h.mock(4).filters()[0].from_block, 8);
    assert_eq!(h.watermarks.load(ChainId::from_u64(4)).await.unwrap(), Some(12));
}

#[tokio::test]
async fn test_transient_nonce_failures_do_not_stop_baseline() {
    let mut settings = fast_settings();
    settings.max_run_duration = Some(Duration::from_millis(500));
    let h = harness(&[4, 1], settings);

    let source = h.mock(4);
    // More failures than one round of retries absorbs
    source.nonce_failures.store(6, Ordering::SeqCst);
    source.nonce.store(3, Ordering::SeqCst);
    source.set_latest(10);
    source.add_deposit_tx(tx_hash(0x70), RECIPIENT, 1, 250);
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x70), 5));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    Relayer::new(h.ctx.clone()).run(shutdown_rx).await.unwrap();

    assert!(source.nonce_queries.load(Ordering::SeqCst) >= 7);
    assert_eq!(h.chain(4).current_nonce().await, Some(3));
    let submitted = h.mock(1).submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(
        hex::encode(&submitted[0]),
        expected_withdraw_calldata(RECIPIENT, 250, 4)
    );
}

#[tokio::test]
async fn test_baseline_gives_up_on_shutdown() {
    let h = harness(&[4], fast_settings());
    h.mock(4).nonce_failures.store(u32::MAX, Ordering::SeqCst);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut poller = ChainPoller::new(h.ctx.clone(), h.chain(4), shutdown_rx);
    let client = poller.connect().await.unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = shutdown_tx.send(true);
    });

    tokio::time::timeout(Duration::from_secs(5), poller.baseline(client.as_ref()))
        .await
        .expect("baseline ignored shutdown")
        .unwrap();
    assert_eq!(poller.state(), PollerState::Baselining);
    assert_eq!(h.chain(4).current_nonce().await, None);
}

#[tokio::test]
async fn test_watermark_ahead_of_node_waits_for_new_blocks() {
    let store = Arc::new(MemoryWatermarkStore::new());
    store.store(ChainId::from_u64(4), 50).await.unwrap();
    let h = harness_with(&[4], fast_settings(), store);
    h.mock(4).set_latest(20);

    let (mut poller, client) = ready_poller(&h, 4).await;
    assert_eq!(poller.from_block(), 51);

    let summary = poller.tick(&client).await.unwrap();
    assert_eq!(summary.processed_to, None);
    assert!(h.mock(4).filters().is_empty());
    assert_eq!(h.watermarks.load(ChainId::from_u64(4)).await.unwrap(), Some(50));
}

#[tokio::test]
async fn test_concurrent_dispatches_get_distinct_nonces() {
    let h = harness(&[4, 56, 1], fast_settings());
    let destination = h.chain(1);
    let dispatcher = &h.ctx.dispatcher;

    let (a, b) = tokio::join!(
        dispatcher.submit_call(&destination, Bytes::from_static(&[1]), U256::ZERO),
        dispatcher.submit_call(&destination, Bytes::from_static(&[2]), U256::ZERO),
    );
    a.unwrap();
    b.unwrap();

    let mut nonces: Vec<u64> = h.signer.signed().iter().map(|(_, tx)| tx.nonce).collect();
    nonces.sort_unstable();
    assert_eq!(nonces, vec![0, 1]);
    assert_eq!(destination.current_nonce().await, Some(2));
}

#[tokio::test]
async fn test_broadcast_failure_leaves_nonce() {
    let h = harness(&[1], fast_settings());
    let destination = h.chain(1);
    let dispatcher = &h.ctx.dispatcher;

    dispatcher
        .submit_call(&destination, Bytes::from_static(&[1]), U256::ZERO)
        .await
        .unwrap();
    assert_eq!(destination.current_nonce().await, Some(1));

    h.mock(1).fail_broadcast.store(true, Ordering::SeqCst);
    let err = dispatcher
        .submit_call(&destination, Bytes::from_static(&[2]), U256::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Broadcast { .. }));
    assert_eq!(destination.current_nonce().await, Some(1));
}

#[tokio::test]
async fn test_connect_falls_back_to_next_url_once() {
    let dialer = Arc::new(MockDialer::default());
    dialer.route(&url_of(4), Arc::new(MockChain::new(4)));

    let config = ChainConfig::new(
        ChainId::from_u64(4),
        &format!("http://dead-node, {}", url_of(4)),
        bridge_of(4),
        1,
        Credential::PrivateKey(bridge_relay::redact::Redacted(String::new())),
    );
    let registry = ChainRegistry::new(vec![bridge_relay::Chain::new(&config, sender())]).unwrap();
    let chain = registry.resolve(&ChainId::from_u64(4)).unwrap();

    chain.connect(dialer.as_ref()).await.unwrap();
    chain.connect(dialer.as_ref()).await.unwrap();

    assert_eq!(dialer.dials(), vec!["http://dead-node".to_string(), url_of(4)]);
    assert!(chain.is_connected());
}

#[tokio::test]
async fn test_unreachable_chain_stops_only_its_own_loop() {
    let mut settings = fast_settings();
    settings.max_run_duration = Some(Duration::from_millis(300));
    let h = harness(&[4, 56, 1], settings);
    h.dialer.unroute(&url_of(56));

    let source = h.mock(4);
    source.set_latest(10);
    source.add_deposit_tx(tx_hash(0x60), RECIPIENT, 1, 1);
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x60), 5));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    Relayer::new(h.ctx.clone()).run(shutdown_rx).await.unwrap();

    assert_eq!(h.mock(1).submitted().len(), 1);
    assert!(!h.chain(56).is_connected());
}

#[tokio::test]
async fn test_signing_failure_stops_every_chain() {
    let mut settings = fast_settings();
    settings.max_run_duration = Some(Duration::from_secs(30));
    let h = harness(&[4, 1], settings);
    h.signer.fail.store(true, Ordering::SeqCst);

    let source = h.mock(4);
    source.set_latest(10);
    source.add_deposit_tx(tx_hash(0x61), RECIPIENT, 1, 1);
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x61), 5));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        Relayer::new(h.ctx.clone()).run(shutdown_rx),
    )
    .await
    .expect("relayer did not stop on signing failure");

    assert!(matches!(result, Err(RelayError::Signing { .. })));
    assert!(h.mock(1).submitted().is_empty());
}

#[tokio::test]
async fn test_shutdown_signal_stops_relayer() {
    let h = harness(&[4, 1], fast_settings());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relayer = Relayer::new(h.ctx.clone());

    let handle = tokio::spawn(async move { relayer.run(shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("relayer ignored shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_destination_chain_dialed_on_first_withdrawal() {
    let h = harness(&[4, 1], fast_settings());
    assert!(!h.chain(1).is_connected());

    let source = h.mock(4);
    source.set_latest(3);
    source.add_deposit_tx(tx_hash(0x62), RECIPIENT, 1, 1);
    source.add_log(log(bridge_of(4), deposit_topic(), tx_hash(0x62), 2));

    let (mut poller, client) = ready_poller(&h, 4).await;
    poller.tick(&client).await.unwrap();

    assert!(h.chain(1).is_connected());
    assert_eq!(h.dialer.dials(), vec![url_of(4), url_of(1)]);
}
