//! End-to-end ingestion cycles against an in-memory node and sink.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use starknet::core::types::Felt;
use starky::abi::AbiRegistry;
use starky::etl::extractor::{
    BlockReference, EventPoller, PollerConfig, StartBlock, TransactionPayload, TransactionView,
};
use starky::etl::record::{RecordContext, RecordKind};
use starky::resolver::NameResolver;
use starky::selector::{event_selector, function_selector};
use starky::StarkyConfig;
use support::{event, GrowingChain, MockSource, RecordingSink};
use tokio_util::sync::CancellationToken;

const GAME: u64 = 0xc1;

fn resolver() -> Arc<NameResolver> {
    let registry = AbiRegistry::from_value(
        json!({
            "world": {"address": "0xA1", "class_hash": "0x1"},
            "contracts": [{
                "address": "0xC1",
                "class_hash": "0x2",
                "abi": [
                    {"type": "event", "name": "Game::MovedEvent"},
                    {"type": "function", "name": "attack"}
                ]
            }],
            "events": [{"tag": "Score", "selector": "0xEE"}]
        }),
        "manifest.json",
    )
    .unwrap();
    Arc::new(NameResolver::from_registry(&registry, &[]))
}

fn poller_config(start: StartBlock) -> PollerConfig {
    PollerConfig {
        start,
        addresses: vec![Felt::from(GAME)],
        chunk_size: 2,
        interval: Duration::from_millis(10),
        tx_fetch_delay: Duration::ZERO,
        ..PollerConfig::default()
    }
}

fn poller(source: &Arc<MockSource>, sink: &Arc<RecordingSink>, config: PollerConfig) -> EventPoller {
    EventPoller::new(
        source.clone(),
        sink.clone(),
        resolver(),
        RecordContext::new("sepolia"),
        config,
    )
}

fn attack_tx(hash: u64) -> TransactionView {
    TransactionView {
        hash: Felt::from(hash),
        payload: TransactionPayload::Invoke {
            sender: Felt::from(0x5u64),
            calldata: vec![function_selector("attack").unwrap(), Felt::from(GAME)],
        },
        internal_calls: Vec::new(),
    }
}

#[tokio::test]
async fn test_lookback_start_then_advance_to_head() {
    let source = Arc::new(MockSource::with_head(10_000));
    let sink = Arc::new(RecordingSink::default());
    let mut poller = poller(&source, &sink, poller_config(StartBlock::Lookback(500)));
    let shutdown = CancellationToken::new();

    poller.run_cycle(&shutdown).await.unwrap();
    assert_eq!(source.requests()[0].from, BlockReference::Number(9_500));
    assert_eq!(source.requests()[0].to, BlockReference::Number(10_000));
    assert_eq!(source.requests()[0].address, Some(Felt::from(GAME)));
    assert_eq!(
        poller.cursor().unwrap().block(),
        BlockReference::Number(10_000)
    );

    source.set_head(10_010);
    poller.run_cycle(&shutdown).await.unwrap();
    assert_eq!(source.requests()[1].from, BlockReference::Number(10_000));
    assert_eq!(source.requests()[1].to, BlockReference::Number(10_010));
    assert_eq!(
        poller.cursor().unwrap().block(),
        BlockReference::Number(10_010)
    );
    // Nothing matched, nothing shipped.
    assert_eq!(sink.batch_count(), 0);
}

#[tokio::test]
async fn test_continuation_token_is_followed() {
    let source = Arc::new(MockSource::with_head(200));
    let moved = event_selector("Moved").unwrap();
    source.add_page(
        None,
        vec![event(GAME, moved, 0x10, 150), event(GAME, moved, 0x11, 151)],
        Some("page-2"),
    );
    source.add_page(Some("page-2"), vec![event(GAME, moved, 0x12, 152)], None);

    let sink = Arc::new(RecordingSink::default());
    let mut config = poller_config(StartBlock::Explicit(100));
    config.expand_transactions = false;
    let mut poller = poller(&source, &sink, config);

    let stats = poller.run_cycle(&CancellationToken::new()).await.unwrap();

    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].continuation_token, None);
    assert_eq!(requests[1].continuation_token.as_deref(), Some("page-2"));
    assert!(requests.iter().all(|r| r.from == BlockReference::Number(100)));
    assert_eq!(stats.pages, 2);
    assert_eq!(stats.events, 3);
    assert_eq!(sink.records().len(), 3);
    assert_eq!(poller.cursor().unwrap().continuation_token(), None);
}

#[tokio::test]
async fn test_events_are_named_and_transactions_fetched_once() {
    let source = Arc::new(MockSource::with_head(200));
    let moved = event_selector("Moved").unwrap();
    let unknown = Felt::from_hex("0xdeadbeefcafe").unwrap();
    source.add_page(
        None,
        vec![
            event(GAME, moved, 0x10, 150),
            event(GAME, Felt::from(0xeeu64), 0x10, 150),
            event(GAME, unknown, 0x10, 150),
        ],
        None,
    );
    source.add_transaction(attack_tx(0x10));

    let sink = Arc::new(RecordingSink::default());
    let mut poller = poller(&source, &sink, poller_config(StartBlock::Explicit(100)));
    let stats = poller.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(source.transaction_fetches(), 1);
    assert_eq!(stats.function_calls, 1);

    let records = sink.records();
    assert_eq!(sink.batch_count(), 1);
    let names: Vec<_> = records.iter().map(|r| r.resolved_name().to_string()).collect();
    assert_eq!(names, ["Moved", "Score", "unknown_deadbeef", "attack"]);

    let call = &records[3];
    assert_eq!(call.kind, RecordKind::FunctionCall);
    assert_eq!(call.contract_address, Felt::from(GAME));
    assert_eq!(call.block_number, Some(150));
    assert!(call.tags.contains(&"network:sepolia".to_string()));
}

#[tokio::test]
async fn test_blocks_produced_during_a_cycle_are_read_next_cycle() {
    let score = Felt::from(0xeeu64);
    let source = Arc::new(GrowingChain::new(
        200,
        2,
        vec![event(GAME, score, 0x10, 150), event(GAME, score, 0x11, 201)],
    ));
    let sink = Arc::new(RecordingSink::default());
    let mut config = poller_config(StartBlock::Explicit(100));
    config.expand_transactions = false;
    let mut poller = EventPoller::new(
        source.clone(),
        sink.clone(),
        resolver(),
        RecordContext::default(),
        config,
    );
    let shutdown = CancellationToken::new();

    for _ in 0..3 {
        poller.run_cycle(&shutdown).await.unwrap();
    }

    let requests = source.requests.lock().unwrap().clone();
    assert_eq!(requests[0].to, BlockReference::Number(200));
    for pair in requests.windows(2) {
        // Each cycle starts where the previous one's upper bound ended.
        assert_eq!(pair[1].from, pair[0].to);
    }

    let mut blocks: Vec<_> = sink.records().iter().filter_map(|r| r.block_number).collect();
    blocks.dedup();
    assert_eq!(blocks, [150, 201]);
    assert_eq!(
        poller.cursor().unwrap().block(),
        requests.last().unwrap().to
    );
}

#[tokio::test]
async fn test_failed_transaction_fetch_is_isolated() {
    let source = Arc::new(MockSource::with_head(200));
    let unknown = Felt::from(0xabu64);
    source.add_page(
        None,
        vec![
            event(GAME, unknown, 0x10, 150),
            event(GAME, unknown, 0x11, 150),
            event(GAME, unknown, 0x10, 151),
        ],
        None,
    );
    source.fail_transaction(Felt::from(0x10u64));
    source.add_transaction(attack_tx(0x11));

    let sink = Arc::new(RecordingSink::default());
    let mut poller = poller(&source, &sink, poller_config(StartBlock::Explicit(100)));
    let stats = poller.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(source.transaction_fetches(), 2);
    assert_eq!(stats.function_calls, 1);
    let names: Vec<_> = sink
        .records()
        .iter()
        .map(|r| r.resolved_name().to_string())
        .collect();
    assert_eq!(names, ["unknown_ab", "unknown_ab", "unknown_ab", "attack"]);
    assert_eq!(poller.cursor().unwrap().block(), BlockReference::Number(200));
}

#[tokio::test]
async fn test_no_addresses_means_one_unfiltered_pass() {
    let source = Arc::new(MockSource::with_head(200));
    source.add_page(None, vec![event(0xbeef, Felt::from(0xeeu64), 0x10, 150)], None);
    let sink = Arc::new(RecordingSink::default());
    let mut config = poller_config(StartBlock::Explicit(100));
    config.addresses.clear();
    config.expand_transactions = false;
    let mut poller = poller(&source, &sink, config);

    poller.run_cycle(&CancellationToken::new()).await.unwrap();

    let requests = source.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].address, None);
    assert_eq!(sink.records()[0].contract_address, Felt::from(0xbeefu64));
}

#[tokio::test]
async fn test_transaction_on_two_pages_is_fetched_once() {
    let source = Arc::new(MockSource::with_head(200));
    let score = Felt::from(0xeeu64);
    source.add_page(None, vec![event(GAME, score, 0x10, 150)], Some("page-2"));
    source.add_page(Some("page-2"), vec![event(GAME, score, 0x10, 150)], None);
    source.add_transaction(attack_tx(0x10));

    let sink = Arc::new(RecordingSink::default());
    let mut poller = poller(&source, &sink, poller_config(StartBlock::Explicit(100)));
    let stats = poller.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(stats.pages, 2);
    assert_eq!(source.transaction_fetches(), 1);
    assert_eq!(stats.function_calls, 1);
    assert_eq!(sink.batch_count(), 2);
    assert_eq!(sink.records().len(), 3);
}

#[tokio::test]
async fn test_every_configured_address_is_polled() {
    let other = Felt::from(0xc2u64);
    let score = Felt::from(0xeeu64);
    let source = Arc::new(MockSource::with_head(200));
    source.add_page_for(Felt::from(GAME), None, vec![event(GAME, score, 0x10, 150)], None);
    source.add_page_for(other, None, vec![event(0xc2, score, 0x11, 151)], Some("next"));
    source.add_page_for(other, Some("next"), vec![event(0xc2, score, 0x12, 152)], None);

    let sink = Arc::new(RecordingSink::default());
    let mut config = poller_config(StartBlock::Explicit(100));
    config.addresses.push(other);
    config.expand_transactions = false;
    let mut poller = poller(&source, &sink, config);

    let stats = poller.run_cycle(&CancellationToken::new()).await.unwrap();

    let addresses: Vec<_> = source.requests().iter().map(|r| r.address).collect();
    assert_eq!(addresses, [Some(Felt::from(GAME)), Some(other), Some(other)]);
    assert_eq!(stats.pages, 3);
    let contracts: Vec<_> = sink.records().iter().map(|r| r.contract_address).collect();
    assert_eq!(contracts, [Felt::from(GAME), other, other]);
    assert_eq!(poller.cursor().unwrap().continuation_token(), None);
}

#[tokio::test]
async fn test_excluded_events_are_dropped_before_expansion() {
    let source = Arc::new(MockSource::with_head(200));
    let moved = event_selector("Moved").unwrap();
    source.add_page(
        None,
        vec![
            event(GAME, moved, 0x10, 150),
            event(GAME, Felt::from(0xeeu64), 0x11, 151),
        ],
        None,
    );
    source.add_transaction(attack_tx(0x10));
    source.add_transaction(attack_tx(0x11));

    let sink = Arc::new(RecordingSink::default());
    let mut config = poller_config(StartBlock::Explicit(100));
    config.exclude_event_names.insert("Moved".to_string());
    let mut poller = poller(&source, &sink, config);

    let stats = poller.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(stats.excluded, 1);
    assert_eq!(source.transaction_fetches(), 1);

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].event_name.as_deref(), Some("Score"));
    assert_eq!(records[1].transaction_hash, Felt::from(0x11u64));
}

#[tokio::test]
async fn test_failed_cycle_keeps_cursor() {
    let source = Arc::new(MockSource::with_head(200));
    source.add_page(
        None,
        vec![event(GAME, Felt::from(0xeeu64), 0x10, 150)],
        None,
    );
    let sink = Arc::new(RecordingSink::default());
    let mut config = poller_config(StartBlock::Explicit(100));
    config.expand_transactions = false;
    let mut poller = poller(&source, &sink, config);
    let shutdown = CancellationToken::new();

    poller.run_cycle(&shutdown).await.unwrap();
    assert_eq!(poller.cursor().unwrap().block(), BlockReference::Number(200));

    source.set_head(300);
    sink.fail.store(true, Ordering::SeqCst);
    assert!(poller.run_cycle(&shutdown).await.is_err());
    assert_eq!(poller.cursor().unwrap().block(), BlockReference::Number(200));

    sink.fail.store(false, Ordering::SeqCst);
    source.fail_events.store(true, Ordering::SeqCst);
    assert!(poller.run_cycle(&shutdown).await.is_err());
    assert_eq!(poller.cursor().unwrap().block(), BlockReference::Number(200));

    source.fail_events.store(false, Ordering::SeqCst);
    poller.run_cycle(&shutdown).await.unwrap();
    assert_eq!(poller.cursor().unwrap().block(), BlockReference::Number(300));
}

#[tokio::test]
async fn test_cancelled_cycle_is_interrupted() {
    let source = Arc::new(MockSource::with_head(200));
    let sink = Arc::new(RecordingSink::default());
    let mut poller = poller(&source, &sink, poller_config(StartBlock::Latest));

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let stats = poller.run_cycle(&shutdown).await.unwrap();

    assert!(stats.interrupted);
    assert!(source.requests().is_empty());
    assert_eq!(poller.cursor().unwrap().block(), BlockReference::Number(200));
}

#[tokio::test]
async fn test_run_until_stops_on_cancel() {
    let source = Arc::new(MockSource::with_head(50));
    source.add_page(
        None,
        vec![event(GAME, Felt::from(0xeeu64), 0x10, 49)],
        None,
    );
    let sink = Arc::new(RecordingSink::default());

    let mut poller = poller_config(StartBlock::Explicit(0));
    poller.expand_transactions = false;
    let config = StarkyConfig::builder()
        .with_source(source.clone())
        .with_sink(sink.clone())
        .with_resolver(resolver())
        .poller(poller)
        .shutdown_timeout(5)
        .build()
        .unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(starky::run_until(config, shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run_until did not return")
        .unwrap()
        .unwrap();
    assert!(sink.batch_count() >= 1);
}
