//! In-memory data source and sink shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use serde_json::Value;
use starknet::core::types::{EmittedEvent, Felt};
use starky::async_trait;
use starky::etl::extractor::{
    BlockReference, DataSource, EventsPage, EventsRequest, TransactionView,
};
use starky::etl::record::ProcessedLogRecord;
use starky::etl::sink::LogSink;

type PageKey = (Option<Felt>, Option<String>);

/// Serves pages keyed by address and continuation token. The first page is
/// keyed by a `None` token, pages registered without an address serve any.
#[derive(Default)]
pub struct MockSource {
    pub head: AtomicU64,
    pub pages: Mutex<HashMap<PageKey, EventsPage>>,
    pub transactions: Mutex<HashMap<Felt, TransactionView>>,
    pub failing_transactions: Mutex<HashSet<Felt>>,
    pub abis: Mutex<HashMap<Felt, Value>>,
    pub requests: Mutex<Vec<EventsRequest>>,
    pub transaction_fetches: AtomicUsize,
    pub fail_events: AtomicBool,
}

impl MockSource {
    pub fn with_head(head: u64) -> Self {
        let source = Self::default();
        source.head.store(head, Ordering::SeqCst);
        source
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn add_page(&self, token: Option<&str>, events: Vec<EmittedEvent>, next: Option<&str>) {
        self.insert_page(None, token, events, next);
    }

    pub fn add_page_for(
        &self,
        address: Felt,
        token: Option<&str>,
        events: Vec<EmittedEvent>,
        next: Option<&str>,
    ) {
        self.insert_page(Some(address), token, events, next);
    }

    fn insert_page(
        &self,
        address: Option<Felt>,
        token: Option<&str>,
        events: Vec<EmittedEvent>,
        next: Option<&str>,
    ) {
        self.pages.lock().unwrap().insert(
            (address, token.map(str::to_string)),
            EventsPage {
                events,
                continuation_token: next.map(str::to_string),
            },
        );
    }

    pub fn add_transaction(&self, tx: TransactionView) {
        self.transactions.lock().unwrap().insert(tx.hash, tx);
    }

    pub fn fail_transaction(&self, hash: Felt) {
        self.failing_transactions.lock().unwrap().insert(hash);
    }

    pub fn requests(&self) -> Vec<EventsRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn transaction_fetches(&self) -> usize {
        self.transaction_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for MockSource {
    async fn get_events(&self, request: EventsRequest) -> Result<EventsPage> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_events.load(Ordering::SeqCst) {
            bail!("node unavailable");
        }
        let pages = self.pages.lock().unwrap();
        let token = request.continuation_token;
        Ok(pages
            .get(&(request.address, token.clone()))
            .or_else(|| pages.get(&(None, token)))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_transaction(&self, hash: Felt) -> Result<Option<TransactionView>> {
        self.transaction_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing_transactions.lock().unwrap().contains(&hash) {
            bail!("transaction {hash:#x} timed out");
        }
        Ok(self.transactions.lock().unwrap().get(&hash).cloned())
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_contract_abi(&self, address: Felt) -> Result<Option<Value>> {
        Ok(self.abis.lock().unwrap().get(&address).cloned())
    }
}

/// Chain whose head moves forward by `step` after every events request.
///
/// Serves the events whose block lies in the requested range.
pub struct GrowingChain {
    pub head: AtomicU64,
    pub step: u64,
    pub events: Vec<EmittedEvent>,
    pub requests: Mutex<Vec<EventsRequest>>,
}

impl GrowingChain {
    pub fn new(head: u64, step: u64, events: Vec<EmittedEvent>) -> Self {
        Self {
            head: AtomicU64::new(head),
            step,
            events,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DataSource for GrowingChain {
    async fn get_events(&self, request: EventsRequest) -> Result<EventsPage> {
        let head = self.head.fetch_add(self.step, Ordering::SeqCst);
        let bound = |reference: BlockReference| match reference {
            BlockReference::Number(block) => block,
            BlockReference::Head => head,
        };
        let (from, to) = (bound(request.from), bound(request.to));
        self.requests.lock().unwrap().push(request);

        Ok(EventsPage {
            events: self
                .events
                .iter()
                .filter(|e| e.block_number.is_some_and(|b| (from..=to).contains(&b)))
                .cloned()
                .collect(),
            continuation_token: None,
        })
    }

    async fn get_transaction(&self, _: Felt) -> Result<Option<TransactionView>> {
        Ok(None)
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_contract_abi(&self, _: Felt) -> Result<Option<Value>> {
        Ok(None)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<Vec<ProcessedLogRecord>>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<ProcessedLogRecord> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, records: &[ProcessedLogRecord]) -> Result<u16> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("intake returned 503");
        }
        self.batches.lock().unwrap().push(records.to_vec());
        Ok(202)
    }
}

pub fn event(from: u64, selector: Felt, tx: u64, block: u64) -> EmittedEvent {
    EmittedEvent {
        from_address: Felt::from(from),
        keys: vec![selector],
        data: vec![Felt::ONE],
        block_hash: None,
        block_number: Some(block),
        transaction_hash: Felt::from(tx),
    }
}
