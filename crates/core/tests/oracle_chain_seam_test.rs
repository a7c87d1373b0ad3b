//! Tests for the OracleChain seam using an in-memory fake
//!
//! Run with: cargo test -p sightflow-core --test oracle_chain_seam_test

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sightflow_core::{
    Address, CallbackEvent, ChainError, CorrelationToken, EventCategory, OracleChain, PendingTx,
    Receipt, TxHash, TxStatus,
};
use tokio::sync::broadcast;

struct FakeChain {
    receipts: HashMap<TxHash, Receipt>,
    events: broadcast::Sender<CallbackEvent>,
}

impl FakeChain {
    fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            receipts: HashMap::new(),
            events,
        }
    }

    fn mine(&mut self, request_id: Option<CorrelationToken>) -> PendingTx {
        let hash = TxHash::random();
        self.receipts.insert(
            hash,
            Receipt {
                hash,
                block_number: self.receipts.len() as u64 + 1,
                status: TxStatus::Success,
                request_id,
            },
        );
        PendingTx { hash }
    }
}

#[async_trait]
impl OracleChain for FakeChain {
    async fn confirm(&self, tx: &PendingTx) -> Result<Receipt, ChainError> {
        self.receipts
            .get(&tx.hash)
            .cloned()
            .ok_or(ChainError::UnknownTransaction(tx.hash))
    }

    fn subscribe_events(&self) -> broadcast::Receiver<CallbackEvent> {
        self.events.subscribe()
    }
}

#[tokio::test]
async fn test_request_id_comes_from_the_receipt() {
    let mut chain = FakeChain::new();
    let token = CorrelationToken::random();
    let tx = chain.mine(Some(token.clone()));

    assert_eq!(chain.await_request_id(&tx).await, Ok(token));
}

#[tokio::test]
async fn test_transaction_without_request() {
    let mut chain = FakeChain::new();
    let tx = chain.mine(None);

    let receipt = chain.confirm(&tx).await.unwrap();
    assert!(receipt.is_success());
    assert_eq!(
        chain.await_request_id(&tx).await,
        Err(ChainError::NoRequestIssued(tx.hash))
    );
}

#[tokio::test]
async fn test_unknown_transaction_propagates() {
    let chain = FakeChain::new();
    let tx = PendingTx {
        hash: TxHash::random(),
    };

    assert_eq!(
        chain.await_request_id(&tx).await,
        Err(ChainError::UnknownTransaction(tx.hash))
    );
}

#[tokio::test]
async fn test_callbacks_reach_every_subscriber() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Initialized {
        initial_value: u64,
    }

    let chain = FakeChain::new();
    let mut first = chain.subscribe_events();
    let mut second = chain.subscribe_events();
    let emitter = Address::random();
    let token = CorrelationToken::parse_hex("0x0102").unwrap();

    chain
        .events
        .send(CallbackEvent::new(
            EventCategory::initialize_callback(emitter),
            token.clone(),
            json!({ "initial_value": 0 }),
        ))
        .unwrap();

    for receiver in [&mut first, &mut second] {
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.token, token);
        assert_eq!(event.category.emitter, emitter);
        assert_eq!(
            event.decode_payload::<Initialized>().unwrap(),
            Initialized { initial_value: 0 }
        );
    }
}
