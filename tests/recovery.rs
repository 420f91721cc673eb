mod common;

use chrono::Utc;
use common::{test_config, Harness, ScriptedGateway};
use dipdeploy::adapters::StaticPriceFeed;
use dipdeploy::config::CapitalConfig;
use dipdeploy::domain::{OrderKind, Position, PositionStatus, SymbolState};
use dipdeploy::engine::EngineContext;
use dipdeploy::error::DeployError;
use dipdeploy::ledger::CapitalLedger;
use dipdeploy::persistence::{EngineSnapshot, FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn capital() -> CapitalConfig {
    CapitalConfig {
        equity: dec!(1000000),
        ..CapitalConfig::default()
    }
}

#[tokio::test]
async fn open_position_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("snapshot.json");

    {
        let store: Arc<dyn SnapshotStore> = Arc::new(FileSnapshotStore::new(&path));
        let h = Harness::new(test_config(&["NIFTYBEES"]), dec!(100), Some(store)).await;
        h.set_price("NIFTYBEES", dec!(98)).await;
        h.engine.tick(Utc::now()).await.unwrap();
        assert_eq!(h.engine.open_positions().await.len(), 1);
    }
    assert!(path.exists());

    let store: Arc<dyn SnapshotStore> = Arc::new(FileSnapshotStore::new(&path));
    let h = Harness::new(test_config(&["NIFTYBEES"]), dec!(100), Some(store)).await;

    let positions = h.engine.open_positions().await;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].status, PositionStatus::Open);
    assert_eq!(positions[0].entry_price, dec!(98));
    assert_eq!(h.ledger.status().await.allocated, dec!(34986));
    assert_eq!(
        h.engine.symbol_state("NIFTYBEES").await,
        Some(SymbolState::Holding)
    );

    h.set_price("NIFTYBEES", dec!(101)).await;
    h.engine.tick(Utc::now()).await.unwrap();
    assert!(h.engine.open_positions().await.is_empty());
    assert_eq!(h.ledger.status().await.allocated, Decimal::ZERO);
}

#[tokio::test]
async fn crash_between_reserve_and_ack_fails_the_entry() {
    let ledger = CapitalLedger::new(&capital());
    let token = ledger.reserve(dec!(35000)).await.unwrap();
    let pending = Position::pending(
        "NIFTYBEES",
        dec!(98),
        357,
        dec!(35000),
        token.seq(),
        OrderKind::Cash,
    );
    let snapshot = EngineSnapshot::new(ledger.snapshot().await, vec![pending]);
    let store = Arc::new(MemorySnapshotStore::new());
    store.save(&snapshot).await.unwrap();

    let h = Harness::new(test_config(&["NIFTYBEES"]), dec!(100), common::shared(&store)).await;

    let status = h.ledger.status().await;
    assert_eq!(status.reserved, Decimal::ZERO);
    assert_eq!(status.allocated, Decimal::ZERO);
    assert_eq!(status.available, dec!(700000));

    let registry = h.registry.read().await;
    assert!(registry.get("NIFTYBEES").is_none());
    assert_eq!(registry.stats().failed_entries, 1);
    drop(registry);
    assert_eq!(
        h.engine.symbol_state("NIFTYBEES").await,
        Some(SymbolState::Watching)
    );

    // The settled state is written back at once
    let saved = store.load().await.unwrap().unwrap();
    assert!(saved.ledger.outstanding.is_empty());
    assert!(saved.positions.is_empty());
}

#[tokio::test]
async fn crash_during_exit_reverts_to_open() {
    let ledger = CapitalLedger::new(&capital());
    let token = ledger.reserve(dec!(35000)).await.unwrap();
    ledger.commit(token, dec!(34986)).await.unwrap();

    let mut position = Position::pending("NIFTYBEES", dec!(98), 357, dec!(35000), 1, OrderKind::Cash);
    position.status = PositionStatus::Closing;
    position.reservation_seq = None;
    position.allocated_amount = dec!(34986);
    position.target_price = dec!(100.94);
    position.stop_price = dec!(93.10);
    let store = Arc::new(MemorySnapshotStore::new());
    store
        .save(&EngineSnapshot::new(ledger.snapshot().await, vec![position]))
        .await
        .unwrap();

    let h = Harness::new(test_config(&["NIFTYBEES"]), dec!(100), common::shared(&store)).await;

    let positions = h.engine.open_positions().await;
    assert_eq!(positions[0].status, PositionStatus::Open);
    assert_eq!(
        h.engine.symbol_state("NIFTYBEES").await,
        Some(SymbolState::Holding)
    );

    h.set_price("NIFTYBEES", dec!(101)).await;
    h.engine.tick(Utc::now()).await.unwrap();
    assert!(h.engine.open_positions().await.is_empty());
}

#[tokio::test]
async fn allocation_mismatch_blocks_startup() {
    let ledger = CapitalLedger::new(&capital());
    let mut position = Position::pending("NIFTYBEES", dec!(98), 357, dec!(35000), 1, OrderKind::Cash);
    position.status = PositionStatus::Open;
    position.reservation_seq = None;
    let store = Arc::new(MemorySnapshotStore::new());
    store
        .save(&EngineSnapshot::new(ledger.snapshot().await, vec![position]))
        .await
        .unwrap();

    let feed = Arc::new(StaticPriceFeed::new());
    let gateway = Arc::new(ScriptedGateway::new(feed.clone()));
    let ctx = EngineContext::new(test_config(&["NIFTYBEES"]), feed, gateway)
        .with_snapshot_store(store);

    let err = ctx.recover().await.unwrap_err();
    assert!(matches!(err, DeployError::InvariantViolation(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn every_committed_transition_is_persisted() {
    let store = Arc::new(MemorySnapshotStore::new());
    let h = Harness::new(test_config(&["NIFTYBEES"]), dec!(100), common::shared(&store)).await;

    h.set_price("NIFTYBEES", dec!(98)).await;
    h.engine.tick(Utc::now()).await.unwrap();

    // PENDING registration, then OPEN
    assert_eq!(store.save_count().await, 2);
    let latest = store.load().await.unwrap().unwrap();
    assert_eq!(latest.positions.len(), 1);
    assert_eq!(latest.positions[0].status, PositionStatus::Open);
    assert_eq!(latest.ledger.allocated, dec!(34986));
    assert!(latest.ledger.outstanding.is_empty());
}
