use dipdeploy::config::CapitalConfig;
use dipdeploy::error::LedgerError;
use dipdeploy::ledger::{CapitalLedger, ReservationToken};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn ledger(equity: Decimal) -> CapitalLedger {
    CapitalLedger::new(&CapitalConfig {
        equity,
        ..CapitalConfig::default()
    })
}

async fn assert_invariant(ledger: &CapitalLedger) {
    let s = ledger.status().await;
    assert!(s.allocated >= Decimal::ZERO, "allocated negative: {:?}", s);
    assert!(s.reserved >= Decimal::ZERO, "reserved negative: {:?}", s);
    assert!(
        s.allocated + s.reserved <= s.deployable,
        "deployable cap breached: {:?}",
        s
    );
    assert_eq!(s.available, s.deployable - s.allocated - s.reserved);
}

/// Random reserve/commit/cancel/release/sync sequences never break the book.
#[tokio::test]
async fn random_sequences_hold_invariant() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let ledger = ledger(dec!(1000000));
        let mut tokens: Vec<ReservationToken> = Vec::new();
        let mut committed: Vec<Decimal> = Vec::new();

        for _ in 0..200 {
            match rng.gen_range(0..5) {
                0 => {
                    let amount = Decimal::from(rng.gen_range(1..120_000u64));
                    match ledger.reserve(amount).await {
                        Ok(token) => tokens.push(token),
                        Err(LedgerError::InsufficientCapital { .. }) => {}
                        Err(e) => panic!("unexpected reserve error: {}", e),
                    }
                }
                1 if !tokens.is_empty() => {
                    let token = tokens.swap_remove(rng.gen_range(0..tokens.len()));
                    // Fill between 90% and 100% of the reservation
                    let pct = Decimal::from(rng.gen_range(90..=100u32)) / dec!(100);
                    let actual = (token.amount() * pct).round_dp(2);
                    ledger.commit(token, actual).await.unwrap();
                    committed.push(actual);
                }
                2 if !tokens.is_empty() => {
                    let token = tokens.swap_remove(rng.gen_range(0..tokens.len()));
                    ledger.cancel_reservation(token).await.unwrap();
                }
                3 if !committed.is_empty() => {
                    let amount = committed.swap_remove(rng.gen_range(0..committed.len()));
                    let pnl = Decimal::from(rng.gen_range(-500i64..=2_000));
                    let before = ledger.status().await;
                    match ledger.release(amount, pnl).await {
                        Ok(()) => {}
                        // A loss can shrink deployable below what is still committed.
                        Err(LedgerError::DeployableCapBreached { .. }) => {
                            assert_eq!(ledger.status().await, before);
                            committed.push(amount);
                        }
                        Err(e) => panic!("unexpected release error: {}", e),
                    }
                }
                4 => {
                    let before = ledger.status().await;
                    let bump = Decimal::from(rng.gen_range(-20_000i64..=20_000));
                    // A shrink that would strand committed capital is refused, not applied.
                    if ledger.sync_equity(before.equity + bump).await.is_err() {
                        assert_eq!(ledger.status().await, before);
                    }
                }
                _ => {}
            }
            assert_invariant(&ledger).await;
        }
    }
}

#[tokio::test]
async fn concurrent_reservations_never_double_book() {
    let ledger = Arc::new(ledger(dec!(1000000)));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.reserve(dec!(35000)).await
        }));
    }

    let mut granted = Vec::new();
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(token) => granted.push(token),
            Err(LedgerError::InsufficientCapital { .. }) => refused += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(granted.len(), 20);
    assert_eq!(refused, 30);
    let status = ledger.status().await;
    assert_eq!(status.reserved, dec!(700000));
    assert_eq!(status.available, Decimal::ZERO);

    let mut seqs: Vec<u64> = granted.iter().map(|t| t.seq()).collect();
    seqs.sort_unstable();
    seqs.dedup();
    assert_eq!(seqs.len(), 20);

    for token in granted {
        ledger.commit(token, dec!(35000)).await.unwrap();
    }
    assert_invariant(&ledger).await;
    assert_eq!(ledger.status().await.allocated, dec!(700000));
}

#[tokio::test]
async fn reserve_commit_release_returns_to_start() {
    let ledger = ledger(dec!(1000000));
    let token = ledger.reserve(dec!(35000)).await.unwrap();
    ledger.commit(token, dec!(35000)).await.unwrap();
    ledger.release(dec!(35000), Decimal::ZERO).await.unwrap();

    let status = ledger.status().await;
    assert_eq!(status.allocated, Decimal::ZERO);
    assert_eq!(status.reserved, Decimal::ZERO);
    assert_eq!(status.equity, dec!(1000000));
    assert_eq!(status.available, dec!(700000));
}

#[tokio::test]
async fn profit_grows_every_bucket() {
    let ledger = ledger(dec!(1000000));
    let token = ledger.reserve(dec!(35000)).await.unwrap();
    ledger.commit(token, dec!(35000)).await.unwrap();
    ledger.release(dec!(35000), dec!(10000)).await.unwrap();

    let status = ledger.status().await;
    assert_eq!(status.equity, dec!(1010000));
    assert_eq!(status.deployable, dec!(707000));
    assert_eq!(status.reserve, dec!(303000));
    assert_eq!(status.per_trade, dec!(35350));
}
