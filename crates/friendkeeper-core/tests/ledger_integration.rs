//! Integration tests for the credit ledger: grant, consumption order,
//! idempotent settlement, and concurrent consumption from one device.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use friendkeeper_core::{
    await_settlement, reconcile, CoreError, CreditLedger, CreditOutcome, Database, DeviceIdentity,
};

fn identity(raw: &str) -> DeviceIdentity {
    DeviceIdentity::new(raw.to_string())
}

#[test]
fn full_lifecycle_grant_consume_credit() {
    let ledger = CreditLedger::open_memory(3).unwrap();
    let dev = identity("dev-lifecycle");

    // Lazy initial grant.
    let balance = ledger.balance(&dev).unwrap();
    assert_eq!(balance.free_trial_remaining, 3);
    assert_eq!(balance.tokens_remaining, 0);

    // Burn the free trial.
    for expected_left in (0..3).rev() {
        let balance = ledger.consume_one(&dev).unwrap();
        assert_eq!(balance.free_trial_remaining, expected_left);
    }
    assert!(matches!(
        ledger.consume_one(&dev).unwrap_err(),
        CoreError::InsufficientBalance
    ));

    // Purchase lands, consumption resumes from the paid counter.
    ledger.credit(&dev, 10, "purchase-1").unwrap();
    let balance = ledger.consume_one(&dev).unwrap();
    assert_eq!(balance.free_trial_remaining, 0);
    assert_eq!(balance.tokens_remaining, 9);
}

#[test]
fn concurrent_consumers_never_overdraw() {
    let ledger = Arc::new(CreditLedger::open_memory(5).unwrap());
    let dev = identity("dev-race");
    ledger.credit(&dev, 5, "purchase-race").unwrap();
    let starting_total = ledger.balance(&dev).unwrap().total();
    assert_eq!(starting_total, 10);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let ledger = Arc::clone(&ledger);
        let dev = dev.clone();
        handles.push(thread::spawn(move || {
            let mut successes = 0u32;
            for _ in 0..5 {
                if ledger.consume_one(&dev).is_ok() {
                    successes += 1;
                }
            }
            successes
        }));
    }

    let total_consumed: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // 20 attempts against 10 units: exactly 10 succeed, rest are rejected.
    assert_eq!(total_consumed, starting_total);
    let balance = ledger.balance(&dev).unwrap();
    assert_eq!(balance.total(), 0);
    assert_eq!(balance.free_trial_remaining, 0);
    assert_eq!(balance.tokens_remaining, 0);
}

#[test]
fn settlement_replay_is_invisible() {
    let db = Database::open_memory().unwrap();
    let ledger = CreditLedger::open_memory(3).unwrap();
    let dev = identity("dev-settle");

    let first = reconcile(&db, &ledger, &dev, "purchase-x", 30).unwrap();
    assert_eq!(first, CreditOutcome::Credited);
    let after_first = ledger.balance(&dev).unwrap();

    // Same webhook delivered again.
    let second = reconcile(&db, &ledger, &dev, "purchase-x", 30).unwrap();
    assert_eq!(second, CreditOutcome::AlreadySettled);
    assert_eq!(ledger.balance(&dev).unwrap(), after_first);
    assert_eq!(after_first.tokens_remaining, 30);
}

#[test]
fn ledgers_are_isolated_per_device() {
    let ledger = CreditLedger::open_memory(2).unwrap();
    let a = identity("dev-a");
    let b = identity("dev-b");

    ledger.consume_one(&a).unwrap();
    ledger.consume_one(&a).unwrap();
    assert!(ledger.consume_one(&a).is_err());

    // Device B is untouched by A's exhaustion.
    assert_eq!(ledger.balance(&b).unwrap().free_trial_remaining, 2);
}

#[tokio::test]
async fn poll_after_redirect_sees_delayed_settlement() {
    let ledger = Arc::new(CreditLedger::open_memory(0).unwrap());
    let dev = identity("dev-poll");
    let baseline = ledger.balance(&dev).unwrap().total();

    // Webhook arrives while the client is polling.
    let settler = {
        let ledger = Arc::clone(&ledger);
        let dev = dev.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ledger.credit(&dev, 30, "purchase-late").unwrap();
        })
    };

    let balance = await_settlement(&ledger, &dev, baseline, 50, Duration::from_millis(5))
        .await
        .unwrap();
    settler.await.unwrap();
    assert_eq!(balance.tokens_remaining, 30);
}
