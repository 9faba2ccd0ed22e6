// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end: bounded fan-out, outcome aggregation, cancellation.

mod support;

use serde_json::json;
use shelly_connect::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use support::{FakeTransport, gen2_device};

fn fleet_with(n: usize, concurrency: usize) -> Fleet {
    let fleet = Fleet::new(FleetConfig {
        concurrency,
        health_threshold: Duration::from_secs(300),
    });
    for i in 0..n {
        let transport = FakeTransport::new()
            .respond_rpc("Switch.Toggle", json!({"was_on": i % 2 == 0}))
            .into_arc();
        fleet.add(Arc::new(gen2_device(&format!("dev-{i}"), "SNSW-001X16EU", transport)));
    }
    fleet
}

// ---------------------------------------------------------------------------
// 1. Fan-out toggles every device and aggregates outcomes
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn fanout_reaches_every_device() {
    let fleet = fleet_with(10, 4);
    let outcomes = fleet
        .run(&CancellationToken::new(), |device, ctx| async move {
            device.switch(0).toggle(&ctx).await
        })
        .await;

    assert_eq!(outcomes.len(), 10);
    for (id, outcome) in &outcomes {
        let result = outcome.as_ref().unwrap_or_else(|e| panic!("{id} failed: {e}"));
        assert!(result.was_on.is_some());
    }
    // Command completion marks every device healthy.
    assert!(fleet.unhealthy().is_empty());
}

// ---------------------------------------------------------------------------
// 2. The concurrency cap bounds in-flight calls
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn concurrency_cap_is_never_exceeded() {
    let fleet = fleet_with(16, 3);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let outcomes = fleet
        .run(&CancellationToken::new(), |_device, _ctx| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(15)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

    assert_eq!(outcomes.len(), 16);
    assert!(peak.load(Ordering::SeqCst) <= 3, "peak: {}", peak.load(Ordering::SeqCst));
}

// ---------------------------------------------------------------------------
// 3. Cancellation propagates; the outcome map keeps its cardinality
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_reaches_all_pending_work() {
    let fleet = fleet_with(8, 2);
    let ctx = CancellationToken::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(25)).await;
        canceller.cancel();
    });

    let outcomes = fleet
        .run(&ctx, |_device, ctx| async move {
            tokio::select! {
                () = ctx.cancelled() => Err(Error::cancelled()),
                () = tokio::time::sleep(Duration::from_secs(60)) => Ok(()),
            }
        })
        .await;

    assert_eq!(outcomes.len(), 8);
    assert!(outcomes.values().all(|o| o.as_ref().is_err_and(Error::is_cancelled)));
}

// ---------------------------------------------------------------------------
// 4. Groups target a subset; missing members are reported, not dropped
// ---------------------------------------------------------------------------

#[tokio::test]
async fn group_operations_report_missing_members() {
    let fleet = fleet_with(3, 3);
    fleet.set_group("upstairs", ["dev-0", "dev-2", "dev-gone"]);

    let outcomes = fleet
        .run_group(&CancellationToken::new(), "upstairs", |device, ctx| async move {
            device.switch(0).toggle(&ctx).await
        })
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes["dev-0"].is_ok());
    assert!(outcomes["dev-2"].is_ok());
    assert_eq!(
        outcomes["dev-gone"].as_ref().unwrap_err().kind,
        ErrorKind::DeviceNotFound
    );
}
