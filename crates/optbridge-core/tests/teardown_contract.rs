//! Contract Test: Teardown Determinism
//!
//! This test verifies that sessions release everything they own.
//!
//! Constraints verified:
//! - Disconnect mid-discovery leaves zero watchers and no pending timers
//! - Disconnect after binding releases all boundary watchers
//! - Rebinding a host replaces its session instead of adding one
//! - Shutdown and drop stop every session
//!
//! If this test fails, someone has added:
//! - Watchers that are not owned by the session
//! - Timers that outlive the session task
//! - A second session per host

mod common;

use common::*;
use optbridge_core::dom::NodeSpec;
use optbridge_core::{BridgeEvent, SessionOutcome};
use std::time::Duration;

#[tokio::test]
async fn disconnect_during_retry_cancels_timer() {
    let (dom, host) = product_page(None);
    let widget = mount_bare_widget(&dom, host);
    let (dispatcher, mut bus) = RecordingDispatcher::new();
    let (bridge, mut events) = bridge(&dom, dispatcher, fast_config(50));

    bridge.connect(host).await;
    tokio::time::sleep(Duration::from_millis(25)).await;

    let outcome = tokio::time::timeout(Duration::from_secs(1), bridge.disconnect(host))
        .await
        .expect("disconnect returns promptly");
    assert_eq!(outcome, Some(SessionOutcome::Disconnected));
    assert_eq!(dom.live_observer_count(), 0);
    assert!(!bridge.is_connected(host).await);

    // A boundary showing up now must not be discovered by anyone
    render_widget(&dom, widget);
    tokio::time::sleep(Duration::from_millis(50)).await;
    expect_quiet(&mut bus).await;

    let mut saw_bound = false;
    while let Ok(event) = events.try_recv() {
        saw_bound |= matches!(event, BridgeEvent::Bound { .. });
    }
    assert!(!saw_bound);
}

#[tokio::test]
async fn disconnect_while_awaiting_widget_host() {
    let (dom, host) = product_page(None);
    let (dispatcher, _bus) = RecordingDispatcher::new();
    let (bridge, mut events) = bridge(&dom, dispatcher, fast_config(5));

    bridge.connect(host).await;
    wait_for_event(&mut events, |e| matches!(e, BridgeEvent::AwaitingWidgetHost { .. })).await;
    assert_eq!(dom.live_observer_count(), 1, "only the appearance watcher");

    assert_eq!(
        bridge.disconnect(host).await,
        Some(SessionOutcome::Disconnected)
    );
    assert_eq!(dom.live_observer_count(), 0);
}

#[tokio::test]
async fn disconnect_after_binding_releases_boundary_watchers() {
    let (dom, host) = product_page(None);
    mount_ready_widget(&dom, host);
    let (dispatcher, mut bus) = RecordingDispatcher::new();
    let (bridge, _events) = bridge(&dom, dispatcher, fast_config(5));

    bridge.connect(host).await;
    expect_envelopes(&mut bus, 2).await;
    // Content was ready at bind: three boundary watchers, no content-ready watcher
    assert_eq!(dom.live_observer_count(), 3);

    bridge.disconnect(host).await;
    assert_eq!(dom.live_observer_count(), 0);

    select(&dom, "opt-once", "opt-sub");
    expect_quiet(&mut bus).await;
}

#[tokio::test]
async fn content_ready_watcher_fires_once_then_disconnects() {
    let (dom, host) = product_page(None);
    let widget = mount_bare_widget(&dom, host);
    let root = dom.attach_shadow(widget).unwrap();
    let (dispatcher, mut bus) = RecordingDispatcher::new();
    let (bridge, mut events) = bridge(&dom, dispatcher, fast_config(5));

    bridge.connect(host).await;
    wait_for_event(&mut events, |e| matches!(e, BridgeEvent::Bound { .. })).await;
    assert_eq!(dom.live_observer_count(), 4, "boundary watchers plus content-ready");

    dom.mount(root, &widget_content()).unwrap();
    let envelopes = expect_envelopes(&mut bus, 2).await;
    assert!(is_selection(&envelopes[0]));
    assert_eq!(dom.live_observer_count(), 3);

    // More content streaming in does not re-run the initial check
    dom.mount(root, &NodeSpec::element("p").with_text("Free shipping")).unwrap();
    expect_quiet(&mut bus).await;
}

#[tokio::test]
async fn rebinding_replaces_the_session() {
    let (dom, host) = product_page(None);
    mount_ready_widget(&dom, host);
    let (dispatcher, mut bus) = RecordingDispatcher::new();
    let (bridge, _events) = bridge(&dom, dispatcher, fast_config(5));

    bridge.connect(host).await;
    expect_envelopes(&mut bus, 2).await;
    bridge.connect(host).await;
    // The fresh session starts from scratch and reports the initial state again
    expect_envelopes(&mut bus, 2).await;

    assert_eq!(bridge.connected_hosts().await, vec![host]);
    assert_eq!(dom.live_observer_count(), 3);

    select(&dom, "opt-once", "opt-sub");
    expect_envelopes(&mut bus, 2).await;
    expect_quiet(&mut bus).await;
}

#[tokio::test]
async fn shutdown_stops_every_session() {
    let (dom, host) = product_page(None);
    mount_ready_widget(&dom, host);
    let other = dom
        .mount(dom.document(), &NodeSpec::element("product-info"))
        .unwrap();
    let (dispatcher, _bus) = RecordingDispatcher::new();
    let (bridge, _events) = bridge(&dom, dispatcher, fast_config(5));

    bridge.connect(host).await;
    bridge.connect(other).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(bridge.connected_hosts().await.len(), 2);

    tokio::time::timeout(Duration::from_secs(1), bridge.shutdown())
        .await
        .expect("shutdown completes");
    assert!(bridge.connected_hosts().await.is_empty());
    assert_eq!(dom.live_observer_count(), 0);
}

#[tokio::test]
async fn dropping_the_bridge_stops_sessions() {
    let (dom, host) = product_page(None);
    mount_ready_widget(&dom, host);
    let (dispatcher, mut bus) = RecordingDispatcher::new();
    let (bridge, _events) = bridge(&dom, dispatcher, fast_config(5));

    bridge.connect(host).await;
    expect_envelopes(&mut bus, 2).await;
    drop(bridge);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(dom.live_observer_count(), 0);
}
