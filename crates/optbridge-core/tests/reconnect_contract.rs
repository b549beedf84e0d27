//! Contract Test: Reconnect Policy
//!
//! This test verifies what a reconnect does after a host's discovery budget
//! ran out.
//!
//! Constraints verified:
//! - `restart` starts a fresh session with a fresh attempt counter
//! - `remain_failed` keeps the host permanently inert
//! - Hosts whose discovery succeeded always reconnect

mod common;

use common::*;
use optbridge_core::config::ReconnectPolicy;
use optbridge_core::{BridgeEvent, SessionOutcome};

async fn exhaust(
    bridge: &optbridge_core::PurchaseOptionBridge,
    events: &mut tokio::sync::mpsc::Receiver<BridgeEvent>,
    host: optbridge_core::NodeId,
) {
    bridge.connect(host).await;
    wait_for_event(events, |e| matches!(e, BridgeEvent::DiscoveryExhausted { .. })).await;
    assert_eq!(
        bridge.disconnect(host).await,
        Some(SessionOutcome::DiscoveryExhausted)
    );
}

#[tokio::test]
async fn restart_policy_retries_with_fresh_budget() {
    let (dom, host) = product_page(None);
    let widget = mount_bare_widget(&dom, host);
    let (dispatcher, mut bus) = RecordingDispatcher::new();
    let (bridge, mut events) = bridge(&dom, dispatcher, fast_config(2));

    exhaust(&bridge, &mut events, host).await;

    render_widget(&dom, widget);
    assert!(bridge.connect(host).await);

    let bound = wait_for_event(&mut events, |e| matches!(e, BridgeEvent::Bound { .. })).await;
    assert_eq!(
        bound,
        BridgeEvent::Bound {
            host,
            widget_host: widget,
            attempts: 1
        }
    );
    expect_envelopes(&mut bus, 2).await;
}

#[tokio::test]
async fn remain_failed_policy_ignores_reconnects() {
    let (dom, host) = product_page(None);
    let widget = mount_bare_widget(&dom, host);
    let (dispatcher, mut bus) = RecordingDispatcher::new();
    let mut config = fast_config(2);
    config.discovery.reconnect = ReconnectPolicy::RemainFailed;
    let (bridge, mut events) = bridge(&dom, dispatcher, config);

    exhaust(&bridge, &mut events, host).await;

    render_widget(&dom, widget);
    assert!(!bridge.connect(host).await);
    assert!(!bridge.is_connected(host).await);
    assert_eq!(dom.live_observer_count(), 0);
    expect_quiet(&mut bus).await;
}

#[tokio::test]
async fn remain_failed_applies_when_rebinding_an_exhausted_session() {
    let (dom, host) = product_page(None);
    mount_bare_widget(&dom, host);
    let (dispatcher, _bus) = RecordingDispatcher::new();
    let mut config = fast_config(2);
    config.discovery.reconnect = ReconnectPolicy::RemainFailed;
    let (bridge, mut events) = bridge(&dom, dispatcher, config);

    bridge.connect(host).await;
    wait_for_event(&mut events, |e| matches!(e, BridgeEvent::SessionStopped { .. })).await;

    // Still registered until disconnected, but rebinding is refused
    assert!(bridge.is_connected(host).await);
    assert!(!bridge.connect(host).await);
    assert!(!bridge.is_connected(host).await);
}

#[tokio::test]
async fn successful_hosts_always_reconnect() {
    let (dom, host) = product_page(None);
    mount_ready_widget(&dom, host);
    let (dispatcher, mut bus) = RecordingDispatcher::new();
    let mut config = fast_config(2);
    config.discovery.reconnect = ReconnectPolicy::RemainFailed;
    let (bridge, _events) = bridge(&dom, dispatcher, config);

    bridge.connect(host).await;
    expect_envelopes(&mut bus, 2).await;
    bridge.disconnect(host).await;

    assert!(bridge.connect(host).await);
    expect_envelopes(&mut bus, 2).await;
}
