//! Contract Test: Selection and Price Synchronization
//!
//! This test verifies the event sequence produced by widget state changes.
//!
//! Constraints verified:
//! - Switching options emits SelectionChanged followed by exactly one
//!   VariantUpdated
//! - A price-only change emits VariantUpdated only
//! - SelectionChanged targets the host and does not bubble; VariantUpdated
//!   targets the product form and bubbles
//! - Extraction failures suppress dispatch

mod common;

use common::*;
use optbridge_core::BridgeEvent;
use optbridge_core::events::{ChangeType, DomainEvent, PlanKind, SELECTION_CHANGED, VARIANT_UPDATED};
use serde_json::json;

#[tokio::test]
async fn one_time_to_discounted_subscription() {
    let (dom, host) = product_page(None);
    mount_ready_widget(&dom, host);
    let (dispatcher, mut bus) = RecordingDispatcher::new();
    let (bridge, _events) = bridge(&dom, dispatcher, fast_config(5));
    bridge.connect(host).await;

    let initial = expect_envelopes(&mut bus, 2).await;
    select(&dom, "opt-once", "opt-sub");
    let switched = expect_envelopes(&mut bus, 2).await;
    expect_quiet(&mut bus).await;

    let names: Vec<_> = initial.iter().chain(&switched).map(|e| e.name).collect();
    assert_eq!(
        names,
        vec![SELECTION_CHANGED, VARIANT_UPDATED, SELECTION_CHANGED, VARIANT_UPDATED]
    );

    let DomainEvent::SelectionChanged(first) = &initial[0].detail else {
        unreachable!();
    };
    assert_eq!(first.plan_type, PlanKind::OneTime);
    assert_eq!(first.price, 10.0);
    assert!(!first.has_discount);

    let DomainEvent::SelectionChanged(second) = &switched[0].detail else {
        unreachable!();
    };
    assert_eq!(second.plan_type, PlanKind::Subscription);
    assert_eq!(second.price, 8.5);
    assert!(second.has_discount);
    assert_eq!(second.change_type, ChangeType::Selection);
    assert_eq!(Some(second.selected_option), dom.find_by_id("opt-sub"));
    assert_eq!(Some(second.price_element), dom.find_by_id("price-sub"));
}

#[tokio::test]
async fn events_are_dispatched_on_the_right_scope() {
    let (dom, host) = product_page(None);
    mount_ready_widget(&dom, host);
    let (dispatcher, mut bus) = RecordingDispatcher::new();
    let (bridge, _events) = bridge(&dom, dispatcher, fast_config(5));
    bridge.connect(host).await;

    let envelopes = expect_envelopes(&mut bus, 2).await;

    assert_eq!(envelopes[0].target, host);
    assert!(!envelopes[0].bubbles);

    assert_eq!(Some(envelopes[1].target), dom.find_by_id("form"));
    assert!(envelopes[1].bubbles);
    let DomainEvent::VariantUpdated(update) = &envelopes[1].detail else {
        unreachable!();
    };
    assert_eq!(update.source, "purchase-option-bridge");
    assert_eq!(update.data.product_id.as_deref(), Some(PRODUCT_ID));
    assert_eq!(update.data.new_product, None);
    assert_eq!(
        update.data.html,
        r#"<div id="price-main" class="price-container"><span id="price-once" part="price">$10.00</span></div>"#
    );
    assert_eq!(
        update.resource,
        json!({"id": 101, "available": true, "inventory_management": false})
    );
}

#[tokio::test]
async fn price_only_change_emits_variant_update_only() {
    let (dom, host) = product_page(None);
    mount_ready_widget(&dom, host);
    let (dispatcher, mut bus) = RecordingDispatcher::new();
    let (bridge, _events) = bridge(&dom, dispatcher, fast_config(5));
    bridge.connect(host).await;
    expect_envelopes(&mut bus, 2).await;

    let price = dom.find_by_id("price-once").unwrap();
    dom.update_text(price, "$12.00").unwrap();

    let envelopes = expect_envelopes(&mut bus, 1).await;
    expect_quiet(&mut bus).await;
    assert_eq!(envelopes[0].name, VARIANT_UPDATED);
    let DomainEvent::VariantUpdated(update) = &envelopes[0].detail else {
        unreachable!();
    };
    assert!(update.data.html.contains("$12.00"));
}

#[tokio::test]
async fn unparsable_price_suppresses_dispatch() {
    let (dom, host) = product_page(None);
    mount_ready_widget(&dom, host);
    let (dispatcher, mut bus) = RecordingDispatcher::new();
    let (bridge, mut events) = bridge(&dom, dispatcher, fast_config(5));
    bridge.connect(host).await;
    expect_envelopes(&mut bus, 2).await;

    let price = dom.find_by_id("price-once").unwrap();
    dom.update_text(price, "Sold out").unwrap();

    let failed = wait_for_event(&mut events, |e| matches!(e, BridgeEvent::ExtractionFailed { .. })).await;
    let BridgeEvent::ExtractionFailed { error, .. } = failed else {
        unreachable!();
    };
    assert!(error.contains("Sold out"));
    expect_quiet(&mut bus).await;

    // Last dispatched state is untouched: restoring the price is not a change
    dom.update_text(price, "$10.00").unwrap();
    expect_quiet(&mut bus).await;
}

#[tokio::test]
async fn dispatch_failure_does_not_stop_the_session() {
    let (dom, host) = product_page(None);
    mount_ready_widget(&dom, host);
    let dispatcher = RecordingDispatcher::failing();
    let probe = RecordingDispatcher::sharing_counters_with(&dispatcher);
    let (bridge, mut events) = bridge(&dom, dispatcher, fast_config(5));
    bridge.connect(host).await;

    wait_for_event(&mut events, |e| matches!(e, BridgeEvent::ContentReady { .. })).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(probe.dispatch_call_count(), 2);

    select(&dom, "opt-once", "opt-sub");
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(probe.dispatch_call_count(), 4);
    assert!(bridge.is_connected(host).await);
}
