//! Test doubles and common utilities for contract tests
//!
//! This module provides a product page fixture, widget builders and
//! dispatcher doubles that count what the bridge sends.

#![allow(dead_code)]

use optbridge_core::config::BridgeConfig;
use optbridge_core::dom::{MemoryDom, NodeSpec};
use optbridge_core::error::Result;
use optbridge_core::events::{DispatchEnvelope, DomainEvent};
use optbridge_core::traits::{DomSensor, EventDispatcher, NodeId};
use optbridge_core::{BridgeEvent, PurchaseOptionBridge};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Live variant id in the fixture form
pub const VARIANT_ID: &str = "101";

/// Product id in the fixture form
pub const PRODUCT_ID: &str = "55";

/// A dispatcher that records every envelope and can be told to fail
pub struct RecordingDispatcher {
    dispatch_call_count: Arc<AtomicUsize>,
    envelopes: Arc<std::sync::Mutex<Vec<DispatchEnvelope>>>,
    tx: mpsc::UnboundedSender<DispatchEnvelope>,
    fail: bool,
}

impl RecordingDispatcher {
    /// Dispatcher that accepts everything
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            dispatch_call_count: Arc::new(AtomicUsize::new(0)),
            envelopes: Arc::new(std::sync::Mutex::new(Vec::new())),
            tx,
            fail: false,
        };
        (dispatcher, rx)
    }

    /// Dispatcher that rejects everything
    pub fn failing() -> Self {
        let (mut dispatcher, _rx) = Self::new();
        dispatcher.fail = true;
        dispatcher
    }

    /// A dispatcher sharing counters (and bus) with `other`
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            dispatch_call_count: Arc::clone(&other.dispatch_call_count),
            envelopes: Arc::clone(&other.envelopes),
            tx: other.tx.clone(),
            fail: other.fail,
        }
    }

    /// Get the number of times dispatch() was called
    pub fn dispatch_call_count(&self) -> usize {
        self.dispatch_call_count.load(Ordering::SeqCst)
    }

    /// Names of every accepted event, in order
    pub fn names(&self) -> Vec<&'static str> {
        self.envelopes.lock().unwrap().iter().map(|e| e.name).collect()
    }
}

#[async_trait::async_trait]
impl EventDispatcher for RecordingDispatcher {
    async fn dispatch(&self, envelope: DispatchEnvelope) -> Result<()> {
        self.dispatch_call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(optbridge_core::Error::dispatch("bus unavailable"));
        }
        self.envelopes.lock().unwrap().push(envelope.clone());
        let _ = self.tx.send(envelope);
        Ok(())
    }

    fn dispatcher_name(&self) -> &'static str {
        "recording"
    }
}

/// Config with a short retry interval
pub fn fast_config(max_attempts: u32) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.discovery.max_attempts = max_attempts;
    config.discovery.retry_interval_ms = 10;
    config
}

/// Product section with a form and an empty `product-info` host
///
/// ```text
/// section[data-section=main]
///   div
///     form[data-product-form]  (id, product-id fields)
///     script[data-selected-variant]  (when `snapshot` is given)
///     product-info#host
/// ```
pub fn product_page(snapshot: Option<&str>) -> (MemoryDom, NodeId) {
    let mut product = NodeSpec::element("div").child(
        NodeSpec::element("form")
            .attr("data-product-form", "")
            .attr("id", "form")
            .child(
                NodeSpec::element("input")
                    .attr("type", "hidden")
                    .attr("name", "id")
                    .attr("value", VARIANT_ID),
            )
            .child(
                NodeSpec::element("input")
                    .attr("type", "hidden")
                    .attr("name", "product-id")
                    .attr("value", PRODUCT_ID),
            ),
    );
    if let Some(raw) = snapshot {
        product = product.child(
            NodeSpec::element("script")
                .attr("type", "application/json")
                .attr("data-selected-variant", "")
                .with_text(raw),
        );
    }
    let spec = NodeSpec::element("section")
        .attr("data-section", "main")
        .child(product.child(NodeSpec::element("product-info").attr("id", "host")));

    let (dom, _) = MemoryDom::from_spec(&spec).unwrap();
    let host = dom.find_by_id("host").unwrap();
    (dom, host)
}

/// Rendered widget content: a subscription-capable option set with the
/// one-time option selected
pub fn widget_content() -> NodeSpec {
    NodeSpec::element("div")
        .attr("part", "subscription-options")
        .child(
            NodeSpec::element("div")
                .attr("part", "option one-time selected")
                .attr("id", "opt-once")
                .child(
                    NodeSpec::element("span")
                        .attr("part", "price")
                        .attr("id", "price-once")
                        .with_text("$10.00"),
                ),
        )
        .child(
            NodeSpec::element("div")
                .attr("part", "option subscription")
                .attr("id", "opt-sub")
                .child(
                    NodeSpec::element("span")
                        .attr("part", "unit-price")
                        .with_text("$10.00"),
                )
                .child(
                    NodeSpec::element("span")
                        .attr("part", "discounted-price")
                        .attr("id", "price-sub")
                        .with_text("$8.50"),
                ),
        )
}

/// Mount a fully rendered widget under `host`
pub fn mount_ready_widget(dom: &MemoryDom, host: NodeId) -> NodeId {
    let spec = NodeSpec::element("purchase-options")
        .attr("id", "widget")
        .shadow(vec![widget_content()]);
    dom.mount(host, &spec).unwrap()
}

/// Mount an empty widget host element (no shadow root yet)
pub fn mount_bare_widget(dom: &MemoryDom, host: NodeId) -> NodeId {
    dom.mount(host, &NodeSpec::element("purchase-options").attr("id", "widget"))
        .unwrap()
}

/// Attach the shadow root to a bare widget and render its content
pub fn render_widget(dom: &MemoryDom, widget: NodeId) {
    let root = dom.attach_shadow(widget).unwrap();
    dom.mount(root, &widget_content()).unwrap();
}

/// Move the selected marker from one option to another
pub fn select(dom: &MemoryDom, from: &str, to: &str) {
    let from = dom.find_by_id(from).unwrap();
    let to = dom.find_by_id(to).unwrap();
    let from_part = dom.attribute(from, "part").unwrap().replace(" selected", "");
    let to_part = format!("{} selected", dom.attribute(to, "part").unwrap());
    dom.set_attribute(from, "part", &from_part).unwrap();
    dom.set_attribute(to, "part", &to_part).unwrap();
}

/// Build a bridge over `dom` using `dispatcher`
pub fn bridge(
    dom: &MemoryDom,
    dispatcher: impl EventDispatcher + 'static,
    config: BridgeConfig,
) -> (PurchaseOptionBridge, mpsc::Receiver<BridgeEvent>) {
    PurchaseOptionBridge::new(Arc::new(dom.clone()), Arc::new(dispatcher), config)
        .expect("bridge construction succeeds")
}

/// Receive exactly `n` envelopes, failing if they do not arrive in time
pub async fn expect_envelopes(
    bus: &mut mpsc::UnboundedReceiver<DispatchEnvelope>,
    n: usize,
) -> Vec<DispatchEnvelope> {
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let envelope = tokio::time::timeout(Duration::from_secs(2), bus.recv())
            .await
            .unwrap_or_else(|_| panic!("envelope {} of {} did not arrive", i + 1, n))
            .expect("bus open");
        out.push(envelope);
    }
    out
}

/// Assert nothing else is dispatched within a short window
pub async fn expect_quiet(bus: &mut mpsc::UnboundedReceiver<DispatchEnvelope>) {
    let extra = tokio::time::timeout(Duration::from_millis(100), bus.recv()).await;
    assert!(extra.is_err(), "unexpected envelope: {:?}", extra);
}

/// Drain monitoring events until `predicate` matches one
pub async fn wait_for_event(
    events: &mut mpsc::Receiver<BridgeEvent>,
    mut predicate: impl FnMut(&BridgeEvent) -> bool,
) -> BridgeEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("monitoring channel open");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("monitoring event did not arrive")
}

/// Whether an envelope carries a SelectionChanged
pub fn is_selection(envelope: &DispatchEnvelope) -> bool {
    matches!(envelope.detail, DomainEvent::SelectionChanged(_))
}
