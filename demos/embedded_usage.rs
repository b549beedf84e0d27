//! Minimal embedding example for optbridge-core
//!
//! This example demonstrates using optbridge-core as a library in a custom
//! application. The application owns the document, the event bus and the
//! bridge lifecycle.

use optbridge_core::dom::{MemoryDom, NodeSpec};
use optbridge_core::events::DomainEvent;
use optbridge_core::{BridgeConfig, DispatchEnvelope, EventDispatcher, PurchaseOptionBridge, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{Duration, sleep};

/// Custom event bus for embedded usage
struct PrintingDispatcher {
    dispatch_calls: Arc<AtomicUsize>,
}

impl PrintingDispatcher {
    fn new() -> Self {
        Self {
            dispatch_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait::async_trait]
impl EventDispatcher for PrintingDispatcher {
    async fn dispatch(&self, envelope: DispatchEnvelope) -> Result<()> {
        self.dispatch_calls.fetch_add(1, Ordering::SeqCst);
        match &envelope.detail {
            DomainEvent::SelectionChanged(selection) => println!(
                "[Embedded] {} -> {} at {} (discount: {})",
                envelope.name, selection.plan_type, selection.price, selection.has_discount
            ),
            DomainEvent::VariantUpdated(update) => println!(
                "[Embedded] {} -> {}",
                envelope.name,
                serde_json::to_string(&update.resource)?
            ),
        }
        Ok(())
    }

    fn dispatcher_name(&self) -> &'static str {
        "printing"
    }
}

fn page() -> NodeSpec {
    NodeSpec::element("section")
        .attr("data-section", "main")
        .child(
            NodeSpec::element("form")
                .attr("data-product-form", "")
                .child(
                    NodeSpec::element("input")
                        .attr("name", "id")
                        .attr("value", "4242"),
                )
                .child(
                    NodeSpec::element("input")
                        .attr("name", "product-id")
                        .attr("value", "77"),
                ),
        )
        .child(
            NodeSpec::element("product-info")
                .attr("id", "host")
                .child(NodeSpec::element("subscription-widget").attr("id", "widget")),
        )
}

fn option(id: &str, part: &str, price_part: &str, price: &str) -> NodeSpec {
    NodeSpec::element("label")
        .attr("id", id)
        .attr("part", part)
        .child(NodeSpec::element("span").attr("part", price_part).with_text(price))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    println!("=== Embedded optbridge-core Example ===\n");

    let (dom, _) = MemoryDom::from_spec(&page())?;
    let dispatcher = PrintingDispatcher::new();
    let dispatch_calls = Arc::clone(&dispatcher.dispatch_calls);

    let mut config = BridgeConfig::default();
    config.discovery.retry_interval_ms = 25;

    println!("1. Creating bridge...");
    let (bridge, mut event_rx) =
        PurchaseOptionBridge::new(Arc::new(dom.clone()), Arc::new(dispatcher), config)?;

    let event_listener = tokio::spawn(async move {
        println!("2. Monitoring listener started");
        while let Some(event) = event_rx.recv().await {
            println!("[Monitor] {:?}", event);
        }
        println!("Monitoring listener stopped");
    });

    let host = dom
        .find_by_id("host")
        .ok_or_else(|| optbridge_core::Error::dom("host element missing"))?;
    let widget = dom
        .find_by_id("widget")
        .ok_or_else(|| optbridge_core::Error::dom("widget element missing"))?;

    println!("3. Connecting host before the widget has rendered...");
    bridge.connect(host).await;
    sleep(Duration::from_millis(60)).await;

    println!("\n4. Widget renders its shadow content\n");
    let root = dom.attach_shadow(widget)?;
    dom.mount(
        root,
        &NodeSpec::element("div")
            .attr("part", "subscription-options")
            .child(option("once", "option one-time selected", "price", "€24,00"))
            .child(option("sub", "option subscription", "discounted-price", "€19,20")),
    )?;
    sleep(Duration::from_millis(100)).await;

    println!("\n5. Customer switches to the subscription\n");
    if let (Some(once), Some(sub)) = (dom.find_by_id("once"), dom.find_by_id("sub")) {
        dom.set_attribute(once, "part", "option one-time")?;
        dom.set_attribute(sub, "part", "option subscription selected")?;
    }
    sleep(Duration::from_millis(50)).await;

    println!("\n6. Shutting down bridge...");
    bridge.shutdown().await;
    drop(bridge);

    let _ = tokio::time::timeout(Duration::from_millis(100), event_listener).await;

    println!("\n=== Embedding Successful ===");
    println!("Events dispatched: {}", dispatch_calls.load(Ordering::SeqCst));
    println!("Observers left: {}", dom.live_observer_count());

    Ok(())
}
