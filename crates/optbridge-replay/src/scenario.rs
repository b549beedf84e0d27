// # Replay Scenarios
//
// A scenario is an initial document plus a timed list of steps that mutate
// it the way a storefront page and its widget would. Running one drives a
// real `PurchaseOptionBridge` against a `MemoryDom` and collects everything
// the bridge put on the event bus.
//
// ## File Format
//
// ```json
// {
//   "document": { "tag": "section", "children": [ ... ] },
//   "steps": [
//     { "op": "connect", "host": "host" },
//     { "op": "attach_shadow", "target": "widget", "children": [ ... ] },
//     { "op": "wait", "ms": 50 },
//     { "op": "set_attribute", "target": "opt-sub", "name": "part", "value": "option selected" }
//   ],
//   "settle_ms": 50
// }
// ```
//
// Elements are addressed by their `id` attribute.

use anyhow::{Context, Result};
use optbridge_core::dom::{MemoryDom, NodeSpec};
use optbridge_core::{
    BridgeConfig, BridgeEvent, ChannelDispatcher, DispatchEnvelope, NodeId, PurchaseOptionBridge,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A recorded page session
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Initial document, mounted as the only child of the document node
    pub document: NodeSpec,

    /// Steps applied in order
    #[serde(default)]
    pub steps: Vec<Step>,

    /// How long to let the bridge settle after the last step
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_settle_ms() -> u64 {
    50
}

/// One scenario step
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Connect the bridge to a host element
    Connect { host: String },
    /// Disconnect a host element
    Disconnect { host: String },
    /// Let time pass
    Wait { ms: u64 },
    /// Set an attribute
    SetAttribute {
        target: String,
        name: String,
        value: String,
    },
    /// Remove an attribute
    RemoveAttribute { target: String, name: String },
    /// Replace an element's text
    UpdateText { target: String, text: String },
    /// Append a subtree to an element
    Append { parent: String, node: NodeSpec },
    /// Attach a shadow root and render `children` into it
    AttachShadow {
        target: String,
        #[serde(default)]
        children: Vec<NodeSpec>,
    },
}

/// One line of replay output
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayLine {
    /// An event the bridge dispatched onto the bus
    Dispatch { envelope: DispatchEnvelope },
    /// A monitoring event
    Monitor { event: BridgeEvent },
}

impl Scenario {
    /// Parse a scenario from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("scenario is not valid JSON")
    }

    /// Load a scenario file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json_str(&raw)
    }
}

/// Run `scenario` and collect its output
///
/// Monitoring events are included only when `monitor` is set. Output is
/// complete when this returns: the bridge is shut down and both channels are
/// drained.
pub async fn run_scenario(
    scenario: &Scenario,
    config: BridgeConfig,
    monitor: bool,
) -> Result<Vec<ReplayLine>> {
    let (dom, _) = MemoryDom::from_spec(&scenario.document)?;
    let (dispatcher, bus) = ChannelDispatcher::new();
    let (bridge, events) = PurchaseOptionBridge::new(
        Arc::new(dom.clone()),
        Arc::new(dispatcher),
        config,
    )?;

    let collector = tokio::spawn(collect(bus, events, monitor));

    let applied = apply_steps(&dom, &bridge, &scenario.steps).await;
    tokio::time::sleep(Duration::from_millis(scenario.settle_ms)).await;

    bridge.shutdown().await;
    drop(bridge);
    applied?;

    let lines = collector.await.context("output collector panicked")?;
    info!(lines = lines.len(), "scenario finished");
    Ok(lines)
}

async fn apply_steps(dom: &MemoryDom, bridge: &PurchaseOptionBridge, steps: &[Step]) -> Result<()> {
    for (index, step) in steps.iter().enumerate() {
        debug!(step = index, ?step, "applying step");
        apply(dom, bridge, step)
            .await
            .with_context(|| format!("step {} failed", index))?;
    }
    Ok(())
}

async fn apply(dom: &MemoryDom, bridge: &PurchaseOptionBridge, step: &Step) -> Result<()> {
    match step {
        Step::Connect { host } => {
            let host = element(dom, host)?;
            if !bridge.connect(host).await {
                info!(host = %host, "bridge refused to reconnect host");
            }
        }
        Step::Disconnect { host } => {
            bridge.disconnect(element(dom, host)?).await;
        }
        Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
        Step::SetAttribute {
            target,
            name,
            value,
        } => dom.set_attribute(element(dom, target)?, name, value)?,
        Step::RemoveAttribute { target, name } => {
            dom.remove_attribute(element(dom, target)?, name)?
        }
        Step::UpdateText { target, text } => dom.update_text(element(dom, target)?, text)?,
        Step::Append { parent, node } => {
            dom.mount(element(dom, parent)?, node)?;
        }
        Step::AttachShadow { target, children } => {
            let root = dom.attach_shadow(element(dom, target)?)?;
            for child in children {
                dom.mount(root, child)?;
            }
        }
    }
    Ok(())
}

fn element(dom: &MemoryDom, id: &str) -> Result<NodeId> {
    dom.find_by_id(id)
        .with_context(|| format!("no element with id '{}'", id))
}

async fn collect(
    mut bus: mpsc::UnboundedReceiver<DispatchEnvelope>,
    mut events: mpsc::Receiver<BridgeEvent>,
    monitor: bool,
) -> Vec<ReplayLine> {
    let mut lines = Vec::new();
    let mut bus_open = true;
    let mut events_open = true;

    while bus_open || events_open {
        tokio::select! {
            envelope = bus.recv(), if bus_open => match envelope {
                Some(envelope) => lines.push(ReplayLine::Dispatch { envelope }),
                None => bus_open = false,
            },
            event = events.recv(), if events_open => match event {
                Some(event) if monitor => lines.push(ReplayLine::Monitor { event }),
                Some(_) => {}
                None => events_open = false,
            },
        }
    }

    lines
}
