// # Event Dispatcher Trait
//
// Defines the outbound side of the bridge: delivering domain events onto the
// host event bus.
//
// ## Implementations
//
// - Channel-backed: `ChannelDispatcher` (below), used by the replay binary
//   and by tests
// - Future: a `web-sys` dispatcher creating `CustomEvent`s

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::events::DispatchEnvelope;

/// Trait for event dispatcher implementations
///
/// The session awaits each dispatch before starting the next one, which is
/// what guarantees that a `SelectionChanged` reaches the bus strictly before
/// its companion `VariantUpdated`.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Deliver the envelope to its target
/// - ✅ Return failure (the session logs it and carries on)
///
/// ## Forbidden Capabilities
/// - ❌ Reorder or coalesce envelopes
/// - ❌ Retry (a lost event is superseded by the next state change)
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Deliver one event
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The event was handed to the bus
    /// - `Err(Error)`: The bus rejected it
    async fn dispatch(&self, envelope: DispatchEnvelope) -> Result<(), crate::Error>;

    /// Dispatcher name (for logging)
    fn dispatcher_name(&self) -> &'static str;
}

/// Dispatcher forwarding every envelope to an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<DispatchEnvelope>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiving end of its bus
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventDispatcher for ChannelDispatcher {
    async fn dispatch(&self, envelope: DispatchEnvelope) -> Result<(), crate::Error> {
        self.tx
            .send(envelope)
            .map_err(|_| crate::Error::dispatch("event bus receiver dropped"))
    }

    fn dispatcher_name(&self) -> &'static str {
        "channel"
    }
}
