//! Purchase-option bridge front-end
//!
//! The PurchaseOptionBridge is responsible for:
//! - Starting one observation session per connected host element
//! - Tearing sessions down on disconnect (and before any rebind)
//! - Applying the reconnect policy to hosts whose discovery budget ran out
//! - Forwarding monitoring events to the embedder
//!
//! ## Architecture
//!
//! ```text
//!                       connect / disconnect
//!                               │
//!                               ▼
//!                   ┌───────────────────────┐
//!                   │ PurchaseOptionBridge  │
//!                   └───────────────────────┘
//!                               │ one task per host
//!                               ▼
//!                   ┌───────────────────────┐
//!   DomSensor ─────▶│  ObservationSession   │─────▶ EventDispatcher
//!   (records)       └───────────────────────┘       (domain events)
//!                               │
//!                               ▼
//!                        BridgeEvent channel
//!                          (monitoring)
//! ```
//!
//! ## Event Flow
//!
//! 1. Host connected, session spawned
//! 2. Session discovers the widget boundary (bounded retry)
//! 3. Boundary mutations trigger extraction
//! 4. Changed state is synthesized into domain events and dispatched
//! 5. Monitoring events are emitted for every lifecycle step

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::{BridgeConfig, ReconnectPolicy};
use crate::error::Result;
use crate::events::ChangeType;
use crate::session::ObservationSession;
use crate::traits::{DomSensor, EventDispatcher, NodeId};

/// Monitoring events emitted by the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A session was spawned for a host
    SessionStarted { host: NodeId },

    /// A discovery probe is about to run
    DiscoveryAttempt { host: NodeId, attempt: u32 },

    /// No widget host element yet; watching the host subtree
    AwaitingWidgetHost { host: NodeId },

    /// The widget boundary was located and observers attached
    Bound {
        host: NodeId,
        widget_host: NodeId,
        attempts: u32,
    },

    /// The discovery budget ran out; the session is now inert
    DiscoveryExhausted { host: NodeId, attempts: u32 },

    /// The first price-bearing marker appeared
    ContentReady { host: NodeId, initial_check: bool },

    /// State extraction failed; nothing was dispatched for this cycle
    ExtractionFailed { host: NodeId, error: String },

    /// A SelectionChanged event was dispatched
    SelectionDispatched {
        host: NodeId,
        selected: NodeId,
        change_type: ChangeType,
    },

    /// A VariantUpdated event was dispatched
    VariantDispatched { host: NodeId, form: NodeId },

    /// A session ended and released its watchers
    SessionStopped {
        host: NodeId,
        outcome: SessionOutcome,
    },
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Host disconnected (or the bridge was dropped)
    Disconnected,
    /// Boundary never located within the retry budget
    DiscoveryExhausted,
    /// Every observer stream ended
    WatchersClosed,
}

/// Emit a monitoring event without blocking
///
/// A full channel drops the event with a warning; a closed channel means
/// nobody is listening and the event is dropped silently.
pub(crate) fn emit_event(tx: &mpsc::Sender<BridgeEvent>, event: BridgeEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!(
                event = ?event,
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

struct SessionHandle {
    shutdown_tx: oneshot::Sender<()>,
    join: JoinHandle<SessionOutcome>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<NodeId, SessionHandle>,
    /// Hosts whose last session exhausted its discovery budget
    exhausted: HashSet<NodeId>,
}

/// Bridge between a third-party purchase-option widget and host UI
///
/// ## Lifecycle
///
/// 1. Create with [`PurchaseOptionBridge::new()`]
/// 2. [`connect`](Self::connect) each host element
/// 3. [`disconnect`](Self::disconnect) hosts as they leave the document
/// 4. [`shutdown`](Self::shutdown) (or drop) to stop every session
///
/// ## Threading
///
/// Each host is observed by its own tokio task. The bridge itself is
/// `Send + Sync` and can be shared behind an `Arc`.
pub struct PurchaseOptionBridge {
    sensor: Arc<dyn DomSensor>,
    dispatcher: Arc<dyn EventDispatcher>,
    config: BridgeConfig,
    registry: Mutex<Registry>,
    event_tx: mpsc::Sender<BridgeEvent>,
}

impl PurchaseOptionBridge {
    /// Create a new bridge
    ///
    /// # Parameters
    ///
    /// - `sensor`: View of the host document
    /// - `dispatcher`: Host event bus
    /// - `config`: Bridge configuration
    ///
    /// # Returns
    ///
    /// A tuple of (bridge, event_receiver) where event_receiver yields
    /// monitoring events
    pub fn new(
        sensor: Arc<dyn DomSensor>,
        dispatcher: Arc<dyn EventDispatcher>,
        config: BridgeConfig,
    ) -> Result<(Self, mpsc::Receiver<BridgeEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let bridge = Self {
            sensor,
            dispatcher,
            config,
            registry: Mutex::new(Registry::default()),
            event_tx: tx,
        };

        Ok((bridge, rx))
    }

    /// Start observing `host`
    ///
    /// Any session already bound to `host` is torn down first, so a host
    /// never has more than one session.
    ///
    /// # Returns
    ///
    /// `false` when the reconnect policy keeps the host failed
    pub async fn connect(&self, host: NodeId) -> bool {
        let mut registry = self.registry.lock().await;

        if let Some(previous) = registry.sessions.remove(&host) {
            debug!(host = %host, "rebinding host, tearing down previous session");
            let outcome = stop_session(host, previous).await;
            registry.record(host, outcome);
        }

        if self.config.discovery.reconnect == ReconnectPolicy::RemainFailed
            && registry.exhausted.contains(&host)
        {
            info!(host = %host, "discovery previously exhausted, host remains failed");
            return false;
        }
        registry.exhausted.remove(&host);

        let session = ObservationSession::new(
            host,
            Arc::clone(&self.sensor),
            Arc::clone(&self.dispatcher),
            &self.config,
            self.event_tx.clone(),
        );
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(
            session
                .run(shutdown_rx)
                .instrument(info_span!("session", host = %host)),
        );

        registry
            .sessions
            .insert(host, SessionHandle { shutdown_tx, join });
        true
    }

    /// Stop observing `host`
    ///
    /// Returns once the session has disconnected all of its watchers.
    ///
    /// # Returns
    ///
    /// How the session ended, or `None` if `host` was not connected
    pub async fn disconnect(&self, host: NodeId) -> Option<SessionOutcome> {
        let mut registry = self.registry.lock().await;
        let handle = registry.sessions.remove(&host)?;
        let outcome = stop_session(host, handle).await;
        registry.record(host, outcome);
        outcome
    }

    /// Disconnect every host
    pub async fn shutdown(&self) {
        let mut registry = self.registry.lock().await;
        let sessions: Vec<_> = registry.sessions.drain().collect();
        info!(count = sessions.len(), "shutting down bridge");
        for (host, handle) in sessions {
            let outcome = stop_session(host, handle).await;
            registry.record(host, outcome);
        }
    }

    /// Whether a session exists for `host`
    ///
    /// A session whose discovery budget ran out still counts until the host
    /// is disconnected.
    pub async fn is_connected(&self, host: NodeId) -> bool {
        self.registry.lock().await.sessions.contains_key(&host)
    }

    /// Hosts with a session, in node order
    pub async fn connected_hosts(&self) -> Vec<NodeId> {
        let registry = self.registry.lock().await;
        let mut hosts: Vec<NodeId> = registry.sessions.keys().copied().collect();
        hosts.sort();
        hosts
    }

    /// Active configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl Registry {
    fn record(&mut self, host: NodeId, outcome: Option<SessionOutcome>) {
        if outcome == Some(SessionOutcome::DiscoveryExhausted) {
            self.exhausted.insert(host);
        }
    }
}

/// Signal a session and wait for its teardown
async fn stop_session(host: NodeId, handle: SessionHandle) -> Option<SessionOutcome> {
    // Err means the session already ended on its own
    let _ = handle.shutdown_tx.send(());
    match handle.join.await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!(host = %host, error = %e, "session task failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitoring_events_serialize_with_tag() {
        let event = BridgeEvent::SessionStopped {
            host: NodeId::new(4),
            outcome: SessionOutcome::DiscoveryExhausted,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "session_stopped");
        assert_eq!(value["host"], 4);
        assert_eq!(value["outcome"], "discovery_exhausted");
    }

    #[tokio::test]
    async fn full_channel_drops_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        emit_event(&tx, BridgeEvent::SessionStarted { host: NodeId::new(1) });
        emit_event(&tx, BridgeEvent::SessionStarted { host: NodeId::new(2) });

        assert_eq!(
            rx.recv().await,
            Some(BridgeEvent::SessionStarted { host: NodeId::new(1) })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = BridgeConfig::default();
        config.engine.event_channel_capacity = 0;
        let (dispatcher, _bus) = crate::traits::ChannelDispatcher::new();

        let result = PurchaseOptionBridge::new(
            Arc::new(crate::dom::MemoryDom::new()),
            Arc::new(dispatcher),
            config,
        );
        assert!(result.is_err());
    }
}
