//! Observation session
//!
//! One session per connected host, running as a single task:
//!
//! ```text
//!            ┌──────────────┐  Absent   ┌───────────────────┐
//!  start ───▶│    probe     │──────────▶│ appearance watcher │──┐
//!            └──────────────┘           └───────────────────┘  │
//!              │    ▲   │ HostWithoutBoundary                   │
//!              │    │   ▼                                       │
//!              │  ┌──────────┐                                  │
//!              │  │  timer   │◀─────────── reprobe ◀────────────┘
//!              │  └──────────┘
//!              │ Located
//!              ▼
//!            ┌──────────────┐   records   ┌──────────────────────┐
//!            │    bound     │────────────▶│ extract → synthesize │
//!            └──────────────┘             │      → dispatch      │
//!                                         └──────────────────────┘
//! ```
//!
//! Every probe that finds the widget host element consumes one attempt of
//! the [`RetryBudget`]; waiting for the widget host to appear is free. When
//! the budget is spent the session tears down and ends without emitting any
//! domain event. Teardown disconnects every live watcher exactly once, whatever
//! phase the session was in.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, DiscoveryConfig};
use crate::discovery::{self, Probe, RetryBudget, WidgetHandle};
use crate::engine::{BridgeEvent, SessionOutcome};
use crate::events::{ChangeType, DispatchEnvelope, DomainEvent};
use crate::extract::StateExtractor;
use crate::synth::EventSynthesizer;
use crate::traits::{DomSensor, EventDispatcher, MutationRecord, NodeId, ObserveOptions, Watcher};
use crate::watch::{self, BoundaryWatchers};

/// Per-host observation state machine
pub struct ObservationSession {
    host: NodeId,
    sensor: Arc<dyn DomSensor>,
    dispatcher: Arc<dyn EventDispatcher>,
    discovery: DiscoveryConfig,
    extractor: StateExtractor,
    synth: EventSynthesizer,
    budget: RetryBudget,
    handle: Option<WidgetHandle>,

    /// Watch the host subtree, and nested component shadow trees, for the
    /// widget host element
    appearance: StreamMap<NodeId, Watcher>,
    /// Selection, structure and text watchers on the boundary
    boundary: Option<BoundaryWatchers>,
    /// One-shot watcher for the first price-bearing marker
    content_ready: Option<Watcher>,

    event_tx: mpsc::Sender<BridgeEvent>,
}

impl ObservationSession {
    /// Create a session for `host`
    pub fn new(
        host: NodeId,
        sensor: Arc<dyn DomSensor>,
        dispatcher: Arc<dyn EventDispatcher>,
        config: &BridgeConfig,
        event_tx: mpsc::Sender<BridgeEvent>,
    ) -> Self {
        Self {
            host,
            sensor,
            dispatcher,
            discovery: config.discovery.clone(),
            extractor: StateExtractor::new(config.markers.clone(), &config.extraction),
            synth: EventSynthesizer::new(config.form.clone()),
            budget: RetryBudget::new(config.discovery.max_attempts),
            handle: None,
            appearance: StreamMap::new(),
            boundary: None,
            content_ready: None,
            event_tx,
        }
    }

    /// Run until `shutdown` fires (or its sender is dropped), the discovery
    /// budget runs out, or the boundary watchers close
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> SessionOutcome {
        info!(host = %self.host, "session started");
        self.emit(BridgeEvent::SessionStarted { host: self.host });

        let outcome = match self.discover(&mut shutdown).await {
            Ok(handle) => {
                self.bind(handle).await;
                self.observe(&mut shutdown).await
            }
            Err(outcome) => outcome,
        };

        self.teardown();
        info!(host = %self.host, outcome = ?outcome, "session stopped");
        self.emit(BridgeEvent::SessionStopped {
            host: self.host,
            outcome,
        });
        outcome
    }

    async fn discover(
        &mut self,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Result<WidgetHandle, SessionOutcome> {
        // Installed before the first probe so an insertion racing the probe
        // is still seen
        self.watch_appearance_roots();
        let mut announced_wait = false;

        loop {
            match discovery::probe(self.sensor.as_ref(), self.host, &self.discovery.signatures) {
                Probe::Located(handle) => {
                    self.charge_attempt()?;
                    self.release_appearance();
                    return Ok(handle);
                }
                Probe::HostWithoutBoundary(widget_host) => {
                    let attempt = self.charge_attempt()?;
                    debug!(
                        host = %self.host,
                        widget_host = %widget_host,
                        attempt,
                        "widget host has no boundary yet, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = &mut *shutdown => return Err(SessionOutcome::Disconnected),
                        _ = tokio::time::sleep(self.discovery.retry_interval()) => {}
                    }
                }
                Probe::Absent => {
                    if !announced_wait {
                        debug!(host = %self.host, "widget host absent, watching for it");
                        self.emit(BridgeEvent::AwaitingWidgetHost { host: self.host });
                        announced_wait = true;
                    }
                    self.await_widget_host(shutdown).await?;
                }
            }
        }
    }

    /// Consume one discovery attempt
    fn charge_attempt(&mut self) -> Result<u32, SessionOutcome> {
        let Some(attempt) = self.budget.begin_attempt() else {
            let attempts = self.budget.attempts();
            let error = crate::Error::DiscoveryTimeout { attempts };
            info!(host = %self.host, error = %error, "discovery gave up, widget stays unbound");
            self.emit(BridgeEvent::DiscoveryExhausted {
                host: self.host,
                attempts,
            });
            return Err(SessionOutcome::DiscoveryExhausted);
        };
        self.emit(BridgeEvent::DiscoveryAttempt {
            host: self.host,
            attempt,
        });
        Ok(attempt)
    }

    /// Observe every tree a widget host could be inserted into
    ///
    /// Roots already watched are kept. A shadow root attached after its
    /// element was inserted produces no record, so it is only picked up the
    /// next time any watched tree changes.
    fn watch_appearance_roots(&mut self) {
        let roots =
            discovery::appearance_roots(self.sensor.as_ref(), self.host, &self.discovery.signatures);
        for root in roots {
            if !self.appearance.contains_key(&root) {
                let watcher = self
                    .sensor
                    .observe(root, ObserveOptions::child_list().subtree());
                self.appearance.insert(root, watcher);
            }
        }
    }

    /// Disconnect every appearance watcher
    fn release_appearance(&mut self) -> usize {
        let roots: Vec<NodeId> = self.appearance.keys().copied().collect();
        for root in &roots {
            if let Some(watcher) = self.appearance.remove(root) {
                watcher.disconnect();
            }
        }
        roots.len()
    }

    /// Wait until an appearance watcher reports a widget host insertion
    async fn await_widget_host(
        &mut self,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Result<(), SessionOutcome> {
        loop {
            tokio::select! {
                biased;
                _ = &mut *shutdown => return Err(SessionOutcome::Disconnected),
                record = self.appearance.next() => match record {
                    Some((root, record)) => {
                        if discovery::reveals_widget(
                            self.sensor.as_ref(),
                            &record,
                            &self.discovery.signatures,
                        ) {
                            debug!(host = %self.host, root = %root, "widget host appeared");
                            return Ok(());
                        }
                        // New components may have brought shadow trees along
                        self.watch_appearance_roots();
                    }
                    None => return Err(SessionOutcome::WatchersClosed),
                },
            }
        }
    }

    async fn bind(&mut self, handle: WidgetHandle) {
        info!(
            host = %self.host,
            widget_host = %handle.widget_host,
            attempts = self.budget.attempts(),
            "widget boundary bound"
        );
        self.emit(BridgeEvent::Bound {
            host: self.host,
            widget_host: handle.widget_host,
            attempts: self.budget.attempts(),
        });

        let sensor = Arc::clone(&self.sensor);
        let markers = self.extractor.markers().clone();
        self.handle = Some(handle);
        self.boundary = Some(BoundaryWatchers::attach(
            sensor.as_ref(),
            handle.boundary,
            &markers,
        ));

        if watch::is_content_ready(sensor.as_ref(), handle.boundary, &markers) {
            self.on_content_ready().await;
            return;
        }

        self.content_ready = Some(watch::content_ready_watcher(
            sensor.as_ref(),
            handle.boundary,
            &markers,
        ));
        // Content may have landed between the check and the attach
        if watch::is_content_ready(sensor.as_ref(), handle.boundary, &markers) {
            self.on_content_ready().await;
        }
    }

    async fn observe(&mut self, shutdown: &mut oneshot::Receiver<()>) -> SessionOutcome {
        loop {
            tokio::select! {
                biased;
                _ = &mut *shutdown => return SessionOutcome::Disconnected,
                Some(_) = next_from(&mut self.content_ready) => {
                    let ready = self.handle.is_some_and(|handle| {
                        watch::is_content_ready(
                            self.sensor.as_ref(),
                            handle.boundary,
                            self.extractor.markers(),
                        )
                    });
                    if ready {
                        self.on_content_ready().await;
                    }
                }
                next = next_boundary_record(&mut self.boundary) => match next {
                    Some((kind, record)) => self.on_record(kind, record).await,
                    None => {
                        warn!(host = %self.host, "boundary watchers closed");
                        return SessionOutcome::WatchersClosed;
                    }
                },
            }
        }
    }

    /// First satisfaction of the content-ready condition
    async fn on_content_ready(&mut self) {
        if let Some(watcher) = self.content_ready.take() {
            watcher.disconnect();
        }
        let Some(handle) = self.handle else {
            return;
        };

        let option_set = watch::has_subscription_options(
            self.sensor.as_ref(),
            handle.boundary,
            self.extractor.markers(),
        );
        debug!(host = %self.host, option_set, "widget content ready");
        self.emit(BridgeEvent::ContentReady {
            host: self.host,
            initial_check: option_set,
        });

        if option_set {
            self.run_cycle(ChangeType::InitialLoad).await;
        }
    }

    async fn on_record(&mut self, kind: watch::WatchKind, record: MutationRecord) {
        let Some(handle) = self.handle else {
            return;
        };
        match watch::classify(
            self.sensor.as_ref(),
            handle.boundary,
            &record,
            self.extractor.markers(),
        ) {
            Some(signal) => {
                debug!(host = %self.host, watcher = ?kind, signal = ?signal, "state may have changed");
                self.run_cycle(ChangeType::Selection).await;
            }
            None => {
                debug!(host = %self.host, watcher = ?kind, target = %record.target(), "mutation ignored");
            }
        }
    }

    /// One extract → synthesize → dispatch cycle
    async fn run_cycle(&mut self, change: ChangeType) {
        let Some(handle) = self.handle else {
            return;
        };
        let sensor = Arc::clone(&self.sensor);

        let Some(selected) = self.extractor.find_selected(sensor.as_ref(), handle.boundary) else {
            debug!(host = %self.host, "no option carries the selected marker");
            return;
        };

        let extraction = match self.extractor.extract(sensor.as_ref(), selected) {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(host = %self.host, selected = %selected, error = %e, "extraction failed");
                self.emit(BridgeEvent::ExtractionFailed {
                    host: self.host,
                    error: e.to_string(),
                });
                return;
            }
        };

        let envelopes = self
            .synth
            .synthesize(sensor.as_ref(), self.host, &extraction, change);
        for envelope in envelopes {
            self.dispatch(envelope).await;
        }
    }

    async fn dispatch(&mut self, envelope: DispatchEnvelope) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let name = envelope.name;
        let target = envelope.target;
        let monitoring = match &envelope.detail {
            DomainEvent::SelectionChanged(selection) => BridgeEvent::SelectionDispatched {
                host: self.host,
                selected: selection.selected_option,
                change_type: selection.change_type,
            },
            DomainEvent::VariantUpdated(_) => BridgeEvent::VariantDispatched {
                host: self.host,
                form: target,
            },
        };

        match dispatcher.dispatch(envelope).await {
            Ok(()) => {
                debug!(host = %self.host, event = name, target = %target, "event dispatched");
                self.emit(monitoring);
            }
            Err(e) => {
                warn!(
                    host = %self.host,
                    event = name,
                    dispatcher = dispatcher.dispatcher_name(),
                    error = %e,
                    "dispatch failed"
                );
            }
        }
    }

    /// Disconnect every live watcher
    fn teardown(&mut self) {
        let mut released = self.release_appearance();
        if let Some(watcher) = self.content_ready.take() {
            watcher.disconnect();
            released += 1;
        }
        if let Some(watchers) = self.boundary.take() {
            watchers.disconnect();
            released += 3;
        }
        self.handle = None;
        debug!(host = %self.host, released, "session watchers disconnected");
    }

    fn emit(&self, event: BridgeEvent) {
        crate::engine::emit_event(&self.event_tx, event);
    }
}

async fn next_from(watcher: &mut Option<Watcher>) -> Option<MutationRecord> {
    match watcher {
        Some(watcher) => watcher.next().await,
        None => std::future::pending().await,
    }
}

async fn next_boundary_record(
    watchers: &mut Option<BoundaryWatchers>,
) -> Option<(watch::WatchKind, MutationRecord)> {
    match watchers {
        Some(watchers) => watchers.next_record().await,
        None => std::future::pending().await,
    }
}
