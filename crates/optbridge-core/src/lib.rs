// # optbridge-core
//
// Core library for the purchase-option synchronization bridge.
//
// ## Architecture Overview
//
// A third-party purchase-option widget renders inside a shadow root and
// exposes no API. This library observes it passively and relays its
// selection and price state to host UI components as domain events:
// - **DomSensor**: Trait for reading the host document and observing mutations
// - **EventDispatcher**: Trait for delivering domain events to the host bus
// - **discovery**: Bounded search for the widget boundary
// - **watch**: Classification of boundary mutations
// - **extract**: Selection state extraction and price parsing
// - **synth**: Deduplicated event synthesis and variant resolution
// - **ObservationSession**: Per-host task tying the above together
// - **PurchaseOptionBridge**: Host registry spawning and tearing down sessions
//
// ## Design Principles
//
// 1. **Passive**: The widget is only read and observed, never invoked
// 2. **Event-Driven**: Sessions react to mutation streams, not polling
// 3. **Idempotent**: Re-extracting unchanged state never re-dispatches
// 4. **Local failures**: Nothing the widget does can surface as an error in host code
// 5. **Library-First**: The replay binary is a thin wrapper over this crate

pub mod config;
pub mod discovery;
pub mod dom;
pub mod engine;
pub mod error;
pub mod events;
pub mod extract;
pub mod session;
pub mod synth;
pub mod traits;
pub mod watch;

// Re-export core types for convenience
pub use config::{BridgeConfig, DiscoveryConfig, MarkerVocabulary, ReconnectPolicy};
pub use dom::{MemoryDom, NodeSpec};
pub use engine::{BridgeEvent, PurchaseOptionBridge, SessionOutcome};
pub use error::{Error, ExtractionError, Result};
pub use events::{ChangeType, DispatchEnvelope, DomainEvent, PlanKind};
pub use extract::{SelectionState, StateExtractor};
pub use session::ObservationSession;
pub use traits::{ChannelDispatcher, DomSensor, EventDispatcher, NodeId};
