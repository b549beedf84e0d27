//! Domain events emitted towards host UI components
//!
//! The payload shapes here are the contract with downstream consumers
//! (price display, sticky purchase bar, add-to-cart text), so field names
//! are serialized exactly as those consumers read them.

use crate::traits::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of `source` on every bridge-synthesized variant event
pub const EVENT_SOURCE: &str = "purchase-option-bridge";

/// Event name of [`SelectionChanged`]
pub const SELECTION_CHANGED: &str = "purchase-option:selection";

/// Event name of [`VariantUpdated`], the host's pre-existing variant event
pub const VARIANT_UPDATED: &str = "variant:update";

/// Purchase plan of the selected option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanKind {
    /// Single purchase
    OneTime,
    /// Recurring purchase
    Subscription,
    /// No plan token found within the ancestor budget
    Unknown,
}

impl PlanKind {
    /// String form used in event payloads
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneTime => "one-time",
            Self::Subscription => "subscription",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a `SelectionChanged` was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeType {
    /// The shopper picked another option
    Selection,
    /// The one-time check performed once the widget content is ready
    InitialLoad,
}

/// Payload of the local selection event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionChanged {
    /// Option node carrying the selected marker
    pub selected_option: NodeId,
    /// Parsed price
    pub price: f64,
    /// Plan kind of the selected option
    pub plan_type: PlanKind,
    /// Whether the discounted price was used
    pub has_discount: bool,
    /// Node the price was read from
    pub price_element: NodeId,
    /// Selection or initial load
    pub change_type: ChangeType,
}

/// Data block of a variant update, shaped like the native event's
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantData {
    /// Synthetic document fragment holding the price container
    pub html: String,
    /// Live product id from the form
    pub product_id: Option<String>,
    /// Always absent: the bridge never switches products
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub new_product: Option<serde_json::Value>,
}

/// Payload of the canonical variant update event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantUpdated {
    /// Variant descriptor (snapshot or fallback)
    pub resource: serde_json::Value,
    /// Always [`EVENT_SOURCE`]
    pub source: String,
    /// Rendering data for price consumers
    pub data: VariantData,
}

/// Events the bridge emits on the host event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomainEvent {
    /// The selected option changed
    SelectionChanged(SelectionChanged),
    /// Variant state (price) must be re-rendered
    VariantUpdated(VariantUpdated),
}

impl DomainEvent {
    /// Host event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectionChanged(_) => SELECTION_CHANGED,
            Self::VariantUpdated(_) => VARIANT_UPDATED,
        }
    }

    /// Whether the event propagates up to section scope
    pub fn bubbles(&self) -> bool {
        matches!(self, Self::VariantUpdated(_))
    }
}

/// A domain event addressed to a dispatch target
#[derive(Debug, Clone, Serialize)]
pub struct DispatchEnvelope {
    /// Element the event is dispatched from
    pub target: NodeId,
    /// Host event name
    pub name: &'static str,
    /// Whether the event bubbles
    pub bubbles: bool,
    /// Event payload (`detail`)
    pub detail: DomainEvent,
    /// When the bridge dispatched the event
    pub dispatched_at: chrono::DateTime<chrono::Utc>,
}

impl DispatchEnvelope {
    /// Address an event to `target`
    pub fn new(target: NodeId, event: DomainEvent) -> Self {
        Self {
            target,
            name: event.name(),
            bubbles: event.bubbles(),
            detail: event,
            dispatched_at: chrono::Utc::now(),
        }
    }
}
