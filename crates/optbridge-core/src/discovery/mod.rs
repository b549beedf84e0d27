//! Widget discovery
//!
//! Locates the widget's encapsulated subtree below a host element.
//!
//! A probe has three outcomes:
//! - **Located**: a widget host element with an open shadow root was found
//! - **HostWithoutBoundary**: the widget host element exists but has not
//!   attached its shadow root yet; the session retries on a timer
//! - **Absent**: no widget host element yet; the session watches the host
//!   subtree for it to appear
//!
//! The probe itself is pure; retry timing and budget bookkeeping live in
//! [`RetryBudget`] and the session.

use crate::config::ElementSignature;
use crate::traits::{DomSensor, MutationRecord, NodeId};

/// Ownership token for one discovered widget boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetHandle {
    /// Element the widget is mounted on
    pub widget_host: NodeId,
    /// Root of the widget's encapsulated subtree
    pub boundary: NodeId,
}

/// Result of one discovery probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Boundary found
    Located(WidgetHandle),
    /// Widget host present, boundary not exposed yet
    HostWithoutBoundary(NodeId),
    /// No widget host element yet
    Absent,
}

/// Whether `node` matches `signature`
pub fn matches_signature(sensor: &dyn DomSensor, node: NodeId, signature: &ElementSignature) -> bool {
    let Some(tag) = sensor.tag_name(node) else {
        return false;
    };
    let tag_ok = signature
        .tag
        .as_deref()
        .is_none_or(|wanted| tag.eq_ignore_ascii_case(wanted));
    let attribute_ok = signature
        .attribute
        .as_deref()
        .is_none_or(|wanted| sensor.attribute(node, wanted).is_some());
    tag_ok && attribute_ok
}

/// Whether `node` matches any of `signatures`
pub fn matches_any(sensor: &dyn DomSensor, node: NodeId, signatures: &[ElementSignature]) -> bool {
    signatures
        .iter()
        .any(|signature| matches_signature(sensor, node, signature))
}

/// Probe `host` (inclusive) and its descendants for the widget boundary
///
/// Traversal is in document order and also descends into the shadow roots
/// of non-widget elements, so a widget nested inside another component's
/// shadow tree is still found. The first widget host with a shadow root
/// wins; otherwise the first widget host without one is reported.
pub fn probe(sensor: &dyn DomSensor, host: NodeId, signatures: &[ElementSignature]) -> Probe {
    let mut pending_host = None;
    let mut stack = vec![host];

    while let Some(node) = stack.pop() {
        if matches_any(sensor, node, signatures) {
            match sensor.shadow_root(node) {
                Some(boundary) => {
                    return Probe::Located(WidgetHandle {
                        widget_host: node,
                        boundary,
                    });
                }
                None => {
                    pending_host.get_or_insert(node);
                }
            }
        } else if let Some(nested) = sensor.shadow_root(node) {
            if node != host {
                stack.push(nested);
            }
        }
        stack.extend(sensor.children(node).into_iter().rev());
    }

    match pending_host {
        Some(widget_host) => Probe::HostWithoutBoundary(widget_host),
        None => Probe::Absent,
    }
}

/// Trees the appearance watchers must cover for `host`
///
/// That is `host` itself plus every open shadow root of a non-widget element
/// reachable from it, in the same order `probe` visits them. Mutations inside
/// such a shadow root are invisible to an observer on `host`.
pub fn appearance_roots(
    sensor: &dyn DomSensor,
    host: NodeId,
    signatures: &[ElementSignature],
) -> Vec<NodeId> {
    let mut roots = vec![host];
    let mut stack = sensor.children(host);
    stack.reverse();

    while let Some(node) = stack.pop() {
        if matches_any(sensor, node, signatures) {
            continue;
        }
        if let Some(nested) = sensor.shadow_root(node) {
            roots.push(nested);
            stack.push(nested);
        }
        stack.extend(sensor.children(node).into_iter().rev());
    }

    roots
}

/// Whether a record on a watched tree inserted a widget host element
///
/// Inserted subtrees are searched through their open shadow roots too, so a
/// component arriving with the widget already inside its shadow tree counts.
pub fn reveals_widget(
    sensor: &dyn DomSensor,
    record: &MutationRecord,
    signatures: &[ElementSignature],
) -> bool {
    let MutationRecord::ChildList { added, .. } = record else {
        return false;
    };
    let mut stack = added.clone();
    while let Some(node) = stack.pop() {
        if matches_any(sensor, node, signatures) {
            return true;
        }
        stack.extend(sensor.shadow_root(node));
        stack.extend(sensor.children(node));
    }
    false
}

/// Strictly bounded, monotonically increasing attempt counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudget {
    max_attempts: u32,
    attempts: u32,
}

impl RetryBudget {
    /// Budget allowing `max_attempts` probes
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempts: 0,
        }
    }

    /// Consume one attempt
    ///
    /// # Returns
    ///
    /// The 1-based attempt number, or `None` once the budget is spent
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    /// Attempts consumed so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether no attempt is left
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
