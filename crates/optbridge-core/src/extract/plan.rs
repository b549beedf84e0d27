//! Plan kind classification
//!
//! The plan token may sit on the selected option itself or on any wrapping
//! region. The ancestor walk is an explicit state machine so that the depth
//! bound is enforced in one place.

use crate::config::MarkerVocabulary;
use crate::events::PlanKind;
use crate::traits::{DomSensor, NodeId, has_token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    /// Inspect `node`, which is `depth` steps above the selected option
    Visit { node: NodeId, depth: usize },
    /// A plan token was found
    Matched(PlanKind),
    /// Depth budget spent or the chain ended
    Exhausted,
}

/// Plan token carried directly by `node`, if any
fn plan_token(sensor: &dyn DomSensor, node: NodeId, markers: &MarkerVocabulary) -> Option<PlanKind> {
    if has_token(sensor, node, &markers.attribute, &markers.one_time) {
        Some(PlanKind::OneTime)
    } else if has_token(sensor, node, &markers.attribute, &markers.subscription) {
        Some(PlanKind::Subscription)
    } else {
        None
    }
}

/// Classify the plan of `selected`
///
/// Checks `selected` (depth 0) and then its ancestors, up to `max_depth`
/// nodes in total. The nearest plan token wins; none found is
/// [`PlanKind::Unknown`].
pub fn classify_plan(
    sensor: &dyn DomSensor,
    selected: NodeId,
    markers: &MarkerVocabulary,
    max_depth: usize,
) -> PlanKind {
    let mut state = Walk::Visit {
        node: selected,
        depth: 0,
    };

    loop {
        state = match state {
            Walk::Visit { depth, .. } if depth >= max_depth => Walk::Exhausted,
            Walk::Visit { node, depth } => match plan_token(sensor, node, markers) {
                Some(kind) => Walk::Matched(kind),
                None => match sensor.parent(node) {
                    Some(parent) => Walk::Visit {
                        node: parent,
                        depth: depth + 1,
                    },
                    None => Walk::Exhausted,
                },
            },
            Walk::Matched(kind) => return kind,
            Walk::Exhausted => return PlanKind::Unknown,
        };
    }
}
