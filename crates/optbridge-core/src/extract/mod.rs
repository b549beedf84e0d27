//! State extraction
//!
//! Turns the current boundary DOM into a [`SelectionState`]:
//!
//! 1. find the node carrying the selected marker
//! 2. classify its plan kind ([`plan::classify_plan`])
//! 3. pick the price node for that plan kind
//! 4. parse the price text ([`price::parse_price`])
//!
//! Extraction is a pure read. Running it twice against an unchanged DOM
//! yields equal results.

pub mod plan;
pub mod price;

use serde::Serialize;

use crate::config::{ExtractionConfig, MarkerVocabulary};
use crate::error::ExtractionError;
use crate::events::PlanKind;
use crate::traits::{DomSensor, NodeId, find_descendant, has_token};

pub use plan::classify_plan;
pub use price::{ParsedPrice, PricePattern, parse_price};

/// Selected option, its plan and its price
///
/// Equality only considers the selected node, price and discount flag: the
/// plan kind of a given node never changes on its own.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SelectionState {
    /// Option node carrying the selected marker
    pub selected: NodeId,
    /// Plan kind of the selected option
    pub plan: PlanKind,
    /// Parsed price, always greater than zero
    pub price: f64,
    /// Whether the discounted subscription price was used
    pub has_discount: bool,
}

impl PartialEq for SelectionState {
    fn eq(&self, other: &Self) -> bool {
        self.selected == other.selected
            && self.price == other.price
            && self.has_discount == other.has_discount
    }
}

/// Full result of one extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    /// Deduplication-relevant state
    pub state: SelectionState,
    /// Node the price was read from
    pub price_node: NodeId,
    /// Raw markup of the price node
    pub price_markup: String,
}

/// Reads selection state from a widget boundary
#[derive(Debug, Clone)]
pub struct StateExtractor {
    markers: MarkerVocabulary,
    max_ancestor_depth: usize,
}

impl StateExtractor {
    /// Create an extractor for the given vocabulary
    pub fn new(markers: MarkerVocabulary, config: &ExtractionConfig) -> Self {
        Self {
            markers,
            max_ancestor_depth: config.max_ancestor_depth,
        }
    }

    /// Marker vocabulary in use
    pub fn markers(&self) -> &MarkerVocabulary {
        &self.markers
    }

    /// First node under `boundary` carrying the selected marker
    pub fn find_selected(&self, sensor: &dyn DomSensor, boundary: NodeId) -> Option<NodeId> {
        find_descendant(sensor, boundary, |node| {
            has_token(sensor, node, &self.markers.attribute, &self.markers.selected)
        })
    }

    /// Extract the state of `selected`
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractionError`] when no usable price node exists under
    /// the selected option or its text does not parse to a positive price.
    pub fn extract(
        &self,
        sensor: &dyn DomSensor,
        selected: NodeId,
    ) -> Result<Extraction, ExtractionError> {
        let plan = classify_plan(sensor, selected, &self.markers, self.max_ancestor_depth);

        let mut last_error = ExtractionError::NoPriceNode;
        for (token, discounted) in self.price_candidates(plan) {
            let Some(node) = self.price_node(sensor, selected, token) else {
                continue;
            };
            match parse_price(&sensor.text_content(node)) {
                Ok(parsed) => {
                    return Ok(Extraction {
                        state: SelectionState {
                            selected,
                            plan,
                            price: parsed.value,
                            has_discount: discounted,
                        },
                        price_node: node,
                        price_markup: sensor.outer_html(node),
                    });
                }
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }

    /// Price tokens to try for `plan`, in preference order, with whether
    /// each one counts as discounted
    fn price_candidates(&self, plan: PlanKind) -> Vec<(&str, bool)> {
        let m = &self.markers;
        match plan {
            PlanKind::OneTime => vec![(m.price.as_str(), false)],
            PlanKind::Subscription => vec![
                (m.discounted_price.as_str(), true),
                (m.unit_price.as_str(), false),
            ],
            PlanKind::Unknown => vec![
                (m.price.as_str(), false),
                (m.discounted_price.as_str(), true),
                (m.unit_price.as_str(), false),
            ],
        }
    }

    /// First node at or below `selected` carrying `token`
    fn price_node(&self, sensor: &dyn DomSensor, selected: NodeId, token: &str) -> Option<NodeId> {
        if has_token(sensor, selected, &self.markers.attribute, token) {
            return Some(selected);
        }
        find_descendant(sensor, selected, |node| {
            has_token(sensor, node, &self.markers.attribute, token)
        })
    }
}
